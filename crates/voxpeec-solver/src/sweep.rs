//! Dependent frequency sweeps.
//!
//! Each sweep may name another sweep as `init`; its converged solution is
//! then used as the initial guess. The dependencies form a forest: sweeps
//! are grouped into levels by depth and every level runs in parallel once
//! the previous level is done.

use std::collections::HashMap;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Deserialize;
use voxpeec_core::Excitation;

use crate::error::{Error, Result};
use crate::solve::{PeecSolver, SolveResult};

/// One frequency point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SweepDef {
    pub name: String,
    pub frequency: f64,
    /// Sweep whose solution seeds this one.
    #[serde(default)]
    pub init: Option<String>,
    /// Excitations replacing the model's own, by source tag.
    #[serde(default)]
    pub source_overrides: IndexMap<String, Excitation>,
}

impl SweepDef {
    pub fn new(name: impl Into<String>, frequency: f64) -> Self {
        Self {
            name: name.into(),
            frequency,
            init: None,
            source_overrides: IndexMap::new(),
        }
    }

    /// Seed this sweep with the solution of `init`.
    pub fn with_init(mut self, init: impl Into<String>) -> Self {
        self.init = Some(init.into());
        self
    }

    pub fn with_override(mut self, tag: impl Into<String>, excitation: Excitation) -> Self {
        self.source_overrides.insert(tag.into(), excitation);
        self
    }
}

/// Result of one sweep.
#[derive(Debug, Clone)]
pub enum SweepOutcome {
    Completed(Box<SolveResult>),
    Failed { reason: String },
}

impl SweepOutcome {
    pub fn result(&self) -> Option<&SolveResult> {
        match self {
            SweepOutcome::Completed(r) => Some(r),
            SweepOutcome::Failed { .. } => None,
        }
    }

    /// Completed and converged.
    pub fn is_converged(&self) -> bool {
        self.result().is_some_and(|r| r.has_converged)
    }
}

/// Execution order of a set of sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    /// Indices into the sweep list, one group per dependency depth.
    pub levels: Vec<Vec<usize>>,
    /// Index of the `init` sweep of every sweep.
    pub parents: Vec<Option<usize>>,
}

/// Validate the dependency graph and group sweeps by depth.
///
/// # Errors
/// [`Error::InvalidSweep`] for duplicate names, invalid frequencies, unknown
/// or self `init` references, cycles and sweeps that do not descend from a
/// root.
pub fn plan_sweeps(sweeps: &[SweepDef]) -> Result<SweepPlan> {
    let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(sweeps.len());
    for (i, sweep) in sweeps.iter().enumerate() {
        if by_name.insert(sweep.name.as_str(), i).is_some() {
            return Err(Error::InvalidSweep(format!("duplicate sweep name '{}'", sweep.name)));
        }
        if !(sweep.frequency.is_finite() && sweep.frequency >= 0.0) {
            return Err(Error::InvalidSweep(format!(
                "sweep '{}' has invalid frequency {}",
                sweep.name, sweep.frequency
            )));
        }
    }

    let mut parents = Vec::with_capacity(sweeps.len());
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); sweeps.len()];
    for (i, sweep) in sweeps.iter().enumerate() {
        let parent = match &sweep.init {
            None => None,
            Some(init) if init == &sweep.name => {
                return Err(Error::InvalidSweep(format!("sweep '{init}' initializes itself")));
            }
            Some(init) => {
                let p = *by_name.get(init.as_str()).ok_or_else(|| {
                    Error::InvalidSweep(format!("sweep '{}' references unknown sweep '{init}'", sweep.name))
                })?;
                children[p].push(i);
                Some(p)
            }
        };
        parents.push(parent);
    }

    let mut levels: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..sweeps.len()).filter(|&i| parents[i].is_none()).collect();
    let mut placed = 0;
    while !current.is_empty() {
        placed += current.len();
        let mut next: Vec<usize> = current.iter().flat_map(|&i| children[i].iter().copied()).collect();
        next.sort_unstable();
        levels.push(std::mem::replace(&mut current, next));
    }

    if placed < sweeps.len() {
        let mut reached = vec![false; sweeps.len()];
        for &i in levels.iter().flatten() {
            reached[i] = true;
        }
        let Some(start) = (0..sweeps.len()).find(|&i| !reached[i]) else {
            return Err(Error::InvalidSweep("inconsistent sweep graph".into()));
        };
        // Every unplaced sweep leads into a cycle; walk up to name it.
        let mut seen = vec![false; sweeps.len()];
        let mut node = start;
        while !seen[node] {
            seen[node] = true;
            match parents[node] {
                Some(p) => node = p,
                None => break,
            }
        }
        let mut cycle = vec![sweeps[node].name.clone()];
        let mut walk = parents[node];
        while let Some(p) = walk {
            if p == node {
                break;
            }
            cycle.push(sweeps[p].name.clone());
            walk = parents[p];
        }
        return Err(Error::InvalidSweep(format!(
            "sweep '{}' is unreachable from any root: dependency cycle {}",
            sweeps[start].name,
            cycle.join(" <- ")
        )));
    }

    Ok(SweepPlan { levels, parents })
}

/// Run all sweeps, level by level, each level in parallel.
///
/// A sweep whose `init` failed or did not converge starts from a zero
/// initial guess. Solve errors become [`SweepOutcome::Failed`]; only an
/// invalid plan is returned as an error. Outcomes keep the definition order.
pub fn run_sweeps(solver: &PeecSolver, sweeps: &[SweepDef]) -> Result<IndexMap<String, SweepOutcome>> {
    let plan = plan_sweeps(sweeps)?;
    let label = &solver.context().label;
    let mut outcomes: Vec<Option<SweepOutcome>> = vec![None; sweeps.len()];

    for (depth, level) in plan.levels.iter().enumerate() {
        log::debug!("{label}: sweep level {depth} with {} sweeps", level.len());
        let done: &[Option<SweepOutcome>] = &outcomes;
        let results: Vec<(usize, SweepOutcome)> = level
            .par_iter()
            .map(|&i| {
                let sweep = &sweeps[i];
                let initial = plan.parents[i].and_then(|p| {
                    let seed = done[p]
                        .as_ref()
                        .and_then(SweepOutcome::result)
                        .filter(|r| r.has_converged);
                    if seed.is_none() {
                        log::warn!(
                            "{label}: sweep '{}' cold-starts, '{}' did not converge",
                            sweep.name,
                            sweeps[p].name
                        );
                    }
                    seed.map(|r| r.solution.vector.as_slice())
                });
                let outcome = match solver.solve_with(&sweep.source_overrides, sweep.frequency, initial) {
                    Ok(result) => SweepOutcome::Completed(Box::new(result)),
                    Err(err) => {
                        log::warn!("{label}: sweep '{}' failed: {err}", sweep.name);
                        SweepOutcome::Failed {
                            reason: err.to_string(),
                        }
                    }
                };
                (i, outcome)
            })
            .collect();
        for (i, outcome) in results {
            outcomes[i] = Some(outcome);
        }
    }

    Ok(sweeps
        .iter()
        .zip(outcomes)
        .map(|(sweep, outcome)| {
            let outcome = outcome.unwrap_or_else(|| SweepOutcome::Failed {
                reason: "sweep was not scheduled".into(),
            });
            (sweep.name.clone(), outcome)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(plan: &SweepPlan, sweeps: &[SweepDef]) -> Vec<Vec<String>> {
        plan.levels
            .iter()
            .map(|l| l.iter().map(|&i| sweeps[i].name.clone()).collect())
            .collect()
    }

    #[test]
    fn levels_follow_dependencies() {
        let sweeps = vec![
            SweepDef::new("c", 3e3).with_init("b"),
            SweepDef::new("a", 1e3),
            SweepDef::new("b", 2e3).with_init("a"),
            SweepDef::new("d", 0.0),
            SweepDef::new("e", 5e3).with_init("a"),
        ];
        let plan = plan_sweeps(&sweeps).unwrap();
        assert_eq!(
            names(&plan, &sweeps),
            vec![vec!["a", "d"], vec!["b", "e"], vec!["c"]]
        );
        assert_eq!(plan.parents[0], Some(2));
    }

    #[test]
    fn rejects_invalid_graphs() {
        let dup = vec![SweepDef::new("a", 1.0), SweepDef::new("a", 2.0)];
        assert!(matches!(plan_sweeps(&dup), Err(Error::InvalidSweep(_))));

        let unknown = vec![SweepDef::new("a", 1.0).with_init("zzz")];
        assert!(matches!(plan_sweeps(&unknown), Err(Error::InvalidSweep(_))));

        let own = vec![SweepDef::new("a", 1.0).with_init("a")];
        assert!(matches!(plan_sweeps(&own), Err(Error::InvalidSweep(_))));

        let cycle = vec![
            SweepDef::new("root", 1.0),
            SweepDef::new("x", 1.0).with_init("y"),
            SweepDef::new("y", 1.0).with_init("x"),
            SweepDef::new("z", 1.0).with_init("y"),
        ];
        let err = plan_sweeps(&cycle).unwrap_err();
        match err {
            Error::InvalidSweep(msg) => assert!(msg.contains("cycle"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }

        let bad_freq = vec![SweepDef::new("a", -1.0)];
        assert!(matches!(plan_sweeps(&bad_freq), Err(Error::InvalidSweep(_))));
    }

    #[test]
    fn empty_plan() {
        let plan = plan_sweeps(&[]).unwrap();
        assert!(plan.levels.is_empty());
    }
}
