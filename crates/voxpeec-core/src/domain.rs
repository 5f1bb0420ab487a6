//! Domains, conductors and sources, resolved into a validated [`VoxelModel`].

use indexmap::IndexMap;
use num_complex::Complex64 as C64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::VoxelGrid;
use crate::incidence::{incidence_matrix, ReducedIncidence};

/// Named sets of linear voxel indices, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainIndexSet {
    domains: IndexMap<String, Vec<usize>>,
}

impl DomainIndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateTag`] if the tag is already present.
    pub fn insert(&mut self, tag: impl Into<String>, indices: Vec<usize>) -> Result<()> {
        let tag = tag.into();
        if self.domains.contains_key(&tag) {
            return Err(Error::DuplicateTag(tag));
        }
        self.domains.insert(tag, indices);
        Ok(())
    }

    /// Builder-style variant of [`DomainIndexSet::insert`].
    pub fn with(mut self, tag: impl Into<String>, indices: Vec<usize>) -> Result<Self> {
        self.insert(tag, indices)?;
        Ok(self)
    }

    pub fn get(&self, tag: &str) -> Option<&[usize]> {
        self.domains.get(tag).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.domains.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Sorted, duplicate-free union of the listed domains.
    fn union(&self, owner: &str, tags: &[String]) -> Result<Vec<usize>> {
        let mut out = Vec::new();
        for tag in tags {
            let indices = self.get(tag).ok_or_else(|| Error::UnknownDomain {
                owner: owner.to_string(),
                domain: tag.clone(),
            })?;
            out.extend_from_slice(indices);
        }
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }
}

/// A conductor: a set of domains sharing one resistivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConductorDef {
    pub tag: String,
    pub domains: Vec<String>,
    /// Resistivity in Ω·m.
    pub resistivity: f64,
}

impl ConductorDef {
    pub fn new(tag: impl Into<String>, domains: &[&str], resistivity: f64) -> Self {
        Self {
            tag: tag.into(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            resistivity,
        }
    }
}

/// Source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Ideal current source with a parallel internal conductance.
    Current,
    /// Ideal voltage source with a series internal resistance.
    Voltage,
}

/// Source value and internal element.
///
/// For current sources `value` is the total current (A) and `element` the
/// total internal conductance (S). For voltage sources `value` is the voltage
/// (V) and `element` the total internal resistance (Ω).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Excitation {
    pub value: C64,
    pub element: f64,
}

impl Excitation {
    pub fn new(value: C64, element: f64) -> Self {
        Self { value, element }
    }

    /// Ideal excitation (zero internal element).
    pub fn ideal(value: f64) -> Self {
        Self::new(C64::new(value, 0.0), 0.0)
    }

    /// Check that the value and the element are usable.
    pub fn validate(&self, tag: &str) -> Result<()> {
        if !(self.value.re.is_finite() && self.value.im.is_finite()) {
            return Err(Error::InvalidSource {
                tag: tag.to_string(),
                reason: format!("excitation value {} is not finite", self.value),
            });
        }
        if !(self.element.is_finite() && self.element >= 0.0) {
            return Err(Error::InvalidSource {
                tag: tag.to_string(),
                reason: format!("internal element {} must be finite and >= 0", self.element),
            });
        }
        Ok(())
    }
}

/// A source attached to conductor voxels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDef {
    pub tag: String,
    pub domains: Vec<String>,
    pub kind: SourceKind,
    pub excitation: Excitation,
}

impl SourceDef {
    pub fn current(tag: impl Into<String>, domains: &[&str], excitation: Excitation) -> Self {
        Self {
            tag: tag.into(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            kind: SourceKind::Current,
            excitation,
        }
    }

    pub fn voltage(tag: impl Into<String>, domains: &[&str], excitation: Excitation) -> Self {
        Self {
            tag: tag.into(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            kind: SourceKind::Voltage,
            excitation,
        }
    }
}

/// A source resolved to voxel positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub tag: String,
    pub kind: SourceKind,
    pub excitation: Excitation,
    /// Linear voxel indices, ascending.
    pub voxels: Vec<usize>,
    /// Positions of `voxels` in the occupied voxel list.
    pub positions: Vec<usize>,
    /// First auxiliary unknown (voltage sources only).
    pub aux_offset: usize,
}

/// Validated problem geometry: occupied voxels, materials, sources and
/// internal faces. Built once per geometry and shared by all sweeps.
#[derive(Debug, Clone)]
pub struct VoxelModel {
    grid: VoxelGrid,
    idx_v: Vec<usize>,
    resistivity: Vec<f64>,
    conductor_of: Vec<usize>,
    conductor_tags: Vec<String>,
    sources: Vec<ResolvedSource>,
    num_voltage_voxels: usize,
    incidence: ReducedIncidence,
}

impl VoxelModel {
    /// Resolve and validate conductors and sources.
    ///
    /// # Errors
    /// Any inconsistency in the definitions is reported as a validation
    /// error: unknown domains, out-of-range indices, voxels shared between
    /// conductors or between sources, sources outside the conductors,
    /// non-positive resistivity or invalid excitations.
    pub fn new(
        grid: VoxelGrid,
        domains: &DomainIndexSet,
        conductors: &[ConductorDef],
        sources: &[SourceDef],
    ) -> Result<Self> {
        let nv = grid.num_voxels();
        for (tag, indices) in domains.iter() {
            if let Some(&index) = indices.iter().find(|&&i| i >= nv) {
                return Err(Error::IndexOutOfBounds {
                    domain: tag.to_string(),
                    index,
                    nv,
                });
            }
        }

        let mut owner: Vec<Option<usize>> = vec![None; nv];
        let mut conductor_tags: Vec<String> = Vec::with_capacity(conductors.len());
        for (c, cond) in conductors.iter().enumerate() {
            if conductor_tags.contains(&cond.tag) {
                return Err(Error::DuplicateTag(cond.tag.clone()));
            }
            if !(cond.resistivity.is_finite() && cond.resistivity > 0.0) {
                return Err(Error::InvalidResistivity {
                    tag: cond.tag.clone(),
                    value: cond.resistivity,
                });
            }
            for idx in domains.union(&cond.tag, &cond.domains)? {
                if let Some(prev) = owner[idx] {
                    return Err(Error::DuplicateVoxel {
                        index: idx,
                        first: conductors[prev].tag.clone(),
                        second: cond.tag.clone(),
                    });
                }
                owner[idx] = Some(c);
            }
            conductor_tags.push(cond.tag.clone());
        }

        let idx_v: Vec<usize> = (0..nv).filter(|&i| owner[i].is_some()).collect();
        if idx_v.is_empty() {
            return Err(Error::EmptyConductors);
        }
        let conductor_of: Vec<usize> = idx_v.iter().filter_map(|&i| owner[i]).collect();
        let resistivity: Vec<f64> = conductor_of
            .iter()
            .map(|&c| conductors[c].resistivity)
            .collect();

        let mut position = vec![usize::MAX; nv];
        for (pos, &idx) in idx_v.iter().enumerate() {
            position[idx] = pos;
        }

        let mut source_of: Vec<Option<usize>> = vec![None; nv];
        let mut resolved: Vec<ResolvedSource> = Vec::with_capacity(sources.len());
        let mut num_voltage_voxels = 0;
        for (s, src) in sources.iter().enumerate() {
            if resolved.iter().any(|r| r.tag == src.tag) {
                return Err(Error::DuplicateTag(src.tag.clone()));
            }
            src.excitation.validate(&src.tag)?;
            let voxels = domains.union(&src.tag, &src.domains)?;
            if voxels.is_empty() {
                return Err(Error::InvalidSource {
                    tag: src.tag.clone(),
                    reason: "source has no voxels".into(),
                });
            }
            for &idx in &voxels {
                if position[idx] == usize::MAX {
                    return Err(Error::SourceOutsideConductor {
                        tag: src.tag.clone(),
                        index: idx,
                    });
                }
                if let Some(prev) = source_of[idx] {
                    return Err(Error::OverlappingSources {
                        index: idx,
                        first: sources[prev].tag.clone(),
                        second: src.tag.clone(),
                    });
                }
                source_of[idx] = Some(s);
            }

            let aux_offset = num_voltage_voxels;
            if src.kind == SourceKind::Voltage {
                num_voltage_voxels += voxels.len();
            }
            resolved.push(ResolvedSource {
                tag: src.tag.clone(),
                kind: src.kind,
                excitation: src.excitation,
                positions: voxels.iter().map(|&i| position[i]).collect(),
                voxels,
                aux_offset,
            });
        }

        let incidence = ReducedIncidence::new(&incidence_matrix(&grid), &idx_v);

        Ok(Self {
            grid,
            idx_v,
            resistivity,
            conductor_of,
            conductor_tags,
            sources: resolved,
            num_voltage_voxels,
            incidence,
        })
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Occupied voxels, ascending linear indices.
    pub fn occupied(&self) -> &[usize] {
        &self.idx_v
    }

    /// Resistivity per occupied voxel.
    pub fn resistivity(&self) -> &[f64] {
        &self.resistivity
    }

    /// Tag of the conductor owning the occupied voxel at `pos`.
    pub fn conductor_tag(&self, pos: usize) -> &str {
        &self.conductor_tags[self.conductor_of[pos]]
    }

    pub fn sources(&self) -> &[ResolvedSource] {
        &self.sources
    }

    pub fn source(&self, tag: &str) -> Option<&ResolvedSource> {
        self.sources.iter().find(|s| s.tag == tag)
    }

    pub fn incidence(&self) -> &ReducedIncidence {
        &self.incidence
    }

    pub fn num_voxels(&self) -> usize {
        self.idx_v.len()
    }

    pub fn num_faces(&self) -> usize {
        self.incidence.num_faces()
    }

    /// Number of voltage-source voxels (auxiliary current unknowns).
    pub fn num_voltage_voxels(&self) -> usize {
        self.num_voltage_voxels
    }

    /// Total number of unknowns: faces, voxels and voltage-source currents.
    pub fn num_unknowns(&self) -> usize {
        self.num_faces() + self.num_voxels() + self.num_voltage_voxels
    }

    /// Copy of the model with its resistivities scaled by `factor`.
    pub fn scaled_resistivity(&self, factor: f64) -> Result<Self> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::InvalidResistivity {
                tag: "*".into(),
                value: factor,
            });
        }
        let mut out = self.clone();
        out.resistivity.iter_mut().for_each(|r| *r *= factor);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> VoxelGrid {
        VoxelGrid::with_size([2, 1, 3], [0.5e-2, 1e-2, 1e-2]).unwrap()
    }

    fn domains() -> DomainIndexSet {
        DomainIndexSet::new()
            .with("cond", vec![0, 1, 2, 3, 4, 5])
            .unwrap()
            .with("src", vec![0, 1])
            .unwrap()
            .with("sink", vec![4, 5])
            .unwrap()
    }

    #[test]
    fn resolves_reference_problem() {
        let model = VoxelModel::new(
            grid(),
            &domains(),
            &[ConductorDef::new("cond", &["cond"], 1e-2)],
            &[
                SourceDef::current("src", &["src"], Excitation::ideal(1.0)),
                SourceDef::voltage("sink", &["sink"], Excitation::ideal(0.0)),
            ],
        )
        .unwrap();

        assert_eq!(model.occupied(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(model.num_faces(), 7);
        assert_eq!(model.num_voltage_voxels(), 2);
        assert_eq!(model.num_unknowns(), 7 + 6 + 2);
        let sink = model.source("sink").unwrap();
        assert_eq!(sink.positions, vec![4, 5]);
        assert_eq!(sink.aux_offset, 0);
        assert_eq!(model.conductor_tag(3), "cond");
    }

    #[test]
    fn merges_domains_within_conductor() {
        let domains = DomainIndexSet::new()
            .with("a", vec![3, 1, 2])
            .unwrap()
            .with("b", vec![2, 0])
            .unwrap();
        let model = VoxelModel::new(
            grid(),
            &domains,
            &[ConductorDef::new("c", &["a", "b"], 1.0)],
            &[],
        )
        .unwrap();
        assert_eq!(model.occupied(), &[0, 1, 2, 3]);
    }

    #[test]
    fn rejects_duplicate_voxels_across_conductors() {
        let domains = DomainIndexSet::new()
            .with("a", vec![0, 1])
            .unwrap()
            .with("b", vec![1, 2])
            .unwrap();
        let err = VoxelModel::new(
            grid(),
            &domains,
            &[
                ConductorDef::new("ca", &["a"], 1.0),
                ConductorDef::new("cb", &["b"], 1.0),
            ],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateVoxel { index: 1, .. }));
    }

    #[test]
    fn rejects_source_outside_conductor() {
        let domains = DomainIndexSet::new()
            .with("a", vec![0, 1])
            .unwrap()
            .with("s", vec![1, 4])
            .unwrap();
        let err = VoxelModel::new(
            grid(),
            &domains,
            &[ConductorDef::new("c", &["a"], 1.0)],
            &[SourceDef::current("src", &["s"], Excitation::ideal(1.0))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::SourceOutsideConductor {
                tag: "src".into(),
                index: 4
            }
        );
    }

    #[test]
    fn rejects_bad_inputs() {
        let d = domains();
        let bad_rho = VoxelModel::new(grid(), &d, &[ConductorDef::new("c", &["cond"], 0.0)], &[]);
        assert!(matches!(bad_rho, Err(Error::InvalidResistivity { .. })));

        let unknown = VoxelModel::new(grid(), &d, &[ConductorDef::new("c", &["nope"], 1.0)], &[]);
        assert!(matches!(unknown, Err(Error::UnknownDomain { .. })));

        let oob = DomainIndexSet::new().with("x", vec![6]).unwrap();
        let err = VoxelModel::new(grid(), &oob, &[ConductorDef::new("c", &["x"], 1.0)], &[]);
        assert!(matches!(err, Err(Error::IndexOutOfBounds { index: 6, .. })));

        let overlap = VoxelModel::new(
            grid(),
            &d,
            &[ConductorDef::new("c", &["cond"], 1.0)],
            &[
                SourceDef::current("s1", &["src"], Excitation::ideal(1.0)),
                SourceDef::voltage("s2", &["src"], Excitation::ideal(0.0)),
            ],
        );
        assert!(matches!(overlap, Err(Error::OverlappingSources { .. })));

        let negative = VoxelModel::new(
            grid(),
            &d,
            &[ConductorDef::new("c", &["cond"], 1.0)],
            &[SourceDef::voltage("s", &["sink"], Excitation::new(C64::new(1.0, 0.0), -1.0))],
        );
        assert!(matches!(negative, Err(Error::InvalidSource { .. })));

        let empty = VoxelModel::new(grid(), &d, &[], &[]);
        assert_eq!(empty.unwrap_err(), Error::EmptyConductors);
    }

    #[test]
    fn scaling_resistivity() {
        let model = VoxelModel::new(
            grid(),
            &domains(),
            &[ConductorDef::new("cond", &["cond"], 1e-2)],
            &[],
        )
        .unwrap();
        let half = model.scaled_resistivity(0.5).unwrap();
        assert!(half.resistivity().iter().all(|&r| (r - 0.5e-2).abs() < 1e-18));
        assert!(model.scaled_resistivity(0.0).is_err());
    }
}
