//! Physical constants (SI).

use std::f64::consts::PI;

/// Vacuum permeability in H/m.
pub const MU0: f64 = 4.0e-7 * PI;

/// Vacuum permittivity in F/m.
pub const EPS0: f64 = 8.854_187_812_8e-12;
