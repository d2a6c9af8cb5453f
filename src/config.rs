use std::error;
use std::fmt;

use crate::hydro::{Eos, NSCALARS};

/// Signature of the static gravitational potential callback. Takes a cell
/// or face position `(x1, x2, x3)` and returns the potential there.
pub type GravityPotential = fn(f64, f64, f64) -> f64;

/// The shear parameter `q = -d ln Omega / d ln r`, fixed at the Keplerian
/// value.
pub const QSHEAR: f64 = 1.5;

/// Local shearing-sheet parameters: the orbital frequency of the frame.
#[derive(Clone, Copy, Debug)]
pub struct ShearingBox {
    pub omega: f64,
}

/// The feature handle threaded through the integrator and the boundary
/// subsystem. Selected once at configuration time; branches for disabled
/// features are dead at run time.
#[derive(Clone, Copy)]
pub struct Features {
    pub mhd: bool,
    pub eos: Eos,
    pub h_correction: bool,
    pub shearing_box: Option<ShearingBox>,
    pub nscalars: usize,
    pub gravity: Option<GravityPotential>,
    pub cfl: f64,
}

impl Features {
    /// Adiabatic hydrodynamics with no optional physics.
    pub fn hydro(gamma: f64) -> Self {
        Self {
            mhd: false,
            eos: Eos::Adiabatic { gamma },
            h_correction: false,
            shearing_box: None,
            nscalars: 0,
            gravity: None,
            cfl: 0.4,
        }
    }

    /// Adiabatic MHD with no optional physics.
    pub fn mhd(gamma: f64) -> Self {
        Self {
            mhd: true,
            ..Self::hydro(gamma)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nscalars > NSCALARS {
            return Err(ConfigError::TooManyScalars(self.nscalars));
        }
        if !(self.cfl > 0.0 && self.cfl <= 1.0) {
            return Err(ConfigError::BadCourantNumber(self.cfl));
        }
        if let Some(sb) = &self.shearing_box {
            if sb.omega <= 0.0 {
                return Err(ConfigError::BadShearingBox(sb.omega));
            }
        }
        Ok(())
    }
}

// ============================================================================
#[derive(Clone, Debug)]
pub enum ConfigError {
    UnknownBcFlag(i32),
    TooManyScalars(usize),
    BadCourantNumber(f64),
    BadShearingBox(f64),
    ShearingBoxDecomposedInX2,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use ConfigError::*;

        match self {
            UnknownBcFlag(flag) => write!(fmt, "unknown boundary condition flag: {}", flag),
            TooManyScalars(n) => write!(
                fmt,
                "{} passive scalars requested, but the state carries at most {}",
                n, NSCALARS
            ),
            BadCourantNumber(c) => write!(fmt, "courant number {} outside (0, 1]", c),
            BadShearingBox(omega) => write!(fmt, "non-positive orbital frequency: {}", omega),
            ShearingBoxDecomposedInX2 => write!(
                fmt,
                "shearing-box boundaries require the outer-x1 tiles to span the full x2 extent"
            ),
        }
    }
}

impl error::Error for ConfigError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalar_count_is_capped() {
        let mut f = Features::hydro(1.4);
        f.nscalars = NSCALARS;
        assert!(f.validate().is_ok());
        f.nscalars = NSCALARS + 1;
        assert!(f.validate().is_err());
    }

    #[test]
    fn courant_number_must_be_sane() {
        let mut f = Features::mhd(5.0 / 3.0);
        f.cfl = 0.0;
        assert!(f.validate().is_err());
        f.cfl = 1.5;
        assert!(f.validate().is_err());
        f.cfl = 0.8;
        assert!(f.validate().is_ok());
    }
}
