use std::error;
use std::fmt;

/// Error to represent invalid hydrodynamics data during primitive variable
/// recovery or a half-step update.
#[derive(Clone, Copy, Debug)]
pub enum Error {
    NonPositiveDensity(f64),
    NonPositivePressure(f64),
    NonPositiveHalfStepDensity(f64),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;

        match self {
            NonPositiveDensity(d) => write!(fmt, "non-positive mass density: {}", d),
            NonPositivePressure(p) => write!(fmt, "non-positive gas pressure: {}", p),
            NonPositiveHalfStepDensity(d) => {
                write!(fmt, "non-positive half-step mass density: {}", d)
            }
        }
    }
}

impl error::Error for Error {}
