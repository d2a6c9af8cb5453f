use std::ops::{Add, Div, Mul, Sub};

pub use self::error::Error;

pub mod error;
pub mod reconstruct;
pub mod riemann;
pub mod sweep;

/// Compile-time cap on the number of passive scalar species. The runtime
/// count lives in the feature configuration and must not exceed this.
pub const NSCALARS: usize = 2;

/// Number of reconstructed primitive components: d, three velocities,
/// pressure, two tangential fields, plus scalar concentrations.
pub const NWAVE: usize = 7 + NSCALARS;

// ============================================================================
#[derive(Clone, Copy, Debug)]
pub enum Eos {
    Adiabatic { gamma: f64 },
    Isothermal { csound: f64 },
}

impl Eos {
    pub fn is_isothermal(&self) -> bool {
        matches!(self, Eos::Isothermal { .. })
    }

    /// Sound speed squared for the given density and pressure.
    pub fn sound_speed_squared(&self, d: f64, p: f64) -> f64 {
        match self {
            Eos::Adiabatic { gamma } => gamma * p / d,
            Eos::Isothermal { csound } => csound * csound,
        }
    }

    pub fn pressure(&self, d: f64, internal_energy: f64) -> f64 {
        match self {
            Eos::Adiabatic { gamma } => internal_energy * (gamma - 1.0),
            Eos::Isothermal { csound } => csound * csound * d,
        }
    }
}

// ============================================================================

/// The conservative state of one cell: mass density, momenta, total energy
/// (ignored under an isothermal EOS), cell-centered magnetic field (ignored
/// without MHD), and passive scalar densities.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Conserved {
    pub d: f64,
    pub m1: f64,
    pub m2: f64,
    pub m3: f64,
    pub e: f64,
    pub b1c: f64,
    pub b2c: f64,
    pub b3c: f64,
    pub s: [f64; NSCALARS],
}

/// A conservative state in the rotated basis of one sweep: `mx` is the
/// momentum normal to the interface, `by`/`bz` the tangential field
/// components. The normal field is not part of the vector; it rides along
/// as a parameter of the 1D Riemann problem.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cons1D {
    pub d: f64,
    pub mx: f64,
    pub my: f64,
    pub mz: f64,
    pub e: f64,
    pub by: f64,
    pub bz: f64,
    pub s: [f64; NSCALARS],
}

/// The primitive mirror of [`Cons1D`]. `r` holds scalar concentrations
/// (scalar density over mass density).
#[derive(Clone, Copy, Debug, Default)]
pub struct Prim1D {
    pub d: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub p: f64,
    pub by: f64,
    pub bz: f64,
    pub r: [f64; NSCALARS],
}

// ============================================================================
impl Cons1D {
    /// Recover primitives, given the interface-normal field and the EOS.
    /// Fails on non-positive density, or non-positive pressure when the
    /// EOS carries an energy equation.
    pub fn to_prim(&self, bx: f64, eos: &Eos) -> Result<Prim1D, Error> {
        if self.d <= 0.0 {
            return Err(Error::NonPositiveDensity(self.d));
        }
        let di = 1.0 / self.d;
        let vx = self.mx * di;
        let vy = self.my * di;
        let vz = self.mz * di;

        let p = match eos {
            Eos::Adiabatic { gamma } => {
                let ke = 0.5 * (self.mx * self.mx + self.my * self.my + self.mz * self.mz) * di;
                let me = 0.5 * (bx * bx + self.by * self.by + self.bz * self.bz);
                let p = (self.e - ke - me) * (gamma - 1.0);
                if p <= 0.0 {
                    return Err(Error::NonPositivePressure(p));
                }
                p
            }
            Eos::Isothermal { csound } => csound * csound * self.d,
        };

        let mut r = [0.0; NSCALARS];
        for (r, s) in r.iter_mut().zip(self.s.iter()) {
            *r = s * di;
        }

        Ok(Prim1D {
            d: self.d,
            vx,
            vy,
            vz,
            p,
            by: self.by,
            bz: self.bz,
            r,
        })
    }
}

// ============================================================================
impl Prim1D {
    pub fn to_cons(&self, bx: f64, eos: &Eos) -> Cons1D {
        let e = match eos {
            Eos::Adiabatic { gamma } => {
                self.p / (gamma - 1.0)
                    + 0.5 * self.d * (self.vx * self.vx + self.vy * self.vy + self.vz * self.vz)
                    + 0.5 * (bx * bx + self.by * self.by + self.bz * self.bz)
            }
            Eos::Isothermal { .. } => 0.0,
        };
        let mut s = [0.0; NSCALARS];
        for (s, r) in s.iter_mut().zip(self.r.iter()) {
            *s = r * self.d;
        }
        Cons1D {
            d: self.d,
            mx: self.d * self.vx,
            my: self.d * self.vy,
            mz: self.d * self.vz,
            e,
            by: self.by,
            bz: self.bz,
            s,
        }
    }

    /// The physical flux vector normal to the interface. The energy
    /// component is zero under an isothermal EOS.
    pub fn flux_vector(&self, bx: f64, eos: &Eos) -> Cons1D {
        let pt = self.p + 0.5 * (bx * bx + self.by * self.by + self.bz * self.bz);
        let u = self.to_cons(bx, eos);
        let vdotb = self.vx * bx + self.vy * self.by + self.vz * self.bz;

        let e = match eos {
            Eos::Adiabatic { .. } => (u.e + pt) * self.vx - bx * vdotb,
            Eos::Isothermal { .. } => 0.0,
        };
        let mut s = [0.0; NSCALARS];
        for (s, r) in s.iter_mut().zip(self.r.iter()) {
            *s = u.d * self.vx * r;
        }
        Cons1D {
            d: u.d * self.vx,
            mx: u.mx * self.vx + pt - bx * bx,
            my: u.my * self.vx - bx * self.by,
            mz: u.mz * self.vx - bx * self.bz,
            e,
            by: self.by * self.vx - bx * self.vy,
            bz: self.bz * self.vx - bx * self.vz,
            s,
        }
    }

    /// The fast magnetosonic speed normal to the interface. Reduces to the
    /// adiabatic (or isothermal) sound speed when the field vanishes.
    pub fn fast_speed(&self, bx: f64, eos: &Eos) -> f64 {
        let asq = eos.sound_speed_squared(self.d, self.p);
        let casq = (bx * bx + self.by * self.by + self.bz * self.bz) / self.d;
        let caxsq = bx * bx / self.d;
        let tsum = asq + casq;
        let tdif = asq - casq;
        let cfsq = 0.5 * (tsum + (tdif * tdif + 4.0 * asq * (casq - caxsq)).sqrt());
        cfsq.max(0.0).sqrt()
    }

    pub fn max_signal_speed(&self, bx: f64, eos: &Eos) -> f64 {
        self.vx.abs() + self.fast_speed(bx, eos)
    }

    pub fn as_array(&self) -> [f64; NWAVE] {
        let mut a = [0.0; NWAVE];
        a[0] = self.d;
        a[1] = self.vx;
        a[2] = self.vy;
        a[3] = self.vz;
        a[4] = self.p;
        a[5] = self.by;
        a[6] = self.bz;
        a[7..].copy_from_slice(&self.r);
        a
    }

    pub fn from_array(a: &[f64; NWAVE]) -> Self {
        let mut r = [0.0; NSCALARS];
        r.copy_from_slice(&a[7..]);
        Self {
            d: a[0],
            vx: a[1],
            vy: a[2],
            vz: a[3],
            p: a[4],
            by: a[5],
            bz: a[6],
            r,
        }
    }
}

// ============================================================================
impl Add<Cons1D> for Cons1D {
    type Output = Cons1D;
    fn add(self, u: Self) -> Cons1D {
        let mut s = [0.0; NSCALARS];
        for n in 0..NSCALARS {
            s[n] = self.s[n] + u.s[n];
        }
        Cons1D {
            d: self.d + u.d,
            mx: self.mx + u.mx,
            my: self.my + u.my,
            mz: self.mz + u.mz,
            e: self.e + u.e,
            by: self.by + u.by,
            bz: self.bz + u.bz,
            s,
        }
    }
}

impl Sub<Cons1D> for Cons1D {
    type Output = Self;
    fn sub(self, u: Self) -> Self {
        let mut s = [0.0; NSCALARS];
        for n in 0..NSCALARS {
            s[n] = self.s[n] - u.s[n];
        }
        Self {
            d: self.d - u.d,
            mx: self.mx - u.mx,
            my: self.my - u.my,
            mz: self.mz - u.mz,
            e: self.e - u.e,
            by: self.by - u.by,
            bz: self.bz - u.bz,
            s,
        }
    }
}

impl Mul<f64> for Cons1D {
    type Output = Self;
    fn mul(self, a: f64) -> Self {
        let mut s = [0.0; NSCALARS];
        for n in 0..NSCALARS {
            s[n] = self.s[n] * a;
        }
        Self {
            d: self.d * a,
            mx: self.mx * a,
            my: self.my * a,
            mz: self.mz * a,
            e: self.e * a,
            by: self.by * a,
            bz: self.bz * a,
            s,
        }
    }
}

impl Div<f64> for Cons1D {
    type Output = Self;
    fn div(self, a: f64) -> Self {
        self * (1.0 / a)
    }
}

// ============================================================================

/// The limited field derivative used by the multidimensional MHD source
/// terms: the minmod of the sweep-parallel derivative with the negated
/// perpendicular one. Zero whenever the two derivatives share a sign, so
/// the source never amplifies a genuine divergence error.
pub fn minmod_db(db_par: f64, db_perp: f64) -> f64 {
    if db_par >= 0.0 {
        db_par.min(-db_perp).max(0.0)
    } else {
        db_par.max(-db_perp).min(0.0)
    }
}
