use super::{Cons1D, Conserved};

/// One of the three sweep directions of the unsplit integrator. Each sweep
/// solves 1D Riemann problems along its axis in a rotated basis, so the
/// sweep owns the permutation between local `(mx, my, mz)` / `(by, bz)`
/// components and the global grid components:
///
/// | Sweep | momenta            | tangential fields |
/// |-------|--------------------|-------------------|
/// | X1    | (m1, m2, m3)       | (b2, b3)          |
/// | X2    | (m2, m3, m1)       | (b3, b1)          |
/// | X3    | (m3, m1, m2)       | (b1, b2)          |
///
/// Applying a flux back onto the grid uses the inverse permutation; the
/// integrator spells those accesses out per sweep, since each one touches
/// a different set of neighbor indices as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sweep {
    X1,
    X2,
    X3,
}

impl Sweep {
    /// Name used to tag errors with the sweep that produced them.
    pub fn label(&self) -> &'static str {
        match self {
            Sweep::X1 => "x1",
            Sweep::X2 => "x2",
            Sweep::X3 => "x3",
        }
    }

    /// Gather a cell-centered state into this sweep's rotated basis.
    pub fn gather(&self, u: &Conserved) -> Cons1D {
        let (mx, my, mz, by, bz) = match self {
            Sweep::X1 => (u.m1, u.m2, u.m3, u.b2c, u.b3c),
            Sweep::X2 => (u.m2, u.m3, u.m1, u.b3c, u.b1c),
            Sweep::X3 => (u.m3, u.m1, u.m2, u.b1c, u.b2c),
        };
        Cons1D {
            d: u.d,
            mx,
            my,
            mz,
            e: u.e,
            by,
            bz,
            s: u.s,
        }
    }
}
