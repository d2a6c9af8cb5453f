use crate::array3::Array3;
use crate::hydro::Conserved;

/// Number of ghost layers carried on every face of a tile. Four layers
/// cover the widest stencil of the unsplit corrector.
pub const NGHOST: usize = 4;

/// One tile of the structured Cartesian mesh, owned by one rank. Arrays
/// are sized with `NGHOST` layers on each side of every dimension that
/// extends (a 2D tile carries no x3 ghosts); `(is..=ie, js..=je, ks..=ke)`
/// index only the active zones.
///
/// The face-centered field `b1i[(k, j, i)]` lies on the lower-x1 face of
/// cell `(i, j, k)`, and analogously for `b2i`/`b3i`. The upper face of the
/// last cell in each direction is addressed as index `ie + 1` (etc.),
/// which always exists inside the ghost region.
#[derive(Clone)]
pub struct Grid {
    pub nx1: usize,
    pub nx2: usize,
    pub nx3: usize,
    pub is: usize,
    pub ie: usize,
    pub js: usize,
    pub je: usize,
    pub ks: usize,
    pub ke: usize,
    pub dx1: f64,
    pub dx2: f64,
    pub dx3: f64,
    /// Lower edge of the global domain (not of this tile).
    pub x1min: f64,
    pub x2min: f64,
    pub x3min: f64,
    /// Global cell displacement of this tile within the domain.
    pub idisp: i64,
    pub jdisp: i64,
    pub kdisp: i64,
    /// Active zones of the whole domain (equal to the tile extents when
    /// the run is not decomposed).
    pub gnx1: usize,
    pub gnx2: usize,
    pub gnx3: usize,
    pub time: f64,
    pub dt: f64,
    /// Neighbor ranks on the six faces; negative where the face is a
    /// physical boundary.
    pub lx1: i64,
    pub rx1: i64,
    pub lx2: i64,
    pub rx2: i64,
    pub lx3: i64,
    pub rx3: i64,
    pub u: Array3<Conserved>,
    pub b1i: Array3<f64>,
    pub b2i: Array3<f64>,
    pub b3i: Array3<f64>,
}

impl Grid {
    /// Create a tile with the given number of active zones, cell spacing,
    /// and global domain origin. All neighbors default to physical
    /// boundaries; decomposed runs assign ranks and displacements after
    /// construction.
    pub fn new(nx: (usize, usize, usize), dx: (f64, f64, f64), origin: (f64, f64, f64)) -> Self {
        let (nx1, nx2, nx3) = nx;
        assert!(
            nx1 >= NGHOST && nx2 >= NGHOST && (nx3 == 1 || nx3 >= NGHOST),
            "a tile needs at least {} zones in each extended direction",
            NGHOST
        );

        let n1 = nx1 + 2 * NGHOST;
        let n2 = nx2 + 2 * NGHOST;
        let n3 = if nx3 > 1 { nx3 + 2 * NGHOST } else { 1 };
        let ks = if nx3 > 1 { NGHOST } else { 0 };

        Self {
            nx1,
            nx2,
            nx3,
            is: NGHOST,
            ie: NGHOST + nx1 - 1,
            js: NGHOST,
            je: NGHOST + nx2 - 1,
            ks,
            ke: ks + nx3 - 1,
            dx1: dx.0,
            dx2: dx.1,
            dx3: dx.2,
            x1min: origin.0,
            x2min: origin.1,
            x3min: origin.2,
            idisp: 0,
            jdisp: 0,
            kdisp: 0,
            gnx1: nx1,
            gnx2: nx2,
            gnx3: nx3,
            time: 0.0,
            dt: 0.0,
            lx1: -1,
            rx1: -1,
            lx2: -1,
            rx2: -1,
            lx3: -1,
            rx3: -1,
            u: Array3::zeros(n3, n2, n1),
            b1i: Array3::zeros(n3, n2, n1),
            b2i: Array3::zeros(n3, n2, n1),
            b3i: Array3::zeros(n3, n2, n1),
        }
    }

    pub fn three_d(&self) -> bool {
        self.nx3 > 1
    }

    /// Total extents of the arrays, ghosts included.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.u.dim()
    }

    /// Position of the center of cell `(i, j, k)` in global coordinates.
    pub fn cc_pos(&self, i: usize, j: usize, k: usize) -> (f64, f64, f64) {
        let x1 = self.x1min + ((i as i64 - self.is as i64 + self.idisp) as f64 + 0.5) * self.dx1;
        let x2 = self.x2min + ((j as i64 - self.js as i64 + self.jdisp) as f64 + 0.5) * self.dx2;
        let x3 = self.x3min + ((k as i64 - self.ks as i64 + self.kdisp) as f64 + 0.5) * self.dx3;
        (x1, x2, x3)
    }

    /// Initialize the conservative state from a function of position.
    pub fn init_state<F>(&mut self, f: F)
    where
        F: Fn(f64, f64, f64) -> Conserved,
    {
        let (n3, n2, n1) = self.dim();
        for k in 0..n3 {
            for j in 0..n2 {
                for i in 0..n1 {
                    let (x1, x2, x3) = self.cc_pos(i, j, k);
                    self.u[(k, j, i)] = f(x1, x2, x3);
                }
            }
        }
    }

    /// Initialize the face-centered fields from functions of the face
    /// position, then set the cell-centered fields to the face averages.
    pub fn init_faces<F1, F2, F3>(&mut self, f1: F1, f2: F2, f3: F3)
    where
        F1: Fn(f64, f64, f64) -> f64,
        F2: Fn(f64, f64, f64) -> f64,
        F3: Fn(f64, f64, f64) -> f64,
    {
        let (n3, n2, n1) = self.dim();
        let hd1 = 0.5 * self.dx1;
        let hd2 = 0.5 * self.dx2;
        let hd3 = 0.5 * self.dx3;
        for k in 0..n3 {
            for j in 0..n2 {
                for i in 0..n1 {
                    let (x1, x2, x3) = self.cc_pos(i, j, k);
                    self.b1i[(k, j, i)] = f1(x1 - hd1, x2, x3);
                    self.b2i[(k, j, i)] = f2(x1, x2 - hd2, x3);
                    self.b3i[(k, j, i)] = if self.three_d() {
                        f3(x1, x2, x3 - hd3)
                    } else {
                        f3(x1, x2, x3)
                    };
                }
            }
        }
        self.sync_cell_fields();
    }

    /// Set the cell-centered field components to the average of the two
    /// bounding faces, which is their defining relation.
    pub fn sync_cell_fields(&mut self) {
        let three_d = self.three_d();
        for k in self.ks..=self.ke {
            for j in self.js..=self.je {
                for i in self.is..=self.ie {
                    let u = &mut self.u[(k, j, i)];
                    u.b1c = 0.5 * (self.b1i[(k, j, i)] + self.b1i[(k, j, i + 1)]);
                    u.b2c = 0.5 * (self.b2i[(k, j, i)] + self.b2i[(k, j + 1, i)]);
                    u.b3c = if three_d {
                        0.5 * (self.b3i[(k, j, i)] + self.b3i[(k + 1, j, i)])
                    } else {
                        self.b3i[(k, j, i)]
                    };
                }
            }
        }
    }

    /// Largest magnitude of the face-centered field divergence over the
    /// active zones. Constrained transport keeps this at round-off.
    pub fn max_divb(&self) -> f64 {
        let mut dmax = 0.0_f64;
        for k in self.ks..=self.ke {
            for j in self.js..=self.je {
                for i in self.is..=self.ie {
                    let mut div = (self.b1i[(k, j, i + 1)] - self.b1i[(k, j, i)]) / self.dx1
                        + (self.b2i[(k, j + 1, i)] - self.b2i[(k, j, i)]) / self.dx2;
                    if self.three_d() {
                        div += (self.b3i[(k + 1, j, i)] - self.b3i[(k, j, i)]) / self.dx3;
                    }
                    dmax = dmax.max(div.abs());
                }
            }
        }
        dmax
    }

    /// Global sum of the mass density over active zones.
    pub fn total_mass(&self) -> f64 {
        let mut sum = 0.0;
        for k in self.ks..=self.ke {
            for j in self.js..=self.je {
                for i in self.is..=self.ie {
                    sum += self.u[(k, j, i)].d;
                }
            }
        }
        sum
    }

    /// Global sum of the total energy over active zones.
    pub fn total_energy(&self) -> f64 {
        let mut sum = 0.0;
        for k in self.ks..=self.ke {
            for j in self.js..=self.je {
                for i in self.is..=self.ie {
                    sum += self.u[(k, j, i)].e;
                }
            }
        }
        sum
    }
}
