//! Corner integration of the edge EMFs driving the constrained-transport
//! update. Each cell edge collects the four adjacent face-flux EMFs (two
//! per transverse sweep) plus four upwind derivative corrections, each the
//! difference between a face-flux EMF and the cell-centered EMF on one
//! side of it, selected by the sign of the mass flux of the orthogonal
//! sweep; their sum is divided by four. The sign table is fixed by the
//! rotated flux bases: the x1-flux of `By` is `-E3` and the x2-flux of
//! `Bz` is `+E3`, cyclically for the other edges. This stencil is what
//! makes the face-field divergence an exact invariant of the update.

use crate::array3::Array3;
use crate::hydro::Cons1D;

/// E3, on the x3-aligned edge at the lower-x1, lower-x2 corner of cell
/// `(i, j, k)`. `fx1`/`fx2` are the transverse face fluxes, `cc` the
/// cell-centered E3 estimator.
#[allow(clippy::too_many_arguments)]
pub fn integrate_emf3(
    fx1: &Array3<Cons1D>,
    fx2: &Array3<Cons1D>,
    cc: &Array3<f64>,
    out: &mut Array3<f64>,
    krange: (usize, usize),
    jrange: (usize, usize),
    irange: (usize, usize),
) {
    for k in krange.0..=krange.1 {
        for j in jrange.0..=jrange.1 {
            for i in irange.0..=irange.1 {
                let l2 = if fx1[(k, j - 1, i)].d > 0.0 {
                    fx2[(k, j, i - 1)].bz - cc[(k, j - 1, i - 1)]
                } else if fx1[(k, j - 1, i)].d < 0.0 {
                    fx2[(k, j, i)].bz - cc[(k, j - 1, i)]
                } else {
                    0.5 * (fx2[(k, j, i - 1)].bz - cc[(k, j - 1, i - 1)] + fx2[(k, j, i)].bz
                        - cc[(k, j - 1, i)])
                };
                let emf_l2 = -fx1[(k, j - 1, i)].by + l2;

                let r2 = if fx1[(k, j, i)].d > 0.0 {
                    fx2[(k, j, i - 1)].bz - cc[(k, j, i - 1)]
                } else if fx1[(k, j, i)].d < 0.0 {
                    fx2[(k, j, i)].bz - cc[(k, j, i)]
                } else {
                    0.5 * (fx2[(k, j, i - 1)].bz - cc[(k, j, i - 1)] + fx2[(k, j, i)].bz
                        - cc[(k, j, i)])
                };
                let emf_r2 = -fx1[(k, j, i)].by + r2;

                let l1 = if fx2[(k, j, i - 1)].d > 0.0 {
                    -fx1[(k, j - 1, i)].by - cc[(k, j - 1, i - 1)]
                } else if fx2[(k, j, i - 1)].d < 0.0 {
                    -fx1[(k, j, i)].by - cc[(k, j, i - 1)]
                } else {
                    0.5 * (-fx1[(k, j - 1, i)].by - cc[(k, j - 1, i - 1)] - fx1[(k, j, i)].by
                        - cc[(k, j, i - 1)])
                };
                let emf_l1 = fx2[(k, j, i - 1)].bz + l1;

                let r1 = if fx2[(k, j, i)].d > 0.0 {
                    -fx1[(k, j - 1, i)].by - cc[(k, j - 1, i)]
                } else if fx2[(k, j, i)].d < 0.0 {
                    -fx1[(k, j, i)].by - cc[(k, j, i)]
                } else {
                    0.5 * (-fx1[(k, j - 1, i)].by - cc[(k, j - 1, i)] - fx1[(k, j, i)].by
                        - cc[(k, j, i)])
                };
                let emf_r1 = fx2[(k, j, i)].bz + r1;

                out[(k, j, i)] = 0.25 * (emf_l1 + emf_r1 + emf_l2 + emf_r2);
            }
        }
    }
}

/// E1, on the x1-aligned edge at the lower-x2, lower-x3 corner: the
/// x2-flux of `By` is `-E1`, the x3-flux of `Bz` is `+E1`.
#[allow(clippy::too_many_arguments)]
pub fn integrate_emf1(
    fx2: &Array3<Cons1D>,
    fx3: &Array3<Cons1D>,
    cc: &Array3<f64>,
    out: &mut Array3<f64>,
    krange: (usize, usize),
    jrange: (usize, usize),
    irange: (usize, usize),
) {
    for k in krange.0..=krange.1 {
        for j in jrange.0..=jrange.1 {
            for i in irange.0..=irange.1 {
                let l3 = if fx2[(k - 1, j, i)].d > 0.0 {
                    fx3[(k, j - 1, i)].bz - cc[(k - 1, j - 1, i)]
                } else if fx2[(k - 1, j, i)].d < 0.0 {
                    fx3[(k, j, i)].bz - cc[(k - 1, j, i)]
                } else {
                    0.5 * (fx3[(k, j - 1, i)].bz - cc[(k - 1, j - 1, i)] + fx3[(k, j, i)].bz
                        - cc[(k - 1, j, i)])
                };
                let emf_l3 = -fx2[(k - 1, j, i)].by + l3;

                let r3 = if fx2[(k, j, i)].d > 0.0 {
                    fx3[(k, j - 1, i)].bz - cc[(k, j - 1, i)]
                } else if fx2[(k, j, i)].d < 0.0 {
                    fx3[(k, j, i)].bz - cc[(k, j, i)]
                } else {
                    0.5 * (fx3[(k, j - 1, i)].bz - cc[(k, j - 1, i)] + fx3[(k, j, i)].bz
                        - cc[(k, j, i)])
                };
                let emf_r3 = -fx2[(k, j, i)].by + r3;

                let l2 = if fx3[(k, j - 1, i)].d > 0.0 {
                    -fx2[(k - 1, j, i)].by - cc[(k - 1, j - 1, i)]
                } else if fx3[(k, j - 1, i)].d < 0.0 {
                    -fx2[(k, j, i)].by - cc[(k, j - 1, i)]
                } else {
                    0.5 * (-fx2[(k - 1, j, i)].by - cc[(k - 1, j - 1, i)] - fx2[(k, j, i)].by
                        - cc[(k, j - 1, i)])
                };
                let emf_l2 = fx3[(k, j - 1, i)].bz + l2;

                let r2 = if fx3[(k, j, i)].d > 0.0 {
                    -fx2[(k - 1, j, i)].by - cc[(k - 1, j, i)]
                } else if fx3[(k, j, i)].d < 0.0 {
                    -fx2[(k, j, i)].by - cc[(k, j, i)]
                } else {
                    0.5 * (-fx2[(k - 1, j, i)].by - cc[(k - 1, j, i)] - fx2[(k, j, i)].by
                        - cc[(k, j, i)])
                };
                let emf_r2 = fx3[(k, j, i)].bz + r2;

                out[(k, j, i)] = 0.25 * (emf_l2 + emf_r2 + emf_l3 + emf_r3);
            }
        }
    }
}

/// E2, on the x2-aligned edge at the lower-x3, lower-x1 corner: the
/// x3-flux of `By` is `-E2`, the x1-flux of `Bz` is `+E2`.
#[allow(clippy::too_many_arguments)]
pub fn integrate_emf2(
    fx3: &Array3<Cons1D>,
    fx1: &Array3<Cons1D>,
    cc: &Array3<f64>,
    out: &mut Array3<f64>,
    krange: (usize, usize),
    jrange: (usize, usize),
    irange: (usize, usize),
) {
    for k in krange.0..=krange.1 {
        for j in jrange.0..=jrange.1 {
            for i in irange.0..=irange.1 {
                let l1 = if fx3[(k, j, i - 1)].d > 0.0 {
                    fx1[(k - 1, j, i)].bz - cc[(k - 1, j, i - 1)]
                } else if fx3[(k, j, i - 1)].d < 0.0 {
                    fx1[(k, j, i)].bz - cc[(k, j, i - 1)]
                } else {
                    0.5 * (fx1[(k - 1, j, i)].bz - cc[(k - 1, j, i - 1)] + fx1[(k, j, i)].bz
                        - cc[(k, j, i - 1)])
                };
                let emf_l1 = -fx3[(k, j, i - 1)].by + l1;

                let r1 = if fx3[(k, j, i)].d > 0.0 {
                    fx1[(k - 1, j, i)].bz - cc[(k - 1, j, i)]
                } else if fx3[(k, j, i)].d < 0.0 {
                    fx1[(k, j, i)].bz - cc[(k, j, i)]
                } else {
                    0.5 * (fx1[(k - 1, j, i)].bz - cc[(k - 1, j, i)] + fx1[(k, j, i)].bz
                        - cc[(k, j, i)])
                };
                let emf_r1 = -fx3[(k, j, i)].by + r1;

                let l3 = if fx1[(k - 1, j, i)].d > 0.0 {
                    -fx3[(k, j, i - 1)].by - cc[(k - 1, j, i - 1)]
                } else if fx1[(k - 1, j, i)].d < 0.0 {
                    -fx3[(k, j, i)].by - cc[(k - 1, j, i)]
                } else {
                    0.5 * (-fx3[(k, j, i - 1)].by - cc[(k - 1, j, i - 1)] - fx3[(k, j, i)].by
                        - cc[(k - 1, j, i)])
                };
                let emf_l3 = fx1[(k - 1, j, i)].bz + l3;

                let r3 = if fx1[(k, j, i)].d > 0.0 {
                    -fx3[(k, j, i - 1)].by - cc[(k, j, i - 1)]
                } else if fx1[(k, j, i)].d < 0.0 {
                    -fx3[(k, j, i)].by - cc[(k, j, i)]
                } else {
                    0.5 * (-fx3[(k, j, i - 1)].by - cc[(k, j, i - 1)] - fx3[(k, j, i)].by
                        - cc[(k, j, i)])
                };
                let emf_r3 = fx1[(k, j, i)].bz + r3;

                out[(k, j, i)] = 0.25 * (emf_l1 + emf_r1 + emf_l3 + emf_r3);
            }
        }
    }
}
