use crate::config::{Features, QSHEAR};
use crate::grid::{Grid, NGHOST};
use crate::hydro::{Conserved, NSCALARS};

/// Shearing-sheet hooks, run on the two outermost-x1 tiles after the
/// periodic x1 pass. The x1 ghost layers were filled from the opposite
/// radial edge of the box; they are remapped in x2 by the accumulated
/// shear displacement `q Omega Lx t` (integer cell shift plus linear
/// interpolation of the remainder) and their azimuthal momentum picks up
/// the `q Omega Lx` background-shear jump across the seam.
///
/// The remap never touches the interface field column at `ie+1`: that
/// face belongs to the local tile's CT update, and the receive path
/// leaves it alone under shearing for the same reason.
pub fn sheet_ix1(grid: &mut Grid, features: &Features) {
    remap_ghosts(grid, features, true)
}

pub fn sheet_ox1(grid: &mut Grid, features: &Features) {
    remap_ghosts(grid, features, false)
}

fn remap_ghosts(grid: &mut Grid, features: &Features, inner: bool) {
    let sb = features.shearing_box.expect("shearing-sheet hook without shearing box");
    let lx = grid.gnx1 as f64 * grid.dx1;
    let ly = grid.gnx2 as f64 * grid.dx2;
    let qoml = QSHEAR * sb.omega * lx;
    let deltay = (qoml * grid.time).rem_euclid(ly);
    let joffset = (deltay / grid.dx2).floor() as i64;
    let eps = deltay / grid.dx2 - joffset as f64;

    let (js, je) = (grid.js, grid.je);
    let nx2 = grid.nx2 as i64;
    let wrap = |j: i64| -> usize { (j - js as i64).rem_euclid(nx2) as usize + js };
    let donors = |j: usize| -> (usize, usize) {
        if inner {
            (wrap(j as i64 + joffset), wrap(j as i64 + joffset + 1))
        } else {
            (wrap(j as i64 - joffset), wrap(j as i64 - joffset - 1))
        }
    };

    let cell_cols: Vec<usize> = if inner {
        (grid.is - NGHOST..grid.is).collect()
    } else {
        (grid.ie + 1..=grid.ie + NGHOST).collect()
    };
    let msign = if inner { 1.0 } else { -1.0 };
    let energy = !features.eos.is_isothermal();

    let mut urow = vec![Conserved::default(); je + 1];
    let mut frow = vec![0.0; je + 1];

    for k in grid.ks..=grid.ke {
        for &i in &cell_cols {
            for j in js..=je {
                urow[j] = grid.u[(k, j, i)];
            }
            for j in js..=je {
                let (ja, jb) = donors(j);
                let mut q = lerp(&urow[ja], &urow[jb], eps);
                let m2 = q.m2;
                q.m2 += msign * qoml * q.d;
                if energy {
                    q.e += 0.5 * (q.m2 * q.m2 - m2 * m2) / q.d;
                }
                grid.u[(k, j, i)] = q;
            }

            if features.mhd {
                for (f, seam_guard) in [(1_usize, true), (2, false), (3, false)] {
                    // the shared normal face at ie+1 stays with its owner
                    if seam_guard && !inner && i == grid.ie + 1 {
                        continue;
                    }
                    for j in js..=je {
                        frow[j] = match f {
                            1 => grid.b1i[(k, j, i)],
                            2 => grid.b2i[(k, j, i)],
                            _ => grid.b3i[(k, j, i)],
                        };
                    }
                    for j in js..=je {
                        let (ja, jb) = donors(j);
                        let v = (1.0 - eps) * frow[ja] + eps * frow[jb];
                        match f {
                            1 => grid.b1i[(k, j, i)] = v,
                            2 => grid.b2i[(k, j, i)] = v,
                            _ => grid.b3i[(k, j, i)] = v,
                        }
                    }
                }
            }
        }
    }
}

fn lerp(a: &Conserved, b: &Conserved, eps: f64) -> Conserved {
    let w = 1.0 - eps;
    let mut s = [0.0; NSCALARS];
    for n in 0..NSCALARS {
        s[n] = w * a.s[n] + eps * b.s[n];
    }
    Conserved {
        d: w * a.d + eps * b.d,
        m1: w * a.m1 + eps * b.m1,
        m2: w * a.m2 + eps * b.m2,
        m3: w * a.m3 + eps * b.m3,
        e: w * a.e + eps * b.e,
        b1c: w * a.b1c + eps * b.b1c,
        b2c: w * a.b2c + eps * b.b2c,
        b3c: w * a.b3c + eps * b.b3c,
        s,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::ShearingBox;
    use crate::hydro::Eos;

    fn shear_features(omega: f64) -> Features {
        let mut f = Features::mhd(5.0 / 3.0);
        f.eos = Eos::Isothermal { csound: 1.0 };
        f.shearing_box = Some(ShearingBox { omega });
        f
    }

    fn ghost_filled_grid() -> Grid {
        let mut g = Grid::new((8, 8, 1), (0.125, 0.125, 1.0), (-0.5, 0.0, 0.0));
        g.init_state(|x1, x2, _| Conserved {
            d: 1.0,
            m2: (x2 * 10.0).sin(),
            m3: (x2 * 7.0).cos(),
            b3c: x1 + x2,
            ..Default::default()
        });
        g
    }

    #[test]
    fn zero_time_remap_only_shifts_momentum() {
        let mut g = ghost_filled_grid();
        let f = shear_features(1.0);
        let before = g.u[(g.ks, g.js + 2, g.is - 1)];
        sheet_ix1(&mut g, &f);
        let after = g.u[(g.ks, g.js + 2, g.is - 1)];
        let qoml = QSHEAR * 1.0 * 1.0; // q Omega Lx with Lx = 8 * 0.125
        assert!((after.m2 - (before.m2 + qoml * before.d)).abs() < 1e-14);
        assert_eq!(after.d, before.d);
    }

    #[test]
    fn integer_offset_shifts_whole_cells() {
        let mut g = ghost_filled_grid();
        let f = shear_features(1.0);
        // deltay = q * Omega * Lx * t = 2 * dx2 when t = 2*dx2/(q*Lx)
        g.time = 2.0 * 0.125 / (QSHEAR * 1.0);
        let before: Vec<_> = (g.js..=g.je).map(|j| g.u[(g.ks, j, g.is - 2)]).collect();
        sheet_ix1(&mut g, &f);
        for j in g.js..=g.je {
            let donor = (j - g.js + 2) % g.nx2 + g.js;
            let got = g.u[(g.ks, j, g.is - 2)];
            let want = before[donor - g.js];
            assert!((got.m3 - want.m3).abs() < 1e-14);
            assert!((got.b3c - want.b3c).abs() < 1e-14);
        }
    }

    #[test]
    fn outer_seam_face_is_left_alone() {
        let mut g = ghost_filled_grid();
        let f = shear_features(1.0);
        g.init_faces(|x1, x2, _| x1 + x2, |x1, x2, _| x1 * x2, |_, _, _| 0.0);
        g.time = 0.31;
        let seam: Vec<_> = (g.js..=g.je).map(|j| g.b1i[(g.ks, j, g.ie + 1)]).collect();
        sheet_ox1(&mut g, &f);
        for (m, j) in (g.js..=g.je).enumerate() {
            assert_eq!(g.b1i[(g.ks, j, g.ie + 1)], seam[m]);
        }
        // ghost faces one column out were remapped with the momentum jump
        assert!(g.u[(g.ks, g.js, g.ie + 2)].m2 != 0.0);
    }
}
