use super::{Prim1D, NWAVE};

/// Interface for the L/R state reconstruction consumed by the integrator.
/// `wl[i]` and `wr[i]` are the states on either side of the interface
/// between cells `i-1` and `i`; implementations must fill every face in
/// `lo..=hi` and may read cells `lo-2..=hi+1`.
///
/// `bxc` carries the cell-centered normal field and `dt`/`dtodx` the time
/// step, for schemes that trace characteristics over the half step; the
/// simple schemes here ignore them.
pub trait Reconstruction {
    #[allow(clippy::too_many_arguments)]
    fn lr_states(
        &self,
        w: &[Prim1D],
        bxc: &[f64],
        dt: f64,
        dtodx: f64,
        lo: usize,
        hi: usize,
        wl: &mut [Prim1D],
        wr: &mut [Prim1D],
    );
}

/// First-order donor cell states.
pub struct DonorCell;

impl Reconstruction for DonorCell {
    fn lr_states(
        &self,
        w: &[Prim1D],
        _bxc: &[f64],
        _dt: f64,
        _dtodx: f64,
        lo: usize,
        hi: usize,
        wl: &mut [Prim1D],
        wr: &mut [Prim1D],
    ) {
        for i in lo..=hi {
            wl[i] = w[i - 1];
            wr[i] = w[i];
        }
    }
}

/// Second-order piecewise linear states with the monotonized central
/// limiter applied component-wise in the primitive variables. Slopes
/// vanish at extrema, so no face value falls outside the range of its
/// neighboring cell averages.
pub struct PiecewiseLinear;

impl PiecewiseLinear {
    fn limited_slope(wm: f64, w0: f64, wp: f64) -> f64 {
        let dwl = w0 - wm;
        let dwr = wp - w0;
        if dwl * dwr <= 0.0 {
            0.0
        } else {
            let dwc = 0.5 * (dwl + dwr);
            let lim = (2.0 * dwl.abs()).min(2.0 * dwr.abs()).min(dwc.abs());
            lim * dwc.signum()
        }
    }
}

impl Reconstruction for PiecewiseLinear {
    fn lr_states(
        &self,
        w: &[Prim1D],
        _bxc: &[f64],
        _dt: f64,
        _dtodx: f64,
        lo: usize,
        hi: usize,
        wl: &mut [Prim1D],
        wr: &mut [Prim1D],
    ) {
        for c in lo - 1..=hi {
            let wm = w[c - 1].as_array();
            let w0 = w[c].as_array();
            let wp = w[c + 1].as_array();

            let mut left = [0.0; NWAVE];
            let mut right = [0.0; NWAVE];
            for n in 0..NWAVE {
                let dw = Self::limited_slope(wm[n], w0[n], wp[n]);
                right[n] = w0[n] - 0.5 * dw;
                left[n] = w0[n] + 0.5 * dw;
            }
            // cell c donates its right-face value to the face above and
            // its left-face value to the face below
            if c >= lo {
                wr[c] = Prim1D::from_array(&right);
            }
            if c + 1 <= hi {
                wl[c + 1] = Prim1D::from_array(&left);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(d: &[f64]) -> Vec<Prim1D> {
        d.iter()
            .map(|&d| Prim1D {
                d,
                p: 1.0,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn donor_cell_copies_neighbors() {
        let w = row(&[1.0, 2.0, 3.0, 4.0]);
        let mut wl = vec![Prim1D::default(); 4];
        let mut wr = vec![Prim1D::default(); 4];
        DonorCell.lr_states(&w, &[0.0; 4], 0.1, 1.0, 1, 3, &mut wl, &mut wr);
        assert_eq!(wl[2].d, 2.0);
        assert_eq!(wr[2].d, 3.0);
    }

    #[test]
    fn plm_is_exact_on_linear_data() {
        let w = row(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut wl = vec![Prim1D::default(); 5];
        let mut wr = vec![Prim1D::default(); 5];
        PiecewiseLinear.lr_states(&w, &[0.0; 5], 0.1, 1.0, 2, 3, &mut wl, &mut wr);
        assert!((wl[2].d - 2.5).abs() < 1e-14);
        assert!((wr[2].d - 2.5).abs() < 1e-14);
    }

    #[test]
    fn plm_keeps_face_values_bounded() {
        let w = row(&[1.0, 5.0, 2.0, 8.0, 1.0, 1.5, 9.0]);
        let n = w.len();
        let mut wl = vec![Prim1D::default(); n];
        let mut wr = vec![Prim1D::default(); n];
        PiecewiseLinear.lr_states(&w, &vec![0.0; n], 0.1, 1.0, 2, n - 2, &mut wl, &mut wr);
        for i in 2..=n - 2 {
            let lo = w[i - 1].d.min(w[i].d);
            let hi = w[i - 1].d.max(w[i].d);
            assert!(wl[i].d >= lo - 1e-14 && wl[i].d <= hi + 1e-14);
            assert!(wr[i].d >= lo - 1e-14 && wr[i].d <= hi + 1e-14);
        }
    }

    #[test]
    fn plm_slopes_vanish_at_extrema() {
        let w = row(&[1.0, 3.0, 1.0, 1.0]);
        let mut wl = vec![Prim1D::default(); 4];
        let mut wr = vec![Prim1D::default(); 4];
        PiecewiseLinear.lr_states(&w, &[0.0; 4], 0.1, 1.0, 2, 2, &mut wl, &mut wr);
        // cell 1 is a maximum: its donated left state is its average
        assert_eq!(wl[2].d, 3.0);
    }
}
