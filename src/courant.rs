use crate::config::Features;
use crate::grid::Grid;
use crate::hydro::{Eos, Prim1D};
use crate::message::comm::{ceil_log2, Communicator};
use crate::message::{recv_matching, Envelope, DT_REDUCE_TAG};

/// Compute the CFL-limited time step for this tile and reduce it to the
/// global minimum across all ranks, so that every tile advances by the
/// identical `dt`. `sequence` counts the reductions (one per step) and
/// keeps frames from a rank running ahead out of the current round.
pub fn new_dt<C: Communicator + ?Sized>(
    grid: &Grid,
    features: &Features,
    comm: &C,
    sequence: u64,
) -> f64 {
    reduce_min(comm, local_dt(grid, features), sequence)
}

/// The largest stable step for the local tile: the Courant number times
/// the minimum over directions of spacing over peak signal speed.
pub fn local_dt(grid: &Grid, features: &Features) -> f64 {
    let eos = features.eos;
    let mut v1max = 0.0_f64;
    let mut v2max = 0.0_f64;
    let mut v3max = 0.0_f64;

    for k in grid.ks..=grid.ke {
        for j in grid.js..=grid.je {
            for i in grid.is..=grid.ie {
                let u = &grid.u[(k, j, i)];
                let di = 1.0 / u.d;
                let (v1, v2, v3) = (u.m1 * di, u.m2 * di, u.m3 * di);
                let p = match eos {
                    Eos::Adiabatic { .. } => {
                        let ke = 0.5 * (u.m1 * u.m1 + u.m2 * u.m2 + u.m3 * u.m3) * di;
                        let me = 0.5 * (u.b1c * u.b1c + u.b2c * u.b2c + u.b3c * u.b3c);
                        eos.pressure(u.d, u.e - ke - me).max(0.0)
                    }
                    Eos::Isothermal { .. } => eos.pressure(u.d, 0.0),
                };

                let w1 = Prim1D {
                    d: u.d,
                    vx: v1,
                    vy: v2,
                    vz: v3,
                    p,
                    by: u.b2c,
                    bz: u.b3c,
                    ..Default::default()
                };
                v1max = v1max.max(v1.abs() + w1.fast_speed(u.b1c, &eos));

                let w2 = Prim1D {
                    by: u.b3c,
                    bz: u.b1c,
                    vx: v2,
                    ..w1
                };
                v2max = v2max.max(v2.abs() + w2.fast_speed(u.b2c, &eos));

                if grid.three_d() {
                    let w3 = Prim1D {
                        by: u.b1c,
                        bz: u.b2c,
                        vx: v3,
                        ..w1
                    };
                    v3max = v3max.max(v3.abs() + w3.fast_speed(u.b3c, &eos));
                }
            }
        }
    }

    let mut dt = (grid.dx1 / v1max).min(grid.dx2 / v2max);
    if grid.three_d() {
        dt = dt.min(grid.dx3 / v3max);
    }
    features.cfl * dt
}

/// Binomial-tree minimum over all ranks: reduce toward rank 0, then
/// broadcast the result back out. Frames carry the reduction tag and the
/// caller's sequence number.
pub fn reduce_min<C: Communicator + ?Sized>(comm: &C, value: f64, sequence: u64) -> f64 {
    let r = comm.rank();
    let p = comm.size();
    if p == 1 {
        return value;
    }

    let send = |rank: usize, value: f64| {
        let env = Envelope::new(DT_REDUCE_TAG, sequence, value.to_le_bytes().to_vec());
        comm.send(rank, env.to_bytes());
    };
    let recv = || {
        let env = recv_matching(comm, DT_REDUCE_TAG, sequence);
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&env.data);
        f64::from_le_bytes(bytes)
    };

    // reduce toward the root
    let mut value = value;
    let mut sent = false;
    for level in 0..ceil_log2(p) {
        let one = 1 << level;
        let two = 1 << (level + 1);

        if r % two == 0 {
            if r + one < p {
                value = value.min(recv());
            }
        } else {
            send(r - one, value);
            sent = true;
            break;
        }
    }

    // broadcast back down the same tree
    if sent {
        value = recv();
    }
    for level in (0..ceil_log2(p)).rev() {
        let one = 1 << level;
        let two = 1 << (level + 1);

        if r % two == 0 && r + one < p {
            send(r + one, value);
        }
    }
    value
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Features;
    use crate::hydro::Conserved;
    use crate::message::mem::MemCommunicator;

    #[test]
    fn local_dt_scales_with_sound_crossing() {
        let mut grid = Grid::new((8, 8, 1), (0.1, 0.1, 1.0), (0.0, 0.0, 0.0));
        let features = Features {
            eos: crate::hydro::Eos::Isothermal { csound: 2.0 },
            cfl: 0.5,
            ..Features::hydro(1.4)
        };
        grid.init_state(|_, _, _| Conserved {
            d: 1.0,
            ..Default::default()
        });
        let dt = local_dt(&grid, &features);
        assert!((dt - 0.5 * 0.1 / 2.0).abs() < 1e-14);
    }

    #[test]
    fn reduce_min_agrees_on_every_rank() {
        for size in [2, 3, 4, 5, 8] {
            let group = MemCommunicator::group(size);
            let handles: Vec<_> = group
                .into_iter()
                .enumerate()
                .map(|(rank, comm)| {
                    std::thread::spawn(move || reduce_min(&comm, 1.0 + rank as f64, 0))
                })
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), 1.0);
            }
        }
    }

    #[test]
    fn successive_reductions_stay_separated() {
        let mut group = MemCommunicator::group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();
        let t = std::thread::spawn(move || {
            let first = reduce_min(&b, 5.0, 0);
            let second = reduce_min(&b, 0.5, 1);
            (first, second)
        });
        assert_eq!(reduce_min(&a, 2.0, 0), 2.0);
        assert_eq!(reduce_min(&a, 2.0, 1), 0.5);
        assert_eq!(t.join().unwrap(), (2.0, 0.5));
    }
}
