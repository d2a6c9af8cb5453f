use crate::config::Features;
use crate::grid::{Grid, NGHOST};
use crate::message::comm::Communicator;
use crate::message::{recv_matching, Envelope, BOUNDARY_CELLS_TAG};

/// Exchange direction. Perpendicular ranges grow with the direction
/// index: an x2 frame spans the fully extended x1 range, an x3 frame both
/// extended ranges, so that ghost columns filled by an earlier direction
/// arrive at the neighbor already populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dir {
    X1,
    X2,
    X3,
}

enum Region {
    SendLeftEdge,
    SendRightEdge,
    GhostInner,
    GhostOuter,
}

/// The neighbor-exchange half of the boundary pass. One instance per tile;
/// it owns the exchange counter that sequences frames across steps.
pub struct Exchange {
    sequence: u64,
    mhd: bool,
    isothermal: bool,
    nscalars: usize,
}

impl Exchange {
    pub fn new(_grid: &Grid, features: &Features) -> Self {
        Self {
            sequence: 0,
            mhd: features.mhd,
            isothermal: features.eos.is_isothermal(),
            nscalars: features.nscalars,
        }
    }

    /// Values packed per cell: `d, M1, M2, M3`, the six field components
    /// under MHD (three cell-centered, three interface), the energy unless
    /// isothermal, then the scalars.
    fn nvar_share(&self) -> usize {
        4 + if self.mhd { 6 } else { 0 } + if self.isothermal { 0 } else { 1 } + self.nscalars
    }

    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Exchange one direction with both neighbors, where present. The two
    /// half-shifts run in a fixed order: every rank first sends its
    /// upper-edge data and fills its inner ghosts, then the roles swap.
    /// Sends never block (the transport buffers the frame, which is the
    /// preposted receive of the protocol); each receive completes before
    /// the next phase so a direction is fully settled before the next one
    /// starts.
    pub fn run<C: Communicator + ?Sized>(
        &mut self,
        grid: &mut Grid,
        comm: &C,
        dir: Dir,
        sequence: u64,
        shearing: bool,
    ) {
        let (lnbr, rnbr) = match dir {
            Dir::X1 => (grid.lx1, grid.rx1),
            Dir::X2 => (grid.lx2, grid.rx2),
            Dir::X3 => (grid.lx3, grid.rx3),
        };
        if lnbr < 0 && rnbr < 0 {
            return;
        }

        // shift toward +d: fills inner ghosts
        if rnbr >= 0 {
            let data = self.pack(grid, dir, Region::SendRightEdge);
            let env = Envelope::new(BOUNDARY_CELLS_TAG, phase(sequence, dir, 0), data);
            comm.send(rnbr as usize, env.to_bytes());
        }
        if lnbr >= 0 {
            let env = recv_matching(comm, BOUNDARY_CELLS_TAG, phase(sequence, dir, 0));
            self.unpack(grid, comm.rank(), dir, Region::GhostInner, &env.data, false);
        }

        // shift toward -d: fills outer ghosts
        if lnbr >= 0 {
            let data = self.pack(grid, dir, Region::SendLeftEdge);
            let env = Envelope::new(BOUNDARY_CELLS_TAG, phase(sequence, dir, 1), data);
            comm.send(lnbr as usize, env.to_bytes());
        }
        if rnbr >= 0 {
            let env = recv_matching(comm, BOUNDARY_CELLS_TAG, phase(sequence, dir, 1));
            let skip_shared_face = shearing && dir == Dir::X1;
            self.unpack(grid, comm.rank(), dir, Region::GhostOuter, &env.data, skip_shared_face);
        }
    }

    fn ranges(
        grid: &Grid,
        dir: Dir,
        region: Region,
    ) -> (
        std::ops::Range<usize>,
        std::ops::Range<usize>,
        std::ops::Range<usize>,
    ) {
        let (n3, n2, n1) = grid.dim();
        let edge = |s: usize, e: usize, region: &Region| match region {
            Region::SendLeftEdge => s..s + NGHOST,
            Region::SendRightEdge => e + 1 - NGHOST..e + 1,
            Region::GhostInner => s - NGHOST..s,
            Region::GhostOuter => e + 1..e + 1 + NGHOST,
        };
        match dir {
            Dir::X1 => (
                grid.ks..grid.ke + 1,
                grid.js..grid.je + 1,
                edge(grid.is, grid.ie, &region),
            ),
            Dir::X2 => (
                grid.ks..grid.ke + 1,
                edge(grid.js, grid.je, &region),
                0..n1,
            ),
            Dir::X3 => (edge(grid.ks, grid.ke, &region), 0..n2, 0..n1),
        }
    }

    fn pack(&self, grid: &Grid, dir: Dir, region: Region) -> Vec<u8> {
        let (kr, jr, ir) = Self::ranges(grid, dir, region);
        let count = kr.len() * jr.len() * ir.len() * self.nvar_share();
        let mut out = Vec::with_capacity(count * 8);
        let mut put = |v: f64| out.extend_from_slice(&v.to_le_bytes());

        for k in kr {
            for j in jr.clone() {
                for i in ir.clone() {
                    let u = &grid.u[(k, j, i)];
                    put(u.d);
                    put(u.m1);
                    put(u.m2);
                    put(u.m3);
                    if self.mhd {
                        put(u.b1c);
                        put(u.b2c);
                        put(u.b3c);
                        put(grid.b1i[(k, j, i)]);
                        put(grid.b2i[(k, j, i)]);
                        put(grid.b3i[(k, j, i)]);
                    }
                    if !self.isothermal {
                        put(u.e);
                    }
                    for n in 0..self.nscalars {
                        put(u.s[n]);
                    }
                }
            }
        }
        out
    }

    /// Unpack a frame into a ghost region in the pack order. When
    /// `skip_shared_face` is set (shearing-periodic outer x1), the normal
    /// interface field of the first ghost column is left alone: that face
    /// sits on the boundary itself, is CT-updated by this tile, and the
    /// shear remap owns the handoff across the seam.
    fn unpack(
        &self,
        grid: &mut Grid,
        rank: usize,
        dir: Dir,
        region: Region,
        data: &[u8],
        skip_shared_face: bool,
    ) {
        let first_ghost = match dir {
            Dir::X1 => grid.ie + 1,
            Dir::X2 => grid.je + 1,
            Dir::X3 => grid.ke + 1,
        };
        let (kr, jr, ir) = Self::ranges(grid, dir, region);
        let count = kr.len() * jr.len() * ir.len() * self.nvar_share();
        if data.len() != count * 8 {
            panic!(
                "rank {}: boundary frame holds {} bytes, expected {}",
                rank,
                data.len(),
                count * 8
            );
        }

        let mut pos = 0;
        let mut take = || {
            let mut b = [0; 8];
            b.copy_from_slice(&data[pos..pos + 8]);
            pos += 8;
            f64::from_le_bytes(b)
        };

        for k in kr {
            for j in jr.clone() {
                for i in ir.clone() {
                    let mut u = grid.u[(k, j, i)];
                    u.d = take();
                    u.m1 = take();
                    u.m2 = take();
                    u.m3 = take();
                    if self.mhd {
                        u.b1c = take();
                        u.b2c = take();
                        u.b3c = take();
                        let (b1, b2, b3) = (take(), take(), take());
                        let on_seam = skip_shared_face
                            && match dir {
                                Dir::X1 => i == first_ghost,
                                Dir::X2 => j == first_ghost,
                                Dir::X3 => k == first_ghost,
                            };
                        if !on_seam {
                            match dir {
                                Dir::X1 => grid.b1i[(k, j, i)] = b1,
                                Dir::X2 => grid.b2i[(k, j, i)] = b2,
                                Dir::X3 => grid.b3i[(k, j, i)] = b3,
                            }
                        }
                        match dir {
                            Dir::X1 => {
                                grid.b2i[(k, j, i)] = b2;
                                grid.b3i[(k, j, i)] = b3;
                            }
                            Dir::X2 => {
                                grid.b1i[(k, j, i)] = b1;
                                grid.b3i[(k, j, i)] = b3;
                            }
                            Dir::X3 => {
                                grid.b1i[(k, j, i)] = b1;
                                grid.b2i[(k, j, i)] = b2;
                            }
                        }
                    }
                    if !self.isothermal {
                        u.e = take();
                    }
                    for n in 0..self.nscalars {
                        u.s[n] = take();
                    }
                    grid.u[(k, j, i)] = u;
                }
            }
        }
    }
}

/// Sequence frames by exchange number, direction, and shift phase, so a
/// receiver never confuses a fast neighbor's later frame with the one it
/// is waiting on.
fn phase(sequence: u64, dir: Dir, side: u64) -> u64 {
    sequence * 6
        + 2 * match dir {
            Dir::X1 => 0,
            Dir::X2 => 1,
            Dir::X3 => 2,
        }
        + side
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::boundary::{BcFlags, BoundarySet};
    use crate::hydro::Conserved;
    use crate::message::mem::MemCommunicator;

    /// Build the rank-`(pi, pj)` tile of a doubly periodic domain split
    /// over a 2x2 process grid, with neighbor ranks wired torus-fashion.
    fn quad_tile(pi: usize, pj: usize, n: usize) -> Grid {
        let half = n / 2;
        let dx = 1.0 / n as f64;
        let mut g = Grid::new((half, half, 1), (dx, dx, 1.0), (0.0, 0.0, 0.0));
        g.gnx1 = n;
        g.gnx2 = n;
        g.idisp = (pi * half) as i64;
        g.jdisp = (pj * half) as i64;
        let rank = |pi: usize, pj: usize| (pj * 2 + pi) as i64;
        g.lx1 = rank(1 - pi, pj);
        g.rx1 = rank(1 - pi, pj);
        g.lx2 = rank(pi, 1 - pj);
        g.rx2 = rank(pi, 1 - pj);
        g.init_state(|x1, x2, _| Conserved {
            d: 1.0 + (7.3 * x1).sin() + (3.1 * x2).cos(),
            m1: x1 * x2,
            m2: x1 - x2,
            e: 2.0 + x1,
            s: [x1, x2],
            ..Default::default()
        });
        g.init_faces(
            |x1, x2, _| (x1 * 2.9).cos() + x2,
            |x1, x2, _| x1 - (x2 * 1.7).sin(),
            |_, _, _| 0.5,
        );
        g
    }

    fn exchanged_quad(n: usize) -> Vec<Grid> {
        let comms = MemCommunicator::group(4);
        let mut handles = Vec::new();
        for (rank, comm) in comms.into_iter().enumerate() {
            handles.push(std::thread::spawn(move || {
                let (pi, pj) = (rank % 2, rank / 2);
                let mut grid = quad_tile(pi, pj, n);
                let mut features = crate::config::Features::mhd(5.0 / 3.0);
                features.nscalars = 2;
                let mut set =
                    BoundarySet::new(&grid, &features, &BcFlags::periodic()).unwrap();
                set.apply(&mut grid, &comm);
                grid
            }));
        }
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn quad_round_trip_matches_neighbors_bit_exactly() {
        let n = 64;
        let grids = exchanged_quad(n);
        let left = &grids[0]; // (pi, pj) = (0, 0)
        let right = &grids[1]; // (1, 0)
        let upper = &grids[2]; // (0, 1)

        let (is, ie, js, je, ks) = (left.is, left.ie, left.js, left.je, left.ks);

        // x1 ghosts of the left tile hold the right tile's edge cells
        for j in js..=je {
            for m in 0..crate::grid::NGHOST {
                assert_eq!(left.u[(ks, j, is - 1 - m)], right.u[(ks, j, ie - m)]);
                assert_eq!(left.u[(ks, j, ie + 1 + m)], right.u[(ks, j, is + m)]);
                assert_eq!(left.b1i[(ks, j, is - 1 - m)], right.b1i[(ks, j, ie - m)]);
                assert_eq!(left.b2i[(ks, j, ie + 1 + m)], right.b2i[(ks, j, is + m)]);
            }
        }

        // x2 ghosts likewise, including the corner columns the x1 pass
        // filled first
        for i in is - 2..=ie + 2 {
            assert_eq!(left.u[(ks, js - 1, i)], upper.u[(ks, je, i)]);
            assert_eq!(left.u[(ks, je + 1, i)], upper.u[(ks, js, i)]);
            assert_eq!(left.b2i[(ks, js - 1, i)], upper.b2i[(ks, je, i)]);
        }

        // scalar and energy components crossed intact
        assert_eq!(left.u[(ks, js + 3, is - 2)].s, right.u[(ks, js + 3, ie - 1)].s);
        assert_eq!(left.u[(ks, js + 3, is - 2)].e, right.u[(ks, js + 3, ie - 1)].e);
    }

    #[test]
    fn exchange_is_idempotent_between_updates() {
        let grids_once = exchanged_quad(16);
        let comms = MemCommunicator::group(4);
        let mut handles = Vec::new();
        for (rank, comm) in comms.into_iter().enumerate() {
            handles.push(std::thread::spawn(move || {
                let (pi, pj) = (rank % 2, rank / 2);
                let mut grid = quad_tile(pi, pj, 16);
                let mut features = crate::config::Features::mhd(5.0 / 3.0);
                features.nscalars = 2;
                let mut set =
                    BoundarySet::new(&grid, &features, &BcFlags::periodic()).unwrap();
                set.apply(&mut grid, &comm);
                set.apply(&mut grid, &comm);
                grid
            }));
        }
        let grids_twice: Vec<Grid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (a, b) in grids_once.iter().zip(grids_twice.iter()) {
            assert_eq!(a.u.data(), b.u.data());
            assert_eq!(a.b1i.data(), b.b1i.data());
            assert_eq!(a.b2i.data(), b.b2i.data());
            assert_eq!(a.b3i.data(), b.b3i.data());
        }
    }
}
