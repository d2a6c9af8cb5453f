use crate::config::{ConfigError, Features};
use crate::grid::{Grid, NGHOST};
use crate::message::comm::Communicator;

pub mod exchange;
pub mod shear;

/// A problem-registered boundary function, free to fill its face's ghost
/// region however it likes.
pub type UserBoundary = fn(&mut Grid);

/// The closed set of physical boundary policies. Flag codes follow the
/// configuration convention: 1 reflecting with vanishing normal field,
/// 2 outflow, 4 periodic, 5 reflecting with the normal field preserved.
#[derive(Clone, Copy)]
pub enum BcKind {
    ReflectZeroField,
    Outflow,
    Periodic,
    ReflectKeepField,
    User(UserBoundary),
}

impl BcKind {
    pub fn from_flag(flag: i32) -> Result<Self, ConfigError> {
        match flag {
            1 => Ok(BcKind::ReflectZeroField),
            2 => Ok(BcKind::Outflow),
            4 => Ok(BcKind::Periodic),
            5 => Ok(BcKind::ReflectKeepField),
            _ => Err(ConfigError::UnknownBcFlag(flag)),
        }
    }
}

/// The six faces of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Face {
    InnerX1,
    OuterX1,
    InnerX2,
    OuterX2,
    InnerX3,
    OuterX3,
}

/// Integer flag codes for the six faces, as read from a problem
/// configuration.
#[derive(Clone, Copy, Debug)]
pub struct BcFlags {
    pub ix1: i32,
    pub ox1: i32,
    pub ix2: i32,
    pub ox2: i32,
    pub ix3: i32,
    pub ox3: i32,
}

impl BcFlags {
    pub fn periodic() -> Self {
        Self {
            ix1: 4,
            ox1: 4,
            ix2: 4,
            ox2: 4,
            ix3: 4,
            ox3: 4,
        }
    }
}

/// The ghost-zone fill pass run before every integrator step. Faces with a
/// remote neighbor exchange messages; the rest apply their physical
/// policy. Directions are processed strictly x1, then x2, then x3, with a
/// later direction copying over the full extended range of the earlier
/// ones, which is what populates edge and corner ghosts.
pub struct BoundarySet {
    bc: [Option<BcKind>; 6],
    features: Features,
    shear_inner_edge: bool,
    shear_outer_edge: bool,
    exchange: exchange::Exchange,
}

impl BoundarySet {
    /// Validate the configuration against the tile and build the fill
    /// pass. Unknown flags and inconsistent feature combinations are
    /// rejected here, once, rather than surfacing mid-run.
    pub fn new(grid: &Grid, features: &Features, flags: &BcFlags) -> Result<Self, ConfigError> {
        features.validate()?;

        let parse = |neighbor: i64, flag: i32| -> Result<Option<BcKind>, ConfigError> {
            if neighbor >= 0 {
                Ok(None)
            } else {
                BcKind::from_flag(flag).map(Some)
            }
        };

        let bc = [
            parse(grid.lx1, flags.ix1)?,
            parse(grid.rx1, flags.ox1)?,
            parse(grid.lx2, flags.ix2)?,
            parse(grid.rx2, flags.ox2)?,
            if grid.three_d() {
                parse(grid.lx3, flags.ix3)?
            } else {
                None
            },
            if grid.three_d() {
                parse(grid.rx3, flags.ox3)?
            } else {
                None
            },
        ];

        let (mut shear_inner_edge, mut shear_outer_edge) = (false, false);
        if features.shearing_box.is_some() {
            if grid.lx2 >= 0 || grid.rx2 >= 0 {
                return Err(ConfigError::ShearingBoxDecomposedInX2);
            }
            shear_inner_edge = grid.idisp == 0;
            shear_outer_edge = grid.idisp + grid.nx1 as i64 == grid.gnx1 as i64;
        }

        Ok(Self {
            bc,
            features: *features,
            shear_inner_edge,
            shear_outer_edge,
            exchange: exchange::Exchange::new(grid, features),
        })
    }

    /// Register a problem-defined boundary on a physical face.
    pub fn register_user(&mut self, face: Face, f: UserBoundary) {
        let slot = &mut self.bc[face as usize];
        assert!(
            slot.is_some(),
            "user boundaries can only replace a physical boundary"
        );
        *slot = Some(BcKind::User(f));
    }

    /// Fill every ghost layer of the tile. Safe to call repeatedly: with
    /// no intervening update the grid is left unchanged.
    pub fn apply<C: Communicator + ?Sized>(&mut self, grid: &mut Grid, comm: &C) {
        let mhd = self.features.mhd;
        let sequence = self.exchange.next_sequence();
        let shearing = self.features.shearing_box.is_some();

        // x1, inner and outer
        self.exchange
            .run(grid, comm, exchange::Dir::X1, sequence, shearing);
        if let Some(bc) = self.bc[Face::InnerX1 as usize] {
            apply_ix1(grid, bc, mhd);
        }
        if let Some(bc) = self.bc[Face::OuterX1 as usize] {
            apply_ox1(grid, bc, mhd);
        }
        if shearing {
            if self.shear_inner_edge {
                shear::sheet_ix1(grid, &self.features);
            }
            if self.shear_outer_edge {
                shear::sheet_ox1(grid, &self.features);
            }
        }

        // x2, over the extended x1 range
        self.exchange
            .run(grid, comm, exchange::Dir::X2, sequence, false);
        if let Some(bc) = self.bc[Face::InnerX2 as usize] {
            apply_ix2(grid, bc, mhd);
        }
        if let Some(bc) = self.bc[Face::OuterX2 as usize] {
            apply_ox2(grid, bc, mhd);
        }

        // x3, over the extended x1 and x2 ranges
        if grid.three_d() {
            self.exchange
                .run(grid, comm, exchange::Dir::X3, sequence, false);
            if let Some(bc) = self.bc[Face::InnerX3 as usize] {
                apply_ix3(grid, bc, mhd);
            }
            if let Some(bc) = self.bc[Face::OuterX3 as usize] {
                apply_ox3(grid, bc, mhd);
            }
        }
    }
}

// ============================================================================
// Physical fills, inner and outer, per direction. Fill ranges follow the
// ordering rule: the x1 pass covers active x2/x3 zones only, the x2 pass
// covers the extended x1 range, and the x3 pass covers both extended
// ranges. Interface fields are only touched under MHD.

fn apply_ix1(grid: &mut Grid, bc: BcKind, mhd: bool) {
    let (is, ie) = (grid.is, grid.ie);
    match bc {
        BcKind::ReflectZeroField | BcKind::ReflectKeepField => {
            let zero_normal = matches!(bc, BcKind::ReflectZeroField);
            for k in grid.ks..=grid.ke {
                for j in grid.js..=grid.je {
                    for ig in 1..=NGHOST {
                        let mut q = grid.u[(k, j, is + ig - 1)];
                        q.m1 = -q.m1;
                        if zero_normal {
                            q.b1c = -q.b1c;
                        }
                        grid.u[(k, j, is - ig)] = q;
                    }
                    if mhd {
                        if zero_normal {
                            grid.b1i[(k, j, is)] = 0.0;
                            for ig in 1..=NGHOST {
                                grid.b1i[(k, j, is - ig)] = -grid.b1i[(k, j, is + ig)];
                            }
                        } else {
                            for ig in 1..=NGHOST {
                                grid.b1i[(k, j, is - ig)] = grid.b1i[(k, j, is + ig)];
                            }
                        }
                        for ig in 1..=NGHOST {
                            grid.b2i[(k, j, is - ig)] = grid.b2i[(k, j, is + ig - 1)];
                            grid.b3i[(k, j, is - ig)] = grid.b3i[(k, j, is + ig - 1)];
                        }
                    }
                }
            }
        }
        BcKind::Outflow => {
            for k in grid.ks..=grid.ke {
                for j in grid.js..=grid.je {
                    for ig in 1..=NGHOST {
                        grid.u[(k, j, is - ig)] = grid.u[(k, j, is)];
                        if mhd {
                            grid.b1i[(k, j, is - ig)] = grid.b1i[(k, j, is)];
                            grid.b2i[(k, j, is - ig)] = grid.b2i[(k, j, is)];
                            grid.b3i[(k, j, is - ig)] = grid.b3i[(k, j, is)];
                        }
                    }
                }
            }
        }
        BcKind::Periodic => {
            for k in grid.ks..=grid.ke {
                for j in grid.js..=grid.je {
                    for ig in 1..=NGHOST {
                        grid.u[(k, j, is - ig)] = grid.u[(k, j, ie + 1 - ig)];
                        if mhd {
                            grid.b1i[(k, j, is - ig)] = grid.b1i[(k, j, ie + 1 - ig)];
                            grid.b2i[(k, j, is - ig)] = grid.b2i[(k, j, ie + 1 - ig)];
                            grid.b3i[(k, j, is - ig)] = grid.b3i[(k, j, ie + 1 - ig)];
                        }
                    }
                }
            }
        }
        BcKind::User(f) => f(grid),
    }
}

fn apply_ox1(grid: &mut Grid, bc: BcKind, mhd: bool) {
    let (is, ie) = (grid.is, grid.ie);
    match bc {
        BcKind::ReflectZeroField | BcKind::ReflectKeepField => {
            let zero_normal = matches!(bc, BcKind::ReflectZeroField);
            for k in grid.ks..=grid.ke {
                for j in grid.js..=grid.je {
                    for ig in 1..=NGHOST {
                        let mut q = grid.u[(k, j, ie + 1 - ig)];
                        q.m1 = -q.m1;
                        if zero_normal {
                            q.b1c = -q.b1c;
                        }
                        grid.u[(k, j, ie + ig)] = q;
                    }
                    if mhd {
                        // the boundary face itself is ie+1
                        if zero_normal {
                            grid.b1i[(k, j, ie + 1)] = 0.0;
                            for ig in 1..NGHOST {
                                grid.b1i[(k, j, ie + 1 + ig)] = -grid.b1i[(k, j, ie + 1 - ig)];
                            }
                        } else {
                            for ig in 1..NGHOST {
                                grid.b1i[(k, j, ie + 1 + ig)] = grid.b1i[(k, j, ie + 1 - ig)];
                            }
                        }
                        for ig in 1..=NGHOST {
                            grid.b2i[(k, j, ie + ig)] = grid.b2i[(k, j, ie + 1 - ig)];
                            grid.b3i[(k, j, ie + ig)] = grid.b3i[(k, j, ie + 1 - ig)];
                        }
                    }
                }
            }
        }
        BcKind::Outflow => {
            for k in grid.ks..=grid.ke {
                for j in grid.js..=grid.je {
                    for ig in 1..=NGHOST {
                        grid.u[(k, j, ie + ig)] = grid.u[(k, j, ie)];
                        if mhd {
                            // the normal face at ie+1 is active data; the
                            // ghost faces start one cell further out
                            if ig >= 2 {
                                grid.b1i[(k, j, ie + ig)] = grid.b1i[(k, j, ie + 1)];
                            }
                            grid.b2i[(k, j, ie + ig)] = grid.b2i[(k, j, ie)];
                            grid.b3i[(k, j, ie + ig)] = grid.b3i[(k, j, ie)];
                        }
                    }
                }
            }
        }
        BcKind::Periodic => {
            for k in grid.ks..=grid.ke {
                for j in grid.js..=grid.je {
                    for ig in 1..=NGHOST {
                        grid.u[(k, j, ie + ig)] = grid.u[(k, j, is + ig - 1)];
                        if mhd {
                            if ig >= 2 {
                                grid.b1i[(k, j, ie + ig)] = grid.b1i[(k, j, is + ig - 1)];
                            }
                            grid.b2i[(k, j, ie + ig)] = grid.b2i[(k, j, is + ig - 1)];
                            grid.b3i[(k, j, ie + ig)] = grid.b3i[(k, j, is + ig - 1)];
                        }
                    }
                }
            }
        }
        BcKind::User(f) => f(grid),
    }
}

fn apply_ix2(grid: &mut Grid, bc: BcKind, mhd: bool) {
    let (js, je) = (grid.js, grid.je);
    let (_, _, n1) = grid.dim();
    match bc {
        BcKind::ReflectZeroField | BcKind::ReflectKeepField => {
            let zero_normal = matches!(bc, BcKind::ReflectZeroField);
            for k in grid.ks..=grid.ke {
                for i in 0..n1 {
                    for jg in 1..=NGHOST {
                        let mut q = grid.u[(k, js + jg - 1, i)];
                        q.m2 = -q.m2;
                        if zero_normal {
                            q.b2c = -q.b2c;
                        }
                        grid.u[(k, js - jg, i)] = q;
                    }
                    if mhd {
                        if zero_normal {
                            grid.b2i[(k, js, i)] = 0.0;
                            for jg in 1..=NGHOST {
                                grid.b2i[(k, js - jg, i)] = -grid.b2i[(k, js + jg, i)];
                            }
                        } else {
                            for jg in 1..=NGHOST {
                                grid.b2i[(k, js - jg, i)] = grid.b2i[(k, js + jg, i)];
                            }
                        }
                        for jg in 1..=NGHOST {
                            grid.b1i[(k, js - jg, i)] = grid.b1i[(k, js + jg - 1, i)];
                            grid.b3i[(k, js - jg, i)] = grid.b3i[(k, js + jg - 1, i)];
                        }
                    }
                }
            }
        }
        BcKind::Outflow => {
            for k in grid.ks..=grid.ke {
                for i in 0..n1 {
                    for jg in 1..=NGHOST {
                        grid.u[(k, js - jg, i)] = grid.u[(k, js, i)];
                        if mhd {
                            grid.b1i[(k, js - jg, i)] = grid.b1i[(k, js, i)];
                            grid.b2i[(k, js - jg, i)] = grid.b2i[(k, js, i)];
                            grid.b3i[(k, js - jg, i)] = grid.b3i[(k, js, i)];
                        }
                    }
                }
            }
        }
        BcKind::Periodic => {
            for k in grid.ks..=grid.ke {
                for i in 0..n1 {
                    for jg in 1..=NGHOST {
                        grid.u[(k, js - jg, i)] = grid.u[(k, je + 1 - jg, i)];
                        if mhd {
                            grid.b1i[(k, js - jg, i)] = grid.b1i[(k, je + 1 - jg, i)];
                            grid.b2i[(k, js - jg, i)] = grid.b2i[(k, je + 1 - jg, i)];
                            grid.b3i[(k, js - jg, i)] = grid.b3i[(k, je + 1 - jg, i)];
                        }
                    }
                }
            }
        }
        BcKind::User(f) => f(grid),
    }
}

fn apply_ox2(grid: &mut Grid, bc: BcKind, mhd: bool) {
    let (js, je) = (grid.js, grid.je);
    let (_, _, n1) = grid.dim();
    match bc {
        BcKind::ReflectZeroField | BcKind::ReflectKeepField => {
            let zero_normal = matches!(bc, BcKind::ReflectZeroField);
            for k in grid.ks..=grid.ke {
                for i in 0..n1 {
                    for jg in 1..=NGHOST {
                        let mut q = grid.u[(k, je + 1 - jg, i)];
                        q.m2 = -q.m2;
                        if zero_normal {
                            q.b2c = -q.b2c;
                        }
                        grid.u[(k, je + jg, i)] = q;
                    }
                    if mhd {
                        if zero_normal {
                            grid.b2i[(k, je + 1, i)] = 0.0;
                            for jg in 1..NGHOST {
                                grid.b2i[(k, je + 1 + jg, i)] = -grid.b2i[(k, je + 1 - jg, i)];
                            }
                        } else {
                            for jg in 1..NGHOST {
                                grid.b2i[(k, je + 1 + jg, i)] = grid.b2i[(k, je + 1 - jg, i)];
                            }
                        }
                        for jg in 1..=NGHOST {
                            grid.b1i[(k, je + jg, i)] = grid.b1i[(k, je + 1 - jg, i)];
                            grid.b3i[(k, je + jg, i)] = grid.b3i[(k, je + 1 - jg, i)];
                        }
                    }
                }
            }
        }
        BcKind::Outflow => {
            for k in grid.ks..=grid.ke {
                for i in 0..n1 {
                    for jg in 1..=NGHOST {
                        grid.u[(k, je + jg, i)] = grid.u[(k, je, i)];
                        if mhd {
                            if jg >= 2 {
                                grid.b2i[(k, je + jg, i)] = grid.b2i[(k, je + 1, i)];
                            }
                            grid.b1i[(k, je + jg, i)] = grid.b1i[(k, je, i)];
                            grid.b3i[(k, je + jg, i)] = grid.b3i[(k, je, i)];
                        }
                    }
                }
            }
        }
        BcKind::Periodic => {
            for k in grid.ks..=grid.ke {
                for i in 0..n1 {
                    for jg in 1..=NGHOST {
                        grid.u[(k, je + jg, i)] = grid.u[(k, js + jg - 1, i)];
                        if mhd {
                            if jg >= 2 {
                                grid.b2i[(k, je + jg, i)] = grid.b2i[(k, js + jg - 1, i)];
                            }
                            grid.b1i[(k, je + jg, i)] = grid.b1i[(k, js + jg - 1, i)];
                            grid.b3i[(k, je + jg, i)] = grid.b3i[(k, js + jg - 1, i)];
                        }
                    }
                }
            }
        }
        BcKind::User(f) => f(grid),
    }
}

fn apply_ix3(grid: &mut Grid, bc: BcKind, mhd: bool) {
    let (ks, ke) = (grid.ks, grid.ke);
    let (_, n2, n1) = grid.dim();
    match bc {
        BcKind::ReflectZeroField | BcKind::ReflectKeepField => {
            let zero_normal = matches!(bc, BcKind::ReflectZeroField);
            for j in 0..n2 {
                for i in 0..n1 {
                    for kg in 1..=NGHOST {
                        let mut q = grid.u[(ks + kg - 1, j, i)];
                        q.m3 = -q.m3;
                        if zero_normal {
                            q.b3c = -q.b3c;
                        }
                        grid.u[(ks - kg, j, i)] = q;
                    }
                    if mhd {
                        if zero_normal {
                            grid.b3i[(ks, j, i)] = 0.0;
                            for kg in 1..=NGHOST {
                                grid.b3i[(ks - kg, j, i)] = -grid.b3i[(ks + kg, j, i)];
                            }
                        } else {
                            for kg in 1..=NGHOST {
                                grid.b3i[(ks - kg, j, i)] = grid.b3i[(ks + kg, j, i)];
                            }
                        }
                        for kg in 1..=NGHOST {
                            grid.b1i[(ks - kg, j, i)] = grid.b1i[(ks + kg - 1, j, i)];
                            grid.b2i[(ks - kg, j, i)] = grid.b2i[(ks + kg - 1, j, i)];
                        }
                    }
                }
            }
        }
        BcKind::Outflow => {
            for j in 0..n2 {
                for i in 0..n1 {
                    for kg in 1..=NGHOST {
                        grid.u[(ks - kg, j, i)] = grid.u[(ks, j, i)];
                        if mhd {
                            grid.b1i[(ks - kg, j, i)] = grid.b1i[(ks, j, i)];
                            grid.b2i[(ks - kg, j, i)] = grid.b2i[(ks, j, i)];
                            grid.b3i[(ks - kg, j, i)] = grid.b3i[(ks, j, i)];
                        }
                    }
                }
            }
        }
        BcKind::Periodic => {
            for j in 0..n2 {
                for i in 0..n1 {
                    for kg in 1..=NGHOST {
                        grid.u[(ks - kg, j, i)] = grid.u[(ke + 1 - kg, j, i)];
                        if mhd {
                            grid.b1i[(ks - kg, j, i)] = grid.b1i[(ke + 1 - kg, j, i)];
                            grid.b2i[(ks - kg, j, i)] = grid.b2i[(ke + 1 - kg, j, i)];
                            grid.b3i[(ks - kg, j, i)] = grid.b3i[(ke + 1 - kg, j, i)];
                        }
                    }
                }
            }
        }
        BcKind::User(f) => f(grid),
    }
}

fn apply_ox3(grid: &mut Grid, bc: BcKind, mhd: bool) {
    let (ks, ke) = (grid.ks, grid.ke);
    let (_, n2, n1) = grid.dim();
    match bc {
        BcKind::ReflectZeroField | BcKind::ReflectKeepField => {
            let zero_normal = matches!(bc, BcKind::ReflectZeroField);
            for j in 0..n2 {
                for i in 0..n1 {
                    for kg in 1..=NGHOST {
                        let mut q = grid.u[(ke + 1 - kg, j, i)];
                        q.m3 = -q.m3;
                        if zero_normal {
                            q.b3c = -q.b3c;
                        }
                        grid.u[(ke + kg, j, i)] = q;
                    }
                    if mhd {
                        if zero_normal {
                            grid.b3i[(ke + 1, j, i)] = 0.0;
                            for kg in 1..NGHOST {
                                grid.b3i[(ke + 1 + kg, j, i)] = -grid.b3i[(ke + 1 - kg, j, i)];
                            }
                        } else {
                            for kg in 1..NGHOST {
                                grid.b3i[(ke + 1 + kg, j, i)] = grid.b3i[(ke + 1 - kg, j, i)];
                            }
                        }
                        for kg in 1..=NGHOST {
                            grid.b1i[(ke + kg, j, i)] = grid.b1i[(ke + 1 - kg, j, i)];
                            grid.b2i[(ke + kg, j, i)] = grid.b2i[(ke + 1 - kg, j, i)];
                        }
                    }
                }
            }
        }
        BcKind::Outflow => {
            for j in 0..n2 {
                for i in 0..n1 {
                    for kg in 1..=NGHOST {
                        grid.u[(ke + kg, j, i)] = grid.u[(ke, j, i)];
                        if mhd {
                            if kg >= 2 {
                                grid.b3i[(ke + kg, j, i)] = grid.b3i[(ke + 1, j, i)];
                            }
                            grid.b1i[(ke + kg, j, i)] = grid.b1i[(ke, j, i)];
                            grid.b2i[(ke + kg, j, i)] = grid.b2i[(ke, j, i)];
                        }
                    }
                }
            }
        }
        BcKind::Periodic => {
            for j in 0..n2 {
                for i in 0..n1 {
                    for kg in 1..=NGHOST {
                        grid.u[(ke + kg, j, i)] = grid.u[(ks + kg - 1, j, i)];
                        if mhd {
                            if kg >= 2 {
                                grid.b3i[(ke + kg, j, i)] = grid.b3i[(ks + kg - 1, j, i)];
                            }
                            grid.b1i[(ke + kg, j, i)] = grid.b1i[(ks + kg - 1, j, i)];
                            grid.b2i[(ke + kg, j, i)] = grid.b2i[(ks + kg - 1, j, i)];
                        }
                    }
                }
            }
        }
        BcKind::User(f) => f(grid),
    }
}
