use std::net::SocketAddr;

use clap::{Arg, Command};
use log::{error, info};

use lodestone::boundary::{BcFlags, BoundarySet};
use lodestone::config::Features;
use lodestone::courant;
use lodestone::grid::Grid;
use lodestone::hydro::reconstruct::{PiecewiseLinear, Reconstruction};
use lodestone::hydro::riemann::Hlle;
use lodestone::hydro::{Conserved, Eos};
use lodestone::integrator::CtuIntegrator;
use lodestone::message::comm::Communicator;
use lodestone::message::mem::MemCommunicator;
use lodestone::message::tcp::TcpHost;

/// Canonical test problems for the CTU/CT core: shock tubes, field-loop
/// advection, and a traveling sound wave for convergence measurements.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Problem {
    Sod,
    BrioWu,
    FieldLoop,
    LinWave,
}

impl Problem {
    fn from_name(name: &str) -> Self {
        match name {
            "sod" => Problem::Sod,
            "briowu" => Problem::BrioWu,
            "loop" => Problem::FieldLoop,
            "linwave" => Problem::LinWave,
            other => panic!("unknown problem: {}", other),
        }
    }

    fn features(&self, cfl: f64) -> Features {
        let mut f = match self {
            Problem::Sod => Features::hydro(1.4),
            Problem::BrioWu => Features::mhd(2.0),
            Problem::FieldLoop => Features::mhd(5.0 / 3.0),
            Problem::LinWave => {
                let mut f = Features::hydro(5.0 / 3.0);
                f.eos = Eos::Isothermal { csound: 1.0 };
                f
            }
        };
        f.cfl = cfl;
        f
    }

    fn flags(&self) -> BcFlags {
        let mut flags = BcFlags::periodic();
        if matches!(self, Problem::Sod | Problem::BrioWu) {
            flags.ix1 = 2;
            flags.ox1 = 2;
        }
        flags
    }

    fn tlim(&self) -> f64 {
        match self {
            Problem::Sod => 0.25,
            Problem::BrioWu => 0.1,
            Problem::FieldLoop => 1.0,
            Problem::LinWave => 1.0,
        }
    }

    /// Global active zones for a given resolution on the x1 axis.
    fn size(&self, res: usize) -> (usize, usize) {
        match self {
            Problem::Sod | Problem::BrioWu => (res, 8),
            Problem::FieldLoop => (res, res / 2),
            Problem::LinWave => (res, res),
        }
    }

    fn domain(&self) -> ((f64, f64), (f64, f64)) {
        match self {
            Problem::Sod | Problem::BrioWu => ((0.0, 1.0), (0.0, 0.02)),
            Problem::FieldLoop => ((0.0, 1.0), (0.0, 0.5)),
            Problem::LinWave => ((0.0, 1.0), (0.0, 1.0)),
        }
    }

    fn init(&self, grid: &mut Grid) {
        match self {
            Problem::Sod => {
                let gamma = 1.4;
                grid.init_state(|x1, _, _| {
                    let (d, p) = if x1 < 0.5 { (1.0, 1.0) } else { (0.125, 0.1) };
                    Conserved {
                        d,
                        e: p / (gamma - 1.0),
                        ..Default::default()
                    }
                });
            }
            Problem::BrioWu => {
                let gamma = 2.0;
                grid.init_faces(
                    |_, _, _| 0.75,
                    |x1, _, _| if x1 < 0.5 { 1.0 } else { -1.0 },
                    |_, _, _| 0.0,
                );
                let (n3, n2, n1) = grid.dim();
                for k in 0..n3 {
                    for j in 0..n2 {
                        for i in 0..n1 {
                            let (x1, _, _) = grid.cc_pos(i, j, k);
                            let (d, p) = if x1 < 0.5 { (1.0, 1.0) } else { (0.125, 0.1) };
                            let u = &mut grid.u[(k, j, i)];
                            u.d = d;
                            u.e = p / (gamma - 1.0)
                                + 0.5 * (u.b1c * u.b1c + u.b2c * u.b2c + u.b3c * u.b3c);
                        }
                    }
                }
            }
            Problem::FieldLoop => {
                let gamma = 5.0 / 3.0;
                let dx = grid.dx1;
                let a3 = |x: f64, y: f64| {
                    let r = ((x - 0.5).powi(2) + (y - 0.25).powi(2)).sqrt();
                    1e-3 * (0.3 - r).max(0.0)
                };
                let (n3, n2, n1) = grid.dim();
                for k in 0..n3 {
                    for j in 0..n2 {
                        for i in 0..n1 {
                            let (xc, yc, _) = grid.cc_pos(i, j, k);
                            let (xf, yf) = (xc - 0.5 * dx, yc - 0.5 * dx);
                            grid.b1i[(k, j, i)] = (a3(xf, yf + dx) - a3(xf, yf)) / dx;
                            grid.b2i[(k, j, i)] = -(a3(xf + dx, yf) - a3(xf, yf)) / dx;
                        }
                    }
                }
                grid.sync_cell_fields();
                for k in 0..n3 {
                    for j in 0..n2 {
                        for i in 0..n1 {
                            let u = &mut grid.u[(k, j, i)];
                            u.d = 1.0;
                            u.m1 = 1.0;
                            u.m2 = 1.0;
                            u.e = 1.0 / (gamma - 1.0)
                                + 0.5 * (1.0 + 1.0)
                                + 0.5 * (u.b1c * u.b1c + u.b2c * u.b2c);
                        }
                    }
                }
            }
            Problem::LinWave => {
                grid.init_state(|x1, _, _| {
                    let amp = 1e-4;
                    let delta = amp * (2.0 * std::f64::consts::PI * x1).sin();
                    Conserved {
                        d: 1.0 + delta,
                        m1: delta,
                        ..Default::default()
                    }
                });
            }
        }
    }
}

/// Carve the rank's tile out of the global domain. Decomposition is a
/// `px * py` process grid with periodic or physical neighbors per the
/// problem's boundary flags.
fn build_tile(problem: Problem, res: usize, tiles: (usize, usize), rank: usize) -> Grid {
    let (px, py) = tiles;
    let (gnx1, gnx2) = problem.size(res);
    assert!(
        gnx1 % px == 0 && gnx2 % py == 0,
        "resolution must divide the process grid"
    );
    let ((x1a, x1b), (x2a, x2b)) = problem.domain();
    let dx1 = (x1b - x1a) / gnx1 as f64;
    let dx2 = (x2b - x2a) / gnx2 as f64;
    let (pi, pj) = (rank % px, rank / px);
    let (nx1, nx2) = (gnx1 / px, gnx2 / py);

    let mut grid = Grid::new((nx1, nx2, 1), (dx1, dx2, 1.0), (x1a, x2a, 0.0));
    grid.gnx1 = gnx1;
    grid.gnx2 = gnx2;
    grid.idisp = (pi * nx1) as i64;
    grid.jdisp = (pj * nx2) as i64;

    let rank_of = |pi: usize, pj: usize| (pj * px + pi) as i64;
    let flags = problem.flags();
    let periodic_x1 = flags.ix1 == 4;
    if px > 1 {
        if pi > 0 || periodic_x1 {
            grid.lx1 = rank_of((pi + px - 1) % px, pj);
        }
        if pi + 1 < px || periodic_x1 {
            grid.rx1 = rank_of((pi + 1) % px, pj);
        }
    }
    if py > 1 {
        grid.lx2 = rank_of(pi, (pj + py - 1) % py);
        grid.rx2 = rank_of(pi, (pj + 1) % py);
    }

    problem.init(&mut grid);
    grid
}

struct Summary {
    time: f64,
    steps: usize,
    mass: f64,
    divb: f64,
    l1: f64,
}

fn run_tile<C: Communicator>(
    problem: Problem,
    res: usize,
    tiles: (usize, usize),
    comm: &C,
    cfl: f64,
    tlim: f64,
) -> Summary {
    let features = problem.features(cfl);
    let mut grid = build_tile(problem, res, tiles, comm.rank());
    let mut set = BoundarySet::new(&grid, &features, &problem.flags())
        .unwrap_or_else(|e| panic!("rank {}: bad configuration: {}", comm.rank(), e));
    let recon: Box<dyn Reconstruction> = Box::new(PiecewiseLinear);
    let mut integ = CtuIntegrator::new(&grid, features, recon, Box::new(Hlle::new(features.eos)));

    let mut steps = 0;
    let mut sequence = 0;
    while grid.time < tlim - 1e-12 {
        sequence += 1;
        grid.dt = courant::new_dt(&grid, &features, comm, sequence).min(tlim - grid.time);
        // serial runs keep a copy so a failed step can be retried with a
        // shorter dt; a decomposed run cannot re-synchronize after one
        // rank bails out
        let saved = if comm.size() == 1 {
            Some(grid.clone())
        } else {
            None
        };
        set.apply(&mut grid, comm);

        match (integ.step(&mut grid), saved) {
            (Ok(()), _) => {}
            (Err(e), Some(saved)) => {
                error!("{}; retrying with a shorter step", e);
                let mut retries = 0;
                loop {
                    retries += 1;
                    assert!(retries <= 4, "step kept failing: {}", e);
                    let mut attempt = saved.clone();
                    attempt.dt = saved.dt / (1 << retries) as f64;
                    set.apply(&mut attempt, comm);
                    if integ.step(&mut attempt).is_ok() {
                        grid = attempt;
                        break;
                    }
                }
            }
            (Err(e), None) => {
                error!("rank {}: {}", comm.rank(), e);
                panic!("rank {}: unrecoverable step failure", comm.rank());
            }
        }

        grid.time += grid.dt;
        steps += 1;
        if comm.rank() == 0 && steps % 50 == 0 {
            info!(
                "step {:5}  t = {:.4}  dt = {:.3e}  mass = {:.6}  divb = {:.3e}",
                steps,
                grid.time,
                grid.dt,
                grid.total_mass(),
                grid.max_divb()
            );
        }
    }

    // L1 error of the density against the initial profile, meaningful for
    // the periodic wave after a whole number of crossings
    let reference = build_tile(problem, res, tiles, comm.rank());
    let mut l1 = 0.0;
    let mut zones = 0.0;
    for k in grid.ks..=grid.ke {
        for j in grid.js..=grid.je {
            for i in grid.is..=grid.ie {
                l1 += (grid.u[(k, j, i)].d - reference.u[(k, j, i)].d).abs();
                zones += 1.0;
            }
        }
    }

    Summary {
        time: grid.time,
        steps,
        mass: grid.total_mass(),
        divb: grid.max_divb(),
        l1: l1 / zones,
    }
}

fn main() {
    let matches = Command::new("lodestone")
        .about("finite-volume MHD core: CTU integrator with constrained transport")
        .arg(
            Arg::new("problem")
                .help("test problem to run")
                .possible_values(["sod", "briowu", "loop", "linwave"])
                .default_value("sod"),
        )
        .arg(
            Arg::new("resolution")
                .long("resolution")
                .short('n')
                .takes_value(true)
                .default_value("128")
                .help("active zones along x1"),
        )
        .arg(
            Arg::new("tlim")
                .long("tlim")
                .takes_value(true)
                .help("final time (defaults per problem)"),
        )
        .arg(
            Arg::new("cfl")
                .long("cfl")
                .takes_value(true)
                .default_value("0.4")
                .help("courant number"),
        )
        .arg(
            Arg::new("tiles")
                .long("tiles")
                .takes_value(true)
                .default_value("1x1")
                .help("process grid, e.g. 2x2, run as in-process ranks"),
        )
        .arg(
            Arg::new("rank")
                .long("rank")
                .takes_value(true)
                .help("this process's rank when running over TCP"),
        )
        .arg(
            Arg::new("peers")
                .long("peers")
                .takes_value(true)
                .help("comma-separated host:port list, one per rank"),
        )
        .get_matches();

    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let problem = Problem::from_name(matches.value_of("problem").unwrap());
    let res: usize = matches.value_of("resolution").unwrap().parse().unwrap();
    let cfl: f64 = matches.value_of("cfl").unwrap().parse().unwrap();
    let tlim: f64 = matches
        .value_of("tlim")
        .map(|t| t.parse().unwrap())
        .unwrap_or_else(|| problem.tlim());

    let summary = if let Some(peers) = matches.value_of("peers") {
        // one tile per process, decomposed along x1 over TCP peers
        let rank: usize = matches
            .value_of("rank")
            .expect("--rank is required with --peers")
            .parse()
            .unwrap();
        let peers: Vec<SocketAddr> = peers.split(',').map(|p| p.parse().unwrap()).collect();
        let tiles = (peers.len(), 1);
        let (mut host, comm) = TcpHost::new(rank, peers);
        let summary = run_tile(problem, res, tiles, &comm, cfl, tlim);
        drop(comm);
        host.join();
        summary
    } else {
        let tiles: Vec<usize> = matches
            .value_of("tiles")
            .unwrap()
            .split('x')
            .map(|t| t.parse().unwrap())
            .collect();
        let tiles = (tiles[0], tiles[1]);
        let nrank = tiles.0 * tiles.1;

        if nrank == 1 {
            let comm = MemCommunicator::solo();
            run_tile(problem, res, tiles, &comm, cfl, tlim)
        } else {
            let comms = MemCommunicator::group(nrank);
            let mut handles = Vec::new();
            for comm in comms {
                handles.push(std::thread::spawn(move || {
                    run_tile(problem, res, tiles, &comm, cfl, tlim)
                }));
            }
            let mut summaries: Vec<Summary> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            let total_mass: f64 = summaries.iter().map(|s| s.mass).sum();
            let mut s = summaries.remove(0);
            s.mass = total_mass;
            s.divb = summaries.iter().fold(s.divb, |a, t| a.max(t.divb));
            s
        }
    };

    info!(
        "finished: t = {:.4} after {} steps, mass = {:.8}, max divb = {:.3e}, L1(d) = {:.3e}",
        summary.time, summary.steps, summary.mass, summary.divb, summary.l1
    );
}
