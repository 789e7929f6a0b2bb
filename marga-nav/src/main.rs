//! MargaNav - headless agent simulation over a navmesh file
//!
//! Loads a navmesh dump, starts the engines and walks a point agent along
//! whatever the navigation engine asks for.
//!
//! ## Multi-Threaded Architecture
//!
//! - **Navmesh Thread**: re-applies regions and rebuilds connectivity patches
//! - **Navigation Thread**: destination arbitration, path maintenance,
//!   anti-stuck and threat checks
//! - **Exploration Thread** (with `--explore`): frontier tiling and target
//!   selection
//! - **Main Thread**: moves the agent towards the current movement target and
//!   reports status

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bhumi_mesh::{Navmesh, Vec3};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use marga_nav::{DestType, Destination, ExplorationEngine, MargaConfig, NavigationEngine, Result};

#[derive(Parser, Debug)]
#[command(name = "marga-nav", version, about = "Navigate or explore a navmesh with a simulated agent")]
struct Args {
    /// Navmesh text dump to load
    #[arg(long)]
    mesh: PathBuf,

    /// Configuration file (defaults to marga.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// User destination as "x,y,z"
    #[arg(long, value_parser = parse_point)]
    goal: Option<Vec3>,

    /// Run the exploration engine
    #[arg(long)]
    explore: bool,

    /// Stop after this many seconds
    #[arg(long, default_value_t = 60.0)]
    duration: f32,

    /// Write the navmesh back out on exit
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn parse_point(s: &str) -> std::result::Result<Vec3, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("'{}': {}", p, e)))
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [x, y] => Ok(Vec3::new(*x, *y, 0.0)),
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y[,z], got '{}'", s)),
    }
}

fn load_config(path: Option<&Path>) -> Result<MargaConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            MargaConfig::load(path)
        }
        None if Path::new("marga.toml").exists() => {
            info!("Loading configuration from marga.toml");
            MargaConfig::load(Path::new("marga.toml"))
        }
        None => {
            info!("Using default configuration");
            Ok(MargaConfig::default())
        }
    }
}

/// Move `pos` up to `step` units towards `target`.
fn step_towards(pos: Vec3, target: Vec3, step: f32) -> Vec3 {
    let d = pos.distance(target);
    if d <= step || d <= f32::EPSILON {
        target
    } else {
        pos.lerp(target, step / d)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marga_nav=info")))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    info!("MargaNav v{}", env!("CARGO_PKG_VERSION"));

    let navmesh = Arc::new(Navmesh::new(config.navmesh.clone()));
    let grids = navmesh.load_file(&args.mesh)?;
    navmesh.update();
    info!("Loaded {} grid cells from {:?}", grids, args.mesh);

    let navigation = Arc::new(NavigationEngine::new(&config, Arc::clone(&navmesh)));
    let exploration = Arc::new(ExplorationEngine::new(&config, Arc::clone(&navmesh), Arc::clone(&navigation)));

    let sim = &config.simulation;
    let mut pos = Vec3::new(sim.start[0], sim.start[1], sim.start[2]);
    navigation.set_current_pos(pos);
    info!("Start position: ({:.2}, {:.2}, {:.2})", pos.x, pos.y, pos.z);

    if let Some(goal) = args.goal {
        let dest = Destination::new(DestType::User, goal, config.navigation.destination_precision);
        if navigation.set_destination(dest) {
            info!("Goal: ({:.2}, {:.2}, {:.2})", goal.x, goal.y, goal.z);
        }
    }

    navmesh.start_updates(Duration::from_millis(config.navmesh.update_interval_ms))?;
    navigation.start()?;
    if args.explore {
        exploration.start()?;
    }

    let tick = Duration::from_millis(sim.tick_ms.max(1));
    let step = sim.speed * tick.as_secs_f32();
    let status_interval = Duration::from_secs_f32(sim.status_interval_secs.max(0.1));
    let started = Instant::now();
    let mut last_status = started;

    loop {
        std::thread::sleep(tick);

        if let Some(target) = navigation.go_to_position() {
            pos = step_towards(pos, target, step);
            navigation.set_current_pos(pos);
        }

        if last_status.elapsed() >= status_interval {
            last_status = Instant::now();
            let dest = navigation.destination();
            info!(
                "pos=({:.1}, {:.1}, {:.1}) dest={:?} stuck={} threat={} explored={:.1}%",
                pos.x,
                pos.y,
                pos.z,
                dest.map(|d| d.kind),
                navigation.anti_stuck_level(),
                navigation.is_in_threat(),
                exploration.get_global_explored_percent()
            );
        }

        if args.explore && exploration.explore_cells_count() > 0 && exploration.is_exploration_finished() {
            info!("Exploration completed successfully");
            break;
        }

        if !args.explore && args.goal.is_some() && navigation.destination().is_none() {
            info!("Goal reached");
            break;
        }

        if started.elapsed().as_secs_f32() >= args.duration {
            warn!("Run time limit of {:.0}s reached", args.duration);
            break;
        }
    }

    info!("Shutting down...");
    let timeout = Duration::from_millis(sim.stop_timeout_ms);
    if args.explore && !exploration.stop(timeout) {
        warn!("Exploration thread did not stop in time");
    }
    if !navigation.stop(timeout) {
        warn!("Navigation thread did not stop in time");
    }
    if !navmesh.stop_updates(timeout) {
        warn!("Navmesh thread did not stop in time");
    }

    if let Some(path) = &args.dump {
        match navmesh.dump_file(path) {
            Ok(()) => info!("Navmesh written to {:?}", path),
            Err(e) => error!("Failed to write navmesh: {}", e),
        }
    }

    info!("MargaNav finished");
    Ok(())
}
