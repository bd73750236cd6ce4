//! Planet generator binary: synthesizes, erodes and streams a planet, then
//! prints surface statistics.
//!
//! Usage: cargo run --release --bin generate_planet -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>       JSON planet configuration (flags below override it)
//!   --radius <R>          Planet radius
//!   --res <N>             Global lattice resolution
//!   --chunk-res <N>       Lattice cells per chunk
//!   --seed <SEED>         Noise seed
//!   --hydraulic <N>       Hydraulic batches to run (default: 1)
//!   --thermal <N>         Thermal passes to run (default: 1)
//!   --jobs <N>            Worker threads (default: 4)
//!   --background          Stream through the background builder
//!   --save-config <PATH>  Write the effective configuration as JSON

use std::path::PathBuf;
use std::time::{Duration, Instant};

use glam::Vec3;

use planetoid::config::PlanetConfig;
use planetoid::mesh::CollectingSink;
use planetoid::{Planet, Result};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    if let Err(e) = run() {
        eprintln!("generate_planet: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let jobs = parse_usize_arg(&args, "--jobs").unwrap_or(4);
    let hydraulic_batches = parse_usize_arg(&args, "--hydraulic").unwrap_or(1);
    let thermal_passes = parse_usize_arg(&args, "--thermal").unwrap_or(1);
    let background = args.iter().any(|a| a == "--background");

    // Limit rayon's thread pool to cap peak memory usage
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
        log::warn!("Thread pool already configured: {}", e);
    }

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => PlanetConfig::load(&PathBuf::from(path))?,
        None => PlanetConfig::default(),
    };
    if let Some(radius) = parse_f32_arg(&args, "--radius") {
        config.planet.radius = radius;
    }
    if let Some(res) = parse_u32_arg(&args, "--res") {
        config.planet.global_res = res;
    }
    if let Some(chunk_res) = parse_u32_arg(&args, "--chunk-res") {
        config.streaming.chunk_res = chunk_res;
    }
    if let Some(seed) = parse_u32_arg(&args, "--seed") {
        config.noise.seed = seed;
        config.hydraulic.seed = seed as u64;
    }
    config.validate()?;
    if let Some(path) = parse_str_arg(&args, "--save-config") {
        config.save(&PathBuf::from(path))?;
    }

    println!("=== Planetoid Generator ===");
    println!("Radius:  {} (+{} atmosphere)", config.planet.radius, config.planet.atmosphere);
    println!("Lattice: {}^3 points, {} chunks per axis", config.planet.global_res + 1, config.chunks_per_axis());
    println!("Seed:    {}", config.noise.seed);
    println!("Erosion: {} hydraulic x {} particles, {} thermal", hydraulic_batches, config.hydraulic.num_particles, thermal_passes);
    println!("Jobs:    {} parallel{}", jobs, if background { ", background builds" } else { "" });
    println!();

    let start = Instant::now();
    let mut planet = Planet::new(config)?;
    let mut sink = CollectingSink::default();
    println!("Field synthesized in {:.2}s", start.elapsed().as_secs_f64());

    let erode_start = Instant::now();
    let summary = planet.erode(hydraulic_batches, thermal_passes, &mut sink)?;
    let eroded: f64 = summary.hydraulic.iter().map(|b| b.eroded).sum();
    let deposited: f64 = summary.hydraulic.iter().map(|b| b.deposited).sum();
    let transfers: usize = summary.thermal.iter().map(|t| t.transfers).sum();
    println!(
        "Erosion done in {:.2}s: eroded {:.2}, deposited {:.2}, {} thermal transfers",
        erode_start.elapsed().as_secs_f64(),
        eroded,
        deposited,
        transfers
    );

    // The viewer sits at the planet center so every candidate is in range
    let viewer = Vec3::ZERO;
    let stream_start = Instant::now();
    let total = planet.controller().candidates().len();
    let mut ticks = 0usize;
    if background {
        planet.spawn_builder(jobs)?;
        loop {
            ticks += 1;
            let report = planet.tick_background(viewer, &mut sink)?;
            if report.scheduled.is_empty() && report.built.is_empty() {
                planet.finish_background(&mut sink, Duration::from_secs(300))?;
                if planet.tick_background(viewer, &mut sink)?.is_idle() {
                    break;
                }
            }
        }
    } else {
        loop {
            ticks += 1;
            if planet.tick(viewer, &mut sink).is_idle() {
                break;
            }
        }
    }
    let elapsed = stream_start.elapsed().as_secs_f64();
    println!(
        "Streamed {}/{} chunks in {} ticks, {:.2}s ({:.0} chunks/sec)",
        planet.controller().active_count(),
        total,
        ticks,
        elapsed,
        planet.controller().active_count() as f64 / elapsed.max(1e-9)
    );
    let failed = planet.controller().failed().count();
    if failed > 0 {
        println!("{} chunks failed to build", failed);
    }

    let stats = planet.terrain_stats();
    println!();
    println!("=== Surface ===");
    println!("Chunks with geometry: {}", sink.meshes.len());
    println!("Vertices:  {}", stats.vertex_count);
    println!("Triangles: {}", stats.triangle_count);
    if stats.vertex_count > 0 {
        println!("Radius:    {:.3} .. {:.3}", stats.min_radius, stats.max_radius);
        println!("Relief:    {:.3}", stats.height_delta());
    }
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
