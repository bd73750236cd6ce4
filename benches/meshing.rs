use criterion::{criterion_group, criterion_main, Criterion, black_box};

use planetoid::chunk::ChunkCoord;
use planetoid::config::PlanetConfig;
use planetoid::erosion::{HydraulicSimulator, ThermalSimulator};
use planetoid::field::{DensityField, FieldRead};
use planetoid::terrain::FieldSynthesizer;
use planetoid::Planet;

fn bench_config() -> PlanetConfig {
    let mut config = PlanetConfig::default();
    config.planet.radius = 40.0;
    config.planet.atmosphere = 8.0;
    config.planet.global_res = 64;
    config.streaming.chunk_res = 8;
    config.noise.amplitude = 4.0;
    config.noise.frequency = 0.05;
    config.noise.mask_start_radius = 20.0;
    config.noise.mask_end_radius = 60.0;
    config.hydraulic.starting_radius = 46.0;
    config
}

/// A chunk on the +X surface of the bench planet.
fn surface_coord() -> ChunkCoord {
    // 64 / 8 = 8 chunks per axis; chunk 7 on x spans [36, 48]
    ChunkCoord::new(7, 3, 3)
}

fn bench_field_synthesis(c: &mut Criterion) {
    let config = bench_config();
    let synthesizer = FieldSynthesizer::new(config.planet.radius, config.planet.fill_radius, config.noise.clone());
    let geometry = config.geometry();

    c.bench_function("synthesize_65", |b| {
        b.iter(|| synthesizer.synthesize(black_box(geometry)))
    });
}

fn bench_extract_chunk(c: &mut Criterion) {
    let config = bench_config();
    let Ok(planet) = Planet::new(config) else {
        return;
    };
    let coord = surface_coord();

    for res_factor in [0u32, 1] {
        let Ok(desc) = planet.controller().layout().descriptor(coord, res_factor, res_factor > 0) else {
            continue;
        };
        c.bench_function(&format!("extract_chunk_rf{}", res_factor), |b| {
            b.iter(|| planet.extract_chunk_mesh(planet.field(), black_box(&desc)))
        });
    }
}

fn bench_thermal_pass(c: &mut Criterion) {
    let config = bench_config();
    let Ok(handle) = Planet::build_field(&config) else {
        return;
    };
    let thermal = ThermalSimulator::new(config.thermal.clone(), config.planet.iso_level);

    c.bench_function("thermal_pass_65", |b| {
        b.iter(|| thermal.run_on(black_box(&handle)))
    });
}

fn bench_hydraulic_batch(c: &mut Criterion) {
    let mut config = bench_config();
    config.hydraulic.max_steps = 64;
    let Ok(handle) = Planet::build_field(&config) else {
        return;
    };
    let Ok(pristine) = handle.read().snapshot() else {
        return;
    };
    let geometry = config.geometry();
    let mut hydraulic = HydraulicSimulator::new(config.hydraulic.clone(), config.planet.iso_level);

    c.bench_function("hydraulic_batch_256", |b| {
        b.iter(|| {
            let field = DensityField::from_values(geometry, pristine.values().to_vec())?;
            hydraulic.run_batch(black_box(&field), 256)
        })
    });
}

criterion_group!(
    benches,
    bench_field_synthesis,
    bench_extract_chunk,
    bench_thermal_pass,
    bench_hydraulic_batch,
);
criterion_main!(benches);
