//! Planet facade tying synthesis, meshing, erosion and streaming together

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};

use crate::chunk::{ChunkCoord, ChunkDescriptor};
use crate::config::PlanetConfig;
use crate::core::Result;
use crate::erosion::{BatchReport, HydraulicSimulator, Particle, ThermalReport, ThermalSimulator};
use crate::field::FieldHandle;
use crate::mesh::{ChunkMesh, MeshSink, MeshStats};
use crate::streaming::{build_chunk, StreamingController, TickReport};
use crate::terrain::FieldSynthesizer;

/// Outcome of [`Planet::erode`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErosionSummary {
    pub hydraulic: Vec<BatchReport>,
    pub thermal: Vec<ThermalReport>,
    /// Live chunks dropped so they rebuild against the eroded field.
    pub invalidated: usize,
}

/// One planet: its field, erosion state and live chunks.
pub struct Planet {
    config: PlanetConfig,
    synthesizer: Arc<FieldSynthesizer>,
    field: FieldHandle,
    controller: StreamingController,
    hydraulic: HydraulicSimulator,
    thermal: ThermalSimulator,
    builder_concurrency: Option<usize>,
}

impl Planet {
    /// Validate the configuration and synthesize the field.
    pub fn new(config: PlanetConfig) -> Result<Self> {
        config.validate()?;
        let synthesizer = Arc::new(synthesizer_for(&config));
        let field = FieldHandle::new(synthesizer.synthesize(config.geometry())?);
        let controller = StreamingController::new(&config, Arc::clone(&synthesizer))?;
        Ok(Self {
            hydraulic: HydraulicSimulator::new(config.hydraulic.clone(), config.planet.iso_level),
            thermal: ThermalSimulator::new(config.thermal.clone(), config.planet.iso_level),
            config,
            synthesizer,
            field,
            controller,
            builder_concurrency: None,
        })
    }

    /// Synthesize a standalone field for `config`.
    pub fn build_field(config: &PlanetConfig) -> Result<FieldHandle> {
        config.validate()?;
        let field = synthesizer_for(config).synthesize(config.geometry())?;
        Ok(FieldHandle::new(field))
    }

    pub fn config(&self) -> &PlanetConfig {
        &self.config
    }

    pub fn field(&self) -> &FieldHandle {
        &self.field
    }

    pub fn synthesizer(&self) -> &Arc<FieldSynthesizer> {
        &self.synthesizer
    }

    pub fn controller(&self) -> &StreamingController {
        &self.controller
    }

    /// Descriptor for a chunk at the configured fixed detail.
    pub fn descriptor(&self, coord: ChunkCoord) -> Result<ChunkDescriptor> {
        let s = &self.config.streaming;
        self.controller.layout().descriptor(coord, s.res_factor, s.add_noise)
    }

    /// Sample and mesh one chunk of `handle` without touching the live set.
    pub fn extract_chunk_mesh(&self, handle: &FieldHandle, desc: &ChunkDescriptor) -> Result<ChunkMesh> {
        let guard = handle.read();
        build_chunk(&*guard, self.controller.sampler(), self.controller.mesher(), desc)
    }

    /// Run `count` hydraulic particles against `handle`.
    pub fn run_hydraulic_batch(&mut self, handle: &FieldHandle, count: usize) -> Result<BatchReport> {
        self.hydraulic.run_on(handle, count)
    }

    /// One thermal sweep over `handle`.
    pub fn run_thermal_pass(&self, handle: &FieldHandle) -> Result<ThermalReport> {
        self.thermal.run_on(handle)
    }

    /// Final particle states of the last hydraulic batch.
    pub fn particles(&self) -> &[Particle] {
        self.hydraulic.particles()
    }

    /// Run hydraulic batches then thermal passes on the planet's own field,
    /// then drop every live chunk so the next ticks rebuild it.
    pub fn erode(&mut self, hydraulic_batches: usize, thermal_passes: usize, sink: &mut dyn MeshSink) -> Result<ErosionSummary> {
        let start = Instant::now();
        let particles = self.config.hydraulic.num_particles as usize;
        let mut summary = ErosionSummary::default();
        for _ in 0..hydraulic_batches {
            summary.hydraulic.push(self.hydraulic.run_on(&self.field, particles)?);
        }
        for _ in 0..thermal_passes {
            summary.thermal.push(self.thermal.run_on(&self.field)?);
        }
        summary.invalidated = self.controller.invalidate_all(sink);
        log::info!(
            "Erosion: {} hydraulic batches, {} thermal passes, {} chunks invalidated in {:.1}ms",
            hydraulic_batches,
            thermal_passes,
            summary.invalidated,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(summary)
    }

    /// Apply a new configuration: clear live chunks, then regenerate the field
    /// and swap it in.
    ///
    /// On error the planet keeps its previous configuration and field.
    pub fn rebuild(&mut self, config: PlanetConfig, sink: &mut dyn MeshSink) -> Result<()> {
        config.validate()?;
        let synthesizer = Arc::new(synthesizer_for(&config));
        let mut controller = StreamingController::new(&config, Arc::clone(&synthesizer))?;
        let density = synthesizer.synthesize(config.geometry())?;

        self.controller.invalidate_all(sink);
        self.field.replace(density);
        controller.set_parent_transform(self.controller.parent_transform(), sink);
        if let Some(max_concurrent) = self.builder_concurrency {
            controller.spawn_builder(&self.field, max_concurrent)?;
        }

        self.hydraulic = HydraulicSimulator::new(config.hydraulic.clone(), config.planet.iso_level);
        self.thermal = ThermalSimulator::new(config.thermal.clone(), config.planet.iso_level);
        self.controller = controller;
        self.synthesizer = synthesizer;
        self.config = config;
        log::info!("Planet rebuilt (field generation {})", self.field.generation());
        Ok(())
    }

    /// Synchronous streaming step for a viewer in parent space.
    pub fn tick(&mut self, viewer: Vec3, sink: &mut dyn MeshSink) -> TickReport {
        self.controller.tick(viewer, &self.field, sink)
    }

    pub fn set_parent_transform(&mut self, parent: Mat4, sink: &mut dyn MeshSink) {
        self.controller.set_parent_transform(parent, sink);
    }

    /// Move chunk builds onto a background runtime.
    pub fn spawn_builder(&mut self, max_concurrent: usize) -> Result<()> {
        self.controller.spawn_builder(&self.field, max_concurrent)?;
        self.builder_concurrency = Some(max_concurrent);
        Ok(())
    }

    /// Background streaming step: integrate finished builds, then schedule
    /// more.
    pub fn tick_background(&mut self, viewer: Vec3, sink: &mut dyn MeshSink) -> Result<TickReport> {
        let mut report = self.controller.integrate(&self.field, sink)?;
        let scheduled = self.controller.schedule(viewer, &self.field, sink)?;
        report.destroyed.extend(scheduled.destroyed);
        report.failed.extend(scheduled.failed);
        report.scheduled = scheduled.scheduled;
        report.deferred = scheduled.deferred;
        Ok(report)
    }

    /// Wait for outstanding background builds and integrate them.
    pub fn finish_background(&mut self, sink: &mut dyn MeshSink, timeout: Duration) -> Result<TickReport> {
        self.controller.integrate_blocking(&self.field, sink, timeout)
    }

    pub fn invalidate_all(&mut self, sink: &mut dyn MeshSink) -> usize {
        self.controller.invalidate_all(sink)
    }

    pub fn retry_failed(&mut self) -> usize {
        self.controller.retry_failed()
    }

    pub fn terrain_stats(&self) -> MeshStats {
        self.controller.terrain_stats()
    }
}

fn synthesizer_for(config: &PlanetConfig) -> FieldSynthesizer {
    FieldSynthesizer::new(config.planet.radius, config.planet.fill_radius, config.noise.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldRead;
    use crate::mesh::CollectingSink;

    fn small_config() -> PlanetConfig {
        let mut config = PlanetConfig::default();
        config.planet.radius = 20.0;
        config.planet.atmosphere = 12.0;
        config.planet.radial_range = 6.0;
        config.planet.global_res = 32;
        config.noise.amplitude = 2.0;
        config.noise.frequency = 0.1;
        config.noise.mask_start_radius = 10.0;
        config.noise.mask_end_radius = 30.0;
        config.streaming.chunk_res = 4;
        config.streaming.chunks_per_update = 64;
        config.streaming.view_range = 500.0;
        config.hydraulic.num_particles = 64;
        config.hydraulic.starting_radius = 26.0;
        config.hydraulic.max_steps = 32;
        config
    }

    fn drain(planet: &mut Planet, sink: &mut CollectingSink) {
        while !planet.tick(Vec3::ZERO, sink).built.is_empty() {}
    }

    #[test]
    fn test_build_field_is_solid_inside() {
        let config = small_config();
        let handle = Planet::build_field(&config).unwrap();
        let field = handle.read();
        let c = field.geometry().center_grid().as_uvec3();
        assert!(field.get(c.x, c.y, c.z) < 0.0);
        assert!(field.get(0, 0, 0) > 0.0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = small_config();
        config.streaming.chunk_res = 5;
        assert!(Planet::new(config.clone()).is_err());
        assert!(Planet::build_field(&config).is_err());
    }

    #[test]
    fn test_extract_chunk_mesh_matches_streamed_mesh() {
        let mut planet = Planet::new(small_config()).unwrap();
        let mut sink = CollectingSink::default();
        drain(&mut planet, &mut sink);

        let coord = planet
            .controller()
            .active_coords()
            .find(|c| planet.controller().mesh(*c).is_some_and(|m| !m.is_empty()))
            .unwrap();
        let desc = planet.descriptor(coord).unwrap();
        let mesh = planet.extract_chunk_mesh(planet.field(), &desc).unwrap();
        let live = planet.controller().mesh(coord).unwrap();
        // Vertex numbering depends on thread scheduling, counts do not
        assert_eq!(mesh.vertex_count(), live.vertex_count());
        assert_eq!(mesh.triangle_count(), live.triangle_count());
    }

    #[test]
    fn test_erode_invalidates_and_rebuilds() {
        let mut planet = Planet::new(small_config()).unwrap();
        let mut sink = CollectingSink::default();
        drain(&mut planet, &mut sink);
        let live = planet.controller().active_count();
        assert!(live > 0);

        let summary = planet.erode(1, 1, &mut sink).unwrap();
        assert_eq!(summary.hydraulic.len(), 1);
        assert_eq!(summary.thermal.len(), 1);
        assert_eq!(summary.invalidated, live);
        assert_eq!(planet.particles().len(), 64);
        assert!(sink.meshes.is_empty());

        drain(&mut planet, &mut sink);
        assert_eq!(planet.controller().active_count(), live);
        let snapshot = planet.field().read().snapshot().unwrap();
        assert!(snapshot.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_rebuild_swaps_field_and_clears_chunks() {
        let mut planet = Planet::new(small_config()).unwrap();
        let mut sink = CollectingSink::default();
        planet.tick(Vec3::ZERO, &mut sink);
        let generation = planet.field().generation();

        let mut bigger = small_config();
        bigger.planet.radius = 22.0;
        planet.rebuild(bigger, &mut sink).unwrap();

        assert_eq!(planet.field().generation(), generation + 1);
        assert_eq!(planet.controller().active_count(), 0);
        assert!(sink.meshes.is_empty());
        assert_eq!(planet.config().planet.radius, 22.0);

        let mut broken = small_config();
        broken.planet.global_res = 0;
        assert!(planet.rebuild(broken, &mut sink).is_err());
        assert_eq!(planet.config().planet.radius, 22.0);
        assert_eq!(planet.field().generation(), generation + 1);
    }

    #[test]
    fn test_background_streaming_drains_candidates() {
        let mut planet = Planet::new(small_config()).unwrap();
        let mut sink = CollectingSink::default();
        planet.spawn_builder(2).unwrap();

        let total = planet.controller().candidates().len();
        let mut built = 0;
        for _ in 0..1000 {
            let report = planet.tick_background(Vec3::ZERO, &mut sink).unwrap();
            built += report.built.len();
            if report.scheduled.is_empty() {
                built += planet.finish_background(&mut sink, Duration::from_secs(60)).unwrap().built.len();
                if planet.controller().active_count() == total {
                    break;
                }
            }
        }
        assert_eq!(built, total);
        assert_eq!(planet.controller().active_count(), total);
    }
}
