//! Active chunk set management
//!
//! Each tick expires chunks the viewer moved away from, ranks the remaining
//! candidates by viewer distance and builds the closest ones up to the
//! per-tick budget. Anything over budget stays a candidate for the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Mat4, Vec3};

use super::budget::{BuildBudget, MemoryBudget};
use super::chunk_builder::{build_chunk, BuildResult, ChunkBuilder};
use super::priority::ChunkPriorityQueue;
use crate::chunk::{ChunkCoord, ChunkDescriptor, ChunkLayout, ChunkSampler};
use crate::config::{PlanetConfig, StreamingParams};
use crate::core::{dispatch, Error, Result};
use crate::field::{DensityField, FieldHandle};
use crate::mesh::{ChunkMesh, MeshSink, MeshStats, SurfaceMesher};
use crate::terrain::FieldSynthesizer;

/// What one tick changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Chunks that became live.
    pub built: Vec<ChunkCoord>,
    /// Chunks removed from the live set.
    pub destroyed: Vec<ChunkCoord>,
    /// Chunks whose build failed; they stay blocked until retried.
    pub failed: Vec<ChunkCoord>,
    /// Chunks handed to the background builder.
    pub scheduled: Vec<ChunkCoord>,
    /// Candidates in range left for later ticks.
    pub deferred: usize,
}

impl TickReport {
    /// True when nothing was built, destroyed, failed or scheduled.
    pub fn is_idle(&self) -> bool {
        self.built.is_empty() && self.destroyed.is_empty() && self.failed.is_empty() && self.scheduled.is_empty()
    }
}

struct LiveChunk {
    mesh: ChunkMesh,
    res_factor: u32,
}

/// Owns the live chunk meshes of one planet.
pub struct StreamingController {
    params: StreamingParams,
    layout: ChunkLayout,
    sampler: ChunkSampler,
    mesher: SurfaceMesher,
    candidates: Vec<ChunkCoord>,
    active: HashMap<ChunkCoord, LiveChunk>,
    failed: HashMap<ChunkCoord, String>,
    parent: Mat4,
    parent_inverse: Mat4,
    queue: ChunkPriorityQueue,
    builds: BuildBudget,
    memory: MemoryBudget,
    builder: Option<ChunkBuilder>,
}

impl StreamingController {
    pub fn new(config: &PlanetConfig, synthesizer: Arc<FieldSynthesizer>) -> Result<Self> {
        config.validate()?;
        let params = config.streaming.clone();
        let layout = ChunkLayout::new(config.geometry(), params.chunk_res)?;
        let candidates = params
            .window
            .candidates(&layout, config.planet.radius, config.planet.radial_range);
        log::info!(
            "Streaming {} candidate chunks of {} ({:?} window)",
            candidates.len(),
            layout.chunks_per_axis().pow(3),
            params.window
        );

        Ok(Self {
            queue: ChunkPriorityQueue::new(params.view_range),
            builds: BuildBudget::new(params.chunks_per_update as usize),
            memory: MemoryBudget::new(params.mesh_memory_mb),
            sampler: ChunkSampler::new(synthesizer),
            mesher: SurfaceMesher::new(config.mesh.clone(), config.planet.iso_level),
            params,
            layout,
            candidates,
            active: HashMap::new(),
            failed: HashMap::new(),
            parent: Mat4::IDENTITY,
            parent_inverse: Mat4::IDENTITY,
            builder: None,
        })
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn sampler(&self) -> &ChunkSampler {
        &self.sampler
    }

    pub fn mesher(&self) -> &SurfaceMesher {
        &self.mesher
    }

    /// Every coordinate that passes the candidate window.
    pub fn candidates(&self) -> &[ChunkCoord] {
        &self.candidates
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, coord: ChunkCoord) -> bool {
        self.active.contains_key(&coord)
    }

    pub fn active_coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.active.keys().copied()
    }

    /// Planet-space mesh of a live chunk.
    pub fn mesh(&self, coord: ChunkCoord) -> Option<&ChunkMesh> {
        self.active.get(&coord).map(|live| &live.mesh)
    }

    /// Resolution factor a live chunk was built with.
    pub fn res_factor(&self, coord: ChunkCoord) -> Option<u32> {
        self.active.get(&coord).map(|live| live.res_factor)
    }

    /// Blocked chunks and the error that blocked them.
    pub fn failed(&self) -> impl Iterator<Item = (ChunkCoord, &str)> + '_ {
        self.failed.iter().map(|(c, e)| (*c, e.as_str()))
    }

    pub fn memory(&self) -> &MemoryBudget {
        &self.memory
    }

    /// Cap live mesh memory at `bytes`, 0 for unlimited.
    ///
    /// Live chunks are kept when the new cap is already exceeded; new builds
    /// wait until invalidation or expiry frees room.
    pub fn set_mesh_memory_limit(&mut self, bytes: usize) {
        self.memory.set_limit(bytes);
    }

    pub fn parent_transform(&self) -> Mat4 {
        self.parent
    }

    /// Move the planet in its parent space and resubmit live meshes.
    pub fn set_parent_transform(&mut self, parent: Mat4, sink: &mut dyn MeshSink) {
        self.parent = parent;
        self.parent_inverse = parent.inverse();
        for (coord, live) in &self.active {
            submit(sink, *coord, &live.mesh, &self.parent);
        }
    }

    /// Convert a parent-space position into planet space.
    pub fn to_planet_space(&self, world: Vec3) -> Vec3 {
        self.parent_inverse.transform_point3(world)
    }

    /// One synchronous streaming step for a viewer in parent space.
    pub fn tick(&mut self, viewer: Vec3, field: &FieldHandle, sink: &mut dyn MeshSink) -> TickReport {
        let start = Instant::now();
        let viewer = self.to_planet_space(viewer);
        let mut report = TickReport::default();

        self.expire(viewer, sink, &mut report);
        let selected = self.select(viewer, &mut report);
        if !selected.is_empty() {
            let guard = field.read();
            let density: &DensityField = &guard;
            let (sampler, mesher) = (&self.sampler, &self.mesher);
            let results = dispatch::map_indices(selected.len(), |i| build_chunk(density, sampler, mesher, &selected[i]));
            drop(guard);

            for (desc, result) in selected.iter().zip(results) {
                match result {
                    Ok(mesh) => self.insert(mesh, desc.res_factor, sink, &mut report),
                    Err(e) => self.block(desc.coord, e.to_string(), &mut report),
                }
            }
        }

        if !report.is_idle() {
            log::debug!(
                "Tick: built {}, destroyed {}, failed {}, deferred {} in {:.1}ms ({} live, memory {:.0}%)",
                report.built.len(),
                report.destroyed.len(),
                report.failed.len(),
                report.deferred,
                start.elapsed().as_secs_f64() * 1000.0,
                self.active.len(),
                self.memory.pressure() * 100.0
            );
        }
        report
    }

    /// Destroy live chunks beyond the view range and cancel their pending builds.
    fn expire(&mut self, viewer: Vec3, sink: &mut dyn MeshSink, report: &mut TickReport) {
        let range = self.params.view_range;
        let layout = self.layout;
        let mut gone: Vec<ChunkCoord> = self
            .active
            .keys()
            .copied()
            .filter(|c| viewer.distance(layout.center(*c)) > range)
            .collect();
        gone.sort();
        for coord in gone {
            self.remove(coord, sink);
            report.destroyed.push(coord);
        }

        if let Some(builder) = &mut self.builder {
            let stale: Vec<_> = builder
                .pending()
                .filter(|c| viewer.distance(layout.center(*c)) > range)
                .collect();
            for coord in stale {
                builder.cancel(coord);
            }
        }
    }

    /// Pick this tick's builds, closest first, within budget.
    fn select(&mut self, viewer: Vec3, report: &mut TickReport) -> Vec<ChunkDescriptor> {
        let active = &self.active;
        let failed = &self.failed;
        let builder = self.builder.as_ref();
        self.queue.update(&self.candidates, &self.layout, viewer, |c| {
            active.contains_key(&c) || failed.contains_key(&c) || builder.is_some_and(|b| b.is_pending(c))
        });

        let mut selected = Vec::new();
        self.builds.reset();
        if self.memory.is_exhausted() {
            report.deferred = self.queue.len();
            return selected;
        }
        while self.builds.try_spend() {
            let Some(next) = self.queue.pop() else {
                break;
            };
            let lod = self
                .params
                .lod
                .choose(next.distance, self.params.res_factor, self.params.add_noise);
            match self.layout.descriptor(next.coord, lod.res_factor, lod.add_noise) {
                Ok(desc) => selected.push(desc),
                Err(e) => self.block(next.coord, e.to_string(), report),
            }
        }
        report.deferred = self.queue.len();
        selected
    }

    fn insert(&mut self, mesh: ChunkMesh, res_factor: u32, sink: &mut dyn MeshSink, report: &mut TickReport) {
        let coord = mesh.coord;
        if self.active.contains_key(&coord) {
            return;
        }
        submit(sink, coord, &mesh, &self.parent);
        self.memory.add(mesh.memory_bytes());
        self.active.insert(coord, LiveChunk { mesh, res_factor });
        report.built.push(coord);
    }

    fn block(&mut self, coord: ChunkCoord, error: String, report: &mut TickReport) {
        log::warn!("Chunk {:?} failed to build: {}", coord, error);
        self.failed.insert(coord, error);
        report.failed.push(coord);
    }

    fn remove(&mut self, coord: ChunkCoord, sink: &mut dyn MeshSink) -> bool {
        match self.active.remove(&coord) {
            Some(live) => {
                self.memory.remove(live.mesh.memory_bytes());
                sink.release(coord);
                true
            }
            None => false,
        }
    }

    /// Drop one live chunk so the next tick rebuilds it.
    pub fn invalidate(&mut self, coord: ChunkCoord, sink: &mut dyn MeshSink) -> bool {
        if let Some(builder) = &mut self.builder {
            builder.cancel(coord);
        }
        self.remove(coord, sink)
    }

    /// Drop every live chunk and cancel pending builds. Returns how many were live.
    pub fn invalidate_all(&mut self, sink: &mut dyn MeshSink) -> usize {
        if let Some(builder) = &mut self.builder {
            builder.cancel_all();
        }
        let mut coords: Vec<_> = self.active.keys().copied().collect();
        coords.sort();
        for coord in &coords {
            self.remove(*coord, sink);
        }
        self.memory.clear();
        coords.len()
    }

    /// Unblock every failed chunk. Returns how many were unblocked.
    pub fn retry_failed(&mut self) -> usize {
        let count = self.failed.len();
        self.failed.clear();
        count
    }

    /// Radial extent over all live meshes.
    pub fn terrain_stats(&self) -> MeshStats {
        let mut stats = MeshStats::default();
        for live in self.active.values() {
            stats.include(&live.mesh, Vec3::ZERO);
        }
        stats
    }

    /// Start building in the background against `field`.
    pub fn spawn_builder(&mut self, field: &FieldHandle, max_concurrent: usize) -> Result<()> {
        let builder = ChunkBuilder::new(field.clone(), self.sampler.clone(), self.mesher.clone(), max_concurrent)?;
        self.builder = Some(builder);
        Ok(())
    }

    pub fn has_builder(&self) -> bool {
        self.builder.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.builder.as_ref().map_or(0, |b| b.pending_count())
    }

    /// Background counterpart of [`tick`](Self::tick): expire, then hand this
    /// tick's builds to the builder instead of running them.
    pub fn schedule(&mut self, viewer: Vec3, field: &FieldHandle, sink: &mut dyn MeshSink) -> Result<TickReport> {
        if self.builder.is_none() {
            return Err(Error::Streaming("no background builder running".into()));
        }
        let viewer = self.to_planet_space(viewer);
        let mut report = TickReport::default();
        self.expire(viewer, sink, &mut report);
        let selected = self.select(viewer, &mut report);

        let generation = field.generation();
        if let Some(builder) = &mut self.builder {
            for desc in selected {
                let priority = 1.0 / (viewer.distance(self.layout.center(desc.coord)) + 1.0);
                if builder.request(desc, priority, generation) {
                    report.scheduled.push(desc.coord);
                }
            }
        }
        Ok(report)
    }

    /// Take finished background builds into the live set.
    ///
    /// Results built against an older field generation are discarded. Any
    /// write to the field, erosion included, starts a new generation.
    pub fn integrate(&mut self, field: &FieldHandle, sink: &mut dyn MeshSink) -> Result<TickReport> {
        let results = match &mut self.builder {
            Some(builder) => builder.poll_results(),
            None => return Err(Error::Streaming("no background builder running".into())),
        };
        Ok(self.integrate_results(results, field.generation(), sink))
    }

    /// Wait for all pending background builds, then integrate them.
    pub fn integrate_blocking(&mut self, field: &FieldHandle, sink: &mut dyn MeshSink, timeout: Duration) -> Result<TickReport> {
        let results = match &mut self.builder {
            Some(builder) => builder.wait_all(timeout),
            None => return Err(Error::Streaming("no background builder running".into())),
        };
        Ok(self.integrate_results(results, field.generation(), sink))
    }

    fn integrate_results(&mut self, results: Vec<BuildResult>, generation: u64, sink: &mut dyn MeshSink) -> TickReport {
        let mut report = TickReport::default();
        for result in results {
            if result.generation() != generation {
                log::debug!("Discarding stale build of {:?}", result.coord());
                continue;
            }
            match result {
                BuildResult::Built { mesh, res_factor, .. } => self.insert(mesh, res_factor, sink, &mut report),
                BuildResult::Failed { coord, error, .. } => self.block(coord, error, &mut report),
                // Nothing was built; the chunk is a candidate again next schedule
                BuildResult::Stale { coord, .. } => log::debug!("Build of {:?} skipped, field changed", coord),
            }
        }
        report
    }
}

fn submit(sink: &mut dyn MeshSink, coord: ChunkCoord, mesh: &ChunkMesh, parent: &Mat4) {
    if !mesh.is_empty() {
        sink.submit(coord, &mesh.positions, &mesh.normals, mesh.indices(), parent);
    }
}
