//! Background chunk builds with priority-based concurrency
//!
//! Builds run on a dedicated tokio runtime. A worker task keeps at most
//! `max_concurrent` builds in flight, each on the blocking pool since sampling
//! and meshing are CPU bound.
//!
//! Every request gets a ticket. A result is only handed out while its ticket
//! is still the pending one for that chunk, so a cancelled or superseded build
//! can never be mistaken for a later request of the same chunk.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::chunk::{ChunkCoord, ChunkDescriptor, ChunkSampler};
use crate::core::Result;
use crate::field::{FieldHandle, FieldRead};
use crate::mesh::{ChunkMesh, SurfaceMesher};

/// Sample and mesh one chunk against a field.
pub fn build_chunk<F: FieldRead + ?Sized>(
    field: &F,
    sampler: &ChunkSampler,
    mesher: &SurfaceMesher,
    desc: &ChunkDescriptor,
) -> Result<ChunkMesh> {
    let lattice = sampler.sample(field, desc)?;
    mesher.mesh_chunk(&lattice, desc)
}

/// Request to build a chunk with priority
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub desc: ChunkDescriptor,
    pub priority: f32,
    /// Field generation the request was made against.
    pub generation: u64,
    pub ticket: u64,
}

/// Result of a background build
#[derive(Debug)]
pub enum BuildResult {
    Built {
        mesh: ChunkMesh,
        res_factor: u32,
        generation: u64,
        ticket: u64,
    },
    Failed {
        coord: ChunkCoord,
        error: String,
        generation: u64,
        ticket: u64,
    },
    /// The field changed between request and build; nothing was built.
    Stale {
        coord: ChunkCoord,
        generation: u64,
        ticket: u64,
    },
}

impl BuildResult {
    pub fn coord(&self) -> ChunkCoord {
        match self {
            BuildResult::Built { mesh, .. } => mesh.coord,
            BuildResult::Failed { coord, .. } | BuildResult::Stale { coord, .. } => *coord,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            BuildResult::Built { generation, .. }
            | BuildResult::Failed { generation, .. }
            | BuildResult::Stale { generation, .. } => *generation,
        }
    }

    pub fn ticket(&self) -> u64 {
        match self {
            BuildResult::Built { ticket, .. }
            | BuildResult::Failed { ticket, .. }
            | BuildResult::Stale { ticket, .. } => *ticket,
        }
    }
}

/// Shared state every build task needs.
#[derive(Clone)]
struct BuildContext {
    field: FieldHandle,
    sampler: ChunkSampler,
    mesher: SurfaceMesher,
}

impl BuildContext {
    fn run(&self, request: BuildRequest) -> BuildResult {
        let coord = request.desc.coord;
        let generation = request.generation;
        let ticket = request.ticket;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let guard = self.field.read();
            // Writers bump the generation while holding the write guard
            if self.field.generation() != generation {
                return None;
            }
            Some(build_chunk(&*guard, &self.sampler, &self.mesher, &request.desc))
        }));
        match outcome {
            Ok(Some(Ok(mesh))) => BuildResult::Built {
                mesh,
                res_factor: request.desc.res_factor,
                generation,
                ticket,
            },
            Ok(Some(Err(e))) => BuildResult::Failed {
                coord,
                error: e.to_string(),
                generation,
                ticket,
            },
            Ok(None) => BuildResult::Stale { coord, generation, ticket },
            Err(_) => BuildResult::Failed {
                coord,
                error: "chunk build panicked".into(),
                generation,
                ticket,
            },
        }
    }
}

/// Concurrent background chunk builder
pub struct ChunkBuilder {
    /// Channel for sending build requests to the worker task
    request_tx: Option<mpsc::UnboundedSender<BuildRequest>>,
    /// Channel for receiving build results
    result_rx: mpsc::UnboundedReceiver<BuildResult>,
    /// Ticket of the live request for each chunk not yet polled
    pending: HashMap<ChunkCoord, u64>,
    next_ticket: u64,
    runtime: Option<Runtime>,
}

impl ChunkBuilder {
    /// Start a builder with its own runtime.
    ///
    /// # Arguments
    /// * `field` - Field the builds read from
    /// * `max_concurrent` - Maximum number of builds in flight
    pub fn new(
        field: FieldHandle,
        sampler: ChunkSampler,
        mesher: SurfaceMesher,
        max_concurrent: usize,
    ) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<BuildRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<BuildResult>();

        let runtime = Runtime::new()?;
        let context = Arc::new(BuildContext { field, sampler, mesher });
        runtime.spawn(Self::worker_loop(context, max_concurrent.max(1), request_rx, result_tx));

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            pending: HashMap::new(),
            next_ticket: 0,
            runtime: Some(runtime),
        })
    }

    /// Worker loop that processes build requests with concurrency control
    async fn worker_loop(
        context: Arc<BuildContext>,
        max_concurrent: usize,
        mut request_rx: mpsc::UnboundedReceiver<BuildRequest>,
        result_tx: mpsc::UnboundedSender<BuildResult>,
    ) {
        let mut active_tasks = JoinSet::new();
        let mut queued: Vec<BuildRequest> = Vec::new();
        let mut open = true;

        loop {
            tokio::select! {
                request = request_rx.recv(), if open => match request {
                    Some(request) => queued.push(request),
                    None => open = false,
                },

                Some(joined) = active_tasks.join_next(), if !active_tasks.is_empty() => {
                    match joined {
                        Ok(result) => {
                            if result_tx.send(result).is_err() {
                                break;
                            }
                        }
                        Err(e) => log::error!("Chunk build task failed to join: {}", e),
                    }
                }

                // Channel closed and nothing in flight
                else => break,
            }

            while active_tasks.len() < max_concurrent && !queued.is_empty() {
                // Highest priority last so it pops cheaply
                queued.sort_by(|a, b| a.priority.total_cmp(&b.priority));
                let Some(request) = queued.pop() else {
                    break;
                };
                let context = Arc::clone(&context);
                active_tasks.spawn_blocking(move || context.run(request));
            }
        }
    }

    /// Request a chunk build
    ///
    /// Returns `false` if the chunk is already pending, `true` if the request was queued.
    pub fn request(&mut self, desc: ChunkDescriptor, priority: f32, generation: u64) -> bool {
        let coord = desc.coord;
        if self.pending.contains_key(&coord) {
            return false;
        }
        let Some(tx) = &self.request_tx else {
            return false;
        };
        let ticket = self.next_ticket;
        if tx.send(BuildRequest { desc, priority, generation, ticket }).is_err() {
            log::error!("Chunk builder worker is gone; dropping request for {:?}", coord);
            return false;
        }
        self.next_ticket += 1;
        self.pending.insert(coord, ticket);
        true
    }

    fn accept(&mut self, result: BuildResult) -> Option<BuildResult> {
        let coord = result.coord();
        if self.pending.get(&coord) != Some(&result.ticket()) {
            // Cancelled or superseded; dropping the result releases its buffers
            log::debug!("Dropping build of {:?} with ticket {}", coord, result.ticket());
            return None;
        }
        self.pending.remove(&coord);
        Some(result)
    }

    /// Completed results, without blocking.
    pub fn poll_results(&mut self) -> Vec<BuildResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            if let Some(result) = self.accept(result) {
                results.push(result);
            }
        }
        results
    }

    /// Block until every pending build has reported or `timeout` passes.
    pub fn wait_all(&mut self, timeout: Duration) -> Vec<BuildResult> {
        let mut results = Vec::new();
        let deadline = std::time::Instant::now() + timeout;
        while !self.pending.is_empty() {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            let Some(runtime) = &self.runtime else {
                break;
            };
            let rx = &mut self.result_rx;
            let received = runtime.block_on(async { tokio::time::timeout(left, rx.recv()).await });
            match received {
                Ok(Some(result)) => {
                    if let Some(result) = self.accept(result) {
                        results.push(result);
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        results
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, coord: ChunkCoord) -> bool {
        self.pending.contains_key(&coord)
    }

    pub fn pending(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.pending.keys().copied()
    }

    /// Cancel a pending build
    ///
    /// A build already running finishes, but its result is discarded when it
    /// arrives, even if the chunk has been requested again since.
    pub fn cancel(&mut self, coord: ChunkCoord) {
        self.pending.remove(&coord);
    }

    /// Cancel every pending build.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }
}

impl Drop for ChunkBuilder {
    fn drop(&mut self) {
        // Closing the request channel lets the worker exit
        self.request_tx.take();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkLayout;
    use crate::config::MeshParams;
    use crate::field::{DensityField, FieldGeometry};
    use crate::terrain::{FieldSynthesizer, NoiseParams};

    fn setup() -> (FieldHandle, ChunkSampler, SurfaceMesher, ChunkLayout) {
        let geometry = FieldGeometry::centered(16, 16.0);
        let values = (0..geometry.len())
            .map(|i| geometry.world_position(geometry.coords(i)).length() - 10.0)
            .collect();
        let field = FieldHandle::new(DensityField::from_values(geometry, values).unwrap());
        let synth = Arc::new(FieldSynthesizer::new(10.0, 0.0, NoiseParams::default()));
        let layout = ChunkLayout::new(geometry, 4).unwrap();
        (field, ChunkSampler::new(synth), SurfaceMesher::new(MeshParams::default(), 0.0), layout)
    }

    #[test]
    fn test_build_chunk_on_surface() {
        let (field, sampler, mesher, layout) = setup();
        // Spans x in [8, 16], which the sphere of radius 10 crosses.
        let desc = layout.descriptor(ChunkCoord::new(3, 1, 1), 0, false).unwrap();
        let guard = field.read();
        let mesh = build_chunk(&*guard, &sampler, &mesher, &desc).unwrap();
        assert!(!mesh.is_empty());
        assert_eq!(mesh.coord, desc.coord);
    }

    #[test]
    fn test_pending_tracking() {
        let (field, sampler, mesher, layout) = setup();
        let mut builder = ChunkBuilder::new(field, sampler, mesher, 2).unwrap();
        let desc = layout.descriptor(ChunkCoord::new(3, 1, 1), 0, false).unwrap();

        assert!(builder.request(desc, 1.0, 0));
        assert!(builder.is_pending(desc.coord));
        assert!(!builder.request(desc, 2.0, 0));
        assert_eq!(builder.pending_count(), 1);

        let results = builder.wait_all(Duration::from_secs(30));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].coord(), desc.coord);
        assert!(matches!(results[0], BuildResult::Built { .. }));
        assert_eq!(builder.pending_count(), 0);
    }

    #[test]
    fn test_cancelled_result_is_dropped() {
        let (field, sampler, mesher, layout) = setup();
        let mut builder = ChunkBuilder::new(field, sampler, mesher, 1).unwrap();
        let a = layout.descriptor(ChunkCoord::new(3, 1, 1), 0, false).unwrap();
        let b = layout.descriptor(ChunkCoord::new(0, 1, 1), 0, false).unwrap();

        builder.request(a, 1.0, 0);
        builder.request(b, 0.5, 0);
        builder.cancel(a.coord);
        assert!(!builder.is_pending(a.coord));

        let results = builder.wait_all(Duration::from_secs(30));
        let coords: Vec<_> = results.iter().map(|r| r.coord()).collect();
        assert_eq!(coords, vec![b.coord]);
    }

    #[test]
    fn test_rerequest_after_cancel_gets_only_new_build() {
        let (field, sampler, mesher, layout) = setup();
        let mut builder = ChunkBuilder::new(field, sampler, mesher, 1).unwrap();
        let coord = ChunkCoord::new(3, 1, 1);
        let old = layout.descriptor(coord, 2, false).unwrap();
        let new = layout.descriptor(coord, 0, false).unwrap();

        assert!(builder.request(old, 1.0, 0));
        builder.cancel(coord);
        assert!(builder.request(new, 1.0, 0));

        let results = builder.wait_all(Duration::from_secs(30));
        assert_eq!(results.len(), 1);
        match &results[0] {
            BuildResult::Built { res_factor, ticket, .. } => {
                assert_eq!(*res_factor, 0);
                assert_eq!(*ticket, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(builder.pending_count(), 0);

        std::thread::sleep(Duration::from_millis(200));
        assert!(builder.poll_results().is_empty());
    }

    #[test]
    fn test_build_after_field_change_is_stale() {
        let (field, sampler, mesher, layout) = setup();
        let mut builder = ChunkBuilder::new(field.clone(), sampler, mesher, 1).unwrap();
        let desc = layout.descriptor(ChunkCoord::new(3, 1, 1), 0, false).unwrap();

        // Hold the write guard so the build cannot start before the field moves on
        let guard = field.write();
        assert!(builder.request(desc, 1.0, 0));
        drop(guard);
        assert_eq!(field.generation(), 1);

        let results = builder.wait_all(Duration::from_secs(30));
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], BuildResult::Stale { generation: 0, .. }));
    }
}
