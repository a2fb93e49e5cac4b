//! Direction workers. Two cycle shapes share one capability trait so the
//! scheduler never needs to know which shape backs a given direction.

mod discovery;
mod source_pull;
mod target_push;

pub use discovery::TrackDiscoveryService;
pub use source_pull::{SourcePullDeps, SourcePullWorker};
pub use target_push::TargetPushWorker;

use async_trait::async_trait;

/// One worker per direction. The scheduler holds a
/// `HashMap<Direction, Arc<dyn DirectionWorker>>` and never needs to know
/// which shape backs a given direction.
#[async_trait]
pub trait DirectionWorker: Send + Sync {
    /// Runs one cycle and returns the number of tracks that reached a
    /// successful terminal transition this cycle.
    async fn run_cycle(&self) -> anyhow::Result<usize>;
}
