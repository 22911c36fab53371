pub mod coordinator;
pub mod shutdown;
pub mod slot;
pub mod stats;

pub use coordinator::{Coordinator, CoordinatorError, CoordinatorOptions, TickOutcome};
pub use shutdown::ShutdownSignal;
pub use slot::{LatestFrameSlot, SlotStats};
pub use stats::{format_stats_line, FeedCounters, FeedReport, RunReport};
