pub mod batch_scheduler;
pub mod dispatch_queue;

pub use batch_scheduler::{batch_count, BatchScheduler, CycleOutcome, CycleReport, DispatchPlan};
pub use dispatch_queue::{DispatchQueue, DrainGuard, DrainStart, ProcessingState};
