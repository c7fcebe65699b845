pub mod poll;

pub use poll::{option_label, CompactedOptions, OwnerId, PollRecord, QueueItem, MAX_OPTIONS, NO_QUESTION_TEXT};
