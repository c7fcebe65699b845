pub mod poll_sender;
pub mod settings_store;

pub use poll_sender::{PollSender, SendFailure, SendOutcome};
pub use settings_store::{OwnerFormat, SettingsStore};
