pub mod commands;
pub mod submission_flow;

pub use commands::Command;
pub use submission_flow::{FlowResponse, SubmissionFlow};
