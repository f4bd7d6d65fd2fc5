//! Client-facing progress view of an application

mod service;
mod steps;

pub use service::{ClientApplicationView, ClientNoteView, ClientStatus, ProgressView, StatusService};
pub use steps::{current_step_index, ProgressStep, PROGRESS_STEPS};
