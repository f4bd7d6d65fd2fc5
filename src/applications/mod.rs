//! Loan applications: status sync, notes and operator views

pub mod margill;
mod service;

pub use margill::{map_margill_status, MargillStatusUpdate, MargillSyncResult};
pub use service::{ApplicationService, DashboardStats, NewNoteRequest};
