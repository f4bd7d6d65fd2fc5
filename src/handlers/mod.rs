//! API handlers for the progression server

pub mod applications;
pub mod cron;
pub mod health;
pub mod magic_link;
pub mod status;
pub mod webhooks;

pub use applications::*;
pub use cron::*;
pub use health::*;
pub use magic_link::*;
pub use status::*;
pub use webhooks::*;
