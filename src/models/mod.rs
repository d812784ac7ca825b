//! Data models shared by the harness

pub mod config;
pub mod flows;

// Re-export main model types
pub use config::Config;
pub use flows::{FlowLabel, RunRange};
