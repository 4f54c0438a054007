//! CLI commands for the 0DTE trading core.

pub mod paper_session;
pub mod show_config;

pub use paper_session::{PaperSessionArgs, ScanArgs};
pub use show_config::ShowConfigArgs;
