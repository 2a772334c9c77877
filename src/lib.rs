// Stagehand - affinity-thread dispatch and live output capture
//
// This is the library crate containing the dispatcher, the capture engine and
// their configuration. The binary crate (main.rs) provides the CLI entry point.

pub mod capture;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod models;

// Re-export commonly used types for convenience
pub use capture::{CaptureError, Channel, ProcessChannel, StreamCapture};
pub use config::ConfigManager;
pub use dispatch::{AffinityDispatcher, AffinityExecutor, AffinityThread, DispatchError, ExecutorClosed};
pub use metrics::Metrics;
pub use models::{CaptureMode, CapturedOutput, ChannelCapture, Charset, StagehandConfig};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
