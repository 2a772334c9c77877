//! Data models for stagehand.
//!
//! - [`StagehandConfig`]: settings loaded from `Stagehand.yaml`, split into
//!   [`DispatchSettings`], [`CaptureSettings`] and [`LoggingSettings`]
//! - [`Charset`] / [`CaptureMode`]: how captured bytes are decoded and which
//!   capture strategy runs
//! - [`CapturedOutput`] / [`ChannelCapture`]: what a finished capture hands back
//!
//! All config structs derive `Serialize`/`Deserialize` and default every
//! field, so partial YAML files load cleanly.

pub mod capture;
pub mod config;

pub use capture::{CapturedOutput, ChannelCapture};
pub use config::{
    CaptureMode, CaptureSettings, Charset, DispatchSettings, LoggingSettings, StagehandConfig,
};
