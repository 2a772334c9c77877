use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration from Stagehand.yaml
///
/// Every section falls back to its defaults, so a partial file (or no file
/// at all) is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagehandConfig {
    pub dispatch: DispatchSettings,
    pub capture: CaptureSettings,
    pub logging: LoggingSettings,
}

/// Settings for the affinity thread and the off-affinity worker threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Name given to the dedicated affinity thread
    pub affinity_thread_name: String,

    /// Name given to workers spawned by `run_thriftily` on the affinity thread
    pub worker_thread_name: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            affinity_thread_name: "stagehand-affinity".to_string(),
            worker_thread_name: "stagehand-worker".to_string(),
        }
    }
}

/// How a command's output is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Poll the channel until it closes; never truncates a live producer.
    #[default]
    Polling,

    /// Bounded reads with a stall threshold; bounded latency, may truncate.
    Timeout,
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "polling" => Ok(Self::Polling),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown capture mode: {other}")),
        }
    }
}

/// Text encoding used to decode captured bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,

    #[serde(rename = "iso-8859-1", alias = "latin1", alias = "ISO-8859-1")]
    Latin1,

    #[serde(rename = "us-ascii", alias = "ascii", alias = "US-ASCII")]
    Ascii,
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            other => Err(format!("unsupported charset: {other}")),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "iso-8859-1",
            Self::Ascii => "us-ascii",
        };
        f.write_str(name)
    }
}

/// Settings for draining channels and streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub mode: CaptureMode,

    pub charset: Charset,

    /// Upper bound for a single read, in bytes
    pub chunk_size: usize,

    /// Backoff between polls when no stream has data (polling mode)
    pub poll_interval_ms: u64,

    /// How long a single chunk may take to arrive (timeout mode)
    pub read_timeout_ms: u64,

    /// Consecutive timeouts that end a read (timeout mode)
    pub stall_limit: u32,

    /// Consecutive empty polls on an open channel before giving up (polling mode).
    /// `None` waits for the channel to close, however long that takes.
    pub max_idle_polls: Option<u32>,

    /// Extra environment variables for spawned commands, applied in order
    pub environment: IndexMap<String, String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Polling,
            charset: Charset::Utf8,
            chunk_size: 1024,
            poll_interval_ms: 1000,
            read_timeout_ms: 3000,
            stall_limit: 2,
            max_idle_polls: None,
            environment: IndexMap::new(),
        }
    }
}

impl CaptureSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Settings for the tracing subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for rotated log files
    pub directory: String,

    /// File name prefix for rotated log files
    pub prefix: String,

    /// Use debug level instead of info
    pub debug: bool,

    /// Also log to the console
    pub console: bool,

    /// Write the file log as JSON lines
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            prefix: "stagehand".to_string(),
            debug: false,
            console: false,
            json: false,
        }
    }
}
