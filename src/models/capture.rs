/// Decoded text captured from a channel's two streams.
///
/// Append-only while a drain is running; handed out by value once the drain
/// has ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Text read from the output stream
    pub output: String,

    /// Text read from the error stream
    pub error: String,
}

/// Everything a finished drain produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCapture {
    pub captured: CapturedOutput,

    /// Exit status reported by the channel, or `-1` if it never reported one
    pub exit_status: i32,
}

impl ChannelCapture {
    /// Exit status used when the producer was still running or never said.
    pub const UNKNOWN_EXIT_STATUS: i32 = -1;

    pub fn output(&self) -> &str {
        &self.captured.output
    }

    pub fn error(&self) -> &str {
        &self.captured.error
    }

    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }

    /// Consume into the `(output, error, exit_status)` triple.
    pub fn into_parts(self) -> (String, String, i32) {
        (self.captured.output, self.captured.error, self.exit_status)
    }
}
