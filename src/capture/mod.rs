//! Output capture from live producers.
//!
//! A [`Channel`] is anything that yields bytes on an output and an error
//! stream and eventually closes with an exit status: a local process
//! ([`ProcessChannel`]), a remote exec session, a scripted test double.
//! [`StreamCapture`] drains it into text.
//!
//! Two modes with different trade-offs:
//!
//! - polling ([`StreamCapture::drain`]): waits for closure, never truncates
//! - timeout ([`StreamCapture::read_all`]): bounded latency, may truncate a
//!   slow producer after `stall_limit` silent periods

pub mod channel;
pub mod decode;
pub mod process;
mod read_all;
pub mod service;

pub use channel::{ByteStream, Channel, ChannelStreams, StreamBuffer};
pub use decode::TextDecoder;
pub use process::{shell_command, ProcessChannel};
pub use service::{CaptureError, StreamCapture};
