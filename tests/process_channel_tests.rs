//! Integration tests for capturing real child processes
//!
//! These tests verify:
//! - ProcessChannel reporting closed only after exit and end of both pipes
//! - capture_command in polling and timeout modes
//! - Environment overrides and spawn failures

#![cfg(unix)]

use stagehand::capture::{CaptureError, ProcessChannel, StreamCapture, shell_command};
use stagehand::models::{CaptureMode, CaptureSettings, ChannelCapture, Charset};
use std::process::{Command, Stdio};

fn settings(mode: CaptureMode) -> CaptureSettings {
    CaptureSettings {
        mode,
        poll_interval_ms: 10,
        read_timeout_ms: 1000,
        ..CaptureSettings::default()
    }
}

/// Whether a process with this pid still exists.
fn is_running(pid: &str) -> bool {
    Command::new("kill")
        .args(["-0", pid])
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[test]
fn test_drain_process_channel() {
    let capture = StreamCapture::new(settings(CaptureMode::Polling));
    let mut channel = ProcessChannel::shell("printf hello; printf oops >&2; exit 3").unwrap();

    let result = capture.drain(&mut channel, Charset::Utf8).unwrap();

    assert_eq!(result.into_parts(), ("hello".to_string(), "oops".to_string(), 3));
}

#[test]
fn test_output_written_right_before_exit_is_kept() {
    let capture = StreamCapture::new(settings(CaptureMode::Polling));
    let mut channel =
        ProcessChannel::shell("sleep 0.2; i=0; while [ $i -lt 200 ]; do echo line$i; i=$((i+1)); done")
            .unwrap();

    let result = capture.drain(&mut channel, Charset::Utf8).unwrap();

    assert_eq!(result.output().lines().count(), 200);
    assert!(result.output().ends_with("line199\n"));
    assert!(result.succeeded());
}

#[test]
fn test_killed_process_has_unknown_status() {
    let capture = StreamCapture::new(settings(CaptureMode::Polling));
    let mut channel = ProcessChannel::shell("exec sleep 30").unwrap();
    assert!(channel.id() > 0);

    channel.kill().unwrap();
    let result = capture.drain(&mut channel, Charset::Utf8).unwrap();

    assert_eq!(result.exit_status, ChannelCapture::UNKNOWN_EXIT_STATUS);
}

#[test]
fn test_capture_command_polling_mode() {
    let capture = StreamCapture::new(settings(CaptureMode::Polling));

    let result = capture
        .capture_command(&mut shell_command("echo out; echo err >&2"), Charset::Utf8)
        .unwrap();

    assert_eq!(result.output(), "out\n");
    assert_eq!(result.error(), "err\n");
    assert_eq!(result.exit_status, 0);
}

#[test]
fn test_capture_command_timeout_mode() {
    let capture = StreamCapture::new(settings(CaptureMode::Timeout));

    let result = capture
        .capture_command(&mut shell_command("echo out; echo err >&2; exit 5"), Charset::Utf8)
        .unwrap();

    assert_eq!(result.output(), "out\n");
    assert_eq!(result.error(), "err\n");
    assert_eq!(result.exit_status, 5);
}

#[test]
fn test_capture_command_applies_environment() {
    let mut capture_settings = settings(CaptureMode::Polling);
    capture_settings
        .environment
        .insert("STAGEHAND_GREETING".to_string(), "bonjour".to_string());
    let capture = StreamCapture::new(capture_settings);

    let result = capture
        .capture_command(&mut shell_command("printf %s \"$STAGEHAND_GREETING\""), Charset::Utf8)
        .unwrap();

    assert_eq!(result.output(), "bonjour");
}

#[test]
fn test_capture_command_latin1() {
    let capture = StreamCapture::new(settings(CaptureMode::Polling));

    let result = capture
        .capture_command(&mut shell_command("printf 'caf\\351'"), Charset::Latin1)
        .unwrap();

    assert_eq!(result.output(), "café");
}

#[test]
fn test_spawn_failure_is_reported() {
    let capture = StreamCapture::new(settings(CaptureMode::Polling));

    let error = capture
        .capture_command(&mut Command::new("/nonexistent/stagehand-missing-binary"), Charset::Utf8)
        .unwrap_err();

    assert!(matches!(error, CaptureError::Spawn { .. }));
    assert!(error.to_string().contains("stagehand-missing-binary"));
}

#[test]
fn test_timeout_mode_kills_child_that_outlives_its_output() {
    let capture = StreamCapture::new(CaptureSettings {
        read_timeout_ms: 100,
        ..settings(CaptureMode::Timeout)
    });

    let result = capture
        .capture_command(&mut shell_command("echo $$; exec sleep 30"), Charset::Utf8)
        .unwrap();
    let pid = result.output().trim().to_string();

    assert_eq!(result.exit_status, ChannelCapture::UNKNOWN_EXIT_STATUS);
    assert!(!pid.is_empty());
    assert!(!is_running(&pid), "child {} still running after capture returned", pid);
    assert_eq!(capture.metrics().non_zero_exits.load(std::sync::atomic::Ordering::Relaxed), 0);
}

#[test]
fn test_idle_limit_kills_child_when_channel_is_dropped() {
    let capture = StreamCapture::new(CaptureSettings {
        max_idle_polls: Some(20),
        ..settings(CaptureMode::Polling)
    });

    let result = capture
        .capture_command(&mut shell_command("echo $$; exec sleep 30"), Charset::Utf8)
        .unwrap();
    let pid = result.output().trim().to_string();

    assert_eq!(result.exit_status, ChannelCapture::UNKNOWN_EXIT_STATUS);
    assert!(!pid.is_empty());
    assert!(!is_running(&pid), "child {} still running after capture returned", pid);
}

#[test]
fn test_dropping_live_channel_stops_process() {
    let channel = ProcessChannel::shell("exec sleep 30").unwrap();
    let pid = channel.id().to_string();
    assert!(is_running(&pid));

    drop(channel);

    assert!(!is_running(&pid));
}
