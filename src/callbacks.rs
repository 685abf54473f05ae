// src/callbacks.rs

//! Pluggable interfaces for everything the engine does not own
//!
//! The core never writes to the process's standard streams, spawns processes,
//! fetches URLs, or reads the clock directly. All of that goes through the
//! traits below, so a graphical front end (or a test) can swap in its own
//! implementations. Terminal-flavored defaults live here too.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::{Error, Result};

/// Default timeout for spawned hook commands (60 seconds)
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Sink for user-visible message lines
pub trait MsgSink {
    fn emit(&self, line: &str);
}

/// Sink for long-operation progress
pub trait ProgressSink {
    fn init(&self, title: &str);
    fn step(&self, current: u64, total: u64, label: &str);
    fn finish(&self);
}

/// Sink for yes/no confirmation prompts
pub trait ConfirmSink {
    fn ask(&self, message: &str, yes: &str, no: &str, default_yes: bool) -> bool;
}

/// Spawner for external commands (hooks, ldconfig, service control)
pub trait SystemCommand {
    /// Run `argv` with extra environment `env` in `cwd`, returning the exit
    /// status code.
    fn run(&self, argv: &[&str], env: &[(&str, &str)], cwd: Option<&Path>) -> Result<i32>;
}

/// Blocking HTTP fetcher
pub trait HttpFetcher {
    /// Fetch a URL within `deadline`, returning the body bytes.
    fn get(&self, url: &str, deadline: Duration) -> Result<Vec<u8>>;

    /// Fetch a URL into a file within `deadline`, returning the byte count.
    fn get_to_file(&self, url: &str, dest: &Path, deadline: Duration) -> Result<u64>;
}

/// Time source
pub trait Clock {
    /// Current time as epoch seconds.
    fn now(&self) -> i64;
}

// ---------------------------------------------------------------------------
// Terminal defaults
// ---------------------------------------------------------------------------

/// Message sink writing to stdout
#[derive(Debug, Default)]
pub struct TerminalMsg;

impl MsgSink for TerminalMsg {
    fn emit(&self, line: &str) {
        println!("{line}");
    }
}

/// Progress sink backed by an indicatif bar
#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressSink for TerminalProgress {
    fn init(&self, title: &str) {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(title.to_string());
        *self.bar.lock().unwrap() = Some(bar);
    }

    fn step(&self, current: u64, total: u64, label: &str) {
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            bar.set_length(total);
            bar.set_position(current);
            bar.set_message(label.to_string());
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

/// Confirmation prompt on the controlling terminal.
///
/// With `assume_yes` set (the `assume_always_yes` setting), every question is
/// answered affirmatively without prompting.
#[derive(Debug, Default)]
pub struct TerminalConfirm {
    pub assume_yes: bool,
}

impl ConfirmSink for TerminalConfirm {
    fn ask(&self, message: &str, yes: &str, no: &str, default_yes: bool) -> bool {
        if self.assume_yes {
            return true;
        }

        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        print!("{message} {hint} ");
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return default_yes;
        }

        match answer.trim().to_lowercase().as_str() {
            "" => default_yes,
            a if a == yes.to_lowercase() || a == "y" || a == "yes" => true,
            a if a == no.to_lowercase() || a == "n" || a == "no" => false,
            _ => default_yes,
        }
    }
}

/// Command spawner with timeout protection and nulled stdin
#[derive(Debug, Clone)]
pub struct TimeoutCommand {
    pub timeout: Duration,
}

impl Default for TimeoutCommand {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl SystemCommand for TimeoutCommand {
    fn run(&self, argv: &[&str], env: &[(&str, &str)], cwd: Option<&Path>) -> Result<i32> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Fatal("Empty command line".to_string()))?;

        debug!("Spawning {:?}", argv);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in env {
            cmd.env(k, v);
        }
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Fatal(format!("Failed to spawn {program}: {e}")))?;

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                for line in String::from_utf8_lossy(&output.stdout).lines() {
                    debug!("[{}] {}", program, line);
                }
                for line in String::from_utf8_lossy(&output.stderr).lines() {
                    warn!("[{}] {}", program, line);
                }
                Ok(status.code().unwrap_or(-1))
            }
            None => {
                let _ = child.kill();
                Err(Error::HookNonZero {
                    hook: format!("{program} (timed out)"),
                    status: -1,
                })
            }
        }
    }
}

/// System clock
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Quiet / test implementations
// ---------------------------------------------------------------------------

/// Message sink that discards everything (quiet mode)
#[derive(Debug, Default)]
pub struct SilentMsg;

impl MsgSink for SilentMsg {
    fn emit(&self, _line: &str) {}
}

/// Progress sink that does nothing
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn init(&self, _title: &str) {}
    fn step(&self, _current: u64, _total: u64, _label: &str) {}
    fn finish(&self) {}
}

/// Confirmation sink with a fixed answer
#[derive(Debug)]
pub struct FixedConfirm(pub bool);

impl ConfirmSink for FixedConfirm {
    fn ask(&self, _message: &str, _yes: &str, _no: &str, _default_yes: bool) -> bool {
        self.0
    }
}

/// Message sink that records every line, for assertions in tests.
///
/// Clones share the underlying buffer, so a test can keep a handle after
/// boxing one into an instance.
#[derive(Debug, Clone, Default)]
pub struct CollectingMsg {
    lines: std::sync::Arc<Mutex<Vec<String>>>,
}

impl CollectingMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl MsgSink for CollectingMsg {
    fn emit(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Command spawner that records invocations and reports success. Clones
/// share the call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingCommand {
    calls: std::sync::Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl SystemCommand for RecordingCommand {
    fn run(&self, argv: &[&str], _env: &[(&str, &str)], _cwd: Option<&Path>) -> Result<i32> {
        self.calls
            .lock()
            .unwrap()
            .push(argv.iter().map(|s| s.to_string()).collect());
        Ok(0)
    }
}

/// Fixed clock for tests
#[derive(Debug)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}
