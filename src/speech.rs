//! Spoken reprimand dispatch with explicit worker lifecycle ownership.
//!
//! Triggers never wait on synthesis: lines are handed to a worker thread
//! through a bounded channel and a full queue drops the request. A line that
//! is currently being spoken is never preempted; the tracker's cooldown alone
//! governs the next opportunity.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};

use crate::sink::{EventKind, EventRecord, EventSink};

const SPEECH_QUEUE_CAPACITY: usize = 4;
const SPEECH_WORKER_POLL_MS: u64 = 100;
const SPEECH_JOIN_POLL_MS: u64 = 5;
const SPEECH_JOIN_TIMEOUT_MS: u64 = 1000;

/// Seam to the synthesis/playback pipeline.
pub trait SpeechBackend: Send {
    fn speak(&mut self, line: &str) -> Result<()>;
}

/// Backend that shells out to an external synthesizer command (`say`,
/// `espeak`, a custom script), appending the line as the final argument.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = shell_words::split(command)
            .with_context(|| format!("invalid speech command '{command}'"))?;
        if parts.is_empty() {
            return Err(anyhow!("speech command is empty"));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }
}

impl SpeechBackend for CommandBackend {
    fn speak(&mut self, line: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(line)
            .status()
            .with_context(|| format!("failed to run speech command '{}'", self.program))?;
        if !status.success() {
            return Err(anyhow!(
                "speech command '{}' exited with {status}",
                self.program
            ));
        }
        Ok(())
    }
}

/// Round-robin reprimand line selection.
#[derive(Debug, Clone)]
pub struct LinePicker {
    lines: Vec<String>,
    next: usize,
}

impl LinePicker {
    #[must_use = "the picker owns rotation state and must be retained"]
    pub fn new(lines: Vec<String>, fallback: &str) -> Self {
        let lines = if lines.is_empty() {
            vec![fallback.to_string()]
        } else {
            lines
        };
        Self { lines, next: 0 }
    }

    pub fn next_line(&mut self) -> String {
        let line = self.lines[self.next % self.lines.len()].clone();
        self.next = (self.next + 1) % self.lines.len();
        line
    }
}

/// Cheap cloneable hand-off point into the speech worker.
#[derive(Clone)]
pub struct SpeechHandle {
    tx: Sender<String>,
}

impl SpeechHandle {
    /// Queue a line for playback. Fire-and-forget: a full queue drops the
    /// request with a debug log.
    pub fn request(&self, line: String) {
        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(line)) => {
                tracing::debug!(%line, "speech request dropped: queue full");
            }
            Err(TrySendError::Disconnected(line)) => {
                tracing::debug!(%line, "speech request dropped: worker gone");
            }
        }
    }
}

/// Owner of the speech worker thread.
pub struct SpeechDispatcher {
    handle: SpeechHandle,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SpeechDispatcher {
    /// Spawn the worker thread around the given backend.
    pub fn start(backend: Box<dyn SpeechBackend>) -> Result<Self> {
        let (tx, rx) = bounded::<String>(SPEECH_QUEUE_CAPACITY);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let worker_stop = stop_flag.clone();
        let worker = thread::Builder::new()
            .name("speech".to_string())
            .spawn(move || {
                let mut backend = backend;
                loop {
                    if worker_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match rx.recv_timeout(Duration::from_millis(SPEECH_WORKER_POLL_MS)) {
                        Ok(line) => {
                            if let Err(err) = backend.speak(&line) {
                                tracing::warn!(%line, err = %format!("{err:#}"), "speech playback failed");
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("failed to spawn speech worker thread")?;
        Ok(Self {
            handle: SpeechHandle { tx },
            stop_flag,
            worker: Some(worker),
        })
    }

    /// Hand-off point for the runtime and sinks.
    #[must_use = "a handle is required to queue speech"]
    pub fn handle(&self) -> SpeechHandle {
        self.handle.clone()
    }
}

impl Drop for SpeechDispatcher {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            join_thread_with_timeout("speech", worker);
        }
    }
}

fn join_thread_with_timeout(name: &str, handle: JoinHandle<()>) {
    let timeout = Duration::from_millis(SPEECH_JOIN_TIMEOUT_MS);
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(SPEECH_JOIN_POLL_MS));
    }
    if handle.is_finished() {
        if let Err(err) = handle.join() {
            tracing::debug!(worker = name, ?err, "worker thread panicked during shutdown");
        }
    } else {
        tracing::debug!(
            worker = name,
            timeout_ms = timeout.as_millis() as u64,
            "worker thread did not exit in time; detaching"
        );
    }
}

/// Sink that forwards the chosen line of each trigger to the worker.
pub struct SpeechSink {
    handle: SpeechHandle,
}

impl SpeechSink {
    #[must_use = "the sink must be registered to deliver reprimands"]
    pub fn new(handle: SpeechHandle) -> Self {
        Self { handle }
    }
}

impl EventSink for SpeechSink {
    fn handle(&mut self, record: &EventRecord) {
        if record.kind != EventKind::Triggered {
            return;
        }
        if let Some(line) = &record.line {
            self.handle.request(line.clone());
        }
    }
}
