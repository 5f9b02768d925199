//! gazeguard binary: wire the measurement intake, sentinel loop, and sinks.

mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;

use gazeguard::bridge::StatusBridge;
use gazeguard::eventlog::JsonlEventLog;
use gazeguard::runtime::{SentinelLoop, CONTROL_CHANNEL_CAPACITY};
use gazeguard::sink::SinkRegistry;
use gazeguard::source::{self, SAMPLE_CHANNEL_CAPACITY};
use gazeguard::speech::{CommandBackend, LinePicker, SpeechDispatcher, SpeechSink};
use gazeguard::tracker::ControlCommand;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let resolved = cli.resolve()?;
    gazeguard::init_tracing(resolved.telemetry);

    let (sample_tx, sample_rx) = bounded(SAMPLE_CHANNEL_CAPACITY);
    let (control_tx, control_rx) = bounded::<ControlCommand>(CONTROL_CHANNEL_CAPACITY);

    let mut sinks = SinkRegistry::new();
    let event_log = JsonlEventLog::open(&resolved.event_log).with_context(|| {
        format!(
            "failed to open event log {}",
            resolved.event_log.display()
        )
    })?;
    sinks.register(Box::new(event_log));

    let bridge = if resolved.bridge.enabled {
        let bridge = StatusBridge::start(&resolved.bridge, control_tx.clone())?;
        println!("gazeguard bridge listening on ws://{}", bridge.local_addr());
        sinks.register(Box::new(bridge.sink()));
        Some(bridge)
    } else {
        None
    };

    let speech = if resolved.speech.enabled {
        let backend = CommandBackend::new(&resolved.speech.command)?;
        let dispatcher = SpeechDispatcher::start(Box::new(backend))?;
        sinks.register(Box::new(SpeechSink::new(dispatcher.handle())));
        Some(dispatcher)
    } else {
        None
    };

    let picker = LinePicker::new(resolved.speech.lines.clone(), &resolved.speech.default_line);
    let mut sentinel = SentinelLoop::new(
        resolved.thresholds,
        sinks,
        picker,
        speech.as_ref().map(SpeechDispatcher::handle),
        bridge.as_ref().map(StatusBridge::sink),
        resolved.speech.default_line.clone(),
    );

    let origin = Instant::now();
    let stop_flag = Arc::new(AtomicBool::new(false));
    let reader = if resolved.demo {
        source::spawn_scripted_source(source::demo_script(), origin, sample_tx, stop_flag.clone())
    } else {
        source::spawn_stdin_reader(origin, sample_tx, stop_flag.clone())
    };

    // Runs until the sample channel disconnects (EOF on stdin or the demo
    // script finishing).
    sentinel.run(sample_rx, control_rx);

    stop_flag.store(true, Ordering::Relaxed);
    if resolved.demo {
        let _ = reader.join();
    }
    // The stdin reader may be parked in a blocking read; it is detached and
    // exits with the process.
    drop(speech);
    drop(bridge);
    Ok(())
}
