//! Websocket status bridge: broadcasts focus state to presentation clients
//! and funnels their operator commands into the sentinel loop.
//!
//! The bridge owns one background thread running a current-thread tokio
//! runtime. Outbound frames fan out through a broadcast channel, so a slow
//! client lags and drops frames instead of stalling the tracker. Inbound
//! commands are forwarded over the loop's control channel with `try_send`.

use std::net::SocketAddr;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Sender, TrySendError};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::config::BridgeConfig;
use crate::protocol::{WireCommand, WireEvent};
use crate::sink::{EventKind, EventRecord, EventSink};
use crate::tracker::ControlCommand;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const BIND_REPORT_TIMEOUT_MS: u64 = 2000;
const BRIDGE_JOIN_POLL_MS: u64 = 5;
const BRIDGE_JOIN_TIMEOUT_MS: u64 = 1000;

/// Cheap cloneable broadcast handle; also the registered event sink.
#[derive(Clone)]
pub struct BridgeSink {
    events_tx: broadcast::Sender<String>,
    /// Last status frame, replayed to newly connected clients.
    last_status: Arc<Mutex<Option<String>>>,
}

impl BridgeSink {
    /// Serialize and broadcast one frame. No receivers is not an error.
    pub fn broadcast(&self, event: &WireEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(%err, "wire event serialization failed");
                return;
            }
        };
        if matches!(event, WireEvent::Status { .. }) {
            let mut last = self
                .last_status
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *last = Some(frame.clone());
        }
        let _ = self.events_tx.send(frame);
    }

    fn last_status_frame(&self) -> Option<String> {
        self.last_status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for BridgeSink {
    fn handle(&mut self, record: &EventRecord) {
        match record.kind {
            EventKind::StatusChanged => self.broadcast(&WireEvent::Status {
                status: record.status,
                away_ms: record.away_ms,
            }),
            EventKind::Triggered => {
                if let Some(text) = &record.line {
                    self.broadcast(&WireEvent::Roast { text: text.clone() });
                }
            }
        }
    }
}

/// Owner of the bridge thread and its shutdown signal.
pub struct StatusBridge {
    sink: BridgeSink,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl StatusBridge {
    /// Bind the listener and start serving clients.
    ///
    /// A failed bind is a startup error: the operator asked for a bridge and
    /// should learn immediately that the port is unusable.
    pub fn start(cfg: &BridgeConfig, control_tx: Sender<ControlCommand>) -> Result<Self> {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = BridgeSink {
            events_tx: events_tx.clone(),
            last_status: Arc::new(Mutex::new(None)),
        };
        let addr = format!("{}:{}", cfg.host, cfg.port);
        let (bind_tx, bind_rx) = std_mpsc::channel::<Result<SocketAddr>>();

        let task_sink = sink.clone();
        let thread = thread::Builder::new()
            .name("ws-bridge".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = bind_tx.send(Err(
                            anyhow!(err).context("failed to build bridge runtime")
                        ));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match TcpListener::bind(&addr).await {
                        Ok(listener) => listener,
                        Err(err) => {
                            let _ = bind_tx.send(Err(
                                anyhow!(err).context(format!("failed to bind bridge on {addr}"))
                            ));
                            return;
                        }
                    };
                    let local_addr = match listener.local_addr() {
                        Ok(local_addr) => local_addr,
                        Err(err) => {
                            let _ = bind_tx.send(Err(
                                anyhow!(err).context("failed to resolve bridge address")
                            ));
                            return;
                        }
                    };
                    let _ = bind_tx.send(Ok(local_addr));
                    tracing::info!(%local_addr, "status bridge listening");
                    accept_loop(listener, task_sink, control_tx, shutdown_rx).await;
                });
            })
            .context("failed to spawn bridge thread")?;

        let local_addr = bind_rx
            .recv_timeout(Duration::from_millis(BIND_REPORT_TIMEOUT_MS))
            .context("bridge thread did not report a bind result")??;

        Ok(Self {
            sink,
            local_addr,
            shutdown_tx,
            thread: Some(thread),
        })
    }

    /// Registered-sink handle (also usable for ad hoc broadcasts).
    #[must_use = "a sink handle is required for frames to reach clients"]
    pub fn sink(&self) -> BridgeSink {
        self.sink.clone()
    }

    /// Actual bound address, useful when the configured port is 0.
    #[must_use = "address accessor has no side effects"]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for StatusBridge {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(thread) = self.thread.take() {
            let deadline = Instant::now() + Duration::from_millis(BRIDGE_JOIN_TIMEOUT_MS);
            while !thread.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(BRIDGE_JOIN_POLL_MS));
            }
            if thread.is_finished() {
                let _ = thread.join();
            } else {
                tracing::debug!("bridge thread did not exit in time; detaching");
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    sink: BridgeSink,
    control_tx: Sender<ControlCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::debug!(%err, "bridge accept failed");
                        continue;
                    }
                };
                tokio::spawn(handle_client(
                    stream,
                    peer,
                    sink.clone(),
                    control_tx.clone(),
                    shutdown_rx.clone(),
                ));
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    sink: BridgeSink,
    control_tx: Sender<ControlCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            tracing::debug!(%peer, %err, "websocket handshake failed");
            return;
        }
    };
    tracing::debug!(%peer, "client connected");
    let mut events_rx = sink.events_tx.subscribe();
    let (mut out, mut inbound) = ws.split();

    // Greet, then replay the last known status so late joiners render
    // correctly before the next transition.
    if let Ok(hello) = serde_json::to_string(&WireEvent::hello()) {
        if out.send(Message::Text(hello)).await.is_err() {
            return;
        }
    }
    if let Some(status) = sink.last_status_frame() {
        if out.send(Message::Text(status)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            frame = events_rx.recv() => match frame {
                Ok(frame) => {
                    if out.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(%peer, skipped, "client lagging; frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = inbound.next() => match message {
                Some(Ok(Message::Text(raw))) => {
                    if !handle_inbound(&raw, peer, &control_tx, &mut out).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::debug!(%peer, %err, "client read failed");
                    break;
                }
            },
        }
    }
    tracing::debug!(%peer, "client disconnected");
}

/// Parse and act on one inbound frame. Returns false when the connection
/// should close.
async fn handle_inbound(
    raw: &str,
    peer: SocketAddr,
    control_tx: &Sender<ControlCommand>,
    out: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
) -> bool {
    let command = match serde_json::from_str::<WireCommand>(raw) {
        Ok(command) => command,
        Err(err) => {
            tracing::debug!(%peer, %err, raw, "ignoring unknown client message");
            return true;
        }
    };
    let control = match command {
        WireCommand::Ping => {
            let Ok(pong) = serde_json::to_string(&WireEvent::Pong) else {
                return true;
            };
            return out.send(Message::Text(pong)).await.is_ok();
        }
        WireCommand::Toggle => ControlCommand::Toggle,
        WireCommand::ResetCooldown => ControlCommand::ResetCooldown,
        WireCommand::Click => ControlCommand::ForceSpeak,
    };
    match control_tx.try_send(control) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            tracing::debug!(%peer, ?dropped, "control dropped: queue full");
        }
        Err(TrySendError::Disconnected(_)) => return false,
    }
    true
}
