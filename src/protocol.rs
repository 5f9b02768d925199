//! Typed JSON wire protocol for the status bridge.
//!
//! Frames flow as text over the websocket, one JSON object each, with an
//! `"event"` (outbound) or `"type"` (inbound) tag field for discrimination.

use serde::{Deserialize, Serialize};

use crate::gaze::FocusStatus;

/// Frames broadcast to connected presentation clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum WireEvent {
    /// Sent once per connection so clients can correlate versions.
    #[serde(rename = "hello")]
    Hello {
        /// gazeguard semantic version.
        version: String,
    },

    /// Stable focus status changed.
    #[serde(rename = "status")]
    Status {
        status: FocusStatus,
        /// Length of the current away run in milliseconds, zero otherwise.
        away_ms: u64,
    },

    /// A reprimand was dispatched for playback.
    #[serde(rename = "roast")]
    Roast {
        /// The line being spoken.
        text: String,
    },

    /// Liveness reply to an inbound ping.
    #[serde(rename = "pong")]
    Pong,
}

impl WireEvent {
    #[must_use = "hello frames should be sent to newly connected clients"]
    pub fn hello() -> Self {
        WireEvent::Hello {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Operator commands accepted from clients.
///
/// `click` is the historical name the HUD sends for its orb click; `speak`
/// is accepted as an alias. Each command is atomic and parameterless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireCommand {
    Toggle,
    ResetCooldown,
    #[serde(rename = "click", alias = "speak")]
    Click,
    Ping,
}
