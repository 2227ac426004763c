//! Unsolicited device notifications.
//!
//! Notifications arrive interleaved with command responses on both
//! backends. They are never returned as a response; the transport hands
//! them to a handler and keeps waiting.

/// Kind byte of a push-notification settings change.
pub const KIND_PUSH_SETTINGS: u8 = 10;
/// Kind byte of a battery status report.
pub const KIND_BATTERY: u8 = 3;

/// Decoded meaning of a notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// The device's push-notification settings changed.
    PushSettings,
    /// Battery level report.
    Battery {
        /// Charge in percent, if the payload carried it.
        percent: Option<u8>,
    },
    /// Anything else, keyed by the leading kind byte.
    Unknown(Option<u8>),
}

/// A complete notification message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    payload: Vec<u8>,
}

impl Notification {
    /// Wrap a reassembled notification payload.
    #[must_use]
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Raw payload as received.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume into the raw payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self.payload.first().copied() {
            Some(KIND_PUSH_SETTINGS) => NotificationKind::PushSettings,
            Some(KIND_BATTERY) => NotificationKind::Battery {
                percent: self.payload.get(2).copied(),
            },
            other => NotificationKind::Unknown(other),
        }
    }

    /// Emit the notification through `tracing`.
    pub fn log(&self) {
        match self.kind() {
            NotificationKind::PushSettings => {
                tracing::info!("Notification received: push notification settings");
            }
            NotificationKind::Battery {
                percent: Some(percent),
            } => {
                tracing::info!(percent, "Notification received: battery status");
            }
            NotificationKind::Battery { percent: None } => {
                tracing::info!("Notification received: battery status (no level)");
            }
            NotificationKind::Unknown(_) => {
                tracing::info!(payload = ?self.payload, "Notification received: unknown");
            }
        }
    }
}
