//! The transport contract shared by the HID and ACM backends.
//!
//! A transport carries one request/response exchange at a time. Methods
//! take `&mut self`, so a connection can never have two requests in flight.
//! Notifications that arrive while waiting are dispatched to the installed
//! handler and never returned as a response.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use polarsync_protocol::Notification;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Default cumulative deadline of one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single physical read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Callback invoked for every notification.
pub type NotificationHandler = Box<dyn FnMut(&Notification) + Send>;

/// Shared flag used to cancel an in-flight request.
///
/// The flag is checked between frame reads; a cancelled request fails with
/// [`Error::Cancelled`]. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Timing and cancellation settings of a link.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Cumulative deadline applied by [`Transport::request`].
    pub request_timeout: Duration,
    /// Bound on each physical read.
    pub read_timeout: Duration,
    /// Checked between frame reads.
    pub cancel: CancelFlag,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            cancel: CancelFlag::default(),
        }
    }
}

impl LinkOptions {
    /// Deadline for the next physical read or write: the read timeout,
    /// capped by the request deadline. Fails once the request deadline has
    /// passed or the request was cancelled.
    pub(crate) fn next_read_deadline(&self, deadline: Instant) -> Result<Instant> {
        self.cancel.check()?;
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout);
        }
        Ok(deadline.min(now + self.read_timeout))
    }
}

/// Logs notifications and forwards them to the installed handler.
#[derive(Default)]
pub struct Notifier {
    handler: Option<NotificationHandler>,
}

impl Notifier {
    pub fn set_handler(&mut self, handler: NotificationHandler) {
        self.handler = Some(handler);
    }

    pub fn dispatch(&mut self, notification: &Notification) {
        notification.log();
        if let Some(handler) = self.handler.as_mut() {
            handler(notification);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// One request/response link to a device.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send `payload` and wait for the response until `deadline`.
    async fn request_until(&mut self, payload: &[u8], deadline: Instant) -> Result<Vec<u8>>;

    /// Reassemble the next response message, dispatching notifications.
    async fn read_until(&mut self, deadline: Instant) -> Result<Vec<u8>>;

    /// Install the notification handler.
    fn set_notification_handler(&mut self, handler: NotificationHandler);

    /// Timing and cancellation settings.
    fn options(&self) -> &LinkOptions;

    /// Send `payload` and wait for the response, bounded by the configured
    /// request timeout.
    async fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.options().request_timeout;
        self.request_until(payload, deadline).await
    }

    /// Reassemble the next response, bounded by the request timeout.
    async fn read(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.options().request_timeout;
        self.read_until(deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(flag.check().is_ok());

        clone.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_next_read_deadline_is_capped() {
        let options = LinkOptions::default();
        let deadline = Instant::now() + Duration::from_millis(20);
        let next = options.next_read_deadline(deadline).unwrap();
        assert!(next <= deadline);

        let far = Instant::now() + Duration::from_secs(60);
        let next = options.next_read_deadline(far).unwrap();
        assert!(next < far);
    }

    #[tokio::test]
    async fn test_next_read_deadline_expired() {
        let options = LinkOptions::default();
        let past = Instant::now() - Duration::from_millis(1);
        assert!(matches!(options.next_read_deadline(past), Err(Error::Timeout)));

        options.cancel.cancel();
        let future = Instant::now() + Duration::from_secs(1);
        assert!(matches!(
            options.next_read_deadline(future),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_notifier_calls_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut notifier = Notifier::default();
        notifier.dispatch(&Notification::new(vec![10]));
        notifier.set_handler(Box::new(move |n| sink.lock().push(n.payload().to_vec())));
        notifier.dispatch(&Notification::new(vec![3, 0, 90]));

        assert_eq!(*seen.lock(), vec![vec![3, 0, 90]]);
    }
}
