//! In-memory links for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use polarsync_protocol::hid::Packet;
use polarsync_protocol::pftp::{self, RemoteEntry};
use polarsync_protocol::DeviceStatus;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::hid::HidLink;
use crate::transport::{LinkOptions, NotificationHandler, Notifier, Transport};

/// [`HidLink`] replaying scripted packets and recording writes.
pub(crate) struct ScriptedHid {
    incoming: VecDeque<Packet>,
    written: Vec<Packet>,
    write_timeouts: Vec<Duration>,
}

impl ScriptedHid {
    pub(crate) fn new(packets: Vec<Packet>) -> Self {
        Self {
            incoming: packets.into(),
            written: Vec::new(),
            write_timeouts: Vec::new(),
        }
    }

    pub(crate) fn written(&self) -> Vec<Packet> {
        self.written.clone()
    }

    /// Timeout passed with each write, in order.
    pub(crate) fn write_timeouts(&self) -> Vec<Duration> {
        self.write_timeouts.clone()
    }
}

impl HidLink for ScriptedHid {
    async fn write_packet(&mut self, packet: &Packet, timeout: Duration) -> Result<()> {
        self.written.push(*packet);
        self.write_timeouts.push(timeout);
        Ok(())
    }

    async fn read_packet(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.incoming.pop_front() {
            Some(packet) => Ok(Some(packet.to_vec())),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }
}

/// Byte stream delivering scripted chunks; pends once drained until more
/// are fed.
pub(crate) struct ScriptedPort {
    chunks: Arc<Mutex<VecDeque<Vec<u8>>>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedPort {
    pub(crate) fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: Arc::new(Mutex::new(chunks.into())),
            written: Arc::default(),
        }
    }

    /// Queue another chunk for reading.
    pub(crate) fn feed(&self, chunk: Vec<u8>) {
        self.chunks.lock().push_back(chunk);
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }
}

impl AsyncRead for ScriptedPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut chunks = self.chunks.lock();
        let Some(mut chunk) = chunks.pop_front() else {
            return Poll::Pending;
        };
        let n = chunk.len().min(buf.remaining());
        buf.put_slice(&chunk[..n]);
        if n < chunk.len() {
            let rest = chunk.split_off(n);
            chunks.push_front(rest);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ScriptedPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.written.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Scripted answer to a GET.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Data(Vec<u8>),
    Status(DeviceStatus),
    Timeout,
}

/// [`Transport`] answering GET requests from a path table.
///
/// Paths without an entry answer with "no such file or directory".
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: HashMap<String, Reply>,
    requests: Vec<String>,
    notifier: Notifier,
    options: LinkOptions,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn dir(mut self, path: &str, entries: &[(&str, u64)]) -> Self {
        let entries: Vec<RemoteEntry> = entries
            .iter()
            .map(|(name, size)| RemoteEntry {
                name: (*name).to_string(),
                size: *size,
            })
            .collect();
        self.replies
            .insert(path.to_string(), Reply::Data(pftp::encode_directory(&entries)));
        self
    }

    pub(crate) fn file(mut self, path: &str, content: &[u8]) -> Self {
        self.replies
            .insert(path.to_string(), Reply::Data(content.to_vec()));
        self
    }

    pub(crate) fn reply(mut self, path: &str, reply: Reply) -> Self {
        self.replies.insert(path.to_string(), reply);
        self
    }

    /// Paths requested so far, in order.
    pub(crate) fn requests(&self) -> &[String] {
        &self.requests
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests.iter().filter(|p| *p == path).count()
    }
}

impl Transport for ScriptedTransport {
    async fn request_until(&mut self, payload: &[u8], _deadline: Instant) -> Result<Vec<u8>> {
        let op = pftp::decode_operation(payload)?;
        self.requests.push(op.path.clone());

        match self.replies.get(&op.path) {
            Some(Reply::Data(data)) => Ok(data.clone()),
            Some(Reply::Status(status)) => Err(Error::Status(*status)),
            Some(Reply::Timeout) => Err(Error::Timeout),
            None => Err(Error::Status(DeviceStatus::NoSuchFileOrDirectory)),
        }
    }

    async fn read_until(&mut self, _deadline: Instant) -> Result<Vec<u8>> {
        Err(Error::Timeout)
    }

    fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.notifier.set_handler(handler);
    }

    fn options(&self) -> &LinkOptions {
        &self.options
    }
}
