//! Raw-mode serial port driven by tokio readiness.
//!
//! The tty is opened non-blocking and switched to raw mode with `libc`
//! termios calls. Reads and writes wait on [`AsyncFd`] readiness instead of
//! polling.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Line speed of the ACM link.
pub const BAUD_RATE: libc::speed_t = libc::B115200;

/// A non-blocking serial port.
#[derive(Debug)]
pub struct SerialPort {
    inner: AsyncFd<File>,
}

impl SerialPort {
    /// Open `path` in raw mode at 115200 baud.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)?;
        set_raw_mode(&file)?;
        Ok(Self {
            inner: AsyncFd::new(file)?,
        })
    }
}

fn set_raw_mode(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: termios is a plain C struct; zeroed is a valid initial value
    // and tcgetattr overwrites it before use.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: fd is a valid open descriptor for the lifetime of `file`.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: tio was initialized by tcgetattr above.
    unsafe {
        libc::cfmakeraw(&mut tio);
        libc::cfsetispeed(&mut tio, BAUD_RATE);
        libc::cfsetospeed(&mut tio, BAUD_RATE);
    }

    // SAFETY: fd is valid and tio is a fully initialized termios.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl AsyncRead for SerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for SerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_device_fails() {
        let result = SerialPort::open(Path::new("/nonexistent/ttyACM9"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_non_tty_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = SerialPort::open(file.path());
        assert!(result.is_err());
    }
}
