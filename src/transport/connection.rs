//! The remote connection capability a session is served over.

use async_trait::async_trait;
use std::io;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Terminal dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSize {
    pub width: u16,
    pub height: u16,
}

impl WindowSize {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

/// A negotiated pseudo-terminal: the window size at negotiation time plus a stream of
/// later size changes.
#[derive(Debug, Clone)]
pub struct Pty {
    pub window: WindowSize,
    resizes: watch::Receiver<Option<WindowSize>>,
}

impl Pty {
    /// Wrap a size channel. The value current at construction counts as seen.
    pub fn new(window: WindowSize, mut resizes: watch::Receiver<Option<WindowSize>>) -> Self {
        resizes.borrow_and_update();
        Self { window, resizes }
    }

    /// Wait for the next renegotiated size. `None` once the connection is gone.
    pub async fn next_resize(&mut self) -> Option<WindowSize> {
        loop {
            self.resizes.changed().await.ok()?;
            if let Some(size) = *self.resizes.borrow_and_update() {
                return Some(size);
            }
        }
    }
}

/// Bidirectional byte stream to one remote viewer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The negotiated pseudo-terminal, if the remote asked for one.
    fn pty(&self) -> Option<Pty>;

    /// Read inbound bytes. `Ok(0)` means the remote closed its side.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Queue bytes for the remote.
    fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Finish the connection with a completion status (non-zero on error).
    fn exit(&self, status: u32) -> io::Result<()>;

    /// Cancelled when the connection ends or the server shuts down.
    fn cancellation(&self) -> CancellationToken;
}
