//! Raw-terminal adapter over a remote connection.
//!
//! The render backend wants a terminal it can start, stop, read keystrokes from, write
//! escape sequences to and ask for its size. [`SessionTty`] provides that on top of a
//! [`Connection`]: inbound bytes are relayed into an intermediary pipe so that a pending
//! read can be abandoned with [`SessionTty::drain`] without touching the connection.

use crate::error::{FloatError, Result};
use crate::transport::connection::{Connection, WindowSize};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Invoked from the watcher task with every renegotiated window size.
pub type ResizeCallback = Arc<dyn Fn(WindowSize) + Send + Sync>;

/// Chunks buffered between the relay task and `read`.
const PIPE_CAPACITY: usize = 64;
const RELAY_CHUNK: usize = 1024;

struct Pipe {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

#[derive(Default)]
struct TtyState {
    /// Present while started; cancelling it stops the relay and watcher tasks.
    run: Option<CancellationToken>,
    /// Cancelled by `drain`.
    drained: CancellationToken,
    pipe: Option<Arc<tokio::sync::Mutex<Pipe>>>,
}

/// Adapts one [`Connection`] to the raw-terminal contract.
pub struct SessionTty {
    conn: Arc<dyn Connection>,
    state: Mutex<TtyState>,
    size: Arc<Mutex<WindowSize>>,
    on_resize: Arc<Mutex<Option<ResizeCallback>>>,
}

impl SessionTty {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            state: Mutex::new(TtyState::default()),
            size: Arc::new(Mutex::new(WindowSize::default())),
            on_resize: Arc::new(Mutex::new(None)),
        }
    }

    /// Begin relaying input and watching for resizes.
    ///
    /// Fails with [`FloatError::TransportNotReady`] and leaves the adapter untouched if
    /// the connection has no pseudo-terminal.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.run.is_some() {
            return Err(FloatError::AlreadyStarted);
        }
        let mut pty = self.conn.pty().ok_or(FloatError::TransportNotReady)?;

        *self.size.lock() = pty.window;
        let run = CancellationToken::new();
        let (tx, rx) = mpsc::channel(PIPE_CAPACITY);

        let conn = Arc::clone(&self.conn);
        let relay_token = run.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; RELAY_CHUNK];
            loop {
                let n = tokio::select! {
                    _ = relay_token.cancelled() => break,
                    read = conn.read(&mut buf) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    },
                };
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        });

        let size = Arc::clone(&self.size);
        let on_resize = Arc::clone(&self.on_resize);
        let watch_token = run.clone();
        tokio::spawn(async move {
            loop {
                let window = tokio::select! {
                    _ = watch_token.cancelled() => break,
                    next = pty.next_resize() => match next {
                        Some(window) => window,
                        None => break,
                    },
                };
                *size.lock() = window;
                let callback = on_resize.lock().clone();
                if let Some(callback) = callback {
                    callback(window);
                }
            }
        });

        state.run = Some(run);
        state.drained = CancellationToken::new();
        state.pipe = Some(Arc::new(tokio::sync::Mutex::new(Pipe {
            rx,
            pending: Vec::new(),
        })));
        Ok(())
    }

    /// Stop the relay and watcher tasks. The connection stays open.
    pub fn stop(&self) -> Result<()> {
        let run = self.state.lock().run.take().ok_or(FloatError::NotStarted)?;
        run.cancel();
        Ok(())
    }

    /// Close the read side of the pipe; pending and later reads return end-of-stream.
    pub fn drain(&self) {
        self.state.lock().drained.cancel();
    }

    /// Register, replace or (with `None`) remove the resize callback.
    pub fn notify_resize(&self, callback: Option<ResizeCallback>) {
        *self.on_resize.lock() = callback;
    }

    /// Most recently negotiated window size.
    pub fn window_size(&self) -> WindowSize {
        *self.size.lock()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().run.is_some()
    }

    /// Read relayed input. `Ok(0)` after `drain`, once the relay ended, or before `start`.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (pipe, drained) = {
            let state = self.state.lock();
            (state.pipe.clone(), state.drained.clone())
        };
        let Some(pipe) = pipe else {
            return Ok(0);
        };

        tokio::select! {
            _ = drained.cancelled() => Ok(0),
            n = read_pipe(&pipe, buf) => Ok(n),
        }
    }

    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        self.conn.write(data)
    }

    /// The connection belongs to the caller; nothing to release here.
    pub fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

async fn read_pipe(pipe: &tokio::sync::Mutex<Pipe>, buf: &mut [u8]) -> usize {
    let mut pipe = pipe.lock().await;
    if pipe.pending.is_empty() {
        match pipe.rx.recv().await {
            Some(chunk) => pipe.pending = chunk,
            None => return 0,
        }
    }

    let n = pipe.pending.len().min(buf.len());
    buf[..n].copy_from_slice(&pipe.pending[..n]);
    pipe.pending.drain(..n);
    n
}

/// `io::Write` half of the adapter for the terminal backend.
///
/// Output is buffered and handed to the connection as one chunk on `flush`.
pub struct TtyWriter {
    tty: Arc<SessionTty>,
    buf: Vec<u8>,
}

impl TtyWriter {
    pub fn new(tty: Arc<SessionTty>) -> Self {
        Self {
            tty,
            buf: Vec::with_capacity(8 * 1024),
        }
    }
}

impl io::Write for TtyWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.tty.write(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}
