//! SSH connections.
//!
//! Every user is let in without credentials. A client that sends `pty-req` before its
//! shell has negotiated a pseudo-terminal and every `window-change` after that is a
//! resize. The completion status reaches the client as an `exit-status` request before
//! the channel closes.

use crate::error::{FloatError, Result};
use crate::transport::connection::{Connection, Pty, WindowSize};
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use russh::server::{Auth, Config, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, MethodSet};
use russh_keys::key::{KeyPair, PublicKey};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Output chunks queued for one viewer. A viewer this far behind has stopped reading.
pub const OUTBOUND_CAPACITY: usize = 256;
const INBOUND_CAPACITY: usize = 64;

/// How long a finished connection gets to hang up on its own.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// The host key from `path`, or a fresh ed25519 key for this process.
pub fn load_host_key(path: Option<&Path>) -> Result<KeyPair> {
    match path {
        Some(path) => russh_keys::load_secret_key(path, None)
            .map_err(|e| FloatError::config(format!("host key {}: {e}", path.display()))),
        None => KeyPair::generate_ed25519()
            .ok_or_else(|| FloatError::config("could not generate a host key")),
    }
}

fn window_size(cols: u32, rows: u32) -> WindowSize {
    WindowSize::new(
        u16::try_from(cols).unwrap_or(u16::MAX),
        u16::try_from(rows).unwrap_or(u16::MAX),
    )
}

fn broken_pipe() -> io::Error {
    io::Error::from(io::ErrorKind::BrokenPipe)
}

#[derive(Debug, PartialEq, Eq)]
enum Outbound {
    Data(Vec<u8>),
    Exit(u32),
}

struct Inbound {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

/// The shell channel of one SSH client.
pub struct SshConnection {
    peer: SocketAddr,
    inbound: tokio::sync::Mutex<Inbound>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    size: watch::Receiver<Option<WindowSize>>,
    token: CancellationToken,
}

impl SshConnection {
    fn new(
        peer: SocketAddr,
        inbound: mpsc::Receiver<Vec<u8>>,
        outbound: mpsc::Sender<Outbound>,
        size: watch::Receiver<Option<WindowSize>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            peer,
            inbound: tokio::sync::Mutex::new(Inbound {
                rx: inbound,
                pending: Vec::new(),
            }),
            outbound: Mutex::new(Some(outbound)),
            size,
            token,
        }
    }
}

#[async_trait]
impl Connection for SshConnection {
    fn pty(&self) -> Option<Pty> {
        let window = (*self.size.borrow())?;
        Some(Pty::new(window, self.size.clone()))
    }

    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.inbound.lock().await;
        if inbound.pending.is_empty() {
            match inbound.rx.recv().await {
                Some(chunk) => inbound.pending = chunk,
                None => return Ok(0),
            }
        }

        let n = inbound.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&inbound.pending[..n]);
        inbound.pending.drain(..n);
        Ok(n)
    }

    /// Never waits. A full queue disconnects the viewer.
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let outbound = self.outbound.lock();
        let sender = outbound.as_ref().ok_or_else(broken_pipe)?;
        match sender.try_send(Outbound::Data(data.to_vec())) {
            Ok(()) => Ok(data.len()),
            Err(TrySendError::Full(_)) => {
                warn!("{} stopped reading, disconnecting", self.peer);
                self.token.cancel();
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "viewer stopped reading its output",
                ))
            }
            Err(TrySendError::Closed(_)) => Err(broken_pipe()),
        }
    }

    fn exit(&self, status: u32) -> io::Result<()> {
        info!("closing ssh session with {} (status {status})", self.peer);
        if let Some(sender) = self.outbound.lock().take() {
            if sender.try_send(Outbound::Exit(status)).is_err() {
                debug!("exit status for {} dropped, output queue is full", self.peer);
            }
        }
        self.token.cancel();
        Ok(())
    }

    fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Deliver queued output in order, then the exit status, then close the channel.
async fn writer_task(handle: Handle, channel: ChannelId, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(message) = rx.recv().await {
        match message {
            Outbound::Data(data) => {
                if handle
                    .data(channel, CryptoVec::from_slice(&data))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Outbound::Exit(status) => {
                let _ = handle.exit_status_request(channel, status).await;
                let _ = handle.eof(channel).await;
                break;
            }
        }
    }
    let _ = handle.close(channel).await;
}

/// Per-client protocol handler. Only the first session channel is served.
struct ShellHandler {
    peer: SocketAddr,
    token: CancellationToken,
    channel: Option<ChannelId>,
    size: watch::Sender<Option<WindowSize>>,
    inbound: Option<mpsc::Sender<Vec<u8>>>,
    ready: Option<oneshot::Sender<Arc<SshConnection>>>,
}

impl ShellHandler {
    fn new(
        peer: SocketAddr,
        token: CancellationToken,
        ready: oneshot::Sender<Arc<SshConnection>>,
    ) -> Self {
        Self {
            peer,
            token,
            channel: None,
            size: watch::channel(None).0,
            inbound: None,
            ready: Some(ready),
        }
    }

    fn open_shell(&mut self, channel: ChannelId, handle: Handle) {
        if self.channel != Some(channel) {
            return;
        }
        let Some(ready) = self.ready.take() else {
            return;
        };

        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        tokio::spawn(writer_task(handle, channel, out_rx));

        let connection = SshConnection::new(
            self.peer,
            in_rx,
            out_tx,
            self.size.subscribe(),
            self.token.clone(),
        );
        self.inbound = Some(in_tx);
        let _ = ready.send(Arc::new(connection));
    }
}

#[async_trait]
impl Handler for ShellHandler {
    type Error = russh::Error;

    async fn auth_none(&mut self, user: &str) -> std::result::Result<Auth, Self::Error> {
        debug!("{} logged in as {user}", self.peer);
        Ok(Auth::Accept)
    }

    async fn auth_password(
        &mut self,
        user: &str,
        _password: &str,
    ) -> std::result::Result<Auth, Self::Error> {
        self.auth_none(user).await
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        _public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        self.auth_none(user).await
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        if self.channel.is_some() {
            return Ok(false);
        }
        self.channel = Some(channel.id());
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        debug!("{} requested a {term} pty of {col_width}x{row_height}", self.peer);
        self.size
            .send_replace(Some(window_size(col_width, row_height)));
        session.channel_success(channel);
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        _channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        debug!("{} resized to {col_width}x{row_height}", self.peer);
        self.size
            .send_replace(Some(window_size(col_width, row_height)));
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        session.channel_success(channel);
        self.open_shell(channel, session.handle());
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        _data: &[u8],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.shell_request(channel, session).await
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let Some(inbound) = self.inbound.clone() else {
            return Ok(());
        };
        let delivered = tokio::select! {
            sent = inbound.send(data.to_vec()) => sent.is_ok(),
            _ = self.token.cancelled() => true,
        };
        if !delivered {
            self.inbound = None;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.inbound = None;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.token.cancel();
        Ok(())
    }
}

/// Runs the SSH protocol on accepted sockets.
pub struct SshServer {
    config: Arc<Config>,
    login_timeout: Duration,
}

impl SshServer {
    pub fn new(host_key: KeyPair, login_timeout: Duration) -> Self {
        let config = Config {
            methods: MethodSet::NONE | MethodSet::PASSWORD | MethodSet::PUBLICKEY,
            keys: vec![host_key],
            auth_rejection_time: Duration::from_millis(250),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
            login_timeout,
        }
    }

    /// Run the handshake on `stream` and wait up to the login timeout for a shell.
    pub async fn accept(
        &self,
        stream: TcpStream,
        shutdown: &CancellationToken,
    ) -> Result<OpenShell> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        let token = shutdown.child_token();
        let (ready_tx, ready_rx) = oneshot::channel();
        let handler = ShellHandler::new(peer, token.clone(), ready_tx);
        let running = russh::server::run_stream(Arc::clone(&self.config), stream, handler)
            .await
            .map_err(|e| FloatError::handshake(e.to_string()))?;

        let driver = {
            let token = token.clone();
            tokio::spawn(async move {
                if let Err(err) = running.await {
                    debug!("ssh connection with {peer} ended: {err}");
                }
                token.cancel();
            })
        };

        let opened = tokio::select! {
            ready = ready_rx => ready.ok(),
            _ = tokio::time::sleep(self.login_timeout) => None,
            _ = token.cancelled() => None,
        };
        match opened {
            Some(connection) => Ok(OpenShell { connection, driver }),
            None => {
                driver.abort();
                Err(FloatError::handshake(format!("{peer} never opened a shell")))
            }
        }
    }
}

/// A client with an open shell channel, plus the task driving its SSH connection.
pub struct OpenShell {
    pub connection: Arc<SshConnection>,
    driver: JoinHandle<()>,
}

impl OpenShell {
    /// Wait for the client to hang up after `exit`, dropping it if it lingers.
    pub async fn finish(self) {
        let mut driver = self.driver;
        if tokio::time::timeout(CLOSE_GRACE, &mut driver).await.is_err() {
            debug!("{} did not hang up, dropping it", self.connection.peer);
            driver.abort();
        }
    }
}
