//! SSH front door: accepts connections and serves a session on each.

use crate::canvas::{spawn_frame_clock, SharedCanvas};
use crate::config::ServerConfig;
use crate::error::{FloatError, Result};
use crate::screen::TerminalScreen;
use crate::session::Session;
use crate::transport::{Connection, SessionTty, SshServer};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct CanvasServer {
    listener: TcpListener,
    ssh: Arc<SshServer>,
    config: ServerConfig,
    canvas: SharedCanvas,
}

impl CanvasServer {
    pub async fn bind(config: ServerConfig, canvas: SharedCanvas) -> Result<Self> {
        config.validate()?;
        let ssh = SshServer::new(config.host_key()?, config.login_timeout());
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| FloatError::io(format!("binding {}", config.listen), e))?;
        Ok(Self {
            listener,
            ssh: Arc::new(ssh),
            config,
            canvas,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the frame clock and accept loop until `shutdown` is cancelled, then wait for
    /// every session to say goodbye.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let clock = spawn_frame_clock(
            self.canvas.clone(),
            self.config.frame_interval(),
            shutdown.child_token(),
        );
        info!("Listening for SSH connections at {}", self.local_addr()?);

        let mut sessions = JoinSet::new();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = next_id;
                        next_id += 1;
                        sessions.spawn(serve_connection(
                            id,
                            stream,
                            peer,
                            Arc::clone(&self.ssh),
                            self.canvas.clone(),
                            self.config.repaint_interval(),
                            shutdown.child_token(),
                        ));
                    }
                    Err(err) => warn!("accept failed: {err}"),
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = joined {
                        warn!("session task failed: {err}");
                    }
                }
            }
        }

        debug!("shutting down, waiting for {} sessions", sessions.len());
        while let Some(joined) = sessions.join_next().await {
            if let Err(err) = joined {
                warn!("session task failed: {err}");
            }
        }
        if let Err(err) = clock.await {
            warn!("frame clock failed: {err}");
        }
        Ok(())
    }
}

async fn serve_connection(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    ssh: Arc<SshServer>,
    canvas: SharedCanvas,
    repaint_interval: Duration,
    shutdown: CancellationToken,
) {
    info!("New connection -> {id} ({peer})");

    match ssh.accept(stream, &shutdown).await {
        Ok(shell) => {
            let conn: Arc<dyn Connection> = shell.connection.clone();
            let tty = Arc::new(SessionTty::new(Arc::clone(&conn)));
            let screen = Arc::new(TerminalScreen::new(tty));
            let session = Session::new(id, canvas, screen, conn, repaint_interval);
            if let Err(err) = session.serve().await {
                debug!("connection {id} did not exit cleanly: {err}");
            }
            shell.finish().await;
        }
        Err(err) => warn!("connection {id} from {peer}: {err}"),
    }

    info!("Closed         -> {id}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::GradientTable;
    use tokio::time::timeout;

    fn local_config() -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn binds_ephemeral_port_and_stops_on_shutdown() {
        let canvas = SharedCanvas::new(GradientTable::builtin().unwrap());
        let server = CanvasServer::bind(local_config(), canvas).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.run(shutdown.clone()));
        shutdown.cancel();

        timeout(Duration::from_secs(1), task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let canvas = SharedCanvas::new(GradientTable::builtin().unwrap());
        let config = ServerConfig {
            frame_rate: 0,
            ..local_config()
        };
        assert!(matches!(
            CanvasServer::bind(config, canvas).await,
            Err(FloatError::ConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_unreadable_host_key() {
        let canvas = SharedCanvas::new(GradientTable::builtin().unwrap());
        let config = ServerConfig {
            host_key: Some("/nonexistent/floatterm_host_key".into()),
            ..local_config()
        };
        assert!(matches!(
            CanvasServer::bind(config, canvas).await,
            Err(FloatError::ConfigError { .. })
        ));
    }
}
