//! A scripted SSH viewer for driving the server from tests.

#![allow(dead_code)]

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct TrustingClient;

#[async_trait]
impl client::Handler for TrustingClient {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct Viewer {
    session: client::Handle<TrustingClient>,
    channel: russh::Channel<client::Msg>,
    pub output: Vec<u8>,
    pub exit_status: Option<u32>,
    closed: bool,
}

impl Viewer {
    /// Log in and open a shell, asking for a pty of `pty` columns and rows if given.
    pub async fn connect(addr: SocketAddr, pty: Option<(u32, u32)>) -> Viewer {
        let config = Arc::new(client::Config::default());
        let mut session = client::connect(config, addr, TrustingClient).await.unwrap();
        assert!(session.authenticate_none("viewer").await.unwrap());

        let mut channel = session.channel_open_session().await.unwrap();
        if let Some((width, height)) = pty {
            channel
                .request_pty(false, "xterm-256color", width, height, 0, 0, &[])
                .await
                .unwrap();
        }
        channel.request_shell(false).await.unwrap();

        Viewer {
            session,
            channel,
            output: Vec::new(),
            exit_status: None,
            closed: false,
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) {
        self.channel.data(bytes).await.unwrap();
    }

    pub async fn resize(&mut self, width: u32, height: u32) {
        self.channel.window_change(width, height, 0, 0).await.unwrap();
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Handle one channel message. False once the channel is closed.
    async fn pump(&mut self) -> bool {
        match self.channel.wait().await {
            Some(ChannelMsg::Data { data }) => self.output.extend_from_slice(&data),
            Some(ChannelMsg::ExitStatus { exit_status }) => self.exit_status = Some(exit_status),
            Some(ChannelMsg::Close) | None => self.closed = true,
            Some(_) => {}
        }
        !self.closed
    }

    pub async fn read_until(&mut self, needle: &[u8]) {
        timeout(TIMEOUT, async {
            while !self.output.windows(needle.len()).any(|w| w == needle) {
                assert!(
                    self.pump().await,
                    "channel closed before {:?}",
                    String::from_utf8_lossy(needle)
                );
            }
        })
        .await
        .expect("expected output never arrived");
    }

    pub async fn read_to_close(&mut self) {
        timeout(TIMEOUT, async { while self.pump().await {} })
            .await
            .expect("channel was not closed");
    }

    pub async fn hang_up(self) {
        let _ = self
            .session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}
