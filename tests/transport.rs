mod support;

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use floatterm::transport::{load_host_key, Connection, OpenShell, SessionTty, SshServer, WindowSize};
use floatterm::FloatError;
use support::{Viewer, TIMEOUT};

/// Accept one SSH client on a fresh port and return both ends.
async fn open(pty: Option<(u32, u32)>) -> (OpenShell, Viewer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = tokio::spawn(Viewer::connect(addr, pty));

    let (stream, _) = listener.accept().await.unwrap();
    let server = SshServer::new(load_host_key(None).unwrap(), TIMEOUT);
    let shell = server
        .accept(stream, &CancellationToken::new())
        .await
        .unwrap();
    (shell, client.await.unwrap())
}

fn tty_for(shell: &OpenShell) -> SessionTty {
    let conn: Arc<dyn Connection> = shell.connection.clone();
    SessionTty::new(conn)
}

#[tokio::test]
async fn start_without_pty_is_not_ready() {
    let (shell, _viewer) = open(None).await;
    let tty = tty_for(&shell);

    assert!(matches!(tty.start(), Err(FloatError::TransportNotReady)));
    assert!(!tty.is_started());
    assert!(matches!(tty.stop(), Err(FloatError::NotStarted)));
}

#[tokio::test]
async fn stop_before_start_fails() {
    let (shell, _viewer) = open(Some((80, 24))).await;
    let tty = tty_for(&shell);
    assert!(matches!(tty.stop(), Err(FloatError::NotStarted)));
}

#[tokio::test]
async fn relays_keystrokes_and_resizes() {
    let (shell, mut viewer) = open(Some((80, 24))).await;
    let tty = tty_for(&shell);
    tty.start().unwrap();
    assert_eq!(tty.window_size(), WindowSize::new(80, 24));

    viewer.send(b"hello").await;
    let mut buf = [0u8; 16];
    let n = timeout(TIMEOUT, tty.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"hello");

    viewer.resize(132, 43).await;
    timeout(TIMEOUT, async {
        while tty.window_size() != WindowSize::new(132, 43) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("resize never arrived");
}

#[tokio::test]
async fn drain_unblocks_a_blocked_read() {
    let (shell, _viewer) = open(Some((80, 24))).await;
    let tty = Arc::new(tty_for(&shell));
    tty.start().unwrap();

    let reader = {
        let tty = Arc::clone(&tty);
        tokio::spawn(async move {
            let mut buf = [0u8; 16];
            tty.read(&mut buf).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!reader.is_finished());

    tty.drain();
    let n = timeout(Duration::from_millis(500), reader)
        .await
        .expect("read still blocked after drain")
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    // the connection itself is untouched
    tty.stop().unwrap();
    tty.close().unwrap();
    assert!(tty.write(b"still open").is_ok());
}

#[tokio::test]
async fn exit_status_reaches_the_client() {
    let (shell, mut viewer) = open(Some((80, 24))).await;
    shell.connection.write(b"bye\r\n").unwrap();
    shell.connection.exit(1).unwrap();

    viewer.read_to_close().await;
    assert_eq!(viewer.text(), "bye\r\n");
    assert_eq!(viewer.exit_status, Some(1));

    viewer.hang_up().await;
    timeout(TIMEOUT, shell.finish()).await.unwrap();
}
