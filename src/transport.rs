//! Remote connections and the raw-terminal adapter built on them.

pub mod connection;
pub mod ssh;
pub mod tty;

pub use connection::{Connection, Pty, WindowSize};
pub use ssh::{load_host_key, OpenShell, SshConnection, SshServer};
pub use tty::{ResizeCallback, SessionTty, TtyWriter};
