//! # floatterm - A Shared, Fading Terminal Canvas
//!
//! Remote terminal viewers connect over SSH and draw on one shared canvas with the
//! mouse. Every stroke glows, then fades back to the background over 256 frames, and
//! every viewer sees every stroke.
//!
//! ## Features
//!
//! - **Shared Canvas**: one decay ring and one viewer registry for the whole process
//! - **Fading Strokes**: points step through a 2 or 3 stop color gradient, then erase
//! - **Remote Terminals**: an SSH pty request stands in for a local tty
//! - **Session Isolation**: a failing viewer is told why and disconnected, nobody else notices
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`gradient`] - Color gradients and the table sessions pick from
//! - [`canvas`] - Decay engine, viewer broadcast and the frame clock
//! - [`transport`] - Connections and the raw-terminal adapter over them
//! - [`input`] - Remote terminal input decoding
//! - [`screen`] - Render targets backed by ratatui
//! - [`session`] - Per-connection control loop
//! - [`server`] - Accept loop and process-wide services

// Core modules
pub mod config;
pub mod error;
pub mod gradient;

// Shared canvas and the remote terminal plumbing
pub mod canvas;
pub mod input;
pub mod screen;
pub mod transport;

// Per-connection and process-wide orchestration
pub mod server;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{FloatError, Result};

// Public API surface for external usage
pub use canvas::{DecayEngine, SharedCanvas, ViewerBroadcast};
pub use config::ServerConfig;
pub use gradient::{GradientSpec, GradientTable};
pub use server::CanvasServer;
pub use session::Session;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
