//! Per-connection control loop.
//!
//! A session owns one render target and one registration with the viewer broadcast.
//! It moves through `Init -> Running -> Closing -> Closed`; exactly one closing sequence
//! runs no matter how many triggers race for it.

use crate::canvas::{SharedCanvas, Viewer, ViewerId};
use crate::error::Result;
use crate::gradient::GradientSpec;
use crate::input::{InputAction, InputEvent, InputStateMachine};
use crate::screen::RenderTarget;
use crate::transport::Connection;
use log::{debug, warn};
use parking_lot::Mutex;
use ratatui::style::Style;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;

/// Drawn on the viewer's own screen at startup; other viewers never see it.
pub const WELCOME_BANNER: [&str; 7] = [
    "Welcome to float.",
    "Float is a shared experience, if others join you'll",
    "see what they draw and they'll see what you draw.",
    "",
    "Drag with any mouse button to draw.",
    "",
    "Spacebar to change colors, Esc to leave",
];

/// Written to the connection once the terminal has been given back.
pub const FAREWELL: [&str; 5] = [
    "     ......",
    "         ......",
    "Goodbye, thanks for floating",
    "               ......",
    "                   ......",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Running,
    Closing,
    Closed,
}

pub struct Session<T: RenderTarget + 'static> {
    id: u64,
    canvas: SharedCanvas,
    target: Arc<T>,
    conn: Arc<dyn Connection>,
    state: Mutex<SessionState>,
    viewer_id: Mutex<Option<ViewerId>>,
    gradient: Mutex<Option<Arc<GradientSpec>>>,
    repaint_interval: Duration,
}

impl<T: RenderTarget + 'static> Session<T> {
    pub fn new(
        id: u64,
        canvas: SharedCanvas,
        target: Arc<T>,
        conn: Arc<dyn Connection>,
        repaint_interval: Duration,
    ) -> Self {
        Self {
            id,
            canvas,
            target,
            conn,
            state: Mutex::new(SessionState::Init),
            viewer_id: Mutex::new(None),
            gradient: Mutex::new(None),
            repaint_interval,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn viewer_id(&self) -> Option<ViewerId> {
        *self.viewer_id.lock()
    }

    pub fn gradient(&self) -> Option<Arc<GradientSpec>> {
        self.gradient.lock().clone()
    }

    /// Serve the connection to completion and exit it with the outcome.
    ///
    /// Failures stay inside this session: the message goes to the remote and the
    /// connection exits with status 1.
    pub async fn serve(&self) -> io::Result<()> {
        let status = match self.run().await {
            Ok(()) => 0,
            Err(err) => {
                warn!("session {} failed: {err}", self.id);
                if let Err(cleanup) = self.shutdown(false) {
                    debug!("session {} cleanup failed: {cleanup}", self.id);
                }
                if let Err(write_err) = self.conn.write(format!("{err}\r\n").as_bytes()) {
                    debug!("session {} could not report its error: {write_err}", self.id);
                }
                1
            }
        };
        self.conn.exit(status)
    }

    /// Start, then run until quit, cancellation or the end of input, then close.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.start()?;
        let cancellation = self.conn.cancellation();
        let mut input = InputStateMachine::new();

        let mut repaint = tokio::time::interval(self.repaint_interval);
        repaint.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = repaint.tick() => self.target.show()?,
                event = events.recv() => match event {
                    Some(event) => {
                        if !self.handle_event(&mut input, &event)? {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.close()?;
        Ok(())
    }

    /// Initialize the render target, draw the banner and join the shared canvas.
    pub fn start(&self) -> Result<UnboundedReceiver<InputEvent>> {
        let events = self.target.init()?;

        let style = Style::reset();
        self.target.set_style(style);
        self.target.clear();
        for (y, line) in WELCOME_BANNER.iter().enumerate() {
            for (x, glyph) in line.chars().enumerate() {
                self.target.set_content(x as u16, y as u16, glyph, &[], style);
            }
        }
        self.target.enable_pointer_capture()?;

        let viewer: Arc<dyn Viewer> = self.target.clone();
        *self.viewer_id.lock() = Some(self.canvas.viewers.add(viewer));
        self.reroll_gradient();

        *self.state.lock() = SessionState::Running;
        Ok(events)
    }

    /// Apply one input event. Returns false when the viewer asked to leave.
    fn handle_event(&self, input: &mut InputStateMachine, event: &InputEvent) -> Result<bool> {
        match input.handle_event(event) {
            InputAction::Draw { x, y } => {
                if let Some(gradient) = self.gradient() {
                    self.canvas.decay.add_point(x, y, &gradient);
                }
            }
            InputAction::Resync { width, height } => {
                debug!("session {} resized to {width}x{height}", self.id);
                self.target.sync()?;
            }
            InputAction::ChangeGradient => self.reroll_gradient(),
            InputAction::Quit => return Ok(false),
            InputAction::NoAction => {}
        }
        Ok(true)
    }

    fn reroll_gradient(&self) {
        let gradient = self.canvas.gradients.random(&mut rand::thread_rng());
        debug!("session {} paints with {}", self.id, gradient.name());
        *self.gradient.lock() = Some(gradient);
    }

    /// Run the closing sequence. Returns `Ok(false)` if it already ran or is running.
    pub fn close(&self) -> Result<bool> {
        self.shutdown(true)
    }

    fn shutdown(&self, farewell: bool) -> Result<bool> {
        {
            let mut state = self.state.lock();
            if matches!(*state, SessionState::Closing | SessionState::Closed) {
                return Ok(false);
            }
            *state = SessionState::Closing;
        }

        let viewer_id = self.viewer_id.lock().take();
        if let Some(id) = viewer_id {
            self.canvas.viewers.remove(id);
        }
        self.target.clear();
        let shown = self.target.show();
        let finalized = self.target.finalize();
        let written = if farewell {
            self.write_lines(&FAREWELL)
        } else {
            Ok(())
        };

        *self.state.lock() = SessionState::Closed;
        shown?;
        finalized?;
        written?;
        Ok(true)
    }

    fn write_lines(&self, lines: &[&str]) -> io::Result<()> {
        for line in lines {
            self.conn.write(line.as_bytes())?;
            self.conn.write(b"\r\n")?;
        }
        Ok(())
    }
}
