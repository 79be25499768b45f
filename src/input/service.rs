//! High-level input service.
//!
//! Turns decoded terminal events into the closed set of session inputs, then runs the
//! canvas input state machine to yield the `InputAction`s the session loop consumes.

use crate::input::raw::RawInputDecoder;
use crate::transport::SessionTty;
use ratatui::crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};
use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// How long a trailing ESC waits for the rest of its sequence before it counts as Esc.
pub const ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

/// Pointer buttons held during a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons(u8);

impl Buttons {
    pub const NONE: Buttons = Buttons(0);
    pub const PRIMARY: Buttons = Buttons(1);
    pub const MIDDLE: Buttons = Buttons(1 << 1);
    pub const SECONDARY: Buttons = Buttons(1 << 2);

    pub fn any_pressed(self) -> bool {
        self.0 != 0
    }

    fn from_mouse_button(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => Buttons::PRIMARY,
            MouseButton::Middle => Buttons::MIDDLE,
            MouseButton::Right => Buttons::SECONDARY,
        }
    }
}

impl BitOr for Buttons {
    type Output = Buttons;

    fn bitor(self, rhs: Buttons) -> Buttons {
        Buttons(self.0 | rhs.0)
    }
}

/// Events a render target delivers to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Pointer { x: u16, y: u16, buttons: Buttons },
    Resize { width: u16, height: u16 },
    Key(KeyEvent),
}

impl InputEvent {
    /// Map a crossterm event. Scroll wheels and focus/paste events have no meaning here.
    pub fn from_terminal(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) => Some(InputEvent::Key(key)),
            Event::Resize(width, height) => Some(InputEvent::Resize { width, height }),
            Event::Mouse(mouse) => {
                let buttons = match mouse.kind {
                    MouseEventKind::Down(button) | MouseEventKind::Drag(button) => {
                        Buttons::from_mouse_button(button)
                    }
                    MouseEventKind::Up(_) | MouseEventKind::Moved => Buttons::NONE,
                    _ => return None,
                };
                Some(InputEvent::Pointer {
                    x: mouse.column,
                    y: mouse.row,
                    buttons,
                })
            }
            _ => None,
        }
    }
}

/// What a session does in response to input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Paint a point at the pointer.
    Draw { x: u16, y: u16 },
    /// The remote window changed; redraw everything.
    Resync { width: u16, height: u16 },
    /// Pick another random gradient.
    ChangeGradient,
    Quit,
    NoAction,
}

/// Canvas key and pointer bindings.
#[derive(Debug, Default)]
pub struct InputStateMachine;

impl InputStateMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle_event(&mut self, event: &InputEvent) -> InputAction {
        match *event {
            InputEvent::Pointer { x, y, buttons } if buttons.any_pressed() => {
                InputAction::Draw { x, y }
            }
            InputEvent::Pointer { .. } => InputAction::NoAction,
            InputEvent::Resize { width, height } => InputAction::Resync { width, height },
            InputEvent::Key(key_event) => self.handle_key_event(key_event),
        }
    }

    pub fn handle_key_event(&mut self, key_event: KeyEvent) -> InputAction {
        if key_event.kind != KeyEventKind::Press {
            return InputAction::NoAction;
        }

        match (key_event.code, key_event.modifiers) {
            (KeyCode::Char(' '), modifiers)
                if !modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                InputAction::ChangeGradient
            }
            (KeyCode::Esc, _) => InputAction::Quit,
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => InputAction::Quit,
            _ => InputAction::NoAction,
        }
    }
}

/// Decodes a connection's byte stream into session input.
#[derive(Debug, Default)]
pub struct InputService {
    decoder: RawInputDecoder,
}

impl InputService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode raw bytes into input events.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<InputEvent> {
        self.decoder.feed(bytes);
        self.decoder
            .drain_events()
            .filter_map(InputEvent::from_terminal)
            .collect()
    }

    /// Whether a trailing ESC is held back waiting for more input.
    pub fn awaiting_escape(&self) -> bool {
        self.decoder.awaiting_escape()
    }

    /// Resolve a held ESC as the Esc key.
    pub fn flush_escape(&mut self) -> Vec<InputEvent> {
        self.decoder.flush_escape();
        self.decoder
            .drain_events()
            .filter_map(InputEvent::from_terminal)
            .collect()
    }
}

/// Spawn the task reading a terminal adapter and forwarding decoded events.
///
/// The task ends, dropping `tx`, when the adapter reaches end-of-stream (after `drain`
/// or a remote disconnect) or the receiver goes away.
pub fn spawn_input_task(tty: Arc<SessionTty>, tx: UnboundedSender<InputEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut service = InputService::new();
        let mut buf = [0u8; 1024];
        loop {
            let read = if service.awaiting_escape() {
                match tokio::time::timeout(ESCAPE_TIMEOUT, tty.read(&mut buf)).await {
                    Ok(read) => read,
                    Err(_) => {
                        for event in service.flush_escape() {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                        continue;
                    }
                }
            } else {
                tty.read(&mut buf).await
            };
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    log::debug!("input read failed: {err}");
                    break;
                }
            };
            for event in service.decode(&buf[..n]) {
                if tx.send(event).is_err() {
                    return;
                }
            }
        }
    })
}
