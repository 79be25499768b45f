//! Input subsystem.
//!
//! Raw bytes from a remote terminal are decoded into crossterm events by
//! [`raw::RawInputDecoder`], mapped to [`InputEvent`]s and resolved to [`InputAction`]s.

pub mod raw;
pub mod service;

pub use raw::RawInputDecoder;
pub use service::{
    spawn_input_task, Buttons, InputAction, InputEvent, InputService, InputStateMachine,
};
