//! Low-level input decoding: raw terminal bytes from a remote client into crossterm
//! events.
//!
//! The remote terminal is not ours to poll, so instead of `crossterm::event::read` the
//! byte stream coming off the connection is parsed here. Escape sequences split across
//! reads are held until complete, including a trailing ESC: it only becomes the Esc key
//! through [`RawInputDecoder::flush_escape`] once no continuation arrived.

use ratatui::crossterm::event::{
    Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use std::collections::VecDeque;

const ESC: u8 = 0x1b;
/// Longest partial escape sequence held between reads before it is discarded.
const MAX_PENDING: usize = 32;

/// Incremental decoder for keyboard and xterm mouse input.
#[derive(Debug, Default)]
pub struct RawInputDecoder {
    pending: Vec<u8>,
    after_cr: bool,
    events: VecDeque<Event>,
}

enum Step {
    /// Bytes consumed, possibly producing an event.
    Consumed(usize, Option<Event>),
    /// More bytes are needed.
    Incomplete,
}

impl RawInputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes read from the connection.
    pub fn feed(&mut self, input: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(input);

        let mut offset = 0;
        while offset < bytes.len() {
            match step(&bytes[offset..], &mut self.after_cr) {
                Step::Consumed(n, event) => {
                    offset += n;
                    if let Some(event) = event {
                        self.events.push_back(event);
                    }
                }
                Step::Incomplete => break,
            }
        }
        bytes.drain(..offset);

        if bytes.len() <= MAX_PENDING {
            self.pending = bytes;
        }
    }

    /// True while the only held input is an ESC that may start a sequence.
    pub fn awaiting_escape(&self) -> bool {
        self.pending == [ESC]
    }

    /// Give up waiting for a continuation: a held lone ESC is the Esc key.
    pub fn flush_escape(&mut self) {
        if self.awaiting_escape() {
            self.pending.clear();
            self.events.push_back(key(KeyCode::Esc, KeyModifiers::NONE));
        }
    }

    /// Drain every decoded event.
    pub fn drain_events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }
}

fn step(bytes: &[u8], after_cr: &mut bool) -> Step {
    let first = bytes[0];

    // CR LF and CR NUL are a single Enter
    let follows_cr = std::mem::replace(after_cr, first == b'\r');
    if follows_cr && (first == b'\n' || first == 0) {
        return Step::Consumed(1, None);
    }

    match first {
        ESC => decode_escape(bytes),
        0 => Step::Consumed(1, None),
        b'\r' | b'\n' => Step::Consumed(1, Some(key(KeyCode::Enter, KeyModifiers::NONE))),
        b'\t' => Step::Consumed(1, Some(key(KeyCode::Tab, KeyModifiers::NONE))),
        0x7f | 0x08 => Step::Consumed(1, Some(key(KeyCode::Backspace, KeyModifiers::NONE))),
        0x01..=0x1a => {
            let letter = char::from(b'a' + first - 1);
            Step::Consumed(1, Some(key(KeyCode::Char(letter), KeyModifiers::CONTROL)))
        }
        0x1c..=0x1f => Step::Consumed(1, None),
        _ => decode_utf8(bytes),
    }
}

fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
    Event::Key(KeyEvent::new(code, modifiers))
}

fn decode_utf8(bytes: &[u8]) -> Step {
    let width = match bytes[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Step::Consumed(1, None),
    };
    if bytes.len() < width {
        return Step::Incomplete;
    }
    match std::str::from_utf8(&bytes[..width])
        .ok()
        .and_then(|s| s.chars().next())
    {
        Some(ch) => Step::Consumed(width, Some(key(KeyCode::Char(ch), KeyModifiers::NONE))),
        None => Step::Consumed(1, None),
    }
}

fn decode_escape(bytes: &[u8]) -> Step {
    match bytes.get(1) {
        // could be the Esc key or the first byte of a sequence cut by the read
        None => Step::Incomplete,
        Some(b'[') => decode_csi(bytes),
        Some(b'O') => match bytes.get(2) {
            None => Step::Incomplete,
            Some(&final_byte) => Step::Consumed(3, cursor_key(final_byte)),
        },
        Some(&ESC) => Step::Consumed(1, Some(key(KeyCode::Esc, KeyModifiers::NONE))),
        Some(_) => match decode_utf8(&bytes[1..]) {
            Step::Consumed(n, Some(Event::Key(mut key_event))) => {
                key_event.modifiers |= KeyModifiers::ALT;
                Step::Consumed(n + 1, Some(Event::Key(key_event)))
            }
            Step::Consumed(n, other) => Step::Consumed(n + 1, other),
            Step::Incomplete => Step::Incomplete,
        },
    }
}

fn cursor_key(final_byte: u8) -> Option<Event> {
    let code = match final_byte {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        _ => return None,
    };
    Some(key(code, KeyModifiers::NONE))
}

fn decode_csi(bytes: &[u8]) -> Step {
    // X10 mouse: ESC [ M Cb Cx Cy, each offset by 32
    if bytes.get(2) == Some(&b'M') {
        return match bytes.get(3..6) {
            Some(&[cb, cx, cy]) => Step::Consumed(
                6,
                mouse_event(
                    u16::from(cb.saturating_sub(32)),
                    u16::from(cx.saturating_sub(32)),
                    u16::from(cy.saturating_sub(32)),
                    false,
                ),
            ),
            _ => Step::Incomplete,
        };
    }

    // parameter and intermediate bytes, then one final byte in 0x40..=0x7e
    let Some(end) = bytes[2..]
        .iter()
        .position(|b| (0x40..=0x7e).contains(b))
        .map(|pos| pos + 2)
    else {
        return Step::Incomplete;
    };
    let params = &bytes[2..end];
    let final_byte = bytes[end];
    let consumed = end + 1;

    if let Some(sgr) = params.strip_prefix(b"<") {
        let fields = parse_params(sgr);
        let event = match (fields.as_slice(), final_byte) {
            ([cb, cx, cy], b'M') => mouse_event(*cb, *cx, *cy, false),
            ([cb, cx, cy], b'm') => mouse_event(*cb, *cx, *cy, true),
            _ => None,
        };
        return Step::Consumed(consumed, event);
    }

    let event = match final_byte {
        b'~' => {
            let code = match parse_params(params).first() {
                Some(1) | Some(7) => Some(KeyCode::Home),
                Some(2) => Some(KeyCode::Insert),
                Some(3) => Some(KeyCode::Delete),
                Some(4) | Some(8) => Some(KeyCode::End),
                Some(5) => Some(KeyCode::PageUp),
                Some(6) => Some(KeyCode::PageDown),
                _ => None,
            };
            code.map(|code| key(code, KeyModifiers::NONE))
        }
        _ if params.is_empty() => cursor_key(final_byte),
        _ => None,
    };
    Step::Consumed(consumed, event)
}

fn parse_params(params: &[u8]) -> Vec<u16> {
    params
        .split(|&b| b == b';')
        .map(|field| {
            field
                .iter()
                .filter(|b| b.is_ascii_digit())
                .fold(0u16, |acc, b| {
                    acc.saturating_mul(10).saturating_add(u16::from(b - b'0'))
                })
        })
        .collect()
}

/// Build a mouse event from an xterm button code and 1-based coordinates.
fn mouse_event(cb: u16, cx: u16, cy: u16, released: bool) -> Option<Event> {
    let mut modifiers = KeyModifiers::NONE;
    if cb & 4 != 0 {
        modifiers |= KeyModifiers::SHIFT;
    }
    if cb & 8 != 0 {
        modifiers |= KeyModifiers::ALT;
    }
    if cb & 16 != 0 {
        modifiers |= KeyModifiers::CONTROL;
    }

    let button = match cb & 3 {
        0 => Some(MouseButton::Left),
        1 => Some(MouseButton::Middle),
        2 => Some(MouseButton::Right),
        _ => None,
    };
    let motion = cb & 32 != 0;

    let kind = if cb & 64 != 0 {
        match cb & 3 {
            0 => MouseEventKind::ScrollUp,
            1 => MouseEventKind::ScrollDown,
            2 => MouseEventKind::ScrollLeft,
            _ => MouseEventKind::ScrollRight,
        }
    } else {
        match (button, motion, released) {
            (Some(button), _, true) => MouseEventKind::Up(button),
            // X10 release does not say which button
            (None, false, _) => MouseEventKind::Up(MouseButton::Left),
            (Some(button), true, false) => MouseEventKind::Drag(button),
            (Some(button), false, false) => MouseEventKind::Down(button),
            (None, true, _) => MouseEventKind::Moved,
        }
    };

    Some(Event::Mouse(MouseEvent {
        kind,
        column: cx.saturating_sub(1),
        row: cy.saturating_sub(1),
        modifiers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Vec<Event> {
        let mut decoder = RawInputDecoder::new();
        decoder.feed(bytes);
        decoder.drain_events().collect()
    }

    fn feed(decoder: &mut RawInputDecoder, bytes: &[u8]) -> Vec<Event> {
        decoder.feed(bytes);
        decoder.drain_events().collect()
    }

    fn key_press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn decodes_plain_and_control_keys() {
        assert_eq!(
            decode(b" a\x03\x7f"),
            vec![
                key_press(KeyCode::Char(' ')),
                key_press(KeyCode::Char('a')),
                Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
                key_press(KeyCode::Backspace),
            ]
        );
    }

    #[test]
    fn carriage_return_pairs_are_one_enter() {
        assert_eq!(
            decode(b"\r\n\r\0"),
            vec![key_press(KeyCode::Enter), key_press(KeyCode::Enter)]
        );
    }

    #[test]
    fn trailing_escape_waits_for_the_next_read() {
        let mut decoder = RawInputDecoder::new();
        assert!(feed(&mut decoder, b"\x1b").is_empty());
        assert!(decoder.awaiting_escape());

        assert_eq!(
            feed(&mut decoder, b"[<32;11;10M"),
            vec![mouse(MouseEventKind::Drag(MouseButton::Left), 10, 9)]
        );
        assert!(!decoder.awaiting_escape());
    }

    #[test]
    fn escape_split_inside_a_drag_burst() {
        let mut decoder = RawInputDecoder::new();
        let drag = b"\x1b[<32;11;10M";
        let mut events = feed(&mut decoder, &[&drag[..], &drag[..1]].concat());
        events.extend(feed(&mut decoder, &[&drag[1..], &drag[..]].concat()));

        assert_eq!(
            events,
            vec![mouse(MouseEventKind::Drag(MouseButton::Left), 10, 9); 3]
        );
    }

    #[test]
    fn flushed_lone_escape_is_esc_key() {
        let mut decoder = RawInputDecoder::new();
        assert!(feed(&mut decoder, b"\x1b").is_empty());
        decoder.flush_escape();
        assert_eq!(
            decoder.drain_events().collect::<Vec<_>>(),
            vec![key_press(KeyCode::Esc)]
        );

        // nothing held, nothing flushed
        decoder.flush_escape();
        assert_eq!(decoder.drain_events().count(), 0);
    }

    #[test]
    fn escape_followed_by_plain_key_is_alt() {
        let mut decoder = RawInputDecoder::new();
        assert!(feed(&mut decoder, b"\x1b").is_empty());
        assert_eq!(
            feed(&mut decoder, b"x"),
            vec![Event::Key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::ALT))]
        );
    }

    #[test]
    fn decodes_cursor_keys_and_alt() {
        assert_eq!(
            decode(b"\x1b[A\x1bOD\x1b[6~\x1bx"),
            vec![
                key_press(KeyCode::Up),
                key_press(KeyCode::Left),
                key_press(KeyCode::PageDown),
                Event::Key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::ALT)),
            ]
        );
    }

    #[test]
    fn decodes_sgr_mouse() {
        assert_eq!(
            decode(b"\x1b[<0;6;4M\x1b[<32;7;4M\x1b[<0;7;4m\x1b[<35;8;4M\x1b[<64;1;1M"),
            vec![
                mouse(MouseEventKind::Down(MouseButton::Left), 5, 3),
                mouse(MouseEventKind::Drag(MouseButton::Left), 6, 3),
                mouse(MouseEventKind::Up(MouseButton::Left), 6, 3),
                mouse(MouseEventKind::Moved, 7, 3),
                mouse(MouseEventKind::ScrollUp, 0, 0),
            ]
        );
    }

    #[test]
    fn decodes_x10_mouse() {
        assert_eq!(
            decode(&[ESC, b'[', b'M', 32, 33 + 9, 33 + 2, ESC, b'[', b'M', 35, 33, 33]),
            vec![
                mouse(MouseEventKind::Down(MouseButton::Left), 9, 2),
                mouse(MouseEventKind::Up(MouseButton::Left), 0, 0),
            ]
        );
    }

    #[test]
    fn holds_sequences_split_across_reads() {
        let mut decoder = RawInputDecoder::new();
        assert!(feed(&mut decoder, b"\x1b[<0;1").is_empty());
        assert!(!decoder.awaiting_escape());
        assert_eq!(
            feed(&mut decoder, b"0;2M\xc3"),
            vec![mouse(MouseEventKind::Down(MouseButton::Left), 9, 1)]
        );
        assert_eq!(
            feed(&mut decoder, b"\xa9"),
            vec![key_press(KeyCode::Char('é'))]
        );
    }

    #[test]
    fn ignores_unknown_sequences() {
        assert_eq!(
            decode(b"\x1b[?1;2c\x1b[200~q"),
            vec![key_press(KeyCode::Char('q'))]
        );
    }
}
