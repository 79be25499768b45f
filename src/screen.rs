//! Render targets: the per-viewer copy of the canvas and the terminal it is shown on.
//!
//! A [`RenderTarget`] keeps its own cell buffer. The frame clock writes into it through
//! [`Viewer`]; the owning session flushes it on its repaint timer with `show`.

use crate::canvas::{CellUpdate, Viewer};
use crate::error::{FloatError, Result};
use crate::input::{spawn_input_task, InputEvent};
use crate::transport::{SessionTty, TtyWriter};
use parking_lot::Mutex;
use ratatui::backend::CrosstermBackend;
use ratatui::buffer::Buffer;
use ratatui::crossterm::cursor::{Hide, Show};
use ratatui::crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::{Terminal, TerminalOptions, Viewport};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

type ScreenTerminal = Terminal<CrosstermBackend<TtyWriter>>;

/// Capability a session needs from the terminal it renders to.
pub trait RenderTarget: Viewer {
    /// Take over the terminal. Returns the stream of input events.
    fn init(&self) -> Result<UnboundedReceiver<InputEvent>>;

    /// Style used for cleared cells.
    fn set_style(&self, style: Style);

    /// Reset every buffered cell to the default style.
    fn clear(&self);

    fn enable_pointer_capture(&self) -> Result<()>;

    /// Flush buffered content that changed since the last flush.
    fn show(&self) -> Result<()>;

    /// Redraw everything, adopting the current window size.
    fn sync(&self) -> Result<()>;

    /// Give the terminal back. Safe to call more than once.
    fn finalize(&self) -> Result<()>;
}

/// A ratatui terminal drawn over a [`SessionTty`].
pub struct TerminalScreen {
    tty: Arc<SessionTty>,
    canvas: Mutex<Buffer>,
    terminal: Mutex<Option<ScreenTerminal>>,
    style: Mutex<Style>,
    input_task: Mutex<Option<JoinHandle<()>>>,
}

impl TerminalScreen {
    pub fn new(tty: Arc<SessionTty>) -> Self {
        Self {
            tty,
            canvas: Mutex::new(Buffer::empty(Rect::default())),
            terminal: Mutex::new(None),
            style: Mutex::new(Style::reset()),
            input_task: Mutex::new(None),
        }
    }

    fn writer(&self) -> TtyWriter {
        TtyWriter::new(Arc::clone(&self.tty))
    }

    fn build_terminal(&self, area: Rect) -> Result<ScreenTerminal> {
        Terminal::with_options(
            CrosstermBackend::new(self.writer()),
            TerminalOptions {
                viewport: Viewport::Fixed(area),
            },
        )
        .map_err(|e| FloatError::render_init(e.to_string()))
    }

    fn window_rect(&self) -> Rect {
        let size = self.tty.window_size();
        Rect::new(0, 0, size.width, size.height)
    }
}

impl Viewer for TerminalScreen {
    fn set_content(&self, x: u16, y: u16, glyph: char, combining: &[char], style: Style) {
        put_cell(&mut self.canvas.lock(), x, y, glyph, combining, style);
    }

    fn apply_frame(&self, updates: &[CellUpdate]) {
        let mut canvas = self.canvas.lock();
        for update in updates {
            put_cell(&mut canvas, update.x, update.y, update.glyph, &[], update.style);
        }
    }
}

impl RenderTarget for TerminalScreen {
    fn init(&self) -> Result<UnboundedReceiver<InputEvent>> {
        self.tty.start()?;

        let area = self.window_rect();
        *self.canvas.lock() = Buffer::empty(area);

        let mut writer = self.writer();
        execute!(writer, EnterAlternateScreen, Hide)
            .map_err(|e| FloatError::render_init(e.to_string()))?;
        *self.terminal.lock() = Some(self.build_terminal(area)?);

        let (tx, rx) = mpsc::unbounded_channel();
        let resize_tx = tx.clone();
        self.tty.notify_resize(Some(Arc::new(move |size| {
            let _ = resize_tx.send(InputEvent::Resize {
                width: size.width,
                height: size.height,
            });
        })));
        *self.input_task.lock() = Some(spawn_input_task(Arc::clone(&self.tty), tx));

        Ok(rx)
    }

    fn set_style(&self, style: Style) {
        *self.style.lock() = style;
    }

    fn clear(&self) {
        let style = *self.style.lock();
        let mut canvas = self.canvas.lock();
        canvas.reset();
        let area = canvas.area;
        canvas.set_style(area, style);
    }

    fn enable_pointer_capture(&self) -> Result<()> {
        let mut writer = self.writer();
        execute!(writer, EnableMouseCapture)?;
        Ok(())
    }

    fn show(&self) -> Result<()> {
        let canvas = self.canvas.lock();
        let mut terminal = self.terminal.lock();
        if let Some(terminal) = terminal.as_mut() {
            terminal.draw(|frame| copy_cells(&canvas, frame.buffer_mut()))?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let area = self.window_rect();
        let mut canvas = self.canvas.lock();
        let mut terminal = self.terminal.lock();
        let Some(terminal) = terminal.as_mut() else {
            return Ok(());
        };

        // a fixed viewport never follows the window, so a new size needs a new terminal
        if canvas.area != area {
            let mut resized = Buffer::empty(area);
            copy_cells(&canvas, &mut resized);
            *canvas = resized;
            *terminal = self.build_terminal(area)?;
        }
        terminal.clear()?;
        terminal.draw(|frame| copy_cells(&canvas, frame.buffer_mut()))?;
        Ok(())
    }

    fn finalize(&self) -> Result<()> {
        self.tty.notify_resize(None);
        // stop only fails if the adapter was never started or is already stopped
        let _ = self.tty.stop();
        self.tty.drain();
        let input_task = self.input_task.lock().take();
        if let Some(task) = input_task {
            task.abort();
        }

        let Some(terminal) = self.terminal.lock().take() else {
            return Ok(());
        };
        drop(terminal);

        let mut writer = self.writer();
        execute!(writer, DisableMouseCapture, Show, LeaveAlternateScreen)?;
        self.tty.close()?;
        Ok(())
    }
}

fn put_cell(canvas: &mut Buffer, x: u16, y: u16, glyph: char, combining: &[char], style: Style) {
    let area = canvas.area;
    if x < area.left() || x >= area.right() || y < area.top() || y >= area.bottom() {
        return;
    }

    let mut symbol = String::with_capacity(4);
    symbol.push(glyph);
    symbol.extend(combining);

    let cell = canvas.get_mut(x, y);
    cell.reset();
    cell.set_symbol(&symbol);
    cell.set_style(style);
}

/// Copy the overlapping region of two buffers.
fn copy_cells(src: &Buffer, dst: &mut Buffer) {
    let overlap = src.area.intersection(dst.area);
    for y in overlap.top()..overlap.bottom() {
        for x in overlap.left()..overlap.right() {
            *dst.get_mut(x, y) = src.get(x, y).clone();
        }
    }
}
