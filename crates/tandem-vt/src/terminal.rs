use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi;

use crate::screen::ScreenView;

/// Size used before the first layout pass fits the terminal to its viewport.
pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Erase the display and the scrollback, cursor home.
const CLEAR_SEQUENCE: &[u8] = b"\x1b[H\x1b[2J\x1b[3J";
/// RIS: full terminal reset.
const RESET_SEQUENCE: &[u8] = b"\x1bc";

/// Something the terminal produced locally that the attached process should see.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalEvent {
    /// Keystrokes, pastes, or replies to terminal queries.
    Input(Vec<u8>),
    /// The viewport changed the terminal's size.
    Resize { cols: u16, rows: u16 },
}

/// What the emulator reported back while parsing output.
#[derive(Default)]
struct EventState {
    title: Option<String>,
    pty_writes: Vec<String>,
}

/// Collects emulator events for the owning [`VtTerminal`].
///
/// Must be `Clone` because `Term` requires `T: EventListener`. Interior
/// mutability goes through `Arc<Mutex<_>>`.
#[derive(Clone)]
pub struct EventProxy {
    state: Arc<Mutex<EventState>>,
}

impl EventProxy {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EventState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventListener for EventProxy {
    fn send_event(&self, event: Event) {
        let mut state = self.lock();
        match event {
            Event::Title(title) => state.title = Some(title),
            Event::ResetTitle => state.title = None,
            Event::PtyWrite(data) => state.pty_writes.push(data),
            _ => {}
        }
    }
}

/// Grid size handed to `Term::new` and `Term::resize`.
struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

/// An emulated terminal screen bound to one session tab.
///
/// Process output goes in through [`write`](Self::write). Keystrokes from the
/// host and size changes come back out as [`LocalEvent`]s, drained by the
/// session layer with [`take_local_events`](Self::take_local_events).
pub struct VtTerminal {
    term: Term<EventProxy>,
    parser: ansi::Processor,
    event_proxy: EventProxy,
    local: VecDeque<LocalEvent>,
    visible: bool,
    focused: bool,
}

impl VtTerminal {
    /// A blank terminal of `cols` x `rows`.
    ///
    /// Uses 10,000 lines of scrollback history.
    pub fn new(cols: u16, rows: u16) -> Self {
        let config = Config {
            scrolling_history: 10_000,
            ..Config::default()
        };

        let size = TermSize {
            columns: cols.max(1) as usize,
            screen_lines: rows.max(1) as usize,
        };

        let event_proxy = EventProxy::new();
        let term = Term::new(config, &size, event_proxy.clone());

        Self {
            term,
            parser: ansi::Processor::new(),
            event_proxy,
            local: VecDeque::new(),
            visible: false,
            focused: false,
        }
    }

    /// Feed raw process output into the terminal.
    pub fn write(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.term, bytes);
    }

    /// Erase the screen and scrollback.
    pub fn clear(&mut self) {
        self.write(CLEAR_SEQUENCE);
    }

    /// Return to power-on state and forget the title.
    pub fn reset(&mut self) {
        self.parser = ansi::Processor::new();
        self.write(RESET_SEQUENCE);
        // Replies queued by the previous occupant must not reach the next one.
        let mut state = self.event_proxy.lock();
        state.pty_writes.clear();
        state.title = None;
    }

    /// Resize the terminal. A real change is reported as a local resize event.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let (cols, rows) = (cols.max(1), rows.max(1));
        if (cols, rows) == self.size() {
            return;
        }

        self.term.resize(TermSize {
            columns: cols as usize,
            screen_lines: rows as usize,
        });
        log::trace!("terminal resized to {cols}x{rows}");
        self.local.push_back(LocalEvent::Resize { cols, rows });
    }

    /// Current `(cols, rows)`.
    pub fn size(&self) -> (u16, u16) {
        (self.term.columns() as u16, self.term.screen_lines() as u16)
    }

    /// Record keystrokes typed into this terminal.
    pub fn key_input(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.local.push_back(LocalEvent::Input(bytes.to_vec()));
        }
    }

    /// Drain local events in the order they happened.
    ///
    /// Replies the emulator generated for terminal queries (e.g. cursor
    /// position reports) are appended as input.
    pub fn take_local_events(&mut self) -> Vec<LocalEvent> {
        let writes = std::mem::take(&mut self.event_proxy.lock().pty_writes);
        let mut events: Vec<LocalEvent> = self.local.drain(..).collect();
        events.extend(writes.into_iter().map(|w| LocalEvent::Input(w.into_bytes())));
        events
    }

    /// Attach to or detach from the foreground viewport.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if !visible {
            self.focused = false;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Take keyboard focus. Has no effect while hidden.
    pub fn focus(&mut self) {
        self.focused = self.visible;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Borrow the visible grid.
    pub fn screen(&self) -> ScreenView<'_> {
        ScreenView::new(&self.term)
    }

    /// Plain text of the visible screen.
    pub fn text(&self) -> String {
        self.screen().text()
    }

    /// Window title set through OSC escape sequences, if any.
    pub fn title(&self) -> Option<String> {
        self.event_proxy.lock().title.clone()
    }
}
