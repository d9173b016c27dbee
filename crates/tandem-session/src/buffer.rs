use tandem_vt::{LocalEvent, VtTerminal};

/// The terminal emulator a session renders into.
///
/// Output bytes go in through [`write`](Self::write); keystrokes and size
/// changes come back out as [`LocalEvent`]s, to be forwarded to whatever
/// process is attached.
pub trait TerminalBuffer {
    fn write(&mut self, bytes: &[u8]);

    /// Wipe the display and scrollback.
    fn clear(&mut self);

    /// Return to power-on state.
    fn reset(&mut self);

    fn resize(&mut self, cols: u16, rows: u16);

    fn size(&self) -> (u16, u16);

    /// Keystrokes typed by the user while this buffer has focus.
    fn key_input(&mut self, bytes: &[u8]);

    fn take_local_events(&mut self) -> Vec<LocalEvent>;

    fn set_visible(&mut self, visible: bool);

    fn is_visible(&self) -> bool;

    fn focus(&mut self);

    /// Plain-text rendering of the visible screen.
    fn text(&self) -> String;

    /// Release any resources held outside the buffer itself.
    fn dispose(&mut self) {}
}

impl TerminalBuffer for VtTerminal {
    fn write(&mut self, bytes: &[u8]) {
        VtTerminal::write(self, bytes);
    }

    fn clear(&mut self) {
        VtTerminal::clear(self);
    }

    fn reset(&mut self) {
        VtTerminal::reset(self);
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        VtTerminal::resize(self, cols, rows);
    }

    fn size(&self) -> (u16, u16) {
        VtTerminal::size(self)
    }

    fn key_input(&mut self, bytes: &[u8]) {
        VtTerminal::key_input(self, bytes);
    }

    fn take_local_events(&mut self) -> Vec<LocalEvent> {
        VtTerminal::take_local_events(self)
    }

    fn set_visible(&mut self, visible: bool) {
        VtTerminal::set_visible(self, visible);
    }

    fn is_visible(&self) -> bool {
        VtTerminal::is_visible(self)
    }

    fn focus(&mut self) {
        VtTerminal::focus(self);
    }

    fn text(&self) -> String {
        VtTerminal::text(self)
    }
}
