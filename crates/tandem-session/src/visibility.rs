use crate::buffer::TerminalBuffer;
use crate::registry::Registry;
use crate::session::SessionKey;

/// Tracks which session is on screen and defers fit/focus to the next layout pass.
#[derive(Debug, Default)]
pub struct Visibility {
    active: Option<SessionKey>,
    pending_fit: Option<SessionKey>,
    viewport: Option<(u16, u16)>,
}

impl Visibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&SessionKey> {
        self.active.as_ref()
    }

    pub fn has_pending_fit(&self) -> bool {
        self.pending_fit.is_some()
    }

    /// Make `key` the only visible session. Fitting and focusing wait for
    /// [`layout_pass`](Self::layout_pass).
    pub fn show<B: TerminalBuffer>(&mut self, key: &SessionKey, registry: &mut Registry<B>) {
        for (k, session) in registry.iter_mut() {
            session.buffer_mut().set_visible(k == key);
        }
        self.active = Some(key.clone());
        self.pending_fit = Some(key.clone());
    }

    /// Fit the pending session to the viewport and focus it. Returns the
    /// session that was fitted, if any.
    pub fn layout_pass<B: TerminalBuffer>(&mut self, registry: &mut Registry<B>) -> Option<SessionKey> {
        let key = self.pending_fit.take()?;
        let session = registry.get_mut(&key)?;

        if let Some((cols, rows)) = self.viewport {
            session.buffer_mut().resize(cols, rows);
        }
        session.buffer_mut().focus();
        Some(key)
    }

    /// Record the new viewport and resize only the active session's buffer.
    pub fn viewport_resized<B: TerminalBuffer>(
        &mut self,
        cols: u16,
        rows: u16,
        registry: &mut Registry<B>,
    ) -> Option<SessionKey> {
        self.viewport = Some((cols, rows));
        let key = self.active.clone()?;
        registry.get_mut(&key)?.buffer_mut().resize(cols, rows);
        Some(key)
    }

    /// Drop any reference to a destroyed session.
    pub fn forget(&mut self, key: &SessionKey) {
        if self.active.as_ref() == Some(key) {
            self.active = None;
        }
        if self.pending_fit.as_ref() == Some(key) {
            self.pending_fit = None;
        }
    }

    /// Hide every session, leaving nothing active.
    pub fn hide_all<B: TerminalBuffer>(&mut self, registry: &mut Registry<B>) {
        for (_, session) in registry.iter_mut() {
            session.buffer_mut().set_visible(false);
        }
        self.clear();
    }

    /// Forget every session. The viewport is kept.
    pub fn clear(&mut self) {
        self.active = None;
        self.pending_fit = None;
    }
}
