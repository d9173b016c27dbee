use std::collections::HashMap;

use tandem_pty::ProcessId;

use crate::buffer::TerminalBuffer;
use crate::session::{Session, SessionKey};

/// Owns every live session, keyed by worktree and tab.
pub struct Registry<B> {
    sessions: HashMap<SessionKey, Session<B>>,
    make_buffer: Box<dyn Fn() -> B>,
}

impl<B: TerminalBuffer> Registry<B> {
    pub fn new(make_buffer: impl Fn() -> B + 'static) -> Self {
        Self {
            sessions: HashMap::new(),
            make_buffer: Box::new(make_buffer),
        }
    }

    /// Return the session for `key`, creating an uninitialized one with a
    /// fresh buffer if none exists. Never spawns.
    pub fn get_or_create(&mut self, key: &SessionKey) -> &mut Session<B> {
        let make_buffer = &self.make_buffer;
        self.sessions.entry(key.clone()).or_insert_with(|| {
            log::debug!("creating session {key}");
            Session::new(key.clone(), make_buffer())
        })
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session<B>> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Session<B>> {
        self.sessions.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.sessions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&SessionKey, &mut Session<B>)> {
        self.sessions.iter_mut()
    }

    /// The session whose live process is `id`, if any.
    pub fn find_by_process(&self, id: ProcessId) -> Option<SessionKey> {
        self.sessions
            .iter()
            .find(|(_, session)| session.process_id() == Some(id))
            .map(|(key, _)| key.clone())
    }

    /// Kill the session's process, dispose its buffer, and forget it.
    /// Returns false when there was nothing to destroy.
    pub fn destroy(&mut self, key: &SessionKey) -> bool {
        match self.sessions.remove(key) {
            Some(mut session) => {
                session.dispose();
                log::debug!("destroyed session {key}");
                true
            }
            None => false,
        }
    }

    /// Destroy every session. Returns how many there were.
    pub fn destroy_all(&mut self) -> usize {
        let count = self.sessions.len();
        for (key, mut session) in self.sessions.drain() {
            session.dispose();
            log::debug!("destroyed session {key}");
        }
        count
    }
}
