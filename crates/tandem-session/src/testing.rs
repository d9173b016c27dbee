//! In-memory adapter and buffer for exercising the session layer without PTYs.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tandem_pty::{
    EnvMap, Gate, ProcessAdapter, ProcessHandle, ProcessId, SpawnError, SpawnRequest, Subscription,
};
use tandem_vt::LocalEvent;

use crate::buffer::TerminalBuffer;

/// Everything observable about one fake spawn.
#[derive(Clone)]
pub(crate) struct FakeRecord {
    pub id: ProcessId,
    pub request: SpawnRequest,
    pub data_gate: Gate,
    pub exit_gate: Gate,
    writes: Arc<Mutex<Vec<u8>>>,
    resizes: Arc<Mutex<Vec<(u16, u16)>>>,
    kills: Arc<AtomicUsize>,
    exited: Arc<AtomicBool>,
}

impl FakeRecord {
    pub fn written(&self) -> Vec<u8> {
        self.writes.lock().unwrap().clone()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn set_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeState {
    next_id: ProcessId,
    records: Vec<FakeRecord>,
    missing: HashSet<String>,
}

/// Cloning shares state, so a test can keep a handle after moving one into a controller.
#[derive(Clone, Default)]
pub(crate) struct FakeAdapter {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make spawns of `command` fail as if it were not installed.
    pub fn missing(self, command: &str) -> Self {
        self.state.lock().unwrap().missing.insert(command.to_string());
        self
    }

    pub fn request(&self, command: &str) -> SpawnRequest {
        SpawnRequest {
            command: command.to_string(),
            args: Vec::new(),
            cwd: PathBuf::from("/"),
            env: EnvMap::new(),
            cols: 80,
            rows: 24,
        }
    }

    pub fn records(&self) -> Vec<FakeRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn record(&self, id: ProcessId) -> FakeRecord {
        self.records()
            .into_iter()
            .find(|r| r.id == id)
            .expect("no such fake process")
    }

    pub fn last(&self) -> FakeRecord {
        self.records().pop().expect("nothing spawned")
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }
}

impl ProcessAdapter for FakeAdapter {
    fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        let mut state = self.state.lock().unwrap();
        if state.missing.contains(&request.command) {
            return Err(SpawnError::NotFound {
                command: request.command,
            });
        }

        state.next_id += 1;
        let record = FakeRecord {
            id: state.next_id,
            request,
            data_gate: Gate::open(),
            exit_gate: Gate::open(),
            writes: Arc::default(),
            resizes: Arc::default(),
            kills: Arc::default(),
            exited: Arc::default(),
        };
        state.records.push(record.clone());
        Ok(Box::new(FakeProcess { record }))
    }
}

struct FakeProcess {
    record: FakeRecord,
}

impl ProcessHandle for FakeProcess {
    fn id(&self) -> ProcessId {
        self.record.id
    }

    fn pid(&self) -> Option<u32> {
        Some(1000 + self.record.id as u32)
    }

    fn write(&mut self, data: &[u8]) {
        if !self.has_exited() {
            self.record.writes.lock().unwrap().extend_from_slice(data);
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.record.resizes.lock().unwrap().push((cols, rows));
    }

    fn kill(&mut self) {
        self.record.kills.fetch_add(1, Ordering::SeqCst);
    }

    fn has_exited(&self) -> bool {
        self.record.exited.load(Ordering::SeqCst)
    }

    fn on_data(&self) -> Subscription {
        self.record.data_gate.subscription()
    }

    fn on_exit(&self) -> Subscription {
        self.record.exit_gate.subscription()
    }
}

/// A buffer that remembers what happened to it.
pub(crate) struct RecordingBuffer {
    /// Bytes written since the last clear or reset.
    pub screen: Vec<u8>,
    /// "write", "clear", "reset" in call order.
    pub ops: Vec<&'static str>,
    pub cols: u16,
    pub rows: u16,
    pub visible: bool,
    pub focused: bool,
    pub local: VecDeque<LocalEvent>,
    pub disposed: Arc<AtomicBool>,
}

impl Default for RecordingBuffer {
    fn default() -> Self {
        Self {
            screen: Vec::new(),
            ops: Vec::new(),
            cols: 80,
            rows: 24,
            visible: false,
            focused: false,
            local: VecDeque::new(),
            disposed: Arc::default(),
        }
    }
}

impl TerminalBuffer for RecordingBuffer {
    fn write(&mut self, bytes: &[u8]) {
        self.ops.push("write");
        self.screen.extend_from_slice(bytes);
    }

    fn clear(&mut self) {
        self.ops.push("clear");
        self.screen.clear();
    }

    fn reset(&mut self) {
        self.ops.push("reset");
        self.screen.clear();
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        if (cols, rows) != (self.cols, self.rows) {
            self.cols = cols;
            self.rows = rows;
            self.local.push_back(LocalEvent::Resize { cols, rows });
        }
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn key_input(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.local.push_back(LocalEvent::Input(bytes.to_vec()));
        }
    }

    fn take_local_events(&mut self) -> Vec<LocalEvent> {
        self.local.drain(..).collect()
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if !visible {
            self.focused = false;
        }
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn focus(&mut self) {
        if self.visible {
            self.focused = true;
        }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.screen).into_owned()
    }

    fn dispose(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}
