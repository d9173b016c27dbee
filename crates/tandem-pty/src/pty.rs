use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

use crate::adapter::{
    EnvMap, ProcessAdapter, ProcessEvent, ProcessEventSender, ProcessHandle, ProcessId,
    SpawnError, SpawnRequest,
};
use crate::subscription::{Gate, Subscription};

const READ_BUFFER_SIZE: usize = 65536;

/// Spawns processes on native pseudo-terminals via `portable-pty`.
///
/// Each process gets a dedicated reader thread because PTY reads block. The
/// thread pushes output and the final exit code onto the shared event
/// channel; the control thread is the only consumer.
pub struct PtyAdapter {
    events: ProcessEventSender,
    next_id: AtomicU64,
}

impl PtyAdapter {
    pub fn new(events: ProcessEventSender) -> Self {
        Self {
            events,
            next_id: AtomicU64::new(1),
        }
    }
}

impl ProcessAdapter for PtyAdapter {
    fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        if !request.cwd.is_dir() {
            return Err(SpawnError::MissingCwd(request.cwd));
        }
        let program = resolve_program(&request.command, &request.env, &request.cwd)?;

        let pair = native_pty_system()
            .openpty(pty_size(request.cols, request.rows))
            .map_err(|e| SpawnError::OpenPty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&program);
        cmd.args(&request.args);
        cmd.cwd(&request.cwd);
        cmd.env_clear();
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        let spawn_failed = |reason: String| SpawnError::Spawn {
            command: request.command.clone(),
            reason,
        };

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| spawn_failed(e.to_string()))?;
        // Only the child may hold the slave side, otherwise EOF never arrives.
        drop(pair.slave);

        let attached = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match attached {
            Ok(io) => io,
            Err(e) => {
                let _ = child.kill();
                return Err(spawn_failed(format!("failed to attach to PTY: {e}")));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let killer = child.clone_killer();
        let pid = child.process_id();
        let data = Gate::open();
        let exit = Gate::open();
        let exited = Arc::new(AtomicBool::new(false));

        let reader_thread = ReaderThread {
            id,
            reader,
            child,
            data: data.clone(),
            exit: exit.clone(),
            exited: Arc::clone(&exited),
            events: self.events.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name(format!("pty-io-{id}"))
            .spawn(move || reader_thread.run());
        if let Err(e) = spawned {
            let mut killer = killer;
            let _ = killer.kill();
            return Err(spawn_failed(format!("failed to start reader thread: {e}")));
        }

        log::info!(
            "spawned {} (process {id}, pid {pid:?}) in {}",
            request.command,
            request.cwd.display()
        );

        Ok(Box::new(PtyProcess {
            id,
            pid,
            master: pair.master,
            writer,
            killer,
            killed: false,
            exited,
            data,
            exit,
        }))
    }
}

/// Owns the blocking reader and the child; reports output then exit.
struct ReaderThread {
    id: ProcessId,
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
    data: Gate,
    exit: Gate,
    exited: Arc<AtomicBool>,
    events: ProcessEventSender,
}

impl ReaderThread {
    fn run(mut self) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                // EIO once the child side closes.
                Err(_) => break,
            };
            if self.data.is_open() {
                let _ = self.events.send(ProcessEvent::Data {
                    id: self.id,
                    bytes: buf[..n].to_vec(),
                });
            }
        }

        let code = match self.child.wait() {
            Ok(status) => status.exit_code(),
            Err(e) => {
                log::warn!("process {}: failed to collect exit status: {e}", self.id);
                1
            }
        };
        self.exited.store(true, Ordering::Release);
        log::debug!("process {} exited with code {code}", self.id);

        if self.exit.is_open() {
            let _ = self.events.send(ProcessEvent::Exit { id: self.id, code });
        }
    }
}

/// Handle to one process spawned by [`PtyAdapter`]. Dropping it kills the process.
pub struct PtyProcess {
    id: ProcessId,
    pid: Option<u32>,
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    killed: bool,
    exited: Arc<AtomicBool>,
    data: Gate,
    exit: Gate,
}

impl ProcessHandle for PtyProcess {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&mut self, data: &[u8]) {
        if self.has_exited() {
            return;
        }
        let written = self.writer.write_all(data).and_then(|_| self.writer.flush());
        if let Err(e) = written {
            log::debug!("process {}: write failed: {e}", self.id);
        }
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        if let Err(e) = self.master.resize(pty_size(cols, rows)) {
            log::debug!("process {}: resize to {cols}x{rows} failed: {e}", self.id);
        }
    }

    fn kill(&mut self) {
        if self.killed || self.has_exited() {
            return;
        }
        self.killed = true;
        if let Err(e) = self.killer.kill() {
            log::debug!("process {}: kill failed: {e}", self.id);
        }
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    fn on_data(&self) -> Subscription {
        self.data.subscription()
    }

    fn on_exit(&self) -> Subscription {
        self.exit.subscription()
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows: rows.max(1),
        cols: cols.max(1),
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Locate the program the way a shell would, using the child's own `PATH`.
fn resolve_program(command: &str, env: &EnvMap, cwd: &Path) -> Result<PathBuf, SpawnError> {
    let not_found = || SpawnError::NotFound {
        command: command.to_string(),
    };
    if command.trim().is_empty() {
        return Err(not_found());
    }

    let path = Path::new(command);
    if path.components().count() > 1 || path.is_absolute() {
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        };
        if !candidate.is_file() {
            return Err(not_found());
        }
        if !is_executable(&candidate) {
            return Err(SpawnError::PermissionDenied {
                command: command.to_string(),
            });
        }
        return Ok(candidate);
    }

    let search_path = env.get("PATH").map(String::as_str).unwrap_or("");
    let mut denied = false;
    for dir in std::env::split_paths(search_path) {
        for name in candidate_names(command) {
            let candidate = dir.join(&name);
            if candidate.is_file() {
                if is_executable(&candidate) {
                    return Ok(candidate);
                }
                denied = true;
            }
        }
    }

    if denied {
        Err(SpawnError::PermissionDenied {
            command: command.to_string(),
        })
    } else {
        Err(not_found())
    }
}

#[cfg(windows)]
fn candidate_names(command: &str) -> Vec<String> {
    if Path::new(command).extension().is_some() {
        vec![command.to_string()]
    } else {
        vec![format!("{command}.exe"), format!("{command}.cmd"), command.to_string()]
    }
}

#[cfg(not(windows))]
fn candidate_names(command: &str) -> Vec<String> {
    vec![command.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{event_channel, ProcessEventReceiver};
    use std::thread;
    use std::time::{Duration, Instant};

    fn sh_env() -> EnvMap {
        let mut env = EnvMap::new();
        env.insert("PATH".into(), "/usr/bin:/bin".into());
        env.insert("TERM".into(), "xterm-256color".into());
        env
    }

    fn sh(script: &str) -> SpawnRequest {
        SpawnRequest {
            command: "/bin/sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd: PathBuf::from("/"),
            env: sh_env(),
            cols: 80,
            rows: 24,
        }
    }

    /// Drain events until an exit arrives or the deadline passes.
    fn collect(rx: &mut ProcessEventReceiver, secs: u64) -> (String, Vec<u32>) {
        let mut output = Vec::new();
        let mut exits = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(secs);
        while Instant::now() < deadline {
            match rx.try_recv() {
                Ok(ProcessEvent::Data { bytes, .. }) => output.extend_from_slice(&bytes),
                Ok(ProcessEvent::Exit { code, .. }) => {
                    exits.push(code);
                    // Give a duplicate exit a chance to show up.
                    thread::sleep(Duration::from_millis(100));
                    while let Ok(ev) = rx.try_recv() {
                        if let ProcessEvent::Exit { code, .. } = ev {
                            exits.push(code);
                        }
                    }
                    break;
                }
                Err(_) => thread::sleep(Duration::from_millis(20)),
            }
        }
        (String::from_utf8_lossy(&output).into_owned(), exits)
    }

    #[test]
    fn test_spawn_echo_then_single_exit() {
        let (tx, mut rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let _handle = adapter.spawn(sh("echo TANDEM_TEST_OK")).unwrap();

        let (text, exits) = collect(&mut rx, 5);
        assert!(text.contains("TANDEM_TEST_OK"), "got: {text}");
        assert_eq!(exits, vec![0]);
    }

    #[test]
    fn test_nonzero_exit_code() {
        let (tx, mut rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let _handle = adapter.spawn(sh("exit 3")).unwrap();

        let (_, exits) = collect(&mut rx, 5);
        assert_eq!(exits, vec![3]);
    }

    #[test]
    fn test_ids_are_unique() {
        let (tx, _rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let a = adapter.spawn(sh("true")).unwrap();
        let b = adapter.spawn(sh("true")).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_env_is_applied() {
        let (tx, mut rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let mut request = sh("echo probe=$TANDEM_PROBE");
        request.env.insert("TANDEM_PROBE".into(), "xyz".into());
        let _handle = adapter.spawn(request).unwrap();

        let (text, _) = collect(&mut rx, 5);
        assert!(text.contains("probe=xyz"), "got: {text}");
    }

    #[test]
    fn test_write_reaches_process() {
        let (tx, mut rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let mut handle = adapter.spawn(sh("read line; echo got=$line")).unwrap();
        handle.write(b"hello\n");

        let (text, exits) = collect(&mut rx, 5);
        assert!(text.contains("got=hello"), "got: {text}");
        assert_eq!(exits, vec![0]);
    }

    #[test]
    fn test_write_after_exit_is_noop() {
        let (tx, mut rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let mut handle = adapter.spawn(sh("exit 0")).unwrap();
        let _ = collect(&mut rx, 5);

        assert!(handle.has_exited());
        handle.write(b"ignored\n");
        handle.resize(100, 30);
    }

    #[test]
    fn test_kill_is_idempotent() {
        let (tx, mut rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let mut handle = adapter.spawn(sh("sleep 30")).unwrap();

        handle.kill();
        handle.kill();
        let (_, exits) = collect(&mut rx, 5);
        assert_eq!(exits.len(), 1);
        handle.kill();
    }

    #[test]
    fn test_disposed_subscriptions_stop_forwarding() {
        let (tx, mut rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let handle = adapter.spawn(sh("sleep 0.3; echo LATE_OUTPUT")).unwrap();
        handle.on_data().dispose();
        handle.on_exit().dispose();

        thread::sleep(Duration::from_millis(1000));
        let mut text = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            match ev {
                ProcessEvent::Data { bytes, .. } => text.extend_from_slice(&bytes),
                ProcessEvent::Exit { .. } => panic!("exit forwarded after dispose"),
            }
        }
        assert!(!String::from_utf8_lossy(&text).contains("LATE_OUTPUT"));
    }

    #[test]
    fn test_resize() {
        let (tx, _rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let mut handle = adapter.spawn(sh("sleep 1")).unwrap();
        handle.resize(120, 40);
        handle.kill();
    }

    #[test]
    fn test_missing_binary() {
        let (tx, _rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let mut request = sh("");
        request.command = "tandem-definitely-not-installed".into();

        match adapter.spawn(request) {
            Err(SpawnError::NotFound { command }) => {
                assert_eq!(command, "tandem-definitely-not-installed")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[test]
    fn test_missing_cwd() {
        let (tx, _rx) = event_channel();
        let adapter = PtyAdapter::new(tx);
        let mut request = sh("true");
        request.cwd = PathBuf::from("/tandem/no/such/dir");

        assert!(matches!(adapter.spawn(request), Err(SpawnError::MissingCwd(_))));
    }

    #[test]
    fn test_resolve_program_searches_path() {
        let resolved = resolve_program("sh", &sh_env(), Path::new("/")).unwrap();
        assert!(resolved.ends_with("sh"));
        assert!(resolved.is_absolute());
    }
}
