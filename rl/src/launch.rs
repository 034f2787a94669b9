//! Coordination process lifecycle
//!
//! Launches the rtig coordination process with captured stdio, detects the
//! lost-the-port race against a concurrently started peer, and tears the
//! process down with SIGTERM escalating to SIGKILL.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

const PROBE_TIMEOUT: Duration = Duration::from_millis(150);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Stderr line emitted when another process already holds the port
const IN_USE_PATTERN: &str = r"(?i)address already in use";

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to signal coordination process: {0}")]
    Signal(#[source] Errno),
    #[error("Invalid detection pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Starts and stops the shared coordination process
pub trait CoordinationLauncher: Send {
    /// Start the process, or detect that one is already serving the port
    fn launch(&self, working_dir: &Path, env: &BTreeMap<String, String>) -> Result<RtigHandle, LaunchError>;

    /// Whether another process holds the port, making `handle` redundant
    fn is_already_running(&self, handle: &RtigHandle) -> bool;

    /// Tear down the process held by `handle`, if any
    fn terminate(&self, handle: RtigHandle) -> Result<(), LaunchError>;
}

/// A launched (or externally detected) coordination process
#[derive(Debug)]
pub struct RtigHandle {
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
    probe_hit: bool,
    in_use: Arc<AtomicBool>,
}

impl RtigHandle {
    /// Whether this handle owns a process it spawned
    pub fn owns_process(&self) -> bool {
        self.child.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }
}

/// Launcher for the CERTI `rtig` process
pub struct RtigLauncher {
    program: String,
    args: Vec<String>,
    port: u16,
    settle: Duration,
    term_wait: Duration,
}

impl RtigLauncher {
    pub fn new(program: impl Into<String>, port: u16) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            port,
            settle: Duration::from_millis(500),
            term_wait: Duration::from_secs(2),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// How long to watch a fresh child for the lost-the-port failure
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// How long to wait after SIGTERM before escalating to SIGKILL
    pub fn with_term_wait(mut self, term_wait: Duration) -> Self {
        self.term_wait = term_wait;
        self
    }

    fn probe_port(&self) -> bool {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
    }
}

impl CoordinationLauncher for RtigLauncher {
    fn launch(&self, working_dir: &Path, env: &BTreeMap<String, String>) -> Result<RtigHandle, LaunchError> {
        debug!(program = %self.program, port = self.port, "RtigLauncher::launch: called");
        let in_use = Arc::new(AtomicBool::new(false));
        if self.probe_port() {
            debug!(port = self.port, "coordination process already listening");
            return Ok(RtigHandle {
                child: None,
                readers: Vec::new(),
                probe_hit: true,
                in_use,
            });
        }
        let pattern = Regex::new(IN_USE_PATTERN)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(working_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        debug!(pid = child.id(), "coordination process spawned");
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, "stdout", pattern.clone(), Arc::clone(&in_use)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, "stderr", pattern, Arc::clone(&in_use)));
        }
        Ok(RtigHandle {
            child: Some(child),
            readers,
            probe_hit: false,
            in_use,
        })
    }

    fn is_already_running(&self, handle: &RtigHandle) -> bool {
        if handle.probe_hit {
            return true;
        }
        // the child only prints the failure once it tries to bind
        let deadline = Instant::now() + self.settle;
        loop {
            if handle.in_use.load(Ordering::Relaxed) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn terminate(&self, mut handle: RtigHandle) -> Result<(), LaunchError> {
        debug!(pid = ?handle.pid(), "RtigLauncher::terminate: called");
        if let Some(mut child) = handle.child.take() {
            let pid = Pid::from_raw(child.id() as i32);
            match kill(pid, Signal::SIGTERM) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => return Err(LaunchError::Signal(errno)),
            }
            let deadline = Instant::now() + self.term_wait;
            let exited = loop {
                if child.try_wait()?.is_some() {
                    break true;
                }
                if Instant::now() >= deadline {
                    break false;
                }
                std::thread::sleep(POLL_INTERVAL);
            };
            if !exited {
                warn!(pid = child.id(), "coordination process ignored SIGTERM, killing");
                child.kill()?;
                child.wait()?;
            }
        }
        for reader in handle.readers.drain(..) {
            let _ = reader.join();
        }
        Ok(())
    }
}

fn spawn_reader<R>(stream: R, label: &'static str, pattern: Regex, in_use: Arc<AtomicBool>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            debug!(stream = label, line = %line, "rtig output");
            if pattern.is_match(&line) {
                warn!(stream = label, "rtig lost the port to a concurrent peer");
                in_use.store(true, Ordering::Relaxed);
            }
        }
    })
}
