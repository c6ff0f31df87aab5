//! External renderer invocation.
//!
//! # Purpose
//!
//! Runs the renderer executable as a subprocess for one request, bounded by a
//! wall-clock timeout, and classifies how it ended.
//!
//! # Command line
//!
//! ```text
//! <renderer> <-ql|-qm|-qh> <tmp/scene-XXXX.py> <Scene> -o <fingerprint> --media_dir <output_dir>
//! ```
//!
//! # Lifecycle
//!
//! - Source is written to a temp file owned by this call. The file is removed
//!   when the guard drops, on every exit path.
//! - stdout/stderr are drained on reader threads while the caller blocks in
//!   `wait_timeout`, so a chatty renderer cannot stall on a full pipe.
//! - The renderer leads its own process group. One deadline covers both the
//!   exit wait and draining the pipes; past it the whole group is killed
//!   (SIGKILL) and the leader reaped, so helpers the renderer forked in the
//!   background cannot outlive the request.
//! - Captured streams are decoded lossily: invalid UTF-8 becomes U+FFFD.

use log::{debug, info, warn};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

use crate::config::ServerConfig;
use crate::error::{RenderError, RenderResult};

use super::fingerprint::Fingerprint;
use super::request::RenderRequest;

/// Result of a renderer run that exited successfully.
#[derive(Debug, Clone)]
pub struct InvokeResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Tree the renderer was told to write into
    pub output_dir: PathBuf,
}

/// Anything that can turn a request into files under an output dir.
///
/// Implementations block for the whole render.
pub trait RenderEngine: Send + Sync {
    fn invoke(&self, request: &RenderRequest, fingerprint: &Fingerprint) -> RenderResult<InvokeResult>;
}

/// Captured streams and status of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Renderer driven through its command-line interface.
#[derive(Debug, Clone)]
pub struct SubprocessRenderer {
    program: String,
    output_dir: PathBuf,
    scratch_dir: Option<PathBuf>,
    source_suffix: String,
    timeout: Duration,
    probe_timeout: Duration,
}

impl SubprocessRenderer {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            program: config.renderer.clone(),
            output_dir: config.output_dir.clone(),
            scratch_dir: None,
            source_suffix: format!(".{}", config.scene_extension),
            timeout: config.render_timeout(),
            probe_timeout: config.probe_timeout(),
        }
    }

    /// Write temp source files under `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the argument list for one render.
    pub fn build_command(&self, source_path: &Path, request: &RenderRequest, fingerprint: &Fingerprint) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(request.quality().renderer_flag())
            .arg(source_path)
            .arg(request.scene_identifier())
            .arg("-o")
            .arg(fingerprint.as_str())
            .arg("--media_dir")
            .arg(&self.output_dir);
        cmd
    }

    /// Ask the renderer for its version string.
    ///
    /// A renderer that starts but exits non-zero reports `"Not found"`.
    pub fn probe_version(&self) -> RenderResult<String> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--version");
        let out = run_with_timeout(cmd, self.probe_timeout)?;
        if out.status.success() {
            Ok(out.stdout.trim().to_string())
        } else {
            Ok("Not found".to_string())
        }
    }

    fn write_source(&self, code: &str) -> RenderResult<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scene-").suffix(&self.source_suffix);
        let mut file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| RenderError::invocation(format!("failed to create temp source file: {}", e)))?;

        file.write_all(code.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| RenderError::invocation(format!("failed to write temp source file: {}", e)))?;
        Ok(file)
    }
}

impl RenderEngine for SubprocessRenderer {
    fn invoke(&self, request: &RenderRequest, fingerprint: &Fingerprint) -> RenderResult<InvokeResult> {
        // Dropped at the end of this call, whichever way it ends
        let source = self.write_source(request.source_code())?;
        let cmd = self.build_command(source.path(), request, fingerprint);

        info!(
            "Rendering {} scene={} quality={}",
            fingerprint,
            request.scene_identifier(),
            request.quality()
        );
        let started = Instant::now();

        let out = match run_with_timeout(cmd, self.timeout) {
            Ok(out) => out,
            Err(RenderError::Timeout { .. }) => {
                warn!("Render {} killed after {:?}", fingerprint, self.timeout);
                return Err(RenderError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
            Err(e) => return Err(e),
        };

        debug!(
            "Render {} exited with {:?} after {:.1}s",
            fingerprint,
            out.status.code(),
            started.elapsed().as_secs_f32()
        );

        if !out.status.success() {
            return Err(RenderError::RenderFailure {
                code: out.status.code(),
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }

        Ok(InvokeResult {
            exit_code: out.status.code().unwrap_or(0),
            stdout: out.stdout,
            stderr: out.stderr,
            output_dir: self.output_dir.clone(),
        })
    }
}

/// Run `cmd` to completion or until `timeout`, capturing both streams.
///
/// One deadline, fixed before spawn, bounds the exit wait and the pipe drain
/// together. Spawn failures are `InvocationError`; an overrun of either kills
/// the renderer's process group and is `Timeout`. Exit status is returned
/// as-is for the caller to judge.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> RenderResult<ProcessOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let deadline = Instant::now() + timeout;
    let mut child = cmd
        .spawn()
        .map_err(|e| RenderError::invocation(format!("{}: {}", program, e)))?;

    let (tx, rx) = mpsc::channel();
    let mut pending = 0;
    if let Some(pipe) = child.stdout.take() {
        spawn_reader(Stream::Stdout, pipe, tx.clone());
        pending += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        spawn_reader(Stream::Stderr, pipe, tx.clone());
        pending += 1;
    }
    drop(tx);

    let status = match child.wait_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill_tree(&mut child);
            let _ = child.wait();
            return Err(RenderError::Timeout {
                secs: timeout.as_secs(),
            });
        }
        Err(e) => {
            kill_tree(&mut child);
            let _ = child.wait();
            return Err(RenderError::invocation(format!("waiting for {}: {}", program, e)));
        }
    };

    // Leader exited; helpers it left behind may still hold the pipes open.
    let mut stdout = String::new();
    let mut stderr = String::new();
    while pending > 0 {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Stream::Stdout, text)) => stdout = text,
            Ok((Stream::Stderr, text)) => stderr = text,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                warn!("{} exited but its pipes stayed open past the deadline", program);
                kill_group(child.id());
                return Err(RenderError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
        }
        pending -= 1;
    }

    Ok(ProcessOutput { status, stdout, stderr })
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Drain a pipe to EOF on its own thread. Invalid UTF-8 is replaced, not rejected.
fn spawn_reader<R: Read + Send + 'static>(stream: Stream, mut pipe: R, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// Kill the child and everything left in its process group.
fn kill_tree(child: &mut Child) {
    kill_group(child.id());
    let _ = child.kill();
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // ESRCH once the group is already empty.
    if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        debug!("killpg {}: {}", pgid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
