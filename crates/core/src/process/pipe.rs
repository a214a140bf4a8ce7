//! Supervised chain of child processes.

use std::process::Stdio;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::error::ProcessError;
use super::types::{CommandSpec, OutputPolicy, StopHandle, StopSignal};
use crate::metrics::{CAPTURE_BYTES, PROCESS_FORCE_KILLS};

/// Size of the copy buffer between adjacent stages.
pub const PIPE_BUFFER_SIZE: usize = 0x1000;

/// Why a pipe stopped pumping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeEnd {
    /// A stage closed its output.
    EndOfStream,
    /// The stop signal fired.
    Stopped,
    /// Reading or writing a stage failed.
    Failed(String),
}

/// Result of [`ProcessPipe::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeReport {
    pub end: PipeEnd,
    /// Bytes read from the first stage.
    pub bytes_copied: u64,
}

struct Stage {
    label: String,
    child: Option<Child>,
}

/// Child processes wired stdout-to-stdin, owned for the lifetime of a run.
///
/// Every child is spawned with `kill_on_drop`, and [`ProcessPipe::run`]
/// always finishes with [`ProcessPipe::shutdown`].
pub struct ProcessPipe {
    stages: Vec<Stage>,
    teardown_timeout: Duration,
}

impl ProcessPipe {
    /// Spawn every command, connecting stage *i* stdout to stage *i+1* stdin.
    ///
    /// The last stage's stdout follows `final_stdout`. If any spawn fails the
    /// stages already started are torn down before the error is returned.
    pub async fn spawn(
        commands: &[CommandSpec],
        final_stdout: OutputPolicy,
        teardown_timeout: Duration,
    ) -> Result<Self, ProcessError> {
        if commands.is_empty() {
            return Err(ProcessError::NoStages);
        }

        let mut pipe = Self {
            stages: Vec::with_capacity(commands.len()),
            teardown_timeout,
        };
        let last = commands.len() - 1;

        for (i, spec) in commands.iter().enumerate() {
            let stdin = if i == 0 { Stdio::null() } else { Stdio::piped() };
            let stdout = if i == last {
                final_stdout.stdio()
            } else {
                Stdio::piped()
            };

            debug!("Spawning: {}", spec);
            let spawned = Command::new(&spec.program)
                .args(&spec.args)
                .stdin(stdin)
                .stdout(stdout)
                .stderr(spec.stderr.stdio())
                .kill_on_drop(true)
                .spawn();

            match spawned {
                Ok(child) => pipe.stages.push(Stage {
                    label: spec.label(),
                    child: Some(child),
                }),
                Err(e) => {
                    pipe.shutdown().await;
                    return Err(ProcessError::spawn(spec.program.clone(), e));
                }
            }
        }

        Ok(pipe)
    }

    /// Number of stages whose process has not been torn down yet.
    pub fn live_stages(&self) -> usize {
        self.stages.iter().filter(|s| s.child.is_some()).count()
    }

    /// Pump bytes between stages until end of stream, a fault, or `stop`,
    /// then tear every process down.
    ///
    /// Unless the pump failed, downstream stages first get the teardown
    /// timeout to finish on their own, since their input is already closed.
    pub async fn run(&mut self, stop: StopSignal) -> PipeReport {
        let report = self.pump(stop).await;
        match &report.end {
            PipeEnd::Failed(reason) => warn!("Process pipe failed: {}", reason),
            end => {
                info!(
                    "Process pipe finished ({:?}, {} bytes), stopping",
                    end, report.bytes_copied
                );
                self.drain_downstream().await;
            }
        }
        self.shutdown().await;
        report
    }

    async fn drain_downstream(&mut self) {
        for stage in self.stages.iter_mut().skip(1) {
            let Some(child) = stage.child.as_mut() else {
                continue;
            };
            match tokio::time::timeout(self.teardown_timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("{} finished: {}", stage.label, status);
                    stage.child = None;
                }
                Ok(Err(e)) => warn!("Failed waiting for {}: {}", stage.label, e),
                Err(_) => debug!("{} still running after its input closed", stage.label),
            }
        }
    }

    async fn pump(&mut self, stop: StopSignal) -> PipeReport {
        if self.stages.len() == 1 {
            return self.wait_single(stop).await;
        }

        // Any failing link stops the others.
        let abort = StopHandle::new();
        let mut links = Vec::with_capacity(self.stages.len() - 1);

        for i in 0..self.stages.len() - 1 {
            let reader = self.stages[i].child.as_mut().and_then(|c| c.stdout.take());
            let writer = self.stages[i + 1]
                .child
                .as_mut()
                .and_then(|c| c.stdin.take());
            let (Some(reader), Some(writer)) = (reader, writer) else {
                return PipeReport {
                    end: PipeEnd::Failed(format!(
                        "{} is not connected to {}",
                        self.stages[i].label,
                        self.stages[i + 1].label
                    )),
                    bytes_copied: 0,
                };
            };
            let label = format!("{} -> {}", self.stages[i].label, self.stages[i + 1].label);
            links.push(copy_link(
                label,
                reader,
                writer,
                stop.clone(),
                abort.clone(),
            ));
        }

        let results = join_all(links).await;
        let bytes_copied = results.first().map(|(_, n)| *n).unwrap_or(0);

        let mut end = PipeEnd::EndOfStream;
        for (link_end, _) in results {
            match link_end {
                PipeEnd::Failed(_) => {
                    end = link_end;
                    break;
                }
                PipeEnd::Stopped => end = PipeEnd::Stopped,
                PipeEnd::EndOfStream => {}
            }
        }

        PipeReport { end, bytes_copied }
    }

    async fn wait_single(&mut self, mut stop: StopSignal) -> PipeReport {
        let Some(child) = self.stages[0].child.as_mut() else {
            return PipeReport {
                end: PipeEnd::EndOfStream,
                bytes_copied: 0,
            };
        };
        let end = tokio::select! {
            biased;
            _ = stop.stopped() => PipeEnd::Stopped,
            status = child.wait() => match status {
                Ok(_) => PipeEnd::EndOfStream,
                Err(e) => PipeEnd::Failed(e.to_string()),
            },
        };
        PipeReport {
            end,
            bytes_copied: 0,
        }
    }

    /// Terminate every process still held: SIGTERM, wait up to the teardown
    /// timeout, then kill. Safe to call any number of times.
    pub async fn shutdown(&mut self) {
        for stage in &mut self.stages {
            if let Some(child) = stage.child.take() {
                terminate(&stage.label, child, self.teardown_timeout).await;
            }
        }
    }
}

/// Shut down an optional pipe; a missing pipe is a no-op.
pub async fn shutdown_pipe(pipe: Option<&mut ProcessPipe>) {
    if let Some(pipe) = pipe {
        pipe.shutdown().await;
    }
}

async fn copy_link<R, W>(
    label: String,
    mut reader: R,
    mut writer: W,
    mut stop: StopSignal,
    abort: StopHandle,
) -> (PipeEnd, u64)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut aborted = abort.signal();
    let mut buf = vec![0u8; PIPE_BUFFER_SIZE];
    let mut copied = 0u64;

    let end = loop {
        if stop.is_stopped() || aborted.is_stopped() {
            break PipeEnd::Stopped;
        }
        let read = tokio::select! {
            biased;
            _ = stop.stopped() => break PipeEnd::Stopped,
            _ = aborted.stopped() => break PipeEnd::Stopped,
            read = reader.read(&mut buf) => read,
        };
        let n = match read {
            Ok(0) => break PipeEnd::EndOfStream,
            Ok(n) => n,
            Err(e) => break PipeEnd::Failed(format!("{}: read failed: {}", label, e)),
        };
        let written = tokio::select! {
            biased;
            _ = stop.stopped() => break PipeEnd::Stopped,
            written = writer.write_all(&buf[..n]) => written,
        };
        if let Err(e) = written {
            break PipeEnd::Failed(format!("{}: write failed: {}", label, e));
        }
        copied += n as u64;
        CAPTURE_BYTES.inc_by(n as u64);
    };

    if let PipeEnd::Failed(_) = end {
        abort.stop();
    }
    if let Err(e) = writer.flush().await {
        debug!("{}: flush failed: {}", label, e);
    }
    // Dropping the writer closes the downstream stdin.
    drop(writer);
    (end, copied)
}

async fn terminate(label: &str, mut child: Child, timeout: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("{} already exited: {}", label, status);
            return;
        }
        Ok(None) => {}
        Err(e) => warn!("Unable to query {}: {}", label, e),
    }

    request_termination(label, &mut child);

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => debug!("{} exited: {}", label, status),
        Ok(Err(e)) => warn!("Failed waiting for {}: {}", label, e),
        Err(_) => {
            warn!(
                "{} still alive {:?} after termination request, killing",
                label, timeout
            );
            PROCESS_FORCE_KILLS.with_label_values(&[label]).inc();
            if let Err(e) = child.kill().await {
                warn!("Unable to kill {}: {}", label, e);
            }
        }
    }
}

#[cfg(unix)]
fn request_termination(label: &str, child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!("SIGTERM to {} ({}) failed: {}", label, pid, e);
    }
}

#[cfg(not(unix))]
fn request_termination(label: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Unable to stop {}: {}", label, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_bytes_flow_end_to_end() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.txt");

        let mut pipe = ProcessPipe::spawn(
            &[
                sh("printf 'hello ground station'"),
                sh("tr a-z A-Z"),
                sh(&format!("cat > '{}'", out.display())),
            ],
            OutputPolicy::Null,
            TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(pipe.live_stages(), 3);

        let report = pipe.run(StopHandle::new().signal()).await;
        assert_eq!(report.end, PipeEnd::EndOfStream);
        assert_eq!(report.bytes_copied, 20);
        assert_eq!(pipe.live_stages(), 0);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "HELLO GROUND STATION"
        );
    }

    #[tokio::test]
    async fn test_stop_interrupts_endless_producer() {
        let mut pipe = ProcessPipe::spawn(
            &[CommandSpec::new("yes"), sh("cat > /dev/null")],
            OutputPolicy::Null,
            TIMEOUT,
        )
        .await
        .unwrap();

        let handle = StopHandle::new();
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.stop();
        });

        let started = Instant::now();
        let report = pipe.run(handle.signal()).await;
        assert_eq!(report.end, PipeEnd::Stopped);
        assert!(report.bytes_copied > 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(pipe.live_stages(), 0);
    }

    #[tokio::test]
    async fn test_process_ignoring_sigterm_is_killed() {
        let mut pipe = ProcessPipe::spawn(
            &[sh("trap '' TERM; while true; do sleep 1; done")],
            OutputPolicy::Null,
            Duration::from_millis(200),
        )
        .await
        .unwrap();

        let handle = StopHandle::new();
        handle.stop();

        let started = Instant::now();
        let report = pipe.run(handle.signal()).await;
        assert_eq!(report.end, PipeEnd::Stopped);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(pipe.live_stages(), 0);
    }

    #[tokio::test]
    async fn test_teardown_sends_sigterm_first() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("terminated");
        let mut pipe = ProcessPipe::spawn(
            &[sh(&format!(
                "trap 'echo term > \"{}\"; exit 0' TERM; while true; do sleep 0.1; done",
                marker.display()
            ))],
            OutputPolicy::Null,
            TIMEOUT,
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        pipe.shutdown().await;
        assert!(started.elapsed() < TIMEOUT);
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "term\n");
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let mut pipe = ProcessPipe::spawn(&[sh("sleep 30")], OutputPolicy::Null, TIMEOUT)
            .await
            .unwrap();
        pipe.shutdown().await;
        pipe.shutdown().await;
        assert_eq!(pipe.live_stages(), 0);

        shutdown_pipe(None).await;
        shutdown_pipe(Some(&mut pipe)).await;
    }

    #[tokio::test]
    async fn test_missing_program_tears_down_earlier_stages() {
        let result = ProcessPipe::spawn(
            &[
                CommandSpec::new("yes"),
                CommandSpec::new("/nonexistent/bin/sox"),
            ],
            OutputPolicy::Null,
            TIMEOUT,
        )
        .await;

        match result {
            Err(ProcessError::NotFound { path }) => {
                assert_eq!(path.to_str().unwrap(), "/nonexistent/bin/sox")
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[tokio::test]
    async fn test_empty_pipe_rejected() {
        let result = ProcessPipe::spawn(&[], OutputPolicy::Null, TIMEOUT).await;
        assert!(matches!(result, Err(ProcessError::NoStages)));
    }

    #[tokio::test]
    async fn test_downstream_exit_ends_run() {
        let mut pipe = ProcessPipe::spawn(
            &[CommandSpec::new("yes"), sh("head -c 10 > /dev/null")],
            OutputPolicy::Null,
            TIMEOUT,
        )
        .await
        .unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), pipe.run(StopHandle::new().signal()))
            .await
            .expect("run should end once the consumer exits");
        assert!(matches!(report.end, PipeEnd::Failed(_)));
        assert_eq!(pipe.live_stages(), 0);
    }

    #[tokio::test]
    async fn test_link_copies_until_eof() {
        let reader = tokio_test::io::Builder::new()
            .read(b"IQ")
            .read(b"samples")
            .build();
        let writer = tokio_test::io::Builder::new()
            .write(b"IQ")
            .write(b"samples")
            .build();
        let abort = StopHandle::new();

        let (end, copied) = copy_link(
            "a -> b".into(),
            reader,
            writer,
            StopHandle::new().signal(),
            abort.clone(),
        )
        .await;

        assert_eq!(end, PipeEnd::EndOfStream);
        assert_eq!(copied, 9);
        assert!(!abort.is_stopped());
    }

    #[tokio::test]
    async fn test_link_write_failure_aborts_siblings() {
        let reader = tokio_test::io::Builder::new().read(b"IQ").build();
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            .build();
        let abort = StopHandle::new();

        let (end, copied) = copy_link(
            "a -> b".into(),
            reader,
            writer,
            StopHandle::new().signal(),
            abort.clone(),
        )
        .await;

        assert!(matches!(end, PipeEnd::Failed(ref reason) if reason.contains("write failed")));
        assert_eq!(copied, 0);
        assert!(abort.is_stopped());
    }

    #[tokio::test]
    async fn test_link_observes_prior_stop() {
        let stop = StopHandle::new();
        stop.stop();

        let (end, copied) = copy_link(
            "a -> b".into(),
            tokio_test::io::Builder::new().build(),
            tokio_test::io::Builder::new().build(),
            stop.signal(),
            StopHandle::new(),
        )
        .await;

        assert_eq!(end, PipeEnd::Stopped);
        assert_eq!(copied, 0);
    }
}
