//! DSP toolkit backed by external decoder programs.
//!
//! Each chain maps to a configured command. The command receives the chain
//! parameters as `--key value` arguments followed by the WAV path (or the
//! path substituted for an `{input}` argument) and prints one hex-encoded
//! frame per line on stdout. The image command reads the same format on
//! stdin and writes the encoded image to stdout.
//!
//! Every run is bounded by `dsp.timeout_secs`; a command still running at
//! the deadline is killed.

use std::future::Future;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tracing::{debug, warn};

use super::dsp::{ChainSpec, Dsp, FrameStream};
use super::error::DecodeError;
use super::source::WavSource;
use crate::config::{DspCommand, DspConfig};

const INPUT_PLACEHOLDER: &str = "{input}";

/// Runs decode chains as external commands.
pub struct CommandDsp {
    config: DspConfig,
    timeout: Duration,
}

impl CommandDsp {
    pub fn new(config: DspConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self { config, timeout }
    }

    fn command_for(&self, chain: &ChainSpec) -> Option<&DspCommand> {
        match chain {
            ChainSpec::Lrpt(_) => self.config.lrpt.as_ref(),
            ChainSpec::Bpsk(_) => self.config.bpsk.as_ref(),
        }
    }

    /// Run `program` to completion from a blocking thread.
    fn run(
        &self,
        program: &Path,
        args: &[String],
        input: Option<Vec<u8>>,
    ) -> Result<Output, DecodeError> {
        let output = block_on(run_command(program, args, input, self.timeout))??;
        check_status(&program.to_string_lossy(), &output)?;
        Ok(output)
    }
}

impl Dsp for CommandDsp {
    fn frames(&self, source: &WavSource, chain: &ChainSpec) -> Result<FrameStream, DecodeError> {
        let command = self.command_for(chain).ok_or_else(|| {
            DecodeError::Dsp(format!("no command configured for the {} chain", chain.name()))
        })?;

        let input = source.path().to_string_lossy().to_string();
        let mut args: Vec<String> = command
            .args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, &input))
            .collect();
        args.extend(chain.to_args());
        if !command.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            args.push(input);
        }

        debug!("Running {} chain: {:?} {:?}", chain.name(), command.program, args);
        let output = self.run(&command.program, &args, None)?;

        let frames = parse_frames(&output.stdout)?;
        debug!("{} chain produced {} frames", chain.name(), frames.len());
        Ok(Box::new(frames.into_iter().map(Ok)))
    }

    fn render_image(&self, frames: &[Vec<u8>]) -> Result<Option<Vec<u8>>, DecodeError> {
        let Some(command) = self.config.image.as_ref() else {
            warn!("No image command configured, dropping {} frames", frames.len());
            return Ok(None);
        };

        let mut input = String::with_capacity(frames.iter().map(|f| f.len() * 2 + 1).sum());
        for frame in frames {
            input.push_str(&hex::encode(frame));
            input.push('\n');
        }

        let output = self.run(&command.program, &command.args, Some(input.into_bytes()))?;
        if output.stdout.is_empty() {
            Ok(None)
        } else {
            Ok(Some(output.stdout))
        }
    }
}

/// Drive `future` on the ambient runtime, or on a private one when called
/// outside of any.
fn block_on<F: Future>(future: F) -> Result<F::Output, DecodeError> {
    match Handle::try_current() {
        Ok(handle) => Ok(handle.block_on(future)),
        Err(_) => {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| DecodeError::Dsp(format!("unable to start runtime: {}", e)))?;
            Ok(runtime.block_on(future))
        }
    }
}

async fn run_command(
    program: &Path,
    args: &[String],
    input: Option<Vec<u8>>,
    limit: Duration,
) -> Result<Output, DecodeError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DecodeError::Dsp(format!("failed to run {:?}: {}", program, e)))?;

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            if let Err(e) = stdin.write_all(&input).await {
                debug!("{:?} closed stdin early: {}", program, e);
            }
        }
    };
    let run = async move { tokio::join!(feed, child.wait_with_output()).1 };

    // Dropping the timed-out run drops the child, which kills it.
    match tokio::time::timeout(limit, run).await {
        Ok(output) => {
            output.map_err(|e| DecodeError::Dsp(format!("{:?} failed: {}", program, e)))
        }
        Err(_) => {
            warn!("{:?} did not finish within {:?}, killing it", program, limit);
            Err(DecodeError::Dsp(format!(
                "{:?} timed out after {:?}",
                program, limit
            )))
        }
    }
}

fn check_status(program: &str, output: &Output) -> Result<(), DecodeError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    Err(DecodeError::Dsp(format!(
        "{} exited with {}: {}",
        program,
        output.status,
        tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
    )))
}

fn parse_frames(stdout: &[u8]) -> Result<Vec<Vec<u8>>, DecodeError> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| hex::decode(l).map_err(|e| DecodeError::Dsp(format!("bad frame line: {}", e))))
        .collect()
}
