// CLI engine runner: one child process per generation
// Prompt goes through a temp file, stdout is filtered down to the generated text.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::locator::ExecutableLocator;
use super::output::OutputCollector;
use super::{InferenceRequest, ModelTier, TextGenerator};
use crate::config::{ModelProfile, SubprocessConfig};
use crate::error::{InferenceError, Result};

/// Stderr lines kept for the failure log
const STDERR_TAIL_LINES: usize = 8;

/// Resolved engine binary and weight file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    pub executable: PathBuf,
    pub model: PathBuf,
    /// Placed between the executable and the standard arguments
    pub leading_args: Vec<String>,
}

pub struct ProcessInferenceEngine {
    handle: EngineHandle,
    extra_args: Vec<String>,
    log_markers: Vec<String>,
    prompt_dir: Option<PathBuf>,
    timeout: Duration,
    profile: ModelProfile,
}

impl ProcessInferenceEngine {
    /// Resolve binary and weights from the configured candidates.
    pub fn locate(config: &SubprocessConfig) -> Result<Self> {
        let executable = ExecutableLocator::find_executable(&config.executable_candidates)
            .ok_or(InferenceError::ExecutableNotFound)?;
        let model = ExecutableLocator::find_model_file(&config.model_candidates, &config.model_extension)
            .ok_or(InferenceError::ModelFileNotFound)?;

        let handle = EngineHandle {
            executable,
            model,
            leading_args: config.leading_args.clone(),
        };
        Ok(Self::from_handle(handle, config))
    }

    /// Engine around an already-resolved handle; nothing is checked here.
    pub fn from_handle(handle: EngineHandle, config: &SubprocessConfig) -> Self {
        log::info!(
            "CLI engine ready: {} with model {}",
            handle.executable.display(),
            handle.model.display()
        );
        Self {
            handle,
            extra_args: config.extra_args.clone(),
            log_markers: config.log_markers.clone(),
            prompt_dir: config.prompt_dir.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            profile: config.profile.clone(),
        }
    }

    pub fn handle(&self) -> &EngineHandle {
        &self.handle
    }

    /// Arguments after the executable for one run
    fn build_args(&self, prompt_path: &Path, request: &InferenceRequest) -> Vec<OsString> {
        let sampling = &request.sampling;
        let mut args: Vec<OsString> = self.handle.leading_args.iter().map(OsString::from).collect();
        args.push("-m".into());
        args.push(self.handle.model.clone().into_os_string());
        args.push("--file".into());
        args.push(prompt_path.as_os_str().to_os_string());
        args.push("-n".into());
        args.push(request.max_new_tokens.to_string().into());
        args.push("--temp".into());
        args.push(sampling.temperature.to_string().into());
        args.push("--top-k".into());
        args.push(sampling.top_k.to_string().into());
        args.push("--top-p".into());
        args.push(sampling.top_p.to_string().into());
        args.push("--repeat-penalty".into());
        args.push(sampling.repeat_penalty.to_string().into());
        args.push("-c".into());
        args.push(self.profile.context_length.to_string().into());
        // CPU only
        args.push("-ngl".into());
        args.push("0".into());
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Writes the prompt and hands back a path that deletes itself on drop
    fn write_prompt_file(&self, prompt: &str) -> Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("llama_prompt_").suffix(".txt");

        let mut file = match &self.prompt_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(InferenceError::TempFileIOFailure)?;

        file.write_all(prompt.as_bytes())
            .map_err(InferenceError::TempFileIOFailure)?;
        file.flush().map_err(InferenceError::TempFileIOFailure)?;

        // Close the handle so the engine can open the file on every platform
        Ok(file.into_temp_path())
    }

    async fn run_engine(&self, prompt_path: &Path, request: &InferenceRequest) -> Result<String> {
        let args = self.build_args(prompt_path, request);
        log::debug!(
            "Invoking {} {:?}",
            self.handle.executable.display(),
            args
        );

        let mut command = Command::new(&self.handle.executable);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command.spawn().map_err(|e| {
            InferenceError::ProcessSpawnFailure(format!(
                "{}: {}",
                self.handle.executable.display(),
                e
            ))
        })?;

        let started = Instant::now();
        let collected = tokio::time::timeout(
            self.timeout,
            collect_output(&mut child, &request.prompt, &self.log_markers),
        )
        .await;

        let (text, status) = match collected {
            Ok(result) => result?,
            Err(_) => {
                log::error!(
                    "CLI engine still running after {:?}, killing it",
                    self.timeout
                );
                if let Err(e) = child.kill().await {
                    log::warn!("Failed to kill CLI engine: {}", e);
                }
                return Err(InferenceError::ProcessTimedOut(self.timeout.as_secs()));
            }
        };

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            log::error!("CLI engine exited with code {}", code);
            return Err(InferenceError::ProcessExitFailure(code));
        }

        if text.is_empty() {
            log::warn!("CLI engine finished without generating text");
            return Err(InferenceError::EmptyOutput);
        }

        log::info!(
            "CLI engine generated {} chars in {:.2}s",
            text.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(text)
    }
}

/// One output line without its terminator; invalid UTF-8 becomes U+FFFD
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(|c: char| c == '\n' || c == '\r')
        .to_string()
}

/// Drains stdout and stderr until both close, then waits for exit
async fn collect_output(
    child: &mut Child,
    prompt: &str,
    markers: &[String],
) -> Result<(String, ExitStatus)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| InferenceError::ProcessSpawnFailure("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| InferenceError::ProcessSpawnFailure("stderr not captured".to_string()))?;

    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    // Partial reads stay here if the other branch wins the select
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_done = false;
    let mut err_done = false;

    let mut collector = OutputCollector::new(prompt, markers);
    let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while !(out_done && err_done) {
        tokio::select! {
            read = out_reader.read_until(b'\n', &mut out_buf), if !out_done => match read {
                Ok(0) => out_done = true,
                Ok(_) => {
                    collector.push_line(&decode_line(&out_buf));
                    out_buf.clear();
                }
                Err(e) => {
                    log::warn!("Stopped reading engine stdout: {}", e);
                    out_done = true;
                }
            },
            read = err_reader.read_until(b'\n', &mut err_buf), if !err_done => match read {
                Ok(0) => err_done = true,
                Ok(_) => {
                    let line = decode_line(&err_buf);
                    err_buf.clear();
                    if !collector.is_log_line(&line) && !line.trim().is_empty() {
                        if stderr_tail.len() == STDERR_TAIL_LINES {
                            stderr_tail.pop_front();
                        }
                        stderr_tail.push_back(line);
                    }
                }
                Err(_) => err_done = true,
            },
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| InferenceError::ProcessSpawnFailure(e.to_string()))?;

    if !status.success() {
        for line in &stderr_tail {
            log::warn!("engine stderr: {}", line);
        }
    }

    Ok((collector.finish(), status))
}

#[async_trait]
impl TextGenerator for ProcessInferenceEngine {
    fn tier(&self) -> ModelTier {
        ModelTier::SubprocessEngine
    }

    fn is_ready(&self) -> bool {
        self.handle.executable.exists() && self.handle.model.is_file()
    }

    fn model_name(&self) -> String {
        let file = self
            .handle
            .model
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.profile.name.clone());
        format!("{} ({})", file, ModelTier::SubprocessEngine.label())
    }

    async fn generate(&self, request: &InferenceRequest) -> Result<String> {
        let prompt_file = self.write_prompt_file(&request.prompt)?;
        let result = self.run_engine(&prompt_file, request).await;

        if let Err(e) = prompt_file.close() {
            log::warn!("Failed to delete prompt file: {}", e);
        }
        result
    }
}
