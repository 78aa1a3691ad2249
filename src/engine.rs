/*!
 * Classification, analysis and rebuild engine
 *
 * The engine is an external collaborator. `ProcessEngine` drives an engine
 * executable through four subcommands:
 *
 * ```text
 * <program> [args..] version                 -> version string on stdout
 * <program> [args..] detect                  <- bytes on stdin, type name on stdout
 * <program> [args..] analyse <type> <policy> <- bytes on stdin, report on stdout
 * <program> [args..] rebuild <type> <policy> <- bytes on stdin, artifact on stdout
 * ```
 *
 * `<policy>` is the content management policy serialised as JSON. A non-zero
 * exit from `rebuild` means the engine refused the document.
 */

use crate::config::ContentManagementPolicy;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine failed: {0}")]
    Failed(String),

    #[error("failed to start engine {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine '{subcommand}' exited with {code:?}: {stderr}")]
    Exit {
        subcommand: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("engine produced unusable output: {0}")]
    InvalidOutput(String),

    #[error("failed to encode policy: {0}")]
    Policy(#[from] serde_json::Error),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Classifier, analyser and rebuilder for one file
#[async_trait]
pub trait CdrEngine: Send + Sync + 'static {
    /// Engine library version, for diagnostics
    async fn version(&self) -> Result<String>;

    /// Detected type name of `data`
    ///
    /// Returns `"Unknown"` (or an empty name) for unrecognised content.
    async fn detect_type(&self, data: &[u8]) -> Result<String>;

    /// Analysis report for `data`
    async fn analyse(
        &self,
        policy: &ContentManagementPolicy,
        file_type: &str,
        data: &[u8],
    ) -> Result<String>;

    /// Rebuilt artifact, or `None` when the engine refuses the document
    ///
    /// An empty artifact is returned as is; callers treat it as a refusal.
    async fn rebuild(
        &self,
        policy: &ContentManagementPolicy,
        file_type: &str,
        data: &[u8],
    ) -> Result<Option<Vec<u8>>>;
}

/// Engine backed by an external executable
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Leading arguments placed before every subcommand
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn invoke(
        &self,
        subcommand: &'static str,
        extra: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<Output> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(subcommand)
            .args(extra)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Feed stdin concurrently so a chatty engine cannot fill its stdout pipe and stall
        let feeder = match (stdin, child.stdin.take()) {
            (Some(data), Some(mut pipe)) => {
                let data = data.to_vec();
                Some(tokio::spawn(async move {
                    let result = pipe.write_all(&data).await;
                    drop(pipe);
                    result
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output().await?;

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(())) => {}
                // The engine may legitimately exit before draining stdin
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(EngineError::Io(e)),
                Err(e) => return Err(EngineError::Failed(format!("stdin feeder: {}", e))),
            }
        }

        debug!(
            subcommand,
            status = ?output.status.code(),
            stdout_len = output.stdout.len(),
            "Engine invocation finished"
        );
        Ok(output)
    }

    fn expect_success(subcommand: &'static str, output: Output) -> Result<Vec<u8>> {
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(EngineError::Exit {
                subcommand,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn utf8(stdout: Vec<u8>) -> Result<String> {
        String::from_utf8(stdout)
            .map(|s| s.trim().to_string())
            .map_err(|e| EngineError::InvalidOutput(e.to_string()))
    }
}

#[async_trait]
impl CdrEngine for ProcessEngine {
    async fn version(&self) -> Result<String> {
        let output = self.invoke("version", &[], None).await?;
        Self::utf8(Self::expect_success("version", output)?)
    }

    async fn detect_type(&self, data: &[u8]) -> Result<String> {
        let output = self.invoke("detect", &[], Some(data)).await?;
        Self::utf8(Self::expect_success("detect", output)?)
    }

    async fn analyse(
        &self,
        policy: &ContentManagementPolicy,
        file_type: &str,
        data: &[u8],
    ) -> Result<String> {
        let policy = serde_json::to_string(policy)?;
        let output = self
            .invoke("analyse", &[file_type, &policy], Some(data))
            .await?;
        let stdout = Self::expect_success("analyse", output)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn rebuild(
        &self,
        policy: &ContentManagementPolicy,
        file_type: &str,
        data: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let policy = serde_json::to_string(policy)?;
        let output = self
            .invoke("rebuild", &[file_type, &policy], Some(data))
            .await?;

        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            debug!(
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Engine refused rebuild"
            );
            Ok(None)
        }
    }
}
