use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, Command},
    time,
};
use tracing::{debug, warn};

use crate::{
    config::AppConfig,
    error::GenerationError,
    model::{GenerationRequest, Generator, ModelConfig},
};

/// Child-side generation script, run through `<program> -e`.
pub const EMBEDDED_SCRIPT: &str = include_str!("../../scripts/nanochat_generate.rb");

const STDERR_LIMIT: usize = 4096;

/// Payload written to the child's stdin.
#[derive(Serialize)]
struct RemoteRequest<'a> {
    #[serde(flatten)]
    request: &'a GenerationRequest,
    checkpoint_path: &'a Path,
    tokenizer_dir: &'a Path,
    model: &'a ModelConfig,
}

/// The out-of-process implementation: one interpreter process per request.
pub struct RemoteGenerator {
    label: String,
    program: OsString,
    args: Vec<OsString>,
    workdir: Option<PathBuf>,
    timeout: Duration,
    checkpoint_path: PathBuf,
    tokenizer_dir: PathBuf,
    model: ModelConfig,
}

impl RemoteGenerator {
    pub fn new(label: impl Into<String>, program: impl Into<OsString>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            timeout: Duration::from_secs(60),
            checkpoint_path: PathBuf::new(),
            tokenizer_dir: PathBuf::new(),
            model: ModelConfig::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let args: Vec<OsString> = match &config.remote_script {
            Some(path) => vec![path.clone().into_os_string()],
            None => vec!["-e".into(), EMBEDDED_SCRIPT.into()],
        };
        let mut generator = Self::new(config.remote_label.clone(), config.remote_program.clone())
            .args(args)
            .timeout(config.remote_timeout)
            .artifacts(
                config.checkpoint_path.clone(),
                config.tokenizer_dir.clone(),
                config.model.clone(),
            );
        if let Some(dir) = &config.remote_workdir {
            generator = generator.workdir(dir.clone());
        }
        generator
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workdir(mut self, dir: PathBuf) -> Self {
        self.workdir = Some(dir);
        self
    }

    pub fn artifacts(mut self, checkpoint: PathBuf, tokenizer_dir: PathBuf, model: ModelConfig) -> Self {
        self.checkpoint_path = checkpoint;
        self.tokenizer_dir = tokenizer_dir;
        self.model = model;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl Generator for RemoteGenerator {
    fn label(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let payload = serde_json::to_vec(&RemoteRequest {
            request,
            checkpoint_path: &self.checkpoint_path,
            tokenizer_dir: &self.tokenizer_dir,
            model: &self.model,
        })
        .map_err(|e| GenerationError::Other(format!("encoding request: {e}")))?;

        let mut child = self.command().spawn()?;
        debug!(pid = child.id(), program = ?self.program, "spawned generator process");

        let (status, stdout, stderr) =
            match time::timeout(self.timeout, exchange(&mut child, payload)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(timeout = ?self.timeout, label = %self.label, "generator process timed out");
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "failed to kill timed out generator process");
                    }
                    return Err(GenerationError::ExternalProcessTimeout(self.timeout));
                }
            };

        if !status.success() {
            return Err(GenerationError::ExternalProcessFailure {
                status: status.to_string(),
                stderr: capped(&stderr),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

/// Feeds the request on stdin while draining stdout and stderr, then waits
/// for the exit status.
async fn exchange(
    child: &mut Child,
    payload: Vec<u8>,
) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let feed = async move {
        if let Some(mut stdin) = stdin {
            match stdin.write_all(&payload).await {
                Err(err) if err.kind() != io::ErrorKind::BrokenPipe => return Err(err),
                _ => {}
            }
        }
        Ok(())
    };
    let read_stdout = async move {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout {
            out.read_to_end(&mut buf).await?;
        }
        Ok::<_, io::Error>(buf)
    };
    let read_stderr = async move {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr {
            err.read_to_end(&mut buf).await?;
        }
        Ok::<_, io::Error>(buf)
    };

    let (fed, stdout, stderr, status) = tokio::join!(feed, read_stdout, read_stderr, child.wait());
    fed?;
    Ok((status?, stdout?, stderr?))
}

fn capped(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.len() <= STDERR_LIMIT {
        return text.to_string();
    }
    let mut end = STDERR_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
