// Subprocess producer
// Runs an external scraper that prints one JSON record per stdout line.
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use harvest_core::domain::Record;
use harvest_core::port::{ExtractionParams, OpenedProducer, ProducerError, ProducerSource};

/// Exit code a scraper uses to report refused credentials (EX_NOPERM)
pub const EXIT_CREDENTIALS_REJECTED: i32 = 77;

/// Time a scraper gets to exit after SIGTERM before it is killed
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How to launch a scraper
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables passed through from the engine; everything
    /// else is cleared
    #[serde(default)]
    pub env_allowlist: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env_allowlist: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn allow_env(mut self, name: impl Into<String>) -> Self {
        self.env_allowlist.push(name.into());
        self
    }
}

/// Producer backed by an external scraper process
///
/// Protocol:
/// - `--limit N` and `--force-update` are appended to the configured args
/// - producer options are written to stdin as one JSON object, then stdin closes
/// - every non-empty stdout line is one JSON record
/// - exit 0 ends the run, exit 77 means refused credentials (last stderr
///   line is the detail), anything else is a failure
pub struct CommandProducerSource {
    spec: CommandSpec,
}

impl CommandProducerSource {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }

    fn build_args(&self, params: &ExtractionParams) -> Vec<String> {
        let mut args = self.spec.args.clone();
        if let Some(limit) = params.limit {
            args.push("--limit".to_string());
            args.push(limit.to_string());
        }
        if params.force_update {
            args.push("--force-update".to_string());
        }
        args
    }

    fn spawn(&self, args: &[String]) -> Result<Child, ProducerError> {
        let mut command = Command::new(&self.spec.command);
        command
            .args(args)
            .env_clear()
            .envs(filter_env(&self.spec.env_allowlist, std::env::vars()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }

        command.spawn().map_err(|e| {
            ProducerError::Connection(format!("failed to start {}: {}", self.spec.command, e))
        })
    }
}

/// Keep only allowlisted variables
fn filter_env(
    allowlist: &[String],
    vars: impl IntoIterator<Item = (String, String)>,
) -> Vec<(String, String)> {
    vars.into_iter()
        .filter(|(k, _)| allowlist.contains(k))
        .collect()
}

#[async_trait]
impl ProducerSource for CommandProducerSource {
    async fn open(&self, params: &ExtractionParams) -> Result<OpenedProducer, ProducerError> {
        let args = self.build_args(params);
        let mut child = self.spawn(&args)?;

        info!(
            command = %self.spec.command,
            args = ?args,
            pid = ?child.id(),
            "Started scraper process"
        );

        if let Some(mut stdin) = child.stdin.take() {
            let mut options = serde_json::to_vec(&params.options)
                .map_err(|e| ProducerError::Failed(e.to_string()))?;
            options.push(b'\n');
            // A scraper that ignores stdin may already have closed it
            if let Err(e) = stdin.write_all(&options).await {
                debug!(error = %e, "Scraper did not read its options");
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProducerError::Failed("scraper stdout not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut last = None;
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        debug!(stderr = %line, "Scraper stderr");
                        last = Some(line.trim().to_string());
                    }
                }
                last
            })
        });

        let run = RunningScraper {
            command: self.spec.command.clone(),
            child: Some(child),
            lines: BufReader::new(stdout).lines(),
            stderr_task,
            exhausted: false,
        };

        let records = futures::stream::unfold(run, |mut run| async move {
            let item = run.next_record().await?;
            Some((item, run))
        })
        .boxed();

        Ok(OpenedProducer::new(records))
    }
}

/// Child process plus its stdout reader
///
/// Dropping it before the process exited terminates the process.
struct RunningScraper {
    command: String,
    child: Option<Child>,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<Option<String>>>,
    exhausted: bool,
}

impl RunningScraper {
    async fn next_record(&mut self) -> Option<Result<Record, ProducerError>> {
        if self.exhausted {
            return None;
        }

        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    // A bad line only costs that record; reading goes on
                    return Some(serde_json::from_str(line).map(Record::new).map_err(|e| {
                        ProducerError::Malformed(format!(
                            "{} printed invalid JSON: {}",
                            self.command, e
                        ))
                    }));
                }
                Ok(None) => {
                    self.exhausted = true;
                    return self.wait_exit().await.err().map(Err);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(ProducerError::Failed(format!(
                        "reading {} output: {}",
                        self.command, e
                    ))));
                }
            }
        }
    }

    /// Wait for the process after stdout closed and map its exit code
    async fn wait_exit(&mut self) -> Result<(), ProducerError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .await
            .map_err(|e| ProducerError::Failed(format!("waiting for {}: {}", self.command, e)))?;
        let last_stderr = match self.stderr_task.take() {
            Some(task) => task.await.ok().flatten(),
            None => None,
        };

        info!(command = %self.command, exit_code = ?status.code(), "Scraper process exited");

        match status.code() {
            Some(0) => Ok(()),
            Some(EXIT_CREDENTIALS_REJECTED) => Err(ProducerError::CredentialsRejected(
                last_stderr.unwrap_or_else(|| "scraper refused the credentials".to_string()),
            )),
            code => {
                let code = code.map_or_else(|| "a signal".to_string(), |c| format!("code {}", c));
                Err(ProducerError::Failed(match last_stderr {
                    Some(detail) => format!("{} exited with {}: {}", self.command, code, detail),
                    None => format!("{} exited with {}", self.command, code),
                }))
            }
        }
    }
}

impl Drop for RunningScraper {
    fn drop(&mut self) {
        let Some(child) = self.child.take() else {
            return;
        };
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(terminate(child, self.command.clone()));
            }
            Err(_) => warn!(command = %self.command, "No runtime to stop abandoned scraper"),
        }
    }
}

/// SIGTERM first, then SIGKILL after the grace period
async fn terminate(mut child: Child, command: String) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        info!(command = %command, pid, "Sending SIGTERM to abandoned scraper");
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(pid, error = %e, "SIGTERM failed");
        }

        if let Ok(status) = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, child.wait()).await {
            debug!(command = %command, status = ?status, "Scraper exited after SIGTERM");
            return;
        }
        warn!(command = %command, pid, "Scraper did not exit after SIGTERM, sending SIGKILL");
    }

    if let Err(e) = child.kill().await {
        warn!(command = %command, error = %e, "Failed to kill scraper");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .arg("scraper")
            .allow_env("PATH")
    }

    async fn collect(spec: CommandSpec, params: ExtractionParams) -> Vec<Result<Record, ProducerError>> {
        let opened = CommandProducerSource::new(spec).open(&params).await.unwrap();
        opened.records.collect().await
    }

    #[tokio::test]
    async fn test_each_stdout_line_is_a_record() {
        let items = collect(
            shell(r#"printf '{"id":1}\n\n{"id":2}\n'"#),
            ExtractionParams::default(),
        )
        .await;

        let keys: Vec<String> = items
            .into_iter()
            .map(|r| r.unwrap().key().unwrap())
            .collect();
        assert_eq!(keys, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_limit_and_force_update_flags() {
        let params = ExtractionParams {
            limit: Some(5),
            force_update: true,
            ..ExtractionParams::default()
        };

        let items = collect(shell(r#"printf '{"args":"%s"}\n' "$*""#), params).await;

        assert_eq!(items.len(), 1);
        let record = items.into_iter().next().unwrap().unwrap();
        assert_eq!(record.as_value()["args"], json!("--limit 5 --force-update"));
    }

    #[tokio::test]
    async fn test_options_arrive_on_stdin() {
        let mut params = ExtractionParams::default();
        params.options.insert("channel".to_string(), json!("rustlang"));

        let items = collect(shell("read -r line; printf '%s\\n' \"$line\""), params).await;

        let record = items.into_iter().next().unwrap().unwrap();
        assert_eq!(record.into_value(), json!({ "channel": "rustlang" }));
    }

    #[tokio::test]
    async fn test_exit_77_is_credentials_rejected() {
        let items = collect(
            shell(r#"echo '{"id":1}'; echo 'connecting' >&2; echo 'session revoked' >&2; exit 77"#),
            ExtractionParams::default(),
        )
        .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(
            items[1].clone().unwrap_err(),
            ProducerError::CredentialsRejected("session revoked".to_string())
        );
    }

    #[tokio::test]
    async fn test_other_exit_codes_fail() {
        let items = collect(
            shell("echo 'rate limited' >&2; exit 3"),
            ExtractionParams::default(),
        )
        .await;

        assert_eq!(items.len(), 1);
        let err = items[0].clone().unwrap_err();
        assert!(!err.is_credentials());
        assert!(err.to_string().contains("code 3"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_invalid_json_line_does_not_end_stream() {
        let items = collect(
            shell(r#"echo '{"id":1}'; echo 'not json'; echo '{"id":3}'"#),
            ExtractionParams::default(),
        )
        .await;

        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], Err(ProducerError::Malformed(_))));
        assert_eq!(items[2].as_ref().unwrap().key().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_open() {
        let source = CommandProducerSource::new(CommandSpec::new("/nonexistent/scraper"));

        let err = source.open(&ExtractionParams::default()).await.unwrap_err();

        assert!(matches!(err, ProducerError::Connection(_)));
    }

    #[tokio::test]
    async fn test_dropping_stream_does_not_wait_for_scraper() {
        let source = CommandProducerSource::new(shell(r#"echo '{"id":1}'; sleep 30"#));
        let mut opened = source.open(&ExtractionParams::default()).await.unwrap();

        assert!(opened.records.next().await.unwrap().is_ok());

        tokio::time::timeout(Duration::from_secs(1), async move { drop(opened) })
            .await
            .expect("drop should not block");
    }

    #[test]
    fn test_env_filtering() {
        let vars = vec![
            ("ALLOWED_VAR".to_string(), "value1".to_string()),
            ("BLOCKED_VAR".to_string(), "value2".to_string()),
        ];

        let filtered = filter_env(&["ALLOWED_VAR".to_string()], vars);

        assert_eq!(filtered, vec![("ALLOWED_VAR".to_string(), "value1".to_string())]);
    }

    #[test]
    fn test_spec_from_config_table() {
        let spec: CommandSpec = serde_json::from_value(json!({
            "command": "telegram-scraper",
            "args": ["--session", "main"]
        }))
        .unwrap();

        assert_eq!(spec.command, "telegram-scraper");
        assert_eq!(spec.args, vec!["--session", "main"]);
        assert!(spec.env_allowlist.is_empty());
        assert!(spec.working_dir.is_none());
    }
}
