//! Batch oracle over the wrapper line protocol.
//!
//! One process per `check`: requests are streamed on stdin, terminated by
//! `EOF`, and every request must come back as a tagged result line. The
//! exact and the statistical wrapper differ only in command line and tag.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{
    bounded, format_assignment, format_request, parse_result_line, Answers, BatchOracle,
    ModelSpec, Requests, EOF_SENTINEL, EXACT_RESULT_TAG, SMC_RESULT_TAG,
};
use crate::models::{ModelType, PacError, Result};

/// Which wrapper executable is on the other end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    /// `[options] <type> <file> <property> <constants>`
    Exact,
    /// `<file> <property> <constants> <options,comma,joined>`; prism only
    Statistical,
}

impl WrapperKind {
    pub fn default_program(self) -> &'static str {
        match self {
            Self::Exact => "storm-c-wrapper",
            Self::Statistical => "stormsmc-c-wrapper",
        }
    }

    pub fn result_tag(self) -> &'static str {
        match self {
            Self::Exact => EXACT_RESULT_TAG,
            Self::Statistical => SMC_RESULT_TAG,
        }
    }
}

/// Batch client for a wrapper executable.
#[derive(Debug, Clone)]
pub struct WrapperOracle {
    model: ModelSpec,
    kind: WrapperKind,
}

impl WrapperOracle {
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            kind: WrapperKind::Exact,
        }
    }

    /// Client for the statistical engine wrapper.
    pub fn statistical(model: ModelSpec) -> Self {
        Self {
            model,
            kind: WrapperKind::Statistical,
        }
    }

    pub fn kind(&self) -> WrapperKind {
        self.kind
    }

    fn command(&self) -> Result<Command> {
        let (file, model_type, property) = self.model.require()?;
        let mut cmd = Command::new(self.model.program_or(self.kind.default_program()));
        match self.kind {
            WrapperKind::Exact => {
                cmd.args(&self.model.options)
                    .arg(model_type.as_str())
                    .arg(file)
                    .arg(property)
                    .arg(format_assignment(&self.model.constants));
            }
            WrapperKind::Statistical => {
                if model_type != ModelType::Prism {
                    return Err(PacError::OracleState(format!(
                        "model type {} not supported; only prism is supported",
                        model_type.as_str()
                    )));
                }
                cmd.arg(file)
                    .arg(property)
                    .arg(format_assignment(&self.model.constants))
                    .arg(self.model.options.join(","));
            }
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    async fn run(&self, mut cmd: Command, requests: &Requests) -> Result<Answers> {
        let mut child = cmd
            .spawn()
            .map_err(|e| PacError::io("spawning the model checker wrapper", e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PacError::Internal("wrapper stdin not captured".to_string()))?;

        let mut payload = String::new();
        for (id, constants) in requests {
            let line = format_request(id, constants);
            debug!(request = %line, "Queued sample");
            payload.push_str(&line);
            payload.push('\n');
        }
        payload.push_str(EOF_SENTINEL);
        payload.push('\n');

        // Feed stdin concurrently so a chatty child cannot fill its stdout pipe
        // while we are still writing.
        let feeder = tokio::spawn(async move {
            let written = stdin.write_all(payload.as_bytes()).await;
            let flushed = stdin.flush().await;
            drop(stdin);
            written.and(flushed)
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PacError::io("waiting for the model checker wrapper", e))?;

        match feeder.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Wrapper closed stdin early"),
            Err(e) => return Err(PacError::Internal(format!("stdin feeder panicked: {e}"))),
        }

        info!(status = %output.status, "Wrapper finished");
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "Wrapper stderr");
        }

        let answers = collect_answers(self.kind.result_tag(), &stdout, requests)?;
        if !output.status.success() {
            warn!(status = %output.status, "Wrapper exited unsuccessfully but answered every request");
        }
        Ok(answers)
    }
}

/// Match tagged lines to requests; every request must be answered once.
fn collect_answers(tag: &str, stdout: &str, requests: &Requests) -> Result<Answers> {
    let mut answers = Answers::new();
    for line in stdout.lines() {
        debug!(line = %line, "Raw wrapper output");
        let Some(parsed) = parse_result_line(tag, line) else {
            continue;
        };
        let (id, value) = parsed?;
        if !requests.contains_key(&id) {
            return Err(PacError::OracleProtocol(format!(
                "result for unknown request id {id}"
            )));
        }
        if answers.insert(id, value).is_some() {
            return Err(PacError::OracleProtocol(format!(
                "request id {id} answered twice"
            )));
        }
    }

    if answers.len() != requests.len() {
        let missing: Vec<String> = requests
            .keys()
            .filter(|id| !answers.contains_key(*id))
            .map(|id| id.to_string())
            .collect();
        return Err(PacError::OracleProtocol(format!(
            "incorrect number of results: expected {}, got {} (missing ids: {}); raw output:\n{}",
            requests.len(),
            answers.len(),
            missing.join(","),
            stdout.trim()
        )));
    }
    Ok(answers)
}

#[async_trait]
impl BatchOracle for WrapperOracle {
    fn name(&self) -> &'static str {
        match self.kind {
            WrapperKind::Exact => "wrapper",
            WrapperKind::Statistical => "stormsmcc",
        }
    }

    async fn check(&self, requests: &Requests) -> Result<Answers> {
        let cmd = self.command()?;
        if requests.is_empty() {
            return Ok(Answers::new());
        }
        info!(requests = requests.len(), "Calling model checker wrapper");
        bounded(self.model.timeout, self.run(cmd, requests)).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{Constant, ModelType, OracleResult};
    use crate::oracle::test_support::script;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Echoes the value of the first assignment back as the result.
    const ECHO: &str = r#"
while IFS= read -r line; do
  [ "$line" = "EOF" ] && break
  id=${line%%:*}
  rest=${line#*:}
  value=${rest%%,*}
  echo "progress: $id" >&2
  echo "StormCWrapper_RESULT:$id:${value#*=}"
done
"#;

    fn oracle(dir: &TempDir, body: &str) -> WrapperOracle {
        let (script, model) = script(dir, body);
        WrapperOracle::new(ModelSpec {
            file: Some(model),
            model_type: Some(ModelType::Prism),
            property: Some("P=? [ F \"done\" ]".to_string()),
            constants: vec![Constant::new("N", "3")],
            options: vec![script.display().to_string()],
            program: Some(PathBuf::from("sh")),
            timeout: Some(Duration::from_secs(10)),
        })
    }

    fn requests(values: &[&str]) -> Requests {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (i * 2, vec![Constant::new("p", *v), Constant::new("q", "1")]))
            .collect()
    }

    #[tokio::test]
    async fn answers_every_request() {
        let dir = TempDir::new().unwrap();
        let answers = oracle(&dir, ECHO)
            .check(&requests(&["0.25", "0.5", "inf"]))
            .await
            .unwrap();

        assert_eq!(answers.len(), 3);
        assert_eq!(answers[&0], OracleResult::Finite(dec!(0.25)));
        assert_eq!(answers[&2], OracleResult::Finite(dec!(0.5)));
        assert_eq!(answers[&4], OracleResult::Infinite);
    }

    #[tokio::test]
    async fn missing_result_is_fatal() {
        let dir = TempDir::new().unwrap();
        let body = r#"
while IFS= read -r line; do
  [ "$line" = "EOF" ] && break
  id=${line%%:*}
  [ "$id" = "2" ] && continue
  echo "StormCWrapper_RESULT:$id:0.1"
done
"#;
        let err = oracle(&dir, body)
            .check(&requests(&["0.1", "0.2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PacError::OracleProtocol(m) if m.contains("missing ids: 2")));
    }

    #[tokio::test]
    async fn garbled_result_is_fatal() {
        let dir = TempDir::new().unwrap();
        let body = r#"
while IFS= read -r line; do
  [ "$line" = "EOF" ] && break
  echo "StormCWrapper_RESULT:${line%%:*}:NaN?"
done
"#;
        let err = oracle(&dir, body).check(&requests(&["0.1"])).await.unwrap_err();
        assert!(matches!(err, PacError::OracleProtocol(_)));
    }

    #[tokio::test]
    async fn unreadable_model_fails_before_spawning() {
        let mut wrapper = oracle(&TempDir::new().unwrap(), ECHO);
        wrapper.model.file = Some(PathBuf::from("/no/such/model.pm"));
        let err = wrapper.check(&requests(&["0.1"])).await.unwrap_err();
        assert!(matches!(err, PacError::OracleState(_)));
    }

    #[tokio::test]
    async fn hung_process_times_out() {
        let dir = TempDir::new().unwrap();
        let mut wrapper = oracle(&dir, "sleep 30");
        wrapper.model.timeout = Some(Duration::from_millis(200));
        let err = wrapper.check(&requests(&["0.1"])).await.unwrap_err();
        assert!(matches!(err, PacError::Timeout(_)));
    }

    /// Answers every request with the statistical tag and echoes its own
    /// arguments on stderr.
    const SMC: &str = r#"
echo "args: $*" >&2
while IFS= read -r line; do
  [ "$line" = "EOF" ] && break
  echo "StormCWrapper_RESULT:${line%%:*}:0.9"
  echo "StormsmcCWrapper_RESULT:${line%%:*}:0.375"
done
"#;

    fn statistical(dir: &TempDir, model_type: ModelType) -> WrapperOracle {
        let (program, model) = crate::oracle::test_support::executable(dir, SMC);
        WrapperOracle::statistical(ModelSpec {
            file: Some(model),
            model_type: Some(model_type),
            property: Some("P=? [ F \"done\" ]".to_string()),
            constants: vec![Constant::new("N", "3")],
            options: vec!["--seed".to_string(), "7".to_string()],
            program: Some(program),
            timeout: Some(Duration::from_secs(10)),
        })
    }

    #[test]
    fn statistical_command_line_joins_options() {
        let dir = TempDir::new().unwrap();
        let oracle = statistical(&dir, ModelType::Prism);
        let cmd = oracle.command().unwrap();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[1..], ["P=? [ F \"done\" ]", "N=3", "--seed,7"]);
        assert!(args[0].ends_with("model.pm"));
        assert_eq!(oracle.name(), "stormsmcc");
    }

    #[tokio::test]
    async fn statistical_wrapper_reads_its_own_tag() {
        let dir = TempDir::new().unwrap();
        let answers = statistical(&dir, ModelType::Prism)
            .check(&requests(&["0.1", "0.2"]))
            .await
            .unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers.values().all(|v| *v == OracleResult::Finite(dec!(0.375))));
    }

    #[tokio::test]
    async fn statistical_wrapper_rejects_jani() {
        let dir = TempDir::new().unwrap();
        let err = statistical(&dir, ModelType::Jani)
            .check(&requests(&["0.1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PacError::OracleState(m) if m.contains("only prism")));
    }
}
