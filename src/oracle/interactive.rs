//! Interactive client for a long-lived wrapper process.
//!
//! Framing: one `<seq>:<assignment>` line out, exactly one
//! `StormCWrapper_RESULT:<seq>:<value>` line back. The session sits behind
//! a mutex, so at most one request is ever in flight per process.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    bounded, format_assignment, format_request, parse_result_line, InteractiveOracle, ModelSpec,
    Stage, EOF_SENTINEL, EXACT_RESULT_TAG,
};
use crate::models::{Constant, OracleResult, PacError, Result};

const DEFAULT_PROGRAM: &str = "storm-c-wrapper";

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_seq: usize,
}

struct Session {
    stage: Stage,
    connection: Option<Connection>,
}

/// Interactive oracle backed by one wrapper subprocess.
pub struct InteractiveClient {
    model: ModelSpec,
    session: Mutex<Session>,
}

impl InteractiveClient {
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            session: Mutex::new(Session {
                stage: Stage::Initialize,
                connection: None,
            }),
        }
    }

    fn spawn(&self) -> Result<Connection> {
        let (file, model_type, property) = self.model.require()?;
        let mut child = Command::new(self.model.program_or(DEFAULT_PROGRAM))
            .args(&self.model.options)
            .arg(model_type.as_str())
            .arg(file)
            .arg(property)
            .arg(format_assignment(&self.model.constants))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PacError::io("starting the model checker", e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PacError::Internal("oracle stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PacError::Internal("oracle stdout not captured".to_string()))?;

        // Diagnostics go to the log, never into the response stream.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(line = %line, "Oracle stderr");
                }
            });
        }

        Ok(Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_seq: 0,
        })
    }
}

impl Connection {
    async fn round_trip(&mut self, sample: &[Constant]) -> Result<OracleResult> {
        let seq = self.next_seq;
        let request = format_request(seq, sample);
        debug!(request = %request, "Checking sample");

        self.stdin
            .write_all(format!("{request}\n").as_bytes())
            .await
            .map_err(|e| PacError::io("writing to the model checker", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| PacError::io("flushing the model checker input", e))?;

        let line = self
            .stdout
            .next_line()
            .await
            .map_err(|e| PacError::io("reading from the model checker", e))?
            .ok_or_else(|| {
                PacError::OracleProtocol(format!(
                    "the model checker closed its output while checking {request}"
                ))
            })?;
        debug!(line = %line, "Raw oracle response");

        let (answered, value) = parse_result_line(EXACT_RESULT_TAG, &line).ok_or_else(|| {
            // Anything untagged means the process is no longer speaking the protocol.
            PacError::OracleProtocol(format!("unexpected oracle response '{line}'"))
        })??;
        if answered != seq {
            return Err(PacError::OracleProtocol(format!(
                "response for request {answered} while waiting for {seq}"
            )));
        }

        self.next_seq += 1;
        Ok(value)
    }

    async fn shutdown(mut self) -> Result<()> {
        self.stdin
            .write_all(format!("{EOF_SENTINEL}\n").as_bytes())
            .await
            .map_err(|e| PacError::io("writing EOF to the model checker", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| PacError::io("flushing the model checker input", e))?;
        drop(self.stdin);

        while let Some(line) = self
            .stdout
            .next_line()
            .await
            .map_err(|e| PacError::io("draining the model checker output", e))?
        {
            debug!(line = %line, "Trailing oracle output");
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| PacError::io("waiting for the model checker", e))?;
        info!(status = %status, "Model checker stopped");
        Ok(())
    }
}

#[async_trait]
impl InteractiveOracle for InteractiveClient {
    async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.stage != Stage::Initialize {
            return Err(PacError::OracleState(
                "the model checker is not in the initialize stage".to_string(),
            ));
        }
        let connection = self.spawn()?;
        session.connection = Some(connection);
        session.stage = Stage::Started;
        info!("Model checker started");
        Ok(())
    }

    async fn check(&self, sample: &[Constant]) -> Result<OracleResult> {
        let mut session = self.session.lock().await;
        let stage = session.stage;
        let connection = match session.connection.as_mut() {
            Some(connection) if stage == Stage::Started => connection,
            _ => {
                return Err(PacError::OracleState(
                    "the model checker is not started".to_string(),
                ))
            }
        };
        bounded(self.model.timeout, connection.round_trip(sample)).await
    }

    async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.stage != Stage::Started {
            return Err(PacError::OracleState(
                "the model checker is not started".to_string(),
            ));
        }
        session.stage = Stage::Stopped;
        match session.connection.take() {
            Some(connection) => bounded(self.model.timeout, connection.shutdown()).await,
            None => Ok(()),
        }
    }
}
