//! Batch oracle running the model checker CLI once per sample.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{
    bounded, format_assignment, parse_cli_output, Answers, BatchOracle, ModelSpec, Requests,
    STORM_RESULT_MARKER,
};
use crate::models::{Constant, ModelType, OracleResult, PacError, Result};

const DEFAULT_PROGRAM: &str = "storm";

/// `storm --<type> <file> --prop <formula> [--prismcompat] --constants <c> [options]`
#[derive(Debug, Clone)]
pub struct StormOracle {
    model: ModelSpec,
}

impl StormOracle {
    pub fn new(model: ModelSpec) -> Self {
        Self { model }
    }

    fn command(&self, sample: &[Constant]) -> Result<Command> {
        let (file, model_type, property) = self.model.require()?;
        let mut cmd = Command::new(self.model.program_or(DEFAULT_PROGRAM));
        cmd.arg(format!("--{}", model_type.as_str()))
            .arg(file)
            .arg("--prop")
            .arg(property);
        if model_type == ModelType::Prism {
            cmd.arg("--prismcompat");
        }

        let constants: Vec<Constant> = self
            .model
            .constants
            .iter()
            .chain(sample)
            .cloned()
            .collect();
        if !constants.is_empty() {
            cmd.arg("--constants").arg(format_assignment(&constants));
        }
        cmd.args(&self.model.options)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// Run one CLI invocation and read the value after `marker`.
pub(crate) async fn run_cli(id: usize, mut cmd: Command, marker: &str) -> Result<OracleResult> {
    let output = cmd
        .output()
        .await
        .map_err(|e| PacError::io("running the model checker", e))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!(id, status = %output.status, stdout = %stdout.trim(), "Model checker output");

    match parse_cli_output(marker, &stdout) {
        Some(result) => result,
        None => Err(PacError::OracleProtocol(format!(
            "failed execution for request {id} (exit status {}); raw output:\n{}\n{}",
            output.status,
            stdout.trim(),
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}

#[async_trait]
impl BatchOracle for StormOracle {
    fn name(&self) -> &'static str {
        "storm"
    }

    async fn check(&self, requests: &Requests) -> Result<Answers> {
        self.model.require()?;
        info!(requests = requests.len(), "Calling model checker CLI");

        let mut answers = Answers::new();
        for (&id, sample) in requests {
            let cmd = self.command(sample)?;
            let result =
                bounded(self.model.timeout, run_cli(id, cmd, STORM_RESULT_MARKER)).await?;
            answers.insert(id, result);
        }
        Ok(answers)
    }
}
