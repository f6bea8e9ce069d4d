//! Batch oracle running PRISM's statistical engine once per sample.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

use super::storm::run_cli;
use super::{
    bounded, format_assignment, Answers, BatchOracle, ModelSpec, Requests, PRISM_RESULT_MARKER,
};
use crate::models::{Constant, Result, SmcConfig};

const DEFAULT_PROGRAM: &str = "prism";

/// `prism <file> -pf <formula> [-const <c>] -sim -simmethod <m> [-sim* ...] [options]`
#[derive(Debug, Clone)]
pub struct PrismSmcOracle {
    model: ModelSpec,
    smc: SmcConfig,
}

impl PrismSmcOracle {
    pub fn new(model: ModelSpec, smc: SmcConfig) -> Self {
        Self { model, smc }
    }

    fn command(&self, sample: &[Constant]) -> Result<Command> {
        let (file, _, property) = self.model.require()?;
        let mut cmd = Command::new(self.model.program_or(DEFAULT_PROGRAM));
        cmd.arg(file).arg("-pf").arg(property);

        let constants: Vec<Constant> = self
            .model
            .constants
            .iter()
            .chain(sample)
            .cloned()
            .collect();
        if !constants.is_empty() {
            cmd.arg("-const").arg(format_assignment(&constants));
        }

        cmd.args(["-sim", "-simmethod", self.smc.method.as_str()]);
        if let Some(approx) = self.smc.approx {
            cmd.arg("-simapprox").arg(approx.to_string());
        }
        if let Some(conf) = self.smc.conf {
            cmd.arg("-simconf").arg(conf.to_string());
        }
        if let Some(pathlen) = self.smc.pathlen {
            cmd.arg("-simpathlen").arg(pathlen.to_string());
        }
        if let Some(samples) = self.smc.samples {
            cmd.arg("-simsamples").arg(samples.to_string());
        }

        cmd.args(&self.model.options)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl BatchOracle for PrismSmcOracle {
    fn name(&self) -> &'static str {
        "prismsmc"
    }

    async fn check(&self, requests: &Requests) -> Result<Answers> {
        self.model.require()?;
        info!(
            requests = requests.len(),
            method = self.smc.method.as_str(),
            "Calling statistical model checker"
        );

        let mut answers = Answers::new();
        for (&id, sample) in requests {
            let cmd = self.command(sample)?;
            let result =
                bounded(self.model.timeout, run_cli(id, cmd, PRISM_RESULT_MARKER)).await?;
            answers.insert(id, result);
        }
        Ok(answers)
    }
}
