//! Model-checker oracles.
//!
//! Epistemic foundation:
//! - K_i: Two contracts, batch (many labelled requests per call) and
//!   interactive (one request per round-trip on a long-lived process)
//! - B_i: Every external answer may be garbled → Result, fail fast
//! - I^B: A hung process is bounded by the optional spawn-boundary timeout
//! - I^R: Backend, program path and passthrough options come from config

mod interactive;
mod prism;
mod protocol;
mod storm;
mod synthetic;
mod wrapper;

pub use interactive::*;
pub use prism::*;
pub use protocol::*;
pub use storm::*;
pub use synthetic::*;
pub use wrapper::*;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{
    Config, Constant, ModelType, OracleBackend, OracleResult, PacError, Result,
};

/// Request id → per-sample constants.
pub type Requests = BTreeMap<usize, Vec<Constant>>;

/// Request id → oracle answer.
pub type Answers = BTreeMap<usize, OracleResult>;

/// One-shot contract: every request gets exactly one answer, or the call fails.
#[async_trait]
pub trait BatchOracle: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn check(&self, requests: &Requests) -> Result<Answers>;
}

/// Long-lived contract: `start`, any number of `check`, then `stop`.
///
/// K_i: stages only move forward (initialize → started → stopped);
/// calling `check`/`stop` outside `started` is an `OracleState` error.
#[async_trait]
pub trait InteractiveOracle: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn check(&self, sample: &[Constant]) -> Result<OracleResult>;

    async fn stop(&self) -> Result<()>;
}

/// Lifecycle of an interactive oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialize,
    Started,
    Stopped,
}

/// Everything an external model checker needs besides the samples.
#[derive(Debug, Clone, Default)]
pub struct ModelSpec {
    pub file: Option<PathBuf>,
    pub model_type: Option<ModelType>,
    pub property: Option<String>,
    pub constants: Vec<Constant>,
    pub options: Vec<String>,
    /// Program override; each backend has its own default
    pub program: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ModelSpec {
    pub fn from_config(config: &Config) -> Self {
        Self {
            file: config.model.file.clone(),
            model_type: Some(config.model.model_type),
            property: config.model.property.clone(),
            constants: config.constants(),
            options: config.oracle.options.clone(),
            program: config.oracle.path.clone(),
            timeout: config.oracle.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Preconditions checked before any process is spawned.
    pub fn require(&self) -> Result<(&Path, ModelType, &str)> {
        let file = self
            .file
            .as_deref()
            .ok_or_else(|| PacError::OracleState("model file not specified".to_string()))?;
        if std::fs::File::open(file).is_err() {
            return Err(PacError::OracleState(format!(
                "the model file {} cannot be read",
                file.display()
            )));
        }
        let model_type = self
            .model_type
            .ok_or_else(|| PacError::OracleState("model type not specified".to_string()))?;
        let property = self
            .property
            .as_deref()
            .ok_or_else(|| PacError::OracleState("property formula not specified".to_string()))?;
        Ok((file, model_type, property))
    }

    pub(crate) fn program_or<'a>(&'a self, default: &'a str) -> &'a std::ffi::OsStr {
        match &self.program {
            Some(path) => path.as_os_str(),
            None => std::ffi::OsStr::new(default),
        }
    }
}

/// Await `fut`, bounded by `timeout` when one is configured.
pub(crate) async fn bounded<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| PacError::Timeout(limit))?,
        None => fut.await,
    }
}

/// Build one batch oracle for the configured backend.
///
/// The pool calls this once per worker so no two workers share an instance.
pub fn batch_oracle(config: &Config) -> Result<Arc<dyn BatchOracle>> {
    let model = ModelSpec::from_config(config);
    Ok(match config.oracle.backend {
        OracleBackend::Wrapper => Arc::new(WrapperOracle::new(model)),
        OracleBackend::Storm => Arc::new(StormOracle::new(model)),
        OracleBackend::Stormsmcc => Arc::new(WrapperOracle::statistical(model)),
        OracleBackend::Prismsmc => Arc::new(PrismSmcOracle::new(model, config.oracle.smc.clone())),
        OracleBackend::Synthetic => Arc::new(SyntheticOracle::from_config(config)?),
    })
}

/// Build the interactive oracle for the configured backend.
pub fn interactive_oracle(config: &Config) -> Result<Box<dyn InteractiveOracle>> {
    let model = ModelSpec::from_config(config);
    match config.oracle.backend {
        OracleBackend::Wrapper => Ok(Box::new(InteractiveClient::new(model))),
        OracleBackend::Synthetic => Ok(Box::new(SyntheticOracle::from_config(config)?)),
        OracleBackend::Storm | OracleBackend::Stormsmcc | OracleBackend::Prismsmc => {
            Err(PacError::InvalidInput(format!(
                "the {:?} backend has no interactive mode; use backend = \"wrapper\"",
                config.oracle.backend
            )))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Write a POSIX shell script and a dummy model file into `dir`.
    pub fn script(dir: &TempDir, body: &str) -> (PathBuf, PathBuf) {
        let script = dir.path().join("oracle.sh");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(f, "{body}").unwrap();
        let model = dir.path().join("model.pm");
        std::fs::write(&model, "dtmc\n").unwrap();
        (script, model)
    }

    /// Like `script`, but as a directly executable file.
    #[cfg(unix)]
    pub fn executable(dir: &TempDir, body: &str) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let (path, model) = script(dir, &format!("#!/bin/sh\n{body}"));
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (path, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preconditions_fail_before_spawning() {
        let model = ModelSpec::default();
        assert!(matches!(model.require(), Err(PacError::OracleState(_))));

        let model = ModelSpec {
            file: Some(PathBuf::from("/definitely/not/here.pm")),
            model_type: Some(ModelType::Prism),
            property: Some("P=? [F done]".to_string()),
            ..ModelSpec::default()
        };
        let err = model.require().unwrap_err();
        assert!(err.to_string().contains("cannot be read"));
    }

    #[test]
    fn missing_property_is_a_state_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let model = dir.path().join("m.pm");
        std::fs::write(&model, "dtmc").unwrap();
        let model = ModelSpec {
            file: Some(model),
            model_type: Some(ModelType::Jani),
            ..ModelSpec::default()
        };
        assert!(matches!(model.require(), Err(PacError::OracleState(m)) if m.contains("property")));
    }

    #[test]
    fn backends_are_chosen_from_config() {
        let mut config = Config::default();
        config.oracle.backend = OracleBackend::Stormsmcc;
        assert_eq!(batch_oracle(&config).unwrap().name(), "stormsmcc");
        assert!(matches!(
            interactive_oracle(&config),
            Err(PacError::InvalidInput(_))
        ));

        config.oracle.backend = OracleBackend::Prismsmc;
        assert_eq!(batch_oracle(&config).unwrap().name(), "prismsmc");
        assert!(interactive_oracle(&config).is_err());

        config.oracle.backend = OracleBackend::Wrapper;
        assert_eq!(batch_oracle(&config).unwrap().name(), "wrapper");
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let result: Result<()> = bounded(Some(Duration::from_millis(20)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(PacError::Timeout(_))));
    }
}
