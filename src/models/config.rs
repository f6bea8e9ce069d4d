//! Configuration models for pacfit.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use super::{Constant, Parameter};

/// Top-level configuration for pacfit.
///
/// I^R resolved: All configurable parameters are explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which strategy `run` executes
    #[serde(default)]
    pub strategy: Strategy,

    /// Model under analysis
    #[serde(default)]
    pub model: ModelConfig,

    /// Optimised parameters (`[[parameters]]` tables)
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,

    /// Model-checker backend
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Scenario approach settings
    #[serde(default)]
    pub scenario: ScenarioConfig,

    /// Linear programming backend
    #[serde(default)]
    pub lp: LpConfig,

    /// Direct optimisation settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Analysis strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fit a template function with PAC guarantees
    #[default]
    Scenario,
    /// Search for the optimum with AdaptLIPO
    Direct,
}

/// Model description, forwarded to the oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model file
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Modelling language of `file`
    #[serde(rename = "type", default)]
    pub model_type: ModelType,

    /// Property formula
    #[serde(default)]
    pub property: Option<String>,

    /// Fixed model constants (not optimised)
    #[serde(default)]
    pub constants: BTreeMap<String, toml::Value>,
}

/// Supported model languages.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Prism,
    Jani,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prism => "prism",
            Self::Jani => "jani",
        }
    }
}

/// One optimised parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    pub lower: Decimal,
    pub upper: Decimal,
}

/// Oracle backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Backend kind
    #[serde(default)]
    pub backend: OracleBackend,

    /// Program to execute (defaults to the backend's executable name)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Extra arguments passed through to the program
    #[serde(default)]
    pub options: Vec<String>,

    /// Number of parallel oracle workers
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Per-invocation timeout in seconds (none = wait forever)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Closed-form function evaluated by the synthetic backend
    #[serde(default)]
    pub expression: Option<String>,

    /// Simulation settings of the `prismsmc` backend
    #[serde(default)]
    pub smc: SmcConfig,
}

fn default_threads() -> usize {
    1
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::default(),
            path: None,
            options: Vec::new(),
            threads: default_threads(),
            timeout_secs: None,
            expression: None,
            smc: SmcConfig::default(),
        }
    }
}

/// Oracle backend kinds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    /// Line-protocol wrapper around the model checker library
    #[default]
    Wrapper,
    /// One model checker CLI invocation per sample
    Storm,
    /// Line-protocol wrapper around the statistical engine (prism models only)
    Stormsmcc,
    /// One statistical PRISM run (`-sim`) per sample
    Prismsmc,
    /// In-process closed-form expression
    Synthetic,
}

/// Statistical model checking parameters, passed to PRISM as `-sim*` flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SmcConfig {
    /// Simulation engine
    #[serde(default)]
    pub method: SmcMethod,

    /// `-simapprox`, strictly between 0 and 1
    #[serde(default)]
    pub approx: Option<f64>,

    /// `-simconf`, strictly between 0 and 1
    #[serde(default)]
    pub conf: Option<f64>,

    /// `-simpathlen`, at least 1
    #[serde(default)]
    pub pathlen: Option<u64>,

    /// `-simsamples`, at least 1
    #[serde(default)]
    pub samples: Option<u64>,
}

/// PRISM simulation engines.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmcMethod {
    Aci,
    #[default]
    Apmc,
    Ci,
    Sprt,
}

impl SmcMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aci => "aci",
            Self::Apmc => "apmc",
            Self::Ci => "ci",
            Self::Sprt => "sprt",
        }
    }
}

/// Scenario approach configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Error rate ε
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Confidence η
    #[serde(default = "default_eta")]
    pub eta: f64,

    /// Upper bound on the margin λ (none = unbounded)
    #[serde(default)]
    pub lambda: Option<Decimal>,

    /// Polynomial degree
    #[serde(default = "default_degree")]
    pub degree: u32,

    /// Comma-separated template terms; replaces the polynomial when set
    #[serde(default)]
    pub template: Option<String>,

    /// Explicit number of samples (none = PAC bound)
    #[serde(default)]
    pub samples: Option<usize>,

    /// How hyper-rectangle vertices enter the sample set
    #[serde(default)]
    pub vertices: VertexMode,

    /// Additional points per axis between the bounds
    #[serde(default)]
    pub boundary_points: usize,

    /// Random seed (none = entropy)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Print the observed oracle range
    #[serde(default)]
    pub show_range: bool,
}

fn default_epsilon() -> f64 {
    0.05
}

fn default_eta() -> f64 {
    0.05
}

fn default_degree() -> u32 {
    2
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            eta: default_eta(),
            lambda: None,
            degree: default_degree(),
            template: None,
            samples: None,
            vertices: VertexMode::default(),
            boundary_points: 0,
            seed: None,
            show_range: false,
        }
    }
}

/// Treatment of vertex samples.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VertexMode {
    /// Random samples only
    #[default]
    None,
    /// Vertices count towards the total sample budget
    Replace,
    /// Vertices are added on top of the budget
    Additive,
}

/// LP backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpConfig {
    #[serde(default)]
    pub solver: LpBackend,

    /// Values with magnitude at or below this are reported as zero
    #[serde(default = "default_precision")]
    pub precision: Decimal,

    /// Constraint rows are multiplied by 10^scaling
    #[serde(default)]
    pub scaling: u32,

    /// Octave executable for the `octave` solver
    #[serde(default)]
    pub octave_path: Option<PathBuf>,
}

fn default_precision() -> Decimal {
    Decimal::new(1, 9)
}

impl Default for LpConfig {
    fn default() -> Self {
        Self {
            solver: LpBackend::default(),
            precision: default_precision(),
            scaling: 0,
            octave_path: None,
        }
    }
}

/// LP solver kinds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LpBackend {
    /// Built-in simplex on the dual problem
    #[default]
    Simplex,
    /// GLPK through Octave
    Octave,
}

/// Direct search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub direction: Direction,

    /// Exploration probability p
    #[serde(default = "default_exploration")]
    pub exploration: f64,

    /// Cap on rejected candidates per exploitation step
    #[serde(default = "default_exploitation_limit")]
    pub exploitation_limit: usize,

    /// Stop after this many oracle queries
    #[serde(default)]
    pub iteration_limit: Option<usize>,

    /// Stop when |v* - v2| falls below this
    #[serde(default)]
    pub value_absolute: Option<f64>,

    /// Stop when |(v* - v2) / v*| falls below this
    #[serde(default)]
    pub value_relative: Option<f64>,

    /// Stop when ||x* - x2|| falls below this
    #[serde(default)]
    pub parameters_absolute: Option<f64>,

    /// Stop when ||x* - x2|| / ||x*|| falls below this
    #[serde(default)]
    pub parameters_relative: Option<f64>,

    /// Random seed (none = entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_exploration() -> f64 {
    0.1
}

fn default_exploitation_limit() -> usize {
    1000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            direction: Direction::default(),
            exploration: default_exploration(),
            exploitation_limit: default_exploitation_limit(),
            iteration_limit: None,
            value_absolute: None,
            value_relative: None,
            parameters_absolute: None,
            parameters_relative: None,
            seed: None,
        }
    }
}

impl SearchConfig {
    /// Whether any stopping criterion was configured explicitly.
    pub fn has_stopping_criterion(&self) -> bool {
        self.iteration_limit.is_some()
            || self.value_absolute.is_some()
            || self.value_relative.is_some()
            || self.parameters_absolute.is_some()
            || self.parameters_relative.is_some()
    }
}

/// Optimisation direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Min,
    Max,
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Syntax of the printed approximation
    #[serde(default)]
    pub format: ExpressionFormat,

    /// Optional JSON report path
    #[serde(default)]
    pub report: Option<PathBuf>,
}

/// Pretty-printer syntax.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionFormat {
    Latex,
    #[default]
    Math,
    Matlab,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check every option against its admissible range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.parameters.is_empty() {
            return invalid("at least one [[parameters]] entry is required".to_string());
        }
        let identifier = regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| ConfigError::Invalid(format!("identifier pattern: {e}")))?;
        let mut seen = HashSet::new();
        for p in &self.parameters {
            if !identifier.is_match(&p.name) {
                return invalid(format!("'{}' is not a valid parameter name", p.name));
            }
            if !seen.insert(p.name.as_str()) {
                return invalid(format!("parameter '{}' declared twice", p.name));
            }
            if p.lower >= p.upper {
                return invalid(format!(
                    "parameter '{}': lower bound {} must be below upper bound {}",
                    p.name, p.lower, p.upper
                ));
            }
            if self.model.constants.contains_key(&p.name) {
                return invalid(format!(
                    "'{}' is both a parameter and a model constant",
                    p.name
                ));
            }
        }

        if let Some(name) = self
            .model
            .constants
            .keys()
            .find(|name| !identifier.is_match(name))
        {
            return invalid(format!("'{name}' is not a valid constant name"));
        }

        let s = &self.scenario;
        if !(s.epsilon > 0.0 && s.epsilon < 1.0) {
            return invalid(format!("epsilon must be in (0, 1), got {}", s.epsilon));
        }
        if !(s.eta > 0.0 && s.eta < 1.0) {
            return invalid(format!("eta must be in (0, 1), got {}", s.eta));
        }
        if let Some(lambda) = s.lambda {
            if lambda.is_sign_negative() {
                return invalid(format!("lambda must be non-negative, got {lambda}"));
            }
        }
        if s.samples == Some(0) {
            return invalid("samples must be positive".to_string());
        }

        if self.oracle.threads == 0 {
            return invalid("oracle.threads must be at least 1".to_string());
        }
        if self.oracle.timeout_secs == Some(0) {
            return invalid("oracle.timeout_secs must be positive".to_string());
        }
        match self.oracle.backend {
            OracleBackend::Synthetic => {
                if self.oracle.expression.is_none() {
                    return invalid("the synthetic oracle needs oracle.expression".to_string());
                }
            }
            OracleBackend::Wrapper
            | OracleBackend::Storm
            | OracleBackend::Stormsmcc
            | OracleBackend::Prismsmc => {
                if self.model.file.is_none() {
                    return invalid("model.file is required".to_string());
                }
                if self.model.property.is_none() {
                    return invalid("model.property is required".to_string());
                }
            }
        }
        if self.oracle.backend == OracleBackend::Stormsmcc
            && self.model.model_type != ModelType::Prism
        {
            return invalid("the stormsmcc backend only supports prism models".to_string());
        }
        let smc = &self.oracle.smc;
        for (name, value) in [("approx", smc.approx), ("conf", smc.conf)] {
            if let Some(value) = value {
                if !(value > 0.0 && value < 1.0) {
                    return invalid(format!(
                        "oracle.smc.{name} must be strictly between 0 and 1, got {value}"
                    ));
                }
            }
        }
        for (name, value) in [("pathlen", smc.pathlen), ("samples", smc.samples)] {
            if value == Some(0) {
                return invalid(format!("oracle.smc.{name} must be at least 1"));
            }
        }

        if self.lp.precision.is_sign_negative() {
            return invalid("lp.precision must be non-negative".to_string());
        }
        if self.lp.scaling > 20 {
            return invalid(format!("lp.scaling {} is too large", self.lp.scaling));
        }

        let q = &self.search;
        if !(0.0..=1.0).contains(&q.exploration) {
            return invalid(format!(
                "search.exploration must be in [0, 1], got {}",
                q.exploration
            ));
        }
        if q.iteration_limit == Some(0) {
            return invalid("search.iteration_limit must be positive".to_string());
        }
        for (name, value) in [
            ("value_absolute", q.value_absolute),
            ("value_relative", q.value_relative),
            ("parameters_absolute", q.parameters_absolute),
            ("parameters_relative", q.parameters_relative),
        ] {
            if value.is_some_and(|v| v.is_nan() || v < 0.0) {
                return invalid(format!("search.{name} must be non-negative"));
            }
        }

        Ok(())
    }

    /// Declared parameters as validated domain objects.
    pub fn parameter_space(&self) -> crate::models::Result<Vec<Parameter>> {
        self.parameters
            .iter()
            .map(|p| Parameter::new(p.name.clone(), p.lower, p.upper))
            .collect()
    }

    /// Model constants, sorted by name.
    pub fn constants(&self) -> Vec<Constant> {
        self.model
            .constants
            .iter()
            .map(|(name, value)| Constant::new(name.clone(), constant_text(value)))
            .collect()
    }
}

fn constant_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Values outside their admissible range
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
