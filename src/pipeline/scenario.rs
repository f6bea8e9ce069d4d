//! Scenario pipeline.
//!
//! Pipeline flow:
//! Parameters → Samples → Oracle Pool → LP (min λ) → Fitted Template

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::algebra::{build_template, TemplateFunction, VariableRegistry};
use crate::lp::{LinearProgram, LpSolver, Sense, LAMBDA};
use crate::models::{Config, Constant, OracleResult, Parameter, Range, Result, Sample};
use crate::pool::OraclePool;
use crate::sampling::SamplePlan;

/// What `stats` prints; no oracle is involved.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioStatistics {
    pub epsilon: f64,
    pub eta: f64,
    pub lambda: Option<Decimal>,
    pub degree: Option<u32>,
    pub template: Option<String>,
    pub parameters: usize,
    pub random_samples: usize,
    pub total_samples: usize,
    pub coefficients: usize,
}

impl fmt::Display for ScenarioStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Value of ε: {}", self.epsilon)?;
        writeln!(f, "Value of η: {}", self.eta)?;
        writeln!(f, "λ is unbounded: {}", self.lambda.is_none())?;
        if let Some(lambda) = self.lambda {
            writeln!(f, "Value of λ: {lambda}")?;
        }
        match (&self.template, self.degree) {
            (Some(template), _) => writeln!(f, "Template function: {template}")?,
            (None, Some(degree)) => writeln!(f, "Degree of the polynomial: {degree}")?,
            (None, None) => {}
        }
        writeln!(f, "Number of parameters: {}", self.parameters)?;
        writeln!(f, "Number of random samples: {}", self.random_samples)?;
        writeln!(f, "Number of total samples: {}", self.total_samples)?;
        write!(
            f,
            "Number of template function coefficients: {}",
            self.coefficients
        )
    }
}

/// How a scenario run ended. None of these are errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Approximated {
        lambda: Decimal,
        expression: String,
        coefficients: BTreeMap<String, Decimal>,
    },
    /// Some sample evaluated to infinity; the LP was not built.
    NotComputed { sample: Vec<Constant> },
    /// The LP backend found no solution.
    Failed { property: String },
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approximated {
                lambda, expression, ..
            } => write!(
                f,
                "Value of λ: {}\nApproximated function: {expression}",
                lambda.normalize()
            ),
            Self::NotComputed { .. } => {
                write!(f, "Value of λ: not computed\nApproximated function: infinity")
            }
            Self::Failed { property } => {
                write!(f, "Failed to approximate the function for {property}")
            }
        }
    }
}

/// Outcome plus what was observed on the way.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub outcome: ScenarioOutcome,
    pub range: Option<Range>,
    pub samples: usize,
    pub runtime_secs: f64,
}

/// Scenario approach over one configuration.
pub struct ScenarioPipeline {
    config: Config,
    parameters: Vec<Parameter>,
    template: Arc<dyn TemplateFunction>,
    plan: SamplePlan,
}

impl ScenarioPipeline {
    /// Build the template and sample plan; fails before any oracle call.
    pub fn new(config: Config) -> Result<Self> {
        let parameters = config.parameter_space()?;
        let registry = VariableRegistry::from_parameters(&parameters)?;
        let template = build_template(&config.scenario, registry, &config.constants())?;
        // λ is a decision variable too.
        let plan = SamplePlan::new(
            &config.scenario,
            parameters.len(),
            template.coefficients().len() + 1,
        )?;
        info!(
            parameters = parameters.len(),
            coefficients = template.coefficients().len(),
            samples = plan.total(),
            "Scenario pipeline ready"
        );
        Ok(Self {
            config,
            parameters,
            template,
            plan,
        })
    }

    pub fn template(&self) -> &dyn TemplateFunction {
        self.template.as_ref()
    }

    pub fn plan(&self) -> SamplePlan {
        self.plan
    }

    pub fn statistics(&self) -> ScenarioStatistics {
        let scenario = &self.config.scenario;
        ScenarioStatistics {
            epsilon: scenario.epsilon,
            eta: scenario.eta,
            lambda: scenario.lambda,
            degree: scenario.template.is_none().then_some(scenario.degree),
            template: scenario.template.clone(),
            parameters: self.parameters.len(),
            random_samples: self.plan.requested,
            total_samples: self.plan.total(),
            coefficients: self.template.coefficients().len(),
        }
    }

    /// The samples a run draws; identical across calls when a seed is set.
    pub fn samples(&self) -> Result<Vec<Sample>> {
        let mut rng = match self.config.scenario.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.plan
            .generate(&mut rng, &self.parameters, self.config.scenario.boundary_points)
    }

    fn property(&self) -> String {
        self.config
            .model
            .property
            .clone()
            .or_else(|| self.config.oracle.expression.clone())
            .unwrap_or_default()
    }

    /// Sample, check, fit.
    pub async fn run(&self, pool: &OraclePool, solver: &dyn LpSolver) -> Result<ScenarioReport> {
        let start = Instant::now();
        let samples = self.samples()?;
        info!(samples = samples.len(), workers = pool.size(), "Calling model checker");

        let checked = pool.run(&samples).await?;
        if let Some(range) = &checked.range {
            info!(lower = %range.lower.value, upper = %range.upper.value, "Computed range");
        }

        let report = |outcome| ScenarioReport {
            outcome,
            range: checked.range.clone(),
            samples: samples.len(),
            runtime_secs: start.elapsed().as_secs_f64(),
        };

        // Any infinite value voids the fit.
        let mut observations = Vec::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            match checked.answers.get(&i) {
                Some(OracleResult::Finite(y)) => observations.push((sample, *y)),
                _ => {
                    warn!(sample = %sample, "Infinite model checking result");
                    return Ok(report(ScenarioOutcome::NotComputed {
                        sample: sample.to_constants(),
                    }));
                }
            }
        }

        let mut lp = LinearProgram::new(self.config.lp.scaling, self.config.lp.precision)?
            .set_variables(self.config.scenario.lambda, &self.template.coefficients())?
            .minimize_lambda()?;
        for (sample, y) in observations {
            let terms = self.template.evaluate(sample)?;

            let mut upper = terms.clone();
            upper.insert(LAMBDA.to_string(), Decimal::ONE);
            lp.add_constraint(&upper, Sense::Ge, y)?;

            let mut lower = terms;
            lower.insert(LAMBDA.to_string(), Decimal::NEGATIVE_ONE);
            lp.add_constraint(&lower, Sense::Le, y)?;
        }

        let Some(solution) = lp.solve(solver).await? else {
            let property = self.property();
            warn!(property = %property, "Failed to approximate the function");
            return Ok(report(ScenarioOutcome::Failed { property }));
        };

        let coefficients = solution.coefficients();
        let expression = self
            .template
            .render(&coefficients, self.config.output.format)?;
        info!(lambda = %solution.lambda(), expression = %expression, "Approximation computed");

        Ok(report(ScenarioOutcome::Approximated {
            lambda: solution.lambda(),
            expression,
            coefficients,
        }))
    }
}
