//! GLPK through Octave.
//!
//! The problem is written to scratch files, Octave runs `glpk` on them and
//! prints three tagged lines: `errnum:`, `extra.status:` and `opt_var:`.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{LpProblem, LpSolver, Sense};
use crate::models::{Direction, PacError, Result};

const DEFAULT_PROGRAM: &str = "octave";

/// GLPK statuses accepted as a solution: feasible (2) and optimal (5).
const ACCEPTED_STATUS: [&str; 2] = ["2", "5"];

#[derive(Debug, Clone)]
pub struct OctaveSolver {
    program: PathBuf,
}

impl OctaveSolver {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self {
            program: program.unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM)),
        }
    }
}

fn column(values: impl Iterator<Item = String>) -> String {
    values.collect::<Vec<_>>().join(";")
}

fn bound(value: Option<Decimal>, infinity: &str) -> String {
    value.map_or_else(|| infinity.to_string(), |v| v.normalize().to_string())
}

/// Write the data files and return the script path.
async fn write_problem(problem: &LpProblem, dir: &Path) -> Result<PathBuf> {
    let matrix_path = dir.join("lpproblemMatrixA.dat");
    let vector_path = dir.join("lpproblemVectorB.dat");
    let ctype_path = dir.join("lpproblemCtype.dat");
    let script_path = dir.join("lpproblem.m");

    let mut matrix = String::new();
    let mut vector = String::new();
    let mut ctype = String::new();
    for row in &problem.rows {
        let entries: Vec<String> = row.coefficients.iter().map(|c| c.normalize().to_string()).collect();
        matrix.push_str(&entries.join(","));
        matrix.push('\n');
        vector.push_str(&row.bound.normalize().to_string());
        vector.push('\n');
        ctype.push(match row.sense {
            Sense::Ge => 'L',
            Sense::Le => 'U',
        });
    }

    let sense = match problem.direction {
        Direction::Min => 1,
        Direction::Max => -1,
    };
    let objective: Vec<String> = problem.objective.iter().map(|c| c.normalize().to_string()).collect();

    let script = format!(
        "format long;\n\
         function str = myfun(vec)\n\tstr = sprintf(',%.20f',vec);\n\tstr = str(2:end);\nend\n\
         sense = {sense};\n\
         c = [{objective}];\n\
         A = load('{matrix}');\n\
         b = load('{vector}');\n\
         ctype = fileread('{ctype}');\n\
         vartype = \"{vartype}\";\n\
         lb = [{lb}];\n\
         ub = [{ub}];\n\
         param.msglev=0;\nparam.lpsolver=1;\n\
         [opt_var, opt_value, errnum, extra] = glpk (c, A, b, lb, ub, ctype, vartype, sense, param);\n\
         fprintf('errnum:%d\\n', errnum);\n\
         fprintf('extra.status:%d\\n', extra.status);\n\
         fprintf('opt_var:%s\\n', myfun(opt_var));\n",
        objective = objective.join(","),
        matrix = matrix_path.display(),
        vector = vector_path.display(),
        ctype = ctype_path.display(),
        vartype = "C".repeat(problem.variables.len()),
        lb = column(problem.bounds.iter().map(|b| bound(b.lower, "-Inf"))),
        ub = column(problem.bounds.iter().map(|b| bound(b.upper, "Inf"))),
    );

    for (path, content) in [
        (&matrix_path, matrix),
        (&vector_path, vector),
        (&ctype_path, ctype),
        (&script_path, script),
    ] {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| PacError::io("writing LP scratch file", e))?;
    }
    Ok(script_path)
}

fn tagged<'a>(output: &'a str, tag: &str) -> Option<&'a str> {
    output
        .lines()
        .find_map(|line| line.strip_prefix(tag)?.strip_prefix(':'))
        .map(str::trim)
}

fn parse_value(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(Decimal::from_f64))
}

/// `None` when GLPK reported an error or a status other than feasible/optimal.
fn parse_output(output: &str, variables: usize) -> Result<Option<Vec<Decimal>>> {
    let (Some(errnum), Some(status)) = (tagged(output, "errnum"), tagged(output, "extra.status"))
    else {
        warn!(output = %output.trim(), "Octave produced no GLPK status");
        return Ok(None);
    };
    if errnum != "0" {
        warn!(errnum, "GLPK reported an error");
        return Ok(None);
    }
    if !ACCEPTED_STATUS.contains(&status) {
        info!(status, "GLPK found no feasible solution");
        return Ok(None);
    }

    let values = tagged(output, "opt_var")
        .ok_or_else(|| PacError::Lp("Octave output has no opt_var line".to_string()))?;
    let values = values
        .split(',')
        .map(|v| {
            parse_value(v.trim())
                .ok_or_else(|| PacError::Lp(format!("unparseable LP value '{v}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    if values.len() != variables {
        return Err(PacError::Lp(format!(
            "Octave returned {} values for {variables} variables",
            values.len()
        )));
    }
    Ok(Some(values))
}

#[async_trait]
impl LpSolver for OctaveSolver {
    fn name(&self) -> &'static str {
        "octave"
    }

    async fn solve(&self, problem: &LpProblem) -> Result<Option<Vec<Decimal>>> {
        let dir = TempDir::new().map_err(|e| PacError::io("creating LP scratch directory", e))?;
        let script = write_problem(problem, dir.path()).await?;

        info!(program = %self.program.display(), "Calling Octave");
        let output = Command::new(&self.program)
            .args([
                "--no-gui",
                "--no-history",
                "--no-window-system",
                "--silent",
                "--no-line-editing",
            ])
            .arg(&script)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PacError::io("running Octave", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(status = %output.status, stdout = %stdout.trim(), "Octave output");
        if !output.status.success() {
            warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Octave failed"
            );
            return Ok(None);
        }
        parse_output(&stdout, problem.variables.len())
    }
}
