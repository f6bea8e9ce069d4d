//! JSON run report.
//!
//! Epistemic foundation:
//! - K_i: The report is written atomically (write-then-rename)
//! - B_i: Exactly one of `scenario` / `direct` is present for a finished run

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::debug;

use super::{DirectReport, ScenarioReport, ScenarioStatistics};
use crate::models::{PacError, Result, Strategy};

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<ScenarioStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct: Option<DirectReport>,
}

impl RunReport {
    pub fn scenario(statistics: ScenarioStatistics, report: ScenarioReport) -> Self {
        Self {
            generated_at: Utc::now(),
            strategy: Strategy::Scenario,
            statistics: Some(statistics),
            scenario: Some(report),
            direct: None,
        }
    }

    pub fn direct(report: DirectReport) -> Self {
        Self {
            generated_at: Utc::now(),
            strategy: Strategy::Direct,
            statistics: None,
            scenario: None,
            direct: Some(report),
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PacError::io(format!("creating {}", parent.display()), e))?;
        }

        let temp_path = path.with_extension("tmp.json");
        let file = File::create(&temp_path)
            .map_err(|e| PacError::io("creating temp report", e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| PacError::Internal(format!("Serializing report: {e}")))?;

        fs::rename(&temp_path, path).map_err(|e| PacError::io("renaming report", e))?;

        debug!(path = %path.display(), "Report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Constant, Direction};
    use crate::search::SearchOutcome;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[test]
    fn direct_report_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");

        let report = RunReport::direct(DirectReport {
            direction: Direction::Max,
            outcome: SearchOutcome::Optimum {
                value: dec!(0.75),
                point: vec![Constant::new("p", "0.5")],
                iteration: 4,
                evaluations: 10,
            },
            runtime_secs: 0.5,
        });
        report.write_json(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["strategy"], "direct");
        assert_eq!(json["direct"]["outcome"]["kind"], "optimum");
        assert_eq!(json["direct"]["outcome"]["iteration"], 4);
        assert!(json.get("scenario").is_none());
        assert!(!path.with_extension("tmp.json").exists());
    }
}
