//! Line formats spoken by the model-checker wrappers.
//!
//! Request:  `<id>:<name>=<value>,<name>=<value>...`
//! Response: `<tag>:<id>:<value>` (`inf` = infinite), where the tag names
//! the wrapper (`StormCWrapper_RESULT`, `StormsmcCWrapper_RESULT`).
//! Batch input ends with a line holding `EOF`.

use crate::models::{Constant, OracleResult, PacError, Result};

/// Tag of the exact-engine wrapper.
pub const EXACT_RESULT_TAG: &str = "StormCWrapper_RESULT";
/// Tag of the statistical-engine wrapper.
pub const SMC_RESULT_TAG: &str = "StormsmcCWrapper_RESULT";
pub const EOF_SENTINEL: &str = "EOF";
pub const FIELD_SEPARATOR: char = ':';

/// Marker preceding the value in Storm CLI output.
pub const STORM_RESULT_MARKER: &str = "Result (for initial states):";
/// Marker preceding the value in PRISM CLI output.
pub const PRISM_RESULT_MARKER: &str = "Result:";

/// `a=1,b=2`
pub fn format_assignment(constants: &[Constant]) -> String {
    constants
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// `<id>:a=1,b=2`
pub fn format_request(id: impl std::fmt::Display, constants: &[Constant]) -> String {
    format!("{id}{FIELD_SEPARATOR}{}", format_assignment(constants))
}

/// Parse a result line. `None` when the line does not carry `tag`.
pub fn parse_result_line(tag: &str, line: &str) -> Option<Result<(usize, OracleResult)>> {
    let rest = line.trim_end().strip_prefix(tag)?;
    let rest = rest.strip_prefix(FIELD_SEPARATOR)?;
    Some(parse_fields(line, rest))
}

fn parse_fields(line: &str, rest: &str) -> Result<(usize, OracleResult)> {
    let malformed = || PacError::OracleProtocol(format!("malformed result line '{line}'"));
    let (id, value) = rest.split_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
    let id: usize = id.trim().parse().map_err(|_| malformed())?;
    let value: OracleResult = value.parse().map_err(|_| malformed())?;
    Ok((id, value))
}

/// Extract the value following `marker` from CLI output, if present.
pub fn parse_cli_output(marker: &str, stdout: &str) -> Option<Result<OracleResult>> {
    stdout.lines().find_map(|line| {
        let value = line.trim().strip_prefix(marker)?;
        // `0.25 (approx. 0.25)` keeps the exact leading value.
        let value = value.split_whitespace().next().unwrap_or("");
        Some(value.parse::<OracleResult>().map_err(|_| {
            PacError::OracleProtocol(format!("unparseable result in '{}'", line.trim()))
        }))
    })
}
