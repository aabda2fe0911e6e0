use serde::Serialize;

/// Coverage for a single source file, as a percentage of covered statements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileCoverage {
    pub path: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub files: Vec<FileCoverage>,
    pub total_percent: f64,
}
