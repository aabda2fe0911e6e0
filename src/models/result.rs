use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    #[default]
    Passed,
    Failed,
    Error,
}

/// Type and trimmed message of a `<failure>` or `<error>` child.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultDetail {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCaseResult {
    pub name: String,
    pub class: String,
    pub file: String,
    pub line: u32,
    pub assertions: u64,
    pub time: f64,
    pub status: CaseStatus,
    pub failure: Option<FaultDetail>,
    pub error: Option<FaultDetail>,
}

/// One leaf suite from the JUnit log, counters as declared by the runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteResult {
    pub name: String,
    pub tests: u64,
    pub assertions: u64,
    pub failures: u64,
    pub errors: u64,
    pub time: f64,
    pub testcases: Vec<TestCaseResult>,
}

/// Sums of the declared counters of exactly the leaf suites found,
/// never recomputed from individual test cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub tests: u64,
    pub assertions: u64,
    pub failures: u64,
    pub errors: u64,
    pub time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    pub suites: Vec<SuiteResult>,
    pub summary: RunSummary,
}
