pub mod catalog;
pub mod coverage;
pub mod result;

pub use catalog::{Suite, TestCatalog, TestMethod};
pub use coverage::{CoverageReport, FileCoverage};
pub use result::{CaseStatus, FaultDetail, RunResult, RunSummary, SuiteResult, TestCaseResult};
