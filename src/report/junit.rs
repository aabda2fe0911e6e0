use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::ParseError;
use crate::models::{
    CaseStatus, FaultDetail, RunResult, RunSummary, SuiteResult, TestCaseResult,
};

/// Parse a JUnit-style XML log into a canonical [`RunResult`].
///
/// A result suite is every `<testsuite>` element that directly contains at
/// least one `<testcase>` child, at any nesting depth. Pure aggregation
/// wrappers are flattened away so each leaf suite is counted exactly once,
/// and the summary sums the declared counters of exactly the leaves found.
pub fn parse(xml: &str) -> Result<RunResult, ParseError> {
    if xml.trim().is_empty() {
        return Err(ParseError::single("report input is empty"));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut diagnostics: Vec<String> = Vec::new();
    let mut stack: Vec<SuiteFrame> = Vec::new();
    // Leaf suites tagged with their document order, so wrappers closing
    // after their children do not reorder the output.
    let mut leaves: Vec<(usize, SuiteResult)> = Vec::new();
    let mut seq = 0usize;
    let mut saw_element = false;

    let mut case: Option<TestCaseResult> = None;
    let mut fault: Option<FaultCapture> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_element = true;
                match e.name().as_ref() {
                    b"testsuite" => {
                        stack.push(SuiteFrame::from_element(&e, seq));
                        seq += 1;
                    }
                    b"testcase" => case = Some(case_from_element(&e)),
                    b"failure" if case.is_some() => {
                        fault = Some(FaultCapture::new(FaultSlot::Failure, &e));
                    }
                    b"error" if case.is_some() => {
                        fault = Some(FaultCapture::new(FaultSlot::Error, &e));
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                saw_element = true;
                match e.name().as_ref() {
                    b"testcase" => {
                        attach_case(&mut stack, case_from_element(&e), &mut diagnostics);
                    }
                    b"failure" => {
                        if let Some(ref mut current) = case {
                            FaultCapture::new(FaultSlot::Failure, &e).apply(current);
                        }
                    }
                    b"error" => {
                        if let Some(ref mut current) = case {
                            FaultCapture::new(FaultSlot::Error, &e).apply(current);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(ref mut capture) = fault {
                    match t.unescape() {
                        Ok(text) => capture.text.push_str(&text),
                        Err(e) => diagnostics.push(e.to_string()),
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(ref mut capture) = fault {
                    capture.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"testsuite" => {
                    if let Some(frame) = stack.pop()
                        && frame.has_cases
                    {
                        leaves.push((frame.order, frame.suite));
                    }
                }
                b"testcase" => {
                    if let Some(done) = case.take() {
                        attach_case(&mut stack, done, &mut diagnostics);
                    }
                }
                b"failure" | b"error" => {
                    if let (Some(capture), Some(ref mut current)) = (fault.take(), case.as_mut()) {
                        capture.apply(current);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                // The reader cannot make progress past a structural error.
                diagnostics.push(e.to_string());
                break;
            }
        }
    }

    if !saw_element {
        diagnostics.push("no XML element found in report input".into());
    }
    if !diagnostics.is_empty() {
        return Err(ParseError::new(diagnostics));
    }

    leaves.sort_by_key(|(order, _)| *order);
    let suites: Vec<SuiteResult> = leaves.into_iter().map(|(_, suite)| suite).collect();

    let mut summary = RunSummary::default();
    for suite in &suites {
        summary.tests += suite.tests;
        summary.assertions += suite.assertions;
        summary.failures += suite.failures;
        summary.errors += suite.errors;
        summary.time += suite.time;
    }

    Ok(RunResult { suites, summary })
}

struct SuiteFrame {
    order: usize,
    suite: SuiteResult,
    has_cases: bool,
}

impl SuiteFrame {
    /// Declared counters are taken verbatim from the element attributes,
    /// never recomputed from the test cases underneath.
    fn from_element(e: &BytesStart, order: usize) -> Self {
        Self {
            order,
            suite: SuiteResult {
                name: attr(e, "name").unwrap_or_default(),
                tests: attr_u64(e, "tests"),
                assertions: attr_u64(e, "assertions"),
                failures: attr_u64(e, "failures"),
                errors: attr_u64(e, "errors"),
                time: attr_f64(e, "time"),
                testcases: Vec::new(),
            },
            has_cases: false,
        }
    }
}

fn case_from_element(e: &BytesStart) -> TestCaseResult {
    TestCaseResult {
        name: attr(e, "name").unwrap_or_default(),
        class: attr(e, "class")
            .or_else(|| attr(e, "classname"))
            .unwrap_or_default(),
        file: attr(e, "file").unwrap_or_default(),
        line: attr_u64(e, "line") as u32,
        assertions: attr_u64(e, "assertions"),
        time: attr_f64(e, "time"),
        status: CaseStatus::Passed,
        failure: None,
        error: None,
    }
}

fn attach_case(
    stack: &mut [SuiteFrame],
    case: TestCaseResult,
    diagnostics: &mut Vec<String>,
) {
    match stack.last_mut() {
        Some(frame) => {
            frame.has_cases = true;
            frame.suite.testcases.push(case);
        }
        None => diagnostics.push(format!(
            "testcase '{}' appears outside any testsuite",
            case.name
        )),
    }
}

#[derive(Clone, Copy)]
enum FaultSlot {
    Failure,
    Error,
}

struct FaultCapture {
    slot: FaultSlot,
    kind: String,
    text: String,
}

impl FaultCapture {
    fn new(slot: FaultSlot, e: &BytesStart) -> Self {
        Self {
            slot,
            kind: attr(e, "type").unwrap_or_default(),
            text: String::new(),
        }
    }

    fn apply(self, case: &mut TestCaseResult) {
        let detail = FaultDetail {
            kind: self.kind,
            message: self.text.trim().to_string(),
        };
        match self.slot {
            FaultSlot::Failure => {
                case.failure = Some(detail);
                // An error child wins over a failure child regardless of
                // which comes first in the document.
                if case.status != CaseStatus::Error {
                    case.status = CaseStatus::Failed;
                }
            }
            FaultSlot::Error => {
                case.error = Some(detail);
                case.status = CaseStatus::Error;
            }
        }
    }
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn attr_u64(e: &BytesStart, name: &str) -> u64 {
    attr(e, name).and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn attr_f64(e: &BytesStart, name: &str) -> f64 {
    attr(e, name).and_then(|v| v.parse().ok()).unwrap_or(0.0)
}
