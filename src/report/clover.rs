use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::ParseError;
use crate::models::{CoverageReport, FileCoverage};

/// Parse a Clover-style coverage XML document, keeping only files that live
/// under one of the project's included source directories.
///
/// Per-file coverage is covered statements over total statements; the
/// aggregate percentage is computed over the statement totals of the
/// included files, not averaged per file.
pub fn parse(xml: &str, included_dirs: &[String]) -> Result<CoverageReport, ParseError> {
    if xml.trim().is_empty() {
        return Err(ParseError::single("coverage input is empty"));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut diagnostics: Vec<String> = Vec::new();
    let mut saw_element = false;
    let mut current_file: Option<String> = None;

    let mut tally = Tally::default();

    loop {
        match reader.read_event() {
            // <metrics> appears both self-closing and as a start/end pair;
            // the attributes carry everything either way.
            Ok(Event::Start(e)) => {
                saw_element = true;
                match e.name().as_ref() {
                    b"file" => current_file = attr(&e, "name"),
                    b"metrics" => tally.record(&e, current_file.as_deref(), included_dirs),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                saw_element = true;
                match e.name().as_ref() {
                    b"file" => current_file = None,
                    b"metrics" => tally.record(&e, current_file.as_deref(), included_dirs),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"file" {
                    current_file = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                diagnostics.push(e.to_string());
                break;
            }
        }
    }

    if !saw_element {
        diagnostics.push("no XML element found in coverage input".into());
    }
    if !diagnostics.is_empty() {
        return Err(ParseError::new(diagnostics));
    }

    Ok(CoverageReport {
        files: tally.files,
        total_percent: percent(tally.covered, tally.statements),
    })
}

/// Running totals over the included files seen so far.
#[derive(Default)]
struct Tally {
    files: Vec<FileCoverage>,
    statements: u64,
    covered: u64,
}

impl Tally {
    fn record(&mut self, e: &BytesStart, current_file: Option<&str>, included_dirs: &[String]) {
        let Some(path) = current_file else { return };
        if !is_included(path, included_dirs) {
            return;
        }
        let statements = attr_u64(e, "statements");
        let covered = attr_u64(e, "coveredstatements");
        self.statements += statements;
        self.covered += covered;
        self.files.push(FileCoverage {
            path: path.to_string(),
            percent: percent(covered, statements),
        });
    }
}

fn is_included(path: &str, included_dirs: &[String]) -> bool {
    included_dirs
        .iter()
        .any(|dir| Path::new(path).starts_with(dir))
}

fn percent(covered: u64, total: u64) -> f64 {
    if total == 0 {
        // A file with nothing to cover counts as fully covered, matching
        // how Clover consumers report empty metrics blocks.
        100.0
    } else {
        covered as f64 / total as f64 * 100.0
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<coverage generated="1724800000">
  <project timestamp="1724800000">
    <package name="App">
      <file name="/app/src/Calculator.php">
        <metrics loc="40" statements="10" coveredstatements="7"/>
      </file>
      <file name="/app/src/Greeter.php">
        <metrics loc="12" statements="4" coveredstatements="4"/>
      </file>
      <file name="/app/lib/Thirdparty.php">
        <metrics loc="200" statements="50" coveredstatements="0"/>
      </file>
    </package>
    <metrics files="3" statements="64" coveredstatements="11"/>
  </project>
</coverage>
"#;

    #[test]
    fn cross_references_included_directories() {
        let report = parse(REPORT, &["/app/src".to_string()]).unwrap();

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].path, "/app/src/Calculator.php");
        assert_eq!(report.files[0].percent, 70.0);
        assert_eq!(report.files[1].percent, 100.0);
        // 11 of 14 included statements, not the project-wide totals.
        assert!((report.total_percent - 11.0 / 14.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn no_included_files_yields_fully_covered_nothing() {
        let report = parse(REPORT, &["/elsewhere".to_string()]).unwrap();

        assert_eq!(report.files.len(), 0);
        assert_eq!(report.total_percent, 100.0);
    }

    #[test]
    fn metrics_with_explicit_end_tag_are_counted() {
        let xml = r#"<coverage>
  <project>
    <package name="App">
      <file name="/app/src/Calculator.php">
        <metrics loc="40" statements="10" coveredstatements="7"></metrics>
      </file>
      <metrics files="1" statements="10" coveredstatements="7"></metrics>
    </package>
  </project>
</coverage>
"#;
        let report = parse(xml, &["/app/src".to_string()]).unwrap();

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].path, "/app/src/Calculator.php");
        assert_eq!(report.files[0].percent, 70.0);
        assert_eq!(report.total_percent, 70.0);
    }

    #[test]
    fn empty_input_fails() {
        assert!(parse("", &[]).is_err());
        assert!(parse("  \n ", &[]).is_err());
    }

    #[test]
    fn malformed_input_fails() {
        assert!(parse("<coverage><project></coverage>", &[]).is_err());
        assert!(parse("plain text", &[]).is_err());
    }
}
