//! End-to-end pipeline: discover a fixture project, execute a stub runner
//! that writes a JUnit log, and parse the log into a canonical result.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use beacon::discovery;
use beacon::report;
use beacon::runner::{PhpunitRunner, RunRequest, RunnerEvent};

const PHPUNIT_XML: &str = r#"<?xml version="1.0"?>
<phpunit>
  <testsuites>
    <testsuite name="unit">
      <directory>tests</directory>
    </testsuite>
  </testsuites>
</phpunit>
"#;

const CALCULATOR_TEST: &str = r#"<?php
namespace App\Tests;
use PHPUnit\Framework\TestCase;
final class CalculatorTest extends TestCase
{
    public function testAdd(): void {}
    public function testSubtract(): void {}
}
"#;

const JUNIT_LOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="App\Tests\CalculatorTest" tests="2" assertions="2" failures="0" errors="0" time="0.021">
    <testcase name="testAdd" class="App\Tests\CalculatorTest" assertions="1" time="0.01"/>
    <testcase name="testSubtract" class="App\Tests\CalculatorTest" assertions="1" time="0.011"/>
  </testsuite>
</testsuites>
"#;

fn write_fixture_project(root: &Path) {
    fs::create_dir_all(root.join("tests")).unwrap();
    fs::write(root.join("phpunit.xml"), PHPUNIT_XML).unwrap();
    fs::write(root.join("tests/CalculatorTest.php"), CALCULATOR_TEST).unwrap();
}

/// A stand-in for phpunit: echoes its argv, then writes the JUnit log to
/// whatever path followed `--log-junit`.
fn write_stub_runner(root: &Path, log_xml: &str) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
echo "args: $@"
log=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--log-junit" ]; then log="$arg"; fi
  prev="$arg"
done
cat > "$log" <<'JUNIT'
{log_xml}JUNIT
"#
    );
    let path = root.join("phpunit-stub");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn discovery_execution_and_parsing_agree() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_fixture_project(root);

    // Discovery: one suite with both methods, in declaration order.
    let catalog = discovery::discover(root);
    assert_eq!(catalog.suites.len(), 1);
    let suite = &catalog.suites[0];
    assert_eq!(suite.id, "App\\Tests\\CalculatorTest");
    let names: Vec<&str> = suite.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["testAdd", "testSubtract"]);

    // Execution: run filtered to the discovered suite through the stub.
    let binary = write_stub_runner(root, JUNIT_LOG);
    let runner = PhpunitRunner::with_binary(root.to_path_buf(), binary);
    let log_path = root.join("junit-log.xml");

    let mut request = RunRequest::default();
    request.suites.insert("unit".to_string());
    let mut handle = runner.run(&log_path, &request).unwrap();

    let mut stdout_lines = Vec::new();
    while let Some(event) = handle.next_event().await {
        if let RunnerEvent::Stdout(line) = event {
            stdout_lines.push(line);
        }
    }
    let status = handle.wait().await.unwrap();
    assert!(status.success());

    // The stub saw the scoped suite-selection argument.
    assert!(
        stdout_lines
            .iter()
            .any(|line| line.contains("--testsuite unit")),
        "stub argv: {stdout_lines:?}"
    );

    // Parsing: the written log round-trips into the canonical result.
    let xml = fs::read_to_string(&log_path).unwrap();
    let result = report::junit::parse(&xml).unwrap();
    assert_eq!(result.summary.tests, 2);
    assert_eq!(result.summary.assertions, 2);
    assert_eq!(result.suites[0].testcases.len(), 2);
}

#[tokio::test]
async fn cancellation_kills_the_runner() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let script = "#!/bin/sh\nsleep 30\n";
    let binary = root.join("slow-runner");
    fs::write(&binary, script).unwrap();
    fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();

    let runner = PhpunitRunner::with_binary(root.to_path_buf(), binary);
    let mut handle = runner
        .run(&root.join("never-written.xml"), &RunRequest::default())
        .unwrap();

    handle.kill();
    let status = handle.wait().await.unwrap();
    assert!(!status.success());
}
