pub mod scan;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, warn};

use crate::models::{Suite, TestCatalog, TestMethod};
use scan::ScannedClass;

const DEFAULT_SUFFIX: &str = "Test.php";

/// One `<testsuite>` block from the configuration file.
#[derive(Debug, Default)]
struct SuiteBlock {
    name: String,
    /// (directory, file-name suffix) pairs.
    directories: Vec<(String, String)>,
    files: Vec<String>,
}

/// Discover the project's test catalog by reading its PHPUnit configuration
/// and statically scanning the configured source directories.
///
/// Discovery never executes project code and never fails hard: a missing,
/// unreadable, or malformed configuration yields an empty catalog so the
/// dashboard stays available.
pub fn discover(root: &Path) -> TestCatalog {
    let Some((config_path, content)) = read_config(root) else {
        debug!(root = %root.display(), "no phpunit configuration found");
        return TestCatalog::default();
    };

    let blocks = match parse_config(&content) {
        Some(blocks) => blocks,
        None => {
            warn!(config = %config_path.display(), "unreadable phpunit configuration, returning empty catalog");
            return TestCatalog::default();
        }
    };

    // Scan every candidate file once; the class map spans all blocks so
    // inheritance chains resolve across suite boundaries.
    let mut scanned: HashMap<PathBuf, Vec<ScannedClass>> = HashMap::new();
    let block_files: Vec<Vec<PathBuf>> = blocks
        .iter()
        .map(|block| candidate_files(root, block))
        .collect();

    for path in block_files.iter().flatten() {
        if scanned.contains_key(path) {
            continue;
        }
        let classes = match std::fs::read_to_string(path) {
            Ok(source) => scan::scan_source(&source, path),
            Err(err) => {
                debug!(file = %path.display(), %err, "skipping unreadable source file");
                Vec::new()
            }
        };
        scanned.insert(path.clone(), classes);
    }

    let parents: HashMap<String, Option<String>> = scanned
        .values()
        .flatten()
        .map(|class| (class.fqn.clone(), class.parent.clone()))
        .collect();

    let mut suites: Vec<Suite> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (block, files) in blocks.iter().zip(&block_files) {
        debug!(suite = %block.name, files = files.len(), "scanning suite block");
        for path in files {
            for class in scanned.get(path).into_iter().flatten() {
                if class.is_abstract
                    || !reaches_test_case(&class.fqn, &parents)
                    || !seen.insert(class.fqn.clone())
                {
                    continue;
                }
                suites.push(Suite {
                    id: class.fqn.clone(),
                    name: class.fqn.clone(),
                    methods: class
                        .methods
                        .iter()
                        .map(|(name, line)| TestMethod {
                            name: name.clone(),
                            declaring_class: class.fqn.clone(),
                            file: class.file.clone(),
                            line: *line,
                        })
                        .collect(),
                });
            }
        }
    }

    TestCatalog { suites }
}

/// `phpunit.xml` wins over `phpunit.xml.dist`, matching PHPUnit's lookup.
fn read_config(root: &Path) -> Option<(PathBuf, String)> {
    for name in ["phpunit.xml", "phpunit.xml.dist"] {
        let path = root.join(name);
        if let Ok(content) = std::fs::read_to_string(&path) {
            return Some((path, content));
        }
    }
    None
}

fn parse_config(xml: &str) -> Option<Vec<SuiteBlock>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut blocks: Vec<SuiteBlock> = Vec::new();
    let mut current: Option<SuiteBlock> = None;
    // Set while inside a <directory> or <file> element, waiting on its text.
    let mut pending: Option<(bool, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"testsuite" => {
                    let name = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"name")
                        .and_then(|a| a.unescape_value().ok())
                        .map(|v| v.into_owned())
                        .unwrap_or_default();
                    current = Some(SuiteBlock {
                        name,
                        ..Default::default()
                    });
                }
                b"directory" if current.is_some() => {
                    let suffix = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"suffix")
                        .and_then(|a| a.unescape_value().ok())
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string());
                    pending = Some((true, suffix));
                }
                b"file" if current.is_some() => pending = Some((false, String::new())),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let (Some((is_dir, suffix)), Some(ref mut block)) = (pending.take(), current.as_mut()) {
                    let value = t.unescape().ok()?.trim().to_string();
                    if is_dir {
                        block.directories.push((value, suffix));
                    } else {
                        block.files.push(value);
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"testsuite" => {
                    if let Some(block) = current.take() {
                        blocks.push(block);
                    }
                }
                b"directory" | b"file" => pending = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    Some(blocks)
}

/// Expand a suite block's directory and file entries into concrete paths.
/// Glob results come back sorted, which keeps catalog order stable.
fn candidate_files(root: &Path, block: &SuiteBlock) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();

    for (dir, suffix) in &block.directories {
        let pattern = root
            .join(dir)
            .join(format!("**/*{}", suffix))
            .to_string_lossy()
            .into_owned();
        match glob::glob(&pattern) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if !files.contains(&entry) {
                        files.push(entry);
                    }
                }
            }
            Err(err) => debug!(%pattern, %err, "skipping unreadable suite directory"),
        }
    }

    for file in &block.files {
        let path = root.join(file);
        if path.is_file() && !files.contains(&path) {
            files.push(path);
        }
    }

    files
}

/// Walk the `extends` chain through the scanned class map until a recognized
/// test-case base is reached. Bounded so a cyclic chain cannot spin.
fn reaches_test_case(fqn: &str, parents: &HashMap<String, Option<String>>) -> bool {
    let mut current = fqn.to_string();
    for _ in 0..32 {
        let Some(parent) = parents.get(&current).cloned().flatten() else {
            return false;
        };
        if is_recognized_base(&parent) {
            return true;
        }
        current = parent;
    }
    false
}

/// The scanner resolves parents to fully-qualified names, so both the
/// canonical `PHPUnit\Framework\TestCase` and project-local `TestCase`
/// base classes end with the same final segment.
fn is_recognized_base(name: &str) -> bool {
    name.rsplit('\\').next() == Some("TestCase")
}
