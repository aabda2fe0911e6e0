use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// A class declaration found by static inspection of one source file.
/// Nothing here ever executes project code; this is text-level only.
#[derive(Debug, Clone)]
pub struct ScannedClass {
    /// Fully-qualified name (namespace + class name).
    pub fqn: String,
    /// Parent class as a fully-qualified name, resolved through the file's
    /// `use` imports and namespace.
    pub parent: Option<String>,
    pub is_abstract: bool,
    /// Candidate test methods in declaration order, with 1-based lines.
    pub methods: Vec<(String, u32)>,
    pub file: String,
}

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*namespace\s+([\w\\]+)\s*;").unwrap());
static USE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*use\s+([\w\\]+)(?:\s+as\s+(\w+))?\s*;").unwrap());
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*((?:final\s+|abstract\s+|readonly\s+)*)class\s+(\w+)(?:\s+extends\s+([\w\\]+))?")
        .unwrap()
});
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:(public|protected|private)\s+)?(?:static\s+)?function\s+(\w+)\s*\(")
        .unwrap()
});

/// Scan one PHP source file for class declarations and their test methods.
pub fn scan_source(source: &str, file: &Path) -> Vec<ScannedClass> {
    let namespace = NAMESPACE_RE
        .captures(source)
        .map(|c| c[1].to_string())
        .unwrap_or_default();

    // alias -> fully-qualified import target
    let mut imports: HashMap<String, String> = HashMap::new();
    for cap in USE_RE.captures_iter(source) {
        let target = cap[1].to_string();
        let alias = cap
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| {
                target.rsplit('\\').next().unwrap_or(&target).to_string()
            });
        imports.insert(alias, target);
    }

    let mut classes: Vec<ScannedClass> = Vec::new();
    for cap in CLASS_RE.captures_iter(source) {
        let modifiers = &cap[1];
        let name = &cap[2];
        let parent = cap
            .get(3)
            .map(|m| resolve_name(m.as_str(), &namespace, &imports));
        classes.push(ScannedClass {
            fqn: qualify(&namespace, name),
            parent,
            is_abstract: modifiers.contains("abstract"),
            methods: Vec::new(),
            file: file.to_string_lossy().into_owned(),
        });
    }

    // Attribute each method to the last class declared before it.
    let class_starts: Vec<usize> = CLASS_RE
        .captures_iter(source)
        .map(|c| c.get(0).map(|m| m.start()).unwrap_or(0))
        .collect();

    for cap in METHOD_RE.captures_iter(source) {
        let visibility = cap.get(1).map(|m| m.as_str());
        if matches!(visibility, Some("protected") | Some("private")) {
            continue;
        }
        let name = &cap[2];
        if !name.starts_with("test") {
            continue;
        }
        let offset = cap.get(0).map(|m| m.start()).unwrap_or(0);
        let owner = class_starts.iter().rposition(|&start| start <= offset);
        if let Some(index) = owner
            && let Some(class) = classes.get_mut(index)
        {
            let line = source[..offset].matches('\n').count() as u32 + 1;
            class.methods.push((name.to_string(), line));
        }
    }

    classes
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}\\{}", namespace, name)
    }
}

/// Resolve a parent-class reference the way PHP does: leading backslash is
/// already fully qualified, imported aliases expand, anything else is
/// relative to the current namespace.
fn resolve_name(raw: &str, namespace: &str, imports: &HashMap<String, String>) -> String {
    if let Some(absolute) = raw.strip_prefix('\\') {
        return absolute.to_string();
    }
    let head = raw.split('\\').next().unwrap_or(raw);
    if let Some(target) = imports.get(head) {
        if head == raw {
            return target.clone();
        }
        let rest = &raw[head.len()..];
        return format!("{}{}", target, rest);
    }
    qualify(namespace, raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const SOURCE: &str = r#"<?php

namespace App\Tests;

use PHPUnit\Framework\TestCase;

final class CalculatorTest extends TestCase
{
    public function testAdd(): void
    {
    }

    private function testHelperIsNotPublic(): void
    {
    }

    public function setUp(): void
    {
    }

    public function testSubtract(): void
    {
    }
}
"#;

    #[test]
    fn finds_class_and_methods_in_declaration_order() {
        let classes = scan_source(SOURCE, &PathBuf::from("CalculatorTest.php"));

        assert_eq!(classes.len(), 1);
        let class = &classes[0];
        assert_eq!(class.fqn, "App\\Tests\\CalculatorTest");
        assert_eq!(
            class.parent.as_deref(),
            Some("PHPUnit\\Framework\\TestCase")
        );
        assert!(!class.is_abstract);

        let names: Vec<&str> = class.methods.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["testAdd", "testSubtract"]);
        assert_eq!(class.methods[0].1, 9);
    }

    #[test]
    fn resolves_parent_through_alias_and_namespace() {
        let aliased = "<?php\nnamespace A;\nuse PHPUnit\\Framework\\TestCase as Base;\nclass FooTest extends Base {}\n";
        let classes = scan_source(aliased, &PathBuf::from("FooTest.php"));
        assert_eq!(
            classes[0].parent.as_deref(),
            Some("PHPUnit\\Framework\\TestCase")
        );

        let relative = "<?php\nnamespace A;\nclass BarTest extends AbstractAppTest {}\n";
        let classes = scan_source(relative, &PathBuf::from("BarTest.php"));
        assert_eq!(classes[0].parent.as_deref(), Some("A\\AbstractAppTest"));

        let absolute = "<?php\nclass BazTest extends \\PHPUnit\\Framework\\TestCase {}\n";
        let classes = scan_source(absolute, &PathBuf::from("BazTest.php"));
        assert_eq!(
            classes[0].parent.as_deref(),
            Some("PHPUnit\\Framework\\TestCase")
        );
    }

    #[test]
    fn marks_abstract_classes() {
        let source = "<?php\nabstract class AbstractCase extends \\PHPUnit\\Framework\\TestCase {}\n";
        let classes = scan_source(source, &PathBuf::from("AbstractCase.php"));
        assert!(classes[0].is_abstract);
    }
}
