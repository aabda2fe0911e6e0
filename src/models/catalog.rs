use serde::Serialize;

/// A single test method discovered by static source inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestMethod {
    pub name: String,
    pub declaring_class: String,
    pub file: String,
    pub line: u32,
}

/// One test class, keyed by its fully-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suite {
    /// Fully-qualified class name; unique within a catalog.
    pub id: String,
    pub name: String,
    /// Methods in declaration order.
    pub methods: Vec<TestMethod>,
}

/// The discovered test catalog, recomputed on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TestCatalog {
    pub suites: Vec<Suite>,
}
