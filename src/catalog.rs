//! Test catalog
//!
//! The engines never look at source code: they ask a [`TestCatalog`] for a
//! class by name and get either its methods or nothing.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::test_model::{simple_name, Range, TestKind, TestLevel, TestNode};

/// Why a test did not pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Failure {
    /// Short failure text
    pub message: Option<String>,
    /// Full trace or captured output
    pub details: Option<String>,
}

impl Failure {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Result of invoking one test body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(Failure),
    /// The test gave up on its own precondition
    Aborted(String),
}

pub type TestBody = Arc<dyn Fn(&[String]) -> TestOutcome + Send + Sync>;

#[derive(Clone)]
pub struct TestMethod {
    pub name: String,
    /// One-based source line
    pub line: Option<u32>,
    /// Present when the method is disabled, holding the reason
    pub disabled: Option<String>,
    /// Data table; each row is one invocation
    pub rows: Vec<Vec<String>>,
    pub success_percentage: u8,
    pub body: TestBody,
}

impl TestMethod {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[String]) -> TestOutcome + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            line: None,
            disabled: None,
            rows: Vec::new(),
            success_percentage: 100,
            body: Arc::new(body),
        }
    }

    pub fn disabled(mut self, reason: &str) -> Self {
        self.disabled = Some(reason.to_string());
        self
    }

    pub fn with_rows(mut self, rows: Vec<Vec<String>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_success_percentage(mut self, percentage: u8) -> Self {
        self.success_percentage = percentage.min(100);
        self
    }

    /// Run the body once; a panic counts as a failure
    pub fn invoke(&self, args: &[String]) -> TestOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.body)(args))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                TestOutcome::Failed(
                    Failure::with_message(message.clone())
                        .with_details(format!("panicked at {}: {}", self.name, message)),
                )
            }
        }
    }
}

impl fmt::Debug for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethod")
            .field("name", &self.name)
            .field("disabled", &self.disabled)
            .field("rows", &self.rows.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TestClass {
    /// Fully qualified for top-level classes, simple for nested ones
    pub name: String,
    /// Source file URI
    pub source: Option<String>,
    pub methods: Vec<TestMethod>,
    pub nested: Vec<TestClass>,
}

impl TestClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: None,
            methods: Vec::new(),
            nested: Vec::new(),
        }
    }

    pub fn with_source(mut self, uri: &str) -> Self {
        self.source = Some(uri.to_string());
        self
    }

    pub fn method(mut self, method: TestMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn nested(mut self, class: TestClass) -> Self {
        self.nested.push(class);
        self
    }

    pub fn find_method(&self, name: &str) -> Option<&TestMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Suite node for a class. An unresolved class gets a node without a
/// source location.
pub fn class_node(class: Option<&TestClass>, full_name: &str, project: &str, kind: TestKind) -> TestNode {
    TestNode::new(
        simple_name(full_name),
        full_name,
        project,
        class.and_then(|c| c.source.as_deref()),
        None,
        TestLevel::Suite,
        kind,
    )
}

/// Identity node for one method of `class_name`
pub fn method_node(
    method: &TestMethod,
    class_name: &str,
    project: &str,
    source: Option<&str>,
    kind: TestKind,
) -> TestNode {
    let range = method.line.map(|line| Range::line(line.saturating_sub(1)));
    TestNode::new(
        &method.name,
        &format!("{}#{}", class_name, method.name),
        project,
        source,
        range,
        TestLevel::Case,
        kind,
    )
}

/// Text carried by a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolves class names to runnable classes
pub trait TestCatalog: Send + Sync {
    /// Project scope used for node ids
    fn project(&self) -> &str;

    /// Top-level classes by fully qualified name
    fn top_level(&self, name: &str) -> Option<&TestClass>;

    /// Resolve a class, following `Outer$Inner` paths into nested classes
    fn load_class(&self, name: &str) -> Option<&TestClass> {
        let mut parts = name.split('$');
        let mut class = self.top_level(parts.next()?)?;
        for part in parts {
            class = class.nested.iter().find(|c| c.name == part)?;
        }
        Some(class)
    }
}

/// A catalog held in memory, built in code or from a manifest
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    project: String,
    classes: HashMap<String, TestClass>,
}

impl InMemoryCatalog {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            classes: HashMap::new(),
        }
    }

    pub fn with_class(mut self, class: TestClass) -> Self {
        self.add_class(class);
        self
    }

    pub fn add_class(&mut self, class: TestClass) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TestCatalog for InMemoryCatalog {
    fn project(&self) -> &str {
        &self.project
    }

    fn top_level(&self, name: &str) -> Option<&TestClass> {
        self.classes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> TestClass {
        TestClass::new("com.acme.Calc")
            .with_source("file:///src/Calc.java")
            .method(TestMethod::new("testAdd", |_| TestOutcome::Passed))
            .nested(
                TestClass::new("Inner")
                    .method(TestMethod::new("testDeep", |_| TestOutcome::Passed))
                    .nested(TestClass::new("Deeper")),
            )
    }

    #[test]
    fn test_load_nested_class() {
        let catalog = InMemoryCatalog::new("calc").with_class(calc());

        assert!(catalog.load_class("com.acme.Calc").is_some());
        assert_eq!(catalog.load_class("com.acme.Calc$Inner").unwrap().name, "Inner");
        assert!(catalog.load_class("com.acme.Calc$Inner$Deeper").is_some());
        assert!(catalog.load_class("com.acme.Calc$Missing").is_none());
        assert!(catalog.load_class("com.acme.Nope").is_none());
    }

    #[test]
    fn test_class_node_for_resolved_and_unresolved_classes() {
        let catalog = InMemoryCatalog::new("calc").with_class(calc());

        let inner = class_node(catalog.load_class("com.acme.Calc$Inner"), "com.acme.Calc$Inner", "calc", TestKind::JUnit5);
        assert_eq!(inner.label, "Inner");
        assert_eq!(inner.level, TestLevel::Suite);
        assert_eq!(inner.id(), "calc@com.acme.Calc$Inner");

        let outer = class_node(catalog.load_class("com.acme.Calc"), "com.acme.Calc", "calc", TestKind::JUnit4);
        assert_eq!(outer.location.unwrap().uri, "file:///src/Calc.java");

        let missing = class_node(None, "com.acme.Nope", "calc", TestKind::TestNG);
        assert_eq!(missing.label, "Nope");
        assert!(missing.location.is_none());
    }

    #[test]
    fn test_invoke_turns_panic_into_failure() {
        let method = TestMethod::new("testBoom", |_| panic!("kaboom"));

        match method.invoke(&[]) {
            TestOutcome::Failed(failure) => {
                assert_eq!(failure.message.as_deref(), Some("kaboom"));
                assert!(failure.details.unwrap().contains("testBoom"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let silent = TestMethod::new("testSilent", |_| std::panic::panic_any(42));
        match silent.invoke(&[]) {
            TestOutcome::Failed(failure) => assert_eq!(failure.message.as_deref(), Some("unknown panic")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_invoke_passes_row_arguments() {
        let method = TestMethod::new("testEq", |args| {
            if args.len() == 2 && args[0] == args[1] {
                TestOutcome::Passed
            } else {
                TestOutcome::Failed(Failure::with_message("not equal"))
            }
        });

        assert_eq!(method.invoke(&["1".into(), "1".into()]), TestOutcome::Passed);
        assert!(matches!(method.invoke(&["1".into(), "2".into()]), TestOutcome::Failed(_)));
    }
}
