//! Test model definitions
//!
//! The identity model shared by every engine: a rooted tree of suites and
//! cases, each addressed by `project@fullName`.

use std::hash::{Hash, Hasher};

use crate::protocol::vocabulary::ROOT_SUITE_NAME;

/// Where a node sits in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestLevel {
    /// The synthetic "Default Suite" root
    Root,
    /// A grouping container (class, nested class, parameterized method)
    Suite,
    /// An individually executable test
    Case,
}

/// Which engine discovered a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestKind {
    #[default]
    None,
    JUnit4,
    JUnit5,
    TestNG,
}

/// Zero-based line/character position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// A range covering a single (zero-based) line
    pub fn line(line: u32) -> Self {
        Self {
            start: Position { line, character: 0 },
            end: Position { line, character: 0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub uri: String,
    pub range: Option<Range>,
}

/// A node in the test tree (root, suite or case)
#[derive(Debug, Clone)]
pub struct TestNode {
    id: String,
    /// Text shown to the user
    pub label: String,
    /// Stable name, e.g. `com.acme.Calc#testAdd`
    pub full_name: String,
    /// Owning project or module
    pub project: String,
    pub location: Option<SourceLocation>,
    pub level: TestLevel,
    pub kind: TestKind,
    pub children: Vec<TestNode>,
}

impl TestNode {
    pub fn new(
        label: &str,
        full_name: &str,
        project: &str,
        uri: Option<&str>,
        range: Option<Range>,
        level: TestLevel,
        kind: TestKind,
    ) -> Self {
        let location = uri.map(|uri| SourceLocation {
            uri: uri.to_string(),
            range,
        });

        Self {
            id: format!("{}@{}", project, full_name),
            label: label.to_string(),
            full_name: full_name.to_string(),
            project: project.to_string(),
            location,
            level,
            kind,
            children: Vec::new(),
        }
    }

    /// The synthetic root every run hangs its suites from
    pub fn root(project: &str) -> Self {
        Self::new(
            ROOT_SUITE_NAME,
            ROOT_SUITE_NAME,
            project,
            None,
            None,
            TestLevel::Root,
            TestKind::None,
        )
    }

    /// Convenience constructor for a suite without a source location
    pub fn suite(label: &str, full_name: &str, project: &str, kind: TestKind) -> Self {
        Self::new(label, full_name, project, None, None, TestLevel::Suite, kind)
    }

    /// Convenience constructor for a case without a source location
    pub fn case(label: &str, full_name: &str, project: &str, kind: TestKind) -> Self {
        Self::new(label, full_name, project, None, None, TestLevel::Case, kind)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a child. Duplicates are kept; ids are assumed unique.
    pub fn add_child(&mut self, child: TestNode) {
        self.children.push(child);
    }

    /// Class part of the full name (everything before `#`)
    pub fn class_name(&self) -> &str {
        match self.full_name.split_once('#') {
            Some((class, _)) => class,
            None => &self.full_name,
        }
    }

    /// Method part of the full name, without any invocation suffix
    pub fn method_name(&self) -> Option<&str> {
        let (_, method) = self.full_name.split_once('#')?;
        Some(method.split('[').next().unwrap_or(method))
    }
}

/// Last segment of a binary class name: `Inner` for `com.acme.Calc$Inner`
pub fn simple_name(full_name: &str) -> &str {
    full_name.rsplit(['.', '$']).next().unwrap_or(full_name)
}

impl PartialEq for TestNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TestNode {}

impl Hash for TestNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
