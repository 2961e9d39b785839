//! JUnit4-style engine
//!
//! Each selected class becomes a [`Request`] whose description tree is run
//! depth first. Unresolvable requests turn into a failing
//! `initializationError` test, as the reflective runner does.

use anyhow::Result;
use std::time::Instant;
use tracing::{debug, warn};

use super::elapsed_ms;
use crate::catalog::{class_node, method_node, Failure, TestCatalog, TestClass, TestMethod, TestOutcome};
use crate::selection::{ClassSelection, MethodFilter, Selection};
use crate::test_model::{TestKind, TestLevel, TestNode};

const INITIALIZATION_ERROR: &str = "initializationError";

#[derive(Debug, Clone)]
enum Action {
    Suite,
    Run { method: TestMethod, args: Vec<String> },
    Ignore,
    Error(Failure),
}

/// A node of the JUnit4 description tree
#[derive(Debug, Clone)]
pub struct Description {
    /// `method(Class)` for tests, the class name for suites
    pub display_name: String,
    pub node: TestNode,
    pub children: Vec<Description>,
    action: Action,
}

impl Description {
    fn suite(node: TestNode) -> Self {
        Self {
            display_name: node.full_name.clone(),
            node,
            children: Vec::new(),
            action: Action::Suite,
        }
    }

    fn test(node: TestNode, action: Action) -> Self {
        Self {
            display_name: format!("{}({})", node.label, node.class_name()),
            node,
            children: Vec::new(),
            action,
        }
    }

    pub fn is_suite(&self) -> bool {
        matches!(self.action, Action::Suite)
    }

    pub fn is_test(&self) -> bool {
        !self.is_suite()
    }

    pub fn test_count(&self) -> usize {
        if self.is_test() {
            return 1;
        }
        self.children.iter().map(|c| c.test_count()).sum()
    }
}

/// What happened during a run
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub run_count: usize,
    pub failure_count: usize,
    pub ignore_count: usize,
    pub assumption_failure_count: usize,
    pub run_time_ms: u64,
}

impl RunResult {
    pub fn was_successful(&self) -> bool {
        self.failure_count == 0
    }
}

/// Callbacks fired while a run progresses. A failure is reported before the
/// `test_finished` of the same test.
pub trait RunListener {
    fn test_run_started(&mut self, _description: &Description) -> Result<()> {
        Ok(())
    }

    fn test_suite_started(&mut self, _description: &Description) -> Result<()> {
        Ok(())
    }

    fn test_started(&mut self, _description: &Description) -> Result<()> {
        Ok(())
    }

    fn test_failure(&mut self, _description: &Description, _failure: &Failure) -> Result<()> {
        Ok(())
    }

    fn test_assumption_failure(&mut self, _description: &Description, _reason: &str) -> Result<()> {
        Ok(())
    }

    fn test_ignored(&mut self, _description: &Description) -> Result<()> {
        Ok(())
    }

    fn test_finished(&mut self, _description: &Description) -> Result<()> {
        Ok(())
    }

    fn test_suite_finished(&mut self, _description: &Description) -> Result<()> {
        Ok(())
    }

    fn test_run_finished(&mut self, _result: &RunResult) -> Result<()> {
        Ok(())
    }
}

/// One class to run, with its methods already filtered
#[derive(Debug, Clone)]
pub struct Request {
    pub description: Description,
}

impl Request {
    pub fn for_selection(selection: &ClassSelection, catalog: &dyn TestCatalog) -> Self {
        let project = catalog.project();

        let description = match catalog.load_class(&selection.class) {
            Some(class) => class_description(class, &selection.class, &selection.methods, project),
            None => {
                warn!("Class not found: {}", selection.class);
                error_description(
                    &selection.class,
                    project,
                    Failure::with_message(format!("Class not found: {}", selection.class)),
                )
            }
        };

        Self { description }
    }
}

fn class_description(class: &TestClass, full_name: &str, filter: &MethodFilter, project: &str) -> Description {
    let mut suite = Description::suite(class_node(Some(class), full_name, project, TestKind::JUnit4));
    let source = class.source.as_deref();

    for method in class.methods.iter().filter(|m| filter.includes(&m.name)) {
        let node = method_node(method, full_name, project, source, TestKind::JUnit4);

        if method.disabled.is_some() {
            suite.children.push(Description::test(node, Action::Ignore));
        } else if method.rows.is_empty() {
            let action = Action::Run {
                method: method.clone(),
                args: Vec::new(),
            };
            suite.children.push(Description::test(node, action));
        } else {
            // parameterized: one test per row, named `method[i]`
            for (i, row) in method.rows.iter().enumerate() {
                let label = format!("{}[{}]", method.name, i);
                let row_node = TestNode::new(
                    &label,
                    &format!("{}#{}", full_name, label),
                    project,
                    source,
                    node.location.as_ref().and_then(|l| l.range),
                    TestLevel::Case,
                    TestKind::JUnit4,
                );
                let action = Action::Run {
                    method: method.clone(),
                    args: row.clone(),
                };
                suite.children.push(Description::test(row_node, action));
            }
        }
    }

    match filter {
        MethodFilter::All => {
            for nested in &class.nested {
                let nested_name = format!("{}${}", full_name, nested.name);
                suite
                    .children
                    .push(class_description(nested, &nested_name, filter, project));
            }
        }
        MethodFilter::Only(methods) => {
            let missing: Vec<_> = methods
                .iter()
                .filter(|m| class.find_method(m).is_none())
                .map(|m| m.as_str())
                .collect();
            if !missing.is_empty() {
                let failure = Failure::with_message(format!(
                    "No tests found matching method(s) {} in {}",
                    missing.join(", "),
                    full_name
                ));
                suite.children.push(initialization_error(full_name, project, failure));
            }
        }
    }

    suite
}

fn initialization_error(class_name: &str, project: &str, failure: Failure) -> Description {
    let node = TestNode::case(
        INITIALIZATION_ERROR,
        &format!("{}#{}", class_name, INITIALIZATION_ERROR),
        project,
        TestKind::JUnit4,
    );
    Description::test(node, Action::Error(failure))
}

fn error_description(class_name: &str, project: &str, failure: Failure) -> Description {
    let mut suite = Description::suite(class_node(None, class_name, project, TestKind::JUnit4));
    suite
        .children
        .push(initialization_error(class_name, project, failure));
    suite
}

/// Runs requests sequentially and notifies one listener
pub struct JUnitCore<'a> {
    catalog: &'a dyn TestCatalog,
}

impl<'a> JUnitCore<'a> {
    pub fn new(catalog: &'a dyn TestCatalog) -> Self {
        Self { catalog }
    }

    pub fn requests(&self, selection: &Selection) -> Vec<Request> {
        selection
            .classes
            .iter()
            .map(|class| Request::for_selection(class, self.catalog))
            .collect()
    }

    pub fn run(&self, requests: &[Request], listener: &mut dyn RunListener) -> Result<RunResult> {
        let start = Instant::now();
        let mut root = Description::suite(TestNode::root(self.catalog.project()));
        root.children = requests.iter().map(|r| r.description.clone()).collect();

        let mut result = RunResult::default();
        listener.test_run_started(&root)?;

        for request in requests {
            run_description(&request.description, listener, &mut result)?;
        }

        result.run_time_ms = elapsed_ms(start);
        debug!(
            "JUnit run finished: {} run, {} failed, {} ignored",
            result.run_count, result.failure_count, result.ignore_count
        );
        listener.test_run_finished(&result)?;

        Ok(result)
    }
}

fn run_description(
    description: &Description,
    listener: &mut dyn RunListener,
    result: &mut RunResult,
) -> Result<()> {
    match description.action {
        Action::Suite => {
            listener.test_suite_started(description)?;
            for child in &description.children {
                run_description(child, listener, result)?;
            }
            listener.test_suite_finished(description)?;
        }
        Action::Ignore => {
            result.ignore_count += 1;
            listener.test_ignored(description)?;
        }
        Action::Run { ref method, ref args } => {
            listener.test_started(description)?;
            match method.invoke(args) {
                TestOutcome::Passed => {}
                TestOutcome::Failed(failure) => {
                    result.failure_count += 1;
                    listener.test_failure(description, &failure)?;
                }
                TestOutcome::Aborted(reason) => {
                    result.assumption_failure_count += 1;
                    listener.test_assumption_failure(description, &reason)?;
                }
            }
            result.run_count += 1;
            listener.test_finished(description)?;
        }
        Action::Error(ref failure) => {
            listener.test_started(description)?;
            result.failure_count += 1;
            listener.test_failure(description, failure)?;
            result.run_count += 1;
            listener.test_finished(description)?;
        }
    }

    Ok(())
}
