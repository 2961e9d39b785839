//! TestNG-style engine
//!
//! A run is described by an [`XmlSuite`] holding one [`XmlTest`] with the
//! selected classes. Data-table methods are invoked once per row under the
//! same name, and a method may tolerate a share of failing invocations
//! (its success percentage). With more than one thread, classes run in
//! parallel and listeners are called from several threads at once.

use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::{class_node, method_node, Failure, TestCatalog, TestClass, TestMethod, TestOutcome};
use crate::selection::{MethodFilter, Selection};
use crate::test_model::{TestKind, TestLevel, TestNode};

pub const SUITE_NAME: &str = "TestNGSuite";

#[derive(Debug, Clone)]
pub struct XmlClass {
    pub name: String,
    /// Empty means every method
    pub included_methods: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct XmlTest {
    pub name: String,
    pub classes: Vec<XmlClass>,
}

#[derive(Debug, Clone)]
pub struct XmlSuite {
    pub name: String,
    pub tests: Vec<XmlTest>,
    pub thread_count: usize,
}

impl XmlSuite {
    pub fn from_selection(selection: &Selection, thread_count: usize) -> Self {
        let classes = selection
            .classes
            .iter()
            .map(|c| XmlClass {
                name: c.class.clone(),
                included_methods: match c.methods {
                    MethodFilter::All => Vec::new(),
                    MethodFilter::Only(ref methods) => methods.clone(),
                },
            })
            .collect();

        Self {
            name: SUITE_NAME.to_string(),
            tests: vec![XmlTest {
                name: format!("TestNGTest-{}", Uuid::new_v4()),
                classes,
            }],
            thread_count: thread_count.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Started,
    Success,
    Failure,
    Skip,
    SuccessPercentageFailure,
}

/// One invocation of a test method
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Method name
    pub name: String,
    pub class_name: String,
    pub parameters: Vec<String>,
    pub node: TestNode,
    /// Wall-clock milliseconds since the epoch
    pub start_millis: i64,
    pub end_millis: i64,
    pub status: ResultStatus,
    pub failure: Option<Failure>,
    pub skip_reason: Option<String>,
}

impl TestResult {
    fn new(name: &str, class_name: &str, node: TestNode, parameters: Vec<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            name: name.to_string(),
            class_name: class_name.to_string(),
            parameters,
            node,
            start_millis: now,
            end_millis: now,
            status: ResultStatus::Started,
            failure: None,
            skip_reason: None,
        }
    }

    fn skipped(mut self, reason: String) -> Self {
        self.status = ResultStatus::Skip;
        self.skip_reason = Some(reason);
        self
    }
}

/// The class currently being run
#[derive(Debug, Clone)]
pub struct TestClassInfo {
    pub name: String,
    pub node: TestNode,
}

/// Shared counters for one `<test>`
#[derive(Debug, Default)]
pub struct TestContext {
    pub name: String,
    all: AtomicUsize,
    passed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl TestContext {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn record(&self, status: ResultStatus) {
        self.all.fetch_add(1, Ordering::SeqCst);
        let counter = match status {
            ResultStatus::Success => &self.passed,
            ResultStatus::Failure | ResultStatus::SuccessPercentageFailure => &self.failed,
            ResultStatus::Skip => &self.skipped,
            ResultStatus::Started => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            name: self.name.clone(),
            all: self.all.load(Ordering::SeqCst),
            passed: self.passed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSummary {
    pub name: String,
    pub all: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct SuiteResult {
    pub name: String,
    pub tests: Vec<ContextSummary>,
}

/// Suite, test, class and method callbacks in one interface.
/// Implementations must tolerate calls from several threads.
pub trait TestNgListener: Send + Sync {
    fn on_suite_start(&self, _suite: &XmlSuite) -> Result<()> {
        Ok(())
    }

    fn on_suite_finish(&self, _result: &SuiteResult) -> Result<()> {
        Ok(())
    }

    fn on_start(&self, _context: &TestContext) -> Result<()> {
        Ok(())
    }

    fn on_finish(&self, _context: &TestContext) -> Result<()> {
        Ok(())
    }

    fn on_before_class(&self, _class: &TestClassInfo) -> Result<()> {
        Ok(())
    }

    fn on_after_class(&self, _class: &TestClassInfo) -> Result<()> {
        Ok(())
    }

    fn on_test_start(&self, _result: &TestResult) -> Result<()> {
        Ok(())
    }

    fn on_test_success(&self, _result: &TestResult) -> Result<()> {
        Ok(())
    }

    fn on_test_failure(&self, _result: &TestResult) -> Result<()> {
        Ok(())
    }

    fn on_test_skipped(&self, _result: &TestResult) -> Result<()> {
        Ok(())
    }

    fn on_test_failed_but_within_success_percentage(&self, _result: &TestResult) -> Result<()> {
        Ok(())
    }
}

pub struct TestNG<'a> {
    catalog: &'a dyn TestCatalog,
    listeners: Vec<Arc<dyn TestNgListener>>,
}

impl<'a> TestNG<'a> {
    pub fn new(catalog: &'a dyn TestCatalog) -> Self {
        Self {
            catalog,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn TestNgListener>) {
        self.listeners.push(listener);
    }

    fn notify<F>(&self, f: F) -> Result<()>
    where
        F: Fn(&dyn TestNgListener) -> Result<()>,
    {
        for listener in &self.listeners {
            f(listener.as_ref())?;
        }
        Ok(())
    }

    pub fn run(&self, suite: &XmlSuite) -> Result<SuiteResult> {
        self.notify(|l| l.on_suite_start(suite))?;

        let mut summaries = Vec::new();
        for test in &suite.tests {
            let context = TestContext::new(&test.name);
            self.notify(|l| l.on_start(&context))?;

            if suite.thread_count > 1 && test.classes.len() > 1 {
                self.run_parallel(&test.classes, &context, suite.thread_count)?;
            } else {
                for class in &test.classes {
                    self.run_class(class, &context)?;
                }
            }

            self.notify(|l| l.on_finish(&context))?;
            summaries.push(context.summary());
        }

        let result = SuiteResult {
            name: suite.name.clone(),
            tests: summaries,
        };
        self.notify(|l| l.on_suite_finish(&result))?;

        Ok(result)
    }

    fn run_parallel(&self, classes: &[XmlClass], context: &TestContext, threads: usize) -> Result<()> {
        let threads = threads.min(classes.len());
        debug!("Running {} classes on {} threads", classes.len(), threads);

        let mut buckets: Vec<Vec<&XmlClass>> = vec![Vec::new(); threads];
        for (i, class) in classes.iter().enumerate() {
            buckets[i % threads].push(class);
        }

        thread::scope(|scope| {
            let handles: Vec<_> = buckets
                .into_iter()
                .map(|bucket| {
                    scope.spawn(move || -> Result<()> {
                        for class in bucket {
                            self.run_class(class, context)?;
                        }
                        Ok(())
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(result) => result?,
                    Err(_) => anyhow::bail!("TestNG worker thread panicked"),
                }
            }
            Ok(())
        })
    }

    fn run_class(&self, xml_class: &XmlClass, context: &TestContext) -> Result<()> {
        let project = self.catalog.project();
        let class_name = xml_class.name.as_str();

        let Some(class) = self.catalog.load_class(class_name) else {
            warn!("Cannot find class in classpath: {}", class_name);
            let info = TestClassInfo {
                name: class_name.to_string(),
                node: class_node(None, class_name, project, TestKind::TestNG),
            };
            self.notify(|l| l.on_before_class(&info))?;

            let reason = format!("Cannot find class in classpath: {}", class_name);
            let names = if xml_class.included_methods.is_empty() {
                vec![info.node.label.clone()]
            } else {
                xml_class.included_methods.clone()
            };
            for name in names {
                let node = TestNode::case(&name, &format!("{}#{}", class_name, name), project, TestKind::TestNG);
                let result = TestResult::new(&name, class_name, node, Vec::new()).skipped(reason.clone());
                context.record(result.status);
                self.notify(|l| l.on_test_skipped(&result))?;
            }

            return self.notify(|l| l.on_after_class(&info));
        };

        let info = TestClassInfo {
            name: class_name.to_string(),
            node: class_node(Some(class), class_name, project, TestKind::TestNG),
        };
        self.notify(|l| l.on_before_class(&info))?;

        for method in &class.methods {
            if xml_class.included_methods.is_empty() || xml_class.included_methods.contains(&method.name) {
                self.run_method(class, class_name, method, context)?;
            }
        }

        for missing in xml_class
            .included_methods
            .iter()
            .filter(|m| class.find_method(m).is_none())
        {
            warn!("Method not found: {}#{}", class_name, missing);
            let node = TestNode::case(missing, &format!("{}#{}", class_name, missing), project, TestKind::TestNG);
            let result = TestResult::new(missing, class_name, node, Vec::new())
                .skipped(format!("Method not found: {}#{}", class_name, missing));
            context.record(result.status);
            self.notify(|l| l.on_test_skipped(&result))?;
        }

        self.notify(|l| l.on_after_class(&info))
    }

    fn run_method(&self, class: &TestClass, class_name: &str, method: &TestMethod, context: &TestContext) -> Result<()> {
        let project = self.catalog.project();
        let base = method_node(method, class_name, project, class.source.as_deref(), TestKind::TestNG);

        if let Some(ref reason) = method.disabled {
            let result = TestResult::new(&method.name, class_name, base, Vec::new()).skipped(reason.clone());
            context.record(result.status);
            return self.notify(|l| l.on_test_skipped(&result));
        }

        let rows = if method.rows.is_empty() {
            vec![Vec::new()]
        } else {
            method.rows.clone()
        };
        let invocations = rows.len();
        let tolerated = (100 - usize::from(method.success_percentage.min(100))) * invocations / 100;
        let mut failures = 0;

        for (i, args) in rows.into_iter().enumerate() {
            let node = if invocations > 1 {
                TestNode::new(
                    &base.label,
                    &format!("{}[{}]", base.full_name, i),
                    project,
                    base.location.as_ref().map(|l| l.uri.as_str()),
                    base.location.as_ref().and_then(|l| l.range),
                    TestLevel::Case,
                    TestKind::TestNG,
                )
            } else {
                base.clone()
            };

            let mut result = TestResult::new(&method.name, class_name, node, args);
            self.notify(|l| l.on_test_start(&result))?;

            let outcome = method.invoke(&result.parameters);
            result.end_millis = Utc::now().timestamp_millis();

            match outcome {
                TestOutcome::Passed => {
                    result.status = ResultStatus::Success;
                    context.record(result.status);
                    self.notify(|l| l.on_test_success(&result))?;
                }
                TestOutcome::Failed(failure) => {
                    failures += 1;
                    result.failure = Some(failure);
                    if failures <= tolerated {
                        result.status = ResultStatus::SuccessPercentageFailure;
                        context.record(result.status);
                        self.notify(|l| l.on_test_failed_but_within_success_percentage(&result))?;
                    } else {
                        result.status = ResultStatus::Failure;
                        context.record(result.status);
                        self.notify(|l| l.on_test_failure(&result))?;
                    }
                }
                TestOutcome::Aborted(reason) => {
                    result.status = ResultStatus::Skip;
                    result.skip_reason = Some(reason);
                    context.record(result.status);
                    self.notify(|l| l.on_test_skipped(&result))?;
                }
            }
        }

        Ok(())
    }
}
