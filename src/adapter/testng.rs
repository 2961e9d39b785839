//! Adapter for the TestNG-style engine
//!
//! TestNG calls listeners from worker threads when classes run in parallel,
//! so the reporter sits behind a mutex. In that mode the events of a class
//! are held back and written as one block when the class completes, which
//! keeps every suite's events together on the output.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::TestAdapter;
use crate::catalog::{Failure, TestCatalog};
use crate::engine::testng::{
    SuiteResult, TestClassInfo, TestNG, TestNgListener, TestResult, XmlSuite,
};
use crate::protocol::Reporter;
use crate::selection::Selection;
use crate::test_model::TestNode;

pub struct TestNgAdapter<W: Write + Send + 'static> {
    listener: Arc<ReportingListener<W>>,
    threads: usize,
}

impl<W: Write + Send + 'static> TestNgAdapter<W> {
    pub fn new(out: W, location_scheme: &str, threads: usize) -> Self {
        Self {
            listener: Arc::new(ReportingListener {
                reporter: Mutex::new(Reporter::new(out, location_scheme)),
                hold_classes: threads > 1,
                pending: Mutex::new(HashMap::new()),
            }),
            threads,
        }
    }
}

impl<W: Write + Send + 'static> TestAdapter for TestNgAdapter<W> {
    fn run(&mut self, selection: &Selection, catalog: &dyn TestCatalog) -> Result<i32> {
        self.listener.with(|r| r.reporter_attached())?;
        if selection.is_empty() {
            return Ok(0);
        }

        let suite = XmlSuite::from_selection(selection, self.threads);
        if unit_count(&suite, catalog) == 0 {
            debug!("Suite {} has no test methods", suite.name);
            return Ok(0);
        }

        self.listener.with(|r| r.root_presentation())?;

        let mut testng = TestNG::new(catalog);
        testng.add_listener(self.listener.clone());
        let result = testng.run(&suite)?;
        debug!("TestNG suite {} finished with {} test(s)", result.name, result.tests.len());

        self.listener.with(|r| r.flush())?;
        Ok(0)
    }
}

/// Units the suite would report: included methods of resolvable classes,
/// plus one skipped unit per name that does not resolve
fn unit_count(suite: &XmlSuite, catalog: &dyn TestCatalog) -> usize {
    suite
        .tests
        .iter()
        .flat_map(|t| &t.classes)
        .map(|xml_class| match catalog.load_class(&xml_class.name) {
            None => xml_class.included_methods.len().max(1),
            Some(class) if xml_class.included_methods.is_empty() => class.methods.len(),
            Some(_) => xml_class.included_methods.len(),
        })
        .sum()
}

/// A reporter call waiting for its class to complete
enum HeldEvent {
    SuiteStarted(TestNode),
    SuiteFinished(TestNode),
    TestStarted(TestNode),
    TestFinished(TestNode, u64),
    TestFailed(TestNode, Failure, u64),
    TestIgnored(TestNode),
}

impl HeldEvent {
    fn replay<W: Write>(self, reporter: &mut Reporter<W>) -> Result<()> {
        match self {
            HeldEvent::SuiteStarted(node) => reporter.suite_started(&node),
            HeldEvent::SuiteFinished(node) => reporter.suite_finished(&node),
            HeldEvent::TestStarted(node) => reporter.test_started(&node),
            HeldEvent::TestFinished(node, duration) => reporter.test_finished(&node, duration),
            HeldEvent::TestFailed(node, failure, duration) => {
                reporter.test_failed(&node, &failure, duration)
            }
            HeldEvent::TestIgnored(node) => reporter.test_ignored(&node),
        }
    }
}

struct ReportingListener<W: Write> {
    reporter: Mutex<Reporter<W>>,
    /// Set when classes run in parallel
    hold_classes: bool,
    /// Events of running classes, keyed by class name
    pending: Mutex<HashMap<String, Vec<HeldEvent>>>,
}

impl<W: Write> ReportingListener<W> {
    fn with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Reporter<W>) -> Result<()>,
    {
        let mut reporter = self
            .reporter
            .lock()
            .map_err(|_| anyhow!("Reporter lock poisoned"))?;
        f(&mut *reporter)
    }

    fn pending(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<HeldEvent>>>> {
        self.pending
            .lock()
            .map_err(|_| anyhow!("Pending events lock poisoned"))
    }

    /// Write the events now, or hold them while their class is running
    fn report(&self, class_name: &str, events: Vec<HeldEvent>) -> Result<()> {
        if self.hold_classes {
            if let Some(block) = self.pending()?.get_mut(class_name) {
                block.extend(events);
                return Ok(());
            }
        }
        self.with(|r| events.into_iter().try_for_each(|e| e.replay(r)))
    }
}

fn duration_of(result: &TestResult) -> u64 {
    u64::try_from((result.end_millis - result.start_millis).max(0)).unwrap_or(0)
}

fn finished_with_failure(result: &TestResult, failure: Failure) -> Vec<HeldEvent> {
    let duration = duration_of(result);
    vec![
        HeldEvent::TestFinished(result.node.clone(), duration),
        HeldEvent::TestFailed(result.node.clone(), failure, duration),
    ]
}

impl<W: Write + Send> TestNgListener for ReportingListener<W> {
    fn on_suite_finish(&self, _result: &SuiteResult) -> Result<()> {
        self.with(|r| r.run_summary())
    }

    fn on_before_class(&self, class: &TestClassInfo) -> Result<()> {
        if self.hold_classes {
            self.pending()?.insert(class.name.clone(), Vec::new());
        }
        self.report(&class.name, vec![HeldEvent::SuiteStarted(class.node.clone())])
    }

    fn on_after_class(&self, class: &TestClassInfo) -> Result<()> {
        self.report(&class.name, vec![HeldEvent::SuiteFinished(class.node.clone())])?;

        let block = if self.hold_classes {
            self.pending()?.remove(&class.name)
        } else {
            None
        };
        match block {
            Some(block) => self.with(|r| block.into_iter().try_for_each(|e| e.replay(r))),
            None => Ok(()),
        }
    }

    fn on_test_start(&self, result: &TestResult) -> Result<()> {
        self.report(&result.class_name, vec![HeldEvent::TestStarted(result.node.clone())])
    }

    fn on_test_success(&self, result: &TestResult) -> Result<()> {
        let finished = HeldEvent::TestFinished(result.node.clone(), duration_of(result));
        self.report(&result.class_name, vec![finished])
    }

    fn on_test_failure(&self, result: &TestResult) -> Result<()> {
        let failure = result.failure.clone().unwrap_or_default();
        self.report(&result.class_name, finished_with_failure(result, failure))
    }

    fn on_test_skipped(&self, result: &TestResult) -> Result<()> {
        if let Some(ref reason) = result.skip_reason {
            debug!("Skipped {}#{}: {}", result.class_name, result.name, reason);
        }
        self.report(&result.class_name, vec![HeldEvent::TestIgnored(result.node.clone())])
    }

    fn on_test_failed_but_within_success_percentage(&self, result: &TestResult) -> Result<()> {
        let failure = result
            .failure
            .clone()
            .unwrap_or_else(|| Failure::with_message("Failed within success percentage"));
        self.report(&result.class_name, finished_with_failure(result, failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::vocabulary::{LOCATION, MESSAGE, NAME};
    use crate::protocol::EventKind;
    use crate::testing::{assert_well_formed, sample_catalog, SharedBuffer};

    fn run(args: &[&str], threads: usize) -> SharedBuffer {
        let buffer = SharedBuffer::default();
        let mut adapter = TestNgAdapter::new(buffer.clone(), "java:test", threads);
        let code = adapter.run(&Selection::parse(args), &sample_catalog()).unwrap();
        assert_eq!(code, 0);
        buffer
    }

    #[test]
    fn test_rows_reuse_the_method_name() {
        let messages = run(&["METHODtestTable:com.acme.Calc"], 1).messages();
        assert_well_formed(&messages);

        let started: Vec<_> = messages
            .iter()
            .filter(|m| m.event() == Some(EventKind::TestStarted))
            .collect();
        assert_eq!(started.len(), 2);
        assert!(started.iter().all(|m| m.get(NAME) == Some("testTable")));
        assert_eq!(started[0].get(LOCATION), Some("java:test://com.acme.Calc.testTable"));
        assert_eq!(
            messages.last().unwrap().get(MESSAGE),
            Some("Total tests run: 2, Failures: 1, Skips: 0")
        );
    }

    #[test]
    fn test_sequential_classes_are_well_formed() {
        let messages = run(&["CLASScom.acme.Calc", "CLASScom.acme.Flaky"], 1).messages();
        assert_well_formed(&messages);

        // the flaky failure is tolerated by the engine but still reported
        assert_eq!(
            messages.last().unwrap().get(MESSAGE),
            Some("Total tests run: 10, Failures: 3, Skips: 2")
        );
    }

    #[test]
    fn test_unresolved_class_is_skipped() {
        let messages = run(&["CLASScom.acme.Missing"], 1).messages();
        assert_well_formed(&messages);

        let ignored = messages
            .iter()
            .find(|m| m.event() == Some(EventKind::TestIgnored))
            .unwrap();
        assert_eq!(ignored.get(NAME), Some("Missing"));
    }

    #[test]
    fn test_parallel_classes_keep_suites_together() {
        let buffer = run(&["CLASScom.acme.Calc", "CLASScom.acme.Flaky", "CLASScom.acme.Empty"], 3);
        let messages = buffer.messages();
        assert_well_formed(&messages);

        assert_eq!(messages.len(), buffer.contents().lines().count());
        let count = |kind: EventKind| messages.iter().filter(|m| m.event() == Some(kind)).count();
        assert_eq!(count(EventKind::SuiteStarted), 3);
        assert_eq!(
            messages.last().unwrap().get(MESSAGE),
            Some("Total tests run: 10, Failures: 3, Skips: 2")
        );
    }

    #[test]
    fn test_parallel_runs_are_always_well_formed() {
        for _ in 0..50 {
            let messages = run(&["CLASScom.acme.Calc", "CLASScom.acme.Flaky", "CLASScom.acme.Missing"], 2).messages();
            assert_well_formed(&messages);
        }
    }

    #[test]
    fn test_nothing_to_run_only_attaches() {
        assert_eq!(run(&[], 1).events(), vec![EventKind::ReporterAttached]);
        assert_eq!(run(&["CLASScom.acme.Empty"], 1).events(), vec![EventKind::ReporterAttached]);
    }
}
