//! Shared fixtures for unit tests

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::catalog::{Failure, InMemoryCatalog, TestClass, TestMethod, TestOutcome};
use crate::protocol::message::{decode, TestMessage};
use crate::protocol::vocabulary::EventKind;

/// In-memory writer whose contents stay readable after it was moved away
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn messages(&self) -> Vec<TestMessage> {
        self.contents().lines().map(|l| decode(l).unwrap()).collect()
    }

    pub fn events(&self) -> Vec<EventKind> {
        self.messages().iter().map(|m| m.event().unwrap()).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub const DIVIDE_TRACE: &str =
    "java.lang.ArithmeticException: / by zero\n\tat com.acme.Calc.testDivide(Calc.java:20)";

/// `com.acme.Calc` (one of every outcome, a data table, a nested class),
/// `com.acme.Empty` (no methods) and `com.acme.Flaky` (partial success)
pub fn sample_catalog() -> InMemoryCatalog {
    let calc = TestClass::new("com.acme.Calc")
        .with_source("file:///src/com/acme/Calc.java")
        .method(TestMethod::new("testAdd", |_| TestOutcome::Passed))
        .method(TestMethod::new("testDivide", |_| {
            TestOutcome::Failed(Failure::with_message("/ by zero").with_details(DIVIDE_TRACE))
        }))
        .method(TestMethod::new("testIgnored", |_| TestOutcome::Passed).disabled("not ready"))
        .method(TestMethod::new("testAssume", |_| {
            TestOutcome::Aborted("no network".to_string())
        }))
        .method(
            TestMethod::new("testTable", |args| {
                if args[0] == args[1] {
                    TestOutcome::Passed
                } else {
                    TestOutcome::Failed(Failure::with_message(format!("{} != {}", args[0], args[1])))
                }
            })
            .with_rows(vec![
                vec!["1".to_string(), "1".to_string()],
                vec!["2".to_string(), "3".to_string()],
            ]),
        )
        .nested(TestClass::new("Inner").method(TestMethod::new("testDeep", |_| TestOutcome::Passed)));

    let flaky = TestClass::new("com.acme.Flaky").method(
        TestMethod::new("testFlaky", |args| {
            if args[0] == "bad" {
                TestOutcome::Failed(Failure::with_message("bad row"))
            } else {
                TestOutcome::Passed
            }
        })
        .with_rows(vec![
            vec!["ok".to_string()],
            vec!["bad".to_string()],
            vec!["ok".to_string()],
            vec!["ok".to_string()],
        ])
        .with_success_percentage(50),
    );

    InMemoryCatalog::new("calc")
        .with_class(calc)
        .with_class(TestClass::new("com.acme.Empty"))
        .with_class(flaky)
}

/// Checks the stream shape every run must have: attributes per event schema,
/// handshake, root, balanced suites, each test started once and closed once,
/// and a summary whose numbers match the events.
pub fn assert_well_formed(messages: &[TestMessage]) {
    use crate::protocol::vocabulary::{MESSAGE, NAME};

    let events: Vec<EventKind> = messages.iter().map(|m| m.event().unwrap()).collect();
    for (message, event) in messages.iter().zip(&events) {
        for key in event.required_attributes() {
            assert!(message.get(key).is_some(), "{} lacks {}", event, key);
        }
        for (key, _) in &message.attributes {
            assert!(
                event.required_attributes().contains(&key.as_str())
                    || event.optional_attributes().contains(&key.as_str()),
                "{} carries unexpected {}",
                event,
                key
            );
        }
    }

    assert_eq!(events[0], EventKind::ReporterAttached);
    assert_eq!(events[1], EventKind::RootPresentation);
    assert_eq!(*events.last().unwrap(), EventKind::TestRunSummary);
    assert_eq!(events.iter().filter(|e| **e == EventKind::TestRunSummary).count(), 1);

    let mut suites: Vec<String> = Vec::new();
    let mut open_test: Option<String> = None;
    let (mut finished, mut failed, mut ignored) = (0, 0, 0);
    let mut last: Option<EventKind> = None;

    for message in &messages[2..messages.len() - 1] {
        let name = message.get(NAME).unwrap().to_string();
        match message.event().unwrap() {
            EventKind::SuiteStarted => {
                assert!(open_test.is_none());
                suites.push(name);
            }
            EventKind::SuiteFinished => {
                assert!(open_test.is_none());
                assert_eq!(suites.pop(), Some(name));
            }
            EventKind::TestStarted => {
                assert!(open_test.is_none(), "nested test start {}", name);
                assert!(!suites.is_empty(), "test {} outside a suite", name);
                open_test = Some(name);
            }
            EventKind::TestFinished => {
                assert_eq!(open_test.take(), Some(name));
                finished += 1;
            }
            EventKind::TestFailed => {
                assert_eq!(last, Some(EventKind::TestFinished));
                failed += 1;
            }
            EventKind::TestIgnored => {
                assert_eq!(open_test.take(), Some(name));
                ignored += 1;
            }
            other => panic!("unexpected {:?} inside run", other),
        }
        last = message.event();
    }

    assert!(suites.is_empty(), "unclosed suites {:?}", suites);
    assert!(open_test.is_none());

    let expected = format!(
        "Total tests run: {}, Failures: {}, Skips: {}",
        finished + ignored,
        failed,
        ignored
    );
    assert_eq!(messages.last().unwrap().get(MESSAGE), Some(expected.as_str()));
}
