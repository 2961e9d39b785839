//! Typed emission of canonical events
//!
//! Every adapter reports through a [`Reporter`], which turns identity-model
//! nodes into names and locations and keeps the tallies for the summary.

use anyhow::Result;
use std::collections::HashSet;
use std::io::Write;

use super::message::TestMessage;
use super::stream::TestOutputStream;
use super::vocabulary::{
    summary_text, EventKind, DETAILS, DURATION, LOCATION, MESSAGE, NAME, ROOT_SUITE_NAME,
};
use crate::catalog::Failure;
use crate::test_model::TestNode;

/// Counts derived from what has been emitted so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    /// Tests that finished or were ignored
    pub run: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunTally {
    pub fn passed(&self) -> usize {
        self.run - self.failed - self.skipped
    }
}

pub struct Reporter<W: Write> {
    stream: TestOutputStream<W>,
    scheme: String,
    open: HashSet<String>,
    tally: RunTally,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, scheme: &str) -> Self {
        Self {
            stream: TestOutputStream::new(out),
            scheme: scheme.to_string(),
            open: HashSet::new(),
            tally: RunTally::default(),
        }
    }

    pub fn tally(&self) -> RunTally {
        self.tally
    }

    pub fn reporter_attached(&mut self) -> Result<()> {
        self.stream.println(&TestMessage::new(EventKind::ReporterAttached))
    }

    pub fn root_presentation(&mut self) -> Result<()> {
        self.stream
            .println(&TestMessage::new(EventKind::RootPresentation).attr(NAME, ROOT_SUITE_NAME))
    }

    pub fn suite_started(&mut self, node: &TestNode) -> Result<()> {
        let message = TestMessage::new(EventKind::SuiteStarted)
            .attr(NAME, self.name_of(node))
            .attr(LOCATION, self.location_of(node));
        self.stream.println(&message)
    }

    pub fn suite_finished(&mut self, node: &TestNode) -> Result<()> {
        let message = TestMessage::new(EventKind::SuiteFinished).attr(NAME, self.name_of(node));
        self.stream.println(&message)
    }

    pub fn test_started(&mut self, node: &TestNode) -> Result<()> {
        let message = TestMessage::new(EventKind::TestStarted)
            .attr(NAME, node.label.as_str())
            .attr(LOCATION, self.location_of(node));
        self.stream.println(&message)?;
        self.open.insert(node.id().to_string());
        Ok(())
    }

    pub fn test_finished(&mut self, node: &TestNode, duration_ms: u64) -> Result<()> {
        let message = TestMessage::new(EventKind::TestFinished)
            .attr(NAME, node.label.as_str())
            .attr(DURATION, duration_ms.to_string());
        self.stream.println(&message)?;
        self.open.remove(node.id());
        self.tally.run += 1;
        Ok(())
    }

    /// Emitted after `test_finished` for the same node
    pub fn test_failed(&mut self, node: &TestNode, failure: &Failure, duration_ms: u64) -> Result<()> {
        let mut message = TestMessage::new(EventKind::TestFailed)
            .attr(NAME, node.label.as_str())
            .attr(MESSAGE, failure.message.as_deref().unwrap_or(""));
        if let Some(ref details) = failure.details {
            message = message.attr(DETAILS, details.as_str());
        }
        message = message.attr(DURATION, duration_ms.to_string());

        self.stream.println(&message)?;
        self.tally.failed += 1;
        Ok(())
    }

    /// Ignored tests are always framed by a `testStarted`, emitted here if
    /// the engine never started the test.
    pub fn test_ignored(&mut self, node: &TestNode) -> Result<()> {
        if !self.open.contains(node.id()) {
            self.test_started(node)?;
        }

        let message = TestMessage::new(EventKind::TestIgnored).attr(NAME, node.label.as_str());
        self.stream.println(&message)?;
        self.open.remove(node.id());
        self.tally.run += 1;
        self.tally.skipped += 1;
        Ok(())
    }

    pub fn run_summary(&mut self) -> Result<()> {
        let text = summary_text(self.tally.run, self.tally.failed, self.tally.skipped);
        self.stream
            .println(&TestMessage::new(EventKind::TestRunSummary).attr(MESSAGE, text))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream.flush()
    }

    fn name_of(&self, node: &TestNode) -> String {
        if node.method_name().is_some() {
            node.label.clone()
        } else {
            node.full_name.clone()
        }
    }

    fn location_of(&self, node: &TestNode) -> String {
        match node.method_name() {
            Some(method) => format!("{}://{}.{}", self.scheme, node.class_name(), method),
            None => format!("{}://{}", self.scheme, node.full_name),
        }
    }
}
