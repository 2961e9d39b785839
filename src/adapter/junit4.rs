//! Adapter for the JUnit4-style engine
//!
//! JUnit4 reports a failure before `test_finished`, while the protocol wants
//! `testFinished` first. Failures and assumption failures are held until the
//! test finishes.

use anyhow::Result;
use std::collections::HashMap;
use std::io::Write;
use std::time::Instant;
use tracing::debug;

use super::TestAdapter;
use crate::catalog::{Failure, TestCatalog};
use crate::engine::elapsed_ms;
use crate::engine::junit4::{Description, JUnitCore, RunListener, RunResult};
use crate::protocol::Reporter;
use crate::selection::Selection;

enum Pending {
    Failed(Failure),
    Aborted,
}

pub struct JUnitAdapter<W: Write> {
    reporter: Reporter<W>,
    started: HashMap<String, Instant>,
    pending: HashMap<String, Pending>,
}

impl<W: Write> JUnitAdapter<W> {
    pub fn new(out: W, location_scheme: &str) -> Self {
        Self {
            reporter: Reporter::new(out, location_scheme),
            started: HashMap::new(),
            pending: HashMap::new(),
        }
    }
}

impl<W: Write> TestAdapter for JUnitAdapter<W> {
    fn run(&mut self, selection: &Selection, catalog: &dyn TestCatalog) -> Result<i32> {
        self.reporter.reporter_attached()?;

        let core = JUnitCore::new(catalog);
        let requests = core.requests(selection);
        if requests.iter().all(|r| r.description.test_count() == 0) {
            debug!("Nothing to run");
            return Ok(0);
        }

        self.reporter.root_presentation()?;
        core.run(&requests, self)?;

        Ok(0)
    }
}

impl<W: Write> RunListener for JUnitAdapter<W> {
    fn test_suite_started(&mut self, description: &Description) -> Result<()> {
        self.reporter.suite_started(&description.node)
    }

    fn test_started(&mut self, description: &Description) -> Result<()> {
        self.started
            .insert(description.node.id().to_string(), Instant::now());
        self.reporter.test_started(&description.node)
    }

    fn test_failure(&mut self, description: &Description, failure: &Failure) -> Result<()> {
        self.pending
            .insert(description.node.id().to_string(), Pending::Failed(failure.clone()));
        Ok(())
    }

    fn test_assumption_failure(&mut self, description: &Description, reason: &str) -> Result<()> {
        debug!("Assumption failed in {}: {}", description.display_name, reason);
        self.pending
            .insert(description.node.id().to_string(), Pending::Aborted);
        Ok(())
    }

    fn test_ignored(&mut self, description: &Description) -> Result<()> {
        self.reporter.test_ignored(&description.node)
    }

    fn test_finished(&mut self, description: &Description) -> Result<()> {
        let node = &description.node;
        let duration = self
            .started
            .remove(node.id())
            .map(elapsed_ms)
            .unwrap_or(0);

        match self.pending.remove(node.id()) {
            None => self.reporter.test_finished(node, duration),
            Some(Pending::Failed(failure)) => {
                self.reporter.test_finished(node, duration)?;
                self.reporter.test_failed(node, &failure, duration)
            }
            Some(Pending::Aborted) => self.reporter.test_ignored(node),
        }
    }

    fn test_suite_finished(&mut self, description: &Description) -> Result<()> {
        self.reporter.suite_finished(&description.node)
    }

    fn test_run_finished(&mut self, result: &RunResult) -> Result<()> {
        debug!("JUnit run took {}ms", result.run_time_ms);
        self.reporter.run_summary()
    }
}
