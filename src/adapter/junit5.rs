//! Adapter for the JUnit5-style engine

use anyhow::Result;
use std::io::Write;
use tracing::debug;

use super::TestAdapter;
use crate::catalog::TestCatalog;
use crate::engine::junit5::{
    Launcher, LauncherDiscoveryRequest, Status, TestExecutionListener, TestExecutionResult,
    TestIdentifier, TestPlan,
};
use crate::protocol::Reporter;
use crate::selection::Selection;

pub struct JUnit5Adapter<W: Write> {
    reporter: Reporter<W>,
    plan: Option<TestPlan>,
}

impl<W: Write> JUnit5Adapter<W> {
    pub fn new(out: W, location_scheme: &str) -> Self {
        Self {
            reporter: Reporter::new(out, location_scheme),
            plan: None,
        }
    }
}

impl<W: Write> TestAdapter for JUnit5Adapter<W> {
    fn run(&mut self, selection: &Selection, catalog: &dyn TestCatalog) -> Result<i32> {
        self.reporter.reporter_attached()?;
        if selection.is_empty() {
            return Ok(0);
        }

        let launcher = Launcher::new(catalog);
        let plan = launcher.discover(&LauncherDiscoveryRequest::from_selection(selection));
        if !plan.contains_tests() {
            debug!("Test plan contains no tests");
            return Ok(0);
        }

        self.reporter.root_presentation()?;
        launcher.execute(&plan, self)?;

        Ok(0)
    }
}

impl<W: Write> TestExecutionListener for JUnit5Adapter<W> {
    fn test_plan_execution_started(&mut self, plan: &TestPlan) -> Result<()> {
        self.plan = Some(plan.clone());
        Ok(())
    }

    fn execution_skipped(&mut self, identifier: &TestIdentifier, reason: &str) -> Result<()> {
        debug!("Skipped {}: {}", identifier.unique_id, reason);
        match self.plan {
            Some(ref plan) if identifier.is_container() => {
                skip_container(&mut self.reporter, plan, identifier)
            }
            _ => self.reporter.test_ignored(&identifier.node),
        }
    }

    fn execution_started(&mut self, identifier: &TestIdentifier) -> Result<()> {
        if self.is_engine(identifier) {
            return Ok(());
        }
        if identifier.is_container() {
            self.reporter.suite_started(&identifier.node)
        } else {
            self.reporter.test_started(&identifier.node)
        }
    }

    fn execution_finished(
        &mut self,
        identifier: &TestIdentifier,
        result: &TestExecutionResult,
    ) -> Result<()> {
        if self.is_engine(identifier) {
            return Ok(());
        }
        if identifier.is_container() {
            return self.reporter.suite_finished(&identifier.node);
        }

        let node = &identifier.node;
        match result.status {
            Status::Successful => self.reporter.test_finished(node, result.duration_ms),
            Status::Failed => {
                self.reporter.test_finished(node, result.duration_ms)?;
                let failure = result.failure.clone().unwrap_or_default();
                self.reporter.test_failed(node, &failure, result.duration_ms)
            }
            Status::Aborted => self.reporter.test_ignored(node),
        }
    }

    fn test_plan_execution_finished(&mut self, _plan: &TestPlan) -> Result<()> {
        self.reporter.run_summary()
    }
}

impl<W: Write> JUnit5Adapter<W> {
    fn is_engine(&self, identifier: &TestIdentifier) -> bool {
        self.plan.as_ref().is_some_and(|p| p.is_engine(identifier))
    }
}

/// Descendants of a skipped container are never started, so report each of
/// them as ignored inside the container's suite.
fn skip_container<W: Write>(
    reporter: &mut Reporter<W>,
    plan: &TestPlan,
    container: &TestIdentifier,
) -> Result<()> {
    reporter.suite_started(&container.node)?;
    for child in plan.get_children(&container.unique_id) {
        if child.is_container() {
            skip_container(reporter, plan, child)?;
        } else {
            reporter.test_ignored(&child.node)?;
        }
    }
    reporter.suite_finished(&container.node)
}
