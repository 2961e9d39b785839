//! Canonical event names and attribute keys

use std::fmt;
use std::str::FromStr;

pub const NAME: &str = "name";
pub const LOCATION: &str = "location";
pub const DURATION: &str = "duration";
pub const MESSAGE: &str = "message";
pub const DETAILS: &str = "details";

/// Name of the synthetic root suite
pub const ROOT_SUITE_NAME: &str = "Default Suite";

/// Scheme prefixed to every `location` attribute unless configured otherwise
pub const DEFAULT_LOCATION_SCHEME: &str = "java:test";

/// Every event an adapter may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReporterAttached,
    RootPresentation,
    SuiteStarted,
    SuiteFinished,
    TestStarted,
    TestFinished,
    TestFailed,
    TestIgnored,
    TestRunSummary,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::ReporterAttached,
        EventKind::RootPresentation,
        EventKind::SuiteStarted,
        EventKind::SuiteFinished,
        EventKind::TestStarted,
        EventKind::TestFinished,
        EventKind::TestFailed,
        EventKind::TestIgnored,
        EventKind::TestRunSummary,
    ];

    /// Name written on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ReporterAttached => "testReporterAttached",
            EventKind::RootPresentation => "rootName",
            EventKind::SuiteStarted => "testSuiteStarted",
            EventKind::SuiteFinished => "testSuiteFinished",
            EventKind::TestStarted => "testStarted",
            EventKind::TestFinished => "testFinished",
            EventKind::TestFailed => "testFailed",
            EventKind::TestIgnored => "testIgnored",
            EventKind::TestRunSummary => "testRunSummary",
        }
    }

    pub fn required_attributes(&self) -> &'static [&'static str] {
        match self {
            EventKind::ReporterAttached => &[],
            EventKind::RootPresentation => &[NAME],
            EventKind::SuiteStarted => &[NAME, LOCATION],
            EventKind::SuiteFinished => &[NAME],
            EventKind::TestStarted => &[NAME, LOCATION],
            EventKind::TestFinished => &[NAME, DURATION],
            EventKind::TestFailed => &[NAME, MESSAGE, DURATION],
            EventKind::TestIgnored => &[NAME],
            EventKind::TestRunSummary => &[MESSAGE],
        }
    }

    pub fn optional_attributes(&self) -> &'static [&'static str] {
        match self {
            EventKind::TestFailed => &[DETAILS],
            _ => &[],
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown event name '{}'", s))
    }
}

/// Body of the terminal summary message
pub fn summary_text(all: usize, failures: usize, skips: usize) -> String {
    format!(
        "Total tests run: {}, Failures: {}, Skips: {}",
        all, failures, skips
    )
}
