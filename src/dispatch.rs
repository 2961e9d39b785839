//! Runner selection and top-level failure handling
//!
//! The first argument names the runner, the rest are selection tokens.
//! Whatever happens during the run, the caller gets an exit code back and
//! both channels are flushed.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, info};

use crate::adapter::{JUnit5Adapter, JUnitAdapter, TestAdapter, TestNgAdapter};
use crate::catalog::{panic_message, TestCatalog};
use crate::config::RunnerSettings;
use crate::selection::Selection;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No test found to run")]
    NoArguments,

    #[error("Unsupported runner type: {0}.")]
    UnsupportedRunner(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    JUnit,
    JUnit5,
    TestNG,
}

pub const RUNNERS: &[(&str, RunnerKind)] = &[
    ("junit", RunnerKind::JUnit),
    ("junit5", RunnerKind::JUnit5),
    ("testng", RunnerKind::TestNG),
];

impl RunnerKind {
    pub fn from_token(token: &str) -> Result<Self, DispatchError> {
        RUNNERS
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| DispatchError::UnsupportedRunner(token.to_string()))
    }

    pub fn token(&self) -> &'static str {
        RUNNERS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("junit")
    }

    fn adapter<W>(self, out: W, settings: &RunnerSettings) -> Box<dyn TestAdapter>
    where
        W: Write + Send + 'static,
    {
        let scheme = settings.location_scheme.as_str();
        match self {
            RunnerKind::JUnit => Box::new(JUnitAdapter::new(out, scheme)),
            RunnerKind::JUnit5 => Box::new(JUnit5Adapter::new(out, scheme)),
            RunnerKind::TestNG => {
                Box::new(TestNgAdapter::new(out, scheme, settings.testng_threads))
            }
        }
    }
}

/// Run one invocation and return its exit code.
///
/// Events go to `out`, diagnostics to `err`. Test failures never change the
/// exit code; only dispatch errors, adapter errors and panics yield 1.
pub fn dispatch<S, W, E>(
    args: &[S],
    catalog: &dyn TestCatalog,
    settings: &RunnerSettings,
    mut out: W,
    err: &mut E,
) -> i32
where
    S: AsRef<str>,
    W: Write + Send + 'static,
    E: Write,
{
    let code = match parse_args(args) {
        Err(e) => {
            let _ = writeln!(err, "{}", e);
            let _ = out.flush();
            1
        }
        Ok((kind, tokens)) => {
            let selection = Selection::parse(tokens);
            info!(
                "Running {} class selection(s) with the {} runner",
                selection.len(),
                kind.token()
            );

            let mut adapter = kind.adapter(out, settings);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                adapter.run(&selection, catalog)
            }));
            // flushes the output stream
            drop(adapter);

            match outcome {
                Ok(Ok(code)) => code,
                Ok(Err(e)) => {
                    let _ = writeln!(err, "{:?}", e);
                    1
                }
                Err(payload) => {
                    let _ = writeln!(err, "Test run panicked: {}", panic_message(payload.as_ref()));
                    1
                }
            }
        }
    };

    let _ = err.flush();
    debug!("Dispatch finished with exit code {}", code);
    code
}

/// Split the arguments into the runner and its selection tokens
pub fn parse_args<S: AsRef<str>>(args: &[S]) -> Result<(RunnerKind, &[S]), DispatchError> {
    let (first, rest) = args.split_first().ok_or(DispatchError::NoArguments)?;
    Ok((RunnerKind::from_token(first.as_ref())?, rest))
}
