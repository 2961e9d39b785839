//! testwire - one event protocol for three Java-style test engines
//!
//! A runner process that drives a JUnit4-, JUnit5- or TestNG-style engine
//! and reports its lifecycle to an editor as framed, line-oriented events:
//! - Identity model for suites and cases (`project@fullName` ids)
//! - Canonical event vocabulary and an invertible message encoding
//! - One adapter per engine translating native listener callbacks
//! - A dispatcher mapping runner tokens and failures to exit codes

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod manifest;
pub mod protocol;
pub mod selection;
pub mod test_model;

#[cfg(test)]
mod testing;

pub use adapter::TestAdapter;
pub use catalog::{Failure, InMemoryCatalog, TestCatalog, TestClass, TestMethod, TestOutcome};
pub use config::Config;
pub use dispatch::{dispatch, DispatchError, RunnerKind};
pub use protocol::{decode, encode, EventKind, Reporter, TestMessage};
pub use selection::Selection;
pub use test_model::{TestKind, TestLevel, TestNode};
