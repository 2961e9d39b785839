//! Engine adapters
//!
//! Each adapter drives one engine and translates that engine's listener
//! callbacks into canonical protocol events. An adapter is built for one
//! invocation and owns the output channel for its lifetime.

pub mod junit4;
pub mod junit5;
pub mod testng;

use anyhow::Result;

use crate::catalog::TestCatalog;
use crate::selection::Selection;

pub use junit4::JUnitAdapter;
pub use junit5::JUnit5Adapter;
pub use testng::TestNgAdapter;

/// Run a selection and return the process exit code
pub trait TestAdapter {
    fn run(&mut self, selection: &Selection, catalog: &dyn TestCatalog) -> Result<i32>;
}
