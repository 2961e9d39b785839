//! Native test engines
//!
//! Three engines with three different lifecycles, each with its own
//! listener interface:
//! - `junit4`: class requests, failures reported before `test_finished`
//! - `junit5`: discovery into a test plan of unique ids, container/test events
//! - `testng`: XML-style suites, data-table invocations, optional parallel classes

pub mod junit4;
pub mod junit5;
pub mod testng;

use std::time::Instant;

/// Milliseconds since `start`, saturating
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
