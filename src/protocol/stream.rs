//! Output channel for protocol messages

use anyhow::{Context, Result};
use std::io::Write;

use super::message::{encode, TestMessage};

/// Owned handle to the channel the editor reads.
///
/// Every message is written as one `write_all` of a complete line and then
/// flushed, so a consumer reading the channel live never sees half a frame.
/// The handle is flushed again when dropped.
pub struct TestOutputStream<W: Write> {
    inner: W,
}

impl<W: Write> TestOutputStream<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn println(&mut self, message: &TestMessage) -> Result<()> {
        let mut line = encode(message)?;
        line.push('\n');

        self.inner
            .write_all(line.as_bytes())
            .with_context(|| format!("Failed to write '{}' message", message.name))?;
        self.inner.flush().context("Failed to flush test output")?;

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().context("Failed to flush test output")
    }
}

impl<W: Write> Drop for TestOutputStream<W> {
    fn drop(&mut self) {
        let _ = self.inner.flush();
    }
}
