//! JSON Lines trial log: one serialized [`TrialEvent`] per line.
//!
//! The log is diagnostic output. Lines are written in trial order and carry
//! no schema version; readers should treat unknown fields as optional.
//!
//! [`TrialSink::record`] cannot fail, so the first write error is kept and
//! every later event is dropped. [`JsonlTrialLog::finish`] surfaces it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use recrash_search::trial::{TrialEvent, TrialSink};

/// Error writing the trial log.
#[derive(Debug, thiserror::Error)]
pub enum TrialLogError {
    #[error("trial log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trial log serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A [`TrialSink`] writing JSON Lines to `W`.
#[derive(Debug)]
pub struct JsonlTrialLog<W: Write> {
    writer: W,
    lines: u64,
    error: Option<TrialLogError>,
}

impl JsonlTrialLog<BufWriter<File>> {
    /// Create (or truncate) a log file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TrialLogError::Io`] if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TrialLogError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonlTrialLog<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lines: 0,
            error: None,
        }
    }

    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Write one event as a line.
    ///
    /// # Errors
    ///
    /// Returns [`TrialLogError`] if serialization or the write fails.
    pub fn write_event(&mut self, event: &TrialEvent) -> Result<(), TrialLogError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and return the writer.
    ///
    /// # Errors
    ///
    /// Returns the first error seen while recording, or the flush error.
    pub fn finish(mut self) -> Result<W, TrialLogError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> TrialSink for JsonlTrialLog<W> {
    fn record(&mut self, event: &TrialEvent) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.write_event(event) {
            tracing::warn!(trial = event.trial, %err, "trial log write failed; dropping later events");
            self.error = Some(err);
        }
    }
}
