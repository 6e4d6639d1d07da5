//! Tab separated result log.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::output::records::RESULT_HEADER;
use crate::sink::{ResultSink, SinkError};

/// Writes result rows as TSV, header first.
pub struct TsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl TsvSink<File> {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Self::from_writer(file)
    }
}

impl<W: Write> TsvSink<W> {
    pub fn from_writer(inner: W) -> Result<Self, SinkError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(inner);
        writer.write_record(RESULT_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

impl<W: Write + Send> ResultSink for TsvSink<W> {
    fn write_row(&mut self, row: &[String]) -> Result<(), SinkError> {
        self.writer.write_record(row)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
