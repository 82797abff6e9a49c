use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use tracing::{error, info};

use super::data::{DATA_FILE_HEADER, DataRow, Record};
use crate::error::{LoggerError, Result};

/// Append-only CSV writer. Every call has reached the disk by the time it
/// returns.
pub struct RecordWriter {
    writer: Writer<File>,
    path: PathBuf,
}

impl RecordWriter {
    /// Create (or truncate) the data file. The directory must already exist.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            error!(
                "Data directory not found. Please ensure the data directory exists. Data file path: {}",
                path.display()
            );
            return Err(LoggerError::MissingDirectory(dir));
        }

        let file = File::create(&path)?;
        let writer = WriterBuilder::new().has_headers(false).from_writer(file);
        info!("Opened data file {}", path.display());
        Ok(RecordWriter { writer, path })
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.writer.write_record(DATA_FILE_HEADER)?;
        self.commit()
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.writer.serialize(DataRow::from(record))?;
        self.commit()
    }

    /// Flush the CSV buffer, then fsync.
    fn commit(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.commit()?;
        info!("Closed data file {}", self.path.display());
        Ok(())
    }
}
