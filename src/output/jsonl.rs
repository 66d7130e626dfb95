//! JSON lines dataset sink

use crate::output::traits::{DatasetSink, OutputError, OutputResult};
use crate::state::EntityRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Writes one JSON record per line
pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Creates (or truncates) the dataset file
    pub fn create(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl DatasetSink for JsonlSink {
    fn append(&self, records: &[EntityRecord]) -> OutputResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| OutputError::Write("dataset writer poisoned".to_string()))?;

        for record in records {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Keeps appended records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<EntityRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EntityRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DatasetSink for MemorySink {
    fn append(&self, records: &[EntityRecord]) -> OutputResult<()> {
        let mut stored = self
            .records
            .lock()
            .map_err(|_| OutputError::Write("memory sink poisoned".to_string()))?;
        stored.extend_from_slice(records);
        Ok(())
    }
}
