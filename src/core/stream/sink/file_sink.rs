// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::core::error::{CfrError, CfrResult};
use crate::core::stream::sink::sink_trait::Sink;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Appends records back to back to a file, the layout `cfr-tool decode`
/// reads.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
    writer: Arc<Mutex<BufWriter<File>>>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> CfrResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            path,
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn stop(&self) {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.flush() {
            log::error!("Failed to flush {}: {}", self.path.display(), e);
        }
    }

    fn publish(&self, record: &[u8]) -> CfrResult<()> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(record)
            .map_err(|e| {
                CfrError::sink_with_source(
                    format!("write to {} failed", self.path.display()),
                    Box::new(e),
                )
            })
    }

    fn clone_box(&self) -> Box<dyn Sink> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.bin");
        let sink = FileSink::create(&path).unwrap();
        sink.publish(&[1, 2, 3]).unwrap();
        sink.publish(&[4]).unwrap();
        sink.stop();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
    }
}
