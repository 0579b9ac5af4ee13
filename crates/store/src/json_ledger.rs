//! JSON file ledger store.

use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use pipeline::{Ledger, LedgerError, LedgerStore};
use tempfile::NamedTempFile;
use tracing::debug;

/// Stores the ledger as a pretty-printed JSON document.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a reader never observes a half-written ledger.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
    description: String,
}

impl JsonLedgerStore {
    /// A store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            description: String::new(),
        }
    }

    /// Description given to the ledger when the file does not exist.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, message: impl ToString) -> LedgerError {
        LedgerError::Read {
            location: self.location(),
            message: message.to_string(),
        }
    }

    fn write_error(&self, message: impl ToString) -> LedgerError {
        LedgerError::Write {
            location: self.location(),
            message: message.to_string(),
        }
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self) -> Result<Ledger, LedgerError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no ledger on disk, starting empty");
                return Ok(Ledger::new(self.description.clone()));
            }
            Err(e) => return Err(self.read_error(e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| LedgerError::Malformed {
            location: self.location(),
            message: e.to_string(),
        })
    }

    fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.write_error(e))?;

        let temp = NamedTempFile::new_in(dir).map_err(|e| self.write_error(e))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, ledger).map_err(|e| self.write_error(e))?;
            writer.write_all(b"\n").map_err(|e| self.write_error(e))?;
            writer.flush().map_err(|e| self.write_error(e))?;
        }
        temp.as_file().sync_all().map_err(|e| self.write_error(e))?;
        temp.persist(&self.path).map_err(|e| self.write_error(e.error))?;

        debug!(path = %self.path.display(), records = ledger.len(), "ledger persisted");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
