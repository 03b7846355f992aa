/// Local file records.
///
/// Every saved document has one record keyed by its name. Saving a record
/// with an existing name overwrites it; there is no version history.
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the built-in template document. It can never be saved in place.
pub const DEFAULT_DOCUMENT: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    /// Percent-encoded document content.
    pub encoded_content: String,
    pub name: String,
}

impl FileRecord {
    /// Record for `name` holding `content`, created and modified now.
    pub fn new(name: impl Into<String>, encoded_content: String) -> Self {
        let now = Utc::now();
        Self {
            created: now,
            modified: now,
            encoded_content,
            name: name.into(),
        }
    }

    /// Successor of this record with new content, keeping the creation time.
    pub fn updated(&self, encoded_content: String) -> Self {
        Self {
            created: self.created,
            modified: Utc::now(),
            encoded_content,
            name: self.name.clone(),
        }
    }
}

/// Percent-encode document content the way records and uploads store it.
pub fn encode_content(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

pub fn decode_content(encoded: &str) -> Result<String> {
    urlencoding::decode(encoded)
        .map(|s| s.into_owned())
        .map_err(|e| Error::Serialization(format!("record content: {e}")))
}

/// Persistence of file records.
pub trait FileStore: Send + Sync {
    fn get_file(&self, name: &str) -> Result<Option<FileRecord>>;

    fn save_file(&self, record: &FileRecord) -> Result<()>;

    fn list_files(&self) -> Result<Vec<String>>;
}

/// One JSON file per record under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(name)))
    }
}

impl FileStore for JsonFileStore {
    fn get_file(&self, name: &str) -> Result<Option<FileRecord>> {
        match std::fs::read(self.path_for(name)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::Persistence(format!("record {name:?} is corrupt: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Persistence(format!("cannot read {name:?}: {e}"))),
        }
    }

    fn save_file(&self, record: &FileRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Persistence(format!("cannot create record dir: {e}")))?;

        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Serialization(format!("record {:?}: {e}", record.name)))?;

        // Readers never observe a partially written record.
        let path = self.path_for(&record.name);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| Error::Persistence(format!("cannot write {:?}: {e}", record.name)))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(Error::Persistence(e.to_string())),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Persistence(e.to_string()))?;
            let file_name = entry.file_name();
            let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(name) = urlencoding::decode(stem) {
                names.push(name.into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
