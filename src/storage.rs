use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::collection::Collection;
use crate::error::{Error, Result};

const EXTENSION: &str = "jsonl";

/// First line of every snapshot file.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHeader {
    collection: String,
    #[serde(default)]
    unique: Vec<String>,
}

/// Directory of collection snapshots, one JSON-lines file per collection.
///
/// A snapshot is a header line followed by one document per line. Saves go
/// through a temporary file and a rename, so a crash leaves either the old
/// or the new snapshot on disk.
#[derive(Debug)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{EXTENSION}"))
    }

    /// Names of all collections with a snapshot on disk.
    pub fn collection_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<Collection> {
        let reader = BufReader::new(File::open(self.path(name))?);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| Error::CorruptSnapshot(format!("'{name}' is empty")))??;
        let header: SnapshotHeader = serde_json::from_str(&header_line)?;
        if header.collection != name {
            return Err(Error::CorruptSnapshot(format!(
                "file for '{name}' holds collection '{}'",
                header.collection
            )));
        }

        let mut docs = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            docs.push(serde_json::from_str::<Value>(&line)?);
        }
        debug!(collection = name, docs = docs.len(), "loaded snapshot");
        Collection::from_documents(name, docs, &header.unique)
    }

    pub fn save(&self, col: &Collection) -> Result<()> {
        let final_path = self.path(col.name());
        let tmp_path = final_path.with_extension(format!("{EXTENSION}.tmp"));

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let header = SnapshotHeader {
            collection: col.name().to_string(),
            unique: col.unique_fields(),
        };
        serde_json::to_writer(&mut writer, &header)?;
        writer.write_all(b"\n")?;
        for doc in col.documents() {
            serde_json::to_writer(&mut writer, doc)?;
            writer.write_all(b"\n")?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &final_path)?;
        debug!(collection = col.name(), docs = col.count(), "saved snapshot");
        Ok(())
    }

    /// Remove a collection's snapshot. Returns false if there was none.
    pub fn remove(&self, name: &str) -> Result<bool> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
