use super::FingerprintKey;
use crate::SgdeError;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Holds one line of the index file
#[derive(Debug, Deserialize, Serialize)]
struct IndexRecord {
    key: String,
    path: String,
}

/// Maps configuration fingerprints to stored decomposition files
///
/// The index is an append-only file with one JSON record per line. Records are never
/// rewritten; duplicated keys are allowed and the most recent record wins on lookup.
/// The append handle is held from [DecompositionDatabase::open] until
/// [DecompositionDatabase::close] (or until the instance is dropped).
///
/// Each record is appended with a single write, and a trailing line without its newline
/// terminator is treated as a record still being written; concurrent readers skip it.
pub struct DecompositionDatabase {
    /// Path of the index file
    path: PathBuf,

    /// Append handle (None if opened read-only)
    writer: Option<File>,
}

impl DecompositionDatabase {
    /// Opens (or creates) the index file
    pub fn open<P>(full_path: &P) -> Result<Self, SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let path = Path::new(full_path).to_path_buf();
        if let Some(p) = path.parent() {
            fs::create_dir_all(p).map_err(|e| SgdeError::io(p, e))?;
        }
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SgdeError::io(&path, e))?;
        Ok(DecompositionDatabase {
            path,
            writer: Some(writer),
        })
    }

    /// Opens an existing index file for lookups only
    ///
    /// Nothing is created; a missing file is reported as an i/o error.
    pub fn open_read_only<P>(full_path: &P) -> Result<Self, SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let path = Path::new(full_path).to_path_buf();
        File::open(&path).map_err(|e| SgdeError::io(&path, e))?;
        Ok(DecompositionDatabase {
            path,
            writer: None,
        })
    }

    /// Returns the path of the stored decomposition registered for `key`, if any
    ///
    /// The whole index is scanned; the last matching record wins.
    pub fn lookup(&self, key: &FingerprintKey) -> Result<Option<String>, SgdeError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SgdeError::io(&self.path, e)),
        };
        // the last segment is empty or a record whose append is still in flight
        let complete = match text.rfind('\n') {
            Some(end) => &text[..end],
            None => "",
        };
        let mut found = None;
        for (i, line) in complete.split('\n').enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: IndexRecord = serde_json::from_str(line).map_err(|e| {
                SgdeError::Format(format!("index record {} is malformed: {}", i + 1, e))
            })?;
            if record.key == key.as_str() {
                found = Some(record.path);
            }
        }
        match &found {
            Some(p) => log::info!("decomposition cache hit: {}", p),
            None => log::info!("decomposition cache miss ({})", key.file_stem()),
        }
        Ok(found)
    }

    /// Appends a new record mapping `key` to `stored_path`
    ///
    /// The line and its terminator go out in one write and are synced before returning.
    pub fn register<P>(&mut self, key: &FingerprintKey, stored_path: &P) -> Result<(), SgdeError>
    where
        P: AsRef<OsStr> + ?Sized,
    {
        let writer = self
            .writer
            .as_mut()
            .ok_or(SgdeError::State("the database was opened read-only"))?;
        let record = IndexRecord {
            key: key.as_str().to_string(),
            path: Path::new(stored_path).display().to_string(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| SgdeError::Format(format!("cannot encode index record: {}", e)))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).map_err(|e| SgdeError::io(&self.path, e))?;
        writer.flush().map_err(|e| SgdeError::io(&self.path, e))?;
        writer.sync_data().map_err(|e| SgdeError::io(&self.path, e))?;
        log::debug!("registered {} in {}", record.path, self.path.display());
        Ok(())
    }

    /// Returns the path of the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the append handle (if any)
    pub fn close(mut self) -> Result<(), SgdeError> {
        if let Some(writer) = self.writer.take() {
            writer.sync_all().map_err(|e| SgdeError::io(&self.path, e))?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::DecompositionDatabase;
    use crate::base::DEFAULT_TEST_DIR;
    use crate::database::FingerprintKey;
    use crate::SgdeError;
    use std::fs;

    fn fresh(name: &str) -> String {
        let path = format!("{}/{}", DEFAULT_TEST_DIR, name);
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn register_and_lookup_work() -> Result<(), SgdeError> {
        let path = fresh("database_basic.jsonl");
        let key_a = FingerprintKey::from_string("a".to_string());
        let key_b = FingerprintKey::from_string("b".to_string());
        let mut db = DecompositionDatabase::open(&path)?;
        assert_eq!(db.lookup(&key_a)?, None);
        db.register(&key_a, "/tmp/a1.dec")?;
        db.register(&key_b, "/tmp/b.dec")?;
        db.register(&key_a, "/tmp/a2.dec")?;
        // last write wins
        assert_eq!(db.lookup(&key_a)?, Some("/tmp/a2.dec".to_string()));
        assert_eq!(db.lookup(&key_b)?, Some("/tmp/b.dec".to_string()));
        db.close()?;

        // records survive reopening and the file is never rewritten
        let db = DecompositionDatabase::open(&path)?;
        assert_eq!(db.lookup(&key_a)?, Some("/tmp/a2.dec".to_string()));
        let text = fs::read_to_string(&path).map_err(|e| SgdeError::io(&path, e))?;
        assert_eq!(text.lines().count(), 3);
        Ok(())
    }

    #[test]
    fn lookup_captures_malformed_record() -> Result<(), SgdeError> {
        let path = fresh("database_malformed.jsonl");
        fs::create_dir_all(DEFAULT_TEST_DIR).map_err(|e| SgdeError::io(DEFAULT_TEST_DIR, e))?;
        fs::write(&path, "{\"key\":\"a\",\"path\":\"/tmp/a.dec\"}\nnot json\n").map_err(|e| SgdeError::io(&path, e))?;
        let db = DecompositionDatabase::open(&path)?;
        let key = FingerprintKey::from_string("a".to_string());
        assert!(matches!(db.lookup(&key), Err(SgdeError::Format(_))));
        Ok(())
    }

    #[test]
    fn lookup_skips_unterminated_last_record() -> Result<(), SgdeError> {
        let path = fresh("database_partial.jsonl");
        fs::create_dir_all(DEFAULT_TEST_DIR).map_err(|e| SgdeError::io(DEFAULT_TEST_DIR, e))?;
        fs::write(&path, "{\"key\":\"a\",\"path\":\"/tmp/a.dec\"}\n{\"key\":\"b\",\"pa")
            .map_err(|e| SgdeError::io(&path, e))?;
        let mut db = DecompositionDatabase::open(&path)?;
        let key_a = FingerprintKey::from_string("a".to_string());
        let key_b = FingerprintKey::from_string("b".to_string());
        assert_eq!(db.lookup(&key_a)?, Some("/tmp/a.dec".to_string()));
        assert_eq!(db.lookup(&key_b)?, None);

        // a record made only of the unterminated line is not visible either
        let single = fresh("database_single_partial.jsonl");
        fs::write(&single, "{\"key\":\"a\",\"path\":\"/tmp/a.dec\"}").map_err(|e| SgdeError::io(&single, e))?;
        assert_eq!(DecompositionDatabase::open_read_only(&single)?.lookup(&key_a)?, None);

        // every registered record ends with its terminator
        db.register(&key_b, "/tmp/b.dec")?;
        let text = fs::read_to_string(&path).map_err(|e| SgdeError::io(&path, e))?;
        assert!(text.ends_with("{\"key\":\"b\",\"path\":\"/tmp/b.dec\"}\n"));
        Ok(())
    }

    #[test]
    fn open_read_only_never_creates_files() -> Result<(), SgdeError> {
        let dir = format!("{}/database_missing_dir", DEFAULT_TEST_DIR);
        let _ = fs::remove_dir_all(&dir);
        let path = format!("{}/index.jsonl", dir);
        assert!(matches!(
            DecompositionDatabase::open_read_only(&path),
            Err(SgdeError::Io { .. })
        ));
        assert!(!std::path::Path::new(&dir).exists());

        let path = fresh("database_read_only.jsonl");
        let key = FingerprintKey::from_string("a".to_string());
        let mut db = DecompositionDatabase::open(&path)?;
        db.register(&key, "/tmp/a.dec")?;
        db.close()?;
        let mut reader = DecompositionDatabase::open_read_only(&path)?;
        assert_eq!(reader.lookup(&key)?, Some("/tmp/a.dec".to_string()));
        assert!(matches!(reader.register(&key, "/tmp/b.dec"), Err(SgdeError::State(_))));
        reader.close()?;
        Ok(())
    }
}
