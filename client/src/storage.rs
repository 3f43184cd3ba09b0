//! File-backed key-value stores.
//!
//! One file per key inside a directory. The cross-process tier points at a
//! directory the widget process can read; the fallback tier at one private
//! to this process. Writes go to a temporary file first and are renamed into
//! place, so a reader never sees a half-written value.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use taskdeck_engine::{Error, KeyValueStore};

const TEMP_SUFFIX: &str = ".tmp";

/// Directory-backed [`KeyValueStore`].
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    temp_counter: AtomicU64,
}

impl FileStore {
    /// Open a store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }
}

/// Map a key to a file name. Characters outside `[A-Za-z0-9._-]` are
/// percent-encoded so distinct keys never collide. A leading dot and the dot
/// of a trailing `.tmp` are encoded too, so names are never `.`/`..` and never
/// look like in-flight temp files.
fn file_name(key: &str) -> String {
    if key.is_empty() {
        return "%".to_string();
    }
    let mut name = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        match byte {
            b'.' if i == 0 => name.push_str("%2E"),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                name.push(byte as char)
            }
            other => name.push_str(&format!("%{other:02X}")),
        }
    }
    if name.ends_with(TEMP_SUFFIX) {
        let stem = name.len() - TEMP_SUFFIX.len();
        name.replace_range(stem..stem + 1, "%2E");
    }
    name
}

fn storage_error(action: &str, key: &str, e: std::io::Error) -> Error {
    Error::Storage(format!("{action} '{key}': {e}"))
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> taskdeck_engine::error::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", key, e)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> taskdeck_engine::error::Result<()> {
        let target = self.path_for(key);
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = self.dir.join(format!(
            "{}.{}.{n}{TEMP_SUFFIX}",
            file_name(key),
            std::process::id()
        ));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
            fs::rename(&temp, &target)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&temp);
            storage_error("write", key, e)
        })
    }

    fn remove(&self, key: &str) -> taskdeck_engine::error::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("remove", key, e)),
        }
    }
}
