//! On-disk document encoding and crash-consistent replacement.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{FileFormat, PersistError};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, D> {
    version: u32,
    #[serde(flatten)]
    body: &'a D,
}

#[derive(Deserialize)]
struct Envelope<D> {
    version: u32,
    #[serde(flatten)]
    body: D,
}

fn io_error(path: &Path, source: io::Error) -> PersistError {
    PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Sibling path the next version is staged in before it replaces `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Encode `body` with the version envelope.
pub fn encode<D: Serialize>(
    path: &Path,
    body: &D,
    format: FileFormat,
) -> Result<Vec<u8>, PersistError> {
    let envelope = EnvelopeRef {
        version: FORMAT_VERSION,
        body,
    };
    let mut bytes = match format {
        FileFormat::Json => serde_json::to_vec(&envelope),
        FileFormat::JsonPretty => serde_json::to_vec_pretty(&envelope),
    }
    .map_err(|source| PersistError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Read and decode the document at `path`.
///
/// Malformed content and unknown versions are reported as
/// [`PersistError::Corrupt`]; the file is left as it is.
pub fn read_document<D: DeserializeOwned>(path: &Path) -> Result<D, PersistError> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let envelope: Envelope<D> =
        serde_json::from_slice(&bytes).map_err(|e| PersistError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if envelope.version != FORMAT_VERSION {
        return Err(PersistError::Corrupt {
            path: path.to_path_buf(),
            reason: format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                envelope.version
            ),
        });
    }
    Ok(envelope.body)
}

/// Replace the file at `path` with `bytes`.
///
/// The bytes are written and synced to a staging file which is then renamed
/// over the target, so a reader sees either the old or the new content.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let staging = staging_path(path);
    let result = (|| {
        let mut file = File::create(&staging)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&staging, path)
    })();
    if let Err(e) = result {
        fs::remove_file(&staging).ok();
        return Err(io_error(path, e));
    }
    sync_parent(path);
    Ok(())
}

/// Create the parent directory of `path` if needed.
pub fn ensure_parent(path: &Path) -> Result<(), PersistError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))
        }
        _ => Ok(()),
    }
}

// Best-effort: persists the rename on platforms where directories can be synced.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(handle) = File::open(dir) {
            handle.sync_all().ok();
        }
    }
}
