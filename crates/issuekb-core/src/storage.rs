// Artifact persistence: JSON for the raw dump, MessagePack for everything else.
// Every write goes to a sibling temp file first so a crash mid-write never
// leaves a truncated artifact behind.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Write `bytes` to `path`, replacing any previous content in one rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

pub fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> crate::Result<()> {
    let contents = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &contents)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> crate::Result<T> {
    let contents = std::fs::read(path)?;
    Ok(serde_json::from_slice(&contents)?)
}

pub fn save_msgpack<T: Serialize + ?Sized>(value: &T, path: &Path) -> crate::Result<()> {
    let contents = rmp_serde::to_vec_named(value)?;
    write_atomic(path, &contents)
}

pub fn load_msgpack<T: DeserializeOwned>(path: &Path) -> crate::Result<T> {
    let contents = std::fs::read(path)?;
    Ok(rmp_serde::from_slice(&contents)?)
}
