//! Filesystem helpers.
//!
//! Crash-tolerant writes for exported captions and the settings file.
//! A caption file is either the previous version or the complete new one,
//! never a truncated mix of both.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{CoreError, CoreResult};

/// Checks that `path` can receive an output file.
///
/// Creates missing parent directories and rejects a path naming an
/// existing directory.
pub fn prepare_output_path(path: &Path) -> CoreResult<()> {
    if path.as_os_str().is_empty() {
        return Err(CoreError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "output path is empty",
        )));
    }
    if path.is_dir() {
        return Err(CoreError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("output path is a directory: {}", path.display()),
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Writes `bytes` to `path` through a sibling `.tmp` file.
///
/// The temp file is flushed and synced before it is renamed over the
/// destination. An existing destination is moved to `.bak` for the swap and
/// put back if the rename fails. The temp file never outlives a failure.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    prepare_output_path(path)?;

    let tmp = sibling_with_suffix(path, "tmp");
    write_temp(&tmp, |writer| writer.write_all(bytes))?;

    let result = replace_with(path, &tmp);
    if result.is_err() {
        discard(&tmp);
    }
    result
}

/// Creates `tmp`, fills it with `fill`, then flushes and syncs it.
/// On any failure the partial file is removed.
fn write_temp(
    tmp: &Path,
    fill: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> CoreResult<()> {
    let result = File::create(tmp).and_then(|file| {
        let mut writer = BufWriter::new(file);
        fill(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    });
    if let Err(e) = result {
        discard(tmp);
        tracing::warn!(path = %tmp.display(), error = %e, "temp write failed");
        return Err(CoreError::IoError(e));
    }
    Ok(())
}

fn discard(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}

/// Serializes `value` as pretty JSON and writes it atomically
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!("{name}.{suffix}"))
}

fn replace_with(dest: &Path, tmp: &Path) -> CoreResult<()> {
    if !dest.exists() {
        std::fs::rename(tmp, dest)?;
        return Ok(());
    }

    let bak = sibling_with_suffix(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            tracing::warn!(path = %dest.display(), error = %e, "atomic replace failed, previous file restored");
            Err(CoreError::IoError(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cut.srt");

        atomic_write_bytes(&path, b"first").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");

        atomic_write_bytes(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        // No temp or backup file is left behind
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cut.srt".to_string()]);
    }

    #[test]
    fn test_failed_temp_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cut.srt");
        std::fs::write(&path, "previous").unwrap();
        let tmp = sibling_with_suffix(&path, "tmp");

        let result = write_temp(&tmp, |writer| {
            writer.write_all(b"partial")?;
            Err(std::io::Error::other("disk full"))
        });

        assert!(matches!(result, Err(CoreError::IoError(_))));
        assert!(!tmp.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("out.srt");
        atomic_write_bytes(&path, b"x").unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_prepare_output_path_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            prepare_output_path(dir.path()),
            Err(CoreError::IoError(_))
        ));
        assert!(prepare_output_path(Path::new("")).is_err());
    }

    #[test]
    fn test_atomic_write_json_pretty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        atomic_write_json_pretty(&path, &serde_json::json!({ "intervalMs": 100 })).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"intervalMs\": 100"));
    }
}
