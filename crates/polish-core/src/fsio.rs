//! Atomic file I/O.
//!
//! The pipeline's crash-safety story rests on two commit primitives: the
//! rename at the end of `write_atomic` and the transaction-log append. A
//! process killed at any other point leaves either the old file bytes or a
//! stray `.tmp.*` sibling, never a half-written target.
//!
//! `write_atomic` writes to a sibling temp file, reads it back and compares
//! bytes before renaming onto the target. Durability (fsync) is not part of
//! the contract; verified-before-rename is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Context, Result};

use crate::digest::sha256_hex;

static TEMP_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Sibling temp path for `target`: `<name>.tmp.<pid>.<token>`.
///
/// The temp file must live next to the target so the final rename never
/// crosses a filesystem boundary.
fn temp_sibling(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| anyhow!("cannot write atomically to {}: no file name", target.display()))?
        .to_string_lossy()
        .to_string();
    let token = TEMP_TOKEN.fetch_add(1, Ordering::Relaxed);
    Ok(target.with_file_name(format!("{name}.tmp.{}.{token}", std::process::id())))
}

/// Write `bytes` to `path` atomically: temp sibling, read-back verify, rename.
///
/// Creates missing parent directories. On any failure the temp file is
/// unlinked (not-found ignored) and the target is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let tmp = temp_sibling(path)?;
    let result = write_verify_rename(&tmp, path, bytes);
    if result.is_err() {
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => eprintln!("warning: failed to remove temp file {}: {e}", tmp.display()),
        }
    }
    result
}

fn write_verify_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;

    let readback = fs::read(tmp).with_context(|| format!("failed to re-read {}", tmp.display()))?;
    if readback != bytes {
        return Err(anyhow!(
            "atomic write verification failed for {}: wrote {} bytes, read back {}",
            target.display(),
            bytes.len(),
            readback.len()
        ));
    }

    fs::rename(tmp, target).with_context(|| {
        format!("failed to rename {} onto {}", tmp.display(), target.display())
    })
}

/// Move `src` to `dst`, preferring a plain rename.
///
/// A cross-device rename falls back to copy-with-verify followed by
/// unlinking the source.
pub fn move_safe(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_safe(src, dst)?;
            fs::remove_file(src)
                .with_context(|| format!("failed to remove {} after copy", src.display()))
        }
        Err(e) => Err(anyhow!(
            "failed to move {} to {}: {e}",
            src.display(),
            dst.display()
        )),
    }
}

/// Copy `src` to `dst` atomically and verify the destination hash matches.
pub fn copy_safe(src: &Path, dst: &Path) -> Result<()> {
    let bytes = fs::read(src).with_context(|| format!("failed to read {}", src.display()))?;
    let src_hash = sha256_hex(&bytes);

    write_atomic(dst, &bytes)?;

    let copied = fs::read(dst).with_context(|| format!("failed to re-read {}", dst.display()))?;
    let dst_hash = sha256_hex(&copied);
    if src_hash != dst_hash {
        return Err(anyhow!(
            "copy verification failed: {} ({src_hash}) vs {} ({dst_hash})",
            src.display(),
            dst.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_creates_parents_and_roundtrips() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("nested/deeper/file.md");

        write_atomic(&target, b"hello").expect("write");
        assert_eq!(fs::read(&target).expect("read"), b"hello");
    }

    #[test]
    fn write_atomic_replaces_existing_content() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("file.md");

        write_atomic(&target, b"first").expect("write 1");
        write_atomic(&target, b"second").expect("write 2");
        assert_eq!(fs::read(&target).expect("read"), b"second");
    }

    #[test]
    fn write_atomic_leaves_no_temp_siblings_behind() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("file.md");
        write_atomic(&target, b"content").expect("write");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "stray temp files: {leftovers:?}");
    }

    #[test]
    fn move_safe_renames_within_one_filesystem() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("a.md");
        let dst = dir.path().join("sub/b.md");
        fs::write(&src, b"payload").expect("seed");

        move_safe(&src, &dst).expect("move");
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).expect("read"), b"payload");
    }

    #[test]
    fn copy_safe_verifies_destination_bytes() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("a.md");
        let dst = dir.path().join("b.md");
        fs::write(&src, b"payload").expect("seed");

        copy_safe(&src, &dst).expect("copy");
        assert!(src.exists(), "copy must not consume the source");
        assert_eq!(fs::read(&dst).expect("read"), b"payload");
    }
}
