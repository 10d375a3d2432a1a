//! Uploads-directory management.
//!
//! Uploaded files are transient working copies: they exist so the
//! path-oriented image loader can read them, and they are cleaned up
//! aggressively — after processing (policy flag), at save time (once the
//! bytes are captured in memory), and by an age-based sweep for anything
//! that slipped through. Deletion is always best-effort: a file that
//! cannot be removed is logged and left for the next sweep, never an
//! error surfaced to the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Extensions accepted at submission time.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "pdf"];

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Reduce a caller-supplied filename to a safe basename.
///
/// Path separators are stripped, runs of unsafe characters collapse to a
/// single underscore, and leading dots/underscores are removed so the
/// result can never escape the uploads directory or hide itself.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let trimmed = cleaned.trim_start_matches(['.', '_']).trim_end_matches('_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Check the extension allow-list, case-insensitively.
pub fn is_allowed(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Write upload bytes under `dir`, creating the directory if needed.
pub fn save_upload(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    debug!("Stored upload: {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

/// Best-effort delete. Returns true only if the file existed and was
/// removed.
pub fn delete_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Deleted file: {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Error deleting file {}: {e}", path.display());
            false
        }
    }
}

/// Remove files under `dir` older than `max_age`. Returns the number
/// deleted.
pub fn sweep_stale(dir: &Path, max_age: Duration) -> usize {
    let now = SystemTime::now();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        // A missing uploads dir just means nothing has been written yet.
        Err(_) => return 0,
    };

    let mut count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        let expired = now
            .duration_since(modified)
            .map(|age| age > max_age)
            .unwrap_or(false);
        if expired && delete_file(&path) {
            count += 1;
        }
    }
    if count > 0 {
        info!("Upload sweep removed {count} stale file(s)");
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths_and_specials() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my scan (1).png"), "my_scan_1_.png");
        assert_eq!(sanitize_filename("C:\\Users\\me\\chk.jpg"), "chk.jpg");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("///"), "upload");
        assert_eq!(sanitize_filename("scan.png"), "scan.png");
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        assert!(is_allowed("scan.PNG"));
        assert!(is_allowed("scan.jpeg"));
        assert!(is_allowed("doc.pdf"));
        assert!(!is_allowed("archive.zip"));
        assert!(!is_allowed("noextension"));
    }

    #[test]
    fn save_and_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("uploads");
        let path = save_upload(&sub, "a.png", b"bytes").unwrap();
        assert!(path.exists());
        assert!(delete_file(&path));
        assert!(!path.exists());
        // Second delete: nothing there any more.
        assert!(!delete_file(&path));
    }

    #[test]
    fn sweep_removes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        save_upload(dir.path(), "old.png", b"x").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        // Nothing is older than an hour.
        assert_eq!(sweep_stale(dir.path(), Duration::from_secs(3600)), 0);
        // Everything is older than ~zero.
        assert_eq!(sweep_stale(dir.path(), Duration::from_millis(1)), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn sweep_tolerates_missing_dir() {
        assert_eq!(
            sweep_stale(Path::new("/no/such/dir"), Duration::from_secs(1)),
            0
        );
    }
}
