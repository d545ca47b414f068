//! Destination filename rules.
//!
//! Offered names are reduced to a bare file name before being joined onto the
//! output directory, and an existing file that should not be overwritten is
//! dodged with a ` (N)` suffix probe.

use std::path::{Path, PathBuf};

/// Strip path components and control characters from an offered filename.
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    // Handle both separators; backslash is an ordinary character on Unix.
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);

    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '/' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Find a non-colliding variant of `path`.
///
/// If `path` does not exist it is returned unchanged; otherwise
/// `<base> (2)<ext>`, `<base> (3)<ext>`, ... are probed in the same directory
/// and the first free one is returned.
pub fn safe_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("download");
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let mut n = 2u32;
    loop {
        let candidate = dir.join(format!("{} ({}){}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths() {
        assert_eq!(sanitize_filename("file.bin"), Some("file.bin".into()));
        assert_eq!(
            sanitize_filename("../../../etc/passwd"),
            Some("passwd".into())
        );
        assert_eq!(
            sanitize_filename("..\\..\\windows\\system32"),
            Some("system32".into())
        );
        assert_eq!(sanitize_filename(".hidden"), Some("hidden".into()));
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("two words.pdf"), Some("two words.pdf".into()));
    }

    #[test]
    fn safe_path_returns_free_path_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        assert_eq!(safe_path(&path), path);
    }

    #[test]
    fn safe_path_probes_increasing_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        std::fs::write(&path, b"x").unwrap();

        let first = safe_path(&path);
        assert_eq!(first, dir.path().join("file (2).bin"));
        assert!(!first.exists());

        // With the same pre-existing set the rule is idempotent; once the
        // first candidate exists it moves strictly upward.
        assert_eq!(safe_path(&path), first);
        std::fs::write(&first, b"x").unwrap();
        let second = safe_path(&path);
        assert_eq!(second, dir.path().join("file (3).bin"));
        assert!(!second.exists());
    }

    #[test]
    fn safe_path_handles_extensionless_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("README");
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(safe_path(&path), dir.path().join("README (2)"));
    }
}
