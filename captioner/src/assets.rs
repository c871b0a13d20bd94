//! Branding asset lookup.
//!
//! The directory is listed once and candidate names are compared against the
//! listing byte for byte, so the outcome is the same on case-sensitive and
//! case-insensitive filesystems: the first candidate present wins.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A snapshot of the file names in an asset directory.
#[derive(Debug, Clone)]
pub struct AssetDirectory {
    root: PathBuf,
    entries: Vec<String>,
}

impl AssetDirectory {
    /// List `root`. A missing or unreadable directory gives an empty listing.
    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut entries: Vec<String> = match std::fs::read_dir(&root) {
            Ok(read) => read
                .filter_map(|e| e.ok())
                // is_file follows symlinks.
                .filter(|e| e.path().is_file())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect(),
            Err(e) => {
                warn!(dir = %root.display(), error = %e, "cannot list asset directory");
                Vec::new()
            }
        };
        entries.sort();
        debug!(dir = %root.display(), files = entries.len(), "scanned asset directory");
        Self { root, entries }
    }

    /// Build from an existing listing.
    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<String>) -> Self {
        Self {
            root: root.into(),
            entries,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every file name found, sorted.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The first candidate, in the given order, that exists in the listing.
    pub fn resolve<S: AsRef<str>>(&self, candidates: &[S]) -> Option<PathBuf> {
        for candidate in candidates {
            let name: &str = candidate.as_ref();
            if self.entries.iter().any(|entry| entry == name) {
                return Some(self.root.join(name));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_LOGO_CANDIDATES, DEFAULT_OUTRO_CANDIDATES};

    #[test]
    fn test_resolve_none_when_nothing_matches() {
        let dir = AssetDirectory::from_entries("/assets", vec!["clip.mov".into(), "notes.txt".into()]);
        assert_eq!(dir.resolve(DEFAULT_LOGO_CANDIDATES), None);
        assert_eq!(dir.resolve(DEFAULT_OUTRO_CANDIDATES), None);
    }

    #[test]
    fn test_resolve_capitalized_variant() {
        let dir = AssetDirectory::from_entries("/assets", vec!["logo.png".into(), "Outro.mp4".into()]);
        assert_eq!(
            dir.resolve(DEFAULT_OUTRO_CANDIDATES),
            Some(PathBuf::from("/assets/Outro.mp4"))
        );
        assert_eq!(
            dir.resolve(DEFAULT_LOGO_CANDIDATES),
            Some(PathBuf::from("/assets/logo.png"))
        );
    }

    #[test]
    fn test_resolve_prefers_priority_order_not_listing_order() {
        let dir = AssetDirectory::from_entries(
            "/assets",
            vec!["LOGO.png".into(), "Logo.png".into(), "logo.png".into()],
        );
        assert_eq!(
            dir.resolve(DEFAULT_LOGO_CANDIDATES),
            Some(PathBuf::from("/assets/logo.png"))
        );

        let dir = AssetDirectory::from_entries("/assets", vec!["OUTRO.mp4".into(), "Outro.mp4".into()]);
        assert_eq!(
            dir.resolve(DEFAULT_OUTRO_CANDIDATES),
            Some(PathBuf::from("/assets/Outro.mp4"))
        );
    }

    #[test]
    fn test_resolve_does_not_case_fold() {
        let dir = AssetDirectory::from_entries("/assets", vec!["oUtRo.mp4".into()]);
        assert_eq!(dir.resolve(DEFAULT_OUTRO_CANDIDATES), None);
    }

    #[test]
    fn test_scan_real_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Outro.mp4"), b"fake").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), b"x").unwrap();
        std::fs::create_dir(tmp.path().join("logo.png")).unwrap(); // a directory, not an asset

        let dir = AssetDirectory::scan(tmp.path());
        assert_eq!(dir.entries(), ["Outro.mp4", "readme.txt"]);
        assert_eq!(dir.resolve(DEFAULT_LOGO_CANDIDATES), None);
        assert_eq!(
            dir.resolve(DEFAULT_OUTRO_CANDIDATES),
            Some(tmp.path().join("Outro.mp4"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_follows_symlinked_assets() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("brand.png"), b"png").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("brand.png"), tmp.path().join("logo.png")).unwrap();
        std::fs::create_dir(tmp.path().join("shared")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("shared"), tmp.path().join("Outro.mp4")).unwrap();

        let dir = AssetDirectory::scan(tmp.path());
        assert_eq!(dir.entries(), ["brand.png", "logo.png"]);
        assert_eq!(
            dir.resolve(DEFAULT_LOGO_CANDIDATES),
            Some(tmp.path().join("logo.png"))
        );
        assert_eq!(dir.resolve(DEFAULT_OUTRO_CANDIDATES), None);
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let dir = AssetDirectory::scan("/nonexistent/assets");
        assert!(dir.entries().is_empty());
        assert_eq!(dir.resolve(&["logo.png"][..]), None);
    }
}
