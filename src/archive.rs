//! Zip-slip-safe tarball extraction.
//!
//! A downloaded archive is untrusted input: a crafted entry path such as
//! `../../home/user/.profile` would otherwise escape the destination
//! directory. Every entry path is validated purely lexically before a single
//! byte is written, so a malicious archive leaves the destination untouched.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;

/// Failure to extract an archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("archive entry escapes destination directory: {entry}")]
    PathTraversal { entry: String },

    #[error("failed to read archive")]
    Read(#[source] std::io::Error),

    #[error("failed to extract entry {entry}")]
    Write {
        entry: String,
        #[source]
        source: std::io::Error,
    },
}

/// Normalize an archive entry path without touching the filesystem.
///
/// Returns `None` for paths that are absolute, carry a Windows drive prefix,
/// or use `..` to climb above the archive root. `.` components and redundant
/// separators are dropped.
fn sanitize_entry_path(entry: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();

    for component in entry.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(normalized)
}

/// Extract a gzip-compressed tarball into `dest`, guaranteeing that no entry
/// escapes that directory.
///
/// Extraction is all-or-nothing: the archive is walked once to validate every
/// entry path, and only if all of them stay within `dest` does a second pass
/// unpack anything. Directories, regular files, symlinks (on Unix), and hard
/// links are extracted; other entry types are skipped.
pub fn extract_tarball(data: &[u8], dest: &Path) -> Result<(), ExtractError> {
    // Validation pass. The tar stream can only be iterated once, so a fresh
    // decoder is created for each pass.
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    for entry in archive.entries().map_err(ExtractError::Read)? {
        let entry = entry.map_err(ExtractError::Read)?;
        let path = entry.path().map_err(ExtractError::Read)?;

        if sanitize_entry_path(&path).is_none() {
            return Err(ExtractError::PathTraversal {
                entry: path.to_string_lossy().into_owned(),
            });
        }
    }

    std::fs::create_dir_all(dest).map_err(|source| ExtractError::Write {
        entry: dest.to_string_lossy().into_owned(),
        source,
    })?;

    // Extraction pass.
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    for entry in archive.entries().map_err(ExtractError::Read)? {
        let mut entry = entry.map_err(ExtractError::Read)?;
        let raw_path = entry.path().map_err(ExtractError::Read)?.into_owned();
        let entry_name = raw_path.to_string_lossy().into_owned();

        // Already validated above.
        let relative = match sanitize_entry_path(&raw_path) {
            Some(relative) if !relative.as_os_str().is_empty() => relative,
            _ => continue,
        };
        let output_path = dest.join(relative);

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ExtractError::Write {
                entry: entry_name.clone(),
                source,
            })?;
        }

        let entry_type = entry.header().entry_type();
        match entry_type {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&output_path).map_err(|source| ExtractError::Write {
                    entry: entry_name,
                    source,
                })?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::Link => {
                entry
                    .unpack(&output_path)
                    .map_err(|source| ExtractError::Write {
                        entry: entry_name,
                        source,
                    })?;
            }
            tar::EntryType::Symlink => {
                #[cfg(unix)]
                {
                    if let Ok(Some(target)) = entry.link_name() {
                        std::os::unix::fs::symlink(target.as_ref(), &output_path).map_err(
                            |source| ExtractError::Write {
                                entry: entry_name,
                                source,
                            },
                        )?;
                    }
                }
                #[cfg(not(unix))]
                {
                    tracing::debug!("skipping symlink entry: {}", entry_name);
                }
            }
            _ => {
                tracing::debug!("skipping {:?} entry: {}", entry_type, entry_name);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    /// Build an in-memory tar.gz with the given (path, contents) entries.
    fn make_tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            // `append_data` refuses `..` in entry paths, but these tests need
            // to craft exactly such archives; write the name bytes directly.
            header.as_gnu_mut().unwrap().name[..path.len()].copy_from_slice(path.as_bytes());
            header.set_cksum();
            builder.append(&header, contents.as_bytes()).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extracts_confined_entries() {
        let tmp = TempDir::new().unwrap();
        let data = make_tarball(&[
            ("plugins/core.jar", "jar bytes"),
            ("config/settings.ini", "key=value"),
        ]);

        extract_tarball(&data, tmp.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(tmp.path().join("plugins/core.jar")).unwrap(),
            "jar bytes"
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("config/settings.ini")).unwrap(),
            "key=value"
        );
    }

    #[test]
    fn test_internal_dot_dot_stays_confined() {
        let tmp = TempDir::new().unwrap();
        let data = make_tarball(&[("plugins/../flattened.txt", "ok")]);

        extract_tarball(&data, tmp.path()).unwrap();
        assert!(tmp.path().join("flattened.txt").is_file());
    }

    #[test]
    fn test_traversal_entry_rejected() {
        let tmp = TempDir::new().unwrap();
        let data = make_tarball(&[("../evil.txt", "pwned")]);

        let err = extract_tarball(&data, tmp.path()).unwrap_err();
        match err {
            ExtractError::PathTraversal { entry } => assert!(entry.contains("evil.txt")),
            other => panic!("expected PathTraversal, got {:?}", other),
        }
        assert!(!tmp.path().parent().unwrap().join("evil.txt").exists());
    }

    #[test]
    fn test_deep_traversal_rejected() {
        let tmp = TempDir::new().unwrap();
        let data = make_tarball(&[("a/../../../../../../tmp/evil.txt", "pwned")]);

        assert!(matches!(
            extract_tarball(&data, tmp.path()),
            Err(ExtractError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_failure_leaves_destination_unmodified() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("existing.txt"), "before").unwrap();

        // A benign entry followed by a traversal: nothing may be written.
        let data = make_tarball(&[("good.txt", "data"), ("../evil.txt", "pwned")]);

        extract_tarball(&data, tmp.path()).unwrap_err();

        assert!(!tmp.path().join("good.txt").exists());
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("existing.txt")).unwrap(),
            "before"
        );
    }

    #[test]
    fn test_sanitize_rejects_absolute() {
        assert!(sanitize_entry_path(Path::new("/etc/passwd")).is_none());
    }

    #[test]
    fn test_sanitize_normalizes() {
        assert_eq!(
            sanitize_entry_path(Path::new("./a/b/../c")),
            Some(PathBuf::from("a/c"))
        );
    }

    #[test]
    fn test_sanitize_rejects_leading_parent() {
        assert!(sanitize_entry_path(Path::new("../a")).is_none());
        assert!(sanitize_entry_path(Path::new("a/../../b")).is_none());
    }
}
