//! Utility functions for filenames, output paths and digests

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::DocumentRequest;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Characters that are not allowed in filenames on common filesystems
const ILLEGAL_FILENAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Replace filesystem-illegal characters with `_`
///
/// Sanitizing an already sanitized name returns it unchanged.
///
/// # Examples
///
/// ```
/// use label_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("A/B:C.pdf"), "A_B_C.pdf");
/// assert_eq!(sanitize_filename("A_B_C.pdf"), "A_B_C.pdf");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Name of an archive created at `now`
///
/// ISO-8601 UTC at second precision with `:` and `.` replaced by `-`,
/// e.g. `shipping_labels_2024-05-01T10-20-30.zip`.
#[must_use]
pub fn archive_filename(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.zip", prefix, now.format("%Y-%m-%dT%H-%M-%S"))
}

/// Name of a merged or printable document created at `now`
#[must_use]
pub fn document_filename(prefix: &str, now: DateTime<Utc>, extension: &str) -> String {
    format!("{}_{}.{}", prefix, now.format("%Y-%m-%dT%H-%M-%S"), extension)
}

/// Lowercase hex SHA-256 of `bytes`
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Split a filename into stem and extension the same way [`Path`] does
fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

fn numbered_name(stem: &str, extension: Option<&str>, n: u32) -> String {
    match extension {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    }
}

/// Reserve a name that is unique among `taken`, appending ` (n)` on collision
///
/// Used for archive entries, where two rows may sanitize to the same filename.
pub fn unique_entry_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, extension) = split_name(name);
    let mut n = 1;
    loop {
        let candidate = numbered_name(stem, extension, n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Get a unique path for a file, handling collisions according to the specified action
///
/// # Arguments
///
/// * `path` - The desired file path
/// * `action` - How to handle file collisions
///
/// # Returns
///
/// For Rename, `label (1).zip`, `label (2).zip`, ... until a free name is found.
/// For Skip, an error if the file already exists.
/// For Overwrite, the original path unchanged.
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "File already exists and collision action is Skip".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let file_name = path
                .file_name()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::FileCollision {
                    path: path.to_path_buf(),
                    reason: "Cannot extract file name".to_string(),
                })?;
            let (stem, extension) = split_name(file_name);

            let parent = path.parent().ok_or_else(|| Error::FileCollision {
                path: path.to_path_buf(),
                reason: "Cannot extract parent directory".to_string(),
            })?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_path = parent.join(numbered_name(stem, extension, i));
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(Error::FileCollision {
                path: path.to_path_buf(),
                reason: format!(
                    "Could not find unique filename after {} attempts",
                    MAX_RENAME_ATTEMPTS
                ),
            })
        }
    }
}

/// Confirmation text listing the first `limit` order codes of a selection
pub fn preview_requests(requests: &[DocumentRequest], limit: usize) -> String {
    let mut message = format!("Download {} shipping label(s)?\n", requests.len());
    for (i, request) in requests.iter().take(limit).enumerate() {
        message.push_str(&format!("{}. {}\n", i + 1, request.order_code));
    }
    if requests.len() > limit {
        message.push_str(&format!("... and {} more\n", requests.len() - limit));
    }
    message
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn sanitize_replaces_every_illegal_char() {
        assert_eq!(sanitize_filename(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for name in ["A/B", "plain.pdf", "x:y|z", "", "ü<ñ>.pdf"] {
            let once = sanitize_filename(name);
            assert_eq!(sanitize_filename(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn archive_filename_uses_second_precision_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap();
        assert_eq!(
            archive_filename("shipping_labels", now),
            "shipping_labels_2024-05-01T10-20-30.zip"
        );
    }

    #[test]
    fn document_filename_uses_given_extension() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            document_filename("labels", now, "pdf"),
            "labels_2024-01-02T03-04-05.pdf"
        );
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn unique_entry_name_suffixes_duplicates() {
        let mut taken = HashSet::new();
        assert_eq!(unique_entry_name("a.pdf", &mut taken), "a.pdf");
        assert_eq!(unique_entry_name("a.pdf", &mut taken), "a (1).pdf");
        assert_eq!(unique_entry_name("a.pdf", &mut taken), "a (2).pdf");
        assert_eq!(unique_entry_name("noext", &mut taken), "noext");
        assert_eq!(unique_entry_name("noext", &mut taken), "noext (1)");
    }

    #[test]
    fn get_unique_path_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.zip");
        let result = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(result, path);
    }

    #[test]
    fn get_unique_path_rename_with_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.zip");
        File::create(&path).unwrap();

        let result = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(result, dir.path().join("labels (1).zip"));
    }

    #[test]
    fn get_unique_path_sequential() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.pdf");
        File::create(&path).unwrap();
        File::create(dir.path().join("labels (1).pdf")).unwrap();

        let result = get_unique_path(&path, FileCollisionAction::Rename).unwrap();
        assert_eq!(result, dir.path().join("labels (2).pdf"));
    }

    #[test]
    fn get_unique_path_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.zip");
        File::create(&path).unwrap();
        assert_eq!(
            get_unique_path(&path, FileCollisionAction::Overwrite).unwrap(),
            path
        );
    }

    #[test]
    fn get_unique_path_skip_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.zip");
        File::create(&path).unwrap();
        let err = get_unique_path(&path, FileCollisionAction::Skip).unwrap_err();
        assert!(matches!(err, Error::FileCollision { .. }));
    }

    #[test]
    fn preview_lists_first_entries_then_remainder() {
        let requests: Vec<_> = (0..12)
            .map(|i| DocumentRequest::new("https://x", "a.pdf", format!("C{i}"), i))
            .collect();

        let preview = preview_requests(&requests, 10);

        assert!(preview.starts_with("Download 12 shipping label(s)?"));
        assert!(preview.contains("1. C0\n"));
        assert!(preview.contains("10. C9\n"));
        assert!(!preview.contains("C10"));
        assert!(preview.ends_with("... and 2 more\n"));
    }
}
