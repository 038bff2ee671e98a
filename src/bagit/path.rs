//! Conversion between host filesystem paths and manifest-relative paths, and
//! the payload-safety check that keeps a manifest entry from escaping the
//! bag's payload directory.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use crate::bagit::consts::RESERVED_DEVICE_NAMES;
use crate::bagit::encoding::{percent_decode, percent_encode};
use crate::bagit::error::Error::{InvalidUtf8Path, UnsafePath};
use crate::bagit::error::*;

/// Converts a host-relative path into the `/`-separated, percent-encoded form
/// that is stored in a manifest line.
pub fn to_manifest_path(path: &Path) -> Result<String> {
    let as_str = path.to_str().ok_or_else(|| InvalidUtf8Path {
        path: path.to_path_buf(),
    })?;

    let normalized = convert_path_separator(as_str);
    Ok(percent_encode(&normalized).into_owned())
}

/// Converts a manifest-relative path back into a host `PathBuf`, applying the
/// payload-safety check along the way. Fails with `Error::UnsafePath` if the
/// path would escape the bag root.
pub fn from_manifest_path(manifest_path: &str) -> Result<PathBuf> {
    let decoded = percent_decode(manifest_path);
    check_safe(&decoded)?;
    Ok(PathBuf::from(decoded.replace('/', std::path::MAIN_SEPARATOR_STR)))
}

/// Validates that a manifest-relative path is safe to resolve against the bag
/// root: not absolute, no `..` segment, no reserved device name, and (when
/// `must_be_payload` is set) prefixed with `data/`.
pub fn check_safe(manifest_path: &str) -> Result<()> {
    if manifest_path.is_empty() {
        return Err(UnsafePath {
            path: manifest_path.to_string(),
        });
    }

    if manifest_path.starts_with('/')
        || manifest_path.starts_with('\\')
        || is_drive_letter_prefixed(manifest_path)
        || manifest_path.starts_with("//")
    {
        return Err(UnsafePath {
            path: manifest_path.to_string(),
        });
    }

    let unix_like = manifest_path.replace('\\', "/");
    let path = Path::new(&unix_like);

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(UnsafePath {
                    path: manifest_path.to_string(),
                });
            }
            Component::Normal(segment) => {
                let segment = segment.to_string_lossy();
                let bare = segment.split('.').next().unwrap_or(&segment);
                if RESERVED_DEVICE_NAMES
                    .iter()
                    .any(|reserved| reserved.eq_ignore_ascii_case(bare))
                {
                    return Err(UnsafePath {
                        path: manifest_path.to_string(),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(UnsafePath {
                    path: manifest_path.to_string(),
                });
            }
            Component::CurDir => {}
        }
    }

    Ok(())
}

/// Returns `true` if `p` names a file under the payload directory, i.e.
/// begins with `data/`.
pub fn is_payload_path(p: &str) -> bool {
    p == "data" || p.starts_with("data/")
}

fn is_drive_letter_prefixed(p: &str) -> bool {
    let bytes = p.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(target_os = "windows")]
pub fn convert_path_separator(path: &str) -> Cow<str> {
    if path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        path.into()
    }
}

#[cfg(not(target_os = "windows"))]
pub fn convert_path_separator(path: &str) -> Cow<str> {
    path.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_segment() {
        assert!(check_safe("data/../etc/passwd").is_err());
        assert!(check_safe("../escape").is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(check_safe("/etc/passwd").is_err());
        assert!(check_safe("C:\\Windows\\System32").is_err());
    }

    #[test]
    fn rejects_reserved_device_names() {
        assert!(check_safe("data/CON").is_err());
        assert!(check_safe("data/con.txt").is_err());
        assert!(check_safe("data/lpt9").is_err());
    }

    #[test]
    fn accepts_normal_paths() {
        assert!(check_safe("data/dir/file.txt").is_ok());
        assert!(check_safe("bag-info.txt").is_ok());
    }

    #[test]
    fn identifies_payload_paths() {
        assert!(is_payload_path("data/a/b.txt"));
        assert!(!is_payload_path("bag-info.txt"));
    }
}
