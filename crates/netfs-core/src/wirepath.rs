//! Wire path handling and containment
//!
//! Paths travel as NUL-terminated byte strings that always begin with `/`;
//! the single-character path `/` denotes the service root. Resolution onto
//! the service root rejects `..` components outright so a client can never
//! escape the exported tree, and never follows the kernel's idea of the
//! current directory.

use std::path::{Path, PathBuf};

use crate::error::ProtocolError;
use crate::MAX_PATH_LEN;

/// Encode a path for the wire, appending the NUL terminator.
pub fn encode_path(path: &str) -> Result<Vec<u8>, ProtocolError> {
    validate(path)?;
    let mut buf = Vec::with_capacity(path.len() + 1);
    buf.extend_from_slice(path.as_bytes());
    buf.push(0);
    Ok(buf)
}

/// Decode a received payload into a path string. The payload must be the
/// exact bytes announced by the header: path, then the terminator.
pub fn decode_path(payload: &[u8]) -> Result<String, ProtocolError> {
    let Some((&0, body)) = payload.split_last() else {
        return Err(ProtocolError::BadPath("missing NUL terminator".into()));
    };
    let path = std::str::from_utf8(body)
        .map_err(|_| ProtocolError::BadPath("path is not valid UTF-8".into()))?;
    validate(path)?;
    Ok(path.to_owned())
}

fn validate(path: &str) -> Result<(), ProtocolError> {
    if path.is_empty() {
        return Err(ProtocolError::BadPath("empty path".into()));
    }
    if !path.starts_with('/') {
        return Err(ProtocolError::BadPath(format!(
            "path must start with '/': {path:?}"
        )));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: path.len(),
            max: MAX_PATH_LEN,
        });
    }
    if path.contains('\0') {
        return Err(ProtocolError::BadPath("path contains NUL byte".into()));
    }
    Ok(())
}

/// Resolve a wire path onto the service root.
///
/// Components are appended one at a time; `.` is ignored and `..` is
/// rejected, so the result always stays inside `root` without touching the
/// filesystem.
pub fn resolve(root: &Path, wire_path: &str) -> Result<PathBuf, ProtocolError> {
    validate(wire_path)?;

    let mut result = root.to_path_buf();
    for component in wire_path.split('/').filter(|c| !c.is_empty()) {
        match component {
            "." => {}
            ".." => {
                return Err(ProtocolError::BadPath(
                    "parent directory (..) not allowed".into(),
                ));
            }
            name => result.push(name),
        }
    }

    // Belt-and-suspenders containment check.
    if !result.starts_with(root) {
        return Err(ProtocolError::BadPath("path escapes service root".into()));
    }

    Ok(result)
}

/// True when the wire path names the service root itself.
pub fn is_root(wire_path: &str) -> bool {
    wire_path == "/"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_terminator() {
        assert_eq!(encode_path("/a").unwrap(), b"/a\0");
        assert_eq!(encode_path("/").unwrap(), b"/\0");
    }

    #[test]
    fn test_decode_roundtrip() {
        let wire = encode_path("/srv/data/file.txt").unwrap();
        assert_eq!(decode_path(&wire).unwrap(), "/srv/data/file.txt");
    }

    #[test]
    fn test_decode_rejects_missing_terminator() {
        assert!(decode_path(b"/abc").is_err());
        assert!(decode_path(b"").is_err());
    }

    #[test]
    fn test_decode_rejects_relative() {
        assert!(decode_path(b"abc\0").is_err());
    }

    #[test]
    fn test_decode_rejects_non_utf8() {
        assert!(decode_path(b"/\xFF\xFE\0").is_err());
    }

    #[test]
    fn test_resolve_root_maps_to_service_root() {
        let root = Path::new("/srv/share");
        assert_eq!(resolve(root, "/").unwrap(), PathBuf::from("/srv/share"));
    }

    #[test]
    fn test_resolve_joins_components() {
        let root = Path::new("/srv/share");
        assert_eq!(
            resolve(root, "/a/b.txt").unwrap(),
            PathBuf::from("/srv/share/a/b.txt")
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/share");
        assert!(resolve(root, "/../etc/passwd").is_err());
        assert!(resolve(root, "/a/../../b").is_err());
    }

    #[test]
    fn test_resolve_ignores_dot_and_empty() {
        let root = Path::new("/srv/share");
        assert_eq!(
            resolve(root, "/a//./b").unwrap(),
            PathBuf::from("/srv/share/a/b")
        );
    }

    #[test]
    fn test_path_length_limit() {
        let long = format!("/{}", "x".repeat(MAX_PATH_LEN));
        assert!(encode_path(&long).is_err());
    }
}
