//! Attribute translation at the trust boundary
//!
//! Two policies run server-side before any attribute record leaves the
//! process:
//!
//! 1. Identity redaction. The file's owning uid is compared against the
//!    server's effective uid and replaced with a relative sentinel: the
//!    client never learns the server's real numeric identity, and a file
//!    the server does not own can never appear owned by any client.
//! 2. Permission narrowing. The exported tree is read-only, so write bits
//!    are stripped per permission class while read/execute bits and the
//!    file-type bits survive.
//!
//! Both are pure functions of the stat result and the server identity, and
//! both are idempotent.

use crate::types::AttrRecord;

/// Sentinel owner id meaning "owned by the service identity". The client
/// substitutes its own effective uid on receipt.
pub const OWNER_SERVICE: u32 = 1;

/// Sentinel owner id for files the server process does not own. Guaranteed
/// to match no real client uid of interest.
pub const OWNER_FOREIGN: u32 = 0;

/// Permission bits allowed through the boundary: read and execute for each
/// class. Everything else (write bits, setuid/setgid/sticky) is cleared.
const NARROW_PERM_MASK: u32 = 0o555;

/// File-type bits, preserved verbatim.
const TYPE_MASK: u32 = 0o170000;

/// Server side: replace the real owner uid with a relative sentinel.
///
/// The sentinel maps to itself so the whole translation is idempotent; the
/// cost is that files really owned by uid 1 read as service-owned, which is
/// acceptable for a read-only export.
pub fn redact_owner(owner_uid: u32, server_euid: u32) -> u32 {
    if owner_uid == server_euid || owner_uid == OWNER_SERVICE {
        OWNER_SERVICE
    } else {
        OWNER_FOREIGN
    }
}

/// Client side: resolve the sentinel back into a local identity. Files the
/// server owns become ours; everything else keeps the non-matching marker.
pub fn resolve_owner(wire_uid: u32, client_euid: u32) -> u32 {
    if wire_uid == OWNER_SERVICE {
        client_euid
    } else {
        wire_uid
    }
}

/// Strip write (and mode-altering) bits, preserving type and whichever
/// read/execute bits each class already had.
pub fn narrow_mode(mode: u32) -> u32 {
    mode & (TYPE_MASK | NARROW_PERM_MASK)
}

/// Apply both policies to a freshly built record.
pub fn translate(mut attr: AttrRecord, server_euid: u32) -> AttrRecord {
    attr.owner_id = redact_owner(attr.owner_id, server_euid);
    attr.mode = narrow_mode(attr.mode);
    attr
}

/// Build an [`AttrRecord`] from a stat result, translated for the wire.
#[cfg(unix)]
pub fn record_from_metadata(meta: &std::fs::Metadata, server_euid: u32) -> AttrRecord {
    use std::os::unix::fs::MetadataExt;

    translate(
        AttrRecord {
            inode: meta.ino(),
            owner_id: meta.uid(),
            group_id: meta.gid(),
            mode: meta.mode(),
            link_count: meta.nlink() as u32,
            size: meta.size() as i64,
            block_count: meta.blocks() as i64,
            modified_secs: meta.mtime(),
            modified_nsecs: meta.mtime_nsec(),
        },
        server_euid,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MODE_TYPE_DIR, MODE_TYPE_FILE};

    fn record(owner: u32, mode: u32) -> AttrRecord {
        AttrRecord {
            inode: 7,
            owner_id: owner,
            group_id: 20,
            mode,
            link_count: 1,
            size: 42,
            block_count: 1,
            modified_secs: 1_700_000_000,
            modified_nsecs: 0,
        }
    }

    #[test]
    fn test_redaction_server_owned_file_is_owned_by_every_client() {
        let server_euid = 1000;
        let wire = translate(record(1000, MODE_TYPE_FILE | 0o644), server_euid);
        assert_eq!(wire.owner_id, OWNER_SERVICE);

        // Two different clients both see the file as their own.
        assert_eq!(resolve_owner(wire.owner_id, 501), 501);
        assert_eq!(resolve_owner(wire.owner_id, 777), 777);
    }

    #[test]
    fn test_redaction_foreign_file_owned_by_no_client() {
        let wire = translate(record(0, MODE_TYPE_FILE | 0o644), 1000);
        assert_eq!(wire.owner_id, OWNER_FOREIGN);

        // No client euid of interest equals the foreign marker.
        assert_eq!(resolve_owner(wire.owner_id, 501), OWNER_FOREIGN);
        assert_ne!(resolve_owner(wire.owner_id, 501), 501);
    }

    #[test]
    fn test_narrowing_strips_all_write_bits() {
        for mode in [0o777, 0o766, 0o642, 0o222, 0o644] {
            let narrowed = narrow_mode(MODE_TYPE_FILE | mode);
            assert_eq!(narrowed & 0o222, 0, "write bit left in {:o}", narrowed);
        }
    }

    #[test]
    fn test_narrowing_preserves_read_execute_per_class() {
        // owner rwx, group rw, other r: each class keeps its own r/x bits.
        let narrowed = narrow_mode(MODE_TYPE_FILE | 0o764);
        assert_eq!(narrowed, MODE_TYPE_FILE | 0o544);

        // A class with no read bit gains none.
        let narrowed = narrow_mode(MODE_TYPE_FILE | 0o600);
        assert_eq!(narrowed & 0o077, 0);
    }

    #[test]
    fn test_narrowing_preserves_type_and_strips_setuid() {
        let narrowed = narrow_mode(MODE_TYPE_DIR | 0o4755);
        assert_eq!(narrowed & 0o170000, MODE_TYPE_DIR);
        assert_eq!(narrowed & 0o7000, 0);
    }

    #[test]
    fn test_narrowing_idempotent() {
        for mode in [0o777, 0o755, 0o4642, 0o000, 0o111] {
            let once = narrow_mode(MODE_TYPE_FILE | mode);
            assert_eq!(narrow_mode(once), once);
        }
    }

    #[test]
    fn test_translate_idempotent() {
        let server_euid = 1000;
        for owner in [1000, 0, 501, OWNER_SERVICE] {
            let once = translate(record(owner, MODE_TYPE_FILE | 0o664), server_euid);
            let twice = translate(once.clone(), server_euid);
            assert_eq!(once, twice);
        }
    }
}
