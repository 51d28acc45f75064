//! Protocol type definitions
//!
//! These types mirror the wire format exactly. Field widths matter: both
//! peers must agree on the byte layout, so nothing here derives its encoding
//! from memory representation.

use crate::error::ProtocolError;
use crate::translate::OWNER_SERVICE;

/// Request message types. Closed set; anything else is a protocol error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// Enumerate directory entries
    List = 1,
    /// Fetch one entry's attribute record
    GetAttributes = 2,
    /// Probe that a file can be opened read-only
    Open = 3,
    /// Stream a byte range of a file
    Read = 4,
}

impl MessageType {
    pub fn from_wire(raw: u16) -> Result<Self, ProtocolError> {
        match raw {
            1 => Ok(MessageType::List),
            2 => Ok(MessageType::GetAttributes),
            3 => Ok(MessageType::Open),
            4 => Ok(MessageType::Read),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }

    pub fn to_wire(self) -> u16 {
        self as u16
    }
}

/// Unified response status. Every response begins with one of these;
/// no handler invents its own success convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    Ok = 0,
    NotFound = 1,
    AccessDenied = 2,
    NotADirectory = 3,
    Io = 4,
}

impl Status {
    pub fn from_wire(raw: u32) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(Status::Ok),
            1 => Ok(Status::NotFound),
            2 => Ok(Status::AccessDenied),
            3 => Ok(Status::NotADirectory),
            4 => Ok(Status::Io),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }

    pub fn to_wire(self) -> u32 {
        self as u32
    }

    /// Map to a libc errno for the filesystem-integration layer.
    pub fn to_errno(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::NotFound => libc::ENOENT,
            Status::AccessDenied => libc::EACCES,
            Status::NotADirectory => libc::ENOTDIR,
            Status::Io => libc::EIO,
        }
    }
}

/// Wire-format metadata for one filesystem entry.
///
/// Constructed fresh from a stat result for every GET_ATTRIBUTES request and
/// passed through the attribute translator before transmission; never
/// persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrRecord {
    pub inode: u64,
    pub owner_id: u32,
    pub group_id: u32,
    /// File type and permission bits (already narrowed on the server side)
    pub mode: u32,
    pub link_count: u32,
    pub size: i64,
    pub block_count: i64,
    pub modified_secs: i64,
    pub modified_nsecs: i64,
}

/// File type mask within `mode`
pub const MODE_TYPE_MASK: u32 = 0o170000;
/// Directory type bits
pub const MODE_TYPE_DIR: u32 = 0o040000;
/// Regular file type bits
pub const MODE_TYPE_FILE: u32 = 0o100000;

impl AttrRecord {
    /// The record served for the root path `/` without touching the
    /// filesystem: a read-only directory owned by the service identity.
    pub fn synthetic_root() -> Self {
        Self {
            inode: 1,
            owner_id: OWNER_SERVICE,
            group_id: 0,
            mode: MODE_TYPE_DIR | 0o555,
            link_count: 2,
            size: 0,
            block_count: 0,
            modified_secs: 0,
            modified_nsecs: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_TYPE_DIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_TYPE_FILE
    }
}
