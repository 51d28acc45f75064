//! Wire codec
//!
//! Every multi-byte integer travels in network byte order. Framing is
//! exact-size: the header announces the payload length and a receiver reads
//! precisely that many bytes before interpreting anything. There is no
//! self-describing serialization here on purpose; both peers share this
//! fixed layout.
//!
//! Layout summary:
//! - header: `message_length: u64`, `message_type: u16` (10 bytes)
//! - status word: `u32` (all responses start with one)
//! - attribute record: 56 bytes, see [`encode_attr`]
//! - directory entry: `u16` length + that many name bytes; a zero length
//!   terminates the stream and carries no payload

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;
use crate::types::{AttrRecord, MessageType, Status};
use crate::{ATTR_RECORD_LEN, HEADER_LEN, MAX_NAME_LEN, STATUS_LEN};

/// Encode the fixed message header.
pub fn encode_header(msg_type: MessageType, payload_len: u64) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    {
        let mut cursor = &mut buf[..];
        cursor.put_u64(payload_len);
        cursor.put_u16(msg_type.to_wire());
    }
    buf
}

/// Decode the fixed message header.
pub fn decode_header(bytes: &[u8]) -> Result<(MessageType, u64), ProtocolError> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::MalformedHeader {
            need: HEADER_LEN,
            got: bytes.len(),
        });
    }
    let mut cursor = bytes;
    let payload_len = cursor.get_u64();
    let msg_type = MessageType::from_wire(cursor.get_u16())?;
    Ok((msg_type, payload_len))
}

/// Encode a response status word.
pub fn encode_status(status: Status) -> [u8; STATUS_LEN] {
    status.to_wire().to_be_bytes()
}

/// Decode a response status word.
pub fn decode_status(bytes: &[u8]) -> Result<Status, ProtocolError> {
    if bytes.len() < STATUS_LEN {
        return Err(ProtocolError::Truncated {
            expected: STATUS_LEN,
            got: bytes.len(),
        });
    }
    let mut cursor = bytes;
    Status::from_wire(cursor.get_u32())
}

/// Encode an attribute record into its fixed 56-byte layout.
pub fn encode_attr(attr: &AttrRecord) -> [u8; ATTR_RECORD_LEN] {
    let mut buf = [0u8; ATTR_RECORD_LEN];
    {
        let mut cursor = &mut buf[..];
        cursor.put_u64(attr.inode);
        cursor.put_u32(attr.owner_id);
        cursor.put_u32(attr.group_id);
        cursor.put_u32(attr.mode);
        cursor.put_u32(attr.link_count);
        cursor.put_i64(attr.size);
        cursor.put_i64(attr.block_count);
        cursor.put_i64(attr.modified_secs);
        cursor.put_i64(attr.modified_nsecs);
    }
    buf
}

/// Decode an attribute record.
pub fn decode_attr(bytes: &[u8]) -> Result<AttrRecord, ProtocolError> {
    if bytes.len() < ATTR_RECORD_LEN {
        return Err(ProtocolError::Truncated {
            expected: ATTR_RECORD_LEN,
            got: bytes.len(),
        });
    }
    let mut cursor = bytes;
    Ok(AttrRecord {
        inode: cursor.get_u64(),
        owner_id: cursor.get_u32(),
        group_id: cursor.get_u32(),
        mode: cursor.get_u32(),
        link_count: cursor.get_u32(),
        size: cursor.get_i64(),
        block_count: cursor.get_i64(),
        modified_secs: cursor.get_i64(),
        modified_nsecs: cursor.get_i64(),
    })
}

/// Encode one directory entry as a length-prefixed name.
pub fn encode_dir_entry(name: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong(name.len()));
    }
    let mut buf = Vec::with_capacity(2 + name.len());
    buf.put_u16(name.len() as u16);
    buf.put_slice(name);
    Ok(buf)
}

/// The terminal zero-length entry ending a directory stream. The only valid
/// end-of-entries signal; a reader stops here and must not read a payload.
pub const DIR_STREAM_END: [u8; 2] = [0, 0];

/// Decode a directory entry length prefix.
pub fn decode_entry_len(bytes: &[u8]) -> Result<u16, ProtocolError> {
    if bytes.len() < 2 {
        return Err(ProtocolError::Truncated {
            expected: 2,
            got: bytes.len(),
        });
    }
    let mut cursor = bytes;
    Ok(cursor.get_u16())
}
