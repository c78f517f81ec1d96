//! Binary layout of log segments and log records.
//!
//! All integers are big-endian.
//!
//! ```text
//! segment:  | file_number i64 | magic i32 | record* |
//! record:   | magic i32 | length i32 | lsn i64 | checksum i64 | payload | checksum i32 | magic i32 |
//! ```
//!
//! `length` covers the whole record, header and footer included. The header
//! checksum is `lsn XOR length`. The footer checksum is written as zero and
//! not verified on read.

use crate::error::{CoreError, CoreResult};
use crate::types::Lsn;
use bytes::{Buf, BufMut};

/// Size of a segment header in bytes.
pub const LOG_FILE_HEADER_SIZE: usize = 12;

/// Magic number of a segment header.
pub const LOG_FILE_HEADER_MAGIC: u32 = 0xFF11_FF11;

/// Size of a record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 24;

/// Size of a record footer in bytes.
pub const RECORD_FOOTER_SIZE: usize = 8;

/// Header plus footer: the framing overhead of every record.
pub const RECORD_FRAMING_SIZE: usize = RECORD_HEADER_SIZE + RECORD_FOOTER_SIZE;

/// Magic number of a record header.
pub const RECORD_HEADER_MAGIC: u32 = 0x010F_010F;

/// Magic number of a record footer.
pub const RECORD_FOOTER_MAGIC: u32 = 0x0F01_0F01;

/// Largest payload a record can frame, given the `i32` length field.
pub const MAX_PAYLOAD_SIZE: usize = i32::MAX as usize - RECORD_FRAMING_SIZE;

/// Segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFileHeader {
    /// Number the segment was created with.
    pub file_number: u64,
    /// Magic number; [`LOG_FILE_HEADER_MAGIC`] when valid.
    pub magic: u32,
}

impl LogFileHeader {
    /// Creates a valid header for segment `file_number`.
    #[must_use]
    pub const fn new(file_number: u64) -> Self {
        Self {
            file_number,
            magic: LOG_FILE_HEADER_MAGIC,
        }
    }

    /// Serializes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; LOG_FILE_HEADER_SIZE] {
        let mut buf = [0u8; LOG_FILE_HEADER_SIZE];
        let mut cursor = &mut buf[..];
        cursor.put_i64(self.file_number as i64);
        cursor.put_u32(self.magic);
        buf
    }

    /// Deserializes a header.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; LOG_FILE_HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            file_number: buf.get_i64() as u64,
            magic: buf.get_u32(),
        }
    }
}

/// Record header as stored; validation happens in the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Magic number; [`RECORD_HEADER_MAGIC`] when valid.
    pub magic: u32,
    /// Total record length, framing included.
    pub length: i32,
    /// Sequence number of the record.
    pub lsn: Lsn,
    /// Stored checksum; equals [`header_checksum`] when valid.
    pub checksum: u64,
}

impl RecordHeader {
    /// Creates a valid header for a payload of `payload_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is empty or too large to frame.
    pub fn for_payload(lsn: Lsn, payload_len: usize) -> CoreResult<Self> {
        if payload_len == 0 {
            return Err(CoreError::invalid_operation("log record payload is empty"));
        }
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(CoreError::invalid_operation(format!(
                "log record payload of {payload_len} bytes exceeds the maximum of {MAX_PAYLOAD_SIZE}"
            )));
        }
        let length = (payload_len + RECORD_FRAMING_SIZE) as i32;
        Ok(Self {
            magic: RECORD_HEADER_MAGIC,
            length,
            lsn,
            checksum: header_checksum(lsn, length),
        })
    }

    /// Returns the payload length implied by `length`, if the length is
    /// large enough to hold a non-empty payload.
    #[must_use]
    pub fn payload_len(&self) -> Option<usize> {
        usize::try_from(self.length)
            .ok()
            .filter(|&len| len > RECORD_FRAMING_SIZE)
            .map(|len| len - RECORD_FRAMING_SIZE)
    }

    /// Serializes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        let mut cursor = &mut buf[..];
        cursor.put_u32(self.magic);
        cursor.put_i32(self.length);
        cursor.put_u64(self.lsn.as_u64());
        cursor.put_u64(self.checksum);
        buf
    }

    /// Deserializes a header.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; RECORD_HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            magic: buf.get_u32(),
            length: buf.get_i32(),
            lsn: Lsn::new(buf.get_u64()),
            checksum: buf.get_u64(),
        }
    }
}

/// Record footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFooter {
    /// Stored footer checksum; always zero, never verified.
    pub checksum: u32,
    /// Magic number; [`RECORD_FOOTER_MAGIC`] when valid.
    pub magic: u32,
}

impl Default for RecordFooter {
    fn default() -> Self {
        Self {
            checksum: 0,
            magic: RECORD_FOOTER_MAGIC,
        }
    }
}

impl RecordFooter {
    /// Serializes the footer.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_FOOTER_SIZE] {
        let mut buf = [0u8; RECORD_FOOTER_SIZE];
        let mut cursor = &mut buf[..];
        cursor.put_u32(self.checksum);
        cursor.put_u32(self.magic);
        buf
    }

    /// Deserializes a footer.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; RECORD_FOOTER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            checksum: buf.get_u32(),
            magic: buf.get_u32(),
        }
    }
}

/// Header checksum: the LSN XOR the sign-extended record length.
#[must_use]
pub fn header_checksum(lsn: Lsn, length: i32) -> u64 {
    lsn.as_u64() ^ (i64::from(length) as u64)
}

/// Frames `payload` as a complete record with sequence number `lsn`.
///
/// # Errors
///
/// Returns an error if the payload is empty or too large to frame.
pub fn encode_record(lsn: Lsn, payload: &[u8]) -> CoreResult<Vec<u8>> {
    let header = RecordHeader::for_payload(lsn, payload.len())?;
    let mut buf = Vec::with_capacity(payload.len() + RECORD_FRAMING_SIZE);
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&RecordFooter::default().to_bytes());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_header_layout() {
        let bytes = LogFileHeader::new(3).to_bytes();
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&bytes[8..], &[0xFF, 0x11, 0xFF, 0x11]);
        assert_eq!(LogFileHeader::from_bytes(&bytes), LogFileHeader::new(3));
    }

    #[test]
    fn checksum_is_lsn_xor_length() {
        assert_eq!(header_checksum(Lsn::new(0b1100), 0b1010), 0b0110);
        assert_eq!(header_checksum(Lsn::new(7), 0), 7);
    }

    #[test]
    fn encoded_record_layout() {
        let record = encode_record(Lsn::new(9), b"abc").unwrap();
        assert_eq!(record.len(), 3 + RECORD_FRAMING_SIZE);

        let header: [u8; RECORD_HEADER_SIZE] = record[..RECORD_HEADER_SIZE].try_into().unwrap();
        let header = RecordHeader::from_bytes(&header);
        assert_eq!(header.magic, RECORD_HEADER_MAGIC);
        assert_eq!(header.length, 35);
        assert_eq!(header.lsn, Lsn::new(9));
        assert_eq!(header.checksum, 9 ^ 35);
        assert_eq!(header.payload_len(), Some(3));

        assert_eq!(&record[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + 3], b"abc");
        assert_eq!(&record[record.len() - 4..], &[0x0F, 0x01, 0x0F, 0x01]);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            encode_record(Lsn::new(1), b""),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn payload_len_requires_room_for_framing() {
        let mut header = RecordHeader::for_payload(Lsn::new(1), 1).unwrap();
        header.length = RECORD_FRAMING_SIZE as i32;
        assert_eq!(header.payload_len(), None);
        header.length = -5;
        assert_eq!(header.payload_len(), None);
    }
}
