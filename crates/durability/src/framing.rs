//! Self-describing frame encoding shared by WAL entries
//!
//! Format (little-endian), matching the teacher's WAL entry encoding:
//!
//! ```text
//! [length: u32][type: u8][payload: bincode][crc32: u32]
//! ```
//!
//! `length` covers `type + payload + crc32`, not itself. `crc32` covers
//! `type + payload`. A short read at EOF (fewer than 4 bytes, or fewer than
//! `4 + length` bytes) is treated as an incomplete trailing write, not
//! corruption — recovery stops there rather than erroring.

use entitydb_core::Error;

/// Errors distinguishing "not enough bytes yet" (keep reading / stop
/// cleanly at EOF) from "the bytes we do have are wrong" (real corruption).
#[derive(Debug)]
pub enum FrameError {
    /// Buffer doesn't yet contain a full frame; caller should read more or,
    /// if at EOF, treat this as a clean stopping point.
    Incomplete,
    /// The bytes present are internally inconsistent (bad length, bad CRC).
    Corrupt(String),
}

/// Encode `type_tag` + bincode(payload) into a self-describing frame.
pub fn encode_frame<T: serde::Serialize>(type_tag: u8, payload: &T) -> Result<Vec<u8>, Error> {
    let body = bincode::serialize(payload)
        .map_err(|e| Error::Internal(format!("frame encode failed: {e}")))?;
    let total_len = 1 + body.len() + 4;
    let mut buf = Vec::with_capacity(4 + total_len);
    buf.extend_from_slice(&(total_len as u32).to_le_bytes());
    buf.push(type_tag);
    buf.extend_from_slice(&body);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(&body);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(buf)
}

/// Decode one frame from the front of `buf`. Returns the type tag, the
/// payload slice, and the number of bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<(u8, &[u8], usize), FrameError> {
    if buf.len() < 4 {
        return Err(FrameError::Incomplete);
    }
    let total_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    if total_len < 5 {
        return Err(FrameError::Corrupt(format!(
            "frame length {total_len} below minimum of 5"
        )));
    }
    if buf.len() < 4 + total_len {
        return Err(FrameError::Incomplete);
    }
    let type_tag = buf[4];
    let payload = &buf[5..4 + total_len - 4];
    let expected_crc = u32::from_le_bytes(buf[4 + total_len - 4..4 + total_len].try_into().unwrap());

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(payload);
    let actual_crc = hasher.finalize();
    if actual_crc != expected_crc {
        return Err(FrameError::Corrupt(format!(
            "crc mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"
        )));
    }
    Ok((type_tag, payload, 4 + total_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let frame = encode_frame(7u8, &"hello".to_string()).unwrap();
        let (tag, payload, consumed) = decode_frame(&frame).unwrap();
        assert_eq!(tag, 7);
        assert_eq!(consumed, frame.len());
        let decoded: String = bincode::deserialize(payload).unwrap();
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn incomplete_buffer_is_not_corruption() {
        let frame = encode_frame(1u8, &"x".to_string()).unwrap();
        let truncated = &frame[..frame.len() - 1];
        assert!(matches!(decode_frame(truncated), Err(FrameError::Incomplete)));
    }

    #[test]
    fn bit_flip_is_corruption() {
        let mut frame = encode_frame(1u8, &"x".to_string()).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(decode_frame(&frame), Err(FrameError::Corrupt(_))));
    }
}
