// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Checksummed record frames.
//!
//! ```text
//! [MAGIC u32][VERSION u32][BODY_LEN u32][BODY (bincode)][CRC32 u32]
//! ```
//! The CRC covers everything before it. Frames can be concatenated (the
//! verification ledger is a sequence of them) or written one per file.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::StoreError;

const MAGIC: u32 = 0x5256_534F; // RVSO
const SCHEMA_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 4;

pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let body = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Encoding(e.to_string()))?;
    let body_len = u32::try_from(body.len())
        .map_err(|_| StoreError::Encoding(format!("record of {} bytes is too large", body.len())))?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + TRAILER_LEN);
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    out.extend_from_slice(&body_len.to_le_bytes());
    out.extend_from_slice(&body);

    let mut hasher = Hasher::new();
    hasher.update(&out);
    out.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(out)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(word)
}

/// Decodes the frame at the start of `buf`, returning the value and the
/// number of bytes consumed.
pub fn decode_frame<T: DeserializeOwned>(buf: &[u8]) -> Result<(T, usize), StoreError> {
    if buf.len() < HEADER_LEN + TRAILER_LEN {
        return Err(StoreError::Corrupt("frame too short".into()));
    }
    if read_u32(buf, 0) != MAGIC {
        return Err(StoreError::Corrupt("invalid magic".into()));
    }
    let version = read_u32(buf, 4);
    if version != SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!("schema version {} not supported", version)));
    }
    let body_len = read_u32(buf, 8) as usize;
    let body_end = HEADER_LEN + body_len;
    let frame_len = body_end + TRAILER_LEN;
    if buf.len() < frame_len {
        return Err(StoreError::Corrupt(format!(
            "truncated frame: header claims {} bytes, found {}",
            frame_len,
            buf.len()
        )));
    }

    let mut hasher = Hasher::new();
    hasher.update(&buf[..body_end]);
    if hasher.finalize() != read_u32(buf, body_end) {
        return Err(StoreError::Corrupt("checksum mismatch".into()));
    }

    let (value, read) = bincode::serde::decode_from_slice(&buf[HEADER_LEN..body_end], bincode::config::standard())
        .map_err(|e| StoreError::Encoding(e.to_string()))?;
    if read != body_len {
        return Err(StoreError::Corrupt(format!("{} unread body bytes", body_len - read)));
    }
    Ok((value, frame_len))
}

/// Writes `bytes` to `path` through a temp file and a rename, so readers
/// see either the old content or the new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_concatenate() {
        let mut buf = encode_frame(&(1u32, "first".to_string())).unwrap();
        buf.extend(encode_frame(&(2u32, "second".to_string())).unwrap());

        let (a, used): ((u32, String), usize) = decode_frame(&buf).unwrap();
        let (b, rest): ((u32, String), usize) = decode_frame(&buf[used..]).unwrap();
        assert_eq!(a, (1, "first".to_string()));
        assert_eq!(b, (2, "second".to_string()));
        assert_eq!(used + rest, buf.len());
    }

    #[test]
    fn test_corruption_is_detected() {
        let mut buf = encode_frame(&vec![7u8; 32]).unwrap();
        let mid = buf.len() / 2;
        buf[mid] ^= 0x40;
        assert!(matches!(decode_frame::<Vec<u8>>(&buf), Err(StoreError::Corrupt(_))));

        let buf = encode_frame(&vec![7u8; 32]).unwrap();
        assert!(matches!(decode_frame::<Vec<u8>>(&buf[..buf.len() - 1]), Err(StoreError::Corrupt(_))));
    }
}
