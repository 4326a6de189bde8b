//! Persistence for the index's partition meta table (spec.md §4.5: "`partitions`: `map<uuid,
//! partition_state>` — persisted meta"), grounded on `vast_archive`'s `meta.rs` varint framing.

use crate::error::{CorruptSnafu, Error, Result};
use crate::PartitionMeta;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;
use vast_time::Time;

/// Write the partition meta table to `path`, overwriting any existing file.
pub fn write_meta(path: &Path, partitions: &HashMap<Uuid, PartitionMeta>) -> Result<()> {
    let mut buf = Vec::new();
    write_varint(&mut buf, partitions.len() as u64);
    for (uuid, meta) in partitions {
        buf.extend_from_slice(uuid.as_bytes());
        write_varint(&mut buf, meta.events);
        write_signed(&mut buf, meta.last_modified.timestamp_nanos());
        write_signed(&mut buf, meta.from.timestamp_nanos());
        write_signed(&mut buf, meta.to.timestamp_nanos());
    }
    std::fs::write(path, buf).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the partition meta table previously written by [`write_meta`].
pub fn read_meta(path: &Path) -> Result<HashMap<Uuid, PartitionMeta>> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut pos = 0;
    let count = read_varint(path, &bytes, &mut pos)?;
    let mut partitions = HashMap::new();
    for _ in 0..count {
        let uuid_bytes = read_exact(path, &bytes, &mut pos, 16)?;
        let uuid = Uuid::from_slice(uuid_bytes).map_err(|e| Error::Corrupt {
            path: path.to_path_buf(),
            detail: format!("invalid uuid in meta data: {e}"),
        })?;
        let events = read_varint(path, &bytes, &mut pos)?;
        let last_modified = Time::from_timestamp_nanos(read_signed(path, &bytes, &mut pos)?);
        let from = Time::from_timestamp_nanos(read_signed(path, &bytes, &mut pos)?);
        let to = Time::from_timestamp_nanos(read_signed(path, &bytes, &mut pos)?);
        partitions.insert(
            uuid,
            PartitionMeta {
                events,
                last_modified,
                from,
                to,
            },
        );
    }
    Ok(partitions)
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn write_signed(buf: &mut Vec<u8>, value: i64) {
    write_varint(buf, value as u64);
}

fn read_signed(path: &Path, buf: &[u8], pos: &mut usize) -> Result<i64> {
    Ok(read_varint(path, buf, pos)? as i64)
}

fn read_varint(path: &Path, buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = read_byte(path, buf, pos)?;
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn read_byte(path: &Path, buf: &[u8], pos: &mut usize) -> Result<u8> {
    if *pos >= buf.len() {
        return CorruptSnafu {
            path: path.to_path_buf(),
            detail: "truncated meta data".to_string(),
        }
        .fail();
    }
    let b = buf[*pos];
    *pos += 1;
    Ok(b)
}

fn read_exact<'a>(path: &Path, buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    if *pos + len > buf.len() {
        return CorruptSnafu {
            path: path.to_path_buf(),
            detail: "truncated meta data".to_string(),
        }
        .fail();
    }
    let slice = &buf[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta");
        let mut partitions = HashMap::new();
        partitions.insert(
            Uuid::from_u128(1),
            PartitionMeta {
                events: 42,
                last_modified: Time::from_timestamp_nanos(100),
                from: Time::from_timestamp_nanos(10),
                to: Time::from_timestamp_nanos(90),
            },
        );
        write_meta(&path, &partitions).unwrap();

        let loaded = read_meta(&path).unwrap();
        let meta = &loaded[&Uuid::from_u128(1)];
        assert_eq!(meta.events, 42);
        assert_eq!(meta.from.timestamp_nanos(), 10);
        assert_eq!(meta.to.timestamp_nanos(), 90);
    }
}
