//! Persistence for the archive's `id_map` (spec.md §4.3: "`id_map`: a
//! `range_map<event_id, segment_uuid>` persisted to `meta.data`").

use crate::error::{CorruptSnafu, Error, Result};
use std::path::Path;
use uuid::Uuid;
use vast_bitmap::RangeMap;
use vast_types::EventId;

/// Write the id-to-segment map to `path`, overwriting any existing file.
pub fn write_meta(path: &Path, id_map: &RangeMap<EventId, Uuid>) -> Result<()> {
    let mut buf = Vec::new();
    write_varint(&mut buf, id_map.len() as u64);
    for (range, uuid) in id_map.iter() {
        write_varint(&mut buf, range.start.get());
        write_varint(&mut buf, range.end.get());
        buf.extend_from_slice(uuid.as_bytes());
    }
    std::fs::write(path, buf).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the id-to-segment map previously written by [`write_meta`].
pub fn read_meta(path: &Path) -> Result<RangeMap<EventId, Uuid>> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut pos = 0;
    let count = read_varint(path, &bytes, &mut pos)?;
    let mut map = RangeMap::new();
    for _ in 0..count {
        let start = EventId::new(read_varint(path, &bytes, &mut pos)?);
        let end = EventId::new(read_varint(path, &bytes, &mut pos)?);
        let uuid_bytes = read_exact(path, &bytes, &mut pos, 16)?;
        let uuid = Uuid::from_slice(uuid_bytes).map_err(|e| Error::Corrupt {
            path: path.to_path_buf(),
            detail: format!("invalid uuid in meta data: {e}"),
        })?;
        map.insert(start..end, uuid);
    }
    Ok(map)
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
        let path = dir.path().join("meta.data");
        let mut map = RangeMap::new();
        map.insert(EventId::new(0)..EventId::new(10), Uuid::from_u128(1));
        map.insert(EventId::new(10)..EventId::new(20), Uuid::from_u128(2));
        write_meta(&path, &map).unwrap();

        let loaded = read_meta(&path).unwrap();
        assert_eq!(loaded.get(EventId::new(5)), Some(&Uuid::from_u128(1)));
        assert_eq!(loaded.get(EventId::new(15)), Some(&Uuid::from_u128(2)));
        assert_eq!(loaded.get(EventId::new(25)), None);
    }
}
