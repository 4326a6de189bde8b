//! On-disk segment format (spec.md §3.4): a length-prefixed sequence of chunks, each chunk's
//! record body compressed as a unit with a small header stating the method and the uncompressed
//! length, framed by the chunk's schema table, membership bitmap, and timestamp extremes.

use crate::error::{CorruptSnafu, Error, Result};
use std::path::Path;
use vast_bitmap::{Bitmap, Encoding};
use vast_chunk::{type_codec, Chunk, ChunkMeta};
use vast_time::Time;

/// How a chunk's record body is compressed before being written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression; the body is stored as-is. Useful for tests and for data already
    /// incompressible (e.g. encrypted payloads).
    None,
    /// Zstandard, the teacher workspace's general-purpose compressor of choice.
    Zstd,
}

const METHOD_NONE: u8 = 0;
const METHOD_ZSTD: u8 = 1;

/// An ordered collection of chunks, written and read together as one file (spec.md §3.4).
pub type Segment = Vec<Chunk>;

/// Serialize `segment` to `path`, compressing each chunk's record body with `compression`.
pub fn write_segment(path: &Path, segment: &Segment, compression: CompressionMethod) -> Result<()> {
    let mut buf = Vec::new();
    write_varint(&mut buf, segment.len() as u64);
    for chunk in segment {
        encode_chunk(chunk, compression, &mut buf)?;
    }
    std::fs::write(path, buf).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Deserialize a segment previously written by [`write_segment`].
pub fn read_segment(path: &Path) -> Result<Segment> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut pos = 0;
    let count = read_varint(path, &bytes, &mut pos)?;
    let mut segment = Vec::with_capacity(count as usize);
    for _ in 0..count {
        segment.push(decode_chunk(path, &bytes, &mut pos)?);
    }
    Ok(segment)
}

fn encode_chunk(chunk: &Chunk, compression: CompressionMethod, buf: &mut Vec<u8>) -> Result<()> {
    type_codec::encode_schema(&chunk.meta().schema, buf);

    let raw = chunk.raw_body();
    let (method_byte, body) = match compression {
        CompressionMethod::None => (METHOD_NONE, raw.to_vec()),
        CompressionMethod::Zstd => {
            let compressed = zstd::encode_all(raw, 0).map_err(|e| Error::Compression {
                detail: format!("zstd encode failed: {e}"),
            })?;
            (METHOD_ZSTD, compressed)
        }
    };
    buf.push(method_byte);
    write_varint(buf, raw.len() as u64);
    write_varint(buf, body.len() as u64);
    buf.extend_from_slice(&body);

    write_varint(buf, chunk.events());
    let ids_bytes = chunk.meta().ids.encode(Encoding::Ewah);
    write_varint(buf, ids_bytes.len() as u64);
    buf.extend_from_slice(&ids_bytes);
    buf.extend_from_slice(&chunk.meta().first.timestamp_nanos().to_le_bytes());
    buf.extend_from_slice(&chunk.meta().last.timestamp_nanos().to_le_bytes());
    Ok(())
}

fn decode_chunk(path: &Path, buf: &[u8], pos: &mut usize) -> Result<Chunk> {
    let schema = type_codec::decode_schema(buf, pos).map_err(|source| Error::Corrupt {
        path: path.to_path_buf(),
        detail: format!("schema table decode failed: {source}"),
    })?;

    let method_byte = read_byte(path, buf, pos)?;
    let uncompressed_len = read_varint(path, buf, pos)?;
    let compressed_len = read_varint(path, buf, pos)? as usize;
    let body_bytes = read_exact(path, buf, pos, compressed_len)?;
    let body = match method_byte {
        METHOD_NONE => body_bytes.to_vec(),
        METHOD_ZSTD => zstd::decode_all(body_bytes).map_err(|e| Error::Corrupt {
            path: path.to_path_buf(),
            detail: format!("zstd decode failed: {e}"),
        })?,
        other => {
            return CorruptSnafu {
                path: path.to_path_buf(),
                detail: format!("unknown compression method {other}"),
            }
            .fail()
        }
    };
    if body.len() as u64 != uncompressed_len {
        return CorruptSnafu {
            path: path.to_path_buf(),
            detail: "decompressed length mismatch".to_string(),
        }
        .fail();
    }

    let event_count = read_varint(path, buf, pos)?;
    let ids_bytes_len = read_varint(path, buf, pos)? as usize;
    let ids_bytes = read_exact(path, buf, pos, ids_bytes_len)?;
    let ids = Bitmap::decode(ids_bytes).map_err(|source| Error::Corrupt {
        path: path.to_path_buf(),
        detail: format!("id bitmap decode failed: {source}"),
    })?;
    let first = Time::from_timestamp_nanos(i64::from_le_bytes(
        read_exact(path, buf, pos, 8)?.try_into().unwrap(),
    ));
    let last = Time::from_timestamp_nanos(i64::from_le_bytes(
        read_exact(path, buf, pos, 8)?.try_into().unwrap(),
    ));

    Ok(Chunk::from_parts(
        ChunkMeta {
            first,
            last,
            ids,
            schema,
        },
        body,
        event_count,
    ))
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
            detail: "truncated segment".to_string(),
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
            detail: "truncated segment".to_string(),
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
    use vast_chunk::Writer;
    use vast_types::{types::Shape, Event, EventId, Type, Value};

    fn sample_chunk(id: u64) -> Chunk {
        let ty = Type::new(Shape::Record(vec![vast_types::Field::new(
            "x",
            Type::new(Shape::Int),
        )]))
        .named("t");
        let mut w = Writer::new();
        w.write(&Event::with_id(
            EventId::new(id),
            Time::from_timestamp_nanos(id as i64),
            ty,
            Value::Record(vec![Value::Int(id as i64)]),
        ))
        .unwrap();
        w.flush()
    }

    #[test]
    fn segment_roundtrips_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.bin");
        let segment = vec![sample_chunk(1), sample_chunk(2)];
        write_segment(&path, &segment, CompressionMethod::None).unwrap();
        let loaded = read_segment(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].events(), 1);
        assert_eq!(loaded[0].meta().schema, segment[0].meta().schema);

        let mut r = loaded[0].reader();
        let event = r.read().unwrap().unwrap();
        assert_eq!(event.data(), &Value::Record(vec![Value::Int(1)]));
    }

    #[test]
    fn segment_roundtrips_zstd_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.bin");
        let segment = vec![sample_chunk(5)];
        write_segment(&path, &segment, CompressionMethod::Zstd).unwrap();
        let loaded = read_segment(&path).unwrap();
        let mut r = loaded[0].reader();
        let event = r.read().unwrap().unwrap();
        assert_eq!(event.id(), EventId::new(5));
    }
}
