//! On-disk persistence for a partition directory (spec.md §4.4 flush: "persist the schema file;
//! forward `flush` to each indexer"). One partition directory holds three files: `schema.data`
//! (the union of types seen, via [`vast_chunk::type_codec`]), `rows.data` (the row→event-id map
//! plus timestamp extent), and `indexers.data` (every field indexer's bitstreams).

use crate::error::{CorruptSnafu, Error, Result};
use crate::indexer::FieldIndexer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use vast_bitmap::Bitmap;
use vast_chunk::varint::{read_u64, write_u64};
use vast_chunk::type_codec;
use vast_time::Time;
use vast_types::expr::predicatizer::DispatchKey;
use vast_types::{EventId, Type};

const SCHEMA_FILE: &str = "schema.data";
const ROWS_FILE: &str = "rows.data";
const INDEXERS_FILE: &str = "indexers.data";

/// Everything a partition needs to resume after being loaded from disk.
pub struct Loaded {
    /// The union of types seen by this partition.
    pub schema: Vec<Type>,
    /// `row_ids[i]` is the event id written at row `i`.
    pub row_ids: Vec<EventId>,
    /// Minimum timestamp among all rows, if any.
    pub first_ts: Option<Time>,
    /// Maximum timestamp among all rows, if any.
    pub last_ts: Option<Time>,
    /// Every field indexer, keyed by dispatch key.
    pub indexers: HashMap<DispatchKey, FieldIndexer>,
}

/// Whether a partition directory has been flushed at least once.
pub fn exists(dir: &Path) -> bool {
    dir.join(SCHEMA_FILE).exists()
}

/// Persist the full partition state to `dir`, creating it if necessary.
pub fn write(
    dir: &Path,
    schema: &[Type],
    row_ids: &[EventId],
    first_ts: Option<Time>,
    last_ts: Option<Time>,
    indexers: &HashMap<DispatchKey, FieldIndexer>,
) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let mut schema_buf = Vec::new();
    type_codec::encode_schema(schema, &mut schema_buf);
    write_file(&dir.join(SCHEMA_FILE), &schema_buf)?;

    let mut rows_buf = Vec::new();
    write_u64(&mut rows_buf, row_ids.len() as u64);
    for id in row_ids {
        write_u64(&mut rows_buf, id.get());
    }
    write_u64(&mut rows_buf, first_ts.map(|t| t.timestamp_nanos()).unwrap_or(0) as u64);
    write_u64(&mut rows_buf, last_ts.map(|t| t.timestamp_nanos()).unwrap_or(0) as u64);
    rows_buf.push(first_ts.is_some() as u8);
    write_file(&dir.join(ROWS_FILE), &rows_buf)?;

    let mut idx_buf = Vec::new();
    write_u64(&mut idx_buf, indexers.len() as u64);
    for (key, indexer) in indexers {
        encode_dispatch_key(key, &mut idx_buf);
        encode_indexer(indexer, &mut idx_buf);
    }
    write_file(&dir.join(INDEXERS_FILE), &idx_buf)?;

    Ok(())
}

/// Load a partition's state previously written by [`write`].
pub fn read(dir: &Path) -> Result<Loaded> {
    let schema_path = dir.join(SCHEMA_FILE);
    let schema_bytes = read_file(&schema_path)?;
    let mut pos = 0;
    let schema = type_codec::decode_schema(&schema_bytes, &mut pos)
        .map_err(|source| Error::Chunk { source })?;

    let rows_path = dir.join(ROWS_FILE);
    let rows_bytes = read_file(&rows_path)?;
    let mut pos = 0;
    let row_count = read_varint(&rows_bytes, &mut pos)?;
    let mut row_ids = Vec::with_capacity(row_count as usize);
    for _ in 0..row_count {
        row_ids.push(EventId::new(read_varint(&rows_bytes, &mut pos)?));
    }
    let first_nanos = read_varint(&rows_bytes, &mut pos)? as i64;
    let last_nanos = read_varint(&rows_bytes, &mut pos)? as i64;
    let has_span = *rows_bytes.get(pos).ok_or_else(|| Error::Corrupt {
        path: rows_path.clone(),
        detail: "truncated rows file".to_string(),
    })? != 0;
    let (first_ts, last_ts) = if has_span {
        (Some(Time::from_timestamp_nanos(first_nanos)), Some(Time::from_timestamp_nanos(last_nanos)))
    } else {
        (None, None)
    };

    let indexers_path = dir.join(INDEXERS_FILE);
    let idx_bytes = read_file(&indexers_path)?;
    let mut pos = 0;
    let indexer_count = read_varint(&idx_bytes, &mut pos)?;
    let mut indexers = HashMap::with_capacity(indexer_count as usize);
    for _ in 0..indexer_count {
        let key = decode_dispatch_key(&indexers_path, &idx_bytes, &mut pos)?;
        let indexer = decode_indexer(&indexers_path, &idx_bytes, &mut pos)?;
        indexers.insert(key, indexer);
    }

    Ok(Loaded {
        schema,
        row_ids,
        first_ts,
        last_ts,
        indexers,
    })
}

const DISPATCH_EVENT_TYPE: u8 = 0;
const DISPATCH_EVENT_TIME: u8 = 1;
const DISPATCH_FIELD: u8 = 2;

fn encode_dispatch_key(key: &DispatchKey, buf: &mut Vec<u8>) {
    match key {
        DispatchKey::EventType => buf.push(DISPATCH_EVENT_TYPE),
        DispatchKey::EventTime => buf.push(DISPATCH_EVENT_TIME),
        DispatchKey::Field(fingerprint, path) => {
            buf.push(DISPATCH_FIELD);
            buf.extend_from_slice(&fingerprint.to_le_bytes());
            write_u64(buf, path.len() as u64);
            for offset in path {
                write_u64(buf, *offset as u64);
            }
        }
    }
}

fn decode_dispatch_key(path: &Path, buf: &[u8], pos: &mut usize) -> Result<DispatchKey> {
    let tag = read_byte(path, buf, pos)?;
    match tag {
        DISPATCH_EVENT_TYPE => Ok(DispatchKey::EventType),
        DISPATCH_EVENT_TIME => Ok(DispatchKey::EventTime),
        DISPATCH_FIELD => {
            let bytes = read_exact(path, buf, pos, 16)?;
            let fingerprint = u128::from_le_bytes(bytes.try_into().unwrap());
            let len = read_varint(buf, pos)?;
            let mut offsets = Vec::with_capacity(len as usize);
            for _ in 0..len {
                offsets.push(read_varint(buf, pos)? as usize);
            }
            Ok(DispatchKey::Field(fingerprint, offsets))
        }
        other => CorruptSnafu {
            path: path.to_path_buf(),
            detail: format!("unknown dispatch key tag {other}"),
        }
        .fail(),
    }
}

const INDEXER_SINGLETON: u8 = 0;
const INDEXER_EQUALITY: u8 = 1;
const INDEXER_BITSLICE: u8 = 2;

fn encode_indexer(indexer: &FieldIndexer, buf: &mut Vec<u8>) {
    match indexer {
        FieldIndexer::Singleton(c) => {
            buf.push(INDEXER_SINGLETON);
            encode_bitmap(c.bits(), buf);
        }
        FieldIndexer::Equality(c) => {
            buf.push(INDEXER_EQUALITY);
            write_u64(buf, c.rows() as u64);
            write_u64(buf, c.dictionary().len() as u64);
            for key in c.dictionary() {
                write_u64(buf, key.len() as u64);
                buf.extend_from_slice(key);
            }
            for bitstream in c.bitstreams() {
                encode_bitmap(bitstream, buf);
            }
        }
        FieldIndexer::Bitslice(c) => {
            buf.push(INDEXER_BITSLICE);
            write_u64(buf, c.bitstreams().len() as u64);
            for bitstream in c.bitstreams() {
                encode_bitmap(bitstream, buf);
            }
        }
    }
}

fn decode_indexer(path: &Path, buf: &[u8], pos: &mut usize) -> Result<FieldIndexer> {
    let tag = read_byte(path, buf, pos)?;
    Ok(match tag {
        INDEXER_SINGLETON => {
            let bits = decode_bitmap(path, buf, pos)?;
            FieldIndexer::Singleton(vast_bitmap::SingletonCoder::from_bits(bits))
        }
        INDEXER_EQUALITY => {
            let rows = read_varint(buf, pos)? as usize;
            let dict_len = read_varint(buf, pos)?;
            let mut dictionary = Vec::with_capacity(dict_len as usize);
            for _ in 0..dict_len {
                let key_len = read_varint(buf, pos)? as usize;
                dictionary.push(read_exact(path, buf, pos, key_len)?.to_vec());
            }
            let mut bitstreams = Vec::with_capacity(dict_len as usize);
            for _ in 0..dict_len {
                bitstreams.push(decode_bitmap(path, buf, pos)?);
            }
            FieldIndexer::Equality(vast_bitmap::EqualityCoder::from_parts(dictionary, bitstreams, rows))
        }
        INDEXER_BITSLICE => {
            let width = read_varint(buf, pos)?;
            let mut bitstreams = Vec::with_capacity(width as usize);
            let mut rows = 0;
            for _ in 0..width {
                let bm = decode_bitmap(path, buf, pos)?;
                rows = rows.max(bm.len());
                bitstreams.push(bm);
            }
            FieldIndexer::Bitslice(vast_bitmap::BitsliceCoder::from_parts(bitstreams, rows))
        }
        other => {
            return CorruptSnafu {
                path: path.to_path_buf(),
                detail: format!("unknown indexer tag {other}"),
            }
            .fail()
        }
    })
}

fn encode_bitmap(bitmap: &Bitmap, buf: &mut Vec<u8>) {
    write_u64(buf, bitmap.len() as u64);
    write_u64(buf, bitmap.words().len() as u64);
    for word in bitmap.words() {
        buf.extend_from_slice(&word.to_le_bytes());
    }
}

fn decode_bitmap(path: &Path, buf: &[u8], pos: &mut usize) -> Result<Bitmap> {
    let len = read_varint(buf, pos)? as usize;
    let word_count = read_varint(buf, pos)?;
    let mut words = Vec::with_capacity(word_count as usize);
    for _ in 0..word_count {
        let bytes = read_exact(path, buf, pos, 8)?;
        words.push(u64::from_le_bytes(bytes.try_into().unwrap()));
    }
    Ok(Bitmap::from_words(words, len))
}

fn write_file(path: &PathBuf, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })
}

fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    read_u64(buf, pos).map_err(|source| Error::Chunk { source })
}

fn read_byte(path: &Path, buf: &[u8], pos: &mut usize) -> Result<u8> {
    if *pos >= buf.len() {
        return CorruptSnafu {
            path: path.to_path_buf(),
            detail: "truncated partition file".to_string(),
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
            detail: "truncated partition file".to_string(),
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
    use crate::indexer::FieldIndexer;
    use vast_types::types::Shape;
    use vast_types::{Field, Value};

    #[test]
    fn partition_files_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let schema = vec![Type::new(Shape::Record(vec![Field::new("x", Type::new(Shape::Bool))])).named("t")];
        let row_ids = vec![EventId::new(1), EventId::new(2)];
        let mut indexers = HashMap::new();
        let mut idx = FieldIndexer::for_shape(&Shape::Bool);
        idx.encode(Some(&Value::Bool(true)));
        idx.encode(Some(&Value::Bool(false)));
        indexers.insert(DispatchKey::Field(schema[0].fingerprint().0, vec![0]), idx);

        write(
            dir.path(),
            &schema,
            &row_ids,
            Some(Time::from_timestamp_nanos(10)),
            Some(Time::from_timestamp_nanos(20)),
            &indexers,
        )
        .unwrap();

        let loaded = read(dir.path()).unwrap();
        assert_eq!(loaded.schema, schema);
        assert_eq!(loaded.row_ids, row_ids);
        assert_eq!(loaded.first_ts, Some(Time::from_timestamp_nanos(10)));
        assert_eq!(loaded.last_ts, Some(Time::from_timestamp_nanos(20)));
        assert_eq!(loaded.indexers.len(), 1);
    }
}
