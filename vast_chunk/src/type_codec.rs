//! Binary encoding for [`Type`], used to frame a chunk's schema table for on-disk storage
//! (spec.md §3.4: "each chunk begins with a framed schema table (count + [name, encoded type])").

use crate::error::{CorruptSnafu, Result};
use crate::varint::{read_u64, write_u64};
use snafu::ensure;
use vast_types::types::{Attribute, Field, Shape};
use vast_types::Type;

const SHAPE_BOOL: u8 = 0;
const SHAPE_INT: u8 = 1;
const SHAPE_COUNT: u8 = 2;
const SHAPE_REAL: u8 = 3;
const SHAPE_TIME_POINT: u8 = 4;
const SHAPE_TIME_DURATION: u8 = 5;
const SHAPE_STRING: u8 = 6;
const SHAPE_PATTERN: u8 = 7;
const SHAPE_ADDRESS: u8 = 8;
const SHAPE_SUBNET: u8 = 9;
const SHAPE_PORT: u8 = 10;
const SHAPE_ENUM: u8 = 11;
const SHAPE_VECTOR: u8 = 12;
const SHAPE_SET: u8 = 13;
const SHAPE_TABLE: u8 = 14;
const SHAPE_RECORD: u8 = 15;
const SHAPE_ALIAS: u8 = 16;

const ATTR_SKIP: u8 = 0;
const ATTR_DEFAULT: u8 = 1;

/// Append the schema table for `schema` (count-prefixed, one [`Type`] per entry).
pub fn encode_schema(schema: &[Type], buf: &mut Vec<u8>) {
    write_u64(buf, schema.len() as u64);
    for ty in schema {
        encode_type(ty, buf);
    }
}

/// Decode a schema table previously written by [`encode_schema`].
pub fn decode_schema(buf: &[u8], pos: &mut usize) -> Result<Vec<Type>> {
    let len = read_u64(buf, pos)?;
    let mut schema = Vec::with_capacity(len as usize);
    for _ in 0..len {
        schema.push(decode_type(buf, pos)?);
    }
    Ok(schema)
}

fn encode_type(ty: &Type, buf: &mut Vec<u8>) {
    match &ty.name {
        Some(name) => {
            buf.push(1);
            write_string(name, buf);
        }
        None => buf.push(0),
    }
    write_u64(buf, ty.attributes.len() as u64);
    for attr in &ty.attributes {
        match attr {
            Attribute::Skip => buf.push(ATTR_SKIP),
            Attribute::Default(text) => {
                buf.push(ATTR_DEFAULT);
                write_string(text, buf);
            }
        }
    }
    encode_shape(&ty.shape, buf);
}

fn decode_type(buf: &[u8], pos: &mut usize) -> Result<Type> {
    let name = match read_byte(buf, pos)? {
        0 => None,
        _ => Some(read_string(buf, pos)?),
    };
    let attr_count = read_u64(buf, pos)?;
    let mut attributes = Vec::with_capacity(attr_count as usize);
    for _ in 0..attr_count {
        attributes.push(match read_byte(buf, pos)? {
            ATTR_SKIP => Attribute::Skip,
            ATTR_DEFAULT => Attribute::Default(read_string(buf, pos)?),
            other => {
                return CorruptSnafu {
                    detail: format!("unknown attribute tag {other}"),
                }
                .fail()
            }
        });
    }
    let shape = decode_shape(buf, pos)?;
    Ok(Type {
        name,
        shape,
        attributes,
    })
}

fn encode_shape(shape: &Shape, buf: &mut Vec<u8>) {
    match shape {
        Shape::Bool => buf.push(SHAPE_BOOL),
        Shape::Int => buf.push(SHAPE_INT),
        Shape::Count => buf.push(SHAPE_COUNT),
        Shape::Real => buf.push(SHAPE_REAL),
        Shape::TimePoint => buf.push(SHAPE_TIME_POINT),
        Shape::TimeDuration => buf.push(SHAPE_TIME_DURATION),
        Shape::String => buf.push(SHAPE_STRING),
        Shape::Pattern => buf.push(SHAPE_PATTERN),
        Shape::Address => buf.push(SHAPE_ADDRESS),
        Shape::Subnet => buf.push(SHAPE_SUBNET),
        Shape::Port => buf.push(SHAPE_PORT),
        Shape::Enum(variants) => {
            buf.push(SHAPE_ENUM);
            write_u64(buf, variants.len() as u64);
            for v in variants {
                write_string(v, buf);
            }
        }
        Shape::Vector(inner) => {
            buf.push(SHAPE_VECTOR);
            encode_shape(&inner.shape, buf);
        }
        Shape::Set(inner) => {
            buf.push(SHAPE_SET);
            encode_shape(&inner.shape, buf);
        }
        Shape::Table(key, value) => {
            buf.push(SHAPE_TABLE);
            encode_type(key, buf);
            encode_type(value, buf);
        }
        Shape::Record(fields) => {
            buf.push(SHAPE_RECORD);
            write_u64(buf, fields.len() as u64);
            for field in fields {
                write_string(&field.name, buf);
                encode_type(&field.ty, buf);
            }
        }
        Shape::Alias(name, inner) => {
            buf.push(SHAPE_ALIAS);
            write_string(name, buf);
            encode_type(inner, buf);
        }
    }
}

fn decode_shape(buf: &[u8], pos: &mut usize) -> Result<Shape> {
    Ok(match read_byte(buf, pos)? {
        SHAPE_BOOL => Shape::Bool,
        SHAPE_INT => Shape::Int,
        SHAPE_COUNT => Shape::Count,
        SHAPE_REAL => Shape::Real,
        SHAPE_TIME_POINT => Shape::TimePoint,
        SHAPE_TIME_DURATION => Shape::TimeDuration,
        SHAPE_STRING => Shape::String,
        SHAPE_PATTERN => Shape::Pattern,
        SHAPE_ADDRESS => Shape::Address,
        SHAPE_SUBNET => Shape::Subnet,
        SHAPE_PORT => Shape::Port,
        SHAPE_ENUM => {
            let len = read_u64(buf, pos)?;
            let mut variants = Vec::with_capacity(len as usize);
            for _ in 0..len {
                variants.push(read_string(buf, pos)?);
            }
            Shape::Enum(variants)
        }
        SHAPE_VECTOR => Shape::Vector(Box::new(Type::new(decode_shape(buf, pos)?))),
        SHAPE_SET => Shape::Set(Box::new(Type::new(decode_shape(buf, pos)?))),
        SHAPE_TABLE => {
            let key = decode_type(buf, pos)?;
            let value = decode_type(buf, pos)?;
            Shape::Table(Box::new(key), Box::new(value))
        }
        SHAPE_RECORD => {
            let len = read_u64(buf, pos)?;
            let mut fields = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let name = read_string(buf, pos)?;
                let ty = decode_type(buf, pos)?;
                fields.push(Field::new(name, ty));
            }
            Shape::Record(fields)
        }
        SHAPE_ALIAS => {
            let name = read_string(buf, pos)?;
            let inner = decode_type(buf, pos)?;
            Shape::Alias(name, Box::new(inner))
        }
        other => {
            return CorruptSnafu {
                detail: format!("unknown shape tag {other}"),
            }
            .fail()
        }
    })
}

fn write_string(s: &str, buf: &mut Vec<u8>) {
    write_u64(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(buf: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_u64(buf, pos)? as usize;
    ensure!(*pos + len <= buf.len(), CorruptSnafu { detail: "truncated type name" });
    let s = String::from_utf8(buf[*pos..*pos + len].to_vec()).map_err(|_| {
        CorruptSnafu {
            detail: "invalid utf-8 in type name".to_string(),
        }
        .build()
    })?;
    *pos += len;
    Ok(s)
}

fn read_byte(buf: &[u8], pos: &mut usize) -> Result<u8> {
    ensure!(*pos < buf.len(), CorruptSnafu { detail: "truncated type" });
    let b = buf[*pos];
    *pos += 1;
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_types::types::Field;

    #[test]
    fn schema_roundtrips() {
        let schema = vec![
            Type::new(Shape::Record(vec![
                Field::new("x", Type::new(Shape::Int)),
                Field::new("y", Type::new(Shape::Vector(Box::new(Type::new(Shape::String))))),
            ]))
            .named("conn")
            .with_attributes(vec![Attribute::Skip]),
            Type::new(Shape::Port),
        ];
        let mut buf = Vec::new();
        encode_schema(&schema, &mut buf);
        let mut pos = 0;
        let decoded = decode_schema(&buf, &mut pos).unwrap();
        assert_eq!(decoded, schema);
        assert_eq!(pos, buf.len());
    }
}
