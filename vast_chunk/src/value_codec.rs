//! Self-describing binary encoding for [`Value`], used for the `data` portion of a chunk record
//! (spec.md §4.2: "Then write timestamp and data").

use crate::error::{CorruptSnafu, Result};
use crate::varint::{read_i64, read_u64, write_i64, write_u64};
use ordered_float::OrderedFloat;
use snafu::ensure;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use vast_types::value::{DurationNanos, PortProto, Subnet};
use vast_types::Value;
use vast_time::Time;

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_COUNT: u8 = 3;
const TAG_REAL: u8 = 4;
const TAG_TIME: u8 = 5;
const TAG_DURATION: u8 = 6;
const TAG_STRING: u8 = 7;
const TAG_PATTERN: u8 = 8;
const TAG_ADDRESS: u8 = 9;
const TAG_SUBNET: u8 = 10;
const TAG_PORT: u8 = 11;
const TAG_ENUM: u8 = 12;
const TAG_VECTOR: u8 = 13;
const TAG_SET: u8 = 14;
const TAG_RECORD: u8 = 15;

/// Append the binary encoding of `value` to `buf`.
pub fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Nil => buf.push(TAG_NIL),
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(*b as u8);
        }
        Value::Int(i) => {
            buf.push(TAG_INT);
            write_i64(buf, *i);
        }
        Value::Count(c) => {
            buf.push(TAG_COUNT);
            write_u64(buf, *c);
        }
        Value::Real(r) => {
            buf.push(TAG_REAL);
            buf.extend_from_slice(&r.into_inner().to_le_bytes());
        }
        Value::Time(t) => {
            buf.push(TAG_TIME);
            write_i64(buf, t.timestamp_nanos());
        }
        Value::Duration(d) => {
            buf.push(TAG_DURATION);
            write_u64(buf, d.0);
        }
        Value::String(s) => {
            buf.push(TAG_STRING);
            write_bytes(buf, s.as_bytes());
        }
        Value::Pattern(p) => {
            buf.push(TAG_PATTERN);
            write_bytes(buf, p.as_bytes());
        }
        Value::Address(addr) => {
            buf.push(TAG_ADDRESS);
            encode_address(addr, buf);
        }
        Value::Subnet(s) => {
            buf.push(TAG_SUBNET);
            encode_address(&s.address, buf);
            buf.push(s.prefix_len);
        }
        Value::Port(port, proto) => {
            buf.push(TAG_PORT);
            buf.extend_from_slice(&port.to_le_bytes());
            buf.push(*proto as u8);
        }
        Value::Enum(name) => {
            buf.push(TAG_ENUM);
            write_bytes(buf, name.as_bytes());
        }
        Value::Vector(items) => encode_seq(TAG_VECTOR, items, buf),
        Value::Set(items) => encode_seq(TAG_SET, items, buf),
        Value::Record(fields) => encode_seq(TAG_RECORD, fields, buf),
    }
}

fn encode_seq(tag: u8, items: &[Value], buf: &mut Vec<u8>) {
    buf.push(tag);
    write_u64(buf, items.len() as u64);
    for item in items {
        encode_value(item, buf);
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_u64(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_address(addr: &IpAddr, buf: &mut Vec<u8>) {
    match addr {
        IpAddr::V4(v4) => {
            buf.push(4);
            buf.extend_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            buf.push(6);
            buf.extend_from_slice(&v6.octets());
        }
    }
}

/// Decode a [`Value`] starting at `*pos`, advancing it past the value.
pub fn decode_value(buf: &[u8], pos: &mut usize) -> Result<Value> {
    let tag = read_byte(buf, pos)?;
    Ok(match tag {
        TAG_NIL => Value::Nil,
        TAG_BOOL => Value::Bool(read_byte(buf, pos)? != 0),
        TAG_INT => Value::Int(read_i64(buf, pos)?),
        TAG_COUNT => Value::Count(read_u64(buf, pos)?),
        TAG_REAL => {
            let bytes = read_exact(buf, pos, 8)?;
            Value::Real(OrderedFloat(f64::from_le_bytes(bytes.try_into().unwrap())))
        }
        TAG_TIME => Value::Time(Time::from_timestamp_nanos(read_i64(buf, pos)?)),
        TAG_DURATION => Value::Duration(DurationNanos(read_u64(buf, pos)?)),
        TAG_STRING => Value::String(read_string(buf, pos)?),
        TAG_PATTERN => Value::Pattern(read_string(buf, pos)?),
        TAG_ADDRESS => Value::Address(decode_address(buf, pos)?),
        TAG_SUBNET => {
            let address = decode_address(buf, pos)?;
            let prefix_len = read_byte(buf, pos)?;
            Value::Subnet(Subnet::new(address, prefix_len))
        }
        TAG_PORT => {
            let bytes = read_exact(buf, pos, 2)?;
            let port = u16::from_le_bytes(bytes.try_into().unwrap());
            let proto = match read_byte(buf, pos)? {
                0 => PortProto::Tcp,
                1 => PortProto::Udp,
                2 => PortProto::Icmp,
                _ => PortProto::Unknown,
            };
            Value::Port(port, proto)
        }
        TAG_ENUM => Value::Enum(read_string(buf, pos)?),
        TAG_VECTOR => Value::Vector(decode_seq(buf, pos)?),
        TAG_SET => Value::set(decode_seq(buf, pos)?),
        TAG_RECORD => Value::Record(decode_seq(buf, pos)?),
        other => {
            return CorruptSnafu {
                detail: format!("unknown value tag {other}"),
            }
            .fail()
        }
    })
}

fn decode_seq(buf: &[u8], pos: &mut usize) -> Result<Vec<Value>> {
    let len = read_u64(buf, pos)?;
    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(decode_value(buf, pos)?);
    }
    Ok(items)
}

fn decode_address(buf: &[u8], pos: &mut usize) -> Result<IpAddr> {
    match read_byte(buf, pos)? {
        4 => {
            let bytes = read_exact(buf, pos, 4)?;
            Ok(IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])))
        }
        6 => {
            let bytes = read_exact(buf, pos, 16)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        other => CorruptSnafu {
            detail: format!("unknown address family tag {other}"),
        }
        .fail(),
    }
}

fn read_string(buf: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_u64(buf, pos)? as usize;
    let bytes = read_exact(buf, pos, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| {
        CorruptSnafu {
            detail: "invalid utf-8 in string value".to_string(),
        }
        .build()
    })
}

fn read_byte(buf: &[u8], pos: &mut usize) -> Result<u8> {
    ensure!(*pos < buf.len(), CorruptSnafu { detail: "truncated value" });
    let b = buf[*pos];
    *pos += 1;
    Ok(b)
}

fn read_exact<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    ensure!(*pos + len <= buf.len(), CorruptSnafu { detail: "truncated value" });
    let slice = &buf[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(v: Value) {
        let mut buf = Vec::new();
        encode_value(&v, &mut buf);
        let mut pos = 0;
        assert_eq!(decode_value(&buf, &mut pos).unwrap(), v);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(Value::Nil);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Int(-42));
        roundtrip(Value::Count(42));
        roundtrip(Value::Real(OrderedFloat(3.5)));
        roundtrip(Value::String("hello".into()));
        roundtrip(Value::Address("10.0.0.1".parse().unwrap()));
        roundtrip(Value::Address("::1".parse().unwrap()));
        roundtrip(Value::Subnet(Subnet::new("10.0.0.0".parse().unwrap(), 8)));
        roundtrip(Value::Port(443, PortProto::Tcp));
    }

    #[test]
    fn nested_record_roundtrips() {
        roundtrip(Value::Record(vec![
            Value::Int(1),
            Value::Vector(vec![Value::Bool(true), Value::Bool(false)]),
        ]));
    }
}
