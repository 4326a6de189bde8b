//! One bitmap indexer per (type, field-offset-path), replacing the original's type-erased
//! `bitmap_index<Bitstream>` concept/model (`bitmap_index_polymorphic.h`) with a closed enum:
//! the set of coder kinds a field can need is known at compile time, so dynamic dispatch buys
//! nothing here.

use vast_bitmap::{Bitmap, BitsliceCoder, EqualityCoder, SingletonCoder};
use vast_types::types::Shape;
use vast_types::{RelOp, Value};

/// The bitmap coder backing one field's index, chosen by [`FieldIndexer::for_shape`].
#[derive(Debug, Clone)]
pub enum FieldIndexer {
    /// Boolean fields: one bitstream suffices.
    Singleton(SingletonCoder),
    /// Low/medium-cardinality fields compared with `Eq`/`NotEq`/ordering: a sorted dictionary.
    Equality(EqualityCoder<Vec<u8>>),
    /// High-cardinality ordered numeric fields: one bitstream per bit position.
    Bitslice(BitsliceCoder),
}

impl FieldIndexer {
    /// Choose the coder kind for a field's shape (spec.md §4.4: "each indexer corresponds to one
    /// field path of one type").
    pub fn for_shape(shape: &Shape) -> Self {
        match shape {
            Shape::Bool => FieldIndexer::Singleton(SingletonCoder::new()),
            Shape::Int | Shape::Count | Shape::TimePoint | Shape::TimeDuration | Shape::Port => {
                FieldIndexer::Bitslice(BitsliceCoder::new(64))
            }
            _ => FieldIndexer::Equality(EqualityCoder::new()),
        }
    }

    /// Rows currently encoded.
    pub fn rows(&self) -> usize {
        match self {
            FieldIndexer::Singleton(c) => c.rows(),
            FieldIndexer::Equality(c) => c.rows(),
            FieldIndexer::Bitslice(c) => c.rows(),
        }
    }

    /// Append one row that can never satisfy a query against this indexer: used to keep an
    /// indexer row-aligned with its partition when an incoming event's type doesn't match it
    /// (grounded on `bitmap_index_polymorphic.h`'s `stretch`).
    pub fn stretch(&mut self, n: usize) {
        match self {
            FieldIndexer::Singleton(c) => c.stretch(n),
            FieldIndexer::Equality(c) => c.stretch(n),
            FieldIndexer::Bitslice(c) => c.stretch(n),
        }
    }

    /// Encode one row's value, or a never-matching placeholder if the value can't be converted
    /// to this indexer's domain (e.g. `Nil` for an absent optional field).
    pub fn encode(&mut self, value: Option<&Value>) {
        match self {
            FieldIndexer::Singleton(c) => match value.and_then(as_bool) {
                Some(b) => c.encode(b, 1),
                None => c.stretch(1),
            },
            FieldIndexer::Equality(c) => {
                let mut key = Vec::new();
                vast_chunk::value_codec::encode_value(value.unwrap_or(&Value::Nil), &mut key);
                c.encode(key, 1);
            }
            FieldIndexer::Bitslice(c) => match value.and_then(order_preserving_u64) {
                Some(v) => c.encode(v, 1),
                None => c.stretch(1),
            },
        }
    }

    /// Decode a point query against `value`, or `None` if `value` can't be converted to this
    /// indexer's domain (the predicate then can't be answered by this indexer at all).
    pub fn decode(&self, op: RelOp, value: &Value) -> Option<Bitmap> {
        match self {
            FieldIndexer::Singleton(c) => as_bool(value).map(|b| c.decode(op, b)),
            FieldIndexer::Equality(c) => {
                let mut key = Vec::new();
                vast_chunk::value_codec::encode_value(value, &mut key);
                Some(c.decode(op, &key))
            }
            FieldIndexer::Bitslice(c) => order_preserving_u64(value).map(|v| c.decode(op, v)),
        }
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

/// Map an ordered numeric [`Value`] to a `u64` that preserves the value's natural order, so
/// [`BitsliceCoder`]'s bit-position range queries stay correct. Signed integers and timestamps
/// have their sign bit flipped so two's-complement order matches unsigned order.
pub fn order_preserving_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Int(i) => Some((*i as u64) ^ (1u64 << 63)),
        Value::Count(c) => Some(*c),
        Value::Time(t) => Some((t.timestamp_nanos() as u64) ^ (1u64 << 63)),
        Value::Duration(d) => Some(d.0),
        Value::Port(p, _) => Some(*p as u64),
        _ => None,
    }
}

/// Walk a type's record shape, collecting `(offset path, leaf type)` for every field that isn't
/// `skip`-tagged (spec.md §4.4: "partitions never index `skip`-tagged types"). Non-record leaves
/// (including containers like `vector<T>`) are indexed as a single opaque value rather than
/// descended into.
pub fn leaves(ty: &vast_types::Type) -> Vec<(Vec<usize>, vast_types::Type)> {
    let mut out = Vec::new();
    collect_leaves(ty, &mut Vec::new(), &mut out);
    out
}

fn collect_leaves(ty: &vast_types::Type, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, vast_types::Type)>) {
    if ty.is_skipped() {
        return;
    }
    match &ty.shape {
        Shape::Record(fields) => {
            for (i, field) in fields.iter().enumerate() {
                path.push(i);
                collect_leaves(&field.ty, path, out);
                path.pop();
            }
        }
        Shape::Alias(_, inner) => collect_leaves(inner, path, out),
        _ => out.push((path.clone(), ty.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_types::{Attribute, Field, Type};

    #[test]
    fn leaves_descends_records_and_skips_tagged_fields() {
        let ty = Type::new(Shape::Record(vec![
            Field::new("a", Type::new(Shape::Bool)),
            Field::new(
                "b",
                Type::new(Shape::Record(vec![Field::new("c", Type::new(Shape::Int))])),
            ),
            Field::new("d", Type::new(Shape::String).with_attributes(vec![Attribute::Skip])),
        ]))
        .named("t");
        let found = leaves(&ty);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, vec![0]);
        assert_eq!(found[1].0, vec![1, 0]);
    }

    #[test]
    fn singleton_roundtrips_through_encode_decode() {
        let mut idx = FieldIndexer::for_shape(&Shape::Bool);
        idx.encode(Some(&Value::Bool(true)));
        idx.stretch(1);
        idx.encode(Some(&Value::Bool(true)));
        let hits = idx.decode(RelOp::Eq, &Value::Bool(true)).unwrap();
        assert_eq!(hits.count_ones(), 2);
        assert!(hits.get(0) && !hits.get(1) && hits.get(2));
    }

    #[test]
    fn bitslice_preserves_order_for_negative_ints() {
        let mut idx = FieldIndexer::for_shape(&Shape::Int);
        idx.encode(Some(&Value::Int(-5)));
        idx.encode(Some(&Value::Int(10)));
        let lt0 = idx.decode(RelOp::Lt, &Value::Int(0)).unwrap();
        assert_eq!(lt0.count_ones(), 1);
        assert!(lt0.get(0));
    }
}
