//! The closed type-system variant, spec.md §3.2.

use siphasher::sip128::{Hasher128, SipHasher13};
use std::hash::{Hash, Hasher};

/// An attribute tag attached to a type or record field (`skip`, `default=...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// The field/type should not be indexed.
    Skip,
    /// A default value, stored as source text (parsed lazily by the caller).
    Default(String),
}

/// One named field of a [`Type::Record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// The field name.
    pub name: String,
    /// The field's type.
    pub ty: Type,
}

impl Field {
    /// Construct a named field.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A fixed-width structural fingerprint (spec.md §3.2: "an optional name; a fingerprint...").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u128);

/// The shape of a type, independent of its optional name and attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit count.
    Count,
    /// Double-precision real.
    Real,
    /// Nanosecond-resolution instant.
    TimePoint,
    /// A duration.
    TimeDuration,
    /// UTF-8 string.
    String,
    /// Regex pattern.
    Pattern,
    /// IPv4/IPv6 address.
    Address,
    /// Subnet.
    Subnet,
    /// Port number + protocol.
    Port,
    /// Enumeration, named variants.
    Enum(Vec<String>),
    /// `vector<T>`.
    Vector(Box<Type>),
    /// `set<T>`.
    Set(Box<Type>),
    /// `table<K, V>`.
    Table(Box<Type>, Box<Type>),
    /// An ordered sequence of named fields; may nest.
    Record(Vec<Field>),
    /// A named reference to another type.
    Alias(String, Box<Type>),
}

/// A named, fingerprinted type with attribute tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    /// An optional type name (e.g. a record's declared name).
    pub name: Option<String>,
    /// The structural shape.
    pub shape: Shape,
    /// Ordered attribute tags.
    pub attributes: Vec<Attribute>,
}

impl Type {
    /// Construct an unnamed, unattributed type from a shape.
    pub fn new(shape: Shape) -> Self {
        Self {
            name: None,
            shape,
            attributes: Vec::new(),
        }
    }

    /// Attach a name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach attribute tags.
    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether this type carries the `skip` attribute (spec.md §4.4: partitions never index
    /// `skip`-tagged types).
    pub fn is_skipped(&self) -> bool {
        self.attributes.contains(&Attribute::Skip)
    }

    /// The structural fingerprint, computed over name + shape + attributes (spec.md §3.2: "Two
    /// types are equal iff their fingerprints match").
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = SipHasher13::new();
        self.hash_into(&mut hasher);
        let h = hasher.finish128();
        Fingerprint(((h.h1 as u128) << 64) | h.h2 as u128)
    }

    fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        self.name.hash(hasher);
        self.attributes.hash(hasher);
        Self::hash_shape(&self.shape, hasher);
    }

    fn hash_shape<H: Hasher>(shape: &Shape, hasher: &mut H) {
        std::mem::discriminant(shape).hash(hasher);
        match shape {
            Shape::Enum(variants) => variants.hash(hasher),
            Shape::Vector(t) | Shape::Set(t) => t.hash_into(hasher),
            Shape::Table(k, v) => {
                k.hash_into(hasher);
                v.hash_into(hasher);
            }
            Shape::Record(fields) => {
                for f in fields {
                    f.name.hash(hasher);
                    f.ty.hash_into(hasher);
                }
            }
            Shape::Alias(name, t) => {
                name.hash(hasher);
                t.hash_into(hasher);
            }
            _ => {}
        }
    }

    /// Two types are equal iff their fingerprints match.
    pub fn type_eq(&self, other: &Type) -> bool {
        self.fingerprint() == other.fingerprint()
    }

    /// Two types are congruent iff they have the same structural shape, ignoring names
    /// (spec.md §3.2). Field *names* are also ignored for records — only the pairwise field
    /// types must be congruent.
    pub fn congruent(&self, other: &Type) -> bool {
        match (&self.shape, &other.shape) {
            (Shape::Bool, Shape::Bool)
            | (Shape::Int, Shape::Int)
            | (Shape::Count, Shape::Count)
            | (Shape::Real, Shape::Real)
            | (Shape::TimePoint, Shape::TimePoint)
            | (Shape::TimeDuration, Shape::TimeDuration)
            | (Shape::String, Shape::String)
            | (Shape::Pattern, Shape::Pattern)
            | (Shape::Address, Shape::Address)
            | (Shape::Subnet, Shape::Subnet)
            | (Shape::Port, Shape::Port) => true,
            (Shape::Enum(a), Shape::Enum(b)) => a == b,
            (Shape::Vector(a), Shape::Vector(b)) | (Shape::Set(a), Shape::Set(b)) => {
                a.congruent(b)
            }
            (Shape::Table(ak, av), Shape::Table(bk, bv)) => ak.congruent(bk) && av.congruent(bv),
            (Shape::Record(a), Shape::Record(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ty.congruent(&y.ty))
            }
            (Shape::Alias(_, a), _) => a.congruent(other),
            (_, Shape::Alias(_, b)) => self.congruent(b),
            _ => false,
        }
    }

    /// Find a nested field by dotted path (`"conn.resp_port"`), returning the field-offset path
    /// and the leaf type. Used to resolve schema-extractors (spec.md §3.6) against a concrete
    /// record type.
    pub fn resolve_dotted(&self, key: &str) -> Option<(Vec<usize>, Type)> {
        let mut ty = self;
        let mut offsets = Vec::new();
        for part in key.split('.') {
            match &ty.shape {
                Shape::Record(fields) => {
                    let (idx, field) = fields
                        .iter()
                        .enumerate()
                        .find(|(_, f)| f.name == part)?;
                    offsets.push(idx);
                    ty = &field.ty;
                }
                Shape::Alias(_, inner) => {
                    return inner.resolve_dotted(part);
                }
                _ => return None,
            }
        }
        Some((offsets, ty.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, fields: Vec<Field>) -> Type {
        Type::new(Shape::Record(fields)).named(name)
    }

    #[test]
    fn fingerprint_stable_and_name_sensitive() {
        let a = record("conn", vec![Field::new("id", Type::new(Shape::Count))]);
        let b = record("conn", vec![Field::new("id", Type::new(Shape::Count))]);
        let c = record("conn2", vec![Field::new("id", Type::new(Shape::Count))]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn congruence_ignores_names() {
        let a = record("conn", vec![Field::new("id", Type::new(Shape::Count))]);
        let b = record("flow", vec![Field::new("identifier", Type::new(Shape::Count))]);
        assert!(a.congruent(&b));
        assert!(!a.type_eq(&b));
    }

    #[test]
    fn resolve_dotted_path() {
        let inner = record("nested", vec![Field::new("x", Type::new(Shape::Int))]);
        let outer = record(
            "outer",
            vec![Field::new("a", Type::new(Shape::Bool)), Field::new("b", inner)],
        );
        let (path, ty) = outer.resolve_dotted("b.x").unwrap();
        assert_eq!(path, vec![1, 0]);
        assert_eq!(ty.shape, Shape::Int);
    }
}
