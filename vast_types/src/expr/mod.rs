//! Query expressions, spec.md §3.6 and §6 ("Query expression wire form").

pub mod evaluator;
pub mod normalize;
pub mod predicatizer;
pub mod resolver;
pub mod restrictor;

use crate::{types::Type, value::Value};

/// A relational operator relating two predicate operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelOp {
    /// Regex match.
    Match,
    /// Regex non-match.
    NotMatch,
    /// Equality.
    Eq,
    /// Inequality.
    NotEq,
    /// Less-than.
    Lt,
    /// Less-than-or-equal.
    Le,
    /// Greater-than.
    Gt,
    /// Greater-than-or-equal.
    Ge,
    /// Membership: left is an element of right (container or substring).
    In,
    /// Negated membership.
    NotIn,
    /// Membership, symmetric to `In`: left is a container/superstring of right.
    Ni,
    /// Negated `Ni`.
    NotNi,
}

impl RelOp {
    /// The logical negation of this operator, used when De Morgan pushes a negation onto a
    /// predicate (spec.md §3.6, normalization step 3).
    pub fn negate(self) -> RelOp {
        match self {
            RelOp::Match => RelOp::NotMatch,
            RelOp::NotMatch => RelOp::Match,
            RelOp::Eq => RelOp::NotEq,
            RelOp::NotEq => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Le => RelOp::Gt,
            RelOp::Gt => RelOp::Le,
            RelOp::Ge => RelOp::Lt,
            RelOp::In => RelOp::NotIn,
            RelOp::NotIn => RelOp::In,
            RelOp::Ni => RelOp::NotNi,
            RelOp::NotNi => RelOp::Ni,
        }
    }

    /// The operator to use when the two operands of a predicate are swapped, used by
    /// normalization step 2 ("align") to move extractors onto the left-hand side.
    pub fn flip(self) -> RelOp {
        match self {
            RelOp::Match => RelOp::Match,
            RelOp::NotMatch => RelOp::NotMatch,
            RelOp::Eq => RelOp::Eq,
            RelOp::NotEq => RelOp::NotEq,
            RelOp::Lt => RelOp::Gt,
            RelOp::Le => RelOp::Ge,
            RelOp::Gt => RelOp::Lt,
            RelOp::Ge => RelOp::Le,
            RelOp::In => RelOp::Ni,
            RelOp::NotIn => RelOp::NotNi,
            RelOp::Ni => RelOp::In,
            RelOp::NotNi => RelOp::NotIn,
        }
    }
}

/// One side of a [`Predicate`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operand {
    /// A literal data value.
    Data(Value),
    /// The `&type` event-extractor: the event's type name.
    EventType,
    /// The `&time` event-extractor: the event's timestamp.
    EventTime,
    /// A type-extractor: matches against a whole [`Type`].
    TypeExtractor(Type),
    /// A schema-extractor: a dotted field path (`"conn.resp_port"`), resolved against a type at
    /// query-resolution time into a [`Operand::DataExtractor`].
    SchemaExtractor(String),
    /// A data-extractor: resolved `(type, field-offset path)`, evaluated directly against an
    /// event's data.
    DataExtractor(Type, Vec<usize>),
}

/// A single relational predicate: `lhs op rhs`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Predicate {
    /// The left-hand operand.
    pub lhs: Operand,
    /// The relational operator.
    pub op: RelOp,
    /// The right-hand operand.
    pub rhs: Operand,
}

impl Predicate {
    /// Construct a predicate.
    pub fn new(lhs: Operand, op: RelOp, rhs: Operand) -> Self {
        Self { lhs, op, rhs }
    }
}

/// The recursive expression variant, spec.md §3.6: `conjunction(E*) | disjunction(E*) |
/// negation(E) | predicate(L, op, R)`, plus the wire form's explicit empty `nil`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    /// The empty expression: matches nothing, used for an empty query.
    Nil,
    /// Logical AND of all children.
    Conjunction(Vec<Expr>),
    /// Logical OR of all children.
    Disjunction(Vec<Expr>),
    /// Logical NOT of the inner expression.
    Negation(Box<Expr>),
    /// A leaf relational predicate.
    Predicate(Predicate),
}

impl Expr {
    /// Construct a predicate expression.
    pub fn predicate(lhs: Operand, op: RelOp, rhs: Operand) -> Self {
        Expr::Predicate(Predicate::new(lhs, op, rhs))
    }

    /// Construct a negation.
    pub fn not(inner: Expr) -> Self {
        Expr::Negation(Box::new(inner))
    }

    /// Whether this is the empty expression.
    pub fn is_nil(&self) -> bool {
        matches!(self, Expr::Nil)
    }
}
