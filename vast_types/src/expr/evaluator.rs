//! Direct evaluation of a (fully resolved) expression against a single event (spec.md §4.6,
//! "continuous query matching"). Used by the continuous-query path, where every candidate
//! event is checked one at a time rather than via bitmap indexes.

use super::{Expr, Operand, Predicate, RelOp};
use crate::{event::Event, types::Type, value::Value};
use regex::Regex;

/// Evaluate `expr` against `event`.
///
/// A predicate whose data-extractor type doesn't match the event's type evaluates to `false`
/// rather than erroring: the resolver (see [`super::resolver`]) is expected to have already
/// guarded such predicates behind a type check, so this only matters if `expr` is evaluated
/// without going through the resolver first.
pub fn evaluate(expr: &Expr, event: &Event) -> bool {
    match expr {
        Expr::Nil => false,
        Expr::Conjunction(children) => children.iter().all(|c| evaluate(c, event)),
        Expr::Disjunction(children) => children.iter().any(|c| evaluate(c, event)),
        Expr::Negation(inner) => !evaluate(inner, event),
        Expr::Predicate(p) => evaluate_predicate(p, event),
    }
}

fn evaluate_predicate(p: &Predicate, event: &Event) -> bool {
    match &p.lhs {
        Operand::TypeExtractor(ty) => evaluate_type_match(ty, event.ty(), p.op),
        Operand::EventType => {
            let name = Value::String(event.ty().name.clone().unwrap_or_default());
            evaluate_rel_op(&name, p.op, &rhs_value(&p.rhs))
        }
        Operand::EventTime => evaluate_rel_op(&Value::Time(event.timestamp()), p.op, &rhs_value(&p.rhs)),
        Operand::DataExtractor(ty, path) => {
            if !ty.type_eq(event.ty()) {
                return false;
            }
            match event.data().at_path(path) {
                Some(v) => evaluate_rel_op(v, p.op, &rhs_value(&p.rhs)),
                None => false,
            }
        }
        // An unresolved schema-extractor can't be evaluated directly; the resolver must expand
        // it against a concrete type first.
        Operand::SchemaExtractor(_) | Operand::Data(_) => false,
    }
}

fn rhs_value(operand: &Operand) -> Value {
    match operand {
        Operand::Data(v) => v.clone(),
        _ => Value::Nil,
    }
}

fn evaluate_type_match(extractor: &Type, event_ty: &Type, op: RelOp) -> bool {
    let matches = extractor.congruent(event_ty) || extractor.type_eq(event_ty);
    match op {
        RelOp::NotEq => !matches,
        _ => matches,
    }
}

/// Evaluate a single relational operator over two concrete values (spec.md §3.6).
pub fn evaluate_rel_op(lhs: &Value, op: RelOp, rhs: &Value) -> bool {
    match op {
        RelOp::Eq => lhs == rhs,
        RelOp::NotEq => lhs != rhs,
        RelOp::Lt => lhs < rhs,
        RelOp::Le => lhs <= rhs,
        RelOp::Gt => lhs > rhs,
        RelOp::Ge => lhs >= rhs,
        RelOp::Match => regex_match(lhs, rhs),
        RelOp::NotMatch => !regex_match(lhs, rhs),
        RelOp::In => membership(lhs, rhs),
        RelOp::NotIn => !membership(lhs, rhs),
        RelOp::Ni => membership(rhs, lhs),
        RelOp::NotNi => !membership(rhs, lhs),
    }
}

fn regex_match(lhs: &Value, rhs: &Value) -> bool {
    let (Value::String(haystack), Value::Pattern(pattern)) = (lhs, rhs) else {
        return false;
    };
    Regex::new(pattern)
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

/// Whether `needle` is contained in `haystack`: substring for strings, subnet containment for
/// addresses, element membership for vectors/sets.
fn membership(needle: &Value, haystack: &Value) -> bool {
    match (needle, haystack) {
        (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
        (Value::Address(a), Value::Subnet(s)) => s.contains(a),
        (v, Value::Vector(items)) | (v, Value::Set(items)) => items.contains(v),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Shape, Type as T};
    use vast_time::Time;

    fn conn_type() -> T {
        T::new(Shape::Record(vec![crate::types::Field::new(
            "proto",
            T::new(Shape::String),
        )]))
        .named("conn")
    }

    #[test]
    fn data_extractor_matches_only_its_own_type() {
        let ty = conn_type();
        let event = Event::with_id(
            crate::event::EventId::new(1),
            Time::from_timestamp_nanos(0),
            ty.clone(),
            Value::Record(vec![Value::String("tcp".into())]),
        );
        let expr = Expr::predicate(
            Operand::DataExtractor(ty, vec![0]),
            RelOp::Eq,
            Operand::Data(Value::String("tcp".into())),
        );
        assert!(evaluate(&expr, &event));
    }

    #[test]
    fn mismatched_type_never_matches() {
        let other = T::new(Shape::Bool).named("other");
        let event = Event::with_id(
            crate::event::EventId::new(1),
            Time::from_timestamp_nanos(0),
            conn_type(),
            Value::Record(vec![Value::String("tcp".into())]),
        );
        let expr = Expr::predicate(
            Operand::DataExtractor(other, vec![0]),
            RelOp::Eq,
            Operand::Data(Value::String("tcp".into())),
        );
        assert!(!evaluate(&expr, &event));
    }

    #[test]
    fn membership_checks_subnet_containment() {
        let lhs = Value::Address("10.0.0.5".parse().unwrap());
        let rhs = Value::Subnet(crate::value::Subnet::new("10.0.0.0".parse().unwrap(), 24));
        assert!(evaluate_rel_op(&lhs, RelOp::In, &rhs));
    }
}
