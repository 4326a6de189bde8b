//! Predicate collection and dispatch grouping (spec.md §4.5): a partition doesn't walk the whole
//! expression tree against each bitmap indexer — it collects the unique leaf predicates once and
//! dispatches each to the one indexer that can answer it.

use super::{Expr, Operand, Predicate};
use std::collections::BTreeMap;

/// Which indexer a predicate should be evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DispatchKey {
    /// The per-partition event-type indexer.
    EventType,
    /// The per-partition timestamp indexer.
    EventTime,
    /// A field-level indexer, identified by the field's resolved type fingerprint and offset
    /// path within it.
    Field(u128, Vec<usize>),
}

impl DispatchKey {
    fn for_operand(operand: &Operand) -> Option<DispatchKey> {
        match operand {
            Operand::EventType => Some(DispatchKey::EventType),
            Operand::EventTime => Some(DispatchKey::EventTime),
            Operand::DataExtractor(ty, path) => {
                Some(DispatchKey::Field(ty.fingerprint().0, path.clone()))
            }
            Operand::Data(_) | Operand::TypeExtractor(_) | Operand::SchemaExtractor(_) => None,
        }
    }
}

/// Collect every distinct leaf predicate appearing in `expr`, in first-seen order.
pub fn unique_predicates(expr: &Expr) -> Vec<Predicate> {
    let mut seen = Vec::new();
    collect(expr, &mut seen);
    seen
}

fn collect(expr: &Expr, out: &mut Vec<Predicate>) {
    match expr {
        Expr::Nil => {}
        Expr::Conjunction(children) | Expr::Disjunction(children) => {
            for c in children {
                collect(c, out);
            }
        }
        Expr::Negation(inner) => collect(inner, out),
        Expr::Predicate(p) => {
            if !out.contains(p) {
                out.push(p.clone());
            }
        }
    }
}

/// Group `predicates` by the indexer each should be dispatched to. A predicate whose operand
/// doesn't map to any indexer (e.g. a bare `Data == Data` literal comparison, or an unresolved
/// schema-extractor) is dropped; the caller is expected to have already run the normalizer and
/// resolver so this shouldn't happen for well-formed queries.
pub fn group_by_dispatch(predicates: &[Predicate]) -> BTreeMap<DispatchKey, Vec<Predicate>> {
    let mut groups: BTreeMap<DispatchKey, Vec<Predicate>> = BTreeMap::new();
    for p in predicates {
        if let Some(key) = DispatchKey::for_operand(&p.lhs) {
            groups.entry(key).or_default().push(p.clone());
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expr::RelOp, value::Value};

    #[test]
    fn unique_predicates_deduplicates() {
        let p = Expr::predicate(
            Operand::EventType,
            RelOp::Eq,
            Operand::Data(Value::String("conn".into())),
        );
        let expr = Expr::Conjunction(vec![p.clone(), p.clone()]);
        assert_eq!(unique_predicates(&expr).len(), 1);
    }

    #[test]
    fn dispatch_groups_by_operand_kind() {
        let by_time = Expr::predicate(
            Operand::EventTime,
            RelOp::Lt,
            Operand::Data(Value::Time(vast_time::Time::from_timestamp_nanos(0))),
        );
        let by_type = Expr::predicate(
            Operand::EventType,
            RelOp::Eq,
            Operand::Data(Value::String("conn".into())),
        );
        let expr = Expr::Conjunction(vec![by_time, by_type]);
        let groups = group_by_dispatch(&unique_predicates(&expr));
        assert_eq!(groups.len(), 2);
        assert!(groups.contains_key(&DispatchKey::EventTime));
        assert!(groups.contains_key(&DispatchKey::EventType));
    }
}
