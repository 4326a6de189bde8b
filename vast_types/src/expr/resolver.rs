//! Schema-extractor resolution (spec.md §3.6, §4.6): turns a dotted-path
//! [`Operand::SchemaExtractor`] into a concrete [`Operand::DataExtractor`] for one candidate
//! type, and expands a query across every type in a schema that the extractor actually resolves
//! against.

use super::{Expr, Operand, Predicate};
use crate::types::Type;

/// Resolve every schema-extractor in `expr` against a single candidate type.
///
/// Returns `None` if any schema-extractor in `expr` does not resolve against `ty` (the dotted
/// path doesn't exist in `ty`'s record shape) — such an expression simply does not apply to this
/// type and the caller should drop it rather than treat it as a match.
pub fn resolve_against(expr: &Expr, ty: &Type) -> Option<Expr> {
    match expr {
        Expr::Nil => Some(Expr::Nil),
        Expr::Conjunction(children) => {
            let resolved: Option<Vec<Expr>> =
                children.iter().map(|c| resolve_against(c, ty)).collect();
            Some(Expr::Conjunction(resolved?))
        }
        Expr::Disjunction(children) => {
            let resolved: Option<Vec<Expr>> =
                children.iter().map(|c| resolve_against(c, ty)).collect();
            Some(Expr::Disjunction(resolved?))
        }
        Expr::Negation(inner) => Some(Expr::not(resolve_against(inner, ty)?)),
        Expr::Predicate(p) => resolve_predicate(p, ty).map(Expr::Predicate),
    }
}

fn resolve_predicate(p: &Predicate, ty: &Type) -> Option<Predicate> {
    let lhs = resolve_operand(&p.lhs, ty)?;
    let rhs = resolve_operand(&p.rhs, ty)?;
    Some(Predicate::new(lhs, p.op, rhs))
}

fn resolve_operand(operand: &Operand, ty: &Type) -> Option<Operand> {
    match operand {
        Operand::SchemaExtractor(path) => {
            let (offsets, _leaf) = ty.resolve_dotted(path)?;
            Some(Operand::DataExtractor(ty.clone(), offsets))
        }
        other => Some(other.clone()),
    }
}

/// Expand `expr` across every type in `schema` that it can resolve against, guarding each
/// resolved branch with an explicit type-extractor check so the evaluator only applies it to
/// matching events. An expression with no schema-extractors at all (pure time/type predicates)
/// is returned unchanged, since it already applies uniformly.
pub fn resolve(expr: &Expr, schema: &[Type]) -> Expr {
    if !contains_schema_extractor(expr) {
        return expr.clone();
    }
    let branches: Vec<Expr> = schema
        .iter()
        .filter_map(|ty| {
            resolve_against(expr, ty).map(|resolved| {
                Expr::Conjunction(vec![
                    Expr::predicate(
                        Operand::TypeExtractor(ty.clone()),
                        super::RelOp::Eq,
                        Operand::EventType,
                    ),
                    resolved,
                ])
            })
        })
        .collect();
    match branches.len() {
        0 => Expr::Nil,
        1 => branches.into_iter().next().unwrap(),
        _ => Expr::Disjunction(branches),
    }
}

fn contains_schema_extractor(expr: &Expr) -> bool {
    match expr {
        Expr::Nil => false,
        Expr::Conjunction(c) | Expr::Disjunction(c) => c.iter().any(contains_schema_extractor),
        Expr::Negation(inner) => contains_schema_extractor(inner),
        Expr::Predicate(p) => {
            matches!(p.lhs, Operand::SchemaExtractor(_)) || matches!(p.rhs, Operand::SchemaExtractor(_))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::RelOp,
        types::{Field, Shape},
        value::Value,
    };

    fn conn_type() -> Type {
        Type::new(Shape::Record(vec![Field::new("proto", Type::new(Shape::String))])).named("conn")
    }

    fn dns_type() -> Type {
        Type::new(Shape::Record(vec![Field::new("query", Type::new(Shape::String))])).named("dns")
    }

    #[test]
    fn resolves_against_matching_type_only() {
        let expr = Expr::predicate(
            Operand::SchemaExtractor("proto".into()),
            RelOp::Eq,
            Operand::Data(Value::String("tcp".into())),
        );
        let schema = vec![conn_type(), dns_type()];
        let resolved = resolve(&expr, &schema);
        // Only `conn` has a `proto` field, so resolution collapses to a single branch, not a
        // disjunction across both types.
        assert!(matches!(resolved, Expr::Conjunction(_)));
    }

    #[test]
    fn expression_without_schema_extractor_passes_through() {
        let expr = Expr::predicate(
            Operand::EventType,
            RelOp::Eq,
            Operand::Data(Value::String("conn".into())),
        );
        let resolved = resolve(&expr, &[conn_type()]);
        assert_eq!(resolved, expr);
    }
}
