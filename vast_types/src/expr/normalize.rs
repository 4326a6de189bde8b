//! Expression normalization (spec.md §3.6): hoist → align → denegate → re-hoist.
//!
//! Normalizing puts every expression into a canonical shape so that later stages (restrictor,
//! predicatizer, bitmap evaluation) don't each have to handle redundant nesting, operands on the
//! "wrong" side of a predicate, or negations sitting above compound subexpressions.

use super::{Expr, Operand, Predicate};

/// Run the full normalization pipeline.
pub fn normalize(expr: &Expr) -> Expr {
    let hoisted = hoist(expr);
    let aligned = align(&hoisted);
    let denegated = denegate(&aligned);
    hoist(&denegated)
}

/// Flatten nested conjunctions/disjunctions of the same kind into a single level
/// (`AND(a, AND(b, c))` becomes `AND(a, b, c)`), and collapse single-child compounds.
fn hoist(expr: &Expr) -> Expr {
    match expr {
        Expr::Conjunction(children) => {
            let mut flat = Vec::new();
            for c in children.iter().map(hoist) {
                match c {
                    Expr::Conjunction(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            collapse(Expr::Conjunction(flat))
        }
        Expr::Disjunction(children) => {
            let mut flat = Vec::new();
            for c in children.iter().map(hoist) {
                match c {
                    Expr::Disjunction(inner) => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            collapse(Expr::Disjunction(flat))
        }
        Expr::Negation(inner) => Expr::not(hoist(inner)),
        other => other.clone(),
    }
}

fn collapse(expr: Expr) -> Expr {
    match expr {
        Expr::Conjunction(children) | Expr::Disjunction(children) if children.is_empty() => {
            Expr::Nil
        }
        Expr::Conjunction(mut children) if children.len() == 1 => children.remove(0),
        Expr::Disjunction(mut children) if children.len() == 1 => children.remove(0),
        other => other,
    }
}

/// Rewrite every predicate so that an extractor operand (anything but a literal [`Operand::Data`])
/// sits on the left-hand side, flipping the operator as needed. A `data op data` predicate (both
/// sides literals) is left as-is.
fn align(expr: &Expr) -> Expr {
    match expr {
        Expr::Conjunction(children) => Expr::Conjunction(children.iter().map(align).collect()),
        Expr::Disjunction(children) => Expr::Disjunction(children.iter().map(align).collect()),
        Expr::Negation(inner) => Expr::not(align(inner)),
        Expr::Predicate(p) => Expr::Predicate(align_predicate(p)),
        Expr::Nil => Expr::Nil,
    }
}

fn align_predicate(p: &Predicate) -> Predicate {
    let lhs_is_extractor = !matches!(p.lhs, Operand::Data(_));
    let rhs_is_extractor = !matches!(p.rhs, Operand::Data(_));
    if !lhs_is_extractor && rhs_is_extractor {
        Predicate::new(p.rhs.clone(), p.op.flip(), p.lhs.clone())
    } else {
        p.clone()
    }
}

/// Push negations down to the leaves via De Morgan's laws, eliminating double negation and
/// negating predicates' operators directly instead of wrapping them.
fn denegate(expr: &Expr) -> Expr {
    match expr {
        Expr::Conjunction(children) => Expr::Conjunction(children.iter().map(denegate).collect()),
        Expr::Disjunction(children) => Expr::Disjunction(children.iter().map(denegate).collect()),
        Expr::Predicate(_) | Expr::Nil => expr.clone(),
        Expr::Negation(inner) => denegate_negation(inner),
    }
}

fn denegate_negation(inner: &Expr) -> Expr {
    match inner {
        // Double negation: not(not(e)) == e.
        Expr::Negation(inner2) => denegate(inner2),
        // De Morgan: not(AND(a, b, ...)) == OR(not a, not b, ...).
        Expr::Conjunction(children) => {
            Expr::Disjunction(children.iter().map(|c| denegate_negation_of(c)).collect())
        }
        // De Morgan: not(OR(a, b, ...)) == AND(not a, not b, ...).
        Expr::Disjunction(children) => {
            Expr::Conjunction(children.iter().map(|c| denegate_negation_of(c)).collect())
        }
        Expr::Predicate(p) => Expr::predicate(p.lhs.clone(), p.op.negate(), p.rhs.clone()),
        Expr::Nil => Expr::Nil,
    }
}

fn denegate_negation_of(expr: &Expr) -> Expr {
    denegate_negation(expr)
}
