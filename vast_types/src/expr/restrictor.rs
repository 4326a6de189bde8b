//! Time-range restriction: a cheap pre-filter that decides whether a partition's
//! `[first, last]` timestamp span can possibly satisfy an expression, without touching any
//! bitmap index (spec.md §4.5, "partition pruning").
//!
//! A negation only flips the verdict when it sits directly on top of a time-extractor
//! predicate; negating any other subexpression can't be turned into a sound interval test, so
//! it passes through unchanged (matching the conservative "maybe applies" behaviour of the
//! original restrictor).

use super::{Expr, Operand, Predicate, RelOp};
use crate::value::Value;
use vast_time::Time;

/// Evaluate whether the interval `[first, last]` could contain a match for `expr`.
///
/// Returning `true` means "can't rule this partition out"; `false` means the partition is
/// provably irrelevant and can be skipped entirely.
pub fn restrict(expr: &Expr, first: Time, last: Time) -> bool {
    match expr {
        Expr::Nil => false,
        Expr::Conjunction(children) => children.iter().all(|c| restrict(c, first, last)),
        Expr::Disjunction(children) => children.iter().any(|c| restrict(c, first, last)),
        Expr::Negation(inner) => {
            let r = restrict(inner, first, last);
            if let Expr::Predicate(p) = inner.as_ref() {
                if matches!(p.lhs, Operand::EventTime) {
                    return !r;
                }
            }
            r
        }
        Expr::Predicate(p) => restrict_predicate(p, first, last),
    }
}

fn restrict_predicate(p: &Predicate, first: Time, last: Time) -> bool {
    if !matches!(p.lhs, Operand::EventTime) {
        return true;
    }
    let Operand::Data(Value::Time(bound)) = &p.rhs else {
        return true;
    };
    evaluate_time_cmp(first, p.op, *bound) || evaluate_time_cmp(last, p.op, *bound)
}

fn evaluate_time_cmp(point: Time, op: RelOp, bound: Time) -> bool {
    match op {
        RelOp::Eq => point == bound,
        RelOp::NotEq => point != bound,
        RelOp::Lt => point < bound,
        RelOp::Le => point <= bound,
        RelOp::Gt => point > bound,
        RelOp::Ge => point >= bound,
        // Non-ordering operators never apply to a time extractor; don't restrict.
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Predicate;

    fn t(secs: i64) -> Time {
        Time::from_timestamp_nanos(secs * 1_000_000_000)
    }

    fn time_lt(bound: i64) -> Expr {
        Expr::Predicate(Predicate::new(
            Operand::EventTime,
            RelOp::Lt,
            Operand::Data(Value::Time(t(bound))),
        ))
    }

    #[test]
    fn predicate_outside_partition_span_is_pruned() {
        // partition spans [100, 200]; "time < 50" can't match anywhere in it.
        assert!(!restrict(&time_lt(50), t(100), t(200)));
    }

    #[test]
    fn predicate_overlapping_partition_span_is_kept() {
        assert!(restrict(&time_lt(150), t(100), t(200)));
    }

    #[test]
    fn negation_on_time_predicate_flips_verdict() {
        let expr = Expr::not(time_lt(50));
        // "not(time < 50)" over [100, 200]: every point in-range satisfies "not <50", so it's kept.
        assert!(restrict(&expr, t(100), t(200)));
    }

    #[test]
    fn non_time_predicate_never_restricts() {
        let expr = Expr::predicate(
            Operand::EventType,
            RelOp::Eq,
            Operand::Data(Value::String("conn".into())),
        );
        assert!(restrict(&expr, t(100), t(200)));
    }
}
