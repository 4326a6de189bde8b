//! Combine per-predicate bitmaps into one result bitmap, mirroring
//! [`vast_types::expr::evaluator`] but operating over whole columns of rows at once
//! (spec.md §4.4, "re-evaluate the expression using the bitmap evaluator"). Lives here rather
//! than in `vast_types` so a partition's field indexers (which depend on this crate) don't
//! create a cycle.

use crate::Bitmap;
use vast_types::{Expr, Predicate};

/// Evaluate `expr` over a universe of `rows` rows, resolving each leaf predicate via `lookup`.
///
/// `lookup` is expected to return a bitmap of exactly `rows` bits; if it returns a shorter one
/// (e.g. an indexer not yet stretched that far), the missing bits read as unset under `Bitmap`'s
/// zero-padding convention.
pub fn evaluate(expr: &Expr, rows: usize, lookup: &mut dyn FnMut(&Predicate) -> Bitmap) -> Bitmap {
    match expr {
        Expr::Nil => Bitmap::filled(rows, false),
        Expr::Conjunction(children) => {
            let mut acc = Bitmap::filled(rows, true);
            for child in children {
                acc &= &evaluate(child, rows, lookup);
            }
            acc
        }
        Expr::Disjunction(children) => {
            let mut acc = Bitmap::filled(rows, false);
            for child in children {
                acc |= &evaluate(child, rows, lookup);
            }
            acc
        }
        Expr::Negation(inner) => {
            let mut bitmap = evaluate(inner, rows, lookup);
            bitmap.flip();
            bitmap
        }
        Expr::Predicate(p) => lookup(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_types::{Operand, RelOp, Value};

    fn eq_predicate(name: &str) -> Predicate {
        Predicate::new(Operand::EventType, RelOp::Eq, Operand::Data(Value::String(name.into())))
    }

    #[test]
    fn conjunction_ands_predicate_bitmaps() {
        let expr = Expr::Conjunction(vec![
            Expr::Predicate(eq_predicate("a")),
            Expr::Predicate(eq_predicate("b")),
        ]);
        let mut a = Bitmap::filled(4, false);
        a.flip(); // every row satisfies "a"
        let mut b = Bitmap::new();
        for bit in [false, true, true, false] {
            b.push(bit);
        }
        let result = evaluate(&expr, 4, &mut |p| {
            if p == &eq_predicate("a") {
                a.clone()
            } else {
                b.clone()
            }
        });
        assert_eq!(result.count_ones(), 2);
        assert!(result.get(1) && result.get(2));
    }

    #[test]
    fn negation_flips_child_result() {
        let expr = Expr::not(Expr::Predicate(eq_predicate("a")));
        let mut hits = Bitmap::new();
        for bit in [true, false, true] {
            hits.push(bit);
        }
        let result = evaluate(&expr, 3, &mut |_| hits.clone());
        assert_eq!(result.count_ones(), 1);
        assert!(result.get(1));
    }

    #[test]
    fn nil_matches_nothing() {
        let result = evaluate(&Expr::Nil, 5, &mut |_| Bitmap::filled(5, true));
        assert_eq!(result.count_ones(), 0);
    }
}
