//! Null-semantics expansion.
//!
//! Rewrites equality/inequality over nullable operands so that the dialect's
//! three-valued logic yields the host's two-valued answer. Comparisons produced
//! here are flagged `null_expanded`; running the pass on its own output returns
//! it unchanged.
//!
//! Positions under an odd number of `NOT`s are negative: an unknown comparison
//! there would flip into a wrong `TRUE`. Operands of a boolean `XOR` are exact,
//! since either outcome feeds the result. In positive positions an unknown
//! result already behaves like `FALSE`, so the shorter form is kept.

use crate::dialect::NullSemanticsMode;
use crate::query_tree::{BinaryExpr, BinaryOperator, CaseChain, CaseWhen, InList, TypedExpr, UnaryOperator};
use crate::render_plan::render_expr::RenderExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
    /// Both `TRUE` and `FALSE` must be exact; never unknown.
    Exact,
}

impl Polarity {
    fn negate(self) -> Self {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
            Polarity::Exact => Polarity::Exact,
        }
    }

    fn strict(self) -> bool {
        self != Polarity::Positive
    }
}

pub fn expand(expr: &RenderExpr, mode: NullSemanticsMode) -> RenderExpr {
    expand_in(expr, mode, Polarity::Positive)
}

fn is_connective(b: &BinaryExpr<RenderExpr>) -> bool {
    b.op.is_logical() || (b.op.is_bitwise() && b.result_type().is_boolean())
}

fn expand_in(expr: &RenderExpr, mode: NullSemanticsMode, polarity: Polarity) -> RenderExpr {
    match expr {
        RenderExpr::Binary(b) if b.op == BinaryOperator::ExclusiveOr && is_connective(b) => {
            expr.map_children(&mut |child| expand_in(child, mode, Polarity::Exact))
        }
        RenderExpr::Binary(b) if is_connective(b) => {
            expr.map_children(&mut |child| expand_in(child, mode, polarity))
        }
        RenderExpr::Binary(b) if matches!(b.op, BinaryOperator::Equal | BinaryOperator::NotEqual) => {
            expand_equality(b, mode, polarity)
        }
        RenderExpr::Unary(u) if u.op == UnaryOperator::Not => {
            expr.map_children(&mut |child| expand_in(child, mode, polarity.negate()))
        }
        RenderExpr::In(list) => expand_in_list(list, mode, polarity),
        RenderExpr::Case(case) if case.operand.is_some() => {
            expand_in(&desugar_simple_case(case), mode, polarity)
        }
        _ => expr.map_children(&mut |child| expand_in(child, mode, Polarity::Positive)),
    }
}

/// `CASE x WHEN v THEN ..` as searched `CASE WHEN x = v THEN ..`.
fn desugar_simple_case(case: &CaseChain<RenderExpr>) -> RenderExpr {
    let Some(operand) = &case.operand else {
        return RenderExpr::Case(case.clone());
    };
    RenderExpr::Case(CaseChain {
        operand: None,
        whens: case
            .whens
            .iter()
            .map(|w| CaseWhen {
                when: RenderExpr::binary(
                    BinaryOperator::Equal,
                    operand.as_ref().clone(),
                    w.when.clone(),
                ),
                then: w.then.clone(),
            })
            .collect(),
        otherwise: case.otherwise.clone(),
    })
}

fn null_test(operand: RenderExpr, equal: bool) -> RenderExpr {
    if equal {
        RenderExpr::is_null(operand)
    } else {
        RenderExpr::is_not_null(operand)
    }
}

fn expand_equality(
    b: &BinaryExpr<RenderExpr>,
    mode: NullSemanticsMode,
    polarity: Polarity,
) -> RenderExpr {
    let left = expand_in(&b.left, mode, Polarity::Positive);
    let right = expand_in(&b.right, mode, Polarity::Positive);
    let strict = polarity.strict();
    let equal = b.op == BinaryOperator::Equal;

    if b.null_expanded {
        return RenderExpr::Binary(BinaryExpr {
            op: b.op,
            left: Box::new(left),
            right: Box::new(right),
            ty: b.ty.clone(),
            null_expanded: true,
        });
    }

    match (left.is_null_literal(), right.is_null_literal()) {
        (true, true) => return RenderExpr::boolean(equal),
        (true, false) => return null_test(right, equal),
        (false, true) => return null_test(left, equal),
        (false, false) => {}
    }

    let comparison = RenderExpr::expanded(b.op, left.clone(), right.clone());
    if mode == NullSemanticsMode::Relational {
        return comparison;
    }

    match (equal, left.is_nullable(), right.is_nullable()) {
        (_, false, false) => comparison,
        (true, true, true) => {
            let both_null = RenderExpr::and(
                RenderExpr::is_null(left.clone()),
                RenderExpr::is_null(right.clone()),
            );
            if strict {
                let both_present = RenderExpr::and(
                    RenderExpr::and(comparison, RenderExpr::is_not_null(left)),
                    RenderExpr::is_not_null(right),
                );
                RenderExpr::or(both_present, both_null)
            } else {
                RenderExpr::or(comparison, both_null)
            }
        }
        (true, left_nullable, _) => {
            if strict {
                let nullable = if left_nullable { left } else { right };
                RenderExpr::and(comparison, RenderExpr::is_not_null(nullable))
            } else {
                comparison
            }
        }
        (false, true, true) => RenderExpr::and(
            RenderExpr::or(
                RenderExpr::or(comparison, RenderExpr::is_null(left.clone())),
                RenderExpr::is_null(right.clone()),
            ),
            RenderExpr::or(RenderExpr::is_not_null(left), RenderExpr::is_not_null(right)),
        ),
        (false, left_nullable, _) => {
            let nullable = if left_nullable { left } else { right };
            RenderExpr::or(comparison, RenderExpr::is_null(nullable))
        }
    }
}

fn expand_in_list(
    list: &InList<RenderExpr>,
    mode: NullSemanticsMode,
    polarity: Polarity,
) -> RenderExpr {
    let item = expand_in(&list.item, mode, Polarity::Positive);
    let values: Vec<RenderExpr> = list
        .values
        .iter()
        .map(|v| expand_in(v, mode, Polarity::Positive))
        .collect();

    if list.null_expanded || mode == NullSemanticsMode::Relational {
        return RenderExpr::In(InList {
            item: Box::new(item),
            values,
            negated: list.negated,
            null_expanded: list.null_expanded,
        });
    }

    // nullable columns and expressions in the list become separate comparisons
    let (nullable, fixed): (Vec<RenderExpr>, Vec<RenderExpr>) = values
        .into_iter()
        .partition(|v| v.is_nullable() && !v.is_null_literal());
    if !nullable.is_empty() {
        let op = if list.negated {
            BinaryOperator::NotEqual
        } else {
            BinaryOperator::Equal
        };
        let mut terms: Vec<RenderExpr> = Vec::with_capacity(nullable.len() + 1);
        if !fixed.is_empty() {
            let rest = InList {
                item: Box::new(item.clone()),
                values: fixed,
                negated: list.negated,
                null_expanded: false,
            };
            terms.push(expand_in_list(&rest, mode, polarity));
        }
        for value in nullable {
            let comparison = BinaryExpr {
                op,
                left: Box::new(item.clone()),
                right: Box::new(value),
                ty: None,
                null_expanded: false,
            };
            terms.push(expand_equality(&comparison, mode, polarity));
        }
        let combine: fn(RenderExpr, RenderExpr) -> RenderExpr = if list.negated {
            RenderExpr::and
        } else {
            RenderExpr::or
        };
        return terms
            .into_iter()
            .reduce(combine)
            .unwrap_or_else(|| RenderExpr::boolean(list.negated));
    }
    let values = fixed;

    let had_null = values.iter().any(TypedExpr::is_null_literal);
    let values: Vec<RenderExpr> = values.into_iter().filter(|v| !v.is_null_literal()).collect();
    if values.is_empty() {
        return if had_null {
            null_test(item, !list.negated)
        } else {
            // x IN () is false, x NOT IN () is true
            RenderExpr::boolean(list.negated)
        };
    }

    let item_nullable = item.is_nullable();
    let expanded = RenderExpr::In(InList {
        item: Box::new(item.clone()),
        values,
        negated: list.negated,
        null_expanded: true,
    });

    match (had_null, list.negated) {
        (true, false) => RenderExpr::or(expanded, RenderExpr::is_null(item)),
        (true, true) => RenderExpr::and(expanded, RenderExpr::is_not_null(item)),
        (false, true) if item_nullable => RenderExpr::or(expanded, RenderExpr::is_null(item)),
        (false, false) if item_nullable && polarity.strict() => {
            RenderExpr::and(expanded, RenderExpr::is_not_null(item))
        }
        _ => expanded,
    }
}
