// Copyright 2025 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{Expression, Extractor, MetaExtractor, Predicate};
use crate::schema::Schema;
use crate::types::{Type, TypeKind};

/// Bring an expression into negation normal form: negations pushed into
/// the operators of the leaf predicates, nested connectives of the same
/// kind flattened, duplicate operands dropped. Evaluation semantics are
/// preserved.
pub fn normalize(expr: Expression) -> Expression {
    flatten(push_negations(expr, false))
}

fn push_negations(expr: Expression, negated: bool) -> Expression {
    match expr {
        Expression::Predicate(mut p) => {
            if negated {
                p.op = p.op.negate();
            }
            Expression::Predicate(p)
        }
        Expression::Negation(inner) => push_negations(*inner, !negated),
        Expression::Conjunction(exprs) => {
            let exprs = exprs
                .into_iter()
                .map(|e| push_negations(e, negated))
                .collect();
            if negated {
                Expression::Disjunction(exprs)
            } else {
                Expression::Conjunction(exprs)
            }
        }
        Expression::Disjunction(exprs) => {
            let exprs = exprs
                .into_iter()
                .map(|e| push_negations(e, negated))
                .collect();
            if negated {
                Expression::Conjunction(exprs)
            } else {
                Expression::Disjunction(exprs)
            }
        }
    }
}

fn flatten(expr: Expression) -> Expression {
    match expr {
        Expression::Conjunction(exprs) => {
            let mut out: Vec<Expression> = Vec::with_capacity(exprs.len());
            for e in exprs {
                match flatten(e) {
                    // A false operand makes the whole conjunction false.
                    Expression::Disjunction(inner) if inner.is_empty() => {
                        return Expression::empty();
                    }
                    // An empty conjunction is true, the neutral element.
                    Expression::Conjunction(inner) => {
                        for e in inner {
                            if !out.contains(&e) {
                                out.push(e);
                            }
                        }
                    }
                    other => {
                        if !out.contains(&other) {
                            out.push(other);
                        }
                    }
                }
            }
            if out.len() == 1 {
                out.pop().unwrap()
            } else {
                Expression::Conjunction(out)
            }
        }
        Expression::Disjunction(exprs) => {
            let mut out: Vec<Expression> = Vec::with_capacity(exprs.len());
            for e in exprs {
                match flatten(e) {
                    // A true operand makes the whole disjunction true.
                    Expression::Conjunction(inner) if inner.is_empty() => {
                        return Expression::Conjunction(Vec::new());
                    }
                    Expression::Disjunction(inner) => {
                        for e in inner {
                            if !out.contains(&e) {
                                out.push(e);
                            }
                        }
                    }
                    other => {
                        if !out.contains(&other) {
                            out.push(other);
                        }
                    }
                }
            }
            if out.len() == 1 {
                out.pop().unwrap()
            } else {
                Expression::Disjunction(out)
            }
        }
        Expression::Negation(inner) => Expression::not(flatten(*inner)),
        leaf => leaf,
    }
}

/// Resolve field, type and meta extractors against a schema, rewriting
/// every predicate to concrete qualified column names. A predicate with
/// no matching column becomes the empty (constant-false) expression;
/// one with several matches becomes a disjunction over them.
///
/// `#type` predicates stay as they are: they constrain the layout of an
/// event, which the partition resolves against its own slices.
pub fn resolve(expr: &Expression, schema: &Schema) -> Expression {
    let mut columns: Vec<(String, Type)> = Vec::new();
    for layout in schema.layouts() {
        for i in 0..layout.num_columns() {
            columns.push((layout.qualified_column(i), layout.column(i).ty.clone()));
        }
    }
    flatten(rewrite(expr, &columns))
}

fn rewrite(expr: &Expression, columns: &[(String, Type)]) -> Expression {
    match expr {
        Expression::Predicate(p) => {
            let matching: Vec<&str> = match &p.extractor {
                Extractor::Field(name) => columns
                    .iter()
                    .filter(|(qualified, _)| suffix_match(qualified, name))
                    .map(|(qualified, _)| qualified.as_str())
                    .collect(),
                Extractor::Type(ty) => columns
                    .iter()
                    .filter(|(_, column_ty)| {
                        column_ty.resolved().kind() == ty.resolved().kind()
                    })
                    .map(|(qualified, _)| qualified.as_str())
                    .collect(),
                Extractor::Meta(MetaExtractor::Time) => columns
                    .iter()
                    .filter(|(_, ty)| matches!(ty.resolved().kind(), TypeKind::Time))
                    .map(|(qualified, _)| qualified.as_str())
                    .collect(),
                Extractor::Meta(MetaExtractor::Type) => {
                    return expr.clone();
                }
                // Per-event import times are not recorded in partitions.
                Extractor::Meta(MetaExtractor::ImportTime) => Vec::new(),
            };
            Expression::Disjunction(
                matching
                    .into_iter()
                    .map(|qualified| {
                        Expression::Predicate(Predicate::field(
                            qualified,
                            p.op,
                            p.value.clone(),
                        ))
                    })
                    .collect(),
            )
        }
        Expression::Conjunction(exprs) => {
            Expression::Conjunction(exprs.iter().map(|e| rewrite(e, columns)).collect())
        }
        Expression::Disjunction(exprs) => {
            Expression::Disjunction(exprs.iter().map(|e| rewrite(e, columns)).collect())
        }
        Expression::Negation(inner) => Expression::not(rewrite(inner, columns)),
    }
}

/// Whether `name` addresses `qualified`: either the full name or a
/// suffix starting at a dot boundary.
fn suffix_match(qualified: &str, name: &str) -> bool {
    qualified == name
        || qualified
            .strip_suffix(name)
            .is_some_and(|rest| rest.ends_with('.'))
}
