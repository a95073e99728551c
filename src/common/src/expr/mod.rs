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

//! The query expression tree: a boolean combination of relational
//! predicates over column extractors. Queries enter the store in this
//! form; a textual query language, if any, lives above the core.

mod normalize;
mod ops;

use std::fmt;

pub use self::normalize::{normalize, resolve};
pub use self::ops::{compare, evaluate, RelOp};

use crate::types::{Data, Type};

/// Addresses the left-hand side of a predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extractor {
    /// A field reference like `id.orig_h`, matched as a dot-separated
    /// suffix of the qualified column name. After resolution, the full
    /// qualified name.
    Field(String),
    /// Event metadata rather than a column.
    Meta(MetaExtractor),
    /// All columns of a given type, like `:addr`.
    Type(Type),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaExtractor {
    /// The name of the event's layout.
    Type,
    /// Any timestamp column of the event.
    Time,
    /// The wall-clock instant the event was ingested.
    ImportTime,
}

/// One relational predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub extractor: Extractor,
    pub op: RelOp,
    pub value: Data,
}

impl Predicate {
    pub fn new(extractor: Extractor, op: RelOp, value: Data) -> Self {
        Self {
            extractor,
            op,
            value,
        }
    }

    /// Shorthand for a field predicate.
    pub fn field(name: impl Into<String>, op: RelOp, value: Data) -> Self {
        Self::new(Extractor::Field(name.into()), op, value)
    }
}

/// A boolean expression over predicates.
///
/// An empty conjunction is `true` and an empty disjunction is `false`;
/// normalization uses the latter for predicates that cannot match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Predicate(Predicate),
    Conjunction(Vec<Expression>),
    Disjunction(Vec<Expression>),
    Negation(Box<Expression>),
}

impl Expression {
    /// The constant-false expression.
    pub fn empty() -> Self {
        Expression::Disjunction(Vec::new())
    }

    pub fn and(exprs: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Conjunction(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Disjunction(exprs.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expression) -> Self {
        Expression::Negation(Box::new(expr))
    }

    /// Visit every predicate in the tree.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.walk(&mut |p| out.push(p));
        out
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Predicate)) {
        match self {
            Expression::Predicate(p) => visit(p),
            Expression::Conjunction(exprs) | Expression::Disjunction(exprs) => {
                for e in exprs {
                    e.walk(visit);
                }
            }
            Expression::Negation(e) => e.walk(visit),
        }
    }
}

impl From<Predicate> for Expression {
    fn from(p: Predicate) -> Self {
        Expression::Predicate(p)
    }
}

impl fmt::Display for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extractor::Field(name) => write!(f, "{name}"),
            Extractor::Meta(MetaExtractor::Type) => write!(f, "#type"),
            Extractor::Meta(MetaExtractor::Time) => write!(f, "#time"),
            Extractor::Meta(MetaExtractor::ImportTime) => write!(f, "#import_time"),
            Extractor::Type(ty) => write!(f, ":{ty}"),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.extractor, self.op, self.value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, exprs: &[Expression], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, e) in exprs.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{e}")?;
            }
            write!(f, ")")
        }
        match self {
            Expression::Predicate(p) => write!(f, "{p}"),
            Expression::Conjunction(exprs) => join(f, exprs, "&&"),
            Expression::Disjunction(exprs) => join(f, exprs, "||"),
            Expression::Negation(e) => write!(f, "! {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::types::Data;

    #[test]
    fn test_display() {
        let expr = Expression::and([
            Expression::Predicate(Predicate::field(
                "id.orig_h",
                RelOp::In,
                Data::Subnet("10.0.0.0/8".parse().unwrap()),
            )),
            Expression::not(Expression::or([
                Expression::Predicate(Predicate::new(
                    Extractor::Meta(MetaExtractor::Type),
                    RelOp::Eq,
                    Data::Str("zeek.conn".into()),
                )),
                Expression::Predicate(Predicate::new(
                    Extractor::Type(Type::address()),
                    RelOp::Eq,
                    Data::Address("127.0.0.1".parse().unwrap()),
                )),
            ])),
        ]);
        expect![[r#"(id.orig_h in 10.0.0.0/8 && ! (#type == "zeek.conn" || :addr == 127.0.0.1))"#]]
            .assert_eq(&expr.to_string());
    }

    #[test]
    fn test_predicates_walk() {
        let expr = Expression::and([
            Expression::Predicate(Predicate::field("a", RelOp::Eq, Data::Count(1))),
            Expression::not(Expression::Predicate(Predicate::field(
                "b",
                RelOp::Lt,
                Data::Count(2),
            ))),
        ]);
        let names: Vec<_> = expr
            .predicates()
            .iter()
            .map(|p| p.extractor.to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
    }
}
