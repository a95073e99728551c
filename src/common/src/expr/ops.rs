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

use std::fmt;

use crate::types::{Data, DataRef};

/// The relational operators a predicate can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Match,
    NotMatch,
}

impl RelOp {
    /// The operator such that `x negate(op) y == !(x op y)`.
    pub fn negate(self) -> Self {
        match self {
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Le => RelOp::Gt,
            RelOp::Gt => RelOp::Le,
            RelOp::Ge => RelOp::Lt,
            RelOp::In => RelOp::NotIn,
            RelOp::NotIn => RelOp::In,
            RelOp::Match => RelOp::NotMatch,
            RelOp::NotMatch => RelOp::Match,
        }
    }

    /// Whether the operator is one of the four order comparisons.
    pub fn is_ordering(self) -> bool {
        matches!(self, RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge)
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
            RelOp::In => "in",
            RelOp::NotIn => "!in",
            RelOp::Match => "~",
            RelOp::NotMatch => "!~",
        };
        f.write_str(s)
    }
}

/// Evaluate `lhs op rhs` on concrete values. Type mismatches evaluate
/// to `false` rather than erroring: a row of the wrong shape simply
/// does not match. A nil left-hand side matches nothing but `== nil`.
pub fn evaluate(lhs: DataRef<'_>, op: RelOp, rhs: &Data) -> bool {
    if lhs.is_nil() {
        return op == RelOp::Eq && rhs.is_nil();
    }
    match op {
        RelOp::Eq => lhs == rhs.as_data_ref(),
        RelOp::Ne => lhs != rhs.as_data_ref(),
        RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge => {
            let Some(ordering) = compare(lhs, rhs.as_data_ref()) else {
                return false;
            };
            match op {
                RelOp::Lt => ordering.is_lt(),
                RelOp::Le => ordering.is_le(),
                RelOp::Gt => ordering.is_gt(),
                RelOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
        RelOp::In => contained(lhs, rhs),
        RelOp::NotIn => !contained(lhs, rhs),
        RelOp::Match => matches!((lhs, rhs), (DataRef::Str(s), Data::Pattern(p)) if p.matches(s)),
        RelOp::NotMatch => !evaluate(lhs, RelOp::Match, rhs),
    }
}

/// Order two values of the same variant; `None` across variants (nil
/// included), so ordering predicates never match mismatched tags.
pub fn compare(lhs: DataRef<'_>, rhs: DataRef<'_>) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (DataRef::Integer(a), DataRef::Integer(b)) => Some(a.cmp(&b)),
        (DataRef::Count(a), DataRef::Count(b)) => Some(a.cmp(&b)),
        (DataRef::Real(a), DataRef::Real(b)) => Some(a.cmp(&b)),
        (DataRef::Str(a), DataRef::Str(b)) => Some(a.cmp(b)),
        (DataRef::Address(a), DataRef::Address(b)) => Some(a.cmp(&b)),
        (DataRef::Time(a), DataRef::Time(b)) => Some(a.cmp(&b)),
        (DataRef::Duration(a), DataRef::Duration(b)) => Some(a.cmp(&b)),
        (DataRef::Enum(a), DataRef::Enum(b)) => Some(a.cmp(&b)),
        (DataRef::Bool(a), DataRef::Bool(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

/// Membership: addresses in subnets, subnets in subnets, values in
/// lists, substrings in strings.
fn contained(lhs: DataRef<'_>, rhs: &Data) -> bool {
    match (lhs, rhs) {
        (DataRef::Address(addr), Data::Subnet(net)) => net.contains(&addr),
        (DataRef::Subnet(a), Data::Subnet(b)) => {
            b.length() <= a.length() && b.contains(&a.network())
        }
        (lhs, Data::List(elements)) => elements.iter().any(|e| e.as_data_ref() == lhs),
        (DataRef::Str(needle), Data::Str(haystack)) => haystack.contains(needle),
        _ => false,
    }
}
