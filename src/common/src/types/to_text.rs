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

//! The canonical text form of values and types. `from_text` parses
//! exactly what is printed here; integers always carry a sign and reals
//! always contain a `.` or exponent, so the scalar variants stay
//! distinguishable.

use std::fmt;
use std::fmt::Write;

use super::{Data, DataRef, Type, TypeKind};

pub trait ToText {
    fn write<W: Write>(&self, f: &mut W) -> fmt::Result;

    fn to_text(&self) -> String {
        let mut s = String::new();
        self.write(&mut s).unwrap();
        s
    }
}

impl ToText for DataRef<'_> {
    fn write<W: Write>(&self, f: &mut W) -> fmt::Result {
        match self {
            DataRef::Nil => f.write_str("nil"),
            DataRef::Bool(v) => write!(f, "{v}"),
            DataRef::Integer(v) => write!(f, "{v:+}"),
            DataRef::Count(v) => write!(f, "{v}"),
            DataRef::Real(v) => {
                let x = v.get();
                if x.is_nan() {
                    f.write_str("nan")
                } else if x.is_infinite() {
                    f.write_str(if x > 0.0 { "inf" } else { "-inf" })
                } else {
                    // `{:?}` is the shortest representation that parses
                    // back to the same bits and always keeps a `.` or
                    // exponent.
                    write!(f, "{x:?}")
                }
            }
            DataRef::Str(v) => write!(f, "{v:?}"),
            DataRef::Pattern(v) => {
                f.write_char('/')?;
                for c in v.source().chars() {
                    match c {
                        '\\' => f.write_str("\\\\")?,
                        '/' => f.write_str("\\/")?,
                        c => f.write_char(c)?,
                    }
                }
                f.write_char('/')
            }
            DataRef::Address(v) => write!(f, "{v}"),
            DataRef::Subnet(v) => write!(f, "{v}"),
            DataRef::Time(v) => write!(f, "{v}"),
            DataRef::Duration(v) => write!(f, "{v}"),
            DataRef::Enum(v) => write!(f, "#{v}"),
            DataRef::List(elements) => {
                f.write_char('[')?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    e.as_data_ref().write(f)?;
                }
                f.write_char(']')
            }
            DataRef::Map(entries) => {
                f.write_char('{')?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    k.as_data_ref().write(f)?;
                    f.write_str(" -> ")?;
                    v.as_data_ref().write(f)?;
                }
                f.write_char('}')
            }
            DataRef::Record(fields) => {
                f.write_char('<')?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: ")?;
                    v.as_data_ref().write(f)?;
                }
                f.write_char('>')
            }
        }
    }
}

impl ToText for Data {
    fn write<W: Write>(&self, f: &mut W) -> fmt::Result {
        self.as_data_ref().write(f)
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_data_ref().write(f)
    }
}

impl fmt::Display for DataRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TypeKind::Bool => f.write_str("bool")?,
            TypeKind::Integer => f.write_str("int")?,
            TypeKind::Count => f.write_str("count")?,
            TypeKind::Real => f.write_str("real")?,
            TypeKind::Str => f.write_str("string")?,
            TypeKind::Pattern => f.write_str("pattern")?,
            TypeKind::Address => f.write_str("addr")?,
            TypeKind::Subnet => f.write_str("subnet")?,
            TypeKind::Time => f.write_str("time")?,
            TypeKind::Duration => f.write_str("duration")?,
            TypeKind::Enumeration(variants) => {
                write!(f, "enum {{{}}}", variants.join(", "))?;
            }
            TypeKind::List(inner) => write!(f, "list<{inner}>")?,
            TypeKind::Map(key, value) => write!(f, "map<{key}, {value}>")?,
            TypeKind::Record(fields) => {
                f.write_str("record {")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}")?;
                }
                f.write_char('}')?;
            }
            TypeKind::Alias(name, _) => f.write_str(name)?,
        }
        for (name, value) in self.attributes() {
            match value {
                Some(value) => write!(f, " #{name}={value}")?,
                None => write!(f, " #{name}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Address, Pattern, Subnet};
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(Data::Nil.to_text(), "nil");
        assert_eq!(Data::Integer(-42).to_text(), "-42");
        assert_eq!(Data::Integer(42).to_text(), "+42");
        assert_eq!(Data::Count(42).to_text(), "42");
        assert_eq!(Data::Real(1.5.into()).to_text(), "1.5");
        assert_eq!(Data::Real(2.0.into()).to_text(), "2.0");
        assert_eq!(Data::Str("a \"b\"".into()).to_text(), r#""a \"b\"""#);
        assert_eq!(
            Data::Pattern(Pattern::new("foo/bar").unwrap()).to_text(),
            r"/foo\/bar/"
        );
        assert_eq!(Data::Enum(3).to_text(), "#3");
    }

    #[test]
    fn test_containers() {
        let list = Data::List(vec![Data::Count(1), Data::Count(2)]);
        assert_eq!(list.to_text(), "[1, 2]");
        let map = Data::Map(vec![(Data::Str("k".into()), Data::Count(1))]);
        assert_eq!(map.to_text(), r#"{"k" -> 1}"#);
        let record = Data::Record(vec![
            (
                "addr".into(),
                Data::Address("10.0.0.1".parse::<Address>().unwrap()),
            ),
            (
                "net".into(),
                Data::Subnet("10.0.0.0/8".parse::<Subnet>().unwrap()),
            ),
        ]);
        assert_eq!(record.to_text(), "<addr: 10.0.0.1, net: 10.0.0.0/8>");
    }

    #[test]
    fn test_type_display() {
        use crate::types::Field;
        let ty = Type::record([
            Field::new("ts", Type::time()),
            Field::new("uid", Type::string().with_attribute("key", None)),
            Field::new("ports", Type::list(Type::count())),
        ]);
        assert_eq!(
            ty.to_string(),
            "record {ts: time, uid: string #key, ports: list<count>}"
        );
    }
}
