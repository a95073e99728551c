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

//! The data universe: every value the store ingests, indexes or returns
//! is a [`Data`], and every column is described by a [`Type`].
//!
//! [`Data`] owns its contents; [`DataRef`] is the borrowed view handed
//! out by table slices. Equality and ordering are value-based within one
//! variant: a v4 address equals its v4-mapped v6 form, `-0.0` equals
//! `0.0`, and declared type names never participate.

mod address;
mod from_text;
mod pattern;
mod real;
mod time;
mod to_text;
pub mod value_encoding;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::address::{Address, Subnet};
pub use self::from_text::from_text;
pub use self::pattern::Pattern;
pub use self::real::Real;
pub use self::time::{Duration, Timestamp};
pub use self::to_text::ToText;

use crate::error::{Error, Result};

/// An owned value.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Data {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Count(u64),
    Real(Real),
    Str(String),
    Pattern(Pattern),
    Address(Address),
    Subnet(Subnet),
    Time(Timestamp),
    Duration(Duration),
    Enum(u32),
    List(Vec<Data>),
    Map(Vec<(Data, Data)>),
    Record(Vec<(String, Data)>),
}

/// A borrowed view of a value, as returned by `TableSlice::at`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataRef<'a> {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Count(u64),
    Real(Real),
    Str(&'a str),
    Pattern(&'a Pattern),
    Address(Address),
    Subnet(Subnet),
    Time(Timestamp),
    Duration(Duration),
    Enum(u32),
    List(&'a [Data]),
    Map(&'a [(Data, Data)]),
    Record(&'a [(String, Data)]),
}

impl Data {
    pub fn as_data_ref(&self) -> DataRef<'_> {
        match self {
            Data::Nil => DataRef::Nil,
            Data::Bool(v) => DataRef::Bool(*v),
            Data::Integer(v) => DataRef::Integer(*v),
            Data::Count(v) => DataRef::Count(*v),
            Data::Real(v) => DataRef::Real(*v),
            Data::Str(v) => DataRef::Str(v),
            Data::Pattern(v) => DataRef::Pattern(v),
            Data::Address(v) => DataRef::Address(*v),
            Data::Subnet(v) => DataRef::Subnet(*v),
            Data::Time(v) => DataRef::Time(*v),
            Data::Duration(v) => DataRef::Duration(*v),
            Data::Enum(v) => DataRef::Enum(*v),
            Data::List(v) => DataRef::List(v),
            Data::Map(v) => DataRef::Map(v),
            Data::Record(v) => DataRef::Record(v),
        }
    }

    /// The name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        self.as_data_ref().kind_name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Data::Nil)
    }
}

impl<'a> DataRef<'a> {
    pub fn to_owned_data(self) -> Data {
        match self {
            DataRef::Nil => Data::Nil,
            DataRef::Bool(v) => Data::Bool(v),
            DataRef::Integer(v) => Data::Integer(v),
            DataRef::Count(v) => Data::Count(v),
            DataRef::Real(v) => Data::Real(v),
            DataRef::Str(v) => Data::Str(v.to_owned()),
            DataRef::Pattern(v) => Data::Pattern(v.clone()),
            DataRef::Address(v) => Data::Address(v),
            DataRef::Subnet(v) => Data::Subnet(v),
            DataRef::Time(v) => Data::Time(v),
            DataRef::Duration(v) => Data::Duration(v),
            DataRef::Enum(v) => Data::Enum(v),
            DataRef::List(v) => Data::List(v.to_vec()),
            DataRef::Map(v) => Data::Map(v.to_vec()),
            DataRef::Record(v) => Data::Record(v.to_vec()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DataRef::Nil => "nil",
            DataRef::Bool(_) => "bool",
            DataRef::Integer(_) => "integer",
            DataRef::Count(_) => "count",
            DataRef::Real(_) => "real",
            DataRef::Str(_) => "string",
            DataRef::Pattern(_) => "pattern",
            DataRef::Address(_) => "address",
            DataRef::Subnet(_) => "subnet",
            DataRef::Time(_) => "time",
            DataRef::Duration(_) => "duration",
            DataRef::Enum(_) => "enumeration",
            DataRef::List(_) => "list",
            DataRef::Map(_) => "map",
            DataRef::Record(_) => "record",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, DataRef::Nil)
    }
}

impl From<DataRef<'_>> for Data {
    fn from(value: DataRef<'_>) -> Self {
        value.to_owned_data()
    }
}

impl From<u64> for Data {
    fn from(value: u64) -> Self {
        Data::Count(value)
    }
}

impl From<bool> for Data {
    fn from(value: bool) -> Self {
        Data::Bool(value)
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Data::Str(value.to_owned())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Data::Str(value)
    }
}

/// A field of a record type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// The shape of a [`Type`], without attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Bool,
    Integer,
    Count,
    Real,
    Str,
    Pattern,
    Address,
    Subnet,
    Time,
    Duration,
    Enumeration(Vec<String>),
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Record(Vec<Field>),
    Alias(String, Box<Type>),
}

/// A type with optional attributes. The `"key"` attribute on a record
/// field selects the key when a list of records is turned into a map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Type {
    kind: TypeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<(String, Option<String>)>,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
        }
    }

    pub fn bool_() -> Self {
        Self::new(TypeKind::Bool)
    }

    pub fn integer() -> Self {
        Self::new(TypeKind::Integer)
    }

    pub fn count() -> Self {
        Self::new(TypeKind::Count)
    }

    pub fn real() -> Self {
        Self::new(TypeKind::Real)
    }

    pub fn string() -> Self {
        Self::new(TypeKind::Str)
    }

    pub fn pattern() -> Self {
        Self::new(TypeKind::Pattern)
    }

    pub fn address() -> Self {
        Self::new(TypeKind::Address)
    }

    pub fn subnet() -> Self {
        Self::new(TypeKind::Subnet)
    }

    pub fn time() -> Self {
        Self::new(TypeKind::Time)
    }

    pub fn duration() -> Self {
        Self::new(TypeKind::Duration)
    }

    pub fn enumeration(variants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(TypeKind::Enumeration(
            variants.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn list(inner: Type) -> Self {
        Self::new(TypeKind::List(Box::new(inner)))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Self::new(TypeKind::Map(Box::new(key), Box::new(value)))
    }

    pub fn record(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::new(TypeKind::Record(fields.into_iter().collect()))
    }

    pub fn alias(name: impl Into<String>, inner: Type) -> Self {
        Self::new(TypeKind::Alias(name.into(), Box::new(inner)))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn attributes(&self) -> &[(String, Option<String>)] {
        &self.attributes
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref())
    }

    /// The aliased type one level down, if this is an alias.
    pub fn aliased(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Alias(_, inner) => Some(inner),
            _ => None,
        }
    }

    /// Resolve aliases down to the underlying shape.
    pub fn resolved(&self) -> &Type {
        let mut ty = self;
        while let Some(inner) = ty.aliased() {
            ty = inner;
        }
        ty
    }

    /// Whether a value can live in a column of this type. `Nil` is
    /// accepted everywhere; otherwise the value's variant must agree
    /// with the (alias-resolved) shape. Strings check against
    /// enumeration columns by variant name.
    pub fn is_compatible(&self, value: DataRef<'_>) -> bool {
        if value.is_nil() {
            return true;
        }
        match (&self.resolved().kind, value) {
            (TypeKind::Bool, DataRef::Bool(_))
            | (TypeKind::Integer, DataRef::Integer(_))
            | (TypeKind::Count, DataRef::Count(_))
            | (TypeKind::Real, DataRef::Real(_))
            | (TypeKind::Str, DataRef::Str(_))
            | (TypeKind::Pattern, DataRef::Pattern(_))
            | (TypeKind::Address, DataRef::Address(_))
            | (TypeKind::Subnet, DataRef::Subnet(_))
            | (TypeKind::Time, DataRef::Time(_))
            | (TypeKind::Duration, DataRef::Duration(_)) => true,
            (TypeKind::Enumeration(variants), DataRef::Enum(ordinal)) => {
                (ordinal as usize) < variants.len()
            }
            (TypeKind::Enumeration(variants), DataRef::Str(name)) => {
                variants.iter().any(|v| v == name)
            }
            (TypeKind::List(inner), DataRef::List(elements)) => elements
                .iter()
                .all(|e| inner.is_compatible(e.as_data_ref())),
            (TypeKind::Map(key, value), DataRef::Map(entries)) => entries.iter().all(|(k, v)| {
                key.is_compatible(k.as_data_ref()) && value.is_compatible(v.as_data_ref())
            }),
            (TypeKind::Record(fields), DataRef::Record(values)) => {
                fields.len() == values.len()
                    && fields
                        .iter()
                        .zip(values)
                        .all(|(f, (_, v))| f.ty.is_compatible(v.as_data_ref()))
            }
            _ => false,
        }
    }

    /// Flatten a record type into its leaf columns, joining nested field
    /// names with dots. Lists and maps are leaves. Non-record types
    /// flatten to a single unnamed column.
    pub fn flatten(&self) -> Vec<Field> {
        fn walk(prefix: &str, ty: &Type, out: &mut Vec<Field>) {
            match &ty.resolved().kind {
                TypeKind::Record(fields) => {
                    for field in fields {
                        let path = if prefix.is_empty() {
                            field.name.clone()
                        } else {
                            format!("{prefix}.{}", field.name)
                        };
                        walk(&path, &field.ty, out);
                    }
                }
                _ => out.push(Field::new(prefix, ty.clone())),
            }
        }
        let mut out = Vec::new();
        walk("", self, &mut out);
        out
    }
}

impl From<TypeKind> for Type {
    fn from(kind: TypeKind) -> Self {
        Self::new(kind)
    }
}

/// Turn a list of records into a map, keyed by the record field carrying
/// the `"key"` attribute.
pub fn list_of_records_to_map(list: &[Data], element: &Type) -> Result<Data> {
    let TypeKind::Record(fields) = &element.resolved().kind else {
        return Err(Error::type_clash(format!(
            "cannot convert list of {element} to map"
        )));
    };
    let key_index = fields
        .iter()
        .position(|f| f.ty.attribute("key").is_some())
        .ok_or_else(|| Error::type_clash("no field carries the \"key\" attribute"))?;
    let mut entries: Vec<(Data, Data)> = Vec::with_capacity(list.len());
    for data in list {
        let Data::Record(values) = data else {
            return Err(Error::type_clash(format!(
                "list element is {}, expected record",
                data.kind_name()
            )));
        };
        let key = values[key_index].1.clone();
        let mut rest = values.clone();
        rest.remove(key_index);
        if entries.iter().any(|(k, _)| *k == key) {
            return Err(Error::convert(format!("duplicate map key {key}")));
        }
        entries.push((key, Data::Record(rest)));
    }
    Ok(Data::Map(entries))
}
