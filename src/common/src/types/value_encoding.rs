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

//! Binary encoding of values and types: a tag byte followed by a
//! little-endian body. Containers are length-prefixed, so decoding never
//! reads past its frame.

use bytes::{Buf, BufMut, Bytes};

use super::{Address, Data, DataRef, Field, Pattern, Subnet, Type, TypeKind};
use crate::error::{Error, Result, WithContext};

mod data_tag {
    pub const NIL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INTEGER: u8 = 2;
    pub const COUNT: u8 = 3;
    pub const REAL: u8 = 4;
    pub const STR: u8 = 5;
    pub const PATTERN: u8 = 6;
    pub const ADDRESS: u8 = 7;
    pub const SUBNET: u8 = 8;
    pub const TIME: u8 = 9;
    pub const DURATION: u8 = 10;
    pub const ENUM: u8 = 11;
    pub const LIST: u8 = 12;
    pub const MAP: u8 = 13;
    pub const RECORD: u8 = 14;
}

mod type_tag {
    pub const BOOL: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const COUNT: u8 = 2;
    pub const REAL: u8 = 3;
    pub const STR: u8 = 4;
    pub const PATTERN: u8 = 5;
    pub const ADDRESS: u8 = 6;
    pub const SUBNET: u8 = 7;
    pub const TIME: u8 = 8;
    pub const DURATION: u8 = 9;
    pub const ENUMERATION: u8 = 10;
    pub const LIST: u8 = 11;
    pub const MAP: u8 = 12;
    pub const RECORD: u8 = 13;
    pub const ALIAS: u8 = 14;
}

fn ensure(buf: &impl Buf, n: usize) -> Result<()> {
    if buf.remaining() < n {
        Err(Error::format(format!(
            "truncated encoding: need {n} bytes, have {}",
            buf.remaining()
        )))
    } else {
        Ok(())
    }
}

pub fn take_u8(buf: &mut impl Buf) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn take_u16(buf: &mut impl Buf) -> Result<u16> {
    ensure(buf, 2)?;
    Ok(buf.get_u16_le())
}

pub fn take_u32(buf: &mut impl Buf) -> Result<u32> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

pub fn take_u64(buf: &mut impl Buf) -> Result<u64> {
    ensure(buf, 8)?;
    Ok(buf.get_u64_le())
}

pub fn take_i64(buf: &mut impl Buf) -> Result<i64> {
    ensure(buf, 8)?;
    Ok(buf.get_i64_le())
}

fn take_f64(buf: &mut impl Buf) -> Result<f64> {
    ensure(buf, 8)?;
    Ok(buf.get_f64_le())
}

pub fn take_bytes(buf: &mut impl Buf, n: usize) -> Result<Bytes> {
    ensure(buf, n)?;
    Ok(buf.copy_to_bytes(n))
}

pub fn put_str(value: &str, buf: &mut impl BufMut) {
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub fn take_str(buf: &mut impl Buf) -> Result<String> {
    let len = take_u32(buf)? as usize;
    let bytes = take_bytes(buf, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::format(format!("invalid utf-8: {e}")))
}

impl Data {
    pub fn encode_to(&self, buf: &mut impl BufMut) {
        self.as_data_ref().encode_to(buf);
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Data> {
        let tag = take_u8(buf)?;
        match tag {
            data_tag::NIL => Ok(Data::Nil),
            data_tag::BOOL => Ok(Data::Bool(take_u8(buf)? != 0)),
            data_tag::INTEGER => Ok(Data::Integer(take_i64(buf)?)),
            data_tag::COUNT => Ok(Data::Count(take_u64(buf)?)),
            data_tag::REAL => Ok(Data::Real(take_f64(buf)?.into())),
            data_tag::STR => Ok(Data::Str(take_str(buf)?)),
            data_tag::PATTERN => Ok(Data::Pattern(Pattern::new(take_str(buf)?)?)),
            data_tag::ADDRESS => {
                let bytes = take_bytes(buf, 16)?;
                Ok(Data::Address(Address::from_octets(
                    bytes.as_ref().try_into().unwrap(),
                )))
            }
            data_tag::SUBNET => {
                let bytes = take_bytes(buf, 16)?;
                let network = Address::from_octets(bytes.as_ref().try_into().unwrap());
                Ok(Data::Subnet(Subnet::new(network, take_u8(buf)?)))
            }
            data_tag::TIME => Ok(Data::Time(super::Timestamp::from_nanos(take_i64(buf)?))),
            data_tag::DURATION => {
                Ok(Data::Duration(super::Duration::from_nanos(take_i64(buf)?)))
            }
            data_tag::ENUM => Ok(Data::Enum(take_u32(buf)?)),
            data_tag::LIST => {
                let len = take_u32(buf)? as usize;
                let mut elements = Vec::with_capacity(len.min(4096));
                for i in 0..len {
                    elements.push(Data::decode_from(buf).context(format!("[{i}]"))?);
                }
                Ok(Data::List(elements))
            }
            data_tag::MAP => {
                let len = take_u32(buf)? as usize;
                let mut entries = Vec::with_capacity(len.min(4096));
                for i in 0..len {
                    let key = Data::decode_from(buf).context(format!("[{i}].key"))?;
                    let value = Data::decode_from(buf).context(format!("[{i}].value"))?;
                    entries.push((key, value));
                }
                Ok(Data::Map(entries))
            }
            data_tag::RECORD => {
                let len = take_u32(buf)? as usize;
                let mut fields = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    let name = take_str(buf)?;
                    let value = Data::decode_from(buf).context(format!(".{name}"))?;
                    fields.push((name, value));
                }
                Ok(Data::Record(fields))
            }
            tag => Err(Error::format(format!("unknown data tag: {tag}"))),
        }
    }
}

impl DataRef<'_> {
    pub fn encode_to(&self, buf: &mut impl BufMut) {
        match self {
            DataRef::Nil => buf.put_u8(data_tag::NIL),
            DataRef::Bool(v) => {
                buf.put_u8(data_tag::BOOL);
                buf.put_u8(*v as u8);
            }
            DataRef::Integer(v) => {
                buf.put_u8(data_tag::INTEGER);
                buf.put_i64_le(*v);
            }
            DataRef::Count(v) => {
                buf.put_u8(data_tag::COUNT);
                buf.put_u64_le(*v);
            }
            DataRef::Real(v) => {
                buf.put_u8(data_tag::REAL);
                buf.put_f64_le(v.get());
            }
            DataRef::Str(v) => {
                buf.put_u8(data_tag::STR);
                put_str(v, buf);
            }
            DataRef::Pattern(v) => {
                buf.put_u8(data_tag::PATTERN);
                put_str(v.source(), buf);
            }
            DataRef::Address(v) => {
                buf.put_u8(data_tag::ADDRESS);
                buf.put_slice(&v.octets());
            }
            DataRef::Subnet(v) => {
                buf.put_u8(data_tag::SUBNET);
                buf.put_slice(&v.network().octets());
                buf.put_u8(v.length());
            }
            DataRef::Time(v) => {
                buf.put_u8(data_tag::TIME);
                buf.put_i64_le(v.as_nanos());
            }
            DataRef::Duration(v) => {
                buf.put_u8(data_tag::DURATION);
                buf.put_i64_le(v.as_nanos());
            }
            DataRef::Enum(v) => {
                buf.put_u8(data_tag::ENUM);
                buf.put_u32_le(*v);
            }
            DataRef::List(elements) => {
                buf.put_u8(data_tag::LIST);
                buf.put_u32_le(elements.len() as u32);
                for e in *elements {
                    e.encode_to(buf);
                }
            }
            DataRef::Map(entries) => {
                buf.put_u8(data_tag::MAP);
                buf.put_u32_le(entries.len() as u32);
                for (k, v) in *entries {
                    k.encode_to(buf);
                    v.encode_to(buf);
                }
            }
            DataRef::Record(fields) => {
                buf.put_u8(data_tag::RECORD);
                buf.put_u32_le(fields.len() as u32);
                for (name, v) in *fields {
                    put_str(name, buf);
                    v.encode_to(buf);
                }
            }
        }
    }
}

impl Type {
    pub fn encode_to(&self, buf: &mut impl BufMut) {
        match self.kind() {
            TypeKind::Bool => buf.put_u8(type_tag::BOOL),
            TypeKind::Integer => buf.put_u8(type_tag::INTEGER),
            TypeKind::Count => buf.put_u8(type_tag::COUNT),
            TypeKind::Real => buf.put_u8(type_tag::REAL),
            TypeKind::Str => buf.put_u8(type_tag::STR),
            TypeKind::Pattern => buf.put_u8(type_tag::PATTERN),
            TypeKind::Address => buf.put_u8(type_tag::ADDRESS),
            TypeKind::Subnet => buf.put_u8(type_tag::SUBNET),
            TypeKind::Time => buf.put_u8(type_tag::TIME),
            TypeKind::Duration => buf.put_u8(type_tag::DURATION),
            TypeKind::Enumeration(variants) => {
                buf.put_u8(type_tag::ENUMERATION);
                buf.put_u32_le(variants.len() as u32);
                for v in variants {
                    put_str(v, buf);
                }
            }
            TypeKind::List(inner) => {
                buf.put_u8(type_tag::LIST);
                inner.encode_to(buf);
            }
            TypeKind::Map(key, value) => {
                buf.put_u8(type_tag::MAP);
                key.encode_to(buf);
                value.encode_to(buf);
            }
            TypeKind::Record(fields) => {
                buf.put_u8(type_tag::RECORD);
                buf.put_u32_le(fields.len() as u32);
                for field in fields {
                    put_str(&field.name, buf);
                    field.ty.encode_to(buf);
                }
            }
            TypeKind::Alias(name, inner) => {
                buf.put_u8(type_tag::ALIAS);
                put_str(name, buf);
                inner.encode_to(buf);
            }
        }
        buf.put_u16_le(self.attributes().len() as u16);
        for (name, value) in self.attributes() {
            put_str(name, buf);
            match value {
                Some(value) => {
                    buf.put_u8(1);
                    put_str(value, buf);
                }
                None => buf.put_u8(0),
            }
        }
    }

    pub fn decode_from(buf: &mut impl Buf) -> Result<Type> {
        let tag = take_u8(buf)?;
        let kind = match tag {
            type_tag::BOOL => TypeKind::Bool,
            type_tag::INTEGER => TypeKind::Integer,
            type_tag::COUNT => TypeKind::Count,
            type_tag::REAL => TypeKind::Real,
            type_tag::STR => TypeKind::Str,
            type_tag::PATTERN => TypeKind::Pattern,
            type_tag::ADDRESS => TypeKind::Address,
            type_tag::SUBNET => TypeKind::Subnet,
            type_tag::TIME => TypeKind::Time,
            type_tag::DURATION => TypeKind::Duration,
            type_tag::ENUMERATION => {
                let len = take_u32(buf)? as usize;
                let mut variants = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    variants.push(take_str(buf)?);
                }
                TypeKind::Enumeration(variants)
            }
            type_tag::LIST => TypeKind::List(Box::new(Type::decode_from(buf)?)),
            type_tag::MAP => {
                let key = Type::decode_from(buf)?;
                let value = Type::decode_from(buf)?;
                TypeKind::Map(Box::new(key), Box::new(value))
            }
            type_tag::RECORD => {
                let len = take_u32(buf)? as usize;
                let mut fields = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    let name = take_str(buf)?;
                    let ty = Type::decode_from(buf).context(format!(".{name}"))?;
                    fields.push(Field::new(name, ty));
                }
                TypeKind::Record(fields)
            }
            type_tag::ALIAS => {
                let name = take_str(buf)?;
                TypeKind::Alias(name, Box::new(Type::decode_from(buf)?))
            }
            tag => return Err(Error::format(format!("unknown type tag: {tag}"))),
        };
        let mut ty = Type::new(kind);
        let n_attrs = take_u16(buf)? as usize;
        for _ in 0..n_attrs {
            let name = take_str(buf)?;
            let value = match take_u8(buf)? {
                0 => None,
                _ => Some(take_str(buf)?),
            };
            ty = ty.with_attribute(name, value);
        }
        Ok(ty)
    }
}
