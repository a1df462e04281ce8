/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{Error, ErrorCode};
use crate::tlv::{FromTLV, TLVElement, TLVTag, TLVValueType, TLVWrite, ToTLV};

/// A self-describing attribute value.
///
/// Mirrors the shapes expressible in TLV. Lists are encoded as TLV arrays.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Uint(u64),
    Int(i64),
    Utf8(String),
    Octets(Vec<u8>),
    /// Context-tagged fields
    Struct(Vec<(u8, AttrValue)>),
    List(Vec<AttrValue>),
}

impl AttrValue {
    pub fn utf8(value: &str) -> Self {
        Self::Utf8(value.to_string())
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for AttrValue {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        Self::Uint(value as _)
    }
}

impl From<u16> for AttrValue {
    fn from(value: u16) -> Self {
        Self::Uint(value as _)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::utf8(value)
    }
}

impl ToTLV for AttrValue {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        write_value(self, tag, &mut tw)
    }
}

/// Nested values recurse through the same writer so that the writer type stays fixed.
fn write_value<W: TLVWrite>(value: &AttrValue, tag: &TLVTag, tw: &mut W) -> Result<(), Error> {
    match value {
        AttrValue::Null => tw.null(tag),
        AttrValue::Bool(value) => tw.bool(tag, *value),
        AttrValue::Uint(value) => tw.u64(tag, *value),
        AttrValue::Int(value) => tw.i64(tag, *value),
        AttrValue::Utf8(value) => tw.utf8(tag, value),
        AttrValue::Octets(value) => tw.str(tag, value),
        AttrValue::Struct(fields) => {
            tw.start_struct(tag)?;
            for (ctx, value) in fields {
                write_value(value, &TLVTag::Context(*ctx), tw)?;
            }
            tw.end_container()
        }
        AttrValue::List(items) => {
            tw.start_array(tag)?;
            for item in items {
                write_value(item, &TLVTag::Anonymous, tw)?;
            }
            tw.end_container()
        }
    }
}

impl<'a> FromTLV<'a> for AttrValue {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let value_type = element.control()?.value_type;

        let value = match value_type {
            TLVValueType::Null => Self::Null,
            TLVValueType::False | TLVValueType::True => Self::Bool(element.bool()?),
            TLVValueType::S8 | TLVValueType::S16 | TLVValueType::S32 | TLVValueType::S64 => {
                Self::Int(element.int()?)
            }
            TLVValueType::U8 | TLVValueType::U16 | TLVValueType::U32 | TLVValueType::U64 => {
                Self::Uint(element.uint()?)
            }
            TLVValueType::Struct => {
                let mut fields = Vec::new();

                for field in element.r#struct()?.iter() {
                    let field = field?;
                    let ctx = field.try_ctx()?.ok_or(ErrorCode::InvalidData)?;

                    fields.push((ctx, Self::from_tlv(&field)?));
                }

                Self::Struct(fields)
            }
            TLVValueType::Array | TLVValueType::List => Self::List(
                element
                    .container()?
                    .iter()
                    .map(|item| Self::from_tlv(&item?))
                    .collect::<Result<_, _>>()?,
            ),
            value_type if value_type.is_utf8() => Self::Utf8(element.utf8()?.to_string()),
            value_type if value_type.is_str() => Self::Octets(element.str()?.to_vec()),
            _ => Err(ErrorCode::InvalidDataType)?,
        };

        Ok(value)
    }
}
