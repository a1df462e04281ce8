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

//! A compact codec for the Matter TLV format: the encoding of every
//! Interaction Model message payload.
//!
//! Writing goes through the [`TLVWrite`] trait, which is implemented for
//! [`WriteBuf`](crate::utils::writebuf::WriteBuf) and - as a pure byte counter - for `usize`.
//! Reading is done on-demand over borrowed byte slices with [`TLVElement`]
//! and [`TLVSequence`].

use core::fmt;

use alloc::vec::Vec;

use num::FromPrimitive;

use crate::error::{Error, ErrorCode};

pub use read::*;
pub use write::*;

mod read;
mod write;

/// Represents the TLV tag type encoded in the control byte of each TLV element.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, num_derive::FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TLVTagType {
    Anonymous = 0,
    Context = 1,
    CommonPrf16 = 2,
    CommonPrf32 = 3,
    ImplPrf16 = 4,
    ImplPrf32 = 5,
    FullQual48 = 6,
    FullQual64 = 7,
}

impl TLVTagType {
    /// Return the size of the tag data following the control byte
    /// in the TLV element representation.
    pub const fn size(&self) -> usize {
        match self {
            Self::Anonymous => 0,
            Self::Context => 1,
            Self::CommonPrf16 | Self::ImplPrf16 => 2,
            Self::CommonPrf32 | Self::ImplPrf32 => 4,
            Self::FullQual48 => 6,
            Self::FullQual64 => 8,
        }
    }
}

/// Represents the TLV value type encoded in the control byte of each TLV element.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, num_derive::FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TLVValueType {
    S8 = 0,
    S16 = 1,
    S32 = 2,
    S64 = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    U64 = 7,
    False = 8,
    True = 9,
    F32 = 10,
    F64 = 11,
    Utf8l = 12,
    Utf16l = 13,
    Utf32l = 14,
    Utf64l = 15,
    Str8l = 16,
    Str16l = 17,
    Str32l = 18,
    Str64l = 19,
    Null = 20,
    Struct = 21,
    Array = 22,
    List = 23,
    EndCnt = 24,
}

impl TLVValueType {
    /// Return the size of the value corresponding to this value type.
    ///
    /// If the value type has a variable size (i.e. octet and Utf8 strings), this function returns `None`.
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::S8 | Self::U8 => Some(1),
            Self::S16 | Self::U16 => Some(2),
            Self::S32 | Self::U32 | Self::F32 => Some(4),
            Self::S64 | Self::U64 | Self::F64 => Some(8),
            Self::Utf8l
            | Self::Utf16l
            | Self::Utf32l
            | Self::Utf64l
            | Self::Str8l
            | Self::Str16l
            | Self::Str32l
            | Self::Str64l => None,
            _ => Some(0),
        }
    }

    /// Return the size of the length field for variable size value types.
    pub const fn variable_size_len(&self) -> usize {
        match self {
            Self::Utf8l | Self::Str8l => 1,
            Self::Utf16l | Self::Str16l => 2,
            Self::Utf32l | Self::Str32l => 4,
            Self::Utf64l | Self::Str64l => 8,
            _ => 0,
        }
    }

    pub const fn is_container_start(&self) -> bool {
        matches!(self, Self::Struct | Self::Array | Self::List)
    }

    pub const fn is_container_end(&self) -> bool {
        matches!(self, Self::EndCnt)
    }

    pub const fn is_str(&self) -> bool {
        matches!(
            self,
            Self::Str8l | Self::Str16l | Self::Str32l | Self::Str64l
        )
    }

    pub const fn is_utf8(&self) -> bool {
        matches!(
            self,
            Self::Utf8l | Self::Utf16l | Self::Utf32l | Self::Utf64l
        )
    }
}

/// Represents the control byte of a TLV element (i.e. the tag type and the value type).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TLVControl {
    pub tag_type: TLVTagType,
    pub value_type: TLVValueType,
}

impl TLVControl {
    const TAG_SHIFT_BITS: u8 = 5;
    const TAG_MASK: u8 = 0xe0;
    const TYPE_MASK: u8 = 0x1f;

    #[inline(always)]
    pub const fn new(tag_type: TLVTagType, value_type: TLVValueType) -> Self {
        Self {
            tag_type,
            value_type,
        }
    }

    /// Parse the provided control byte into a tag type and a value type.
    #[inline(always)]
    pub fn parse(control: u8) -> Result<Self, Error> {
        let tag_type = FromPrimitive::from_u8((control & Self::TAG_MASK) >> Self::TAG_SHIFT_BITS)
            .ok_or(ErrorCode::TLVTypeMismatch)?;
        let value_type =
            FromPrimitive::from_u8(control & Self::TYPE_MASK).ok_or(ErrorCode::TLVTypeMismatch)?;

        Ok(Self::new(tag_type, value_type))
    }

    #[inline(always)]
    pub const fn as_raw(&self) -> u8 {
        ((self.tag_type as u8) << Self::TAG_SHIFT_BITS) | (self.value_type as u8)
    }

    #[inline(always)]
    pub fn is_container_end(&self) -> bool {
        matches!(self.tag_type, TLVTagType::Anonymous) && self.value_type.is_container_end()
    }
}

/// The TLV tags used by the Interaction Model.
///
/// The IM only ever uses anonymous and context-specific tags.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TLVTag {
    Anonymous,
    Context(u8),
}

impl TLVTag {
    pub const fn tag_type(&self) -> TLVTagType {
        match self {
            Self::Anonymous => TLVTagType::Anonymous,
            Self::Context(_) => TLVTagType::Context,
        }
    }
}

impl fmt::Display for TLVTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Context(ctx) => write!(f, "Context({})", ctx),
        }
    }
}

/// A nullable TLV value.
///
/// `null` is a property of the value domain, and is therefore different from
/// an optional struct member, which is represented with `Option`.
/// `Option<Nullable<T>>` is hence a valid (and used) combination.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Nullable<T>(Option<T>);

impl<T> Nullable<T> {
    pub const fn none() -> Self {
        Self(None)
    }

    pub const fn some(value: T) -> Self {
        Self(Some(value))
    }

    pub const fn new(value: Option<T>) -> Self {
        Self(value)
    }

    pub const fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub const fn as_opt_ref(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn into_option(self) -> Option<T> {
        self.0
    }
}

/// A type that can be decoded from a TLV element.
pub trait FromTLV<'a>: Sized {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error>;

    /// Decode an optional value: an empty element (i.e. a struct member
    /// which was not found) decodes to `None`.
    fn from_opt_tlv(element: &TLVElement<'a>) -> Result<Option<Self>, Error> {
        if element.is_empty() {
            Ok(None)
        } else {
            Self::from_tlv(element).map(Some)
        }
    }
}

/// A type that can be encoded as a TLV element.
pub trait ToTLV {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, tw: W) -> Result<(), Error>;
}

impl<T> ToTLV for &T
where
    T: ToTLV,
{
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, tw: W) -> Result<(), Error> {
        (*self).to_tlv(tag, tw)
    }
}

macro_rules! tlv_unsigned {
    ($t:ident) => {
        impl FromTLV<'_> for $t {
            fn from_tlv(element: &TLVElement) -> Result<Self, Error> {
                element.$t()
            }
        }

        impl ToTLV for $t {
            fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
                tw.$t(tag, *self)
            }
        }
    };
}

tlv_unsigned!(u8);
tlv_unsigned!(u16);
tlv_unsigned!(u32);
tlv_unsigned!(u64);

impl FromTLV<'_> for bool {
    fn from_tlv(element: &TLVElement) -> Result<Self, Error> {
        element.bool()
    }
}

impl ToTLV for bool {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.bool(tag, *self)
    }
}

impl<'a, T: FromTLV<'a>> FromTLV<'a> for Nullable<T> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        if element.control()?.value_type == TLVValueType::Null {
            Ok(Self::none())
        } else {
            Ok(Self::some(T::from_tlv(element)?))
        }
    }
}

impl<T: ToTLV> ToTLV for Nullable<T> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        match self.as_opt_ref() {
            None => tw.null(tag),
            Some(value) => value.to_tlv(tag, tw),
        }
    }
}

impl<'a, T: FromTLV<'a>> FromTLV<'a> for Vec<T> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        element
            .array()?
            .iter()
            .map(|item| T::from_tlv(&item?))
            .collect()
    }
}

/// Vectors are encoded as TLV arrays with anonymous items.
impl<T: ToTLV> ToTLV for Vec<T> {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_array(tag)?;

        for item in self {
            item.to_tlv(&TLVTag::Anonymous, &mut tw)?;
        }

        tw.end_container()
    }
}

/// Return the content of the anonymous struct which is the root of every IM message payload.
pub fn get_root_node_struct(data: &[u8]) -> Result<TLVSequence<'_>, Error> {
    let element = TLVElement::new(data);

    element.confirm_anon()?;
    element.r#struct()
}
