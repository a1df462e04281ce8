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

use core::fmt;

use crate::error::{Error, ErrorCode};

use super::{TLVControl, TLVTag, TLVTagType, TLVValueType};

/// A newtype for reading TLV-encoded data from Rust `&[u8]` slices.
///
/// Semantically, a `TLVElement` is just a byte slice that starts with an encoded TLV element,
/// and its methods parse - on the fly - the slice as TLV. `TLVElement::new` therefore always
/// succeeds, and the data is validated only as the other (fallible) methods are called.
///
/// A `TLVElement` constructed from an empty slice is used to represent
/// struct members which were not found.
#[derive(Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TLVElement<'a>(&'a [u8]);

impl<'a> TLVElement<'a> {
    /// Create a new `TLVElement` from a byte slice, where the byte slice contains an encoded TLV stream (a TLV element).
    #[inline(always)]
    pub const fn new(data: &'a [u8]) -> Self {
        Self(data)
    }

    /// Return `true` if the wrapped byte slice is the empty `&[]` slice.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the raw bytes of this element (and only of this element),
    /// including its control byte, tag and - for containers - the container end marker.
    pub fn raw_data(&self) -> Result<&'a [u8], Error> {
        let len = element_len(self.0)?;

        Ok(&self.0[..len])
    }

    /// Return the TLV control byte of the element.
    ///
    /// Returns an error with code `ErrorCode::TLVTypeMismatch` if the first byte of the slice does
    /// not represent a valid TLV control byte or if the wrapped byte slice is empty.
    #[inline(always)]
    pub fn control(&self) -> Result<TLVControl, Error> {
        TLVControl::parse(*self.0.first().ok_or(ErrorCode::TLVTypeMismatch)?)
    }

    /// Return the tag of the element.
    ///
    /// Elements tagged with anything other than an anonymous or a context tag
    /// are not used by the Interaction Model and are reported as `ErrorCode::TLVTypeMismatch`.
    pub fn tag(&self) -> Result<TLVTag, Error> {
        match self.control()?.tag_type {
            TLVTagType::Anonymous => Ok(TLVTag::Anonymous),
            TLVTagType::Context => Ok(TLVTag::Context(
                *self.0.get(1).ok_or(ErrorCode::TLVTypeMismatch)?,
            )),
            _ => Err(ErrorCode::TLVTypeMismatch.into()),
        }
    }

    /// Retrieve the context ID of the element, or `None` if the element is not tagged with a context tag.
    pub fn try_ctx(&self) -> Result<Option<u8>, Error> {
        match self.tag() {
            Ok(TLVTag::Context(ctx)) => Ok(Some(ctx)),
            Ok(TLVTag::Anonymous) => Ok(None),
            Err(_) if self.control().is_ok() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Confirm that this TLV element is tagged with the anonymous tag.
    pub fn confirm_anon(&self) -> Result<(), Error> {
        if matches!(self.control()?.tag_type, TLVTagType::Anonymous) {
            Ok(())
        } else {
            Err(ErrorCode::TLVTypeMismatch.into())
        }
    }

    pub fn is_null(&self) -> Result<bool, Error> {
        Ok(self.control()?.value_type == TLVValueType::Null)
    }

    pub fn null(&self) -> Result<(), Error> {
        if self.is_null()? {
            Ok(())
        } else {
            Err(ErrorCode::InvalidData.into())
        }
    }

    pub fn bool(&self) -> Result<bool, Error> {
        match self.control()?.value_type {
            TLVValueType::False => Ok(false),
            TLVValueType::True => Ok(true),
            _ => Err(ErrorCode::InvalidData.into()),
        }
    }

    /// Return the value of this element as an unsigned integer of any width.
    pub fn uint(&self) -> Result<u64, Error> {
        let control = self.control()?;
        let value = self.value(control)?;

        match control.value_type {
            TLVValueType::U8 | TLVValueType::U16 | TLVValueType::U32 | TLVValueType::U64 => {
                Ok(le_uint(value))
            }
            _ => Err(ErrorCode::InvalidData.into()),
        }
    }

    /// Return the value of this element as a signed integer of any width.
    pub fn int(&self) -> Result<i64, Error> {
        let control = self.control()?;
        let value = self.value(control)?;

        match control.value_type {
            TLVValueType::S8 | TLVValueType::S16 | TLVValueType::S32 | TLVValueType::S64 => {
                // Sign-extend from the encoded width
                let bits = value.len() * 8;
                let raw = le_uint(value);
                let shift = 64 - bits;

                Ok(((raw << shift) as i64) >> shift)
            }
            _ => Err(ErrorCode::InvalidData.into()),
        }
    }

    pub fn u8(&self) -> Result<u8, Error> {
        Ok(u8::try_from(self.uint()?).map_err(|_| ErrorCode::InvalidData)?)
    }

    pub fn u16(&self) -> Result<u16, Error> {
        Ok(u16::try_from(self.uint()?).map_err(|_| ErrorCode::InvalidData)?)
    }

    pub fn u32(&self) -> Result<u32, Error> {
        Ok(u32::try_from(self.uint()?).map_err(|_| ErrorCode::InvalidData)?)
    }

    pub fn u64(&self) -> Result<u64, Error> {
        self.uint()
    }

    /// Return the content of the octet string represented by this TLV element.
    pub fn str(&self) -> Result<&'a [u8], Error> {
        let control = self.control()?;

        if control.value_type.is_str() {
            self.value(control)
        } else {
            Err(ErrorCode::InvalidData.into())
        }
    }

    /// Return the content of the UTF-8 string represented by this TLV element.
    pub fn utf8(&self) -> Result<&'a str, Error> {
        let control = self.control()?;

        if control.value_type.is_utf8() {
            Ok(core::str::from_utf8(self.value(control)?)?)
        } else {
            Err(ErrorCode::InvalidData.into())
        }
    }

    /// Return the content of the struct container represented by this TLV element.
    pub fn r#struct(&self) -> Result<TLVSequence<'a>, Error> {
        self.container_of(|value_type| value_type == TLVValueType::Struct)
    }

    /// Return the content of the array container represented by this TLV element.
    pub fn array(&self) -> Result<TLVSequence<'a>, Error> {
        self.container_of(|value_type| value_type == TLVValueType::Array)
    }

    /// Return the content of the list container represented by this TLV element.
    pub fn list(&self) -> Result<TLVSequence<'a>, Error> {
        self.container_of(|value_type| value_type == TLVValueType::List)
    }

    /// Return the content of the container (array, struct or list) represented by this TLV element.
    pub fn container(&self) -> Result<TLVSequence<'a>, Error> {
        self.container_of(|value_type| value_type.is_container_start())
    }

    fn container_of<F>(&self, matches: F) -> Result<TLVSequence<'a>, Error>
    where
        F: FnOnce(TLVValueType) -> bool,
    {
        let control = self.control()?;

        if !matches(control.value_type) {
            Err(ErrorCode::TLVTypeMismatch)?;
        }

        let start = 1 + control.tag_type.size();
        let end = element_len(self.0)? - 1;

        Ok(TLVSequence(&self.0[start..end]))
    }

    /// Return the value payload of a non-container element.
    fn value(&self, control: TLVControl) -> Result<&'a [u8], Error> {
        let len_start = 1 + control.tag_type.size();
        let len_size = control.value_type.variable_size_len();

        let len_bytes = self
            .0
            .get(len_start..len_start + len_size)
            .ok_or(ErrorCode::TLVTypeMismatch)?;

        let len = match control.value_type.fixed_size() {
            Some(size) => size,
            None => usize::try_from(le_uint(len_bytes)).map_err(|_| ErrorCode::TLVTypeMismatch)?,
        };

        let start = len_start + len_size;

        Ok(self
            .0
            .get(start..start.checked_add(len).ok_or(ErrorCode::TLVTypeMismatch)?)
            .ok_or(ErrorCode::TLVTypeMismatch)?)
    }
}

impl fmt::Debug for TLVElement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw_data() {
            Ok(data) => write!(f, "TLVElement({:02x?})", data),
            Err(_) => write!(f, "TLVElement(<malformed>)"),
        }
    }
}

/// A newtype over the byte slice holding the elements of a TLV container,
/// without the container start and end markers.
#[derive(Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TLVSequence<'a>(&'a [u8]);

impl<'a> TLVSequence<'a> {
    /// Return an iterator over the `TLVElement` instances in this `TLVSequence`.
    pub fn iter(&self) -> TLVSequenceIter<'a> {
        TLVSequenceIter(self.0)
    }

    /// Return the first element tagged with context tag `ctx`,
    /// or an empty `TLVElement` if there is no such element.
    pub fn find_ctx(&self, ctx: u8) -> Result<TLVElement<'a>, Error> {
        for elem in self.iter() {
            let elem = elem?;

            if elem.try_ctx()? == Some(ctx) {
                return Ok(elem);
            }
        }

        Ok(TLVElement::new(&[]))
    }

    /// Return the first element tagged with context tag `ctx`,
    /// or an error with code `ErrorCode::NotFound` if there is no such element.
    pub fn ctx(&self, ctx: u8) -> Result<TLVElement<'a>, Error> {
        let element = self.find_ctx(ctx)?;

        if element.is_empty() {
            Err(ErrorCode::NotFound.into())
        } else {
            Ok(element)
        }
    }
}

impl fmt::Debug for TLVSequence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TLVSequence({:02x?})", self.0)
    }
}

/// An iterator over the elements of a `TLVSequence`.
///
/// Stops after the first malformed element.
pub struct TLVSequenceIter<'a>(&'a [u8]);

impl<'a> Iterator for TLVSequenceIter<'a> {
    type Item = Result<TLVElement<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }

        match element_len(self.0) {
            Ok(len) => {
                let (element, rest) = self.0.split_at(len);
                self.0 = rest;

                Some(Ok(TLVElement::new(element)))
            }
            Err(e) => {
                self.0 = &[];

                Some(Err(e))
            }
        }
    }
}

/// Compute the total encoded length of the element at the start of `data`,
/// including the contents and end marker of containers.
fn element_len(data: &[u8]) -> Result<usize, Error> {
    let control = TLVControl::parse(*data.first().ok_or(ErrorCode::TLVTypeMismatch)?)?;

    if control.is_container_end() {
        // An end marker is not an element on its own
        Err(ErrorCode::TLVTypeMismatch)?;
    }

    let header = 1 + control.tag_type.size();

    if control.value_type.is_container_start() {
        let mut pos = header;

        loop {
            let byte = *data.get(pos).ok_or(ErrorCode::TLVTypeMismatch)?;

            if TLVControl::parse(byte)?.is_container_end() {
                return Ok(pos + 1);
            }

            pos += element_len(&data[pos..])?;
        }
    }

    let len_size = control.value_type.variable_size_len();
    let len_bytes = data
        .get(header..header + len_size)
        .ok_or(ErrorCode::TLVTypeMismatch)?;

    let value_len = match control.value_type.fixed_size() {
        Some(size) => size,
        None => usize::try_from(le_uint(len_bytes)).map_err(|_| ErrorCode::TLVTypeMismatch)?,
    };

    let len = (header + len_size)
        .checked_add(value_len)
        .ok_or(ErrorCode::TLVTypeMismatch)?;

    if len > data.len() {
        Err(ErrorCode::TLVTypeMismatch)?;
    }

    Ok(len)
}

fn le_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0, |acc, byte| (acc << 8) | *byte as u64)
}
