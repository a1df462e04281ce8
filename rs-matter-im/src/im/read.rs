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

use alloc::vec::Vec;

use crate::error::Error;
use crate::tlv::{get_root_node_struct, FromTLV, TLVElement, TLVTag, TLVWrite, ToTLV};

use super::{AttrPath, DataVersionFilter, IM_REVISION, IM_REVISION_TAG};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadReqTag {
    AttrRequests = 0,
    EventRequests = 1,
    EventFilters = 2,
    FabricFiltered = 3,
    DataVersionFilters = 4,
}

/// The `ReadRequest` message.
///
/// Event requests and filters are accepted on the wire but ignored.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReadReq {
    pub attr_requests: Vec<AttrPath>,
    pub dataver_filters: Vec<DataVersionFilter>,
    pub fabric_filtered: bool,
}

impl ReadReq {
    pub fn new(attr_requests: Vec<AttrPath>) -> Self {
        Self {
            attr_requests,
            ..Default::default()
        }
    }

    pub fn with_dataver_filters(self, dataver_filters: Vec<DataVersionFilter>) -> Self {
        Self {
            dataver_filters,
            ..self
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let seq = get_root_node_struct(payload)?;

        Ok(Self {
            attr_requests: opt_vec(&seq.find_ctx(ReadReqTag::AttrRequests as _)?)?,
            dataver_filters: opt_vec(&seq.find_ctx(ReadReqTag::DataVersionFilters as _)?)?,
            fabric_filtered: bool::from_opt_tlv(&seq.find_ctx(ReadReqTag::FabricFiltered as _)?)?
                .unwrap_or(false),
        })
    }

    pub fn write<W: TLVWrite>(&self, mut tw: W) -> Result<(), Error> {
        tw.start_struct(&TLVTag::Anonymous)?;

        if !self.attr_requests.is_empty() {
            self.attr_requests
                .to_tlv(&TLVTag::Context(ReadReqTag::AttrRequests as _), &mut tw)?;
        }
        tw.bool(
            &TLVTag::Context(ReadReqTag::FabricFiltered as _),
            self.fabric_filtered,
        )?;
        if !self.dataver_filters.is_empty() {
            self.dataver_filters.to_tlv(
                &TLVTag::Context(ReadReqTag::DataVersionFilters as _),
                &mut tw,
            )?;
        }
        tw.u8(&TLVTag::Context(IM_REVISION_TAG), IM_REVISION)?;

        tw.end_container()
    }
}

/// Decode an optional array member into a possibly-empty `Vec`.
pub(crate) fn opt_vec<'a, T: FromTLV<'a>>(element: &TLVElement<'a>) -> Result<Vec<T>, Error> {
    Ok(Vec::<T>::from_opt_tlv(element)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use crate::im::{ConcretePath, GenericPath};
    use crate::utils::writebuf::WriteBuf;

    use super::*;

    #[test]
    fn test_read_req() {
        let mut buf = [0; 64];
        let mut wb = WriteBuf::new(&mut buf);

        let req = ReadReq::new(vec![
            AttrPath::new(&GenericPath::new(Some(0), None, None)),
            AttrPath::concrete(&ConcretePath::new(1, 6, 0)),
        ])
        .with_dataver_filters(vec![DataVersionFilter::new(1, 6, 0x1234)]);

        req.write(&mut wb).unwrap();

        assert_eq!(ReadReq::parse(wb.as_slice()).unwrap(), req);
    }

    #[test]
    fn test_read_req_no_paths() {
        // Only fabric filtered and the IM revision
        let data = [0x15, 0x28, 3, 0x24, 0xff, 11, 0x18];

        let req = ReadReq::parse(&data).unwrap();
        assert!(req.attr_requests.is_empty());
        assert!(req.dataver_filters.is_empty());
        assert!(!req.fabric_filtered);
    }

    #[test]
    fn test_read_req_malformed() {
        // Attribute requests is not an array
        let data = [0x15, 0x24, 0, 5, 0x18];

        assert!(ReadReq::parse(&data).is_err());
    }
}
