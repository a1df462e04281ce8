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
use crate::tlv::{get_root_node_struct, FromTLV, TLVTag, TLVWrite, ToTLV};

use super::read::opt_vec;
use super::{AttrPath, DataVersionFilter, SubscriptionId, IM_REVISION, IM_REVISION_TAG};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubscribeReqTag {
    KeepSubs = 0,
    MinIntFloor = 1,
    MaxIntCeil = 2,
    AttrRequests = 3,
    EventRequests = 4,
    EventFilters = 5,
    FabricFiltered = 7,
    DataVersionFilters = 8,
}

/// The `SubscribeRequest` message.
///
/// The reporting intervals are in seconds.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscribeReq {
    pub keep_subs: bool,
    pub min_int_floor: u16,
    pub max_int_ceil: u16,
    pub attr_requests: Vec<AttrPath>,
    pub dataver_filters: Vec<DataVersionFilter>,
    pub fabric_filtered: bool,
}

impl SubscribeReq {
    pub fn new(attr_requests: Vec<AttrPath>, min_int_floor: u16, max_int_ceil: u16) -> Self {
        Self {
            min_int_floor,
            max_int_ceil,
            attr_requests,
            ..Default::default()
        }
    }

    pub fn with_keep_subs(self, keep_subs: bool) -> Self {
        Self { keep_subs, ..self }
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
            keep_subs: bool::from_tlv(&seq.ctx(SubscribeReqTag::KeepSubs as _)?)?,
            min_int_floor: u16::from_tlv(&seq.ctx(SubscribeReqTag::MinIntFloor as _)?)?,
            max_int_ceil: u16::from_tlv(&seq.ctx(SubscribeReqTag::MaxIntCeil as _)?)?,
            attr_requests: opt_vec(&seq.find_ctx(SubscribeReqTag::AttrRequests as _)?)?,
            dataver_filters: opt_vec(&seq.find_ctx(SubscribeReqTag::DataVersionFilters as _)?)?,
            fabric_filtered: bool::from_opt_tlv(
                &seq.find_ctx(SubscribeReqTag::FabricFiltered as _)?,
            )?
            .unwrap_or(false),
        })
    }

    pub fn write<W: TLVWrite>(&self, mut tw: W) -> Result<(), Error> {
        tw.start_struct(&TLVTag::Anonymous)?;

        tw.bool(
            &TLVTag::Context(SubscribeReqTag::KeepSubs as _),
            self.keep_subs,
        )?;
        tw.u16(
            &TLVTag::Context(SubscribeReqTag::MinIntFloor as _),
            self.min_int_floor,
        )?;
        tw.u16(
            &TLVTag::Context(SubscribeReqTag::MaxIntCeil as _),
            self.max_int_ceil,
        )?;
        if !self.attr_requests.is_empty() {
            self.attr_requests
                .to_tlv(&TLVTag::Context(SubscribeReqTag::AttrRequests as _), &mut tw)?;
        }
        tw.bool(
            &TLVTag::Context(SubscribeReqTag::FabricFiltered as _),
            self.fabric_filtered,
        )?;
        if !self.dataver_filters.is_empty() {
            self.dataver_filters.to_tlv(
                &TLVTag::Context(SubscribeReqTag::DataVersionFilters as _),
                &mut tw,
            )?;
        }
        tw.u8(&TLVTag::Context(IM_REVISION_TAG), IM_REVISION)?;

        tw.end_container()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubscribeRespTag {
    SubscriptionId = 0,
    MaxInterval = 2,
}

/// The `SubscribeResponse` message, closing a successful subscription establishment.
///
/// The maximum interval is the one the publisher committed to, in seconds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscribeResp {
    pub subscription_id: SubscriptionId,
    pub max_int: u16,
}

impl SubscribeResp {
    pub const fn new(subscription_id: SubscriptionId, max_int: u16) -> Self {
        Self {
            subscription_id,
            max_int,
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let seq = get_root_node_struct(payload)?;

        Ok(Self {
            subscription_id: u32::from_tlv(&seq.ctx(SubscribeRespTag::SubscriptionId as _)?)?,
            max_int: u16::from_tlv(&seq.ctx(SubscribeRespTag::MaxInterval as _)?)?,
        })
    }

    pub fn write<W: TLVWrite>(&self, mut tw: W) -> Result<(), Error> {
        tw.start_struct(&TLVTag::Anonymous)?;
        tw.u32(
            &TLVTag::Context(SubscribeRespTag::SubscriptionId as _),
            self.subscription_id,
        )?;
        tw.u16(
            &TLVTag::Context(SubscribeRespTag::MaxInterval as _),
            self.max_int,
        )?;
        tw.u8(&TLVTag::Context(IM_REVISION_TAG), IM_REVISION)?;
        tw.end_container()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use crate::im::GenericPath;
    use crate::utils::writebuf::WriteBuf;

    use super::*;

    #[test]
    fn test_subscribe_req() {
        let mut buf = [0; 64];
        let mut wb = WriteBuf::new(&mut buf);

        let req = SubscribeReq::new(
            vec![AttrPath::new(&GenericPath::new(None, Some(6), None))],
            1,
            60,
        )
        .with_keep_subs(true)
        .with_dataver_filters(vec![DataVersionFilter::new(0, 6, 7)]);

        req.write(&mut wb).unwrap();

        assert_eq!(SubscribeReq::parse(wb.as_slice()).unwrap(), req);
    }

    #[test]
    fn test_subscribe_req_missing_intervals() {
        // Only keep subscriptions
        let data = [0x15, 0x29, 0, 0x18];

        assert!(SubscribeReq::parse(&data).is_err());
    }

    #[test]
    fn test_subscribe_resp() {
        let mut buf = [0; 16];
        let mut wb = WriteBuf::new(&mut buf);

        SubscribeResp::new(0x1000, 60).write(&mut wb).unwrap();
        assert_eq!(
            wb.as_slice(),
            [0x15, 0x25, 0, 0x00, 0x10, 0x24, 2, 60, 0x24, 0xff, 11, 0x18]
        );
        assert_eq!(
            SubscribeResp::parse(wb.as_slice()).unwrap(),
            SubscribeResp::new(0x1000, 60)
        );
    }
}
