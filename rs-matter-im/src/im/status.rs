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

use crate::error::Error;
use crate::tlv::{get_root_node_struct, FromTLV, TLVTag, TLVWrite, ToTLV};

use super::{IMStatusCode, IM_REVISION, IM_REVISION_TAG};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusRespTag {
    Status = 0,
}

/// The `StatusResponse` message: the acknowledgement of a report chunk,
/// or the negative reply to a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusResp {
    pub status: IMStatusCode,
}

impl StatusResp {
    pub const fn new(status: IMStatusCode) -> Self {
        Self { status }
    }

    pub fn write<W: TLVWrite>(status: IMStatusCode, mut tw: W) -> Result<(), Error> {
        tw.start_struct(&TLVTag::Anonymous)?;
        status.to_tlv(&TLVTag::Context(StatusRespTag::Status as _), &mut tw)?;
        tw.u8(&TLVTag::Context(IM_REVISION_TAG), IM_REVISION)?;
        tw.end_container()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let seq = get_root_node_struct(payload)?;

        Ok(Self {
            status: IMStatusCode::from_tlv(&seq.ctx(StatusRespTag::Status as _)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::writebuf::WriteBuf;

    use super::*;

    #[test]
    fn test_status_resp() {
        let mut buf = [0; 16];
        let mut wb = WriteBuf::new(&mut buf);

        StatusResp::write(IMStatusCode::InvalidSubscription, &mut wb).unwrap();
        assert_eq!(wb.as_slice(), [0x15, 0x24, 0, 0x7d, 0x24, 0xff, 11, 0x18]);

        let resp = StatusResp::parse(wb.as_slice()).unwrap();
        assert_eq!(resp.status, IMStatusCode::InvalidSubscription);
    }
}
