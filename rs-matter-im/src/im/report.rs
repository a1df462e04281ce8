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
use crate::tlv::{get_root_node_struct, FromTLV, TLVSequence};

use super::{AttrResp, SubscriptionId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReportDataTag {
    SubscriptionId = 0,
    AttributeReports = 1,
    EventReports = 2,
    MoreChunkedMsgs = 3,
    SupressResponse = 4,
}

/// A received `ReportData` message.
///
/// The attribute reports are decoded lazily, borrowing from the message payload.
/// Emitting reports is the job of the report engine in the data model,
/// which writes the message incrementally, entry by entry.
#[derive(Clone, Debug)]
pub struct ReportData<'a> {
    pub subscription_id: Option<SubscriptionId>,
    attr_reports: Option<TLVSequence<'a>>,
    pub more_chunks: bool,
    pub suppress_response: bool,
}

impl<'a> ReportData<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self, Error> {
        let seq = get_root_node_struct(payload)?;

        let attr_reports = seq.find_ctx(ReportDataTag::AttributeReports as _)?;

        Ok(Self {
            subscription_id: u32::from_opt_tlv(
                &seq.find_ctx(ReportDataTag::SubscriptionId as _)?,
            )?,
            attr_reports: if attr_reports.is_empty() {
                None
            } else {
                Some(attr_reports.array()?)
            },
            more_chunks: bool::from_opt_tlv(&seq.find_ctx(ReportDataTag::MoreChunkedMsgs as _)?)?
                .unwrap_or(false),
            suppress_response: bool::from_opt_tlv(
                &seq.find_ctx(ReportDataTag::SupressResponse as _)?,
            )?
            .unwrap_or(false),
        })
    }

    /// Iterate over the attribute reports (data or status) carried by this message.
    pub fn attr_reports(&self) -> impl Iterator<Item = Result<AttrResp<'a>, Error>> + 'a {
        self.attr_reports
            .clone()
            .into_iter()
            .flat_map(|seq| seq.iter())
            .map(|resp| AttrResp::from_tlv(&resp?))
    }
}

#[cfg(test)]
mod tests {
    use crate::im::{AttrResp, IMStatusCode};

    use super::*;

    #[test]
    fn test_report_data() {
        let data = [
            0x15, // ReportData
            0x25, 0, 0x34, 0x12, // SubscriptionId
            0x36, 1, // AttributeReports
            0x15, // AttrResp
            0x35, 1, // AttrData
            0x24, 0, 5, // DataVersion
            0x37, 1, 0x24, 2, 0, 0x24, 3, 6, 0x24, 4, 0, 0x18, // Path
            0x29, 2, // Data
            0x18, 0x18, // AttrData, AttrResp
            0x15, // AttrResp
            0x35, 0, // AttrStatus
            0x37, 0, 0x24, 2, 0, 0x24, 3, 6, 0x24, 4, 1, 0x18, // Path
            0x35, 1, 0x24, 0, 0x86, 0x18, // Status
            0x18, 0x18, // AttrStatus, AttrResp
            0x18, // AttributeReports
            0x29, 3, // MoreChunkedMsgs
            0x24, 0xff, 11, // InteractionModelRevision
            0x18,
        ];

        let report = ReportData::parse(&data).unwrap();
        assert_eq!(report.subscription_id, Some(0x1234));
        assert!(report.more_chunks);
        assert!(!report.suppress_response);

        let mut reports = report.attr_reports();

        let Some(Ok(AttrResp::Data(attr_data))) = reports.next() else {
            panic!("Expected attribute data");
        };
        assert_eq!(attr_data.data_ver, Some(5));
        assert_eq!(attr_data.path.attr, Some(0));
        assert!(attr_data.data.bool().unwrap());

        let Some(Ok(AttrResp::Status(attr_status))) = reports.next() else {
            panic!("Expected attribute status");
        };
        assert_eq!(attr_status.path.attr, Some(1));
        assert_eq!(
            attr_status.status.status,
            IMStatusCode::UnsupportedAttribute
        );

        assert!(reports.next().is_none());
    }

    #[test]
    fn test_report_data_empty() {
        let data = [0x15, 0x28, 4, 0x18];

        let report = ReportData::parse(&data).unwrap();
        assert!(report.subscription_id.is_none());
        assert!(report.attr_reports().next().is_none());
    }
}
