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

use crate::error::Error;
use crate::tlv::{FromTLV, Nullable, TLVElement, TLVTag, TLVWrite, ToTLV};

use super::{
    AttrId, ClusterId, ConcretePath, DataVersion, EndptId, GenericPath, IMStatusCode, ListIndex,
};

/// The attribute path, as it travels on the wire.
///
/// Besides the (possibly wildcard) endpoint, cluster and attribute IDs, it carries
/// the list index. A list index of `null` means "append to the list", which is how
/// chunks of a list attribute's value after the first one are reported.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttrPath {
    pub tag_compression: Option<bool>,
    pub node: Option<u64>,
    pub endpoint: Option<EndptId>,
    pub cluster: Option<ClusterId>,
    pub attr: Option<AttrId>,
    pub list_index: Option<Nullable<ListIndex>>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttrPathTag {
    TagCompression = 0,
    Node = 1,
    Endpoint = 2,
    Cluster = 3,
    Attribute = 4,
    ListIndex = 5,
}

impl AttrPath {
    pub fn new(path: &GenericPath) -> Self {
        Self {
            endpoint: path.endpoint,
            cluster: path.cluster,
            attr: path.leaf,
            ..Default::default()
        }
    }

    /// A path addressing the whole value of a concrete attribute.
    pub fn concrete(path: &ConcretePath) -> Self {
        Self::new(&path.into())
    }

    /// A path for appending one item to the list value of a concrete attribute.
    pub fn list_append(path: &ConcretePath) -> Self {
        Self {
            list_index: Some(Nullable::none()),
            ..Self::concrete(path)
        }
    }

    pub fn to_gp(&self) -> GenericPath {
        GenericPath::new(self.endpoint, self.cluster, self.attr)
    }

    /// Return true if this path carries the `null` list index, i.e. it appends to a list.
    pub fn is_list_append(&self) -> bool {
        matches!(&self.list_index, Some(index) if index.is_none())
    }
}

impl<'a> FromTLV<'a> for AttrPath {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let seq = element.container()?;

        Ok(Self {
            tag_compression: bool::from_opt_tlv(&seq.find_ctx(AttrPathTag::TagCompression as _)?)?,
            node: u64::from_opt_tlv(&seq.find_ctx(AttrPathTag::Node as _)?)?,
            endpoint: u16::from_opt_tlv(&seq.find_ctx(AttrPathTag::Endpoint as _)?)?,
            cluster: u32::from_opt_tlv(&seq.find_ctx(AttrPathTag::Cluster as _)?)?,
            attr: u32::from_opt_tlv(&seq.find_ctx(AttrPathTag::Attribute as _)?)?,
            list_index: Nullable::<ListIndex>::from_opt_tlv(
                &seq.find_ctx(AttrPathTag::ListIndex as _)?,
            )?,
        })
    }
}

impl ToTLV for AttrPath {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_list(tag)?;

        if let Some(tag_compression) = self.tag_compression {
            tw.bool(&TLVTag::Context(AttrPathTag::TagCompression as _), tag_compression)?;
        }
        if let Some(node) = self.node {
            tw.u64(&TLVTag::Context(AttrPathTag::Node as _), node)?;
        }
        if let Some(endpoint) = self.endpoint {
            tw.u16(&TLVTag::Context(AttrPathTag::Endpoint as _), endpoint)?;
        }
        if let Some(cluster) = self.cluster {
            tw.u32(&TLVTag::Context(AttrPathTag::Cluster as _), cluster)?;
        }
        if let Some(attr) = self.attr {
            tw.u32(&TLVTag::Context(AttrPathTag::Attribute as _), attr)?;
        }
        if let Some(list_index) = &self.list_index {
            list_index.to_tlv(&TLVTag::Context(AttrPathTag::ListIndex as _), &mut tw)?;
        }

        tw.end_container()
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::LowerHex>(f: &mut fmt::Formatter<'_>, v: Option<T>) -> fmt::Result {
            match v {
                Some(v) => write!(f, "{:04x}", v),
                None => write!(f, "*"),
            }
        }

        opt(f, self.endpoint)?;
        write!(f, "/")?;
        opt(f, self.cluster)?;
        write!(f, "/")?;
        opt(f, self.attr)?;

        if self.is_list_append() {
            write!(f, "[+]")?;
        }

        Ok(())
    }
}

/// The path of a cluster, as used by data version filters.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClusterPath {
    pub node: Option<u64>,
    pub endpoint: EndptId,
    pub cluster: ClusterId,
}

impl<'a> FromTLV<'a> for ClusterPath {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let seq = element.container()?;

        Ok(Self {
            node: u64::from_opt_tlv(&seq.find_ctx(0)?)?,
            endpoint: u16::from_tlv(&seq.ctx(1)?)?,
            cluster: u32::from_tlv(&seq.ctx(2)?)?,
        })
    }
}

impl ToTLV for ClusterPath {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_list(tag)?;

        if let Some(node) = self.node {
            tw.u64(&TLVTag::Context(0), node)?;
        }
        tw.u16(&TLVTag::Context(1), self.endpoint)?;
        tw.u32(&TLVTag::Context(2), self.cluster)?;

        tw.end_container()
    }
}

/// "I already have this version of this cluster": a cluster matching the filter
/// is not reported by a read or by a subscription's priming report.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataVersionFilter {
    pub path: ClusterPath,
    pub data_ver: DataVersion,
}

impl DataVersionFilter {
    pub const fn new(endpoint: EndptId, cluster: ClusterId, data_ver: DataVersion) -> Self {
        Self {
            path: ClusterPath {
                node: None,
                endpoint,
                cluster,
            },
            data_ver,
        }
    }

    pub fn matches(&self, endpoint: EndptId, cluster: ClusterId, data_ver: DataVersion) -> bool {
        self.path.endpoint == endpoint && self.path.cluster == cluster && self.data_ver == data_ver
    }
}

impl<'a> FromTLV<'a> for DataVersionFilter {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let seq = element.r#struct()?;

        Ok(Self {
            path: ClusterPath::from_tlv(&seq.ctx(0)?)?,
            data_ver: u32::from_tlv(&seq.ctx(1)?)?,
        })
    }
}

impl ToTLV for DataVersionFilter {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_struct(tag)?;
        self.path.to_tlv(&TLVTag::Context(0), &mut tw)?;
        tw.u32(&TLVTag::Context(1), self.data_ver)?;
        tw.end_container()
    }
}

/// An IM status together with an optional cluster-specific status.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub status: IMStatusCode,
    pub cluster_status: Option<u16>,
}

impl Status {
    pub const fn new(status: IMStatusCode, cluster_status: Option<u16>) -> Self {
        Self {
            status,
            cluster_status,
        }
    }
}

impl<'a> FromTLV<'a> for Status {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let seq = element.r#struct()?;

        Ok(Self {
            status: IMStatusCode::from_tlv(&seq.ctx(0)?)?,
            cluster_status: u16::from_opt_tlv(&seq.find_ctx(1)?)?,
        })
    }
}

impl ToTLV for Status {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_struct(tag)?;
        self.status.to_tlv(&TLVTag::Context(0), &mut tw)?;
        if let Some(cluster_status) = self.cluster_status {
            tw.u16(&TLVTag::Context(1), cluster_status)?;
        }
        tw.end_container()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttrStatusTag {
    Path = 0,
    Status = 1,
}

/// The status of a requested attribute path which could not be reported.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttrStatus {
    pub path: AttrPath,
    pub status: Status,
}

impl AttrStatus {
    pub fn new(path: &GenericPath, status: IMStatusCode, cluster_status: Option<u16>) -> Self {
        Self {
            path: AttrPath::new(path),
            status: Status::new(status, cluster_status),
        }
    }
}

impl<'a> FromTLV<'a> for AttrStatus {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let seq = element.r#struct()?;

        Ok(Self {
            path: AttrPath::from_tlv(&seq.ctx(AttrStatusTag::Path as _)?)?,
            status: Status::from_tlv(&seq.ctx(AttrStatusTag::Status as _)?)?,
        })
    }
}

impl ToTLV for AttrStatus {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.start_struct(tag)?;
        self.path
            .to_tlv(&TLVTag::Context(AttrStatusTag::Path as _), &mut tw)?;
        self.status
            .to_tlv(&TLVTag::Context(AttrStatusTag::Status as _), &mut tw)?;
        tw.end_container()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttrDataTag {
    DataVer = 0,
    Path = 1,
    Data = 2,
}

/// A received attribute data report.
///
/// The data is kept in its raw TLV form, borrowed from the message payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrData<'a> {
    pub data_ver: Option<DataVersion>,
    pub path: AttrPath,
    pub data: TLVElement<'a>,
}

impl<'a> FromTLV<'a> for AttrData<'a> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let seq = element.r#struct()?;

        Ok(Self {
            data_ver: u32::from_opt_tlv(&seq.find_ctx(AttrDataTag::DataVer as _)?)?,
            path: AttrPath::from_tlv(&seq.ctx(AttrDataTag::Path as _)?)?,
            data: seq.ctx(AttrDataTag::Data as _)?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttrRespTag {
    Status = 0,
    Data = 1,
}

/// One entry of the `AttributeReports` array of a `ReportData` message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrResp<'a> {
    Status(AttrStatus),
    Data(AttrData<'a>),
}

impl<'a> FromTLV<'a> for AttrResp<'a> {
    fn from_tlv(element: &TLVElement<'a>) -> Result<Self, Error> {
        let seq = element.r#struct()?;

        let data = seq.find_ctx(AttrRespTag::Data as _)?;
        if !data.is_empty() {
            return Ok(Self::Data(AttrData::from_tlv(&data)?));
        }

        Ok(Self::Status(AttrStatus::from_tlv(
            &seq.ctx(AttrRespTag::Status as _)?,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use crate::tlv::{FromTLV, Nullable, TLVElement, TLVTag, ToTLV};
    use crate::utils::writebuf::WriteBuf;

    use super::*;

    #[test]
    fn test_attr_path_encoding() {
        let mut buf = [0; 32];
        let mut wb = WriteBuf::new(&mut buf);

        let path = AttrPath::list_append(&ConcretePath::new(1, 0x1d, 0x300));
        path.to_tlv(&TLVTag::Context(1), &mut wb).unwrap();

        assert_eq!(
            wb.as_slice(),
            [0x37, 1, 0x24, 2, 1, 0x24, 3, 0x1d, 0x25, 4, 0x00, 0x03, 0x34, 5, 0x18]
        );

        let decoded = AttrPath::from_tlv(&TLVElement::new(wb.as_slice())).unwrap();
        assert_eq!(decoded, path);
        assert!(decoded.is_list_append());
    }

    #[test]
    fn test_attr_path_wildcard() {
        // An attribute path with only the cluster set, encoded as a struct
        let data = [0x15, 0x24, 3, 6, 0x18];

        let path = AttrPath::from_tlv(&TLVElement::new(&data)).unwrap();
        assert_eq!(path.to_gp(), GenericPath::new(None, Some(6), None));
        assert!(path.list_index.is_none());
    }

    #[test]
    fn test_attr_resp_status() {
        let mut buf = [0; 32];
        let mut wb = WriteBuf::new(&mut buf);

        let status = AttrStatus::new(
            &GenericPath::new(Some(0), Some(6), Some(0)),
            IMStatusCode::UnsupportedAccess,
            None,
        );

        wb.start_struct(&TLVTag::Anonymous).unwrap();
        status
            .to_tlv(&TLVTag::Context(AttrRespTag::Status as _), &mut wb)
            .unwrap();
        wb.end_container().unwrap();

        let resp = AttrResp::from_tlv(&TLVElement::new(wb.as_slice())).unwrap();
        assert_eq!(resp, AttrResp::Status(status));
    }

    #[test]
    fn test_list_index_null_vs_absent() {
        let path = AttrPath {
            list_index: Some(Nullable::some(3)),
            ..Default::default()
        };

        assert!(!path.is_list_append());
        assert!(!AttrPath::default().is_list_append());
    }
}
