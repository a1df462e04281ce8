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

//! This module contains the TLV-serde types of the Interaction Model messages
//! taking part in the read, subscribe and report interactions.

use core::fmt;

use num::FromPrimitive;
use num_derive::FromPrimitive;

use crate::error::{Error, ErrorCode};
use crate::tlv::{FromTLV, TLVElement, TLVTag, TLVWrite, ToTLV};
use crate::transport::MessageMeta;

pub use attr::*;
pub use read::*;
pub use report::*;
pub use status::*;
pub use subscribe::*;

mod attr;
mod read;
mod report;
mod status;
mod subscribe;

/// Interaction Model ID as per the Matter Core spec
pub const PROTO_ID_INTERACTION_MODEL: u16 = 0x01;

/// The Interaction Model revision we put in every message we emit
pub const IM_REVISION: u8 = 11;

/// The context tag of the `InteractionModelRevision` field present in all IM messages
pub const IM_REVISION_TAG: u8 = 0xFF;

/// An enumeration of all possible status codes that can be returned by the Interaction Model.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IMStatusCode {
    Success = 0,
    Failure = 1,
    InvalidSubscription = 0x7D,
    UnsupportedAccess = 0x7E,
    UnsupportedEndpoint = 0x7F,
    InvalidAction = 0x80,
    UnsupportedCommand = 0x81,
    InvalidCommand = 0x85,
    UnsupportedAttribute = 0x86,
    ConstraintError = 0x87,
    UnsupportedWrite = 0x88,
    ResourceExhausted = 0x89,
    NotFound = 0x8b,
    UnreportableAttribute = 0x8c,
    InvalidDataType = 0x8d,
    UnsupportedRead = 0x8f,
    DataVersionMismatch = 0x92,
    Timeout = 0x94,
    Busy = 0x9c,
    UnsupportedCluster = 0xc3,
    NoUpstreamSubscription = 0xc5,
    NeedsTimedInteraction = 0xc6,
    UnsupportedEvent = 0xc7,
    PathsExhausted = 0xc8,
    TimedRequestMisMatch = 0xc9,
    FailSafeRequired = 0xca,
}

impl From<ErrorCode> for IMStatusCode {
    fn from(e: ErrorCode) -> Self {
        match e {
            ErrorCode::EndpointNotFound => IMStatusCode::UnsupportedEndpoint,
            ErrorCode::ClusterNotFound => IMStatusCode::UnsupportedCluster,
            ErrorCode::AttributeNotFound => IMStatusCode::UnsupportedAttribute,
            ErrorCode::InvalidAction => IMStatusCode::InvalidAction,
            ErrorCode::InvalidDataType => IMStatusCode::InvalidDataType,
            ErrorCode::UnsupportedAccess => IMStatusCode::UnsupportedAccess,
            ErrorCode::Busy => IMStatusCode::Busy,
            ErrorCode::DataVersionMismatch => IMStatusCode::DataVersionMismatch,
            ErrorCode::ResourceExhausted => IMStatusCode::ResourceExhausted,
            ErrorCode::NotFound => IMStatusCode::NotFound,
            ErrorCode::Timeout => IMStatusCode::Timeout,
            ErrorCode::SubscriptionDropped => IMStatusCode::InvalidSubscription,
            _ => IMStatusCode::Failure,
        }
    }
}

impl From<Error> for IMStatusCode {
    fn from(value: Error) -> Self {
        Self::from(value.code())
    }
}

impl From<IMStatusCode> for ErrorCode {
    fn from(status: IMStatusCode) -> Self {
        match status {
            IMStatusCode::UnsupportedEndpoint => ErrorCode::EndpointNotFound,
            IMStatusCode::UnsupportedCluster => ErrorCode::ClusterNotFound,
            IMStatusCode::UnsupportedAttribute => ErrorCode::AttributeNotFound,
            IMStatusCode::UnsupportedAccess => ErrorCode::UnsupportedAccess,
            IMStatusCode::InvalidAction => ErrorCode::InvalidAction,
            IMStatusCode::InvalidDataType => ErrorCode::InvalidDataType,
            IMStatusCode::ResourceExhausted => ErrorCode::ResourceExhausted,
            IMStatusCode::NotFound => ErrorCode::NotFound,
            IMStatusCode::DataVersionMismatch => ErrorCode::DataVersionMismatch,
            IMStatusCode::Timeout => ErrorCode::Timeout,
            IMStatusCode::Busy => ErrorCode::Busy,
            IMStatusCode::InvalidSubscription => ErrorCode::SubscriptionDropped,
            _ => ErrorCode::Failure,
        }
    }
}

impl From<IMStatusCode> for Error {
    fn from(status: IMStatusCode) -> Self {
        Error::new(status.into())
    }
}

impl FromTLV<'_> for IMStatusCode {
    fn from_tlv(t: &TLVElement) -> Result<Self, Error> {
        FromPrimitive::from_u16(t.u16()?).ok_or_else(|| ErrorCode::InvalidData.into())
    }
}

impl ToTLV for IMStatusCode {
    fn to_tlv<W: TLVWrite>(&self, tag: &TLVTag, mut tw: W) -> Result<(), Error> {
        tw.u16(tag, *self as _)
    }
}

/// An enumeration of the Interaction Model opcodes.
#[derive(FromPrimitive, Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpCode {
    Reserved = 0,
    StatusResponse = 1,
    ReadRequest = 2,
    SubscribeRequest = 3,
    SubscribeResponse = 4,
    ReportData = 5,
    WriteRequest = 6,
    WriteResponse = 7,
    InvokeRequest = 8,
    InvokeResponse = 9,
    TimedRequest = 10,
}

impl OpCode {
    /// Return the opcode as a `MessageMeta` structure, which contains
    /// the protocol ID, opcode, and reliability information.
    ///
    /// Reliability is set to `true` as all IM messages are reliable.
    pub const fn meta(&self) -> MessageMeta {
        MessageMeta {
            proto_id: PROTO_ID_INTERACTION_MODEL,
            proto_opcode: *self as u8,
            reliable: true,
        }
    }
}

impl From<OpCode> for MessageMeta {
    fn from(opcode: OpCode) -> Self {
        opcode.meta()
    }
}

// Type aliases for first-class matter types
pub type EndptId = u16;
pub type ClusterId = u32;
pub type AttrId = u32;
pub type DataVersion = u32;
pub type ListIndex = u16;
pub type SubscriptionId = u32;

/// A generic (possibly a wildcard) attribute path.
///
/// Used both for the attribute paths requested by a peer (after they are stripped
/// from their wire-only details) and for the entries of the dirty set.
#[derive(Default, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GenericPath {
    /// The endpoint ID, if specified, otherwise `None` for wildcard
    pub endpoint: Option<EndptId>,
    /// The cluster ID, if specified, otherwise `None` for wildcard
    pub cluster: Option<ClusterId>,
    /// The attribute ID, if specified, otherwise `None` for wildcard
    pub leaf: Option<AttrId>,
}

impl GenericPath {
    /// Create a new `GenericPath` with the given endpoint, cluster, and leaf.
    pub const fn new(
        endpoint: Option<EndptId>,
        cluster: Option<ClusterId>,
        leaf: Option<AttrId>,
    ) -> Self {
        Self {
            endpoint,
            cluster,
            leaf,
        }
    }

    /// Return Ok, if the path is non wildcard, otherwise returns an error
    pub fn not_wildcard(&self) -> Result<ConcretePath, Error> {
        match *self {
            GenericPath {
                endpoint: Some(endpoint),
                cluster: Some(cluster),
                leaf: Some(attr),
            } => Ok(ConcretePath::new(endpoint, cluster, attr)),
            _ => Err(ErrorCode::Invalid.into()),
        }
    }

    /// Return true, if the path is wildcard
    pub const fn is_wildcard(&self) -> bool {
        !matches!(
            *self,
            GenericPath {
                endpoint: Some(_),
                cluster: Some(_),
                leaf: Some(_),
            }
        )
    }

    /// Return true if the concrete path is one of the paths this path expands to.
    pub fn covers(&self, path: &ConcretePath) -> bool {
        self.endpoint.map(|e| e == path.endpoint).unwrap_or(true)
            && self.cluster.map(|c| c == path.cluster).unwrap_or(true)
            && self.leaf.map(|a| a == path.attr).unwrap_or(true)
    }
}

impl From<&ConcretePath> for GenericPath {
    fn from(path: &ConcretePath) -> Self {
        Self::new(Some(path.endpoint), Some(path.cluster), Some(path.attr))
    }
}

/// A concrete (non-wildcard) attribute path.
///
/// Concrete paths are totally ordered by (endpoint, cluster, attribute), which is
/// also the order in which wildcard paths are expanded and reported.
/// List item positions are not part of a concrete path: they are a property of how
/// a report entry carries (part of) the attribute value, see `AttrPath::list_index`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConcretePath {
    pub endpoint: EndptId,
    pub cluster: ClusterId,
    pub attr: AttrId,
}

impl ConcretePath {
    pub const fn new(endpoint: EndptId, cluster: ClusterId, attr: AttrId) -> Self {
        Self {
            endpoint,
            cluster,
            attr,
        }
    }
}

impl fmt::Display for ConcretePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:04x}/{:04x}", self.endpoint, self.cluster, self.attr)
    }
}
