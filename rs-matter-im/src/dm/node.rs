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

#![allow(clippy::bad_bit_mask)]

use alloc::collections::BTreeMap;

use crate::im::{AttrId, ClusterId, EndptId};
use crate::utils::bitflags::bitflags;

bitflags! {
    #[repr(transparent)]
    #[derive(Default)]
    #[cfg_attr(not(feature = "defmt"), derive(Debug, Copy, Clone, Eq, PartialEq, Hash))]
    pub struct Quality: u8 {
        const NONE = 0x00;
        const SCENE = 0x01;      // Short: S
        const PERSISTENT = 0x02; // Short: N
        const FIXED = 0x04;      // Short: F
        const NULLABLE = 0x08;   // Short: X
        const OPTIONAL = 0x10;   // Short: O
        const ARRAY = 0x20;      // Short: A

        const SN = Self::SCENE.bits() | Self::PERSISTENT.bits();
        const S = Self::SCENE.bits();
        const N = Self::PERSISTENT.bits();
        const F = Self::FIXED.bits();
        const X = Self::NULLABLE.bits();
        const O = Self::OPTIONAL.bits();
        const A = Self::ARRAY.bits();
    }
}

/// The global attributes present in every cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum GlobalElements {
    AttributeList = 0xFFFB,
    FeatureMap = 0xFFFC,
    ClusterRevision = 0xFFFD,
}

impl GlobalElements {
    pub const ALL: [GlobalElements; 3] = [
        GlobalElements::AttributeList,
        GlobalElements::FeatureMap,
        GlobalElements::ClusterRevision,
    ];

    pub fn from_attr(attr: AttrId) -> Option<Self> {
        Self::ALL.into_iter().find(|global| *global as AttrId == attr)
    }

    pub const fn quality(&self) -> Quality {
        match self {
            Self::AttributeList => Quality::ARRAY,
            Self::FeatureMap | Self::ClusterRevision => Quality::NONE,
        }
    }
}

/// A type modeling the attribute meta-data in the Matter data model.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Attribute {
    /// The attribute ID
    pub id: AttrId,
    /// The quality of the attribute
    pub quality: Quality,
}

impl Attribute {
    pub const fn new(id: AttrId, quality: Quality) -> Self {
        Self { id, quality }
    }

    /// Return `true` if the attribute ID is a system one (i.e. a global attribute).
    pub fn is_system_attr(attr_id: AttrId) -> bool {
        GlobalElements::from_attr(attr_id).is_some()
    }
}

/// The shape of one cluster instance: its attributes, ordered by ID.
///
/// The global attributes are always present.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    pub revision: u16,
    pub feature_map: u32,
    attributes: BTreeMap<AttrId, Attribute>,
}

impl Cluster {
    pub fn new(id: ClusterId, revision: u16, feature_map: u32) -> Self {
        let attributes = GlobalElements::ALL
            .into_iter()
            .map(|global| {
                (
                    global as AttrId,
                    Attribute::new(global as AttrId, global.quality()),
                )
            })
            .collect();

        Self {
            id,
            revision,
            feature_map,
            attributes,
        }
    }

    pub fn add_attribute(&mut self, attr: Attribute) {
        self.attributes.insert(attr.id, attr);
    }

    pub fn attribute(&self, id: AttrId) -> Option<&Attribute> {
        self.attributes.get(&id)
    }

    /// Iterate the attributes with an ID `>= from`, in ID order.
    pub fn attributes_from(&self, from: AttrId) -> impl Iterator<Item = &Attribute> {
        self.attributes.range(from..).map(|(_, attr)| attr)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes_from(0)
    }
}

/// The shape of one endpoint: its cluster instances, ordered by ID.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Endpoint {
    pub id: EndptId,
    clusters: BTreeMap<ClusterId, Cluster>,
}

impl Endpoint {
    pub const fn new(id: EndptId) -> Self {
        Self {
            id,
            clusters: BTreeMap::new(),
        }
    }

    pub fn add_cluster(&mut self, cluster: Cluster) {
        self.clusters.insert(cluster.id, cluster);
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn cluster_mut(&mut self, id: ClusterId) -> Option<&mut Cluster> {
        self.clusters.get_mut(&id)
    }

    /// Iterate the clusters with an ID `>= from`, in ID order.
    pub fn clusters_from(&self, from: ClusterId) -> impl Iterator<Item = &Cluster> {
        self.clusters.range(from..).map(|(_, cluster)| cluster)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters_from(0)
    }
}

/// The shape of the data tree of a node.
///
/// Endpoints can be added and removed at any time; all lookups are by ID,
/// and all iterations are in ID order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Node {
    endpoints: BTreeMap<EndptId, Endpoint>,
}

impl Node {
    pub const fn new() -> Self {
        Self {
            endpoints: BTreeMap::new(),
        }
    }

    pub fn add_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.id, endpoint);
    }

    pub fn remove_endpoint(&mut self, id: EndptId) -> Option<Endpoint> {
        self.endpoints.remove(&id)
    }

    pub fn endpoint(&self, id: EndptId) -> Option<&Endpoint> {
        self.endpoints.get(&id)
    }

    pub fn endpoint_mut(&mut self, id: EndptId) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(&id)
    }

    /// Iterate the endpoints with an ID `>= from`, in ID order.
    pub fn endpoints_from(&self, from: EndptId) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.range(from..).map(|(_, endpoint)| endpoint)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints_from(0)
    }
}
