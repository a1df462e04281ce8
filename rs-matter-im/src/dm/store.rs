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

use core::cell::RefCell;

use alloc::collections::{BTreeMap, BTreeSet};

use embassy_sync::blocking_mutex::raw::{NoopRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;

use log::debug;

use crate::error::{Error, ErrorCode};
use crate::im::{ClusterId, ConcretePath, DataVersion, EndptId, GenericPath};
use crate::utils::rand::{Rand, RandRngCore};

use super::dataver::Dataver;
use super::node::{Attribute, Cluster, Endpoint, GlobalElements, Node, Quality};
use super::value::AttrValue;

/// The attribute store, as seen by the report engine.
pub trait AttrStore {
    /// Run `f` over a snapshot of the shape of the data tree.
    fn with_node<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Node) -> R;

    /// Read the current value of a concrete attribute, together with the
    /// current data version of its cluster instance.
    fn read(&self, path: &ConcretePath) -> Result<(AttrValue, DataVersion), Error>;

    /// The current data version of a cluster instance.
    fn dataver(&self, endpoint: EndptId, cluster: ClusterId) -> Result<DataVersion, Error>;
}

impl<T> AttrStore for &T
where
    T: AttrStore,
{
    fn with_node<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Node) -> R,
    {
        (**self).with_node(f)
    }

    fn read(&self, path: &ConcretePath) -> Result<(AttrValue, DataVersion), Error> {
        (**self).read(path)
    }

    fn dataver(&self, endpoint: EndptId, cluster: ClusterId) -> Result<DataVersion, Error> {
        (**self).dataver(endpoint, cluster)
    }
}

/// A sink for data changes: notified with the most specific path covering each change.
pub trait ChangeNotify {
    fn notify(&self, path: &GenericPath);
}

impl<T> ChangeNotify for &T
where
    T: ChangeNotify,
{
    fn notify(&self, path: &GenericPath) {
        (**self).notify(path)
    }
}

struct MemStoreInner {
    node: Node,
    disabled: BTreeMap<EndptId, Endpoint>,
    values: BTreeMap<ConcretePath, AttrValue>,
    datavers: BTreeMap<(EndptId, ClusterId), Dataver>,
    denied: BTreeSet<ConcretePath>,
    rand: Rand,
}

impl MemStoreInner {
    fn cluster(&self, endpoint: EndptId, cluster: ClusterId) -> Result<&Cluster, Error> {
        self.node
            .endpoint(endpoint)
            .ok_or(ErrorCode::EndpointNotFound)?
            .cluster(cluster)
            .ok_or(ErrorCode::ClusterNotFound.into())
    }

    fn attribute(&self, path: &ConcretePath) -> Result<&Attribute, Error> {
        self.cluster(path.endpoint, path.cluster)?
            .attribute(path.attr)
            .ok_or(ErrorCode::AttributeNotFound.into())
    }

    fn dataver(&self, endpoint: EndptId, cluster: ClusterId) -> Result<DataVersion, Error> {
        self.cluster(endpoint, cluster)?;

        self.datavers
            .get(&(endpoint, cluster))
            .map(Dataver::get)
            .ok_or(ErrorCode::ClusterNotFound.into())
    }

    fn value(&self, path: &ConcretePath) -> Result<AttrValue, Error> {
        let cluster = self.cluster(path.endpoint, path.cluster)?;

        if self.denied.contains(path) {
            Err(ErrorCode::UnsupportedAccess)?;
        }

        let value = match GlobalElements::from_attr(path.attr) {
            Some(GlobalElements::AttributeList) => AttrValue::List(
                cluster
                    .attributes()
                    .map(|attr| AttrValue::Uint(attr.id as _))
                    .collect(),
            ),
            Some(GlobalElements::FeatureMap) => AttrValue::Uint(cluster.feature_map as _),
            Some(GlobalElements::ClusterRevision) => AttrValue::Uint(cluster.revision as _),
            None => {
                self.attribute(path)?;

                self.values
                    .get(path)
                    .cloned()
                    .ok_or(ErrorCode::AttributeNotFound)?
            }
        };

        Ok(value)
    }
}

/// An in-memory attribute store.
///
/// Every write bumps the data version of the written cluster instance and is
/// reported to the (optional) `ChangeNotify` sink, outside of the store's lock.
pub struct MemStore<'a, M = NoopRawMutex>
where
    M: RawMutex,
{
    state: Mutex<M, RefCell<MemStoreInner>>,
    notify: Option<&'a dyn ChangeNotify>,
}

impl<'a, M> MemStore<'a, M>
where
    M: RawMutex,
{
    /// Create the store.
    ///
    /// The `rand` source seeds the data versions of the cluster instances.
    pub const fn new(notify: Option<&'a dyn ChangeNotify>, rand: Rand) -> Self {
        Self {
            state: Mutex::new(RefCell::new(MemStoreInner {
                node: Node::new(),
                disabled: BTreeMap::new(),
                values: BTreeMap::new(),
                datavers: BTreeMap::new(),
                denied: BTreeSet::new(),
                rand,
            })),
            notify,
        }
    }

    pub fn add_endpoint(&self, endpoint: EndptId) {
        self.state.lock(|state| {
            state
                .borrow_mut()
                .node
                .add_endpoint(Endpoint::new(endpoint))
        });
    }

    pub fn add_cluster(
        &self,
        endpoint: EndptId,
        cluster: ClusterId,
        revision: u16,
        feature_map: u32,
    ) -> Result<(), Error> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();

            let dataver = Dataver::new_rand(&mut RandRngCore(state.rand));

            state
                .node
                .endpoint_mut(endpoint)
                .ok_or(ErrorCode::EndpointNotFound)?
                .add_cluster(Cluster::new(cluster, revision, feature_map));
            state.datavers.insert((endpoint, cluster), dataver);

            Ok(())
        })
    }

    pub fn add_attribute(
        &self,
        path: &ConcretePath,
        quality: Quality,
        value: AttrValue,
    ) -> Result<(), Error> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();

            state
                .node
                .endpoint_mut(path.endpoint)
                .ok_or(ErrorCode::EndpointNotFound)?
                .cluster_mut(path.cluster)
                .ok_or(ErrorCode::ClusterNotFound)?
                .add_attribute(Attribute::new(path.attr, quality));
            state.values.insert(*path, value);

            Ok(())
        })
    }

    /// Write the value of an existing attribute.
    pub fn write(&self, path: &ConcretePath, value: AttrValue) -> Result<DataVersion, Error> {
        let dataver = self.state.lock(|state| {
            let mut state = state.borrow_mut();

            state.attribute(path)?;

            if Attribute::is_system_attr(path.attr) {
                Err(ErrorCode::UnsupportedAccess)?;
            }

            state.values.insert(*path, value);

            let dataver = state
                .datavers
                .get_mut(&(path.endpoint, path.cluster))
                .ok_or(ErrorCode::ClusterNotFound)?
                .changed();

            Ok::<_, Error>(dataver)
        })?;

        debug!("Attribute {} written, data version {:08x}", path, dataver);

        self.notify(&path.into());

        Ok(dataver)
    }

    /// Make reads of the attribute fail with `ErrorCode::UnsupportedAccess`.
    pub fn deny_read(&self, path: &ConcretePath) {
        self.state
            .lock(|state| state.borrow_mut().denied.insert(*path));
    }

    /// Hide an endpoint from the data tree, keeping its clusters and values.
    pub fn disable_endpoint(&self, endpoint: EndptId) -> Result<(), Error> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();

            let removed = state
                .node
                .remove_endpoint(endpoint)
                .ok_or(ErrorCode::EndpointNotFound)?;
            state.disabled.insert(endpoint, removed);

            Ok::<_, Error>(())
        })?;

        debug!("Endpoint {} disabled", endpoint);

        self.notify(&GenericPath::new(Some(endpoint), None, None));

        Ok(())
    }

    /// Put back an endpoint hidden by `disable_endpoint`.
    pub fn enable_endpoint(&self, endpoint: EndptId) -> Result<(), Error> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();

            let restored = state
                .disabled
                .remove(&endpoint)
                .ok_or(ErrorCode::EndpointNotFound)?;
            state.node.add_endpoint(restored);

            Ok::<_, Error>(())
        })?;

        debug!("Endpoint {} enabled", endpoint);

        self.notify(&GenericPath::new(Some(endpoint), None, None));

        Ok(())
    }

    fn notify(&self, path: &GenericPath) {
        if let Some(notify) = self.notify {
            notify.notify(path);
        }
    }
}

impl<M> AttrStore for MemStore<'_, M>
where
    M: RawMutex,
{
    fn with_node<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Node) -> R,
    {
        self.state.lock(|state| f(&state.borrow().node))
    }

    fn read(&self, path: &ConcretePath) -> Result<(AttrValue, DataVersion), Error> {
        self.state.lock(|state| {
            let state = state.borrow();

            Ok((
                state.value(path)?,
                state.dataver(path.endpoint, path.cluster)?,
            ))
        })
    }

    fn dataver(&self, endpoint: EndptId, cluster: ClusterId) -> Result<DataVersion, Error> {
        self.state
            .lock(|state| state.borrow().dataver(endpoint, cluster))
    }
}
