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

//! The server side of the read and subscribe interactions.

use core::cell::{Cell, RefCell};
use core::pin::pin;

use alloc::vec::Vec;

use embassy_futures::select::select3;
use embassy_sync::blocking_mutex::raw::{NoopRawMutex, RawMutex};
use embassy_time::{Duration, Instant, Timer};

use log::{debug, error, warn};

use crate::error::{Error, ErrorCode};
use crate::im::{
    AttrPath, GenericPath, IMStatusCode, OpCode, ReadReq, StatusResp, SubscribeReq,
    SubscribeResp, SubscriptionId, PROTO_ID_INTERACTION_MODEL,
};
use crate::respond::ExchangeHandler;
use crate::transport::{Exchange, Transport};
use crate::utils::writebuf::WriteBuf;

pub use dataver::*;
pub use dirty::*;
pub use node::*;
pub use path::{Expanded, PathExpander};
pub use report::{ReportConfig, ReportPacker, LONG_READS_TLV_RESERVE_SIZE};
pub use store::*;
pub use subscriptions::*;
pub use value::*;

mod dataver;
mod dirty;
mod node;
pub mod path;
pub mod report;
mod store;
mod subscriptions;
mod value;

/// How long to sleep when no subscription report is due, before re-checking
/// the subscriptions for inactivity.
const IDLE_POLL_SECS: u64 = 4;

// Struct + subscription ID + max interval + IM revision
const SUBSCRIBE_RESP_BUF_SIZE: usize = 32;

struct SubscriptionRequest {
    id: SubscriptionId,
    paths: Vec<GenericPath>,
}

/// The Interaction Model responder for reads and subscriptions.
///
/// Answers `ReadRequest` and `SubscribeRequest` messages with reports generated
/// by the chunking report engine over the attribute store `S`, and reports on the
/// accepted subscriptions when their data changes or their keep-alive interval is due.
///
/// Any other IM request is answered with an `InvalidAction` status.
pub struct DataModel<'a, S, const N: usize = DEFAULT_MAX_SUBSCRIPTIONS, M = NoopRawMutex>
where
    M: RawMutex,
{
    store: S,
    dirty: &'a DirtySet<M>,
    subscriptions: &'a Subscriptions<N, M>,
    requests: RefCell<heapless::Vec<SubscriptionRequest, N>>,
    config: ReportConfig,
}

impl<'a, S, const N: usize, M> DataModel<'a, S, N, M>
where
    S: AttrStore,
    M: RawMutex,
{
    /// Create the data model.
    ///
    /// The `dirty` set should be the one the store notifies of its changes.
    #[inline(always)]
    pub const fn new(store: S, dirty: &'a DirtySet<M>, subscriptions: &'a Subscriptions<N, M>) -> Self {
        Self {
            store,
            dirty,
            subscriptions,
            requests: RefCell::new(heapless::Vec::new()),
            config: ReportConfig::new(),
        }
    }

    /// Use a non-default configuration of the report engine.
    pub fn with_config(self, config: ReportConfig) -> Self {
        Self { config, ..self }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Answer a responding exchange.
    pub async fn handle<X>(&self, exchange: &mut X) -> Result<(), Error>
    where
        X: Exchange,
    {
        let rx = exchange.recv().await?;

        let meta = rx.meta();
        if meta.proto_id != PROTO_ID_INTERACTION_MODEL {
            Err(ErrorCode::InvalidProto)?;
        }

        match meta.opcode::<OpCode>() {
            Ok(OpCode::ReadRequest) => self.read(exchange, rx.payload()).await,
            Ok(OpCode::SubscribeRequest) => self.subscribe(exchange, rx.payload()).await,
            opcode => {
                error!("Invalid opcode: {:?}", opcode.map_err(|e| e.code()));
                Self::send_status(exchange, IMStatusCode::InvalidAction).await
            }
        }
    }

    /// Respond to a `ReadReq` request.
    async fn read<X>(&self, exchange: &mut X, payload: &[u8]) -> Result<(), Error>
    where
        X: Exchange,
    {
        let req = match ReadReq::parse(payload) {
            Ok(req) => req,
            Err(err) => {
                error!("Invalid read request: {:?}", err);
                return Self::send_status(exchange, IMStatusCode::InvalidAction).await;
            }
        };

        debug!("IM: Read request: {:?}", req);

        let mut packer = ReportPacker::read(
            Self::paths(&req.attr_requests),
            req.dataver_filters,
            self.config.clone(),
        );

        packer.respond(&self.store, exchange, |_| ()).await?;

        Ok(())
    }

    /// Respond to a `SubscribeReq` request by priming the subscription (i.e. doing an initial data report)
    /// and if the priming is successful, sending a `SubscribeResp` response to the peer and registering
    /// the subscription details in the `Subscriptions` instance.
    async fn subscribe<X>(&self, exchange: &mut X, payload: &[u8]) -> Result<(), Error>
    where
        X: Exchange,
    {
        let req = match SubscribeReq::parse(payload) {
            Ok(req) => req,
            Err(err) => {
                error!("Invalid subscribe request: {:?}", err);
                return Self::send_status(exchange, IMStatusCode::InvalidAction).await;
            }
        };

        debug!("IM: Subscribe request: {:?}", req);

        if let Err(err) = self.validate_subscribe(&req) {
            error!("Invalid subscribe request: {:?}", err);
            return Self::send_status(exchange, err.code().into()).await;
        }

        let session_id = exchange.id().session_id;

        if !req.keep_subs {
            for id in self.subscriptions.ids(session_id) {
                self.drop_subscription(id);
            }

            debug!("All subscriptions for [S:{:x}] removed", session_id);
        }

        let min_int_secs = req.min_int_floor;
        let max_int_secs = req.max_int_ceil.max(min_int_secs);

        let Some(id) = self
            .subscriptions
            .add(session_id, min_int_secs, max_int_secs)
        else {
            return Self::send_status(exchange, IMStatusCode::ResourceExhausted).await;
        };

        let paths = Self::paths(&req.attr_requests);

        // Changes during the priming report are reported by the first steady-state report
        self.dirty.register(id, paths.clone());

        let subscribed = Cell::new(false);

        let _guard = scopeguard::guard((), |_| {
            if !subscribed.get() {
                self.drop_subscription(id);
            }
        });

        let mut packer = ReportPacker::priming(
            id,
            paths.clone(),
            req.dataver_filters,
            self.config.clone(),
        );

        let primed = packer.respond(&self.store, exchange, |_| ()).await?;

        if primed {
            let mut buf = [0; SUBSCRIBE_RESP_BUF_SIZE];
            let mut wb = WriteBuf::new(&mut buf);

            SubscribeResp::new(id, max_int_secs).write(&mut wb)?;

            exchange
                .send(OpCode::SubscribeResponse.meta(), wb.as_slice())
                .await?;

            debug!("Subscription [S:{:x}]::{} created", session_id, id);

            if self.subscriptions.mark_reported(id, Instant::now())
                && self
                    .requests
                    .borrow_mut()
                    .push(SubscriptionRequest { id, paths })
                    .is_ok()
            {
                subscribed.set(true);
                self.subscriptions.notify_changed();
            }
        }

        Ok(())
    }

    /// Validates the subscription request
    fn validate_subscribe(&self, req: &SubscribeReq) -> Result<(), Error> {
        // A subscription to nothing but non-existing endpoints, clusters and attributes
        // is (a bit surprisingly) an `InvalidAction` rather than a report full of statuses

        if req.attr_requests.is_empty() {
            Err(ErrorCode::InvalidAction)?;
        }

        let any_exists = self.store.with_node(|node| {
            req.attr_requests.iter().any(|attr_req| {
                let Some(endpoint) = attr_req.endpoint else {
                    return true;
                };

                let Some(endpoint) = node.endpoint(endpoint) else {
                    return false;
                };

                let Some(cluster) = attr_req.cluster else {
                    return true;
                };

                let Some(cluster) = endpoint.cluster(cluster) else {
                    return false;
                };

                attr_req
                    .attr
                    .map(|attr| cluster.attribute(attr).is_some())
                    .unwrap_or(true)
            })
        });

        if any_exists {
            Ok(())
        } else {
            Err(ErrorCode::InvalidAction.into())
        }
    }

    /// Process the subscriptions of the session of `transport` in an endless loop,
    /// reporting to the peer when their data changes or their keep-alive interval is due.
    pub async fn process_subscriptions<T>(&self, transport: T) -> Result<(), Error>
    where
        T: Transport,
    {
        let session_id = transport.session_id();

        loop {
            let now = Instant::now();
            let idle = now + Duration::from_secs(IDLE_POLL_SECS);

            let deadline = self
                .subscriptions
                .next_due(session_id, |id| self.dirty.is_dirty(id))
                .map(|due| due.min(idle))
                .unwrap_or(idle);

            let mut changed = pin!(self.dirty.wait_changed());
            let mut scheduled = pin!(self.subscriptions.wait_changed());
            let mut timeout = pin!(Timer::at(deadline));

            select3(&mut changed, &mut scheduled, &mut timeout).await;

            self.report_due(&transport, Instant::now()).await;
        }
    }

    /// Remove the subscriptions which had not been reported on for longer than
    /// their max interval, then report on all subscriptions of the session of
    /// `transport` which are due at `now`.
    pub async fn report_due<T>(&self, transport: T, now: Instant)
    where
        T: Transport,
    {
        while let Some(key) = self.subscriptions.find_expired(now) {
            self.drop_subscription(key.id);

            warn!(
                "Subscription [S:{:x}]::{} removed due to inactivity",
                key.session_id, key.id
            );
        }

        let session_id = transport.session_id();

        while let Some(key) =
            self.subscriptions
                .find_report_due(session_id, now, |id| self.dirty.is_dirty(id))
        {
            debug!(
                "About to report data for subscription [S:{:x}]::{}",
                key.session_id, key.id
            );

            match self.process_subscription(&transport, key.id).await {
                Ok(true) => {
                    self.subscriptions.mark_reported(key.id, now);
                }
                Ok(false) => {
                    warn!(
                        "Subscription [S:{:x}]::{} removed since the peer rejected its report",
                        key.session_id, key.id
                    );

                    self.drop_subscription(key.id);
                }
                Err(e) => {
                    error!("Error while processing subscription: {:?}", e);

                    if self.subscriptions.mark_failed(key.id) {
                        warn!(
                            "Subscription [S:{:x}]::{} removed after {} failed reports",
                            key.session_id, key.id, MAX_REPORT_SEND_FAILURES
                        );

                        self.drop_subscription(key.id);
                    }
                }
            }
        }
    }

    /// Process one valid subscription, reporting the data which had changed to the peer.
    ///
    /// The dirty paths are cleared chunk by chunk, as the peer confirms them.
    async fn process_subscription<T>(&self, transport: T, id: SubscriptionId) -> Result<bool, Error>
    where
        T: Transport,
    {
        let paths = self
            .requests
            .borrow()
            .iter()
            .find(|request| request.id == id)
            .map(|request| request.paths.clone())
            .ok_or(ErrorCode::NotFound)?;

        let dirty = self.dirty.snapshot(id);

        let mut exchange = transport.initiate().await?;

        let mut packer = ReportPacker::steady(id, paths, dirty, self.config.clone());

        packer
            .respond(&self.store, &mut exchange, |reported| {
                self.dirty.clear(id, reported)
            })
            .await
    }

    fn drop_subscription(&self, id: SubscriptionId) {
        self.subscriptions.remove(None, Some(id));
        self.dirty.unregister(id);
        self.requests
            .borrow_mut()
            .retain(|request| request.id != id);
    }

    fn paths(attr_requests: &[AttrPath]) -> Vec<GenericPath> {
        attr_requests.iter().map(AttrPath::to_gp).collect()
    }

    /// A utility to send a status response to the peer.
    async fn send_status<X>(exchange: &mut X, status: IMStatusCode) -> Result<(), Error>
    where
        X: Exchange,
    {
        let mut buf = [0; SUBSCRIBE_RESP_BUF_SIZE];
        let mut wb = WriteBuf::new(&mut buf);

        StatusResp::write(status, &mut wb)?;

        exchange
            .send(OpCode::StatusResponse.meta(), wb.as_slice())
            .await
    }
}

impl<S, const N: usize, M> ExchangeHandler for DataModel<'_, S, N, M>
where
    S: AttrStore,
    M: RawMutex,
{
    async fn handle<X>(&self, exchange: &mut X) -> Result<(), Error>
    where
        X: Exchange,
    {
        DataModel::handle(self, exchange).await
    }
}
