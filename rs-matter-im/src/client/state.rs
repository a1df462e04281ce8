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

//! The sans-IO state machine of one read or subscribe interaction.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use embassy_time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, ErrorCode};
use crate::im::{
    AttrPath, GenericPath, IMStatusCode, OpCode, ReadReq, ReportData, StatusResp, SubscribeReq,
    SubscribeResp, SubscriptionId, PROTO_ID_INTERACTION_MODEL,
};
use crate::transport::{MessageMeta, RxMessage};
use crate::utils::writebuf::WriteBuf;

use super::reassembly::{AttrReport, ChunkReassembler};
use super::resubscribe::Resubscriber;
use super::ClientConfig;

/// The states of an `InteractionClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientState {
    Idle,
    /// The request is sent; the (priming) report is being received
    AwaitingInitialReport,
    /// The priming report is received; waiting for the server to confirm the subscription
    AwaitingSubscribeResponse,
    SubscriptionActive,
    /// The subscription was lost; waiting for the backoff to elapse before resubscribing
    Resubscribing,
    Terminated,
}

/// The request of an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read(ReadReq),
    Subscribe(SubscribeReq),
}

impl Request {
    /// Read the given (possibly wildcard) paths.
    pub fn read(paths: &[GenericPath]) -> Self {
        Self::Read(ReadReq::new(paths.iter().map(AttrPath::new).collect()))
    }

    /// Subscribe to the given (possibly wildcard) paths, with the reporting intervals in seconds.
    pub fn subscribe(paths: &[GenericPath], min_int_floor: u16, max_int_ceil: u16) -> Self {
        Self::Subscribe(SubscribeReq::new(
            paths.iter().map(AttrPath::new).collect(),
            min_int_floor,
            max_int_ceil,
        ))
    }

    pub fn is_subscribe(&self) -> bool {
        matches!(self, Self::Subscribe(_))
    }

    fn encode(&self, max_payload: usize) -> Result<(MessageMeta, Vec<u8>), Error> {
        let mut buf = vec![0; max_payload];
        let mut wb = WriteBuf::new(&mut buf);

        let opcode = match self {
            Self::Read(req) => {
                req.write(&mut wb)?;
                OpCode::ReadRequest
            }
            Self::Subscribe(req) => {
                req.write(&mut wb)?;
                OpCode::SubscribeRequest
            }
        };

        Ok((opcode.meta(), wb.as_slice().to_vec()))
    }
}

/// What the interaction tells its owner.
#[derive(Debug)]
pub enum ClientEvent {
    /// One complete attribute of the current report
    Attr(AttrReport),
    /// The current report is complete
    ReportEnd,
    /// The server confirmed the subscription
    Subscribed {
        subscription_id: SubscriptionId,
        min_int_secs: u16,
        max_int_secs: u16,
    },
    /// The subscription was lost and will be re-established after `delay`
    Resubscribing { attempt: u32, delay: Duration },
    /// The interaction failed; always followed by `Done`
    Error(Error),
    /// The interaction is over
    Done,
}

/// What the interaction needs its owner to do with the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a new exchange and send the request over it
    SendRequest(MessageMeta, Vec<u8>),
    /// Answer the peer on the current exchange
    SendStatus(IMStatusCode),
    /// Close the current exchange, if any
    CloseExchange,
}

#[derive(Debug, Clone, Copy)]
struct Established {
    id: SubscriptionId,
    min_int_secs: u16,
    max_int_secs: u16,
}

/// The client side of one read or subscribe interaction, free of any I/O.
///
/// The owner feeds it with the messages received, the expiry of `next_deadline`
/// and the failures of the transport, and in return drains the `Action`s to be
/// performed over the transport and the `ClientEvent`s for the application.
///
/// Once a request is sent, the events always end with exactly one `Done`
/// (preceded by exactly one `Error` if the interaction failed), unless the
/// interaction is cancelled.
pub struct InteractionClient {
    config: ClientConfig,
    state: ClientState,
    request: Option<Request>,
    reassembler: ChunkReassembler,
    pending_id: Option<SubscriptionId>,
    established: Option<Established>,
    deadline: Option<Instant>,
    resubscriber: Option<Resubscriber>,
    events: VecDeque<ClientEvent>,
    actions: VecDeque<Action>,
}

impl InteractionClient {
    pub const fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: ClientState::Idle,
            request: None,
            reassembler: ChunkReassembler::new(),
            pending_id: None,
            established: None,
            deadline: None,
            resubscriber: None,
            events: VecDeque::new(),
            actions: VecDeque::new(),
        }
    }

    /// Re-establish a lost subscription instead of failing the interaction.
    pub fn with_resubscriber(self, resubscriber: Resubscriber) -> Self {
        Self {
            resubscriber: Some(resubscriber),
            ..self
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The ID of the subscription, once confirmed by the server.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.established.map(|established| established.id)
    }

    /// The instant at which `on_timeout` should be called next, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn poll_event(&mut self) -> Option<ClientEvent> {
        self.events.pop_front()
    }

    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Send the request of the interaction.
    ///
    /// Fails with `ErrorCode::InvalidState` unless the client is `Idle`.
    pub fn send_request(&mut self, request: Request, now: Instant) -> Result<(), Error> {
        if self.state != ClientState::Idle {
            Err(ErrorCode::InvalidState)?;
        }

        let (meta, payload) = request.encode(self.config.max_payload)?;

        self.request = Some(request);
        self.issue(meta, payload, now);

        Ok(())
    }

    /// Process a message received on the exchange of the interaction.
    ///
    /// Messages which are not expected in the current state are rejected with
    /// `ErrorCode::InvalidState` and leave the interaction unaffected.
    pub fn on_message(&mut self, rx: &RxMessage, now: Instant) -> Result<(), Error> {
        let meta = rx.meta();
        if meta.proto_id != PROTO_ID_INTERACTION_MODEL {
            Err(ErrorCode::InvalidProto)?;
        }

        match meta.opcode::<OpCode>()? {
            OpCode::ReportData => self.on_report_chunk(rx.payload(), now),
            OpCode::SubscribeResponse => self.on_subscribe_response(rx.payload(), now),
            OpCode::StatusResponse => self.on_status_response(rx.payload()),
            opcode => {
                warn!("Unexpected opcode {:?}", opcode);
                Err(ErrorCode::InvalidOpcode.into())
            }
        }
    }

    /// Process one `ReportData` chunk.
    pub fn on_report_chunk(&mut self, payload: &[u8], now: Instant) -> Result<(), Error> {
        if !matches!(
            self.state,
            ClientState::AwaitingInitialReport | ClientState::SubscriptionActive
        ) {
            warn!("Got a report in state {:?}, ignoring", self.state);
            Err(ErrorCode::InvalidState)?;
        }

        let report = match ReportData::parse(payload) {
            Ok(report) => report,
            Err(err) => {
                warn!("Malformed report: {:?}", err);
                self.fail(ErrorCode::MalformedMessage.into());
                return Ok(());
            }
        };

        if let Some(established) = self.established {
            if report.subscription_id != Some(established.id) {
                warn!(
                    "Got a report for subscription {:?} while expecting {}, rejecting",
                    report.subscription_id, established.id
                );

                self.actions
                    .push_back(Action::SendStatus(IMStatusCode::InvalidSubscription));
                self.actions.push_back(Action::CloseExchange);

                return Ok(());
            }
        } else if self.is_subscribe() {
            match (self.pending_id, report.subscription_id) {
                (_, None) => {
                    warn!("Priming report without a subscription ID");
                    self.fail(ErrorCode::MalformedMessage.into());
                    return Ok(());
                }
                (Some(pending), Some(id)) if pending != id => {
                    warn!("Subscription ID changed from {} to {} mid-report", pending, id);
                    self.fail(ErrorCode::MalformedMessage.into());
                    return Ok(());
                }
                (_, id) => self.pending_id = id,
            }
        }

        for resp in report.attr_reports() {
            if let Err(err) = resp.and_then(|resp| self.reassembler.push(&resp)) {
                warn!("Malformed report entry: {:?}", err);
                self.fail(ErrorCode::MalformedMessage.into());
                return Ok(());
            }
        }

        if report.more_chunks || !report.suppress_response {
            self.actions
                .push_back(Action::SendStatus(IMStatusCode::Success));
        }

        if report.more_chunks {
            if self.state == ClientState::AwaitingInitialReport {
                self.deadline = Some(now + self.config.response_timeout);
            }

            return Ok(());
        }

        debug!("Report complete");

        for attr in self.reassembler.finish() {
            self.events.push_back(ClientEvent::Attr(attr));
        }

        self.events.push_back(ClientEvent::ReportEnd);

        if self.state == ClientState::SubscriptionActive {
            self.deadline = Some(self.liveness(now));
            self.actions.push_back(Action::CloseExchange);
        } else if self.is_subscribe() {
            self.state = ClientState::AwaitingSubscribeResponse;
            self.deadline = Some(now + self.config.response_timeout);
        } else {
            self.terminate();
            self.events.push_back(ClientEvent::Done);
        }

        Ok(())
    }

    /// Process a `SubscribeResponse`.
    pub fn on_subscribe_response(&mut self, payload: &[u8], now: Instant) -> Result<(), Error> {
        if self.state != ClientState::AwaitingSubscribeResponse {
            warn!("Got a subscribe response in state {:?}, ignoring", self.state);
            Err(ErrorCode::InvalidState)?;
        }

        let resp = match SubscribeResp::parse(payload) {
            Ok(resp) => resp,
            Err(err) => {
                warn!("Malformed subscribe response: {:?}", err);
                self.fail(ErrorCode::MalformedMessage.into());
                return Ok(());
            }
        };

        if self
            .pending_id
            .map(|id| id != resp.subscription_id)
            .unwrap_or(false)
        {
            warn!(
                "Subscribe response for subscription {}, primed {:?}",
                resp.subscription_id, self.pending_id
            );
            self.fail(ErrorCode::MalformedMessage.into());
            return Ok(());
        }

        let min_int_secs = match &self.request {
            Some(Request::Subscribe(req)) => req.min_int_floor,
            _ => 0,
        };

        let established = Established {
            id: resp.subscription_id,
            min_int_secs,
            max_int_secs: resp.max_int,
        };

        info!(
            "Subscription {} established, max interval {}s",
            established.id, established.max_int_secs
        );

        self.established = Some(established);
        self.pending_id = None;
        self.state = ClientState::SubscriptionActive;
        self.deadline = Some(self.liveness(now));

        if let Some(resubscriber) = self.resubscriber.as_mut() {
            resubscriber.reset();
        }

        self.actions.push_back(Action::CloseExchange);
        self.events.push_back(ClientEvent::Subscribed {
            subscription_id: established.id,
            min_int_secs: established.min_int_secs,
            max_int_secs: established.max_int_secs,
        });

        Ok(())
    }

    /// Process a `StatusResponse` sent instead of a report or a subscribe response.
    pub fn on_status_response(&mut self, payload: &[u8]) -> Result<(), Error> {
        if !matches!(
            self.state,
            ClientState::AwaitingInitialReport | ClientState::AwaitingSubscribeResponse
        ) {
            warn!("Got a status response in state {:?}, ignoring", self.state);
            Err(ErrorCode::InvalidState)?;
        }

        match StatusResp::parse(payload) {
            Ok(resp) if resp.status == IMStatusCode::Success => {}
            Ok(resp) => {
                warn!(
                    "Got status response {:?}, aborting interaction",
                    resp.status
                );
                self.fail(resp.status.into());
            }
            Err(err) => {
                warn!("Malformed status response: {:?}", err);
                self.fail(ErrorCode::MalformedMessage.into());
            }
        }

        Ok(())
    }

    /// Process the expiry of `next_deadline`.
    ///
    /// Nothing happens if called before the deadline.
    pub fn on_timeout(&mut self, now: Instant) {
        match self.deadline {
            Some(deadline) if deadline <= now => (),
            _ => return,
        }

        match self.state {
            ClientState::AwaitingInitialReport | ClientState::AwaitingSubscribeResponse => {
                warn!("Timed out in state {:?}", self.state);
                self.lost(ErrorCode::Timeout.into(), now);
            }
            ClientState::SubscriptionActive => {
                warn!(
                    "Subscription {:?} not reported in time, dropped",
                    self.subscription_id()
                );
                self.lost(ErrorCode::SubscriptionDropped.into(), now);
            }
            ClientState::Resubscribing => {
                let encoded = self
                    .request
                    .as_ref()
                    .ok_or_else(|| ErrorCode::InvalidState.into())
                    .and_then(|request| request.encode(self.config.max_payload));

                match encoded {
                    Ok((meta, payload)) => {
                        info!("Resubscribing");
                        self.issue(meta, payload, now);
                    }
                    Err(err) => self.fail(err),
                }
            }
            ClientState::Idle | ClientState::Terminated => (),
        }
    }

    /// Process a failure of the exchange of the interaction:
    /// the peer closed it, or a message could not be sent over it.
    pub fn on_exchange_error(&mut self, err: Error, now: Instant) {
        match self.state {
            ClientState::AwaitingInitialReport | ClientState::AwaitingSubscribeResponse => {
                warn!("Exchange failed in state {:?}: {:?}", self.state, err);
                self.lost(err, now);
            }
            ClientState::SubscriptionActive => {
                // The report in progress, if any, is lost; the liveness timer takes care of the rest
                debug!("Report exchange closed: {:?}", err);
                self.reassembler.clear();
            }
            _ => (),
        }
    }

    /// Handle a failure of the transport to accept the report exchanges of an active subscription.
    ///
    /// Unlike a closed report exchange, this means no further reports can arrive,
    /// so the subscription is considered lost.
    pub fn on_accept_error(&mut self, err: Error, now: Instant) {
        if self.state == ClientState::SubscriptionActive {
            warn!("Cannot accept report exchanges: {:?}", err);
            self.lost(err, now);
        }
    }

    /// Abandon the interaction without any further events.
    pub fn cancel(&mut self) {
        if self.state == ClientState::Terminated {
            return;
        }

        debug!("Interaction cancelled in state {:?}", self.state);

        self.terminate();
        self.events.clear();
        self.actions.clear();
        self.actions.push_back(Action::CloseExchange);
    }

    fn issue(&mut self, meta: MessageMeta, payload: Vec<u8>, now: Instant) {
        self.reassembler.clear();
        self.pending_id = None;
        self.established = None;
        self.state = ClientState::AwaitingInitialReport;
        self.deadline = Some(now + self.config.response_timeout);
        self.actions.push_back(Action::SendRequest(meta, payload));
    }

    fn lost(&mut self, err: Error, now: Instant) {
        if self.is_subscribe() && err.is_resubscribable() {
            if let Some(resubscriber) = self.resubscriber.as_mut() {
                let (attempt, delay) = resubscriber.next_delay();

                warn!(
                    "Subscription lost ({:?}), resubscribing in {} ms, attempt {}",
                    err.code(),
                    delay.as_millis(),
                    attempt
                );

                self.reassembler.clear();
                self.pending_id = None;
                self.established = None;
                self.state = ClientState::Resubscribing;
                self.deadline = Some(now + delay);
                self.actions.push_back(Action::CloseExchange);
                self.events
                    .push_back(ClientEvent::Resubscribing { attempt, delay });

                return;
            }
        }

        self.fail(err);
    }

    fn fail(&mut self, err: Error) {
        self.terminate();
        self.actions.push_back(Action::CloseExchange);
        self.events.push_back(ClientEvent::Error(err));
        self.events.push_back(ClientEvent::Done);
    }

    fn terminate(&mut self) {
        self.state = ClientState::Terminated;
        self.deadline = None;
        self.reassembler.clear();
    }

    fn is_subscribe(&self) -> bool {
        self.request
            .as_ref()
            .map(Request::is_subscribe)
            .unwrap_or(false)
    }

    fn liveness(&self, now: Instant) -> Instant {
        let max_int_secs = self
            .established
            .map(|established| established.max_int_secs)
            .unwrap_or(0);

        now + Duration::from_secs(max_int_secs as _) + self.config.liveness_grace
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use crate::client::{ResubscribePolicy, Resubscriber};
    use crate::dm::{AttrValue, MemStore, Quality, ReportConfig, ReportPacker};
    use crate::im::{ConcretePath, DataVersionFilter};
    use crate::tlv::{TLVTag, TLVWrite, ToTLV};
    use crate::utils::rand::dummy_rand;

    use super::*;

    const LIST: ConcretePath = ConcretePath::new(0, 0x28, 0x10);

    fn store() -> MemStore<'static> {
        let store = MemStore::new(None, dummy_rand);

        store.add_endpoint(0);
        store.add_cluster(0, 0x28, 1, 0).unwrap();
        store
            .add_attribute(
                &ConcretePath::new(0, 0x28, 1),
                Quality::NONE,
                AttrValue::Utf8(String::from("a string of some length")),
            )
            .unwrap();
        store
            .add_attribute(
                &LIST,
                Quality::ARRAY,
                AttrValue::List((0..30u32).map(AttrValue::from).collect()),
            )
            .unwrap();

        store
    }

    fn chunks(mut packer: ReportPacker, store: &MemStore<'_>) -> Vec<Vec<u8>> {
        let mut buf = vec![0; 100];
        let mut chunks = Vec::new();

        loop {
            let mut wb = WriteBuf::new(&mut buf);
            let more = packer.fill_chunk(store, &mut wb).unwrap();

            chunks.push(wb.as_slice().to_vec());

            if !more {
                break chunks;
            }
        }
    }

    fn config() -> ReportConfig {
        ReportConfig {
            max_payload: 100,
            ..ReportConfig::new()
        }
    }

    fn paths() -> Vec<GenericPath> {
        vec![GenericPath::new(Some(0), Some(0x28), Some(1)), (&LIST).into()]
    }

    fn at(secs: u64) -> Instant {
        Instant::from_secs(secs)
    }

    fn drain_events(client: &mut InteractionClient) -> Vec<ClientEvent> {
        core::iter::from_fn(|| client.poll_event()).collect()
    }

    fn drain_actions(client: &mut InteractionClient) -> Vec<Action> {
        core::iter::from_fn(|| client.poll_action()).collect()
    }

    fn subscribe_response(id: SubscriptionId, max_int: u16) -> Vec<u8> {
        let mut buf = [0; 32];
        let mut wb = WriteBuf::new(&mut buf);
        SubscribeResp::new(id, max_int).write(&mut wb).unwrap();

        wb.as_slice().to_vec()
    }

    fn status_response(status: IMStatusCode) -> Vec<u8> {
        let mut buf = [0; 32];
        let mut wb = WriteBuf::new(&mut buf);
        StatusResp::write(status, &mut wb).unwrap();

        wb.as_slice().to_vec()
    }

    fn prime(client: &mut InteractionClient, store: &MemStore<'_>, id: SubscriptionId) {
        client
            .send_request(Request::subscribe(&paths(), 0, 10), at(0))
            .unwrap();
        drain_actions(client);

        for chunk in chunks(
            ReportPacker::priming(id, paths(), Vec::<DataVersionFilter>::new(), config()),
            store,
        ) {
            client.on_report_chunk(&chunk, at(1)).unwrap();
        }

        assert_eq!(client.state(), ClientState::AwaitingSubscribeResponse);

        client
            .on_subscribe_response(&subscribe_response(id, 10), at(2))
            .unwrap();

        assert_eq!(client.state(), ClientState::SubscriptionActive);
        drain_events(client);
        drain_actions(client);
    }

    #[test]
    fn test_send_request_only_when_idle() {
        let mut client = InteractionClient::new(ClientConfig::new());

        client.send_request(Request::read(&paths()), at(0)).unwrap();

        assert_eq!(client.state(), ClientState::AwaitingInitialReport);
        assert!(matches!(
            drain_actions(&mut client).as_slice(),
            [Action::SendRequest(meta, _)] if meta.proto_opcode == OpCode::ReadRequest as u8
        ));

        assert_eq!(
            client
                .send_request(Request::read(&paths()), at(0))
                .map_err(|e| e.code()),
            Err(ErrorCode::InvalidState)
        );
    }

    #[test]
    fn test_read_reassembles_chunks() {
        let store = store();
        let mut client = InteractionClient::new(ClientConfig::new());

        client.send_request(Request::read(&paths()), at(0)).unwrap();
        drain_actions(&mut client);

        let chunks = chunks(
            ReportPacker::read(paths(), Vec::new(), config()),
            &store,
        );
        assert!(chunks.len() > 2);

        let (last, rest) = chunks.split_last().unwrap();

        for chunk in rest {
            client.on_report_chunk(chunk, at(1)).unwrap();

            assert_eq!(
                drain_actions(&mut client),
                [Action::SendStatus(IMStatusCode::Success)]
            );
            assert!(drain_events(&mut client).is_empty());
        }

        client.on_report_chunk(last, at(1)).unwrap();

        // The response to the last chunk of a read is suppressed
        assert!(!drain_actions(&mut client)
            .iter()
            .any(|action| matches!(action, Action::SendStatus(_))));

        let events = drain_events(&mut client);
        assert_eq!(events.len(), 4);

        match &events[1] {
            ClientEvent::Attr(AttrReport {
                path,
                result: Ok((AttrValue::List(items), Some(_))),
            }) => {
                assert_eq!(*path, LIST);
                assert_eq!(items.len(), 30);
                assert!(items
                    .iter()
                    .enumerate()
                    .all(|(index, item)| item.as_uint() == Some(index as u64)));
            }
            other => panic!("Unexpected event {:?}", other),
        }

        assert!(matches!(events[2], ClientEvent::ReportEnd));
        assert!(matches!(events[3], ClientEvent::Done));
        assert_eq!(client.state(), ClientState::Terminated);
        assert_eq!(client.next_deadline(), None);
    }

    #[test]
    fn test_subscribe_and_liveness() {
        let store = store();
        let mut client = InteractionClient::new(ClientConfig::new());

        prime(&mut client, &store, 7);

        assert_eq!(client.subscription_id(), Some(7));
        assert_eq!(
            client.next_deadline(),
            Some(at(2 + 10) + ClientConfig::new().liveness_grace)
        );

        // A report of some other subscription is rejected and ignored
        let foreign = chunks(
            ReportPacker::priming(8, paths(), Vec::new(), config()),
            &store,
        );
        client.on_report_chunk(&foreign[0], at(3)).unwrap();
        assert_eq!(
            drain_actions(&mut client),
            [
                Action::SendStatus(IMStatusCode::InvalidSubscription),
                Action::CloseExchange
            ]
        );
        assert!(drain_events(&mut client).is_empty());

        // Not yet
        client.on_timeout(at(11));
        assert_eq!(client.state(), ClientState::SubscriptionActive);

        let deadline = client.next_deadline().unwrap();
        client.on_timeout(deadline);

        let events = drain_events(&mut client);
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::Error(err), ClientEvent::Done] if err.code() == ErrorCode::SubscriptionDropped
        ));
        assert_eq!(client.state(), ClientState::Terminated);
    }

    #[test]
    fn test_resubscribe_after_liveness_timeout() {
        let store = store();
        let policy = ResubscribePolicy::new();
        let mut client = InteractionClient::new(ClientConfig::new())
            .with_resubscriber(Resubscriber::new(policy.clone(), dummy_rand));

        prime(&mut client, &store, 7);

        let mut last_delay = Duration::from_millis(0);

        for attempt in 1..=20 {
            // Either the liveness timer, or the response timer of the previous attempt
            let deadline = client.next_deadline().unwrap();
            client.on_timeout(deadline);

            assert_eq!(client.state(), ClientState::Resubscribing);
            let delay = match drain_events(&mut client).as_slice() {
                [ClientEvent::Resubscribing {
                    attempt: number,
                    delay,
                }] => {
                    assert_eq!(*number, attempt);
                    *delay
                }
                other => panic!("Unexpected events {:?}", other),
            };

            assert!(delay >= last_delay);
            assert!(delay <= policy.max_wait);
            last_delay = delay;

            assert_eq!(client.next_deadline(), Some(deadline + delay));
            client.on_timeout(deadline + delay);

            assert_eq!(client.state(), ClientState::AwaitingInitialReport);
            assert!(matches!(
                drain_actions(&mut client).as_slice(),
                [Action::CloseExchange, Action::SendRequest(meta, _)]
                    if meta.proto_opcode == OpCode::SubscribeRequest as u8
            ));
        }

        assert_eq!(last_delay, policy.max_wait);

        // The server answers at last
        let now = client.next_deadline().unwrap() - Duration::from_secs(1);
        for chunk in chunks(
            ReportPacker::priming(9, paths(), Vec::new(), config()),
            &store,
        ) {
            client.on_report_chunk(&chunk, now).unwrap();
        }
        client
            .on_subscribe_response(&subscribe_response(9, 10), now)
            .unwrap();

        assert_eq!(client.subscription_id(), Some(9));
        assert!(matches!(
            drain_events(&mut client).last(),
            Some(ClientEvent::Subscribed {
                subscription_id: 9,
                ..
            })
        ));

        // The backoff starts over
        let deadline = client.next_deadline().unwrap();
        client.on_timeout(deadline);
        assert!(matches!(
            drain_events(&mut client).as_slice(),
            [ClientEvent::Resubscribing { attempt: 1, .. }]
        ));
    }

    #[test]
    fn test_malformed_report_is_fatal() {
        let mut client = InteractionClient::new(ClientConfig::new());
        client.send_request(Request::read(&paths()), at(0)).unwrap();
        drain_actions(&mut client);

        // A list append without the list value preceding it
        let mut buf = [0; 64];
        let mut wb = WriteBuf::new(&mut buf);
        wb.start_struct(&TLVTag::Anonymous).unwrap();
        wb.start_array(&TLVTag::Context(1)).unwrap();
        wb.start_struct(&TLVTag::Anonymous).unwrap();
        wb.start_struct(&TLVTag::Context(1)).unwrap();
        AttrPath::list_append(&LIST)
            .to_tlv(&TLVTag::Context(1), &mut wb)
            .unwrap();
        wb.u32(&TLVTag::Context(2), 5).unwrap();
        wb.end_container().unwrap();
        wb.end_container().unwrap();
        wb.end_container().unwrap();
        wb.bool(&TLVTag::Context(4), true).unwrap();
        wb.end_container().unwrap();
        let len = wb.as_slice().len();

        client.on_report_chunk(&buf[..len], at(1)).unwrap();

        let events = drain_events(&mut client);
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::Error(err), ClientEvent::Done] if err.code() == ErrorCode::MalformedMessage
        ));
        assert_eq!(client.state(), ClientState::Terminated);

        // Garbage after termination changes nothing
        assert!(client.on_report_chunk(&[0x15], at(2)).is_err());
        assert!(drain_events(&mut client).is_empty());
    }

    #[test]
    fn test_status_response_is_fatal() {
        let mut client = InteractionClient::new(ClientConfig::new());
        client
            .send_request(Request::subscribe(&paths(), 0, 10), at(0))
            .unwrap();

        client
            .on_status_response(&status_response(IMStatusCode::ResourceExhausted))
            .unwrap();

        let events = drain_events(&mut client);
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::Error(err), ClientEvent::Done] if err.code() == ErrorCode::ResourceExhausted
        ));
    }

    #[test]
    fn test_read_timeout_is_not_retried() {
        let mut client = InteractionClient::new(ClientConfig::new()).with_resubscriber(
            Resubscriber::new(ResubscribePolicy::new(), dummy_rand),
        );
        client.send_request(Request::read(&paths()), at(0)).unwrap();

        client.on_timeout(at(0) + ClientConfig::new().response_timeout);

        let events = drain_events(&mut client);
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::Error(err), ClientEvent::Done] if err.code() == ErrorCode::Timeout
        ));
    }

    #[test]
    fn test_cancel() {
        let store = store();
        let mut client = InteractionClient::new(ClientConfig::new());

        prime(&mut client, &store, 7);

        client.cancel();
        client.cancel();

        assert_eq!(client.state(), ClientState::Terminated);
        assert_eq!(client.next_deadline(), None);
        assert_eq!(drain_actions(&mut client), [Action::CloseExchange]);
        assert!(drain_events(&mut client).is_empty());

        client.on_timeout(at(1000));
        assert!(drain_events(&mut client).is_empty());
    }

    #[test]
    fn test_accept_failure_loses_subscription() {
        let store = store();

        let mut client = InteractionClient::new(ClientConfig::new());
        prime(&mut client, &store, 7);

        client.on_accept_error(ErrorCode::ConnectionAborted.into(), at(3));

        assert!(matches!(
            drain_events(&mut client).as_slice(),
            [ClientEvent::Error(err), ClientEvent::Done] if err.code() == ErrorCode::ConnectionAborted
        ));
        assert_eq!(client.state(), ClientState::Terminated);

        let mut client = InteractionClient::new(ClientConfig::new())
            .with_resubscriber(Resubscriber::new(ResubscribePolicy::new(), dummy_rand));
        prime(&mut client, &store, 7);

        client.on_accept_error(ErrorCode::ConnectionAborted.into(), at(3));

        assert!(matches!(
            drain_events(&mut client).as_slice(),
            [ClientEvent::Resubscribing { attempt: 1, .. }]
        ));
        assert_eq!(client.state(), ClientState::Resubscribing);
        assert_eq!(drain_actions(&mut client), [Action::CloseExchange]);
    }
}
