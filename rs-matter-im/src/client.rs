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

//! The client side of the read and subscribe interactions.

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};

use log::{debug, warn};

use crate::error::Error;
use crate::im::{IMStatusCode, OpCode, ReadReq, StatusResp, SubscribeReq, SubscriptionId};
use crate::transport::{Exchange, Transport, MAX_EXCHANGE_TX_BUF_SIZE};
use crate::utils::rand::Rand;
use crate::utils::writebuf::WriteBuf;

pub use reassembly::*;
pub use resubscribe::*;
pub use state::*;

mod reassembly;
mod resubscribe;
mod state;

/// How long to wait for each response of the server, by default.
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// How long past the max interval of a subscription to wait for a report
/// before considering the subscription lost.
pub const SUBSCRIPTION_LIVENESS_GRACE_SECS: u64 = 10;

// Struct + status + IM revision
const STATUS_RESP_BUF_SIZE: usize = 16;

/// Tunables of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub response_timeout: Duration,
    pub liveness_grace: Duration,
    /// The maximum size of an encoded request
    pub max_payload: usize,
}

impl ClientConfig {
    pub const fn new() -> Self {
        Self {
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            liveness_grace: Duration::from_secs(SUBSCRIPTION_LIVENESS_GRACE_SECS),
            max_payload: MAX_EXCHANGE_TX_BUF_SIZE,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// An Interaction Model client for reading and subscribing to the attributes of the peer of a `Transport`.
///
/// Only one subscription per transport should be active at a time, as the reports
/// of the server are accepted by whichever `Subscription` polls the transport.
pub struct ImClient<T> {
    transport: T,
    config: ClientConfig,
    rand: Rand,
}

impl<T> ImClient<T>
where
    T: Transport,
{
    /// Create the client.
    ///
    /// The `rand` source seeds the jitter of the resubscription backoff.
    #[inline(always)]
    pub const fn new(transport: T, config: ClientConfig, rand: Rand) -> Self {
        Self {
            transport,
            config,
            rand,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read the attributes requested by `request`, calling `on_attr` once per
    /// reported attribute (value or status), with the chunks of the report
    /// already reassembled.
    pub async fn read<F>(&self, request: ReadReq, mut on_attr: F) -> Result<(), Error>
    where
        F: FnMut(AttrReport),
    {
        let mut driver = Driver::new(&self.transport, InteractionClient::new(self.config.clone()));

        driver
            .client
            .send_request(Request::Read(request), Instant::now())?;

        let mut result = Ok(());

        while let Some(event) = driver.next_event().await {
            match event {
                ClientEvent::Attr(attr) => on_attr(attr),
                ClientEvent::Error(err) => result = Err(err),
                ClientEvent::Done => break,
                _ => (),
            }
        }

        result
    }

    /// Subscribe to the attributes requested by `request`.
    ///
    /// The request is sent once the returned `Subscription` is polled for events.
    /// With a `resubscribe` policy, a lost subscription is re-established
    /// transparently, with the same request.
    pub fn subscribe(
        &self,
        request: SubscribeReq,
        resubscribe: Option<ResubscribePolicy>,
    ) -> Result<Subscription<'_, T>, Error> {
        let mut client = InteractionClient::new(self.config.clone());

        if let Some(policy) = resubscribe {
            client = client.with_resubscriber(Resubscriber::new(policy, self.rand));
        }

        client.send_request(Request::Subscribe(request), Instant::now())?;

        Ok(Subscription {
            driver: Driver::new(&self.transport, client),
        })
    }
}

/// A subscription, as seen by the application.
///
/// Dropping it cancels the subscription.
pub struct Subscription<'a, T>
where
    T: Transport,
{
    driver: Driver<'a, T>,
}

impl<T> Subscription<'_, T>
where
    T: Transport,
{
    /// Wait for the next event of the subscription.
    ///
    /// Return `None` once the subscription is over, i.e. after `ClientEvent::Done`
    /// or after it was cancelled.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.driver.next_event().await
    }

    pub fn state(&self) -> ClientState {
        self.driver.client.state()
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.driver.client.subscription_id()
    }

    /// Cancel the subscription, closing its exchange if any.
    pub fn cancel(&mut self) {
        self.driver.client.cancel();
        self.driver.exchange = None;
    }
}

impl<T> Drop for Subscription<'_, T>
where
    T: Transport,
{
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs an `InteractionClient` over a transport: performs its actions,
/// and feeds it with the messages and the timeouts.
struct Driver<'a, T>
where
    T: Transport,
{
    transport: &'a T,
    client: InteractionClient,
    exchange: Option<T::Exchange>,
}

impl<'a, T> Driver<'a, T>
where
    T: Transport,
{
    const fn new(transport: &'a T, client: InteractionClient) -> Self {
        Self {
            transport,
            client,
            exchange: None,
        }
    }

    async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            self.perform().await;

            if let Some(event) = self.client.poll_event() {
                return Some(event);
            }

            if matches!(
                self.client.state(),
                ClientState::Idle | ClientState::Terminated
            ) {
                self.exchange = None;
                return None;
            }

            self.wait().await;
        }
    }

    async fn perform(&mut self) {
        while let Some(action) = self.client.poll_action() {
            let result = match action {
                Action::SendRequest(meta, payload) => {
                    self.exchange = None;

                    match self.transport.initiate().await {
                        Ok(mut exchange) => {
                            let result = exchange.send(meta, &payload).await;
                            self.exchange = Some(exchange);

                            result
                        }
                        Err(err) => Err(err),
                    }
                }
                Action::SendStatus(status) => match self.exchange.as_mut() {
                    Some(exchange) => send_status(exchange, status).await,
                    None => Ok(()),
                },
                Action::CloseExchange => {
                    self.exchange = None;
                    Ok(())
                }
            };

            if let Err(err) = result {
                self.exchange = None;
                self.client.on_exchange_error(err, Instant::now());
            }
        }
    }

    async fn wait(&mut self) {
        let deadline = self.client.next_deadline().unwrap_or(Instant::MAX);

        if let Some(exchange) = self.exchange.as_mut() {
            let result = select(exchange.recv(), Timer::at(deadline)).await;

            match result {
                Either::First(Ok(rx)) => {
                    if let Err(err) = self.client.on_message(&rx, Instant::now()) {
                        warn!("Message ignored: {:?}", err);
                    }
                }
                Either::First(Err(err)) => {
                    self.exchange = None;
                    self.client.on_exchange_error(err, Instant::now());
                }
                Either::Second(_) => self.client.on_timeout(Instant::now()),
            }
        } else if self.client.state() == ClientState::SubscriptionActive {
            let result = select(self.transport.accept(), Timer::at(deadline)).await;

            match result {
                Either::First(Ok(exchange)) => {
                    debug!("Accepted report exchange {}", exchange.id());
                    self.exchange = Some(exchange);
                }
                Either::First(Err(err)) => {
                    self.client.on_accept_error(err, Instant::now());
                }
                Either::Second(_) => self.client.on_timeout(Instant::now()),
            }
        } else {
            Timer::at(deadline).await;

            self.client.on_timeout(Instant::now());
        }
    }
}

async fn send_status<X>(exchange: &mut X, status: IMStatusCode) -> Result<(), Error>
where
    X: Exchange,
{
    let mut buf = [0; STATUS_RESP_BUF_SIZE];
    let mut wb = WriteBuf::new(&mut buf);

    StatusResp::write(status, &mut wb)?;

    exchange
        .send(OpCode::StatusResponse.meta(), wb.as_slice())
        .await
}
