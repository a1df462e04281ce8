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

//! The message-exchange abstraction the Interaction Model runs on top of.
//!
//! Sessions, reliability and encryption are the job of the transport;
//! this crate only needs ordered, request/response exchanges within a session.

use core::fmt;

use alloc::vec::Vec;

use crate::error::{Error, ErrorCode};

pub mod loopback;

/// The maximum size of an IPv6 UDP payload which does not need fragmentation.
pub const MAX_TX_PACKET_SIZE: usize = 1280 - 40/*IPV6 header size*/ - 8/*UDP header size*/;

/// The maximum size of the plain and the protocol headers of a message.
pub const HDR_RESERVE: usize = 26 + 14;

/// The size of the message integrity check appended to every encrypted message.
pub const TAIL_RESERVE: usize = 16;

/// Maximum buffer which should be allocated and used by user code that wants to send messages via `Exchange::send`
pub const MAX_EXCHANGE_TX_BUF_SIZE: usize = MAX_TX_PACKET_SIZE - HDR_RESERVE - TAIL_RESERVE;

/// An exchange identifier, unique within a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExchangeId {
    pub session_id: u32,
    pub exchange_id: u16,
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.session_id, self.exchange_id)
    }
}

/// The meta-data of a message: its protocol and opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageMeta {
    pub proto_id: u16,
    pub proto_opcode: u8,
    pub reliable: bool,
}

impl MessageMeta {
    // Create a new message meta-data instance
    pub const fn new(proto_id: u16, proto_opcode: u8, reliable: bool) -> Self {
        Self {
            proto_id,
            proto_opcode,
            reliable,
        }
    }

    /// Try to cast the protocol opcode to a specific type
    pub fn opcode<T: num::FromPrimitive>(&self) -> Result<T, Error> {
        num::FromPrimitive::from_u8(self.proto_opcode).ok_or(ErrorCode::InvalidOpcode.into())
    }

    /// Check if the protocol opcode is equal to a specific value
    pub fn check_opcode<T: num::FromPrimitive + PartialEq>(&self, opcode: T) -> Result<(), Error> {
        if self.opcode::<T>()? == opcode {
            Ok(())
        } else {
            Err(ErrorCode::InvalidOpcode.into())
        }
    }
}

/// A received message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RxMessage {
    meta: MessageMeta,
    payload: Vec<u8>,
}

impl RxMessage {
    pub fn new(meta: MessageMeta, payload: Vec<u8>) -> Self {
        Self { meta, payload }
    }

    /// Get the meta-data of the message
    pub fn meta(&self) -> MessageMeta {
        self.meta
    }

    /// Get the payload of the message
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// An exchange: an ordered, bidirectional conversation within a session.
///
/// Dropping an exchange closes it; the peer's pending and future `recv` calls
/// then fail with `ErrorCode::ConnectionAborted`.
pub trait Exchange {
    fn id(&self) -> ExchangeId;

    /// Send a message on this exchange.
    ///
    /// Fails with `ErrorCode::ConnectionAborted` if the message cannot be delivered.
    async fn send(&mut self, meta: MessageMeta, payload: &[u8]) -> Result<(), Error>;

    /// Wait for the next message on this exchange.
    async fn recv(&mut self) -> Result<RxMessage, Error>;
}

impl<T> Exchange for &mut T
where
    T: Exchange,
{
    fn id(&self) -> ExchangeId {
        (**self).id()
    }

    async fn send(&mut self, meta: MessageMeta, payload: &[u8]) -> Result<(), Error> {
        (**self).send(meta, payload).await
    }

    async fn recv(&mut self) -> Result<RxMessage, Error> {
        (**self).recv().await
    }
}

/// A source of exchanges with one peer.
pub trait Transport {
    type Exchange: Exchange;

    /// The ID of the session with the peer.
    fn session_id(&self) -> u32;

    /// Open a new exchange towards the peer.
    async fn initiate(&self) -> Result<Self::Exchange, Error>;

    /// Wait for the peer to open an exchange.
    async fn accept(&self) -> Result<Self::Exchange, Error>;
}

impl<T> Transport for &T
where
    T: Transport,
{
    type Exchange = T::Exchange;

    fn session_id(&self) -> u32 {
        (**self).session_id()
    }

    async fn initiate(&self) -> Result<Self::Exchange, Error> {
        (**self).initiate().await
    }

    async fn accept(&self) -> Result<Self::Exchange, Error> {
        (**self).accept().await
    }
}
