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

//! An in-memory transport connecting two peers within the same process.
//!
//! Used by the tests and the demos. Single-threaded: all futures of both peers
//! are expected to be polled from one executor.

use core::cell::Cell;

use alloc::rc::Rc;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use log::{debug, trace};

use crate::error::{Error, ErrorCode};

use super::{Exchange, ExchangeId, MessageMeta, RxMessage, Transport};

const PIPE_DEPTH: usize = 8;
const ACCEPT_DEPTH: usize = 4;

enum Packet {
    Message(MessageMeta, Vec<u8>),
    Close,
}

type Pipe = Channel<NoopRawMutex, Packet, PIPE_DEPTH>;

struct Link {
    session_id: u32,
    up: Cell<bool>,
    next_exchange_id: Cell<u16>,
    accept: [Channel<NoopRawMutex, LoopbackExchange, ACCEPT_DEPTH>; 2],
}

/// Create the two connected ends of a loopback session.
pub fn loopback_pair(session_id: u32) -> (LoopbackTransport, LoopbackTransport) {
    let link = Rc::new(Link {
        session_id,
        up: Cell::new(true),
        next_exchange_id: Cell::new(0),
        accept: [Channel::new(), Channel::new()],
    });

    (
        LoopbackTransport {
            link: link.clone(),
            side: 0,
        },
        LoopbackTransport { link, side: 1 },
    )
}

/// One end of a loopback session.
pub struct LoopbackTransport {
    link: Rc<Link>,
    side: usize,
}

impl LoopbackTransport {
    /// Simulate a link loss (`false`) or recovery (`true`).
    ///
    /// While the link is down, opening exchanges and sending messages
    /// fails with `ErrorCode::ConnectionAborted` on both ends.
    pub fn set_link_up(&self, up: bool) {
        debug!(
            "Loopback session {} link {}",
            self.link.session_id,
            if up { "up" } else { "down" }
        );

        self.link.up.set(up);
    }

    pub fn is_link_up(&self) -> bool {
        self.link.up.get()
    }
}

impl Transport for LoopbackTransport {
    type Exchange = LoopbackExchange;

    fn session_id(&self) -> u32 {
        self.link.session_id
    }

    async fn initiate(&self) -> Result<LoopbackExchange, Error> {
        if !self.link.up.get() {
            Err(ErrorCode::ConnectionAborted)?;
        }

        let exchange_id = self.link.next_exchange_id.get();
        self.link
            .next_exchange_id
            .set(exchange_id.wrapping_add(1));

        let outbound = Rc::new(Pipe::new());
        let inbound = Rc::new(Pipe::new());

        let id = ExchangeId {
            session_id: self.link.session_id,
            exchange_id,
        };

        let remote = LoopbackExchange {
            id,
            link: self.link.clone(),
            tx: inbound.clone(),
            rx: outbound.clone(),
            closed: false,
        };

        self.link.accept[1 - self.side].send(remote).await;

        trace!("Loopback exchange {} initiated", id);

        Ok(LoopbackExchange {
            id,
            link: self.link.clone(),
            tx: outbound,
            rx: inbound,
            closed: false,
        })
    }

    async fn accept(&self) -> Result<LoopbackExchange, Error> {
        let exchange = self.link.accept[self.side].receive().await;

        trace!("Loopback exchange {} accepted", exchange.id);

        Ok(exchange)
    }
}

/// An exchange over a loopback session.
pub struct LoopbackExchange {
    id: ExchangeId,
    link: Rc<Link>,
    tx: Rc<Pipe>,
    rx: Rc<Pipe>,
    closed: bool,
}

impl Exchange for LoopbackExchange {
    fn id(&self) -> ExchangeId {
        self.id
    }

    async fn send(&mut self, meta: MessageMeta, payload: &[u8]) -> Result<(), Error> {
        if self.closed || !self.link.up.get() {
            Err(ErrorCode::ConnectionAborted)?;
        }

        self.tx
            .send(Packet::Message(meta, payload.to_vec()))
            .await;

        Ok(())
    }

    async fn recv(&mut self) -> Result<RxMessage, Error> {
        if self.closed {
            Err(ErrorCode::ConnectionAborted)?;
        }

        match self.rx.receive().await {
            Packet::Message(meta, payload) => Ok(RxMessage::new(meta, payload)),
            Packet::Close => {
                self.closed = true;

                Err(ErrorCode::ConnectionAborted.into())
            }
        }
    }
}

impl Drop for LoopbackExchange {
    fn drop(&mut self) {
        // A full pipe means the peer is not reading anymore anyway
        let _ = self.tx.try_send(Packet::Close);
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use embassy_futures::join::join;

    use crate::im::OpCode;

    use super::*;

    #[test]
    fn test_exchange() {
        let (a, b) = loopback_pair(1);

        block_on(async {
            let (mut initiator, mut responder) = join(
                async { a.initiate().await.unwrap() },
                async { b.accept().await.unwrap() },
            )
            .await;

            assert_eq!(initiator.id(), responder.id());

            initiator
                .send(OpCode::ReadRequest.meta(), &[1, 2, 3])
                .await
                .unwrap();

            let rx = responder.recv().await.unwrap();
            assert_eq!(rx.meta(), OpCode::ReadRequest.meta());
            assert_eq!(rx.payload(), [1, 2, 3]);

            drop(initiator);

            assert_eq!(
                responder.recv().await.unwrap_err().code(),
                ErrorCode::ConnectionAborted
            );
        });
    }

    #[test]
    fn test_link_down() {
        let (a, _b) = loopback_pair(1);

        a.set_link_up(false);

        let result = block_on(a.initiate());
        assert_eq!(
            result.err().map(|e| e.code()),
            Some(ErrorCode::ConnectionAborted)
        );
    }
}
