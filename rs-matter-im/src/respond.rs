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

use core::fmt::Display;

use embassy_futures::select::select_array;

use log::{error, info};

use crate::error::Error;
use crate::transport::{Exchange, Transport};

/// A trait modeling a generic handler for an exchange.
pub trait ExchangeHandler {
    async fn handle<X>(&self, exchange: &mut X) -> Result<(), Error>
    where
        X: Exchange;
}

impl<T> ExchangeHandler for &T
where
    T: ExchangeHandler,
{
    async fn handle<X>(&self, exchange: &mut X) -> Result<(), Error>
    where
        X: Exchange,
    {
        (*self).handle(exchange).await
    }
}

/// A generic responder utility for accepting and handling exchanges opened by the peer of a `Transport`,
/// by applying the provided `ExchangeHandler` instance to each accepted exchange.
///
/// This responder uses an intra-task concurrency model - without an external executor - where all handling is done as a single future.
pub struct Responder<'a, T, R> {
    name: &'a str,
    handler: T,
    transport: R,
}

impl<'a, T, R> Responder<'a, T, R>
where
    T: ExchangeHandler,
    R: Transport,
{
    /// Create a new responder.
    #[inline(always)]
    pub const fn new(name: &'a str, handler: T, transport: R) -> Self {
        Self {
            name,
            handler,
            transport,
        }
    }

    /// Run the responder with a given number of handlers.
    pub async fn run<const N: usize>(&self) -> Result<(), Error> {
        info!("{}: Creating {N} handlers", self.name);

        let handlers: [_; N] = core::array::from_fn(|index| self.handle(index + 2));

        select_array(handlers).await.0
    }

    #[inline(always)]
    async fn handle(&self, handler_id: impl Display) -> Result<(), Error> {
        loop {
            let _ = self.respond_once(&handler_id).await;
        }
    }

    /// Respond to a single exchange opened by the peer.
    #[inline(always)]
    pub async fn respond_once(&self, handler_id: impl Display) -> Result<(), Error> {
        let mut exchange = self.transport.accept().await?;

        info!(
            "{}: Handler {handler_id} / exchange {}: Starting",
            self.name,
            exchange.id()
        );

        let result = self.handler.handle(&mut exchange).await;

        if let Err(err) = &result {
            error!(
                "{}: Handler {handler_id} / exchange {}: Abandoned because of error {err:?}",
                self.name,
                exchange.id()
            );
        } else {
            info!(
                "{}: Handler {handler_id} / exchange {}: Completed",
                self.name,
                exchange.id()
            );
        }

        result
    }
}
