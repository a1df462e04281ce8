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

//! Native Rust implementation of the Matter Interaction Model attribute
//! read, subscribe and report exchanges.
//!
//! The crate is split along the two roles of the protocol:
//! - [`dm`] is the server side: wildcard path expansion over a data model
//!   [`dm::Node`], the dirty-attribute tracking, the chunking report engine and
//!   the subscription bookkeeping, all glued together by [`dm::DataModel`];
//! - [`client`] is the client side: the sans-IO [`client::InteractionClient`]
//!   state machine, the [`client::ChunkReassembler`], the [`client::Resubscriber`]
//!   and the async [`client::ImClient`] driver on top of them.
//!
//! Both roles talk to each other over the [`transport::Transport`] and
//! [`transport::Exchange`] abstractions. An in-memory loopback implementation of
//! those lives in [`transport::loopback`].

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(async_fn_in_trait)]
#![allow(clippy::uninlined_format_args)]

extern crate alloc;

#[cfg(test)]
use embassy_time_queue_utils as _;

pub mod client;
pub mod dm;
pub mod error;
pub mod im;
pub mod respond;
pub mod tlv;
pub mod transport;
pub mod utils;
