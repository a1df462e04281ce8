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

#![allow(dead_code)]

use core::future::Future;

use embassy_futures::block_on;
use embassy_futures::select::{select, select3, Either, Either3};
use embassy_time::{Duration, Timer};
use embassy_time_queue_utils as _;

use rs_matter_im::client::{AttrReport, ClientConfig, ClientEvent, ImClient, Subscription};
use rs_matter_im::dm::{
    AttrStore, AttrValue, DataModel, DefaultSubscriptions, DirtySet, MemStore, Quality,
    ReportConfig,
};
use rs_matter_im::error::Error;
use rs_matter_im::im::{AttrPath, ClusterId, ConcretePath, EndptId, GenericPath, ReadReq, SubscribeReq};
use rs_matter_im::respond::Responder;
use rs_matter_im::transport::loopback::{loopback_pair, LoopbackTransport};
use rs_matter_im::utils::rand::dummy_rand;

pub const SESSION_ID: u32 = 0x77;

pub const BASIC_INFO_CLUSTER: ClusterId = 0x28;
pub const ON_OFF_CLUSTER: ClusterId = 0x06;

/// The attribute IDs of the string attributes of the basic information cluster
pub const STRINGS: [u32; 5] = [1, 2, 3, 4, 5];
/// A list attribute of the basic information cluster
pub const LIST: u32 = 0x10;
pub const LIST_LEN: u32 = 40;

/// The number of global attributes of every cluster
pub const GLOBALS: usize = 3;

/// How long a test may take before it is considered hanging
pub const TEST_TIMEOUT_SECS: u64 = 30;

pub fn init_env_logger() {
    let _ = env_logger::try_init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
}

/// Endpoint 0 with the basic information cluster: five string attributes and a
/// list attribute. Endpoint 1 with an on/off cluster, if `with_light` is set.
pub fn store(dirty: &DirtySet, with_light: bool) -> MemStore<'_> {
    let store = MemStore::new(Some(dirty), dummy_rand);

    store.add_endpoint(0);
    store.add_cluster(0, BASIC_INFO_CLUSTER, 1, 0).unwrap();

    for attr in STRINGS {
        store
            .add_attribute(
                &ConcretePath::new(0, BASIC_INFO_CLUSTER, attr),
                Quality::NONE,
                AttrValue::utf8("The quick brown fox jumps over the lazy dog"),
            )
            .unwrap();
    }

    store
        .add_attribute(
            &ConcretePath::new(0, BASIC_INFO_CLUSTER, LIST),
            Quality::ARRAY,
            AttrValue::List((0..LIST_LEN).map(AttrValue::from).collect()),
        )
        .unwrap();

    if with_light {
        add_light(&store, 1);
    }

    store
}

/// Add an endpoint with an on/off cluster with a single boolean attribute
pub fn add_light(store: &MemStore<'_>, endpoint: EndptId) {
    store.add_endpoint(endpoint);
    store.add_cluster(endpoint, ON_OFF_CLUSTER, 4, 0).unwrap();
    store
        .add_attribute(
            &ConcretePath::new(endpoint, ON_OFF_CLUSTER, 0),
            Quality::NONE,
            false.into(),
        )
        .unwrap();
}

pub fn client_config() -> ClientConfig {
    ClientConfig {
        response_timeout: Duration::from_secs(5),
        liveness_grace: Duration::from_secs(1),
        ..ClientConfig::new()
    }
}

/// The server end of a loopback session: answers the exchanges opened by the
/// client and reports on the subscriptions, until the test is over.
pub async fn serve<S>(dm: &DataModel<'_, S>, transport: &LoopbackTransport) -> Result<(), Error>
where
    S: AttrStore,
{
    let responder = Responder::new("server", dm, transport);

    match select(responder.run::<2>(), dm.process_subscriptions(transport)).await {
        Either::First(result) | Either::Second(result) => result,
    }
}

/// A client over the client end of a loopback session.
pub fn client(transport: LoopbackTransport) -> ImClient<LoopbackTransport> {
    ImClient::new(transport, client_config(), dummy_rand)
}

/// The two ends of a loopback session: the server's and the client's.
pub fn session() -> (LoopbackTransport, ImClient<LoopbackTransport>) {
    let (server_transport, client_transport) = loopback_pair(SESSION_ID);

    (server_transport, client(client_transport))
}

/// Run the `test` future against a server over `transport`, the server end
/// of a loopback session.
pub fn with_server<S, F>(store: S, dirty: &DirtySet, transport: &LoopbackTransport, test: F) -> F::Output
where
    S: AttrStore,
    F: Future,
{
    with_server_config(store, dirty, ReportConfig::new(), transport, test)
}

/// Same as `with_server`, with a non-default configuration of the report engine.
pub fn with_server_config<S, F>(
    store: S,
    dirty: &DirtySet,
    config: ReportConfig,
    transport: &LoopbackTransport,
    test: F,
) -> F::Output
where
    S: AttrStore,
    F: Future,
{
    let subscriptions = DefaultSubscriptions::new();
    let dm = DataModel::new(store, dirty, &subscriptions).with_config(config);

    block_on(async {
        match select3(
            serve(&dm, transport),
            test,
            Timer::after(Duration::from_secs(TEST_TIMEOUT_SECS)),
        )
        .await
        {
            Either3::First(result) => panic!("Server exited: {:?}", result),
            Either3::Second(output) => output,
            Either3::Third(_) => panic!("Test timed out"),
        }
    })
}

/// Read the given request, collecting the reassembled attributes.
pub async fn read_all(
    client: &ImClient<LoopbackTransport>,
    req: ReadReq,
) -> Result<Vec<AttrReport>, Error> {
    let mut attrs = Vec::new();

    client.read(req, |attr| attrs.push(attr)).await?;

    Ok(attrs)
}

/// A subscribe request for a single, possibly wildcard, path.
pub fn subscribe_req(path: GenericPath, min_int_floor: u16, max_int_ceil: u16) -> SubscribeReq {
    SubscribeReq::new(vec![AttrPath::new(&path)], min_int_floor, max_int_ceil)
}

/// Wait for the next complete report of the subscription, collecting its attributes.
///
/// Panics on any other event.
pub async fn next_report(sub: &mut Subscription<'_, LoopbackTransport>) -> Vec<AttrReport> {
    let mut attrs = Vec::new();

    loop {
        match sub.next_event().await {
            Some(ClientEvent::Attr(attr)) => attrs.push(attr),
            Some(ClientEvent::ReportEnd) => break attrs,
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}

/// Wait for the priming report of the subscription and its confirmation,
/// returning the attributes of the report and the negotiated max interval.
pub async fn primed(sub: &mut Subscription<'_, LoopbackTransport>) -> (Vec<AttrReport>, u16) {
    let attrs = next_report(sub).await;

    match sub.next_event().await {
        Some(ClientEvent::Subscribed { max_int_secs, .. }) => (attrs, max_int_secs),
        other => panic!("Unexpected event: {:?}", other),
    }
}
