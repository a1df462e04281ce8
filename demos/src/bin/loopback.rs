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

//! A Matter Interaction Model server and client talking over an in-memory session.
//!
//! The client reads the whole data tree, then subscribes to a light and
//! logs the changes the "device" makes to it, including a list attribute
//! too long for a single message.

use embassy_futures::select::{select3, Either3};
use embassy_time::{Duration, Timer};
use embassy_time_queue_utils as _;

use log::info;

use rs_matter_im::client::{ClientConfig, ClientEvent, ImClient, ResubscribePolicy};
use rs_matter_im::dm::{
    AttrValue, DataModel, DefaultSubscriptions, DirtySet, MemStore, Quality, ReportConfig,
};
use rs_matter_im::error::Error;
use rs_matter_im::im::{AttrPath, ConcretePath, GenericPath, ReadReq, SubscribeReq};
use rs_matter_im::respond::Responder;
use rs_matter_im::transport::loopback::{loopback_pair, LoopbackTransport};
use rs_matter_im::utils::rand::sys_rand;

const ON_OFF_CLUSTER: u32 = 0x06;
const LEVEL_CLUSTER: u32 = 0x08;

const ON_OFF: ConcretePath = ConcretePath::new(1, ON_OFF_CLUSTER, 0);
const LEVEL: ConcretePath = ConcretePath::new(1, LEVEL_CLUSTER, 0);
const SCENES: ConcretePath = ConcretePath::new(1, LEVEL_CLUSTER, 0x4000);

fn main() -> Result<(), Error> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let dirty: DirtySet = DirtySet::new();
    let subscriptions = DefaultSubscriptions::new();

    let store: MemStore<'_> = MemStore::new(Some(&dirty), sys_rand);
    store.add_endpoint(1);
    store.add_cluster(1, ON_OFF_CLUSTER, 4, 0)?;
    store.add_attribute(&ON_OFF, Quality::NONE, false.into())?;
    store.add_cluster(1, LEVEL_CLUSTER, 5, 0)?;
    store.add_attribute(&LEVEL, Quality::NONE, 0u32.into())?;
    store.add_attribute(&SCENES, Quality::ARRAY, AttrValue::List(Vec::new()))?;

    // A small payload budget, so that the long list is reported in chunks
    let dm = DataModel::new(&store, &dirty, &subscriptions).with_config(ReportConfig {
        max_payload: 256,
        ..ReportConfig::new()
    });

    let (server_transport, client_transport) = loopback_pair(1);
    let client = ImClient::new(client_transport, ClientConfig::new(), sys_rand);

    let responder = Responder::new("server", &dm, &server_transport);

    futures_lite::future::block_on(async {
        match select3(
            responder.run::<2>(),
            dm.process_subscriptions(&server_transport),
            run_client(&client, &store),
        )
        .await
        {
            Either3::First(result) | Either3::Second(result) | Either3::Third(result) => result,
        }
    })
}

async fn run_client(
    client: &ImClient<LoopbackTransport>,
    store: &MemStore<'_>,
) -> Result<(), Error> {
    info!("Reading the whole data tree");

    client
        .read(
            ReadReq::new(vec![AttrPath::new(&GenericPath::default())]),
            |attr| info!("Read {}: {:?}", attr.path, attr.result),
        )
        .await?;

    let mut sub = client.subscribe(
        SubscribeReq::new(
            vec![AttrPath::new(&GenericPath::new(Some(1), None, None))],
            0,
            10,
        ),
        Some(ResubscribePolicy::new()),
    )?;

    let mut changes: u32 = 0;

    while let Some(event) = sub.next_event().await {
        match event {
            ClientEvent::Attr(attr) => info!("Reported {}: {:?}", attr.path, attr.result),
            ClientEvent::Subscribed {
                subscription_id,
                max_int_secs,
                ..
            } => info!(
                "Subscription {} established, max interval {}s",
                subscription_id, max_int_secs
            ),
            ClientEvent::ReportEnd => {
                if changes == 3 {
                    break;
                }

                Timer::after(Duration::from_secs(1)).await;

                changes += 1;
                info!("Device change {}", changes);

                store.write(&ON_OFF, (changes % 2 == 1).into())?;
                store.write(&LEVEL, (changes * 80).into())?;
                store.write(
                    &SCENES,
                    AttrValue::List((0..changes * 100).map(AttrValue::from).collect()),
                )?;
            }
            ClientEvent::Resubscribing { attempt, delay } => {
                info!("Resubscribing in {}ms, attempt {}", delay.as_millis(), attempt)
            }
            ClientEvent::Error(err) => Err(err)?,
            ClientEvent::Done => break,
        }
    }

    info!("Done");

    Ok(())
}
