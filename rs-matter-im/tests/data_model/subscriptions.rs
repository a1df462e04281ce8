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

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};

use rs_matter_im::client::{AttrReport, ClientEvent, ClientState};
use rs_matter_im::dm::{AttrValue, DirtySet, Quality};
use rs_matter_im::error::ErrorCode;
use rs_matter_im::im::{
    AttrPath, ConcretePath, GenericPath, IMStatusCode, ReadReq, SubscribeReq,
};

use crate::common::*;

fn basic_info() -> GenericPath {
    GenericPath::new(Some(0), Some(BASIC_INFO_CLUSTER), None)
}

#[test]
fn test_subscribe_prime_and_report_changes() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(subscribe_req(basic_info(), 0, 5), None)
            .unwrap();

        let (attrs, max_int_secs) = primed(&mut sub).await;

        assert_eq!(attrs.len(), STRINGS.len() + 1 + GLOBALS);
        assert!(attrs.iter().all(|attr| attr.result.is_ok()));
        assert_eq!(max_int_secs, 5);
        assert_eq!(sub.state(), ClientState::SubscriptionActive);
        assert!(sub.subscription_id().is_some());

        let path = ConcretePath::new(0, BASIC_INFO_CLUSTER, STRINGS[2]);
        let dataver = store.write(&path, AttrValue::utf8("Changed")).unwrap();

        assert_eq!(
            next_report(&mut sub).await,
            [AttrReport {
                path,
                result: Ok((AttrValue::utf8("Changed"), Some(dataver))),
            }]
        );
    });
}

#[test]
fn test_subscribe_reports_exactly_the_changes() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(subscribe_req(basic_info(), 0, 10), None)
            .unwrap();

        primed(&mut sub).await;

        let first = ConcretePath::new(0, BASIC_INFO_CLUSTER, STRINGS[0]);
        let list = ConcretePath::new(0, BASIC_INFO_CLUSTER, LIST);

        store.write(&first, AttrValue::utf8("One")).unwrap();
        store
            .write(&list, AttrValue::List(vec![1u32.into(), 2u32.into()]))
            .unwrap();
        store.write(&first, AttrValue::utf8("Two")).unwrap();

        let mut attrs = next_report(&mut sub).await;
        attrs.sort_by_key(|attr| attr.path);

        let values = attrs
            .into_iter()
            .map(|attr| (attr.path, attr.result.unwrap().0))
            .collect::<Vec<_>>();

        assert_eq!(
            values,
            [
                (first, AttrValue::utf8("Two")),
                (list, AttrValue::List(vec![1u32.into(), 2u32.into()])),
            ]
        );
    });
}

#[test]
fn test_subscribe_missing_path_reported_once() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    let existing = ConcretePath::new(0, BASIC_INFO_CLUSTER, STRINGS[0]);
    let missing = ConcretePath::new(0, BASIC_INFO_CLUSTER, 0x99);

    with_server(&store, &dirty, &transport, async {
        let req = SubscribeReq::new(
            vec![AttrPath::concrete(&existing), AttrPath::concrete(&missing)],
            0,
            2,
        );

        let mut sub = client.subscribe(req, None).unwrap();

        let (attrs, _) = primed(&mut sub).await;

        assert_eq!(attrs.len(), 2);
        assert!(attrs[0].result.is_ok());
        assert_eq!(attrs[1].path, missing);
        assert_eq!(attrs[1].result, Err(IMStatusCode::UnsupportedAttribute));

        store.write(&existing, AttrValue::utf8("Changed")).unwrap();

        let attrs = next_report(&mut sub).await;
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].path, existing);

        // Keep-alive
        assert!(next_report(&mut sub).await.is_empty());
    });
}

#[test]
fn test_subscribe_long_list_changes() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    let list = ConcretePath::new(0, BASIC_INFO_CLUSTER, LIST);
    let value = AttrValue::List(
        (0..200u32)
            .map(|item| item.wrapping_mul(1_000_003).into())
            .collect(),
    );

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(subscribe_req(GenericPath::from(&list), 0, 10), None)
            .unwrap();

        primed(&mut sub).await;

        store.write(&list, value.clone()).unwrap();

        let attrs = next_report(&mut sub).await;

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].path, list);
        assert_eq!(attrs[0].result.as_ref().map(|(value, _)| value), Ok(&value));
    });
}

#[test]
fn test_subscribe_to_nothing() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(
                subscribe_req(GenericPath::new(Some(7), Some(ON_OFF_CLUSTER), None), 0, 10),
                None,
            )
            .unwrap();

        match sub.next_event().await {
            Some(ClientEvent::Error(err)) => assert_eq!(err.code(), ErrorCode::InvalidAction),
            other => panic!("Unexpected event: {:?}", other),
        }

        assert!(matches!(sub.next_event().await, Some(ClientEvent::Done)));
        assert!(sub.next_event().await.is_none());
        assert_eq!(sub.state(), ClientState::Terminated);
    });
}

#[test]
fn test_subscribe_oversized_attribute() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let big = ConcretePath::new(0, BASIC_INFO_CLUSTER, 0x20);
    store
        .add_attribute(&big, Quality::NONE, AttrValue::Octets(vec![0xaa; 2000]))
        .unwrap();

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(subscribe_req(basic_info(), 0, 10), None)
            .unwrap();

        let (attrs, _) = primed(&mut sub).await;

        assert_eq!(attrs.len(), STRINGS.len() + 2 + GLOBALS);
        assert!(attrs
            .iter()
            .filter(|attr| attr.result.is_err())
            .all(|attr| attr.path == big && attr.result == Err(IMStatusCode::ResourceExhausted)));

        // Changes to the other attributes are still reported
        let path = ConcretePath::new(0, BASIC_INFO_CLUSTER, STRINGS[0]);
        store.write(&path, AttrValue::utf8("Still here")).unwrap();

        let attrs = next_report(&mut sub).await;
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].path, path);
    });
}

#[test]
fn test_subscribe_keep_alive() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(subscribe_req(basic_info(), 0, 2), None)
            .unwrap();

        primed(&mut sub).await;

        let start = Instant::now();

        for _ in 0..3 {
            assert!(next_report(&mut sub).await.is_empty());
        }

        // Three keep-alive reports, none of them past the max interval
        assert!(start.elapsed() <= Duration::from_secs(3 * 2));
        assert_eq!(sub.state(), ClientState::SubscriptionActive);
    });
}

#[test]
fn test_subscribe_cancel() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(subscribe_req(basic_info(), 0, 10), None)
            .unwrap();

        primed(&mut sub).await;

        sub.cancel();
        assert_eq!(sub.state(), ClientState::Terminated);
        assert!(sub.next_event().await.is_none());

        // Changes are no longer delivered, nor do they disturb the server
        store
            .write(
                &ConcretePath::new(0, BASIC_INFO_CLUSTER, STRINGS[0]),
                AttrValue::utf8("Nobody listens"),
            )
            .unwrap();

        match select(sub.next_event(), Timer::after(Duration::from_millis(500))).await {
            Either::First(event) => assert!(event.is_none()),
            Either::Second(_) => (),
        }

        // Reads over the same session still work
        let attrs = read_all(
            &client,
            ReadReq::new(vec![AttrPath::concrete(&ConcretePath::new(
                0,
                BASIC_INFO_CLUSTER,
                STRINGS[0],
            ))]),
        )
        .await
        .unwrap();

        assert_eq!(
            attrs[0].result.as_ref().map(|(value, _)| value.clone()),
            Ok(AttrValue::utf8("Nobody listens"))
        );
    });
}
