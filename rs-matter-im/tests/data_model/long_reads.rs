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

use rs_matter_im::client::AttrReport;
use rs_matter_im::dm::{AttrStore, AttrValue, DirtySet, Quality, ReportConfig};
use rs_matter_im::im::{
    AttrPath, ConcretePath, DataVersionFilter, GenericPath, IMStatusCode, ReadReq,
};

use crate::common::*;

fn basic_info() -> ReadReq {
    ReadReq::new(vec![AttrPath::new(&GenericPath::new(
        Some(0),
        Some(BASIC_INFO_CLUSTER),
        None,
    ))])
}

#[test]
fn test_long_read_reserve_sweep() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();
    let reference =
        with_server(&store, &dirty, &transport, read_all(&client, basic_info())).unwrap();

    assert_eq!(reference.len(), STRINGS.len() + 1 + GLOBALS);
    assert!(reference.iter().all(|attr| attr.result.is_ok()));

    // Per byte where only a few entries fit into a chunk
    for reserve in (0..850).step_by(50).chain(850..=950) {
        let (transport, client) = session();
        let config = ReportConfig {
            reserve,
            ..ReportConfig::new()
        };

        let attrs = with_server_config(
            &store,
            &dirty,
            config,
            &transport,
            read_all(&client, basic_info()),
        )
        .unwrap();

        assert_eq!(attrs, reference, "Reserve {reserve}");
    }
}

#[test]
fn test_long_list_delivered_whole() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let list = ConcretePath::new(0, BASIC_INFO_CLUSTER, LIST);

    let (transport, client) = session();
    let config = ReportConfig {
        max_payload: 128,
        ..ReportConfig::new()
    };

    let attrs = with_server_config(
        &store,
        &dirty,
        config,
        &transport,
        read_all(&client, ReadReq::new(vec![AttrPath::concrete(&list)])),
    )
    .unwrap();

    assert_eq!(
        attrs,
        [AttrReport {
            path: list,
            result: Ok((
                AttrValue::List((0..LIST_LEN).map(AttrValue::from).collect()),
                Some(store.dataver(0, BASIC_INFO_CLUSTER).unwrap())
            )),
        }]
    );
}

#[test]
fn test_oversized_attribute() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let big = ConcretePath::new(0, BASIC_INFO_CLUSTER, 0x20);
    store
        .add_attribute(&big, Quality::NONE, AttrValue::Octets(vec![0x55; 2000]))
        .unwrap();

    let (transport, client) = session();

    let (concrete, wildcard) = with_server(&store, &dirty, &transport, async {
        let concrete = read_all(&client, ReadReq::new(vec![AttrPath::concrete(&big)]))
            .await
            .unwrap();

        // The server session survives
        let wildcard = read_all(&client, basic_info()).await.unwrap();

        (concrete, wildcard)
    });

    assert_eq!(
        concrete,
        [AttrReport {
            path: big,
            result: Err(IMStatusCode::ResourceExhausted),
        }]
    );

    assert_eq!(wildcard.len(), STRINGS.len() + 2 + GLOBALS);
    assert_eq!(
        wildcard
            .iter()
            .filter(|attr| attr.result.is_ok())
            .count(),
        STRINGS.len() + 1 + GLOBALS
    );
    assert!(wildcard
        .iter()
        .any(|attr| attr.path == big && attr.result == Err(IMStatusCode::ResourceExhausted)));
}

#[test]
fn test_concrete_statuses() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let denied = ConcretePath::new(0, BASIC_INFO_CLUSTER, 1);
    store.deny_read(&denied);

    let (transport, client) = session();

    let attrs = with_server(
        &store,
        &dirty,
        &transport,
        read_all(
            &client,
            ReadReq::new(vec![
                AttrPath::concrete(&ConcretePath::new(3, BASIC_INFO_CLUSTER, 1)),
                AttrPath::concrete(&ConcretePath::new(0, ON_OFF_CLUSTER, 0)),
                AttrPath::concrete(&ConcretePath::new(0, BASIC_INFO_CLUSTER, 0x99)),
                AttrPath::concrete(&denied),
                // Wildcards expanding to nothing are silently empty
                AttrPath::new(&GenericPath::new(None, Some(ON_OFF_CLUSTER), None)),
            ]),
        ),
    )
    .unwrap();

    let statuses = attrs
        .iter()
        .map(|attr| attr.result.as_ref().map(|_| ()).map_err(|status| *status))
        .collect::<Vec<_>>();

    assert_eq!(
        statuses,
        [
            Err(IMStatusCode::UnsupportedEndpoint),
            Err(IMStatusCode::UnsupportedCluster),
            Err(IMStatusCode::UnsupportedAttribute),
            Err(IMStatusCode::UnsupportedAccess),
        ]
    );
}

#[test]
fn test_dataver_filter() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, true);

    let dataver = store.dataver(0, BASIC_INFO_CLUSTER).unwrap();

    let (transport, client) = session();

    let attrs = with_server(
        &store,
        &dirty,
        &transport,
        read_all(
            &client,
            ReadReq::new(vec![AttrPath::new(&GenericPath::default())])
                .with_dataver_filters(vec![DataVersionFilter::new(0, BASIC_INFO_CLUSTER, dataver)]),
        ),
    )
    .unwrap();

    // Only the light is reported, the client is up to date with the rest
    assert_eq!(attrs.len(), 1 + GLOBALS);
    assert!(attrs.iter().all(|attr| attr.path.endpoint == 1));
}
