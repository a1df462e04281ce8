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

use embassy_time::Duration;

use rs_matter_im::client::{ClientEvent, ClientState, ResubscribePolicy};
use rs_matter_im::dm::{AttrValue, DirtySet};
use rs_matter_im::error::ErrorCode;
use rs_matter_im::im::{AttrPath, ConcretePath, GenericPath, ReadReq};

use crate::common::*;

fn string_attr() -> ConcretePath {
    ConcretePath::new(0, BASIC_INFO_CLUSTER, STRINGS[0])
}

#[test]
fn test_read_link_down() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        client.transport().set_link_up(false);

        let result = read_all(&client, ReadReq::new(vec![AttrPath::concrete(&string_attr())]))
            .await
            .map(|_| ());
        assert_eq!(
            result.map_err(|err| err.code()),
            Err(ErrorCode::ConnectionAborted)
        );

        client.transport().set_link_up(true);

        let attrs = read_all(&client, ReadReq::new(vec![AttrPath::concrete(&string_attr())]))
            .await
            .unwrap();
        assert_eq!(attrs.len(), 1);
        assert!(attrs[0].result.is_ok());
    });
}

#[test]
fn test_subscription_dropped_without_resubscribe() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(subscribe_req(GenericPath::from(&string_attr()), 0, 2), None)
            .unwrap();

        primed(&mut sub).await;

        client.transport().set_link_up(false);

        loop {
            match sub.next_event().await {
                // Keep-alive reports already in flight
                Some(ClientEvent::ReportEnd) => (),
                Some(ClientEvent::Error(err)) => {
                    assert_eq!(err.code(), ErrorCode::SubscriptionDropped);
                    break;
                }
                other => panic!("Unexpected event: {:?}", other),
            }
        }

        assert!(matches!(sub.next_event().await, Some(ClientEvent::Done)));
        assert!(sub.next_event().await.is_none());
    });
}

#[test]
fn test_resubscribe_after_link_loss() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, false);

    let (transport, client) = session();

    let policy = ResubscribePolicy {
        min_wait: Duration::from_millis(100),
        max_wait: Duration::from_secs(1),
        ..ResubscribePolicy::new()
    };

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(
                subscribe_req(GenericPath::from(&string_attr()), 0, 2),
                Some(policy),
            )
            .unwrap();

        primed(&mut sub).await;
        assert!(sub.subscription_id().is_some());

        client.transport().set_link_up(false);

        let mut attempts = Vec::new();

        while attempts.len() < 4 {
            match sub.next_event().await {
                Some(ClientEvent::ReportEnd) => (),
                Some(ClientEvent::Resubscribing { attempt, delay }) => {
                    assert_eq!(sub.state(), ClientState::Resubscribing);
                    attempts.push((attempt, delay));
                }
                other => panic!("Unexpected event: {:?}", other),
            }
        }

        assert_eq!(
            attempts.iter().map(|(attempt, _)| *attempt).collect::<Vec<_>>(),
            [1, 2, 3, 4]
        );
        assert!(attempts.windows(2).all(|pair| pair[0].1 <= pair[1].1));
        assert!(attempts
            .iter()
            .all(|(_, delay)| *delay >= Duration::from_millis(100) && *delay <= Duration::from_secs(1)));

        client.transport().set_link_up(true);

        let mut attrs = Vec::new();

        loop {
            match sub.next_event().await {
                Some(ClientEvent::Resubscribing { attempt, .. }) => assert!(attempt > 4),
                Some(ClientEvent::Attr(attr)) => attrs.push(attr),
                Some(ClientEvent::ReportEnd) => (),
                Some(ClientEvent::Subscribed { max_int_secs, .. }) => {
                    assert_eq!(max_int_secs, 2);
                    break;
                }
                other => panic!("Unexpected event: {:?}", other),
            }
        }

        // The re-established subscription is primed again
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].path, string_attr());
        assert_eq!(sub.state(), ClientState::SubscriptionActive);

        store
            .write(&string_attr(), AttrValue::utf8("Back online"))
            .unwrap();

        let attrs = loop {
            let attrs = next_report(&mut sub).await;

            // Skip keep-alive reports
            if !attrs.is_empty() {
                break attrs;
            }
        };

        assert_eq!(
            attrs[0].result.as_ref().map(|(value, _)| value.clone()),
            Ok(AttrValue::utf8("Back online"))
        );
    });
}
