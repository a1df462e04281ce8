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
use embassy_time::{Duration, Timer};

use rs_matter_im::dm::DirtySet;
use rs_matter_im::im::{ConcretePath, GenericPath};

use crate::common::*;

#[test]
fn test_endpoint_toggling() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, true);

    add_light(&store, 2);
    store.disable_endpoint(2).unwrap();

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(
                subscribe_req(GenericPath::new(None, Some(ON_OFF_CLUSTER), None), 0, 60),
                None,
            )
            .unwrap();

        let (attrs, _) = primed(&mut sub).await;

        assert_eq!(attrs.len(), 1 + GLOBALS);
        assert!(attrs.iter().all(|attr| attr.path.endpoint == 1));

        store.enable_endpoint(2).unwrap();

        let attrs = next_report(&mut sub).await;

        assert_eq!(attrs.len(), 1 + GLOBALS);
        assert!(attrs
            .iter()
            .all(|attr| attr.path.endpoint == 2 && attr.result.is_ok()));

        // Nothing else changed
        match select(sub.next_event(), Timer::after(Duration::from_millis(500))).await {
            Either::First(event) => panic!("Unexpected event: {:?}", event),
            Either::Second(_) => (),
        }

        // A removed endpoint has nothing to report
        store.disable_endpoint(2).unwrap();
        assert!(next_report(&mut sub).await.is_empty());

        store.enable_endpoint(2).unwrap();

        let attrs = next_report(&mut sub).await;
        assert_eq!(attrs.len(), 1 + GLOBALS);
        assert!(attrs.iter().all(|attr| attr.path.endpoint == 2));
    });
}

#[test]
fn test_changes_outside_subscription_not_reported() {
    init_env_logger();

    let dirty = DirtySet::new();
    let store = store(&dirty, true);

    let (transport, client) = session();

    with_server(&store, &dirty, &transport, async {
        let mut sub = client
            .subscribe(
                subscribe_req(GenericPath::new(Some(0), None, None), 0, 60),
                None,
            )
            .unwrap();

        let (attrs, _) = primed(&mut sub).await;
        assert_eq!(attrs.len(), STRINGS.len() + 1 + GLOBALS);

        // Neither change intersects the subscription
        store
            .write(&ConcretePath::new(1, ON_OFF_CLUSTER, 0), true.into())
            .unwrap();
        store.disable_endpoint(1).unwrap();

        match select(sub.next_event(), Timer::after(Duration::from_millis(500))).await {
            Either::First(event) => panic!("Unexpected event: {:?}", event),
            Either::Second(_) => (),
        }
    });
}
