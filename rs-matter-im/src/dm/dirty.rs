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

use core::cell::RefCell;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::{NoopRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;

use log::trace;

use crate::im::{ConcretePath, GenericPath, SubscriptionId};
use crate::utils::notification::Notification;

use super::store::ChangeNotify;

/// A path which had changed since it was last reported, stamped with the
/// generation of its latest change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyEntry {
    pub path: GenericPath,
    generation: u64,
}

impl DirtyEntry {
    pub fn covers(&self, path: &ConcretePath) -> bool {
        self.path.covers(path)
    }
}

struct Subscriber {
    paths: Vec<GenericPath>,
    dirty: Vec<DirtyEntry>,
}

impl Subscriber {
    fn interested(&self, path: &GenericPath) -> bool {
        self.paths.iter().any(|requested| overlaps(requested, path))
    }
}

struct DirtySetInner {
    generation: u64,
    subscribers: BTreeMap<SubscriptionId, Subscriber>,
}

/// The paths changed since they were last reported, tracked per subscription.
///
/// Changes are recorded for a subscription only if they overlap with one of the
/// paths it had requested. A change to a path already recorded only refreshes
/// its generation, so that clearing a snapshot taken before the refresh keeps
/// the path dirty for the next report.
pub struct DirtySet<M = NoopRawMutex>
where
    M: RawMutex,
{
    state: Mutex<M, RefCell<DirtySetInner>>,
    notification: Notification<M>,
}

impl<M> DirtySet<M>
where
    M: RawMutex,
{
    /// Create the instance.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(DirtySetInner {
                generation: 0,
                subscribers: BTreeMap::new(),
            })),
            notification: Notification::new(),
        }
    }

    /// Start tracking changes for a subscription, restricted to the paths it requested.
    pub fn register(&self, id: SubscriptionId, paths: Vec<GenericPath>) {
        self.state.lock(|state| {
            state.borrow_mut().subscribers.insert(
                id,
                Subscriber {
                    paths,
                    dirty: Vec::new(),
                },
            );
        });
    }

    pub fn unregister(&self, id: SubscriptionId) {
        self.state.lock(|state| {
            state.borrow_mut().subscribers.remove(&id);
        });
    }

    /// Record a change of `path` and wake up the reporting loop.
    pub fn mark(&self, path: &GenericPath) {
        let marked = self.state.lock(|state| {
            let mut state = state.borrow_mut();

            state.generation += 1;
            let generation = state.generation;

            let mut marked = false;

            for subscriber in state.subscribers.values_mut() {
                if !subscriber.interested(path) {
                    continue;
                }

                if let Some(entry) = subscriber.dirty.iter_mut().find(|entry| entry.path == *path) {
                    entry.generation = generation;
                } else {
                    subscriber.dirty.push(DirtyEntry {
                        path: path.clone(),
                        generation,
                    });
                }

                marked = true;
            }

            marked
        });

        if marked {
            trace!("Path {:?} marked dirty", path);
            self.notification.notify();
        }
    }

    /// The paths currently dirty for a subscription.
    pub fn snapshot(&self, id: SubscriptionId) -> Vec<DirtyEntry> {
        self.state.lock(|state| {
            state
                .borrow()
                .subscribers
                .get(&id)
                .map(|subscriber| subscriber.dirty.clone())
                .unwrap_or_default()
        })
    }

    /// Clear entries of a snapshot once they had been reported.
    ///
    /// Entries changed again after the snapshot was taken stay dirty.
    pub fn clear<'e>(&self, id: SubscriptionId, entries: impl IntoIterator<Item = &'e DirtyEntry>) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();

            let Some(subscriber) = state.subscribers.get_mut(&id) else {
                return;
            };

            for entry in entries {
                subscriber.dirty.retain(|dirty| dirty != entry);
            }
        });
    }

    pub fn is_dirty(&self, id: SubscriptionId) -> bool {
        self.state.lock(|state| {
            state
                .borrow()
                .subscribers
                .get(&id)
                .map(|subscriber| !subscriber.dirty.is_empty())
                .unwrap_or(false)
        })
    }

    /// Wait until a change is recorded for any subscription.
    pub async fn wait_changed(&self) {
        self.notification.wait().await
    }
}

impl<M> Default for DirtySet<M>
where
    M: RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ChangeNotify for DirtySet<M>
where
    M: RawMutex,
{
    fn notify(&self, path: &GenericPath) {
        self.mark(path);
    }
}

/// Whether two (possibly wildcard) paths can expand to a common concrete path.
fn overlaps(a: &GenericPath, b: &GenericPath) -> bool {
    fn part<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    part(a.endpoint, b.endpoint) && part(a.cluster, b.cluster) && part(a.leaf, b.leaf)
}
