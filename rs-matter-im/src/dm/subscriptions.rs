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

use embassy_sync::blocking_mutex::raw::{NoopRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};

use crate::im::SubscriptionId;
use crate::utils::notification::Notification;

/// The maximum number of subscriptions that can be tracked at the same time by default.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 15;

/// The number of consecutive failures to send a scheduled report after which
/// the subscription is torn down.
pub const MAX_REPORT_SEND_FAILURES: u8 = 3;

/// A type alias for `Subscriptions` with the default maximum number of subscriptions.
pub type DefaultSubscriptions = Subscriptions<DEFAULT_MAX_SUBSCRIPTIONS>;

/// The identity of a subscription, as returned by the lookup methods of `Subscriptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionKey {
    pub session_id: u32,
    pub id: SubscriptionId,
}

struct Subscription {
    session_id: u32,
    id: SubscriptionId,
    // We use u16 instead of embassy::Duration to save some storage
    min_int_secs: u16,
    // Ditto
    max_int_secs: u16,
    // `None` until the priming report is confirmed
    reported_at: Option<Instant>,
    failures: u8,
}

impl Subscription {
    fn report_due(&self, now: Instant, changed: bool) -> bool {
        // Either the data for the subscription had changed and therefore we need to report,
        // or the data for the subscription had not changed yet, however the report interval is due
        changed && self.expired(self.min_int_secs, now)
            || self.expired(self.keep_alive_secs(), now)
    }

    // At least a second between keep-alive reports
    fn keep_alive_secs(&self) -> u16 {
        self.min_int_secs.max(self.max_int_secs / 2).max(1)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expired(self.max_int_secs, now)
    }

    fn expired(&self, secs: u16, now: Instant) -> bool {
        self.deadline(secs)
            .map(|expiry| expiry <= now)
            .unwrap_or(false)
    }

    fn deadline(&self, secs: u16) -> Option<Instant> {
        self.reported_at
            .and_then(|reported_at| reported_at.checked_add(Duration::from_secs(secs as _)))
    }

    fn next_due(&self, changed: bool) -> Option<Instant> {
        if changed {
            self.deadline(self.min_int_secs)
        } else {
            self.deadline(self.keep_alive_secs())
        }
    }

    fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            session_id: self.session_id,
            id: self.id,
        }
    }
}

struct SubscriptionsInner<const N: usize> {
    next_subscription_id: SubscriptionId,
    subscriptions: heapless::Vec<Subscription, N>,
}

impl<const N: usize> SubscriptionsInner<N> {
    /// Create the instance.
    #[inline(always)]
    const fn new() -> Self {
        Self {
            next_subscription_id: 1,
            subscriptions: heapless::Vec::new(),
        }
    }
}

/// A utility for tracking subscriptions accepted by the data model.
///
/// The `N` type parameter specifies the maximum number of subscriptions that can be tracked at the same time.
/// Additional subscriptions are rejected by the data model with a "resource exhausted" IM status message.
///
/// The registry only does the interval bookkeeping; which paths a subscription
/// is interested in, and which of them had changed, is tracked by the `DirtySet`.
pub struct Subscriptions<const N: usize = DEFAULT_MAX_SUBSCRIPTIONS, M = NoopRawMutex>
where
    M: RawMutex,
{
    state: Mutex<M, RefCell<SubscriptionsInner<N>>>,
    notification: Notification<M>,
}

impl<const N: usize, M> Subscriptions<N, M>
where
    M: RawMutex,
{
    /// Create the instance.
    #[inline(always)]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(SubscriptionsInner::new())),
            notification: Notification::new(),
        }
    }

    /// Notify the reporting loop that the schedule of the subscriptions had changed
    /// and that it should re-evaluate when the next report is due.
    pub fn notify_changed(&self) {
        self.notification.notify();
    }

    /// Wait until `notify_changed` is called.
    pub async fn wait_changed(&self) {
        self.notification.wait().await
    }

    /// Register a new subscription, returning its ID,
    /// or `None` if there is no room for it.
    pub fn add(&self, session_id: u32, min_int_secs: u16, max_int_secs: u16) -> Option<SubscriptionId> {
        self.state.lock(|internal| {
            let mut state = internal.borrow_mut();
            let id = state.next_subscription_id;
            state.next_subscription_id = state.next_subscription_id.wrapping_add(1).max(1);

            state
                .subscriptions
                .push(Subscription {
                    session_id,
                    id,
                    min_int_secs,
                    max_int_secs,
                    reported_at: None,
                    failures: 0,
                })
                .map(|_| id)
                .ok()
        })
    }

    /// Mark the subscription with the given ID as reported.
    ///
    /// Will return `false` if the subscription with the given ID does no longer exist, as it might be
    /// removed by a concurrent transaction while being reported on.
    pub fn mark_reported(&self, id: SubscriptionId, now: Instant) -> bool {
        self.state.lock(|internal| {
            let subscriptions = &mut internal.borrow_mut().subscriptions;

            if let Some(sub) = subscriptions.iter_mut().find(|sub| sub.id == id) {
                sub.reported_at = Some(now);
                sub.failures = 0;

                true
            } else {
                false
            }
        })
    }

    /// Record a failure to send a scheduled report.
    ///
    /// Return `true` if the subscription had failed too many times in a row and should be torn down.
    pub fn mark_failed(&self, id: SubscriptionId) -> bool {
        self.state.lock(|internal| {
            let subscriptions = &mut internal.borrow_mut().subscriptions;

            subscriptions
                .iter_mut()
                .find(|sub| sub.id == id)
                .map(|sub| {
                    sub.failures = sub.failures.saturating_add(1);
                    sub.failures >= MAX_REPORT_SEND_FAILURES
                })
                .unwrap_or(false)
        })
    }

    /// Remove all subscriptions matching the given session and/or ID.
    pub fn remove(&self, session_id: Option<u32>, id: Option<SubscriptionId>) {
        self.state.lock(|internal| {
            let subscriptions = &mut internal.borrow_mut().subscriptions;
            while let Some(index) = subscriptions.iter().position(|sub| {
                sub.session_id == session_id.unwrap_or(sub.session_id)
                    && sub.id == id.unwrap_or(sub.id)
            }) {
                subscriptions.swap_remove(index);
            }
        })
    }

    /// The IDs of all subscriptions of a session.
    pub fn ids(&self, session_id: u32) -> heapless::Vec<SubscriptionId, N> {
        self.state.lock(|internal| {
            internal
                .borrow()
                .subscriptions
                .iter()
                .filter(|sub| sub.session_id == session_id)
                .map(|sub| sub.id)
                .collect()
        })
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.state
            .lock(|internal| internal.borrow().subscriptions.iter().any(|sub| sub.id == id))
    }

    pub fn find_expired(&self, now: Instant) -> Option<SubscriptionKey> {
        self.state.lock(|internal| {
            internal
                .borrow()
                .subscriptions
                .iter()
                .find_map(|sub| sub.is_expired(now).then(|| sub.key()))
        })
    }

    /// Note that this method has a side effect:
    /// it updates the `reported_at` field of the subscription that is returned.
    ///
    /// Only the subscriptions of session `session_id` are considered;
    /// `changed` tells if a subscription has changes pending.
    pub fn find_report_due<F>(
        &self,
        session_id: u32,
        now: Instant,
        changed: F,
    ) -> Option<SubscriptionKey>
    where
        F: Fn(SubscriptionId) -> bool,
    {
        self.state.lock(|internal| {
            internal
                .borrow_mut()
                .subscriptions
                .iter_mut()
                .filter(|sub| sub.session_id == session_id)
                .find(|sub| sub.report_due(now, changed(sub.id)))
                .map(|sub| {
                    sub.reported_at = Some(now);
                    sub.key()
                })
        })
    }

    /// The earliest instant at which a report of a subscription of session
    /// `session_id` might become due.
    pub fn next_due<F>(&self, session_id: u32, changed: F) -> Option<Instant>
    where
        F: Fn(SubscriptionId) -> bool,
    {
        self.state.lock(|internal| {
            internal
                .borrow()
                .subscriptions
                .iter()
                .filter(|sub| sub.session_id == session_id)
                .filter_map(|sub| sub.next_due(changed(sub.id)))
                .min()
        })
    }
}

impl<const N: usize, M> Default for Subscriptions<N, M>
where
    M: RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}
