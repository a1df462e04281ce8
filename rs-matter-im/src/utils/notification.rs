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

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

/// A notification primitive that allows for notifying a single waiter.
///
/// Notifications sent while nobody waits are coalesced into one.
pub struct Notification<M>(Signal<M, ()>)
where
    M: RawMutex;

impl<M> Notification<M>
where
    M: RawMutex,
{
    /// Create a new `Notification`.
    pub const fn new() -> Self {
        Self(Signal::new())
    }

    /// Notify the waiter.
    pub fn notify(&self) {
        self.0.signal(());
    }

    /// Return `true` if a notification is pending and clear it.
    pub fn try_take(&self) -> bool {
        self.0.try_take().is_some()
    }

    /// Wait for the notification.
    pub async fn wait(&self) {
        self.0.wait().await;
    }
}

impl<M> Default for Notification<M>
where
    M: RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}
