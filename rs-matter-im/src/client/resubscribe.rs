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

use rand_core::RngCore;

use crate::utils::rand::{Rand, RandRngCore};

/// The wait before the first resubscription attempt, by default.
pub const DEFAULT_RESUBSCRIBE_MIN_WAIT_MS: u64 = 1000;

/// The upper bound of the wait between resubscription attempts, by default.
pub const DEFAULT_RESUBSCRIBE_MAX_WAIT_MS: u64 = 60 * 60 * 1000;

/// The upper bound of the random extension of the waits, in percent, by default.
pub const DEFAULT_RESUBSCRIBE_MAX_JITTER_PERCENT: u8 = 25;

/// How the waits between resubscription attempts grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubscribePolicy {
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub max_jitter_percent: u8,
}

impl ResubscribePolicy {
    pub const fn new() -> Self {
        Self {
            min_wait: Duration::from_millis(DEFAULT_RESUBSCRIBE_MIN_WAIT_MS),
            max_wait: Duration::from_millis(DEFAULT_RESUBSCRIBE_MAX_WAIT_MS),
            max_jitter_percent: DEFAULT_RESUBSCRIBE_MAX_JITTER_PERCENT,
        }
    }
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the waits between the attempts to re-establish a lost subscription.
///
/// The wait doubles with every failed attempt, is extended by a jitter drawn
/// once per `Resubscriber` and is capped at `ResubscribePolicy::max_wait`,
/// so the sequence of waits never decreases until `reset` is called.
#[derive(Debug, Clone)]
pub struct Resubscriber {
    policy: ResubscribePolicy,
    jitter_permille: u64,
    attempts: u32,
}

impl Resubscriber {
    pub fn new(policy: ResubscribePolicy, rand: Rand) -> Self {
        let max_jitter_permille = policy.max_jitter_percent.min(100) as u64 * 10;
        let jitter_permille = RandRngCore(rand).next_u64() % (max_jitter_permille + 1);

        Self {
            policy,
            jitter_permille,
            attempts: 0,
        }
    }

    /// The number of attempts since the last `reset`.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Account for a new attempt, returning its number (starting from 1)
    /// and how long to wait before it.
    pub fn next_delay(&mut self) -> (u32, Duration) {
        let base = self
            .policy
            .min_wait
            .as_millis()
            .saturating_mul(2u64.saturating_pow(self.attempts));
        let jittered = base.saturating_add(base.saturating_mul(self.jitter_permille) / 1000);
        let delay = jittered.min(self.policy.max_wait.as_millis());

        self.attempts = self.attempts.saturating_add(1);

        (self.attempts, Duration::from_millis(delay))
    }

    /// Start over from the minimum wait, after a subscription was re-established.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
