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

use core::num::Wrapping;

use rand_core::RngCore;

use crate::im::DataVersion;

/// The data version of one cluster instance.
///
/// Seeded randomly, so that a peer cannot mistake the versions of a rebooted
/// node for the ones it had cached, and bumped on every change of any
/// attribute of the cluster instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dataver(#[cfg_attr(feature = "defmt", defmt(Debug2Format))] Wrapping<u32>);

impl Dataver {
    pub fn new_rand<R: RngCore>(rand: &mut R) -> Self {
        Self::new(rand.next_u32())
    }

    pub const fn new(initial: DataVersion) -> Self {
        Self(Wrapping(initial))
    }

    pub fn get(&self) -> DataVersion {
        self.0 .0
    }

    pub fn changed(&mut self) -> DataVersion {
        self.0 += Wrapping(1);

        self.get()
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::rand::{dummy_rand, RandRngCore};

    use super::*;

    #[test]
    fn test_dataver_wraps() {
        let mut dataver = Dataver::new(u32::MAX);

        assert_eq!(dataver.changed(), 0);
        assert_eq!(dataver.changed(), 1);
    }

    #[test]
    fn test_dataver_rand() {
        let dataver = Dataver::new_rand(&mut RandRngCore(dummy_rand));

        // The dummy source yields 0, 1, 2, 3 ...
        assert_eq!(dataver.get(), 0x0302_0100);
    }
}
