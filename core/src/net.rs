/*
* Copyright 2019 Comcast Cable Communications Management, LLC
*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
* http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific language governing permissions and
* limitations under the License.
*
* SPDX-License-Identifier: Apache-2.0
*/

//! A minimal 48-bit MAC address type, independent of any particular NIC
//! abstraction.

use rand::Rng;
use std::fmt;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn new(bytes: [u8; 6]) -> Self {
        MacAddr(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// A valid "assignable" address: not all-zero, not the broadcast
    /// address, and the multicast bit (lowest bit of the first octet)
    /// clear. Mirrors `rte_is_valid_assigned_ether_addr`.
    pub fn is_valid_assigned(&self) -> bool {
        *self != MacAddr::ZERO && *self != MacAddr::BROADCAST && self.0[0] & 0x01 == 0
    }

    /// Generate a random address with the locally-administered bit set
    /// and the multicast bit clear, matching `rte_eth_random_addr`.
    pub fn random(rng: &mut impl rand::RngCore) -> Self {
        let mut bytes: [u8; 6] = rng.gen();
        bytes[0] = (bytes[0] & 0xfe) | 0x02;
        MacAddr(bytes)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let mac = MacAddr::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!("00:11:22:33:44:55", mac.to_string());
    }

    #[test]
    fn multicast_bit_makes_address_invalid() {
        assert!(!MacAddr::new([0x01, 0, 0, 0, 0, 0]).is_valid_assigned());
        assert!(MacAddr::new([0x00, 0, 0, 0, 0, 0]).is_valid_assigned());
    }
}
