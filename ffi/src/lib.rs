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

//! Raw, unsafe DPDK bindings generated by `build.rs` plus the small shim
//! for functions DPDK only exposes as `static inline`. Nothing in this
//! crate is meant to be used directly outside of `l2xfwd-core`'s `dpdk`
//! feature; it has no opinion about safety, ownership, or error handling.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]
#![allow(dead_code)]

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

extern "C" {
    pub fn l2xfwd_eth_rx_burst(
        port_id: u16,
        queue_id: u16,
        rx_pkts: *mut *mut rte_mbuf,
        nb_pkts: u16,
    ) -> u16;

    pub fn l2xfwd_eth_tx_burst(
        port_id: u16,
        queue_id: u16,
        tx_pkts: *mut *mut rte_mbuf,
        nb_pkts: u16,
    ) -> u16;

    pub fn l2xfwd_pktmbuf_free(m: *mut rte_mbuf);

    pub fn l2xfwd_pktmbuf_adj(m: *mut rte_mbuf, len: u16) -> *mut libc::c_char;

    pub fn l2xfwd_pktmbuf_prepend(m: *mut rte_mbuf, len: u16) -> *mut libc::c_char;
}
