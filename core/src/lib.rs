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

//! A userspace, run-to-completion L2 packet forwarder: receive a burst
//! from a port/queue pair, strip its Ethernet (and any VLAN) header,
//! drop anything that isn't IPv4/IPv6, rewrite a fresh Ethernet header
//! with a pseudo-random destination and the egress port's own MAC as
//! source, and transmit — one pinned worker thread per logical core, fed
//! by a NIC abstraction this crate only consumes as a trait (`NicPort`),
//! never implements against real hardware except behind the `dpdk`
//! feature.
//!
//! The `sim` module backs the entire test suite; `dpdk_backend` is a
//! thin, not-unit-tested adapter over `l2xfwd-ffi`'s raw bindings,
//! compiled in only with `--features dpdk`.

pub mod config;
pub mod dump;
pub mod header;
pub mod lcore;
pub mod mbuf;
pub mod net;
pub mod orchestrator;
pub mod port;
pub mod send;
pub mod sim;
pub mod stats;
pub mod tx_buffer;

#[cfg(feature = "dpdk")]
pub mod dpdk_backend;
