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

//! The contract this engine requires from its NIC abstraction
//! collaborator (§6/§4.H of the design). Port probing, queue
//! configuration, mempool creation, link bring-up, promiscuous mode, and
//! descriptor-threshold tuning are all out of scope here — they live
//! behind `start_all`/`stop_all`, implemented by whoever backs this
//! trait. `sim::SimPort` is the in-memory implementation this crate
//! tests against; the `dpdk` feature's backend is the real one.

use std::time::Duration;

use crate::mbuf::{Frame, FramePool};
use crate::net::MacAddr;

pub type PortId = u16;
pub type QueueId = u16;
pub type LCoreId = usize;

/// Per physical port configuration, immutable once the collaborator has
/// brought ports up.
#[derive(Clone, Copy, Debug)]
pub struct PortConfig {
    pub port_id: PortId,
    pub socket_id: i32,
    pub rx_queue_size: u16,
    pub tx_queue_size: u16,
    pub rx_queue_count: u16,
    pub tx_queue_count: u16,
}

/// Whether a worker's thread is still executing its loop, as observed by
/// the collaborator. Used by the stats aggregator to know when to stop
/// polling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LCoreState {
    Running,
    Waiting,
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("no devices available")]
    NoDevicesAvailable,
    #[error("port {0} initialization failed: {1}")]
    InitFailed(PortId, String),
}

/// The NIC abstraction's contract, as spec.md §6 enumerates it.
pub trait NicPort: Send + Sync {
    /// Bring up every probed port in promiscuous mode with
    /// `req_rx_queue_count` receive (and matching transmit) queues each,
    /// clamped to the NIC's real capabilities. Returns the resulting
    /// per-port configuration.
    fn start_all(&self, req_rx_queue_count: u16) -> Result<Vec<PortConfig>, PortError>;

    /// Stop, close, and free every port and the shared pool.
    fn stop_all(&self);

    fn is_valid_port(&self, port: PortId) -> bool;

    /// Poll up to `budget` frames from `(port, queue)`.
    fn rx_burst(&self, port: PortId, queue: QueueId, pool: &FramePool, budget: usize) -> Vec<Frame>;

    /// Attempt to transmit every frame in `frames`, removing accepted
    /// ones from the front. Returns the accepted count.
    fn tx_burst(&self, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize;

    /// Run NIC-level preparation (checksum/segmentation fixups) over
    /// `frames`, returning how many of the leading frames passed.
    fn tx_prepare(&self, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize;

    /// The egress port's MAC address, or `None` if retrieval failed.
    fn macaddr_get(&self, port: PortId) -> Option<MacAddr>;

    /// Warm the cache line backing this frame's data. A no-op on backends
    /// without a meaningful prefetch instruction.
    fn prefetch(&self, _frame: &Frame) {}

    /// Yield the CPU briefly between retry attempts.
    fn pause(&self) {
        std::hint::spin_loop();
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Pin the calling OS thread to the logical core named by `lcore`.
    /// A no-op on backends (like `sim::SimPort`) that don't pin threads.
    fn pin_current_thread(&self, _lcore: LCoreId) {}

    /// Whether the collaborator still considers `lcore` to be running its
    /// assigned loop.
    fn lcore_state(&self, lcore: LCoreId) -> LCoreState;
}
