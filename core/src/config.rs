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

//! Per-lcore configuration and the retry/sleep timing constants, gathered
//! here instead of process-wide globals (per DESIGN.md's "process-wide
//! state" note).

use std::sync::Arc;
use std::time::Duration;

use crate::port::{LCoreId, PortId, QueueId};
use crate::stats::PacketCounters;

pub const BURST: usize = 32;
pub const PREFETCH_OFFSET: usize = 3;
pub const DEF_RX_QUEUE_COUNT: u16 = 3;
pub const MAX_RX_QUEUE_PER_PORT: u16 = 16;

/// Retry/sleep constants for the send engine and loop delays, selectable
/// at runtime so tests can exercise the slow-motion retry path without a
/// separate build (the original picks these via a `SLOW_MOTION` compile
/// flag).
#[derive(Clone, Copy, Debug)]
pub struct TimingProfile {
    pub max_send_retries: u8,
    pub tx_retry_sleep: Option<Duration>,
    pub rx_delay: Duration,
    pub poll_delay: Duration,
}

impl TimingProfile {
    pub const fn fast() -> Self {
        TimingProfile {
            max_send_retries: 3,
            tx_retry_sleep: None,
            rx_delay: Duration::from_secs(1),
            poll_delay: Duration::from_secs(2),
        }
    }

    pub const fn slow_motion() -> Self {
        TimingProfile {
            max_send_retries: 10,
            tx_retry_sleep: Some(Duration::from_millis(10)),
            rx_delay: Duration::from_secs(2),
            poll_delay: Duration::from_secs(3),
        }
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        TimingProfile::fast()
    }
}

/// Immutable, per-lcore identity and the shared counter cell the owning
/// worker writes to and the stats aggregator reads from. Cheaply
/// cloneable (the counters are an `Arc`, everything else is `Copy`) so
/// the orchestrator can hand an owned copy to a TX buffer's error
/// callback alongside the borrowed original each worker thread runs.
///
/// `counters` is optional, matching spec.md §3's "the block is
/// optional: a null pointer means no metering, and all counter updates
/// become no-ops" — see `LCoreContext::record` and
/// `stats::run_stats_loop`.
#[derive(Clone)]
pub struct LCoreContext {
    pub lcore_id: LCoreId,
    pub rx_port_id: PortId,
    pub tx_port_id: PortId,
    pub queue_id: QueueId,
    pub counters: Option<Arc<PacketCounters>>,
    pub timing: TimingProfile,
}

impl LCoreContext {
    /// Run `f` against the counter cell if one is present; otherwise log
    /// a warning and skip, per spec.md's "null counter block" contract.
    pub fn record(&self, f: impl FnOnce(&PacketCounters)) {
        match &self.counters {
            Some(counters) => f(counters),
            None => tracing::warn!(lcore = self.lcore_id, "no metering: counter block missing"),
        }
    }
}
