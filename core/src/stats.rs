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

//! Per-lcore packet counters: a cell of atomics the owning worker
//! increments and the stats aggregator reads. Unlike the original's
//! `#ifndef NDEBUG`-gated fields, the op counters are always present on
//! the struct itself — the cost is negligible and it keeps the snapshot
//! shape stable across builds. The *block as a whole* is still
//! optional: `LCoreContext.counters` is an `Option<Arc<PacketCounters>>`
//! and a missing one is a `warn!`-and-skip no-op everywhere it's
//! touched, per spec.md's "null counter pointer" contract.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{LCoreContext, TimingProfile};
use crate::port::{LCoreState, NicPort};

#[derive(Default)]
pub struct PacketCounters {
    pub rx_packet_count: AtomicU64,
    pub tx_packet_count: AtomicU64,
    pub drp_packet_count: AtomicU64,
    pub proc_error_count: AtomicU64,
    pub rx_ops: AtomicU64,
    pub tx_ops: AtomicU64,
    pub retx_ops: AtomicU64,
}

/// A plain, non-atomic snapshot used for aggregation and reporting.
#[derive(Default, Debug, Clone, Copy)]
pub struct CounterSnapshot {
    pub rx_packet_count: u64,
    pub tx_packet_count: u64,
    pub drp_packet_count: u64,
    pub proc_error_count: u64,
    pub rx_ops: u64,
    pub tx_ops: u64,
    pub retx_ops: u64,
}

impl PacketCounters {
    pub fn add_rx(&self, n: u64) {
        self.rx_ops.fetch_add(1, Ordering::SeqCst);
        self.rx_packet_count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn add_tx(&self, n: u64) {
        self.tx_ops.fetch_add(1, Ordering::SeqCst);
        self.tx_packet_count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn add_retx(&self, n: u64) {
        self.retx_ops.fetch_add(1, Ordering::SeqCst);
        self.tx_packet_count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn add_dropped(&self, n: u64) {
        self.drp_packet_count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn add_proc_error(&self, n: u64) {
        self.proc_error_count.fetch_add(n, Ordering::SeqCst);
    }

    /// Record a TX-buffer flush that happened outside of `try_send`'s
    /// accounting (e.g. the final drain on shutdown).
    pub fn add_flush(&self, n: u64) {
        if n > 0 {
            self.tx_ops.fetch_add(1, Ordering::SeqCst);
            self.tx_packet_count.fetch_add(n, Ordering::SeqCst);
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            rx_packet_count: self.rx_packet_count.load(Ordering::SeqCst),
            tx_packet_count: self.tx_packet_count.load(Ordering::SeqCst),
            drp_packet_count: self.drp_packet_count.load(Ordering::SeqCst),
            proc_error_count: self.proc_error_count.load(Ordering::SeqCst),
            rx_ops: self.rx_ops.load(Ordering::SeqCst),
            tx_ops: self.tx_ops.load(Ordering::SeqCst),
            retx_ops: self.retx_ops.load(Ordering::SeqCst),
        }
    }
}

impl CounterSnapshot {
    pub fn add(&mut self, other: &CounterSnapshot) {
        self.rx_packet_count += other.rx_packet_count;
        self.tx_packet_count += other.tx_packet_count;
        self.drp_packet_count += other.drp_packet_count;
        self.proc_error_count += other.proc_error_count;
        self.rx_ops += other.rx_ops;
        self.tx_ops += other.tx_ops;
        self.retx_ops += other.retx_ops;
    }
}

/// Poll every lcore's counters on `timing.poll_delay`, print the
/// four-line summary (plus three debug-level op-count lines), and keep
/// going until every registered lcore reports non-`Running`. Returns the
/// final aggregate for callers (mainly tests) that want to assert on it.
///
/// Unlike the original, this only walks the lcores this forwarder
/// actually started — there is no DPDK-wide lcore registry here to
/// report stray idle cores against, so the "lcore is idle" warning for
/// lcores beyond what was launched has no counterpart. A lcore with a
/// null counter block (`LCoreContext.counters == None`) logs a warning
/// and is skipped, per spec.md's "null counter pointer" contract.
pub fn run_stats_loop(port: &dyn NicPort, contexts: &[LCoreContext], timing: TimingProfile) -> CounterSnapshot {
    loop {
        port.sleep(timing.poll_delay);

        let mut total = CounterSnapshot::default();
        let mut running_count = 0usize;

        for ctx in contexts {
            let state = port.lcore_state(ctx.lcore_id);
            tracing::debug!(lcore = ctx.lcore_id, state = ?state, "lcore state");
            if state == LCoreState::Running {
                running_count += 1;
            }
            match &ctx.counters {
                Some(counters) => total.add(&counters.snapshot()),
                None => tracing::warn!(lcore = ctx.lcore_id, "no metering: counter block missing, skipping"),
            }
        }

        println!(
            "RX packets: {}\nTX packets: {}\nDropped packets: {}\nProcessing errors: {}",
            total.rx_packet_count, total.tx_packet_count, total.drp_packet_count, total.proc_error_count
        );
        tracing::debug!(
            rx_ops = total.rx_ops,
            tx_ops = total.tx_ops,
            retx_ops = total.retx_ops,
            "op counters"
        );

        if running_count == 0 {
            return total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let counters = PacketCounters::default();
        counters.add_rx(32);
        counters.add_tx(30);
        counters.add_dropped(1);
        counters.add_proc_error(1);

        let snap = counters.snapshot();
        assert_eq!(snap.rx_packet_count, 32);
        assert_eq!(snap.tx_packet_count, 30);
        assert_eq!(snap.drp_packet_count, 1);
        assert_eq!(snap.proc_error_count, 1);
        assert!(snap.rx_packet_count >= snap.tx_packet_count + snap.drp_packet_count + snap.proc_error_count);
    }

    #[test]
    fn stats_loop_terminates_once_every_lcore_stops() {
        use crate::mbuf::FramePool;
        use crate::net::MacAddr;
        use crate::sim::SimPort;
        use std::sync::Arc;

        let pool = FramePool::new(1, crate::mbuf::DEFAULT_HEADROOM);
        let sim = SimPort::new(pool).with_port(0, MacAddr::new([1, 2, 3, 4, 5, 6]));
        sim.set_lcore_state(1, LCoreState::Waiting);

        let ctx = LCoreContext {
            lcore_id: 1,
            rx_port_id: 0,
            tx_port_id: 0,
            queue_id: 0,
            counters: Some(Arc::new(PacketCounters::default())),
            timing: TimingProfile::fast(),
        };
        ctx.record(|c| c.add_rx(5));

        let total = run_stats_loop(&sim, std::slice::from_ref(&ctx), TimingProfile::fast());
        assert_eq!(total.rx_packet_count, 5);
    }
}
