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

//! An in-memory `NicPort` implementation for tests: pre-staged RX queues,
//! a configurable TX acceptance cap (for backpressure/retry scenarios),
//! and a configurable `tx_prepare` acceptance cap (for prepare-failure
//! scenarios). No real hardware, no DPDK runtime.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::mbuf::{Frame, FramePool};
use crate::net::MacAddr;
use crate::port::{LCoreId, LCoreState, NicPort, PortConfig, PortError, PortId, QueueId};

struct SimState {
    rx_queues: HashMap<(PortId, QueueId), VecDeque<Vec<u8>>>,
    sent: HashMap<(PortId, QueueId), Vec<String>>,
    tx_accept_limit: usize,
    prepare_accept_limit: usize,
    lcore_states: HashMap<LCoreId, LCoreState>,
}

pub struct SimPort {
    pool: FramePool,
    valid_ports: Vec<PortId>,
    mac_addrs: HashMap<PortId, MacAddr>,
    state: Mutex<SimState>,
}

impl SimPort {
    pub fn new(pool: FramePool) -> Self {
        SimPort {
            pool,
            valid_ports: Vec::new(),
            mac_addrs: HashMap::new(),
            state: Mutex::new(SimState {
                rx_queues: HashMap::new(),
                sent: HashMap::new(),
                tx_accept_limit: usize::MAX,
                prepare_accept_limit: usize::MAX,
                lcore_states: HashMap::new(),
            }),
        }
    }

    /// Register a port as present on the simulated NIC, with the given
    /// MAC address as its own.
    pub fn with_port(mut self, port_id: PortId, mac: MacAddr) -> Self {
        self.valid_ports.push(port_id);
        self.mac_addrs.insert(port_id, mac);
        self
    }

    /// Queue a raw frame for a future `rx_burst` call on `(port, queue)`.
    pub fn stage_rx(&self, port: PortId, queue: QueueId, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .rx_queues
            .entry((port, queue))
            .or_default()
            .push_back(bytes);
    }

    /// Cap how many frames a single `tx_burst` call accepts, simulating
    /// NIC backpressure. Defaults to unbounded.
    pub fn set_tx_accept_limit(&self, limit: usize) {
        self.state.lock().unwrap().tx_accept_limit = limit;
    }

    /// Cap how many frames a single `tx_prepare` call passes, simulating
    /// checksum/segmentation preparation failures. Defaults to unbounded.
    pub fn set_prepare_accept_limit(&self, limit: usize) {
        self.state.lock().unwrap().prepare_accept_limit = limit;
    }

    /// Mark `lcore` as observed in the given state by the stats
    /// aggregator's polling. Unregistered lcores report `Running`.
    pub fn set_lcore_state(&self, lcore: LCoreId, lcore_state: LCoreState) {
        self.state.lock().unwrap().lcore_states.insert(lcore, lcore_state);
    }

    /// The metadata summaries of every frame accepted on `(port, queue)`
    /// so far, in transmit order.
    pub fn sent(&self, port: PortId, queue: QueueId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent
            .get(&(port, queue))
            .cloned()
            .unwrap_or_default()
    }

    pub fn sent_count(&self, port: PortId, queue: QueueId) -> usize {
        self.sent(port, queue).len()
    }
}

impl NicPort for SimPort {
    fn start_all(&self, req_rx_queue_count: u16) -> Result<Vec<PortConfig>, PortError> {
        if self.valid_ports.is_empty() {
            return Err(PortError::NoDevicesAvailable);
        }
        Ok(self
            .valid_ports
            .iter()
            .map(|&port_id| PortConfig {
                port_id,
                socket_id: 0,
                rx_queue_size: 1024,
                tx_queue_size: 1024,
                rx_queue_count: req_rx_queue_count,
                tx_queue_count: req_rx_queue_count,
            })
            .collect())
    }

    fn stop_all(&self) {}

    fn is_valid_port(&self, port: PortId) -> bool {
        self.valid_ports.contains(&port)
    }

    fn rx_burst(&self, port: PortId, queue: QueueId, pool: &FramePool, budget: usize) -> Vec<Frame> {
        let mut state = self.state.lock().unwrap();
        let staged = state.rx_queues.entry((port, queue)).or_default();
        let mut out = Vec::new();
        while out.len() < budget {
            match staged.pop_front() {
                Some(bytes) => out.push(pool.from_bytes(&bytes)),
                None => break,
            }
        }
        out
    }

    fn tx_burst(&self, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize {
        let mut state = self.state.lock().unwrap();
        let accept = state.tx_accept_limit.min(frames.len());
        let accepted: Vec<Frame> = frames.drain(..accept).collect();
        let log = state.sent.entry((port, queue)).or_default();
        for frame in &accepted {
            log.push(frame.summary());
        }
        for frame in accepted {
            self.pool.free(frame);
        }
        accept
    }

    fn tx_prepare(&self, _port: PortId, _queue: QueueId, frames: &mut Vec<Frame>) -> usize {
        self.state.lock().unwrap().prepare_accept_limit.min(frames.len())
    }

    fn macaddr_get(&self, port: PortId) -> Option<MacAddr> {
        self.mac_addrs.get(&port).copied()
    }

    fn lcore_state(&self, lcore: LCoreId) -> LCoreState {
        self.state
            .lock()
            .unwrap()
            .lcore_states
            .get(&lcore)
            .copied()
            .unwrap_or(LCoreState::Running)
    }

    /// Tests don't want to wait out real retry/poll delays.
    fn pause(&self) {}

    fn sleep(&self, _duration: std::time::Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbuf::DEFAULT_HEADROOM;

    #[test]
    fn stages_and_receives_frames() {
        let pool = FramePool::new(4, DEFAULT_HEADROOM);
        let sim = SimPort::new(pool.clone()).with_port(0, MacAddr::new([1, 2, 3, 4, 5, 6]));
        sim.stage_rx(0, 0, vec![0u8; 60]);
        sim.stage_rx(0, 0, vec![1u8; 60]);

        let burst = sim.rx_burst(0, 0, &pool, 32);
        assert_eq!(burst.len(), 2);
    }

    #[test]
    fn tx_accept_limit_enforces_backpressure() {
        let pool = FramePool::new(4, DEFAULT_HEADROOM);
        let sim = SimPort::new(pool.clone()).with_port(0, MacAddr::new([1, 2, 3, 4, 5, 6]));
        sim.set_tx_accept_limit(1);

        let mut frames = vec![pool.allocate(10), pool.allocate(10)];
        let accepted = sim.tx_burst(0, 0, &mut frames);

        assert_eq!(accepted, 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(sim.sent_count(0, 0), 1);
    }

    #[test]
    fn unregistered_port_is_invalid() {
        let pool = FramePool::new(1, DEFAULT_HEADROOM);
        let sim = SimPort::new(pool).with_port(0, MacAddr::ZERO);
        assert!(sim.is_valid_port(0));
        assert!(!sim.is_valid_port(1));
    }
}
