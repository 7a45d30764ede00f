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

//! Fans work across logical cores: pairs each RX port with its transmit
//! port, assigns one lcore per (port, queue), launches one pinned worker
//! thread per lcore, and runs the stats loop on the calling thread until
//! every worker has stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{LCoreContext, TimingProfile, BURST, MAX_RX_QUEUE_PER_PORT};
use crate::lcore;
use crate::mbuf::FramePool;
use crate::port::{LCoreId, NicPort, PortConfig, PortError, PortId};
use crate::send;
use crate::stats::{self, PacketCounters};
use crate::tx_buffer::TxBurstBuffer;

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("wrong usage: {0}")]
    Config(String),
    #[error("port initialization failed")]
    PortInit(#[from] PortError),
    #[error("wrong usage: not enough lcores")]
    NotEnoughLCores,
    #[error("failed to start lcore loops")]
    NoLCoreLoopsStarted,
}

#[derive(Clone, Copy, Debug)]
pub struct ForwarderConfig {
    pub req_rx_queue_count: u16,
    pub rx_port_number: Option<PortId>,
    pub timing: TimingProfile,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        ForwarderConfig {
            req_rx_queue_count: crate::config::DEF_RX_QUEUE_COUNT,
            rx_port_number: None,
            timing: TimingProfile::default(),
        }
    }
}

/// Toggle the lowest bit of `port_id`; fall back to `port_id` itself if
/// the flipped id isn't one of the ports the collaborator actually
/// brought up. Mirrors the original's `NEARBY_PORT` macro exactly,
/// including the self-fallback for an odd number of ports.
fn nearby_port(port_id: PortId, valid_ports: &[PortId]) -> PortId {
    let candidate = port_id ^ 1;
    if valid_ports.contains(&candidate) {
        candidate
    } else {
        port_id
    }
}

/// Bring up every port, pair RX ports with their transmit partner, assign
/// one lcore per (port, queue), and run every worker to completion.
/// `lcore_ids` stands in for `rte_get_next_lcore`'s iteration order over
/// worker lcores — the caller decides which logical cores are available.
/// Blocks until `is_running` clears and every worker has stopped, then
/// tears everything down and returns.
pub fn run_forwarder(
    port: Arc<dyn NicPort>,
    lcore_ids: &[LCoreId],
    pool: FramePool,
    config: ForwarderConfig,
    is_running: Arc<AtomicBool>,
) -> Result<(), ForwarderError> {
    if config.req_rx_queue_count == 0 || config.req_rx_queue_count > MAX_RX_QUEUE_PER_PORT {
        return Err(ForwarderError::Config(format!(
            "bad argument value (q): {}",
            config.req_rx_queue_count
        )));
    }

    if let Some(p) = config.rx_port_number {
        if !port.is_valid_port(p) {
            return Err(ForwarderError::Config(format!("bad argument value (p): {p}")));
        }
    }

    if lcore_ids.is_empty() {
        return Err(ForwarderError::NotEnoughLCores);
    }

    let port_configs = port.start_all(config.req_rx_queue_count)?;
    if port_configs.is_empty() {
        return Err(ForwarderError::PortInit(PortError::NoDevicesAvailable));
    }

    let valid_ports: Vec<PortId> = port_configs.iter().map(|c| c.port_id).collect();

    let rx_ports: Vec<&PortConfig> = match config.rx_port_number {
        Some(p) => port_configs.iter().filter(|c| c.port_id == p).collect(),
        None => port_configs.iter().collect(),
    };

    let mut lcore_iter = lcore_ids.iter().copied();
    let mut contexts: Vec<LCoreContext> = Vec::new();

    'assign: for rx in &rx_ports {
        let tx_port_id = nearby_port(rx.port_id, &valid_ports);
        for queue_id in 0..rx.rx_queue_count {
            let lcore_id = match lcore_iter.next() {
                Some(id) => id,
                None => {
                    tracing::warn!(
                        rx_port = rx.port_id,
                        queue_id,
                        "wrong usage: not enough lcores"
                    );
                    break 'assign;
                }
            };
            contexts.push(LCoreContext {
                lcore_id,
                rx_port_id: rx.port_id,
                tx_port_id,
                queue_id,
                counters: Some(Arc::new(PacketCounters::default())),
                timing: config.timing,
            });
        }
    }

    if contexts.is_empty() {
        port.stop_all();
        return Err(ForwarderError::NoLCoreLoopsStarted);
    }

    is_running.store(true, Ordering::Release);

    std::thread::scope(|scope| {
        for ctx in &contexts {
            let worker_port = Arc::clone(&port);
            let worker_pool = pool.clone();
            let worker_running = Arc::clone(&is_running);
            let tx_mac = port.macaddr_get(ctx.tx_port_id);

            let cb_ctx = ctx.clone();
            let cb_pool = pool.clone();
            let cb_port: Arc<dyn NicPort> = Arc::clone(&port);
            let on_error: crate::tx_buffer::ErrorCallback = Box::new(move |frames| {
                send::resend(cb_port.as_ref(), &cb_ctx, &cb_pool, frames);
            });
            let tx_buffer = TxBurstBuffer::new(BURST, Arc::clone(&port), ctx.tx_port_id, ctx.queue_id, on_error);

            scope.spawn(move || {
                lcore::run(worker_port.as_ref(), ctx, &worker_pool, tx_buffer, tx_mac, &worker_running);
            });
        }

        stats::run_stats_loop(port.as_ref(), &contexts, config.timing);
    });

    is_running.store(false, Ordering::Release);
    port.stop_all();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearby_port_toggles_low_bit() {
        assert_eq!(nearby_port(0, &[0, 1]), 1);
        assert_eq!(nearby_port(1, &[0, 1]), 0);
    }

    #[test]
    fn nearby_port_falls_back_to_self_without_a_partner() {
        assert_eq!(nearby_port(0, &[0]), 0);
        assert_eq!(nearby_port(2, &[2]), 2);
    }
}
