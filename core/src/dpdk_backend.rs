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

//! The real `NicPort`, built on `l2xfwd-ffi`'s raw DPDK bindings. Not
//! exercised by this crate's test suite — it needs a DPDK-capable NIC,
//! hugepages, and an EAL-initialized process, none of which a unit test
//! can provide. Present so the crate is a working forwarder and not only
//! a simulation harness.
//!
//! `Frame` is a pool-owned `Vec<u8>`, not a raw `rte_mbuf` pointer, so
//! this adapter trades DPDK's zero-copy mbuf handling for a copy at each
//! RX/TX boundary in exchange for one `Frame` type shared with `sim`.
//! `rx_burst` copies out of the mbuf and frees it immediately; `tx_burst`
//! allocates a fresh mbuf per frame, copies in, and returns to the pool
//! only the frames the NIC actually accepted — the rest are left in the
//! caller's `frames` Vec per the `NicPort` contract.

use std::ffi::c_void;
use std::time::Duration;

use l2xfwd_ffi as ffi;

use crate::mbuf::{Frame, FramePool};
use crate::net::MacAddr;
use crate::port::{LCoreId, LCoreState, NicPort, PortConfig, PortError, PortId, QueueId};

const MBUF_POOL_CACHE_SIZE: u32 = 256;
const MBUF_DATA_ROOM_SIZE: u16 = 2048 + ffi::RTE_PKTMBUF_HEADROOM as u16;

/// Owns the shared mbuf mempool and the set of ports this process probed
/// at EAL init. Built once in `main` behind the `dpdk` feature.
pub struct DpdkPort {
    mempool: *mut ffi::rte_mempool,
    probed_ports: Vec<PortId>,
    pool: FramePool,
}

// The mempool pointer is a handle into DPDK's own hugepage-backed shared
// memory; DPDK's mempool API is internally synchronized for the
// multi-producer/multi-consumer access pattern this engine uses it for.
unsafe impl Send for DpdkPort {}
unsafe impl Sync for DpdkPort {}

impl DpdkPort {
    /// Wrap the ports EAL probed during `rte_eal_init`, creating a shared
    /// mbuf pool sized for `mbuf_count` buffers. Must run after
    /// `rte_eal_init` has returned successfully.
    pub fn new(probed_ports: Vec<PortId>, pool: FramePool, mbuf_count: u32) -> Result<Self, PortError> {
        let name = std::ffi::CString::new("l2xfwd_mbuf_pool").unwrap();
        let mempool = unsafe {
            ffi::rte_pktmbuf_pool_create(
                name.as_ptr(),
                mbuf_count,
                MBUF_POOL_CACHE_SIZE,
                0,
                MBUF_DATA_ROOM_SIZE,
                ffi::rte_socket_id() as i32,
            )
        };
        if mempool.is_null() {
            return Err(PortError::InitFailed(0, "failed to create mbuf pool".to_string()));
        }
        Ok(DpdkPort { mempool, probed_ports, pool })
    }
}

impl NicPort for DpdkPort {
    fn start_all(&self, req_rx_queue_count: u16) -> Result<Vec<PortConfig>, PortError> {
        if self.probed_ports.is_empty() {
            return Err(PortError::NoDevicesAvailable);
        }

        let mut configs = Vec::with_capacity(self.probed_ports.len());
        for &port_id in &self.probed_ports {
            let eth_conf: ffi::rte_eth_conf = unsafe { std::mem::zeroed() };
            let rx_queue_count = req_rx_queue_count;
            let tx_queue_count = req_rx_queue_count;

            let ret = unsafe {
                ffi::rte_eth_dev_configure(port_id, rx_queue_count, tx_queue_count, &eth_conf)
            };
            if ret != 0 {
                return Err(PortError::InitFailed(port_id, format!("rte_eth_dev_configure: {ret}")));
            }

            for queue in 0..rx_queue_count {
                let ret = unsafe {
                    ffi::rte_eth_rx_queue_setup(
                        port_id,
                        queue,
                        1024,
                        ffi::rte_eth_dev_socket_id(port_id) as u32,
                        std::ptr::null(),
                        self.mempool,
                    )
                };
                if ret != 0 {
                    return Err(PortError::InitFailed(port_id, format!("rte_eth_rx_queue_setup: {ret}")));
                }
            }

            for queue in 0..tx_queue_count {
                let ret = unsafe {
                    ffi::rte_eth_tx_queue_setup(
                        port_id,
                        queue,
                        1024,
                        ffi::rte_eth_dev_socket_id(port_id) as u32,
                        std::ptr::null(),
                    )
                };
                if ret != 0 {
                    return Err(PortError::InitFailed(port_id, format!("rte_eth_tx_queue_setup: {ret}")));
                }
            }

            let ret = unsafe { ffi::rte_eth_dev_start(port_id) };
            if ret != 0 {
                return Err(PortError::InitFailed(port_id, format!("rte_eth_dev_start: {ret}")));
            }
            unsafe { ffi::rte_eth_promiscuous_enable(port_id) };

            configs.push(PortConfig {
                port_id,
                socket_id: unsafe { ffi::rte_eth_dev_socket_id(port_id) },
                rx_queue_size: 1024,
                tx_queue_size: 1024,
                rx_queue_count,
                tx_queue_count,
            });
        }

        Ok(configs)
    }

    fn stop_all(&self) {
        for &port_id in &self.probed_ports {
            unsafe {
                ffi::rte_eth_dev_stop(port_id);
                ffi::rte_eth_dev_close(port_id);
            }
        }
    }

    fn is_valid_port(&self, port: PortId) -> bool {
        unsafe { ffi::rte_eth_dev_is_valid_port(port) != 0 }
    }

    fn rx_burst(&self, port: PortId, queue: QueueId, pool: &FramePool, budget: usize) -> Vec<Frame> {
        let mut raw: Vec<*mut ffi::rte_mbuf> = vec![std::ptr::null_mut(); budget];
        let received = unsafe {
            ffi::l2xfwd_eth_rx_burst(port, queue, raw.as_mut_ptr(), budget as u16)
        };

        let mut frames = Vec::with_capacity(received as usize);
        for raw_mbuf in raw.into_iter().take(received as usize) {
            let mbuf = unsafe { &*raw_mbuf };
            let data_ptr = unsafe { (mbuf.buf_addr as *mut u8).add(mbuf.data_off as usize) };
            let len = mbuf.data_len as usize;
            let bytes = unsafe { std::slice::from_raw_parts(data_ptr, len) };
            frames.push(pool.from_bytes(bytes));
            unsafe { ffi::l2xfwd_pktmbuf_free(raw_mbuf) };
        }
        frames
    }

    /// Builds a fresh `rte_mbuf` per frame, sends the batch, and honors the
    /// `NicPort` contract: only the frames the NIC actually accepted are
    /// freed back to the pool, and everything else — frames that never
    /// got a live mbuf in the first place, and frames whose mbuf was
    /// built but rejected by `l2xfwd_eth_tx_burst` — is left in `frames`
    /// for the caller to retry or dump. Un-sent raw mbufs are freed here;
    /// they have no `Frame` counterpart left to free them through.
    fn tx_burst(&self, port: PortId, queue: QueueId, frames: &mut Vec<Frame>) -> usize {
        let original: Vec<Frame> = frames.drain(..).collect();
        let mut raw: Vec<*mut ffi::rte_mbuf> = Vec::with_capacity(original.len());
        let mut sendable: Vec<Frame> = Vec::with_capacity(original.len());

        for frame in original {
            let mbuf = unsafe { ffi::rte_pktmbuf_alloc(self.mempool) };
            if mbuf.is_null() {
                tracing::error!("mbuf pool exhausted during tx_burst");
                frames.push(frame);
                continue;
            }
            let data = frame.data();
            let dst = unsafe {
                ffi::l2xfwd_pktmbuf_prepend(mbuf, data.len() as u16) as *mut c_void
            };
            if dst.is_null() {
                unsafe { ffi::l2xfwd_pktmbuf_free(mbuf) };
                frames.push(frame);
                continue;
            }
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), dst as *mut u8, data.len());
            }
            raw.push(mbuf);
            sendable.push(frame);
        }

        let sent =
            unsafe { ffi::l2xfwd_eth_tx_burst(port, queue, raw.as_mut_ptr(), raw.len() as u16) } as usize;
        debug_assert!(sent <= raw.len());

        for &mbuf in &raw[sent..] {
            unsafe { ffi::l2xfwd_pktmbuf_free(mbuf) };
        }

        let mut sendable = sendable.into_iter();
        for frame in sendable.by_ref().take(sent) {
            self.pool.free(frame);
        }
        frames.extend(sendable);

        sent
    }

    fn tx_prepare(&self, _port: PortId, _queue: QueueId, frames: &mut Vec<Frame>) -> usize {
        // Checksum/segmentation fixups happen against the real rte_mbuf
        // representation built fresh in `tx_burst`; there's nothing
        // meaningful to prepare against the pool-owned `Frame` ahead of
        // that copy, so every frame passes through.
        frames.len()
    }

    fn macaddr_get(&self, port: PortId) -> Option<MacAddr> {
        let mut addr: ffi::rte_ether_addr = unsafe { std::mem::zeroed() };
        let ret = unsafe { ffi::rte_eth_macaddr_get(port, &mut addr) };
        if ret != 0 {
            return None;
        }
        Some(MacAddr::new(addr.addr_bytes))
    }

    fn prefetch(&self, frame: &Frame) {
        unsafe { ffi::rte_prefetch0(frame.data().as_ptr() as *const c_void) };
    }

    fn pause(&self) {
        unsafe { ffi::rte_pause() };
    }

    fn sleep(&self, duration: Duration) {
        unsafe { ffi::rte_delay_us_sleep(duration.as_micros() as u32) };
    }

    fn pin_current_thread(&self, lcore: LCoreId) {
        unsafe {
            let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut cpu_set);
            libc::CPU_SET(lcore, &mut cpu_set);
            libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &cpu_set);
        }
    }

    fn lcore_state(&self, lcore: LCoreId) -> LCoreState {
        let state = unsafe { ffi::rte_eal_get_lcore_state(lcore as u32) };
        if state == ffi::RUNNING {
            LCoreState::Running
        } else {
            LCoreState::Waiting
        }
    }
}
