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

//! The per-lcore receive/forward/transmit loop: one of these runs on its
//! own pinned thread per (port, queue) pair, run to completion until
//! `is_running` goes false.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::{RngCore, SeedableRng};

use crate::config::{LCoreContext, BURST, PREFETCH_OFFSET};
use crate::dump;
use crate::header::{self, EtherType};
use crate::mbuf::{Frame, FramePool};
use crate::net::MacAddr;
use crate::port::NicPort;
use crate::send;
use crate::tx_buffer::TxBurstBuffer;

/// Clean VLAN metadata, classify, strip/rewrite the Ethernet header, and
/// hand back a frame ready for `try_send` — or `None` if the frame was
/// dropped or freed here (ARP/non-IP, or a header-manipulation failure).
fn process_frame(
    mut frame: Frame,
    pool: &FramePool,
    ctx: &LCoreContext,
    tx_mac: Option<MacAddr>,
    rng: &mut impl RngCore,
) -> Option<Frame> {
    header::clean_vlan_tci(&mut frame);

    let (ether_type, vlan_offset) = header::parse_ethernet(&frame);

    if !ether_type.is_ip() {
        if ether_type == EtherType::ARP {
            match header::arp_target_ip(&frame, vlan_offset) {
                Some(target) => tracing::debug!(lcore = ctx.lcore_id, %target, "ARP packet dropped"),
                None => tracing::debug!(lcore = ctx.lcore_id, "ARP packet dropped, target address unreadable"),
            }
        } else {
            tracing::debug!(lcore = ctx.lcore_id, ethertype = ether_type.0, "non-IP packet dropped");
        }
        ctx.record(|c| c.add_dropped(1));
        pool.free(frame);
        return None;
    }

    if let Err(err) = header::strip_l2(&mut frame, vlan_offset) {
        tracing::error!(lcore = ctx.lcore_id, error = %err, "adjust failed: too big headers");
        ctx.record(|c| c.add_proc_error(1));
        dump::dump_and_free(pool, vec![frame]);
        return None;
    }

    match ether_type {
        EtherType::IPV4 => match header::ipv4_dst(frame.data()) {
            Some(target) => tracing::debug!(lcore = ctx.lcore_id, %target, "IPv4 packet received"),
            None => tracing::debug!(lcore = ctx.lcore_id, "IPv4 packet received, target address unreadable"),
        },
        EtherType::IPV6 => match header::ipv6_dst(frame.data()) {
            Some(target) => tracing::debug!(lcore = ctx.lcore_id, %target, "IPv6 packet received"),
            None => tracing::debug!(lcore = ctx.lcore_id, "IPv6 packet received, target address unreadable"),
        },
        _ => unreachable!("ether_type.is_ip() guarantees IPv4 or IPv6"),
    }

    match header::prepend_l2(&mut frame) {
        Ok(header_buf) => header::fill_ethernet(header_buf, ether_type, tx_mac, rng),
        Err(err) => {
            tracing::error!(lcore = ctx.lcore_id, error = %err, "prepend failed: no headroom");
            ctx.record(|c| c.add_proc_error(1));
            dump::dump_and_free(pool, vec![frame]);
            return None;
        }
    }

    Some(frame)
}

/// One receive/forward/transmit cycle. Returns the number of frames
/// received (0 means the caller should apply the RX delay).
pub fn run_once(
    port: &dyn NicPort,
    ctx: &LCoreContext,
    pool: &FramePool,
    mut tx_buffer: Option<&mut TxBurstBuffer>,
    tx_mac: Option<MacAddr>,
    rng: &mut impl RngCore,
) -> usize {
    let burst = port.rx_burst(ctx.rx_port_id, ctx.queue_id, pool, BURST);
    if burst.is_empty() {
        tracing::debug!(
            lcore = ctx.lcore_id,
            rx_port = ctx.rx_port_id,
            queue = ctx.queue_id,
            "no packets available"
        );
        return 0;
    }

    ctx.record(|c| c.add_rx(burst.len() as u64));

    let len = burst.len();
    let mut queue: VecDeque<Frame> = burst.into();

    // Warm the cache lines for the first PREFETCH_OFFSET frames up front,
    // then keep one prefetch ahead of processing for the rest of the burst.
    for i in 0..PREFETCH_OFFSET.min(len) {
        if let Some(frame) = queue.get(i) {
            port.prefetch(frame);
        }
    }

    let mut processed = 0usize;
    while let Some(frame) = queue.pop_front() {
        if processed + PREFETCH_OFFSET < len {
            if let Some(ahead) = queue.get(PREFETCH_OFFSET - 1) {
                port.prefetch(ahead);
            }
        }
        processed += 1;

        if let Some(ready) = process_frame(frame, pool, ctx, tx_mac, rng) {
            send::try_send(port, ctx, pool, tx_buffer.as_deref_mut(), ready);
        }
    }

    len
}

/// Run the lcore's loop until `is_running` clears, then flush any staged
/// TX buffer contents before returning. Pins the calling thread to
/// `ctx.lcore_id` via the collaborator hook first.
pub fn run(
    port: &dyn NicPort,
    ctx: &LCoreContext,
    pool: &FramePool,
    mut tx_buffer: TxBurstBuffer,
    tx_mac: Option<MacAddr>,
    is_running: &AtomicBool,
) {
    port.pin_current_thread(ctx.lcore_id);

    let mut rng = rand::rngs::SmallRng::from_rng(rand::rngs::OsRng)
        .unwrap_or_else(|_| rand::rngs::SmallRng::seed_from_u64(ctx.lcore_id as u64));

    let _span = tracing::info_span!("lcore", id = ctx.lcore_id).entered();

    while is_running.load(Ordering::Acquire) {
        let received = run_once(port, ctx, pool, Some(&mut tx_buffer), tx_mac, &mut rng);
        if received == 0 {
            port.sleep(ctx.timing.rx_delay);
        }
    }

    let flushed = tx_buffer.flush();
    if flushed > 0 {
        ctx.record(|c| c.add_flush(flushed as u64));
    }
}
