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

//! Bounded-retry burst transmission, the TX-buffer's flush-failure
//! recovery path, and the fast/degraded send entry point.

use crate::config::LCoreContext;
use crate::dump;
use crate::mbuf::{Frame, FramePool};
use crate::port::NicPort;
use crate::tx_buffer::TxBurstBuffer;

/// Attempt a transmit burst for `frames`, retrying the un-accepted tail
/// up to `ctx.timing.max_send_retries` times with a pause or sleep
/// between attempts. Returns the cumulative accepted count; whatever is
/// left in `frames` afterwards is the caller's responsibility.
pub fn send_burst(port: &dyn NicPort, ctx: &LCoreContext, frames: &mut Vec<Frame>) -> usize {
    let mut attempt = 0u8;
    let mut sent = 0usize;

    loop {
        if attempt > 0 {
            match ctx.timing.tx_retry_sleep {
                Some(delay) => port.sleep(delay),
                None => port.pause(),
            }
        }

        sent += port.tx_burst(ctx.tx_port_id, ctx.queue_id, frames);
        attempt += 1;

        if frames.is_empty() || attempt >= ctx.timing.max_send_retries {
            break;
        }
    }

    sent
}

/// The TX buffer's flush-failure callback: validate, prepare, retry-send,
/// and dump+free whatever still didn't make it out.
pub fn resend(port: &dyn NicPort, ctx: &LCoreContext, pool: &FramePool, mut frames: Vec<Frame>) {
    if frames.is_empty() {
        return;
    }

    let prepared = port.tx_prepare(ctx.tx_port_id, ctx.queue_id, &mut frames);
    if prepared < frames.len() {
        let failed = frames.split_off(prepared);
        tracing::error!(count = failed.len(), "failed to prepare frames for transmit");
        ctx.record(|c| c.add_proc_error(failed.len() as u64));
        dump::dump_and_free(pool, failed);
    }

    if frames.is_empty() {
        return;
    }

    let prepared_count = frames.len();
    let sent = send_burst(port, ctx, &mut frames);
    if sent < prepared_count {
        tracing::error!(count = frames.len(), "failed to send frames after retry");
        ctx.record(|c| c.add_proc_error(frames.len() as u64));
        dump::dump_and_free(pool, frames);
    }

    if sent > 0 {
        ctx.record(|c| c.add_retx(sent as u64));
    }
}

/// Try to send one frame: the fast path submits to the lcore's TX burst
/// buffer (which may itself flush and invoke `resend`); the degraded
/// path (no buffer registered) sends directly and falls back to `resend`
/// on rejection.
pub fn try_send(
    port: &dyn NicPort,
    ctx: &LCoreContext,
    pool: &FramePool,
    tx_buffer: Option<&mut TxBurstBuffer>,
    frame: Frame,
) {
    match tx_buffer {
        Some(buffer) => {
            let accepted = buffer.submit(frame);
            ctx.record(|c| c.add_tx(accepted as u64));
        }
        None => {
            tracing::debug!(lcore = ctx.lcore_id, "no tx buffer registered, sending directly");
            let mut batch = vec![frame];
            let sent = send_burst(port, ctx, &mut batch);
            if sent == 0 {
                resend(port, ctx, pool, batch);
                return;
            }
            ctx.record(|c| c.add_tx(sent as u64));
        }
    }
}
