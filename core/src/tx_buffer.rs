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

//! Per-lcore bounded staging of outbound frames. Owned by exactly one
//! lcore, never shared. The error callback is a typed closure captured
//! at construction — the concrete realization of DESIGN.md's "erased
//! user-data callback" note: a capability the buffer holds, not a
//! `*const c_void` re-cast on every invocation.

use std::sync::Arc;

use crate::mbuf::Frame;
use crate::port::{NicPort, PortId, QueueId};

/// Buffer full or flushed: the frames the NIC rejected, handed to the
/// registered error callback.
pub type ErrorCallback = Box<dyn FnMut(Vec<Frame>) + Send>;

pub struct TxBurstBuffer {
    capacity: usize,
    frames: Vec<Frame>,
    port: Arc<dyn NicPort>,
    tx_port_id: PortId,
    queue_id: QueueId,
    on_error: ErrorCallback,
}

impl TxBurstBuffer {
    /// NUMA-local allocation is the collaborator's concern; this buffer
    /// just reserves `capacity` up front.
    pub fn new(
        capacity: usize,
        port: Arc<dyn NicPort>,
        tx_port_id: PortId,
        queue_id: QueueId,
        on_error: ErrorCallback,
    ) -> Self {
        TxBurstBuffer {
            capacity,
            frames: Vec::with_capacity(capacity),
            port,
            tx_port_id,
            queue_id,
            on_error,
        }
    }

    /// Append `frame`; if the buffer is now full, flush synchronously.
    /// Returns the number of frames the NIC accepted during this call
    /// (0 unless a flush happened).
    pub fn submit(&mut self, frame: Frame) -> usize {
        self.frames.push(frame);
        if self.frames.len() >= self.capacity {
            self.flush()
        } else {
            0
        }
    }

    /// Flush a possibly-partial buffer. Returns the count the NIC
    /// accepted; rejected frames go to the error callback.
    pub fn flush(&mut self) -> usize {
        if self.frames.is_empty() {
            return 0;
        }
        let mut batch = std::mem::take(&mut self.frames);
        let before = batch.len();
        let accepted = self.port.tx_burst(self.tx_port_id, self.queue_id, &mut batch);
        debug_assert!(accepted <= before);
        if !batch.is_empty() {
            (self.on_error)(batch);
        }
        accepted
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn staged_len(&self) -> usize {
        self.frames.len()
    }
}

impl Drop for TxBurstBuffer {
    /// Frames still staged at drop time are lost per spec — but losing a
    /// `Frame` without returning it to its pool would leak the backing
    /// buffer, so as a last resort we route it through the error
    /// callback rather than silently dropping it. Callers should flush
    /// before letting a buffer go out of scope.
    fn drop(&mut self) {
        if !self.frames.is_empty() {
            tracing::warn!(
                staged = self.frames.len(),
                "tx burst buffer destroyed with frames still staged"
            );
            let leftover = std::mem::take(&mut self.frames);
            (self.on_error)(leftover);
        }
    }
}
