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

//! The frame buffer (mbuf) data model: a pool-owned region with
//! prependable headroom, a current data window, offload flags, and the
//! VLAN TCI side-bands. See `FramePool` for the backing allocator.

use std::sync::{Arc, Mutex};

bitflags::bitflags! {
    /// Offload-flag bits relevant to the forwarding path. Mirrors the
    /// subset of DPDK's `rte_mbuf.ol_flags` this engine inspects.
    #[derive(Default)]
    pub struct OffloadFlags: u32 {
        const RX_VLAN           = 0b0000_0001;
        const RX_VLAN_STRIPPED  = 0b0000_0010;
        const RX_QINQ           = 0b0000_0100;
        const RX_QINQ_STRIPPED  = 0b0000_1000;
    }
}

/// Default headroom reserved ahead of the data region, matching DPDK's
/// `RTE_PKTMBUF_HEADROOM`.
pub const DEFAULT_HEADROOM: usize = 128;

/// Default total buffer capacity (headroom + data + tailroom).
pub const DEFAULT_CAPACITY: usize = 2048;

/// An error returned when a header-manipulation operation would run the
/// data cursor out of bounds. Never panics; callers convert this into a
/// `proc_error_count` increment and drop the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("not enough headroom to prepend {requested} bytes ({available} available)")]
    NoHeadroom { requested: usize, available: usize },
    #[error("not enough data to strip {requested} bytes ({available} available)")]
    NoData { requested: usize, available: usize },
}

/// A single frame buffer, exclusively owned by whichever lcore dequeued
/// it from the NIC until it is freed back to its pool or handed to a
/// transmit ring. Ownership is a property of Rust's move semantics here:
/// a `Frame` can be in exactly one local, field, or collection at a time.
pub struct Frame {
    buf: Vec<u8>,
    head: usize,
    tail: usize,
    pool: Arc<FramePoolInner>,
    pub offload_flags: OffloadFlags,
    pub vlan_tci: u16,
    pub vlan_tci_outer: u16,
}

impl Frame {
    fn new(buf: Vec<u8>, head: usize, tail: usize, pool: Arc<FramePoolInner>) -> Self {
        Frame {
            buf,
            head,
            tail,
            pool,
            offload_flags: OffloadFlags::empty(),
            vlan_tci: 0,
            vlan_tci_outer: 0,
        }
    }

    /// The current data window.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.head..self.tail]
    }

    /// The current data window, mutable.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..self.tail]
    }

    /// Length of the current data window.
    #[inline]
    pub fn len(&self) -> usize {
        self.tail - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes available to prepend into.
    #[inline]
    pub fn headroom(&self) -> usize {
        self.head
    }

    /// Bytes available past the current data window.
    #[inline]
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.tail
    }

    /// Advance the data pointer by `len` bytes, shrinking the window from
    /// the front. Used to strip an Ethernet/VLAN header.
    pub fn adj(&mut self, len: usize) -> Result<(), FrameError> {
        if len > self.len() {
            return Err(FrameError::NoData {
                requested: len,
                available: self.len(),
            });
        }
        self.head += len;
        Ok(())
    }

    /// Move the data pointer back by `len` bytes, growing the window at
    /// the front. Used to prepend a fresh Ethernet header.
    pub fn prepend(&mut self, len: usize) -> Result<&mut [u8], FrameError> {
        if len > self.headroom() {
            return Err(FrameError::NoHeadroom {
                requested: len,
                available: self.headroom(),
            });
        }
        self.head -= len;
        Ok(&mut self.buf[self.head..self.head + len])
    }

    /// A short metadata summary for the packet dumper: never the payload.
    pub fn summary(&self) -> String {
        format!(
            "len={} headroom={} tailroom={} ol_flags={:?} vlan_tci={} vlan_tci_outer={}",
            self.len(),
            self.headroom(),
            self.tailroom(),
            self.offload_flags,
            self.vlan_tci,
            self.vlan_tci_outer
        )
    }

    /// Consume a byte slice as if it had just been received from the NIC
    /// into this frame's data window. Used by tests and the dumper.
    pub fn copy_from_slice(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.len());
        self.data_mut()[..bytes.len()].copy_from_slice(bytes);
    }

    fn recycle(mut self) {
        self.head = 0;
        self.tail = 0;
        self.offload_flags = OffloadFlags::empty();
        self.vlan_tci = 0;
        self.vlan_tci_outer = 0;
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}

struct FramePoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    headroom: usize,
    capacity: usize,
}

impl FramePoolInner {
    fn release(&self, buf: Vec<u8>) {
        self.free.lock().unwrap().push(buf);
    }
}

/// Stand-in for the DPDK mempool: a lock-free-in-spirit (mutex-backed, in
/// this sim) multi-producer/multi-consumer pool of frame buffers. Shared
/// across lcores; the only cross-core sharing during steady state besides
/// `is_running` and the per-lcore counter cells.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<FramePoolInner>,
}

impl FramePool {
    pub fn new(capacity: usize, headroom: usize) -> Self {
        FramePool {
            inner: Arc::new(FramePoolInner {
                free: Mutex::new(Vec::new()),
                headroom,
                capacity,
            }),
        }
    }

    /// Allocate a frame with an empty data window positioned after the
    /// reserved headroom, ready to receive `len` bytes of RX data.
    pub fn allocate(&self, len: usize) -> Frame {
        let mut buf = self
            .inner
            .free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.capacity]);
        if buf.len() < self.inner.headroom + len {
            buf.resize(self.inner.headroom + len, 0);
        }
        Frame::new(buf, self.inner.headroom, self.inner.headroom + len, self.inner.clone())
    }

    /// Build a frame from raw bytes, as if just received from the wire.
    pub fn from_bytes(&self, bytes: &[u8]) -> Frame {
        let mut frame = self.allocate(bytes.len());
        frame.copy_from_slice(bytes);
        frame
    }

    /// Return a frame's backing buffer to the pool.
    pub fn free(&self, frame: Frame) {
        frame.recycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn strip_then_prepend_round_trips_over_header_len(
            header_len in 0usize..=18,
            payload in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let pool = FramePool::new(1, DEFAULT_HEADROOM);
            let mut frame = pool.allocate(header_len + payload.len());
            frame.data_mut()[header_len..].copy_from_slice(&payload);
            let data_ptr_before = frame.data().as_ptr();

            frame.adj(header_len).unwrap();
            prop_assert_eq!(frame.data(), &payload[..]);

            frame.prepend(header_len).unwrap();
            prop_assert_eq!(&frame.data()[header_len..], &payload[..]);
            // Equal only when there was nothing to strip; otherwise the
            // pointer returns to the same offset it started from, which is
            // "within one byte" in the degenerate header_len=0 case and
            // exactly equal for every other case since adj/prepend use the
            // same `len`.
            prop_assert_eq!(frame.data().as_ptr(), data_ptr_before);
        }
    }

    #[test]
    fn strip_then_prepend_preserves_payload() {
        let pool = FramePool::new(4, DEFAULT_HEADROOM);
        let mut frame = pool.allocate(64);
        frame.data_mut().iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        let original: Vec<u8> = frame.data()[14..].to_vec();

        frame.adj(14).unwrap();
        assert_eq!(frame.data(), &original[..]);

        frame.prepend(14).unwrap();
        assert_eq!(&frame.data()[14..], &original[..]);
    }

    #[test]
    fn prepend_fails_on_insufficient_headroom() {
        // headroom is 8 throughout: `adj` only ever grows it, so the
        // insufficient-headroom case has to be exercised against the
        // pool's original headroom rather than after a strip.
        let pool = FramePool::new(1, 8);
        let mut frame = pool.allocate(32);
        assert!(frame.prepend(14).is_err());
    }

    #[test]
    fn adj_fails_when_too_large() {
        let pool = FramePool::new(1, DEFAULT_HEADROOM);
        let mut frame = pool.allocate(10);
        assert!(frame.adj(11).is_err());
    }
}
