// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace ring buffers
//!
//! Each driver declares a `Trace` enum describing the events it cares about
//! and a static ring buffer holding the most recent of them:
//!
//! ```rust,ignore
//! #[derive(Copy, Clone, Debug, PartialEq, Eq)]
//! enum Trace {
//!     None,
//!     Write { addr: u8, len: usize },
//! }
//!
//! ringbuf!(Trace, 16, Trace::None);
//!
//! fn write(addr: u8, len: usize) {
//!     ringbuf_entry!(Trace::Write { addr, len });
//! }
//! ```
//!
//! Recording the same payload from the same line twice in a row does not
//! consume a new slot; the `count` of the existing entry is bumped instead.
//! That keeps a stuck poll loop from flushing everything interesting out of
//! the buffer.
//!
//! The buffer lives behind a `critical_section::Mutex`, so entries may be
//! recorded from interrupt handlers as well as from foreground code.

#![no_std]

use core::cell::RefCell;

/// A single slot in a [`Ringbuf`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    /// Source line that recorded the entry.
    pub line: u16,
    /// Number of times the ring had wrapped when this slot was written.
    pub generation: u16,
    /// Number of consecutive identical records folded into this slot.
    pub count: u16,
    pub payload: T,
}

/// Fixed-size ring of trace entries.
#[derive(Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    last: Option<usize>,
    buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        if N == 0 {
            return;
        }

        if let Some(last) = self.last {
            let ent = &mut self.buffer[last];
            if ent.line == line && ent.payload == payload {
                if let Some(count) = ent.count.checked_add(1) {
                    ent.count = count;
                    return;
                }
            }
        }

        let (ndx, generation) = match self.last {
            None => (0, 0),
            Some(last) => {
                let next = last + 1;
                let generation = self.buffer[last].generation;
                if next >= N {
                    (0, generation.wrapping_add(1))
                } else {
                    (next, generation)
                }
            }
        };

        self.buffer[ndx] = RingbufEntry {
            line,
            generation,
            count: 1,
            payload,
        };
        self.last = Some(ndx);
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        match self.last {
            None => 0,
            Some(last) if self.buffer[(last + 1) % N].count == 0 => last + 1,
            Some(_) => N,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }

    /// The most recently recorded entry.
    pub fn last(&self) -> Option<&RingbufEntry<T>> {
        self.last.map(|ndx| &self.buffer[ndx])
    }

    /// Walks the occupied slots from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let len = self.len();
        let start = match self.last {
            None => 0,
            Some(last) => (last + 1 + N - len) % N,
        };
        (0..len).map(move |i| &self.buffer[(start + i) % N])
    }
}

/// Interrupt-safe wrapper used by the [`ringbuf!`] macro.
pub struct StaticRingbuf<T: Copy + PartialEq, const N: usize> {
    inner: critical_section::Mutex<RefCell<Ringbuf<T, N>>>,
}

impl<T: Copy + PartialEq, const N: usize> StaticRingbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            inner: critical_section::Mutex::new(RefCell::new(Ringbuf::new(
                init,
            ))),
        }
    }

    pub fn record(&self, line: u16, payload: T) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).entry(line, payload)
        });
    }

    /// Runs `f` against the ring with interrupts masked. Intended for
    /// debuggers' helpers and tests; keep `f` short.
    pub fn inspect<R>(&self, f: impl FnOnce(&Ringbuf<T, N>) -> R) -> R {
        critical_section::with(|cs| f(&self.inner.borrow_ref(cs)))
    }
}

/// Declares the module's trace ring as a static named `__RINGBUF`.
#[macro_export]
macro_rules! ringbuf {
    ($t:ty, $n:expr, $init:expr) => {
        static __RINGBUF: $crate::StaticRingbuf<$t, $n> =
            $crate::StaticRingbuf::new($init);
    };
}

/// Records an entry into the `__RINGBUF` declared in the calling module.
#[macro_export]
macro_rules! ringbuf_entry {
    ($payload:expr) => {
        __RINGBUF.record(line!() as u16, $payload)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Trace {
        None,
        Hit(u8),
    }

    #[test]
    fn test_repeats_fold_into_one_slot() {
        let mut ring: Ringbuf<Trace, 4> = Ringbuf::new(Trace::None);
        ring.entry(10, Trace::Hit(1));
        ring.entry(10, Trace::Hit(1));
        ring.entry(10, Trace::Hit(1));

        assert_eq!(ring.len(), 1);
        let last = ring.last().unwrap();
        assert_eq!(last.count, 3);
        assert_eq!(last.payload, Trace::Hit(1));
    }

    #[test]
    fn test_same_payload_from_another_line_is_new_entry() {
        let mut ring: Ringbuf<Trace, 4> = Ringbuf::new(Trace::None);
        ring.entry(10, Trace::Hit(1));
        ring.entry(11, Trace::Hit(1));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_wraps_and_bumps_generation() {
        let mut ring: Ringbuf<Trace, 3> = Ringbuf::new(Trace::None);
        for i in 0..5u8 {
            ring.entry(1, Trace::Hit(i));
        }

        assert_eq!(ring.len(), 3);
        let payloads: [Trace; 3] = {
            let mut it = ring.iter().map(|e| e.payload);
            [it.next().unwrap(), it.next().unwrap(), it.next().unwrap()]
        };
        assert_eq!(payloads, [Trace::Hit(2), Trace::Hit(3), Trace::Hit(4)]);
        assert_eq!(ring.last().unwrap().generation, 1);
    }

    ringbuf!(Trace, 8, Trace::None);

    #[test]
    fn test_static_ring_records() {
        ringbuf_entry!(Trace::Hit(7));
        let found = __RINGBUF.inspect(|ring| {
            ring.iter().any(|e| e.payload == Trace::Hit(7))
        });
        assert!(found);
    }
}
