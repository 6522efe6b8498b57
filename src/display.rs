//! Circular buffer holding the latest measurements for display.
//!
//! The buffer has a fixed capacity and a cursor pointing to the measurement currently shown. The
//! cursor is on slot 0 until the first write, then always on a written slot. The buffer does not
//! aggregate anything: measurements are stored as they are and replaced when the cursor comes
//! back to their slot.
//!
//! ```ignore
//! use ade7753::display::{DisplayBuffer, Slot};
//!
//! let mut buffer = DisplayBuffer::<4>::new();
//! buffer.update(measurement, Slot::Next, true);
//! let shown = buffer.current();
//! ```

use super::Measurement;

/// Destination of a non-advancing write with [`DisplayBuffer::update()`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Slot {
    /// The slot under the cursor.
    Current,
    /// The slot following the cursor.
    Next,
    /// An absolute slot index, wrapped to the capacity.
    Index(usize)
}

/// Fixed-capacity circular store of [`Measurement`] with a display cursor.
#[derive(Debug, Clone)]
pub struct DisplayBuffer<const N: usize> {
    slots: [Option<Measurement>; N],
    position: usize
}

impl<const N: usize> DisplayBuffer<N> {
    /// Creates an empty buffer with the cursor on slot 0.
    pub const fn new() -> Self {
        Self { slots: [None; N], position: 0 }
    }

    /// Returns the number of slots.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Writes a measurement and keeps the cursor on a written slot.
    ///
    /// An advancing write stores the measurement in the slot following the cursor and moves the
    /// cursor there, wrapping around at the end of the buffer; `slot` is not used. A
    /// non-advancing write stores it in `slot` and leaves the cursor in place, unless the cursor
    /// is still on an empty slot, in which case it moves to the written one.
    /// # Arguments
    /// * `measurement` - The measurement to store.
    /// * `slot` - The destination of a non-advancing write, as a [`Slot`].
    /// * `advance` - Whether the write goes to the next slot and moves the cursor there.
    pub fn update(&mut self, measurement: Measurement, slot: Slot, advance: bool) {
        if N == 0 {
            return;
        }
        let next = (self.position + 1) % N;
        let index = match slot {
            _ if advance => next,
            Slot::Current => self.position,
            Slot::Next => next,
            Slot::Index(i) => i % N
        };
        self.slots[index] = Some(measurement);
        if advance || self.slots[self.position].is_none() {
            self.position = index;
        }
    }

    /// Returns the index of the slot under the cursor.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the measurement under the cursor, if any was written there.
    pub fn current(&self) -> Option<&Measurement> {
        self.get(self.position)
    }

    /// Returns the measurement stored at a slot index.
    pub fn get(&self, index: usize) -> Option<&Measurement> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Iterates over the written slots, from slot 0.
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.slots.iter().flatten()
    }
}

impl<const N: usize> Default for DisplayBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
