//! Stream state shared by the encoder and the decoder.
//!
//! Both sides must evolve this state identically. It holds the stream-wide
//! timestamp predictors, the point registry and the index of the metadata
//! whose code table governs the next code.

use crate::buffer::{BitReader, BitWriter};
use crate::code::{CodeWord, TIME_DELTA_FORWARD, TIME_DELTA_REVERSE};
use crate::error::Result;
use crate::metadata::PointMetadata;

/// Registry slot of the metadata that is active before the first sample.
const SEED_SLOT: usize = 0;

/// Marks an unregistered point ID in the slot index.
const NO_SLOT: u32 = 0;

#[derive(Debug, Clone)]
pub(crate) struct StreamState {
    pub(crate) prev_timestamp1: i64,
    pub(crate) prev_timestamp2: i64,
    pub(crate) time_deltas: [i64; 4],
    /// Arena of point metadata; slot 0 is the seed and belongs to no point.
    points: Vec<PointMetadata>,
    /// Point ID to arena slot.
    slots: Vec<u32>,
    active: usize,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            prev_timestamp1: 0,
            prev_timestamp2: 0,
            time_deltas: [i64::MAX; 4],
            points: vec![PointMetadata::new(0)],
            slots: Vec::new(),
            active: SEED_SLOT,
        }
    }
}

impl StreamState {
    /// Returns to the initial state, keeping allocations.
    pub(crate) fn reset(&mut self) {
        self.prev_timestamp1 = 0;
        self.prev_timestamp2 = 0;
        self.time_deltas = [i64::MAX; 4];
        self.points.truncate(1);
        self.points[SEED_SLOT] = PointMetadata::new(0);
        self.slots.clear();
        self.active = SEED_SLOT;
    }

    /// Number of distinct point IDs registered.
    pub(crate) fn point_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Arena slot for `id`, registering new metadata on first sight.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn slot_or_insert(&mut self, id: u16) -> usize {
        let index = usize::from(id);
        if index >= self.slots.len() {
            self.slots.resize(index + 1, NO_SLOT);
        }
        if self.slots[index] == NO_SLOT {
            self.slots[index] = self.points.len() as u32;
            self.points.push(PointMetadata::new(id.wrapping_add(1)));
        }
        self.slots[index] as usize
    }

    /// Metadata registered for `id`, if any.
    pub(crate) fn metadata(&self, id: u16) -> Option<&PointMetadata> {
        match self.slots.get(usize::from(id)) {
            Some(&slot) if slot != NO_SLOT => self.points.get(slot as usize),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn point(&self, slot: usize) -> &PointMetadata {
        &self.points[slot]
    }

    #[inline]
    pub(crate) fn point_mut(&mut self, slot: usize) -> &mut PointMetadata {
        &mut self.points[slot]
    }

    #[inline]
    pub(crate) fn active(&self) -> &PointMetadata {
        &self.points[self.active]
    }

    #[inline]
    pub(crate) fn active_mut(&mut self) -> &mut PointMetadata {
        &mut self.points[self.active]
    }

    /// Hands the code table over to the metadata in `slot`.
    #[inline]
    pub(crate) fn set_active(&mut self, slot: usize) {
        self.active = slot;
    }

    /// Writes a code through the active code table.
    #[inline]
    pub(crate) fn write_code(&mut self, code: CodeWord, writer: &mut BitWriter) {
        self.points[self.active].table.write_code(code, writer);
    }

    /// Reads a code through the active code table.
    #[inline]
    pub(crate) fn read_code(&mut self, reader: &mut BitReader) -> Result<u8> {
        self.points[self.active].table.read_code(reader)
    }

    /// Finds a cached delta that reproduces `timestamp` from the previous one.
    pub(crate) fn delta_code(&self, timestamp: i64) -> Option<CodeWord> {
        let prev = self.prev_timestamp1;
        if prev < timestamp {
            self.time_deltas
                .iter()
                .position(|&delta| prev.wrapping_add(delta) == timestamp)
                .map(|slot| TIME_DELTA_FORWARD[slot])
        } else {
            self.time_deltas
                .iter()
                .position(|&delta| prev.wrapping_sub(delta) == timestamp)
                .map(|slot| TIME_DELTA_REVERSE[slot])
        }
    }

    /// Applies a forward (`slot` 0..4) or reverse (`slot` 4..8) delta.
    pub(crate) fn apply_delta(&self, slot: usize) -> i64 {
        if slot < 4 {
            self.prev_timestamp1.wrapping_add(self.time_deltas[slot])
        } else {
            self.prev_timestamp1.wrapping_sub(self.time_deltas[slot - 4])
        }
    }

    /// Records a changed timestamp: updates the delta cache and shifts the
    /// timestamp history.
    pub(crate) fn push_timestamp(&mut self, timestamp: i64) {
        let min_delta = self.prev_timestamp1.wrapping_sub(timestamp).wrapping_abs();
        let deltas = &mut self.time_deltas;

        if min_delta < deltas[3] && !deltas[..3].contains(&min_delta) {
            if let Some(slot) = deltas.iter().position(|&delta| min_delta < delta) {
                deltas.copy_within(slot..3, slot + 1);
                deltas[slot] = min_delta;
            }
        }

        self.prev_timestamp2 = self.prev_timestamp1;
        self.prev_timestamp1 = timestamp;
    }
}
