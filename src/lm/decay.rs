// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! The forgetting curve: probability from (level, elapsed time).
//!
//! A learned word's probability is not stored — it is derived from how well
//! the word is known (its level) and how long ago it was last seen. Elapsed
//! time is quantized into 32 steps across a configurable duration; within a
//! level the probability slides linearly from that level's base down toward
//! the previous level's, so a word "forgets" its way down the same staircase
//! it climbed. Four precomputed tables trade retention strength; the table id
//! is a header attribute.

use crate::lm::probability::HistoricalInfo;

// ============================================================================
// CURVE PARAMETERS
// ============================================================================

/// Highest forgetting-curve level.
pub const MAX_LEVEL: u8 = 15;

/// Occurrence-count field ceiling (10 bits in the encoded entry).
pub const MAX_COUNT: u16 = 0x3FF;

/// Quantization steps across one level-down duration.
pub const ELAPSED_STEP_COUNT: u32 = 32;

/// Default time for one level decay: 120 days.
pub const DEFAULT_DURATION_TO_LEVEL_DOWN_IN_SECONDS: u32 = 120 * 24 * 60 * 60;

/// Default occurrences required to climb one level.
pub const DEFAULT_OCCURRENCES_TO_LEVEL_UP: u32 = 10;

/// Number of selectable probability tables.
pub const PROBABILITY_TABLE_COUNT: u32 = 4;

/// Probability reached at MAX_LEVEL, per table (weak, modest, strong,
/// aggressive).
const TABLE_TOP_PROBABILITIES: [u32; PROBABILITY_TABLE_COUNT as usize] = [96, 108, 120, 127];

// ============================================================================
// FORGETTING CURVE
// ============================================================================

pub struct ForgettingCurve {
    /// `table[level][step]` probabilities, built once at construction.
    table: Vec<Vec<u8>>,
    duration_to_level_down: u32,
    occurrences_to_level_up: u32,
}

impl ForgettingCurve {
    /// Build the curve for one table id. Unknown ids clamp to the strongest
    /// table rather than failing — the id comes from a header attribute.
    pub fn new(table_id: u32, duration_to_level_down: u32, occurrences_to_level_up: u32) -> Self {
        let table_id = table_id.min(PROBABILITY_TABLE_COUNT - 1) as usize;
        let top = TABLE_TOP_PROBABILITIES[table_id];
        // base(level) rises linearly to the table's top probability.
        let base =
            |level: u32| -> u32 { top * (level + 1) / (u32::from(MAX_LEVEL) + 1) };
        let mut table = Vec::with_capacity(usize::from(MAX_LEVEL) + 1);
        for level in 0..=u32::from(MAX_LEVEL) {
            let start = base(level);
            let floor = if level == 0 { 0 } else { base(level - 1) };
            let mut row = Vec::with_capacity(ELAPSED_STEP_COUNT as usize);
            for step in 0..ELAPSED_STEP_COUNT {
                // Closed-form interpolation from this level's base down to
                // the previous level's across the step range.
                row.push((start - (start - floor) * step / ELAPSED_STEP_COUNT) as u8);
            }
            table.push(row);
        }
        Self {
            table,
            duration_to_level_down: duration_to_level_down.max(ELAPSED_STEP_COUNT),
            occurrences_to_level_up: occurrences_to_level_up.max(1),
        }
    }

    pub fn duration_to_level_down(&self) -> u32 {
        self.duration_to_level_down
    }

    /// Probability for a (level, elapsed-steps) pair. Non-increasing in
    /// steps, non-decreasing in level.
    pub fn decode_probability(&self, level: u8, elapsed_steps: u32) -> u8 {
        let level = usize::from(level.min(MAX_LEVEL));
        let step = elapsed_steps.min(ELAPSED_STEP_COUNT - 1) as usize;
        self.table[level][step]
    }

    /// Quantized steps elapsed since `timestamp`.
    pub fn elapsed_steps(&self, timestamp: u32, now: u32) -> u32 {
        let elapsed = u64::from(now.saturating_sub(timestamp));
        (elapsed * u64::from(ELAPSED_STEP_COUNT) / u64::from(self.duration_to_level_down))
            .min(u64::from(u32::MAX)) as u32
    }

    /// Current probability of an entry's historical state.
    pub fn probability_of(&self, info: &HistoricalInfo, now: u32) -> u8 {
        self.decode_probability(info.level, self.elapsed_steps(info.timestamp, now))
    }

    /// Whether the entry still deserves its slot: a level-0 entry that has
    /// sat through a full duration has decayed out.
    pub fn is_alive(&self, info: &HistoricalInfo, now: u32) -> bool {
        info.level > 0
            || u64::from(now.saturating_sub(info.timestamp)) < u64::from(self.duration_to_level_down)
    }

    /// Update state for one observed occurrence: bump the count, reset it and
    /// climb a level when the threshold is crossed, and refresh the
    /// timestamp.
    pub fn on_occurrence(&self, info: Option<&HistoricalInfo>, now: u32) -> HistoricalInfo {
        match info {
            None => HistoricalInfo::new(now, 0, 1),
            Some(info) => {
                let count = u32::from(info.count) + 1;
                if count >= self.occurrences_to_level_up && info.level < MAX_LEVEL {
                    HistoricalInfo::new(now, info.level + 1, 0)
                } else {
                    HistoricalInfo::new(now, info.level, count.min(u32::from(MAX_COUNT)) as u16)
                }
            }
        }
    }

    /// Apply elapsed-time decay during a decay pass. `None` means the entry
    /// has decayed out and should be dropped.
    pub fn decay(&self, info: &HistoricalInfo, now: u32) -> Option<HistoricalInfo> {
        let elapsed = now.saturating_sub(info.timestamp);
        let level_down = elapsed / self.duration_to_level_down;
        if level_down == 0 {
            return Some(*info);
        }
        if info.level == 0 {
            return None;
        }
        let new_level = info.level.saturating_sub(level_down.min(255) as u8);
        // Advance the timestamp by whole durations so fractional progress
        // toward the next step is preserved.
        let consumed = level_down.saturating_mul(self.duration_to_level_down);
        Some(HistoricalInfo::new(
            info.timestamp.saturating_add(consumed),
            new_level,
            0,
        ))
    }

    /// Ascending eviction order for truncation: the least-known, least-used,
    /// least-recent entries go first.
    pub fn priority(info: &HistoricalInfo) -> (u8, u16, u32) {
        (info.level, info.count, info.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(table_id: u32) -> ForgettingCurve {
        ForgettingCurve::new(
            table_id,
            DEFAULT_DURATION_TO_LEVEL_DOWN_IN_SECONDS,
            DEFAULT_OCCURRENCES_TO_LEVEL_UP,
        )
    }

    #[test]
    fn probability_is_monotone_in_elapsed_steps() {
        for table_id in 0..PROBABILITY_TABLE_COUNT {
            let curve = curve(table_id);
            for level in 0..=MAX_LEVEL {
                let mut previous = u8::MAX;
                for step in 0..ELAPSED_STEP_COUNT {
                    let p = curve.decode_probability(level, step);
                    assert!(p <= previous, "table {} level {} step {}", table_id, level, step);
                    previous = p;
                }
            }
        }
    }

    #[test]
    fn probability_is_monotone_in_level() {
        for table_id in 0..PROBABILITY_TABLE_COUNT {
            let curve = curve(table_id);
            for step in 0..ELAPSED_STEP_COUNT {
                let mut previous = 0u8;
                for level in 0..=MAX_LEVEL {
                    let p = curve.decode_probability(level, step);
                    assert!(p >= previous, "table {} level {} step {}", table_id, level, step);
                    previous = p;
                }
            }
        }
    }

    #[test]
    fn stronger_tables_dominate_weaker_ones() {
        for level in 0..=MAX_LEVEL {
            for step in 0..ELAPSED_STEP_COUNT {
                let mut previous = 0u8;
                for table_id in 0..PROBABILITY_TABLE_COUNT {
                    let p = curve(table_id).decode_probability(level, step);
                    assert!(p >= previous);
                    previous = p;
                }
            }
        }
    }

    #[test]
    fn occurrences_climb_levels_at_the_threshold() {
        let curve = curve(2);
        let mut info = curve.on_occurrence(None, 1000);
        assert_eq!((info.level, info.count), (0, 1));
        for i in 0..DEFAULT_OCCURRENCES_TO_LEVEL_UP - 1 {
            info = curve.on_occurrence(Some(&info), 1000 + i);
        }
        assert_eq!(info.level, 1);
        assert_eq!(info.count, 0);
    }

    #[test]
    fn decay_steps_levels_down_and_drops_dead_entries() {
        let curve = curve(1);
        let duration = curve.duration_to_level_down();
        let info = HistoricalInfo::new(0, 3, 5);

        // Within one duration: untouched.
        assert_eq!(curve.decay(&info, duration - 1), Some(info));

        // Two full durations: down two levels, count reset.
        let decayed = curve.decay(&info, 2 * duration).unwrap();
        assert_eq!(decayed.level, 1);
        assert_eq!(decayed.count, 0);

        // A level-0 entry past its duration decays out entirely.
        let dying = HistoricalInfo::new(0, 0, 2);
        assert_eq!(curve.decay(&dying, duration), None);
        assert!(!curve.is_alive(&dying, duration));
        assert!(curve.is_alive(&dying, duration - 1));
    }

    #[test]
    fn priority_orders_by_level_then_count_then_recency() {
        let a = HistoricalInfo::new(500, 1, 3);
        let b = HistoricalInfo::new(900, 1, 3);
        let c = HistoricalInfo::new(100, 2, 0);
        let mut entries = [c, b, a];
        entries.sort_by_key(ForgettingCurve::priority);
        assert_eq!(entries, [a, b, c]);
    }
}
