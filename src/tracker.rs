use std::collections::HashMap;

use log::debug;

use crate::config::{ConfigError, MithrilConfig};
use crate::dram::RowId;

/// Hot-row state of a single bank.
///
/// The counter table is a bounded Space-Saving-style sketch: at most
/// `N_table` rows are tracked, a full-table insert evicts the minimum and
/// inherits its count plus one, so a tracked count always upper-bounds the
/// row's true activation count. While the table is not yet full the
/// effective minimum count is 0 (an untouched slot).
#[derive(Debug, Default)]
struct BankTable {
    counters: HashMap<RowId, u32>,
    max_ptr: Option<RowId>,
    min_ptr: Option<RowId>,
    raa: u32,
}

impl BankTable {
    fn min_count(&self, capacity: usize) -> u32 {
        if self.counters.len() < capacity {
            return 0;
        }
        let min_row = self.min_ptr.expect("min pointer unset on full table");
        self.counters[&min_row]
    }

    fn max_count(&self) -> u32 {
        let max_row = self.max_ptr.expect("max pointer unset on non-empty table");
        self.counters[&max_row]
    }

    fn select_new_max(&mut self) {
        let mut best: Option<(RowId, u32)> = None;
        for (&row, &count) in &self.counters {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((row, count)),
            }
        }
        self.max_ptr = best.map(|(row, _)| row);
    }
}

/// Per-bank Mithril+ activation tracker: counter tables with max/min
/// pointers plus the RAA counters driving the RFM decision.
#[derive(Debug)]
pub struct MithrilTracker {
    banks: Vec<BankTable>,
    capacity: usize,
    adaptive_threshold: u32,
    rfm_threshold: u32,
    debug: bool,
}

impl MithrilTracker {
    pub fn new(config: &MithrilConfig, num_banks: usize) -> Result<Self, ConfigError> {
        let capacity = config.num_table_entries()? as usize;
        let adaptive_threshold = config.adaptive_threshold()?;
        let rfm_threshold = config.rfm_threshold()?;
        let mut banks = Vec::with_capacity(num_banks);
        banks.resize_with(num_banks, BankTable::default);
        Ok(Self {
            banks,
            capacity,
            adaptive_threshold,
            rfm_threshold,
            debug: config.debug,
        })
    }

    /// Full activation path for the standalone plugin: counts toward RAA and
    /// updates the counter table.
    pub fn on_activation(&mut self, bank: usize, row: RowId) {
        self.increment_raa(bank);
        self.record_activation(bank, row);
    }

    /// RAA-only path; the combined plugin charges every real ACT here while
    /// the table update is deferred until the cache reports a miss.
    pub fn increment_raa(&mut self, bank: usize) {
        self.banks[bank].raa += 1;
    }

    /// Update the counter table for an activation of `row`.
    pub fn record_activation(&mut self, bank: usize, row: RowId) {
        let capacity = self.capacity;
        let table = &mut self.banks[bank];

        if let Some(count) = table.counters.get_mut(&row) {
            *count += 1;
            let new_count = *count;

            if new_count > table.max_count() {
                table.max_ptr = Some(row);
            }
            // The activated row may no longer be the minimum; take the first
            // strictly smaller entry, or leave the pointer as is.
            if table.min_ptr == Some(row) {
                for (&other, &count) in &table.counters {
                    if count < new_count {
                        table.min_ptr = Some(other);
                        break;
                    }
                }
            }
            if self.debug {
                debug!(
                    "mithril: row {} in table[{}] count {} (threshold {})",
                    row, bank, new_count, self.adaptive_threshold
                );
            }
        } else if table.counters.len() < capacity {
            table.counters.insert(row, 1);
            if table.counters.len() == 1 {
                table.max_ptr = Some(row);
            }
            table.min_ptr = Some(row);
        } else {
            let base = table.min_count(capacity);
            let evicted = table.min_ptr.expect("min pointer unset on full table");
            table.counters.remove(&evicted);
            table.counters.insert(row, base + 1);
            // The evicted minimum may have doubled as the maximum (all counts
            // equal); the inserted count then exceeds every survivor.
            if table.max_ptr == Some(evicted) || base + 1 > table.max_count() {
                table.max_ptr = Some(row);
            }
            table.min_ptr = Some(row);
            if self.debug {
                debug!(
                    "mithril: row {} replaces row {} in table[{}] with count {}",
                    row,
                    evicted,
                    bank,
                    base + 1
                );
            }
        }
    }

    /// RFM evaluation hook, to be called after the cycle's dispatch. Returns
    /// the row to refresh when the RAA window closed hot enough.
    pub fn maybe_trigger_rfm(&mut self, bank: usize) -> Option<RowId> {
        if self.banks[bank].raa == self.rfm_threshold {
            self.process_rfm(bank)
        } else {
            None
        }
    }

    fn process_rfm(&mut self, bank: usize) -> Option<RowId> {
        let capacity = self.capacity;
        let table = &mut self.banks[bank];
        table.raa = 0;

        // Nothing tracked yet (possible in the combined plugin where every
        // access in the window hit the cache).
        let max_row = table.max_ptr?;
        let min_count = table.min_count(capacity);
        let diff = table.counters[&max_row] - min_count;
        if diff < self.adaptive_threshold {
            return None;
        }

        if self.debug {
            debug!(
                "mithril: row {} in table[{}] exceeded the threshold, refreshing",
                max_row, bank
            );
        }
        // The refreshed row is forgiven down to the minimum count.
        table.counters.insert(max_row, min_count);
        table.select_new_max();
        Some(max_row)
    }

    pub fn raa_counter(&self, bank: usize) -> u32 {
        self.banks[bank].raa
    }

    pub fn table_len(&self, bank: usize) -> usize {
        self.banks[bank].counters.len()
    }

    pub fn counter(&self, bank: usize, row: RowId) -> Option<u32> {
        self.banks[bank].counters.get(&row).copied()
    }

    pub fn max_ptr(&self, bank: usize) -> Option<RowId> {
        self.banks[bank].max_ptr
    }

    pub fn min_ptr(&self, bank: usize) -> Option<RowId> {
        self.banks[bank].min_ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(num_table_entries: u32, adaptive: u32, rfm: u32) -> MithrilTracker {
        let config = MithrilConfig {
            num_table_entries: Some(num_table_entries),
            adaptive_threshold: Some(adaptive),
            rfm_threshold: Some(rfm),
            debug: false,
        };
        MithrilTracker::new(&config, 1).unwrap()
    }

    fn activate(t: &mut MithrilTracker, rows: &[RowId]) -> Vec<RowId> {
        let mut refreshes = Vec::new();
        for &row in rows {
            t.on_activation(0, row);
            if let Some(victim) = t.maybe_trigger_rfm(0) {
                refreshes.push(victim);
            }
        }
        refreshes
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = MithrilConfig {
            num_table_entries: Some(0),
            adaptive_threshold: Some(3),
            rfm_threshold: Some(5),
            debug: false,
        };
        assert!(MithrilTracker::new(&config, 1).is_err());
    }

    #[test]
    fn rejects_unset_required_parameter() {
        let config = MithrilConfig {
            num_table_entries: Some(4),
            ..Default::default()
        };
        assert!(MithrilTracker::new(&config, 1).is_err());
    }

    #[test]
    fn single_hot_row_triggers_vrr() {
        let mut t = tracker(4, 3, 5);
        let refreshes = activate(&mut t, &[10, 10, 10, 10, 10]);
        // RAA hits 5 on the fifth ACT; diff = 5 - 0 (table not full) >= 3.
        assert_eq!(refreshes, vec![10]);
        assert_eq!(t.raa_counter(0), 0);
        // The hot row is forgiven down to the minimum count.
        assert_eq!(t.counter(0, 10), Some(0));
    }

    #[test]
    fn hot_row_below_threshold_does_not_trigger() {
        let mut t = tracker(4, 3, 5);
        let refreshes = activate(&mut t, &[10, 10, 20, 30, 40]);
        assert!(refreshes.is_empty());
        // RAA still resets after the RFM evaluation.
        assert_eq!(t.raa_counter(0), 0);
        assert_eq!(t.counter(0, 10), Some(2));
        assert_eq!(t.counter(0, 20), Some(1));
        assert_eq!(t.counter(0, 30), Some(1));
        assert_eq!(t.counter(0, 40), Some(1));
    }

    #[test]
    fn full_table_replacement_inherits_min_count() {
        let mut t = tracker(4, 3, 100);
        activate(&mut t, &[10, 10, 20, 30, 40]);
        assert_eq!(t.table_len(0), 4);

        activate(&mut t, &[50]);
        assert_eq!(t.table_len(0), 4);
        assert_eq!(t.counter(0, 50), Some(2));
        assert_eq!(t.min_ptr(0), Some(50));
        // One of the count-1 rows was evicted; row 10 stays.
        assert_eq!(t.counter(0, 10), Some(2));
    }

    #[test]
    fn max_ptr_tracks_maximum() {
        let mut t = tracker(4, 100, 1000);
        activate(&mut t, &[1, 2, 3, 2, 2, 3, 3, 3]);
        assert_eq!(t.max_ptr(0), Some(3));
        let max = t.counter(0, 3).unwrap();
        for row in [1, 2, 4] {
            if let Some(count) = t.counter(0, row) {
                assert!(count <= max);
            }
        }
    }

    #[test]
    fn max_ptr_moves_on_equal_count_replacement() {
        // Capacity one: every new row evicts the previous max/min entry.
        let mut t = tracker(1, 100, 1000);
        activate(&mut t, &[7]);
        assert_eq!(t.max_ptr(0), Some(7));
        activate(&mut t, &[8]);
        assert_eq!(t.max_ptr(0), Some(8));
        assert_eq!(t.counter(0, 8), Some(2));
        assert_eq!(t.counter(0, 7), None);
    }

    #[test]
    fn min_ptr_unchanged_when_no_smaller() {
        let mut t = tracker(4, 100, 1000);
        // Row 5 is inserted last and becomes min; activating it again finds
        // rows with equal (not smaller) counts, so the pointer stays put.
        activate(&mut t, &[5, 5]);
        assert_eq!(t.min_ptr(0), Some(5));
        assert_eq!(t.counter(0, 5), Some(2));
    }

    #[test]
    fn min_ptr_rescans_to_smaller_entry() {
        let mut t = tracker(4, 100, 1000);
        activate(&mut t, &[5, 6]);
        assert_eq!(t.min_ptr(0), Some(6));
        activate(&mut t, &[6]);
        // Row 5 now has the strictly smaller count.
        assert_eq!(t.min_ptr(0), Some(5));
    }

    #[test]
    fn raa_window_spans_exactly_rfm_threshold() {
        let mut t = tracker(4, 1, 3);
        t.on_activation(0, 10);
        assert_eq!(t.maybe_trigger_rfm(0), None);
        t.on_activation(0, 10);
        assert_eq!(t.maybe_trigger_rfm(0), None);
        assert_eq!(t.raa_counter(0), 2);
        t.on_activation(0, 10);
        // Third ACT closes the window: diff = 3 - 0 >= 1.
        assert_eq!(t.maybe_trigger_rfm(0), Some(10));
        assert_eq!(t.raa_counter(0), 0);
    }

    #[test]
    fn counter_reset_law() {
        let mut t = tracker(2, 1, 6);
        // Fill the table so the minimum is a real count.
        let refreshes = activate(&mut t, &[10, 10, 10, 10, 20, 10]);
        assert_eq!(refreshes, vec![10]);
        // min_ptr was row 20 with count 1; row 10 is reset to exactly that.
        assert_eq!(t.counter(0, 10), Some(1));
    }

    #[test]
    fn rfm_on_empty_table_is_quiet() {
        let mut t = tracker(4, 1, 2);
        t.increment_raa(0);
        assert_eq!(t.maybe_trigger_rfm(0), None);
        t.increment_raa(0);
        // Window closes with nothing tracked; RAA resets, no refresh.
        assert_eq!(t.maybe_trigger_rfm(0), None);
        assert_eq!(t.raa_counter(0), 0);
    }

    #[test]
    fn table_never_exceeds_capacity() {
        let mut t = tracker(3, 1000, 10000);
        for row in 0..100 {
            t.on_activation(0, row % 17);
            t.maybe_trigger_rfm(0);
            assert!(t.table_len(0) <= 3);
        }
    }

    #[test]
    fn banks_are_independent() {
        let config = MithrilConfig {
            num_table_entries: Some(4),
            adaptive_threshold: Some(3),
            rfm_threshold: Some(5),
            debug: false,
        };
        let mut t = MithrilTracker::new(&config, 2).unwrap();
        for _ in 0..4 {
            t.on_activation(0, 10);
            assert_eq!(t.maybe_trigger_rfm(0), None);
        }
        assert_eq!(t.raa_counter(0), 4);
        assert_eq!(t.raa_counter(1), 0);
        t.on_activation(1, 10);
        assert_eq!(t.maybe_trigger_rfm(1), None);
        assert_eq!(t.counter(1, 10), Some(1));
    }
}
