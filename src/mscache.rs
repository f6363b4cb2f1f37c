use std::collections::{HashMap, VecDeque};

use crate::config::{ConfigError, DrainPolicy, MsCacheConfig};
use crate::dram::{ColId, RowId};

/// Packed line address: `(row << col_bits) | col`.
type Addr = usize;

/// Outcome of one ACT..PRE window, as seen by the combined plugin after the
/// precharge. `Hit` means every access in the window was served from the
/// cache and the activation should not be charged to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    MissRead,
    MissWrite,
    MissMix,
}

/// Miss accumulator for the current window. Two flags instead of a
/// four-state register; the combined status is derived on read.
#[derive(Debug, Default, Clone, Copy)]
struct StatusReg {
    saw_read_miss: bool,
    saw_write_miss: bool,
}

impl StatusReg {
    fn record(&mut self, is_write: bool) {
        if is_write {
            self.saw_write_miss = true;
        } else {
            self.saw_read_miss = true;
        }
    }

    fn take(&mut self) -> CacheStatus {
        let status = match (self.saw_read_miss, self.saw_write_miss) {
            (false, false) => CacheStatus::Hit,
            (true, false) => CacheStatus::MissRead,
            (false, true) => CacheStatus::MissWrite,
            (true, true) => CacheStatus::MissMix,
        };
        *self = StatusReg::default();
        status
    }
}

#[derive(Debug, Clone, Copy)]
struct Line {
    addr: Addr,
    tag: Addr,
    dirty: bool,
}

/// One associativity set. Front of the queue is the LRU way, back is MRU;
/// lookups scan the ways, which stay constant-time for a fixed
/// associativity.
#[derive(Debug, Default)]
struct CacheSet {
    lines: VecDeque<Line>,
}

impl CacheSet {
    fn position(&self, tag: Addr) -> Option<usize> {
        self.lines.iter().position(|line| line.tag == tag)
    }
}

/// Fixed-capacity LRU of recently refreshed rows. Rows absent from the list
/// have untrusted retention and are not worth caching.
#[derive(Debug)]
struct WhiteList {
    rows: VecDeque<RowId>,
    capacity: usize,
}

impl WhiteList {
    fn new(capacity: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, row: RowId) -> bool {
        self.rows.contains(&row)
    }

    fn record(&mut self, row: RowId) {
        if let Some(pos) = self.rows.iter().position(|&r| r == row) {
            self.rows.remove(pos);
        } else if self.rows.len() == self.capacity {
            self.rows.pop_front();
        }
        self.rows.push_back(row);
    }
}

/// Per-bank memory-side cache.
///
/// Tracks which `(row, col)` lines would have been served without opening
/// the row, so the activation tracker only sees real misses. Writes are
/// either deferred to eviction time (write-back, with a dirty buffer feeding
/// priority write-backs) or passed straight through.
#[derive(Debug)]
pub struct MsCache {
    sets: Vec<CacheSet>,
    // Evicted-while-dirty addresses; true = write-back still pending.
    dirty_buffer: HashMap<Addr, bool>,
    num_dirty: usize,
    activated_row: Option<RowId>,
    status: StatusReg,
    white_list: Option<WhiteList>,

    associativity: usize,
    col_bits: u32,
    index_mask: Addr,
    tag_offset: u32,
    write_back: bool,
    drain_policy: DrainPolicy,
    drain_threshold: usize,
}

impl MsCache {
    pub fn new(config: &MsCacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_sets = config.num_sets()? as usize;
        let mut sets = Vec::with_capacity(num_sets);
        sets.resize_with(num_sets, CacheSet::default);
        Ok(Self {
            sets,
            dirty_buffer: HashMap::new(),
            num_dirty: 0,
            activated_row: None,
            status: StatusReg::default(),
            white_list: match config.white_list_size {
                0 => None,
                size => Some(WhiteList::new(size as usize)),
            },
            associativity: config.associativity()? as usize,
            col_bits: config.col_size.trailing_zeros(),
            index_mask: num_sets - 1,
            tag_offset: num_sets.trailing_zeros(),
            write_back: config.write_back_en,
            drain_policy: config.drain_policy,
            drain_threshold: config.drain_threshold as usize,
        })
    }

    pub fn on_act(&mut self, row: RowId) {
        assert!(
            self.activated_row.is_none(),
            "ACT on row {} while row {} is still open",
            row,
            self.activated_row.unwrap()
        );
        self.activated_row = Some(row);
    }

    pub fn on_pre(&mut self) {
        self.activated_row = None;
    }

    /// Column access against the open row.
    pub fn on_access(&mut self, col: ColId, is_write: bool) {
        let row = self
            .activated_row
            .expect("cache access with no open row");
        let addr = self.addr(row, col);

        // Write-through: the write goes to DRAM, nothing is allocated.
        if !self.write_back && is_write {
            self.status.record(true);
            return;
        }

        if let Some(&pending) = self.dirty_buffer.get(&addr) {
            if pending {
                // Hit on in-flight dirty data: promote it back into the
                // cache as a fresh dirty line.
                self.dirty_buffer.remove(&addr);
                self.num_dirty -= 1;
                self.allocate(addr, true);
            } else if is_write {
                // The write-back already went out; this write supersedes it.
                self.dirty_buffer.remove(&addr);
                self.status.record(true);
            }
            return;
        }

        let tag = self.tag(addr);
        let index = self.set_index(addr);
        if let Some(pos) = self.sets[index].position(tag) {
            // Hit: rotate to MRU. Status stays as is.
            let mut line = self.sets[index].lines.remove(pos).unwrap();
            line.dirty |= is_write;
            self.sets[index].lines.push_back(line);
            return;
        }

        // Rows outside the refresh white-list are not allocated; the access
        // behaves like a write-through miss.
        if let Some(white_list) = &self.white_list {
            if !white_list.contains(row) {
                self.status.record(is_write);
                return;
            }
        }

        self.status.record(is_write);
        self.allocate(addr, is_write);
    }

    /// Collect the `(row, col)` pairs that must be written back, according
    /// to the configured drain policy. Drained entries stay in the buffer
    /// with their pending flag cleared until a later write supersedes them.
    pub fn drain_dirty(&mut self) -> Vec<(RowId, ColId)> {
        match self.drain_policy {
            DrainPolicy::Immediate => self.drain_immediate(),
            DrainPolicy::Threshold => {
                if self.num_dirty < self.drain_threshold {
                    return Vec::new();
                }
                self.drain_pending()
            }
        }
    }

    /// Report the window's outcome and reset the register to `Hit`.
    pub fn take_status(&mut self) -> CacheStatus {
        self.status.take()
    }

    /// Note a refresh of `row` so the white-list will admit it. No-op when
    /// white-listing is disabled. The surrounding controller is responsible
    /// for calling this on every refresh it performs.
    pub fn record_refresh(&mut self, row: RowId) {
        if let Some(white_list) = &mut self.white_list {
            white_list.record(row);
        }
    }

    pub fn num_dirty(&self) -> usize {
        self.num_dirty
    }

    fn drain_pending(&mut self) -> Vec<(RowId, ColId)> {
        let mut out = Vec::new();
        for (&addr, pending) in self.dirty_buffer.iter_mut() {
            if *pending {
                out.push((addr >> self.col_bits, addr & ((1 << self.col_bits) - 1)));
                *pending = false;
            }
        }
        self.num_dirty = 0;
        out.sort_unstable();
        out
    }

    fn drain_immediate(&mut self) -> Vec<(RowId, ColId)> {
        let mut out = self.drain_pending();
        if out.is_empty() {
            return out;
        }
        // Batch by row: dirty lines still resident on a row that is being
        // written back anyway go out with it and become clean.
        let col_bits = self.col_bits;
        let rows: Vec<RowId> = out.iter().map(|&(row, _)| row).collect();
        for set in &mut self.sets {
            for line in set.lines.iter_mut() {
                if line.dirty && rows.contains(&(line.addr >> col_bits)) {
                    out.push((
                        line.addr >> col_bits,
                        line.addr & ((1 << col_bits) - 1),
                    ));
                    line.dirty = false;
                }
            }
        }
        out.sort_unstable();
        out
    }

    fn allocate(&mut self, addr: Addr, dirty: bool) {
        let tag = self.tag(addr);
        let index = self.set_index(addr);
        let set = &mut self.sets[index];
        assert!(
            set.position(tag).is_none(),
            "allocating tag {:#x} already resident in set {}",
            tag,
            index
        );
        if set.lines.len() >= self.associativity {
            let victim = set.lines.pop_front().unwrap();
            if victim.dirty {
                self.dirty_buffer.insert(victim.addr, true);
                self.num_dirty += 1;
            }
        }
        set.lines.push_back(Line { addr, tag, dirty });
    }

    fn addr(&self, row: RowId, col: ColId) -> Addr {
        (row << self.col_bits) | col
    }

    fn set_index(&self, addr: Addr) -> usize {
        addr & self.index_mask
    }

    fn tag(&self, addr: Addr) -> Addr {
        addr >> self.tag_offset
    }

    #[cfg(test)]
    fn resident(&self, row: RowId, col: ColId) -> bool {
        let addr = self.addr(row, col);
        self.sets[self.set_index(addr)].position(self.tag(addr)).is_some()
    }

    #[cfg(test)]
    fn line_dirty(&self, row: RowId, col: ColId) -> Option<bool> {
        let addr = self.addr(row, col);
        let set = &self.sets[self.set_index(addr)];
        set.position(self.tag(addr))
            .map(|pos| set.lines[pos].dirty)
    }
}
