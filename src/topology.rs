use crate::config::ConfigError;
use crate::dram::{AddrVec, DramSpec};

/// Maps logical address vectors onto dense flat bank ids and back.
///
/// Flat ids enumerate every `(rank, bankgroup?, bank)` combination, so all
/// per-bank plugin state can live in plain vectors. The inverse direction is
/// enumerated once at setup: one address-vector template per bank with the
/// bank coordinates filled in and row/column zeroed.
#[derive(Debug, Clone)]
pub struct BankTopology {
    rank_level: usize,
    bank_level: usize,
    row_level: usize,
    col_level: usize,
    counts: Vec<usize>,
    templates: Vec<AddrVec>,
}

impl BankTopology {
    pub fn new(spec: &DramSpec) -> Result<Self, ConfigError> {
        let rank_level = spec
            .level_index("rank")
            .ok_or(ConfigError::MissingLevel("rank"))?;
        let bank_level = spec
            .level_index("bank")
            .ok_or(ConfigError::MissingLevel("bank"))?;
        let row_level = spec
            .level_index("row")
            .ok_or(ConfigError::MissingLevel("row"))?;
        let col_level = spec
            .level_index("column")
            .ok_or(ConfigError::MissingLevel("column"))?;
        let counts: Vec<usize> = spec.levels.iter().map(|level| level.count).collect();

        let num_banks: usize = counts[rank_level..=bank_level].iter().product();
        let mut templates = Vec::with_capacity(num_banks);
        for flat in 0..num_banks {
            let mut addr_vec = vec![0; counts.len()];
            let mut rem = flat;
            for level in (rank_level..=bank_level).rev() {
                addr_vec[level] = rem % counts[level];
                rem /= counts[level];
            }
            templates.push(addr_vec);
        }

        Ok(Self {
            rank_level,
            bank_level,
            row_level,
            col_level,
            counts,
            templates,
        })
    }

    /// Flatten the rank/bankgroup/bank coordinates of `addr_vec` into a dense
    /// bank id.
    pub fn flat_bank_id(&self, addr_vec: &AddrVec) -> usize {
        let mut flat = addr_vec[self.bank_level];
        let mut acc = 1;
        for level in (self.rank_level..self.bank_level).rev() {
            acc *= self.counts[level + 1];
            flat += addr_vec[level] * acc;
        }
        flat
    }

    /// Address-vector template for `flat_bank_id`: bank coordinates set, row
    /// and column zero.
    pub fn bank_template(&self, flat_bank_id: usize) -> &AddrVec {
        &self.templates[flat_bank_id]
    }

    pub fn num_banks(&self) -> usize {
        self.templates.len()
    }

    pub fn row_level(&self) -> usize {
        self.row_level
    }

    pub fn col_level(&self) -> usize {
        self.col_level
    }

    pub fn rank_level(&self) -> usize {
        self.rank_level
    }

    pub fn bank_level(&self) -> usize {
        self.bank_level
    }

    pub fn row_of(&self, addr_vec: &AddrVec) -> usize {
        addr_vec[self.row_level]
    }

    pub fn col_of(&self, addr_vec: &AddrVec) -> usize {
        addr_vec[self.col_level]
    }
}
