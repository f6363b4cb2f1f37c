use log::debug;

use crate::config::{ConfigError, MithrilCacheConfig};
use crate::dram::{
    CommandTable, CtrlRequest, DramCommand, DramSpec, Request, RequestKind, RequestSink, RowId,
};
use crate::mscache::{CacheStatus, MsCache};
use crate::plugin::mscache::flush_dirty;
use crate::plugin::ControllerPlugin;
use crate::topology::BankTopology;
use crate::tracker::MithrilTracker;

#[derive(Debug, Clone, Copy, Default)]
pub struct MithrilCacheStats {
    pub writeback_requests: u64,
    pub read_miss_acts: u64,
    pub write_miss_acts: u64,
    pub mix_miss_acts: u64,
}

impl MithrilCacheStats {
    pub fn report(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("total_num_writeback_requests", self.writeback_requests),
            ("Total ACTs due to read", self.read_miss_acts),
            ("Total ACTs due to write", self.write_miss_acts),
            ("Total ACTs due to mix of read/write", self.mix_miss_acts),
        ]
    }
}

/// Combined plugin: the memory-side cache filters which activations the
/// Mithril+ tracker sees. Every real ACT charges the bank's RAA counter, but
/// the counter table only learns the row once the window closes with a miss
/// status, classified as read-, write-, or mixed-induced.
pub struct MithrilCachePlugin {
    commands: CommandTable,
    topology: BankTopology,
    caches: Vec<MsCache>,
    tracker: MithrilTracker,
    stats: MithrilCacheStats,
    channel_id: usize,
    debug: bool,
}

impl MithrilCachePlugin {
    pub fn new(
        config: &MithrilCacheConfig,
        spec: &DramSpec,
        channel_id: usize,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let commands = CommandTable::resolve(spec)?;
        spec.require_request(RequestKind::Write.symbol())?;
        spec.require_request(RequestKind::VictimRowRefresh.symbol())?;
        let topology = BankTopology::new(spec)?;
        let cache_config = config.cache();
        let mut caches = Vec::with_capacity(topology.num_banks());
        for _ in 0..topology.num_banks() {
            caches.push(MsCache::new(&cache_config)?);
        }
        let tracker = MithrilTracker::new(&config.tracker(), topology.num_banks())?;
        Ok(Self {
            commands,
            topology,
            caches,
            tracker,
            stats: MithrilCacheStats::default(),
            channel_id,
            debug: config.debug,
        })
    }

    pub fn channel_id(&self) -> usize {
        self.channel_id
    }

    pub fn stats(&self) -> MithrilCacheStats {
        self.stats
    }

    pub fn tracker(&self) -> &MithrilTracker {
        &self.tracker
    }

    pub fn record_refresh(&mut self, bank: usize, row: RowId) {
        self.caches[bank].record_refresh(row);
    }

    fn vrr_request(&self, bank: usize, row: RowId) -> Request {
        let mut addr_vec = self.topology.bank_template(bank).clone();
        addr_vec[self.topology.row_level()] = row;
        Request {
            addr_vec,
            kind: RequestKind::VictimRowRefresh,
        }
    }
}

impl ControllerPlugin for MithrilCachePlugin {
    fn update(&mut self, request: Option<&CtrlRequest>, sink: &mut dyn RequestSink) {
        let Some(req) = request else {
            return;
        };
        let Some(cmd) = self.commands.decode(req.command) else {
            return;
        };
        let bank = self.topology.flat_bank_id(&req.addr_vec);
        if self.debug {
            debug!(
                "mithril-cache[ch{}]: {} rank {} bank {} index {} row {} col {}",
                self.channel_id,
                cmd.trace_name(),
                req.addr_vec[self.topology.rank_level()],
                req.addr_vec[self.topology.bank_level()],
                bank,
                self.topology.row_of(&req.addr_vec),
                self.topology.col_of(&req.addr_vec)
            );
        }

        match cmd {
            DramCommand::Act => {
                self.caches[bank].on_act(self.topology.row_of(&req.addr_vec));
                self.tracker.increment_raa(bank);
            }
            DramCommand::Rd => {
                self.caches[bank].on_access(self.topology.col_of(&req.addr_vec), false);
            }
            DramCommand::Wr => {
                self.caches[bank].on_access(self.topology.col_of(&req.addr_vec), true);
            }
            DramCommand::Pre | DramCommand::Rda | DramCommand::Wra => {
                if cmd != DramCommand::Pre {
                    let is_write = cmd == DramCommand::Wra;
                    self.caches[bank].on_access(self.topology.col_of(&req.addr_vec), is_write);
                }
                self.caches[bank].on_pre();
                self.stats.writeback_requests +=
                    flush_dirty(&mut self.caches[bank], &self.topology, bank, sink);

                let status = self.caches[bank].take_status();
                if status != CacheStatus::Hit {
                    let row = self.topology.row_of(&req.addr_vec);
                    self.tracker.record_activation(bank, row);
                    match status {
                        CacheStatus::MissRead => self.stats.read_miss_acts += 1,
                        CacheStatus::MissWrite => self.stats.write_miss_acts += 1,
                        CacheStatus::MissMix => self.stats.mix_miss_acts += 1,
                        CacheStatus::Hit => unreachable!(),
                    }
                }
            }
            DramCommand::Vrr => {}
        }

        // The RAA window is evaluated every dispatched cycle; it can only
        // fill on an ACT, so a refresh goes out on that same cycle.
        if let Some(victim) = self.tracker.maybe_trigger_rfm(bank) {
            sink.priority_send(self.vrr_request(bank, victim));
        }
    }
}
