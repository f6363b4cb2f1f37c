use log::debug;

use crate::config::{ConfigError, MsCacheConfig};
use crate::dram::{
    CommandTable, CtrlRequest, DramCommand, DramSpec, Request, RequestKind, RequestSink,
};
use crate::mscache::MsCache;
use crate::plugin::ControllerPlugin;
use crate::topology::BankTopology;

#[derive(Debug, Clone, Copy, Default)]
pub struct MsCachePluginStats {
    pub writeback_requests: u64,
}

impl MsCachePluginStats {
    pub fn report(&self) -> Vec<(&'static str, u64)> {
        vec![("total_num_writeback_requests", self.writeback_requests)]
    }
}

/// Memory-side cache plugin: one cache per bank, dirty write-backs injected
/// as priority writes on every precharge.
pub struct MsCachePlugin {
    commands: CommandTable,
    topology: BankTopology,
    caches: Vec<MsCache>,
    stats: MsCachePluginStats,
    channel_id: usize,
    debug: bool,
}

impl MsCachePlugin {
    pub fn new(
        config: &MsCacheConfig,
        spec: &DramSpec,
        channel_id: usize,
    ) -> Result<Self, ConfigError> {
        let commands = CommandTable::resolve(spec)?;
        spec.require_request(RequestKind::Write.symbol())?;
        let topology = BankTopology::new(spec)?;
        let mut caches = Vec::with_capacity(topology.num_banks());
        for _ in 0..topology.num_banks() {
            caches.push(MsCache::new(config)?);
        }
        Ok(Self {
            commands,
            topology,
            caches,
            stats: MsCachePluginStats::default(),
            channel_id,
            debug: config.debug,
        })
    }

    pub fn channel_id(&self) -> usize {
        self.channel_id
    }

    pub fn stats(&self) -> MsCachePluginStats {
        self.stats
    }

    /// Forward a refresh notification from the controller so the bank's
    /// white-list learns the row.
    pub fn record_refresh(&mut self, bank: usize, row: usize) {
        self.caches[bank].record_refresh(row);
    }

    fn trace(&self, cmd: DramCommand, req: &CtrlRequest, bank: usize) {
        debug!(
            "mscache[ch{}]: {} rank {} bank {} index {} row {} col {}",
            self.channel_id,
            cmd.trace_name(),
            req.addr_vec[self.topology.rank_level()],
            req.addr_vec[self.topology.bank_level()],
            bank,
            self.topology.row_of(&req.addr_vec),
            self.topology.col_of(&req.addr_vec)
        );
    }
}

/// Drain one bank's dirty buffer into priority write requests. Free function
/// over the pieces so the combined plugin can share it without borrowing the
/// whole host.
pub(super) fn flush_dirty(
    cache: &mut MsCache,
    topology: &BankTopology,
    bank: usize,
    sink: &mut dyn RequestSink,
) -> u64 {
    let entries = cache.drain_dirty();
    let emitted = entries.len() as u64;
    for (row, col) in entries {
        let mut addr_vec = topology.bank_template(bank).clone();
        addr_vec[topology.row_level()] = row;
        addr_vec[topology.col_level()] = col;
        sink.priority_send(Request {
            addr_vec,
            kind: RequestKind::Write,
        });
    }
    emitted
}

impl ControllerPlugin for MsCachePlugin {
    fn update(&mut self, request: Option<&CtrlRequest>, sink: &mut dyn RequestSink) {
        let Some(req) = request else {
            return;
        };
        let Some(cmd) = self.commands.decode(req.command) else {
            return;
        };
        let bank = self.topology.flat_bank_id(&req.addr_vec);
        if self.debug {
            self.trace(cmd, req, bank);
        }

        match cmd {
            DramCommand::Act => {
                self.caches[bank].on_act(self.topology.row_of(&req.addr_vec));
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
                // Keep the status register windowed even though this plugin
                // has no tracker consuming it.
                let _ = self.caches[bank].take_status();
            }
            DramCommand::Vrr => {}
        }
    }
}
