use log::debug;

use crate::config::{ConfigError, MithrilConfig};
use crate::dram::{
    CommandTable, CtrlRequest, DramCommand, DramSpec, Request, RequestKind, RequestSink, RowId,
};
use crate::plugin::ControllerPlugin;
use crate::topology::BankTopology;
use crate::tracker::MithrilTracker;

/// Standalone Mithril+ plugin: tracks every activation and schedules victim
/// row refreshes, with no cache in front.
#[derive(Debug)]
pub struct MithrilPlugin {
    commands: CommandTable,
    topology: BankTopology,
    tracker: MithrilTracker,
    channel_id: usize,
    debug: bool,
}

impl MithrilPlugin {
    pub fn new(
        config: &MithrilConfig,
        spec: &DramSpec,
        channel_id: usize,
    ) -> Result<Self, ConfigError> {
        let commands = CommandTable::resolve(spec)?;
        spec.require_request(RequestKind::VictimRowRefresh.symbol())?;
        let topology = BankTopology::new(spec)?;
        let tracker = MithrilTracker::new(config, topology.num_banks())?;
        Ok(Self {
            commands,
            topology,
            tracker,
            channel_id,
            debug: config.debug,
        })
    }

    pub fn channel_id(&self) -> usize {
        self.channel_id
    }

    pub fn tracker(&self) -> &MithrilTracker {
        &self.tracker
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

impl ControllerPlugin for MithrilPlugin {
    fn update(&mut self, request: Option<&CtrlRequest>, sink: &mut dyn RequestSink) {
        let Some(req) = request else {
            return;
        };
        if self.commands.decode(req.command) != Some(DramCommand::Act) {
            return;
        }

        let bank = self.topology.flat_bank_id(&req.addr_vec);
        let row = self.topology.row_of(&req.addr_vec);
        if self.debug {
            debug!(
                "mithril[ch{}]: ACT rank {} bank {} index {} row {}",
                self.channel_id,
                req.addr_vec[self.topology.rank_level()],
                req.addr_vec[self.topology.bank_level()],
                bank,
                row
            );
        }

        self.tracker.on_activation(bank, row);
        if let Some(victim) = self.tracker.maybe_trigger_rfm(bank) {
            sink.priority_send(self.vrr_request(bank, victim));
        }
    }
}
