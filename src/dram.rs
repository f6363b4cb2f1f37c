use crate::config::ConfigError;

/// Logical address components, one entry per DRAM organisation level, in the
/// order the model declares them (rank, bankgroup?, bank, row, column).
pub type AddrVec = Vec<usize>;

pub type RowId = usize;
pub type ColId = usize;

#[derive(Debug, Clone)]
pub struct DramLevel {
    pub name: String,
    pub count: usize,
}

/// The slice of the DRAM model a controller plugin consumes: level names and
/// sizes plus the command/request symbol tables, each indexed by the model's
/// integer id.
#[derive(Debug, Clone)]
pub struct DramSpec {
    pub levels: Vec<DramLevel>,
    pub commands: Vec<String>,
    pub requests: Vec<String>,
}

impl DramSpec {
    pub fn level_index(&self, name: &str) -> Option<usize> {
        self.levels.iter().position(|level| level.name == name)
    }

    pub fn command_id(&self, name: &str) -> Option<usize> {
        self.commands.iter().position(|cmd| cmd == name)
    }

    pub fn request_id(&self, name: &str) -> Option<usize> {
        self.requests.iter().position(|req| req == name)
    }

    pub fn require_request(&self, name: &'static str) -> Result<usize, ConfigError> {
        self.request_id(name)
            .ok_or(ConfigError::MissingRequest(name))
    }
}

/// Closed command set of the protocols this plugin suite understands.
/// Resolved from the model's symbol table once at setup; the per-cycle paths
/// never see raw integer ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DramCommand {
    Act,
    Rd,
    Wr,
    Rda,
    Wra,
    Pre,
    Vrr,
}

impl DramCommand {
    pub const ALL: [DramCommand; 7] = [
        DramCommand::Act,
        DramCommand::Rd,
        DramCommand::Wr,
        DramCommand::Rda,
        DramCommand::Wra,
        DramCommand::Pre,
        DramCommand::Vrr,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            DramCommand::Act => "ACT",
            DramCommand::Rd => "RD",
            DramCommand::Wr => "WR",
            DramCommand::Rda => "RDA",
            DramCommand::Wra => "WRA",
            DramCommand::Pre => "PRE",
            DramCommand::Vrr => "VRR",
        }
    }

    /// Human-readable name used by the debug traces.
    pub fn trace_name(&self) -> &'static str {
        match self {
            DramCommand::Act => "ACT",
            DramCommand::Rd => "READ",
            DramCommand::Wr => "WRITE",
            DramCommand::Rda => "READ+PRE",
            DramCommand::Wra => "WRITE+PRE",
            DramCommand::Pre => "PRE",
            DramCommand::Vrr => "VRR",
        }
    }
}

/// Command-id decode table built from a `DramSpec`. Ids the plugin does not
/// care about decode to `None` and are ignored upstream.
#[derive(Debug, Clone)]
pub struct CommandTable {
    by_id: Vec<Option<DramCommand>>,
}

impl CommandTable {
    pub fn resolve(spec: &DramSpec) -> Result<Self, ConfigError> {
        if spec.command_id(DramCommand::Vrr.symbol()).is_none() {
            return Err(ConfigError::MissingVrrCommand);
        }
        let mut by_id = vec![None; spec.commands.len()];
        for cmd in DramCommand::ALL {
            if let Some(id) = spec.command_id(cmd.symbol()) {
                by_id[id] = Some(cmd);
            }
        }
        Ok(Self { by_id })
    }

    pub fn decode(&self, command_id: usize) -> Option<DramCommand> {
        self.by_id.get(command_id).copied().flatten()
    }
}

/// The request the controller selected this cycle, as handed to the plugin.
#[derive(Debug, Clone)]
pub struct CtrlRequest {
    pub command: usize,
    pub addr_vec: AddrVec,
}

/// Outbound side-request kinds a plugin may inject ahead of the controller
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Write,
    VictimRowRefresh,
}

impl RequestKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            RequestKind::Write => "write",
            RequestKind::VictimRowRefresh => "victim-row-refresh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub addr_vec: AddrVec,
    pub kind: RequestKind,
}

/// Priority-send channel into the controller. Injected requests bypass the
/// normal admission queue; once handed off they must not be mutated.
pub trait RequestSink {
    fn priority_send(&mut self, request: Request);
}

impl RequestSink for Vec<Request> {
    fn priority_send(&mut self, request: Request) {
        self.push(request);
    }
}
