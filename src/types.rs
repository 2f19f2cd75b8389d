use serde::{Deserialize, Serialize};

/// One entry of the port catalog: a labelled TCP port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: String,
    pub port: u16,
    pub protocol: String,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            protocol: protocol.into(),
        }
    }
}

/// Outcome of a single probe. Every connect failure is `Closed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
        }
    }
}

/// One probed (target, port) pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ip: String,
    pub port: PortSpec,
    pub status: PortStatus,
}

/// Consistent copy of the run counters, as returned by the status endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub total: u64,
    pub current: u64,
    pub is_running: bool,
    /// RFC 3339 start time of the current or most recent run.
    pub started_at: Option<String>,
}
