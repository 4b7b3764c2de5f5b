/// Connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle. Initial state, and the state after a normal closure.
    Disconnected,
    /// Opening the connection
    Connecting,
    /// Open; heartbeat running, outbound frames written directly
    Connected,
    /// Waiting out the backoff delay before reconnect `attempt`
    Reconnecting { attempt: u32 },
    /// Reconnect budget exhausted. Only an explicit connect leaves this state.
    PermanentlyFailed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// No automatic transition will leave this state
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Disconnected | Self::PermanentlyFailed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::PermanentlyFailed => write!(f, "permanently failed"),
        }
    }
}
