//! Per-sink bookkeeping held by a `Source`: one entry per registered
//! receiver, tracking its endpoint, invitation state, and last-seen ping
//! round trip.

use crate::endpoint::{Endpoint, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Registered via `add_sink`; streaming starts immediately.
    Active,
    /// Awaiting `accept_invitation` after this sink invited us.
    Invited,
}

pub struct SinkDescriptor {
    pub endpoint: Endpoint,
    pub state: SinkState,
    pub last_ping_rtt: Option<f64>,
    pub last_ping_sent: Option<f64>,
    /// Whether this sink has been sent a `/format` announce for the
    /// Source's current format. Reset whenever `set_format` changes it.
    pub format_announced: bool,
}

impl SinkDescriptor {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: SinkState::Active,
            last_ping_rtt: None,
            last_ping_sent: None,
            format_announced: false,
        }
    }

    pub fn invited(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: SinkState::Invited,
            last_ping_rtt: None,
            last_ping_sent: None,
            format_announced: false,
        }
    }

    pub fn id(&self) -> Id {
        self.endpoint.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sink_is_active_by_default() {
        let sink = SinkDescriptor::new(Endpoint::new(vec![1, 2, 3], 9));
        assert_eq!(sink.state, SinkState::Active);
        assert_eq!(sink.id(), 9);
    }
}
