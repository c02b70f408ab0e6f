//! Route path constants

pub mod health {
    pub const HEALTH: &str = "/health";
}

pub mod api_v1 {
    pub const SYNC_BASELINE: &str = "/api/v1/sync/:scope/baseline";
    pub const SYNC_DELTAS: &str = "/api/v1/sync/:scope/deltas";
    pub const SYNC_EVENTS: &str = "/api/v1/sync/:scope/events";
    pub const TICKET_CHECK_IN: &str = "/api/v1/tickets/check-in";
}
