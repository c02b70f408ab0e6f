// Stable error codes returned in API error bodies.

pub mod validation {
    pub const INVALID_FORMAT: &str = "VALIDATION_1003";
    pub const INVALID_EVENT: &str = "VALIDATION_1004";
}

pub mod authentication {
    pub const TOKEN_MISSING: &str = "AUTH_2001";
    pub const TOKEN_INVALID: &str = "AUTH_2002";
}

pub mod database {
    pub const QUERY_FAILED: &str = "DB_4002";
}

pub mod sync {
    /// The client's `lastKnownServerSeq` is behind the scope head.
    pub const STALE_SEQUENCE: &str = "SYNC_5001";
    pub const UNKNOWN_SCOPE: &str = "SYNC_5002";
}

pub mod checkin {
    pub const NOT_FOUND: &str = "CHECKIN_6001";
    pub const INVALID_STATE: &str = "CHECKIN_6002";
    pub const INVALID_INPUT: &str = "CHECKIN_6003";
}

pub mod system {
    pub const INTERNAL: &str = "SYS_9000";
    pub const CONFIGURATION: &str = "SYS_9001";
}
