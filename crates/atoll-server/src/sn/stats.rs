//! Process-lifetime statistics backing the management endpoint.
//!
//! All counters are monotonic. `reg_super_nak` is reserved: no code
//! path declines a registration, but the field keeps the management
//! block layout stable.

/// Counters and last-event timestamps (seconds since epoch).
#[derive(Debug, Clone)]
pub struct SnStats {
    /// Errors encountered (decode failures, failed sends).
    pub errors: u64,
    /// REGISTER_SUPER requests received.
    pub reg_super: u64,
    /// REGISTER_SUPER requests declined. Reserved, never incremented.
    pub reg_super_nak: u64,
    /// Datagrams forwarded to a unicast destination.
    pub fwd: u64,
    /// Datagrams broadcast to community members.
    pub broadcast: u64,
    /// When the last PACKET/REGISTER was handled.
    pub last_fwd: u64,
    /// When the last REGISTER_SUPER was handled.
    pub last_reg_super: u64,
}

impl SnStats {
    /// Fresh counters. The last-event timestamps start at process
    /// start so the management block reports sane ages before any
    /// traffic arrives.
    pub fn new(start_time: u64) -> Self {
        Self {
            errors: 0,
            reg_super: 0,
            reg_super_nak: 0,
            fwd: 0,
            broadcast: 0,
            last_fwd: start_time,
            last_reg_super: start_time,
        }
    }
}
