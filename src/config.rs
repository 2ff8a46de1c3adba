//! Process-local configuration (§6). No negotiation, no environment
//! variables, no persisted state -- every endpoint is constructed with one
//! of these and it never changes afterward.

/// Tunables for a gameNet endpoint. All fields have the defaults from §6.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Maximum inflight reliable packets (send buffer capacity).
    pub window: usize,
    /// Per-gap head-of-line bound, in milliseconds.
    pub skip_timeout_ms: u32,
    /// Floor for the RTO estimate, in milliseconds.
    pub rto_min_ms: u32,
    /// Ceiling for the RTO estimate, in milliseconds.
    pub rto_max_ms: u32,
    /// Retransmissions allowed before a sequence is abandoned.
    pub max_retries: u32,
    /// Idle-tick granularity for the recv loop, in milliseconds.
    pub sock_recv_timeout_ms: u64,
    /// Width, in sequence numbers, of the SACK bitmap (bits, not bytes).
    pub sack_width: u16,
    /// Cap on the pending send queue (resolves spec.md §9's open question;
    /// chosen as 64x `window` -- generous for steady state, still bounded).
    pub pending_queue_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        let window = 64;
        Self {
            window,
            skip_timeout_ms: 200,
            rto_min_ms: 100,
            rto_max_ms: 2000,
            max_retries: 16,
            sock_recv_timeout_ms: 50,
            sack_width: 64,
            pending_queue_cap: window * 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.window, 64);
        assert_eq!(c.skip_timeout_ms, 200);
        assert_eq!(c.rto_min_ms, 100);
        assert_eq!(c.rto_max_ms, 2000);
        assert_eq!(c.max_retries, 16);
        assert_eq!(c.sock_recv_timeout_ms, 50);
        assert_eq!(c.sack_width, 64);
    }
}
