//! RTT/RTO estimation (§4.2), Jacobson/Karels smoothing with Karn's rule.

use std::time::Duration;

/// Smoothing gain for SRTT (`alpha = 1/8`).
const ALPHA_NUM: u32 = 1;
const ALPHA_DEN: u32 = 8;
/// Smoothing gain for RTTVAR (`beta = 1/4`).
const BETA_NUM: u32 = 1;
const BETA_DEN: u32 = 4;
/// RTO used before the first sample arrives.
const INITIAL_RTO_MS: u32 = 500;

/// Tracks smoothed RTT and the derived retransmission timeout.
///
/// Samples must come from an unambiguous exchange: a packet sent exactly
/// once, acked exactly once. The sender enforces this (Karn's rule) by
/// never calling [`RttEstimator::update`] for a sequence that has been
/// retransmitted.
#[derive(Debug, Clone, Copy)]
pub struct RttEstimator {
    srtt_ms: Option<f64>,
    rttvar_ms: f64,
    rto_ms: u32,
    rto_min_ms: u32,
    rto_max_ms: u32,
}

impl RttEstimator {
    pub fn new(rto_min_ms: u32, rto_max_ms: u32) -> Self {
        Self {
            srtt_ms: None,
            rttvar_ms: 0.0,
            rto_ms: INITIAL_RTO_MS.clamp(rto_min_ms, rto_max_ms),
            rto_min_ms,
            rto_max_ms,
        }
    }

    /// Fold in a new unambiguous RTT sample and recompute the RTO.
    pub fn update(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;
        match self.srtt_ms {
            None => {
                self.srtt_ms = Some(sample_ms);
                self.rttvar_ms = sample_ms / 2.0;
            }
            Some(srtt) => {
                let delta = (srtt - sample_ms).abs();
                self.rttvar_ms +=
                    (delta - self.rttvar_ms) * BETA_NUM as f64 / BETA_DEN as f64;
                let new_srtt = srtt + (sample_ms - srtt) * ALPHA_NUM as f64 / ALPHA_DEN as f64;
                self.srtt_ms = Some(new_srtt);
            }
        }
        self.recompute_rto();
    }

    fn recompute_rto(&mut self) {
        let srtt = self.srtt_ms.unwrap_or(INITIAL_RTO_MS as f64);
        let rto = srtt + 4.0 * self.rttvar_ms;
        self.rto_ms = (rto.round() as u32).clamp(self.rto_min_ms, self.rto_max_ms);
    }

    pub fn srtt(&self) -> Option<Duration> {
        self.srtt_ms.map(|ms| Duration::from_secs_f64(ms / 1000.0))
    }

    pub fn rttvar_ms(&self) -> f64 {
        self.rttvar_ms
    }

    /// Current retransmission timeout, already clamped to `[rto_min, rto_max]`.
    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.rto_ms as u64)
    }
}

impl std::fmt::Display for RttEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.srtt_ms {
            Some(srtt) => write!(f, "srtt={srtt:.1}ms rttvar={:.1}ms rto={}ms", self.rttvar_ms, self.rto_ms),
            None => write!(f, "srtt=unset rto={}ms", self.rto_ms),
        }
    }
}
