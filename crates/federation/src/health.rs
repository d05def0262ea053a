//! Peer health classification: a probe that times out is treated the same
//! as one that errors, since both are indistinguishable from the caller's
//! perspective.

use forge_primitives::PeerStatus;

/// Outcome of a single health probe, independent of the HTTP client used
/// to make it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Status(u16),
    /// The request never got a response in time.
    Timeout,
    /// The peer was unreachable (DNS, TCP refusal, TLS failure, ...).
    ConnectError,
}

/// Classifies a health probe outcome into a [`PeerStatus`].
///
/// The original protocol mapped a timed-out probe to `DEGRADED`; this spec
/// explicitly redesigns that to `OFFLINE`, since a peer that cannot answer
/// a health check within the timeout is indistinguishable from one that
/// cannot be reached at all.
pub fn classify_health(outcome: ProbeOutcome) -> PeerStatus {
    match outcome {
        ProbeOutcome::Status(200) => PeerStatus::Active,
        ProbeOutcome::Status(_) => PeerStatus::Degraded,
        ProbeOutcome::Timeout | ProbeOutcome::ConnectError => PeerStatus::Offline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_200_is_active() {
        assert_eq!(classify_health(ProbeOutcome::Status(200)), PeerStatus::Active);
    }

    #[test]
    fn server_errors_are_degraded() {
        assert_eq!(classify_health(ProbeOutcome::Status(503)), PeerStatus::Degraded);
        assert_eq!(classify_health(ProbeOutcome::Status(500)), PeerStatus::Degraded);
    }

    #[test]
    fn other_non_200_statuses_are_degraded() {
        assert_eq!(classify_health(ProbeOutcome::Status(404)), PeerStatus::Degraded);
    }

    #[test]
    fn timeout_and_connect_error_are_offline() {
        assert_eq!(classify_health(ProbeOutcome::Timeout), PeerStatus::Offline);
        assert_eq!(classify_health(ProbeOutcome::ConnectError), PeerStatus::Offline);
    }
}
