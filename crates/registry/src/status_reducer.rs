//! Status Reducer collaborator (§4.4, §9 supplemented feature): the core
//! never parses agent telemetry. It hands raw output/metadata to a
//! `StatusReducer` implementation and only stores/relays whatever
//! `StreamSessionStatusModel` comes back.

use harness_protocol::types::StreamSessionStatusModel;

/// One chunk of telemetry a reducer can observe: raw pty bytes, or a
/// structured notification an adapter already parsed out of them.
pub enum TelemetrySignal<'a> {
    OutputChunk(&'a [u8]),
    Notification { kind: &'a str, detail: &'a str },
}

/// Derives a `StreamSessionStatusModel` from telemetry. Implementations
/// are agent-specific (Claude Code, Codex, a plain shell); the registry
/// ships only the no-op default.
pub trait StatusReducer: Send + Sync {
    fn reduce(&mut self, signal: TelemetrySignal<'_>) -> Option<StreamSessionStatusModel>;

    fn summarize(&self) -> TelemetrySummary {
        TelemetrySummary::default()
    }
}

/// Coarse counters surfaced for operational visibility; deliberately not
/// part of the wire protocol (§10's ambient logging covers per-event
/// detail, this is just a cheap in-memory rollup for `tracing` fields).
#[derive(Debug, Clone, Default)]
pub struct TelemetrySummary {
    pub chunks_observed: u64,
    pub notifications_observed: u64,
}

/// A reducer that never produces a status update. Used when no
/// agent-specific collaborator is registered, so the supervisor still
/// runs without a status model attached to its sessions.
#[derive(Default)]
pub struct NoopStatusReducer {
    summary: TelemetrySummary,
}

impl StatusReducer for NoopStatusReducer {
    fn reduce(&mut self, signal: TelemetrySignal<'_>) -> Option<StreamSessionStatusModel> {
        match signal {
            TelemetrySignal::OutputChunk(_) => self.summary.chunks_observed += 1,
            TelemetrySignal::Notification { .. } => self.summary.notifications_observed += 1,
        }
        None
    }

    fn summarize(&self) -> TelemetrySummary {
        self.summary.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reducer_counts_without_emitting_status() {
        let mut reducer = NoopStatusReducer::default();
        assert!(reducer.reduce(TelemetrySignal::OutputChunk(b"hi")).is_none());
        assert!(reducer
            .reduce(TelemetrySignal::Notification {
                kind: "turn-completed",
                detail: ""
            })
            .is_none());
        let summary = reducer.summarize();
        assert_eq!(summary.chunks_observed, 1);
        assert_eq!(summary.notifications_observed, 1);
    }
}
