//! Server-side transcript accumulation.
//!
//! The voice transport streams role-tagged utterances over the webhook while
//! a call runs. They are buffered here, keyed by interview, so feedback can
//! still be generated when the client fails to hand the transcript back
//! (tab closed mid-call, flaky reconnects). Buffers are append-only and
//! bounded; a runaway transport cannot grow one without limit.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::models::transcript::Utterance;

/// Hard cap per interview. A 45-minute session stays far below this.
const MAX_UTTERANCES: usize = 1000;

#[derive(Default)]
pub struct TranscriptCollector {
    buffers: RwLock<HashMap<Uuid, Vec<Utterance>>>,
}

impl TranscriptCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one utterance. Returns false when the buffer is full and the
    /// utterance was dropped.
    pub async fn append(&self, interview_id: Uuid, utterance: Utterance) -> bool {
        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(interview_id).or_default();
        if buffer.len() >= MAX_UTTERANCES {
            warn!(%interview_id, "transcript buffer full, dropping utterance");
            return false;
        }
        buffer.push(utterance);
        true
    }

    /// Copy of the buffered transcript, in arrival order.
    pub async fn snapshot(&self, interview_id: Uuid) -> Vec<Utterance> {
        self.buffers
            .read()
            .await
            .get(&interview_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drops the buffer once feedback has been persisted.
    pub async fn clear(&self, interview_id: Uuid) {
        self.buffers.write().await.remove(&interview_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transcript::Role;

    fn say(role: Role, content: &str) -> Utterance {
        Utterance {
            role,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_and_snapshot_preserve_order() {
        let collector = TranscriptCollector::new();
        let interview = Uuid::new_v4();

        collector
            .append(interview, say(Role::Interviewer, "Tell me about yourself."))
            .await;
        collector
            .append(interview, say(Role::Candidate, "I build backend services."))
            .await;

        let transcript = collector.snapshot(interview).await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::Interviewer);
        assert_eq!(transcript[1].content, "I build backend services.");
    }

    #[tokio::test]
    async fn test_buffers_are_isolated_per_interview() {
        let collector = TranscriptCollector::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        collector.append(a, say(Role::Candidate, "answer A")).await;
        assert_eq!(collector.snapshot(b).await.len(), 0);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_utterances() {
        let collector = TranscriptCollector::new();
        let interview = Uuid::new_v4();

        for i in 0..MAX_UTTERANCES {
            assert!(
                collector
                    .append(interview, say(Role::Candidate, &format!("u{i}")))
                    .await
            );
        }
        assert!(!collector.append(interview, say(Role::Candidate, "overflow")).await);
        assert_eq!(collector.snapshot(interview).await.len(), MAX_UTTERANCES);
    }

    #[tokio::test]
    async fn test_clear_removes_buffer() {
        let collector = TranscriptCollector::new();
        let interview = Uuid::new_v4();

        collector.append(interview, say(Role::Candidate, "hi")).await;
        collector.clear(interview).await;
        assert!(collector.snapshot(interview).await.is_empty());
    }
}
