//! Per-frame outbound message buffer

use super::message::{Envelope, MessageKind, SystemNotice};
use serde::Serialize;

/// Messages accumulated during one frame step
///
/// Payloads are encoded when pushed. A payload that cannot be encoded is
/// dropped and replaced by a `system_event` describing the failure.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    task_id: Option<String>,
    pending: Vec<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every subsequent message with `belongToTaskId`
    pub fn set_task_id(&mut self, task_id: impl Into<String>) {
        self.task_id = Some(task_id.into());
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Encode and queue a payload; returns false if it was dropped
    pub fn push<T: Serialize>(&mut self, kind: MessageKind, payload: &T) -> bool {
        match serde_json::to_value(payload) {
            Ok(data) => {
                self.push_envelope(Envelope::new(kind, data));
                true
            }
            Err(e) => {
                tracing::warn!(message_type = kind.as_str(), error = %e, "message dropped");
                let notice = SystemNotice {
                    level: "error".to_string(),
                    message: format!("failed to encode {} message: {e}", kind.as_str()),
                    dropped_type: Some(kind),
                };
                // A notice is plain strings and always encodes
                let data = serde_json::to_value(&notice).unwrap_or(serde_json::Value::Null);
                self.push_envelope(Envelope::new(MessageKind::SystemEvent, data));
                false
            }
        }
    }

    fn push_envelope(&mut self, mut envelope: Envelope) {
        envelope.task_id = self.task_id.clone();
        self.pending.push(envelope);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Hand over everything queued so far, in push order
    pub fn take(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_push_order_and_task_id() {
        let mut outbox = Outbox::new();
        outbox.set_task_id("t-1");
        assert!(outbox.push(MessageKind::RenderCmd, &1));
        assert!(outbox.push(MessageKind::EngineTelemetry, &2));

        let messages = outbox.take();
        assert!(outbox.is_empty());
        assert_eq!(messages[0].kind, MessageKind::RenderCmd);
        assert_eq!(messages[1].kind, MessageKind::EngineTelemetry);
        assert!(messages.iter().all(|m| m.task_id.as_deref() == Some("t-1")));
    }

    #[test]
    fn test_unencodable_payload_becomes_system_event() {
        // JSON object keys must be strings
        let mut payload = BTreeMap::new();
        payload.insert((1u8, 2u8), 3.0);

        let mut outbox = Outbox::new();
        assert!(!outbox.push(MessageKind::FrameSnapshot, &payload));

        let messages = outbox.take();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::SystemEvent);
        assert_eq!(messages[0].data["level"], "error");
        assert_eq!(messages[0].data["droppedType"], "frame_snapshot");
    }
}
