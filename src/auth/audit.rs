//! Audit logging for authorization flow transitions.
//!
//! Every event is emitted via `tracing::info!` as one JSON blob in the `audit`
//! field.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `flow.awaiting_callback` | `authorize` stored the session and redirected upstream |
//! | `flow.code_issued` | `callback` minted a token pair and issued a downstream code |
//! | `flow.exchanged` | the downstream client redeemed its code |
//! | `flow.failed` | a flow transition was rejected |
//! | `token.minted` | a Token Pair was stored for a completed upstream exchange |
//! | `token.verified` | a bearer token passed verification |
//! | `token.rejected` | a bearer token failed verification |
//!
//! Correlation values (state, codes) are logged as an 8-character prefix only.

use serde::Serialize;

/// Flow instance states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStage {
    /// Downstream client called `authorize`
    Initiated,
    /// User is at the upstream provider
    AwaitingCallback,
    /// Downstream code issued, waiting for the token request
    CodeIssued,
    /// Code redeemed for a bearer token
    Exchanged,
}

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"flow.code_issued"`).
    pub event: &'static str,
    /// Stage the flow was in when the event fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<FlowStage>,
    /// Downstream client id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Token Pair id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_jti: Option<String>,
    /// Prefix of the state or code the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    /// Human-readable reason for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn new(event: &'static str, stage: Option<FlowStage>) -> Self {
        Self {
            event,
            stage,
            client_id: None,
            token_jti: None,
            correlation: None,
            reason: None,
        }
    }

    /// `flow.awaiting_callback`
    #[must_use]
    pub fn awaiting_callback(client_id: &str, state: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            correlation: Some(redact(state)),
            ..Self::new("flow.awaiting_callback", Some(FlowStage::AwaitingCallback))
        }
    }

    /// `flow.code_issued`
    #[must_use]
    pub fn code_issued(client_id: &str, jti: &str, code: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            token_jti: Some(jti.to_string()),
            correlation: Some(redact(code)),
            ..Self::new("flow.code_issued", Some(FlowStage::CodeIssued))
        }
    }

    /// `flow.exchanged`
    #[must_use]
    pub fn exchanged(client_id: &str, jti: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            token_jti: Some(jti.to_string()),
            ..Self::new("flow.exchanged", Some(FlowStage::Exchanged))
        }
    }

    /// `flow.failed`; `stage` is where the flow was when the transition was refused.
    #[must_use]
    pub fn failed(stage: FlowStage, correlation: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            correlation: correlation.map(redact),
            reason: Some(reason.into()),
            ..Self::new("flow.failed", Some(stage))
        }
    }

    /// `token.minted`
    #[must_use]
    pub fn minted(client_id: &str, jti: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            token_jti: Some(jti.to_string()),
            ..Self::new("token.minted", None)
        }
    }

    /// `token.verified`
    #[must_use]
    pub fn verified(client_id: &str, jti: &str) -> Self {
        Self {
            client_id: Some(client_id.to_string()),
            token_jti: Some(jti.to_string()),
            ..Self::new("token.verified", None)
        }
    }

    /// `token.rejected`
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new("token.rejected", None)
        }
    }
}

/// Emit an audit event via `tracing::info!`.
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "bridge audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}

fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(8).collect();
    format!("{prefix}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awaiting_callback_redacts_state() {
        // GIVEN: a 64-char state
        let state = "a".repeat(64);

        // WHEN: building the event
        let event = AuditEvent::awaiting_callback("c1", &state);
        let json = serde_json::to_string(&event).unwrap();

        // THEN: only a prefix is logged
        assert_eq!(event.stage, Some(FlowStage::AwaitingCallback));
        assert!(!json.contains(&state));
        assert!(json.contains("aaaaaaaa"));
        assert!(json.contains("\"AWAITING_CALLBACK\""));
    }

    #[test]
    fn failed_event_contains_reason() {
        let event = AuditEvent::failed(FlowStage::AwaitingCallback, Some("abc"), "unknown state");

        assert_eq!(event.event, "flow.failed");
        assert_eq!(event.reason.as_deref(), Some("unknown state"));
        assert!(event.client_id.is_none());
    }

    #[test]
    fn events_serialize_to_json() {
        let events = vec![
            AuditEvent::awaiting_callback("c1", "state"),
            AuditEvent::code_issued("c1", "jti", "code"),
            AuditEvent::exchanged("c1", "jti"),
            AuditEvent::failed(FlowStage::CodeIssued, None, "no token"),
            AuditEvent::minted("c1", "jti"),
            AuditEvent::verified("c1", "jti"),
            AuditEvent::rejected("expired"),
        ];

        for event in events {
            let result = serde_json::to_string(&event);
            assert!(result.is_ok(), "Serialization failed: {result:?}");
        }
    }

    #[test]
    fn emit_does_not_panic() {
        emit(&AuditEvent::exchanged("c1", "jti"));
    }
}
