use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::travel::{BudgetTier, DateRange};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItineraryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported message role `{other}` (expected system|user|assistant|tool)"
            ))),
        }
    }
}

/// One persisted chat message. Token and cost columns are populated only for
/// messages that correspond to an LLM round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: SessionId,
    pub role: MessageRole,
    pub content: String,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    pub cost_usd: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Structured input from the web layer for one conversation turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: SessionId,
    pub message: String,
    pub destination: Option<String>,
    pub country: Option<String>,
    pub date_range: Option<DateRange>,
    pub budget_tier: Option<BudgetTier>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    CapBlocked,
    LlmUnavailable,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub assistant_text: String,
    pub itinerary_id: Option<ItineraryId>,
    pub status: TurnStatus,
}

impl ChatResponse {
    pub fn is_success(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatResponse, MessageRole, TurnStatus};

    #[test]
    fn role_round_trips_through_str() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant, MessageRole::Tool]
        {
            let parsed: MessageRole = role.as_str().parse().expect("parse role");
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("moderator".parse::<MessageRole>().is_err());
    }

    #[test]
    fn cap_blocked_turn_is_not_success() {
        let response = ChatResponse {
            assistant_text: "budget reached".to_string(),
            itinerary_id: None,
            status: TurnStatus::CapBlocked,
        };
        assert!(!response.is_success());
    }
}
