//! Conversation orchestration: LLM client, tool schema and dispatch, spend
//! enforcement, and the per-turn loop that ties them together.

pub mod dispatch;
pub mod llm;
pub mod orchestrator;
pub mod schema;
pub mod snapshot;
pub mod spend;

pub use dispatch::{ToolDispatcher, ToolResult, ToolStatus};
pub use llm::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmMessage, OpenAiClient,
    TokenUsage,
};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use schema::{tool_schema, ToolInvocation, TravelAction, TOOL_NAME};
pub use snapshot::{build_snapshot, AdminSnapshot, CacheStats};
pub use wayfarer_providers::query::CacheCounters;
pub use spend::SpendCapGuard;
