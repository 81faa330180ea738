//! Agent module — core agent logic.
//!
//! This module contains:
//! - Message types (Message, ToolCallRequest, AgentStep, AgentOutput)
//! - LLM client trait and implementations
//! - Agent loop with LLM and keyword-rule modes
//! - Prompt builder
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod context;
mod loop_impl;
mod message;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use context::{PromptBuilder, DEFAULT_HISTORY_WINDOW};
pub use llm::{ChatOptions, GeminiClient, LlmClient, LlmResponse, OpenAiClient, ProviderRegistry, Usage};
pub use loop_impl::{AgentLoop, AgentMode, DEFAULT_MAX_ITERATIONS, UNKNOWN_REQUEST_REPLY};
pub use message::{AgentOutput, AgentStep, Message, Role, ToolCallRequest};
