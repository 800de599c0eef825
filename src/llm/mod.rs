//! LLM generation.
//!
//! The core never hard-codes an HTTP client: [`LlmClient`] is an injected
//! capability speaking the Responses-API wire contract, and the adapter
//! layers the retry, cancellation, extraction, and validation policy on
//! top. A scripted [`MockClient`] serves tests; a `reqwest`-backed client
//! is available behind the `openai` feature.

mod adapter;
mod client;
mod mock;
#[cfg(feature = "openai")]
mod openai;
mod wire;

pub use adapter::{Generation, GenerationOptions, LlmAdapter, Usage};
pub use client::LlmClient;
pub use mock::{MockClient, mock_payload};
#[cfg(feature = "openai")]
pub use openai::OpenAiClient;
pub use wire::{
    IncompleteDetails, LlmRequest, LlmResponse, OutputContent, OutputItem, RequestContent,
    RequestMessage, ResponseError, ResponseFormat, TextOptions, UsageInfo,
};
