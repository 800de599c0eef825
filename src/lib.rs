//! # noteforge
//!
//! Clinical note template compiler.
//!
//! noteforge turns a declarative note template plus a raw source record
//! into a fully rendered document. The pipeline derives three JSON Schemas
//! from the template (the AI input schema, the non-AI snapshot schema, and
//! their render-payload union), resolves every deterministic slot through
//! typed resolvers, composes a schema-constrained LLM prompt, validates the
//! model's strict-JSON response, deep-merges it over the deterministic
//! snapshot, and renders HTML + CSS.
//!
//! ## Features
//!
//! - **Schema derivation**: path-addressed schema trees with provenance and
//!   duplicate-path detection
//! - **Deterministic resolution**: lookup, static, computed (safe formula
//!   evaluation), and verbatim-with-provenance slots
//! - **Prompt composition**: field-guide-anchored prompts with a five-rule
//!   lint pass
//! - **LLM adapter**: injected client capability, strict JSON-Schema
//!   response contract, retry and cancellation policy

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod cli;
pub mod diag;
pub mod error;
pub mod formula;
pub mod llm;
pub mod merge;
pub mod path;
pub mod pipeline;
pub mod prompt;
pub mod render;
pub mod resolve;
pub mod schema;
pub mod template;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use diag::{PipelineStep, PipelineWarnings, Severity, Warning, WarningCode};
pub use template::{Component, ContentItem, NoteTemplate, SlotKind};

// Re-export pipeline types
pub use pipeline::{
    GuardConfig, Guards, Pipeline, PipelineInput, PipelineOptions, PipelineOutput,
};

// Re-export schema types
pub use schema::{
    CachedValidator, SchemaNode, SchemaValidator, derive_ai_schema, derive_nas_schema,
    merge_render_schema,
};

// Re-export resolution types
pub use resolve::{NasBuilder, NasResolution, SlotResolver};

// Re-export prompt types
pub use prompt::{FieldGuideEntry, PromptBundle, RESPONSE_CONTRACT, build_field_guide};

// Re-export LLM types
#[cfg(feature = "openai")]
pub use llm::OpenAiClient;
pub use llm::{GenerationOptions, LlmAdapter, LlmClient, MockClient};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
