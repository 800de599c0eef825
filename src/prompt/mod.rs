//! Prompt composition.
//!
//! The field guide enumerates every `ai` slot with its constraints and
//! dependencies; the context slicer projects the snapshot down to just the
//! paths those dependencies reference; the composer assembles the
//! two-message prompt bundle and lints it before anything reaches the LLM.

mod compose;
mod context;
mod guide;
mod lint;

pub use compose::{
    Message, PromptBundle, PromptContext, RESPONSE_CONTRACT, Role, compose_prompt,
};
pub use context::{slice_fact_pack, slice_nas};
pub use guide::{DepScope, Dependency, FieldGuideEntry, build_field_guide};
pub use lint::{LintReport, lint_bundle};
