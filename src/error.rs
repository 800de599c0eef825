//! Error types for noteforge operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! compiler stages: path parsing, template validation, schema derivation,
//! formula evaluation, LLM generation, and pipeline orchestration.

use thiserror::Error;

use crate::diag::{PipelineStep, Warning};

/// Result type alias for noteforge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for noteforge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Dotted-path parsing errors.
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// Template shape errors.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Schema derivation and merge errors.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Formula evaluation errors.
    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),

    /// LLM transport and response errors.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Rendering errors.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// A pipeline stage halted, either fatally or via a guard.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// I/O errors (template and source file reads in the CLI).
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Dotted-path parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path string is empty.
    #[error("empty path")]
    Empty,

    /// A `.`-separated segment is empty (leading, trailing, or doubled dot).
    #[error("empty segment in path: {path}")]
    EmptySegment {
        /// The offending path.
        path: String,
    },

    /// The bracket index is not a non-negative integer.
    #[error("invalid index in segment: {segment}")]
    InvalidIndex {
        /// The offending segment.
        segment: String,
    },

    /// A `[` was opened but never closed.
    #[error("unclosed bracket in segment: {segment}")]
    UnclosedBracket {
        /// The offending segment.
        segment: String,
    },

    /// Characters follow a closing bracket within one segment.
    #[error("unexpected characters after bracket in segment: {segment}")]
    TrailingCharacters {
        /// The offending segment.
        segment: String,
    },

    /// A wildcard appeared where only terminal wildcards are allowed.
    #[error("wildcard only allowed on the terminal segment: {path}")]
    WildcardNotAllowed {
        /// The offending path.
        path: String,
    },
}

/// Template shape errors, fatal at the template-validation stage.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template id is empty.
    #[error("template id must not be empty")]
    EmptyId,

    /// The template version is not a semver string.
    #[error("template version is not semver: {version}")]
    InvalidVersion {
        /// The rejected version string.
        version: String,
    },

    /// Two components share an id.
    #[error("duplicate component id: {id}")]
    DuplicateComponentId {
        /// The duplicated id.
        id: String,
    },

    /// Two content items share an id.
    #[error("duplicate content item id: {id}")]
    DuplicateItemId {
        /// The duplicated id.
        id: String,
    },

    /// A content item lacks a field its slot kind requires.
    #[error("content item {item}: missing {field} for {slot} slot")]
    MissingField {
        /// The item id.
        item: String,
        /// The missing field name.
        field: String,
        /// The slot kind.
        slot: String,
    },

    /// A content item carries an unparseable path.
    #[error("content item {item}: {source}")]
    InvalidPath {
        /// The item id.
        item: String,
        /// The underlying path error.
        source: PathError,
    },

    /// A computed item carries an unparseable formula.
    #[error("content item {item}: invalid formula: {message}")]
    InvalidFormula {
        /// The item id.
        item: String,
        /// Parser diagnostic.
        message: String,
    },

    /// A verbatim item carries an unparseable reference.
    #[error("content item {item}: invalid verbatim ref: {message}")]
    InvalidRef {
        /// The item id.
        item: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// Schema derivation and merge errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Two content items claim the same canonical path with incompatible
    /// subtrees. Both contributors are named.
    #[error("duplicate path {path}: claimed by {first} and {second}")]
    DuplicatePath {
        /// The canonical path.
        path: String,
        /// Id of the item that claimed the path first.
        first: String,
        /// Id of the item that collided with it.
        second: String,
    },

    /// Two schema nodes at the same path cannot be structurally unioned.
    #[error("incompatible schema nodes at {path}: {left} vs {right}")]
    IncompatibleMerge {
        /// The canonical path of the collision.
        path: String,
        /// Kind of the existing node.
        left: String,
        /// Kind of the incoming node.
        right: String,
    },

    /// AIS and NAS overlap at a leaf position during the RPS union.
    #[error("AI and non-AI schemas overlap at leaf {path}")]
    LeafOverlap {
        /// The overlapping canonical path.
        path: String,
    },

    /// The validator could not compile a schema.
    #[error("schema compilation failed: {message}")]
    Compile {
        /// Compiler diagnostic.
        message: String,
    },
}

/// Formula evaluation errors.
///
/// These never escape the computed resolver as panics; the NAS builder
/// downgrades them to `formula_error` warnings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// The formula source is empty.
    #[error("empty formula")]
    Empty,

    /// Scanner or parser failure at a byte offset.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset of the failure.
        offset: usize,
        /// Parser diagnostic.
        message: String,
    },

    /// An identifier did not resolve against the source record.
    #[error("unknown identifier: {path}")]
    UnknownIdentifier {
        /// The unresolved dotted path.
        path: String,
    },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An operator was applied to operands it does not support.
    #[error("type error: cannot apply {op} to {left} and {right}")]
    TypeError {
        /// The operator.
        op: String,
        /// Left operand type.
        left: String,
        /// Right operand type.
        right: String,
    },
}

/// LLM transport and response errors.
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API key was supplied via options or the environment.
    #[error("no API key: set options.openai_key or the OPENAI_API_KEY environment variable")]
    MissingApiKey,

    /// Transport-level failure. Retryable failures are subject to the
    /// exponential backoff policy.
    #[error("transport error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transport {
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Transport diagnostic.
        message: String,
        /// Whether the retry policy applies.
        retryable: bool,
    },

    /// The response was cut off at `max_output_tokens`.
    #[error("generation truncated at max_output_tokens")]
    Truncated,

    /// The provider halted generation with a content filter.
    #[error("generation halted by filter")]
    ContentFilter,

    /// The model refused to answer.
    #[error("model refusal: {message}")]
    Refusal {
        /// The refusal text surfaced by the model.
        message: String,
    },

    /// A completed response carried no extractable text, twice.
    #[error("empty output after {attempts} attempts")]
    EmptyOutput {
        /// Total attempts made.
        attempts: u32,
    },

    /// The response text was not valid JSON.
    #[error("malformed JSON response: {message}")]
    MalformedJson {
        /// Parser diagnostic.
        message: String,
    },

    /// The parsed payload violated the AI input schema.
    #[error("response violates schema: {}", errors.join("; "))]
    SchemaViolation {
        /// Validator diagnostics.
        errors: Vec<String>,
    },

    /// The call was cancelled by the orchestrator.
    #[error("generation cancelled")]
    Cancelled,
}

impl LlmError {
    /// Returns `true` when the retry policy applies to this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }
}

/// Rendering errors.
#[derive(Error, Debug)]
pub enum RenderError {
    /// String formatting failed while assembling the document.
    #[error("formatting failed: {0}")]
    Format(String),
}

/// A pipeline stage halted, either fatally or because a guard promoted
/// warnings to an error.
#[derive(Error, Debug)]
#[error("pipeline failed at {step}: {message}")]
pub struct PipelineError {
    /// The stage that failed.
    pub step: PipelineStep,
    /// Human-readable description of the failure.
    pub message: String,
    /// The offending warnings, when a guard triggered the failure.
    pub warnings: Vec<Warning>,
}

impl PipelineError {
    /// Creates a pipeline error for a stage without attached warnings.
    #[must_use]
    pub fn new(step: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    /// Creates a pipeline error carrying the warnings that triggered a guard.
    #[must_use]
    pub fn with_warnings(
        step: PipelineStep,
        message: impl Into<String>,
        warnings: Vec<Warning>,
    ) -> Self {
        Self {
            step,
            message: message.into(),
            warnings,
        }
    }
}

// Implement From traits for standard library errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::fmt::Error> for RenderError {
    fn from(err: std::fmt::Error) -> Self {
        Self::Format(err.to_string())
    }
}
