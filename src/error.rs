use std::path::PathBuf;

use thiserror::Error;

/// Transport-level failures raised by a [`crate::ModelProvider`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(&'static str),

    #[error("invalid response from provider: {0}")]
    InvalidResponse(&'static str),
}

/// Everything the assertion surface can fail with.
///
/// Configuration and precondition variants mean the caller misused the
/// builder; expectation variants mean the model's response did not satisfy
/// a registered check. Callers can branch on the variant to tell "my test
/// failed" apart from "my test was misconfigured".
#[derive(Debug, Error)]
pub enum AssertError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("no alternative target: call expect_contains before expect_contains_alternative")]
    OrphanAlternative,

    #[error("unsupported file extension: {} (expected one of: md, markdown, txt)", .0.display())]
    UnsupportedExtension(PathBuf),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("no prompts registered")]
    NoPrompts,

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("invalid regex pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("expectation not met: {detail}; response was: \"{response}\"")]
    Expectation { detail: String, response: String },

    #[error("expected function call was not made: {expected}; actual calls: {actual}")]
    FunctionCalls { expected: String, actual: String },

    #[error("response is not valid JSON for {shape}: {source}; response was: \"{response}\"")]
    JsonParse {
        shape: &'static str,
        #[source]
        source: serde_json::Error,
        response: String,
    },

    #[error("response parsed to nothing for {shape}; response was: \"{response}\"")]
    JsonNull {
        shape: &'static str,
        response: String,
    },

    #[error("JSON validation failed for {shape}; response was: \"{response}\"")]
    JsonValidation {
        shape: &'static str,
        response: String,
    },

    #[error("execution cancelled")]
    Cancelled,

    #[error(transparent)]
    Model(#[from] ModelError),
}
