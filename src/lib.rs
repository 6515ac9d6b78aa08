pub mod compose;
pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod file_host;
pub mod host;
pub mod html_blocks;
pub mod matcher;
pub mod normalization;
pub mod signatures;
pub mod store;
pub mod templates;
pub mod validation;

#[cfg(test)]
mod testing;

pub use compose::{ComposeOutcome, ComposeSession};
pub use config::Config;
pub use context::SignatureContext;
pub use error::{HostError, SignatureError};
pub use extractor::{SignatureExtractor, Variant};
pub use normalization::Normalizer;
pub use signatures::{SignatureKey, SignatureTemplate};
pub use validation::{BlockReason, Decision, SendCompletion};
