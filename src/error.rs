use thiserror::Error;

use crate::pp::preprocessor::PPError;
use crate::rules::NacroError;

/// Top-level crate error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("preprocessor error: {0}")]
    Preprocessor(#[from] PPError),
    #[error("nacro rule error: {0}")]
    Rule(#[from] NacroError),
}
