//! Nacro rules: a typed, loop-unrolling macro extension for a C-family
//! preprocessor.
//!
//! A rule is declared with `#pragma nacro rule NAME (params) -> { body }`.
//! Parameters carry a kind (`$expr`, `$stmt`) and the last one may be a
//! variadic tail (`$expr*`); `$loop($v in $tail) { ... }` regions in the
//! body are unrolled once per variadic argument at invocation time.

/// Contains the diagnostic engine.
pub mod diagnostic;
/// Contains the error types for the crate.
pub mod error;
/// Contains the host preprocessor the rules plug into.
pub mod pp;
/// Contains the nacro rule model, parser, and expander.
pub mod rules;
pub mod source_manager;

pub use error::Error;
pub use pp::{PPError, PPToken, PPTokenFlags, PPTokenKind, Preprocessor};
pub use rules::{NacroError, NacroRule, NacroRuleExpander, NacroRuleParser};
pub use source_manager::{SourceId, SourceLoc, SourceManager, SourceSpan};
