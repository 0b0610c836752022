pub mod error;
pub mod expander;
pub mod parser;
pub mod rule;
#[cfg(test)]
mod tests_parser;

pub use error::NacroError;
pub use expander::{LoopExpandingCallbacks, NacroRuleExpander};
pub use parser::NacroRuleParser;
pub use rule::{Loop, NacroRule, Replacement, ReplacementKind};
