pub mod callbacks;
pub mod dumper;
pub mod pp_lexer;
pub mod preprocessor;
#[cfg(test)]
mod tests_pp_lexer;
#[cfg(test)]
mod tests_preprocessor;

pub use callbacks::PPCallbacks;
pub use pp_lexer::{PPLexer, PPToken, PPTokenFlags, PPTokenKind};
pub use preprocessor::{MacroArgs, MacroFlags, MacroInfo, MacroTable, PPError, Preprocessor};
