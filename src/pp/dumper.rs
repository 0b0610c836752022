//! Preprocessor dumper module
//!
//! Renders a preprocessed token stream back to text, for tests and
//! `-E` style consumers.

use std::io::Write;

use crate::pp::pp_lexer::{PPToken, PPTokenFlags, PPTokenKind};

/// Dumper for preprocessed output
pub struct PPDumper<'a> {
    tokens: &'a [PPToken],
}

impl<'a> PPDumper<'a> {
    pub fn new(tokens: &'a [PPToken]) -> Self {
        Self { tokens }
    }

    /// Dump preprocessed output to the given writer. Line structure follows
    /// the start-of-line flags; synthetic zero-width tokens are skipped.
    pub fn dump(&self, writer: &mut impl Write) -> std::io::Result<()> {
        let mut first = true;
        for token in self.tokens {
            if matches!(token.kind, PPTokenKind::Eof | PPTokenKind::LoopMarker) {
                continue;
            }
            if !first {
                if token.has_flag(PPTokenFlags::START_OF_LINE) {
                    writeln!(writer)?;
                } else {
                    write!(writer, " ")?;
                }
            }
            write!(writer, "{}", token.get_text())?;
            first = false;
        }
        writeln!(writer)?;
        Ok(())
    }
}

/// Single-line spelling of a token run, one space between tokens.
pub fn tokens_to_text(tokens: &[PPToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        if matches!(token.kind, PPTokenKind::Eof | PPTokenKind::LoopMarker) {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&token.get_text());
    }
    out
}
