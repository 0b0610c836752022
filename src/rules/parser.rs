use log::trace;
use symbol_table::GlobalSymbol as Symbol;

use crate::pp::pp_lexer::{PPToken, PPTokenFlags, PPTokenKind};
use crate::rules::error::NacroError;
use crate::rules::rule::{Loop, NacroRule, ReplacementKind};
use crate::source_manager::{SourceLoc, SourceSpan};

/// Pre-interned rule keywords for O(1) comparison
struct RuleKeywordTable {
    expr: Symbol,
    stmt: Symbol,
    loop_: Symbol,
    in_: Symbol,
}

impl RuleKeywordTable {
    fn new() -> Self {
        RuleKeywordTable {
            expr: Symbol::new("$expr"),
            stmt: Symbol::new("$stmt"),
            loop_: Symbol::new("$loop"),
            in_: Symbol::new("in"),
        }
    }
}

/// Parses the token run of one `#pragma nacro rule`:
///
/// ```text
/// (a:$expr, b:$stmt, rest:$expr*) -> {
///     ...
///     $loop($v in $rest) { ... }
///     ...
/// }
/// ```
///
/// Loop bodies are stored inline in the rule body, bracketed by zero-width
/// marker tokens and recorded as [`Loop`] annotations.
pub struct NacroRuleParser {
    tokens: Vec<PPToken>,
    position: usize,
    rule: NacroRule,
    keywords: RuleKeywordTable,
}

impl NacroRuleParser {
    pub fn new(name: Symbol, begin_loc: SourceLoc, tokens: Vec<PPToken>) -> Self {
        NacroRuleParser {
            tokens,
            position: 0,
            rule: NacroRule::new(name, begin_loc),
            keywords: RuleKeywordTable::new(),
        }
    }

    pub fn rule(&self) -> &NacroRule {
        &self.rule
    }

    pub fn into_rule(self) -> NacroRule {
        self.rule
    }

    fn next(&mut self) -> Result<PPToken, NacroError> {
        let token = self.tokens.get(self.position).copied().ok_or(NacroError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn peek(&self) -> Option<PPToken> {
        self.tokens.get(self.position).copied()
    }

    fn expect(&mut self, kind: PPTokenKind, expected: &'static str) -> Result<PPToken, NacroError> {
        let token = self.next()?;
        if token.kind != kind {
            return Err(NacroError::ExpectedToken { expected, location: token.location });
        }
        Ok(token)
    }

    fn expect_identifier(&mut self) -> Result<(Symbol, PPToken), NacroError> {
        let token = self.next()?;
        match token.kind {
            PPTokenKind::Identifier(sym) => Ok((sym, token)),
            _ => Err(NacroError::ExpectedIdentifier { location: token.location }),
        }
    }

    pub fn parse(&mut self) -> Result<(), NacroError> {
        let range_start = match self.tokens.first() {
            Some(token) => token.location,
            None => return Err(NacroError::UnexpectedEnd),
        };

        self.expect(PPTokenKind::LeftParen, "(")?;
        self.parse_arg_list()?;
        self.expect(PPTokenKind::Arrow, "->")?;
        self.parse_stmts()?;

        // Range end is one past the last token of the rule text
        let last = self.tokens[self.position.min(self.tokens.len()) - 1];
        let range_end = last.location.with_offset(last.length as i32);
        self.rule.set_source_range(SourceSpan::new(range_start, range_end));

        trace!(
            "parsed rule '{}': {} replacements, {} body tokens, {} loops",
            self.rule.name().as_str(),
            self.rule.replacements_len(),
            self.rule.token_len(),
            self.rule.loops().len()
        );
        Ok(())
    }

    /// `name:$kind` pairs, comma separated, `*` after the kind marking the
    /// variadic tail.
    pub fn parse_arg_list(&mut self) -> Result<(), NacroError> {
        loop {
            let token = self.next()?;
            let name = match token.kind {
                PPTokenKind::RightParen => break,
                PPTokenKind::Identifier(sym) => sym,
                _ => return Err(NacroError::ExpectedIdentifier { location: token.location }),
            };

            self.expect(PPTokenKind::Colon, ":")?;
            let (kind_sym, kind_token) = self.expect_identifier()?;
            let kind = if kind_sym == self.keywords.expr {
                ReplacementKind::Expr
            } else if kind_sym == self.keywords.stmt {
                ReplacementKind::Stmt
            } else {
                return Err(NacroError::UnknownReplacementKind {
                    found: kind_sym.as_str().to_string(),
                    location: kind_token.location,
                });
            };

            let mut var_args = false;
            if self.peek().map(|t| t.kind) == Some(PPTokenKind::Star) {
                self.next()?;
                var_args = true;
            }
            self.rule.add_replacement(name, kind, var_args);

            let sep = self.next()?;
            match sep.kind {
                PPTokenKind::Comma => {
                    if var_args {
                        return Err(NacroError::VariadicNotLast { location: sep.location });
                    }
                }
                PPTokenKind::RightParen => break,
                _ => return Err(NacroError::ExpectedToken { expected: ", or )", location: sep.location }),
            }
        }
        Ok(())
    }

    /// Brace-balanced rule body; the outer braces are not stored.
    pub fn parse_stmts(&mut self) -> Result<(), NacroError> {
        self.expect(PPTokenKind::LeftBrace, "{")?;
        let mut depth = 1u32;
        loop {
            let token = self.next()?;
            match token.kind {
                PPTokenKind::LeftBrace => {
                    depth += 1;
                    self.rule.add_token(token);
                }
                PPTokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    self.rule.add_token(token);
                }
                PPTokenKind::Identifier(sym) if sym == self.keywords.loop_ => {
                    self.parse_loop(&token)?;
                }
                _ => self.rule.add_token(token),
            }
        }
        Ok(())
    }

    /// `$loop($v in $range) { ... }`, already past the `$loop` keyword.
    pub fn parse_loop(&mut self, loop_token: &PPToken) -> Result<(), NacroError> {
        self.expect(PPTokenKind::LeftParen, "(")?;
        let (induction_var, _) = self.expect_identifier()?;
        let (in_sym, in_token) = self.expect_identifier()?;
        if in_sym != self.keywords.in_ {
            return Err(NacroError::ExpectedToken { expected: "in", location: in_token.location });
        }
        let (iter_range, _) = self.expect_identifier()?;
        self.expect(PPTokenKind::RightParen, ")")?;
        self.expect(PPTokenKind::LeftBrace, "{")?;

        let start = self.rule.token_len();
        self.rule
            .add_token(PPToken::new(PPTokenKind::LoopMarker, PPTokenFlags::empty(), loop_token.location, 0));

        let mut depth = 1u32;
        let close_loc;
        loop {
            let token = self.next()?;
            match token.kind {
                PPTokenKind::LeftBrace => {
                    depth += 1;
                    self.rule.add_token(token);
                }
                PPTokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        close_loc = token.location;
                        break;
                    }
                    self.rule.add_token(token);
                }
                PPTokenKind::Identifier(sym) if sym == self.keywords.loop_ => {
                    return Err(NacroError::NestedLoop { location: token.location });
                }
                _ => self.rule.add_token(token),
            }
        }

        let end = self.rule.token_len();
        self.rule
            .add_token(PPToken::new(PPTokenKind::LoopMarker, PPTokenFlags::empty(), close_loc, 0));
        self.rule.add_loop(Loop::new(induction_var, iter_range, start, end));
        Ok(())
    }
}
