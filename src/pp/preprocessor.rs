use hashbrown::HashMap;
use log::{debug, trace};
use symbol_table::GlobalSymbol as Symbol;

use crate::diagnostic::DiagnosticEngine;
use crate::pp::callbacks::PPCallbacks;
use crate::rules::{NacroError, NacroRuleExpander, NacroRuleParser};
use crate::source_manager::{SourceId, SourceLoc, SourceManager, SourceSpan};

pub use crate::pp::pp_lexer::{PPLexer, PPToken, PPTokenFlags, PPTokenKind};

/// Preprocessor directive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Define,
    Undef,
    Pragma,
}

/// Table of pre-interned preprocessor directive names for O(1) keyword recognition
#[derive(Clone)]
pub struct DirectiveKeywordTable {
    define: Symbol,
    undef: Symbol,
    pragma: Symbol,
    nacro: Symbol,
    rule: Symbol,
}

impl Default for DirectiveKeywordTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveKeywordTable {
    pub fn new() -> Self {
        DirectiveKeywordTable {
            define: Symbol::new("define"),
            undef: Symbol::new("undef"),
            pragma: Symbol::new("pragma"),
            nacro: Symbol::new("nacro"),
            rule: Symbol::new("rule"),
        }
    }

    pub fn is_directive(&self, symbol: Symbol) -> Option<DirectiveKind> {
        if symbol == self.define {
            Some(DirectiveKind::Define)
        } else if symbol == self.undef {
            Some(DirectiveKind::Undef)
        } else if symbol == self.pragma {
            Some(DirectiveKind::Pragma)
        } else {
            None
        }
    }
}

// Packed boolean flags for macro properties
bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MacroFlags: u8 {
        const FUNCTION_LIKE = 1 << 0;
        const GNU_VARARGS = 1 << 1;
        const DISABLED = 1 << 2;
        const USED = 1 << 3;
    }
}

/// Represents a macro definition
#[derive(Clone)]
pub struct MacroInfo {
    pub location: SourceLoc,
    pub flags: MacroFlags, // Packed boolean flags
    pub tokens: Vec<PPToken>,
    pub parameter_list: Vec<Symbol>,
    pub variadic_arg: Option<Symbol>,
}

impl MacroInfo {
    pub fn is_function_like(&self) -> bool {
        self.flags.contains(MacroFlags::FUNCTION_LIKE)
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic_arg.is_some()
    }

    pub fn add_token_to_body(&mut self, token: PPToken) {
        self.tokens.push(token);
    }
}

/// Registry of live macro definitions, keyed by interned name.
pub struct MacroTable {
    map: HashMap<Symbol, MacroInfo>,
}

impl Default for MacroTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable { map: HashMap::new() }
    }

    /// Install a definition, returning the one it replaced if any.
    pub fn define(&mut self, name: Symbol, info: MacroInfo) -> Option<MacroInfo> {
        self.map.insert(name, info)
    }

    pub fn undef(&mut self, name: &Symbol) -> Option<MacroInfo> {
        self.map.remove(name)
    }

    pub fn get(&self, name: &Symbol) -> Option<&MacroInfo> {
        self.map.get(name)
    }

    pub fn get_mut(&mut self, name: &Symbol) -> Option<&mut MacroInfo> {
        self.map.get_mut(name)
    }

    pub fn contains(&self, name: &Symbol) -> bool {
        self.map.contains_key(name)
    }

    /// Remove and return a definition, e.g. to hold it in flight during
    /// callback dispatch.
    pub fn take(&mut self, name: &Symbol) -> Option<MacroInfo> {
        self.map.remove(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Arguments of one function-like macro invocation.
///
/// One token run per formal parameter; for a variadic macro the last run is
/// the comma-rejoined tail of the invocation. Pre-expanded runs are
/// terminated by an `Eof` token.
pub struct MacroArgs {
    unexpanded: Vec<Vec<PPToken>>,
    pre_expanded: Vec<Vec<PPToken>>,
}

impl MacroArgs {
    pub fn num_macro_arguments(&self) -> usize {
        self.unexpanded.len()
    }

    pub fn unexpanded(&self, index: usize) -> &[PPToken] {
        &self.unexpanded[index]
    }

    /// Fully macro-expanded run for one formal, including the trailing `Eof`.
    pub fn pre_expanded(&self, index: usize) -> &[PPToken] {
        &self.pre_expanded[index]
    }
}

/// Preprocessor errors
#[derive(Debug, thiserror::Error)]
pub enum PPError {
    #[error("Unexpected end of file")]
    UnexpectedEndOfFile,
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Invalid directive")]
    InvalidDirective,
    #[error("Invalid macro parameter")]
    InvalidMacroParameter,
    #[error("Macro expansion recursion detected")]
    MacroRecursion,
    #[error("Invalid pragma")]
    InvalidPragma,
    #[error("nacro rule error: {0}")]
    NacroRule(#[from] NacroError),
}

/// Main preprocessor structure
pub struct Preprocessor<'src> {
    source_manager: &'src mut SourceManager,
    diag: &'src mut DiagnosticEngine,

    // Pre-interned directive keywords for fast comparison
    directive_keywords: DirectiveKeywordTable,

    macros: MacroTable,
    callbacks: Vec<Box<dyn PPCallbacks>>,

    lexer: Option<PPLexer>,
}

impl<'src> Preprocessor<'src> {
    pub fn new(source_manager: &'src mut SourceManager, diag: &'src mut DiagnosticEngine) -> Self {
        Preprocessor {
            source_manager,
            diag,
            directive_keywords: DirectiveKeywordTable::new(),
            macros: MacroTable::new(),
            callbacks: Vec::new(),
            lexer: None,
        }
    }

    /// Register an expansion subscriber. It stays registered for the life of
    /// the preprocessor.
    pub fn add_pp_callbacks(&mut self, callbacks: Box<dyn PPCallbacks>) {
        self.callbacks.push(callbacks);
    }

    pub fn is_macro_defined(&self, symbol: &Symbol) -> bool {
        self.macros.contains(symbol)
    }

    pub fn macro_table(&self) -> &MacroTable {
        &self.macros
    }

    pub fn macro_table_mut(&mut self) -> &mut MacroTable {
        &mut self.macros
    }

    pub fn diagnostics(&self) -> &DiagnosticEngine {
        self.diag
    }

    /// Process a source buffer and return the preprocessed token stream,
    /// terminated by an `Eof` token.
    pub fn process(&mut self, source_id: SourceId) -> Result<Vec<PPToken>, PPError> {
        let buffer = self.source_manager.get_buffer(source_id);
        let buffer_len = buffer.len() as u32;
        self.lexer = Some(PPLexer::new(source_id, buffer.to_vec()));

        let mut result_tokens = Vec::new();

        while let Some(token) = self.lex_token() {
            match token.kind {
                PPTokenKind::Hash if token.has_flag(PPTokenFlags::START_OF_LINE) => {
                    self.handle_directive()?;
                }
                PPTokenKind::Identifier(_) => {
                    if let Some(expanded) = self.expand_macro(&token)? {
                        result_tokens.extend(expanded);
                    } else {
                        result_tokens.push(token);
                    }
                }
                _ => {
                    result_tokens.push(token);
                }
            }
        }

        self.lexer = None;
        result_tokens.push(PPToken::eof(SourceLoc::new(source_id, buffer_len)));

        debug!("preprocessed {} tokens from {}", result_tokens.len(), source_id);
        Ok(result_tokens)
    }

    fn lex_token(&mut self) -> Option<PPToken> {
        self.lexer.as_mut()?.next_token()
    }

    fn put_back(&mut self, token: PPToken) {
        if let Some(lexer) = self.lexer.as_mut() {
            lexer.put_back(token);
        }
    }

    /// 0-based line of `offset` in the active buffer.
    fn line_of(&self, offset: u32) -> usize {
        match self.lexer.as_ref() {
            Some(lexer) => lexer.line_of(offset),
            None => 0,
        }
    }

    /// Consume the rest of the directive line, putting back the first token
    /// of the next line.
    fn skip_to_end_of_line(&mut self, directive_line: usize) {
        while let Some(token) = self.lex_token() {
            if self.line_of(token.location.offset()) != directive_line {
                self.put_back(token);
                break;
            }
        }
    }

    /// Handle preprocessor directives
    fn handle_directive(&mut self) -> Result<(), PPError> {
        let token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;

        let sym = match token.kind {
            PPTokenKind::Identifier(sym) => sym,
            _ => {
                self.diag.report_error(
                    "Invalid preprocessor directive".to_string(),
                    SourceSpan::new(token.location, token.location),
                );
                return Err(PPError::InvalidDirective);
            }
        };

        match self.directive_keywords.is_directive(sym) {
            Some(DirectiveKind::Define) => self.handle_define(),
            Some(DirectiveKind::Undef) => self.handle_undef(),
            Some(DirectiveKind::Pragma) => self.handle_pragma(),
            None => {
                let name = sym.as_str();
                self.diag.report_error(
                    format!("Invalid preprocessor directive '{name}'"),
                    SourceSpan::new(token.location, token.location),
                );
                Err(PPError::InvalidDirective)
            }
        }
    }

    /// Handle #define directive
    fn handle_define(&mut self) -> Result<(), PPError> {
        let name_token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
        let name = match name_token.kind {
            PPTokenKind::Identifier(sym) => sym,
            _ => return Err(PPError::ExpectedIdentifier),
        };

        if let Some(existing) = self.macros.get(&name) {
            let diag = crate::diagnostic::Diagnostic {
                level: crate::diagnostic::DiagnosticLevel::Warning,
                message: format!("Redefinition of macro '{}'", name.as_str()),
                location: SourceSpan::new(name_token.location, name_token.location),
                code: Some("macro_redefinition".to_string()),
                hints: Vec::new(),
                related: vec![SourceSpan::new(existing.location, existing.location)],
            };
            self.diag.report_diagnostic(diag);
        }

        let start_line = self.line_of(name_token.location.offset());

        let mut flags = MacroFlags::empty();
        let mut params = Vec::new();
        let mut variadic = None;
        if let Some(token) = self.lex_token() {
            // '(' glued to the name starts a parameter list; one on the next
            // line belongs to the following text, not the definition
            if token.kind == PPTokenKind::LeftParen
                && !token.has_flag(PPTokenFlags::LEADING_SPACE)
                && !token.has_flag(PPTokenFlags::START_OF_LINE)
            {
                flags |= MacroFlags::FUNCTION_LIKE;
                loop {
                    let param_token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
                    match param_token.kind {
                        PPTokenKind::RightParen => break,
                        PPTokenKind::Identifier(sym) => {
                            if params.contains(&sym) {
                                return Err(PPError::InvalidMacroParameter);
                            }
                            let sep = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
                            match sep.kind {
                                PPTokenKind::Comma => {
                                    params.push(sym);
                                    continue;
                                }
                                PPTokenKind::RightParen => {
                                    params.push(sym);
                                    break;
                                }
                                PPTokenKind::Ellipsis => {
                                    // name... form: named variadic tail
                                    variadic = Some(sym);
                                    flags |= MacroFlags::GNU_VARARGS;
                                    let rparen = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
                                    if rparen.kind != PPTokenKind::RightParen {
                                        return Err(PPError::InvalidMacroParameter);
                                    }
                                    break;
                                }
                                _ => return Err(PPError::InvalidMacroParameter),
                            }
                        }
                        PPTokenKind::Ellipsis => {
                            flags |= MacroFlags::GNU_VARARGS;
                            variadic = Some(Symbol::new("__VA_ARGS__"));
                            let rparen = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
                            if rparen.kind != PPTokenKind::RightParen {
                                return Err(PPError::InvalidMacroParameter);
                            }
                            break;
                        }
                        _ => return Err(PPError::InvalidMacroParameter),
                    }
                }
            } else {
                self.put_back(token);
            }
        }

        // Body is the rest of the line
        let mut tokens = Vec::new();
        while let Some(token) = self.lex_token() {
            if self.line_of(token.location.offset()) != start_line {
                self.put_back(token);
                break;
            }
            tokens.push(token);
        }

        trace!("#define {} with {} body tokens", name.as_str(), tokens.len());
        let macro_info = MacroInfo {
            location: name_token.location,
            flags,
            tokens,
            parameter_list: params,
            variadic_arg: variadic,
        };
        self.macros.define(name, macro_info);
        Ok(())
    }

    fn handle_undef(&mut self) -> Result<(), PPError> {
        let name_token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
        let name = match name_token.kind {
            PPTokenKind::Identifier(sym) => sym,
            _ => return Err(PPError::ExpectedIdentifier),
        };
        self.macros.undef(&name);
        Ok(())
    }

    /// Handle #pragma. `#pragma nacro rule NAME (...) -> {...}` registers a
    /// nacro rule; every other pragma is skipped.
    fn handle_pragma(&mut self) -> Result<(), PPError> {
        let pragma_token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
        let directive_line = self.line_of(pragma_token.location.offset());

        let sym = match pragma_token.kind {
            PPTokenKind::Identifier(sym) => sym,
            _ => {
                self.skip_to_end_of_line(directive_line);
                return Ok(());
            }
        };

        if sym != self.directive_keywords.nacro {
            self.skip_to_end_of_line(directive_line);
            return Ok(());
        }

        let kind_token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
        match kind_token.kind {
            PPTokenKind::Identifier(sym) if sym == self.directive_keywords.rule => {
                self.handle_nacro_rule()
            }
            _ => {
                self.diag.report_error(
                    "Expected 'rule' after '#pragma nacro'".to_string(),
                    SourceSpan::new(kind_token.location, kind_token.location),
                );
                Err(PPError::InvalidPragma)
            }
        }
    }

    /// Parse and register one nacro rule. The rule text runs from the `(`
    /// after the name through the matching `}` of the body, across lines.
    fn handle_nacro_rule(&mut self) -> Result<(), PPError> {
        let name_token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
        let name = match name_token.kind {
            PPTokenKind::Identifier(sym) => sym,
            _ => {
                self.diag.report_error(
                    "Expected nacro rule name".to_string(),
                    SourceSpan::new(name_token.location, name_token.location),
                );
                return Err(PPError::ExpectedIdentifier);
            }
        };

        let mut tokens = Vec::new();
        let mut paren_depth = 0i32;
        let mut brace_depth = 0i32;
        let mut bracket_depth = 0i32;
        let mut seen_brace = false;
        loop {
            let token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
            match token.kind {
                PPTokenKind::LeftParen => paren_depth += 1,
                PPTokenKind::RightParen => paren_depth -= 1,
                PPTokenKind::LeftBrace => {
                    brace_depth += 1;
                    seen_brace = true;
                }
                PPTokenKind::RightBrace => brace_depth -= 1,
                PPTokenKind::LeftBracket => bracket_depth += 1,
                PPTokenKind::RightBracket => bracket_depth -= 1,
                _ => {}
            }
            tokens.push(token);
            if seen_brace && paren_depth == 0 && brace_depth == 0 && bracket_depth == 0 {
                break;
            }
        }

        debug!("parsing nacro rule '{}' ({} tokens)", name.as_str(), tokens.len());
        let mut parser = NacroRuleParser::new(name, name_token.location, tokens);
        if let Err(err) = parser.parse() {
            let loc = err.location().unwrap_or(name_token.location);
            self.diag
                .report_error(format!("nacro rule '{}': {}", name.as_str(), err), SourceSpan::new(loc, loc));
            return Err(err.into());
        }

        let expander = NacroRuleExpander::new(parser.into_rule());
        expander.expand(self);
        Ok(())
    }

    /// Expand a macro if the identifier names one and, for function-like
    /// macros, is followed by an argument list.
    fn expand_macro(&mut self, token: &PPToken) -> Result<Option<Vec<PPToken>>, PPError> {
        let symbol = match token.kind {
            PPTokenKind::Identifier(symbol) => symbol,
            _ => return Ok(None),
        };

        let function_like = match self.macros.get(&symbol) {
            Some(info) if !info.flags.contains(MacroFlags::DISABLED) => info.is_function_like(),
            _ => return Ok(None),
        };

        if function_like {
            match self.lex_token() {
                Some(t) if t.kind == PPTokenKind::LeftParen => {}
                Some(t) => {
                    // Name without argument list is a plain identifier
                    self.put_back(t);
                    return Ok(None);
                }
                None => return Ok(None),
            }
            let groups = self.parse_macro_args_from_lexer()?;
            let expanded = self.expand_with_args(symbol, token, groups)?;
            Ok(Some(expanded))
        } else {
            let expanded = self.expand_object_macro(symbol, token)?;
            Ok(Some(expanded))
        }
    }

    /// Collect raw argument groups after the already-consumed `(`. Commas
    /// nested in `()`/`{}`/`[]` do not separate groups.
    fn parse_macro_args_from_lexer(&mut self) -> Result<Vec<Vec<PPToken>>, PPError> {
        let mut groups: Vec<Vec<PPToken>> = Vec::new();
        let mut current: Vec<PPToken> = Vec::new();
        let mut paren_depth = 0i32;
        let mut brace_depth = 0i32;
        let mut bracket_depth = 0i32;

        loop {
            let token = self.lex_token().ok_or(PPError::UnexpectedEndOfFile)?;
            match token.kind {
                PPTokenKind::LeftParen => {
                    paren_depth += 1;
                    current.push(token);
                }
                PPTokenKind::RightParen => {
                    if paren_depth == 0 {
                        if !current.is_empty() || !groups.is_empty() {
                            groups.push(current);
                        }
                        break;
                    }
                    paren_depth -= 1;
                    current.push(token);
                }
                PPTokenKind::LeftBrace => {
                    brace_depth += 1;
                    current.push(token);
                }
                PPTokenKind::RightBrace => {
                    brace_depth -= 1;
                    current.push(token);
                }
                PPTokenKind::LeftBracket => {
                    bracket_depth += 1;
                    current.push(token);
                }
                PPTokenKind::RightBracket => {
                    bracket_depth -= 1;
                    current.push(token);
                }
                PPTokenKind::Comma if paren_depth == 0 && brace_depth == 0 && bracket_depth == 0 => {
                    groups.push(current);
                    current = Vec::new();
                }
                _ => {
                    current.push(token);
                }
            }
        }

        Ok(groups)
    }

    /// Expand a function-like macro given its raw argument groups.
    ///
    /// The definition is removed from the table for the duration of callback
    /// dispatch; a callback may install a successor under the same name, in
    /// which case the in-flight definition is not reinstalled.
    fn expand_with_args(
        &mut self,
        symbol: Symbol,
        name_tok: &PPToken,
        groups: Vec<Vec<PPToken>>,
    ) -> Result<Vec<PPToken>, PPError> {
        let (num_named, variadic) = match self.macros.get(&symbol) {
            Some(info) => (info.parameter_list.len(), info.is_variadic()),
            None => return Err(PPError::InvalidMacroParameter),
        };

        self.check_arg_count(symbol, name_tok, groups.len(), num_named, variadic)?;

        // One unexpanded run per formal; the variadic formal gets the
        // comma-rejoined tail of the invocation.
        let mut unexpanded: Vec<Vec<PPToken>> = Vec::with_capacity(num_named + usize::from(variadic));
        for group in groups.iter().take(num_named) {
            unexpanded.push(group.clone());
        }
        if variadic {
            let mut tail = Vec::new();
            for (i, group) in groups.iter().skip(num_named).enumerate() {
                if i > 0 {
                    tail.push(PPToken::new(PPTokenKind::Comma, PPTokenFlags::empty(), name_tok.location, 1));
                }
                tail.extend(group.iter().copied());
            }
            unexpanded.push(tail);
        }

        let mut pre_expanded = Vec::with_capacity(unexpanded.len());
        for run in &unexpanded {
            let mut expanded = run.clone();
            self.expand_tokens(&mut expanded)?;
            expanded.push(PPToken::eof(name_tok.location));
            pre_expanded.push(expanded);
        }
        let args = MacroArgs { unexpanded, pre_expanded };

        if let Some(info) = self.macros.get_mut(&symbol) {
            info.flags |= MacroFlags::USED;
        }

        // Hold the definition in flight so callbacks never alias the table
        // entry they may replace.
        let mut in_flight = self.macros.take(&symbol).ok_or(PPError::MacroRecursion)?;
        for callbacks in self.callbacks.iter_mut() {
            callbacks.macro_expands(name_tok, &mut in_flight, &args, &mut self.macros);
        }

        let mut result = substitute_macro(&in_flight, &args);

        if !self.macros.contains(&symbol) {
            self.macros.define(symbol, in_flight);
        }

        // Disable during rescanning so self-references survive unexpanded
        if let Some(info) = self.macros.get_mut(&symbol) {
            info.flags |= MacroFlags::DISABLED;
        }
        let rescan = self.expand_tokens(&mut result);
        if let Some(info) = self.macros.get_mut(&symbol) {
            info.flags.remove(MacroFlags::DISABLED);
        }
        rescan?;

        for token in result.iter_mut() {
            token.flags |= PPTokenFlags::MACRO_EXPANDED;
        }
        trace!("expanded '{}' into {} tokens", symbol.as_str(), result.len());
        Ok(result)
    }

    fn check_arg_count(
        &mut self,
        symbol: Symbol,
        name_tok: &PPToken,
        num_groups: usize,
        num_named: usize,
        variadic: bool,
    ) -> Result<(), PPError> {
        let span = SourceSpan::new(name_tok.location, name_tok.location);
        if variadic {
            if num_groups < num_named {
                let diag = crate::diagnostic::Diagnostic {
                    level: crate::diagnostic::DiagnosticLevel::Error,
                    message: format!(
                        "Too few arguments for macro '{}': expected at least {}, got {}",
                        symbol.as_str(),
                        num_named,
                        num_groups
                    ),
                    location: span,
                    code: Some("macro_too_few_args".to_string()),
                    hints: Vec::new(),
                    related: Vec::new(),
                };
                self.diag.report_diagnostic(diag);
                return Err(PPError::InvalidMacroParameter);
            }
        } else if num_groups != num_named {
            let diag = crate::diagnostic::Diagnostic {
                level: crate::diagnostic::DiagnosticLevel::Error,
                message: format!(
                    "Wrong number of arguments for macro '{}': expected {}, got {}",
                    symbol.as_str(),
                    num_named,
                    num_groups
                ),
                location: span,
                code: Some("macro_wrong_arg_count".to_string()),
                hints: Vec::new(),
                related: Vec::new(),
            };
            self.diag.report_diagnostic(diag);
            return Err(PPError::InvalidMacroParameter);
        }
        Ok(())
    }

    /// Expand an object-like macro
    fn expand_object_macro(&mut self, symbol: Symbol, token: &PPToken) -> Result<Vec<PPToken>, PPError> {
        let mut result = match self.macros.get_mut(&symbol) {
            Some(info) => {
                info.flags |= MacroFlags::USED | MacroFlags::DISABLED;
                info.tokens.clone()
            }
            None => return Ok(vec![*token]),
        };

        let rescan = self.expand_tokens(&mut result);
        if let Some(info) = self.macros.get_mut(&symbol) {
            info.flags.remove(MacroFlags::DISABLED);
        }
        rescan?;

        for tok in result.iter_mut() {
            tok.flags |= PPTokenFlags::MACRO_EXPANDED;
        }
        Ok(result)
    }

    /// Rescan a token vector, expanding macros in place.
    pub fn expand_tokens(&mut self, tokens: &mut Vec<PPToken>) -> Result<(), PPError> {
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            let symbol = match token.kind {
                PPTokenKind::Identifier(symbol) => symbol,
                _ => {
                    i += 1;
                    continue;
                }
            };

            let function_like = match self.macros.get(&symbol) {
                Some(info) if !info.flags.contains(MacroFlags::DISABLED) => info.is_function_like(),
                _ => {
                    i += 1;
                    continue;
                }
            };

            if function_like {
                // Needs a '(' right here in the stream
                if tokens.get(i + 1).map(|t| t.kind) != Some(PPTokenKind::LeftParen) {
                    i += 1;
                    continue;
                }
                let Some((groups, end)) = split_argument_groups(tokens, i + 2) else {
                    i += 1;
                    continue;
                };
                let expanded = self.expand_with_args(symbol, &token, groups)?;
                let expanded_len = expanded.len();
                tokens.splice(i..=end, expanded);
                i += expanded_len;
            } else {
                let expanded = self.expand_object_macro(symbol, &token)?;
                let expanded_len = expanded.len();
                tokens.splice(i..=i, expanded);
                i += expanded_len;
            }
        }
        Ok(())
    }
}

/// Split argument groups in a token vector, starting just past the opening
/// `(` at `start`. Returns the groups and the index of the closing `)`.
fn split_argument_groups(tokens: &[PPToken], start: usize) -> Option<(Vec<Vec<PPToken>>, usize)> {
    let mut groups: Vec<Vec<PPToken>> = Vec::new();
    let mut current: Vec<PPToken> = Vec::new();
    let mut paren_depth = 0i32;
    let mut brace_depth = 0i32;
    let mut bracket_depth = 0i32;

    let mut i = start;
    while i < tokens.len() {
        let token = tokens[i];
        match token.kind {
            PPTokenKind::LeftParen => {
                paren_depth += 1;
                current.push(token);
            }
            PPTokenKind::RightParen => {
                if paren_depth == 0 {
                    if !current.is_empty() || !groups.is_empty() {
                        groups.push(current);
                    }
                    return Some((groups, i));
                }
                paren_depth -= 1;
                current.push(token);
            }
            PPTokenKind::LeftBrace => {
                brace_depth += 1;
                current.push(token);
            }
            PPTokenKind::RightBrace => {
                brace_depth -= 1;
                current.push(token);
            }
            PPTokenKind::LeftBracket => {
                bracket_depth += 1;
                current.push(token);
            }
            PPTokenKind::RightBracket => {
                bracket_depth -= 1;
                current.push(token);
            }
            PPTokenKind::Comma if paren_depth == 0 && brace_depth == 0 && bracket_depth == 0 => {
                groups.push(current);
                current = Vec::new();
            }
            PPTokenKind::Eof => return None,
            _ => {
                current.push(token);
            }
        }
        i += 1;
    }
    None
}

/// Pre-expanded run for one formal with its `Eof` terminator stripped.
fn run_without_eof(run: &[PPToken]) -> &[PPToken] {
    match run.last() {
        Some(token) if token.kind == PPTokenKind::Eof => &run[..run.len() - 1],
        _ => run,
    }
}

/// Substitute formal parameters in a macro body with pre-expanded argument
/// runs. `#param` stringifies the unexpanded spelling of an argument.
fn substitute_macro(macro_info: &MacroInfo, args: &MacroArgs) -> Vec<PPToken> {
    let param_index = |symbol: Symbol| -> Option<usize> {
        if let Some(index) = macro_info.parameter_list.iter().position(|&p| p == symbol) {
            return Some(index);
        }
        if macro_info.variadic_arg == Some(symbol) {
            return Some(macro_info.parameter_list.len());
        }
        None
    };

    let mut result = Vec::new();
    let mut i = 0;

    while i < macro_info.tokens.len() {
        let token = macro_info.tokens[i];

        match token.kind {
            PPTokenKind::Hash => {
                let param = macro_info
                    .tokens
                    .get(i + 1)
                    .and_then(|t| t.identifier())
                    .and_then(param_index);
                if let Some(index) = param {
                    result.push(stringify_tokens(args.unexpanded(index), token.location));
                    i += 2;
                    continue;
                }
                result.push(token);
            }
            PPTokenKind::Identifier(symbol) => {
                if let Some(index) = param_index(symbol) {
                    result.extend_from_slice(run_without_eof(args.pre_expanded(index)));
                } else {
                    result.push(token);
                }
            }
            _ => {
                result.push(token);
            }
        }
        i += 1;
    }

    result
}

/// Build the string literal for the `#` operator.
fn stringify_tokens(tokens: &[PPToken], location: SourceLoc) -> PPToken {
    let mut text = String::new();
    text.push('"');
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        for ch in token.get_text().chars() {
            match ch {
                '"' => text.push_str("\\\""),
                '\\' => text.push_str("\\\\"),
                _ => text.push(ch),
            }
        }
    }
    text.push('"');

    let length = text.len() as u16;
    PPToken::new(
        PPTokenKind::StringLiteral(Symbol::new(&text)),
        PPTokenFlags::empty(),
        location,
        length,
    )
}
