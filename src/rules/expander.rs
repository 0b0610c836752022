use hashbrown::HashMap;
use log::{debug, trace};
use symbol_table::GlobalSymbol as Symbol;

use crate::pp::callbacks::PPCallbacks;
use crate::pp::pp_lexer::{PPToken, PPTokenFlags, PPTokenKind};
use crate::pp::preprocessor::{MacroArgs, MacroFlags, MacroInfo, MacroTable, Preprocessor};
use crate::rules::rule::{NacroRule, ReplacementKind};
use crate::source_manager::SourceLoc;

/// Install a function-like macro definition. With `is_variadic` the last
/// name in `params` becomes the named variadic tail.
fn create_macro_directive(
    table: &mut MacroTable,
    name: Symbol,
    location: SourceLoc,
    params: &[Symbol],
    body: &[PPToken],
    is_variadic: bool,
) {
    let mut flags = MacroFlags::FUNCTION_LIKE;
    let (parameter_list, variadic_arg) = if is_variadic {
        flags |= MacroFlags::GNU_VARARGS;
        match params.split_last() {
            Some((last, named)) => (named.to_vec(), Some(*last)),
            None => (Vec::new(), Some(Symbol::new("__VA_ARGS__"))),
        }
    } else {
        (params.to_vec(), None)
    };

    table.define(
        name,
        MacroInfo {
            location,
            flags,
            tokens: body.to_vec(),
            parameter_list,
            variadic_arg,
        },
    );
}

/// Turns a parsed [`NacroRule`] into a live macro definition.
///
/// Rules without unroll regions register directly. Rules that unroll their
/// variadic tail register an empty-bodied variadic placeholder and a
/// [`LoopExpandingCallbacks`] subscriber that fills the body in per
/// invocation.
pub struct NacroRuleExpander {
    rule: NacroRule,
}

impl NacroRuleExpander {
    pub fn new(rule: NacroRule) -> Self {
        NacroRuleExpander { rule }
    }

    pub fn rule(&self) -> &NacroRule {
        &self.rule
    }

    /// Wrap typed parameter references in the rule body: `$expr` parameters
    /// get parentheses, `$stmt` parameters a trailing semicolon. Keeps an
    /// argument's parse intact no matter what surrounds the reference.
    pub fn replacement_protecting(&mut self) {
        let mut protected: HashMap<Symbol, ReplacementKind> = HashMap::new();
        for replacement in self.rule.replacements() {
            // The variadic tail is spliced, never wrapped
            if !replacement.var_args {
                protected.insert(replacement.identifier, replacement.kind);
            }
        }
        if protected.is_empty() {
            return;
        }

        let mut i = 0;
        while i < self.rule.token_len() {
            let token = *self.rule.get_token(i);
            let kind = token.identifier().and_then(|sym| protected.get(&sym).copied());
            match kind {
                Some(ReplacementKind::Expr) => {
                    let lparen = PPToken::new(
                        PPTokenKind::LeftParen,
                        PPTokenFlags::empty(),
                        token.location.with_offset(-1),
                        1,
                    );
                    let rparen = PPToken::new(
                        PPTokenKind::RightParen,
                        PPTokenFlags::empty(),
                        token.location.with_offset(1),
                        1,
                    );
                    self.rule.insert_token(i, lparen);
                    self.rule.insert_token(i + 2, rparen);
                    i += 3;
                }
                Some(ReplacementKind::Stmt) => {
                    let semi = PPToken::new(
                        PPTokenKind::Semicolon,
                        PPTokenFlags::empty(),
                        token.location.with_offset(1),
                        1,
                    );
                    self.rule.insert_token(i + 1, semi);
                    i += 2;
                }
                Some(ReplacementKind::Unspec) | None => i += 1,
            }
        }
    }

    /// Protect the body and register the rule with the preprocessor.
    pub fn expand(mut self, pp: &mut Preprocessor) {
        self.replacement_protecting();

        let name = self.rule.name();
        let location = self.rule.begin_loc();
        let params: Vec<Symbol> = self.rule.replacements().iter().map(|r| r.identifier).collect();

        if !self.rule.needs_pp_hooks() {
            debug!("registering nacro rule '{}' as a plain macro", name.as_str());
            create_macro_directive(
                pp.macro_table_mut(),
                name,
                location,
                &params,
                self.rule.tokens(),
                self.rule.has_va_args(),
            );
            return;
        }

        // Loop-bearing rule: empty placeholder now, body built per invocation
        debug!("registering nacro rule '{}' with an expansion hook", name.as_str());
        create_macro_directive(pp.macro_table_mut(), name, location, &params, &[], true);
        pp.add_pp_callbacks(Box::new(LoopExpandingCallbacks::new(self.rule)));
    }
}

/// Invocation-time unroller for loop-bearing rules.
///
/// On each expansion of its rule's placeholder it splits the pre-expanded
/// variadic run into groups, stamps out every loop body once per group with
/// the induction variable substituted, appends the result to the in-flight
/// definition, and re-arms a fresh placeholder for the next invocation.
pub struct LoopExpandingCallbacks {
    rule: NacroRule,
}

impl LoopExpandingCallbacks {
    pub fn new(rule: NacroRule) -> Self {
        assert!(rule.has_va_args(), "no loops to expand from arguments");
        LoopExpandingCallbacks { rule }
    }
}

impl PPCallbacks for LoopExpandingCallbacks {
    fn macro_expands(
        &mut self,
        name_tok: &PPToken,
        def: &mut MacroInfo,
        args: &MacroArgs,
        table: &mut MacroTable,
    ) {
        if name_tok.identifier() != Some(self.rule.name()) {
            return;
        }

        assert_eq!(
            args.num_macro_arguments(),
            self.rule.replacements_len(),
            "argument runs out of step with rule parameters"
        );
        let va_index = self.rule.replacements_len() - 1;
        let va = *self.rule.get_replacement(va_index);
        assert!(va.var_args);

        let groups = split_variadic_groups(args.pre_expanded(va_index));
        trace!(
            "unrolling '{}' over {} variadic groups",
            self.rule.name().as_str(),
            groups.len()
        );

        let mut out: Vec<PPToken> = Vec::with_capacity(self.rule.token_len());
        let mut i = 0;
        while i < self.rule.token_len() {
            let token = *self.rule.get_token(i);
            if token.kind != PPTokenKind::LoopMarker {
                out.push(token);
                i += 1;
                continue;
            }

            let lp = *self.rule.find_loop(i).expect("loop marker without a loop annotation");
            assert_eq!(lp.start(), i, "entered a loop region past its opening marker");
            assert_eq!(
                lp.iter_range(),
                va.identifier,
                "loop iterates something other than the variadic tail"
            );

            let body = &self.rule.tokens()[lp.start() + 1..lp.end()];
            for group in &groups {
                for body_token in body {
                    if body_token.identifier() == Some(lp.induction_var()) {
                        for arg_token in group {
                            // Anchor the spliced argument at the induction
                            // variable's position in the rule body
                            let mut token = *arg_token;
                            token.location = body_token.location;
                            out.push(token);
                        }
                    } else {
                        out.push(*body_token);
                    }
                }
            }
            i = lp.end() + 1;
        }

        for token in out {
            def.add_token_to_body(token);
        }

        // Re-arm an empty placeholder for the next invocation
        let params: Vec<Symbol> = self.rule.replacements().iter().map(|r| r.identifier).collect();
        create_macro_directive(table, self.rule.name(), self.rule.begin_loc(), &params, &[], true);
    }
}

/// Split one pre-expanded variadic run (terminated by `Eof`) into argument
/// groups at top-level commas. A run holding only the terminator yields no
/// groups at all.
pub(crate) fn split_variadic_groups(run: &[PPToken]) -> Vec<Vec<PPToken>> {
    let mut groups: Vec<Vec<PPToken>> = Vec::new();
    let mut current: Vec<PPToken> = Vec::new();
    let mut paren_depth = 0i32;
    let mut brace_depth = 0i32;
    let mut bracket_depth = 0i32;

    for token in run {
        match token.kind {
            PPTokenKind::Eof => {
                if !current.is_empty() || !groups.is_empty() {
                    groups.push(current);
                }
                return groups;
            }
            PPTokenKind::Comma if paren_depth == 0 && brace_depth == 0 && bracket_depth == 0 => {
                groups.push(std::mem::take(&mut current));
                continue;
            }
            PPTokenKind::LeftParen => paren_depth += 1,
            PPTokenKind::RightParen => paren_depth -= 1,
            PPTokenKind::LeftBrace => brace_depth += 1,
            PPTokenKind::RightBrace => brace_depth -= 1,
            PPTokenKind::LeftBracket => bracket_depth += 1,
            PPTokenKind::RightBracket => bracket_depth -= 1,
            _ => {}
        }
        current.push(*token);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
