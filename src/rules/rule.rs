use symbol_table::GlobalSymbol as Symbol;
use thin_vec::ThinVec;

use crate::pp::pp_lexer::{PPToken, PPTokenKind};
use crate::source_manager::{SourceLoc, SourceSpan};

/// Declared kind of a rule parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementKind {
    Expr,
    Stmt,
    Unspec,
}

/// One formal parameter of a rule: `name:$expr`, `name:$stmt`, or with a
/// trailing `*` the variadic tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Replacement {
    pub identifier: Symbol,
    pub kind: ReplacementKind,
    pub var_args: bool,
}

/// Unroll region inside a rule body. `start` and `end` are the indices of
/// the zero-width marker tokens bracketing the region.
#[derive(Debug, Clone, Copy)]
pub struct Loop {
    induction_var: Symbol,
    iter_range: Symbol,
    start: usize,
    end: usize,
}

impl Loop {
    pub fn new(induction_var: Symbol, iter_range: Symbol, start: usize, end: usize) -> Self {
        Loop { induction_var, iter_range, start, end }
    }

    pub fn induction_var(&self) -> Symbol {
        self.induction_var
    }

    pub fn iter_range(&self) -> Symbol {
        self.iter_range
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }
}

/// A parsed nacro rule: name, typed parameters, body tokens, and the loop
/// regions annotated inside the body.
pub struct NacroRule {
    name: Symbol,
    begin_loc: SourceLoc,
    replacements: ThinVec<Replacement>,
    tokens: Vec<PPToken>,
    loops: ThinVec<Loop>,
    source_range: SourceSpan,
}

impl NacroRule {
    pub fn new(name: Symbol, begin_loc: SourceLoc) -> Self {
        NacroRule {
            name,
            begin_loc,
            replacements: ThinVec::new(),
            tokens: Vec::new(),
            loops: ThinVec::new(),
            source_range: SourceSpan::empty(),
        }
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn begin_loc(&self) -> SourceLoc {
        self.begin_loc
    }

    pub fn add_replacement(&mut self, identifier: Symbol, kind: ReplacementKind, var_args: bool) {
        assert!(
            self.replacements.last().map_or(true, |r| !r.var_args),
            "variadic parameter must be the last formal parameter"
        );
        self.replacements.push(Replacement { identifier, kind, var_args });
    }

    pub fn replacements(&self) -> &[Replacement] {
        &self.replacements
    }

    pub fn replacements_len(&self) -> usize {
        self.replacements.len()
    }

    pub fn get_replacement(&self, index: usize) -> &Replacement {
        &self.replacements[index]
    }

    /// Whether the last formal parameter is the variadic tail.
    pub fn has_va_args(&self) -> bool {
        self.replacements.last().map_or(false, |r| r.var_args)
    }

    pub fn add_token(&mut self, token: PPToken) {
        self.tokens.push(token);
    }

    /// Insert a token into the body. Loop regions at or past the insertion
    /// point shift right so their marker indices stay valid.
    pub fn insert_token(&mut self, index: usize, token: PPToken) {
        self.tokens.insert(index, token);
        for lp in self.loops.iter_mut() {
            if lp.start >= index {
                lp.start += 1;
            }
            if lp.end >= index {
                lp.end += 1;
            }
        }
    }

    pub fn tokens(&self) -> &[PPToken] {
        &self.tokens
    }

    pub fn token_len(&self) -> usize {
        self.tokens.len()
    }

    pub fn get_token(&self, index: usize) -> &PPToken {
        &self.tokens[index]
    }

    pub fn add_loop(&mut self, lp: Loop) {
        assert!(lp.start < lp.end, "loop region must span at least its markers");
        assert_eq!(self.tokens[lp.start].kind, PPTokenKind::LoopMarker);
        assert_eq!(self.tokens[lp.end].kind, PPTokenKind::LoopMarker);
        assert!(
            self.loops.iter().all(|other| lp.end < other.start || other.end < lp.start),
            "loop regions must not overlap"
        );
        self.loops.push(lp);
    }

    /// Loop region containing the body token at `index`, if any.
    pub fn find_loop(&self, index: usize) -> Option<&Loop> {
        self.loops.iter().find(|lp| lp.start <= index && index <= lp.end)
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Rules that unroll a loop over the variadic tail cannot be registered
    /// as a plain macro; they need the invocation hook.
    pub fn needs_pp_hooks(&self) -> bool {
        self.has_va_args() && !self.loops.is_empty()
    }

    pub fn source_range(&self) -> SourceSpan {
        self.source_range
    }

    pub fn set_source_range(&mut self, range: SourceSpan) {
        self.source_range = range;
    }
}
