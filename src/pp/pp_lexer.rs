use bitflags::bitflags;
use symbol_table::GlobalSymbol as Symbol;

use crate::source_manager::{SourceId, SourceLoc};

/// Token kinds produced by the preprocessing lexer.
///
/// Identifier-like kinds carry their text as an interned symbol. `$` counts
/// as an identifier character, so `$expr` or `$loop` lex as one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PPTokenKind {
    Identifier(Symbol),
    Number(Symbol),
    StringLiteral(Symbol),
    CharLiteral(Symbol),

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Arrow,
    Ellipsis,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Question,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    AmpAmp,
    PipePipe,
    Shl,
    Shr,
    Hash,
    HashHash,

    /// Zero-width sentinel bracketing an unroll region inside a stored macro
    /// body. Never produced by the lexer.
    LoopMarker,

    Unknown(Symbol),
    Eof,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PPTokenFlags: u8 {
        /// Token is the first on its line.
        const START_OF_LINE = 1 << 0;
        /// Token is preceded by horizontal whitespace.
        const LEADING_SPACE = 1 << 1;
        /// Token came out of a macro expansion.
        const MACRO_EXPANDED = 1 << 2;
    }
}

/// A preprocessing token. `Copy`, 16 bytes of kind plus location and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PPToken {
    pub kind: PPTokenKind,
    pub flags: PPTokenFlags,
    pub location: SourceLoc,
    pub length: u16,
}

impl PPToken {
    pub fn new(kind: PPTokenKind, flags: PPTokenFlags, location: SourceLoc, length: u16) -> Self {
        PPToken { kind, flags, location, length }
    }

    pub fn eof(location: SourceLoc) -> Self {
        PPToken::new(PPTokenKind::Eof, PPTokenFlags::empty(), location, 0)
    }

    /// Interned symbol for identifier tokens, `None` otherwise.
    pub fn identifier(&self) -> Option<Symbol> {
        match self.kind {
            PPTokenKind::Identifier(sym) => Some(sym),
            _ => None,
        }
    }

    pub fn has_flag(&self, flag: PPTokenFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Spelling of the token, reconstructed from the kind.
    pub fn get_text(&self) -> String {
        match self.kind {
            PPTokenKind::Identifier(sym)
            | PPTokenKind::Number(sym)
            | PPTokenKind::StringLiteral(sym)
            | PPTokenKind::CharLiteral(sym)
            | PPTokenKind::Unknown(sym) => sym.as_str().to_string(),
            PPTokenKind::LeftParen => "(".to_string(),
            PPTokenKind::RightParen => ")".to_string(),
            PPTokenKind::LeftBrace => "{".to_string(),
            PPTokenKind::RightBrace => "}".to_string(),
            PPTokenKind::LeftBracket => "[".to_string(),
            PPTokenKind::RightBracket => "]".to_string(),
            PPTokenKind::Comma => ",".to_string(),
            PPTokenKind::Semicolon => ";".to_string(),
            PPTokenKind::Colon => ":".to_string(),
            PPTokenKind::Dot => ".".to_string(),
            PPTokenKind::Arrow => "->".to_string(),
            PPTokenKind::Ellipsis => "...".to_string(),
            PPTokenKind::Assign => "=".to_string(),
            PPTokenKind::Plus => "+".to_string(),
            PPTokenKind::Minus => "-".to_string(),
            PPTokenKind::Star => "*".to_string(),
            PPTokenKind::Slash => "/".to_string(),
            PPTokenKind::Percent => "%".to_string(),
            PPTokenKind::Amp => "&".to_string(),
            PPTokenKind::Pipe => "|".to_string(),
            PPTokenKind::Caret => "^".to_string(),
            PPTokenKind::Tilde => "~".to_string(),
            PPTokenKind::Bang => "!".to_string(),
            PPTokenKind::Question => "?".to_string(),
            PPTokenKind::Lt => "<".to_string(),
            PPTokenKind::Gt => ">".to_string(),
            PPTokenKind::Le => "<=".to_string(),
            PPTokenKind::Ge => ">=".to_string(),
            PPTokenKind::EqEq => "==".to_string(),
            PPTokenKind::NotEq => "!=".to_string(),
            PPTokenKind::AmpAmp => "&&".to_string(),
            PPTokenKind::PipePipe => "||".to_string(),
            PPTokenKind::Shl => "<<".to_string(),
            PPTokenKind::Shr => ">>".to_string(),
            PPTokenKind::Hash => "#".to_string(),
            PPTokenKind::HashHash => "##".to_string(),
            PPTokenKind::LoopMarker => String::new(),
            PPTokenKind::Eof => String::new(),
        }
    }
}

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$'
}

fn is_identifier_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}

/// Byte-buffer lexer for preprocessing tokens.
///
/// Tracks start-of-line and leading-space flags, skips comments, and keeps a
/// put-back stack so callers can peek one or more tokens ahead.
pub struct PPLexer {
    source_id: SourceId,
    buffer: Vec<u8>,
    position: u32,
    at_line_start: bool,
    pending_space: bool,
    put_back_stack: Vec<PPToken>,
    line_starts: Vec<u32>,
}

impl PPLexer {
    pub fn new(source_id: SourceId, buffer: Vec<u8>) -> Self {
        let mut line_starts = vec![0];
        for (i, &byte) in buffer.iter().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        PPLexer {
            source_id,
            buffer,
            position: 0,
            at_line_start: true,
            pending_space: false,
            put_back_stack: Vec::new(),
            line_starts,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// 0-based line containing `offset`.
    pub fn line_of(&self, offset: u32) -> usize {
        self.line_starts.partition_point(|&start| start <= offset) - 1
    }

    pub fn put_back(&mut self, token: PPToken) {
        self.put_back_stack.push(token);
    }

    fn peek_byte(&self) -> Option<u8> {
        self.buffer.get(self.position as usize).copied()
    }

    fn peek_byte_at(&self, ahead: u32) -> Option<u8> {
        self.buffer.get((self.position + ahead) as usize).copied()
    }

    fn bump(&mut self) {
        self.position += 1;
    }

    fn loc(&self, offset: u32) -> SourceLoc {
        SourceLoc::new(self.source_id, offset)
    }

    /// Skip whitespace and comments, updating line/space flags.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b'\n') => {
                    self.at_line_start = true;
                    self.pending_space = false;
                    self.bump();
                }
                Some(b' ') | Some(b'\t') | Some(b'\r') => {
                    self.pending_space = true;
                    self.bump();
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'/') => {
                    while let Some(byte) = self.peek_byte() {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek_byte() {
                            Some(b'*') if self.peek_byte_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(b'\n') => {
                                self.at_line_start = true;
                                self.bump();
                            }
                            Some(_) => self.bump(),
                            None => break,
                        }
                    }
                    self.pending_space = true;
                }
                _ => break,
            }
        }
    }

    fn text(&self, start: u32) -> &str {
        // buffers are checked to be UTF-8 on ASCII boundaries only
        std::str::from_utf8(&self.buffer[start as usize..self.position as usize])
            .unwrap_or("<invalid-utf8>")
    }

    /// Lex the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<PPToken> {
        if let Some(token) = self.put_back_stack.pop() {
            return Some(token);
        }

        self.skip_trivia();

        let mut flags = PPTokenFlags::empty();
        if self.at_line_start {
            flags |= PPTokenFlags::START_OF_LINE;
        }
        if self.pending_space {
            flags |= PPTokenFlags::LEADING_SPACE;
        }
        self.at_line_start = false;
        self.pending_space = false;

        let start = self.position;
        let first = self.peek_byte()?;

        let kind = if is_identifier_start(first) {
            while let Some(byte) = self.peek_byte() {
                if !is_identifier_continue(byte) {
                    break;
                }
                self.bump();
            }
            PPTokenKind::Identifier(Symbol::new(self.text(start)))
        } else if first.is_ascii_digit() {
            // pp-numbers: digits, letters, dots, exponent signs
            while let Some(byte) = self.peek_byte() {
                if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'_' {
                    self.bump();
                } else if (byte == b'+' || byte == b'-')
                    && matches!(
                        self.buffer.get(self.position as usize - 1),
                        Some(b'e') | Some(b'E') | Some(b'p') | Some(b'P')
                    )
                {
                    self.bump();
                } else {
                    break;
                }
            }
            PPTokenKind::Number(Symbol::new(self.text(start)))
        } else if first == b'"' {
            self.bump();
            loop {
                match self.peek_byte() {
                    Some(b'\\') => {
                        self.bump();
                        if self.peek_byte().is_some() {
                            self.bump();
                        }
                    }
                    Some(b'"') => {
                        self.bump();
                        break;
                    }
                    Some(b'\n') | None => break, // unterminated, stop at line end
                    Some(_) => self.bump(),
                }
            }
            PPTokenKind::StringLiteral(Symbol::new(self.text(start)))
        } else if first == b'\'' {
            self.bump();
            loop {
                match self.peek_byte() {
                    Some(b'\\') => {
                        self.bump();
                        if self.peek_byte().is_some() {
                            self.bump();
                        }
                    }
                    Some(b'\'') => {
                        self.bump();
                        break;
                    }
                    Some(b'\n') | None => break,
                    Some(_) => self.bump(),
                }
            }
            PPTokenKind::CharLiteral(Symbol::new(self.text(start)))
        } else {
            self.lex_punctuation(first)
        };

        let length = (self.position - start) as u16;
        Some(PPToken::new(kind, flags, self.loc(start), length))
    }

    fn lex_punctuation(&mut self, first: u8) -> PPTokenKind {
        self.bump();
        let second = self.peek_byte();
        match first {
            b'(' => PPTokenKind::LeftParen,
            b')' => PPTokenKind::RightParen,
            b'{' => PPTokenKind::LeftBrace,
            b'}' => PPTokenKind::RightBrace,
            b'[' => PPTokenKind::LeftBracket,
            b']' => PPTokenKind::RightBracket,
            b',' => PPTokenKind::Comma,
            b';' => PPTokenKind::Semicolon,
            b':' => PPTokenKind::Colon,
            b'.' => {
                if second == Some(b'.') && self.peek_byte_at(1) == Some(b'.') {
                    self.bump();
                    self.bump();
                    PPTokenKind::Ellipsis
                } else {
                    PPTokenKind::Dot
                }
            }
            b'-' => {
                if second == Some(b'>') {
                    self.bump();
                    PPTokenKind::Arrow
                } else {
                    PPTokenKind::Minus
                }
            }
            b'=' => {
                if second == Some(b'=') {
                    self.bump();
                    PPTokenKind::EqEq
                } else {
                    PPTokenKind::Assign
                }
            }
            b'+' => PPTokenKind::Plus,
            b'*' => PPTokenKind::Star,
            b'/' => PPTokenKind::Slash,
            b'%' => PPTokenKind::Percent,
            b'&' => {
                if second == Some(b'&') {
                    self.bump();
                    PPTokenKind::AmpAmp
                } else {
                    PPTokenKind::Amp
                }
            }
            b'|' => {
                if second == Some(b'|') {
                    self.bump();
                    PPTokenKind::PipePipe
                } else {
                    PPTokenKind::Pipe
                }
            }
            b'^' => PPTokenKind::Caret,
            b'~' => PPTokenKind::Tilde,
            b'!' => {
                if second == Some(b'=') {
                    self.bump();
                    PPTokenKind::NotEq
                } else {
                    PPTokenKind::Bang
                }
            }
            b'?' => PPTokenKind::Question,
            b'<' => match second {
                Some(b'=') => {
                    self.bump();
                    PPTokenKind::Le
                }
                Some(b'<') => {
                    self.bump();
                    PPTokenKind::Shl
                }
                _ => PPTokenKind::Lt,
            },
            b'>' => match second {
                Some(b'=') => {
                    self.bump();
                    PPTokenKind::Ge
                }
                Some(b'>') => {
                    self.bump();
                    PPTokenKind::Shr
                }
                _ => PPTokenKind::Gt,
            },
            b'#' => {
                if second == Some(b'#') {
                    self.bump();
                    PPTokenKind::HashHash
                } else {
                    PPTokenKind::Hash
                }
            }
            other => PPTokenKind::Unknown(Symbol::new((other as char).to_string())),
        }
    }
}
