use super::*;
use crate::source_manager::SourceId;

/// Helper function to create a PPLexer for testing
fn create_test_pp_lexer(source: &str) -> PPLexer {
    let _ = env_logger::try_init();
    PPLexer::new(SourceId::new(2), source.as_bytes().to_vec())
}

/// Macro to test multiple token productions in sequence
macro_rules! test_tokens {
    ($lexer:expr, $( ($input:expr, $expected:pat) ),* $(,)?) => {
        $(
            let token = $lexer.next_token().unwrap();
            match token.kind {
                $expected => {
                    assert_eq!(token.get_text(), $input, "Token text mismatch for {}", stringify!($expected));
                },
                _ => panic!("Expected {:?}, got {:?}", stringify!($expected), token.kind),
            }
        )*
    };
}

#[test]
fn test_identifiers_including_placeholders() {
    // '$' is an identifier character, so nacro placeholders are one token
    let source = "foo _bar $expr $loop x1 a$b";
    let mut lexer = create_test_pp_lexer(source);
    test_tokens!(
        lexer,
        ("foo", PPTokenKind::Identifier(_)),
        ("_bar", PPTokenKind::Identifier(_)),
        ("$expr", PPTokenKind::Identifier(_)),
        ("$loop", PPTokenKind::Identifier(_)),
        ("x1", PPTokenKind::Identifier(_)),
        ("a$b", PPTokenKind::Identifier(_)),
    );
    assert!(lexer.next_token().is_none());
}

#[test]
fn test_numbers() {
    let source = "123 0x1F 3.14 1e+9 42ull";
    let mut lexer = create_test_pp_lexer(source);
    test_tokens!(
        lexer,
        ("123", PPTokenKind::Number(_)),
        ("0x1F", PPTokenKind::Number(_)),
        ("3.14", PPTokenKind::Number(_)),
        ("1e+9", PPTokenKind::Number(_)),
        ("42ull", PPTokenKind::Number(_)),
    );
}

#[test]
fn test_string_and_char_literals() {
    let source = r#""hello" "es\"c" 'a' '\n'"#;
    let mut lexer = create_test_pp_lexer(source);
    test_tokens!(
        lexer,
        ("\"hello\"", PPTokenKind::StringLiteral(_)),
        ("\"es\\\"c\"", PPTokenKind::StringLiteral(_)),
        ("'a'", PPTokenKind::CharLiteral(_)),
        ("'\\n'", PPTokenKind::CharLiteral(_)),
    );
}

#[test]
fn test_punctuation_tokens() {
    let source = "( ) { } [ ] , ; : . -> ... = == + - * / % & && | || ^ ~ ! != ? < <= << > >= >> # ##";
    let mut lexer = create_test_pp_lexer(source);
    test_tokens!(
        lexer,
        ("(", PPTokenKind::LeftParen),
        (")", PPTokenKind::RightParen),
        ("{", PPTokenKind::LeftBrace),
        ("}", PPTokenKind::RightBrace),
        ("[", PPTokenKind::LeftBracket),
        ("]", PPTokenKind::RightBracket),
        (",", PPTokenKind::Comma),
        (";", PPTokenKind::Semicolon),
        (":", PPTokenKind::Colon),
        (".", PPTokenKind::Dot),
        ("->", PPTokenKind::Arrow),
        ("...", PPTokenKind::Ellipsis),
        ("=", PPTokenKind::Assign),
        ("==", PPTokenKind::EqEq),
        ("+", PPTokenKind::Plus),
        ("-", PPTokenKind::Minus),
        ("*", PPTokenKind::Star),
        ("/", PPTokenKind::Slash),
        ("%", PPTokenKind::Percent),
        ("&", PPTokenKind::Amp),
        ("&&", PPTokenKind::AmpAmp),
        ("|", PPTokenKind::Pipe),
        ("||", PPTokenKind::PipePipe),
        ("^", PPTokenKind::Caret),
        ("~", PPTokenKind::Tilde),
        ("!", PPTokenKind::Bang),
        ("!=", PPTokenKind::NotEq),
        ("?", PPTokenKind::Question),
        ("<", PPTokenKind::Lt),
        ("<=", PPTokenKind::Le),
        ("<<", PPTokenKind::Shl),
        (">", PPTokenKind::Gt),
        (">=", PPTokenKind::Ge),
        (">>", PPTokenKind::Shr),
        ("#", PPTokenKind::Hash),
        ("##", PPTokenKind::HashHash),
    );
}

#[test]
fn test_comments_are_skipped() {
    let source = "a // line comment\nb /* block\ncomment */ c";
    let mut lexer = create_test_pp_lexer(source);
    test_tokens!(
        lexer,
        ("a", PPTokenKind::Identifier(_)),
        ("b", PPTokenKind::Identifier(_)),
        ("c", PPTokenKind::Identifier(_)),
    );
}

#[test]
fn test_start_of_line_and_leading_space_flags() {
    let source = "a b\nc";
    let mut lexer = create_test_pp_lexer(source);

    let a = lexer.next_token().unwrap();
    assert!(a.has_flag(PPTokenFlags::START_OF_LINE));
    assert!(!a.has_flag(PPTokenFlags::LEADING_SPACE));

    let b = lexer.next_token().unwrap();
    assert!(!b.has_flag(PPTokenFlags::START_OF_LINE));
    assert!(b.has_flag(PPTokenFlags::LEADING_SPACE));

    let c = lexer.next_token().unwrap();
    assert!(c.has_flag(PPTokenFlags::START_OF_LINE));
}

#[test]
fn test_put_back() {
    let source = "x y";
    let mut lexer = create_test_pp_lexer(source);

    let x = lexer.next_token().unwrap();
    assert_eq!(x.get_text(), "x");
    lexer.put_back(x);
    assert_eq!(lexer.next_token().unwrap().get_text(), "x");
    assert_eq!(lexer.next_token().unwrap().get_text(), "y");
    assert!(lexer.next_token().is_none());
}

#[test]
fn test_line_of() {
    let source = "ab\ncd\nef";
    let lexer = create_test_pp_lexer(source);
    assert_eq!(lexer.line_of(0), 0);
    assert_eq!(lexer.line_of(3), 1);
    assert_eq!(lexer.line_of(7), 2);
}

#[test]
fn test_token_locations_and_lengths() {
    let source = "abc de";
    let mut lexer = create_test_pp_lexer(source);

    let abc = lexer.next_token().unwrap();
    assert_eq!(abc.location.offset(), 0);
    assert_eq!(abc.length, 3);

    let de = lexer.next_token().unwrap();
    assert_eq!(de.location.offset(), 4);
    assert_eq!(de.length, 2);
}
