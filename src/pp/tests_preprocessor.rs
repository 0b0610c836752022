use super::*;
use crate::diagnostic::DiagnosticEngine;
use crate::pp::dumper::tokens_to_text;
use crate::source_manager::SourceManager;
use symbol_table::GlobalSymbol as Symbol;

/// Helper function to set up preprocessor testing
fn setup_preprocessor_test(src: &str) -> Vec<PPToken> {
    setup_preprocessor_test_with_diagnostics(src).unwrap().0
}

/// Helper function to set up preprocessor testing and return diagnostics
fn setup_preprocessor_test_with_diagnostics(
    src: &str,
) -> Result<(Vec<PPToken>, Vec<crate::diagnostic::Diagnostic>), PPError> {
    // Initialize logging for tests
    let _ = env_logger::try_init();

    let mut source_manager = SourceManager::new();
    let mut diagnostics = DiagnosticEngine::new();

    let source_id = source_manager.add_buffer(src.as_bytes().to_vec(), "<test>");

    let mut preprocessor = Preprocessor::new(&mut source_manager, &mut diagnostics);
    let tokens = preprocessor.process(source_id)?;

    let significant_tokens: Vec<_> = tokens.into_iter().filter(|t| t.kind != PPTokenKind::Eof).collect();

    Ok((significant_tokens, diagnostics.diagnostics().to_vec()))
}

/// Helper macro to assert token sequence kinds
macro_rules! assert_token_kinds {
    ($tokens:expr, $( $expected:expr ),* $(,)?) => {{
        let expected_kinds = vec![$($expected),*];
        assert_eq!($tokens.len(), expected_kinds.len(), "Token count mismatch");
        for (i, (token, expected)) in $tokens.iter().zip(expected_kinds.iter()).enumerate() {
            assert_eq!(token.kind, *expected, "Token {} kind mismatch: expected {:?}, got {:?}", i, expected, token.kind);
        }
    }};
}

#[test]
fn test_simple_macro_definition_and_expansion() {
    let src = r#"
#define TEN 10
int x = TEN;
"#;

    let significant_tokens = setup_preprocessor_test(src);

    assert_token_kinds!(
        significant_tokens,
        PPTokenKind::Identifier(Symbol::new("int")),
        PPTokenKind::Identifier(Symbol::new("x")),
        PPTokenKind::Assign,
        PPTokenKind::Number(Symbol::new("10")),
        PPTokenKind::Semicolon
    );

    // Ensure TEN was not present (it should have been expanded)
    for token in &significant_tokens {
        if let PPTokenKind::Identifier(sym) = &token.kind {
            assert_ne!(sym.as_str(), "TEN", "TEN should have been expanded");
        }
    }
}

#[test]
fn test_parameter_macro_definition_and_expansion() {
    let src = r#"
#define ADD(a,b) ( (a) + (b) )
int x = ADD(3, 4);
"#;

    let significant_tokens = setup_preprocessor_test(src);

    assert_token_kinds!(
        significant_tokens,
        PPTokenKind::Identifier(Symbol::new("int")),
        PPTokenKind::Identifier(Symbol::new("x")),
        PPTokenKind::Assign,
        PPTokenKind::LeftParen,
        PPTokenKind::LeftParen,
        PPTokenKind::Number(Symbol::new("3")),
        PPTokenKind::RightParen,
        PPTokenKind::Plus,
        PPTokenKind::LeftParen,
        PPTokenKind::Number(Symbol::new("4")),
        PPTokenKind::RightParen,
        PPTokenKind::RightParen,
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_variadic_macro_and_stringification() {
    let src = r#"
#define LOG(fmt, ...) printf(fmt, __VA_ARGS__)
#define STR(x) #x
const char* s = STR(hello_world);
LOG("value=%d\n", 5);
"#;

    let significant_tokens = setup_preprocessor_test(src);

    assert_token_kinds!(
        significant_tokens,
        PPTokenKind::Identifier(Symbol::new("const")),
        PPTokenKind::Identifier(Symbol::new("char")),
        PPTokenKind::Star,
        PPTokenKind::Identifier(Symbol::new("s")),
        PPTokenKind::Assign,
        PPTokenKind::StringLiteral(Symbol::new("\"hello_world\"")),
        PPTokenKind::Semicolon,
        PPTokenKind::Identifier(Symbol::new("printf")),
        PPTokenKind::LeftParen,
        PPTokenKind::StringLiteral(Symbol::new("\"value=%d\\n\"")),
        PPTokenKind::Comma,
        PPTokenKind::Number(Symbol::new("5")),
        PPTokenKind::RightParen,
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_undef() {
    let src = r#"
#define FOO 1
#undef FOO
FOO
"#;

    let significant_tokens = setup_preprocessor_test(src);
    assert_token_kinds!(significant_tokens, PPTokenKind::Identifier(Symbol::new("FOO")));
}

#[test]
fn test_function_like_macro_without_parens_stays_identifier() {
    let src = r#"
#define F(x) x
int y = F;
"#;

    let significant_tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        significant_tokens,
        PPTokenKind::Identifier(Symbol::new("int")),
        PPTokenKind::Identifier(Symbol::new("y")),
        PPTokenKind::Assign,
        PPTokenKind::Identifier(Symbol::new("F")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_define_does_not_swallow_parens_on_next_line() {
    // A '(' at the start of the next line is ordinary text, not a
    // parameter list of the definition above it
    let src = "#define EMPTY\n(x) EMPTY y\n";

    let significant_tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        significant_tokens,
        PPTokenKind::LeftParen,
        PPTokenKind::Identifier(Symbol::new("x")),
        PPTokenKind::RightParen,
        PPTokenKind::Identifier(Symbol::new("y"))
    );
}

#[test]
fn test_self_referential_macro_does_not_recurse() {
    let src = r#"
#define X X
X
"#;

    let significant_tokens = setup_preprocessor_test(src);
    assert_token_kinds!(significant_tokens, PPTokenKind::Identifier(Symbol::new("X")));
}

#[test]
fn test_unknown_pragma_is_skipped() {
    let src = r#"
#pragma once
int x;
"#;

    let significant_tokens = setup_preprocessor_test(src);
    assert_token_kinds!(
        significant_tokens,
        PPTokenKind::Identifier(Symbol::new("int")),
        PPTokenKind::Identifier(Symbol::new("x")),
        PPTokenKind::Semicolon
    );
}

#[test]
fn test_macro_redefinition_warns() {
    let src = r#"
#define FOO 1
#define FOO 2
FOO
"#;

    let (tokens, diagnostics) = setup_preprocessor_test_with_diagnostics(src).unwrap();
    assert_token_kinds!(tokens, PPTokenKind::Number(Symbol::new("2")));
    assert!(diagnostics
        .iter()
        .any(|d| d.code.as_deref() == Some("macro_redefinition")));
}

#[test]
fn test_wrong_argument_count_reports_error() {
    let src = r#"
#define ADD(a,b) a + b
ADD(1)
"#;

    let result = setup_preprocessor_test_with_diagnostics(src);
    assert!(matches!(result, Err(PPError::InvalidMacroParameter)));
}

#[test]
fn test_nacro_rule_protection_end_to_end() {
    let src = r#"
#pragma nacro rule guard(a:$expr, b:$stmt) -> { if (a) b }
guard(x > 0, return x)
"#;

    let significant_tokens = setup_preprocessor_test(src);
    insta::assert_snapshot!(
        tokens_to_text(&significant_tokens),
        @"if ( ( x > 0 ) ) return x ;"
    );
}

#[test]
fn test_nacro_loop_rule_unrolls_per_argument() {
    let src = r#"
#pragma nacro rule print_all(vals:$expr*) -> { $loop($v in vals) { puts($v); } }
print_all(x, y, z)
"#;

    let significant_tokens = setup_preprocessor_test(src);
    insta::assert_snapshot!(
        tokens_to_text(&significant_tokens),
        @"puts ( x ) ; puts ( y ) ; puts ( z ) ;"
    );
}

#[test]
fn test_nacro_loop_rule_empty_variadic_expands_to_nothing() {
    let src = r#"
#pragma nacro rule print_all(vals:$expr*) -> { $loop($v in vals) { puts($v); } }
print_all()
"#;

    let significant_tokens = setup_preprocessor_test(src);
    assert!(
        significant_tokens.is_empty(),
        "empty variadic run must produce zero unrolled iterations, got: {}",
        tokens_to_text(&significant_tokens)
    );
}

#[test]
fn test_nacro_loop_rule_rearms_for_each_invocation() {
    let src = r#"
#pragma nacro rule print_all(vals:$expr*) -> { $loop($v in vals) { puts($v); } }
print_all(a1, a2)
print_all(b1)
"#;

    let significant_tokens = setup_preprocessor_test(src);
    insta::assert_snapshot!(
        tokens_to_text(&significant_tokens),
        @"puts ( a1 ) ; puts ( a2 ) ; puts ( b1 ) ;"
    );
}

#[test]
fn test_nacro_rule_with_named_and_variadic_parameters() {
    let src = r#"
#pragma nacro rule dump(tag:$expr, vals:$expr*) -> { log(tag); $loop($v in vals) { log($v); } }
dump(hdr, u, w)
"#;

    let significant_tokens = setup_preprocessor_test(src);
    insta::assert_snapshot!(
        tokens_to_text(&significant_tokens),
        @"log ( ( hdr ) ) ; log ( u ) ; log ( w ) ;"
    );
}

#[test]
fn test_nacro_arguments_are_pre_expanded_before_unrolling() {
    let src = r#"
#define A first
#define B second
#pragma nacro rule print_all(vals:$expr*) -> { $loop($v in vals) { puts($v); } }
print_all(A, B)
"#;

    let significant_tokens = setup_preprocessor_test(src);
    insta::assert_snapshot!(
        tokens_to_text(&significant_tokens),
        @"puts ( first ) ; puts ( second ) ;"
    );
}

#[test]
fn test_nacro_variadic_group_splitting_ignores_nested_commas() {
    let src = r#"
#pragma nacro rule print_all(vals:$expr*) -> { $loop($v in vals) { puts($v); } }
print_all(f(a, b), c)
"#;

    let significant_tokens = setup_preprocessor_test(src);
    insta::assert_snapshot!(
        tokens_to_text(&significant_tokens),
        @"puts ( f ( a , b ) ) ; puts ( c ) ;"
    );
}

#[test]
fn test_nacro_rule_parse_error_reports_diagnostic() {
    let src = r#"
#pragma nacro rule bad(a:$float) -> { a }
"#;

    let result = setup_preprocessor_test_with_diagnostics(src);
    match result {
        Err(PPError::NacroRule(err)) => {
            assert!(err.to_string().contains("$float"), "unexpected error: {err}");
        }
        other => panic!("expected a nacro rule error, got {:?}", other.map(|(t, _)| tokens_to_text(&t))),
    }
}
