use symbol_table::GlobalSymbol as Symbol;

use crate::pp::pp_lexer::{PPLexer, PPToken, PPTokenKind};
use crate::rules::error::NacroError;
use crate::rules::parser::NacroRuleParser;
use crate::rules::rule::ReplacementKind;
use crate::source_manager::{SourceId, SourceLoc, SourceManager};

fn lex(source_id: SourceId, src: &str) -> Vec<PPToken> {
    let mut lexer = PPLexer::new(source_id, src.as_bytes().to_vec());
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        tokens.push(token);
    }
    tokens
}

fn parser_for(src: &str) -> NacroRuleParser {
    let _ = env_logger::try_init();
    let tokens = lex(SourceId::new(2), src);
    let begin = tokens.first().map(|t| t.location).unwrap_or_default();
    NacroRuleParser::new(Symbol::new("test_rule"), begin, tokens)
}

#[test]
fn test_rule_parse_arg_list() {
    let mut parser = parser_for("a:$expr, b:$stmt, c:$expr*)");
    parser.parse_arg_list().unwrap();

    let rule = parser.rule();
    assert_eq!(rule.replacements_len(), 3);

    assert_eq!(rule.get_replacement(0).kind, ReplacementKind::Expr);
    assert!(!rule.get_replacement(0).var_args);
    assert_eq!(rule.get_replacement(1).kind, ReplacementKind::Stmt);
    assert_eq!(rule.get_replacement(2).kind, ReplacementKind::Expr);
    assert!(rule.get_replacement(2).var_args);
    assert!(rule.has_va_args());
}

#[test]
fn test_rule_simple_stmts() {
    let mut parser = parser_for("{if(1){ puts(\"hello\"); }}");
    parser.parse_stmts().unwrap();

    // Outer braces are not stored, everything between them is
    let rule = parser.rule();
    assert!(rule.token_len() > 2);
    assert_eq!(rule.get_token(0).get_text(), "if");
    assert_eq!(rule.get_token(rule.token_len() - 1).kind, PPTokenKind::RightBrace);
}

#[test]
fn test_rule_basic_loop() {
    let _ = env_logger::try_init();
    let tokens = lex(SourceId::new(2), "$loop($i in $iter){ puts($i); }");
    let loop_token = tokens[0];
    let begin = loop_token.location;
    let mut parser = NacroRuleParser::new(Symbol::new("test_rule"), begin, tokens[1..].to_vec());
    parser.parse_loop(&loop_token).unwrap();

    let rule = parser.rule();
    assert_eq!(rule.loops().len(), 1);

    let lp = rule.loops()[0];
    assert_eq!(lp.induction_var().as_str(), "$i");
    assert_eq!(lp.iter_range().as_str(), "$iter");
    assert_eq!(rule.get_token(lp.start()).kind, PPTokenKind::LoopMarker);
    assert_eq!(rule.get_token(lp.end()).kind, PPTokenKind::LoopMarker);

    // Body between the markers: puts ( $i ) ;
    assert_eq!(lp.end() - lp.start(), 6);
    assert_eq!(rule.get_token(lp.start() + 1).get_text(), "puts");
}

#[test]
fn test_rule_source_range() {
    let _ = env_logger::try_init();
    let src = "(a:$expr, b:$expr) -> {\n  puts(a);\n  return b + 97;\n}";
    let mut sm = SourceManager::new();
    let id = sm.add_buffer(src.as_bytes().to_vec(), "<rule>");

    let tokens = lex(id, src);
    let begin = tokens[0].location;
    let mut parser = NacroRuleParser::new(Symbol::new("test_rule"), begin, tokens);
    parser.parse().unwrap();

    let range = parser.rule().source_range();
    let (begin_line, begin_col) = sm.get_line_column(range.start()).unwrap();
    let (end_line, end_col) = sm.get_line_column(range.end()).unwrap();
    assert_eq!(begin_line, 1);
    assert_eq!(begin_col, 1);
    // End is one past the closing brace on the last line
    assert_eq!(end_line - begin_line, 3);
    assert!(end_col > 1);
}

#[test]
fn test_variadic_not_last_is_an_error() {
    let mut parser = parser_for("a:$expr*, b:$stmt)");
    let err = parser.parse_arg_list().unwrap_err();
    assert!(matches!(err, NacroError::VariadicNotLast { .. }));
}

#[test]
fn test_unknown_replacement_kind_is_an_error() {
    let mut parser = parser_for("a:$float)");
    let err = parser.parse_arg_list().unwrap_err();
    match err {
        NacroError::UnknownReplacementKind { found, location } => {
            assert_eq!(found, "$float");
            assert_ne!(location, SourceLoc::builtin());
        }
        other => panic!("expected UnknownReplacementKind, got {other:?}"),
    }
}

#[test]
fn test_nested_loop_is_an_error() {
    let mut parser = parser_for("{ $loop($i in vals) { $loop($j in vals) { x } } }");
    let err = parser.parse_stmts().unwrap_err();
    assert!(matches!(err, NacroError::NestedLoop { .. }));
}

#[test]
fn test_truncated_rule_is_an_error() {
    let mut parser = parser_for("(a:$expr) -> { unclosed");
    let err = parser.parse().unwrap_err();
    assert!(matches!(err, NacroError::UnexpectedEnd));
}

#[test]
fn test_full_parse_of_loop_rule() {
    let mut parser = parser_for("(vals:$expr*) -> { $loop($v in vals) { f($v); } }");
    parser.parse().unwrap();

    let rule = parser.rule();
    assert_eq!(rule.replacements_len(), 1);
    assert!(rule.has_va_args());
    assert_eq!(rule.loops().len(), 1);
    assert!(rule.needs_pp_hooks());
    assert_eq!(rule.loops()[0].iter_range().as_str(), "vals");
}
