//! Parser rejection tests: every malformed input fails with a located,
//! human-readable expectation message and no partial output.

use cairn_compiler::error::ParserError;
use cairn_compiler::parse_file;

fn parse_err(source: &str) -> ParserError {
    parse_file("bad.cairn", source).unwrap_err()
}

#[test]
fn test_unclosed_function() {
    let err = parse_err("func main():\n    ret\n");
    assert!(matches!(err, ParserError::UnexpectedEof { .. }));
    assert!(err.to_string().contains("'end'"));
}

#[test]
fn test_missing_name_after_const() {
    let err = parse_err("const = 5\n");
    match err {
        ParserError::UnexpectedToken {
            location, expected, ..
        } => {
            assert_eq!(location.file, "bad.cairn");
            assert_eq!(location.start_line, 1);
            assert!(expected.contains("constant name"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_invalid_character() {
    let err = parse_err("[ap] = 5 @ 3\n");
    assert!(matches!(err, ParserError::InvalidToken { .. }));
}

#[test]
fn test_unterminated_hint() {
    let err = parse_err("%{ never closed\nret\n");
    assert!(matches!(err, ParserError::UnterminatedHint { .. }));
}

#[test]
fn test_jump_condition_must_compare_to_zero() {
    let err = parse_err("jmp target if [ap] != 5\n");
    match err {
        ParserError::UnexpectedToken { expected, .. } => assert!(expected.contains("'0'")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_unbalanced_brackets() {
    let err = parse_err("[ap = 5\n");
    assert!(matches!(err, ParserError::UnexpectedToken { .. }));
}

#[test]
fn test_struct_rejects_plain_statements() {
    let err = parse_err("struct S:\n    [ap] = 5\nend\n");
    match err {
        ParserError::UnexpectedToken { expected, .. } => {
            assert!(expected.contains("'member' or 'end'"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_builtins_directive_needs_names() {
    let err = parse_err("%builtins\n");
    match err {
        ParserError::UnexpectedToken { expected, .. } => {
            assert!(expected.contains("builtin name"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_locations_point_at_the_offending_line() {
    let err = parse_err("ret\nret\nconst = 1\n");
    assert_eq!(err.location().start_line, 3);
}

#[test]
fn test_expression_entry_point_rejects_statements() {
    let err = cairn_compiler::parse_expr("bad.cairn", "ret").unwrap_err();
    assert!(matches!(err, ParserError::UnexpectedToken { .. }));
}
