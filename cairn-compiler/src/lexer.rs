//! Lexer for the Cairn language

use cairn_spec::Felt;
use logos::{Lexer, Logos};

fn lex_int(lex: &mut Lexer<Token>) -> Option<Felt> {
    Felt::from_dec_str(lex.slice())
}

fn lex_hex(lex: &mut Lexer<Token>) -> Option<Felt> {
    Felt::from_hex(lex.slice())
}

/// Captures everything between `%{` and the matching `%}`
fn lex_hint(lex: &mut Lexer<Token>) -> Option<String> {
    let rest = lex.remainder();
    let end = rest.find("%}")?;
    let body = rest[..end].to_string();
    lex.bump(end + 2);
    Some(body)
}

/// Tokens for Cairn source
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")] // Skip whitespace (not newlines)
#[logos(skip r"#[^\n]*")] // Skip comments
pub enum Token {
    // Keywords
    #[token("func")]
    Func,
    #[token("end")]
    End,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("and")]
    And,
    #[token("struct")]
    Struct,
    #[token("namespace")]
    Namespace,
    #[token("member")]
    Member,
    #[token("const")]
    Const,
    #[token("let")]
    Let,
    #[token("local")]
    Local,
    #[token("tempvar")]
    TempVar,
    #[token("alloc_locals")]
    AllocLocals,
    #[token("call")]
    Call,
    #[token("ret")]
    Ret,
    #[token("return")]
    Return,
    #[token("jmp")]
    Jmp,
    #[token("rel")]
    Rel,
    #[token("abs")]
    Abs,
    #[token("ap")]
    Ap,
    #[token("fp")]
    Fp,
    #[token("cast")]
    Cast,
    #[token("felt")]
    Felt,
    #[token("from")]
    From,
    #[token("import")]
    Import,
    #[token("as")]
    As,

    /// The builtins directive
    #[token("%builtins")]
    BuiltinsDirective,

    /// Hint block body, delimiters stripped
    #[token("%{", lex_hint)]
    Hint(String),

    /// Identifier (user names; `$` is reserved for generated names)
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    /// Decimal literal, reduced modulo the prime
    #[regex(r"[0-9]+", lex_int)]
    Int(Felt),

    /// Hex literal
    #[regex(r"0x[0-9a-fA-F]+", lex_hex)]
    Hex(Felt),

    // Operators and punctuation
    #[token("++")]
    PlusPlus,
    #[token("+")]
    Plus,
    #[token("->")]
    Arrow,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("&")]
    Ampersand,

    #[regex(r"\r?\n")]
    Newline,
}

impl Token {
    /// Human-readable description used in expectation messages
    pub fn describe(&self) -> String {
        match self {
            Token::Identifier(name) => name.clone(),
            Token::Int(v) => v.to_string(),
            Token::Hex(v) => v.to_hex(),
            Token::Hint(_) => "%{ ... %}".to_string(),
            Token::Newline => "end of line".to_string(),
            other => format!("{other:?}").to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        Token::lexer(source).map(|t| t.unwrap()).collect()
    }

    #[test]
    fn test_lex_assert_statement() {
        let tokens = lex_all("[ap] = [fp + 1] + 5; ap++");
        assert_eq!(
            tokens,
            vec![
                Token::LBracket,
                Token::Ap,
                Token::RBracket,
                Token::Eq,
                Token::LBracket,
                Token::Fp,
                Token::Plus,
                Token::Int(Felt::from(1u64)),
                Token::RBracket,
                Token::Plus,
                Token::Int(Felt::from(5u64)),
                Token::Semicolon,
                Token::Ap,
                Token::PlusPlus,
            ]
        );
    }

    #[test]
    fn test_lex_keywords_vs_identifiers() {
        let tokens = lex_all("func funky");
        assert_eq!(
            tokens,
            vec![Token::Func, Token::Identifier("funky".to_string())]
        );
    }

    #[test]
    fn test_lex_numbers() {
        let tokens = lex_all("42 0x2a");
        assert_eq!(
            tokens,
            vec![
                Token::Int(Felt::from(42u64)),
                Token::Hex(Felt::from(42u64))
            ]
        );
    }

    #[test]
    fn test_lex_hint_block() {
        let tokens = lex_all("%{ memory[ap] = 5 %}\nret");
        assert_eq!(
            tokens,
            vec![
                Token::Hint(" memory[ap] = 5 ".to_string()),
                Token::Newline,
                Token::Ret,
            ]
        );
    }

    #[test]
    fn test_lex_builtins_directive() {
        let tokens = lex_all("%builtins output range_check");
        assert_eq!(
            tokens,
            vec![
                Token::BuiltinsDirective,
                Token::Identifier("output".to_string()),
                Token::Identifier("range_check".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex_all("ret # this is a comment\nret");
        assert_eq!(tokens, vec![Token::Ret, Token::Newline, Token::Ret]);
    }

    #[test]
    fn test_unterminated_hint_is_error() {
        let mut lex = Token::lexer("%{ no close");
        assert!(lex.next().unwrap().is_err());
    }

    #[test]
    fn test_dollar_is_not_an_identifier() {
        let mut lex = Token::lexer("$gen");
        assert!(lex.next().unwrap().is_err());
    }
}
