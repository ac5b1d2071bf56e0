//! Token definitions for directive operands
//!
//! Condition operands (`flag [operator literal]`) are tokenized with logos before the chumsky
//! parser in [operands](super::operands) gives them structure. Literals are never interpreted
//! at the token level, their text is sliced back out of the source by span.
use logos::Logos;
use std::ops::Range;

/// All tokens that can appear in a condition operand
#[derive(Logos, Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[logos(skip r"\s+")]
pub enum Token {
    #[token("!=")]
    NotEquals,
    #[token(">=")]
    GreaterEquals,
    #[token("<=")]
    LessEquals,
    #[token("=")]
    #[token("==")]
    Equals,
    #[token(">")]
    Greater,
    #[token("<")]
    Less,

    // Flag names and literal fragments
    #[regex(r#"[^\s=!<>"']+"#)]
    Word,

    // Lone characters that only matter inside literals
    #[regex(r#"[!"']"#)]
    Symbol,
}

/// Tokenize operand text with byte ranges. `None` if anything fails to lex.
pub fn tokenize_with_locations(source: &str) -> Option<Vec<(Token, Range<usize>)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => return None,
        }
    }

    Some(tokens)
}
