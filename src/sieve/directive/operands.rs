//! Operand parsing for conditional directives
//!
//! Grammar: `<condition> = <flag> (<operator> <literal>)?`
//! Where: `<operator> = "=" | "==" | "!=" | ">" | ">=" | "<" | "<="` and `<literal>` is
//! everything after the operator, taken verbatim from the source.

use super::tokens::{tokenize_with_locations, Token};
use crate::sieve::literal::Comparison;
use chumsky::{prelude::*, Stream};
use std::ops::Range;

/// Type alias for token with location
type TokenLocation = (Token, Range<usize>);
type ParserError = Simple<TokenLocation>;

/// Condition operand with source text locations for later extraction
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConditionOperands {
    pub(crate) flag_location: Range<usize>,
    pub(crate) comparison: Option<(Comparison, Range<usize>)>,
}

impl ConditionOperands {
    pub(crate) fn flag<'a>(&self, source: &'a str) -> &'a str {
        &source[self.flag_location.clone()]
    }

    pub(crate) fn literal<'a>(&self, source: &'a str) -> Option<(Comparison, &'a str)> {
        self.comparison
            .as_ref()
            .map(|(op, location)| (*op, &source[location.clone()]))
    }
}

fn condition_parser() -> impl Parser<TokenLocation, ConditionOperands, Error = ParserError> {
    let flag = filter::<TokenLocation, _, ParserError>(|(token, _): &TokenLocation| {
        matches!(token, Token::Word)
    })
    .map(|(_, span): TokenLocation| span);

    let operator = filter_map(
        |span: Range<usize>, (token, _): TokenLocation| -> Result<Comparison, ParserError> {
            match token {
                Token::Equals => Ok(Comparison::Eq),
                Token::NotEquals => Ok(Comparison::Ne),
                Token::Greater => Ok(Comparison::Gt),
                Token::GreaterEquals => Ok(Comparison::Gte),
                Token::Less => Ok(Comparison::Lt),
                Token::LessEquals => Ok(Comparison::Lte),
                other => Err(Simple::custom(
                    span,
                    format!("expected a comparison operator, found {:?}", other),
                )),
            }
        },
    );

    let literal = any::<TokenLocation, ParserError>()
        .map(|(_, span): TokenLocation| span)
        .repeated()
        .at_least(1)
        .map(|segments: Vec<Range<usize>>| {
            let start = segments.first().map(|range| range.start).unwrap_or(0);
            let end = segments.last().map(|range| range.end).unwrap_or(start);
            start..end
        });

    flag.then(operator.then(literal).or_not())
        .then_ignore(end())
        .map(|(flag_location, comparison)| ConditionOperands {
            flag_location,
            comparison,
        })
}

/// Parse `flag [operator literal]`. `None` when the text does not fit the grammar.
pub(crate) fn parse_condition(source: &str) -> Option<ConditionOperands> {
    let tokens = tokenize_with_locations(source)?;
    let eoi = source.len()..source.len();

    let stream = Stream::from_iter(
        eoi,
        tokens
            .into_iter()
            .map(|(token, span)| ((token, span.clone()), span)),
    );

    condition_parser().parse(stream).ok()
}
