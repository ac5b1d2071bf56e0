//! Directive recognition
//!
//!     A line is a directive when, after optional indentation, it starts with the marker
//!     prefix immediately followed by an ASCII-letter directive name, and the name is followed
//!     by whitespace or the end of the line. Anything else is content, including comments
//!     that merely start with the prefix (`//# sourceMappingURL=...`, `//#!`, `//# note`).
//!
//!     Recognized names are a closed set. A line that looks like a directive but names
//!     something unknown is an error rather than silently passing through as content.

pub mod operands;
pub mod tokens;

use std::fmt;

use crate::sieve::error::ErrorKind;
use crate::sieve::literal::{Condition, Test, Value};

/// Default marker prefix
pub const DEFAULT_PREFIX: &str = "//#";

/// Kinds of scopes that must be explicitly closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    If,
    Unless,
    Label,
}

impl ScopeKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "if" => Some(ScopeKind::If),
            "unless" => Some(ScopeKind::Unless),
            "label" => Some(ScopeKind::Label),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeKind::If => "if",
            ScopeKind::Unless => "unless",
            ScopeKind::Label => "label",
        };
        f.write_str(name)
    }
}

/// `path::label::label` operand of `include` / `without`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: String,
    pub labels: Vec<String>,
}

impl Target {
    fn parse(args: &str) -> Self {
        let mut parts = args.split("::");
        let path = parts.next().unwrap_or_default().trim().to_string();
        let labels = parts
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(String::from)
            .collect();
        Target { path, labels }
    }
}

/// A parsed directive line
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Include(Target),
    Without(Target),
    Label(String),
    If(Condition),
    /// Carries the already negated condition
    Unless(Condition),
    Close(ScopeKind),
    Set { flag: String, value: Value },
    Unset { flag: String },
}

/// Directive marker convention
#[derive(Debug, Clone)]
pub struct DirectiveSyntax {
    prefix: String,
}

impl Default for DirectiveSyntax {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl DirectiveSyntax {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Classify one physical line: `Ok(None)` for content, `Ok(Some(_))` for a directive.
    pub fn parse_line(&self, line: &str) -> Result<Option<Directive>, ErrorKind> {
        let Some(rest) = line.trim_start().strip_prefix(self.prefix.as_str()) else {
            return Ok(None);
        };

        let name_len = rest.bytes().take_while(u8::is_ascii_alphabetic).count();
        if name_len == 0 {
            return Ok(None);
        }

        let (name, args) = rest.split_at(name_len);
        if !(args.is_empty() || args.starts_with(char::is_whitespace)) {
            return Ok(None);
        }

        parse_directive(name, args.trim()).map(Some)
    }
}

fn parse_directive(name: &str, args: &str) -> Result<Directive, ErrorKind> {
    match name {
        "include" => Ok(Directive::Include(parse_target("include", args)?)),
        "without" => Ok(Directive::Without(parse_target("without", args)?)),
        "label" => first_word(args)
            .map(|label| Directive::Label(label.to_string()))
            .ok_or(ErrorKind::MissingOperand {
                directive: "label",
                expected: "a label name",
            }),
        "if" => parse_condition("if", args).map(Directive::If),
        "unless" => parse_condition("unless", args).map(|c| Directive::Unless(c.negated())),
        "endif" => Ok(Directive::Close(ScopeKind::If)),
        "endunless" => Ok(Directive::Close(ScopeKind::Unless)),
        "endlabel" => Ok(Directive::Close(ScopeKind::Label)),
        "end" => {
            let kind = first_word(args).ok_or(ErrorKind::MissingOperand {
                directive: "end",
                expected: "a scope kind (if, unless or label)",
            })?;
            ScopeKind::from_name(kind)
                .map(Directive::Close)
                .ok_or_else(|| ErrorKind::UnknownDirective(format!("end {}", kind)))
        }
        "set" => {
            let mut parts = args.splitn(2, char::is_whitespace);
            let flag = parts
                .next()
                .filter(|flag| !flag.is_empty())
                .ok_or(ErrorKind::MissingOperand {
                    directive: "set",
                    expected: "a flag name",
                })?;
            let value = parts
                .next()
                .map(str::trim)
                .filter(|literal| !literal.is_empty())
                .map(Value::coerce)
                .unwrap_or(Value::Bool(true));
            Ok(Directive::Set {
                flag: flag.to_string(),
                value,
            })
        }
        "unset" => first_word(args)
            .map(|flag| Directive::Unset {
                flag: flag.to_string(),
            })
            .ok_or(ErrorKind::MissingOperand {
                directive: "unset",
                expected: "a flag name",
            }),
        other => Err(ErrorKind::UnknownDirective(other.to_string())),
    }
}

fn first_word(args: &str) -> Option<&str> {
    args.split_whitespace().next()
}

fn parse_target(directive: &'static str, args: &str) -> Result<Target, ErrorKind> {
    if args.is_empty() {
        return Err(ErrorKind::MissingOperand {
            directive,
            expected: "a path or `::label`",
        });
    }
    Ok(Target::parse(args))
}

fn parse_condition(directive: &'static str, args: &str) -> Result<Condition, ErrorKind> {
    if args.is_empty() {
        return Err(ErrorKind::MissingOperand {
            directive,
            expected: "a flag name",
        });
    }

    let operands = operands::parse_condition(args)
        .ok_or_else(|| ErrorKind::MalformedCondition(args.to_string()))?;

    let test = match operands.literal(args) {
        Some((op, literal)) => Test::Compare(op, Value::coerce(literal)),
        None => Test::Truthy,
    };
    Ok(Condition::new(operands.flag(args), test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::literal::Comparison;
    use rstest::rstest;

    fn parse(line: &str) -> Result<Option<Directive>, ErrorKind> {
        DirectiveSyntax::default().parse_line(line)
    }

    #[rstest]
    #[case("plain text")]
    #[case("// a regular comment")]
    #[case("//# sourceMappingURL=app.js.map")]
    #[case("//#sourceMappingURL=app.js.map")]
    #[case("//#!")]
    #[case("")]
    fn test_content_lines(#[case] line: &str) {
        assert_eq!(parse(line).expect("content never errors"), None);
    }

    #[test]
    fn test_include_with_labels() {
        let directive = parse("  //#include lib/util.js::debug::extra").unwrap();
        assert_eq!(
            directive,
            Some(Directive::Include(Target {
                path: "lib/util.js".to_string(),
                labels: vec!["debug".to_string(), "extra".to_string()],
            }))
        );
    }

    #[test]
    fn test_labels_only_include() {
        let directive = parse("//#include ::debug").unwrap();
        assert_eq!(
            directive,
            Some(Directive::Include(Target {
                path: String::new(),
                labels: vec!["debug".to_string()],
            }))
        );
    }

    #[test]
    fn test_unless_negates() {
        let Some(Directive::Unless(condition)) = parse("//#unless ie > 8").unwrap() else {
            panic!("expected a conditional");
        };
        assert!(condition.negate);
        assert_eq!(condition.flag, "ie");
        assert_eq!(condition.test, Test::Compare(Comparison::Gt, Value::Int(8)));
    }

    #[test]
    fn test_condition_literal_with_non_breaking_space() {
        let Some(Directive::If(condition)) = parse("//#if city = San\u{a0}Jose").unwrap() else {
            panic!("expected a conditional");
        };
        assert_eq!(
            condition.test,
            Test::Compare(Comparison::Eq, Value::Str("San\u{a0}Jose".to_string()))
        );
    }

    #[rstest]
    #[case("//#endif", ScopeKind::If)]
    #[case("//#endunless", ScopeKind::Unless)]
    #[case("//#endlabel", ScopeKind::Label)]
    #[case("//#end if", ScopeKind::If)]
    #[case("//#end label", ScopeKind::Label)]
    fn test_closers(#[case] line: &str, #[case] kind: ScopeKind) {
        assert_eq!(parse(line).unwrap(), Some(Directive::Close(kind)));
    }

    #[test]
    fn test_set_defaults_to_true() {
        assert_eq!(
            parse("//#set debug").unwrap(),
            Some(Directive::Set {
                flag: "debug".to_string(),
                value: Value::Bool(true),
            })
        );
        assert_eq!(
            parse("//#set target node 18").unwrap(),
            Some(Directive::Set {
                flag: "target".to_string(),
                value: Value::Str("node 18".to_string()),
            })
        );
    }

    #[test]
    fn test_custom_prefix() {
        let syntax = DirectiveSyntax::new("#");
        assert_eq!(
            syntax.parse_line("#unset debug").unwrap(),
            Some(Directive::Unset {
                flag: "debug".to_string()
            })
        );
        assert_eq!(syntax.parse_line("//#unset debug").unwrap(), None);
    }

    #[rstest]
    #[case("//#iff debug")]
    #[case("//#end while")]
    fn test_unknown_directives(#[case] line: &str) {
        assert!(matches!(parse(line), Err(ErrorKind::UnknownDirective(_))));
    }

    #[rstest]
    #[case("//#if")]
    #[case("//#set")]
    #[case("//#include")]
    #[case("//#label")]
    #[case("//#end")]
    fn test_missing_operands(#[case] line: &str) {
        assert!(matches!(parse(line), Err(ErrorKind::MissingOperand { .. })));
    }

    #[test]
    fn test_malformed_condition() {
        assert!(matches!(
            parse("//#if ie 7"),
            Err(ErrorKind::MalformedCondition(_))
        ));
    }
}
