//! Lexer for EBNF grammar text
//!
//! Tokenization is handled by logos. Terminal literals are decoded here, while the input
//! is still addressed by byte offset, so an invalid escape sequence reports the exact
//! position of its backslash.
//!
//! Escapes recognized inside terminals: `\0 \f \t \r \n \' \" \\` and `\uHHHH` with exactly
//! four hex digits. A fifth hex-looking character is plain text following the decoded one.

use std::ops::Range;

use logos::Logos;

use crate::ebnf::error::{EbnfError, SyntaxError, TerminalDecodeError};
use crate::ebnf::position::SourceLocation;

/// A lexeme paired with its byte range in the grammar text
pub type TokenLocation = (Lexeme, Range<usize>);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    /// `offset` is the byte offset of the backslash in the grammar text
    InvalidEscape { escape: String, offset: usize },
}

/// A quoted literal: source form plus decoded value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalLiteral {
    pub text: String,
    pub value: String,
}

/// All lexemes of the EBNF surface grammar
#[derive(Logos, Debug, Clone, PartialEq, Eq, Hash)]
#[logos(error = LexError)]
pub enum Lexeme {
    #[regex(r"[ \t\r\n\f]+", |lex| lex.slice().to_string())]
    Whitespace(String),

    #[regex(r"\(\*([^*]|\*+[^*)])*\*+\)", |lex| lex.slice().to_string())]
    Comment(String),

    #[regex(r"[A-Za-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r#"'([^'\\]|\\.)+'"#, terminal)]
    #[regex(r#""([^"\\]|\\.)+""#, terminal)]
    Terminal(TerminalLiteral),

    #[token("=")]
    Assign,
    #[token(";")]
    Termination,
    #[token("|")]
    Alternation,
    #[token(",")]
    Concatenation,
    #[token("-")]
    Exception,
    #[token("..")]
    Range,
    #[token("(")]
    GroupOpen,
    #[token(")")]
    GroupClose,
    #[token("[")]
    OptionalOpen,
    #[token("]")]
    OptionalClose,
    #[token("{")]
    RepeatOpen,
    #[token("}")]
    RepeatClose,
}

impl Lexeme {
    /// Source text of the lexeme
    pub fn text(&self) -> &str {
        match self {
            Lexeme::Whitespace(text) | Lexeme::Comment(text) | Lexeme::Identifier(text) => text,
            Lexeme::Terminal(literal) => &literal.text,
            Lexeme::Assign => "=",
            Lexeme::Termination => ";",
            Lexeme::Alternation => "|",
            Lexeme::Concatenation => ",",
            Lexeme::Exception => "-",
            Lexeme::Range => "..",
            Lexeme::GroupOpen => "(",
            Lexeme::GroupClose => ")",
            Lexeme::OptionalOpen => "[",
            Lexeme::OptionalClose => "]",
            Lexeme::RepeatOpen => "{",
            Lexeme::RepeatClose => "}",
        }
    }

    /// Whitespace and comments may appear between any two significant lexemes
    pub fn is_trivia(&self) -> bool {
        matches!(self, Lexeme::Whitespace(_) | Lexeme::Comment(_))
    }
}

fn terminal(lex: &mut logos::Lexer<Lexeme>) -> Result<TerminalLiteral, LexError> {
    let text = lex.slice();
    let body = &text[1..text.len() - 1];
    let value = decode_escapes(body).map_err(|(escape, offset)| LexError::InvalidEscape {
        escape,
        offset: lex.span().start + 1 + offset,
    })?;

    Ok(TerminalLiteral {
        text: text.to_string(),
        value,
    })
}

/// Decode the escape sequences of a terminal body (quotes already stripped)
///
/// On failure returns the offending escape sequence and the byte offset of its backslash
/// within `body`.
pub fn decode_escapes(body: &str) -> Result<String, (String, usize)> {
    let mut decoded = String::with_capacity(body.len());
    let mut chars = body.char_indices();

    while let Some((index, c)) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }

        let escaped = match chars.next() {
            Some((_, escaped)) => escaped,
            None => return Err(("\\".to_string(), index)),
        };

        match escaped {
            '0' => decoded.push('\0'),
            'f' => decoded.push('\x0C'),
            't' => decoded.push('\t'),
            'r' => decoded.push('\r'),
            'n' => decoded.push('\n'),
            '\'' | '"' | '\\' => decoded.push(escaped),
            'u' => {
                let hex: String = chars.clone().take(4).map(|(_, c)| c).collect();
                let unicode = (hex.len() == 4 && hex.chars().all(|c| c.is_ascii_hexdigit()))
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);

                match unicode {
                    Some(unicode) => {
                        decoded.push(unicode);
                        chars.nth(3);
                    }
                    None => return Err((format!("\\u{}", hex), index)),
                }
            }
            other => return Err((format!("\\{}", other), index)),
        }
    }

    Ok(decoded)
}

/// Tokenize grammar text, keeping every lexeme with its byte range
pub fn lex(source: &str) -> Result<Vec<TokenLocation>, EbnfError> {
    let mut lexer = Lexeme::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(lexeme) => tokens.push((lexeme, span)),
            Err(LexError::UnexpectedCharacter) => {
                let location = SourceLocation::new(source);
                let found = location.char_at(span.start);
                let expected = match found {
                    Some('\'') | Some('"') => "closing quote",
                    _ => "identifier, terminal, symbol, whitespace or comment",
                };
                return Err(SyntaxError {
                    found,
                    position: location.position(span.start),
                    expected: expected.to_string(),
                    context: None,
                }
                .into());
            }
            Err(LexError::InvalidEscape { escape, offset }) => {
                return Err(TerminalDecodeError {
                    escape,
                    position: SourceLocation::new(source).position(offset),
                    terminal: lexer.slice().to_string(),
                    context: None,
                }
                .into());
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexemes(source: &str) -> Vec<Lexeme> {
        lex(source).unwrap().into_iter().map(|(l, _)| l).collect()
    }

    fn terminal_value(source: &str) -> String {
        match lexemes(source).as_slice() {
            [Lexeme::Terminal(literal)] => literal.value.clone(),
            other => panic!("expected a single terminal, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_lexemes() {
        assert_eq!(
            lexemes("TEST1=\"abc\";"),
            vec![
                Lexeme::Identifier("TEST1".to_string()),
                Lexeme::Assign,
                Lexeme::Terminal(TerminalLiteral {
                    text: "\"abc\"".to_string(),
                    value: "abc".to_string(),
                }),
                Lexeme::Termination,
            ]
        );
    }

    #[test]
    fn test_symbols() {
        assert_eq!(
            lexemes("|,-..()[]{}"),
            vec![
                Lexeme::Alternation,
                Lexeme::Concatenation,
                Lexeme::Exception,
                Lexeme::Range,
                Lexeme::GroupOpen,
                Lexeme::GroupClose,
                Lexeme::OptionalOpen,
                Lexeme::OptionalClose,
                Lexeme::RepeatOpen,
                Lexeme::RepeatClose,
            ]
        );
    }

    #[test]
    fn test_comment_and_whitespace() {
        assert_eq!(
            lexemes("(* a * comment *) \n"),
            vec![
                Lexeme::Comment("(* a * comment *)".to_string()),
                Lexeme::Whitespace(" \n".to_string()),
            ]
        );
    }

    #[test]
    fn test_group_open_is_not_a_comment() {
        assert_eq!(
            lexemes("(A)"),
            vec![
                Lexeme::GroupOpen,
                Lexeme::Identifier("A".to_string()),
                Lexeme::GroupClose
            ]
        );
    }

    #[test]
    fn test_spans_cover_source() {
        let source = "A = 'x' ;";
        let tokens = lex(source).unwrap();
        let rebuilt: String = tokens.iter().map(|(_, span)| &source[span.clone()]).collect();
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_decode_simple_escapes() {
        assert_eq!(terminal_value(r"'hel\tlo'"), "hel\tlo");
        assert_eq!(terminal_value(r#"'\0\f\r\n'"#), "\0\x0C\r\n");
        assert_eq!(terminal_value(r#""\"\'\\""#), "\"'\\");
    }

    #[test]
    fn test_decode_unicode_consumes_exactly_four_digits() {
        assert_eq!(terminal_value(r"'hel\u12345lo'"), "hel\u{1234}5lo");
    }

    #[test]
    fn test_decode_single_and_double_quotes() {
        assert_eq!(terminal_value("'say \"hi\"'"), "say \"hi\"");
        assert_eq!(terminal_value("\"it's\""), "it's");
    }

    #[test]
    fn test_invalid_escape_reports_position() {
        let error = lex(r"A = 'a\x';").unwrap_err();
        match error {
            EbnfError::TerminalDecode(error) => {
                assert_eq!(error.escape, "\\x");
                assert_eq!(error.position.column, 7);
                assert_eq!(error.terminal, r"'a\x'");
            }
            other => panic!("expected a decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_unicode_escape() {
        assert_eq!(
            decode_escapes(r"\u0XYZ1"),
            Err(("\\u0XYZ".to_string(), 0))
        );
        assert_eq!(decode_escapes(r"ab\u12"), Err(("\\u12".to_string(), 2)));
    }

    #[test]
    fn test_unterminated_terminal_fails() {
        let error = lex("A = 'abc").unwrap_err();
        match error {
            EbnfError::Syntax(error) => {
                assert_eq!(error.found, Some('\''));
                assert_eq!(error.expected, "closing quote");
            }
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_terminal_fails() {
        assert!(lex("A = '';").is_err());
    }

    #[test]
    fn test_unexpected_character() {
        let error = lex("A = @;").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid character '@' at (5,1) expected identifier, terminal, symbol, whitespace or comment"
        );
    }
}
