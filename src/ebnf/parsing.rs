//! Grammar parser: EBNF text to a [`Grammar`] tree
//!
//! Parsing runs in two passes. logos turns the text into `(Lexeme, byte range)` pairs (see
//! [`lexing`](crate::ebnf::lexing)), then the chumsky combinators below assemble the tree.
//!
//! The grammar is ordered choice. Binary and n-ary constructs start with an atom, never with a
//! full right-hand side, which keeps the grammar free of left recursion. The leading atom is
//! parsed once and the operator after it, if any, picks the construct:
//!
//! ```text
//! grammar       = { ws | comment } rule { { ws | comment } rule } { ws | comment } ;
//! rule          = identifier "=" rhs ";" ;
//! rhs           = alternative | concatenation | optional | repetition
//!               | group | range | exception | identifier | terminal ;
//! atom          = identifier | optional | repetition | group | terminal ;
//! alternative   = atom "|" atom { "|" atom } ;
//! concatenation = atom "," atom { "," atom } ;
//! range         = ( identifier | terminal ) ".." atom ;
//! exception     = ( identifier | terminal ) "-" atom ;
//! group         = "(" rhs ")" ;
//! optional      = "[" rhs "]" ;
//! repetition    = "{" rhs "}" ;
//! ```
//!
//! Whitespace and comments are accepted before every significant token and kept in the tree
//! as noise tokens, as are the operator and bracket symbols.

use std::collections::BTreeSet;
use std::ops::Range;

use chumsky::prelude::*;
use chumsky::BoxedParser;

use crate::ebnf::config::{DiagnosticsConfig, EbnfConfig};
use crate::ebnf::error::{EbnfError, StructureError, SyntaxError};
use crate::ebnf::grammar::Grammar;
use crate::ebnf::lexing::{lex, Lexeme, TokenLocation};
use crate::ebnf::position::{format_source_context, SourceLocation};
use crate::ebnf::token::Token;

type ParserError = Simple<TokenLocation>;

type Constructor = fn(Vec<Token>) -> Result<Token, StructureError>;

/// Parse grammar text using the default configuration
pub fn parse(source: &str) -> Result<Grammar, EbnfError> {
    parse_with(source, &EbnfConfig::default())
}

/// Parse grammar text read from `label`, attaching the label to any error
pub fn parse_file(source: &str, label: &str) -> Result<Grammar, EbnfError> {
    parse(source).map_err(|error| error.in_file(label))
}

pub fn parse_with(source: &str, config: &EbnfConfig) -> Result<Grammar, EbnfError> {
    let diagnostics = &config.diagnostics;
    let tokens = lex(source).map_err(|error| attach_context(error, source, diagnostics))?;

    let token = grammar().parse(tokens).map_err(|errors| {
        let error = match errors.first() {
            Some(error) => EbnfError::Syntax(to_syntax_error(source, error)),
            None => EbnfError::Invariant("grammar parser failed without an error".to_string()),
        };
        attach_context(error, source, diagnostics)
    })?;

    Grammar::new(token)
}

// ============================================================================
// Productions
// ============================================================================

/// Helper: match one specific lexeme and keep it as a symbol token
fn symbol(
    expected: Lexeme,
    label: &'static str,
) -> impl Parser<TokenLocation, Token, Error = ParserError> + Clone {
    filter(move |(lexeme, _): &TokenLocation| *lexeme == expected)
        .map(|(lexeme, _): TokenLocation| Token::symbol(lexeme.text()))
        .labelled(label)
}

/// Whitespace or a comment
fn trivia() -> impl Parser<TokenLocation, Token, Error = ParserError> + Clone {
    filter(|(lexeme, _): &TokenLocation| lexeme.is_trivia()).map(
        |(lexeme, _): TokenLocation| match lexeme {
            Lexeme::Comment(text) => Token::comment(text),
            other => Token::whitespace(other.text()),
        },
    )
}

fn identifier() -> impl Parser<TokenLocation, Token, Error = ParserError> + Clone {
    filter_map(|span, (lexeme, range): TokenLocation| match lexeme {
        Lexeme::Identifier(name) => {
            Token::identifier(&name).map_err(|error| Simple::custom(span, error))
        }
        other => Err(Simple::expected_input_found(
            span,
            Vec::new(),
            Some((other, range)),
        )),
    })
    .labelled("identifier")
}

fn terminal() -> impl Parser<TokenLocation, Token, Error = ParserError> + Clone {
    filter_map(|span, (lexeme, range): TokenLocation| match lexeme {
        Lexeme::Terminal(literal) => Ok(Token::terminal(literal.value, literal.text)),
        other => Err(Simple::expected_input_found(
            span,
            Vec::new(),
            Some((other, range)),
        )),
    })
    .labelled("terminal")
}

/// Helper: any leading trivia followed by one significant token
fn spaced<P>(parser: P) -> impl Parser<TokenLocation, Vec<Token>, Error = ParserError> + Clone
where
    P: Parser<TokenLocation, Token, Error = ParserError> + Clone,
{
    trivia()
        .repeated()
        .then(parser)
        .map(|(mut children, token)| {
            children.push(token);
            children
        })
}

/// Helper: run both parsers and concatenate their children
fn concat<A, B>(first: A, second: B) -> impl Parser<TokenLocation, Vec<Token>, Error = ParserError> + Clone
where
    A: Parser<TokenLocation, Vec<Token>, Error = ParserError> + Clone,
    B: Parser<TokenLocation, Vec<Token>, Error = ParserError> + Clone,
{
    first.then(second).map(|(mut children, rest)| {
        children.extend(rest);
        children
    })
}

fn single<P>(parser: P) -> impl Parser<TokenLocation, Vec<Token>, Error = ParserError> + Clone
where
    P: Parser<TokenLocation, Token, Error = ParserError> + Clone,
{
    parser.map(|token| vec![token])
}

fn flatten(parts: Vec<Vec<Token>>) -> Vec<Token> {
    parts.into_iter().flatten().collect()
}

/// Helper: turn a token constructor into a `try_map` callback
fn build(
    constructor: Constructor,
) -> impl Fn(Vec<Token>, Range<usize>) -> Result<Token, ParserError> + Clone {
    move |children, span| constructor(children).map_err(|error| Simple::custom(span, error))
}

/// `open rhs close`
fn enclosed<P>(
    inner: P,
    open: (Lexeme, &'static str),
    close: (Lexeme, &'static str),
    constructor: Constructor,
    label: &'static str,
) -> BoxedParser<'static, TokenLocation, Token, ParserError>
where
    P: Parser<TokenLocation, Token, Error = ParserError> + Clone + 'static,
{
    concat(
        concat(single(symbol(open.0, open.1)), spaced(inner)),
        spaced(symbol(close.0, close.1)),
    )
    .try_map(build(constructor))
    .labelled(label)
    .boxed()
}

/// `op atom`, or `op atom { op atom }` when `repeating`, paired with the constructor of the
/// construct it completes
fn tail<P>(
    atom: P,
    separator: (Lexeme, &'static str),
    repeating: bool,
    constructor: Constructor,
    label: &'static str,
) -> BoxedParser<'static, TokenLocation, (Vec<Token>, Constructor), ParserError>
where
    P: Parser<TokenLocation, Token, Error = ParserError> + Clone + 'static,
{
    let step = concat(spaced(symbol(separator.0, separator.1)), spaced(atom));
    let steps = if repeating {
        step.repeated().at_least(1).map(flatten).boxed()
    } else {
        step.boxed()
    };

    steps
        .map(move |children| (children, constructor))
        .labelled(label)
        .boxed()
}

fn rhs() -> impl Parser<TokenLocation, Token, Error = ParserError> + Clone {
    recursive(|rhs| {
        let group = enclosed(
            rhs.clone(),
            (Lexeme::GroupOpen, "'('"),
            (Lexeme::GroupClose, "')'"),
            Token::group,
            "group",
        );
        let optional = enclosed(
            rhs.clone(),
            (Lexeme::OptionalOpen, "'['"),
            (Lexeme::OptionalClose, "']'"),
            Token::optional,
            "optional",
        );
        let repeated = enclosed(
            rhs,
            (Lexeme::RepeatOpen, "'{'"),
            (Lexeme::RepeatClose, "'}'"),
            Token::repeated,
            "repetition",
        );

        let atom = choice((
            identifier(),
            optional.clone(),
            repeated.clone(),
            group.clone(),
            terminal(),
        ))
        .boxed();

        let alternative = tail(
            atom.clone(),
            (Lexeme::Alternation, "'|'"),
            true,
            Token::alternative,
            "alternative",
        );
        let concatenation = tail(
            atom.clone(),
            (Lexeme::Concatenation, "','"),
            true,
            Token::concatenation,
            "concatenation",
        );
        let range = tail(
            atom.clone(),
            (Lexeme::Range, "'..'"),
            false,
            Token::range,
            "range",
        );
        let exception = tail(
            atom,
            (Lexeme::Exception, "'-'"),
            false,
            Token::exception,
            "exception",
        );

        // Ranges and exceptions only follow a plain identifier or terminal
        let plain = choice((identifier(), terminal())).then(
            choice((alternative.clone(), concatenation.clone(), range, exception)).or_not(),
        );
        let bracketed =
            choice((optional, repeated, group)).then(choice((alternative, concatenation)).or_not());

        choice((plain.boxed(), bracketed.boxed()))
            .try_map(|(first, tail), span| match tail {
                None => Ok(first),
                Some((rest, constructor)) => {
                    let mut children = vec![first];
                    children.extend(rest);
                    build(constructor)(children, span)
                }
            })
            .labelled("rhs")
    })
}

fn rule() -> impl Parser<TokenLocation, Token, Error = ParserError> + Clone {
    concat(
        concat(
            concat(
                single(identifier()),
                spaced(symbol(Lexeme::Assign, "'='")),
            ),
            spaced(rhs()),
        ),
        spaced(symbol(Lexeme::Termination, "';'")),
    )
    .try_map(build(Token::rule))
    .labelled("rule")
}

fn grammar() -> impl Parser<TokenLocation, Token, Error = ParserError> + Clone {
    concat(
        spaced(rule()).repeated().at_least(1).map(flatten),
        trivia().repeated(),
    )
    .then_ignore(end())
    .try_map(build(Token::grammar))
}

// ============================================================================
// Errors
// ============================================================================

fn to_syntax_error(source: &str, error: &ParserError) -> SyntaxError {
    let location = SourceLocation::new(source);
    let offset = match error.found() {
        Some((_, range)) => range.start,
        None => source.len(),
    };

    let expected = error
        .label()
        .map(str::to_string)
        .or_else(|| {
            let expected: BTreeSet<String> = error
                .expected()
                .filter_map(|expected| expected.as_ref())
                .map(|(lexeme, _)| format!("{:?}", lexeme.text()))
                .collect();
            (!expected.is_empty()).then(|| expected.into_iter().collect::<Vec<_>>().join(" or "))
        })
        .unwrap_or_else(|| "rule".to_string());

    SyntaxError {
        found: error.found().and_then(|_| location.char_at(offset)),
        position: location.position(offset),
        expected,
        context: None,
    }
}

fn attach_context(error: EbnfError, source: &str, diagnostics: &DiagnosticsConfig) -> EbnfError {
    if !diagnostics.show_source_context {
        return error;
    }

    let excerpt = |line| format_source_context(source, line, diagnostics.context_lines);
    match error {
        EbnfError::Syntax(mut error) => {
            error.context = Some(excerpt(error.position.line));
            EbnfError::Syntax(error)
        }
        EbnfError::TerminalDecode(mut error) => {
            error.context = Some(excerpt(error.position.line));
            EbnfError::TerminalDecode(error)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebnf::token::TokenKind;

    fn parse_rhs(source: &str) -> Token {
        let grammar = parse(&format!("TEST={};", source)).unwrap();
        let assignment = grammar.rules().next().unwrap().assignment().clone();
        assignment
    }

    fn kinds(token: &Token) -> Vec<TokenKind> {
        token.children().iter().map(Token::kind).collect()
    }

    #[test]
    fn test_single_rule() {
        let grammar = parse("TEST1=\"abc\";").unwrap();
        let root = grammar.token();

        assert_eq!(root.text(), "TEST1=\"abc\";");
        assert_eq!(kinds(root), vec![TokenKind::Rule]);

        let rule = &root.children()[0];
        assert_eq!(
            kinds(rule),
            vec![
                TokenKind::Identifier,
                TokenKind::Symbol,
                TokenKind::Terminal,
                TokenKind::Symbol
            ]
        );
        assert_eq!(rule.children()[2].as_terminal().unwrap().value(), "abc");
    }

    #[test]
    fn test_whitespace_and_comments_are_kept() {
        let source = "  (* first *) A = \"a\" ; \n B = 'b';\n";
        let grammar = parse(source).unwrap();

        assert_eq!(grammar.token().text(), source);
        assert_eq!(grammar.rules().count(), 2);
        assert_eq!(grammar.token().children()[1].comment_value(), Some(" first "));
    }

    #[test]
    fn test_alternative() {
        let token = parse_rhs("\"a\" | \"b\" | C");
        assert_eq!(token.kind(), TokenKind::Alternative);
        assert_eq!(token.significant().count(), 3);
        assert_eq!(token.text(), "\"a\" | \"b\" | C");
    }

    #[test]
    fn test_concatenation() {
        let token = parse_rhs("\"a\",B , [C]");
        assert_eq!(token.kind(), TokenKind::Concatenation);
        let significant: Vec<TokenKind> = token.significant().map(Token::kind).collect();
        assert_eq!(
            significant,
            vec![TokenKind::Terminal, TokenKind::Identifier, TokenKind::Optional]
        );
    }

    #[test]
    fn test_range_is_tried_before_terminal() {
        let token = parse_rhs("\"a\"..\"z\"");
        assert_eq!(token.kind(), TokenKind::Range);
    }

    #[test]
    fn test_exception() {
        let token = parse_rhs("LETTERS - \"abc\"");
        assert_eq!(token.kind(), TokenKind::Exception);
        assert_eq!(
            kinds(&token),
            vec![
                TokenKind::Identifier,
                TokenKind::Whitespace,
                TokenKind::Symbol,
                TokenKind::Whitespace,
                TokenKind::Terminal
            ]
        );
    }

    #[test]
    fn test_enclosed_forms() {
        assert_eq!(parse_rhs("( A )").kind(), TokenKind::Group);
        assert_eq!(parse_rhs("[A]").kind(), TokenKind::Optional);
        assert_eq!(parse_rhs("{A}").kind(), TokenKind::Repeated);
        assert_eq!(parse_rhs("[[\"a\"]]").kind(), TokenKind::Optional);
    }

    #[test]
    fn test_group_contains_full_rhs() {
        let token = parse_rhs("(\"a\" | \"b\"), \"c\"");
        assert_eq!(token.kind(), TokenKind::Concatenation);
        let group = token.significant().next().unwrap();
        assert_eq!(group.kind(), TokenKind::Group);
        assert_eq!(
            group.significant().next().unwrap().kind(),
            TokenKind::Alternative
        );
    }

    #[test]
    fn test_deeply_nested_groups() {
        let depth = 30;
        let rhs = format!("{}\"a\"{}", "(".repeat(depth), ")".repeat(depth));
        let mut token = parse_rhs(&rhs);

        assert_eq!(token.text(), rhs);
        for _ in 0..depth {
            assert_eq!(token.kind(), TokenKind::Group);
            let inner = token.significant().next().unwrap().clone();
            token = inner;
        }
        assert_eq!(token.as_terminal().unwrap().value(), "a");
    }

    #[test]
    fn test_nested_operators_in_groups() {
        let token = parse_rhs("((A | B), C) | [D - 'x'] | {E..F}");
        assert_eq!(token.kind(), TokenKind::Alternative);
        let significant: Vec<TokenKind> = token.significant().map(Token::kind).collect();
        assert_eq!(
            significant,
            vec![TokenKind::Group, TokenKind::Optional, TokenKind::Repeated]
        );
    }

    #[test]
    fn test_range_needs_plain_left_operand() {
        assert!(matches!(parse("TEST = [A]..B;"), Err(EbnfError::Syntax(_))));
        assert!(matches!(parse("TEST = (A) - B;"), Err(EbnfError::Syntax(_))));
        assert_eq!(parse_rhs("A..[B]").kind(), TokenKind::Range);
    }

    #[test]
    fn test_missing_termination() {
        let error = parse("TEST = \"abc\"").unwrap_err();
        match error {
            EbnfError::Syntax(error) => {
                assert_eq!(error.found, None);
                assert_eq!(error.position.column, 13);
                assert!(error.to_string().starts_with("End of text at (13,1)"));
            }
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_rhs() {
        let error = parse("TEST = ;").unwrap_err();
        match error {
            EbnfError::Syntax(error) => {
                assert_eq!(error.found, Some(';'));
                assert_eq!(error.position.column, 8);
                assert_eq!(error.position.line, 1);
            }
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_grammar_fails() {
        assert!(matches!(parse("  "), Err(EbnfError::Syntax(_))));
        assert!(matches!(parse(""), Err(EbnfError::Syntax(_))));
    }

    #[test]
    fn test_error_has_context_by_default() {
        let error = parse("A = \"a\";\nB = ;").unwrap_err();
        match error {
            EbnfError::Syntax(error) => {
                let context = error.context.unwrap();
                assert!(context.contains(">>   2 | B = ;"));
                assert!(context.contains("     1 | A = \"a\";"));
            }
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_context_can_be_disabled() {
        let mut config = EbnfConfig::default();
        config.diagnostics.show_source_context = false;

        match parse_with("A = ;", &config).unwrap_err() {
            EbnfError::Syntax(error) => assert_eq!(error.context, None),
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_file_labels_errors() {
        let error = parse_file("A = ;", "broken.ebnf").unwrap_err();
        assert!(error
            .to_string()
            .starts_with("Unable to parse grammar in file \"broken.ebnf\": "));
        assert!(matches!(error.root(), EbnfError::Syntax(_)));
    }

    #[test]
    fn test_decode_error_propagates() {
        assert!(matches!(
            parse("A = 'a\\qb';"),
            Err(EbnfError::TerminalDecode(_))
        ));
    }
}
