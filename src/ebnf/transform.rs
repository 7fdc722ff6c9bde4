//! Hooks applied to every parser the compiler builds
//!
//! The compiler calls exactly one hook per token after building that token's parser and
//! uses whatever the hook returns in its place. Terminal hooks fire while the grammar is
//! registered; identifier hooks for recursive references fire last, once the referenced
//! rule exists.

use crate::ebnf::combinator::{GrammarParser, SyntaxNode};
use crate::ebnf::error::{Bound, ConfigurationError, EbnfError};
use crate::ebnf::token::Token;

pub trait Transformer {
    fn alternatives(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn concatenation(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn exception(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn group(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn identifier(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn optional(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn repeated(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn rule(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    fn terminal(&self, _token: &Token, parser: GrammarParser) -> GrammarParser {
        parser
    }

    /// Build the parser for `begin..end` from the decoded bound values
    ///
    /// Unlike the other hooks this one creates the parser itself. The default matches one
    /// character between two single-character bounds.
    fn range(&self, token: &Token, begin: &str, end: &str) -> Result<GrammarParser, EbnfError> {
        let begin = single_char(Bound::Begin, begin)?;
        let end = single_char(Bound::End, end)?;
        Ok(GrammarParser::char_range(begin, end).with_description(token.text()))
    }
}

fn single_char(bound: Bound, value: &str) -> Result<char, EbnfError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConfigurationError::RangeBoundLength {
            bound,
            value: value.to_string(),
        }
        .into()),
    }
}

impl<T: Transformer + ?Sized> Transformer for &T {
    fn alternatives(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).alternatives(token, parser)
    }

    fn concatenation(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).concatenation(token, parser)
    }

    fn exception(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).exception(token, parser)
    }

    fn group(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).group(token, parser)
    }

    fn identifier(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).identifier(token, parser)
    }

    fn optional(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).optional(token, parser)
    }

    fn repeated(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).repeated(token, parser)
    }

    fn rule(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).rule(token, parser)
    }

    fn terminal(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        (**self).terminal(token, parser)
    }

    fn range(&self, token: &Token, begin: &str, end: &str) -> Result<GrammarParser, EbnfError> {
        (**self).range(token, begin, end)
    }
}

/// Leaves every parser as built
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {}

/// Wraps the output of each rule in [`SyntaxNode::Named`] with the rule's name
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleNaming;

impl Transformer for RuleNaming {
    fn rule(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        match token.as_rule() {
            Some(rule) => {
                let name = rule.name().clone();
                parser.map(move |node| SyntaxNode::Named {
                    name: name.clone(),
                    node: Box::new(node),
                })
            }
            None => parser,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebnf::parsing::parse;

    fn range_token(source: &str) -> Token {
        let grammar = parse(source).unwrap();
        let rule = grammar.rules().next().unwrap();
        rule.assignment().clone()
    }

    #[test]
    fn test_default_range() {
        let token = range_token("R = \"a\"..\"z\";");
        let parser = IdentityTransformer.range(&token, "a", "z").unwrap();
        assert_eq!(parser.parse("q").unwrap().text(), "q");
        assert!(parser.parse("Q").is_err());
        assert_eq!(parser.to_string(), "\"a\"..\"z\"");
    }

    #[test]
    fn test_default_range_rejects_long_bounds() {
        let token = range_token("R = \"ab\"..\"z\";");
        let error = IdentityTransformer.range(&token, "ab", "z").unwrap_err();
        assert_eq!(
            error,
            EbnfError::Configuration(ConfigurationError::RangeBoundLength {
                bound: Bound::Begin,
                value: "ab".to_string(),
            })
        );
    }

    #[test]
    fn test_rule_naming_wraps_rule_output() {
        let grammar = parse("WORD = \"hi\";").unwrap();
        let token = grammar.token().children()[0].clone();
        let parser = RuleNaming.rule(&token, GrammarParser::string("hi"));

        match parser.parse("hi").unwrap() {
            SyntaxNode::Named { name, node } => {
                assert_eq!(name.as_str(), "WORD");
                assert_eq!(node.text(), "hi");
            }
            other => panic!("expected a named node, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_forwards_hooks() {
        let transformer: &dyn Transformer = &RuleNaming;
        let grammar = parse("WORD = \"hi\";").unwrap();
        let token = grammar.token().children()[0].clone();
        let parser = (&transformer).rule(&token, GrammarParser::string("hi"));
        assert!(matches!(parser.parse("hi"), Ok(SyntaxNode::Named { .. })));
    }
}
