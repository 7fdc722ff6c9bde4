//! Fluent assertions over parsed grammars
//!
//! ```ignore
//! assert_grammar(&grammar)
//!     .rule_count(1)
//!     .rule(0, |rule| {
//!         rule.name("TEST").assignment(|rhs| {
//!             rhs.kind(TokenKind::Concatenation).significant(0, |t| t.terminal("abc"));
//!         });
//!     });
//! ```

use crate::ebnf::grammar::Grammar;
use crate::ebnf::token::{Rule, Token, TokenKind};

// ============================================================================
// Entry Point
// ============================================================================

/// Create an assertion builder for a grammar
pub fn assert_grammar(grammar: &Grammar) -> GrammarAssertion<'_> {
    GrammarAssertion { grammar }
}

pub struct GrammarAssertion<'a> {
    grammar: &'a Grammar,
}

impl<'a> GrammarAssertion<'a> {
    pub fn rule_count(self, expected: usize) -> Self {
        let actual = self.grammar.rules().count();
        assert_eq!(
            actual, expected,
            "Grammar: Expected {} rules, found {}",
            expected, actual
        );
        self
    }

    /// Run assertions against the `index`th rule, in source order
    pub fn rule<F>(self, index: usize, assertion: F) -> Self
    where
        F: FnOnce(RuleAssertion<'a>),
    {
        let rule = self.grammar.rules().nth(index).unwrap_or_else(|| {
            panic!(
                "Grammar: Rule index {} out of bounds ({} rules)",
                index,
                self.grammar.rules().count()
            )
        });
        assertion(RuleAssertion {
            rule,
            context: format!("Grammar:rule[{}]", index),
        });
        self
    }

    /// The grammar text is reproduced exactly by its tokens
    pub fn round_trips(self, source: &str) -> Self {
        assert_eq!(
            self.grammar.text(),
            source,
            "Grammar: text does not reproduce the source"
        );
        self
    }
}

// ============================================================================
// Rule Assertions
// ============================================================================

pub struct RuleAssertion<'a> {
    rule: &'a Rule,
    context: String,
}

impl<'a> RuleAssertion<'a> {
    pub fn name(self, expected: &str) -> Self {
        assert_eq!(
            self.rule.name().as_str(),
            expected,
            "{}: Expected rule name '{}', found '{}'",
            self.context,
            expected,
            self.rule.name()
        );
        self
    }

    pub fn text(self, expected: &str) -> Self {
        assert_eq!(
            self.rule.text(),
            expected,
            "{}: Expected rule text {:?}, found {:?}",
            self.context,
            expected,
            self.rule.text()
        );
        self
    }

    /// Run assertions against the right-hand side of the rule
    pub fn assignment<F>(self, assertion: F) -> Self
    where
        F: FnOnce(TokenAssertion<'a>),
    {
        assertion(TokenAssertion {
            token: self.rule.assignment(),
            context: format!("{}:assignment", self.context),
        });
        self
    }
}

// ============================================================================
// Token Assertions
// ============================================================================

pub struct TokenAssertion<'a> {
    token: &'a Token,
    context: String,
}

impl<'a> TokenAssertion<'a> {
    pub fn new(token: &'a Token, context: impl Into<String>) -> Self {
        Self {
            token,
            context: context.into(),
        }
    }

    pub fn kind(self, expected: TokenKind) -> Self {
        assert_eq!(
            self.token.kind(),
            expected,
            "{}: Expected {}, found {} {:?}",
            self.context,
            expected,
            self.token.kind(),
            self.token.text()
        );
        self
    }

    pub fn text(self, expected: &str) -> Self {
        assert_eq!(
            self.token.text(),
            expected,
            "{}: Expected text {:?}, found {:?}",
            self.context,
            expected,
            self.token.text()
        );
        self
    }

    /// Assert a terminal with the given decoded value
    pub fn terminal(self, expected: &str) -> Self {
        match self.token.as_terminal() {
            Some(terminal) => assert_eq!(
                terminal.value(),
                expected,
                "{}: Expected terminal value {:?}, found {:?}",
                self.context,
                expected,
                terminal.value()
            ),
            None => panic!(
                "{}: Expected Terminal, found {} {:?}",
                self.context,
                self.token.kind(),
                self.token.text()
            ),
        }
        self
    }

    pub fn identifier(self, expected: &str) -> Self {
        match self.token.as_identifier() {
            Some(name) => assert_eq!(
                name.as_str(),
                expected,
                "{}: Expected identifier '{}', found '{}'",
                self.context,
                expected,
                name
            ),
            None => panic!(
                "{}: Expected Identifier, found {} {:?}",
                self.context,
                self.token.kind(),
                self.token.text()
            ),
        }
        self
    }

    /// Number of children, whitespace and comments included
    pub fn child_count(self, expected: usize) -> Self {
        let actual = self.token.children().len();
        assert_eq!(
            actual, expected,
            "{}: Expected {} children, found {}",
            self.context, expected, actual
        );
        self
    }

    pub fn significant_count(self, expected: usize) -> Self {
        let actual = self.token.significant().count();
        assert_eq!(
            actual, expected,
            "{}: Expected {} significant children, found {}",
            self.context, expected, actual
        );
        self
    }

    /// Run assertions against the `index`th significant child
    pub fn significant<F>(self, index: usize, assertion: F) -> Self
    where
        F: FnOnce(TokenAssertion<'a>),
    {
        let child = self.token.significant().nth(index).unwrap_or_else(|| {
            panic!(
                "{}: Significant child index {} out of bounds ({} children)",
                self.context,
                index,
                self.token.significant().count()
            )
        });
        assertion(TokenAssertion {
            token: child,
            context: format!("{}:significant[{}]", self.context, index),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebnf::parsing::parse;

    #[test]
    fn test_assertions_pass() {
        let grammar = parse("TEST = \"abc\", [ REF ];").unwrap();
        assert_grammar(&grammar)
            .rule_count(1)
            .round_trips("TEST = \"abc\", [ REF ];")
            .rule(0, |rule| {
                rule.name("TEST").assignment(|rhs| {
                    rhs.kind(TokenKind::Concatenation)
                        .significant_count(2)
                        .significant(0, |t| {
                            t.terminal("abc");
                        })
                        .significant(1, |t| {
                            t.kind(TokenKind::Optional)
                                .text("[ REF ]")
                                .child_count(5)
                                .significant(0, |r| {
                                    r.identifier("REF");
                                });
                        });
                });
            });
    }

    #[test]
    #[should_panic(expected = "Grammar:rule[0]:assignment: Expected Alternative")]
    fn test_kind_mismatch_reports_context() {
        let grammar = parse("TEST = \"a\", \"b\";").unwrap();
        assert_grammar(&grammar).rule(0, |rule| {
            rule.assignment(|rhs| {
                rhs.kind(TokenKind::Alternative);
            });
        });
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_rule_index_out_of_bounds() {
        let grammar = parse("TEST = \"a\";").unwrap();
        assert_grammar(&grammar).rule(3, |_| {});
    }
}
