//! Grammar syntax tree
//!
//! A parsed grammar is a tree of immutable [`Token`] values. Every token carries the exact
//! source text it was parsed from, and parents keep their whitespace, comments and symbols
//! as noise children, so concatenating the children's text always reproduces the parent's:
//!
//! ```text
//! TEST1="abc";
//! Grammar
//! └── Rule                 TEST1="abc";
//!     ├── Identifier       TEST1
//!     ├── Symbol           =
//!     ├── Terminal         "abc"   (value: abc)
//!     └── Symbol           ;
//! ```
//!
//! Constructors check the number of significant (non-noise) children each variant needs and
//! fail with a [`StructureError`] instead of panicking.

use std::borrow::Borrow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::ebnf::error::{Arity, StructureError};

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid identifier pattern"));

/// A rule or identifier name, case-sensitive
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn new(value: impl Into<String>) -> Result<Self, StructureError> {
        let value = value.into();
        if NAME_PATTERN.is_match(&value) {
            Ok(Name(value))
        } else {
            Err(StructureError::InvalidName(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Name {
    type Err = StructureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::new(s)
    }
}

/// Variant tag of a [`Token`], used in error messages and assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Grammar,
    Rule,
    Alternative,
    Concatenation,
    Exception,
    Range,
    Group,
    Optional,
    Repeated,
    Identifier,
    Terminal,
    Symbol,
    Comment,
    Whitespace,
}

impl TokenKind {
    fn arity(&self) -> Option<Arity> {
        match self {
            TokenKind::Grammar => Some(Arity::AtLeast(1)),
            TokenKind::Rule => Some(Arity::Exactly(2)),
            TokenKind::Alternative | TokenKind::Concatenation => Some(Arity::AtLeast(2)),
            TokenKind::Exception | TokenKind::Range => Some(Arity::Exactly(2)),
            TokenKind::Group | TokenKind::Optional | TokenKind::Repeated => {
                Some(Arity::Exactly(1))
            }
            _ => None,
        }
    }

    /// True for the variants that may appear on the right-hand side of a rule
    pub fn is_rhs(&self) -> bool {
        !matches!(
            self,
            TokenKind::Grammar
                | TokenKind::Rule
                | TokenKind::Symbol
                | TokenKind::Comment
                | TokenKind::Whitespace
        )
    }

    pub fn is_noise(&self) -> bool {
        matches!(
            self,
            TokenKind::Symbol | TokenKind::Comment | TokenKind::Whitespace
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A node of the grammar syntax tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind")]
pub enum Token {
    Grammar(Parent),
    Rule(Rule),
    Alternative(Parent),
    Concatenation(Parent),
    Exception(Parent),
    Range(Parent),
    Group(Parent),
    Optional(Parent),
    Repeated(Parent),
    Identifier(Identifier),
    Terminal(Terminal),
    Symbol(Leaf),
    Comment(Leaf),
    Whitespace(Leaf),
}

/// Children of a composite token together with the positions of the significant ones
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Parent {
    text: String,
    children: Vec<Token>,
    #[serde(skip)]
    significant: Vec<usize>,
}

impl Parent {
    fn new(kind: TokenKind, children: Vec<Token>) -> Result<Self, StructureError> {
        let significant: Vec<usize> = children
            .iter()
            .enumerate()
            .filter(|(_, child)| !child.is_noise())
            .map(|(index, _)| index)
            .collect();

        if let Some(arity) = kind.arity() {
            if !arity.accepts(significant.len()) {
                return Err(StructureError::Arity {
                    kind,
                    expected: arity,
                    found: significant.len(),
                });
            }
        }

        let text = children.iter().map(Token::text).collect();
        Ok(Self {
            text,
            children,
            significant,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// All children, noise included
    pub fn children(&self) -> &[Token] {
        &self.children
    }

    /// Children that are not whitespace, comments or symbols
    pub fn significant(&self) -> impl Iterator<Item = &Token> + '_ {
        self.significant.iter().map(move |&index| &self.children[index])
    }

    pub fn significant_count(&self) -> usize {
        self.significant.len()
    }

    /// The `index`th significant child. Only call within the arity checked at construction.
    pub(crate) fn operand(&self, index: usize) -> &Token {
        &self.children[self.significant[index]]
    }
}

/// `identifier = rhs ;`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Rule {
    name: Name,
    #[serde(flatten)]
    body: Parent,
}

impl Rule {
    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn text(&self) -> &str {
        self.body.text()
    }

    pub fn children(&self) -> &[Token] {
        self.body.children()
    }

    pub fn identifier(&self) -> &Token {
        self.body.operand(0)
    }

    pub fn assignment(&self) -> &Token {
        self.body.operand(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier {
    name: Name,
}

impl Identifier {
    pub fn name(&self) -> &Name {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Terminal {
    /// Decoded text with quotes stripped and escapes applied
    value: String,
    text: String,
}

impl Terminal {
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Symbol, comment or whitespace text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Leaf {
    text: String,
}

impl Token {
    pub fn grammar(children: Vec<Token>) -> Result<Token, StructureError> {
        let parent = Parent::new(TokenKind::Grammar, children)?;
        expect_children(TokenKind::Grammar, &parent, |_, kind| {
            (kind == TokenKind::Rule).then_some(()).ok_or("a Rule")
        })?;
        Ok(Token::Grammar(parent))
    }

    pub fn rule(children: Vec<Token>) -> Result<Token, StructureError> {
        let body = Parent::new(TokenKind::Rule, children)?;
        expect_children(TokenKind::Rule, &body, |index, kind| match index {
            0 if kind != TokenKind::Identifier => Err("an Identifier"),
            1 if !kind.is_rhs() => Err("a right-hand side"),
            _ => Ok(()),
        })?;
        let name = match body.operand(0) {
            Token::Identifier(identifier) => identifier.name.clone(),
            other => {
                return Err(StructureError::ChildKind {
                    kind: TokenKind::Rule,
                    index: 0,
                    expected: "an Identifier",
                    found: other.kind(),
                })
            }
        };
        Ok(Token::Rule(Rule { name, body }))
    }

    pub fn alternative(children: Vec<Token>) -> Result<Token, StructureError> {
        Self::rhs_parent(TokenKind::Alternative, children).map(Token::Alternative)
    }

    pub fn concatenation(children: Vec<Token>) -> Result<Token, StructureError> {
        Self::rhs_parent(TokenKind::Concatenation, children).map(Token::Concatenation)
    }

    pub fn exception(children: Vec<Token>) -> Result<Token, StructureError> {
        Self::rhs_parent(TokenKind::Exception, children).map(Token::Exception)
    }

    pub fn range(children: Vec<Token>) -> Result<Token, StructureError> {
        Self::rhs_parent(TokenKind::Range, children).map(Token::Range)
    }

    pub fn group(children: Vec<Token>) -> Result<Token, StructureError> {
        Self::rhs_parent(TokenKind::Group, children).map(Token::Group)
    }

    pub fn optional(children: Vec<Token>) -> Result<Token, StructureError> {
        Self::rhs_parent(TokenKind::Optional, children).map(Token::Optional)
    }

    pub fn repeated(children: Vec<Token>) -> Result<Token, StructureError> {
        Self::rhs_parent(TokenKind::Repeated, children).map(Token::Repeated)
    }

    pub fn identifier(name: &str) -> Result<Token, StructureError> {
        Ok(Token::Identifier(Identifier {
            name: Name::new(name)?,
        }))
    }

    /// `text` is the quoted source form, `value` the decoded content
    pub fn terminal(value: impl Into<String>, text: impl Into<String>) -> Token {
        Token::Terminal(Terminal {
            value: value.into(),
            text: text.into(),
        })
    }

    pub fn symbol(text: impl Into<String>) -> Token {
        Token::Symbol(Leaf { text: text.into() })
    }

    pub fn comment(text: impl Into<String>) -> Token {
        Token::Comment(Leaf { text: text.into() })
    }

    pub fn whitespace(text: impl Into<String>) -> Token {
        Token::Whitespace(Leaf { text: text.into() })
    }

    fn rhs_parent(kind: TokenKind, children: Vec<Token>) -> Result<Parent, StructureError> {
        let parent = Parent::new(kind, children)?;
        expect_children(kind, &parent, |_, child| {
            child.is_rhs().then_some(()).ok_or("a right-hand side")
        })?;
        Ok(parent)
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Grammar(_) => TokenKind::Grammar,
            Token::Rule(_) => TokenKind::Rule,
            Token::Alternative(_) => TokenKind::Alternative,
            Token::Concatenation(_) => TokenKind::Concatenation,
            Token::Exception(_) => TokenKind::Exception,
            Token::Range(_) => TokenKind::Range,
            Token::Group(_) => TokenKind::Group,
            Token::Optional(_) => TokenKind::Optional,
            Token::Repeated(_) => TokenKind::Repeated,
            Token::Identifier(_) => TokenKind::Identifier,
            Token::Terminal(_) => TokenKind::Terminal,
            Token::Symbol(_) => TokenKind::Symbol,
            Token::Comment(_) => TokenKind::Comment,
            Token::Whitespace(_) => TokenKind::Whitespace,
        }
    }

    /// The exact source text this token covers
    pub fn text(&self) -> &str {
        match self {
            Token::Rule(rule) => rule.text(),
            Token::Identifier(identifier) => identifier.name.as_str(),
            Token::Terminal(terminal) => &terminal.text,
            Token::Symbol(leaf) | Token::Comment(leaf) | Token::Whitespace(leaf) => &leaf.text,
            Token::Grammar(parent)
            | Token::Alternative(parent)
            | Token::Concatenation(parent)
            | Token::Exception(parent)
            | Token::Range(parent)
            | Token::Group(parent)
            | Token::Optional(parent)
            | Token::Repeated(parent) => parent.text(),
        }
    }

    pub fn is_noise(&self) -> bool {
        self.kind().is_noise()
    }

    pub fn children(&self) -> &[Token] {
        match self {
            Token::Rule(rule) => rule.children(),
            Token::Grammar(parent)
            | Token::Alternative(parent)
            | Token::Concatenation(parent)
            | Token::Exception(parent)
            | Token::Range(parent)
            | Token::Group(parent)
            | Token::Optional(parent)
            | Token::Repeated(parent) => parent.children(),
            _ => &[],
        }
    }

    pub fn significant(&self) -> impl Iterator<Item = &Token> + '_ {
        self.children().iter().filter(|child| !child.is_noise())
    }

    pub fn as_parent(&self) -> Option<&Parent> {
        match self {
            Token::Grammar(parent)
            | Token::Alternative(parent)
            | Token::Concatenation(parent)
            | Token::Exception(parent)
            | Token::Range(parent)
            | Token::Group(parent)
            | Token::Optional(parent)
            | Token::Repeated(parent) => Some(parent),
            Token::Rule(rule) => Some(&rule.body),
            _ => None,
        }
    }

    pub fn as_rule(&self) -> Option<&Rule> {
        match self {
            Token::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&Name> {
        match self {
            Token::Identifier(identifier) => Some(&identifier.name),
            _ => None,
        }
    }

    pub fn as_terminal(&self) -> Option<&Terminal> {
        match self {
            Token::Terminal(terminal) => Some(terminal),
            _ => None,
        }
    }

    /// Comment text without the `(*` and `*)` delimiters
    pub fn comment_value(&self) -> Option<&str> {
        match self {
            Token::Comment(leaf) => leaf
                .text
                .strip_prefix("(*")
                .and_then(|inner| inner.strip_suffix("*)")),
            _ => None,
        }
    }

    /// Depth-first, pre-order walk over this token and all of its descendants
    pub fn walk(&self) -> impl Iterator<Item = &Token> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let token = stack.pop()?;
            stack.extend(token.children().iter().rev());
            Some(token)
        })
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

fn expect_children(
    kind: TokenKind,
    parent: &Parent,
    check: impl Fn(usize, TokenKind) -> Result<(), &'static str>,
) -> Result<(), StructureError> {
    for (index, child) in parent.significant().enumerate() {
        check(index, child.kind()).map_err(|expected| StructureError::ChildKind {
            kind,
            index,
            expected,
            found: child.kind(),
        })?;
    }
    Ok(())
}
