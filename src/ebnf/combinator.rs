//! Runtime parsers produced by the compiler
//!
//! A [`GrammarParser`] is a chumsky parser over `char` that yields a [`SyntaxNode`], plus a
//! description used by its `Display` impl. The compiler only composes these through the
//! small set of combinators below, so callers providing external parsers through `resolve`
//! or rewriting parsers in a [`Transformer`](crate::ebnf::transform::Transformer) work
//! with the same vocabulary.
//!
//! Self and mutually recursive rules are wired through an [`Indirection`]: a parser that is
//! handed out before its target exists and bound exactly once later.
//!
//! chumsky parsers share their internals through `Rc`, so parsers (and the tables holding
//! them) stay on the thread that compiled them. A bound indirection keeps its target alive
//! and the target usually refers back to the indirection; such cycles are never freed.

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use chumsky::prelude::*;
use chumsky::recursive::Recursive;
use chumsky::BoxedParser;
use once_cell::unsync::OnceCell;
use serde::Serialize;

use crate::ebnf::error::EbnfError;
use crate::ebnf::token::Name;

pub type ParseError = Simple<char>;

type Inner = BoxedParser<'static, char, SyntaxNode, ParseError>;

/// What a compiled parser produces for the input it consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum SyntaxNode {
    /// A terminal or a character of a range
    Text(String),
    /// A concatenation, absent optional slots omitted
    Sequence(Vec<SyntaxNode>),
    /// One or more matches of a repetition
    Repetition(Vec<SyntaxNode>),
    Named { name: Name, node: Box<SyntaxNode> },
}

impl SyntaxNode {
    /// The input text this node was parsed from
    pub fn text(&self) -> String {
        let mut text = String::new();
        self.write_text(&mut text);
        text
    }

    fn write_text(&self, out: &mut String) {
        match self {
            SyntaxNode::Text(text) => out.push_str(text),
            SyntaxNode::Sequence(nodes) | SyntaxNode::Repetition(nodes) => {
                nodes.iter().for_each(|node| node.write_text(out))
            }
            SyntaxNode::Named { node, .. } => node.write_text(out),
        }
    }
}

#[derive(Clone)]
enum Description {
    Text(Rc<str>),
    Indirect(Rc<IndirectionState>),
}

struct IndirectionState {
    name: Name,
    target: OnceCell<GrammarParser>,
}

/// A parser compiled from a grammar, or provided to the compiler from outside
#[derive(Clone)]
pub struct GrammarParser {
    inner: Inner,
    description: Description,
}

impl GrammarParser {
    pub fn new<P>(parser: P, description: impl AsRef<str>) -> Self
    where
        P: Parser<char, SyntaxNode, Error = ParseError> + 'static,
    {
        Self {
            inner: parser.boxed(),
            description: Description::Text(Rc::from(description.as_ref())),
        }
    }

    /// Matches `value` exactly
    pub fn string(value: &str) -> Self {
        Self::new(
            just(value.to_string()).map(SyntaxNode::Text),
            format!("{:?}", value),
        )
    }

    /// Matches a single character between `begin` and `end`, inclusive
    pub fn char_range(begin: char, end: char) -> Self {
        Self::new(
            filter(move |c: &char| (begin..=end).contains(c))
                .map(|c: char| SyntaxNode::Text(c.to_string())),
            format!("{:?}..{:?}", begin, end),
        )
    }

    /// First of `self` or `other` to match
    pub fn or(self, other: GrammarParser) -> Self {
        let description = format!("{} | {}", self, other);
        Self::new(self.inner.or(other.inner), description)
    }

    /// `self` followed by `other`
    pub fn and(self, other: GrammarParser) -> Self {
        let description = format!("{}, {}", self, other);
        SequenceBuilder::new()
            .required(self)
            .required(other)
            .build(description)
    }

    /// `self`, provided `other` does not match at the same position
    pub fn and_not(self, other: GrammarParser) -> Self {
        let description = format!("{} - {}", self, other);
        let guard = other.inner.rewind().not().rewind();
        Self::new(guard.ignore_then(self.inner), description)
    }

    /// One or more matches of `self`
    ///
    /// A match that consumes no input ends the repetition without counting, so a parser
    /// that can match empty input (a sequence of optional slots, or an external parser)
    /// repeats until it stops advancing.
    pub fn repeating(self) -> Self {
        let description = format!("{{{}}}", self);
        let advancing = position()
            .then(self.inner)
            .then(position())
            .try_map(|((start, node), end), span| {
                if end > start {
                    Ok(node)
                } else {
                    Err(Simple::custom(span, "repetition matched no input"))
                }
            });
        Self::new(
            advancing.repeated().at_least(1).map(SyntaxNode::Repetition),
            description,
        )
    }

    /// `self` or nothing; an absent match yields an empty sequence
    pub fn optional(self) -> Self {
        let description = format!("[{}]", self);
        Self::new(
            self.inner
                .or_not()
                .map(|node| node.unwrap_or_else(|| SyntaxNode::Sequence(Vec::new()))),
            description,
        )
    }

    /// Rewrite the node produced on success, keeping the description
    pub fn map<F>(self, f: F) -> Self
    where
        F: Fn(SyntaxNode) -> SyntaxNode + 'static,
    {
        Self {
            inner: self.inner.map(f).boxed(),
            description: self.description,
        }
    }

    pub fn with_description(self, description: impl AsRef<str>) -> Self {
        Self {
            inner: self.inner,
            description: Description::Text(Rc::from(description.as_ref())),
        }
    }

    pub fn is_indirection(&self) -> bool {
        matches!(self.description, Description::Indirect(_))
    }

    /// Parse all of `input`
    pub fn parse(&self, input: &str) -> Result<SyntaxNode, Vec<ParseError>> {
        self.inner.clone().then_ignore(end()).parse(input)
    }

    /// Parse the start of `input`, returning the node and the unconsumed rest
    pub fn parse_prefix<'a>(
        &self,
        input: &'a str,
    ) -> Result<(SyntaxNode, &'a str), Vec<ParseError>> {
        let (node, consumed) = self.inner.clone().then(position()).parse(input)?;

        let byte = input
            .char_indices()
            .nth(consumed)
            .map_or(input.len(), |(index, _)| index);
        Ok((node, &input[byte..]))
    }

    /// The underlying chumsky parser, for composing with hand-written combinators
    pub fn boxed(&self) -> BoxedParser<'static, char, SyntaxNode, ParseError> {
        self.inner.clone()
    }
}

/// The char index of the next input character, consuming nothing
fn position() -> BoxedParser<'static, char, usize, ParseError> {
    empty()
        .map_with_span(|(), span: Range<usize>| span.start)
        .boxed()
}

impl fmt::Display for GrammarParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Description::Text(text) => f.write_str(text),
            Description::Indirect(state) => match state.target.get() {
                Some(target) if !target.is_indirection() => fmt::Display::fmt(target, f),
                _ => fmt::Display::fmt(&state.name, f),
            },
        }
    }
}

impl fmt::Debug for GrammarParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GrammarParser")
            .field(&self.to_string())
            .finish()
    }
}

/// Builds a concatenation from required and optional slots, in order
#[derive(Default)]
pub struct SequenceBuilder {
    slots: Vec<(GrammarParser, bool)>,
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, parser: GrammarParser) -> Self {
        self.slots.push((parser, false));
        self
    }

    pub fn optional(mut self, parser: GrammarParser) -> Self {
        self.slots.push((parser, true));
        self
    }

    pub fn build(self, description: impl AsRef<str>) -> GrammarParser {
        let mut sequence: BoxedParser<'static, char, Vec<SyntaxNode>, ParseError> =
            empty().to(Vec::new()).boxed();

        for (parser, optional) in self.slots {
            sequence = if optional {
                sequence
                    .then(parser.inner.or_not())
                    .map(|(mut nodes, node)| {
                        nodes.extend(node);
                        nodes
                    })
                    .boxed()
            } else {
                sequence
                    .then(parser.inner)
                    .map(|(mut nodes, node)| {
                        nodes.push(node);
                        nodes
                    })
                    .boxed()
            };
        }

        GrammarParser::new(sequence.map(SyntaxNode::Sequence), description)
    }
}

/// A parser that can be referenced before the parser it forwards to exists
pub struct Indirection {
    state: Rc<IndirectionState>,
    slot: Recursive<'static, char, SyntaxNode, ParseError>,
}

impl Indirection {
    pub fn new(name: Name) -> Self {
        Self {
            state: Rc::new(IndirectionState {
                name,
                target: OnceCell::new(),
            }),
            slot: Recursive::declare(),
        }
    }

    pub fn name(&self) -> &Name {
        &self.state.name
    }

    /// A parser forwarding to the eventual target. Must not run before [`bind`](Self::bind).
    pub fn parser(&self) -> GrammarParser {
        GrammarParser {
            inner: self.slot.clone().boxed(),
            description: Description::Indirect(Rc::clone(&self.state)),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.state.target.get().is_some()
    }

    /// Set the target. Binding twice is an error.
    pub fn bind(&self, target: GrammarParser) -> Result<(), EbnfError> {
        self.state.target.set(target.clone()).map_err(|_| {
            EbnfError::Invariant(format!("indirection {} bound twice", self.state.name))
        })?;

        let mut slot = self.slot.clone();
        slot.define(target.inner);
        Ok(())
    }
}
