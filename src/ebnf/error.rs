//! Error types for grammar parsing, validation and compilation
//!
//! Every failure aborts the whole call: no partial grammar and no partial parser table is
//! ever returned. [`EbnfError`] groups the failures by category so callers can match on
//! what went wrong, while the payload types carry the details.

use std::collections::BTreeSet;
use std::fmt;

use crate::ebnf::position::Position;
use crate::ebnf::token::{Name, TokenKind};

pub type Result<T> = std::result::Result<T, EbnfError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EbnfError {
    /// Grammar text violates a production
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// Invalid escape sequence inside a terminal literal
    #[error(transparent)]
    TerminalDecode(#[from] TerminalDecodeError),

    /// A token was assembled with the wrong children
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    DuplicateRule(#[from] DuplicateRuleError),

    /// Identifiers referenced but neither defined nor provided externally
    #[error("{} invalid (unknown) references={}", .names.len(), join(.names))]
    UnresolvedReference { names: BTreeSet<Name> },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The compiler broke one of its own invariants
    #[error("Internal compiler error: {0}")]
    Invariant(String),

    #[error("Unable to parse grammar in file {label:?}: {source}")]
    InFile {
        label: String,
        #[source]
        source: Box<EbnfError>,
    },
}

impl EbnfError {
    pub fn unresolved(names: impl IntoIterator<Item = Name>) -> Self {
        EbnfError::UnresolvedReference {
            names: names.into_iter().collect(),
        }
    }

    /// Attach the label of the file or resource the grammar was read from
    pub fn in_file(self, label: impl Into<String>) -> Self {
        EbnfError::InFile {
            label: label.into(),
            source: Box::new(self),
        }
    }

    /// Unwrap any file labels and return the underlying error
    pub fn root(&self) -> &EbnfError {
        match self {
            EbnfError::InFile { source, .. } => source.root(),
            other => other,
        }
    }
}

/// A character the grammar parser could not accept
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} at {position} expected {expected}{}", found_label(.found), context_suffix(.context))]
pub struct SyntaxError {
    /// `None` when the input ended early
    pub found: Option<char>,
    pub position: Position,
    /// Label of the production that was expected
    pub expected: String,
    /// Numbered excerpt of the surrounding source
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid escape sequence {escape:?} at {position} in terminal {terminal}{}", context_suffix(.context))]
pub struct TerminalDecodeError {
    pub escape: String,
    pub position: Position,
    /// Raw terminal text, quotes included
    pub terminal: String,
    pub context: Option<String>,
}

/// How many significant children a token variant accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    #[error("{kind} expects {expected} significant children, got {found}")]
    Arity {
        kind: TokenKind,
        expected: Arity,
        found: usize,
    },

    #[error("{kind} child {index} must be {expected}, got {found}")]
    ChildKind {
        kind: TokenKind,
        index: usize,
        expected: &'static str,
        found: TokenKind,
    },

    #[error("Invalid identifier {0:?}, expected a letter followed by letters, digits or '_'")]
    InvalidName(String),

    #[error("Expected a Grammar token, got {0}")]
    NotAGrammar(TokenKind),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DuplicateRuleError {
    /// Found by validation: every rule sharing an identifier with another rule
    #[error("{} rules with the same identifier={}", .rules.len(), .rules.join(", "))]
    Grammar { rules: Vec<String> },

    #[error("Rule \"{0}\" duplicated in grammar")]
    Redefined(Name),

    #[error("Rule \"{0}\" duplicated in provided parsers")]
    Provided(Name),
}

/// Which bound of a range failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    Begin,
    End,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Begin => f.write_str("begin"),
            Bound::End => f.write_str("end"),
        }
    }
}

/// Which operand of an exception was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// The grammar is well formed but cannot be turned into parsers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Alternatives given {count} optional(s) expected 0 got {text}")]
    OptionalAlternative { count: usize, text: String },

    #[error("Exception {side} must not be optional got {text}")]
    OptionalException { side: Side, text: String },

    #[error("Invalid range {bound}, expected identifier or terminal but got {found}={text}")]
    InvalidRangeBound {
        bound: Bound,
        found: TokenKind,
        text: String,
    },

    #[error("Invalid range {bound}, identifier {name} is not defined by a rule")]
    UndefinedRangeBound { bound: Bound, name: Name },

    #[error("Invalid range {bound}, identifier {name} refers back to itself")]
    CyclicRangeBound { bound: Bound, name: Name },

    #[error("Invalid range {bound} {value:?}, expected a single character")]
    RangeBoundLength { bound: Bound, value: String },

    #[error("Missing parser \"{name}\" in \"{label}\"")]
    MissingParser { name: String, label: String },
}

fn found_label(found: &Option<char>) -> String {
    match found {
        Some(c) => format!("Invalid character {:?}", c),
        None => "End of text".to_string(),
    }
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(context) => format!("\n\n{}", context.trim_end()),
        None => String::new(),
    }
}

fn join(names: &BTreeSet<Name>) -> String {
    names
        .iter()
        .map(Name::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
