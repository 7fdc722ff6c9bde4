//! # ebnf-combinator
//!
//! Turns EBNF grammar text into a table of runtime parsers, one per rule.
//!
//! The crate has two halves:
//!
//! - the grammar parser (`ebnf::lexing` + `ebnf::parsing`) turns EBNF source text into a
//!   lossless syntax tree of [`ebnf::token::Token`] values, whitespace and comments included;
//! - the combinator compiler (`ebnf::compiler`) walks that tree, resolves forward references,
//!   self references and mutual recursion, and hands back an [`ebnf::compiler::ParserTable`].
//!
//! ```text
//! text -> lex -> parse -> Grammar -> (validate) -> compile(resolve, transformer) -> ParserTable
//! ```
//!
//! The parsers in the table are chumsky parsers over `char` wrapped in
//! [`ebnf::combinator::GrammarParser`].
//!
//! For assertion helpers used across the tests, see the [testing module](ebnf::testing).

pub mod ebnf;

pub use ebnf::combinator::{GrammarParser, SyntaxNode};
pub use ebnf::compiler::{compile, compile_or_fail, ParserTable};
pub use ebnf::error::{EbnfError, Result};
pub use ebnf::grammar::Grammar;
pub use ebnf::parsing::{parse, parse_file};
pub use ebnf::transform::{IdentityTransformer, Transformer};
