//! JSON views of grammars and parse results

use serde_json::Value;

use crate::ebnf::combinator::SyntaxNode;
use crate::ebnf::error::EbnfError;
use crate::ebnf::grammar::Grammar;

/// The full token tree of `grammar`, noise included, tagged by token kind
pub fn to_json(grammar: &Grammar) -> Result<Value, EbnfError> {
    serde_json::to_value(grammar.token())
        .map_err(|error| EbnfError::Invariant(format!("grammar serialization failed: {}", error)))
}

pub fn node_to_json(node: &SyntaxNode) -> Result<Value, EbnfError> {
    serde_json::to_value(node)
        .map_err(|error| EbnfError::Invariant(format!("node serialization failed: {}", error)))
}
