//! The root of a parsed grammar and its identifier checks

use std::collections::{BTreeMap, BTreeSet};

use crate::ebnf::error::{DuplicateRuleError, EbnfError, StructureError};
use crate::ebnf::token::{Name, Rule, Token};

/// A parsed grammar: a [`Token::Grammar`] holding one or more rules
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grammar {
    token: Token,
}

impl Grammar {
    pub fn new(token: Token) -> Result<Self, EbnfError> {
        match token {
            Token::Grammar(_) => Ok(Self { token }),
            other => Err(StructureError::NotAGrammar(other.kind()).into()),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn text(&self) -> &str {
        self.token.text()
    }

    /// Rules in source order
    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.token.children().iter().filter_map(Token::as_rule)
    }

    /// The first rule named `name`
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules().find(|rule| rule.name().as_str() == name)
    }

    /// Every identifier referenced from a right-hand side
    pub fn references(&self) -> BTreeSet<Name> {
        self.rules()
            .flat_map(|rule| rule.assignment().walk())
            .filter_map(Token::as_identifier)
            .cloned()
            .collect()
    }

    /// Check that rule names are unique and that every reference resolves
    ///
    /// A reference resolves when it names a rule of this grammar or one of `external`.
    /// Duplicates are reported before dangling references; each error lists the complete
    /// offending set.
    pub fn check_identifiers(&self, external: &BTreeSet<Name>) -> Result<(), EbnfError> {
        let mut by_name: BTreeMap<&Name, Vec<&Rule>> = BTreeMap::new();
        for rule in self.rules() {
            by_name.entry(rule.name()).or_default().push(rule);
        }

        let duplicates: Vec<String> = self
            .rules()
            .filter(|rule| by_name.get(rule.name()).is_some_and(|rules| rules.len() > 1))
            .map(|rule| rule.text().to_string())
            .collect();
        if !duplicates.is_empty() {
            return Err(DuplicateRuleError::Grammar { rules: duplicates }.into());
        }

        let missing: BTreeSet<Name> = self
            .references()
            .into_iter()
            .filter(|name| !by_name.contains_key(name) && !external.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(EbnfError::UnresolvedReference { names: missing });
        }

        Ok(())
    }
}

/// Fails with duplicate or unresolved reference errors, otherwise succeeds silently
pub fn validate(grammar: &Grammar, external: &BTreeSet<Name>) -> Result<(), EbnfError> {
    grammar.check_identifiers(external)
}
