//! Compiles a grammar into a table of parsers, one per rule
//!
//! Compilation runs in stages over a flat arena of proxies, one proxy per structurally
//! distinct token:
//!
//! 1. Register: walk every rule, creating proxies. Terminals get their parser immediately;
//!    identifiers naming a provided parser get that parser.
//! 2. Resolve without cycles: repeatedly try to build each proxy from its children until a
//!    sweep makes no progress. Each sweep tracks the proxies on the current path; meeting
//!    one again defers the proxy instead of recursing forever.
//! 3. Every identifier still unresolved now sits on a cycle. It gets an [`Indirection`].
//! 4. Resolve the rest; every cycle now passes through an indirection.
//! 5. Bind each indirection to the parser of the rule it names.
//!
//! Optional tokens (`[ ... ]`) do not wrap their parser. Their proxy records an optional
//! flag instead, which the parent consumes: a concatenation turns the child into an
//! optional slot, while alternatives and exceptions reject it. The table hands out the
//! parsers without the flag, so a rule written as `[ ... ]` still requires its contents
//! when used directly. A concatenation of optional slots matches empty input as it is.
//!
//! An identifier that reaches its rule through an indirection is always required, even
//! when the rule's body is optional.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use once_cell::unsync::OnceCell;

use crate::ebnf::combinator::{GrammarParser, Indirection, SequenceBuilder};
use crate::ebnf::config::EbnfConfig;
use crate::ebnf::error::{
    Bound, ConfigurationError, DuplicateRuleError, EbnfError, Result, Side,
};
use crate::ebnf::grammar::Grammar;
use crate::ebnf::token::{Name, Parent, Rule, Token};
use crate::ebnf::transform::Transformer;

type ProxyId = usize;

/// A built parser plus whether the token it came from is optional
#[derive(Clone)]
struct Composed {
    parser: GrammarParser,
    optional: bool,
}

impl Composed {
    fn required(parser: GrammarParser) -> Self {
        Self {
            parser,
            optional: false,
        }
    }
}

struct Proxy<'g> {
    token: &'g Token,
    children: Vec<ProxyId>,
    cell: OnceCell<Composed>,
}

struct Compiler<'g, R: ?Sized, T: ?Sized> {
    resolve: &'g R,
    transformer: &'g T,
    proxies: Vec<Proxy<'g>>,
    by_token: HashMap<&'g Token, ProxyId>,
    rules: BTreeMap<&'g Name, ProxyId>,
    identifiers: BTreeMap<&'g Name, ProxyId>,
    awaiting: BTreeSet<&'g Name>,
    indirections: Vec<(ProxyId, Indirection)>,
}

impl<'g, R, T> Compiler<'g, R, T>
where
    R: Fn(&Name) -> Option<GrammarParser> + ?Sized,
    T: Transformer + ?Sized,
{
    fn new(resolve: &'g R, transformer: &'g T) -> Self {
        Self {
            resolve,
            transformer,
            proxies: Vec::new(),
            by_token: HashMap::new(),
            rules: BTreeMap::new(),
            identifiers: BTreeMap::new(),
            awaiting: BTreeSet::new(),
            indirections: Vec::new(),
        }
    }

    fn run(mut self, grammar: &'g Grammar) -> Result<BTreeMap<Name, GrammarParser>> {
        for token in grammar.token().children() {
            if let Token::Rule(rule) = token {
                self.add_rule(token, rule)?;
            }
        }

        let unresolved: BTreeSet<Name> = self
            .awaiting
            .iter()
            .filter(|name| !self.rules.contains_key(*name))
            .map(|name| (*name).clone())
            .collect();
        if !unresolved.is_empty() {
            return Err(EbnfError::unresolved(unresolved));
        }

        self.sweep(true)?;
        self.insert_indirections()?;
        self.sweep(false)?;
        self.fix_identifiers()?;
        self.fix_indirections()?;

        if let Some(proxy) = self.proxies.iter().find(|proxy| proxy.cell.get().is_none()) {
            return Err(EbnfError::Invariant(format!(
                "{} {:?} has no parser after compilation",
                proxy.token.kind(),
                proxy.token.text()
            )));
        }

        self.table()
    }

    /// The proxy for `token`, and whether it was just created
    fn proxy(&mut self, token: &'g Token) -> (ProxyId, bool) {
        if let Some(&id) = self.by_token.get(token) {
            return (id, false);
        }

        let id = self.proxies.len();
        self.proxies.push(Proxy {
            token,
            children: Vec::new(),
            cell: OnceCell::new(),
        });
        self.by_token.insert(token, id);
        (id, true)
    }

    fn add_rule(&mut self, token: &'g Token, rule: &'g Rule) -> Result<()> {
        let name = rule.name();
        if (self.resolve)(name).is_some() {
            return Err(DuplicateRuleError::Provided(name.clone()).into());
        }
        if self.rules.contains_key(name) {
            return Err(DuplicateRuleError::Redefined(name.clone()).into());
        }

        let (id, created) = self.proxy(token);
        self.rules.insert(name, id);
        if created {
            self.add(rule.assignment(), id)?;
        }
        Ok(())
    }

    fn add(&mut self, token: &'g Token, parent: ProxyId) -> Result<()> {
        let (id, created) = self.proxy(token);
        self.proxies[parent].children.push(id);
        if !created {
            return Ok(());
        }

        match token {
            Token::Identifier(identifier) => {
                let name = identifier.name();
                self.identifiers.insert(name, id);
                match (self.resolve)(name) {
                    Some(parser) => self.fill(id, Composed::required(parser))?,
                    None => {
                        self.awaiting.insert(name);
                    }
                }
            }
            Token::Terminal(terminal) => {
                let parser = GrammarParser::string(terminal.value()).with_description(token.text());
                let parser = self.transformer.terminal(token, parser);
                self.fill(id, Composed::required(parser))?;
            }
            _ => {
                for child in token.significant() {
                    self.add(child, id)?;
                }
            }
        }
        Ok(())
    }

    fn fill(&self, id: ProxyId, composed: Composed) -> Result<()> {
        let proxy = &self.proxies[id];
        proxy.cell.set(composed).map_err(|_| {
            EbnfError::Invariant(format!(
                "{} {:?} resolved twice",
                proxy.token.kind(),
                proxy.token.text()
            ))
        })
    }

    fn resolved_count(&self) -> usize {
        self.proxies
            .iter()
            .filter(|proxy| proxy.cell.get().is_some())
            .count()
    }

    fn sweep(&self, detect_cycles: bool) -> Result<()> {
        loop {
            let before = self.resolved_count();
            for id in 0..self.proxies.len() {
                if self.proxies[id].cell.get().is_some() {
                    continue;
                }
                let mut seen = HashSet::new();
                self.resolve(id, detect_cycles.then_some(&mut seen))?;
            }

            let after = self.resolved_count();
            if after == before || after == self.proxies.len() {
                return Ok(());
            }
        }
    }

    /// The parser of proxy `id`, building it if every child is available
    ///
    /// `seen` holds the proxies on the current path. Without it, the caller guarantees
    /// that every cycle already passes through a resolved proxy.
    fn resolve(
        &self,
        id: ProxyId,
        mut seen: Option<&mut HashSet<ProxyId>>,
    ) -> Result<Option<Composed>> {
        if let Some(done) = self.proxies[id].cell.get() {
            return Ok(Some(done.clone()));
        }
        if let Some(seen) = seen.as_deref_mut() {
            if !seen.insert(id) {
                return Ok(None);
            }
        }

        let built = self.compose(id, seen)?;
        if let Some(composed) = &built {
            self.fill(id, composed.clone())?;
        }
        Ok(built)
    }

    fn resolve_children(
        &self,
        id: ProxyId,
        mut seen: Option<&mut HashSet<ProxyId>>,
    ) -> Result<Option<Vec<Composed>>> {
        let mut children = Vec::with_capacity(self.proxies[id].children.len());
        for &child in &self.proxies[id].children {
            match self.resolve(child, seen.as_deref_mut())? {
                Some(composed) => children.push(composed),
                None => return Ok(None),
            }
        }
        Ok(Some(children))
    }

    fn compose(&self, id: ProxyId, seen: Option<&mut HashSet<ProxyId>>) -> Result<Option<Composed>> {
        let token = self.proxies[id].token;
        let hooks = self.transformer;

        if let Token::Range(range) = token {
            let begin = self.range_bound(range, Bound::Begin)?;
            let end = self.range_bound(range, Bound::End)?;
            return hooks
                .range(token, &begin, &end)
                .map(|parser| Some(Composed::required(parser)));
        }

        if let Token::Identifier(identifier) = token {
            let Some(&rule) = self.rules.get(identifier.name()) else {
                return Ok(None);
            };
            return Ok(self.resolve(rule, seen)?.map(|target| Composed {
                parser: hooks.identifier(token, target.parser),
                optional: target.optional,
            }));
        }

        let Some(children) = self.resolve_children(id, seen)? else {
            return Ok(None);
        };

        let composed = match token {
            Token::Rule(_) => {
                let child = self.only_child(id, children)?;
                Composed {
                    parser: hooks.rule(token, child.parser),
                    optional: child.optional,
                }
            }
            Token::Group(_) => {
                let child = self.only_child(id, children)?;
                Composed {
                    parser: hooks.group(token, child.parser),
                    optional: child.optional,
                }
            }
            Token::Optional(_) => {
                let child = self.only_child(id, children)?;
                Composed {
                    parser: hooks.optional(token, child.parser),
                    optional: true,
                }
            }
            Token::Repeated(_) => {
                let child = self.only_child(id, children)?;
                let parser = child.parser.repeating().with_description(token.text());
                Composed::required(hooks.repeated(token, parser))
            }
            Token::Alternative(_) => {
                let optional: Vec<&str> = self.proxies[id]
                    .children
                    .iter()
                    .zip(&children)
                    .filter(|(_, child)| child.optional)
                    .map(|(&child, _)| self.proxies[child].token.text())
                    .collect();
                if !optional.is_empty() {
                    return Err(ConfigurationError::OptionalAlternative {
                        count: optional.len(),
                        text: optional.join(", "),
                    }
                    .into());
                }

                let parser = children
                    .into_iter()
                    .map(|child| child.parser)
                    .reduce(GrammarParser::or)
                    .ok_or_else(|| self.childless(id))?
                    .with_description(token.text());
                Composed::required(hooks.alternatives(token, parser))
            }
            Token::Concatenation(_) => {
                let optional = children.iter().all(|child| child.optional);
                let parser = children
                    .into_iter()
                    .fold(SequenceBuilder::new(), |sequence, child| {
                        if child.optional {
                            sequence.optional(child.parser)
                        } else {
                            sequence.required(child.parser)
                        }
                    })
                    .build(token.text());
                Composed {
                    parser: hooks.concatenation(token, parser),
                    optional,
                }
            }
            Token::Exception(_) => {
                let mut operands = children.into_iter();
                let (Some(left), Some(right)) = (operands.next(), operands.next()) else {
                    return Err(self.childless(id));
                };
                for (side, operand) in [(Side::Left, &left), (Side::Right, &right)] {
                    if operand.optional {
                        return Err(ConfigurationError::OptionalException {
                            side,
                            text: token.text().to_string(),
                        }
                        .into());
                    }
                }

                let parser = left
                    .parser
                    .and_not(right.parser)
                    .with_description(token.text());
                Composed::required(hooks.exception(token, parser))
            }
            other => {
                return Err(EbnfError::Invariant(format!(
                    "{} {:?} cannot be compiled",
                    other.kind(),
                    other.text()
                )))
            }
        };

        Ok(Some(composed))
    }

    fn only_child(&self, id: ProxyId, children: Vec<Composed>) -> Result<Composed> {
        children
            .into_iter()
            .next()
            .ok_or_else(|| self.childless(id))
    }

    fn childless(&self, id: ProxyId) -> EbnfError {
        let token = self.proxies[id].token;
        EbnfError::Invariant(format!(
            "{} {:?} is missing operands",
            token.kind(),
            token.text()
        ))
    }

    /// The decoded value a range bound stands for, following identifiers to their rules
    fn range_bound(&self, range: &'g Parent, bound: Bound) -> Result<String> {
        let written = match bound {
            Bound::Begin => range.operand(0),
            Bound::End => range.operand(1),
        };

        let mut token = written;
        let mut followed = BTreeSet::new();
        loop {
            match token {
                Token::Terminal(terminal) => return Ok(terminal.value().to_string()),
                Token::Identifier(identifier) => {
                    let name = identifier.name();
                    if !followed.insert(name) {
                        return Err(ConfigurationError::CyclicRangeBound {
                            bound,
                            name: name.clone(),
                        }
                        .into());
                    }
                    let rule = self
                        .rules
                        .get(name)
                        .and_then(|&id| self.proxies[id].token.as_rule())
                        .ok_or_else(|| ConfigurationError::UndefinedRangeBound {
                            bound,
                            name: name.clone(),
                        })?;
                    token = rule.assignment();
                }
                other => {
                    return Err(ConfigurationError::InvalidRangeBound {
                        bound,
                        found: other.kind(),
                        text: other.text().to_string(),
                    }
                    .into())
                }
            }
        }
    }

    fn insert_indirections(&mut self) -> Result<()> {
        for id in 0..self.proxies.len() {
            let token = self.proxies[id].token;
            if self.proxies[id].cell.get().is_some() {
                continue;
            }
            if let Some(name) = token.as_identifier() {
                let indirection = Indirection::new(name.clone());
                self.fill(id, Composed::required(indirection.parser()))?;
                self.indirections.push((id, indirection));
            }
        }
        Ok(())
    }

    /// The finished parser of rule `name`, optional flag dropped
    fn rule_parser(&self, name: &Name) -> Result<GrammarParser> {
        let id = self
            .rules
            .get(name)
            .copied()
            .ok_or_else(|| EbnfError::unresolved([name.clone()]))?;
        self.proxies[id]
            .cell
            .get()
            .map(|composed| composed.parser.clone())
            .ok_or_else(|| EbnfError::Invariant(format!("rule {} has no parser", name)))
    }

    /// Identifiers that never received a parser share their rule's
    fn fix_identifiers(&self) -> Result<()> {
        for (name, &id) in &self.identifiers {
            if self.proxies[id].cell.get().is_none() {
                self.fill(id, Composed::required(self.rule_parser(name)?))?;
            }
        }
        Ok(())
    }

    fn fix_indirections(&self) -> Result<()> {
        for (id, indirection) in &self.indirections {
            let token = self.proxies[*id].token;
            let target = self.rule_parser(indirection.name())?;
            indirection.bind(self.transformer.identifier(token, target))?;
        }
        Ok(())
    }

    fn table(&self) -> Result<BTreeMap<Name, GrammarParser>> {
        let mut parsers = BTreeMap::new();
        for (name, &id) in self.identifiers.iter().chain(&self.rules) {
            let composed = self.proxies[id]
                .cell
                .get()
                .ok_or_else(|| EbnfError::Invariant(format!("{} has no parser", name)))?;
            parsers.insert((*name).clone(), composed.parser.clone());
        }
        Ok(parsers)
    }
}

/// Parsers compiled from a grammar, keyed by rule name
///
/// Lookups consult `resolve` before the compiled parsers, so externally provided parsers
/// are visible under their own names.
///
/// The table is immutable once built and any number of lookups and parses may run against
/// it, but only on the compiling thread: chumsky parsers are `Rc`-based, so the table is
/// neither `Send` nor `Sync`.
pub struct ParserTable<R> {
    resolve: R,
    parsers: BTreeMap<Name, GrammarParser>,
}

impl<R> ParserTable<R>
where
    R: Fn(&Name) -> Option<GrammarParser>,
{
    pub fn get(&self, name: &str) -> Option<GrammarParser> {
        let name = Name::new(name).ok()?;
        (self.resolve)(&name).or_else(|| self.parsers.get(&name).cloned())
    }

    /// Names of the rules and references compiled from the grammar
    pub fn names(&self) -> impl Iterator<Item = &Name> + '_ {
        self.parsers.keys()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// A table whose lookups fail with an error naming `label`
    pub fn with_label(self, label: impl Into<String>) -> FileParserTable<R> {
        FileParserTable {
            table: self,
            label: label.into(),
        }
    }
}

/// A [`ParserTable`] for a grammar read from a named file or resource
pub struct FileParserTable<R> {
    table: ParserTable<R>,
    label: String,
}

impl<R> FileParserTable<R>
where
    R: Fn(&Name) -> Option<GrammarParser>,
{
    pub fn get(&self, name: &str) -> Result<GrammarParser> {
        self.table.get(name).ok_or_else(|| {
            ConfigurationError::MissingParser {
                name: name.to_string(),
                label: self.label.clone(),
            }
            .into()
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn table(&self) -> &ParserTable<R> {
        &self.table
    }
}

/// A `resolve` function providing no external parsers
pub fn no_external(_: &Name) -> Option<GrammarParser> {
    None
}

/// Compile `grammar` with the default configuration
pub fn compile<R, T>(grammar: &Grammar, resolve: R, transformer: &T) -> Result<ParserTable<R>>
where
    R: Fn(&Name) -> Option<GrammarParser>,
    T: Transformer + ?Sized,
{
    compile_with(grammar, resolve, transformer, &EbnfConfig::default())
}

/// Compile `grammar` into one parser per rule
///
/// `resolve` supplies parsers for names the grammar references but does not define; a
/// rule may not share its name with one of them. When `compiler.validate_references` is
/// set the grammar is validated first, so duplicate and unresolved names are reported as
/// complete sets before anything is built.
pub fn compile_with<R, T>(
    grammar: &Grammar,
    resolve: R,
    transformer: &T,
    config: &EbnfConfig,
) -> Result<ParserTable<R>>
where
    R: Fn(&Name) -> Option<GrammarParser>,
    T: Transformer + ?Sized,
{
    if config.compiler.validate_references {
        let external: BTreeSet<Name> = grammar
            .references()
            .into_iter()
            .filter(|name| resolve(name).is_some())
            .collect();
        grammar.check_identifiers(&external)?;
    }

    let parsers = Compiler::new(&resolve, transformer).run(grammar)?;
    Ok(ParserTable { resolve, parsers })
}

/// Compile a grammar read from `label`, naming it in every error
pub fn compile_or_fail<R, T>(
    grammar: &Grammar,
    resolve: R,
    transformer: &T,
    label: &str,
) -> Result<FileParserTable<R>>
where
    R: Fn(&Name) -> Option<GrammarParser>,
    T: Transformer + ?Sized,
{
    compile(grammar, resolve, transformer)
        .map(|table| table.with_label(label))
        .map_err(|error| error.in_file(label))
}

impl Grammar {
    pub fn compile<R, T>(&self, resolve: R, transformer: &T) -> Result<ParserTable<R>>
    where
        R: Fn(&Name) -> Option<GrammarParser>,
        T: Transformer + ?Sized,
    {
        compile(self, resolve, transformer)
    }

    pub fn compile_or_fail<R, T>(
        &self,
        resolve: R,
        transformer: &T,
        label: &str,
    ) -> Result<FileParserTable<R>>
    where
        R: Fn(&Name) -> Option<GrammarParser>,
        T: Transformer + ?Sized,
    {
        compile_or_fail(self, resolve, transformer, label)
    }
}
