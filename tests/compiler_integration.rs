//! Compiling grammars and running the resulting parsers

use std::cell::RefCell;

use chumsky::prelude::*;
use ebnf_combinator::ebnf::combinator::{GrammarParser, SyntaxNode};
use ebnf_combinator::ebnf::compiler::{compile_or_fail, no_external};
use ebnf_combinator::ebnf::error::{ConfigurationError, DuplicateRuleError, EbnfError};
use ebnf_combinator::ebnf::token::{Name, Token};
use ebnf_combinator::ebnf::transform::{IdentityTransformer, RuleNaming, Transformer};
use ebnf_combinator::{compile, parse, ParserTable};
use rstest::rstest;

fn digits(name: &Name) -> Option<GrammarParser> {
    (name.as_str() == "DIGITS").then(|| {
        GrammarParser::new(
            filter(|c: &char| c.is_ascii_digit())
                .repeated()
                .at_least(1)
                .collect::<String>()
                .map(SyntaxNode::Text),
            "DIGITS",
        )
    })
}

fn table(source: &str) -> ParserTable<fn(&Name) -> Option<GrammarParser>> {
    let grammar = parse(source).unwrap();
    compile(
        &grammar,
        digits as fn(&Name) -> Option<GrammarParser>,
        &IdentityTransformer,
    )
    .unwrap()
}

fn accepts(table: &ParserTable<fn(&Name) -> Option<GrammarParser>>, rule: &str, input: &str) -> bool {
    table.get(rule).unwrap().parse(input).is_ok()
}

#[rstest(
    source,
    case("A = B, \"!\";\nB = \"b\" | \"c\";"),
    case("B = \"b\" | \"c\";\nA = B, \"!\";")
)]
fn test_declaration_order_does_not_matter(source: &str) {
    let table = table(source);
    assert!(accepts(&table, "A", "b!"));
    assert!(accepts(&table, "A", "c!"));
    assert!(!accepts(&table, "A", "d!"));
    assert!(!accepts(&table, "A", "b"));
}

#[rstest(
    input,
    accepted,
    case("1", true),
    case("1+2", true),
    case("(1+2)*3", true),
    case("((4))", true),
    case("2*(3+4)*5", true),
    case("1+", false),
    case("(1", false),
    case("", false)
)]
fn test_arithmetic_grammar(input: &str, accepted: bool) {
    let table = table(
        "(* mutually recursive expression grammar *)\n\
         EXPR = TERM, [ \"+\", EXPR ];\n\
         TERM = FACTOR, [ \"*\", TERM ];\n\
         FACTOR = DIGITS | ( \"(\", EXPR, \")\" );\n",
    );
    assert_eq!(accepts(&table, "EXPR", input), accepted, "input {:?}", input);
}

#[test]
fn test_self_reference_compiles() {
    let table = table("TEST = \"abc\", TEST;");
    let parser = table.get("TEST").unwrap();

    assert_eq!(parser.to_string(), "\"abc\", TEST");

    // No base case (DESIGN.md decision 7): every "abc" is consumed, then another is
    // demanded at the end of input
    let errors = parser.parse("abcabcabc").unwrap_err();
    assert_eq!(errors[0].span(), 9..9);
}

#[test]
fn test_self_reference_consumes_whole_input() {
    let table = table("TEST = \"abc\", [TEST];");
    let node = table.get("TEST").unwrap().parse("abcabcabc").unwrap();
    assert_eq!(node.text(), "abcabcabc");
}

#[rstest(
    input,
    accepted,
    case("ab", true),
    case("abba", true),
    case("x", false),
    case("", false)
)]
fn test_repetition_of_optional_sequence(input: &str, accepted: bool) {
    let table = table("TEST = { [\"a\"], [\"b\"] };");
    assert_eq!(accepts(&table, "TEST", input), accepted, "input {:?}", input);
}

#[test]
fn test_range_through_rules() {
    let table = table("FROM=\"a\";\nTO=\"z\";\nTEST=FROM..TO;");
    assert!(accepts(&table, "TEST", "m"));
    assert!(!accepts(&table, "TEST", "Q"));
}

#[test]
fn test_optional_alternative_fails_before_parsing() {
    let grammar = parse("TEST = \"a\" | [ \"b\" ];").unwrap();
    let error = compile(&grammar, no_external, &IdentityTransformer)
        .err()
        .unwrap();
    insta::assert_snapshot!(error.to_string(), @r#"Alternatives given 1 optional(s) expected 0 got [ "b" ]"#);
}

#[test]
fn test_external_parser() {
    let table = table("NUMBER = [\"-\"], DIGITS;\nLIST = NUMBER, { \",\", NUMBER };");
    assert!(accepts(&table, "LIST", "1,-22,333"));
    assert!(!accepts(&table, "LIST", "1,,2"));
    assert!(accepts(&table, "DIGITS", "42"));
}

#[test]
fn test_unresolved_references_message() {
    let grammar = parse("A = Z, B;\nB = Y | X;").unwrap();
    let error = compile(&grammar, no_external, &IdentityTransformer)
        .err()
        .unwrap();
    insta::assert_snapshot!(error.to_string(), @"3 invalid (unknown) references=X, Y, Z");
}

#[test]
fn test_duplicate_rules_reported_together() {
    let grammar = parse("A = \"1\";\nA = \"2\";\nB = \"b\";").unwrap();
    let error = compile(&grammar, no_external, &IdentityTransformer)
        .err()
        .unwrap();
    assert_eq!(
        error,
        EbnfError::DuplicateRule(DuplicateRuleError::Grammar {
            rules: vec!["A = \"1\";".to_string(), "A = \"2\";".to_string()],
        })
    );
}

#[test]
fn test_missing_parser_in_file_table() {
    let grammar = parse("A = \"a\";").unwrap();
    let table = compile_or_fail(&grammar, no_external, &IdentityTransformer, "a.grammar").unwrap();

    assert_eq!(table.label(), "a.grammar");
    assert!(table.get("A").is_ok());
    assert_eq!(
        table.get("MISSING").err().unwrap(),
        EbnfError::Configuration(ConfigurationError::MissingParser {
            name: "MISSING".to_string(),
            label: "a.grammar".to_string(),
        })
    );
}

#[test]
fn test_rule_naming() {
    let grammar = parse("PAIR = WORD, \"=\", WORD;\nWORD = \"a\" | \"b\";").unwrap();
    let table = compile(&grammar, no_external, &RuleNaming).unwrap();
    let node = table.get("PAIR").unwrap().parse("a=b").unwrap();

    let SyntaxNode::Named { name, node } = node else {
        panic!("expected a named node");
    };
    assert_eq!(name.as_str(), "PAIR");
    let SyntaxNode::Sequence(parts) = *node else {
        panic!("expected a sequence");
    };
    assert_eq!(parts.len(), 3);
    assert!(matches!(&parts[0], SyntaxNode::Named { name, .. } if name.as_str() == "WORD"));
    assert_eq!(parts[2].text(), "b");
}

#[derive(Default)]
struct HookLog {
    lines: RefCell<Vec<String>>,
}

impl HookLog {
    fn log(&self, hook: &str, token: &Token, parser: GrammarParser) -> GrammarParser {
        self.lines
            .borrow_mut()
            .push(format!("{} {}", hook, token.text().replace('\n', "")));
        parser
    }
}

impl Transformer for HookLog {
    fn concatenation(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        self.log("CONCAT", token, parser)
    }

    fn identifier(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        self.log("IDENTIFIER", token, parser)
    }

    fn rule(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        self.log("RULE", token, parser)
    }

    fn terminal(&self, token: &Token, parser: GrammarParser) -> GrammarParser {
        self.log("TERMINAL", token, parser)
    }
}

#[test]
fn test_hook_order_for_self_reference() {
    let grammar = parse("TEST = \"abc\", TEST;").unwrap();
    let log = HookLog::default();
    compile(&grammar, no_external, &log).unwrap();

    insta::assert_snapshot!(log.lines.into_inner().join("\n"), @r#"
TERMINAL "abc"
CONCAT "abc", TEST
RULE TEST = "abc", TEST;
IDENTIFIER TEST
"#);
}

#[test]
fn test_hook_order_for_forward_reference() {
    let grammar = parse("TEST = FORWARD_REFERENCE;\nFORWARD_REFERENCE = \"abc\";").unwrap();
    let log = HookLog::default();
    compile(&grammar, no_external, &log).unwrap();

    insta::assert_snapshot!(log.lines.into_inner().join("\n"), @r#"
TERMINAL "abc"
RULE FORWARD_REFERENCE = "abc";
IDENTIFIER FORWARD_REFERENCE
RULE TEST = FORWARD_REFERENCE;
"#);
}
