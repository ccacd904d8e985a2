//! Unit tests for lexer and parser

use chumsky::Parser;
use rulesmith::lexer::{lexer, Token};
use rulesmith::{parse, parse_query, CmpOp, ParseError, Premise, Term};

fn tokens(input: &str) -> Vec<Token> {
    lexer()
        .parse(input)
        .unwrap()
        .into_iter()
        .map(|(t, _)| t)
        .collect()
}

// ============================================================================
// Lexer tests
// ============================================================================

#[test]
fn test_lex_transform_operators() {
    assert_eq!(
        tokens("|> do fn:group_by(X), let N = fn:count()"),
        vec![
            Token::Pipe,
            Token::Do,
            Token::FnName("fn:group_by".to_string()),
            Token::LParen,
            Token::Variable("X".to_string()),
            Token::RParen,
            Token::Comma,
            Token::Let,
            Token::Variable("N".to_string()),
            Token::Eq,
            Token::FnName("fn:count".to_string()),
            Token::LParen,
            Token::RParen,
        ]
    );
}

#[test]
fn test_lex_comparisons() {
    assert_eq!(
        tokens("X < Y <= Z > W >= V != U"),
        vec![
            Token::Variable("X".to_string()),
            Token::Lt,
            Token::Variable("Y".to_string()),
            Token::Le,
            Token::Variable("Z".to_string()),
            Token::Gt,
            Token::Variable("W".to_string()),
            Token::Ge,
            Token::Variable("V".to_string()),
            Token::Neq,
            Token::Variable("U".to_string()),
        ]
    );
}

#[test]
fn test_lex_comments_are_skipped() {
    let input = "# leading comment\np(/a). # trailing\n# another\n";
    assert_eq!(
        tokens(input),
        vec![
            Token::Ident("p".to_string()),
            Token::LParen,
            Token::Name("/a".to_string()),
            Token::RParen,
            Token::Dot,
        ]
    );
}

#[test]
fn test_lex_rejects_stray_characters() {
    assert!(lexer().parse("p(X) :- q(X) ; r(X).").is_err());
    assert!(lexer().parse("p(\"unterminated).").is_err());
}

// ============================================================================
// Parser tests
// ============================================================================

#[test]
fn test_parse_rule() {
    let program = parse("reachable(X, Z) :- edge(X, Y), reachable(Y, Z).").unwrap();
    assert_eq!(program.clauses.len(), 1);
    let clause = &program.clauses[0];
    assert_eq!(clause.head.predicate, "reachable");
    assert_eq!(clause.body.len(), 2);
    assert!(clause.transform.is_none());
}

#[test]
fn test_parse_unit_clauses() {
    let program = parse(r#"person(/alice, "Alice", 37). ratio(0.25). blob(b"\x00\xff")."#).unwrap();
    assert_eq!(program.clauses.len(), 3);
    assert!(program.clauses.iter().all(|c| c.is_unit()));
    assert_eq!(
        program.clauses[0].head.args,
        vec![Term::name("/alice"), Term::Text("Alice".into()), Term::Number(37)]
    );
    assert_eq!(program.clauses[1].head.args, vec![Term::Float(0.25)]);
    assert_eq!(program.clauses[2].head.args, vec![Term::Bytes(vec![0, 0xff])]);
}

#[test]
fn test_parse_premise_kinds() {
    let program = parse("p(X) :- q(X, Y), !r(Y), X = Y, X != /z, Y >= 3.").unwrap();
    let body = &program.clauses[0].body;
    assert!(matches!(body[0], Premise::Positive(_)));
    assert!(matches!(body[1], Premise::Negated(_)));
    assert!(matches!(body[2], Premise::Eq(_, _)));
    assert!(matches!(body[3], Premise::Neq(_, _)));
    assert!(matches!(body[4], Premise::Cmp(CmpOp::Ge, _, Term::Number(3))));
}

#[test]
fn test_parse_transform() {
    let program = parse("count(G, N) :- member(G, M) |> do fn:group_by(G), let N = fn:count().").unwrap();
    let transform = program.clauses[0].transform.as_ref().unwrap();
    assert_eq!(transform.statements.len(), 2);
    assert_eq!(transform.statements[0].target, None);
    assert_eq!(transform.statements[1].target.as_deref(), Some("N"));
}

#[test]
fn test_parse_collections() {
    let program = parse("p([1, 2], [:], [/k: \"v\"], {/a: [], /b: fn:list(1)}).").unwrap();
    let args = &program.clauses[0].head.args;
    assert_eq!(args[0], Term::List(vec![Term::Number(1), Term::Number(2)]));
    assert_eq!(args[1], Term::Map(vec![]));
    assert_eq!(args[2], Term::Map(vec![Term::name("/k"), Term::Text("v".into())]));
    assert!(matches!(&args[3], Term::Struct(entries) if entries.len() == 4));
}

#[test]
fn test_parse_decl() {
    let source = r#"
        Package deps!
        Use base!

        Decl dependency_link(From, To, Kind)
          descr [doc("an import or build edge")]
          bound [/name, /name, /name]
          inclusion [node(From)].
    "#;
    let program = parse(source).unwrap();
    assert_eq!(program.package.as_deref(), Some("deps"));
    assert_eq!(program.uses, vec!["base".to_string()]);
    let decl = &program.decls[0];
    assert_eq!(decl.predicate(), "dependency_link");
    assert_eq!(decl.arity(), 3);
    assert_eq!(decl.descr.len(), 1);
    assert_eq!(decl.bounds, vec![vec![Term::name("/name"); 3]]);
    assert_eq!(decl.inclusion[0].predicate, "node");
}

#[test]
fn test_parse_errors_are_reported() {
    let err = parse("p(X) :- .").unwrap_err();
    assert!(matches!(err, ParseError::Parse(_)));
    let err = parse("p(X) :- q(X) ; r(X).").unwrap_err();
    assert!(matches!(err, ParseError::Lex(_)));
    // A transform needs a body
    assert!(parse("p(N) |> let N = fn:count().").is_err());
}

#[test]
fn test_parse_query() {
    let atom = parse_query("reachable(/a, X)").unwrap();
    assert_eq!(atom.predicate, "reachable");
    assert_eq!(atom.args, vec![Term::name("/a"), Term::var("X")]);
    assert_eq!(parse_query("reachable(/a, X).").unwrap(), atom);
    assert!(parse_query("reachable(/a, X), edge(X, Y)").is_err());
}
