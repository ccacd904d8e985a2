//! Lexer for the rule language
//!
//! Tokenizes source into a stream for the parser.

use chumsky::prelude::*;
use std::ops::Range;

/// Token types
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    // Keywords
    Package,
    Use,
    Decl,
    Descr,
    Bound,
    Inclusion,
    Do,
    Let,

    // Words
    Ident(String),
    Variable(String),
    Name(String),
    FnName(String),

    // Literals; numbers keep their spelling so tokens stay hashable
    Str(String),
    Bytes(Vec<u8>),
    Number(String),
    Float(String),

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }
    Comma,     // ,
    Dot,       // .
    Colon,     // :
    Bang,      // !
    ColonDash, // :-
    Pipe,      // |>
    Eq,        // =
    Neq,       // !=
    Lt,        // <
    Le,        // <=
    Gt,        // >
    Ge,        // >=
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Package => write!(f, "Package"),
            Token::Use => write!(f, "Use"),
            Token::Decl => write!(f, "Decl"),
            Token::Descr => write!(f, "descr"),
            Token::Bound => write!(f, "bound"),
            Token::Inclusion => write!(f, "inclusion"),
            Token::Do => write!(f, "do"),
            Token::Let => write!(f, "let"),
            Token::Ident(s) | Token::Variable(s) | Token::Name(s) | Token::FnName(s) => {
                write!(f, "{}", s)
            }
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Token::Number(s) | Token::Float(s) => write!(f, "{}", s),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Bang => write!(f, "!"),
            Token::ColonDash => write!(f, ":-"),
            Token::Pipe => write!(f, "|>"),
            Token::Eq => write!(f, "="),
            Token::Neq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
        }
    }
}

/// Type alias for spans
pub type Span = Range<usize>;

fn word_tail() -> impl Parser<char, Vec<char>, Error = Simple<char>> + Clone {
    filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_').repeated()
}

/// `\\`, `\"`, `\n`, `\t`, `\r`, `\0` and `\xHH`
fn escape() -> impl Parser<char, char, Error = Simple<char>> + Clone {
    let hex_byte = filter(|c: &char| c.is_ascii_hexdigit())
        .repeated()
        .exactly(2)
        .collect::<String>()
        .try_map(|digits, span| {
            u8::from_str_radix(&digits, 16)
                .map(char::from)
                .map_err(|_| Simple::custom(span, "invalid hex escape"))
        });

    just('\\').ignore_then(choice((
        just('\\'),
        just('"'),
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('0').to('\0'),
        just('x').ignore_then(hex_byte),
    )))
}

/// Create a lexer for the rule language
pub fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let lower_word = filter(|c: &char| c.is_ascii_lowercase())
        .chain::<char, Vec<char>, _>(word_tail())
        .collect::<String>()
        .map(|s| match s.as_str() {
            "descr" => Token::Descr,
            "bound" => Token::Bound,
            "inclusion" => Token::Inclusion,
            "do" => Token::Do,
            "let" => Token::Let,
            _ => Token::Ident(s),
        });

    let upper_word = filter(|c: &char| c.is_ascii_uppercase() || *c == '_')
        .chain::<char, Vec<char>, _>(word_tail())
        .collect::<String>()
        .map(|s| match s.as_str() {
            "Package" => Token::Package,
            "Use" => Token::Use,
            "Decl" => Token::Decl,
            _ => Token::Variable(s),
        });

    // fn:name must be tried before the plain identifier `fn`
    let fn_name = just("fn:")
        .ignore_then(
            filter(|c: &char| c.is_ascii_lowercase())
                .chain::<char, Vec<char>, _>(word_tail())
                .collect::<String>(),
        )
        .map(|s| Token::FnName(format!("fn:{s}")));

    let segment = filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .repeated()
        .at_least(1);
    let name = just('/')
        .chain::<char, Vec<char>, _>(segment.clone())
        .chain::<char, Vec<char>, _>(
            just('/')
                .chain::<char, Vec<char>, _>(segment)
                .repeated()
                .flatten(),
        )
        .collect::<String>()
        .map(Token::Name);

    let string = filter(|c: &char| *c != '\\' && *c != '"')
        .or(escape())
        .repeated()
        .delimited_by(just('"'), just('"'))
        .collect::<String>()
        .map(Token::Str);

    // Escapes denote single bytes; literal characters contribute their UTF-8 encoding
    let bytes = just('b')
        .ignore_then(
            escape()
                .map(|c| vec![c as u8])
                .or(filter(|c: &char| *c != '\\' && *c != '"').map(|c: char| {
                    let mut buf = [0u8; 4];
                    c.encode_utf8(&mut buf).as_bytes().to_vec()
                }))
                .repeated()
                .flatten()
                .delimited_by(just('"'), just('"')),
        )
        .map(Token::Bytes);

    let digits = filter(|c: &char| c.is_ascii_digit()).repeated().at_least(1);
    let fraction = just('.').chain::<char, Vec<char>, _>(digits.clone());
    let exponent = one_of("eE")
        .chain::<char, Option<char>, _>(one_of("+-").or_not())
        .chain::<char, Vec<char>, _>(digits.clone());
    let number = just('-')
        .or_not()
        .chain::<char, Vec<char>, _>(digits)
        .then(fraction.or_not())
        .then(exponent.or_not())
        .map(|((int, frac), exp)| {
            let is_float = frac.is_some() || exp.is_some();
            let text: String = int
                .into_iter()
                .chain(frac.into_iter().flatten())
                .chain(exp.into_iter().flatten())
                .collect();
            if is_float {
                Token::Float(text)
            } else {
                Token::Number(text)
            }
        });

    let punctuation = choice((
        just(":-").to(Token::ColonDash),
        just("|>").to(Token::Pipe),
        just("!=").to(Token::Neq),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just('!').to(Token::Bang),
        just('=').to(Token::Eq),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
    ));

    // Comments: # to end of line
    let line_comment = just('#')
        .then(none_of('\n').repeated())
        .then(just('\n').or_not())
        .ignored();

    let token = choice((
        fn_name, bytes, lower_word, upper_word, name, string, number, punctuation,
    ));

    // Token OR comment - comments produce None, tokens produce Some
    let token_or_skip = line_comment.to(None).or(token.map(Some));

    token_or_skip
        .map_with_span(|opt_tok, span| opt_tok.map(|tok| (tok, span)))
        .padded()
        .repeated()
        .then_ignore(end())
        .map(|items| items.into_iter().flatten().collect())
}
