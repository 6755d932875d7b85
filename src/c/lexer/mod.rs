//! Tokenizer for the C subset.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{multispace1, none_of, not_line_ending, one_of},
    combinator::{map, recognize, value},
    multi::{many0_count, many1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use nom_locate::LocatedSpan;
use thiserror::Error;

use crate::diag::{CompError, Diagnostics};

pub type Span<'a> = LocatedSpan<&'a str>;

#[derive(Debug, Error)]
pub enum LexError {
    #[error("illegal character '{0}'")]
    Illegal(char),
}

/// The terminal symbols of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Int,
    Char,
    Unsigned,
    If,
    While,
    Return,
    Id,
    /// Decimal integer literal
    ILiteral,
    /// Hexadecimal integer literal
    HLiteral,
    /// Character literal
    CLiteral,
    LParen,
    RParen,
    LCurly,
    RCurly,
    Semicolon,
    Comma,
    Assign,
    Plus,
    Minus,
    Tilde,
    Bang,
    LShift,
    RShift,
    Lt,
    Grt,
    Leq,
    Geq,
    Eq,
    Neq,
    And,
    Xor,
    Or,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Int => "int",
            TokenKind::Char => "char",
            TokenKind::Unsigned => "unsigned",
            TokenKind::If => "if",
            TokenKind::While => "while",
            TokenKind::Return => "return",
            TokenKind::Id => "identifier",
            TokenKind::ILiteral | TokenKind::HLiteral | TokenKind::CLiteral => "literal",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LCurly => "{",
            TokenKind::RCurly => "}",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::LShift => "<<",
            TokenKind::RShift => ">>",
            TokenKind::Lt => "<",
            TokenKind::Grt => ">",
            TokenKind::Leq => "<=",
            TokenKind::Geq => ">=",
            TokenKind::Eq => "==",
            TokenKind::Neq => "!=",
            TokenKind::And => "&",
            TokenKind::Xor => "^",
            TokenKind::Or => "|",
            TokenKind::Eof => "end of file",
        };
        f.write_str(s)
    }
}

/// A classified token with its source text and 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanToken {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

fn lex_punctuator(inp: Span<'_>) -> IResult<Span<'_>, TokenKind> {
    alt((
        alt((
            value(TokenKind::LShift, tag("<<")),
            value(TokenKind::RShift, tag(">>")),
            value(TokenKind::Leq, tag("<=")),
            value(TokenKind::Geq, tag(">=")),
            value(TokenKind::Eq, tag("==")),
            value(TokenKind::Neq, tag("!=")),
            value(TokenKind::Lt, tag("<")),
            value(TokenKind::Grt, tag(">")),
            value(TokenKind::Assign, tag("=")),
            value(TokenKind::Bang, tag("!")),
        )),
        alt((
            value(TokenKind::LParen, tag("(")),
            value(TokenKind::RParen, tag(")")),
            value(TokenKind::LCurly, tag("{")),
            value(TokenKind::RCurly, tag("}")),
            value(TokenKind::Semicolon, tag(";")),
            value(TokenKind::Comma, tag(",")),
            value(TokenKind::Plus, tag("+")),
            value(TokenKind::Minus, tag("-")),
            value(TokenKind::Tilde, tag("~")),
            value(TokenKind::And, tag("&")),
            value(TokenKind::Xor, tag("^")),
            value(TokenKind::Or, tag("|")),
        )),
    ))(inp)
}

const NONDIGIT: &str = "_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGIT: &str = "0123456789";
const HEXDIGIT: &str = "0123456789abcdefABCDEF";

fn lex_word(inp: Span<'_>) -> IResult<Span<'_>, TokenKind> {
    map(
        recognize(pair(
            one_of(NONDIGIT),
            many0_count(alt((one_of(NONDIGIT), one_of(DIGIT)))),
        )),
        |span: Span<'_>| match *span.fragment() {
            "int" => TokenKind::Int,
            "char" => TokenKind::Char,
            "unsigned" => TokenKind::Unsigned,
            "if" => TokenKind::If,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            _ => TokenKind::Id,
        },
    )(inp)
}

fn lex_literal(inp: Span<'_>) -> IResult<Span<'_>, TokenKind> {
    alt((
        value(
            TokenKind::HLiteral,
            recognize(preceded(alt((tag("0x"), tag("0X"))), many1(one_of(HEXDIGIT)))),
        ),
        value(TokenKind::ILiteral, recognize(many1(one_of(DIGIT)))),
        value(
            TokenKind::CLiteral,
            recognize(delimited(
                tag("'"),
                alt((recognize(pair(tag("\\"), one_of("0tn\\'"))), recognize(none_of("\\'")))),
                tag("'"),
            )),
        ),
    ))(inp)
}

fn skip_trivia(inp: Span<'_>) -> IResult<Span<'_>, usize> {
    many0_count(alt((
        value((), multispace1),
        value((), pair(tag("//"), not_line_ending)),
        value((), tuple((tag("/*"), take_until("*/"), tag("*/")))),
    )))(inp)
}

fn lex_token(inp: Span<'_>) -> IResult<Span<'_>, (&str, TokenKind)> {
    let (rest, kind) = alt((lex_literal, lex_word, lex_punctuator))(inp)?;
    let frag: &str = *inp.fragment();
    let len = frag.len() - rest.fragment().len();
    Ok((rest, (&frag[..len], kind)))
}

/// Splits `src` into tokens, ending with [TokenKind::Eof].
pub fn lex(src: &str, diag: &mut Diagnostics) -> Result<Vec<ScanToken>, CompError> {
    let mut toks = vec![];
    let mut inp = Span::new(src);
    loop {
        if let Ok((rest, _)) = skip_trivia(inp) {
            inp = rest;
        }
        let line = inp.location_line() as usize;
        if inp.fragment().is_empty() {
            toks.push(ScanToken {
                kind: TokenKind::Eof,
                text: String::new(),
                line,
            });
            return Ok(toks);
        }
        match lex_token(inp) {
            Ok((rest, (text, kind))) => {
                toks.push(ScanToken {
                    kind,
                    text: text.to_string(),
                    line,
                });
                inp = rest;
            }
            Err(_) => {
                let c = inp.fragment().chars().next().unwrap_or_default();
                return Err(diag.fatal(Some(line), LexError::Illegal(c)));
            }
        }
    }
}
