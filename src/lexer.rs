//! Lexer: source text to a flat sequence of [`Token`]s, built from `nom`
//! combinators.
//!
//! Whitespace and commas separate tokens, `;` starts a comment running to the
//! end of the line. Numbers and `#` literals must be followed by a token
//! boundary, so `12abc` is an error rather than a number and a symbol.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while_m_n},
    character::complete::{char, multispace1, none_of, one_of, satisfy},
    combinator::{cut, eof, map_res, opt, peek, recognize, value},
    multi::{many0, many0_count},
    sequence::{delimited, pair, preceded, terminated},
};
use num_bigint::BigInt;

use crate::Error;
use crate::ast::Value;
use crate::number::Rational;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Atom(Value),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::OpenParen => write!(f, "("),
            Token::CloseParen => write!(f, ")"),
            Token::OpenBrace => write!(f, "{{"),
            Token::CloseBrace => write!(f, "}}"),
            Token::Atom(value) => write!(f, "{value}"),
        }
    }
}

/// A token, or a rational whose denominator still has to be checked
enum Lexeme {
    Token(Token),
    Rational(BigInt, BigInt),
}

/// Characters that may start a symbol or keyword name
fn is_symbol_start(c: char) -> bool {
    c.is_ascii_lowercase() || "*/+?!<>=_-".contains(c)
}

fn is_symbol_char(c: char) -> bool {
    is_symbol_start(c) || c.is_ascii_digit()
}

/// Succeeds without consuming input if the next character ends a token
fn boundary(input: &str) -> IResult<&str, &str> {
    peek(alt((eof, recognize(one_of(" \t\r\n(){},;"))))).parse(input)
}

/// `[0-9][0-9_]*`
fn digits(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_digit()),
        take_while(|c: char| c.is_ascii_digit() || c == '_'),
    ))
    .parse(input)
}

fn signed_digits(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digits)).parse(input)
}

fn parse_big(text: &str) -> Result<BigInt, num_bigint::ParseBigIntError> {
    text.replace('_', "").parse::<BigInt>()
}

fn parse_float(input: &str) -> IResult<&str, Lexeme> {
    map_res(recognize((signed_digits, char('.'), digits)), |text: &str| {
        text.replace('_', "")
            .parse::<f64>()
            .map(|float| Lexeme::Token(Token::Atom(Value::Float(float))))
    })
    .parse(input)
}

fn parse_rational(input: &str) -> IResult<&str, Lexeme> {
    map_res(
        (signed_digits, char('/'), digits),
        |(numerator, _, denominator): (&str, char, &str)| {
            Ok::<_, num_bigint::ParseBigIntError>(Lexeme::Rational(
                parse_big(numerator)?,
                parse_big(denominator)?,
            ))
        },
    )
    .parse(input)
}

fn parse_integer(input: &str) -> IResult<&str, Lexeme> {
    map_res(signed_digits, |text: &str| {
        parse_big(text).map(|integer| Lexeme::Token(Token::Atom(Value::Integer(integer))))
    })
    .parse(input)
}

/// Parse a number: float, rational or integer, in that order of preference
fn parse_number(input: &str) -> IResult<&str, Lexeme> {
    terminated(
        alt((parse_float, parse_rational, parse_integer)),
        cut(boundary),
    )
    .parse(input)
}

/// Parse `#true`, `#false` or `#null`
fn parse_hash_literal(input: &str) -> IResult<&str, Value> {
    terminated(
        alt((
            value(Value::Boolean(true), tag("#true")),
            value(Value::Boolean(false), tag("#false")),
            value(Value::Null, tag("#null")),
        )),
        cut(boundary),
    )
    .parse(input)
}

fn string_escape(input: &str) -> IResult<&str, char> {
    alt((
        value('\n', char('n')),
        value('"', char('"')),
        value('\\', char('\\')),
    ))
    .parse(input)
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    preceded(
        char('"'),
        cut(terminated(
            many0(alt((preceded(char('\\'), string_escape), none_of("\"\\")))),
            char('"'),
        )),
    )
    .map(|chars: Vec<char>| Value::String(Rc::new(RefCell::new(chars))))
    .parse(input)
}

/// Parse a character literal such as `'a'` or `'\n'`
fn parse_character(input: &str) -> IResult<&str, Value> {
    delimited(
        char('\''),
        alt((
            preceded(char('\\'), alt((string_escape, value('\'', char('\''))))),
            none_of("'\\"),
        )),
        char('\''),
    )
    .map(Value::Character)
    .parse(input)
}

fn hex_byte(input: &str) -> IResult<&str, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |hex: &str| u8::from_str_radix(hex, 16),
    )
    .parse(input)
}

/// Parse `#bytes("...")`: printable ASCII, or `\xHH`, `\n`, `\"`, `\\`
fn parse_bytestring(input: &str) -> IResult<&str, Value> {
    let byte = alt((
        preceded(
            char('\\'),
            alt((
                preceded(char('x'), hex_byte),
                value(b'\n', char('n')),
                value(b'"', char('"')),
                value(b'\\', char('\\')),
            )),
        ),
        satisfy(|c| (' '..='~').contains(&c) && c != '"' && c != '\\').map(|c| c as u8),
    ));
    preceded(tag("#bytes(\""), cut(terminated(many0(byte), tag("\")"))))
        .map(Value::bytestring)
        .parse(input)
}

fn symbol_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_symbol_start), take_while(is_symbol_char))).parse(input)
}

fn parse_symbol(input: &str) -> IResult<&str, Value> {
    symbol_name
        .map(|name: &str| Value::Symbol(name.to_owned()))
        .parse(input)
}

fn parse_keyword(input: &str) -> IResult<&str, Value> {
    preceded(char(':'), symbol_name)
        .map(|name: &str| Value::Keyword(name.to_owned()))
        .parse(input)
}

fn parse_delimiter(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::OpenParen, char('(')),
        value(Token::CloseParen, char(')')),
        value(Token::OpenBrace, char('{')),
        value(Token::CloseBrace, char('}')),
    ))
    .parse(input)
}

fn parse_atom(input: &str) -> IResult<&str, Value> {
    alt((
        parse_bytestring,
        parse_hash_literal,
        parse_string,
        parse_character,
        parse_keyword,
        parse_symbol,
    ))
    .parse(input)
}

fn parse_lexeme(input: &str) -> IResult<&str, Lexeme> {
    alt((
        parse_delimiter.map(Lexeme::Token),
        parse_number,
        parse_atom.map(|atom| Lexeme::Token(Token::Atom(atom))),
    ))
    .parse(input)
}

/// Skip whitespace, commas and comments
fn skip_trivia(input: &str) -> &str {
    let comment = recognize(pair(char(';'), take_while(|c: char| c != '\n')));
    let skipped: IResult<&str, usize> =
        many0_count(alt((multispace1, tag(","), comment))).parse(input);
    match skipped {
        Ok((rest, _)) => rest,
        Err(_) => input,
    }
}

/// Convert source text into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut input = skip_trivia(source);

    while !input.is_empty() {
        let (rest, lexeme) = parse_lexeme(input).map_err(|_| {
            let position = source.len() - input.len();
            let near: String = input.chars().take(10).collect();
            Error::lex_failed(format!(
                "Could not read a token near '{near}' at position {position}"
            ))
        })?;
        let token = match lexeme {
            Lexeme::Token(token) => token,
            Lexeme::Rational(numerator, denominator) => {
                Token::Atom(Rational::new_value(numerator, denominator)?)
            }
        };
        tokens.push(token);
        input = skip_trivia(rest);
    }

    Ok(tokens)
}
