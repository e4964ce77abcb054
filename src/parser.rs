//! Parser: tokens to expressions.
//!
//! Lists and hashmap literals nest up to [`MAX_PARSE_DEPTH`] levels. Hashmap
//! literal keys must be hashable atoms; the values stay unevaluated until the
//! literal itself is evaluated.

use std::iter::Peekable;
use std::vec;

use crate::ast::{Entries, HashKey, Value};
use crate::lexer::{Token, tokenize};
use crate::{Error, MAX_PARSE_DEPTH};

/// Lex and parse a whole source text into its top-level expressions
pub fn parse(source: &str) -> Result<Vec<Value>, Error> {
    let mut parser = Parser {
        tokens: tokenize(source)?.into_iter().peekable(),
    };
    let mut expressions = Vec::new();
    while parser.tokens.peek().is_some() {
        expressions.push(parser.parse_expression(0)?);
    }
    Ok(expressions)
}

struct Parser {
    tokens: Peekable<vec::IntoIter<Token>>,
}

impl Parser {
    fn parse_expression(&mut self, depth: usize) -> Result<Value, Error> {
        match self.tokens.next() {
            Some(Token::Atom(atom)) => Ok(atom),
            Some(Token::OpenParen) => self.parse_list(depth + 1),
            Some(Token::OpenBrace) => self.parse_hashmap(depth + 1),
            Some(token @ (Token::CloseParen | Token::CloseBrace)) => {
                Err(Error::parse_failed(format!("Unexpected '{token}'")))
            }
            None => Err(Error::parse_failed("Unexpected end of input")),
        }
    }

    /// Parse the elements of a delimited form up to its closing token
    fn parse_items(&mut self, close: &Token, depth: usize) -> Result<Vec<Value>, Error> {
        if depth > MAX_PARSE_DEPTH {
            return Err(Error::parse_failed(format!(
                "Nesting exceeds the maximum depth of {MAX_PARSE_DEPTH}"
            )));
        }

        let mut items = Vec::new();
        loop {
            match self.tokens.peek() {
                None => {
                    return Err(Error::parse_failed(format!(
                        "Missing '{close}' before end of input"
                    )));
                }
                Some(token) if token == close => {
                    self.tokens.next();
                    return Ok(items);
                }
                Some(_) => items.push(self.parse_expression(depth)?),
            }
        }
    }

    fn parse_list(&mut self, depth: usize) -> Result<Value, Error> {
        Ok(Value::list(self.parse_items(&Token::CloseParen, depth)?))
    }

    fn parse_hashmap(&mut self, depth: usize) -> Result<Value, Error> {
        let items = self.parse_items(&Token::CloseBrace, depth)?;
        if items.len() % 2 != 0 {
            return Err(Error::parse_failed(format!(
                "Hashmap literal needs an even number of elements, but got {}",
                items.len()
            )));
        }

        let mut entries = Entries::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(key), Some(value)) = (items.next(), items.next()) {
            let key = HashKey::try_from(&key).map_err(|_| {
                Error::parse_failed(format!("Hashmap literal key cannot be hashed: {key}"))
            })?;
            entries.insert(key, value);
        }
        Ok(Value::hashmap(entries))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{kw, sym, val};

    fn parse_one(source: &str) -> Value {
        let mut forms = parse(source).unwrap();
        assert_eq!(forms.len(), 1, "expected a single form from {source}");
        forms.remove(0)
    }

    #[test]
    fn test_nested_lists() {
        assert_eq!(
            parse_one("(define (f x) (+ x 1))"),
            val([
                sym("define"),
                val([sym("f"), sym("x")]),
                val([sym("+"), sym("x"), val(1)]),
            ])
        );
        assert_eq!(parse_one("()"), val(Vec::<Value>::new()));
        assert_eq!(parse_one("(())"), val([val(Vec::<Value>::new())]));
    }

    #[test]
    fn test_multiple_top_level_forms() {
        let forms = parse("1 (a) :k ; done").unwrap();
        assert_eq!(forms, vec![val(1), val([sym("a")]), kw("k")]);
        assert_eq!(parse("").unwrap(), vec![]);
    }

    #[test]
    fn test_hashmap_literals() {
        let Value::Hashmap(entries) = parse_one("{:a 1, b (+ 1 2), 3 #null}") else {
            panic!("expected a hashmap");
        };
        let entries = entries.borrow();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[&HashKey::Keyword("a".into())], val(1));
        assert_eq!(
            entries[&HashKey::Symbol("b".into())],
            val([sym("+"), val(1), val(2)])
        );
        assert_eq!(entries[&HashKey::Integer(3.into())], Value::Null);

        // Later duplicates win
        let Value::Hashmap(entries) = parse_one("{:a 1 :a 2}") else {
            panic!("expected a hashmap");
        };
        assert_eq!(entries.borrow()[&HashKey::Keyword("a".into())], val(2));

        // Entries keep their source order
        let Value::Hashmap(entries) = parse_one("{:z 1 :a 2 :m 3}") else {
            panic!("expected a hashmap");
        };
        let keys: Vec<Value> = entries.borrow().keys().cloned().map(Value::from).collect();
        assert_eq!(keys, vec![kw("z"), kw("a"), kw("m")]);
    }

    #[test]
    fn test_parse_failures() {
        let failures = [
            "(",
            "(+ 1 2",
            ")",
            "(a))",
            "{",
            "}",
            "(a }",
            "{:a 1 :b}",
            "{(1) 2}",
            "{\"key\" 2}",
            "{1.5 2}",
        ];
        for source in failures {
            let err = parse(source).unwrap_err();
            assert_eq!(err.type_name(), Some("parse-failed"), "'{source}' should not parse");
        }
    }

    #[test]
    fn test_lex_errors_pass_through() {
        assert_eq!(parse("(a @)").unwrap_err().type_name(), Some("lex-failed"));
        assert_eq!(parse("(/ 1/0)").unwrap_err().type_name(), Some("division-by-zero"));
    }

    #[test]
    fn test_depth_limit() {
        let deep_ok = format!("{}{}", "(".repeat(MAX_PARSE_DEPTH), ")".repeat(MAX_PARSE_DEPTH));
        assert!(parse(&deep_ok).is_ok());

        let too_deep = format!(
            "{}{}",
            "(".repeat(MAX_PARSE_DEPTH + 1),
            ")".repeat(MAX_PARSE_DEPTH + 1)
        );
        assert_eq!(parse(&too_deep).unwrap_err().type_name(), Some("parse-failed"));
    }

    #[test]
    fn test_repr_reads_back() {
        let sources = [
            "(1 -2 1/3 2.5 #true #false #null)",
            "(\"a \\\"quoted\\\" line\\n\" 'x' '\\n' :key sym)",
            "(#bytes(\"ab\\x00\\x22\\x5c\"))",
            "((nested (lists)) ())",
        ];
        for source in sources {
            let value = parse_one(source);
            let reparsed = parse_one(&value.to_string());
            assert_eq!(value, reparsed, "repr of {source} did not read back");
        }
    }
}
