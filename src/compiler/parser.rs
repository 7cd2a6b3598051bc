//! Recursive-descent parser.
//!
//! ```text
//! contract   := statement+
//! statement  := WHEN condition THEN STORE identifier '=' expression
//! condition  := (identifier | BALANCE) '>=' number
//! expression := unary [('+' | '-') unary]
//! unary      := ('+' | '-') unary unary
//!             | number | identifier | BALANCE | TXVALUE | TIME | BLOCKNUM
//! ```
//!
//! Arithmetic is prefix (`- a b`). A single trailing infix operator
//! (`balance - 100`) is accepted at the top of an expression; chains such as
//! `a - b + c` are not. Any deviation is reported immediately; no partial
//! tree is returned.

use crate::compiler::ast::{BinOp, Condition, ContextValue, Contract, Expr, Statement};
use crate::compiler::errors::CompileError;
use crate::compiler::token::{Keyword, Token};

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

/// Parses a token stream into a contract.
pub fn parse(tokens: &[Token]) -> Result<Contract, CompileError> {
    if tokens.is_empty() {
        return Err(CompileError::EmptySource);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();
    while parser.peek().is_some() {
        statements.push(parser.statement()?);
    }
    Ok(Contract { statements })
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self, expected: &'static str) -> Result<&'a Token, CompileError> {
        let tok = self
            .tokens
            .get(self.pos)
            .ok_or(CompileError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    fn unexpected(&self, position: usize, expected: &'static str, found: &Token) -> CompileError {
        if let Token::Keyword(k) = found {
            if is_reserved(*k) {
                return CompileError::ReservedKeyword {
                    position,
                    keyword: k.as_str(),
                };
            }
        }
        CompileError::UnexpectedToken {
            position,
            expected,
            found: found.to_string(),
        }
    }

    fn expect(&mut self, want: &Token, expected: &'static str) -> Result<(), CompileError> {
        let position = self.pos;
        let tok = self.next(expected)?;
        if tok != want {
            return Err(self.unexpected(position, expected, tok));
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<Statement, CompileError> {
        self.expect(&Token::Keyword(Keyword::When), "WHEN")?;
        let condition = self.condition()?;
        self.expect(&Token::Keyword(Keyword::Then), "THEN")?;
        self.expect(&Token::Keyword(Keyword::Store), "STORE")?;
        let body = self.store()?;
        Ok(Statement::When {
            condition,
            body: Box::new(body),
        })
    }

    fn store(&mut self) -> Result<Statement, CompileError> {
        let position = self.pos;
        let key = match self.next("identifier")? {
            Token::Identifier(name) => name.clone(),
            other => return Err(self.unexpected(position, "identifier", other)),
        };
        self.expect(&Token::Assign, "'='")?;
        let value = self.expression()?;
        Ok(Statement::Store { key, value })
    }

    fn condition(&mut self) -> Result<Condition, CompileError> {
        const SUBJECT: &str = "identifier or BALANCE";
        let position = self.pos;
        let lhs = match self.next(SUBJECT)? {
            Token::Identifier(name) => Expr::Identifier(name.clone()),
            Token::Keyword(Keyword::Balance) => Expr::Context(ContextValue::Balance),
            other => return Err(self.unexpected(position, SUBJECT, other)),
        };
        self.expect(&Token::Gte, "'>='")?;
        let position = self.pos;
        let rhs = match self.next("number")? {
            Token::Number(n) => Expr::Number(*n),
            other => return Err(self.unexpected(position, "number", other)),
        };
        Ok(Condition { lhs, rhs })
    }

    fn expression(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.unary()?;
        let op = match self.peek() {
            Some(Token::Plus) => BinOp::Add,
            Some(Token::Minus) => BinOp::Sub,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.unary()?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        const EXPECTED: &str = "number, identifier or operator";
        let position = self.pos;
        let expr = match self.next(EXPECTED)? {
            Token::Plus => {
                let lhs = self.unary()?;
                Expr::binary(BinOp::Add, lhs, self.unary()?)
            }
            Token::Minus => {
                let lhs = self.unary()?;
                Expr::binary(BinOp::Sub, lhs, self.unary()?)
            }
            Token::Number(n) => Expr::Number(*n),
            Token::Identifier(name) => Expr::Identifier(name.clone()),
            Token::Keyword(Keyword::Balance) => Expr::Context(ContextValue::Balance),
            Token::Keyword(Keyword::Txvalue) => Expr::Context(ContextValue::TxValue),
            Token::Keyword(Keyword::Time) => Expr::Context(ContextValue::Time),
            Token::Keyword(Keyword::Blocknum) => Expr::Context(ContextValue::BlockNum),
            other => return Err(self.unexpected(position, EXPECTED, other)),
        };
        Ok(expr)
    }
}

/// Keywords the tokenizer knows but the grammar does not use yet.
fn is_reserved(k: Keyword) -> bool {
    !matches!(
        k,
        Keyword::When
            | Keyword::Then
            | Keyword::Store
            | Keyword::Balance
            | Keyword::Txvalue
            | Keyword::Time
            | Keyword::Blocknum
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::token::tokenize;

    fn parse_src(src: &str) -> Result<Contract, CompileError> {
        parse(&tokenize(src)?)
    }

    fn id(name: &str) -> Expr {
        Expr::Identifier(name.into())
    }

    #[test]
    fn parses_guarded_store() {
        let contract = parse_src("WHEN BALANCE >= 100 THEN STORE balance = balance - 100").unwrap();
        assert_eq!(
            contract.statements,
            vec![Statement::When {
                condition: Condition {
                    lhs: Expr::Context(ContextValue::Balance),
                    rhs: Expr::Number(100),
                },
                body: Box::new(Statement::Store {
                    key: "balance".into(),
                    value: Expr::binary(BinOp::Sub, id("balance"), Expr::Number(100)),
                }),
            }]
        );
    }

    fn store_value(src: &str) -> Expr {
        match parse_src(src).unwrap().statements.remove(0) {
            Statement::When { body, .. } => match *body {
                Statement::Store { value, .. } => value,
                other => panic!("unexpected body {:?}", other),
            },
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn prefix_and_infix_agree() {
        let prefix = parse_src("WHEN x >= 1 THEN STORE x = - a 1").unwrap();
        let infix = parse_src("WHEN x >= 1 THEN STORE x = a - 1").unwrap();
        assert_eq!(prefix, infix);
    }

    #[test]
    fn nested_prefix_operands() {
        assert_eq!(
            store_value("WHEN x >= 0 THEN STORE x = + a - b 2"),
            Expr::binary(
                BinOp::Add,
                id("a"),
                Expr::binary(BinOp::Sub, id("b"), Expr::Number(2))
            )
        );
    }

    #[test]
    fn multiple_statements_run_in_order() {
        let contract =
            parse_src("WHEN BALANCE >= 0 THEN STORE a = 1 WHEN a >= 1 THEN STORE b = 2").unwrap();
        assert_eq!(contract.statements.len(), 2);
    }

    #[test]
    fn empty_source_is_rejected() {
        assert_eq!(parse_src("   "), Err(CompileError::EmptySource));
    }

    #[test]
    fn bare_store_is_rejected() {
        assert_eq!(
            parse_src("STORE x = 1"),
            Err(CompileError::UnexpectedToken {
                position: 0,
                expected: "WHEN",
                found: "STORE".into()
            })
        );
    }

    #[test]
    fn guard_body_must_be_a_store() {
        assert_eq!(
            parse_src("WHEN x >= 1 THEN WHEN y >= 1 THEN STORE z = 1"),
            Err(CompileError::UnexpectedToken {
                position: 5,
                expected: "STORE",
                found: "WHEN".into()
            })
        );
    }

    #[test]
    fn condition_compares_a_subject_with_a_number() {
        assert_eq!(
            parse_src("WHEN x + 1 >= 2 THEN STORE y = 1"),
            Err(CompileError::UnexpectedToken {
                position: 2,
                expected: "'>='",
                found: "+".into()
            })
        );
        assert_eq!(
            parse_src("WHEN x >= y THEN STORE z = 1"),
            Err(CompileError::UnexpectedToken {
                position: 3,
                expected: "number",
                found: "y".into()
            })
        );
        assert_eq!(
            parse_src("WHEN 5 >= 1 THEN STORE z = 1"),
            Err(CompileError::UnexpectedToken {
                position: 1,
                expected: "identifier or BALANCE",
                found: "5".into()
            })
        );
        assert_eq!(
            parse_src("WHEN TXVALUE >= 1 THEN STORE z = 1"),
            Err(CompileError::UnexpectedToken {
                position: 1,
                expected: "identifier or BALANCE",
                found: "TXVALUE".into()
            })
        );
    }

    #[test]
    fn infix_chains_are_rejected() {
        assert_eq!(
            parse_src("WHEN x >= 1 THEN STORE y = a - b + c"),
            Err(CompileError::UnexpectedToken {
                position: 11,
                expected: "WHEN",
                found: "+".into()
            })
        );
    }

    #[test]
    fn missing_pieces_are_reported() {
        assert_eq!(
            parse_src("WHEN x >= 1 THEN"),
            Err(CompileError::UnexpectedEnd { expected: "STORE" })
        );
        assert_eq!(
            parse_src("WHEN x >= 1 THEN STORE x ="),
            Err(CompileError::UnexpectedEnd {
                expected: "number, identifier or operator"
            })
        );
        assert_eq!(
            parse_src("WHEN x >= 1 THEN STORE x = +  1"),
            Err(CompileError::UnexpectedEnd {
                expected: "number, identifier or operator"
            })
        );
    }

    #[test]
    fn wrong_tokens_are_reported_with_position() {
        assert_eq!(
            parse_src("WHEN x 5 THEN STORE y = 1"),
            Err(CompileError::UnexpectedToken {
                position: 2,
                expected: "'>='",
                found: "5".into()
            })
        );
        assert_eq!(
            parse_src("WHEN x >= 1 THEN STORE 5 = 1"),
            Err(CompileError::UnexpectedToken {
                position: 6,
                expected: "identifier",
                found: "5".into()
            })
        );
    }

    #[test]
    fn trailing_tokens_fail() {
        assert_eq!(
            parse_src("WHEN x >= 1 THEN STORE x = 1 2"),
            Err(CompileError::UnexpectedToken {
                position: 9,
                expected: "WHEN",
                found: "2".into()
            })
        );
    }

    #[test]
    fn reserved_keywords_are_rejected() {
        assert_eq!(
            parse_src("EMIT hello"),
            Err(CompileError::ReservedKeyword {
                position: 0,
                keyword: "EMIT"
            })
        );
        assert_eq!(
            parse_src("WHEN x >= 1 THEN STORE x = SENDER"),
            Err(CompileError::ReservedKeyword {
                position: 8,
                keyword: "SENDER"
            })
        );
    }
}
