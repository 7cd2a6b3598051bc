//! Whitespace-delimited tokenizer for contract source.

use crate::compiler::errors::CompileError;
use std::fmt;

macro_rules! keywords {
    ($( $name:ident => $text:literal ),* $(,)?) => {
        /// Reserved words of the contract language (upper case only).
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $( $name, )*
        }

        impl Keyword {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( Keyword::$name => $text, )*
                }
            }

            pub fn lookup(word: &str) -> Option<Keyword> {
                match word {
                    $( $text => Some(Keyword::$name), )*
                    _ => None,
                }
            }
        }
    };
}

keywords! {
    When => "WHEN",
    Then => "THEN",
    Store => "STORE",
    Set => "SET",
    Load => "LOAD",
    Emit => "EMIT",
    Balance => "BALANCE",
    Sender => "SENDER",
    Txvalue => "TXVALUE",
    Time => "TIME",
    Blocknum => "BLOCKNUM",
    If => "IF",
    Else => "ELSE",
    For => "FOR",
    Func => "FUNC",
    Return => "RETURN",
    Assert => "ASSERT",
    Call => "CALL",
    Let => "LET",
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    Keyword(Keyword),
    /// `>=`
    Gte,
    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    Number(i64),
    Identifier(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(k) => f.write_str(k.as_str()),
            Token::Gte => f.write_str(">="),
            Token::Assign => f.write_str("="),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Number(n) => write!(f, "{}", n),
            Token::Identifier(s) => f.write_str(s),
        }
    }
}

/// Splits `source` on whitespace and classifies each word.
///
/// Pure function of its input: tokenizing the same source twice yields the
/// same sequence.
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    source
        .split_whitespace()
        .enumerate()
        .map(|(position, word)| classify(position, word))
        .collect()
}

fn classify(position: usize, word: &str) -> Result<Token, CompileError> {
    if let Some(k) = Keyword::lookup(word) {
        return Ok(Token::Keyword(k));
    }
    let token = match word {
        ">=" => Token::Gte,
        "=" => Token::Assign,
        "+" => Token::Plus,
        "-" => Token::Minus,
        _ if word.bytes().all(|b| b.is_ascii_digit()) => {
            let n = word.parse().map_err(|_| CompileError::NumberOutOfRange {
                position,
                literal: word.to_string(),
            })?;
            Token::Number(n)
        }
        _ => Token::Identifier(word.to_string()),
    };
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_token_kind() {
        let toks = tokenize("WHEN x >= 10 THEN STORE y = + y 1 - LET").unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Keyword(Keyword::When),
                Token::Identifier("x".into()),
                Token::Gte,
                Token::Number(10),
                Token::Keyword(Keyword::Then),
                Token::Keyword(Keyword::Store),
                Token::Identifier("y".into()),
                Token::Assign,
                Token::Plus,
                Token::Identifier("y".into()),
                Token::Number(1),
                Token::Minus,
                Token::Keyword(Keyword::Let),
            ]
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            tokenize("balance BALANCE").unwrap(),
            vec![
                Token::Identifier("balance".into()),
                Token::Keyword(Keyword::Balance)
            ]
        );
    }

    #[test]
    fn mixed_words_are_identifiers() {
        assert_eq!(
            tokenize("10a -5 >").unwrap(),
            vec![
                Token::Identifier("10a".into()),
                Token::Identifier("-5".into()),
                Token::Identifier(">".into()),
            ]
        );
    }

    #[test]
    fn oversized_number_is_an_error() {
        assert_eq!(
            tokenize("STORE x = 99999999999999999999"),
            Err(CompileError::NumberOutOfRange {
                position: 3,
                literal: "99999999999999999999".into()
            })
        );
    }

    #[test]
    fn every_keyword_round_trips() {
        for word in [
            "WHEN", "THEN", "STORE", "SET", "LOAD", "EMIT", "BALANCE", "SENDER", "TXVALUE",
            "TIME", "BLOCKNUM", "IF", "ELSE", "FOR", "FUNC", "RETURN", "ASSERT", "CALL", "LET",
        ] {
            let k = Keyword::lookup(word).unwrap();
            assert_eq!(k.as_str(), word);
        }
    }

    #[test]
    fn empty_and_blank_sources_have_no_tokens() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize(" \n\t ").unwrap().is_empty());
    }
}
