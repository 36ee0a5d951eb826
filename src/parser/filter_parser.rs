//! SCIM filter expression parser.
//!
//! Grammar: `expr := term ("or" term)*; term := factor ("and" factor)*;
//! factor := "(" expr ")" | path op value?`. Without parentheses `and`
//! binds tighter than `or`. String literals are double-quoted with `\"`
//! and `\\` escapes.

use crate::error::{ScimError, ScimResult};
use crate::model::query::AttributePath;
use crate::parser::filter_operator::{FilterOp, ScimFilter};

/// Nesting bound; deeper expressions are rejected rather than recursed.
const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Word(String),
    StringLiteral(String),
}

/// Parse a SCIM filter string into an expression tree.
pub fn parse_filter(input: &str) -> ScimResult<ScimFilter> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ScimError::InvalidFilter("empty filter".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let filter = parser.parse_expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(ScimError::InvalidFilter(format!(
            "unexpected trailing input in filter: {}",
            input
        )));
    }
    Ok(filter)
}

fn tokenize(input: &str) -> ScimResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\\') => match chars.get(i + 1) {
                            Some('"') => {
                                literal.push('"');
                                i += 2;
                            }
                            Some('\\') => {
                                literal.push('\\');
                                i += 2;
                            }
                            _ => {
                                return Err(ScimError::InvalidFilter(
                                    "invalid escape in string literal".to_string(),
                                ))
                            }
                        },
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            literal.push(*c);
                            i += 1;
                        }
                        None => {
                            return Err(ScimError::InvalidFilter(
                                "unterminated string literal".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(Token::StringLiteral(literal));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.get(i) {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                        break;
                    }
                    word.push(c);
                    i += 1;
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse_expr(&mut self, depth: usize) -> ScimResult<ScimFilter> {
        let mut terms = vec![self.parse_term(depth)?];
        while self.peek_keyword("or") {
            self.pos += 1;
            terms.push(self.parse_term(depth)?);
        }
        Ok(collapse(terms, false))
    }

    fn parse_term(&mut self, depth: usize) -> ScimResult<ScimFilter> {
        let mut factors = vec![self.parse_factor(depth)?];
        while self.peek_keyword("and") {
            self.pos += 1;
            factors.push(self.parse_factor(depth)?);
        }
        Ok(collapse(factors, true))
    }

    fn parse_factor(&mut self, depth: usize) -> ScimResult<ScimFilter> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(ScimError::InvalidFilter(
                "filter expression nested too deeply".to_string(),
            ));
        }
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr(depth + 1)?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(ScimError::InvalidFilter(
                        "unbalanced parentheses in filter".to_string(),
                    )),
                }
            }
            Some(Token::Word(_)) => self.parse_leaf(),
            _ => Err(ScimError::InvalidFilter(
                "expected attribute path or '('".to_string(),
            )),
        }
    }

    fn parse_leaf(&mut self) -> ScimResult<ScimFilter> {
        let path = match self.next() {
            Some(Token::Word(word)) => AttributePath::parse(&word),
            _ => {
                return Err(ScimError::InvalidFilter(
                    "expected attribute path".to_string(),
                ))
            }
        };

        let op = match self.next() {
            Some(Token::Word(word)) => FilterOp::parse(&word).ok_or_else(|| {
                ScimError::InvalidFilter(format!("unknown filter operator '{}'", word))
            })?,
            _ => {
                return Err(ScimError::InvalidFilter(
                    "expected filter operator".to_string(),
                ))
            }
        };

        let value = if op.takes_value() {
            match self.next() {
                Some(Token::StringLiteral(literal)) => Some(literal),
                Some(Token::Word(word)) => Some(word),
                _ => {
                    return Err(ScimError::InvalidFilter(
                        "expected comparison value".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        Ok(ScimFilter::compare(path, op, value))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword))
    }
}

fn collapse(mut children: Vec<ScimFilter>, conjunction: bool) -> ScimFilter {
    if children.len() == 1 {
        children.remove(0)
    } else if conjunction {
        ScimFilter::And(children)
    } else {
        ScimFilter::Or(children)
    }
}
