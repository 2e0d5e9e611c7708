//! Matcher expression parsing.
//!
//! # Purpose
//! Turns a PERM matcher string such as
//! `g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act` into a tagged AST
//! that [`crate::matcher`] evaluates per candidate rule.
//!
//! # Grammar
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := cmp ( "&&" cmp )*
//! cmp     := unary ( ("==" | "!=") unary )?
//! unary   := "!" unary | primary
//! primary := STRING | "true" | "false" | VAR | CALL | "(" expr ")"
//! VAR     := ("r" | "p") "." IDENT
//! CALL    := IDENT "(" ( expr ( "," expr )* )? ")"
//! ```
use crate::{AuthzError, AuthzResult};

/// Which definition a variable is bound from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Request,
    Policy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Str(String),
    Bool(bool),
    Var { scope: Scope, field: String },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Parse a matcher expression.
    pub fn parse(source: &str) -> AuthzResult<Expr> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(AuthzError::parse(format!(
                "unexpected {token:?} in matcher"
            )));
        }
        Ok(expr)
    }

    /// Visit every node depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Str(_) | Expr::Bool(_) | Expr::Var { .. } => {}
            Expr::Not(inner) => inner.walk(visit),
            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) | Expr::Eq(lhs, rhs) | Expr::Ne(lhs, rhs) => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Bang,
}

fn tokenize(source: &str) -> AuthzResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '&' | '|' | '=' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(AuthzError::parse(format!(
                        "expected '{c}{c}' at offset {i}"
                    )));
                }
                tokens.push(match c {
                    '&' => Token::AndAnd,
                    '|' => Token::OrOr,
                    _ => Token::EqEq,
                });
                i += 2;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end == chars.len() {
                    return Err(AuthzError::parse(format!(
                        "unterminated string starting at offset {i}"
                    )));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(AuthzError::parse(format!(
                    "unexpected character '{other}' at offset {i}"
                )));
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

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> AuthzResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(AuthzError::parse(format!(
                "expected {expected:?}, found {token:?}"
            ))),
            None => Err(AuthzError::parse(format!(
                "expected {expected:?}, found end of matcher"
            ))),
        }
    }

    fn parse_or(&mut self) -> AuthzResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> AuthzResult<Expr> {
        let mut lhs = self.parse_cmp()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.parse_cmp()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> AuthzResult<Expr> {
        let lhs = self.parse_unary()?;
        if self.eat(&Token::EqEq) {
            let rhs = self.parse_unary()?;
            return Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)));
        }
        if self.eat(&Token::NotEq) {
            let rhs = self.parse_unary()?;
            return Ok(Expr::Ne(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> AuthzResult<Expr> {
        if self.eat(&Token::Bang) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> AuthzResult<Expr> {
        match self.next() {
            Some(Token::Str(value)) => Ok(Expr::Str(value)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    return self.parse_call(name);
                }
                match name.as_str() {
                    "true" => return Ok(Expr::Bool(true)),
                    "false" => return Ok(Expr::Bool(false)),
                    _ => {}
                }
                let (scope, field) = name.split_once('.').ok_or_else(|| {
                    AuthzError::parse(format!("unknown identifier '{name}' in matcher"))
                })?;
                let scope = match scope {
                    "r" => Scope::Request,
                    "p" => Scope::Policy,
                    other => {
                        return Err(AuthzError::parse(format!(
                            "unknown variable scope '{other}' in '{name}'"
                        )));
                    }
                };
                if field.is_empty() || field.contains('.') {
                    return Err(AuthzError::parse(format!("invalid variable '{name}'")));
                }
                Ok(Expr::Var {
                    scope,
                    field: field.to_string(),
                })
            }
            Some(token) => Err(AuthzError::parse(format!(
                "unexpected {token:?} in matcher"
            ))),
            None => Err(AuthzError::parse("unexpected end of matcher")),
        }
    }

    fn parse_call(&mut self, name: String) -> AuthzResult<Expr> {
        if name.contains('.') {
            return Err(AuthzError::parse(format!("invalid function name '{name}'")));
        }
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok(Expr::Call { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(scope: Scope, field: &str) -> Box<Expr> {
        Box::new(Expr::Var {
            scope,
            field: field.to_string(),
        })
    }

    #[test]
    fn parses_default_matcher() {
        let expr = Expr::parse("g(r.sub, p.sub) && g2(r.obj, p.obj) && r.act == p.act")
            .expect("parse");
        let Expr::And(lhs, rhs) = expr else {
            panic!("expected top-level and");
        };
        assert!(matches!(*lhs, Expr::And(_, _)));
        assert_eq!(
            *rhs,
            Expr::Eq(var(Scope::Request, "act"), var(Scope::Policy, "act"))
        );
    }

    #[test]
    fn or_binds_looser_than_and() {
        let expr = Expr::parse("r.a == p.a || r.b == p.b && r.c == p.c").expect("parse");
        let Expr::Or(_, rhs) = expr else {
            panic!("expected top-level or");
        };
        assert!(matches!(*rhs, Expr::And(_, _)));
    }

    #[test]
    fn parses_literals_negation_and_parens() {
        let expr = Expr::parse("!(r.sub == 'root') && true != false").expect("parse");
        let Expr::And(lhs, rhs) = expr else {
            panic!("expected and");
        };
        assert!(matches!(*lhs, Expr::Not(_)));
        assert_eq!(
            *rhs,
            Expr::Ne(Box::new(Expr::Bool(true)), Box::new(Expr::Bool(false)))
        );
    }

    #[test]
    fn parses_double_quoted_strings_in_calls() {
        let expr = Expr::parse("g(r.sub, \"super_admin\", \"*\")").expect("parse");
        let Expr::Call { name, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(name, "g");
        assert_eq!(args.len(), 3);
        assert_eq!(args[2], Expr::Str("*".to_string()));
    }

    #[test]
    fn rejects_malformed_matchers() {
        for source in [
            "",
            "r.sub ==",
            "r.sub = p.sub",
            "r.sub & p.sub",
            "(r.sub == p.sub",
            "r.sub == 'open",
            "x.sub == p.sub",
            "sub == p.sub",
            "r.sub == p.sub p.obj",
            "r.sub == 42",
            "g(r.sub,",
        ] {
            assert!(Expr::parse(source).is_err(), "accepted {source:?}");
        }
    }

    #[test]
    fn walk_visits_every_node() {
        let expr = Expr::parse("keyMatch2(r.obj, p.obj) && !(r.act == p.act)").expect("parse");
        let mut vars = 0;
        let mut calls = 0;
        expr.walk(&mut |node| match node {
            Expr::Var { .. } => vars += 1,
            Expr::Call { .. } => calls += 1,
            _ => {}
        });
        assert_eq!(vars, 4);
        assert_eq!(calls, 1);
    }
}
