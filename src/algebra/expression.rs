//! Arithmetic expressions for user templates and the synthetic oracle.
//!
//! Grammar (usual precedence, `^` right-associative):
//!
//! ```text
//! terms  := expr ("," expr)*
//! expr   := term (("+" | "-") term)*
//! term   := unary (("*" | "/") unary)*
//! unary  := "-" unary | power
//! power  := atom ("^" unary)?
//! atom   := number | ident | ("ceil" | "sqrt") "(" expr ")" | "(" expr ")"
//! ```

use logos::Logos;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use std::collections::BTreeSet;
use std::fmt;

use crate::models::{parse_decimal, ExpressionFormat, PacError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
            Self::Pow => 4,
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Decimal),
    Ident(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ceil(Box<Expr>),
    Sqrt(Box<Expr>),
}

const NEG_PRECEDENCE: u8 = 3;
const ATOM_PRECEDENCE: u8 = 5;

impl Expr {
    /// Parse a single expression.
    pub fn parse(source: &str) -> Result<Expr> {
        let mut parser = Parser::new(source)?;
        let expr = parser.expr()?;
        parser.finish()?;
        Ok(expr)
    }

    /// Parse a comma-separated list of expressions.
    pub fn parse_terms(source: &str) -> Result<Vec<Expr>> {
        let mut parser = Parser::new(source)?;
        let mut terms = vec![parser.expr()?];
        while parser.eat(&Token::Comma) {
            terms.push(parser.expr()?);
        }
        parser.finish()?;
        Ok(terms)
    }

    /// Every identifier the expression refers to.
    pub fn identifiers(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Ident(name) => {
                out.insert(name.as_str());
            }
            Expr::Neg(inner) | Expr::Ceil(inner) | Expr::Sqrt(inner) => {
                inner.collect_identifiers(out)
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_identifiers(out);
                rhs.collect_identifiers(out);
            }
        }
    }

    /// Evaluate, resolving identifiers through `lookup`.
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Option<Decimal>) -> Result<Decimal> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Ident(name) => {
                lookup(name).ok_or_else(|| PacError::UndefinedIdentifier(name.clone()))
            }
            Expr::Neg(inner) => Ok(-inner.evaluate(lookup)?),
            Expr::Ceil(inner) => Ok(inner.evaluate(lookup)?.ceil()),
            Expr::Sqrt(inner) => {
                let value = inner.evaluate(lookup)?;
                value.sqrt().ok_or_else(|| {
                    PacError::Arithmetic(format!("square root of negative value {value}"))
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.evaluate(lookup)?;
                let b = rhs.evaluate(lookup)?;
                apply(*op, a, b)
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Neg(_) => NEG_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }

    /// Whether the top-level operation binds looser than multiplication.
    pub fn is_additive(&self) -> bool {
        self.precedence() < BinaryOp::Mul.precedence()
    }

    /// Pretty-print in the requested syntax, with minimal parentheses.
    pub fn render(&self, format: ExpressionFormat) -> String {
        match self {
            Expr::Number(value) => value.normalize().to_string(),
            Expr::Ident(name) => match format {
                ExpressionFormat::Latex => format!("\\mathit{{{name}}}"),
                _ => name.clone(),
            },
            Expr::Neg(inner) => format!("-{}", inner.render_child(format, NEG_PRECEDENCE, true)),
            Expr::Ceil(inner) => {
                let inner = inner.render(format);
                match format {
                    ExpressionFormat::Latex => format!("\\lceil {inner} \\rceil"),
                    ExpressionFormat::Math => format!("⌈{inner}⌉"),
                    ExpressionFormat::Matlab => format!("ceil({inner})"),
                }
            }
            Expr::Sqrt(inner) => match format {
                ExpressionFormat::Latex => format!("\\sqrt{{{}}}", inner.render(format)),
                ExpressionFormat::Math => format!("sqrt({})", inner.render(format)),
                ExpressionFormat::Matlab => format!("({}).^0.5", inner.render(format)),
            },
            Expr::Binary { op, lhs, rhs } => {
                if format == ExpressionFormat::Latex && *op == BinaryOp::Div {
                    return format!(
                        "\\frac{{{}}}{{{}}}",
                        lhs.render(format),
                        rhs.render(format)
                    );
                }
                let prec = op.precedence();
                // `^` is right-associative, the others left-associative.
                let (left_strict, right_strict) = match op {
                    BinaryOp::Pow => (true, false),
                    BinaryOp::Sub | BinaryOp::Div => (false, true),
                    BinaryOp::Add | BinaryOp::Mul => (false, false),
                };
                let left = lhs.render_child(format, prec, left_strict);
                let right = rhs.render_child(format, prec, right_strict);
                match (format, op) {
                    (_, BinaryOp::Add) => format!("{left} + {right}"),
                    (_, BinaryOp::Sub) => format!("{left} - {right}"),
                    (ExpressionFormat::Latex, BinaryOp::Mul) => format!("{left} \\cdot {right}"),
                    (ExpressionFormat::Matlab, BinaryOp::Mul) => format!("{left} .* {right}"),
                    (_, BinaryOp::Mul) => format!("{left} * {right}"),
                    (ExpressionFormat::Matlab, BinaryOp::Div) => format!("{left} ./ {right}"),
                    (_, BinaryOp::Div) => format!("{left} / {right}"),
                    (ExpressionFormat::Latex, BinaryOp::Pow) => format!("{left}^{{{right}}}"),
                    (ExpressionFormat::Matlab, BinaryOp::Pow) => format!("{left} .^ {right}"),
                    (ExpressionFormat::Math, BinaryOp::Pow) => format!("{left}^{right}"),
                }
            }
        }
    }

    fn render_child(&self, format: ExpressionFormat, parent: u8, strict: bool) -> String {
        let own = self.precedence();
        let needs_parens = own < parent || (strict && own == parent);
        let text = self.render(format);
        if !needs_parens {
            return text;
        }
        match format {
            ExpressionFormat::Latex => format!("\\left({text}\\right)"),
            _ => format!("({text})"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(ExpressionFormat::Math))
    }
}

fn apply(op: BinaryOp, a: Decimal, b: Decimal) -> Result<Decimal> {
    let overflow = || PacError::Arithmetic(format!("overflow in {a} {op:?} {b}"));
    match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        BinaryOp::Div => {
            if b.is_zero() {
                return Err(PacError::Arithmetic(format!("division of {a} by zero")));
            }
            a.checked_div(b).ok_or_else(overflow)
        }
        BinaryOp::Pow => {
            if b.fract().is_zero() {
                let exp = b
                    .to_i64()
                    .ok_or_else(|| PacError::Arithmetic(format!("exponent {b} out of range")))?;
                if exp < 0 && a.is_zero() {
                    return Err(PacError::Arithmetic(format!("0 raised to {exp}")));
                }
                a.checked_powi(exp).ok_or_else(overflow)
            } else {
                if a.is_sign_negative() {
                    return Err(PacError::Arithmetic(format!(
                        "negative base {a} with fractional exponent {b}"
                    )));
                }
                a.checked_powd(b).ok_or_else(overflow)
            }
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Token {
    /// Decimal literal with optional exponent
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| parse_decimal(lex.slice()).ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| parse_decimal(lex.slice()).ok())]
    Number(Decimal),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        let token = token.map_err(|()| {
            PacError::Template(format!(
                "unexpected '{}' at offset {}",
                lexer.slice(),
                lexer.span().start
            ))
        })?;
        tokens.push(token);
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{token:?}")))
        }
    }

    fn unexpected(&self, wanted: &str) -> PacError {
        match self.peek() {
            Some(found) => PacError::Template(format!(
                "expected {wanted}, found {found:?} at token {}",
                self.pos
            )),
            None => PacError::Template(format!("expected {wanted}, found end of input")),
        }
    }

    fn finish(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("end of input")),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if self.eat(&Token::Caret) {
            let exponent = self.unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Ident(name));
                }
                let wrap: fn(Box<Expr>) -> Expr = match name.as_str() {
                    "ceil" => Expr::Ceil,
                    "sqrt" => Expr::Sqrt,
                    other => {
                        return Err(PacError::Template(format!("unknown function '{other}'")))
                    }
                };
                self.expect(&Token::LParen)?;
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(wrap(Box::new(inner)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            _ => Err(self.unexpected("a number, identifier or '('")),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eval(source: &str, p: Decimal) -> Result<Decimal> {
        Expr::parse(source)?.evaluate(&|name| match name {
            "p" => Some(p),
            "N" => Some(dec!(4)),
            _ => None,
        })
    }

    #[test]
    fn respects_precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", dec!(0)).unwrap(), dec!(7));
        assert_eq!(eval("(1 + 2) * 3", dec!(0)).unwrap(), dec!(9));
        assert_eq!(eval("8 - 3 - 2", dec!(0)).unwrap(), dec!(3));
        assert_eq!(eval("2 ^ 3 ^ 2", dec!(0)).unwrap(), dec!(512));
        assert_eq!(eval("-p^2", dec!(3)).unwrap(), dec!(-9));
    }

    #[test]
    fn resolves_parameters_and_constants() {
        assert_eq!(eval("N * p", dec!(0.25)).unwrap(), dec!(1));
        assert_eq!(eval("ceil(N * p + 0.1)", dec!(0.25)).unwrap(), dec!(2));
        let root = eval("sqrt(N)", dec!(0)).unwrap();
        assert!((root - dec!(2)).abs() < dec!(0.000000001));
    }

    #[test]
    fn undefined_identifier_is_fatal() {
        let err = eval("q + 1", dec!(0)).unwrap_err();
        assert!(matches!(err, PacError::UndefinedIdentifier(name) if name == "q"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Expr::parse("1 +").is_err());
        assert!(Expr::parse("(p").is_err());
        assert!(Expr::parse("log(p)").is_err());
        assert!(Expr::parse("p $ 2").is_err());
        assert!(eval("1 / (p - p)", dec!(1)).is_err());
    }

    #[test]
    fn tokenizes_numbers_and_identifiers() {
        assert_eq!(
            tokenize("2.5e-1*p_1 + 0.5").unwrap(),
            vec![
                Token::Number(dec!(0.25)),
                Token::Star,
                Token::Ident("p_1".to_string()),
                Token::Plus,
                Token::Number(dec!(0.5)),
            ]
        );
        let err = tokenize("p $ 2").unwrap_err();
        assert!(matches!(err, PacError::Template(m) if m.contains("'$' at offset 2")));
    }

    #[test]
    fn parses_term_lists() {
        let terms = Expr::parse_terms("1, p, p^2, ceil(N*p)").unwrap();
        assert_eq!(terms.len(), 4);
        assert_eq!(terms[3].identifiers().into_iter().collect::<Vec<_>>(), vec!["N", "p"]);
    }

    #[test]
    fn renders_with_minimal_parentheses() {
        let e = Expr::parse("(p + 1) * (p - (N - 1)) / 2").unwrap();
        assert_eq!(e.render(ExpressionFormat::Math), "(p + 1) * (p - (N - 1)) / 2");
        assert_eq!(
            Expr::parse("ceil(p) + sqrt(N)").unwrap().render(ExpressionFormat::Latex),
            "\\lceil \\mathit{p} \\rceil + \\sqrt{\\mathit{N}}"
        );
        assert_eq!(
            Expr::parse("p^2 * sqrt(p)").unwrap().render(ExpressionFormat::Matlab),
            "p .^ 2 .* (p).^0.5"
        );
    }
}
