//! Key filters
//!
//! Operators restrict runs with small expressions such as `p > 100` or
//! `p % 2 = 1 AND NOT p BETWEEN 200 AND 300`. The text is parsed with
//! `sqlparser` into a closed expression tree and evaluated against each
//! key; nothing is ever executed as code.
//!
//! ## Grammar (SQL expression subset)
//!
//! - identifiers `p`, `k`, `key` (all name the key)
//! - integer literals, `+ - * / %`, unary minus, parentheses
//! - comparisons `> >= < <= = == != <>`, `BETWEEN`
//! - `AND`, `OR`, `NOT`
//!
//! Arithmetic that overflows or divides by zero makes the comparison
//! unknown, and an unknown result never matches.

use std::fmt;
use std::str::FromStr;

use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::key::KeyDomain;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Key,
    Const(i128),
    Neg(Box<Term>),
    Arith(Box<Term>, ArithOp, Box<Term>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Compare(Term, CmpOp, Term),
    Between {
        term: Term,
        low: Term,
        high: Term,
        negated: bool,
    },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

impl Term {
    fn eval(&self, key: i128) -> Option<i128> {
        match self {
            Self::Key => Some(key),
            Self::Const(c) => Some(*c),
            Self::Neg(t) => t.eval(key)?.checked_neg(),
            Self::Arith(l, op, r) => {
                let (l, r) = (l.eval(key)?, r.eval(key)?);
                match op {
                    ArithOp::Add => l.checked_add(r),
                    ArithOp::Sub => l.checked_sub(r),
                    ArithOp::Mul => l.checked_mul(r),
                    ArithOp::Div => l.checked_div(r),
                    ArithOp::Rem => l.checked_rem(r),
                }
            }
        }
    }
}

impl Node {
    fn eval(&self, key: i128) -> Option<bool> {
        match self {
            Self::Compare(l, op, r) => {
                let (l, r) = (l.eval(key)?, r.eval(key)?);
                Some(match op {
                    CmpOp::Gt => l > r,
                    CmpOp::Ge => l >= r,
                    CmpOp::Lt => l < r,
                    CmpOp::Le => l <= r,
                    CmpOp::Eq => l == r,
                    CmpOp::Ne => l != r,
                })
            }
            Self::Between {
                term,
                low,
                high,
                negated,
            } => {
                let v = term.eval(key)?;
                let inside = low.eval(key)? <= v && v <= high.eval(key)?;
                Some(inside != *negated)
            }
            Self::And(l, r) => match (l.eval(key), r.eval(key)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Self::Or(l, r) => match (l.eval(key), r.eval(key)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Self::Not(n) => n.eval(key).map(|b| !b),
        }
    }
}

/// A parsed key filter expression.
///
/// # Example
///
/// ```rust
/// use vdw_crunch::predicate::KeyPredicate;
///
/// # fn main() -> vdw_crunch::Result<()> {
/// let pred = KeyPredicate::parse("p > 100 AND p % 2 = 1")?;
/// assert!(pred.matches(101));
/// assert!(!pred.matches(102));
/// assert!(!pred.matches(99));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPredicate {
    source: String,
    root: Node,
}

impl KeyPredicate {
    /// Parse a filter expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] if the text is not a valid expression
    /// or uses anything outside the supported subset.
    pub fn parse(source: &str) -> Result<Self> {
        let dialect = GenericDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(source)
            .map_err(|e| Error::ParseError(format!("'{source}': {e}")))?;
        let expr = parser
            .parse_expr()
            .map_err(|e| Error::ParseError(format!("'{source}': {e}")))?;

        let trailing = parser.peek_token().token;
        if trailing != Token::EOF {
            return Err(Error::ParseError(format!(
                "'{source}': unexpected '{trailing}' after expression"
            )));
        }

        Ok(Self {
            source: source.trim().to_string(),
            root: Self::node(&expr)?,
        })
    }

    /// Whether `key` satisfies the expression.
    #[must_use]
    pub fn matches(&self, key: u64) -> bool {
        self.root.eval(i128::from(key)) == Some(true)
    }

    /// The expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    fn node(expr: &Expr) -> Result<Node> {
        match expr {
            Expr::Nested(inner) => Self::node(inner),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(Node::Not(Box::new(Self::node(expr)?))),
            Expr::BinaryOp { left, op, right } => {
                let cmp = match op {
                    BinaryOperator::And => {
                        return Ok(Node::And(
                            Box::new(Self::node(left)?),
                            Box::new(Self::node(right)?),
                        ))
                    }
                    BinaryOperator::Or => {
                        return Ok(Node::Or(
                            Box::new(Self::node(left)?),
                            Box::new(Self::node(right)?),
                        ))
                    }
                    BinaryOperator::Gt => CmpOp::Gt,
                    BinaryOperator::GtEq => CmpOp::Ge,
                    BinaryOperator::Lt => CmpOp::Lt,
                    BinaryOperator::LtEq => CmpOp::Le,
                    BinaryOperator::Eq => CmpOp::Eq,
                    BinaryOperator::NotEq => CmpOp::Ne,
                    other => {
                        return Err(Error::ParseError(format!(
                            "expected a comparison, found operator '{other}'"
                        )))
                    }
                };
                Ok(Node::Compare(Self::term(left)?, cmp, Self::term(right)?))
            }
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(Node::Between {
                term: Self::term(expr)?,
                low: Self::term(low)?,
                high: Self::term(high)?,
                negated: *negated,
            }),
            other => Err(Error::ParseError(format!(
                "expected a comparison, found '{other}'"
            ))),
        }
    }

    fn term(expr: &Expr) -> Result<Term> {
        match expr {
            Expr::Nested(inner) => Self::term(inner),
            Expr::Identifier(ident) => match ident.value.to_ascii_lowercase().as_str() {
                "p" | "k" | "key" => Ok(Term::Key),
                other => Err(Error::ParseError(format!(
                    "unknown variable '{other}' (use p, k or key)"
                ))),
            },
            Expr::Value(Value::Number(n, _)) => n
                .parse::<i128>()
                .map(Term::Const)
                .map_err(|_| Error::ParseError(format!("'{n}' is not an integer"))),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => Ok(Term::Neg(Box::new(Self::term(expr)?))),
            Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr,
            } => Self::term(expr),
            Expr::BinaryOp { left, op, right } => {
                let op = match op {
                    BinaryOperator::Plus => ArithOp::Add,
                    BinaryOperator::Minus => ArithOp::Sub,
                    BinaryOperator::Multiply => ArithOp::Mul,
                    BinaryOperator::Divide => ArithOp::Div,
                    BinaryOperator::Modulo => ArithOp::Rem,
                    other => {
                        return Err(Error::ParseError(format!(
                            "expected arithmetic, found operator '{other}'"
                        )))
                    }
                };
                Ok(Term::Arith(
                    Box::new(Self::term(left)?),
                    op,
                    Box::new(Self::term(right)?),
                ))
            }
            other => Err(Error::ParseError(format!(
                "expected a number or key, found '{other}'"
            ))),
        }
    }
}

impl FromStr for KeyPredicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Which keys a run or analysis covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    predicate: Option<KeyPredicate>,
    vdw_only: bool,
}

impl KeyFilter {
    /// Every key.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Also require the key to satisfy `predicate`.
    #[must_use]
    pub fn with_predicate(mut self, predicate: KeyPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Only keep genuine Van der Waerden keys.
    #[must_use]
    pub const fn vdw_only(mut self, vdw_only: bool) -> Self {
        self.vdw_only = vdw_only;
        self
    }

    /// Whether `key` passes the filter.
    #[must_use]
    pub fn matches(&self, domain: KeyDomain, key: u64) -> bool {
        (!self.vdw_only || domain.is_vdw_key(key))
            && self.predicate.as_ref().map_or(true, |p| p.matches(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_matching(src: &str, range: std::ops::Range<u64>) -> Vec<u64> {
        let pred = KeyPredicate::parse(src).unwrap();
        range.filter(|k| pred.matches(*k)).collect()
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(keys_matching("p>100", 98..103), vec![101, 102]);
        assert_eq!(keys_matching("p <= 3", 0..10), vec![0, 1, 2, 3]);
        assert_eq!(keys_matching("k = 5", 0..10), vec![5]);
        assert_eq!(keys_matching("p == 13", 10..20), vec![13]);
        assert_eq!(keys_matching("key != 5", 4..7), vec![4, 6]);
        assert_eq!(keys_matching("p <> 5", 4..7), vec![4, 6]);
    }

    #[test]
    fn test_boolean_connectives() {
        assert_eq!(keys_matching("p > 2 AND p < 6", 0..10), vec![3, 4, 5]);
        assert_eq!(keys_matching("p < 2 or p > 8", 0..10), vec![0, 1, 9]);
        assert_eq!(keys_matching("NOT p > 2", 0..5), vec![0, 1, 2]);
        assert_eq!(keys_matching("(p < 2 OR p > 7) AND p % 2 = 1", 0..10), vec![1, 9]);
    }

    #[test]
    fn test_between_and_arithmetic() {
        assert_eq!(keys_matching("p BETWEEN 3 AND 5", 0..10), vec![3, 4, 5]);
        assert_eq!(keys_matching("p NOT BETWEEN 1 AND 8", 0..10), vec![0, 9]);
        assert_eq!(keys_matching("p * 2 + 1 = 7", 0..10), vec![3]);
        assert_eq!(keys_matching("-p < -7", 0..10), vec![8, 9]);
    }

    #[test]
    fn test_division_by_zero_never_matches() {
        assert!(keys_matching("p / 0 = 1", 0..10).is_empty());
        assert!(keys_matching("NOT p % 0 = 1", 0..10).is_empty());
    }

    #[test]
    fn test_rejects_code_and_unknowns() {
        for src in [
            "__import__('os').system('ls')",
            "q > 3",
            "p",
            "p > 3; DROP TABLE keys",
            "p > 3 p",
            "p > 'abc'",
            "p > 1.5",
            "p LIKE '1%'",
            "",
        ] {
            assert!(KeyPredicate::parse(src).is_err(), "accepted {src:?}");
        }
    }

    #[test]
    fn test_display_keeps_source() {
        let pred: KeyPredicate = " p > 100 ".parse().unwrap();
        assert_eq!(pred.to_string(), "p > 100");
    }

    #[test]
    fn test_key_filter() {
        let filter = KeyFilter::all()
            .vdw_only(true)
            .with_predicate(KeyPredicate::parse("p > 3").unwrap());

        let kept: Vec<u64> = (0..40)
            .filter(|k| filter.matches(KeyDomain::Pattern, *k))
            .collect();
        assert_eq!(kept, vec![7, 15, 31]);
        assert!(KeyFilter::all().matches(KeyDomain::Pattern, 6));
    }
}
