//! Recursive-descent parser producing the condition AST.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and (("or" | "||") and)*
//! and        := not (("and" | "&&") not)*
//! not        := ("not" | "!") not | comparison
//! comparison := additive (cmp_op additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "%") unary)*
//! unary      := "-" unary | postfix
//! postfix    := primary ("." ident | "[" or "]")*
//! primary    := number | string | bool | null | name | "(" or ")" | "[" list "]"
//! ```
//!
//! Only the names `args`, `resource` and `action` resolve. There are no
//! calls, assignments or attribute lookups outside the intent data.

use crate::condition::lexer::{tokenize, Token, TokenKind};
use crate::condition::ConditionError;
use serde_json::Value;

/// Hard limit on nesting so hostile input cannot exhaust the stack.
pub const MAX_DEPTH: usize = 64;

/// The variables a condition may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Name {
    Args,
    Resource,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(Name),
    /// `base.field`
    Member(Box<Expr>, String),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Logic(LogicOp, Box<Expr>, Box<Expr>),
    /// A comparison chain: `a < b <= c` holds when every link holds.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

/// Parse a condition string into an expression tree.
pub fn parse(source: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
    };
    if parser.tokens.is_empty() {
        return Err(ConditionError::syntax(0, "empty expression"));
    }
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ConditionError::syntax(
            token.offset,
            format!("unexpected token {:?}", token.kind),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Offset reported for errors at end of input.
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(s)) if s == keyword)
    }

    fn peek_keyword_at(&self, ahead: usize, keyword: &str) -> bool {
        matches!(
            self.tokens.get(self.pos + ahead).map(|t| &t.kind),
            Some(TokenKind::Ident(s)) if s == keyword
        )
    }

    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ConditionError> {
        match self.peek_kind() {
            Some(k) if *k == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ConditionError::syntax(
                self.offset(),
                format!("expected {}", what),
            )),
        }
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Unwind the levels a left-associative loop entered, one per node it built.
    fn leave_chain(&mut self, links: usize) {
        self.depth -= links;
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        self.enter()?;
        let mut left = self.parse_and()?;
        let mut links = 0;
        while self.peek_keyword("or") || self.peek_kind() == Some(&TokenKind::OrOr) {
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_and()?;
            left = Expr::Logic(LogicOp::Or, Box::new(left), Box::new(right));
        }
        self.leave_chain(links);
        self.leave();
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_not()?;
        let mut links = 0;
        while self.peek_keyword("and") || self.peek_kind() == Some(&TokenKind::AndAnd) {
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_not()?;
            left = Expr::Logic(LogicOp::And, Box::new(left), Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek_keyword("not") || self.peek_kind() == Some(&TokenKind::Bang) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_not()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let first = self.parse_additive()?;
        let mut links = Vec::new();

        loop {
            if self.peek_keyword("not") && self.peek_keyword_at(1, "in") {
                self.pos += 2;
                links.push((CmpOp::NotIn, self.parse_additive()?));
                continue;
            }
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => CmpOp::Eq,
                Some(TokenKind::NotEq) => CmpOp::NotEq,
                Some(TokenKind::Lt) => CmpOp::Lt,
                Some(TokenKind::Le) => CmpOp::Le,
                Some(TokenKind::Gt) => CmpOp::Gt,
                Some(TokenKind::Ge) => CmpOp::Ge,
                Some(TokenKind::Ident(s)) if s == "in" => CmpOp::In,
                _ => break,
            };
            self.pos += 1;
            links.push((op, self.parse_additive()?));
        }

        if links.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), links))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_term()?;
        let mut links = 0;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => ArithOp::Add,
                Some(TokenKind::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_term()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => ArithOp::Mul,
                Some(TokenKind::Slash) => ArithOp::Div,
                Some(TokenKind::Percent) => ArithOp::Rem,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        self.leave_chain(links);
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek_kind() == Some(&TokenKind::Minus) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ConditionError> {
        let mut expr = self.parse_primary()?;
        let mut links = 0;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    self.enter()?;
                    links += 1;
                    let offset = self.offset();
                    match self.next().map(|t| t.kind) {
                        Some(TokenKind::Ident(field)) => {
                            expr = Expr::Member(Box::new(expr), field);
                        }
                        _ => {
                            return Err(ConditionError::syntax(
                                offset,
                                "expected a field name after '.'",
                            ))
                        }
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.pos += 1;
                    self.enter()?;
                    links += 1;
                    let index = self.parse_or()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        self.leave_chain(links);
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        let offset = self.offset();
        let token = self
            .next()
            .ok_or_else(|| ConditionError::syntax(offset, "unexpected end of expression"))?;

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Ident(ident) => match ident.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Expr::Literal(Value::Null)),
                "args" => Ok(Expr::Name(Name::Args)),
                "resource" => Ok(Expr::Name(Name::Resource)),
                "action" => Ok(Expr::Name(Name::Action)),
                "and" | "or" | "not" | "in" => Err(ConditionError::syntax(
                    offset,
                    format!("unexpected keyword '{}'", ident),
                )),
                _ => Err(ConditionError::UnknownName(ident)),
            },
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if self.peek_kind() != Some(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_or()?);
                        if self.peek_kind() == Some(&TokenKind::Comma) {
                            self.pos += 1;
                            // Allow a trailing comma.
                            if self.peek_kind() == Some(&TokenKind::RBracket) {
                                break;
                            }
                            continue;
                        }
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            other => Err(ConditionError::syntax(
                token.offset,
                format!("unexpected token {:?}", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse("args.a + 2 * 3 > 10 and not args.b").unwrap();
        match expr {
            Expr::Logic(LogicOp::And, left, right) => {
                assert!(matches!(*left, Expr::Compare(_, ref links) if links.len() == 1));
                assert!(matches!(*right, Expr::Not(_)));
            }
            other => panic!("expected an and-expression, got {:?}", other),
        }
    }

    #[test]
    fn test_comparison_chain() {
        match parse("1 < args.x <= 10").unwrap() {
            Expr::Compare(_, links) => {
                assert_eq!(links.len(), 2);
                assert_eq!(links[0].0, CmpOp::Lt);
                assert_eq!(links[1].0, CmpOp::Le);
            }
            other => panic!("expected a comparison chain, got {:?}", other),
        }
    }

    #[test]
    fn test_not_in() {
        match parse("resource not in ['a', 'b']").unwrap() {
            Expr::Compare(_, links) => assert_eq!(links[0].0, CmpOp::NotIn),
            other => panic!("expected not-in, got {:?}", other),
        }
    }

    #[test]
    fn test_subscript_and_member() {
        let expr = parse("args['user'].roles[0]").unwrap();
        assert!(matches!(expr, Expr::Index(_, _)));
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert_eq!(
            parse("__import__('os')"),
            Err(ConditionError::UnknownName("__import__".into()))
        );
        assert!(matches!(parse("open"), Err(ConditionError::UnknownName(_))));
    }

    #[test]
    fn test_calls_are_not_grammar() {
        // A parenthesis after a name is not a call, it is a trailing token.
        assert!(parse("args.amount(1)").is_err());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("args.amount >").is_err());
        assert!(parse("(args.amount > 1").is_err());
        assert!(parse("args.").is_err());
        assert!(parse("and").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&deep), Err(ConditionError::TooDeep));

        let negations = format!("{}true", "not ".repeat(200));
        assert_eq!(parse(&negations), Err(ConditionError::TooDeep));
    }

    #[test]
    fn test_depth_limit_on_operator_chains() {
        let sum = format!("{} > 0", vec!["1"; 200_000].join(" + "));
        assert_eq!(parse(&sum), Err(ConditionError::TooDeep));

        let product = format!("{} > 0", vec!["args.n"; 500].join(" * "));
        assert_eq!(parse(&product), Err(ConditionError::TooDeep));

        let conjunction = vec!["true"; 500].join(" and ");
        assert_eq!(parse(&conjunction), Err(ConditionError::TooDeep));

        let disjunction = vec!["false"; 500].join(" || ");
        assert_eq!(parse(&disjunction), Err(ConditionError::TooDeep));

        let fields = format!("args{} == 1", ".x".repeat(500));
        assert_eq!(parse(&fields), Err(ConditionError::TooDeep));

        let indexes = format!("args{} == 1", "[0]".repeat(500));
        assert_eq!(parse(&indexes), Err(ConditionError::TooDeep));
    }

    #[test]
    fn test_chains_within_limit_parse() {
        let sum = format!("{} == 40", vec!["1"; 40].join(" + "));
        assert!(parse(&sum).is_ok());

        let conjunction = vec!["args.ok"; 40].join(" and ");
        assert!(parse(&conjunction).is_ok());

        // Chain links and parentheses share one budget.
        let sum = vec!["1"; 40].join(" + ");
        let shallow = format!("{}{}{} > 0", "(".repeat(10), sum, ")".repeat(10));
        assert!(parse(&shallow).is_ok());
        let deep = format!("{}{}{} > 0", "(".repeat(30), sum, ")".repeat(30));
        assert_eq!(parse(&deep), Err(ConditionError::TooDeep));
    }
}
