// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Parses a token slice (produced by [`crate::lexer`]) into the expression
//! sub-grammars a tag or output statement needs: a plain filtered
//! expression, a right-associative boolean expression, or a loop
//! expression. Each tag reparses its own `Expression` payload through
//! these entry points, giving tags freedom to define their own surface
//! syntax while sharing one lexer and one literal/path grammar.

use crate::ast::{
    BooleanExpression, CompareOp, Expression, FilterCall, FilteredExpression, LoopExpression,
    OffsetSpec, Path, Segment,
};
use crate::error::{Error, Location};
use crate::lexer::{Keyword, Operator, Token, TokenKind};

pub struct ExprParser<'t> {
    tokens: &'t [Token],
    pos: usize,
    template_name: &'t str,
}

impl<'t> ExprParser<'t> {
    pub fn new(tokens: &'t [Token], template_name: &'t str) -> Self {
        Self {
            tokens,
            pos: 0,
            template_name,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn loc(&self) -> Location {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| Location::from_span(t.span))
            .unwrap_or_default()
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, self.template_name.to_string(), self.loc())
    }

    fn expect_identifier(&mut self) -> Result<String, Error> {
        match self.bump() {
            Some(Token { kind: TokenKind::Identifier(name), .. }) => Ok(name.clone()),
            _ => Err(self.err("expected identifier")),
        }
    }

    // ---- literals & paths -------------------------------------------------

    pub(crate) fn parse_primary(&mut self) -> Result<Expression, Error> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::LeftParen) => {
                self.bump();
                let start = self.parse_primary()?;
                match self.bump().map(|t| t.kind.clone()) {
                    Some(TokenKind::DotDot) => {}
                    _ => return Err(self.err("expected '..' in range literal")),
                }
                let stop = self.parse_primary()?;
                match self.bump().map(|t| t.kind.clone()) {
                    Some(TokenKind::RightParen) => {}
                    _ => return Err(self.err("expected ')' closing range literal")),
                }
                Ok(Expression::Range(Box::new(start), Box::new(stop)))
            }
            Some(TokenKind::StringLiteral(s)) => {
                self.bump();
                Ok(Expression::Str(s))
            }
            Some(TokenKind::NumberLiteral(raw)) => {
                self.bump();
                Ok(parse_number_literal(&raw))
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.bump();
                Ok(Expression::Bool(true))
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.bump();
                Ok(Expression::Bool(false))
            }
            Some(TokenKind::Keyword(Keyword::Nil)) | Some(TokenKind::Keyword(Keyword::Null)) => {
                self.bump();
                Ok(Expression::Nil)
            }
            Some(TokenKind::Keyword(Keyword::Empty)) => {
                self.bump();
                Ok(Expression::Empty)
            }
            Some(TokenKind::Keyword(Keyword::Blank)) => {
                self.bump();
                Ok(Expression::Blank)
            }
            Some(TokenKind::Identifier(_)) => Ok(Expression::Path(self.parse_path()?)),
            _ => Err(self.err("expected an expression")),
        }
    }

    fn parse_path(&mut self) -> Result<Path, Error> {
        let root = self.expect_identifier()?;
        let mut segments = vec![Segment::Name(root)];
        loop {
            match self.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Dot) => {
                    self.bump();
                    let name = self.expect_identifier()?;
                    segments.push(Segment::Name(name));
                }
                Some(TokenKind::LeftBracket) => {
                    self.bump();
                    let index_expr = self.parse_primary()?;
                    match self.bump().map(|t| t.kind.clone()) {
                        Some(TokenKind::RightBracket) => {}
                        _ => return Err(self.err("expected ']' closing index")),
                    }
                    segments.push(match index_expr {
                        Expression::Int(i) => Segment::Index(i),
                        Expression::Str(s) => Segment::Name(s),
                        other => Segment::Dynamic(Box::new(other)),
                    });
                }
                _ => break,
            }
        }
        Ok(Path { segments })
    }

    // ---- filtered expressions ---------------------------------------------

    /// `head | filter: pos, name: val | filter2`
    pub fn parse_filtered_expression(&mut self) -> Result<FilteredExpression, Error> {
        let head = self.parse_primary()?;
        let mut filters = Vec::new();
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Pipe)) {
            self.bump();
            filters.push(self.parse_filter_call()?);
        }
        Ok(FilteredExpression { head, filters })
    }

    fn parse_filter_call(&mut self) -> Result<FilterCall, Error> {
        let name = self.expect_identifier()?;
        let mut positional = Vec::new();
        let mut named = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Colon)) {
            self.bump();
            loop {
                let is_named = matches!(
                    (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)),
                    (Some(Token { kind: TokenKind::Identifier(_), .. }), Some(Token { kind: TokenKind::Colon, .. }))
                );
                if is_named {
                    let key = self.expect_identifier()?;
                    self.bump(); // colon
                    let value = self.parse_primary()?;
                    named.push((key, value));
                } else {
                    positional.push(self.parse_primary()?);
                }
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        Ok(FilterCall { name, positional, named })
    }

    // ---- boolean expressions ----------------------------------------------

    /// `spec.md` §3/§8 property 3: `and`/`or` share one right-associative
    /// chain rather than `and` binding tighter than `or` — `a op1 b op2 c`
    /// parses as `a op1 (b op2 c)` regardless of which of `and`/`or` `op1`
    /// and `op2` are. Collect the flat `compare (and|or compare)*` sequence
    /// left to right, then fold it from the right so the last-seen operator
    /// ends up innermost.
    pub fn parse_boolean_expression(&mut self) -> Result<BooleanExpression, Error> {
        enum BoolOp {
            And,
            Or,
        }

        let mut operands = vec![self.parse_compare()?];
        let mut ops = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Keyword(Keyword::And)) => {
                    self.bump();
                    ops.push(BoolOp::And);
                    operands.push(self.parse_compare()?);
                }
                Some(TokenKind::Keyword(Keyword::Or)) => {
                    self.bump();
                    ops.push(BoolOp::Or);
                    operands.push(self.parse_compare()?);
                }
                _ => break,
            }
        }

        let mut expr = operands.pop().expect("at least one operand parsed above");
        while let Some(op) = ops.pop() {
            let left = operands.pop().expect("one fewer operand than operator");
            expr = match op {
                BoolOp::And => BooleanExpression::And(Box::new(left), Box::new(expr)),
                BoolOp::Or => BooleanExpression::Or(Box::new(left), Box::new(expr)),
            };
        }
        Ok(expr)
    }

    fn parse_compare(&mut self) -> Result<BooleanExpression, Error> {
        let left = BooleanExpression::Value(self.parse_filtered_expression()?);
        let op = match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Operator(Operator::Equal)) => Some(CompareOp::Eq),
            Some(TokenKind::Operator(Operator::NotEqual)) => Some(CompareOp::Ne),
            Some(TokenKind::Operator(Operator::Less)) => Some(CompareOp::Lt),
            Some(TokenKind::Operator(Operator::LessOrEqual)) => Some(CompareOp::Le),
            Some(TokenKind::Operator(Operator::Greater)) => Some(CompareOp::Gt),
            Some(TokenKind::Operator(Operator::GreaterOrEqual)) => Some(CompareOp::Ge),
            Some(TokenKind::Keyword(Keyword::Contains)) => Some(CompareOp::Contains),
            _ => None,
        };
        match op {
            Some(op) => {
                self.bump();
                let right = BooleanExpression::Value(self.parse_filtered_expression()?);
                Ok(BooleanExpression::Compare(Box::new(left), op, Box::new(right)))
            }
            None => Ok(left),
        }
    }

    // ---- loop expressions ---------------------------------------------------

    /// `x in iterable [limit: n] [offset: n|continue] [reversed]` (for `for`)
    /// and `x in iterable [cols: n] [limit: n] [offset: n]` (for `tablerow`).
    /// Returns the loop variable name and the parsed `LoopExpression`.
    pub fn parse_loop_header(&mut self) -> Result<(String, LoopExpression), Error> {
        let var = self.expect_identifier()?;
        match self.bump().map(|t| t.kind.clone()) {
            Some(TokenKind::Keyword(Keyword::In)) => {}
            _ => return Err(self.err("expected 'in' in loop expression")),
        }
        let iterable = self.parse_primary()?;

        let mut limit = None;
        let mut offset = OffsetSpec::None;
        let mut reversed = false;
        let mut cols = None;

        loop {
            match self.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Keyword(Keyword::Limit)) => {
                    self.bump();
                    self.expect_colon()?;
                    limit = Some(self.parse_primary()?);
                }
                Some(TokenKind::Keyword(Keyword::Offset)) => {
                    self.bump();
                    self.expect_colon()?;
                    if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Keyword(Keyword::Continue))) {
                        self.bump();
                        offset = OffsetSpec::Continue;
                    } else {
                        offset = OffsetSpec::Fixed(self.parse_primary()?);
                    }
                }
                Some(TokenKind::Keyword(Keyword::Cols)) => {
                    self.bump();
                    self.expect_colon()?;
                    cols = Some(self.parse_primary()?);
                }
                Some(TokenKind::Keyword(Keyword::Reversed)) => {
                    self.bump();
                    reversed = true;
                }
                _ => break,
            }
        }

        Ok((
            var,
            LoopExpression {
                iterable,
                limit,
                offset,
                reversed,
                cols,
            },
        ))
    }

    fn expect_colon(&mut self) -> Result<(), Error> {
        match self.bump().map(|t| t.kind.clone()) {
            Some(TokenKind::Colon) => Ok(()),
            _ => Err(self.err("expected ':'")),
        }
    }

    // ---- cycle / when argument lists ---------------------------------------

    /// `[group:] v1, v2, ...` for `cycle`.
    pub fn parse_cycle(&mut self) -> Result<(Option<Expression>, Vec<Expression>), Error> {
        let group = if self.looks_like_cycle_group() {
            let g = self.parse_primary()?;
            self.expect_colon()?;
            Some(g)
        } else {
            None
        };
        let values = self.parse_primary_list()?;
        Ok((group, values))
    }

    fn looks_like_cycle_group(&self) -> bool {
        matches!(
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)),
            (Some(Token { kind: TokenKind::StringLiteral(_), .. }), Some(Token { kind: TokenKind::Colon, .. }))
                | (Some(Token { kind: TokenKind::Identifier(_), .. }), Some(Token { kind: TokenKind::Colon, .. }))
        )
    }

    /// A comma- or `or`-separated list of primaries, used by `cycle` and `when`.
    pub fn parse_primary_list(&mut self) -> Result<Vec<Expression>, Error> {
        let mut values = vec![self.parse_primary()?];
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Comma) | Some(TokenKind::Keyword(Keyword::Or)) => {
                    self.bump();
                    values.push(self.parse_primary()?);
                }
                _ => break,
            }
        }
        Ok(values)
    }

    // ---- assignment / with-clause helpers ----------------------------------

    /// `name = expr` (used by `assign`).
    pub fn parse_assignment(&mut self) -> Result<(String, FilteredExpression), Error> {
        let name = self.expect_identifier()?;
        match self.bump().map(|t| t.kind.clone()) {
            Some(TokenKind::Assign) => {}
            _ => return Err(self.err("expected '=' in assign")),
        }
        let expr = self.parse_filtered_expression()?;
        Ok((name, expr))
    }

    /// Remainder of an `include`/`render` tag after the leading name:
    /// `[(with|for) expr [as id]] [k: v, ...]`.
    pub fn parse_partial_args(&mut self) -> Result<crate::ast::PartialArgs, Error> {
        let mut with_expr = None;
        if let Some(TokenKind::Keyword(kw @ (Keyword::With | Keyword::For))) =
            self.peek().map(|t| t.kind.clone())
        {
            self.bump();
            let expr = self.parse_primary()?;
            let mut alias = None;
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Keyword(Keyword::As))) {
                self.bump();
                alias = Some(self.expect_identifier()?);
            }
            with_expr = Some(crate::ast::WithClause {
                expr,
                alias,
                is_for: matches!(kw, Keyword::For),
            });
        }
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
            self.bump();
        }
        let mut params = Vec::new();
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Identifier(_))) {
            let key = self.expect_identifier()?;
            self.expect_colon()?;
            let value = self.parse_primary()?;
            params.push((key, value));
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(crate::ast::PartialArgs { with_expr, params })
    }
}

fn parse_number_literal(raw: &str) -> Expression {
    if let Ok(i) = raw.parse::<i64>() {
        Expression::Int(i)
    } else {
        Expression::Float(raw.parse::<f64>().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex_expression;

    fn parser(src: &str) -> (Vec<Token>, String) {
        (lex_expression(src, 0, 1, 1, "t").unwrap(), "t".to_string())
    }

    #[test]
    fn parses_filtered_expression_with_named_and_positional_args() {
        let (tokens, name) = parser("x | replace: 'a', 'b' | append: suffix: 'z'");
        let mut p = ExprParser::new(&tokens, &name);
        let expr = p.parse_filtered_expression().unwrap();
        assert_eq!(expr.filters.len(), 2);
        assert_eq!(expr.filters[0].positional.len(), 2);
        assert_eq!(expr.filters[1].named.len(), 1);
    }

    #[test]
    fn parses_right_associative_boolean_expression() {
        // spec.md §8 property 3: `true and false and false or true` must
        // parse as `And(true, And(false, Or(false, true)))` — a single
        // right-associative fold, not `and` binding tighter than `or`.
        let (tokens, name) = parser("true and false and false or true");
        let mut p = ExprParser::new(&tokens, &name);
        let expr = p.parse_boolean_expression().unwrap();
        match expr {
            BooleanExpression::And(left, right) => {
                assert!(matches!(*left, BooleanExpression::Value(_)));
                match *right {
                    BooleanExpression::And(inner_left, inner_right) => {
                        assert!(matches!(*inner_left, BooleanExpression::Value(_)));
                        assert!(matches!(*inner_right, BooleanExpression::Or(_, _)));
                    }
                    other => panic!("expected nested And, got {other:?}"),
                }
            }
            other => panic!("expected top-level And, got {other:?}"),
        }
    }

    #[test]
    fn parses_cycle_with_named_group() {
        let (tokens, name) = parser("row_colors: 'a', 'b', 'c'");
        let mut p = ExprParser::new(&tokens, &name);
        let (group, values) = p.parse_cycle().unwrap();
        assert!(group.is_some());
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn parses_loop_header_with_modifiers() {
        let (tokens, name) = parser("item in collection limit: 2 offset: continue reversed");
        let mut p = ExprParser::new(&tokens, &name);
        let (var, loop_expr) = p.parse_loop_header().unwrap();
        assert_eq!(var, "item");
        assert!(loop_expr.limit.is_some());
        assert!(matches!(loop_expr.offset, OffsetSpec::Continue));
        assert!(loop_expr.reversed);
    }
}
