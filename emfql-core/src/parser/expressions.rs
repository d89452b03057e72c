//! Operand grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | '+' unary | primary
//! primary := literal | column | var '.' attr | func '(' var '.' (attr | '*') ')'
//!          | 'count' '(' '*' ')' | '(' expr ')'
//! ```

use super::Parser;
use crate::ast::{AggregateFunction, AggregateKind, ArithmeticOp, Expression};
use crate::error::{EmfError, EmfResult};
use crate::lexer::Token;
use crate::value::Value;

/// Parse one operand (a projection item or one side of a comparison).
pub fn parse_operand(text: &str, grouping_vars: &[String]) -> EmfResult<Expression> {
    if text.trim().is_empty() {
        return Err(EmfError::parse("Empty operand"));
    }
    Parser::new(text, grouping_vars)?.parse()
}

impl<'a> Parser<'a> {
    pub(super) fn parse_expression(&mut self) -> EmfResult<Expression> {
        self.parse_additive_expression()
    }

    fn parse_additive_expression(&mut self) -> EmfResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => ArithmeticOp::Add,
                Token::Minus => ArithmeticOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expression()?;
            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> EmfResult<Expression> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let op = match self.current_token() {
                Token::Star => ArithmeticOp::Mul,
                Token::Slash => ArithmeticOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary_expression()?;
            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> EmfResult<Expression> {
        match self.current_token() {
            Token::Minus => {
                self.advance();
                Ok(match self.parse_unary_expression()? {
                    Expression::Literal(Value::Int(i)) => Expression::Literal(Value::Int(-i)),
                    Expression::Literal(Value::Real(r)) => Expression::Literal(Value::Real(-r)),
                    other => Expression::Negate(Box::new(other)),
                })
            }
            Token::Plus => {
                self.advance();
                self.parse_unary_expression()
            }
            _ => self.parse_primary_expression(),
        }
    }

    fn parse_primary_expression(&mut self) -> EmfResult<Expression> {
        match self.current_token().clone() {
            Token::Integer(n) => {
                // `1.state` names the first grouping variable by position
                if matches!(self.peek_token(1), Token::Dot) {
                    return self.parse_var_reference(n.to_string());
                }
                self.advance();
                Ok(Expression::Literal(Value::Int(n)))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expression::Literal(Value::Real(f)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expression::Literal(Value::Str(s)))
            }
            Token::Identifier(name) => self.parse_identifier_expression(name),
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            other => Err(EmfError::parse(format!(
                "Unexpected token in expression: {:?}",
                other
            ))),
        }
    }

    /// Column, `var.attr`, aggregate call, or an aggregate written as its field name.
    fn parse_identifier_expression(&mut self, name: String) -> EmfResult<Expression> {
        match self.peek_token(1) {
            Token::LeftParen => self.parse_aggregate_call(&name),
            Token::Dot => self.parse_var_reference(name),
            _ => {
                self.advance();
                Ok(match self.resolve_field_name(&name) {
                    Some(agg) => Expression::Aggregate(agg),
                    None => Expression::Column(name),
                })
            }
        }
    }

    fn parse_var_reference(&mut self, var: String) -> EmfResult<Expression> {
        self.advance(); // consume variable
        self.expect(Token::Dot)?;
        match self.current_token().clone() {
            Token::Identifier(attr) => {
                self.advance();
                Ok(Expression::VarAttr { var, attr })
            }
            other => Err(EmfError::parse(format!(
                "Expected attribute after '{}.', found {:?}",
                var, other
            ))),
        }
    }

    fn parse_aggregate_call(&mut self, name: &str) -> EmfResult<Expression> {
        let function: AggregateKind = name.parse()?;
        self.advance(); // consume function name
        self.expect(Token::LeftParen)?;

        if matches!(self.current_token(), Token::Star) {
            self.advance();
            self.expect(Token::RightParen)?;
            if function != AggregateKind::Count {
                return Err(EmfError::parse(format!(
                    "{}(*) is not supported; only count accepts '*'",
                    function
                )));
            }
            return Ok(Expression::CountStar);
        }

        let var = match self.current_token().clone() {
            Token::Identifier(v) => v,
            Token::Integer(n) => n.to_string(),
            other => {
                return Err(EmfError::parse(format!(
                    "Expected <var>.<attr> inside {}(), found {:?}",
                    function, other
                )))
            }
        };
        self.advance();
        self.expect(Token::Dot)?;

        let attribute = match self.current_token().clone() {
            Token::Identifier(attr) => attr,
            Token::Star if function == AggregateKind::Count => "*".to_string(),
            other => {
                return Err(EmfError::parse(format!(
                    "Expected attribute in {}({}.), found {:?}",
                    function, var, other
                )))
            }
        };
        self.advance();
        self.expect(Token::RightParen)?;

        Ok(Expression::Aggregate(AggregateFunction::new(
            function, &var, &attribute,
        )))
    }

    /// `<var>_<func>_<attr>` (e.g. `1_sum_quant`) or `<func>_<k>_<attr>` (e.g.
    /// `sum_1_quant`), resolved against the declared grouping variables.
    fn resolve_field_name(&self, name: &str) -> Option<AggregateFunction> {
        let build = |function: &str, var: &str, attr: &str| -> Option<AggregateFunction> {
            let function: AggregateKind = function.parse().ok()?;
            if attr.is_empty() {
                return None;
            }
            let attr = match attr {
                "star" if function == AggregateKind::Count => "*",
                other => other,
            };
            Some(AggregateFunction::new(function, var, attr))
        };

        for var in self.grouping_vars {
            let Some(rest) = name.strip_prefix(var.as_str()).and_then(|r| r.strip_prefix('_'))
            else {
                continue;
            };
            if let Some((function, attr)) = rest.split_once('_') {
                if let Some(agg) = build(function, var, attr) {
                    return Some(agg);
                }
            }
        }

        let (function, rest) = name.split_once('_')?;
        let (position, attr) = rest.split_once('_')?;
        let k: usize = position.parse().ok()?;
        let var = self.grouping_vars.get(k.checked_sub(1)?)?;
        build(function, var, attr)
    }
}
