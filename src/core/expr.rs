/// Arithmetic for `(expr)` spans.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected '{0}' in expression")]
    Unexpected(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("invalid number '{0}'")]
    Number(String),
    #[error("division by zero")]
    DivisionByZero,
}

/// Evaluates the text of an expression span.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expr: &str) -> Result<f64, ExprError>;
}

/// Numbers, `+ - * / %`, unary minus and parentheses.
#[derive(Debug, Default, Clone, Copy)]
pub struct Arithmetic;

impl Evaluator for Arithmetic {
    fn evaluate(&self, expr: &str) -> Result<f64, ExprError> {
        let mut parser = Parser {
            chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
            pos: 0,
        };
        let value = parser.sum()?;
        match parser.peek() {
            None => Ok(value),
            Some(c) => Err(ExprError::Unexpected(c)),
        }
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn sum(&mut self) -> Result<f64, ExprError> {
        let mut value = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err(ExprError::DivisionByZero),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, ExprError> {
        match self.bump() {
            None => Err(ExprError::UnexpectedEnd),
            Some('(') => {
                let value = self.sum()?;
                match self.bump() {
                    Some(')') => Ok(value),
                    Some(c) => Err(ExprError::Unexpected(c)),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos - 1;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '.')
                {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                text.parse().map_err(|_| ExprError::Number(text))
            }
            Some(c) => Err(ExprError::Unexpected(c)),
        }
    }
}

/// The value as an integer when it has no fractional part.
pub fn as_integer(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15).then_some(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> Result<f64, ExprError> {
        Arithmetic.evaluate(s)
    }

    #[test]
    fn precedence_and_parens() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), 7.0);
        assert_eq!(eval("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(eval("-4 + 10 % 4").unwrap(), -2.0);
        assert_eq!(eval("7 / 2").unwrap(), 3.5);
    }

    #[test]
    fn errors() {
        assert_eq!(eval("1 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(eval("2 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(eval("2 x"), Err(ExprError::Unexpected('x')));
        assert!(matches!(eval("1.2.3"), Err(ExprError::Number(_))));
    }

    #[test]
    fn integral_values() {
        assert_eq!(as_integer(4.0), Some(4));
        assert_eq!(as_integer(4.5), None);
        assert_eq!(as_integer(f64::NAN), None);
    }
}
