//! Calculator tool: arithmetic on numbers the model should not guess.
//!
//! Two argument shapes are accepted:
//! - `{"expression": "(2 + 3) * 4"}` with `+ - * / % ^`, parentheses and unary minus
//! - `{"operation": "divide", "a": 100, "b": 4}` for a single binary operation

use async_trait::async_trait;
use memloop_core::error::ToolError;
use memloop_core::tool::{Tool, ToolContext, ToolResult};
use std::iter::Peekable;
use std::str::Chars;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform arithmetic. Pass either an 'expression' such as '(2 + 3) * 4', \
         or an 'operation' (add, subtract, multiply, divide) with operands 'a' and 'b'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. '2 ^ 10 - 24 % 5'"
                },
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "Binary operation to apply to a and b"
                },
                "a": { "type": "number", "description": "First operand" },
                "b": { "type": "number", "description": "Second operand" }
            }
        })
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let outcome = if let Some(expr) = arguments.get("expression").and_then(|v| v.as_str()) {
            evaluate(expr)
        } else if let Some(op) = arguments.get("operation").and_then(|v| v.as_str()) {
            let operand = |key: &str| {
                arguments
                    .get(key)
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a number")))
            };
            apply(op, operand("a")?, operand("b")?)?
        } else {
            return Err(ToolError::InvalidArguments(
                "Provide either 'expression' or 'operation' with 'a' and 'b'".into(),
            ));
        };

        Ok(match outcome {
            Ok(value) => ToolResult::ok("", format_number(value))
                .with_data(serde_json::json!({ "result": value })),
            Err(e) => ToolResult::failed("", format!("Error: {e}")),
        })
    }
}

/// Apply a named binary operation. Unknown names are argument errors; math
/// errors (division by zero) are returned as the inner `Err`.
fn apply(op: &str, a: f64, b: f64) -> Result<Result<f64, String>, ToolError> {
    Ok(match op {
        "add" => Ok(a + b),
        "subtract" => Ok(a - b),
        "multiply" => Ok(a * b),
        "divide" if b == 0.0 => Err("Division by zero".into()),
        "divide" => Ok(a / b),
        other => return Err(ToolError::InvalidArguments(format!("Unknown operation '{other}'"))),
    })
}

/// Render integral values without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate an arithmetic expression.
///
/// Grammar, loosest binding first:
/// ```text
/// sum     = product (('+' | '-') product)*
/// product = power (('*' | '/' | '%') power)*
/// power   = unary ('^' power)?
/// unary   = '-'* atom
/// atom    = NUMBER | '(' sum ')'
/// ```
///
/// Parentheses and `^` chains may nest at most [`MAX_NESTING`] deep.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut eval = Evaluator {
        chars: expr.chars().peekable(),
        depth: 0,
    };
    let value = eval.sum()?;
    match eval.next_symbol() {
        None => Ok(value),
        Some(c) => Err(format!("Unexpected '{c}' after complete expression")),
    }
}

/// Deepest allowed nesting of parentheses and exponents.
pub const MAX_NESTING: usize = 256;

struct Evaluator<'a> {
    chars: Peekable<Chars<'a>>,
    depth: usize,
}

impl Evaluator<'_> {
    /// Run `parse` one nesting level deeper.
    fn nested(&mut self, parse: fn(&mut Self) -> Result<f64, String>) -> Result<f64, String> {
        if self.depth >= MAX_NESTING {
            return Err("Expression nested too deeply".into());
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn peek_symbol(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.peek().copied()
    }

    fn next_symbol(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.next()
    }

    fn eat(&mut self, symbol: char) -> bool {
        if self.peek_symbol() == Some(symbol) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> Result<f64, String> {
        let mut acc = self.product()?;
        loop {
            if self.eat('+') {
                acc += self.product()?;
            } else if self.eat('-') {
                acc -= self.product()?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn product(&mut self) -> Result<f64, String> {
        let mut acc = self.power()?;
        loop {
            if self.eat('*') {
                acc *= self.power()?;
            } else if self.eat('/') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err("Division by zero".into());
                }
                acc /= divisor;
            } else if self.eat('%') {
                let divisor = self.power()?;
                if divisor == 0.0 {
                    return Err("Modulo by zero".into());
                }
                acc %= divisor;
            } else {
                return Ok(acc);
            }
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            let exponent = self.nested(Self::power)?;
            let value = base.powf(exponent);
            if !value.is_finite() {
                return Err(format!("{base} ^ {exponent} is not a finite number"));
            }
            return Ok(value);
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        let mut negate = false;
        while self.eat('-') {
            negate = !negate;
        }
        let value = self.atom()?;
        Ok(if negate { -value } else { value })
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.peek_symbol() {
            Some('(') => {
                self.chars.next();
                let inner = self.nested(Self::sum)?;
                if self.eat(')') {
                    Ok(inner)
                } else {
                    Err("Expected closing parenthesis".into())
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(d) = self.chars.next_if(|d| d.is_ascii_digit() || *d == '.') {
                    literal.push(d);
                }
                literal.parse().map_err(|_| format!("Invalid number: {literal}"))
            }
            Some(c) => Err(format!("Unexpected character: '{c}'")),
            None => Err("Unexpected end of expression".into()),
        }
    }
}
