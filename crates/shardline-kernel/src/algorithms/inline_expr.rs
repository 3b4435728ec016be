//! # Inline Expressions
//!
//! `${...}` templates used in two places:
//! - data-node lists: `ds_${0..1}.orders_${0..3}` expands to the cartesian
//!   product of each placeholder's values, left to right
//! - the INLINE algorithm: `orders_${user_id % 4}` renders a single name from
//!   a bound sharding value
//!
//! `$->{...}` is accepted as a synonym for `${...}`.

use crate::domain::{ConfigError, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
enum Part {
    Text(String),
    Placeholder(String),
}

fn invalid(expression: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

/// Split a template into literal text and placeholder bodies.
fn split_parts(expression: &str) -> Result<Vec<Part>, ConfigError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = expression;

    while !rest.is_empty() {
        let open = if rest.starts_with("${") {
            Some(2)
        } else if rest.starts_with("$->{") {
            Some(4)
        } else {
            None
        };

        match open {
            Some(skip) => {
                let body_start = &rest[skip..];
                let close = body_start
                    .find('}')
                    .ok_or_else(|| invalid(expression, "unterminated placeholder"))?;
                if !text.is_empty() {
                    parts.push(Part::Text(std::mem::take(&mut text)));
                }
                parts.push(Part::Placeholder(body_start[..close].trim().to_string()));
                rest = &body_start[close + 1..];
            }
            None => {
                let mut chars = rest.chars();
                if let Some(c) = chars.next() {
                    text.push(c);
                }
                rest = chars.as_str();
            }
        }
    }
    if !text.is_empty() {
        parts.push(Part::Text(text));
    }
    Ok(parts)
}

/// Split on commas that sit outside placeholders and brackets.
fn split_top_level(expression: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in expression.chars() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
        if c == ',' && depth == 0 {
            out.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// Values of one node-list placeholder: `0..3` or `['a','b']` / `[0, 1]`.
fn placeholder_values(expression: &str, body: &str) -> Result<Vec<String>, ConfigError> {
    if let Some((lo, hi)) = body.split_once("..") {
        let lo: i64 = lo
            .trim()
            .parse()
            .map_err(|_| invalid(expression, format!("bad range start '{}'", lo.trim())))?;
        let hi: i64 = hi
            .trim()
            .parse()
            .map_err(|_| invalid(expression, format!("bad range end '{}'", hi.trim())))?;
        if hi < lo {
            return Err(invalid(expression, format!("empty range {lo}..{hi}")));
        }
        return Ok((lo..=hi).map(|v| v.to_string()).collect());
    }

    if let Some(list) = body.strip_prefix('[').and_then(|b| b.strip_suffix(']')) {
        let values: Vec<String> = list
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|item| !item.is_empty())
            .collect();
        if values.is_empty() {
            return Err(invalid(expression, "empty list"));
        }
        return Ok(values);
    }

    Err(invalid(
        expression,
        format!("placeholder '{body}' is neither a range nor a list"),
    ))
}

/// Expand a node-list expression into its ordered names.
///
/// Plain comma-separated names are allowed and mixed freely with templates.
pub fn expand_inline(expression: &str) -> Result<Vec<String>, ConfigError> {
    let mut names = Vec::new();
    for segment in split_top_level(expression) {
        let mut expanded = vec![String::new()];
        for part in split_parts(&segment)? {
            match part {
                Part::Text(text) => expanded.iter_mut().for_each(|e| e.push_str(&text)),
                Part::Placeholder(body) => {
                    let values = placeholder_values(expression, &body)?;
                    expanded = expanded
                        .iter()
                        .flat_map(|prefix| values.iter().map(move |v| format!("{prefix}{v}")))
                        .collect();
                }
            }
        }
        names.extend(expanded);
    }
    if names.is_empty() {
        return Err(invalid(expression, "expression is empty"));
    }
    Ok(names)
}

/// Evaluation failure of an INLINE template.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    /// A variable has no binding.
    #[error("unbound variable '{0}'")]
    Unbound(String),
    /// Arithmetic on a non-integer.
    #[error("value {0} is not an integer")]
    NotInteger(String),
    /// `/` or `%` by zero.
    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Number(i64),
    Text(String),
    Var(String),
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Num(i64),
    Str(String),
    Ident(String),
    Op(char),
}

fn tokenize(expression: &str, body: &str) -> Result<Vec<Tok>, ConfigError> {
    let mut toks = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse()
                .map_err(|_| invalid(expression, format!("bad number '{text}'")))?;
            toks.push(Tok::Num(n));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            toks.push(Tok::Ident(chars[start..i].iter().collect()));
        } else if c == '\'' || c == '"' {
            let end = chars[i + 1..]
                .iter()
                .position(|&x| x == c)
                .ok_or_else(|| invalid(expression, "unterminated string"))?;
            toks.push(Tok::Str(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if "+-*/%()".contains(c) {
            toks.push(Tok::Op(c));
            i += 1;
        } else {
            return Err(invalid(expression, format!("unexpected character '{c}'")));
        }
    }
    Ok(toks)
}

struct Parser<'a> {
    expression: &'a str,
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser<'_> {
    fn peek_op(&self) -> Option<char> {
        match self.toks.get(self.pos) {
            Some(Tok::Op(c)) => Some(*c),
            _ => None,
        }
    }

    fn sum(&mut self) -> Result<Expr, ConfigError> {
        let mut lhs = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, ConfigError> {
        let mut lhs = self.unary()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ConfigError> {
        let tok = self
            .toks
            .get(self.pos)
            .cloned()
            .ok_or_else(|| invalid(self.expression, "unexpected end of expression"))?;
        self.pos += 1;
        match tok {
            Tok::Num(n) => Ok(Expr::Number(n)),
            Tok::Str(s) => Ok(Expr::Text(s)),
            Tok::Ident(name) => Ok(Expr::Var(name.to_ascii_lowercase())),
            Tok::Op('-') => Ok(Expr::Neg(Box::new(self.unary()?))),
            Tok::Op('(') => {
                let inner = self.sum()?;
                if self.peek_op() != Some(')') {
                    return Err(invalid(self.expression, "missing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Tok::Op(c) => Err(invalid(self.expression, format!("unexpected '{c}'"))),
        }
    }
}

fn integer(value: &Value) -> Result<i64, EvalError> {
    value
        .as_i64()
        .ok_or_else(|| EvalError::NotInteger(value.to_sql_literal()))
}

fn eval(expr: &Expr, bindings: &HashMap<String, Value>) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Int(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Var(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Unbound(name.clone())),
        Expr::Neg(inner) => Ok(Value::Int(integer(&eval(inner, bindings)?)?.wrapping_neg())),
        Expr::Binary(op, lhs, rhs) => {
            let a = integer(&eval(lhs, bindings)?)?;
            let b = integer(&eval(rhs, bindings)?)?;
            let v = match op {
                '+' => a.wrapping_add(b),
                '-' => a.wrapping_sub(b),
                '*' => a.wrapping_mul(b),
                '/' if b == 0 => return Err(EvalError::DivisionByZero),
                '/' => a / b,
                '%' if b == 0 => return Err(EvalError::DivisionByZero),
                _ => a % b,
            };
            Ok(Value::Int(v))
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Compiled {
    Text(String),
    Expr(Expr),
}

/// A compiled single-name template such as `orders_${user_id % 4}`.
#[derive(Clone, Debug, PartialEq)]
pub struct InlineTemplate {
    source: String,
    parts: Vec<Compiled>,
}

impl InlineTemplate {
    /// Parse and compile every placeholder.
    pub fn compile(expression: &str) -> Result<Self, ConfigError> {
        let mut parts = Vec::new();
        for part in split_parts(expression)? {
            match part {
                Part::Text(t) => parts.push(Compiled::Text(t)),
                Part::Placeholder(body) => {
                    let mut parser = Parser {
                        expression,
                        toks: tokenize(expression, &body)?,
                        pos: 0,
                    };
                    let expr = parser.sum()?;
                    if parser.pos != parser.toks.len() {
                        return Err(invalid(expression, "trailing tokens in placeholder"));
                    }
                    parts.push(Compiled::Expr(expr));
                }
            }
        }
        Ok(Self {
            source: expression.to_string(),
            parts,
        })
    }

    /// Template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render with lowercase variable bindings.
    pub fn render(&self, bindings: &HashMap<String, Value>) -> Result<String, EvalError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Compiled::Text(t) => out.push_str(t),
                Compiled::Expr(e) => out.push_str(&eval(e, bindings)?.to_string()),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_cartesian_left_to_right() {
        let nodes = expand_inline("ds_${0..1}.orders_${0..1}").unwrap();
        assert_eq!(
            nodes,
            vec![
                "ds_0.orders_0",
                "ds_0.orders_1",
                "ds_1.orders_0",
                "ds_1.orders_1"
            ]
        );
    }

    #[test]
    fn test_expand_list_and_plain_names() {
        let nodes = expand_inline("ds_${['a','b']}.t, ds_c.t").unwrap();
        assert_eq!(nodes, vec!["ds_a.t", "ds_b.t", "ds_c.t"]);
    }

    #[test]
    fn test_expand_arrow_syntax() {
        let nodes = expand_inline("t_$->{0..2}").unwrap();
        assert_eq!(nodes, vec!["t_0", "t_1", "t_2"]);
    }

    #[test]
    fn test_expand_rejects_bad_placeholder() {
        assert!(expand_inline("t_${oops}").is_err());
        assert!(expand_inline("t_${3..1}").is_err());
        assert!(expand_inline("t_${0..1").is_err());
    }

    #[test]
    fn test_template_modulo() {
        let template = InlineTemplate::compile("orders_${user_id % 4}").unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("user_id".to_string(), Value::Int(37));
        assert_eq!(template.render(&bindings).unwrap(), "orders_1");
    }

    #[test]
    fn test_template_precedence_and_parens() {
        let template = InlineTemplate::compile("t_${(a + 1) * 2 % 5}").unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("a".to_string(), Value::Int(3));
        assert_eq!(template.render(&bindings).unwrap(), "t_3");
    }

    #[test]
    fn test_template_errors() {
        let template = InlineTemplate::compile("t_${id % 0}").unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("id".to_string(), Value::Int(1));
        assert_eq!(template.render(&bindings), Err(EvalError::DivisionByZero));

        let template = InlineTemplate::compile("t_${id % 2}").unwrap();
        bindings.insert("id".to_string(), Value::Text("abc".into()));
        assert!(matches!(
            template.render(&bindings),
            Err(EvalError::NotInteger(_))
        ));
        assert!(InlineTemplate::compile("t_${id %}").is_err());
    }

    #[test]
    fn test_template_text_passthrough() {
        let template = InlineTemplate::compile("ds_${region}").unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("region".to_string(), Value::from("eu"));
        assert_eq!(template.render(&bindings).unwrap(), "ds_eu");
    }
}
