//! Restricted expression language for behavior predicates and actions.
//!
//! Scripts see two roots, `pen` (the pen's fields as JSON) and `params`
//! (the binding's parameters). Expressions support literals, field paths,
//! arithmetic, comparison and boolean operators. Statement scripts are
//! `pen.<field> = <expr>` assignments separated by `;`. Nothing outside
//! the two roots is reachable.

use crate::error::ScriptError;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

const OPERATORS: [&str; 22] = [
    "===", "!==", "==", "!=", ">=", "<=", "&&", "||", ">", "<", "=", "!", "+", "-", "*", "/",
    "%", "(", ")", ".", ";", ",",
];

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ScriptError> {
    let mut tokens = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = src[i..].chars().next().unwrap_or(' ');
        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }
        let start = i;
        if c.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let number = src[start..i]
                .parse::<f64>()
                .map_err(|_| ScriptError::UnexpectedChar { ch: c, offset: start })?;
            tokens.push((start, Token::Number(number)));
        } else if c == '"' || c == '\'' {
            i += 1;
            let mut text = String::new();
            let mut closed = false;
            while let Some(ch) = src[i..].chars().next() {
                i += ch.len_utf8();
                match ch {
                    '\\' => {
                        let Some(escaped) = src[i..].chars().next() else {
                            break;
                        };
                        i += escaped.len_utf8();
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    }
                    ch if ch == c => {
                        closed = true;
                        break;
                    }
                    ch => text.push(ch),
                }
            }
            if !closed {
                return Err(ScriptError::UnterminatedString(start));
            }
            tokens.push((start, Token::Str(text)));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            while let Some(ch) = src[i..].chars().next() {
                if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                    i += ch.len_utf8();
                } else {
                    break;
                }
            }
            tokens.push((start, Token::Ident(src[start..i].to_string())));
        } else {
            let op: &'static str = OPERATORS
                .iter()
                .copied()
                .find(|op| src[i..].starts_with(op))
                .ok_or(ScriptError::UnexpectedChar { ch: c, offset: i })?;
            i += op.len();
            tokens.push((start, Token::Op(op)));
        }
    }
    Ok(tokens)
}

/// Root object of a field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    Pen,
    Params,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Root, Vec<String>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// One `pen.<field> = <expr>` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub field: String,
    pub expr: Expr,
}

/// A compiled statement script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub statements: Vec<Assignment>,
}

/// Evaluation environment.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub pen: &'a Value,
    pub params: &'a Value,
}

/// Deepest allowed parenthesis or unary nesting.
const MAX_NESTING: usize = 64;
/// Most operator nodes one compiled source may hold.
const MAX_OPERATIONS: usize = 1024;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
    operations: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, ScriptError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(ScriptError::Empty);
        }
        Ok(Self {
            tokens,
            pos: 0,
            end: src.len(),
            depth: 0,
            operations: 0,
        })
    }

    fn nest(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ScriptError::TooDeep {
                offset: self.offset(),
                limit: MAX_NESTING,
            });
        }
        Ok(())
    }

    fn operation(&mut self) -> Result<(), ScriptError> {
        self.operations += 1;
        if self.operations > MAX_OPERATIONS {
            return Err(ScriptError::TooLarge {
                offset: self.offset(),
                limit: MAX_OPERATIONS,
            });
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &str) -> ScriptError {
        if self.at_end() {
            ScriptError::UnexpectedEnd(expected.to_string())
        } else {
            ScriptError::UnexpectedToken {
                offset: self.offset(),
                expected: expected.to_string(),
            }
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ScriptError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(&format!("'{op}'")))
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
    ) -> Result<Expr, ScriptError> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (text, op) in ops {
                if self.eat_op(text) {
                    self.operation()?;
                    let rhs = next(self)?;
                    lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("||", BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("&&", BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                ("===", BinaryOp::Eq),
                ("!==", BinaryOp::Ne),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                (">=", BinaryOp::Ge),
                ("<=", BinaryOp::Le),
                (">", BinaryOp::Gt),
                ("<", BinaryOp::Lt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let negate = if self.eat_op("!") {
            true
        } else if self.eat_op("-") {
            false
        } else {
            return self.primary();
        };
        self.operation()?;
        self.nest()?;
        let inner = Box::new(self.unary()?);
        self.depth -= 1;
        Ok(if negate { Expr::Not(inner) } else { Expr::Neg(inner) })
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let offset = self.offset();
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("expression"));
        };
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::from(s))),
            Token::Op("(") => {
                self.nest()?;
                let inner = self.expr()?;
                self.depth -= 1;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                "pen" => Ok(Expr::Path(Root::Pen, self.path_tail()?)),
                "params" => Ok(Expr::Path(Root::Params, self.path_tail()?)),
                _ => Err(ScriptError::UnknownRoot(word)),
            },
            Token::Op(_) => Err(ScriptError::UnexpectedToken {
                offset,
                expected: "expression".to_string(),
            }),
        }
    }

    fn path_tail(&mut self) -> Result<Vec<String>, ScriptError> {
        let mut keys = Vec::new();
        while self.eat_op(".") {
            keys.push(self.ident()?);
        }
        Ok(keys)
    }
}

/// Compile a predicate expression. A leading `return` and a trailing `;`
/// are accepted.
pub fn compile_expr(src: &str) -> Result<Expr, ScriptError> {
    let mut parser = Parser::new(src)?;
    parser.eat_keyword("return");
    let expr = parser.expr()?;
    parser.eat_op(";");
    if !parser.at_end() {
        return Err(parser.error("end of expression"));
    }
    Ok(expr)
}

/// Compile an assignment script.
pub fn compile_script(src: &str) -> Result<Script, ScriptError> {
    let mut parser = Parser::new(src)?;
    let mut statements = Vec::new();
    while !parser.at_end() {
        if parser.eat_op(";") {
            continue;
        }
        let target = parser.ident()?;
        if target != "pen" {
            return Err(ScriptError::InvalidAssignment(target));
        }
        let path = parser.path_tail()?;
        if path.len() != 1 {
            return Err(ScriptError::InvalidAssignment(format!("pen.{}", path.join("."))));
        }
        parser.expect_op("=")?;
        let expr = parser.expr()?;
        statements.push(Assignment {
            field: path.into_iter().next().unwrap_or_default(),
            expr,
        });
        if !parser.at_end() {
            parser.expect_op(";")?;
        }
    }
    if statements.is_empty() {
        return Err(ScriptError::Empty);
    }
    Ok(Script { statements })
}

impl Expr {
    pub fn eval(&self, scope: &Scope) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Path(root, keys) => {
                let mut cursor = match root {
                    Root::Pen => scope.pen,
                    Root::Params => scope.params,
                };
                for key in keys {
                    match cursor.get(key) {
                        Some(next) => cursor = next,
                        None => return Value::Null,
                    }
                }
                cursor.clone()
            }
            Expr::Not(inner) => Value::Bool(!truthy(&inner.eval(scope))),
            Expr::Neg(inner) => number_value(-to_number(&inner.eval(scope))),
            Expr::Binary(BinaryOp::Or, a, b) => {
                let lhs = a.eval(scope);
                if truthy(&lhs) { lhs } else { b.eval(scope) }
            }
            Expr::Binary(BinaryOp::And, a, b) => {
                let lhs = a.eval(scope);
                if truthy(&lhs) { b.eval(scope) } else { lhs }
            }
            Expr::Binary(op, a, b) => binary(*op, &a.eval(scope), &b.eval(scope)),
        }
    }
}

impl Script {
    /// Run the statements in order. Later statements see earlier
    /// assignments. Returns the assigned fields.
    pub fn run(&self, scope: &Scope) -> Map<String, Value> {
        let mut pen = scope.pen.clone();
        let mut assigned = Map::new();
        for statement in &self.statements {
            let value = statement.expr.eval(&Scope {
                pen: &pen,
                params: scope.params,
            });
            if let Value::Object(map) = &mut pen {
                map.insert(statement.field.clone(), value.clone());
            }
            assigned.insert(statement.field.clone(), value);
        }
        assigned
    }
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(loose_eq(a, b)),
        BinaryOp::Ne => Value::Bool(!loose_eq(a, b)),
        BinaryOp::Gt => Value::Bool(compare(a, ">", b)),
        BinaryOp::Ge => Value::Bool(compare(a, ">=", b)),
        BinaryOp::Lt => Value::Bool(compare(a, "<", b)),
        BinaryOp::Le => Value::Bool(compare(a, "<=", b)),
        BinaryOp::Add => match (a, b) {
            (Value::String(x), y) => Value::from(format!("{x}{}", display(y))),
            (x, Value::String(y)) => Value::from(format!("{}{y}", display(x))),
            _ => number_value(to_number(a) + to_number(b)),
        },
        BinaryOp::Sub => number_value(to_number(a) - to_number(b)),
        BinaryOp::Mul => number_value(to_number(a) * to_number(b)),
        BinaryOp::Div => number_value(to_number(a) / to_number(b)),
        BinaryOp::Rem => number_value(to_number(a) % to_number(b)),
        BinaryOp::Or | BinaryOp::And => Value::Null,
    }
}

fn number_value(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// JavaScript-style truthiness.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// JavaScript-style numeric coercion; `NaN` when not numeric.
pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Loose equality: same-type values compare directly, mixed scalars compare
/// numerically.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => to_number(a) == to_number(b),
    }
}

/// Evaluate `a <op> b` for the comparison operators bindings may declare.
/// Unknown operators never match.
pub fn compare(a: &Value, op: &str, b: &Value) -> bool {
    match op {
        "=" | "==" | "===" => loose_eq(a, b),
        "!=" | "!==" => !loose_eq(a, b),
        ">" | ">=" | "<" | "<=" => {
            let ordering = match (a, b) {
                (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
                _ => to_number(a).partial_cmp(&to_number(b)),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                ">" => ordering.is_gt(),
                ">=" => ordering.is_ge(),
                "<" => ordering.is_lt(),
                _ => ordering.is_le(),
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(src: &str, pen: Value, params: Value) -> Value {
        compile_expr(src).unwrap().eval(&Scope {
            pen: &pen,
            params: &params,
        })
    }

    #[test]
    fn test_paths_and_comparison() {
        let pen = json!({"value": 12, "state": {"on": true}});
        assert_eq!(eval("pen.value > 10", pen.clone(), Value::Null), json!(true));
        assert_eq!(eval("return pen.state.on;", pen.clone(), Value::Null), json!(true));
        assert_eq!(eval("pen.missing.deep", pen, Value::Null), Value::Null);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", Value::Null, Value::Null), json!(7.0));
        assert_eq!(eval("(1 + 2) * 3", Value::Null, Value::Null), json!(9.0));
        assert_eq!(eval("!false && 1 < 2", Value::Null, Value::Null), json!(true));
        assert_eq!(eval("-2 + 5", Value::Null, Value::Null), json!(3.0));
    }

    #[test]
    fn test_loose_semantics() {
        assert_eq!(eval("pen.v == '5'", json!({"v": 5}), Value::Null), json!(true));
        assert_eq!(eval("'a' + 1", Value::Null, Value::Null), json!("a1"));
        assert_eq!(eval("params || 'none'", Value::Null, json!("")), json!("none"));
        assert!(compare(&json!("10"), ">=", &json!(9)));
        assert!(!compare(&json!("abc"), ">", &json!(1)));
        assert!(compare(&json!("b"), ">", &json!("a")));
        assert!(!compare(&json!(1), "~", &json!(1)));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(compile_expr(""), Err(ScriptError::Empty));
        assert_eq!(
            compile_expr("window.alert(1)"),
            Err(ScriptError::UnknownRoot("window".into()))
        );
        assert_eq!(compile_expr("'open"), Err(ScriptError::UnterminatedString(0)));
        assert!(matches!(compile_expr("1 +"), Err(ScriptError::UnexpectedEnd(_))));
        assert!(matches!(
            compile_expr("1 2"),
            Err(ScriptError::UnexpectedToken { offset: 2, .. })
        ));
        assert!(matches!(
            compile_expr("pen.x # 1"),
            Err(ScriptError::UnexpectedChar { ch: '#', offset: 6 })
        ));
    }

    #[test]
    fn test_nesting_and_size_limits() {
        let nested = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert!(compile_expr(&nested).is_ok());

        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(matches!(compile_expr(&deep), Err(ScriptError::TooDeep { .. })));
        let negations = format!("{}true", "!".repeat(100_000));
        assert!(matches!(compile_expr(&negations), Err(ScriptError::TooDeep { .. })));

        let long = format!("1{}", " + 1".repeat(50_000));
        assert!(matches!(compile_expr(&long), Err(ScriptError::TooLarge { .. })));
        let script = format!("pen.x = 1{};", " * 2".repeat(5_000));
        assert!(matches!(compile_script(&script), Err(ScriptError::TooLarge { .. })));
    }

    #[test]
    fn test_script_assignments() {
        let script = compile_script("pen.x = pen.x + 10; pen.text = 'at ' + pen.x;").unwrap();
        let out = script.run(&Scope {
            pen: &json!({"x": 5}),
            params: &Value::Null,
        });
        assert_eq!(out["x"], json!(15.0));
        assert_eq!(out["text"], json!("at 15"));
    }

    #[test]
    fn test_script_rejects_foreign_targets() {
        assert_eq!(
            compile_script("params.x = 1"),
            Err(ScriptError::InvalidAssignment("params".into()))
        );
        assert_eq!(
            compile_script("pen.a.b = 1"),
            Err(ScriptError::InvalidAssignment("pen.a.b".into()))
        );
    }
}
