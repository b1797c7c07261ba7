//! Evaluator for the variable-assignment scripts served by the switch.
//!
//! The data pages (`system_data.js`, `link_data.js`, ...) are plain sequences
//! of top-level assignments such as
//!
//! ```text
//! var Max_port = 8;
//! var portstatus = ['Up', 'Down', 'Down'];
//! var Stats = [[0, 12, 4, 0], [1, 0, 0, 0]];
//! ```
//!
//! Only literal values are understood. Anything resembling executable code is
//! rejected with [`ScriptError::Syntax`], so a misbehaving device can never make
//! the exporter run logic.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::trace;

/// Upper bound on array lengths a script may allocate through `new Array(n)`
/// or an indexed assignment. The largest switch has a few dozen ports.
pub const MAX_ARRAY_LEN: usize = 4096;

/// Errors produced while evaluating a script or reading a variable from it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("variable '{name}' is not defined")]
    Missing { name: String },

    #[error("variable '{name}' is {found}, expected {expected}")]
    WrongShape {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// A literal value assigned to a script variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<ScriptValue>),
    Object(BTreeMap<String, ScriptValue>),
}

impl ScriptValue {
    /// Short description of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "a boolean",
            ScriptValue::Int(_) => "an integer",
            ScriptValue::Float(_) => "a float",
            ScriptValue::Str(_) => "a string",
            ScriptValue::Array(_) => "an array",
            ScriptValue::Object(_) => "an object",
        }
    }

    /// Numeric view of a scalar. Strings are not coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Int(i) => Some(*i as f64),
            ScriptValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn is_scalar(&self) -> bool {
        !matches!(self, ScriptValue::Array(_) | ScriptValue::Object(_))
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ScriptValue::Null,
            serde_json::Value::Bool(b) => ScriptValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ScriptValue::Int(i),
                None => {
                    let f = n.as_f64().unwrap_or(f64::NAN);
                    // The literal parser may hand integers back as floats.
                    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                        ScriptValue::Int(f as i64)
                    } else {
                        ScriptValue::Float(f)
                    }
                }
            },
            serde_json::Value::String(s) => ScriptValue::Str(s),
            serde_json::Value::Array(items) => {
                ScriptValue::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => ScriptValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Holds the variables defined by every script evaluated on it.
#[derive(Debug, Default)]
pub struct ScriptEvaluator {
    variables: HashMap<String, ScriptValue>,
}

impl ScriptEvaluator {
    /// Create an evaluator with no variables defined.
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute every assignment in `script`, adding to the variables defined so far.
    ///
    /// On error, assignments preceding the failing statement remain applied.
    pub fn evaluate(&mut self, script: &str) -> Result<(), ScriptError> {
        let mut scanner = Scanner::new(script);

        loop {
            scanner.skip_trivia()?;
            if scanner.at_end() {
                break;
            }

            let line = scanner.line;
            let target = scanner.target()?;
            scanner.expect_assignment()?;
            let literal = scanner.expression()?;
            let value = self.literal_value(&literal, line)?;

            trace!(name = %target.name, kind = value.kind(), "script assignment");
            self.assign(target, value, line)?;
        }

        Ok(())
    }

    /// Number of variables currently defined.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether no variable has been defined yet.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Raw access to a variable.
    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.variables.get(name)
    }

    pub fn get_string(&self, name: &str) -> Result<String, ScriptError> {
        match self.require(name)? {
            ScriptValue::Str(s) => Ok(s.clone()),
            ScriptValue::Int(i) => Ok(i.to_string()),
            ScriptValue::Float(f) => Ok(f.to_string()),
            ScriptValue::Bool(b) => Ok(b.to_string()),
            other => Err(wrong_shape(name, "a string", other)),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64, ScriptError> {
        let value = self.require(name)?;
        match value {
            ScriptValue::Int(i) => Ok(*i),
            ScriptValue::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            ScriptValue::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| wrong_shape(name, "an integer", value)),
            other => Err(wrong_shape(name, "an integer", other)),
        }
    }

    pub fn get_float(&self, name: &str) -> Result<f64, ScriptError> {
        let value = self.require(name)?;
        match value {
            ScriptValue::Int(i) => Ok(*i as f64),
            ScriptValue::Float(f) => Ok(*f),
            ScriptValue::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| wrong_shape(name, "a number", value)),
            other => Err(wrong_shape(name, "a number", other)),
        }
    }

    pub fn get_string_array(&self, name: &str) -> Result<Vec<String>, ScriptError> {
        string_row(self.require(name)?)
            .map_err(|bad| wrong_shape(name, "an array of strings", bad))
    }

    pub fn get_string_matrix(&self, name: &str) -> Result<Vec<Vec<String>>, ScriptError> {
        const EXPECTED: &str = "an array of string arrays";
        let value = self.require(name)?;
        let ScriptValue::Array(rows) = value else {
            return Err(wrong_shape(name, EXPECTED, value));
        };
        rows.iter()
            .map(|row| string_row(row).map_err(|bad| wrong_shape(name, EXPECTED, bad)))
            .collect()
    }

    pub fn get_mixed_matrix(&self, name: &str) -> Result<Vec<Vec<ScriptValue>>, ScriptError> {
        const EXPECTED: &str = "an array of scalar arrays";
        let value = self.require(name)?;
        let ScriptValue::Array(rows) = value else {
            return Err(wrong_shape(name, EXPECTED, value));
        };
        rows.iter()
            .map(|row| match row {
                ScriptValue::Array(cells) if cells.iter().all(ScriptValue::is_scalar) => {
                    Ok(cells.clone())
                }
                other => Err(wrong_shape(name, EXPECTED, other)),
            })
            .collect()
    }

    fn require(&self, name: &str) -> Result<&ScriptValue, ScriptError> {
        self.variables.get(name).ok_or_else(|| ScriptError::Missing {
            name: name.to_string(),
        })
    }

    fn literal_value(&self, literal: &str, line: usize) -> Result<ScriptValue, ScriptError> {
        if is_identifier(literal) {
            return match literal {
                "undefined" => Ok(ScriptValue::Null),
                name => self.variables.get(name).cloned().ok_or_else(|| {
                    syntax(line, format!("reference to undefined variable '{name}'"))
                }),
            };
        }

        if let Some(args) = array_constructor_args(literal) {
            let value = parse_literal(&format!("[{args}]"), line)?;
            // `new Array(n)` allocates n empty slots.
            if let ScriptValue::Array(items) = &value
                && let [ScriptValue::Int(n)] = items.as_slice()
                && let Ok(len) = usize::try_from(*n)
            {
                if len > MAX_ARRAY_LEN {
                    return Err(syntax(
                        line,
                        format!("array length {len} exceeds the limit of {MAX_ARRAY_LEN}"),
                    ));
                }
                return Ok(ScriptValue::Array(vec![ScriptValue::Null; len]));
            }
            return Ok(value);
        }

        parse_literal(literal, line)
    }

    fn assign(&mut self, target: Target, value: ScriptValue, line: usize) -> Result<(), ScriptError> {
        let Some(index) = target.index else {
            self.variables.insert(target.name, value);
            return Ok(());
        };

        match self.variables.get_mut(&target.name) {
            Some(ScriptValue::Array(items)) => {
                let len = index
                    .checked_add(1)
                    .filter(|len| *len <= MAX_ARRAY_LEN)
                    .ok_or_else(|| {
                        syntax(
                            line,
                            format!(
                                "index {index} into '{}' exceeds the limit of {MAX_ARRAY_LEN}",
                                target.name
                            ),
                        )
                    })?;
                if items.len() < len {
                    items.resize(len, ScriptValue::Null);
                }
                items[index] = value;
                Ok(())
            }
            Some(other) => Err(syntax(
                line,
                format!("cannot index into '{}', it is {}", target.name, other.kind()),
            )),
            None => Err(syntax(
                line,
                format!("cannot index into undefined variable '{}'", target.name),
            )),
        }
    }
}

/// Convert an array of strings, returning the offending value on mismatch.
fn string_row(value: &ScriptValue) -> Result<Vec<String>, &ScriptValue> {
    let ScriptValue::Array(items) = value else {
        return Err(value);
    };
    items
        .iter()
        .map(|item| match item {
            ScriptValue::Str(s) => Ok(s.clone()),
            other => Err(other),
        })
        .collect()
}

fn wrong_shape(name: &str, expected: &'static str, found: &ScriptValue) -> ScriptError {
    ScriptError::WrongShape {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

fn syntax(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Syntax {
        line,
        message: message.into(),
    }
}

fn parse_literal(literal: &str, line: usize) -> Result<ScriptValue, ScriptError> {
    json5::from_str::<serde_json::Value>(literal)
        .map(ScriptValue::from_json)
        .map_err(|e| syntax(line, format!("unsupported value `{literal}`: {e}")))
}

/// Returns the argument list of a `new Array(...)` expression.
fn array_constructor_args(literal: &str) -> Option<&str> {
    let rest = literal.strip_prefix("new")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.trim_start()
        .strip_prefix("Array")?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !matches!(s, "true" | "false" | "null" | "Infinity" | "NaN")
}

/// Left-hand side of an assignment.
struct Target {
    name: String,
    index: Option<usize>,
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Skip whitespace, comments and empty statements.
    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() || c == ';' => {
                    self.bump();
                }
                Some('/') if self.starts_with("//") => self.skip_line_comment(),
                Some('/') if self.starts_with("/*") => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ScriptError> {
        let line = self.line;
        self.pos += 2;
        while !self.starts_with("*/") {
            if self.bump().is_none() {
                return Err(syntax(line, "unterminated comment"));
            }
        }
        self.pos += 2;
        Ok(())
    }

    fn identifier(&mut self) -> Result<&'a str, ScriptError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        let ident = &self.src[start..self.pos];
        if is_identifier(ident) {
            Ok(ident)
        } else {
            Err(syntax(self.line, "expected a variable assignment"))
        }
    }

    fn target(&mut self) -> Result<Target, ScriptError> {
        let mut name = self.identifier()?;
        if matches!(name, "var" | "let" | "const") {
            self.skip_whitespace();
            name = self.identifier()?;
        }
        self.skip_whitespace();

        let index = if self.peek() == Some('[') {
            self.bump();
            self.skip_whitespace();
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
            let index = self.src[start..self.pos]
                .parse()
                .map_err(|_| syntax(self.line, format!("invalid index into '{name}'")))?;
            self.skip_whitespace();
            if self.bump() != Some(']') {
                return Err(syntax(self.line, format!("unterminated index into '{name}'")));
            }
            self.skip_whitespace();
            Some(index)
        } else {
            None
        };

        Ok(Target {
            name: name.to_string(),
            index,
        })
    }

    fn expect_assignment(&mut self) -> Result<(), ScriptError> {
        if self.peek() == Some('=') && !self.starts_with("==") {
            self.bump();
            Ok(())
        } else {
            Err(syntax(self.line, "expected '='"))
        }
    }

    /// Collect the right-hand side of an assignment with comments removed.
    ///
    /// The expression ends at `;`, `,` or a newline outside any brackets.
    fn expression(&mut self) -> Result<String, ScriptError> {
        self.skip_whitespace();
        let line = self.line;
        let mut literal = String::new();
        let mut depth = 0usize;

        while let Some(c) = self.peek() {
            match c {
                '"' | '\'' => literal.push_str(self.string(c)?),
                '/' if self.starts_with("//") => self.skip_line_comment(),
                '/' if self.starts_with("/*") => self.skip_block_comment()?,
                '(' | '[' | '{' => {
                    depth += 1;
                    literal.push(c);
                    self.bump();
                }
                ')' | ']' | '}' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| syntax(self.line, format!("unbalanced '{c}'")))?;
                    literal.push(c);
                    self.bump();
                }
                ';' | ',' | '\n' if depth == 0 => {
                    self.bump();
                    break;
                }
                _ => {
                    literal.push(c);
                    self.bump();
                }
            }
        }

        if depth != 0 {
            return Err(syntax(line, "unterminated array or object"));
        }

        let literal = literal.trim();
        if literal.is_empty() {
            return Err(syntax(line, "missing value after '='"));
        }
        Ok(literal.to_string())
    }

    /// Consume a quoted string and return it including the quotes.
    fn string(&mut self, quote: char) -> Result<&'a str, ScriptError> {
        let start = self.pos;
        let line = self.line;
        self.bump();
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => break,
                None | Some('\n') => return Err(syntax(line, "unterminated string")),
                Some(_) => {}
            }
        }
        Ok(&self.src[start..self.pos])
    }
}
