//! A small, strongly-typed representation of GraphQL selection sets. The
//! builder is total: any value constructed through [`Selection::field`],
//! [`Value::literal`], or [`Value::variable`] renders to a syntactically
//! valid GraphQL fragment. No schema-aware validation is performed here,
//! that is the remote service's job.

use std::fmt::Write as _;

/// An argument value: either a literal scalar/null, or a reference to a
/// variable declared by the caller's outer operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Null,
    Variable(String),
}

impl Value {
    pub fn literal(value: impl Into<LiteralScalar>) -> Self {
        match value.into() {
            LiteralScalar::String(s) => Value::String(s),
            LiteralScalar::Int(i) => Value::Int(i),
            LiteralScalar::Bool(b) => Value::Bool(b),
            LiteralScalar::Null => Value::Null,
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Value::Variable(name.into())
    }

    fn render(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Variable(name) => format!("${name}"),
        }
    }
}

/// Glue so `Value::literal("x")`, `Value::literal(1_i64)`, and
/// `Value::literal(None::<String>)` all work without the caller naming
/// `Value` variants directly.
pub enum LiteralScalar {
    String(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl From<&str> for LiteralScalar {
    fn from(value: &str) -> Self {
        LiteralScalar::String(value.to_string())
    }
}

impl From<String> for LiteralScalar {
    fn from(value: String) -> Self {
        LiteralScalar::String(value)
    }
}

impl From<i64> for LiteralScalar {
    fn from(value: i64) -> Self {
        LiteralScalar::Int(value)
    }
}

impl From<bool> for LiteralScalar {
    fn from(value: bool) -> Self {
        LiteralScalar::Bool(value)
    }
}

impl From<Option<String>> for LiteralScalar {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => LiteralScalar::String(s),
            None => LiteralScalar::Null,
        }
    }
}

/// A single field selection: a name, optional arguments, and optional
/// child selections.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    name: String,
    args: Vec<(String, Value)>,
    children: Vec<Selection>,
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Selection {
            name: name.into(),
            args: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.push((name.into(), value));
        self
    }

    pub fn child(mut self, selection: Selection) -> Self {
        self.children.push(selection);
        self
    }

    pub fn children(mut self, selections: impl IntoIterator<Item = Selection>) -> Self {
        self.children.extend(selections);
        self
    }

    /// Renders this selection (and its subtree) as an indented GraphQL
    /// selection-set fragment, e.g. `field(arg: 1) { a b }`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        let _ = write!(out, "{pad}{}", self.name);

        if !self.args.is_empty() {
            let rendered_args = self
                .args
                .iter()
                .map(|(name, value)| format!("{name}: {}", value.render()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "({rendered_args})");
        }

        if self.children.is_empty() {
            out.push('\n');
            return;
        }

        out.push_str(" {\n");
        for child in &self.children {
            child.render_into(out, indent + 1);
        }
        let _ = write!(out, "{pad}}}\n");
    }
}
