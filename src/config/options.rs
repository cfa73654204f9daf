//! Per-component options.
//!
//! Every component declares its options up front (name, kind, default, help).
//! Values can then be set either typed or from strings; string parsing goes
//! through one table keyed by [`OptionKind`], so no component has to parse
//! its own settings.
//!
//! List options accept the bracketed form `[1, 2, 3]` as well as a bare
//! comma-separated list.

use crate::pipeline::error::OptionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known option names shared by several components
pub mod keys {
    pub const SAMPLE_RATE: &str = "sampleRate";
    /// Seconds of output the component's buffer retains
    pub const BUFFER_SIZE: &str = "bufferSize";
    pub const THRESHOLD_LOW: &str = "thresholdLow";
    pub const THRESHOLD_HIGH: &str = "thresholdHigh";
}

/// Kind of value an option holds
#[derive(Debug, Clone, PartialEq)]
pub enum OptionKind {
    Bool,
    Int,
    Float,
    Text,
    IntList,
    FloatList,
    /// Text restricted to one of the listed names (case-insensitive on input)
    Choice(&'static [&'static str]),
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Bool => f.write_str("bool"),
            OptionKind::Int => f.write_str("int"),
            OptionKind::Float => f.write_str("float"),
            OptionKind::Text => f.write_str("text"),
            OptionKind::IntList => f.write_str("int list"),
            OptionKind::FloatList => f.write_str("float list"),
            OptionKind::Choice(choices) => write!(f, "one of [{}]", choices.join(", ")),
        }
    }
}

/// A typed option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl OptionValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Float(_) => "float",
            OptionValue::Text(_) => "text",
            OptionValue::IntList(_) => "int list",
            OptionValue::FloatList(_) => "float list",
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
            write!(f, "[{}]", parts.join(", "))
        }
        match self {
            OptionValue::Bool(v) => write!(f, "{v}"),
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Float(v) => write!(f, "{v}"),
            OptionValue::Text(v) => f.write_str(v),
            OptionValue::IntList(v) => list(f, v),
            OptionValue::FloatList(v) => list(f, v),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Text(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Text(v)
    }
}

impl From<Vec<i64>> for OptionValue {
    fn from(v: Vec<i64>) -> Self {
        OptionValue::IntList(v)
    }
}

impl From<Vec<f64>> for OptionValue {
    fn from(v: Vec<f64>) -> Self {
        OptionValue::FloatList(v)
    }
}

/// Declaration of one option
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor {
    pub name: &'static str,
    pub kind: OptionKind,
    pub default: OptionValue,
    pub help: &'static str,
}

#[derive(Debug, Clone)]
struct OptionEntry {
    descriptor: OptionDescriptor,
    value: OptionValue,
}

/// Declared options of one component, in declaration order
#[derive(Debug, Clone, Default)]
pub struct Options {
    entries: Vec<OptionEntry>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an option; a later declaration with the same name replaces the earlier one
    pub fn declare(mut self, descriptor: OptionDescriptor) -> Self {
        self.entries.retain(|e| e.descriptor.name != descriptor.name);
        self.entries.push(OptionEntry {
            value: descriptor.default.clone(),
            descriptor,
        });
        self
    }

    pub fn bool(self, name: &'static str, default: bool, help: &'static str) -> Self {
        self.declare(OptionDescriptor {
            name,
            kind: OptionKind::Bool,
            default: OptionValue::Bool(default),
            help,
        })
    }

    pub fn int(self, name: &'static str, default: i64, help: &'static str) -> Self {
        self.declare(OptionDescriptor {
            name,
            kind: OptionKind::Int,
            default: OptionValue::Int(default),
            help,
        })
    }

    pub fn float(self, name: &'static str, default: f64, help: &'static str) -> Self {
        self.declare(OptionDescriptor {
            name,
            kind: OptionKind::Float,
            default: OptionValue::Float(default),
            help,
        })
    }

    pub fn text(self, name: &'static str, default: &str, help: &'static str) -> Self {
        self.declare(OptionDescriptor {
            name,
            kind: OptionKind::Text,
            default: OptionValue::Text(default.to_string()),
            help,
        })
    }

    pub fn int_list(self, name: &'static str, default: Vec<i64>, help: &'static str) -> Self {
        self.declare(OptionDescriptor {
            name,
            kind: OptionKind::IntList,
            default: OptionValue::IntList(default),
            help,
        })
    }

    pub fn float_list(self, name: &'static str, default: Vec<f64>, help: &'static str) -> Self {
        self.declare(OptionDescriptor {
            name,
            kind: OptionKind::FloatList,
            default: OptionValue::FloatList(default),
            help,
        })
    }

    pub fn choice(
        self,
        name: &'static str,
        choices: &'static [&'static str],
        default: &'static str,
        help: &'static str,
    ) -> Self {
        self.declare(OptionDescriptor {
            name,
            kind: OptionKind::Choice(choices),
            default: OptionValue::Text(default.to_string()),
            help,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Current values in declaration order
    pub fn values(&self) -> impl Iterator<Item = (&'static str, &OptionValue)> {
        self.entries.iter().map(|e| (e.descriptor.name, &e.value))
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.entry(name).map(|e| &e.value)
    }

    /// Set a typed value. Ints are accepted for float options.
    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<(), OptionError> {
        let value = value.into();
        let entry = self
            .entry_mut(name)
            .ok_or_else(|| OptionError::UnknownOption(name.to_string()))?;
        let accepted = match (&entry.descriptor.kind, value) {
            (OptionKind::Bool, v @ OptionValue::Bool(_)) => v,
            (OptionKind::Int, v @ OptionValue::Int(_)) => v,
            (OptionKind::Float, v @ OptionValue::Float(_)) => v,
            (OptionKind::Float, OptionValue::Int(i)) => OptionValue::Float(i as f64),
            (OptionKind::Text, v @ OptionValue::Text(_)) => v,
            (OptionKind::IntList, v @ OptionValue::IntList(_)) => v,
            (OptionKind::FloatList, v @ OptionValue::FloatList(_)) => v,
            (OptionKind::FloatList, OptionValue::IntList(items)) => {
                OptionValue::FloatList(items.into_iter().map(|i| i as f64).collect())
            }
            (OptionKind::Choice(choices), OptionValue::Text(text)) => {
                OptionValue::Text(match_choice(name, choices, &text)?)
            }
            (kind, other) => {
                return Err(OptionError::TypeMismatch {
                    name: name.to_string(),
                    expected: kind.to_string(),
                    actual: other.kind_name().to_string(),
                })
            }
        };
        entry.value = accepted;
        Ok(())
    }

    /// Set a value a component declared itself. Those keys and kinds are
    /// fixed at compile time, so a mismatch is a programming error.
    pub(crate) fn preset(&mut self, name: &str, value: impl Into<OptionValue>) {
        let result = self.set(name, value);
        debug_assert!(result.is_ok(), "preset {name}: {result:?}");
    }

    /// Parse `raw` according to the option's kind and set it
    pub fn set_str(&mut self, name: &str, raw: &str) -> Result<(), OptionError> {
        let entry = self
            .entry_mut(name)
            .ok_or_else(|| OptionError::UnknownOption(name.to_string()))?;
        entry.value = parse_value(name, &entry.descriptor.kind, raw)?;
        Ok(())
    }

    /// Restore an option to its declared default
    pub fn reset(&mut self, name: &str) -> Result<(), OptionError> {
        let entry = self
            .entry_mut(name)
            .ok_or_else(|| OptionError::UnknownOption(name.to_string()))?;
        entry.value = entry.descriptor.default.clone();
        Ok(())
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, OptionError> {
        match self.require(name)? {
            OptionValue::Bool(v) => Ok(*v),
            other => Err(mismatch(name, "bool", other)),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64, OptionError> {
        match self.require(name)? {
            OptionValue::Int(v) => Ok(*v),
            other => Err(mismatch(name, "int", other)),
        }
    }

    /// Non-negative int option as `usize`
    pub fn get_usize(&self, name: &str) -> Result<usize, OptionError> {
        let value = self.get_int(name)?;
        usize::try_from(value).map_err(|_| OptionError::Parse {
            name: name.to_string(),
            value: value.to_string(),
            reason: "must not be negative".to_string(),
        })
    }

    /// Float option; int options are widened
    pub fn get_float(&self, name: &str) -> Result<f64, OptionError> {
        match self.require(name)? {
            OptionValue::Float(v) => Ok(*v),
            OptionValue::Int(v) => Ok(*v as f64),
            other => Err(mismatch(name, "float", other)),
        }
    }

    pub fn get_text(&self, name: &str) -> Result<&str, OptionError> {
        match self.require(name)? {
            OptionValue::Text(v) => Ok(v),
            other => Err(mismatch(name, "text", other)),
        }
    }

    pub fn get_int_list(&self, name: &str) -> Result<&[i64], OptionError> {
        match self.require(name)? {
            OptionValue::IntList(v) => Ok(v),
            other => Err(mismatch(name, "int list", other)),
        }
    }

    pub fn get_float_list(&self, name: &str) -> Result<&[f64], OptionError> {
        match self.require(name)? {
            OptionValue::FloatList(v) => Ok(v),
            other => Err(mismatch(name, "float list", other)),
        }
    }

    fn require(&self, name: &str) -> Result<&OptionValue, OptionError> {
        self.get(name)
            .ok_or_else(|| OptionError::UnknownOption(name.to_string()))
    }

    fn entry(&self, name: &str) -> Option<&OptionEntry> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut OptionEntry> {
        self.entries.iter_mut().find(|e| e.descriptor.name == name)
    }
}

fn mismatch(name: &str, expected: &str, actual: &OptionValue) -> OptionError {
    OptionError::TypeMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        actual: actual.kind_name().to_string(),
    }
}

fn parse_error(name: &str, raw: &str, reason: impl fmt::Display) -> OptionError {
    OptionError::Parse {
        name: name.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn match_choice(name: &str, choices: &[&str], raw: &str) -> Result<String, OptionError> {
    let wanted = raw.trim();
    choices
        .iter()
        .find(|c| c.eq_ignore_ascii_case(wanted))
        .map(|c| c.to_string())
        .ok_or_else(|| parse_error(name, raw, format!("expected one of [{}]", choices.join(", "))))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, OptionError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(parse_error(name, raw, "expected true or false")),
    }
}

/// Items of `[a, b, c]` or `a, b, c`; empty brackets give an empty list
fn list_items(raw: &str) -> impl Iterator<Item = &str> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// The parse table: one rule per option kind
fn parse_value(name: &str, kind: &OptionKind, raw: &str) -> Result<OptionValue, OptionError> {
    Ok(match kind {
        OptionKind::Bool => OptionValue::Bool(parse_bool(name, raw)?),
        OptionKind::Int => OptionValue::Int(
            raw.trim()
                .parse()
                .map_err(|e| parse_error(name, raw, e))?,
        ),
        OptionKind::Float => OptionValue::Float(
            raw.trim()
                .parse()
                .map_err(|e| parse_error(name, raw, e))?,
        ),
        OptionKind::Text => OptionValue::Text(raw.to_string()),
        OptionKind::IntList => OptionValue::IntList(
            list_items(raw)
                .map(|item| item.parse().map_err(|e| parse_error(name, raw, e)))
                .collect::<Result<_, _>>()?,
        ),
        OptionKind::FloatList => OptionValue::FloatList(
            list_items(raw)
                .map(|item| item.parse().map_err(|e| parse_error(name, raw, e)))
                .collect::<Result<_, _>>()?,
        ),
        OptionKind::Choice(choices) => OptionValue::Text(match_choice(name, choices, raw)?),
    })
}
