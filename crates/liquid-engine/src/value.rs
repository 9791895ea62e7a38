// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The Liquid value model.
//!
//! This replaces a generic JSON value with a tagged variant carrying
//! Liquid's own truthiness, equality and ordering laws, which are
//! deliberately *not* the laws a JSON-flavoured value type would give you
//! for free: only `Nil` and `Bool(false)` are falsy, `""`/`[]`/`{}`/`0` are
//! all truthy, and mappings preserve insertion order rather than sorting.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A host object exposed to templates through a declared surface only.
/// Templates can never reach arbitrary fields or methods on a `Drop`; they
/// can only call the capabilities below.
pub trait Drop: fmt::Debug + Send + Sync {
    fn has_member(&self, name: &str) -> bool;
    fn get_member(&self, name: &str) -> Option<Value>;
    fn size(&self) -> Option<i64> {
        None
    }
    fn to_primitive(&self) -> Option<Value> {
        None
    }
    fn to_html(&self) -> Option<String> {
        None
    }
}

/// Governs what happens when a path lookup misses (`spec.md` §4.8). Lives
/// on the value model (rather than only on the render context) because an
/// `Undefined` value carries its producing variant with it, so a value that
/// has already escaped the lookup site still knows how it must behave on
/// iteration, arithmetic, equality and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndefinedVariant {
    Lenient,
    Strict,
    Debug,
    FalsyStrict,
}

/// The reason a value is `Undefined`, carried for the debug/strict undefined
/// variants and for error messages. `variant` records which of the four
/// undefined protocols produced this value, so downstream consumers
/// (arithmetic filters, output, `{{ }}` stringification) can apply the
/// per-variant behavior spec.md §4.8 specifies instead of treating every
/// `Undefined` identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedPath {
    pub path: String,
    pub variant: UndefinedVariant,
}

/// Liquid's value kinds.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Range(i64, i64),
    Sequence(Arc<Vec<Value>>),
    Mapping(Arc<Mapping>),
    Drop(Arc<dyn Drop>),
    Undefined(UndefinedPath),
}

/// An insertion-order-preserving string-keyed mapping.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: Vec<(String, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn seq(values: Vec<Value>) -> Self {
        Value::Sequence(Arc::new(values))
    }

    pub fn map(mapping: Mapping) -> Self {
        Value::Mapping(Arc::new(mapping))
    }

    pub fn undefined(path: impl Into<String>, variant: UndefinedVariant) -> Self {
        Value::Undefined(UndefinedPath { path: path.into(), variant })
    }

    /// `Some(variant)` that produced this value, if it is `Undefined`.
    pub fn undefined_variant(&self) -> Option<UndefinedVariant> {
        match self {
            Value::Undefined(u) => Some(u.variant),
            _ => None,
        }
    }

    /// The truthiness law: only `Nil` and `Bool(false)` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false) | Value::Undefined(_))
    }

    /// Length-zero check; does not special-case whitespace (see `is_blank`).
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Sequence(items) => items.is_empty(),
            Value::Mapping(map) => map.is_empty(),
            Value::Nil | Value::Undefined(_) => true,
            _ => false,
        }
    }

    /// `blank`: empty, or a string of only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::String(s) => s.trim().is_empty(),
            _ => self.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Range(..) => "range",
            Value::Sequence(_) => "array",
            Value::Mapping(_) => "hash",
            Value::Drop(_) => "drop",
            Value::Undefined(_) => "undefined",
        }
    }

    pub fn as_sequence(&self) -> Option<Vec<Value>> {
        match self {
            Value::Sequence(items) => Some(items.as_ref().clone()),
            Value::Range(start, stop) => Some(range_sequence(*start, *stop)),
            Value::Mapping(map) => Some(
                map.iter()
                    .map(|(k, v)| Value::seq(vec![Value::str(k.clone()), v.clone()]))
                    .collect(),
            ),
            // String iteration open question: treated as a one-element
            // sequence containing itself (reference-dialect behavior).
            Value::String(_) => Some(vec![self.clone()]),
            Value::Nil | Value::Undefined(_) => Some(Vec::new()),
            _ => None,
        }
    }

    pub fn as_str_lossy(&self) -> String {
        crate::value::stringify(self)
    }

    /// Best-effort numeric coercion used by arithmetic filters: whole
    /// literals parse as integers, decimal literals as floats, anything
    /// else (including non-numeric strings) coerces to `0`.
    pub fn coerce_number(&self) -> Value {
        match self {
            Value::Int(_) | Value::Float(_) => self.clone(),
            Value::String(s) => parse_number(s).unwrap_or(Value::Int(0)),
            Value::Bool(_) | Value::Nil | Value::Undefined(_) => Value::Int(0),
            _ => Value::Int(0),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// A stable identity for `for ... offset: continue` resumption
    /// (`spec.md` §3: cursors are keyed by `(name, iterable-identity)`, not
    /// by loop-variable name alone — two differently-named loops over the
    /// same underlying collection must never share a cursor, and the same
    /// loop variable reused over two distinct collections must not
    /// accidentally resume the wrong one). For `Arc`-backed collections this
    /// is the allocation's address, which an `Arc::clone` (an ordinary
    /// lookup of the same global) preserves; for everything else it is a
    /// hash of the value's contents, which is as close to "identity" as a
    /// by-value kind can get.
    pub fn iterable_identity(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        match self {
            Value::Sequence(items) => Arc::as_ptr(items) as *const () as usize as u64,
            Value::Mapping(map) => Arc::as_ptr(map) as *const () as usize as u64,
            Value::Drop(drop) => Arc::as_ptr(drop) as *const () as usize as u64,
            Value::Range(start, stop) => {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                (start, stop).hash(&mut hasher);
                hasher.finish()
            }
            Value::String(s) => Arc::as_ptr(s) as *const () as usize as u64,
            Value::Nil | Value::Undefined(_) | Value::Bool(_) | Value::Int(_) | Value::Float(_) => 0,
        }
    }
}

/// Parses a leading numeric literal; returns `None` if the entire string
/// does not parse (partial matches count as a parse failure, matching the
/// spec's "strings parse as integers/floats if the entire literal parses").
pub fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Some(Value::Float(f));
    }
    None
}

/// Ruby-style inclusive integer range; `a > b` is empty, never reversed.
pub fn range_sequence(start: i64, stop: i64) -> Vec<Value> {
    if start > stop {
        Vec::new()
    } else {
        (start..=stop).map(Value::Int).collect()
    }
}

/// Canonical string form used whenever a filter or `{{ }}` must stringify a
/// non-string value: integers/floats in their shortest exact
/// representation, `true`/`false`, `nil` as empty string for output but
/// `"nil"` when a filter explicitly requests the literal name, and mappings
/// as a stable pair-list form.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        // Debug undefined renders a marker naming the access path instead of
        // disappearing silently, per spec.md §4.8; the other two non-strict
        // variants (lenient, falsy-strict) still render as empty text here —
        // falsy-strict's "otherwise raises" is enforced at the write site,
        // before `stringify` is ever reached.
        Value::Undefined(u) if u.variant == UndefinedVariant::Debug => {
            format!("[undefined: {}]", u.path)
        }
        Value::Undefined(_) => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) => s.to_string(),
        Value::Range(start, stop) => format!("{start}..{stop}"),
        Value::Sequence(items) => items.iter().map(stringify).collect::<Vec<_>>().join(""),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| format!("{k}{}", stringify(v)))
            .collect::<Vec<_>>()
            .join(""),
        Value::Drop(drop) => drop
            .to_primitive()
            .map(|v| stringify(&v))
            .unwrap_or_default(),
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        let mut s = format!("{f}");
        if !s.contains('.') && !s.contains('e') && !s.contains("inf") && !s.contains("NaN") {
            s.push_str(".0");
        }
        s
    }
}

/// Structural equality across compatible kinds, including the numeric
/// promotion and `Nil`/`Undefined` unification the spec requires.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Nil, Nil) | (Undefined(_), Undefined(_)) | (Nil, Undefined(_)) | (Undefined(_), Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (String(a), String(b)) => a == b,
            (Range(a0, a1), Range(b0, b1)) => a0 == b0 && a1 == b1,
            (Sequence(a), Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Mapping(a), Mapping(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| bv == v))
            }
            _ => false,
        }
    }
}

/// Compares two values for the spec's `empty`/`blank` sentinel equality and
/// ordinary structural equality; callers decide which comparison applies.
pub fn equals_sentinel_empty(value: &Value) -> bool {
    value.is_empty()
}

pub fn equals_sentinel_blank(value: &Value) -> bool {
    value.is_blank()
}

/// Total ordering within a kind: numerics compare numerically (after
/// promotion), strings lexicographically by byte value. Returns `None` for
/// incompatible kinds; callers raise `TypeError` (strict) or treat as
/// `false` (lax/warn) per the spec.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stringify(self))
    }
}
