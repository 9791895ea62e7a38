// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The render context: layered namespaces, counters, the loop-frame stack,
//! cycle cursors, `ifchanged` memory, disabled tags and resource
//! accounting. Owned by exactly one render; never shared across threads.

use std::collections::HashMap;

use crate::error::{Error, Location};
use crate::value::{Mapping, Value};

/// Re-exported from the value model: an `Undefined` value carries its
/// producing variant with it (see `value::UndefinedPath`), so the enum
/// itself lives there rather than here.
pub use crate::value::UndefinedVariant;

/// Per-render resource caps; `None` means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceLimits {
    pub context_depth_limit: Option<usize>,
    pub loop_iteration_limit: Option<usize>,
    pub local_namespace_limit: Option<usize>,
    pub output_stream_limit: Option<usize>,
}

/// Running totals checked against `ResourceLimits`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceCounters {
    pub bytes_emitted: usize,
    pub loop_iterations: usize,
    pub local_namespace_bytes: usize,
}

/// One entry of the loop-frame stack, backing the `forloop`/`tablerowloop`
/// object and `offset: continue` resumption.
#[derive(Debug, Clone)]
pub struct LoopFrame {
    pub name: String,
    pub length: usize,
    pub index0: usize,
    /// Index into the owning context's `loop_stack` for `forloop.parentloop`;
    /// modeled as a back-reference, never owned data, per the design notes.
    pub parent: Option<usize>,
}

impl LoopFrame {
    /// Builds the `forloop`/`tablerowloop` object; `stack` is the owning
    /// context's full loop stack, used to resolve `parentloop` by index
    /// rather than by owned data.
    pub fn to_forloop_value(&self, stack: &[LoopFrame]) -> Value {
        let mut map = Mapping::new();
        map.insert("name", Value::str(self.name.clone()));
        map.insert("length", Value::Int(self.length as i64));
        map.insert("index", Value::Int(self.index0 as i64 + 1));
        map.insert("index0", Value::Int(self.index0 as i64));
        map.insert("rindex", Value::Int((self.length - self.index0) as i64));
        map.insert("rindex0", Value::Int((self.length - self.index0 - 1) as i64));
        map.insert("first", Value::Bool(self.index0 == 0));
        map.insert("last", Value::Bool(self.index0 + 1 == self.length));
        let parent_value = match self.parent.and_then(|idx| stack.get(idx)) {
            Some(parent) => parent.to_forloop_value(stack),
            None => Value::Nil,
        };
        map.insert("parentloop", parent_value);
        Value::map(map)
    }
}

/// Non-local exit status returned from a node's render method rather than
/// implemented via exceptions, per the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Normal,
    Break,
    Continue,
}

pub struct RenderContext {
    pub globals: Mapping,
    pub locals: Vec<Mapping>,
    pub counters: HashMap<String, i64>,
    pub loop_stack: Vec<LoopFrame>,
    /// `offset: continue` cursor, keyed by `(loop variable name, iterable
    /// identity)` so two loops over distinct collections never share a
    /// cursor merely for reusing the same `for` variable name.
    pub loop_cursors: HashMap<(String, u64), usize>,
    pub cycle_state: HashMap<String, usize>,
    pub ifchanged_last: HashMap<usize, String>,
    pub disabled_tags: std::collections::HashSet<String>,
    pub depth: usize,
    pub limits: ResourceLimits,
    pub counters_resource: ResourceCounters,
    pub undefined_variant: UndefinedVariant,
    pub template_name: String,
    pub output: String,
}

impl RenderContext {
    pub fn new(globals: Mapping, limits: ResourceLimits, undefined_variant: UndefinedVariant, template_name: impl Into<String>) -> Self {
        Self {
            globals,
            locals: vec![Mapping::new()],
            counters: HashMap::new(),
            loop_stack: Vec::new(),
            loop_cursors: HashMap::new(),
            cycle_state: HashMap::new(),
            ifchanged_last: HashMap::new(),
            disabled_tags: std::collections::HashSet::new(),
            depth: 0,
            limits,
            counters_resource: ResourceCounters::default(),
            undefined_variant,
            template_name: template_name.into(),
            output: String::new(),
        }
    }

    pub fn push_frame(&mut self) {
        self.locals.push(Mapping::new());
    }

    pub fn pop_frame(&mut self) {
        self.locals.pop();
        if self.locals.is_empty() {
            self.locals.push(Mapping::new());
        }
    }

    pub fn top_frame_mut(&mut self) -> &mut Mapping {
        self.locals.last_mut().expect("locals stack never empty")
    }

    /// Looks a name up top-down through the locals stack, then globals.
    pub fn lookup_local_or_global(&self, name: &str) -> Option<Value> {
        for frame in self.locals.iter().rev() {
            if let Some(v) = frame.get(name) {
                return Some(v.clone());
            }
        }
        self.globals.get(name).cloned()
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        let approx_size = approximate_size(&value);
        self.top_frame_mut().insert(name, value);
        self.counters_resource.local_namespace_bytes += approx_size;
    }

    pub fn write(&mut self, text: &str) -> Result<(), Error> {
        self.counters_resource.bytes_emitted += text.len();
        if let Some(limit) = self.limits.output_stream_limit {
            if self.counters_resource.bytes_emitted > limit {
                let remaining = limit.saturating_sub(self.output.len());
                self.output.push_str(&text[..remaining.min(text.len())]);
                return Err(Error::OutputStreamLimit {
                    limit,
                    template_name: self.template_name.clone(),
                });
            }
        }
        self.output.push_str(text);
        Ok(())
    }

    pub fn enter_depth(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if let Some(limit) = self.limits.context_depth_limit {
            if self.depth > limit {
                return Err(Error::ContextDepthLimit {
                    limit,
                    template_name: self.template_name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn exit_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn account_loop_iterations(&mut self, count: usize) -> Result<(), Error> {
        self.counters_resource.loop_iterations += count;
        if let Some(limit) = self.limits.loop_iteration_limit {
            if self.counters_resource.loop_iterations > limit {
                return Err(Error::LoopIterationLimit {
                    limit,
                    template_name: self.template_name.clone(),
                });
            }
        }
        if let Some(limit) = self.limits.local_namespace_limit {
            if self.counters_resource.local_namespace_bytes > limit {
                return Err(Error::LocalNamespaceLimit {
                    limit,
                    template_name: self.template_name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn undefined_error_at(&self, path: impl Into<String>, loc: Location) -> Error {
        Error::undefined(path, self.template_name.clone(), loc)
    }
}

/// Coarse byte-size approximation used to enforce `local_namespace_limit`;
/// the spec permits a registered sizing function rather than exact
/// accounting.
pub fn approximate_size(value: &Value) -> usize {
    match value {
        Value::Nil | Value::Undefined(_) => 0,
        Value::Bool(_) => 1,
        Value::Int(_) => 8,
        Value::Float(_) => 8,
        Value::String(s) => s.len(),
        Value::Range(..) => 16,
        Value::Sequence(items) => items.iter().map(approximate_size).sum::<usize>() + 16,
        Value::Mapping(map) => {
            map.iter().map(|(k, v)| k.len() + approximate_size(v)).sum::<usize>() + 16
        }
        Value::Drop(_) => 32,
    }
}
