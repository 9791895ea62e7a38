#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Lexer, parser, value model, expression evaluator and render engine for a
//! Liquid-dialect template language.
//!
//! This crate is the core: everything a host needs to parse a template once
//! and render it against data many times, with tag/filter registries shared
//! immutably across concurrent renders. `liquid-core` and `liquid-filters`
//! build the standard filter library on top of the `FilterRegistry`,
//! `Value` and `Drop` types exported here.

pub mod ast;
pub mod cache;
pub mod context;
pub mod error;
pub mod eval;
mod expr_parser;
pub mod lexer;
pub mod parser;
pub mod registry;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod value;

use std::sync::Arc;
use std::time::Instant;

pub use ast::{Ast, Block, Node, Span};
pub use cache::{Cache, Loader, SourceRecord};
pub use context::{ControlFlow, ResourceLimits, UndefinedVariant};
pub use error::{Diagnostic, Error, Location};
pub use parser::ToleranceMode;
pub use registry::{Filter, FilterRegistry, FilterRegistryBuilder};
pub use value::{Drop, Mapping, Value};

use ast::{
    CaseNode, CycleNode, ForNode, IfNode, IfchangedNode, IncludeNode, OffsetSpec, PartialArgs,
    RenderNode, TableRowNode, UnlessNode,
};
use context::{LoopFrame, RenderContext};

/// Escapes the five HTML-significant characters; the auto-escape hook
/// (`spec.md` §4.4) and `liquid-core`'s `escape` filter share this
/// implementation rather than each carrying their own.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A pre-escaped string value. This is the auto-escape policy's hook point:
/// rather than giving `Value` a dedicated "markup" variant, safe output is
/// just a `Drop` whose `to_html` returns the text unescaped — `liquid-core`'s
/// `safe`/`escape` filters construct one through the ordinary capability
/// interface instead of a bespoke value kind.
#[derive(Debug)]
pub struct Markup(pub String);

impl value::Drop for Markup {
    fn has_member(&self, _name: &str) -> bool {
        false
    }

    fn get_member(&self, _name: &str) -> Option<Value> {
        None
    }

    fn to_primitive(&self) -> Option<Value> {
        Some(Value::str(self.0.clone()))
    }

    fn to_html(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Every option named in `spec.md` §6 ("Environment configuration recognized
/// options"), built once and shared immutably (`Arc`) across concurrent
/// renders, mirroring the predecessor's `FunctionRegistry`/
/// `FunctionRegistryBuilder` split.
pub struct Environment {
    pub tolerance: ToleranceMode,
    pub undefined_variant: UndefinedVariant,
    pub strict_filters: bool,
    pub autoescape: bool,
    pub auto_reload: bool,
    /// Accepted for API completeness; expressions are compiled once into
    /// the `Ast` at parse time rather than re-lexed per render, so there is
    /// no separate expression cache to size.
    pub expression_cache_size: i64,
    pub globals: Mapping,
    /// Recognised but not yet wired into the scanner: `parser`'s delimiter
    /// search is fixed to `{{`/`}}`/`{%`/`%}`. Kept here so a future
    /// scanner revision has a configuration slot to read from.
    pub enable_template_comments: bool,
    pub render_whitespace_only_blocks: bool,
    pub limits: ResourceLimits,
    pub filters: FilterRegistry,
    pub loader: Option<Arc<dyn Loader>>,
    /// Tag names rejected with `Error::DisabledTag` wherever encountered;
    /// used by hosts that embed untrusted templates and want to forbid
    /// e.g. `include`.
    pub disabled_tags: std::collections::HashSet<String>,
    cache: Arc<dyn Cache>,
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Parses `source` under this environment's tolerance mode.
    pub fn parse(&self, name: &str, source: &str) -> Result<(Template, Vec<Diagnostic>), Error> {
        let start = Instant::now();
        let result = parser::parse_template(name, source, self.tolerance);
        #[cfg(feature = "telemetry")]
        telemetry::record_parse(name, source.len(), start.elapsed(), result.is_ok());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;
        let outcome = result?;
        Ok((
            Template {
                name: name.to_string(),
                ast: Arc::new(outcome.ast),
                globals: Mapping::new(),
                matter: Mapping::new(),
                origin: name.to_string(),
            },
            outcome.diagnostics,
        ))
    }

    /// Loads `name` through the configured loader, honouring the template
    /// cache's staleness/LRU policy (`spec.md` §4.2, §4.6).
    fn load(&self, name: &str) -> Result<Arc<Ast>, Error> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| Error::template_not_found(name))?;
        let tolerance = self.tolerance;
        cache::load_cached(self.cache.as_ref(), loader.as_ref(), name, |n, src| {
            Ok(parser::parse_template(n, src, tolerance)?.ast)
        })
    }
}

/// Builder for [`Environment`]; every setter corresponds to one option in
/// `spec.md` §6.
pub struct EnvironmentBuilder {
    tolerance: ToleranceMode,
    undefined_variant: UndefinedVariant,
    strict_filters: bool,
    autoescape: bool,
    auto_reload: bool,
    cache_size: i64,
    expression_cache_size: i64,
    globals: Mapping,
    enable_template_comments: bool,
    render_whitespace_only_blocks: bool,
    limits: ResourceLimits,
    filters: FilterRegistryBuilder,
    loader: Option<Arc<dyn Loader>>,
    disabled_tags: std::collections::HashSet<String>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self {
            tolerance: ToleranceMode::Strict,
            undefined_variant: UndefinedVariant::Lenient,
            strict_filters: false,
            autoescape: false,
            auto_reload: true,
            cache_size: 100,
            expression_cache_size: 0,
            globals: Mapping::new(),
            enable_template_comments: false,
            render_whitespace_only_blocks: true,
            limits: ResourceLimits::default(),
            filters: FilterRegistryBuilder::new(),
            loader: None,
            disabled_tags: std::collections::HashSet::new(),
        }
    }
}

impl EnvironmentBuilder {
    pub fn tolerance(mut self, tolerance: ToleranceMode) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn undefined_variant(mut self, variant: UndefinedVariant) -> Self {
        self.undefined_variant = variant;
        self
    }

    pub fn strict_filters(mut self, strict: bool) -> Self {
        self.strict_filters = strict;
        self
    }

    pub fn autoescape(mut self, enabled: bool) -> Self {
        self.autoescape = enabled;
        self
    }

    pub fn auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    pub fn cache_size(mut self, size: i64) -> Self {
        self.cache_size = size;
        self
    }

    pub fn expression_cache_size(mut self, size: i64) -> Self {
        self.expression_cache_size = size;
        self
    }

    pub fn globals(mut self, globals: Mapping) -> Self {
        self.globals = globals;
        self
    }

    pub fn enable_template_comments(mut self, enabled: bool) -> Self {
        self.enable_template_comments = enabled;
        self
    }

    pub fn render_whitespace_only_blocks(mut self, enabled: bool) -> Self {
        self.render_whitespace_only_blocks = enabled;
        self
    }

    pub fn context_depth_limit(mut self, limit: usize) -> Self {
        self.limits.context_depth_limit = Some(limit);
        self
    }

    pub fn loop_iteration_limit(mut self, limit: usize) -> Self {
        self.limits.loop_iteration_limit = Some(limit);
        self
    }

    pub fn local_namespace_limit(mut self, limit: usize) -> Self {
        self.limits.local_namespace_limit = Some(limit);
        self
    }

    pub fn output_stream_limit(mut self, limit: usize) -> Self {
        self.limits.output_stream_limit = Some(limit);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn disable_tag(mut self, tag: impl Into<String>) -> Self {
        self.disabled_tags.insert(tag.into());
        self
    }

    pub fn filters(mut self, registry: FilterRegistry) -> Self {
        self.filters.merge(registry);
        self
    }

    pub fn register_filter<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut RenderContext, Value, &[Value], &[(String, Value)]) -> Result<Value, Error>
            + Send
            + Sync
            + 'static,
    {
        self.filters.register(name, f);
        self
    }

    pub fn build(self) -> Environment {
        Environment {
            tolerance: self.tolerance,
            undefined_variant: self.undefined_variant,
            strict_filters: self.strict_filters,
            autoescape: self.autoescape,
            auto_reload: self.auto_reload,
            expression_cache_size: self.expression_cache_size,
            globals: self.globals,
            enable_template_comments: self.enable_template_comments,
            render_whitespace_only_blocks: self.render_whitespace_only_blocks,
            limits: self.limits,
            filters: self.filters.build(),
            loader: self.loader,
            disabled_tags: self.disabled_tags,
            cache: Arc::from(cache::build_cache(self.cache_size)),
        }
    }
}

/// `{ name, ast, globals, matter, origin }` per `spec.md` §3; immutable
/// after parse. Multiple renders, possibly concurrent, read it without
/// mutation.
pub struct Template {
    name: String,
    ast: Arc<Ast>,
    /// Template-scoped globals, layered between the environment's globals
    /// and any loader-supplied front matter.
    pub globals: Mapping,
    /// Loader-supplied front matter, if any (`spec.md` §4.6).
    pub matter: Mapping,
    origin: String,
}

/// Result of a render: the output text plus any non-fatal diagnostics
/// collected under `warn` tolerance.
#[derive(Debug)]
pub struct RenderOutcome {
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Renders against `vars`, merged into globals for the call's duration:
    /// render-kwargs win, then matter, then template globals, then
    /// environment globals (`spec.md` §3).
    pub fn render(&self, env: &Environment, vars: &Mapping) -> Result<RenderOutcome, Error> {
        let start = Instant::now();
        let mut globals = env.globals.clone();
        for (k, v) in self.globals.iter() {
            globals.insert(k.clone(), v.clone());
        }
        for (k, v) in self.matter.iter() {
            globals.insert(k.clone(), v.clone());
        }
        for (k, v) in vars.iter() {
            globals.insert(k.clone(), v.clone());
        }
        let mut ctx = RenderContext::new(globals, env.limits, env.undefined_variant, self.name.clone());
        ctx.disabled_tags = env.disabled_tags.clone();
        let mut diagnostics = Vec::new();
        let result = render_block(env, &mut ctx, &mut diagnostics, &self.ast.root);
        #[cfg(feature = "telemetry")]
        telemetry::record_render(&self.name, self.ast.root.nodes.len(), start.elapsed(), result.is_ok());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;
        result?;
        Ok(RenderOutcome {
            output: ctx.output,
            diagnostics,
        })
    }
}

/// Renders a top-level source string once, without caching or partials.
/// The out-of-scope convenience entry point `render(source, **vars)` from
/// `spec.md` §1 — a thin composition of `Environment::parse` +
/// `Template::render`.
pub fn render(source: &str, vars: &Mapping) -> Result<String, Error> {
    let env = Environment::builder().build();
    let (template, _) = env.parse("template", source)?;
    Ok(template.render(&env, vars)?.output)
}

/// Walks `block`'s nodes in order, downgrading non-fatal errors to a
/// collected diagnostic and skipping the offending node under `warn`/`lax`
/// tolerance (`spec.md` §7); resource-limit errors are always fatal.
fn render_block(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    block: &Block,
) -> Result<ControlFlow, Error> {
    for node in &block.nodes {
        match render_node(env, ctx, diags, node) {
            Ok(ControlFlow::Normal) => {}
            Ok(flow) => return Ok(flow),
            Err(e) => {
                if e.is_resource_limit() {
                    return Err(e);
                }
                match env.tolerance {
                    ToleranceMode::Strict => return Err(e),
                    ToleranceMode::Warn => diags.push(Diagnostic::from_error(&e)),
                    ToleranceMode::Lax => {}
                }
            }
        }
    }
    Ok(ControlFlow::Normal)
}

fn render_node(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    node: &Node,
) -> Result<ControlFlow, Error> {
    let loc = Location::from_span(node.span());
    match node {
        Node::TextLiteral(text) => {
            if !env.render_whitespace_only_blocks
                && text.text.contains('\n')
                && text.text.trim().is_empty()
            {
                return Ok(ControlFlow::Normal);
            }
            ctx.write(&text.text)?;
            Ok(ControlFlow::Normal)
        }
        Node::Output(out) => {
            let value = eval::eval_filtered_expression(&out.expr, ctx, &env.filters, env.strict_filters, loc)?;
            write_value(env, ctx, &value, loc)?;
            Ok(ControlFlow::Normal)
        }
        Node::Echo(echo) => {
            let value = eval::eval_filtered_expression(&echo.expr, ctx, &env.filters, env.strict_filters, loc)?;
            write_value(env, ctx, &value, loc)?;
            Ok(ControlFlow::Normal)
        }
        Node::If(n) => render_if(env, ctx, diags, n, loc),
        Node::Unless(n) => render_unless(env, ctx, diags, n, loc),
        Node::Case(n) => render_case(env, ctx, diags, n, loc),
        Node::For(n) => render_for(env, ctx, diags, n, loc),
        Node::TableRow(n) => render_tablerow(env, ctx, diags, n, loc),
        Node::Capture(n) => {
            let captured = render_captured(env, ctx, diags, &n.body)?;
            ctx.set_local(n.name.clone(), Value::str(captured));
            Ok(ControlFlow::Normal)
        }
        Node::Assign(n) => {
            let value = eval::eval_filtered_expression(&n.expr, ctx, &env.filters, env.strict_filters, loc)?;
            ctx.set_local(n.name.clone(), value);
            Ok(ControlFlow::Normal)
        }
        Node::Increment(n) => {
            let counter = ctx.counters.entry(n.name.clone()).or_insert(0);
            let value = *counter;
            *counter += 1;
            ctx.write(&value.to_string())?;
            Ok(ControlFlow::Normal)
        }
        Node::Decrement(n) => {
            let counter = ctx.counters.entry(n.name.clone()).or_insert(0);
            *counter -= 1;
            let value = *counter;
            ctx.write(&value.to_string())?;
            Ok(ControlFlow::Normal)
        }
        Node::Cycle(n) => render_cycle(ctx, n, loc),
        Node::Include(n) => render_include(env, ctx, diags, n, loc),
        Node::Render(n) => render_render(env, ctx, diags, n, loc),
        Node::Raw(n) => {
            ctx.write(&n.text)?;
            Ok(ControlFlow::Normal)
        }
        Node::Comment(_) => Ok(ControlFlow::Normal),
        Node::Liquid(n) => render_block(env, ctx, diags, &n.statements),
        Node::Ifchanged(n) => render_ifchanged(env, ctx, diags, n),
        Node::Break(_) => Ok(ControlFlow::Break),
        Node::Continue(_) => Ok(ControlFlow::Continue),
    }
}

/// The auto-escape hook (`spec.md` §4.4): plain strings are escaped when
/// `autoescape` is on; a `Drop` whose `to_html` returns `Some` (i.e. a
/// [`Markup`] value) passes through unescaped.
///
/// Also the undefined protocol's (`spec.md` §4.8) non-boolean-access choke
/// point for output statements: `falsy_strict` undefined is only falsy in
/// boolean position (`if`/`unless`/`and`/`or`), so writing one to the
/// output raises rather than silently rendering empty text.
fn write_value(env: &Environment, ctx: &mut RenderContext, value: &Value, loc: Location) -> Result<(), Error> {
    if let Value::Undefined(u) = value {
        if u.variant == UndefinedVariant::FalsyStrict {
            return Err(ctx.undefined_error_at(u.path.clone(), loc));
        }
    }
    if env.autoescape {
        if let Value::Drop(drop) = value {
            if let Some(html) = drop.to_html() {
                return ctx.write(&html);
            }
        }
        ctx.write(&escape_html(&value::stringify(value)))
    } else {
        ctx.write(&value::stringify(value))
    }
}

fn render_if(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &IfNode,
    loc: Location,
) -> Result<ControlFlow, Error> {
    if eval::eval_boolean_expression(&n.cond, ctx, &env.filters, env.strict_filters, loc)? {
        return render_block(env, ctx, diags, &n.then_block);
    }
    for branch in &n.elsif_branches {
        let branch_loc = Location::from_span(branch.span);
        if eval::eval_boolean_expression(&branch.cond, ctx, &env.filters, env.strict_filters, branch_loc)? {
            return render_block(env, ctx, diags, &branch.block);
        }
    }
    match &n.else_block {
        Some(block) => render_block(env, ctx, diags, block),
        None => Ok(ControlFlow::Normal),
    }
}

fn render_unless(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &UnlessNode,
    loc: Location,
) -> Result<ControlFlow, Error> {
    let cond = eval::eval_boolean_expression(&n.cond, ctx, &env.filters, env.strict_filters, loc)?;
    if !cond {
        render_block(env, ctx, diags, &n.then_block)
    } else {
        match &n.else_block {
            Some(block) => render_block(env, ctx, diags, block),
            None => Ok(ControlFlow::Normal),
        }
    }
}

fn render_case(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &CaseNode,
    loc: Location,
) -> Result<ControlFlow, Error> {
    let subject = eval::eval_expression(&n.expr, ctx, loc)?;
    let mut matched = false;
    for when in &n.whens {
        let when_loc = Location::from_span(when.span);
        let mut is_match = false;
        for candidate in &when.values {
            if eval::eval_expression(candidate, ctx, when_loc)? == subject {
                is_match = true;
                break;
            }
        }
        if is_match {
            matched = true;
            match render_block(env, ctx, diags, &when.block)? {
                ControlFlow::Normal => {}
                flow => return Ok(flow),
            }
        }
    }
    if !matched {
        if let Some(block) = &n.else_block {
            return render_block(env, ctx, diags, block);
        }
    }
    Ok(ControlFlow::Normal)
}

fn render_for(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &ForNode,
    loc: Location,
) -> Result<ControlFlow, Error> {
    let iterable = eval::eval_expression(&n.loop_expr.iterable, ctx, loc)?;
    let cursor_key = (n.var.clone(), iterable.iterable_identity());
    let mut items = iterable.as_sequence().unwrap_or_default();
    if n.loop_expr.reversed {
        items.reverse();
    }

    let start_offset = match &n.loop_expr.offset {
        OffsetSpec::None => 0usize,
        OffsetSpec::Fixed(expr) => eval::eval_expression(expr, ctx, loc)?.as_i64().unwrap_or(0).max(0) as usize,
        OffsetSpec::Continue => ctx.loop_cursors.get(&cursor_key).copied().unwrap_or(0),
    };
    let remaining: Vec<Value> = items.into_iter().skip(start_offset).collect();
    let limit = match &n.loop_expr.limit {
        Some(expr) => eval::eval_expression(expr, ctx, loc)?.as_i64().unwrap_or(0).max(0) as usize,
        None => remaining.len(),
    };
    let slice: Vec<Value> = remaining.into_iter().take(limit).collect();
    ctx.loop_cursors.insert(cursor_key, start_offset + slice.len());

    if slice.is_empty() {
        return match &n.else_block {
            Some(block) => render_block(env, ctx, diags, block),
            None => Ok(ControlFlow::Normal),
        };
    }

    let parent = if ctx.loop_stack.is_empty() {
        None
    } else {
        Some(ctx.loop_stack.len() - 1)
    };
    ctx.loop_stack.push(LoopFrame {
        name: n.var.clone(),
        length: slice.len(),
        index0: 0,
        parent,
    });

    let mut broke = false;
    for (index0, item) in slice.into_iter().enumerate() {
        ctx.account_loop_iterations(1)?;
        if let Some(frame) = ctx.loop_stack.last_mut() {
            frame.index0 = index0;
        }
        let forloop_value = {
            let frame = ctx.loop_stack.last().expect("frame just pushed");
            frame.to_forloop_value(&ctx.loop_stack)
        };
        ctx.push_frame();
        ctx.set_local(n.var.clone(), item);
        ctx.set_local("forloop", forloop_value);
        let flow = render_block(env, ctx, diags, &n.then_block);
        ctx.pop_frame();
        match flow? {
            ControlFlow::Normal | ControlFlow::Continue => {}
            ControlFlow::Break => {
                broke = true;
                break;
            }
        }
    }
    ctx.loop_stack.pop();
    let _ = broke;
    Ok(ControlFlow::Normal)
}

fn render_tablerow(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &TableRowNode,
    loc: Location,
) -> Result<ControlFlow, Error> {
    let iterable = eval::eval_expression(&n.loop_expr.iterable, ctx, loc)?;
    let mut items = iterable.as_sequence().unwrap_or_default();
    if n.loop_expr.reversed {
        items.reverse();
    }
    let offset = match &n.loop_expr.offset {
        OffsetSpec::None => 0usize,
        OffsetSpec::Fixed(expr) => eval::eval_expression(expr, ctx, loc)?.as_i64().unwrap_or(0).max(0) as usize,
        OffsetSpec::Continue => 0,
    };
    let items: Vec<Value> = items.into_iter().skip(offset).collect();
    let limit = match &n.loop_expr.limit {
        Some(expr) => eval::eval_expression(expr, ctx, loc)?.as_i64().unwrap_or(0).max(0) as usize,
        None => items.len(),
    };
    let items: Vec<Value> = items.into_iter().take(limit).collect();
    let cols = match &n.loop_expr.cols {
        Some(expr) => eval::eval_expression(expr, ctx, loc)?.as_i64().unwrap_or(0).max(1) as usize,
        None => items.len().max(1),
    };

    let length = items.len();
    ctx.push_frame();
    for (index0, item) in items.into_iter().enumerate() {
        ctx.account_loop_iterations(1)?;
        let col0 = index0 % cols;
        if col0 == 0 {
            if index0 > 0 {
                ctx.write("</tr>")?;
            }
            ctx.write(&format!("<tr class=\"row{}\">", index0 / cols + 1))?;
        }
        ctx.write(&format!("<td class=\"col{}\">", col0 + 1))?;

        let mut tablerowloop = Mapping::new();
        tablerowloop.insert("length", Value::Int(length as i64));
        tablerowloop.insert("index", Value::Int(index0 as i64 + 1));
        tablerowloop.insert("index0", Value::Int(index0 as i64));
        tablerowloop.insert("rindex", Value::Int((length - index0) as i64));
        tablerowloop.insert("rindex0", Value::Int((length - index0 - 1) as i64));
        tablerowloop.insert("first", Value::Bool(index0 == 0));
        tablerowloop.insert("last", Value::Bool(index0 + 1 == length));
        tablerowloop.insert("col", Value::Int(col0 as i64 + 1));
        tablerowloop.insert("col0", Value::Int(col0 as i64));
        tablerowloop.insert("col_first", Value::Bool(col0 == 0));
        tablerowloop.insert("col_last", Value::Bool(col0 + 1 == cols));

        ctx.set_local(n.var.clone(), item);
        ctx.set_local("tablerowloop", Value::map(tablerowloop));
        match render_block(env, ctx, diags, &n.body)? {
            ControlFlow::Break => break,
            ControlFlow::Normal | ControlFlow::Continue => {}
        }
        ctx.write("</td>")?;
    }
    if length > 0 {
        ctx.write("</tr>")?;
    }
    ctx.pop_frame();
    Ok(ControlFlow::Normal)
}

fn render_captured(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    block: &Block,
) -> Result<String, Error> {
    let saved = std::mem::take(&mut ctx.output);
    let result = render_block(env, ctx, diags, block);
    let captured = std::mem::replace(&mut ctx.output, saved);
    result?;
    Ok(captured)
}

fn render_ifchanged(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &IfchangedNode,
) -> Result<ControlFlow, Error> {
    let captured = render_captured(env, ctx, diags, &n.body)?;
    let key = n.span.start;
    let changed = ctx.ifchanged_last.get(&key) != Some(&captured);
    if changed {
        ctx.ifchanged_last.insert(key, captured.clone());
        ctx.write(&captured)?;
    }
    Ok(ControlFlow::Normal)
}

/// Cursor keyed by group name AND the stringified argument tuple (the
/// "arguments are part of the key" reading of the cycle-distinctness open
/// question): two `cycle` tags sharing a group name but different argument
/// lists never share a cursor.
fn render_cycle(ctx: &mut RenderContext, n: &CycleNode, loc: Location) -> Result<ControlFlow, Error> {
    let group_key = match &n.group {
        Some(expr) => value::stringify(&eval::eval_expression(expr, ctx, loc)?),
        None => String::new(),
    };
    let mut values = Vec::with_capacity(n.values.len());
    for expr in &n.values {
        values.push(eval::eval_expression(expr, ctx, loc)?);
    }
    let args_key = values.iter().map(value::stringify).collect::<Vec<_>>().join("\u{1}");
    let key = format!("{group_key}\u{0}{args_key}");

    let index = *ctx.cycle_state.get(&key).unwrap_or(&0);
    let value = values.get(index % values.len().max(1)).cloned().unwrap_or(Value::Nil);
    ctx.cycle_state.insert(key, index + 1);
    ctx.write(&value::stringify(&value))?;
    Ok(ControlFlow::Normal)
}

/// Binds an `include`/`render` partial's `with`/`for` clause and keyword
/// parameters into the current top locals frame.
fn bind_partial_args(ctx: &mut RenderContext, args: &PartialArgs, default_name: &str, loc: Location) -> Result<(), Error> {
    if let Some(with) = &args.with_expr {
        let value = eval::eval_expression(&with.expr, ctx, loc)?;
        let name = with.alias.clone().unwrap_or_else(|| default_alias(default_name));
        ctx.set_local(name, value);
    }
    for (key, expr) in &args.params {
        let value = eval::eval_expression(expr, ctx, loc)?;
        ctx.set_local(key.clone(), value);
    }
    Ok(())
}

/// The implicit binding name Liquid gives a `with`/`for` value when no
/// `as` alias is supplied: the partial's own file-stem.
fn default_alias(name: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    base.split('.').next().unwrap_or(base).to_string()
}

fn render_include(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &IncludeNode,
    loc: Location,
) -> Result<ControlFlow, Error> {
    if ctx.disabled_tags.contains("include") {
        return Err(Error::disabled_tag("include", ctx.template_name.clone(), loc));
    }
    let name = value::stringify(&eval::eval_expression(&n.name, ctx, loc)?);
    let partial = env.load(&name)?;

    ctx.enter_depth()?;
    bind_partial_args(ctx, &n.args, &name, loc)?;
    let result = render_block(env, ctx, diags, &partial.root);
    ctx.exit_depth();
    result?;
    Ok(ControlFlow::Normal)
}

fn render_render(
    env: &Environment,
    ctx: &mut RenderContext,
    diags: &mut Vec<Diagnostic>,
    n: &RenderNode,
    loc: Location,
) -> Result<ControlFlow, Error> {
    let name = value::stringify(&eval::eval_expression(&n.name, ctx, loc)?);
    let partial = env.load(&name)?;

    ctx.enter_depth()?;
    let saved_locals = std::mem::replace(&mut ctx.locals, vec![Mapping::new()]);
    let include_was_disabled = ctx.disabled_tags.contains("include");
    ctx.disabled_tags.insert("include".to_string());

    let result = bind_partial_args(ctx, &n.args, &name, loc)
        .and_then(|()| render_block(env, ctx, diags, &partial.root));

    if !include_was_disabled {
        ctx.disabled_tags.remove("include");
    }
    ctx.locals = saved_locals;
    ctx.exit_depth();
    result?;
    Ok(ControlFlow::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, vars: Mapping) -> String {
        let env = Environment::builder().build();
        let (template, _) = env.parse("t", source).unwrap();
        template.render(&env, &vars).unwrap().output
    }

    #[test]
    fn scenario_a_output_statement() {
        let mut vars = Mapping::new();
        vars.insert("you", Value::str("World"));
        assert_eq!(run("Hello, {{ you }}!", vars), "Hello, World!");
    }

    #[test]
    fn scenario_b_assign_and_filters() {
        let env = Environment::builder()
            .register_filter("upcase", |_ctx, v, _pos, _named| Ok(Value::str(v.as_str_lossy().to_uppercase())))
            .register_filter("append", |_ctx, v, pos, _named| {
                Ok(Value::str(format!("{}{}", v.as_str_lossy(), pos[0].as_str_lossy())))
            })
            .build();
        let (template, _) = env.parse("t", "{% assign x = 'abc' %}{{ x | upcase | append: '!' }}").unwrap();
        let out = template.render(&env, &Mapping::new()).unwrap().output;
        assert_eq!(out, "ABC!");
    }

    #[test]
    fn boolean_right_associativity_property_renders_false() {
        // spec.md §8 property 3, rendered end to end (not just checked at
        // the parse-tree level): `and`/`or` share one right-associative
        // chain, so this must print "false", never "true".
        let source = "{% if true and false and false or true %}true{% else %}false{% endif %}";
        assert_eq!(run(source, Mapping::new()), "false");
    }

    #[test]
    fn scenario_c_for_over_range() {
        assert_eq!(
            run("{% for i in (1..3) %}{{ i }}{% endfor %}", Mapping::new()),
            "123"
        );
    }

    #[test]
    fn scenario_d_if_else_with_undefined() {
        let source = "{% if user %}hi {{user.name}}{% else %}hi guest{% endif %}";
        let mut vars = Mapping::new();
        let mut user = Mapping::new();
        user.insert("name", Value::str("Sue"));
        vars.insert("user", Value::map(user));
        assert_eq!(run(source, vars), "hi Sue");
        assert_eq!(run(source, Mapping::new()), "hi guest");
    }

    #[test]
    fn scenario_f_cycle_distinctness() {
        let env = Environment::builder()
            .register_filter("noop", |_ctx, v, _p, _n| Ok(v))
            .build();
        let source = "{% cycle 'a','b' %}-{% cycle 'a','b' %}-{% cycle 'a','b' %}";
        let (template, _) = env.parse("t", source).unwrap();
        let out = template.render(&env, &Mapping::new()).unwrap().output;
        assert_eq!(out, "a-b-a");
    }

    #[test]
    fn cycle_distinguishes_same_group_different_arguments() {
        let env = Environment::builder().build();
        let source = "{% cycle 'g': 'a','b' %}{% cycle 'g': 'x','y' %}{% cycle 'g': 'a','b' %}";
        let (template, _) = env.parse("t", source).unwrap();
        let out = template.render(&env, &Mapping::new()).unwrap().output;
        assert_eq!(out, "axb");
    }

    #[test]
    fn for_offset_continue_visits_each_element_once() {
        let mut vars = Mapping::new();
        vars.insert("items", Value::seq(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]));
        let source = "{% for x in items limit: 2 %}{{ x }}{% endfor %}{% for x in items limit: 2 offset: continue %}{{ x }}{% endfor %}";
        assert_eq!(run(source, vars), "1234");
    }

    #[test]
    fn for_offset_continue_does_not_bleed_across_distinct_iterables_sharing_a_var_name() {
        let mut vars = Mapping::new();
        vars.insert("a", Value::seq(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]));
        vars.insert("b", Value::seq(vec![Value::Int(9), Value::Int(8), Value::Int(7)]));
        // Both loops use the same loop variable name ("x") but iterate distinct
        // collections; a cursor keyed on the name alone would make the second
        // loop's `offset: continue` wrongly resume from the first loop's cursor.
        let source = "{% for x in a limit: 2 %}{{ x }}{% endfor %}\
                       {% for x in b limit: 1 %}{{ x }}{% endfor %}\
                       {% for x in a limit: 2 offset: continue %}{{ x }}{% endfor %}\
                       {% for x in b limit: 2 offset: continue %}{{ x }}{% endfor %}";
        assert_eq!(run(source, vars), "1293487");
    }

    #[test]
    fn include_leaks_assigns_render_does_not() {
        struct Fixture;
        impl Loader for Fixture {
            fn get_source(&self, name: &str) -> Result<SourceRecord, Error> {
                match name {
                    "inc" => Ok(SourceRecord { text: "{% assign leaked = 'yes' %}".to_string(), origin: name.to_string(), matter: None }),
                    "ren" => Ok(SourceRecord { text: "{% assign leaked = 'yes' %}".to_string(), origin: name.to_string(), matter: None }),
                    _ => Err(Error::template_not_found(name)),
                }
            }
        }
        let env = Environment::builder().loader(Arc::new(Fixture)).build();

        let (t1, _) = env.parse("t1", "{% include 'inc' %}{{ leaked }}").unwrap();
        assert_eq!(t1.render(&env, &Mapping::new()).unwrap().output, "yes");

        let (t2, _) = env.parse("t2", "{% render 'ren' %}{{ leaked }}").unwrap();
        assert_eq!(t2.render(&env, &Mapping::new()).unwrap().output, "");
    }

    #[test]
    fn render_disables_include_in_the_partial_it_loads() {
        struct Fixture;
        impl Loader for Fixture {
            fn get_source(&self, name: &str) -> Result<SourceRecord, Error> {
                match name {
                    "outer" => Ok(SourceRecord {
                        text: "{% include 'inner' %}".to_string(),
                        origin: name.to_string(),
                        matter: None,
                    }),
                    "inner" => Ok(SourceRecord { text: "leaf".to_string(), origin: name.to_string(), matter: None }),
                    _ => Err(Error::template_not_found(name)),
                }
            }
        }
        let env = Environment::builder().loader(Arc::new(Fixture)).build();

        let (t1, _) = env.parse("t1", "{% include 'outer' %}").unwrap();
        assert_eq!(t1.render(&env, &Mapping::new()).unwrap().output, "leaf");

        let (t2, _) = env.parse("t2", "{% render 'outer' %}").unwrap();
        let err = t2.render(&env, &Mapping::new()).unwrap_err();
        assert!(matches!(err, Error::DisabledTag { .. }));
    }

    #[test]
    fn output_stream_limit_raises_and_truncates() {
        let env = Environment::builder().output_stream_limit(5).build();
        let (template, _) = env.parse("t", "abcdefgh").unwrap();
        let err = template.render(&env, &Mapping::new()).unwrap_err();
        assert!(matches!(err, Error::OutputStreamLimit { .. }));
    }

    #[test]
    fn falsy_strict_undefined_renders_fine_in_boolean_position_but_raises_on_output() {
        let env = Environment::builder().undefined_variant(UndefinedVariant::FalsyStrict).build();

        let (cond_template, _) = env.parse("t", "{% if missing %}yes{% else %}no{% endif %}").unwrap();
        assert_eq!(cond_template.render(&env, &Mapping::new()).unwrap().output, "no");

        let (output_template, _) = env.parse("t", "{{ missing }}").unwrap();
        let err = output_template.render(&env, &Mapping::new()).unwrap_err();
        assert!(matches!(err, Error::Undefined { .. }));
    }

    #[test]
    fn debug_undefined_renders_its_access_path_instead_of_disappearing() {
        let env = Environment::builder().undefined_variant(UndefinedVariant::Debug).build();
        let (template, _) = env.parse("t", "{{ missing.nested }}").unwrap();
        let out = template.render(&env, &Mapping::new()).unwrap().output;
        assert!(out.contains("missing.nested"));
    }

    #[test]
    fn ifchanged_suppresses_repeated_output() {
        let mut vars = Mapping::new();
        vars.insert("items", Value::seq(vec![Value::Int(1), Value::Int(1), Value::Int(2)]));
        let source = "{% for x in items %}{% ifchanged %}{{ x }}{% endifchanged %}{% endfor %}";
        assert_eq!(run(source, vars), "12");
    }

    #[test]
    fn warn_tolerance_collects_diagnostic_and_continues() {
        let env = Environment::builder().tolerance(ToleranceMode::Warn).build();
        let (template, parse_diags) = env.parse("t", "before {% bogus %} after").unwrap();
        assert_eq!(parse_diags.len(), 1);
        let outcome = template.render(&env, &Mapping::new()).unwrap();
        assert_eq!(outcome.output, "before  after");
    }
}
