// SPDX-License-Identifier: Apache-2.0 OR MIT
use liquid_engine::context::RenderContext;
use liquid_engine::error::Location;
use liquid_engine::{Error, Value};

mod date;
mod dict;
mod flow;
mod lists;
mod string_slice;
mod strings;

pub fn install_all(builder: &mut liquid_engine::FilterRegistryBuilder) {
    strings::register(builder);
    string_slice::register(builder);
    lists::register(builder);
    dict::register(builder);
    flow::register(builder);
    date::register(builder);
}

pub(crate) fn filter_error(ctx: &RenderContext, message: impl Into<String>) -> Error {
    Error::filter(message, ctx.template_name.clone(), Location::default())
}

pub(crate) fn expect_min_args(
    ctx: &RenderContext,
    name: &'static str,
    args: &[Value],
    min: usize,
) -> Result<(), Error> {
    if args.len() < min {
        return Err(filter_error(
            ctx,
            format!("{name} expected at least {min} arguments, got {}", args.len()),
        ));
    }
    Ok(())
}

pub(crate) fn expect_exact_args(
    ctx: &RenderContext,
    name: &'static str,
    args: &[Value],
    expected: usize,
) -> Result<(), Error> {
    if args.len() != expected {
        return Err(filter_error(
            ctx,
            format!(
                "{name} expected {expected} argument{}, got {}",
                if expected == 1 { "" } else { "s" },
                args.len()
            ),
        ));
    }
    Ok(())
}

/// Every string-receiving filter must stringify a non-string input using
/// the value's canonical string form rather than rejecting it.
pub(crate) fn stringify(value: &Value) -> String {
    value.as_str_lossy()
}

/// Coerces a value into the sequence a filter iterates over; `nil`/
/// `undefined` count as an empty sequence, anything else that cannot be
/// sequenced is a filter error.
pub(crate) fn expect_sequence(
    ctx: &RenderContext,
    name: &'static str,
    value: &Value,
) -> Result<Vec<Value>, Error> {
    value
        .as_sequence()
        .ok_or_else(|| filter_error(ctx, format!("{name} expects an array input, got {}", value.type_name())))
}

pub(crate) fn named_or_positional<'a>(
    named: &'a [(String, Value)],
    positional: &'a [Value],
    key: &str,
    index: usize,
) -> Option<&'a Value> {
    named
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
        .or_else(|| positional.get(index))
}

pub(crate) fn as_i64(value: &Value) -> i64 {
    value.coerce_number().as_i64().unwrap_or(0)
}

pub(crate) fn as_f64(value: &Value) -> f64 {
    value.coerce_number().as_f64().unwrap_or(0.0)
}

pub(crate) fn as_usize(value: &Value) -> usize {
    as_i64(value).max(0) as usize
}

#[cfg(test)]
pub(crate) fn empty_context() -> RenderContext {
    use liquid_engine::{Mapping, ResourceLimits, UndefinedVariant};
    RenderContext::new(
        Mapping::new(),
        ResourceLimits::default(),
        UndefinedVariant::Lenient,
        "test",
    )
}
