// SPDX-License-Identifier: Apache-2.0 OR MIT
use liquid_engine::context::RenderContext;
use liquid_engine::{Error, FilterRegistryBuilder, Value};

use super::{expect_min_args, named_or_positional};

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder.register("default", default);
}

/// `default: value[, allow_false: bool]`. Triggers when the input is nil,
/// undefined, empty, or `false` (the last case unless `allow_false` is set).
fn default(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "default", positional, 1)?;
    let fallback = positional[0].clone();
    let allow_false = named_or_positional(named, positional, "allow_false", 1)
        .map(Value::is_truthy)
        .unwrap_or(false);

    let is_falsey_bool = matches!(input, Value::Bool(false)) && !allow_false;
    let trigger =
        matches!(input, Value::Nil | Value::Undefined(_)) || is_falsey_bool || input.is_empty();

    Ok(if trigger { fallback } else { input })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        super::super::empty_context()
    }

    #[test]
    fn default_triggers_on_nil_and_empty() {
        let mut c = ctx();
        let out = default(&mut c, Value::Nil, &[Value::str("x")], &[]).unwrap();
        assert_eq!(out, Value::str("x"));
        let out = default(&mut c, Value::str(""), &[Value::str("x")], &[]).unwrap();
        assert_eq!(out, Value::str("x"));
    }

    #[test]
    fn default_treats_false_as_triggering_unless_allowed() {
        let mut c = ctx();
        let out = default(&mut c, Value::Bool(false), &[Value::str("x")], &[]).unwrap();
        assert_eq!(out, Value::str("x"));

        let out = default(
            &mut c,
            Value::Bool(false),
            &[Value::str("x"), Value::Bool(true)],
            &[],
        )
        .unwrap();
        assert_eq!(out, Value::Bool(false));
    }

    #[test]
    fn default_passes_through_truthy_input() {
        let mut c = ctx();
        let out = default(&mut c, Value::Int(5), &[Value::str("x")], &[]).unwrap();
        assert_eq!(out, Value::Int(5));
    }
}
