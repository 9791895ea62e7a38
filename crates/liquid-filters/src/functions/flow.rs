// SPDX-License-Identifier: Apache-2.0 OR MIT
use liquid_engine::context::RenderContext;
use liquid_engine::{Error, FilterRegistryBuilder, Value};

use super::{expect_exact_args, expect_min_args, filter_error};

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder
        .register("abs", abs)
        .register("ceil", ceil)
        .register("floor", floor)
        .register("round", round)
        .register("plus", plus)
        .register("minus", minus)
        .register("times", times)
        .register("divided_by", divided_by)
        .register("modulo", modulo)
        .register("at_least", at_least)
        .register("at_most", at_most);
}

fn both_integral(a: &Value, b: &Value) -> bool {
    matches!(a.coerce_number(), Value::Int(_)) && matches!(b.coerce_number(), Value::Int(_))
}

fn abs(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(match input.coerce_number() {
        Value::Int(i) => Value::Int(i.abs()),
        Value::Float(f) => Value::Float(f.abs()),
        other => other,
    })
}

fn ceil(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let n = input.coerce_number().as_f64().unwrap_or(0.0);
    Ok(Value::Int(n.ceil() as i64))
}

fn floor(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let n = input.coerce_number().as_f64().unwrap_or(0.0);
    Ok(Value::Int(n.floor() as i64))
}

/// `round([digits])`; with no argument, rounds to the nearest integer.
fn round(
    _ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let n = input.coerce_number().as_f64().unwrap_or(0.0);
    match positional.first() {
        None => Ok(Value::Int(n.round() as i64)),
        Some(digits) => {
            let digits = digits.coerce_number().as_i64().unwrap_or(0).max(0) as i32;
            let factor = 10f64.powi(digits);
            Ok(Value::Float((n * factor).round() / factor))
        }
    }
}

fn plus(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "plus", positional, 1)?;
    let other = &positional[0];
    if both_integral(&input, other) {
        let a = input.coerce_number().as_i64().unwrap_or(0);
        let b = other.coerce_number().as_i64().unwrap_or(0);
        Ok(Value::Int(a + b))
    } else {
        let a = input.coerce_number().as_f64().unwrap_or(0.0);
        let b = other.coerce_number().as_f64().unwrap_or(0.0);
        Ok(Value::Float(a + b))
    }
}

fn minus(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "minus", positional, 1)?;
    let other = &positional[0];
    if both_integral(&input, other) {
        let a = input.coerce_number().as_i64().unwrap_or(0);
        let b = other.coerce_number().as_i64().unwrap_or(0);
        Ok(Value::Int(a - b))
    } else {
        let a = input.coerce_number().as_f64().unwrap_or(0.0);
        let b = other.coerce_number().as_f64().unwrap_or(0.0);
        Ok(Value::Float(a - b))
    }
}

fn times(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "times", positional, 1)?;
    let other = &positional[0];
    if both_integral(&input, other) {
        let a = input.coerce_number().as_i64().unwrap_or(0);
        let b = other.coerce_number().as_i64().unwrap_or(0);
        Ok(Value::Int(a * b))
    } else {
        let a = input.coerce_number().as_f64().unwrap_or(0.0);
        let b = other.coerce_number().as_f64().unwrap_or(0.0);
        Ok(Value::Float(a * b))
    }
}

/// Division by zero is always a fatal filter error, regardless of operand
/// types, rather than producing `inf`/`NaN`.
fn divided_by(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "divided_by", positional, 1)?;
    let other = &positional[0];
    if both_integral(&input, other) {
        let a = input.coerce_number().as_i64().unwrap_or(0);
        let b = other.coerce_number().as_i64().unwrap_or(0);
        if b == 0 {
            return Err(filter_error(ctx, "divided_by: division by zero"));
        }
        Ok(Value::Int(a.div_euclid(b)))
    } else {
        let a = input.coerce_number().as_f64().unwrap_or(0.0);
        let b = other.coerce_number().as_f64().unwrap_or(0.0);
        if b == 0.0 {
            return Err(filter_error(ctx, "divided_by: division by zero"));
        }
        Ok(Value::Float(a / b))
    }
}

fn modulo(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "modulo", positional, 1)?;
    let other = &positional[0];
    if both_integral(&input, other) {
        let a = input.coerce_number().as_i64().unwrap_or(0);
        let b = other.coerce_number().as_i64().unwrap_or(0);
        if b == 0 {
            return Err(filter_error(ctx, "modulo: division by zero"));
        }
        Ok(Value::Int(a.rem_euclid(b)))
    } else {
        let a = input.coerce_number().as_f64().unwrap_or(0.0);
        let b = other.coerce_number().as_f64().unwrap_or(0.0);
        if b == 0.0 {
            return Err(filter_error(ctx, "modulo: division by zero"));
        }
        Ok(Value::Float(a.rem_euclid(b)))
    }
}

fn at_least(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "at_least", positional, 1)?;
    let other = &positional[0];
    let a = input.coerce_number().as_f64().unwrap_or(0.0);
    let b = other.coerce_number().as_f64().unwrap_or(0.0);
    Ok(if a >= b { input } else { other.clone() })
}

fn at_most(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "at_most", positional, 1)?;
    let other = &positional[0];
    let a = input.coerce_number().as_f64().unwrap_or(0.0);
    let b = other.coerce_number().as_f64().unwrap_or(0.0);
    Ok(if a <= b { input } else { other.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        super::super::empty_context()
    }

    #[test]
    fn plus_stays_integral_for_two_integers() {
        let mut c = ctx();
        let out = plus(&mut c, Value::Int(2), &[Value::Int(3)], &[]).unwrap();
        assert_eq!(out, Value::Int(5));
    }

    #[test]
    fn plus_promotes_to_float_when_either_operand_is_float() {
        let mut c = ctx();
        let out = plus(&mut c, Value::Int(2), &[Value::Float(0.5)], &[]).unwrap();
        assert_eq!(out, Value::Float(2.5));
    }

    #[test]
    fn divided_by_rejects_zero_divisor() {
        let mut c = ctx();
        let err = divided_by(&mut c, Value::Int(4), &[Value::Int(0)], &[]);
        assert!(err.is_err());
    }

    #[test]
    fn divided_by_performs_integer_division_for_two_integers() {
        let mut c = ctx();
        let out = divided_by(&mut c, Value::Int(7), &[Value::Int(2)], &[]).unwrap();
        assert_eq!(out, Value::Int(3));
    }

    #[test]
    fn round_with_digits_returns_a_float() {
        let mut c = ctx();
        let out = round(&mut c, Value::Float(3.14159), &[Value::Int(2)], &[]).unwrap();
        assert_eq!(out, Value::Float(3.14));
    }

    #[test]
    fn at_least_and_at_most_clamp_the_input() {
        let mut c = ctx();
        let out = at_least(&mut c, Value::Int(3), &[Value::Int(5)], &[]).unwrap();
        assert_eq!(out, Value::Int(5));
        let out = at_most(&mut c, Value::Int(3), &[Value::Int(1)], &[]).unwrap();
        assert_eq!(out, Value::Int(1));
    }
}
