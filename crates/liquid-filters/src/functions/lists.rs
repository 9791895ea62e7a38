// SPDX-License-Identifier: Apache-2.0 OR MIT
use liquid_engine::context::RenderContext;
use liquid_engine::value::compare;
use liquid_engine::{Drop, Error, FilterRegistryBuilder, Value};

use super::{expect_min_args, expect_sequence, stringify};

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder
        .register("join", join)
        .register("first", first)
        .register("last", last)
        .register("size", size)
        .register("reverse", reverse)
        .register("sort", sort)
        .register("sort_natural", sort_natural)
        .register("uniq", uniq)
        .register("compact", compact)
        .register("map", map)
        .register("where", where_filter)
        .register("concat", concat)
        .register("sum", sum);
}

fn member(value: &Value, key: &str) -> Value {
    match value {
        Value::Mapping(map) => map.get(key).cloned().unwrap_or(Value::Nil),
        Value::Drop(drop) => drop.get_member(key).unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}

fn join(
    _ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let items = input.as_sequence().unwrap_or_default();
    let sep = positional.first().map(stringify).unwrap_or_else(|| " ".to_string());
    let joined = items
        .iter()
        .map(stringify)
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(Value::str(joined))
}

fn first(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(input
        .as_sequence()
        .and_then(|items| items.into_iter().next())
        .unwrap_or(Value::Nil))
}

fn last(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(input
        .as_sequence()
        .and_then(|items| items.into_iter().next_back())
        .unwrap_or(Value::Nil))
}

fn size(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let len = match &input {
        Value::String(s) => s.chars().count(),
        Value::Sequence(items) => items.len(),
        Value::Mapping(map) => map.len(),
        Value::Range(start, stop) => (stop - start + 1).max(0) as usize,
        _ => 0,
    };
    Ok(Value::Int(len as i64))
}

fn reverse(
    ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let mut items = expect_sequence(ctx, "reverse", &input)?;
    items.reverse();
    Ok(Value::seq(items))
}

fn sort(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let mut items = expect_sequence(ctx, "sort", &input)?;
    let key = positional.first().map(stringify);
    items.sort_by(|a, b| {
        let (a, b) = match &key {
            Some(k) => (member(a, k), member(b, k)),
            None => (a.clone(), b.clone()),
        };
        compare(&a, &b).unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(Value::seq(items))
}

fn sort_natural(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let mut items = expect_sequence(ctx, "sort_natural", &input)?;
    let key = positional.first().map(stringify);
    items.sort_by_key(|item| {
        let target = match &key {
            Some(k) => member(item, k),
            None => item.clone(),
        };
        stringify(&target).to_lowercase()
    });
    Ok(Value::seq(items))
}

fn uniq(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let items = expect_sequence(ctx, "uniq", &input)?;
    let key = positional.first().map(stringify);
    let mut seen: Vec<Value> = Vec::new();
    let mut out = Vec::new();
    for item in items {
        let witness = match &key {
            Some(k) => member(&item, k),
            None => item.clone(),
        };
        if !seen.iter().any(|w| w == &witness) {
            seen.push(witness);
            out.push(item);
        }
    }
    Ok(Value::seq(out))
}

fn compact(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let items = expect_sequence(ctx, "compact", &input)?;
    let key = positional.first().map(stringify);
    let out = items
        .into_iter()
        .filter(|item| {
            let witness = match &key {
                Some(k) => member(item, k),
                None => item.clone(),
            };
            !matches!(witness, Value::Nil | Value::Undefined(_))
        })
        .collect();
    Ok(Value::seq(out))
}

fn map(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "map", positional, 1)?;
    let items = expect_sequence(ctx, "map", &input)?;
    let key = stringify(&positional[0]);
    Ok(Value::seq(
        items.iter().map(|item| member(item, &key)).collect(),
    ))
}

fn where_filter(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "where", positional, 1)?;
    let items = expect_sequence(ctx, "where", &input)?;
    let key = stringify(&positional[0]);
    let out = match positional.get(1) {
        Some(expected) => items
            .into_iter()
            .filter(|item| &member(item, &key) == expected)
            .collect(),
        None => items
            .into_iter()
            .filter(|item| member(item, &key).is_truthy())
            .collect(),
    };
    Ok(Value::seq(out))
}

fn concat(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "concat", positional, 1)?;
    let base = expect_sequence(ctx, "concat", &input)?;
    let mut flattened = Vec::with_capacity(base.len());
    for item in base {
        if let Value::Sequence(inner) = &item {
            flattened.extend(inner.iter().cloned());
        } else {
            flattened.push(item);
        }
    }
    let other = expect_sequence(ctx, "concat", &positional[0])?;
    flattened.extend(other);
    Ok(Value::seq(flattened))
}

fn sum(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let items = expect_sequence(ctx, "sum", &input)?;
    let key = positional.first().map(stringify);
    let mut total = 0.0_f64;
    let mut all_integral = true;
    for item in &items {
        let target = match &key {
            Some(k) => member(item, k),
            None => item.clone(),
        };
        let number = target.coerce_number();
        if matches!(number, Value::Float(_)) {
            all_integral = false;
        }
        total += number.as_f64().unwrap_or(0.0);
    }
    if all_integral {
        Ok(Value::Int(total as i64))
    } else {
        Ok(Value::Float(total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquid_engine::Mapping;

    fn ctx() -> RenderContext {
        super::super::empty_context()
    }

    fn seq(values: Vec<Value>) -> Value {
        Value::seq(values)
    }

    #[test]
    fn join_uses_space_by_default() {
        let mut c = ctx();
        let out = join(&mut c, seq(vec![Value::Int(1), Value::Int(2)]), &[], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "1 2");
    }

    #[test]
    fn sort_orders_by_key() {
        let mut c = ctx();
        let mut a = Mapping::new();
        a.insert("n", Value::Int(3));
        let mut b = Mapping::new();
        b.insert("n", Value::Int(1));
        let input = seq(vec![Value::map(a), Value::map(b)]);
        let out = sort(&mut c, input, &[Value::str("n")], &[]).unwrap();
        let items = out.as_sequence().unwrap();
        assert_eq!(member(&items[0], "n"), Value::Int(1));
    }

    #[test]
    fn uniq_deduplicates_preserving_first_occurrence() {
        let mut c = ctx();
        let input = seq(vec![Value::Int(1), Value::Int(2), Value::Int(1)]);
        let out = uniq(&mut c, input, &[], &[]).unwrap();
        assert_eq!(out.as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn where_filters_by_truthiness_when_no_value_given() {
        let mut c = ctx();
        let mut active = Mapping::new();
        active.insert("on", Value::Bool(true));
        let mut inactive = Mapping::new();
        inactive.insert("on", Value::Bool(false));
        let input = seq(vec![Value::map(active), Value::map(inactive)]);
        let out = where_filter(&mut c, input, &[Value::str("on")], &[]).unwrap();
        assert_eq!(out.as_sequence().unwrap().len(), 1);
    }

    #[test]
    fn concat_flattens_input_one_level_but_not_the_argument() {
        let mut c = ctx();
        let input = seq(vec![seq(vec![Value::Int(1), Value::Int(2)]), Value::Int(3)]);
        let other = seq(vec![seq(vec![Value::Int(4)])]);
        let out = concat(&mut c, input, &[other], &[]).unwrap();
        let items = out.as_sequence().unwrap();
        assert_eq!(items.len(), 4);
        assert!(matches!(items[3], Value::Sequence(_)));
    }

    #[test]
    fn sum_stays_integral_when_every_value_is_an_integer() {
        let mut c = ctx();
        let out = sum(&mut c, seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)]), &[], &[]).unwrap();
        assert_eq!(out, Value::Int(6));
    }
}
