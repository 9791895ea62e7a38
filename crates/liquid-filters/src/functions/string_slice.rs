// SPDX-License-Identifier: Apache-2.0 OR MIT
use liquid_engine::context::RenderContext;
use liquid_engine::{Error, FilterRegistryBuilder, Value};

use super::{as_i64, expect_min_args, stringify};

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder
        .register("slice", slice)
        .register("truncate", truncate)
        .register("truncatewords", truncatewords);
}

/// `slice: offset[, length]`, applied to a string's characters or, when the
/// input is an array, its elements. Negative offsets count from the end,
/// matching the reference dialect's Ruby-flavored indexing.
fn slice(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "slice", positional, 1)?;
    let offset = as_i64(&positional[0]);
    let length = positional.get(1).map(as_i64).unwrap_or(1).max(0) as usize;

    if let Some(items) = input.as_sequence() {
        if matches!(input, Value::Sequence(_)) {
            let (start, end) = clamp_range(items.len(), offset, length);
            return Ok(Value::seq(items[start..end].to_vec()));
        }
    }

    let text = stringify(&input);
    let chars: Vec<char> = text.chars().collect();
    let (start, end) = clamp_range(chars.len(), offset, length);
    Ok(Value::str(chars[start..end].iter().collect::<String>()))
}

fn clamp_range(len: usize, offset: i64, length: usize) -> (usize, usize) {
    let start = if offset < 0 {
        len.saturating_sub((-offset) as usize)
    } else {
        (offset as usize).min(len)
    };
    let end = start.saturating_add(length).min(len);
    (start, end.max(start))
}

/// `truncate: length[, ellipsis]`; the ellipsis counts toward `length`.
fn truncate(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "truncate", positional, 1)?;
    let max_len = as_i64(&positional[0]).max(0) as usize;
    let ellipsis = positional
        .get(1)
        .map(stringify)
        .unwrap_or_else(|| "...".to_string());
    let text = stringify(&input);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return Ok(Value::str(text));
    }
    let ellipsis_len = ellipsis.chars().count();
    let keep = max_len.saturating_sub(ellipsis_len);
    let mut out: String = chars[..keep.min(chars.len())].iter().collect();
    out.push_str(&ellipsis);
    Ok(Value::str(out))
}

/// `truncatewords: count[, ellipsis]`; counts whitespace-separated words.
fn truncatewords(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "truncatewords", positional, 1)?;
    let max_words = as_i64(&positional[0]).max(0) as usize;
    let ellipsis = positional
        .get(1)
        .map(stringify)
        .unwrap_or_else(|| "...".to_string());
    let text = stringify(&input);
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return Ok(Value::str(text));
    }
    let mut out = words[..max_words].join(" ");
    out.push_str(&ellipsis);
    Ok(Value::str(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        super::super::empty_context()
    }

    #[test]
    fn slice_supports_negative_offsets() {
        let mut c = ctx();
        let out = slice(&mut c, Value::str("liquid"), &[Value::Int(-3), Value::Int(2)], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "ui");
    }

    #[test]
    fn slice_applies_to_arrays_too() {
        let mut c = ctx();
        let input = Value::seq(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let out = slice(&mut c, input, &[Value::Int(1), Value::Int(2)], &[]).unwrap();
        assert_eq!(out.as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn truncate_reserves_room_for_the_ellipsis() {
        let mut c = ctx();
        let out = truncate(&mut c, Value::str("abcdefgh"), &[Value::Int(5)], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "ab...");
    }

    #[test]
    fn truncatewords_counts_whitespace_separated_words() {
        let mut c = ctx();
        let out = truncatewords(&mut c, Value::str("the quick brown fox"), &[Value::Int(2)], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "the quick...");
    }
}
