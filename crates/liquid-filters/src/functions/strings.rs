// SPDX-License-Identifier: Apache-2.0 OR MIT
use liquid_engine::context::RenderContext;
use liquid_engine::{Error, FilterRegistryBuilder, Value};

use super::{expect_exact_args, expect_min_args, stringify};

pub fn register(builder: &mut FilterRegistryBuilder) {
    builder
        .register("append", append)
        .register("prepend", prepend)
        .register("capitalize", capitalize)
        .register("downcase", downcase)
        .register("upcase", upcase)
        .register("strip", strip)
        .register("lstrip", lstrip)
        .register("rstrip", rstrip)
        .register("strip_newlines", strip_newlines)
        .register("replace", replace)
        .register("replace_first", replace_first)
        .register("replace_last", replace_last)
        .register("remove", remove)
        .register("remove_first", remove_first)
        .register("remove_last", remove_last)
        .register("split", split);
}

fn append(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "append", positional, 1)?;
    Ok(Value::str(format!(
        "{}{}",
        stringify(&input),
        stringify(&positional[0])
    )))
}

fn prepend(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "prepend", positional, 1)?;
    Ok(Value::str(format!(
        "{}{}",
        stringify(&positional[0]),
        stringify(&input)
    )))
}

fn capitalize(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let text = stringify(&input);
    let mut chars = text.chars();
    let out = match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    };
    Ok(Value::str(out))
}

fn downcase(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(stringify(&input).to_lowercase()))
}

fn upcase(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(stringify(&input).to_uppercase()))
}

fn strip(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(stringify(&input).trim().to_string()))
}

fn lstrip(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(stringify(&input).trim_start().to_string()))
}

fn rstrip(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(stringify(&input).trim_end().to_string()))
}

fn strip_newlines(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let text = stringify(&input);
    let out: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    Ok(Value::str(out))
}

fn replace(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "replace", positional, 2)?;
    let text = stringify(&input);
    let old = stringify(&positional[0]);
    let new = stringify(&positional[1]);
    Ok(Value::str(text.replace(&old, &new)))
}

fn replace_first(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "replace_first", positional, 2)?;
    let text = stringify(&input);
    let old = stringify(&positional[0]);
    let new = stringify(&positional[1]);
    Ok(Value::str(text.replacen(&old, &new, 1)))
}

fn replace_last(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "replace_last", positional, 2)?;
    let text = stringify(&input);
    let old = stringify(&positional[0]);
    let new = stringify(&positional[1]);
    let out = match text.rfind(&old) {
        Some(idx) if !old.is_empty() => {
            let mut result = String::with_capacity(text.len());
            result.push_str(&text[..idx]);
            result.push_str(&new);
            result.push_str(&text[idx + old.len()..]);
            result
        }
        _ => text,
    };
    Ok(Value::str(out))
}

fn remove(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "remove", positional, 1)?;
    let text = stringify(&input);
    let target = stringify(&positional[0]);
    Ok(Value::str(text.replace(&target, "")))
}

fn remove_first(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "remove_first", positional, 1)?;
    let text = stringify(&input);
    let target = stringify(&positional[0]);
    Ok(Value::str(text.replacen(&target, "", 1)))
}

fn remove_last(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_exact_args(ctx, "remove_last", positional, 1)?;
    replace_last(
        ctx,
        input,
        &[positional[0].clone(), Value::str("")],
        named,
    )
}

fn split(
    ctx: &mut RenderContext,
    input: Value,
    positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    expect_min_args(ctx, "split", positional, 1)?;
    let text = stringify(&input);
    let sep = stringify(&positional[0]);
    let parts = if sep.is_empty() {
        text.chars().map(|c| Value::str(c.to_string())).collect()
    } else {
        text.split(sep.as_str()).map(Value::str).collect()
    };
    Ok(Value::seq(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        super::super::empty_context()
    }

    #[test]
    fn append_and_prepend_stringify_their_argument() {
        let mut c = ctx();
        let out = append(&mut c, Value::str("foo"), &[Value::Int(42)], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "foo42");
        let out = prepend(&mut c, Value::str("bar"), &[Value::str("pre-")], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "pre-bar");
    }

    #[test]
    fn capitalize_only_affects_the_first_character() {
        let mut c = ctx();
        let out = capitalize(&mut c, Value::str("hELLO world"), &[], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "Hello world");
    }

    #[test]
    fn strip_variants_trim_the_expected_side() {
        let mut c = ctx();
        assert_eq!(
            strip(&mut c, Value::str("  hi  "), &[], &[]).unwrap().as_str_lossy(),
            "hi"
        );
        assert_eq!(
            lstrip(&mut c, Value::str("  hi  "), &[], &[]).unwrap().as_str_lossy(),
            "hi  "
        );
        assert_eq!(
            rstrip(&mut c, Value::str("  hi  "), &[], &[]).unwrap().as_str_lossy(),
            "  hi"
        );
    }

    #[test]
    fn replace_first_and_last_target_distinct_occurrences() {
        let mut c = ctx();
        let out = replace_first(&mut c, Value::str("a-a-a"), &[Value::str("a"), Value::str("X")], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "X-a-a");
        let out = replace_last(&mut c, Value::str("a-a-a"), &[Value::str("a"), Value::str("X")], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "a-a-X");
    }

    #[test]
    fn remove_variants_delete_occurrences() {
        let mut c = ctx();
        let out = remove(&mut c, Value::str("a-a-a"), &[Value::str("a")], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "--");
        let out = remove_first(&mut c, Value::str("a-a-a"), &[Value::str("a")], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "-a-a");
    }

    #[test]
    fn split_breaks_on_separator() {
        let mut c = ctx();
        let out = split(&mut c, Value::str("a,b,c"), &[Value::str(",")], &[]).unwrap();
        assert_eq!(out.as_sequence().unwrap().len(), 3);
    }
}
