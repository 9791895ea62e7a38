#![forbid(unsafe_code)]
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Encoding filters for the Liquid dialect: `escape`/`escape_once`/`safe`,
//! `url_encode`/`url_decode`, the `base64_*` family and the two HTML
//! scrubbers `strip_html`/`newline_to_br`. These mirror the encoding
//! helpers a template engine ships as built-ins rather than leaving them to
//! a userland extension.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use liquid_engine::context::RenderContext;
use liquid_engine::error::Location;
use liquid_engine::{Drop, Error, FilterRegistry, FilterRegistryBuilder, Markup, Value};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Registers every encoding filter into an existing registry builder.
pub fn install_encoding_filters(builder: &mut FilterRegistryBuilder) {
    builder
        .register("escape", escape)
        .register("escape_once", escape_once)
        .register("safe", safe)
        .register("url_encode", url_encode)
        .register("url_decode", url_decode)
        .register("base64_encode", base64_encode)
        .register("base64_decode", base64_decode)
        .register("base64_url_safe_encode", base64_url_safe_encode)
        .register("base64_url_safe_decode", base64_url_safe_decode)
        .register("strip_html", strip_html)
        .register("newline_to_br", newline_to_br);
}

/// A registry populated with only the encoding filters, for callers that
/// want them without the rest of the filter library.
pub fn encoding_filters() -> FilterRegistry {
    let mut builder = FilterRegistryBuilder::new();
    install_encoding_filters(&mut builder);
    builder.build()
}

fn filter_error(ctx: &RenderContext, message: impl Into<String>) -> Error {
    Error::filter(message, ctx.template_name.clone(), Location::default())
}

fn escape(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(escape_html(&input.as_str_lossy())))
}

/// Unconditional HTML escape, matching [`liquid_engine::escape_html`] but
/// kept local so this crate's behavior does not shift if that helper's
/// escape set ever changes for auto-escape's own purposes.
fn escape_html(input: &str) -> String {
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

fn escape_once(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let text = input.as_str_lossy();
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '&' if starts_with_entity(&bytes[idx..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    Ok(Value::str(out))
}

/// Whether `bytes` (starting at an `&`) already spells out a recognized
/// HTML entity, so `escape_once` can leave it alone instead of doubling it.
fn starts_with_entity(bytes: &[u8]) -> bool {
    const NAMED: &[&str] = &["&amp;", "&lt;", "&gt;", "&quot;", "&#39;", "&apos;"];
    if NAMED.iter().any(|entity| bytes.starts_with(entity.as_bytes())) {
        return true;
    }
    if bytes.len() > 3 && bytes[1] == b'#' {
        let digits_end = bytes[2..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits_end > 0 && bytes.get(2 + digits_end) == Some(&b';') {
            return true;
        }
    }
    false
}

fn safe(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::Drop(Arc::new(Markup(input.as_str_lossy()))))
}

const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

fn url_encode(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let encoded = utf8_percent_encode(&input.as_str_lossy(), URL_ENCODE_SET)
        .to_string()
        .replace("%20", "+");
    Ok(Value::str(encoded))
}

fn url_decode(
    ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let text = input.as_str_lossy();
    let with_spaces = text.replace('+', " ");
    let decoded = percent_decode_str(&with_spaces)
        .decode_utf8()
        .map_err(|e| filter_error(ctx, format!("url_decode: invalid UTF-8 after decoding: {e}")))?;
    Ok(Value::str(decoded.into_owned()))
}

fn base64_encode(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(STANDARD.encode(input.as_str_lossy())))
}

fn base64_decode(
    ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    decode_base64(ctx, &STANDARD, &input.as_str_lossy(), "base64_decode")
}

fn base64_url_safe_encode(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    Ok(Value::str(URL_SAFE.encode(input.as_str_lossy())))
}

fn base64_url_safe_decode(
    ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    decode_base64(
        ctx,
        &URL_SAFE,
        &input.as_str_lossy(),
        "base64_url_safe_decode",
    )
}

fn decode_base64(
    ctx: &mut RenderContext,
    engine: &impl base64::Engine,
    text: &str,
    name: &str,
) -> Result<Value, Error> {
    let bytes = engine
        .decode(text)
        .map_err(|e| filter_error(ctx, format!("{name}: invalid base64 input: {e}")))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|e| filter_error(ctx, format!("{name}: decoded bytes are not valid UTF-8: {e}")))?;
    Ok(Value::str(decoded))
}

fn strip_html(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let text = input.as_str_lossy();
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {}
            other => out.push(other),
        }
    }
    Ok(Value::str(out))
}

fn newline_to_br(
    _ctx: &mut RenderContext,
    input: Value,
    _positional: &[Value],
    _named: &[(String, Value)],
) -> Result<Value, Error> {
    let text = input.as_str_lossy();
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("<br />\n");
            }
            '\n' => out.push_str("<br />\n"),
            other => out.push(other),
        }
    }
    Ok(Value::str(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquid_engine::{Mapping, ResourceLimits, UndefinedVariant};

    fn ctx() -> RenderContext {
        RenderContext::new(
            Mapping::new(),
            ResourceLimits::default(),
            UndefinedVariant::Lenient,
            "test",
        )
    }

    fn run(
        f: impl Fn(&mut RenderContext, Value, &[Value], &[(String, Value)]) -> Result<Value, Error>,
        input: &str,
    ) -> String {
        let mut c = ctx();
        f(&mut c, Value::str(input), &[], &[]).unwrap().as_str_lossy()
    }

    #[test]
    fn escape_replaces_html_metacharacters() {
        assert_eq!(run(escape, "<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn escape_once_does_not_double_escape() {
        assert_eq!(run(escape_once, "Tom &amp; Jerry"), "Tom &amp; Jerry");
        assert_eq!(run(escape_once, "Tom & Jerry"), "Tom &amp; Jerry");
    }

    #[test]
    fn safe_wraps_value_as_markup_passthrough() {
        let mut c = ctx();
        let out = safe(&mut c, Value::str("<b>hi</b>"), &[], &[]).unwrap();
        match out {
            Value::Drop(drop) => assert_eq!(drop.to_html().as_deref(), Some("<b>hi</b>")),
            other => panic!("expected a Drop-wrapped Markup value, got {other:?}"),
        }
    }

    #[test]
    fn url_encode_uses_plus_for_space() {
        assert_eq!(run(url_encode, "hello world!"), "hello+world%21");
    }

    #[test]
    fn url_decode_reverses_url_encode() {
        assert_eq!(run(url_decode, "hello+world%21"), "hello world!");
    }

    #[test]
    fn base64_round_trips() {
        let mut c = ctx();
        let encoded = base64_encode(&mut c, Value::str("Liquid"), &[], &[]).unwrap();
        assert_eq!(encoded.as_str_lossy(), "TGlxdWlk");
        let decoded = base64_decode(&mut c, encoded, &[], &[]).unwrap();
        assert_eq!(decoded.as_str_lossy(), "Liquid");
    }

    #[test]
    fn base64_decode_rejects_invalid_input() {
        let mut c = ctx();
        assert!(base64_decode(&mut c, Value::str("not base64!!"), &[], &[]).is_err());
    }

    #[test]
    fn strip_html_removes_tag_spans() {
        assert_eq!(run(strip_html, "<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn newline_to_br_handles_all_line_endings() {
        assert_eq!(run(newline_to_br, "a\nb\r\nc\rd"), "a<br />\nb<br />\nc<br />\nd");
    }
}
