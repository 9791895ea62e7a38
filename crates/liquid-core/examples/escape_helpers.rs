// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Demonstrates the encoding filters directly, without a full template.

use liquid_core::encoding_filters;
use liquid_engine::context::RenderContext;
use liquid_engine::{Mapping, ResourceLimits, UndefinedVariant, Value};

fn main() {
    let registry = encoding_filters();
    let mut ctx = RenderContext::new(
        Mapping::new(),
        ResourceLimits::default(),
        UndefinedVariant::Lenient,
        "escape_helpers",
    );

    let escape = registry.get("escape").unwrap();
    let escaped = escape(&mut ctx, Value::str("<b>\"Bob\"</b>"), &[], &[]).unwrap();
    println!("escape => {}", escaped.as_str_lossy());

    let url_encode = registry.get("url_encode").unwrap();
    let encoded = url_encode(&mut ctx, Value::str("Hello, world!"), &[], &[]).unwrap();
    println!("url_encode => {}", encoded.as_str_lossy());

    let base64_encode = registry.get("base64_encode").unwrap();
    let encoded = base64_encode(&mut ctx, Value::str("Liquid templates"), &[], &[]).unwrap();
    println!("base64_encode => {}", encoded.as_str_lossy());

    let strip_html = registry.get("strip_html").unwrap();
    let stripped = strip_html(
        &mut ctx,
        Value::str("<p>Hello <b>world</b></p>"),
        &[],
        &[],
    )
    .unwrap();
    println!("strip_html => {}", stripped.as_str_lossy());
}
