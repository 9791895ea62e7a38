// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Layers a custom filter on top of the encoding filters and renders a
//! small template through it.

use liquid_core::encoding_filters;
use liquid_engine::{Environment, Mapping, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = Environment::builder()
        .filters(encoding_filters())
        .register_filter("shout", |_ctx, input, _positional, _named| {
            Ok(Value::str(format!("{}!", input.as_str_lossy().to_uppercase())))
        })
        .build();

    let (template, _diagnostics) = env.parse("custom", "{{ phrase | shout }}")?;
    let mut vars = Mapping::new();
    vars.insert("phrase", Value::str("hello core"));
    let rendered = template.render(&env, &vars)?.output;

    println!("{rendered}");
    assert_eq!(rendered, "HELLO CORE!");
    Ok(())
}
