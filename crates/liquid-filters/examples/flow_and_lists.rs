// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Demonstrates selected numeric and array filters through a template.

use liquid_engine::{Environment, Mapping, Value};
use liquid_filters::install_all;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = liquid_engine::FilterRegistryBuilder::new();
    install_all(&mut builder);
    let env = Environment::builder().filters(builder.build()).build();

    let (template, _diagnostics) = env.parse(
        "flow-and-lists",
        r#"{%- assign people = "hans,,sprig" | split: "," | compact -%}
{%- assign primary = people.first | default: "friend" -%}
Hello {{ primary | capitalize }}!
Total: {{ people | size }}
Sum: {{ numbers | sum }}
"#,
    )?;

    let mut vars = Mapping::new();
    vars.insert("numbers", Value::seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    let out = template.render(&env, &vars)?.output;
    println!("{out}");
    Ok(())
}
