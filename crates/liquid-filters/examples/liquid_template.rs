// SPDX-License-Identifier: Apache-2.0 OR MIT
use liquid_engine::{Environment, Mapping, Value};
use liquid_filters::liquid_filters;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = Environment::builder().filters(liquid_filters()).build();

    let (template, _diagnostics) = env.parse("greeting", "{{ name | default: 'friend' | upcase }}")?;

    let mut vars = Mapping::new();
    vars.insert("name", Value::str("liquid"));
    let rendered = template.render(&env, &vars)?.output;
    println!("{rendered}");
    Ok(())
}
