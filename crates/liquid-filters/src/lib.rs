// SPDX-License-Identifier: Apache-2.0 OR MIT
//! String, numeric, array, object and date filters for the Liquid dialect,
//! layered on top of `liquid-core`'s encoding filters.

use liquid_engine::{FilterRegistry, FilterRegistryBuilder};

mod functions;

/// Installs the encoding filters from `liquid-core` followed by the
/// string/numeric/array/object/date filters defined in this crate.
pub fn install_all(builder: &mut FilterRegistryBuilder) {
    liquid_core::install_encoding_filters(builder);
    install_liquid_filters(builder);
}

/// Registers this crate's own filters into an existing registry builder,
/// without the `liquid-core` encoding filters.
pub fn install_liquid_filters(builder: &mut FilterRegistryBuilder) {
    functions::install_all(builder);
}

/// Returns a registry populated with the full standard Liquid filter set.
pub fn liquid_filters() -> FilterRegistry {
    let mut builder = FilterRegistryBuilder::new();
    install_all(&mut builder);
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquid_engine::{Mapping, ResourceLimits, UndefinedVariant};

    #[test]
    fn registry_exposes_filters_from_both_crates() {
        let registry = liquid_filters();
        assert!(registry.get("upcase").is_some());
        assert!(registry.get("escape").is_some());
        assert!(registry.get("plus").is_some());
        assert!(registry.get("date").is_some());
    }

    #[test]
    fn upcase_filter_round_trips_through_the_registry() {
        let registry = liquid_filters();
        let upcase = registry.get("upcase").unwrap();
        let mut ctx = liquid_engine::context::RenderContext::new(
            Mapping::new(),
            ResourceLimits::default(),
            UndefinedVariant::Lenient,
            "test",
        );
        let out = upcase(&mut ctx, liquid_engine::Value::str("hi"), &[], &[]).unwrap();
        assert_eq!(out.as_str_lossy(), "HI");
    }
}
