// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The expression evaluator: path resolution, filter application and
//! boolean/comparison semantics.

use crate::ast::{BooleanExpression, CompareOp, Expression, FilteredExpression, Path, Segment};
use crate::context::{RenderContext, UndefinedVariant};
use crate::error::{Error, Location};
use crate::registry::FilterRegistry;
use crate::value::{self, Value};

/// Resolves a bare expression (literal or path) to a `Value`.
pub fn eval_expression(expr: &Expression, ctx: &RenderContext, loc: Location) -> Result<Value, Error> {
    match expr {
        Expression::Path(path) => resolve_path(path, ctx, loc),
        Expression::Int(i) => Ok(Value::Int(*i)),
        Expression::Float(f) => Ok(Value::Float(*f)),
        Expression::Str(s) => Ok(Value::str(s.clone())),
        Expression::Bool(b) => Ok(Value::Bool(*b)),
        Expression::Nil => Ok(Value::Nil),
        // A bare `empty`/`blank` (not a comparison operand) behaves like the
        // empty string; comparisons special-case them in `eval_compare` to
        // apply the sentinel-equality rule instead.
        Expression::Empty | Expression::Blank => Ok(Value::str("")),
        Expression::Range(start, stop) => {
            let start = eval_expression(start, ctx, loc)?.as_i64().unwrap_or(0);
            let stop = eval_expression(stop, ctx, loc)?.as_i64().unwrap_or(0);
            Ok(Value::Range(start, stop))
        }
    }
}

/// Resolves a dotted/bracketed path left to right. A miss at any step
/// yields the configured Undefined variant's outcome rather than
/// short-circuiting, so downstream operators can observe it explicitly.
pub fn resolve_path(path: &Path, ctx: &RenderContext, loc: Location) -> Result<Value, Error> {
    let root_name = match path.root_name() {
        Some(name) => name,
        None => return Ok(Value::undefined(String::new(), ctx.undefined_variant)),
    };
    let mut current = match ctx.lookup_local_or_global(root_name) {
        Some(v) => v,
        None => return undefined_outcome(ctx, root_name.to_string(), loc),
    };
    let mut trail = root_name.to_string();

    for segment in path.segments.iter().skip(1) {
        let key_repr = match segment {
            Segment::Name(name) => name.clone(),
            Segment::Index(i) => i.to_string(),
            Segment::Dynamic(expr) => value::stringify(&eval_expression(expr, ctx, loc)?),
        };
        trail = format!("{trail}.{key_repr}");

        current = match (&current, segment) {
            (Value::Mapping(map), Segment::Name(name)) => match name.as_str() {
                "size" => Value::Int(map.len() as i64),
                _ => match map.get(name) {
                    Some(v) => v.clone(),
                    None => return undefined_outcome(ctx, trail, loc),
                },
            },
            (Value::Sequence(items), Segment::Name(name)) => match name.as_str() {
                "size" => Value::Int(items.len() as i64),
                "first" => items.first().cloned().unwrap_or(Value::Nil),
                "last" => items.last().cloned().unwrap_or(Value::Nil),
                _ => return undefined_outcome(ctx, trail, loc),
            },
            (Value::String(s), Segment::Name(name)) => match name.as_str() {
                "size" => Value::Int(s.chars().count() as i64),
                _ => return undefined_outcome(ctx, trail, loc),
            },
            (Value::Sequence(items), Segment::Index(i)) => indexed(items, *i),
            (Value::Range(start, stop), Segment::Index(i)) => {
                let seq = value::range_sequence(*start, *stop);
                indexed(&seq, *i)
            }
            // String indexing resolves to Undefined: a reference-dialect
            // decision, not per-character indexing.
            (Value::String(_), Segment::Index(_)) => return undefined_outcome(ctx, trail, loc),
            (Value::Mapping(map), Segment::Index(i)) => {
                let values: Vec<Value> = map.values().cloned().collect();
                indexed(&values, *i)
            }
            (Value::Drop(drop), Segment::Name(name)) => match drop.get_member(name) {
                Some(v) => v,
                None if name == "size" => match drop.size() {
                    Some(n) => Value::Int(n),
                    None => return undefined_outcome(ctx, trail, loc),
                },
                None => return undefined_outcome(ctx, trail, loc),
            },
            (Value::Drop(drop), Segment::Dynamic(expr)) => {
                let key = value::stringify(&eval_expression(expr, ctx, loc)?);
                match drop.get_member(&key) {
                    Some(v) => v,
                    None => return undefined_outcome(ctx, trail, loc),
                }
            }
            _ => return undefined_outcome(ctx, trail, loc),
        };
    }

    Ok(current)
}

fn indexed(items: &[Value], index: i64) -> Value {
    let len = items.len() as i64;
    let real_index = if index < 0 { len + index } else { index };
    if real_index < 0 || real_index >= len {
        Value::Nil
    } else {
        items[real_index as usize].clone()
    }
}

fn undefined_outcome(ctx: &RenderContext, path: String, loc: Location) -> Result<Value, Error> {
    match ctx.undefined_variant {
        UndefinedVariant::Strict => Err(ctx.undefined_error_at(path, loc)),
        UndefinedVariant::Lenient | UndefinedVariant::FalsyStrict | UndefinedVariant::Debug => {
            Ok(Value::undefined(path, ctx.undefined_variant))
        }
    }
}

/// The numeric filter family (`spec.md` §4.7 "Numeric") that must raise
/// rather than silently coerce to zero when fed an `Undefined` produced by
/// the `debug` or `falsy_strict` variants (`spec.md` §4.8's "arithmetic:
/// raises" column). `lenient`-variant undefined values still fall through
/// to the filters' own zero-coercion.
const ARITHMETIC_FILTERS: &[&str] = &[
    "abs", "ceil", "floor", "round", "plus", "minus", "times", "divided_by", "modulo", "at_least",
    "at_most",
];

fn check_arithmetic_operand(value: &Value, ctx: &RenderContext, loc: Location) -> Result<(), Error> {
    match value.undefined_variant() {
        Some(UndefinedVariant::Debug) | Some(UndefinedVariant::FalsyStrict) => {
            let path = match value {
                Value::Undefined(u) => u.path.clone(),
                _ => unreachable!(),
            };
            Err(Error::filter(
                format!("arithmetic on undefined value '{path}'"),
                ctx.template_name.clone(),
                loc,
            ))
        }
        _ => Ok(()),
    }
}

/// Applies a filtered expression's filter chain left to right.
pub fn eval_filtered_expression(
    fe: &FilteredExpression,
    ctx: &mut RenderContext,
    registry: &FilterRegistry,
    strict_filters: bool,
    loc: Location,
) -> Result<Value, Error> {
    let mut value = eval_expression(&fe.head, ctx, loc)?;
    for filter in &fe.filters {
        let mut positional = Vec::with_capacity(filter.positional.len());
        for expr in &filter.positional {
            positional.push(eval_expression(expr, ctx, loc)?);
        }
        let mut named = Vec::with_capacity(filter.named.len());
        for (key, expr) in &filter.named {
            named.push((key.clone(), eval_expression(expr, ctx, loc)?));
        }

        if ARITHMETIC_FILTERS.contains(&filter.name.as_str()) {
            check_arithmetic_operand(&value, ctx, loc)?;
            for p in &positional {
                check_arithmetic_operand(p, ctx, loc)?;
            }
        }

        value = match registry.get(&filter.name) {
            Some(f) => f(ctx, value, &positional, &named)?,
            None if strict_filters => {
                return Err(Error::filter(
                    format!("unknown filter '{}'", filter.name),
                    ctx.template_name.clone(),
                    loc,
                ));
            }
            None => value,
        };
    }
    Ok(value)
}

/// Evaluates a boolean expression tree: `or` short-circuits true, `and`
/// short-circuits false, both right-associative over comparison.
pub fn eval_boolean_expression(
    be: &BooleanExpression,
    ctx: &mut RenderContext,
    registry: &FilterRegistry,
    strict_filters: bool,
    loc: Location,
) -> Result<bool, Error> {
    match be {
        BooleanExpression::Value(fe) => {
            Ok(eval_filtered_expression(fe, ctx, registry, strict_filters, loc)?.is_truthy())
        }
        BooleanExpression::Or(left, right) => {
            if eval_boolean_expression(left, ctx, registry, strict_filters, loc)? {
                Ok(true)
            } else {
                eval_boolean_expression(right, ctx, registry, strict_filters, loc)
            }
        }
        BooleanExpression::And(left, right) => {
            if !eval_boolean_expression(left, ctx, registry, strict_filters, loc)? {
                Ok(false)
            } else {
                eval_boolean_expression(right, ctx, registry, strict_filters, loc)
            }
        }
        BooleanExpression::Compare(left, op, right) => {
            eval_compare(left, *op, right, ctx, registry, strict_filters, loc)
        }
    }
}

/// If `be` is a bare, unfiltered `empty`/`blank` literal, returns which
/// sentinel it is so `eval_compare` can apply sentinel equality instead of
/// evaluating it as the empty string and comparing structurally.
fn sentinel_head(be: &BooleanExpression) -> Option<bool> {
    match be {
        BooleanExpression::Value(fe) if fe.filters.is_empty() => match fe.head {
            Expression::Empty => Some(false),
            Expression::Blank => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn eval_compare(
    left: &BooleanExpression,
    op: CompareOp,
    right: &BooleanExpression,
    ctx: &mut RenderContext,
    registry: &FilterRegistry,
    strict_filters: bool,
    loc: Location,
) -> Result<bool, Error> {
    let left_sentinel = sentinel_head(left);
    let right_sentinel = sentinel_head(right);

    let (other, is_blank) = match (left_sentinel, right_sentinel) {
        (Some(blank), None) => (eval_side(right, ctx, registry, strict_filters, loc)?, blank),
        (None, Some(blank)) => (eval_side(left, ctx, registry, strict_filters, loc)?, blank),
        _ => {
            let lv = eval_side(left, ctx, registry, strict_filters, loc)?;
            let rv = eval_side(right, ctx, registry, strict_filters, loc)?;
            return eval_compare_values(&lv, op, &rv, ctx, loc);
        }
    };

    let matches = if is_blank {
        value::equals_sentinel_blank(&other)
    } else {
        value::equals_sentinel_empty(&other)
    };
    Ok(match op {
        CompareOp::Eq => matches,
        CompareOp::Ne => !matches,
        _ => false,
    })
}

fn eval_side(
    be: &BooleanExpression,
    ctx: &mut RenderContext,
    registry: &FilterRegistry,
    strict_filters: bool,
    loc: Location,
) -> Result<Value, Error> {
    match be {
        BooleanExpression::Value(fe) => eval_filtered_expression(fe, ctx, registry, strict_filters, loc),
        other => Ok(Value::Bool(eval_boolean_expression(
            other,
            ctx,
            registry,
            strict_filters,
            loc,
        )?)),
    }
}

fn eval_compare_values(
    left: &Value,
    op: CompareOp,
    right: &Value,
    ctx: &RenderContext,
    loc: Location,
) -> Result<bool, Error> {
    match op {
        CompareOp::Eq => Ok(left == right),
        CompareOp::Ne => Ok(left != right),
        CompareOp::Contains => Ok(contains(left, right)),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => match value::compare(left, right) {
            Some(ordering) => Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }),
            None if ctx.undefined_variant == UndefinedVariant::Strict => Err(Error::type_error(
                format!("cannot order {} and {}", left.type_name(), right.type_name()),
                ctx.template_name.clone(),
                loc,
            )),
            None => Ok(false),
        },
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.as_ref().contains(value::stringify(needle).as_str()),
        Value::Sequence(items) => items.iter().any(|v| v == needle),
        Value::Range(start, stop) => needle.as_i64().is_some_and(|n| n >= *start && n <= *stop),
        Value::Mapping(map) => map.contains_key(&value::stringify(needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResourceLimits;
    use crate::value::Mapping;

    fn ctx_with(globals: Mapping) -> RenderContext {
        RenderContext::new(globals, ResourceLimits::default(), UndefinedVariant::Lenient, "t")
    }

    fn loc() -> Location {
        Location::default()
    }

    #[test]
    fn path_resolves_through_mapping_and_field() {
        let mut map = Mapping::new();
        let mut user = Mapping::new();
        user.insert("name", Value::str("Sue"));
        map.insert("user", Value::map(user));
        let ctx = ctx_with(map);
        let path = Path {
            segments: vec![Segment::Name("user".into()), Segment::Name("name".into())],
        };
        let value = resolve_path(&path, &ctx, loc()).unwrap();
        assert_eq!(value, Value::str("Sue"));
    }

    #[test]
    fn missing_path_is_lenient_undefined_by_default() {
        let ctx = ctx_with(Mapping::new());
        let path = Path { segments: vec![Segment::Name("missing".into())] };
        let value = resolve_path(&path, &ctx, loc()).unwrap();
        assert!(matches!(value, Value::Undefined(_)));
        assert!(!value.is_truthy());
    }

    #[test]
    fn missing_path_is_fatal_in_strict_mode() {
        let ctx = RenderContext::new(Mapping::new(), ResourceLimits::default(), UndefinedVariant::Strict, "t");
        let path = Path { segments: vec![Segment::Name("missing".into())] };
        assert!(resolve_path(&path, &ctx, loc()).is_err());
    }

    #[test]
    fn negative_index_counts_from_the_end() {
        let mut map = Mapping::new();
        map.insert("items", Value::seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        let ctx = ctx_with(map);
        let path = Path {
            segments: vec![Segment::Name("items".into()), Segment::Index(-1)],
        };
        assert_eq!(resolve_path(&path, &ctx, loc()).unwrap(), Value::Int(3));
    }

    fn missing_plus_one(variant: UndefinedVariant) -> Result<Value, Error> {
        let mut ctx = RenderContext::new(Mapping::new(), ResourceLimits::default(), variant, "t");
        let fe = FilteredExpression {
            head: Expression::Path(Path { segments: vec![Segment::Name("missing".into())] }),
            filters: vec![crate::ast::FilterCall {
                name: "plus".to_string(),
                positional: vec![Expression::Int(1)],
                named: vec![],
            }],
        };
        let registry = crate::registry::FilterRegistryBuilder::new().build();
        eval_filtered_expression(&fe, &mut ctx, &registry, false, loc())
    }

    #[test]
    fn lenient_undefined_passes_through_arithmetic_filters_unraised() {
        // `plus` isn't even registered in this bare registry, but a lenient
        // undefined operand must not itself raise getting there.
        assert!(missing_plus_one(UndefinedVariant::Lenient).is_ok());
    }

    #[test]
    fn debug_and_falsy_strict_undefined_raise_on_arithmetic() {
        assert!(missing_plus_one(UndefinedVariant::Debug).is_err());
        assert!(missing_plus_one(UndefinedVariant::FalsyStrict).is_err());
    }

    #[test]
    fn debug_undefined_stringifies_to_a_marker_with_its_path() {
        let ctx = RenderContext::new(Mapping::new(), ResourceLimits::default(), UndefinedVariant::Debug, "t");
        let path = Path { segments: vec![Segment::Name("missing".into())] };
        let value = resolve_path(&path, &ctx, loc()).unwrap();
        assert!(value::stringify(&value).contains("missing"));
    }

    #[test]
    fn falsy_strict_undefined_is_falsy_in_boolean_position() {
        let ctx = RenderContext::new(Mapping::new(), ResourceLimits::default(), UndefinedVariant::FalsyStrict, "t");
        let path = Path { segments: vec![Segment::Name("missing".into())] };
        let value = resolve_path(&path, &ctx, loc()).unwrap();
        assert!(!value.is_truthy());
    }
}
