//! Tree-walking evaluator for condition expressions
//!
//! Evaluates a parsed AST against a document snapshot. Only the document's
//! fields, caller supplied globals and the whitelisted functions are reachable.

use crate::expression::EvaluationContext;
use crate::expression::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::expression::functions::FunctionRegistry;
use anyhow::{Result, anyhow};
use rota_types::FieldValue;
use std::cmp::Ordering;

/// Name under which the whole document is exposed (`doc.status`)
pub const DOCUMENT_ALIAS: &str = "doc";

/// Evaluate an expression in the given context
pub fn evaluate_expression(
    expr: &Expression,
    context: &EvaluationContext,
    functions: &FunctionRegistry,
) -> Result<FieldValue> {
    evaluate_to_value(expr, context, functions)
}

fn evaluate_to_value(
    expr: &Expression,
    context: &EvaluationContext,
    functions: &FunctionRegistry,
) -> Result<FieldValue> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),

        Expression::Variable(name) => resolve_variable(name, context),

        // Short-circuit; the deciding operand is the result
        Expression::BinaryOp { left, operator: BinaryOperator::And, right } => {
            let left_val = evaluate_to_value(left, context, functions)?;
            if !left_val.is_truthy() {
                return Ok(left_val);
            }
            evaluate_to_value(right, context, functions)
        }
        Expression::BinaryOp { left, operator: BinaryOperator::Or, right } => {
            let left_val = evaluate_to_value(left, context, functions)?;
            if left_val.is_truthy() {
                return Ok(left_val);
            }
            evaluate_to_value(right, context, functions)
        }

        Expression::BinaryOp { left, operator, right } => {
            let left_val = evaluate_to_value(left, context, functions)?;
            let right_val = evaluate_to_value(right, context, functions)?;
            evaluate_binary_op(&left_val, *operator, &right_val)
        }

        Expression::UnaryOp { operator, operand } => {
            let operand_val = evaluate_to_value(operand, context, functions)?;
            evaluate_unary_op(*operator, &operand_val)
        }

        Expression::FunctionCall { name, args } => {
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                arg_values.push(evaluate_to_value(arg, context, functions)?);
            }
            functions.call(name, &arg_values)
        }

        Expression::FieldAccess { object, field } => {
            match evaluate_to_value(object, context, functions)? {
                FieldValue::Object(map) => map
                    .get(field)
                    .cloned()
                    .ok_or_else(|| anyhow!("object has no attribute '{}'", field)),
                other => Err(anyhow!("'{}' object has no attribute '{}'", other.type_name(), field)),
            }
        }

        Expression::ArrayLiteral { elements } => {
            let mut array_values = Vec::with_capacity(elements.len());
            for element in elements {
                array_values.push(evaluate_to_value(element, context, functions)?);
            }
            Ok(FieldValue::Array(array_values))
        }

        Expression::Index { target, index } => {
            let target_val = evaluate_to_value(target, context, functions)?;
            let index_val = evaluate_to_value(index, context, functions)?;

            match (target_val, index_val) {
                (FieldValue::Array(arr), FieldValue::Integer(idx)) => {
                    let len = arr.len() as i64;
                    let position = if idx < 0 { len + idx } else { idx };
                    if (0..len).contains(&position) {
                        Ok(arr[position as usize].clone())
                    } else {
                        Err(anyhow!("list index {} out of range", idx))
                    }
                }
                (FieldValue::Object(obj), FieldValue::String(key)) => {
                    obj.get(&key).cloned().ok_or_else(|| anyhow!("key '{}' not found", key))
                }
                (target, index) => Err(anyhow!(
                    "cannot index {} with {}",
                    target.type_name(),
                    index.type_name()
                )),
            }
        }
    }
}

fn resolve_variable(name: &str, context: &EvaluationContext) -> Result<FieldValue> {
    if let Some(value) = context.document.get(name) {
        return Ok(value);
    }

    if let Some(value) = context.globals.get(name) {
        return Ok(value.clone());
    }

    if name == DOCUMENT_ALIAS {
        return Ok(context.document.to_object());
    }

    Err(anyhow!("name '{}' is not defined", name))
}

/// Evaluate a binary operation (logical operators are handled by the caller)
fn evaluate_binary_op(left: &FieldValue, operator: BinaryOperator, right: &FieldValue) -> Result<FieldValue> {
    use {BinaryOperator::*, FieldValue::*};

    match (left, right, operator) {
        // Integer arithmetic
        (Integer(a), Integer(b), Add) => a.checked_add(*b).map(Integer).ok_or_else(overflow),
        (Integer(a), Integer(b), Subtract) => a.checked_sub(*b).map(Integer).ok_or_else(overflow),
        (Integer(a), Integer(b), Multiply) => a.checked_mul(*b).map(Integer).ok_or_else(overflow),
        (Integer(_), Integer(0), Divide | Modulo) => Err(anyhow!("division by zero")),
        (Integer(a), Integer(b), Divide) => Ok(Float(*a as f64 / *b as f64)),
        (Integer(a), Integer(b), Modulo) => floored_rem(*a, *b).map(Integer).ok_or_else(overflow),

        // Float arithmetic
        (Float(a), Float(b), Add) => Ok(Float(a + b)),
        (Float(a), Float(b), Subtract) => Ok(Float(a - b)),
        (Float(a), Float(b), Multiply) => Ok(Float(a * b)),
        (Float(_), Float(b), Divide | Modulo) if *b == 0.0 => Err(anyhow!("division by zero")),
        (Float(a), Float(b), Divide) => Ok(Float(a / b)),
        (Float(a), Float(b), Modulo) => {
            let r = a % b;
            Ok(Float(if r != 0.0 && (r < 0.0) != (*b < 0.0) { r + b } else { r }))
        }

        // Mixed numeric
        (Integer(a), Float(_), Add | Subtract | Multiply | Divide | Modulo) => {
            evaluate_binary_op(&Float(*a as f64), operator, right)
        }
        (Float(_), Integer(b), Add | Subtract | Multiply | Divide | Modulo) => {
            evaluate_binary_op(left, operator, &Float(*b as f64))
        }

        // String concatenation
        (String(a), String(b), Add) => Ok(String(format!("{a}{b}"))),

        // Membership
        (needle, haystack, In) => membership(needle, haystack).map(Boolean),
        (needle, haystack, NotIn) => membership(needle, haystack).map(|found| Boolean(!found)),

        // Equality
        (a, b, Equal) => Ok(Boolean(values_equal(a, b))),
        (a, b, NotEqual) => Ok(Boolean(!values_equal(a, b))),

        // Ordering
        (a, b, LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual) => {
            let ordering = compare(a, b).ok_or_else(|| {
                anyhow!(
                    "'{}' not supported between {} and {}",
                    operator.symbol(),
                    a.type_name(),
                    b.type_name()
                )
            })?;
            let result = match operator {
                LessThan => ordering == Ordering::Less,
                LessThanOrEqual => ordering != Ordering::Greater,
                GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Boolean(result))
        }

        _ => Err(anyhow!(
            "unsupported operand types for {}: {} and {}",
            operator.symbol(),
            left.type_name(),
            right.type_name()
        )),
    }
}

/// Remainder with the sign of the divisor; `None` on overflow
fn floored_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) { r.checked_add(b) } else { Some(r) }
}

fn overflow() -> anyhow::Error {
    anyhow!("integer overflow")
}

/// Numbers compare by value across integer/float; other cross-type pairs are unequal
fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    use FieldValue::*;
    match (a, b) {
        (Integer(x), Float(y)) | (Float(y), Integer(x)) => (*x as f64 - y).abs() < f64::EPSILON,
        (Float(x), Float(y)) => (x - y).abs() < f64::EPSILON,
        (Date(_), String(_)) | (String(_), Date(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn compare(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Date(_), FieldValue::String(s)) => a.partial_cmp(&FieldValue::date_from_iso(s).ok()?),
        (FieldValue::String(s), FieldValue::Date(_)) => FieldValue::date_from_iso(s).ok()?.partial_cmp(b),
        (FieldValue::Null, _) | (_, FieldValue::Null) => None,
        _ => a.partial_cmp(b),
    }
}

fn membership(needle: &FieldValue, haystack: &FieldValue) -> Result<bool> {
    match haystack {
        FieldValue::Array(items) => Ok(items.iter().any(|item| values_equal(needle, item))),
        FieldValue::String(text) => match needle {
            FieldValue::String(fragment) => Ok(text.contains(fragment.as_str())),
            other => Err(anyhow!("'in <string>' requires string as left operand, not {}", other.type_name())),
        },
        FieldValue::Object(map) => match needle {
            FieldValue::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(anyhow!("argument of type '{}' is not iterable", other.type_name())),
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(operator: UnaryOperator, operand: &FieldValue) -> Result<FieldValue> {
    use {FieldValue::*, UnaryOperator::*};

    match (operator, operand) {
        (Negate, Integer(n)) => n.checked_neg().map(Integer).ok_or_else(overflow),
        (Negate, Float(f)) => Ok(Float(-f)),
        (Not, value) => Ok(Boolean(!value.is_truthy())),
        (Negate, other) => Err(anyhow!("bad operand type for unary -: {}", other.type_name())),
    }
}
