//! Whitelisted functions callable from condition expressions
//!
//! Only pure functions are registered. Nothing here can reach the filesystem,
//! the network or the host process.

use anyhow::{Result, anyhow};
use chrono::Utc;
use rota_types::FieldValue;
use std::collections::HashMap;

/// Trait for functions that can be called from condition expressions
pub trait ConditionFunction: Send + Sync {
    /// Call the function with the given arguments
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue>;

    /// Get the expected number of arguments (None for variadic)
    fn arity(&self) -> Option<usize>;

    /// Get a description of this function
    fn description(&self) -> &'static str;
}

/// Registry for condition functions
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn ConditionFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    /// Create a new empty function registry
    pub fn new() -> Self {
        Self { functions: HashMap::new() }
    }

    /// Create a function registry with the built-in safe set
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // String functions
        registry.register("len", Box::new(LengthFunction));
        registry.register("lower", Box::new(LowerFunction));
        registry.register("upper", Box::new(UpperFunction));
        registry.register("trim", Box::new(TrimFunction));
        registry.register("contains", Box::new(ContainsFunction));
        registry.register("startswith", Box::new(StartsWithFunction));
        registry.register("endswith", Box::new(EndsWithFunction));

        // Numeric functions
        registry.register("abs", Box::new(AbsFunction));
        registry.register("min", Box::new(MinFunction));
        registry.register("max", Box::new(MaxFunction));
        registry.register("round", Box::new(RoundFunction));

        // Conversion functions
        registry.register("int", Box::new(ToIntFunction));
        registry.register("float", Box::new(ToFloatFunction));
        registry.register("str", Box::new(ToStringFunction));

        // Utility functions
        registry.register("coalesce", Box::new(CoalesceFunction));
        registry.register("is_set", Box::new(IsSetFunction));

        // Date functions
        registry.register("now", Box::new(NowFunction));
        registry.register("today", Box::new(TodayFunction));
        registry.register("date_diff_days", Box::new(DateDiffDaysFunction));

        registry
    }

    /// Register a new function
    pub fn register(&mut self, name: &str, function: Box<dyn ConditionFunction>) {
        self.functions.insert(name.to_lowercase(), function);
    }

    /// Call a function by name
    pub fn call(&self, name: &str, args: &[FieldValue]) -> Result<FieldValue> {
        let function = self
            .functions
            .get(&name.to_lowercase())
            .ok_or_else(|| anyhow!("Unknown function: {}", name))?;

        if let Some(expected_arity) = function.arity() {
            if args.len() != expected_arity {
                return Err(anyhow!(
                    "Function '{}' expects {} arguments, got {}",
                    name,
                    expected_arity,
                    args.len()
                ));
            }
        }

        function.call(args)
    }

    /// Check whether a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    /// Get list of available functions
    pub fn list_functions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

fn string_arg<'a>(function: &str, value: &'a FieldValue) -> Result<&'a str> {
    match value {
        FieldValue::String(s) => Ok(s),
        other => Err(anyhow!("{}() requires a string argument, got {}", function, other.type_name())),
    }
}

fn as_date(function: &str, value: &FieldValue) -> Result<chrono::DateTime<Utc>> {
    match value {
        FieldValue::Date(d) => Ok(*d),
        FieldValue::String(s) => match FieldValue::date_from_iso(s)? {
            FieldValue::Date(d) => Ok(d),
            _ => Err(anyhow!("{}() could not parse '{}'", function, s)),
        },
        other => Err(anyhow!("{}() requires dates, got {}", function, other.type_name())),
    }
}

// String functions

struct LengthFunction;
impl ConditionFunction for LengthFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        let len = match &args[0] {
            FieldValue::String(s) => s.chars().count(),
            FieldValue::Array(a) => a.len(),
            FieldValue::Object(o) => o.len(),
            other => return Err(anyhow!("object of type {} has no len()", other.type_name())),
        };
        Ok(FieldValue::Integer(len as i64))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Returns the length of a string, array or object"
    }
}

struct LowerFunction;
impl ConditionFunction for LowerFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        Ok(FieldValue::String(string_arg("lower", &args[0])?.to_lowercase()))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Converts a string to lowercase"
    }
}

struct UpperFunction;
impl ConditionFunction for UpperFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        Ok(FieldValue::String(string_arg("upper", &args[0])?.to_uppercase()))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Converts a string to uppercase"
    }
}

struct TrimFunction;
impl ConditionFunction for TrimFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        Ok(FieldValue::String(string_arg("trim", &args[0])?.trim().to_string()))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Removes leading and trailing whitespace"
    }
}

struct ContainsFunction;
impl ConditionFunction for ContainsFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        match (&args[0], &args[1]) {
            (FieldValue::String(haystack), FieldValue::String(needle)) => {
                Ok(FieldValue::Boolean(haystack.contains(needle.as_str())))
            }
            (FieldValue::Array(items), needle) => Ok(FieldValue::Boolean(items.contains(needle))),
            (FieldValue::Null, _) => Ok(FieldValue::Boolean(false)),
            _ => Err(anyhow!("contains() requires a string or array as first argument")),
        }
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }
    fn description(&self) -> &'static str {
        "Checks whether a string contains a substring or an array contains a value"
    }
}

struct StartsWithFunction;
impl ConditionFunction for StartsWithFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        let value = string_arg("startswith", &args[0])?;
        let prefix = string_arg("startswith", &args[1])?;
        Ok(FieldValue::Boolean(value.starts_with(prefix)))
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }
    fn description(&self) -> &'static str {
        "Checks whether a string starts with a prefix"
    }
}

struct EndsWithFunction;
impl ConditionFunction for EndsWithFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        let value = string_arg("endswith", &args[0])?;
        let suffix = string_arg("endswith", &args[1])?;
        Ok(FieldValue::Boolean(value.ends_with(suffix)))
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }
    fn description(&self) -> &'static str {
        "Checks whether a string ends with a suffix"
    }
}

// Numeric functions

struct AbsFunction;
impl ConditionFunction for AbsFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        match &args[0] {
            FieldValue::Integer(n) => Ok(FieldValue::Integer(n.saturating_abs())),
            FieldValue::Float(f) => Ok(FieldValue::Float(f.abs())),
            _ => Err(anyhow!("abs() requires a numeric argument")),
        }
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Returns the absolute value of a number"
    }
}

fn pick_extreme(name: &str, args: &[FieldValue], want: std::cmp::Ordering) -> Result<FieldValue> {
    let values: &[FieldValue] = match args {
        [FieldValue::Array(items)] => items,
        _ => args,
    };
    let mut best = values.first().ok_or_else(|| anyhow!("{}() requires at least one argument", name))?;
    for candidate in &values[1..] {
        match candidate.partial_cmp(best) {
            Some(ordering) if ordering == want => best = candidate,
            Some(_) => {}
            None => {
                return Err(anyhow!(
                    "{}() cannot compare {} with {}",
                    name,
                    candidate.type_name(),
                    best.type_name()
                ));
            }
        }
    }
    Ok(best.clone())
}

struct MinFunction;
impl ConditionFunction for MinFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        pick_extreme("min", args, std::cmp::Ordering::Less)
    }

    fn arity(&self) -> Option<usize> {
        None
    } // Variadic
    fn description(&self) -> &'static str {
        "Returns the smallest of the arguments (or of a single array argument)"
    }
}

struct MaxFunction;
impl ConditionFunction for MaxFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        pick_extreme("max", args, std::cmp::Ordering::Greater)
    }

    fn arity(&self) -> Option<usize> {
        None
    } // Variadic
    fn description(&self) -> &'static str {
        "Returns the largest of the arguments (or of a single array argument)"
    }
}

struct RoundFunction;
impl ConditionFunction for RoundFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        let precision = match args.get(1) {
            None => 0,
            Some(FieldValue::Integer(p)) if (0..=15).contains(p) => *p as i32,
            Some(_) => return Err(anyhow!("round() precision must be an integer between 0 and 15")),
        };
        let value = args
            .first()
            .and_then(FieldValue::as_f64)
            .ok_or_else(|| anyhow!("round() requires a numeric argument"))?;

        let factor = 10f64.powi(precision);
        let rounded = (value * factor).round() / factor;
        if args.len() == 1 {
            Ok(FieldValue::Integer(rounded as i64))
        } else {
            Ok(FieldValue::Float(rounded))
        }
    }

    fn arity(&self) -> Option<usize> {
        None
    } // 1 or 2 arguments
    fn description(&self) -> &'static str {
        "Rounds a number to the given number of decimal places"
    }
}

// Conversion functions

struct ToIntFunction;
impl ConditionFunction for ToIntFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        args[0]
            .as_integer()
            .map(FieldValue::Integer)
            .ok_or_else(|| anyhow!("int() cannot convert {} '{}'", args[0].type_name(), args[0]))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Converts a value to an integer"
    }
}

struct ToFloatFunction;
impl ConditionFunction for ToFloatFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        args[0]
            .as_float()
            .map(FieldValue::Float)
            .ok_or_else(|| anyhow!("float() cannot convert {} '{}'", args[0].type_name(), args[0]))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Converts a value to a float"
    }
}

struct ToStringFunction;
impl ConditionFunction for ToStringFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        Ok(FieldValue::String(args[0].as_string()))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Converts a value to its string representation"
    }
}

// Utility functions

struct CoalesceFunction;
impl ConditionFunction for CoalesceFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        Ok(args.iter().find(|arg| arg.is_truthy()).or_else(|| args.last()).cloned().unwrap_or(FieldValue::Null))
    }

    fn arity(&self) -> Option<usize> {
        None
    } // Variadic
    fn description(&self) -> &'static str {
        "Returns the first truthy argument, or the last argument when none is"
    }
}

struct IsSetFunction;
impl ConditionFunction for IsSetFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        let set = match &args[0] {
            FieldValue::Null => false,
            FieldValue::String(s) => !s.trim().is_empty(),
            _ => true,
        };
        Ok(FieldValue::Boolean(set))
    }

    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn description(&self) -> &'static str {
        "Checks whether a field holds a non-blank value"
    }
}

// Date functions

struct NowFunction;
impl ConditionFunction for NowFunction {
    fn call(&self, _args: &[FieldValue]) -> Result<FieldValue> {
        Ok(FieldValue::Date(Utc::now()))
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }
    fn description(&self) -> &'static str {
        "Returns the current date and time"
    }
}

struct TodayFunction;
impl ConditionFunction for TodayFunction {
    fn call(&self, _args: &[FieldValue]) -> Result<FieldValue> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("today() could not build midnight"))?;
        Ok(FieldValue::Date(midnight.and_utc()))
    }

    fn arity(&self) -> Option<usize> {
        Some(0)
    }
    fn description(&self) -> &'static str {
        "Returns today's date at midnight UTC"
    }
}

struct DateDiffDaysFunction;
impl ConditionFunction for DateDiffDaysFunction {
    fn call(&self, args: &[FieldValue]) -> Result<FieldValue> {
        let end = as_date("date_diff_days", &args[0])?;
        let start = as_date("date_diff_days", &args[1])?;
        Ok(FieldValue::Integer((end - start).num_days()))
    }

    fn arity(&self) -> Option<usize> {
        Some(2)
    }
    fn description(&self) -> &'static str {
        "Number of whole days from the second date to the first"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_functions() {
        let registry = FunctionRegistry::with_builtins();

        let result = registry.call("lower", &[FieldValue::from("URGENT")]).unwrap();
        assert_eq!(result, FieldValue::from("urgent"));

        let result = registry.call("len", &[FieldValue::from("héllo")]).unwrap();
        assert_eq!(result, FieldValue::Integer(5));

        let result = registry
            .call("startswith", &[FieldValue::from("RE: invoice"), FieldValue::from("RE:")])
            .unwrap();
        assert_eq!(result, FieldValue::Boolean(true));
    }

    #[test]
    fn test_min_max_accept_arrays_and_varargs() {
        let registry = FunctionRegistry::with_builtins();

        let result = registry
            .call("max", &[FieldValue::Integer(3), FieldValue::Float(4.5), FieldValue::Integer(1)])
            .unwrap();
        assert_eq!(result, FieldValue::Float(4.5));

        let result = registry
            .call("min", &[FieldValue::Array(vec![FieldValue::Integer(7), FieldValue::Integer(2)])])
            .unwrap();
        assert_eq!(result, FieldValue::Integer(2));

        assert!(registry.call("min", &[]).is_err());
        assert!(registry.call("min", &[FieldValue::Integer(1), FieldValue::from("a")]).is_err());
    }

    #[test]
    fn test_round() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(registry.call("round", &[FieldValue::Float(2.6)]).unwrap(), FieldValue::Integer(3));
        assert_eq!(
            registry.call("round", &[FieldValue::Float(2.345), FieldValue::Integer(1)]).unwrap(),
            FieldValue::Float(2.3)
        );
    }

    #[test]
    fn test_arity_is_enforced() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry.call("lower", &[]).unwrap_err();
        assert!(err.to_string().contains("expects 1 arguments"));
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.call("eval", &[FieldValue::from("1")]).is_err());
        assert!(registry.call("__import__", &[FieldValue::from("os")]).is_err());
        assert!(!registry.contains("exec"));
    }

    #[test]
    fn test_date_diff() {
        let registry = FunctionRegistry::with_builtins();
        let result = registry
            .call("date_diff_days", &[FieldValue::from("2024-03-10"), FieldValue::from("2024-03-01")])
            .unwrap();
        assert_eq!(result, FieldValue::Integer(9));
    }

    #[test]
    fn test_coalesce_and_is_set() {
        let registry = FunctionRegistry::with_builtins();
        let result = registry
            .call("coalesce", &[FieldValue::Null, FieldValue::from(""), FieldValue::from("Support")])
            .unwrap();
        assert_eq!(result, FieldValue::from("Support"));
        assert_eq!(registry.call("is_set", &[FieldValue::from("  ")]).unwrap(), FieldValue::Boolean(false));
    }
}
