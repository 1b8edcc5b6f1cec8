//! Restricted expression language for rule conditions
//!
//! Conditions are written by administrators in a small Python-flavoured
//! language: field names, literals, comparisons, `in`/`not in`, boolean
//! connectives and a whitelist of pure functions. The language is:
//! - Safe: no imports, no attribute traversal beyond object keys, no code execution
//! - Cached: each distinct source string is parsed once per engine
//! - Total: every failure is an `Err`, never a panic

pub mod ast;
pub mod evaluator;
pub mod functions;
pub mod parser;

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use rota_types::{Document, FieldValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Upper bound on the length of a condition source string
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

/// Parsed expression ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    /// Original expression string
    pub source: String,
    /// Compiled abstract syntax tree
    pub ast: ast::Expression,
    /// Names referenced in the expression
    pub variables: Vec<String>,
}

/// Context for evaluating condition expressions
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    /// Document snapshot the condition is evaluated against
    pub document: &'a Document,
    /// Additional named values (shadowed by document fields)
    pub globals: HashMap<String, FieldValue>,
}

impl<'a> EvaluationContext<'a> {
    /// Context exposing only the document's fields
    pub fn for_document(document: &'a Document) -> Self {
        Self { document, globals: HashMap::new() }
    }
}

/// Parses, caches and evaluates expressions
#[derive(Debug)]
pub struct ExpressionEngine {
    functions: functions::FunctionRegistry,
    compiled: DashMap<String, Arc<CompiledExpression>>,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine {
    /// Create an engine with the built-in function whitelist
    pub fn new() -> Self {
        Self::with_functions(functions::FunctionRegistry::with_builtins())
    }

    /// Create an engine with a custom function registry
    pub fn with_functions(functions: functions::FunctionRegistry) -> Self {
        Self { functions, compiled: DashMap::new() }
    }

    /// Parse an expression, reusing a previously compiled tree when available
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledExpression>> {
        if let Some(cached) = self.compiled.get(source) {
            return Ok(Arc::clone(cached.value()));
        }

        if source.len() > MAX_EXPRESSION_LENGTH {
            return Err(anyhow!(
                "Expression is {} bytes long, the limit is {}",
                source.len(),
                MAX_EXPRESSION_LENGTH
            ));
        }

        let ast = parser::parse_expression(source)?;
        let variables = ast::extract_variables(&ast);
        let compiled = Arc::new(CompiledExpression { source: source.to_string(), ast, variables });

        self.compiled.insert(source.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Evaluate a compiled expression
    pub fn evaluate(&self, expression: &CompiledExpression, context: &EvaluationContext) -> Result<FieldValue> {
        evaluator::evaluate_expression(&expression.ast, context, &self.functions)
    }

    /// Compile and evaluate in one step
    pub fn eval(&self, source: &str, context: &EvaluationContext) -> Result<FieldValue> {
        let compiled = self.compile(source)?;
        self.evaluate(&compiled, context)
    }

    /// Number of distinct expressions compiled so far
    pub fn cached_expressions(&self) -> usize {
        self.compiled.len()
    }

    /// Register a custom function
    pub fn register_function<F>(&mut self, name: &str, func: F)
    where
        F: functions::ConditionFunction + 'static,
    {
        self.functions.register(name, Box::new(func));
    }
}
