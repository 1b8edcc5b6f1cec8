//! Abstract Syntax Tree for condition expressions

use rota_types::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// AST node representing an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Literal value (number, string, boolean, null)
    Literal(FieldValue),

    /// Field or global reference
    Variable(String),

    /// Binary operation (a == b, a and b, a in b, ...)
    BinaryOp { left: Box<Expression>, operator: BinaryOperator, right: Box<Expression> },

    /// Unary operation (-a, not a)
    UnaryOp { operator: UnaryOperator, operand: Box<Expression> },

    /// Call of a whitelisted function (lower(status), len(subject))
    FunctionCall { name: String, args: Vec<Expression> },

    /// Key lookup on an object value (doc.status)
    FieldAccess { object: Box<Expression>, field: String },

    /// Array literal ([1, 2, 3])
    ArrayLiteral { elements: Vec<Expression> },

    /// Subscript (tags[0], doc["status"])
    Index { target: Box<Expression>, index: Box<Expression> },
}

/// Binary operators supported by the condition language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Membership
    In,
    NotIn,

    // Logical
    And,
    Or,
}

/// Unary operators supported by the condition language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Numeric negation (-x)
    Negate,
    /// Logical negation (not x, !x)
    Not,
}

impl Expression {
    /// Create a literal integer expression
    pub fn int(value: i64) -> Self {
        Self::Literal(FieldValue::Integer(value))
    }

    /// Create a literal float expression
    pub fn float(value: f64) -> Self {
        Self::Literal(FieldValue::Float(value))
    }

    /// Create a literal string expression
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(FieldValue::String(value.into()))
    }

    /// Create a literal boolean expression
    pub fn bool(value: bool) -> Self {
        Self::Literal(FieldValue::Boolean(value))
    }

    /// Create a null literal expression
    pub fn null() -> Self {
        Self::Literal(FieldValue::Null)
    }

    /// Create an array literal expression
    pub fn array(elements: Vec<Expression>) -> Self {
        Self::ArrayLiteral { elements }
    }

    /// Create a variable reference
    pub fn var(name: &str) -> Self {
        Self::Variable(name.to_string())
    }

    /// Create a binary operation
    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Self::BinaryOp { left: Box::new(left), operator: op, right: Box::new(right) }
    }

    /// Create a unary operation
    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Self::UnaryOp { operator: op, operand: Box::new(operand) }
    }

    /// Create a function call
    pub fn call(name: &str, args: Vec<Expression>) -> Self {
        Self::FunctionCall { name: name.to_string(), args }
    }

    /// Create a field access expression
    pub fn field(object: Expression, field: &str) -> Self {
        Self::FieldAccess { object: Box::new(object), field: field.to_string() }
    }

    /// Create a subscript expression
    pub fn index(target: Expression, index: Expression) -> Self {
        Self::Index { target: Box::new(target), index: Box::new(index) }
    }
}

impl BinaryOperator {
    /// Get the precedence of this operator (higher = tighter binding)
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual
            | BinaryOperator::In
            | BinaryOperator::NotIn => 4,
            BinaryOperator::Add | BinaryOperator::Subtract => 5,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
        }
    }

    /// Source spelling, used in error messages
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::In => "in",
            BinaryOperator::NotIn => "not in",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }
}

/// Extract all top-level names referenced in an expression
///
/// For `doc.status` this reports `doc`; function names are not variables.
pub fn extract_variables(expr: &Expression) -> Vec<String> {
    let mut variables = HashSet::new();
    extract_variables_recursive(expr, &mut variables);
    let mut result: Vec<String> = variables.into_iter().collect();
    result.sort();
    result
}

fn extract_variables_recursive(expr: &Expression, variables: &mut HashSet<String>) {
    match expr {
        Expression::Variable(name) => {
            variables.insert(name.clone());
        }
        Expression::BinaryOp { left, right, .. } => {
            extract_variables_recursive(left, variables);
            extract_variables_recursive(right, variables);
        }
        Expression::UnaryOp { operand, .. } => {
            extract_variables_recursive(operand, variables);
        }
        Expression::FunctionCall { args, .. } => {
            for arg in args {
                extract_variables_recursive(arg, variables);
            }
        }
        Expression::FieldAccess { object, .. } => {
            extract_variables_recursive(object, variables);
        }
        Expression::ArrayLiteral { elements } => {
            for element in elements {
                extract_variables_recursive(element, variables);
            }
        }
        Expression::Index { target, index } => {
            extract_variables_recursive(target, variables);
            extract_variables_recursive(index, variables);
        }
        Expression::Literal(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_creation() {
        let expr = Expression::binary(
            Expression::var("status"),
            BinaryOperator::Equal,
            Expression::string("Open"),
        );

        match expr {
            Expression::BinaryOp { left, operator, right } => {
                assert_eq!(left.as_ref(), &Expression::Variable("status".to_string()));
                assert_eq!(operator, BinaryOperator::Equal);
                assert_eq!(right.as_ref(), &Expression::Literal(FieldValue::from("Open")));
            }
            _ => panic!("Expected binary operation"),
        }
    }

    #[test]
    fn test_variable_extraction() {
        let expr = Expression::binary(
            Expression::binary(Expression::var("status"), BinaryOperator::Equal, Expression::string("Open")),
            BinaryOperator::And,
            Expression::binary(
                Expression::field(Expression::var("doc"), "priority"),
                BinaryOperator::In,
                Expression::array(vec![Expression::string("High"), Expression::var("fallback")]),
            ),
        );

        assert_eq!(extract_variables(&expr), vec!["doc", "fallback", "status"]);
    }

    #[test]
    fn test_operator_precedence() {
        assert!(BinaryOperator::Multiply.precedence() > BinaryOperator::Add.precedence());
        assert!(BinaryOperator::Add.precedence() > BinaryOperator::Equal.precedence());
        assert!(BinaryOperator::And.precedence() > BinaryOperator::Or.precedence());
        assert_eq!(BinaryOperator::In.precedence(), BinaryOperator::Equal.precedence());
    }
}
