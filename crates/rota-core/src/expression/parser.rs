//! Parser for condition expressions
//!
//! Recursive descent with one function per precedence level. The grammar follows
//! the Python-style conditions administrators write for assignment rules
//! (`status == 'Open' and priority in ['High', 'Urgent']`) and also accepts the
//! C-style spellings `&&`, `||` and `!`.

use crate::expression::ast::{BinaryOperator, Expression, UnaryOperator};
use anyhow::{Result, anyhow};
use std::fmt;

/// Maximum nesting depth accepted by the parser
pub const MAX_NESTING_DEPTH: usize = 64;

/// Token types recognized by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),
    Float(f64),
    String(String),
    True,
    False,
    Null,

    // Identifiers and keywords
    Identifier(String),
    And,
    Or,
    Not,
    In,
    NotIn,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "'{}'", s),
            Token::True => write!(f, "True"),
            Token::False => write!(f, "False"),
            Token::Null => write!(f, "None"),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::In => write!(f, "in"),
            Token::NotIn => write!(f, "not in"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Equal => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::LessThan => write!(f, "<"),
            Token::LessThanEqual => write!(f, "<="),
            Token::GreaterThan => write!(f, ">"),
            Token::GreaterThanEqual => write!(f, ">="),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Eof => write!(f, "end of expression"),
        }
    }
}

/// Lexer for tokenizing condition expressions
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self { input: chars, position: 0, current_char }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let mut number = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.' && !is_float && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            let value = number
                .parse::<f64>()
                .map_err(|e| anyhow!("Invalid float '{}': {}", number, e))?;
            Ok(Token::Float(value))
        } else {
            let value = number
                .parse::<i64>()
                .map_err(|e| anyhow!("Invalid integer '{}': {}", number, e))?;
            Ok(Token::Integer(value))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token> {
        let mut string = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance();
                return Ok(Token::String(string));
            } else if ch == '\\' {
                self.advance();
                match self.current_char {
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some('\\') => string.push('\\'),
                    Some('\'') => string.push('\''),
                    Some('"') => string.push('"'),
                    Some(other) => {
                        string.push('\\');
                        string.push(other);
                    }
                    None => return Err(anyhow!("Unterminated string literal")),
                }
                self.advance();
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(anyhow!("Unterminated string literal"))
    }

    /// After reading `not`, look ahead for a following `in` keyword
    fn followed_by_in(&self) -> bool {
        let mut pos = self.position;
        while self.input.get(pos).is_some_and(|c| c.is_whitespace()) {
            pos += 1;
        }
        if pos == self.position {
            return false;
        }
        self.input.get(pos) == Some(&'i')
            && self.input.get(pos + 1) == Some(&'n')
            && !self.input.get(pos + 2).is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
    }

    fn read_identifier(&mut self) -> Token {
        let mut identifier = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match identifier.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "in" => Token::In,
            "not" => {
                if self.followed_by_in() {
                    self.skip_whitespace();
                    self.advance();
                    self.advance();
                    Token::NotIn
                } else {
                    Token::Not
                }
            }
            "true" | "True" => Token::True,
            "false" | "False" => Token::False,
            "none" | "None" | "null" => Token::Null,
            _ => Token::Identifier(identifier),
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();

        match self.current_char {
            None => Ok(Token::Eof),
            Some(ch) => match ch {
                '0'..='9' => self.read_number(),
                '"' | '\'' => self.read_string(ch),
                'a'..='z' | 'A'..='Z' | '_' => Ok(self.read_identifier()),
                '+' => {
                    self.advance();
                    Ok(Token::Plus)
                }
                '-' => {
                    self.advance();
                    Ok(Token::Minus)
                }
                '*' => {
                    self.advance();
                    Ok(Token::Star)
                }
                '/' => {
                    self.advance();
                    Ok(Token::Slash)
                }
                '%' => {
                    self.advance();
                    Ok(Token::Percent)
                }
                '=' => {
                    if self.peek() == Some('=') {
                        self.advance();
                        self.advance();
                        Ok(Token::Equal)
                    } else {
                        Err(anyhow!("Unexpected character '='. Did you mean '=='?"))
                    }
                }
                '!' => {
                    if self.peek() == Some('=') {
                        self.advance();
                        self.advance();
                        Ok(Token::NotEqual)
                    } else {
                        self.advance();
                        Ok(Token::Not)
                    }
                }
                '<' => {
                    if self.peek() == Some('=') {
                        self.advance();
                        self.advance();
                        Ok(Token::LessThanEqual)
                    } else {
                        self.advance();
                        Ok(Token::LessThan)
                    }
                }
                '>' => {
                    if self.peek() == Some('=') {
                        self.advance();
                        self.advance();
                        Ok(Token::GreaterThanEqual)
                    } else {
                        self.advance();
                        Ok(Token::GreaterThan)
                    }
                }
                '&' => {
                    if self.peek() == Some('&') {
                        self.advance();
                        self.advance();
                        Ok(Token::And)
                    } else {
                        Err(anyhow!("Unexpected character '&'. Did you mean '&&'?"))
                    }
                }
                '|' => {
                    if self.peek() == Some('|') {
                        self.advance();
                        self.advance();
                        Ok(Token::Or)
                    } else {
                        Err(anyhow!("Unexpected character '|'. Did you mean '||'?"))
                    }
                }
                '(' => {
                    self.advance();
                    Ok(Token::LeftParen)
                }
                ')' => {
                    self.advance();
                    Ok(Token::RightParen)
                }
                '[' => {
                    self.advance();
                    Ok(Token::LeftBracket)
                }
                ']' => {
                    self.advance();
                    Ok(Token::RightBracket)
                }
                ',' => {
                    self.advance();
                    Ok(Token::Comma)
                }
                '.' => {
                    self.advance();
                    Ok(Token::Dot)
                }
                _ => Err(anyhow!("Unexpected character '{}'", ch)),
            },
        }
    }
}

/// Parser for condition expressions
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    depth: usize,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> Result<Self> {
        let current_token = lexer.next_token()?;
        Ok(Self { lexer, current_token, depth: 0 })
    }

    fn advance(&mut self) -> Result<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if std::mem::discriminant(&self.current_token) == std::mem::discriminant(&expected) {
            self.advance()
        } else {
            Err(anyhow!("Expected {}, found {}", expected, self.current_token))
        }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(anyhow!("Expression nested deeper than {} levels", MAX_NESTING_DEPTH));
        }
        let result = parse(self);
        self.depth -= 1;
        result
    }

    pub fn parse_expression(&mut self) -> Result<Expression> {
        self.nested(|parser| parser.parse_or_expression())
    }

    fn parse_or_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_and_expression()?;

        while matches!(self.current_token, Token::Or) {
            self.advance()?;
            let right = self.parse_and_expression()?;
            left = Expression::binary(left, BinaryOperator::Or, right);
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_not_expression()?;

        while matches!(self.current_token, Token::And) {
            self.advance()?;
            let right = self.parse_not_expression()?;
            left = Expression::binary(left, BinaryOperator::And, right);
        }

        Ok(left)
    }

    fn parse_not_expression(&mut self) -> Result<Expression> {
        if matches!(self.current_token, Token::Not) {
            self.advance()?;
            let operand = self.nested(|parser| parser.parse_not_expression())?;
            return Ok(Expression::unary(UnaryOperator::Not, operand));
        }
        self.parse_comparison_expression()
    }

    fn parse_comparison_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_additive_expression()?;

        loop {
            let op = match self.current_token {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessThanEqual => BinaryOperator::LessThanOrEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterThanEqual => BinaryOperator::GreaterThanOrEqual,
                Token::In => BinaryOperator::In,
                Token::NotIn => BinaryOperator::NotIn,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_additive_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        while matches!(self.current_token, Token::Plus | Token::Minus) {
            let op = match self.current_token {
                Token::Plus => BinaryOperator::Add,
                _ => BinaryOperator::Subtract,
            };
            self.advance()?;
            let right = self.parse_multiplicative_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Expression> {
        let mut left = self.parse_unary_expression()?;

        while matches!(self.current_token, Token::Star | Token::Slash | Token::Percent) {
            let op = match self.current_token {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => BinaryOperator::Modulo,
            };
            self.advance()?;
            let right = self.parse_unary_expression()?;
            left = Expression::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Expression> {
        if matches!(self.current_token, Token::Minus) {
            self.advance()?;
            let operand = self.nested(|parser| parser.parse_unary_expression())?;
            return Ok(Expression::unary(UnaryOperator::Negate, operand));
        }
        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> Result<Expression> {
        let mut expr = self.parse_primary_expression()?;

        loop {
            match self.current_token {
                Token::Dot => {
                    self.advance()?;
                    if let Token::Identifier(field) = &self.current_token {
                        let field_name = field.clone();
                        self.advance()?;
                        expr = Expression::field(expr, &field_name);
                    } else {
                        return Err(anyhow!("Expected field name after '.'"));
                    }
                }
                Token::LeftParen => {
                    if let Expression::Variable(name) = expr {
                        self.advance()?; // consume '('
                        let mut args = Vec::new();

                        if !matches!(self.current_token, Token::RightParen) {
                            args.push(self.parse_expression()?);

                            while matches!(self.current_token, Token::Comma) {
                                self.advance()?;
                                args.push(self.parse_expression()?);
                            }
                        }

                        self.expect(Token::RightParen)?;
                        expr = Expression::call(&name, args);
                    } else {
                        return Err(anyhow!("Only named functions can be called"));
                    }
                }
                Token::LeftBracket => {
                    self.advance()?; // consume '['
                    let index = self.parse_expression()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expression::index(expr, index);
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression> {
        match &self.current_token {
            Token::Integer(value) => {
                let val = *value;
                self.advance()?;
                Ok(Expression::int(val))
            }
            Token::Float(value) => {
                let val = *value;
                self.advance()?;
                Ok(Expression::float(val))
            }
            Token::String(value) => {
                let val = value.clone();
                self.advance()?;
                Ok(Expression::string(val))
            }
            Token::True => {
                self.advance()?;
                Ok(Expression::bool(true))
            }
            Token::False => {
                self.advance()?;
                Ok(Expression::bool(false))
            }
            Token::Null => {
                self.advance()?;
                Ok(Expression::null())
            }
            Token::Identifier(name) => {
                let var_name = name.clone();
                self.advance()?;
                Ok(Expression::var(&var_name))
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => {
                self.advance()?; // consume '['
                let mut elements = Vec::new();

                if !matches!(self.current_token, Token::RightBracket) {
                    elements.push(self.parse_expression()?);

                    while matches!(self.current_token, Token::Comma) {
                        self.advance()?;
                        // Allow trailing comma
                        if matches!(self.current_token, Token::RightBracket) {
                            break;
                        }
                        elements.push(self.parse_expression()?);
                    }
                }

                self.expect(Token::RightBracket)?;
                Ok(Expression::array(elements))
            }
            _ => Err(anyhow!("Unexpected token: {}", self.current_token)),
        }
    }
}

/// Parse an expression string into an AST
pub fn parse_expression(input: &str) -> Result<Expression> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    let expr = parser.parse_expression()?;

    if !matches!(parser.current_token, Token::Eof) {
        return Err(anyhow!("Unexpected token after expression: {}", parser.current_token));
    }

    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_basic() {
        let mut lexer = Lexer::new("priority >= 2.5");

        assert_eq!(lexer.next_token().unwrap(), Token::Identifier("priority".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::GreaterThanEqual);
        assert_eq!(lexer.next_token().unwrap(), Token::Float(2.5));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_lexer_quotes() {
        let mut lexer = Lexer::new(r#"'Open' "Closed""#);
        assert_eq!(lexer.next_token().unwrap(), Token::String("Open".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::String("Closed".to_string()));
    }

    #[test]
    fn test_lexer_not_in() {
        let mut lexer = Lexer::new("status not in ['Closed'] and not index");
        assert_eq!(lexer.next_token().unwrap(), Token::Identifier("status".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::NotIn);
        assert_eq!(lexer.next_token().unwrap(), Token::LeftBracket);
        assert_eq!(lexer.next_token().unwrap(), Token::String("Closed".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::RightBracket);
        assert_eq!(lexer.next_token().unwrap(), Token::And);
        assert_eq!(lexer.next_token().unwrap(), Token::Not);
        assert_eq!(lexer.next_token().unwrap(), Token::Identifier("index".to_string()));
    }

    #[test]
    fn test_parser_python_boolean_chain() {
        let expr = parse_expression("status == 'Open' and priority == 'High' or urgent").unwrap();

        // (a and b) or c
        match expr {
            Expression::BinaryOp { left, operator: BinaryOperator::Or, right } => {
                assert_eq!(right.as_ref(), &Expression::var("urgent"));
                assert!(matches!(
                    left.as_ref(),
                    Expression::BinaryOp { operator: BinaryOperator::And, .. }
                ));
            }
            _ => panic!("Expected 'or' at top level"),
        }
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let expr = parse_expression("not status == 'Closed'").unwrap();
        assert_eq!(
            expr,
            Expression::unary(
                UnaryOperator::Not,
                Expression::binary(
                    Expression::var("status"),
                    BinaryOperator::Equal,
                    Expression::string("Closed"),
                ),
            )
        );
    }

    #[test]
    fn test_parser_arithmetic_precedence() {
        let expr = parse_expression("2 + 3 * 4").unwrap();
        assert_eq!(
            expr,
            Expression::binary(
                Expression::int(2),
                BinaryOperator::Add,
                Expression::binary(Expression::int(3), BinaryOperator::Multiply, Expression::int(4)),
            )
        );
    }

    #[test]
    fn test_parser_function_call_and_field_access() {
        let expr = parse_expression("lower(doc.subject)").unwrap();

        match expr {
            Expression::FunctionCall { name, args } => {
                assert_eq!(name, "lower");
                assert_eq!(args, vec![Expression::field(Expression::var("doc"), "subject")]);
            }
            _ => panic!("Expected function call"),
        }
    }

    #[test]
    fn test_parser_membership_with_array() {
        let expr = parse_expression("priority in ['High', 'Urgent',]").unwrap();

        match expr {
            Expression::BinaryOp { operator: BinaryOperator::In, right, .. } => {
                assert_eq!(
                    right.as_ref(),
                    &Expression::array(vec![Expression::string("High"), Expression::string("Urgent")])
                );
            }
            _ => panic!("Expected membership test"),
        }
    }

    #[test]
    fn test_parser_subscript() {
        let expr = parse_expression("doc['status']").unwrap();
        assert_eq!(expr, Expression::index(Expression::var("doc"), Expression::string("status")));
    }

    #[test]
    fn test_parser_rejects_garbage() {
        assert!(parse_expression("status = 'Open'").is_err());
        assert!(parse_expression("status ==").is_err());
        assert!(parse_expression("(status").is_err());
        assert!(parse_expression("a b").is_err());
        assert!(parse_expression("'unterminated").is_err());
        assert!(parse_expression("import os").is_err());
    }

    #[test]
    fn test_parser_limits_nesting() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse_expression(&deep).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse_expression(&shallow).unwrap(), Expression::int(1));
    }
}
