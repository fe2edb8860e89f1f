//! Expression language for flow graphs.
//!
//! A small infix language evaluated against the flow session's variable bag:
//! arithmetic with numeric-coercion heuristics, comparisons, short-circuit
//! boolean operators, a ternary operator, dotted identifier paths, and a
//! fixed registry of string/number/list helper functions. The pipeline is
//! tokenizer → operator-precedence parser (RPN) → AST builder → evaluator,
//! plus a `{{...}}` template renderer layered on top.
//!
//! Parse errors are the only hard failure; evaluation itself always degrades
//! to `Null` so a malformed node cannot crash an in-progress session.

/// Abstract syntax tree definitions and the RPN → tree builder.
pub mod ast;
/// Evaluator, built-in function registry, and coercion helpers.
pub mod eval;
/// Shunting-yard parser producing postfix (RPN) order.
pub mod parser;
/// Template placeholder renderer.
pub mod template;
/// Tokenizer for raw expression source.
pub mod token;

pub use ast::Expr;
pub use eval::{Scope, coerce_bool, evaluate_ast, truthy};
pub use template::{render, render_str};
pub use token::{Token, tokenize};

use serde_json::Value;
use thiserror::Error;

/// Convenience result alias for expression parsing.
pub type Result<T> = std::result::Result<T, ExprError>;

/// Errors surfaced by the tokenizer, parser, and AST builder.
#[derive(Debug, Error)]
pub enum ExprError {
    /// The tokenizer hit a character outside the language.
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    /// A string literal was never closed.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// Parentheses did not balance.
    #[error("mismatched parentheses")]
    MismatchedParens,

    /// An operator symbol outside the operator table.
    #[error("unsupported operator '{0}'")]
    UnknownOperator(String),

    /// The expression did not reduce to exactly one tree.
    #[error("malformed expression")]
    Malformed,
}

/// Parse an expression source string into an AST.
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = token::tokenize(source)?;
    let rpn = parser::to_rpn(&tokens)?;
    ast::build_ast(rpn)
}

/// Parse and evaluate in one step. Parse errors are returned; evaluation
/// itself never fails.
pub fn evaluate(source: &str, scope: &dyn Scope) -> Result<Value> {
    Ok(eval::evaluate_ast(&parse(source)?, scope))
}

/// Evaluate with the engine's degrade policy: on a parse error the original
/// source string is returned unevaluated, and the error is reported through
/// the diagnostics log rather than masked entirely.
pub fn evaluate_lenient(source: &str, scope: &dyn Scope) -> Value {
    match parse(source) {
        Ok(ast) => eval::evaluate_ast(&ast, scope),
        Err(err) => {
            tracing::warn!(expression = source, error = %err, "expression failed to parse; using literal text");
            Value::String(source.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lenient_evaluation_returns_source_on_parse_error() {
        let scope: HashMap<String, Value> = HashMap::new();
        assert_eq!(
            evaluate_lenient("2 +", &scope),
            Value::String("2 +".into())
        );
    }

    #[test]
    fn lenient_evaluation_still_evaluates_valid_input() {
        let scope: HashMap<String, Value> = HashMap::new();
        assert_eq!(evaluate_lenient("2 + 3", &scope), Value::from(5));
    }
}
