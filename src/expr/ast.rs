//! AST construction: postfix (RPN) stream → expression tree.

use serde_json::Value;

use super::parser::Rpn;
use super::{ExprError, Result};

/// Typed expression node. Immutable once built; owned by the evaluation that
/// built it.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(Value),
    /// Identifier resolved against the runtime context (dotted path).
    Identifier(String),
    /// Unary operator application (`u+`, `u-`, `!`).
    Unary {
        /// Operator symbol.
        op: String,
        /// Operand expression.
        operand: Box<Expr>,
    },
    /// Binary operator application.
    Binary {
        /// Operator symbol.
        op: String,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Built-in function call.
    Call {
        /// Function name as written in the source.
        name: String,
        /// Argument expressions in declaration order.
        args: Vec<Expr>,
    },
    /// Conditional expression; exactly one branch is ever evaluated.
    Ternary {
        /// Condition expression.
        condition: Box<Expr>,
        /// Branch taken when the condition is truthy.
        when_true: Box<Expr>,
        /// Branch taken when the condition is falsy.
        when_false: Box<Expr>,
    },
}

fn is_unary(op: &str) -> bool {
    matches!(op, "u+" | "u-" | "!")
}

/// Fold a postfix stream into a single expression tree.
///
/// Pure stack machine: fails if any item underflows the stack or if the final
/// stack holds anything other than exactly one node.
pub(crate) fn build_ast(rpn: Vec<Rpn>) -> Result<Expr> {
    let mut stack: Vec<Expr> = Vec::new();

    for item in rpn {
        match item {
            Rpn::Literal(value) => stack.push(Expr::Literal(value)),
            Rpn::Ident(name) => stack.push(Expr::Identifier(name)),
            Rpn::Op(op) => {
                if is_unary(&op) {
                    let operand = stack.pop().ok_or(ExprError::Malformed)?;
                    stack.push(Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    });
                } else {
                    let right = stack.pop().ok_or(ExprError::Malformed)?;
                    let left = stack.pop().ok_or(ExprError::Malformed)?;
                    stack.push(Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    });
                }
            }
            Rpn::Func { name, argc } => {
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(stack.pop().ok_or(ExprError::Malformed)?);
                }
                args.reverse();
                stack.push(Expr::Call { name, args });
            }
            Rpn::Ternary => {
                let when_false = stack.pop().ok_or(ExprError::Malformed)?;
                let when_true = stack.pop().ok_or(ExprError::Malformed)?;
                let condition = stack.pop().ok_or(ExprError::Malformed)?;
                stack.push(Expr::Ternary {
                    condition: Box::new(condition),
                    when_true: Box::new(when_true),
                    when_false: Box::new(when_false),
                });
            }
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(expr), true) => Ok(expr),
        _ => Err(ExprError::Malformed),
    }
}
