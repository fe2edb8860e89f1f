//! Operator-precedence parser: token stream → postfix (RPN) order.
//!
//! Classic shunting-yard with three refinements the expression language
//! depends on: unary operator disambiguation by previous token, function-call
//! markers that count their arguments, and `?`/`:` markers that lower the
//! ternary operator with right-to-left composition.

use serde_json::Value;

use super::eval::number_value;
use super::token::Token;
use super::{ExprError, Result};

/// One item of the postfix stream consumed by the AST builder.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rpn {
    /// Literal value (number, string, boolean, null).
    Literal(Value),
    /// Identifier reference (dotted path).
    Ident(String),
    /// Operator application; unary plus/minus are tagged `u+`/`u-`.
    Op(String),
    /// Function call with a finalized argument count.
    Func { name: String, argc: usize },
    /// Ternary lowering marker: pops false-branch, true-branch, condition.
    Ternary,
}

/// Operator stack entries. `Func` doubles as the opening paren of its call.
#[derive(Debug)]
enum StackItem {
    Op(String),
    LParen,
    Func { name: String, commas: usize },
    Question,
    Colon,
}

/// Precedence table, highest to lowest. Returns `None` for unknown symbols.
fn precedence(op: &str) -> Option<u8> {
    match op {
        "u+" | "u-" | "!" => Some(7),
        "*" | "/" | "%" => Some(6),
        "+" | "-" => Some(5),
        "<" | "<=" | ">" | ">=" => Some(4),
        "==" | "!=" | "===" | "!==" => Some(3),
        "&&" => Some(2),
        "||" => Some(1),
        _ => None,
    }
}

fn is_right_associative(op: &str) -> bool {
    matches!(op, "u+" | "u-" | "!")
}

/// Whether an operator in this position is unary, judged by the token that
/// precedes it: nothing, another operator, an open paren, a comma, or a
/// ternary marker all mean "no left operand exists".
fn unary_position(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(Token::Op(_))
        | Some(Token::LParen)
        | Some(Token::Comma)
        | Some(Token::Question)
        | Some(Token::Colon) => true,
        _ => false,
    }
}

/// Convert a token stream into postfix order.
pub(crate) fn to_rpn(tokens: &[Token]) -> Result<Vec<Rpn>> {
    let mut output = Vec::new();
    let mut stack: Vec<StackItem> = Vec::new();
    let mut prev: Option<Token> = None;

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        match token {
            Token::Number(n) => output.push(Rpn::Literal(number_value(*n))),
            Token::Str(s) => output.push(Rpn::Literal(Value::String(s.clone()))),
            Token::Bool(b) => output.push(Rpn::Literal(Value::Bool(*b))),
            Token::Null => output.push(Rpn::Literal(Value::Null)),
            Token::Ident(name) => {
                if matches!(tokens.get(i + 1), Some(Token::LParen)) {
                    // Identifier immediately followed by `(` is a call; the
                    // marker swallows the paren.
                    stack.push(StackItem::Func {
                        name: name.clone(),
                        commas: 0,
                    });
                    prev = Some(Token::LParen);
                    i += 2;
                    continue;
                }
                output.push(Rpn::Ident(name.clone()));
            }
            Token::Op(op) => {
                let effective = if unary_position(prev.as_ref()) {
                    match op.as_str() {
                        "+" => "u+".to_string(),
                        "-" => "u-".to_string(),
                        _ => op.clone(),
                    }
                } else {
                    op.clone()
                };
                let prec = precedence(&effective)
                    .ok_or_else(|| ExprError::UnknownOperator(effective.clone()))?;
                while let Some(StackItem::Op(top)) = stack.last() {
                    let top_prec = precedence(top).unwrap_or(0);
                    let pops = if is_right_associative(&effective) {
                        top_prec > prec
                    } else {
                        top_prec >= prec
                    };
                    if !pops {
                        break;
                    }
                    if let Some(StackItem::Op(top)) = stack.pop() {
                        output.push(Rpn::Op(top));
                    }
                }
                stack.push(StackItem::Op(effective));
            }
            Token::LParen => stack.push(StackItem::LParen),
            Token::RParen => loop {
                match stack.pop() {
                    None => return Err(ExprError::MismatchedParens),
                    Some(StackItem::Op(op)) => output.push(Rpn::Op(op)),
                    Some(StackItem::Colon) => output.push(Rpn::Ternary),
                    Some(StackItem::Question) => return Err(ExprError::Malformed),
                    Some(StackItem::LParen) => break,
                    Some(StackItem::Func { name, commas }) => {
                        // Zero-argument calls are the `f()` case: the token
                        // right before the close paren is the call's own `(`.
                        let argc = if matches!(prev, Some(Token::LParen)) {
                            0
                        } else {
                            commas + 1
                        };
                        output.push(Rpn::Func { name, argc });
                        break;
                    }
                }
            },
            Token::Comma => loop {
                match stack.last_mut() {
                    None | Some(StackItem::LParen) => return Err(ExprError::Malformed),
                    Some(StackItem::Func { commas, .. }) => {
                        *commas += 1;
                        break;
                    }
                    Some(StackItem::Question) => return Err(ExprError::Malformed),
                    Some(StackItem::Colon) => {
                        stack.pop();
                        output.push(Rpn::Ternary);
                    }
                    Some(StackItem::Op(_)) => {
                        if let Some(StackItem::Op(op)) = stack.pop() {
                            output.push(Rpn::Op(op));
                        }
                    }
                }
            },
            Token::Question => {
                // The condition ends here; flush its operators before the
                // marker goes on.
                while let Some(StackItem::Op(_)) = stack.last() {
                    if let Some(StackItem::Op(op)) = stack.pop() {
                        output.push(Rpn::Op(op));
                    }
                }
                stack.push(StackItem::Question);
            }
            Token::Colon => {
                // Flush operators back to the matching `?`, then replace it
                // with a colon marker that lowers to a ternary at the end.
                // A pending colon marker on the way is a completed inner
                // ternary (the true branch was itself conditional); lower it
                // and keep looking for the enclosing `?`.
                loop {
                    match stack.pop() {
                        None | Some(StackItem::LParen) | Some(StackItem::Func { .. }) => {
                            return Err(ExprError::Malformed);
                        }
                        Some(StackItem::Colon) => output.push(Rpn::Ternary),
                        Some(StackItem::Op(op)) => output.push(Rpn::Op(op)),
                        Some(StackItem::Question) => break,
                    }
                }
                stack.push(StackItem::Colon);
            }
        }
        prev = Some(token.clone());
        i += 1;
    }

    while let Some(item) = stack.pop() {
        match item {
            StackItem::Op(op) => output.push(Rpn::Op(op)),
            StackItem::Colon => output.push(Rpn::Ternary),
            StackItem::Question => return Err(ExprError::Malformed),
            StackItem::LParen | StackItem::Func { .. } => {
                return Err(ExprError::MismatchedParens);
            }
        }
    }

    Ok(output)
}
