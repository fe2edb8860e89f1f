use super::{ExprError, Result};

/// Lexical token produced by [`tokenize`].
///
/// Tokens are ephemeral: they are produced and consumed within a single parse
/// and never stored on the flow graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal (integers and decimals share one representation).
    Number(f64),
    /// Quoted string literal (either quote style).
    Str(String),
    /// Boolean literal (`true`/`false`, case-insensitive).
    Bool(bool),
    /// Null literal (`null`/`undefined`, case-insensitive).
    Null,
    /// Identifier, possibly a dotted path (`user.name`).
    Ident(String),
    /// Operator symbol (`+`, `==`, `&&`, ...).
    Op(String),
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// Argument separator.
    Comma,
    /// Ternary `?`.
    Question,
    /// Ternary `:`.
    Colon,
}

/// Split an expression source string into a flat token stream.
///
/// Fails on the first unrecognized character or unterminated string literal;
/// everything else is the caller's problem (the parser).
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len() {
                    match chars[i] {
                        '0'..='9' => i += 1,
                        '.' if !seen_dot => {
                            seen_dot = true;
                            i += 1;
                        }
                        _ => break,
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedChar(ch, start))?;
                tokens.push(Token::Number(num));
            }
            '"' | '\'' => {
                let quote = ch;
                i += 1;
                let mut buf = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(ExprError::UnterminatedString),
                        Some(&c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            // Backslash escapes exactly one character, taken verbatim.
                            match chars.get(i + 1) {
                                Some(&escaped) => {
                                    buf.push(escaped);
                                    i += 2;
                                }
                                None => return Err(ExprError::UnterminatedString),
                            }
                        }
                        Some(&c) => {
                            buf.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(buf));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_ascii_alphanumeric() || c == '_' {
                        i += 1;
                    } else if c == '.'
                        && chars
                            .get(i + 1)
                            .is_some_and(|n| n.is_ascii_alphanumeric() || *n == '_')
                    {
                        // Dotted path segment: `user.name`, `order.items.0`.
                        i += 1;
                    } else {
                        break;
                    }
                }
                let ident: String = chars[start..i].iter().collect();
                match ident.to_ascii_lowercase().as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    "null" | "undefined" => tokens.push(Token::Null),
                    _ => tokens.push(Token::Ident(ident)),
                }
            }
            _ => {
                // Greedy operator matching: three-character forms first, then
                // two, then the single-character operators and punctuation.
                let three: String = chars[i..chars.len().min(i + 3)].iter().collect();
                if three == "===" || three == "!==" {
                    tokens.push(Token::Op(three));
                    i += 3;
                    continue;
                }
                let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
                if matches!(two.as_str(), "==" | "!=" | "<=" | ">=" | "&&" | "||") {
                    tokens.push(Token::Op(two));
                    i += 2;
                    continue;
                }
                match ch {
                    '+' | '-' | '*' | '/' | '%' | '<' | '>' | '!' => {
                        tokens.push(Token::Op(ch.to_string()));
                    }
                    '(' => tokens.push(Token::LParen),
                    ')' => tokens.push(Token::RParen),
                    ',' => tokens.push(Token::Comma),
                    '?' => tokens.push(Token::Question),
                    ':' => tokens.push(Token::Colon),
                    other => return Err(ExprError::UnexpectedChar(other, i)),
                }
                i += 1;
            }
        }
    }

    Ok(tokens)
}
