//! Tokenizer for condition expressions.

use crate::condition::ConditionError;
use serde_json::Number;

/// A lexical token with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(Number),
    Str(String),
    /// Identifiers and keywords (`and`, `or`, `not`, `in`, `true`, ...).
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

/// Split a condition string into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let peek = chars.get(i + 1).map(|&(_, c)| c);
        let single = |kind| Token { kind, offset };

        let (token, width) = match (c, peek) {
            ('(', _) => (single(TokenKind::LParen), 1),
            (')', _) => (single(TokenKind::RParen), 1),
            ('[', _) => (single(TokenKind::LBracket), 1),
            (']', _) => (single(TokenKind::RBracket), 1),
            (',', _) => (single(TokenKind::Comma), 1),
            ('.', _) => (single(TokenKind::Dot), 1),
            ('+', _) => (single(TokenKind::Plus), 1),
            ('-', _) => (single(TokenKind::Minus), 1),
            ('*', _) => (single(TokenKind::Star), 1),
            ('/', _) => (single(TokenKind::Slash), 1),
            ('%', _) => (single(TokenKind::Percent), 1),
            ('=', Some('=')) => (single(TokenKind::EqEq), 2),
            ('!', Some('=')) => (single(TokenKind::NotEq), 2),
            ('!', _) => (single(TokenKind::Bang), 1),
            ('<', Some('=')) => (single(TokenKind::Le), 2),
            ('<', _) => (single(TokenKind::Lt), 1),
            ('>', Some('=')) => (single(TokenKind::Ge), 2),
            ('>', _) => (single(TokenKind::Gt), 1),
            ('&', Some('&')) => (single(TokenKind::AndAnd), 2),
            ('|', Some('|')) => (single(TokenKind::OrOr), 2),
            ('\'', _) | ('"', _) => {
                let (text, consumed) = lex_string(&chars, i)?;
                (single(TokenKind::Str(text)), consumed)
            }
            (c, _) if c.is_ascii_digit() => {
                let (number, consumed) = lex_number(&chars, i)?;
                (single(TokenKind::Number(number)), consumed)
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len() && (chars[end].1.is_alphanumeric() || chars[end].1 == '_')
                {
                    end += 1;
                }
                let ident: String = chars[i..end].iter().map(|&(_, c)| c).collect();
                (single(TokenKind::Ident(ident)), end - i)
            }
            ('=', _) => {
                return Err(ConditionError::syntax(
                    offset,
                    "assignment is not allowed, use '==' for comparison",
                ))
            }
            (other, _) => {
                return Err(ConditionError::syntax(
                    offset,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

/// Lex a quoted string starting at `start`. Returns the unescaped text and
/// the number of chars consumed, quotes included.
fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), ConditionError> {
    let (offset, quote) = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((text, i + 1 - start));
        }
        if c == '\\' {
            let escaped = chars
                .get(i + 1)
                .map(|&(_, c)| c)
                .ok_or_else(|| ConditionError::syntax(offset, "unterminated string literal"))?;
            text.push(match escaped {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            i += 2;
            continue;
        }
        text.push(c);
        i += 1;
    }

    Err(ConditionError::syntax(offset, "unterminated string literal"))
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(Number, usize), ConditionError> {
    let offset = chars[start].0;
    let mut end = start;
    while end < chars.len() && chars[end].1.is_ascii_digit() {
        end += 1;
    }

    // A fraction needs at least one digit after the dot, otherwise the dot
    // belongs to the next token.
    let has_fraction = end + 1 < chars.len()
        && chars[end].1 == '.'
        && chars[end + 1].1.is_ascii_digit();
    if has_fraction {
        end += 1;
        while end < chars.len() && chars[end].1.is_ascii_digit() {
            end += 1;
        }
    }

    let text: String = chars[start..end].iter().map(|&(_, c)| c).collect();
    let number = if has_fraction {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(|| ConditionError::syntax(offset, format!("invalid number '{}'", text)))?
    } else {
        text.parse::<i64>()
            .map(Number::from)
            .map_err(|_| ConditionError::syntax(offset, format!("integer '{}' is too large", text)))?
    };

    Ok((number, end - start))
}
