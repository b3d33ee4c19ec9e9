// Tokenizer for rule conditions

use std::iter::Peekable;
use std::str::CharIndices;

use super::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
    Dot,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::Str(s) => format!("string '{s}'"),
            TokenKind::EqEq => "'=='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the source
    pub pos: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match ch {
            '(' | ')' | ',' | '.' if !(ch == '.' && next_is_digit(source, pos)) => {
                chars.next();
                match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    ',' => TokenKind::Comma,
                    _ => TokenKind::Dot,
                }
            }
            '=' if peek_second(source, pos) == Some('=') => two_char(&mut chars, TokenKind::EqEq),
            '!' if peek_second(source, pos) == Some('=') => two_char(&mut chars, TokenKind::NotEq),
            '<' if peek_second(source, pos) == Some('=') => two_char(&mut chars, TokenKind::Le),
            '>' if peek_second(source, pos) == Some('=') => two_char(&mut chars, TokenKind::Ge),
            '<' => {
                chars.next();
                TokenKind::Lt
            }
            '>' => {
                chars.next();
                TokenKind::Gt
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == ch {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        }
                        continue;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(ParseError::UnterminatedString { pos });
                }
                TokenKind::Str(text)
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let start = pos;
                chars.next();
                let mut end = start + c.len_utf8();
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        chars.next();
                        end = i + d.len_utf8();
                    } else {
                        break;
                    }
                }
                let text = &source[start..end];
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidNumber { text: text.to_string(), pos })?;
                TokenKind::Number(number)
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                let mut end = pos;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        chars.next();
                        end = i + d.len_utf8();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(source[start..end].to_string())
            }
            other => return Err(ParseError::UnexpectedChar { ch: other, pos }),
        };

        tokens.push(Token { kind, pos });
    }

    Ok(tokens)
}

fn two_char(chars: &mut Peekable<CharIndices<'_>>, kind: TokenKind) -> TokenKind {
    chars.next();
    chars.next();
    kind
}

fn peek_second(source: &str, pos: usize) -> Option<char> {
    source[pos..].chars().nth(1)
}

fn next_is_digit(source: &str, pos: usize) -> bool {
    peek_second(source, pos).is_some_and(|c| c.is_ascii_digit())
        && !source[..pos].trim_end().ends_with(|c: char| c.is_alphanumeric() || c == '_' || c == ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_lookup_comparison() {
        assert_eq!(
            kinds("detected_objects.get('Red', 0) >= 1"),
            vec![
                TokenKind::Ident("detected_objects".to_string()),
                TokenKind::Dot,
                TokenKind::Ident("get".to_string()),
                TokenKind::LParen,
                TokenKind::Str("Red".to_string()),
                TokenKind::Comma,
                TokenKind::Number(0.0),
                TokenKind::RParen,
                TokenKind::Ge,
                TokenKind::Number(1.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(kinds("-1.5"), vec![TokenKind::Number(-1.5)]);
        assert_eq!(kinds(".5"), vec![TokenKind::Number(0.5)]);
        assert_eq!(kinds("a != \"x\""), vec![
            TokenKind::Ident("a".to_string()),
            TokenKind::NotEq,
            TokenKind::Str("x".to_string()),
        ]);
    }

    #[test]
    fn test_tokenize_errors() {
        assert!(matches!(tokenize("'open"), Err(ParseError::UnterminatedString { pos: 0 })));
        assert!(matches!(tokenize("a = b"), Err(ParseError::UnexpectedChar { ch: '=', pos: 2 })));
        assert!(matches!(tokenize("__import__('os')"), Ok(_)));
        assert!(matches!(tokenize("1.2.3"), Err(ParseError::InvalidNumber { .. })));
    }
}
