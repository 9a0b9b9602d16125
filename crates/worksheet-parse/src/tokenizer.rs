//! Scanner for the worksheet definition DSL (§4.B).
//!
//! Byte-offset scanning (`start`/`end` spans on every token, a single
//! dispatch-by-byte loop) over a small grammar: no arrays, no cell
//! references, no scientific notation, no bracketed link syntax.

use std::fmt;

/// A lexical error, reported with the byte offset it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.pos)
    }
}

impl std::error::Error for TokenizerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Keyword,
    Number,
    Text,
    // punctuation
    Colon,
    Comma,
    Dot,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Bang,
    // operators
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    AndAnd,
    OrOr,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

const KEYWORDS: &[&str] = &[
    "type",
    "worksheet",
    "enum",
    "computed_by",
    "constrained_by",
    "external",
    "return",
    "round",
    "up",
    "down",
    "half",
    "text",
    "bool",
    "undefined",
    "number",
    "true",
    "false",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == word
    }
}

/// Tokenize worksheet DSL source in one pass.
///
/// Numbers may contain `_` digit-group separators (stripped from the
/// literal value before parsing) and a trailing `%`, which bumps the
/// number's scale by 2 per §4.B (`%` is merged into the preceding number
/// as a suffix, not tokenized as an operator).
pub fn tokenize(source: &str) -> Result<Vec<Token>, TokenizerError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::with_capacity(source.len() / 4);
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'"' => {
                let start = i;
                i += 1;
                let mut buf = String::new();
                loop {
                    if i >= bytes.len() {
                        return Err(TokenizerError {
                            message: "unterminated string literal".into(),
                            pos: start,
                        });
                    }
                    match bytes[i] {
                        b'"' => {
                            i += 1;
                            break;
                        }
                        b'\\' if i + 1 < bytes.len() => {
                            buf.push(bytes[i + 1] as char);
                            i += 2;
                        }
                        b => {
                            buf.push(b as char);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Text,
                    text: buf,
                    start,
                    end: i,
                });
            }
            b'0'..=b'9' => {
                let start = i;
                let mut raw = String::new();
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
                    if bytes[i] != b'_' {
                        raw.push(bytes[i] as char);
                    }
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b'.' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
                    raw.push('.');
                    i += 1;
                    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'_') {
                        if bytes[i] != b'_' {
                            raw.push(bytes[i] as char);
                        }
                        i += 1;
                    }
                }
                if i < bytes.len() && bytes[i] == b'%' {
                    raw.push('%');
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Number,
                    text: raw,
                    start,
                    end: i,
                });
            }
            b'a'..=b'z' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_lowercase() || bytes[i].is_ascii_digit() || bytes[i] == b'_')
                {
                    i += 1;
                }
                let text = source[start..i].to_string();
                let kind = if KEYWORDS.contains(&text.as_str()) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Ident
                };
                tokens.push(Token {
                    kind,
                    text,
                    start,
                    end: i,
                });
            }
            b':' => push_single(&mut tokens, &mut i, TokenKind::Colon, ":"),
            b',' => push_single(&mut tokens, &mut i, TokenKind::Comma, ","),
            b'.' => push_single(&mut tokens, &mut i, TokenKind::Dot, "."),
            b'{' => push_single(&mut tokens, &mut i, TokenKind::LBrace, "{"),
            b'}' => push_single(&mut tokens, &mut i, TokenKind::RBrace, "}"),
            b'(' => push_single(&mut tokens, &mut i, TokenKind::LParen, "("),
            b')' => push_single(&mut tokens, &mut i, TokenKind::RParen, ")"),
            b'[' => push_single(&mut tokens, &mut i, TokenKind::LBracket, "["),
            b']' => push_single(&mut tokens, &mut i, TokenKind::RBracket, "]"),
            b'+' => push_single(&mut tokens, &mut i, TokenKind::Plus, "+"),
            b'-' => push_single(&mut tokens, &mut i, TokenKind::Minus, "-"),
            b'*' => push_single(&mut tokens, &mut i, TokenKind::Star, "*"),
            b'/' => push_single(&mut tokens, &mut i, TokenKind::Slash, "/"),
            b'=' => push_merged(&mut tokens, bytes, &mut i, b'=', TokenKind::EqEq, "==")?,
            b'!' => push_merged_or(
                &mut tokens,
                bytes,
                &mut i,
                b'=',
                TokenKind::NotEq,
                "!=",
                TokenKind::Bang,
                "!",
            ),
            b'>' => push_merged_or(
                &mut tokens,
                bytes,
                &mut i,
                b'=',
                TokenKind::Ge,
                ">=",
                TokenKind::Gt,
                ">",
            ),
            b'<' => push_merged_or(
                &mut tokens,
                bytes,
                &mut i,
                b'=',
                TokenKind::Le,
                "<=",
                TokenKind::Lt,
                "<",
            ),
            b'&' => push_merged(&mut tokens, bytes, &mut i, b'&', TokenKind::AndAnd, "&&")?,
            b'|' => push_merged(&mut tokens, bytes, &mut i, b'|', TokenKind::OrOr, "||")?,
            other => {
                return Err(TokenizerError {
                    message: format!("unexpected character '{}'", other as char),
                    pos: i,
                });
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        start: bytes.len(),
        end: bytes.len(),
    });
    Ok(tokens)
}

fn push_single(tokens: &mut Vec<Token>, i: &mut usize, kind: TokenKind, text: &str) {
    tokens.push(Token {
        kind,
        text: text.to_string(),
        start: *i,
        end: *i + 1,
    });
    *i += 1;
}

/// Require the two-char operator `second` after `first`'s byte; error if absent.
fn push_merged(
    tokens: &mut Vec<Token>,
    bytes: &[u8],
    i: &mut usize,
    next: u8,
    kind: TokenKind,
    text: &str,
) -> Result<(), TokenizerError> {
    let start = *i;
    if *i + 1 < bytes.len() && bytes[*i + 1] == next {
        tokens.push(Token {
            kind,
            text: text.to_string(),
            start,
            end: start + 2,
        });
        *i += 2;
        Ok(())
    } else {
        Err(TokenizerError {
            message: format!("expected '{text}'"),
            pos: start,
        })
    }
}

/// Merge into the two-char operator when `next` follows, otherwise emit
/// the single-char fallback.
#[allow(clippy::too_many_arguments)]
fn push_merged_or(
    tokens: &mut Vec<Token>,
    bytes: &[u8],
    i: &mut usize,
    next: u8,
    merged_kind: TokenKind,
    merged_text: &str,
    single_kind: TokenKind,
    single_text: &str,
) {
    let start = *i;
    if *i + 1 < bytes.len() && bytes[*i + 1] == next {
        tokens.push(Token {
            kind: merged_kind,
            text: merged_text.to_string(),
            start,
            end: start + 2,
        });
        *i += 2;
    } else {
        tokens.push(Token {
            kind: single_kind,
            text: single_text.to_string(),
            start,
            end: start + 1,
        });
        *i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn merges_two_char_operators() {
        assert_eq!(
            kinds("a == b != c >= d <= e && f || g"),
            vec![
                TokenKind::Ident,
                TokenKind::EqEq,
                TokenKind::Ident,
                TokenKind::NotEq,
                TokenKind::Ident,
                TokenKind::Ge,
                TokenKind::Ident,
                TokenKind::Le,
                TokenKind::Ident,
                TokenKind::AndAnd,
                TokenKind::Ident,
                TokenKind::OrOr,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_with_underscores_and_percent() {
        let toks = tokenize("1_000.5%").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].text, "1000.5%");
    }

    #[test]
    fn keyword_vs_identifier() {
        let toks = tokenize("type name").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Keyword);
        assert_eq!(toks[1].kind, TokenKind::Ident);
    }

    #[test]
    fn string_literal() {
        let toks = tokenize(r#""Alex""#).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Text);
        assert_eq!(toks[0].text, "Alex");
    }
}
