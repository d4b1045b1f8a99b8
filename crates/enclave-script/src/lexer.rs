//! Lexer for the script language.
//!
//! Raw tokens come from logos. [`tokenize`] then turns physical lines into
//! logical ones: newlines inside brackets are dropped, statement ends become
//! [`Token::Newline`], and changes in leading whitespace become
//! [`Token::Indent`] / [`Token::Dedent`].

use crate::error::SyntaxError;
use logos::Logos;
use std::fmt;
use unicode_xid::UnicodeXID;

/// Tab stops for indentation width
const TAB_WIDTH: usize = 8;

/// Source location of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset past the last character
    pub end: usize,
    /// 1-based line number
    pub line: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32) -> Self {
        Self { start, end, line }
    }
}

/// A token of the script language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"\\\r?\n")]
pub enum Token {
    #[token("\n")]
    Newline,

    // Produced by `tokenize`, never by logos
    Indent,
    Dedent,
    Eof,

    // Keywords
    #[token("False")]
    False,
    #[token("None")]
    None,
    #[token("True")]
    True,
    #[token("and")]
    And,
    #[token("as")]
    As,
    #[token("assert")]
    Assert,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("del")]
    Del,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("except")]
    Except,
    #[token("finally")]
    Finally,
    #[token("for")]
    For,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("in")]
    In,
    #[token("is")]
    Is,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("pass")]
    Pass,
    #[token("raise")]
    Raise,
    #[token("try")]
    Try,
    #[token("while")]
    While,

    // Literals
    #[regex(r"0[xX][0-9a-fA-F_]+", parse_hex)]
    #[regex(r"0[bB][01_]+", parse_binary)]
    #[regex(r"0[oO][0-7_]+", parse_octal)]
    #[regex(r"[0-9][0-9_]*", parse_int)]
    Int(i64),

    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", parse_float)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", parse_float)]
    Float(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    #[regex(r"'([^'\\\n]|\\.)*'", parse_string)]
    #[token("\"\"\"", |lex| lex_triple(lex, "\"\"\""))]
    #[token("'''", |lex| lex_triple(lex, "'''"))]
    Str(String),

    #[regex(r#"[bB]"([^"\\\n]|\\.)*""#, parse_bytes)]
    #[regex(r"[bB]'([^'\\\n]|\\.)*'", parse_bytes)]
    Bytes(Vec<u8>),

    #[regex(r"[\p{XID_Start}_][\p{XID_Continue}]*", parse_ident)]
    Ident(String),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("=")]
    Equal,
    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,
    #[token("//=")]
    SlashSlashEqual,
    #[token("%=")]
    PercentEqual,

    // Punctuation
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Newline => write!(f, "newline"),
            Token::Indent => write!(f, "indent"),
            Token::Dedent => write!(f, "dedent"),
            Token::Eof => write!(f, "end of input"),
            Token::Int(i) => write!(f, "{}", i),
            Token::Float(x) => write!(f, "{}", x),
            Token::Str(_) => write!(f, "string literal"),
            Token::Bytes(_) => write!(f, "bytes literal"),
            Token::Ident(name) => write!(f, "'{}'", name),
            other => write!(f, "{:?}", other),
        }
    }
}

// Helper parsing functions
fn parse_hex(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    let s = lex.slice()[2..].replace('_', "");
    i64::from_str_radix(&s, 16).ok()
}

fn parse_binary(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    let s = lex.slice()[2..].replace('_', "");
    i64::from_str_radix(&s, 2).ok()
}

fn parse_octal(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    let s = lex.slice()[2..].replace('_', "");
    i64::from_str_radix(&s, 8).ok()
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().replace('_', "").parse().ok()
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().replace('_', "").parse().ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let s = lex.slice();
    let inner = &s[1..s.len() - 1]; // Remove quotes
    unescape_string(inner)
}

fn parse_bytes(lex: &mut logos::Lexer<'_, Token>) -> Option<Vec<u8>> {
    let s = lex.slice();
    let inner = &s[2..s.len() - 1]; // Remove prefix and quotes
    unescape_bytes(inner)
}

fn parse_ident(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let s = lex.slice();
    let mut chars = s.chars();
    let valid = chars
        .next()
        .map_or(false, |c| c == '_' || c.is_xid_start())
        && chars.all(|c| c.is_xid_continue());
    valid.then(|| s.to_string())
}

fn lex_triple(lex: &mut logos::Lexer<'_, Token>, quote: &str) -> Option<String> {
    // Opening quotes are consumed; find the closing ones, skipping escapes
    let remainder = lex.remainder();
    let mut i = 0;
    while i < remainder.len() {
        if remainder[i..].starts_with(quote) {
            let body = &remainder[..i];
            lex.bump(i + quote.len());
            return unescape_string(body);
        }
        i += if remainder.as_bytes()[i] == b'\\' { 2 } else { 1 };
        while i < remainder.len() && !remainder.is_char_boundary(i) {
            i += 1;
        }
    }
    // Unterminated
    lex.bump(remainder.len());
    None
}

fn read_hex<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>, digits: usize) -> Option<u32> {
    let mut hex = String::with_capacity(digits);
    for _ in 0..digits {
        match chars.peek() {
            Some(ch) if ch.is_ascii_hexdigit() => {
                hex.push(*ch);
                chars.next();
            }
            _ => return None,
        }
    }
    u32::from_str_radix(&hex, 16).ok()
}

fn unescape_string(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            Some('0') => result.push('\0'),
            Some('\n') => {} // line continuation inside a string
            Some('x') => result.push(char::from_u32(read_hex(&mut chars, 2)?)?),
            Some('u') => result.push(char::from_u32(read_hex(&mut chars, 4)?)?),
            Some('U') => result.push(char::from_u32(read_hex(&mut chars, 8)?)?),
            Some(other) => {
                // Unknown escapes are kept verbatim
                result.push('\\');
                result.push(other);
            }
            None => return None,
        }
    }

    Some(result)
}

fn unescape_bytes(s: &str) -> Option<Vec<u8>> {
    let mut result = Vec::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if !c.is_ascii() {
            return None;
        }
        if c != '\\' {
            result.push(c as u8);
            continue;
        }
        match chars.next() {
            Some('n') => result.push(b'\n'),
            Some('r') => result.push(b'\r'),
            Some('t') => result.push(b'\t'),
            Some('\\') => result.push(b'\\'),
            Some('"') => result.push(b'"'),
            Some('\'') => result.push(b'\''),
            Some('0') => result.push(0),
            Some('x') => result.push(u8::try_from(read_hex(&mut chars, 2)?).ok()?),
            Some(other) if other.is_ascii() => {
                result.push(b'\\');
                result.push(other as u8);
            }
            _ => return None,
        }
    }

    Some(result)
}

fn indent_width(line_prefix: &str) -> usize {
    line_prefix.chars().fold(0, |width, c| match c {
        '\t' => (width / TAB_WIDTH + 1) * TAB_WIDTH,
        _ => width + 1,
    })
}

/// Produce logical-line tokens for `source`
///
/// The stream always ends with `Newline` (when non-empty), any pending
/// `Dedent`s, and `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>, SyntaxError> {
    let mut out: Vec<(Token, Span)> = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth = 0usize;
    let mut at_line_start = true;

    let mut line = 1u32;
    let mut counted_to = 0usize;

    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        line += source[counted_to..range.start].matches('\n').count() as u32;
        counted_to = range.start;
        let span = Span::new(range.start, range.end, line);

        let token = match result {
            Ok(token) => token,
            Err(()) => {
                let text = lexer.slice();
                let message = if text.starts_with(['"', '\'']) {
                    "unterminated string literal".to_string()
                } else if text.starts_with(|c: char| c.is_ascii_digit()) {
                    format!("invalid numeric literal '{}'", text)
                } else {
                    format!("invalid character '{}'", text.chars().next().unwrap_or('?'))
                };
                return Err(SyntaxError::new(message, line));
            }
        };

        if token == Token::Newline {
            if depth == 0 {
                at_line_start = true;
            }
            continue;
        }

        if at_line_start {
            at_line_start = false;
            if !out.is_empty() {
                out.push((Token::Newline, span));
            }

            let line_start = source[..range.start].rfind('\n').map_or(0, |i| i + 1);
            let width = indent_width(&source[line_start..range.start]);
            let top = indents.last().copied().unwrap_or(0);

            if width > top {
                indents.push(width);
                out.push((Token::Indent, span));
            } else {
                while width < indents.last().copied().unwrap_or(0) {
                    indents.pop();
                    out.push((Token::Dedent, span));
                }
                if width != indents.last().copied().unwrap_or(0) {
                    return Err(SyntaxError::new(
                        "unindent does not match any outer indentation level",
                        line,
                    ));
                }
            }
        }

        match token {
            Token::LeftParen | Token::LeftBracket | Token::LeftBrace => depth += 1,
            Token::RightParen | Token::RightBracket | Token::RightBrace => {
                depth = depth.saturating_sub(1)
            }
            _ => {}
        }

        // Multi-line string literals advance the line counter
        if let Token::Str(_) = token {
            line += source[range.start..range.end].matches('\n').count() as u32;
            counted_to = range.end;
        }

        out.push((token, span));
    }

    let end = Span::new(source.len(), source.len(), line);
    if !out.is_empty() {
        out.push((Token::Newline, end));
    }
    for _ in 1..indents.len() {
        out.push((Token::Dedent, end));
    }
    out.push((Token::Eof, end));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_simple_assignment() {
        assert_eq!(
            kinds("x = 1 + 2"),
            vec![
                Token::Ident("x".into()),
                Token::Equal,
                Token::Int(1),
                Token::Plus,
                Token::Int(2),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(kinds(""), vec![Token::Eof]);
        assert_eq!(kinds("\n\n# only a comment\n"), vec![Token::Eof]);
    }

    #[test]
    fn test_keywords_vs_identifiers() {
        assert_eq!(
            kinds("None Nonesuch not_ in"),
            vec![
                Token::None,
                Token::Ident("Nonesuch".into()),
                Token::Ident("not_".into()),
                Token::In,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("10 0xff 0b101 1_000 2.5 1e3 .5"),
            vec![
                Token::Int(10),
                Token::Int(255),
                Token::Int(5),
                Token::Int(1000),
                Token::Float(2.5),
                Token::Float(1000.0),
                Token::Float(0.5),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_bytes() {
        assert_eq!(
            kinds(r#"'a\n' "it's" b'\x00z' "\u00e9""#),
            vec![
                Token::Str("a\n".into()),
                Token::Str("it's".into()),
                Token::Bytes(vec![0, b'z']),
                Token::Str("é".into()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_triple_quoted() {
        let tokens = kinds("s = '''one\ntwo'''\ny = 1");
        assert_eq!(tokens[2], Token::Str("one\ntwo".into()));
        assert_eq!(tokens[3], Token::Newline);
        assert_eq!(tokens[4], Token::Ident("y".into()));
    }

    #[test]
    fn test_line_numbers_after_triple_quoted() {
        let tokens = tokenize("s = '''a\nb\nc'''\nboom").unwrap();
        let (_, span) = tokens
            .iter()
            .find(|(t, _)| *t == Token::Ident("boom".into()))
            .unwrap();
        assert_eq!(span.line, 4);
    }

    #[test]
    fn test_brackets_join_lines() {
        assert_eq!(
            kinds("x = [1,\n  2]\n"),
            vec![
                Token::Ident("x".into()),
                Token::Equal,
                Token::LeftBracket,
                Token::Int(1),
                Token::Comma,
                Token::Int(2),
                Token::RightBracket,
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_indentation() {
        assert_eq!(
            kinds("if x:\n    y\n\n    # note\n    z\nw"),
            vec![
                Token::If,
                Token::Ident("x".into()),
                Token::Colon,
                Token::Newline,
                Token::Indent,
                Token::Ident("y".into()),
                Token::Newline,
                Token::Ident("z".into()),
                Token::Newline,
                Token::Dedent,
                Token::Ident("w".into()),
                Token::Newline,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_trailing_dedents() {
        let tokens = kinds("while a:\n  if b:\n    c");
        let tail: Vec<_> = tokens[tokens.len() - 4..].to_vec();
        assert_eq!(
            tail,
            vec![Token::Newline, Token::Dedent, Token::Dedent, Token::Eof]
        );
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    y\n  z").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("x = 1\ny = $").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains('$'));
    }

    #[test]
    fn test_integer_overflow_is_rejected() {
        assert!(tokenize("99999999999999999999").is_err());
    }
}
