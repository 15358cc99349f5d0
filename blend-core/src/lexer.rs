//! Token stream over Blend65 source text.
//!
//! Newlines are insignificant; `//` and `/* */` comments are skipped. The
//! lexer never stops early: bad input produces a `SyntaxError` diagnostic
//! and scanning resumes at the next character.

use crate::diagnostics::{DiagnosticCode, Diagnostics};
use crate::token::{Token, TokenKind};
use blend_types::{Span, UnitId};

/// Lex one source unit into a token list ending with `Eof`.
pub fn lex(unit: UnitId, source: &str, diags: &mut Diagnostics) -> Vec<Token> {
    Lexer::new(unit, source).run(diags)
}

struct Lexer<'src> {
    unit: UnitId,
    src: &'src [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    fn new(unit: UnitId, source: &'src str) -> Self {
        Self {
            unit,
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia(diags);
            let start = self.mark();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: self.span_from(start),
                });
                return tokens;
            };
            let kind = match c {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.ident_or_keyword(),
                b'0'..=b'9' => self.number(diags),
                b'$' => self.hex_dollar(diags),
                b'"' => self.string(diags),
                b'@' => self.annotation(diags),
                _ => self.operator(diags),
            };
            if let Some(kind) = kind {
                tokens.push(Token {
                    kind,
                    span: self.span_from(start),
                });
            }
        }
    }

    fn mark(&self) -> (usize, u32, u32) {
        (self.pos, self.line, self.column)
    }

    fn span_from(&self, (lo, line, column): (usize, u32, u32)) -> Span {
        Span::new(self.unit, lo as u32, self.pos as u32, line, column)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self, diags: &mut Diagnostics) {
        loop {
            match (self.peek(), self.peek2()) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.mark();
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some(c) = self.bump() {
                        if c == b'*' && self.eat(b'/') {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        diags.emit(
                            DiagnosticCode::SyntaxError,
                            "unterminated block comment",
                            self.span_from(start),
                        );
                    }
                }
                _ => return,
            }
        }
    }

    fn ident_or_keyword(&mut self) -> Option<TokenKind> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = core::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        Some(TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_owned())))
    }

    fn number(&mut self, diags: &mut Diagnostics) -> Option<TokenKind> {
        let start = self.mark();
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            return self.radix_digits(16, start, diags);
        }
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'b') | Some(b'B')) {
            self.bump();
            self.bump();
            return self.radix_digits(2, start, diags);
        }
        self.radix_digits(10, start, diags)
    }

    fn hex_dollar(&mut self, diags: &mut Diagnostics) -> Option<TokenKind> {
        let start = self.mark();
        self.bump();
        self.radix_digits(16, start, diags)
    }

    fn radix_digits(
        &mut self,
        radix: u32,
        start: (usize, u32, u32),
        diags: &mut Diagnostics,
    ) -> Option<TokenKind> {
        let digits_from = self.pos;
        let mut value: u32 = 0;
        let mut overflow = false;
        while let Some(c) = self.peek() {
            let digit = match (c as char).to_digit(radix) {
                Some(d) => d,
                None if c.is_ascii_alphanumeric() || c == b'_' => {
                    if c == b'_' {
                        self.bump();
                        continue;
                    }
                    diags.emit(
                        DiagnosticCode::SyntaxError,
                        format!("invalid digit `{}` in number", c as char),
                        self.span_from(start),
                    );
                    self.bump();
                    continue;
                }
                None => break,
            };
            value = value
                .checked_mul(radix)
                .and_then(|v| v.checked_add(digit))
                .unwrap_or_else(|| {
                    overflow = true;
                    u32::MAX
                });
            self.bump();
        }
        if self.pos == digits_from {
            diags.emit(
                DiagnosticCode::SyntaxError,
                "number literal has no digits",
                self.span_from(start),
            );
            return None;
        }
        if overflow {
            diags.emit(
                DiagnosticCode::SyntaxError,
                "number literal does not fit in 32 bits",
                self.span_from(start),
            );
        }
        Some(TokenKind::Int(value))
    }

    fn string(&mut self, diags: &mut Diagnostics) -> Option<TokenKind> {
        let start = self.mark();
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(b'"') => return Some(TokenKind::Str(text)),
                Some(b'\\') => match self.bump() {
                    Some(b'n') => text.push('\n'),
                    Some(b't') => text.push('\t'),
                    Some(b'0') => text.push('\0'),
                    Some(c) => text.push(c as char),
                    None => break,
                },
                Some(c) => text.push(c as char),
                None => break,
            }
        }
        diags.emit(
            DiagnosticCode::SyntaxError,
            "unterminated string literal",
            self.span_from(start),
        );
        None
    }

    fn annotation(&mut self, diags: &mut Diagnostics) -> Option<TokenKind> {
        let start = self.mark();
        self.bump();
        match self.ident_or_keyword() {
            Some(TokenKind::Ident(name)) => Some(TokenKind::Annotation(name)),
            // `@map` lexes as the `map` identifier only if `map` were a
            // keyword; it is not, so any keyword here is malformed input.
            _ => {
                diags.emit(
                    DiagnosticCode::SyntaxError,
                    "expected a storage class name after `@`",
                    self.span_from(start),
                );
                None
            }
        }
    }

    fn operator(&mut self, diags: &mut Diagnostics) -> Option<TokenKind> {
        use TokenKind::*;
        let start = self.mark();
        let c = self.bump()?;
        let kind = match c {
            b';' => Semi,
            b',' => Comma,
            b'.' => Dot,
            b':' => Colon,
            b'{' => LBrace,
            b'}' => RBrace,
            b'(' => LParen,
            b')' => RParen,
            b'[' => LBracket,
            b']' => RBracket,
            b'+' => {
                if self.eat(b'=') {
                    PlusEq
                } else {
                    Plus
                }
            }
            b'-' => {
                if self.eat(b'=') {
                    MinusEq
                } else {
                    Minus
                }
            }
            b'*' => {
                if self.eat(b'=') {
                    StarEq
                } else {
                    Star
                }
            }
            b'/' => {
                if self.eat(b'=') {
                    SlashEq
                } else {
                    Slash
                }
            }
            b'%' => {
                if self.eat(b'=') {
                    PercentEq
                } else {
                    Percent
                }
            }
            b'^' => {
                if self.eat(b'=') {
                    CaretEq
                } else {
                    Caret
                }
            }
            b'~' => Tilde,
            b'&' => {
                if self.eat(b'&') {
                    AndAnd
                } else if self.eat(b'=') {
                    AmpEq
                } else {
                    Amp
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    OrOr
                } else if self.eat(b'=') {
                    PipeEq
                } else {
                    Pipe
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    Ne
                } else {
                    Bang
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    EqEq
                } else {
                    Assign
                }
            }
            b'<' => {
                if self.eat(b'<') {
                    if self.eat(b'=') {
                        ShlEq
                    } else {
                        Shl
                    }
                } else if self.eat(b'=') {
                    Le
                } else {
                    Lt
                }
            }
            b'>' => {
                if self.eat(b'>') {
                    if self.eat(b'=') {
                        ShrEq
                    } else {
                        Shr
                    }
                } else if self.eat(b'=') {
                    Ge
                } else {
                    Gt
                }
            }
            other => {
                diags.emit(
                    DiagnosticCode::SyntaxError,
                    format!("unexpected character `{}`", other as char),
                    self.span_from(start),
                );
                return None;
            }
        };
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut diags = Diagnostics::new();
        let tokens = lex(0, source, &mut diags);
        assert!(!diags.has_errors(), "unexpected lex errors: {:?}", diags.items());
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_idents() {
        use TokenKind::*;
        assert_eq!(
            kinds("function main(): void"),
            vec![
                Function,
                Ident("main".into()),
                LParen,
                RParen,
                Colon,
                Ident("void".into()),
                Eof
            ]
        );
    }

    #[rstest]
    #[case("255", 255)]
    #[case("$FF", 255)]
    #[case("0xFF", 255)]
    #[case("0b1010", 10)]
    #[case("$D020", 0xD020)]
    fn numeric_radixes(#[case] source: &str, #[case] value: u32) {
        assert_eq!(kinds(source), vec![TokenKind::Int(value), TokenKind::Eof]);
    }

    #[test]
    fn shift_and_compound_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("a <<= 1; b >> 2 <= c"),
            vec![
                Ident("a".into()),
                ShlEq,
                Int(1),
                Semi,
                Ident("b".into()),
                Shr,
                Int(2),
                Le,
                Ident("c".into()),
                Eof
            ]
        );
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(
            kinds("1 // line\n/* block\nstill */ 2"),
            vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn annotations() {
        assert_eq!(
            kinds("@zp let"),
            vec![
                TokenKind::Annotation("zp".into()),
                TokenKind::Let,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unterminated_string_is_reported() {
        let mut diags = Diagnostics::new();
        let _ = lex(0, "\"oops", &mut diags);
        assert!(diags.contains(DiagnosticCode::SyntaxError));
    }

    #[test]
    fn spans_track_lines() {
        let mut diags = Diagnostics::new();
        let tokens = lex(0, "a\n  b", &mut diags);
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
    }
}
