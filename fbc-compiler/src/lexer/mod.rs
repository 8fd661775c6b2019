//! BASIC-specific lexical analysis (§4.1).
//!
//! `tokenize()` is the only entry point: it turns a source buffer into a
//! complete token stream terminated by `end_of_file`. Errors accumulate in
//! a [`Diagnostics`](crate::diagnostics::Diagnostics) rather than aborting;
//! malformed input still produces a recovery token so downstream stages see
//! a complete stream.

mod keywords;
mod token;

pub use keywords::lookup as lookup_keyword;
pub use token::{Token, TokenKind, TypeSuffix};

use crate::diagnostics::{DiagnosticKind, Diagnostics, LexErrorKind, Location};

pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    column: u32,
    diagnostics: Diagnostics,
}

/// A complete, EOF-terminated token stream plus accumulated diagnostics.
pub struct TokenStream<'src> {
    pub tokens: Vec<Token<'src>>,
    pub diagnostics: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn tokenize(mut self) -> TokenStream<'src> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments(&mut tokens);
            if self.is_at_end() {
                tokens.push(Token::new(TokenKind::EndOfFile, "", self.here()));
                break;
            }
            let tok = self.next_token();
            tokens.push(tok);
        }
        TokenStream {
            tokens,
            diagnostics: self.diagnostics,
        }
    }

    fn here(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, byte_offset: usize) -> Option<char> {
        self.source.get(self.pos + byte_offset..)?.chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self, tokens: &mut Vec<Token<'src>>) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('\n') => {
                    let loc = self.here();
                    self.advance();
                    tokens.push(Token::new(TokenKind::EndOfLine, "\n", loc));
                }
                Some('\'') => {
                    self.skip_to_eol();
                }
                _ => {
                    if self.at_rem_comment() {
                        self.skip_to_eol();
                        continue;
                    }
                    break;
                }
            }
        }
    }

    /// `REM` must not itself produce a keyword token (§4.1): we special-case
    /// it here, at the comment-skipping stage, rather than in the keyword
    /// table.
    fn at_rem_comment(&self) -> bool {
        let rest = &self.source[self.pos..];
        let upper_prefix_matches = rest.len() >= 3 && rest[..3].eq_ignore_ascii_case("REM");
        if !upper_prefix_matches {
            return false;
        }
        match rest.as_bytes().get(3) {
            None => true,
            Some(b) => !is_ident_continue(*b as char),
        }
    }

    fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn next_token(&mut self) -> Token<'src> {
        let start = self.pos;
        let loc = self.here();
        let c = self.peek().expect("checked not at end");

        if c == '?' {
            self.advance();
            return Token::new(TokenKind::KwPrint, "?", loc);
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()))
        {
            return self.scan_number(start, loc);
        }

        if c == '&' && matches!(self.peek_at(1), Some('H') | Some('h')) {
            return self.scan_hex_ampersand(start, loc);
        }

        if c == '"' {
            return self.scan_string(start, loc);
        }

        if is_ident_start(c) {
            return self.scan_identifier_or_keyword(start, loc);
        }

        self.scan_operator(start, loc)
    }

    fn scan_number(&mut self, start: usize, loc: Location) -> Token<'src> {
        // 0x / 0X hex form.
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let hex_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let lexeme = &self.source[start..self.pos];
            let value = i64::from_str_radix(&self.source[hex_start..self.pos], 16)
                .map(|v| v as f64)
                .unwrap_or(0.0);
            let mut tok = Token::new(TokenKind::NumberLiteral, lexeme, loc);
            tok.number = Some(value);
            return tok;
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            let save_line = self.line;
            let save_col = self.column;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = save;
                self.line = save_line;
                self.column = save_col;
            }
        }

        let lexeme = &self.source[start..self.pos];
        let value: f64 = lexeme.parse().unwrap_or_else(|_| {
            self.diagnostics.error(
                DiagnosticKind::Lex(LexErrorKind::InvalidNumber),
                format!("invalid numeric literal '{}'", lexeme),
                loc,
            );
            0.0
        });
        let mut tok = Token::new(TokenKind::NumberLiteral, lexeme, loc);
        tok.number = Some(value);
        tok
    }

    /// `&Hxxx` hex literal form (§4.1).
    fn scan_hex_ampersand(&mut self, start: usize, loc: Location) -> Token<'src> {
        self.advance(); // &
        self.advance(); // H
        let hex_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.advance();
        }
        let lexeme = &self.source[start..self.pos];
        let value = i64::from_str_radix(&self.source[hex_start..self.pos], 16)
            .map(|v| v as f64)
            .unwrap_or_else(|_| {
                self.diagnostics.error(
                    DiagnosticKind::Lex(LexErrorKind::InvalidNumber),
                    format!("invalid hex literal '{}'", lexeme),
                    loc,
                );
                0.0
            });
        let mut tok = Token::new(TokenKind::NumberLiteral, lexeme, loc);
        tok.number = Some(value);
        tok
    }

    fn scan_string(&mut self, start: usize, loc: Location) -> Token<'src> {
        self.advance(); // opening quote
        let mut non_ascii = false;
        let mut terminated = false;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            if c as u32 >= 0x80 {
                non_ascii = true;
            }
            if c == '\\' {
                self.advance();
                if self.peek().is_some() && self.peek() != Some('\n') {
                    self.advance();
                }
                continue;
            }
            if c == '"' {
                self.advance();
                terminated = true;
                break;
            }
            self.advance();
        }

        if !terminated {
            self.diagnostics.error(
                DiagnosticKind::Lex(LexErrorKind::UnterminatedString),
                "unterminated string literal",
                loc,
            );
        }

        let lexeme = &self.source[start..self.pos];
        let mut tok = Token::new(
            if terminated {
                TokenKind::StringLiteral
            } else {
                TokenKind::UnterminatedString
            },
            lexeme,
            loc,
        );
        tok.non_ascii = non_ascii;
        tok
    }

    /// Scans a maximal identifier, then applies the suffix-disambiguation
    /// rule before consulting the keyword map (§4.1 "Identifier / keyword
    /// disambiguation"): a spelling that matches a keyword but is
    /// immediately followed (no whitespace) by a type-suffix character is
    /// an identifier, not a keyword.
    fn scan_identifier_or_keyword(&mut self, start: usize, loc: Location) -> Token<'src> {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let lexeme = &self.source[start..self.pos];

        let followed_by_suffix = self
            .peek()
            .is_some_and(|c| TypeSuffix::from_char(c).is_some());

        if followed_by_suffix {
            return Token::new(TokenKind::Identifier, lexeme, loc);
        }

        if let Some(kind) = keywords::lookup(lexeme) {
            if kind == TokenKind::KwEnd {
                return self.scan_compound_end(lexeme, loc);
            }
            return Token::new(kind, lexeme, loc);
        }

        Token::new(TokenKind::Identifier, lexeme, loc)
    }

    /// After `END`, peeks across whitespace (not newlines) for a collapsible
    /// second keyword (§4.1 "Compound END"; §9 design note).
    fn scan_compound_end(&mut self, end_lexeme: &'src str, loc: Location) -> Token<'src> {
        let save = (self.pos, self.line, self.column);
        let mut skipped = false;
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.advance();
            skipped = true;
        }
        if !skipped {
            return Token::new(TokenKind::KwEnd, end_lexeme, loc);
        }
        let word_start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        let word = &self.source[word_start..self.pos];
        if let Some(compound) = keywords::end_compound(word) {
            return Token::new(compound, &self.source[save.0 - 3..self.pos], loc);
        }
        // Not collapsible (includes CLASS/METHOD/CONSTRUCTOR/DESTRUCTOR, by
        // design, and anything else): restore position, emit bare END.
        self.pos = save.0;
        self.line = save.1;
        self.column = save.2;
        Token::new(TokenKind::KwEnd, end_lexeme, loc)
    }

    fn scan_operator(&mut self, start: usize, loc: Location) -> Token<'src> {
        let two = self.peek_at(1);
        let c = self.advance().unwrap();

        macro_rules! two_char {
            ($second:expr, $kind:expr) => {
                if two == Some($second) {
                    self.advance();
                    return Token::new($kind, &self.source[start..self.pos], loc);
                }
            };
        }

        match c {
            '<' => {
                two_char!('>', TokenKind::NotEqual);
                two_char!('=', TokenKind::LessEqual);
                Token::new(TokenKind::Less, &self.source[start..self.pos], loc)
            }
            '>' => {
                two_char!('=', TokenKind::GreaterEqual);
                Token::new(TokenKind::Greater, &self.source[start..self.pos], loc)
            }
            '!' => {
                two_char!('=', TokenKind::NotEqual);
                if let Some(suffix) = TypeSuffix::from_char('!') {
                    return Token::new(TokenKind::TypeSuffix(suffix), "!", loc);
                }
                Token::new(TokenKind::Unknown, &self.source[start..self.pos], loc)
            }
            '=' => Token::new(TokenKind::Equal, &self.source[start..self.pos], loc),
            '+' => Token::new(TokenKind::Plus, &self.source[start..self.pos], loc),
            '-' => Token::new(TokenKind::Minus, &self.source[start..self.pos], loc),
            '*' => Token::new(TokenKind::Star, &self.source[start..self.pos], loc),
            '/' => Token::new(TokenKind::Slash, &self.source[start..self.pos], loc),
            '\\' => Token::new(TokenKind::BackSlash, &self.source[start..self.pos], loc),
            '^' => Token::new(TokenKind::Caret, &self.source[start..self.pos], loc),
            '(' => Token::new(TokenKind::LParen, &self.source[start..self.pos], loc),
            ')' => Token::new(TokenKind::RParen, &self.source[start..self.pos], loc),
            '[' => Token::new(TokenKind::LBracket, &self.source[start..self.pos], loc),
            ']' => Token::new(TokenKind::RBracket, &self.source[start..self.pos], loc),
            ',' => Token::new(TokenKind::Comma, &self.source[start..self.pos], loc),
            ':' => Token::new(TokenKind::Colon, &self.source[start..self.pos], loc),
            ';' => Token::new(TokenKind::Semicolon, &self.source[start..self.pos], loc),
            '.' => Token::new(TokenKind::Dot, &self.source[start..self.pos], loc),
            '&' => Token::new(TokenKind::Ampersand, &self.source[start..self.pos], loc),
            '%' | '#' | '@' | '$' => {
                let suffix = TypeSuffix::from_char(c).unwrap();
                Token::new(TokenKind::TypeSuffix(suffix), &self.source[start..self.pos], loc)
            }
            _ => {
                self.diagnostics.error(
                    DiagnosticKind::Lex(LexErrorKind::UnexpectedCharacter),
                    format!("unexpected character '{}'", c),
                    loc,
                );
                Token::new(TokenKind::Unknown, &self.source[start..self.pos], loc)
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Convenience wrapper matching the single-operation contract (§4.1).
pub fn tokenize(source: &str) -> TokenStream<'_> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(kinds(""), vec![TokenKind::EndOfFile]);
    }

    #[test]
    fn keyword_case_insensitive() {
        assert_eq!(kinds("IF"), vec![TokenKind::KwIf, TokenKind::EndOfFile]);
        assert_eq!(kinds("if"), vec![TokenKind::KwIf, TokenKind::EndOfFile]);
        assert_eq!(kinds("If"), vec![TokenKind::KwIf, TokenKind::EndOfFile]);
    }

    #[test]
    fn suffix_disambiguates_keyword_from_identifier() {
        // LEFT$ is not a keyword in our representative table, so use IF% as
        // the disambiguation example: IF followed directly by % is an
        // identifier + suffix, not the IF keyword.
        let ks = kinds("IF%");
        assert_eq!(
            ks,
            vec![
                TokenKind::Identifier,
                TokenKind::TypeSuffix(TypeSuffix::Percent),
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn rem_is_a_comment_not_a_keyword() {
        assert_eq!(
            kinds("REM this is ignored\nPRINT"),
            vec![TokenKind::EndOfLine, TokenKind::KwPrint, TokenKind::EndOfFile]
        );
    }

    #[test]
    fn apostrophe_comment_skips_to_eol() {
        assert_eq!(
            kinds("PRINT 'hi\nEND"),
            vec![
                TokenKind::KwPrint,
                TokenKind::EndOfLine,
                TokenKind::KwEnd,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn question_mark_is_print_shorthand() {
        assert_eq!(kinds("?"), vec![TokenKind::KwPrint, TokenKind::EndOfFile]);
    }

    #[test]
    fn compound_end_collapses_for_sub() {
        assert_eq!(
            kinds("END SUB"),
            vec![TokenKind::KwEndSub, TokenKind::EndOfFile]
        );
    }

    #[test]
    fn end_class_stays_two_tokens() {
        assert_eq!(
            kinds("END CLASS"),
            vec![TokenKind::KwEnd, TokenKind::Identifier, TokenKind::EndOfFile]
        );
    }

    #[test]
    fn unterminated_string_still_emits_token_and_error() {
        let stream = tokenize("\"abc");
        assert!(stream.diagnostics.has_errors());
        assert_eq!(stream.tokens[0].kind, TokenKind::UnterminatedString);
    }

    #[test]
    fn hex_literal_forms() {
        let s1 = tokenize("&HFF");
        assert_eq!(s1.tokens[0].number, Some(255.0));
        let s2 = tokenize("0xFF");
        assert_eq!(s2.tokens[0].number, Some(255.0));
    }

    #[test]
    fn number_then_suffix_splits_into_two_tokens() {
        let ks = kinds("42%");
        assert_eq!(
            ks,
            vec![
                TokenKind::NumberLiteral,
                TokenKind::TypeSuffix(TypeSuffix::Percent),
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn two_char_operators_before_single_char() {
        assert_eq!(kinds("<>"), vec![TokenKind::NotEqual, TokenKind::EndOfFile]);
        assert_eq!(kinds("<="), vec![TokenKind::LessEqual, TokenKind::EndOfFile]);
        assert_eq!(kinds(">="), vec![TokenKind::GreaterEqual, TokenKind::EndOfFile]);
        assert_eq!(kinds("<"), vec![TokenKind::Less, TokenKind::EndOfFile]);
    }

    #[test]
    fn backslash_is_integer_divide() {
        assert_eq!(kinds("\\"), vec![TokenKind::BackSlash, TokenKind::EndOfFile]);
    }

    #[test]
    fn lexeme_is_exact_source_slice() {
        let src = "  PRINT  \"hello\"";
        let stream = tokenize(src);
        let print_tok = &stream.tokens[0];
        assert_eq!(print_tok.lexeme, "PRINT");
        let str_tok = &stream.tokens[1];
        assert_eq!(str_tok.lexeme, "\"hello\"");
    }
}
