//! XML Tokenizer
//!
//! Turns a byte buffer into a finite stream of [`Token`]s. The tokenizer is a
//! single forward pass over the input:
//! - **Markup** (`<...>`) becomes tag, comment, CDATA, PI, DOCTYPE or XML
//!   declaration tokens; the attributes of a start tag follow it as separate
//!   `Attribute` tokens
//! - **Text** between markup is preserved verbatim, including whitespace-only runs
//! - **Errors** produce one terminal `Fatal` token, after which the stream ends
//!
//! Entity references are left undecoded here; see [`crate::entities`].

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a token or diagnostic in the source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// Absolute byte offset from the start of the input
    pub offset: usize,
    /// 1-based line number
    pub line: u32,
    /// 1-based column, counted in characters
    pub column: u32,
}

impl Location {
    pub fn new(offset: usize, line: u32, column: u32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    StartTag,
    EndTag,
    EmptyElementTag,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    CData,
    Doctype,
    XmlDeclaration,
    Eof,
    Fatal,
}

/// A lexical unit borrowed from the input buffer.
///
/// `name` holds the tag name, attribute name, PI target or DOCTYPE name.
/// `content` holds the raw attribute value, text, comment body, CDATA body,
/// PI data or DOCTYPE body after the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub raw: &'a str,
    pub name: Option<&'a str>,
    pub content: Option<&'a str>,
    /// Only set on `Fatal` tokens
    pub message: Option<String>,
    pub start: usize,
    pub end: usize,
    pub location: Location,
}

impl<'a> Token<'a> {
    pub fn is_fatal(&self) -> bool {
        self.kind == TokenKind::Fatal
    }
}

pub(crate) fn is_name_start_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':' || (c as u32) >= 0x80
}

pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || c.is_ascii_digit() || c == '-' || c == '.'
}

/// Checks the XML `Name` production (ASCII-exact, permissive above U+007F)
pub(crate) fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) => chars.all(is_name_char),
        _ => false,
    }
}

/// Characters outside the XML `Char` production
pub(crate) fn is_illegal_char(c: char) -> bool {
    let cp = c as u32;
    (cp < 0x20 && c != '\t' && c != '\n' && c != '\r') || cp == 0xFFFE || cp == 0xFFFF
}

fn find_illegal_char(s: &str) -> Option<(usize, char)> {
    s.char_indices().find(|(_, c)| is_illegal_char(*c))
}

/// Tracks line and column while the tokenizer moves forward.
#[derive(Debug, Clone)]
struct LineTracker {
    pos: usize,
    line: u32,
    column: u32,
    after_cr: bool,
}

impl LineTracker {
    fn new(pos: usize) -> Self {
        Self {
            pos,
            line: 1,
            column: 1,
            after_cr: false,
        }
    }

    fn advance_to(&mut self, input: &str, target: usize) -> Location {
        if target > self.pos {
            for c in input[self.pos..target].chars() {
                match c {
                    '\r' => {
                        self.line += 1;
                        self.column = 1;
                        self.after_cr = true;
                    }
                    '\n' => {
                        if !self.after_cr {
                            self.line += 1;
                            self.column = 1;
                        }
                        self.after_cr = false;
                    }
                    _ => {
                        self.column += 1;
                        self.after_cr = false;
                    }
                }
            }
            self.pos = target;
        }
        Location::new(self.pos, self.line, self.column)
    }
}

/// Streaming tokenizer over an in-memory document
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    tracker: LineTracker,
    pending: VecDeque<Token<'a>>,
    encoding_error: Option<String>,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let (valid, encoding_error) = match std::str::from_utf8(bytes) {
            Ok(s) => (s, None),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                // valid_up_to always lands on a char boundary
                let prefix = std::str::from_utf8(&bytes[..valid_up_to]).unwrap_or("");
                (
                    prefix,
                    Some(format!(
                        "invalid UTF-8 byte sequence at offset {}",
                        valid_up_to
                    )),
                )
            }
        };

        let utf16_bom = bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]);
        let encoding_error = if utf16_bom {
            Some("unsupported encoding: UTF-16 byte order mark".to_string())
        } else {
            encoding_error
        };

        let start = if valid.starts_with('\u{FEFF}') { 3 } else { 0 };

        Self {
            input: valid,
            pos: start,
            tracker: LineTracker::new(start),
            pending: VecDeque::new(),
            encoding_error,
            done: false,
        }
    }

    /// Offset of the first byte after an optional UTF-8 byte order mark
    pub fn content_start(&self) -> usize {
        if self.input.starts_with('\u{FEFF}') { 3 } else { 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn locate(&mut self, offset: usize) -> Location {
        self.tracker.advance_to(self.input, offset)
    }

    fn token(
        &mut self,
        kind: TokenKind,
        start: usize,
        end: usize,
        name: Option<&'a str>,
        content: Option<&'a str>,
    ) -> Token<'a> {
        let location = self.locate(start);
        Token {
            kind,
            raw: &self.input[start..end],
            name,
            content,
            message: None,
            start,
            end,
            location,
        }
    }

    /// Terminates the stream
    fn fatal(&mut self, offset: usize, message: impl Into<String>) -> Token<'a> {
        self.done = true;
        self.pending.clear();
        let message = message.into();
        let offset = offset.min(self.input.len());
        let location = self.locate(offset);
        Token {
            kind: TokenKind::Fatal,
            raw: "",
            name: None,
            content: None,
            message: Some(message),
            start: offset,
            end: offset,
            location,
        }
    }

    /// Truncated markup caused by undecodable bytes is reported as the
    /// encoding problem rather than the truncation.
    fn fatal_unterminated(&mut self, start: usize, what: &str) -> Token<'a> {
        if let Some(encoding) = self.encoding_error.clone() {
            let end = self.input.len();
            return self.fatal(end, encoding);
        }
        self.fatal(start, format!("unterminated {}", what))
    }

    fn check_chars(&mut self, start: usize, body: &str, what: &str) -> Option<Token<'a>> {
        find_illegal_char(body).map(|(i, c)| {
            self.fatal(
                start + i,
                format!("illegal character U+{:04X} in {}", c as u32, what),
            )
        })
    }

    fn read_name(&self, from: usize) -> Option<usize> {
        let s = &self.input[from..];
        let mut chars = s.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            _ => return None,
        }
        let end = chars
            .find(|(_, c)| !is_name_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        Some(from + end)
    }

    fn skip_whitespace(&self, from: usize) -> usize {
        let s = &self.input[from..];
        from + s.len() - s.trim_start_matches([' ', '\t', '\n', '\r']).len()
    }

    fn lex_text(&mut self) -> Token<'a> {
        let input = self.input;
        let start = self.pos;
        let end = self
            .rest()
            .find('<')
            .map(|i| start + i)
            .unwrap_or(input.len());
        let body = &input[start..end];
        if let Some(fatal) = self.check_chars(start, body, "character data") {
            return fatal;
        }
        if let Some(i) = body.find("]]>") {
            return self.fatal(start + i, "']]>' is not allowed in character data");
        }
        self.pos = end;
        self.token(TokenKind::Text, start, end, None, Some(body))
    }

    fn lex_comment(&mut self) -> Token<'a> {
        let input = self.input;
        let start = self.pos;
        let body_start = start + 4;
        let Some(rel) = input[body_start..].find("-->") else {
            return self.fatal_unterminated(start, "comment");
        };
        let body_end = body_start + rel;
        let body = &input[body_start..body_end];
        if let Some(i) = body.find("--") {
            return self.fatal(body_start + i, "'--' is not allowed inside a comment");
        }
        if body.ends_with('-') {
            return self.fatal(body_end - 1, "comment must not end with '--->'");
        }
        if let Some(fatal) = self.check_chars(body_start, body, "comment") {
            return fatal;
        }
        self.pos = body_end + 3;
        self.token(TokenKind::Comment, start, self.pos, None, Some(body))
    }

    fn lex_cdata(&mut self) -> Token<'a> {
        let input = self.input;
        let start = self.pos;
        let body_start = start + 9;
        let Some(rel) = input[body_start..].find("]]>") else {
            return self.fatal_unterminated(start, "CDATA section");
        };
        let body_end = body_start + rel;
        let body = &input[body_start..body_end];
        if let Some(fatal) = self.check_chars(body_start, body, "CDATA section") {
            return fatal;
        }
        self.pos = body_end + 3;
        self.token(TokenKind::CData, start, self.pos, None, Some(body))
    }

    fn lex_pi(&mut self) -> Token<'a> {
        let input = self.input;
        let start = self.pos;
        let target_start = start + 2;
        let Some(target_end) = self.read_name(target_start) else {
            return self.fatal(target_start, "processing instruction target is not a valid name");
        };
        let Some(rel) = input[target_end..].find("?>") else {
            return self.fatal_unterminated(start, "processing instruction");
        };
        let body_end = target_end + rel;
        let target = &input[target_start..target_end];
        let body = &input[target_end..body_end];
        if !body.is_empty() && !body.starts_with([' ', '\t', '\n', '\r']) {
            return self.fatal(target_end, "whitespace required after processing instruction target");
        }
        if let Some(fatal) = self.check_chars(target_end, body, "processing instruction") {
            return fatal;
        }

        let kind = if target == "xml" {
            TokenKind::XmlDeclaration
        } else if target.eq_ignore_ascii_case("xml") {
            return self.fatal(target_start, format!("reserved processing instruction target '{}'", target));
        } else {
            TokenKind::ProcessingInstruction
        };

        self.pos = body_end + 2;
        let content = body.trim_start_matches([' ', '\t', '\n', '\r']);
        self.token(kind, start, self.pos, Some(target), Some(content))
    }

    fn lex_doctype(&mut self) -> Token<'a> {
        let input = self.input;
        let start = self.pos;
        let after_keyword = start + 9;
        let name_start = self.skip_whitespace(after_keyword);
        if name_start == after_keyword {
            return self.fatal(after_keyword, "whitespace required after '<!DOCTYPE'");
        }
        let Some(name_end) = self.read_name(name_start) else {
            return self.fatal(name_start, "DOCTYPE name is not a valid name");
        };

        let mut quote: Option<char> = None;
        let mut depth = 0usize;
        let mut end = None;
        for (i, c) in input[name_end..].char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None => match c {
                    '"' | '\'' => quote = Some(c),
                    '[' => depth += 1,
                    ']' => depth = depth.saturating_sub(1),
                    '>' if depth == 0 => {
                        end = Some(name_end + i);
                        break;
                    }
                    _ => {}
                },
            }
        }
        let Some(body_end) = end else {
            return self.fatal_unterminated(start, "DOCTYPE declaration");
        };
        let body = &input[name_end..body_end];
        if let Some(fatal) = self.check_chars(name_end, body, "DOCTYPE declaration") {
            return fatal;
        }
        self.pos = body_end + 1;
        let name = &input[name_start..name_end];
        self.token(TokenKind::Doctype, start, self.pos, Some(name), Some(body.trim()))
    }

    fn lex_end_tag(&mut self) -> Token<'a> {
        let input = self.input;
        let start = self.pos;
        let name_start = start + 2;
        let Some(name_end) = self.read_name(name_start) else {
            if name_start >= input.len() {
                return self.fatal_unterminated(start, "end tag");
            }
            return self.fatal(name_start, "illegal character in end tag name");
        };
        let close = self.skip_whitespace(name_end);
        if close >= input.len() {
            return self.fatal_unterminated(start, "end tag");
        }
        if !input[close..].starts_with('>') {
            return self.fatal(close, "expected '>' to close end tag");
        }
        self.pos = close + 1;
        let name = &input[name_start..name_end];
        self.token(TokenKind::EndTag, start, self.pos, Some(name), None)
    }

    /// Lexes a start tag and queues its attributes behind it.
    fn lex_start_tag(&mut self) -> Token<'a> {
        let input = self.input;
        let start = self.pos;
        let name_start = start + 1;
        let Some(name_end) = self.read_name(name_start) else {
            if name_start >= input.len() {
                return self.fatal_unterminated(start, "start tag");
            }
            return self.fatal(name_start, "illegal character at start of element name");
        };

        let mut attributes: Vec<(usize, usize, &'a str, &'a str)> = Vec::new();
        let mut cursor = name_end;
        let (kind, end) = loop {
            let next = self.skip_whitespace(cursor);
            let had_whitespace = next > cursor;
            cursor = next;
            let rest = &input[cursor..];
            if rest.is_empty() {
                return self.fatal_unterminated(start, "start tag");
            }
            if rest.starts_with("/>") {
                break (TokenKind::EmptyElementTag, cursor + 2);
            }
            if rest.starts_with('>') {
                break (TokenKind::StartTag, cursor + 1);
            }
            if !had_whitespace {
                return self.fatal(cursor, "whitespace required before attribute name");
            }

            let attr_start = cursor;
            let Some(attr_name_end) = self.read_name(cursor) else {
                return self.fatal(cursor, "illegal character in attribute name");
            };
            let attr_name = &input[attr_start..attr_name_end];
            cursor = self.skip_whitespace(attr_name_end);
            if !input[cursor..].starts_with('=') {
                if cursor >= input.len() {
                    return self.fatal_unterminated(start, "start tag");
                }
                return self.fatal(cursor, format!("expected '=' after attribute '{}'", attr_name));
            }
            cursor = self.skip_whitespace(cursor + 1);
            let quote = match input[cursor..].chars().next() {
                Some(q @ ('"' | '\'')) => q,
                Some(_) => {
                    return self.fatal(cursor, format!("attribute '{}' value must be quoted", attr_name));
                }
                None => return self.fatal_unterminated(start, "start tag"),
            };
            let value_start = cursor + 1;
            let Some(rel) = input[value_start..].find(quote) else {
                return self.fatal_unterminated(attr_start, "attribute value");
            };
            let value_end = value_start + rel;
            let value = &input[value_start..value_end];
            if let Some(i) = value.find('<') {
                return self.fatal(value_start + i, format!("'<' is not allowed in attribute '{}' value", attr_name));
            }
            if let Some(fatal) = self.check_chars(value_start, value, "attribute value") {
                return fatal;
            }
            cursor = value_end + 1;
            attributes.push((attr_start, cursor, attr_name, value));
        };

        self.pos = end;
        let name = &input[name_start..name_end];
        let tag = self.token(kind, start, end, Some(name), None);
        for (attr_start, attr_end, attr_name, value) in attributes {
            let token = self.token(TokenKind::Attribute, attr_start, attr_end, Some(attr_name), Some(value));
            self.pending.push_back(token);
        }
        tag
    }

    fn lex_markup(&mut self) -> Token<'a> {
        let rest = self.rest();
        if rest.starts_with("<?") {
            self.lex_pi()
        } else if rest.starts_with("<!--") {
            self.lex_comment()
        } else if rest.starts_with("<![CDATA[") {
            self.lex_cdata()
        } else if rest.starts_with("<!DOCTYPE") {
            self.lex_doctype()
        } else if rest.starts_with("<!") {
            let pos = self.pos;
            self.fatal(pos, "unknown markup declaration")
        } else if rest.starts_with("</") {
            self.lex_end_tag()
        } else {
            self.lex_start_tag()
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if let Some(token) = self.pending.pop_front() {
            return Some(token);
        }
        if self.done {
            return None;
        }
        if self.pos >= self.input.len() {
            if let Some(message) = self.encoding_error.clone() {
                let end = self.input.len();
                return Some(self.fatal(end, message));
            }
            self.done = true;
            let end = self.input.len();
            return Some(self.token(TokenKind::Eof, end, end, None, None));
        }
        if self.rest().starts_with('<') {
            Some(self.lex_markup())
        } else {
            Some(self.lex_text())
        }
    }
}

/// Convenience constructor mirroring [`Tokenizer::new`]
pub fn tokenize(bytes: &[u8]) -> Tokenizer<'_> {
    Tokenizer::new(bytes)
}
