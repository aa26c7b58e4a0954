//! Parsing.
//!
//! A recursive-descent reader over bytes. Every node it builds is charged to
//! the caller's zone; when the input turns out to be malformed, whatever was
//! built so far is destroyed before the error is returned, so a failed parse
//! leaves the zone as it found it.

use crate::container::{Array, KeyOnFailure, List};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::zone::Zone;
use std::fs;
use std::path::Path;

#[derive(PartialEq, Debug, Clone, Copy)]
enum Token<'s> {
    Null,
    Bool(bool),
    Num(f64),
    StrBorrow(&'s [u8]),
    // unescaped content is in `Reader::buf`
    StrOwn,
    Colon,
    Comma,
    ObjectBegin,
    ObjectEnd,
    ArrayBegin,
    ArrayEnd,
}

/// Parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Accept `// line` and `/* block */` comments wherever whitespace is
    /// allowed.
    pub allow_comments: bool,
    /// Accept a single `,` before `]` or `}`.
    pub allow_trailing_comma: bool,
    /// Deepest container nesting accepted. The top-level value is depth 0.
    pub max_depth: usize,
}

impl Dialect {
    pub const STRICT: Self = Self {
        allow_comments: false,
        allow_trailing_comma: false,
        max_depth: 512,
    };

    pub const DEFAULT: Self = Self::STRICT.comments(cfg!(feature = "default_allow_comments"));

    pub const fn comments(self, allow_comments: bool) -> Self {
        Self {
            allow_comments,
            ..self
        }
    }
    pub const fn trailing_comma(self, allow_trailing_comma: bool) -> Self {
        Self {
            allow_trailing_comma,
            ..self
        }
    }
    pub const fn max_depth(self, max_depth: usize) -> Self {
        Self { max_depth, ..self }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Reads one JSON value from `input`.
///
/// `'a` is the input, `'o` the lifetime of the produced tree: `'static` when
/// every string is copied ([`Reader::new`]), `'a` when escape-free strings
/// are borrowed from the input ([`Reader::borrowing`]).
pub struct Reader<'z, 'a, 'o> {
    zone: &'z Zone,
    bytes: &'a [u8],
    pos: usize,
    tok_start: usize,
    buf: Vec<u8>,
    dialect: Dialect,
    lend: fn(&'a [u8]) -> Option<&'o [u8]>,
}

fn never_lend(_: &[u8]) -> Option<&'static [u8]> {
    None
}

impl<'z, 'a> Reader<'z, 'a, 'static> {
    pub fn new(zone: &'z Zone, input: &'a (impl AsRef<[u8]> + ?Sized)) -> Self {
        Self::with_dialect(zone, input, Dialect::DEFAULT)
    }
    pub fn with_dialect(zone: &'z Zone, input: &'a (impl AsRef<[u8]> + ?Sized), dialect: Dialect) -> Self {
        Self::build(zone, input.as_ref(), dialect, never_lend)
    }
}

impl<'z, 'a> Reader<'z, 'a, 'a> {
    /// A reader whose escape-free strings come out as
    /// [`Value::StringReference`]s into `input`.
    pub fn borrowing(zone: &'z Zone, input: &'a (impl AsRef<[u8]> + ?Sized), dialect: Dialect) -> Self {
        Self::build(zone, input.as_ref(), dialect, Some)
    }
}

impl<'z, 'a, 'o> Reader<'z, 'a, 'o> {
    fn build(zone: &'z Zone, bytes: &'a [u8], dialect: Dialect, lend: fn(&'a [u8]) -> Option<&'o [u8]>) -> Self {
        Self {
            zone,
            bytes,
            pos: 0,
            tok_start: 0,
            buf: Vec::new(),
            dialect,
            lend,
        }
    }

    /// Byte offset of the next unread input.
    pub fn position(&self) -> usize {
        self.pos
    }

    #[cold]
    fn err(&self, message: impl Into<String>) -> Error {
        let offset = self.pos.min(self.bytes.len());
        let so_far = &self.bytes[..offset];
        let line = so_far.iter().filter(|b| **b == b'\n').count() + 1;
        let line_start = so_far.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        let column = offset - line_start + 1;
        let message = message.into();
        tracing::debug!(offset, line, column, %message, "rejected malformed JSON");
        Error::Syntax {
            message,
            offset,
            line,
            column,
        }
    }

    // Reports at the start of the token just read.
    #[cold]
    fn token_err(&mut self, message: impl Into<String>) -> Error {
        self.pos = self.tok_start;
        self.err(message)
    }

    fn bnext(&mut self) -> Option<u8> {
        let ch = self.bytes.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn bnext_or_err(&mut self) -> Result<u8> {
        match self.bnext() {
            Some(c) => Ok(c),
            None => Err(self.err("unexpected end of input")),
        }
    }

    fn bpeek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> Result<()> {
        let bs = self.bytes;
        loop {
            while self.pos < bs.len() && matches!(bs[self.pos], b'\n' | b' ' | b'\t' | b'\r') {
                self.pos += 1;
            }
            if !self.dialect.allow_comments || self.bpeek() != Some(b'/') {
                return Ok(());
            }
            match bs.get(self.pos + 1) {
                Some(b'/') => {
                    while self.pos < bs.len() && bs[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                Some(b'*') => {
                    let body = self.pos + 2;
                    match bs[body.min(bs.len())..].windows(2).position(|w| w == b"*/") {
                        Some(end) => self.pos = body + end + 2,
                        None => {
                            self.pos = bs.len();
                            return Err(self.err("unterminated block comment"));
                        }
                    }
                }
                _ => return Err(self.err("expected `//` or `/*`")),
            }
        }
    }

    fn skipnpeek(&mut self) -> Result<Option<u8>> {
        tri!(self.skip_ws());
        Ok(self.bpeek())
    }

    fn single_hex_escape(&mut self) -> Result<u16> {
        let mut acc = 0;
        for _ in 0..4 {
            let b = tri!(self.bnext_or_err());
            let n = match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                b'A'..=b'F' => b - b'A' + 10,
                _ => return Err(self.err("invalid `\\u` escape")),
            };
            acc = acc * 16 + (n as u16);
        }
        Ok(acc)
    }

    fn push_char(&mut self, c: char) {
        let mut tmp = [0; 4];
        self.buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
    }

    // Unpaired surrogates decode to U+FFFD, following "maximal subparts"
    // (https://www.unicode.org/review/pr-121.html).
    fn read_hex_escape(&mut self) -> Result<()> {
        use core::char::REPLACEMENT_CHARACTER as REPLACEMENT;
        const TRAIL: core::ops::Range<u16> = 0xdc00..0xe000;

        let lead = tri!(self.single_hex_escape());
        if let Some(c) = core::char::from_u32(lead as u32) {
            self.push_char(c);
            return Ok(());
        }
        if TRAIL.contains(&lead) {
            self.push_char(REPLACEMENT);
            return Ok(());
        }
        let p = self.pos;
        if !self.bytes[p..].starts_with(b"\\u") {
            self.push_char(REPLACEMENT);
            return Ok(());
        }
        self.pos += 2;
        let trail = tri!(self.single_hex_escape());
        if !TRAIL.contains(&trail) {
            // rewind so the second escape is decoded on its own
            self.pos = p;
            self.push_char(REPLACEMENT);
            return Ok(());
        }
        let scalar = (((lead as u32 - 0xd800) << 10) | (trail as u32 - 0xdc00)) + 0x10000;
        self.push_char(core::char::from_u32(scalar).unwrap_or(REPLACEMENT));
        Ok(())
    }

    fn unescape_next(&mut self) -> Result<()> {
        let b = tri!(self.bnext_or_err());
        let c = match b {
            b'b' => b'\x08',
            b'f' => b'\x0c',
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'\\' => b'\\',
            b'/' => b'/',
            b'"' => b'"',
            b'u' => return self.read_hex_escape(),
            _ => return Err(self.err("invalid escape")),
        };
        self.buf.push(c);
        Ok(())
    }

    fn read_keyword(&mut self, id: &[u8], t: Token<'a>) -> Result<Token<'a>> {
        if self.bytes[self.tok_start..].starts_with(id) {
            self.pos = self.tok_start + id.len();
            Ok(t)
        } else {
            Err(self.token_err("invalid literal"))
        }
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        tri!(self.skip_ws());
        self.tok_start = self.pos;
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }
        let tok = match tri!(self.bnext_or_err()) {
            b':' => Token::Colon,
            b',' => Token::Comma,
            b'{' => Token::ObjectBegin,
            b'}' => Token::ObjectEnd,
            b'[' => Token::ArrayBegin,
            b']' => Token::ArrayEnd,
            b'"' => tri!(self.read_string()),
            b't' => tri!(self.read_keyword(b"true", Token::Bool(true))),
            b'f' => tri!(self.read_keyword(b"false", Token::Bool(false))),
            b'n' => tri!(self.read_keyword(b"null", Token::Null)),
            b'-' | b'0'..=b'9' => tri!(self.read_num()),
            _ => return Err(self.token_err("unexpected character")),
        };
        Ok(Some(tok))
    }

    fn skip_digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.bpeek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    // -?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?
    fn read_num(&mut self) -> Result<Token<'a>> {
        self.pos = self.tok_start;
        if self.bpeek() == Some(b'-') {
            self.pos += 1;
        }
        match self.bpeek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => {
                self.skip_digits();
            }
            _ => return Err(self.err("expected digit")),
        }
        if self.bpeek() == Some(b'.') {
            self.pos += 1;
            if self.skip_digits() == 0 {
                return Err(self.err("expected digit after `.`"));
            }
        }
        if matches!(self.bpeek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.bpeek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.skip_digits() == 0 {
                return Err(self.err("expected digit in exponent"));
            }
        }
        let text = core::str::from_utf8(&self.bytes[self.tok_start..self.pos]).ok();
        match text.and_then(|t| t.parse::<f64>().ok()) {
            Some(v) if v.is_finite() => Ok(Token::Num(v)),
            _ => Err(self.err("number out of range")),
        }
    }

    fn read_string(&mut self) -> Result<Token<'a>> {
        self.buf.clear();
        let bs = self.bytes;
        let mut escaped = false;
        loop {
            let start = self.pos;
            let mut p = start;
            while p < bs.len() && bs[p] != b'"' && bs[p] != b'\\' && bs[p] >= 0x20 {
                p += 1;
            }
            self.pos = p;
            match bs.get(p) {
                None => return Err(self.err("unterminated string")),
                Some(&b) if b < 0x20 => return Err(self.err("control character in string")),
                _ => {}
            }
            self.pos = p + 1;
            if bs[p] == b'"' && !escaped {
                return Ok(Token::StrBorrow(&bs[start..p]));
            }
            self.buf.extend_from_slice(&bs[start..p]);
            if bs[p] == b'"' {
                return Ok(Token::StrOwn);
            }
            escaped = true;
            tri!(self.unescape_next());
        }
    }
}

macro_rules! tok_tester {
    ($($func:ident matches $tok:ident, $what:literal);*) => {$(
        fn $func(&mut self) -> Result<()> {
            match tri!(self.next_token()) {
                Some(Token::$tok) => Ok(()),
                _ => Err(self.token_err(concat!("expected ", $what))),
            }
        }
    )*};
}

impl<'z, 'a, 'o> Reader<'z, 'a, 'o> {
    fn next(&mut self) -> Result<Token<'a>> {
        match tri!(self.next_token()) {
            Some(v) => Ok(v),
            None => Err(self.token_err("unexpected end of input")),
        }
    }
    tok_tester! {
        colon matches Colon, "`:`"
    }

    // After an element: `true` if another one follows, `false` at `close`.
    fn comma_or_end(&mut self, close: u8) -> Result<bool> {
        let tok = tri!(self.next_token());
        match (tok, close) {
            (Some(Token::Comma), _) => {
                if self.dialect.allow_trailing_comma && tri!(self.skipnpeek()) == Some(close) {
                    self.pos += 1;
                    return Ok(false);
                }
                Ok(true)
            }
            (Some(Token::ArrayEnd), b']') | (Some(Token::ObjectEnd), b'}') => Ok(false),
            (_, b']') => Err(self.token_err("expected `,` or `]`")),
            _ => Err(self.token_err("expected `,` or `}`")),
        }
    }

    fn string(&mut self, tok: Token<'a>) -> Result<Value<'o>> {
        match tok {
            Token::StrBorrow(s) => match (self.lend)(s) {
                Some(s) => Ok(Value::StringReference(s)),
                None => Value::string_copy(self.zone, s),
            },
            _ => Value::string_copy(self.zone, &self.buf[..]),
        }
    }

    fn key(&mut self) -> Result<Vec<u8>> {
        match tri!(self.next()) {
            Token::StrBorrow(s) => Ok(s.to_vec()),
            Token::StrOwn => Ok(self.buf.clone()),
            _ => Err(self.token_err("expected string key")),
        }
    }

    /// Reads the next value. Call [`Reader::finish`] afterwards to reject
    /// trailing input.
    pub fn read_value(&mut self) -> Result<Value<'o>> {
        self.value(0)
    }

    fn value(&mut self, depth: usize) -> Result<Value<'o>> {
        match tri!(self.next()) {
            Token::Null => Ok(Value::Null),
            Token::Bool(b) => Ok(Value::Boolean(b)),
            Token::Num(n) => Ok(Value::Number(n)),
            t @ (Token::StrBorrow(_) | Token::StrOwn) => self.string(t),
            Token::ArrayBegin => self.list(depth + 1),
            Token::ObjectBegin => self.array(depth + 1),
            _ => Err(self.token_err("expected a value")),
        }
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.dialect.max_depth {
            return Err(self.err(format!("nesting deeper than {} levels", self.dialect.max_depth)));
        }
        Ok(())
    }

    fn list(&mut self, depth: usize) -> Result<Value<'o>> {
        tri!(self.check_depth(depth));
        let mut list = List::new();
        match self.fill_list(&mut list, depth) {
            Ok(()) => Ok(Value::List(list)),
            Err(e) => {
                Value::List(list).destroy(self.zone);
                Err(e)
            }
        }
    }

    fn fill_list(&mut self, list: &mut List<'o>, depth: usize) -> Result<()> {
        if tri!(self.skipnpeek()) == Some(b']') {
            self.pos += 1;
            return Ok(());
        }
        loop {
            let v = tri!(self.value(depth));
            if let Err(rejected) = list.push_move(self.zone, v) {
                let mut v = rejected.value;
                v.destroy(self.zone);
                return Err(rejected.error);
            }
            if !tri!(self.comma_or_end(b']')) {
                return Ok(());
            }
        }
    }

    fn array(&mut self, depth: usize) -> Result<Value<'o>> {
        tri!(self.check_depth(depth));
        let mut array = Array::new();
        match self.fill_array(&mut array, depth) {
            Ok(()) => Ok(Value::Array(array)),
            Err(e) => {
                Value::Array(array).destroy(self.zone);
                Err(e)
            }
        }
    }

    fn fill_array(&mut self, array: &mut Array<'o>, depth: usize) -> Result<()> {
        if tri!(self.skipnpeek()) == Some(b'}') {
            self.pos += 1;
            return Ok(());
        }
        loop {
            let k = tri!(self.key());
            tri!(self.colon());
            let v = tri!(self.value(depth));
            if let Err(rejected) = array.insert_owned(self.zone, k, v, KeyOnFailure::Free) {
                let (_, mut v) = rejected.value;
                v.destroy(self.zone);
                return Err(rejected.error);
            }
            if !tri!(self.comma_or_end(b'}')) {
                return Ok(());
            }
        }
    }

    /// Fails unless only whitespace (and comments, if allowed) remains.
    pub fn finish(&mut self) -> Result<()> {
        if tri!(self.skipnpeek()).is_some() {
            return Err(self.err("trailing characters after JSON value"));
        }
        Ok(())
    }

    fn read_document(&mut self) -> Result<Value<'o>> {
        let mut v = tri!(self.read_value());
        if let Err(e) = self.finish() {
            v.destroy(self.zone);
            return Err(e);
        }
        Ok(v)
    }
}

/// Parses `text` into a tree of owned nodes.
pub fn parse(zone: &Zone, text: &(impl AsRef<[u8]> + ?Sized)) -> Result<Value<'static>> {
    parse_with(zone, text, Dialect::DEFAULT)
}

pub fn parse_with(zone: &Zone, text: &(impl AsRef<[u8]> + ?Sized), dialect: Dialect) -> Result<Value<'static>> {
    Reader::with_dialect(zone, text, dialect).read_document()
}

/// Parses `text`, borrowing every string that needs no unescaping straight
/// from the input instead of copying it.
pub fn parse_borrowed<'a>(zone: &Zone, text: &'a (impl AsRef<[u8]> + ?Sized)) -> Result<Value<'a>> {
    Reader::borrowing(zone, text, Dialect::DEFAULT).read_document()
}

/// Reads the whole file at `path` and parses it. A file that cannot be read
/// is an [`Error::Io`]; malformed content is an [`Error::Syntax`].
pub fn parse_file(zone: &Zone, path: impl AsRef<Path>) -> Result<Value<'static>> {
    let path = path.as_ref();
    let text = match fs::read(path) {
        Ok(text) => text,
        Err(source) => {
            return Err(Error::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    tracing::debug!(path = %path.display(), bytes = text.len(), "parsing JSON file");
    parse(zone, &text[..])
}
