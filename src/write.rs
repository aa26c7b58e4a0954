//! Serialization.
//!
//! [`Writer`] is an append-only byte buffer with an optional size limit;
//! [`stringify`] renders a tree into it. Bytes inside strings pass through
//! untouched except for `"`, `\` and control bytes, which are escaped.

use crate::error::{Error, Result};
use crate::value::Value;
use std::fs;
use std::io::{self, Write as _};
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct Writer {
    o: Vec<u8>,
    limit: Option<usize>,
    pretty: bool,
}

impl Writer {
    pub fn new(pretty: bool) -> Self {
        Self {
            pretty,
            ..Self::default()
        }
    }
    /// A writer that refuses to grow past `limit` bytes.
    pub fn with_limit(pretty: bool, limit: usize) -> Self {
        Self {
            pretty,
            limit: Some(limit),
            ..Self::default()
        }
    }
    pub fn pretty(&self) -> bool {
        self.pretty
    }
    pub fn len(&self) -> usize {
        self.o.len()
    }
    pub fn is_empty(&self) -> bool {
        self.o.is_empty()
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.o
    }
    pub fn clear(&mut self) {
        self.o.clear();
    }
    pub fn finish(self) -> Vec<u8> {
        self.o
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(limit) = self.limit {
            let want = self.o.len() + bytes.len();
            if want > limit {
                return Err(Error::AllocationFailure {
                    zone: "output buffer".into(),
                    requested: want,
                });
            }
        }
        self.o.extend_from_slice(bytes);
        Ok(())
    }

    fn put_escaped(&mut self, s: &[u8]) -> Result<()> {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        tri!(self.append(b"\""));
        let mut start = 0;
        for (i, &b) in s.iter().enumerate() {
            let short: &[u8] = match b {
                b'"' => b"\\\"",
                b'\\' => b"\\\\",
                b'\n' => b"\\n",
                b'\r' => b"\\r",
                b'\t' => b"\\t",
                0x08 => b"\\b",
                0x0c => b"\\f",
                b if b < 0x20 => &[],
                _ => continue,
            };
            tri!(self.append(&s[start..i]));
            start = i + 1;
            if short.is_empty() {
                let esc = [
                    b'\\',
                    b'u',
                    b'0',
                    b'0',
                    HEX[(b >> 4) as usize],
                    HEX[(b & 0xf) as usize],
                ];
                tri!(self.append(&esc));
            } else {
                tri!(self.append(short));
            }
        }
        tri!(self.append(&s[start..]));
        self.append(b"\"")
    }

    fn put_number(&mut self, n: f64) -> Result<()> {
        let mut buf = String::new();
        fmt_number(&mut buf, n);
        self.append(buf.as_bytes())
    }

    // Newline plus indentation in pretty mode, nothing otherwise.
    fn put_break(&mut self, depth: usize) -> Result<()> {
        if !self.pretty {
            return Ok(());
        }
        const SP: &[u8] = b"                                ";
        tri!(self.append(b"\n"));
        let mut n = depth * 4;
        while n > 0 {
            let chunk = n.min(SP.len());
            tri!(self.append(&SP[..chunk]));
            n -= chunk;
        }
        Ok(())
    }

    fn put_value(&mut self, root: &Value<'_>, inner: bool) -> Result<()> {
        let mut stack = Vec::new();
        if inner {
            match root {
                Value::List(l) => {
                    for (i, v) in l.iter().enumerate().rev() {
                        stack.push(Step::Value(v, 0));
                        if i > 0 {
                            stack.push(Step::Comma);
                        }
                    }
                }
                Value::Array(a) => {
                    for (i, (k, v)) in a.iter().enumerate().rev() {
                        stack.push(Step::Entry(k, v, 0));
                        if i > 0 {
                            stack.push(Step::Comma);
                        }
                    }
                }
                other => stack.push(Step::Value(other, 0)),
            }
        } else {
            stack.push(Step::Value(root, 0));
        }
        while let Some(step) = stack.pop() {
            match step {
                Step::Comma => tri!(self.append(b",")),
                Step::Next(depth, first) => {
                    if !first {
                        tri!(self.append(b","));
                    }
                    tri!(self.put_break(depth));
                }
                Step::Close(b, depth) => {
                    tri!(self.put_break(depth));
                    tri!(self.append(&[b]));
                }
                Step::Entry(k, v, depth) => {
                    tri!(self.put_escaped(k));
                    tri!(self.append(if self.pretty { b": " } else { b":" }));
                    stack.push(Step::Value(v, depth));
                }
                Step::Value(v, depth) => match v {
                    Value::Null => tri!(self.append(b"null")),
                    Value::Boolean(true) => tri!(self.append(b"true")),
                    Value::Boolean(false) => tri!(self.append(b"false")),
                    Value::Number(n) => tri!(self.put_number(*n)),
                    Value::OwnedString(s) => tri!(self.put_escaped(s)),
                    Value::StringReference(s) => tri!(self.put_escaped(s)),
                    Value::List(l) if l.is_empty() => tri!(self.append(b"[]")),
                    Value::Array(a) if a.is_empty() => tri!(self.append(b"{}")),
                    Value::List(l) => {
                        tri!(self.append(b"["));
                        stack.push(Step::Close(b']', depth));
                        for (i, v) in l.iter().enumerate().rev() {
                            stack.push(Step::Value(v, depth + 1));
                            stack.push(Step::Next(depth + 1, i == 0));
                        }
                    }
                    Value::Array(a) => {
                        tri!(self.append(b"{"));
                        stack.push(Step::Close(b'}', depth));
                        for (i, (k, v)) in a.iter().enumerate().rev() {
                            stack.push(Step::Entry(k, v, depth + 1));
                            stack.push(Step::Next(depth + 1, i == 0));
                        }
                    }
                },
            }
        }
        Ok(())
    }
}

enum Step<'v, 'a> {
    Value(&'v Value<'a>, usize),
    Entry(&'v [u8], &'v Value<'a>, usize),
    // separator before a container element; `true` for the first one
    Next(usize, bool),
    Close(u8, usize),
    Comma,
}

/// Shortest digits that read back as the same `f64`. Plain decimal for
/// magnitudes in `[1e-6, 1e21)` (integers print without a fraction),
/// exponent form otherwise. `NaN` has no JSON spelling and becomes `null`;
/// infinities clamp to the largest finite value.
fn fmt_number(out: &mut String, n: f64) {
    if n.is_nan() {
        out.push_str("null");
        return;
    }
    let n = if n.is_infinite() {
        if n < 0.0 {
            -f64::MAX
        } else {
            f64::MAX
        }
    } else {
        n
    };
    let abs = n.abs();
    let text = if abs == 0.0 || (1e-6..1e21).contains(&abs) {
        n.to_string()
    } else {
        format!("{:e}", n)
    };
    out.push_str(&text);
}

/// Renders `v` as JSON text.
pub fn stringify(w: &mut Writer, v: &Value<'_>) -> Result<()> {
    w.put_value(v, false)
}

/// Like [`stringify`], but a top-level `Array` or `List` is written without
/// its enclosing brackets so the output can be spliced into a larger
/// document. Nested containers keep theirs.
pub fn stringify_inner(w: &mut Writer, v: &Value<'_>) -> Result<()> {
    w.put_value(v, true)
}

/// Writes the compact rendering of `v` to `out`.
pub fn print(mut out: impl io::Write, v: &Value<'_>) -> Result<()> {
    let mut w = Writer::new(false);
    tri!(stringify(&mut w, v));
    tri!(out.write_all(w.as_bytes()).map_err(Error::Stream));
    out.flush().map_err(Error::Stream)
}

/// Saves `v` to `path`. The text goes to `<path>.tmp` first and is renamed
/// over `path` once complete; with `sync` the data is flushed to disk
/// before the rename.
pub fn save(path: impl AsRef<Path>, v: &Value<'_>, sync: bool) -> Result<()> {
    let path = path.as_ref();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    let mut w = Writer::new(false);
    tri!(stringify(&mut w, v));
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source| Error::Io { path: p, source }
    };
    let written = fs::File::create(tmp).and_then(|mut f| {
        f.write_all(w.as_bytes())?;
        if sync {
            f.sync_all()?;
        }
        Ok(())
    });
    if let Err(e) = written {
        let _ = fs::remove_file(tmp);
        return Err(io_err(tmp)(e));
    }
    tri!(fs::rename(tmp, path).map_err(io_err(path)));
    tracing::debug!(path = %path.display(), bytes = w.len(), sync, "saved JSON");
    Ok(())
}

impl Value<'_> {
    /// Convenience rendering into a fresh buffer.
    pub fn to_json(&self, pretty: bool) -> Vec<u8> {
        let mut w = Writer::new(pretty);
        match stringify(&mut w, self) {
            Ok(()) => w.finish(),
            Err(_) => unreachable!("an unbounded writer never refuses"),
        }
    }
}

impl core::fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_json(false)))
    }
}
