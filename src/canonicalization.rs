use crate::hash::HashImpl;
use memchr::memmem::Finder;
use once_cell::sync::Lazy;

#[derive(PartialEq, Eq, Clone, Debug, Copy)]
pub enum Type {
    Simple,
    Relaxed,
}

impl Type {
    pub fn canon_name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }

    pub(crate) fn canon_body(&self, body: &[u8], hasher: &mut HashImpl) {
        match self {
            Self::Simple => body_simple(body, hasher),
            Self::Relaxed => body_relaxed(body, hasher),
        }
    }

    pub(crate) fn canon_header_into(&self, key: &str, value: &[u8], out: &mut Vec<u8>) {
        match self {
            Self::Simple => canonicalize_header_simple(key, value, out),
            Self::Relaxed => canonicalize_header_relaxed(key, value, out),
        }
    }
}

/// Collapse the trailing run of empty lines to nothing; the canonical
/// final CRLF is emitted by the caller's algorithm.
fn trim_trailing_empty_lines(mut body: &[u8]) -> &[u8] {
    while body.ends_with(b"\r\n\r\n") {
        body = &body[..body.len() - 2];
    }
    body
}

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.3>
fn body_simple(body: &[u8], hasher: &mut HashImpl) {
    let body = trim_trailing_empty_lines(body);
    if body.is_empty() {
        hasher.hash(b"\r\n");
        return;
    }

    hasher.hash(body);
    if !body.ends_with(b"\r\n") {
        hasher.hash(b"\r\n");
    }
}

/// Helper for iterating lines using memmem
struct IterLines<'haystack> {
    haystack: &'haystack [u8],
    inner: memchr::memmem::FindIter<'haystack, 'static>,
    start: usize,
    done: bool,
}

impl<'haystack> Iterator for IterLines<'haystack> {
    type Item = &'haystack [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.inner.next() {
            Some(idx) => {
                let line = &self.haystack[self.start..idx + 2];
                self.start = idx + 2;
                Some(line)
            }
            None => {
                self.done = true;
                let line = &self.haystack[self.start..];
                if line.is_empty() {
                    None
                } else {
                    Some(line)
                }
            }
        }
    }
}

fn iter_lines(haystack: &[u8]) -> IterLines {
    static CRLF: Lazy<Finder> = Lazy::new(|| memchr::memmem::Finder::new("\r\n"));
    IterLines {
        haystack,
        inner: CRLF.find_iter(haystack),
        start: 0,
        done: false,
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.4>
fn body_relaxed(body: &[u8], hasher: &mut HashImpl) {
    let body = trim_trailing_empty_lines(body);
    if body.is_empty() {
        // An empty body still contributes a single CRLF to the hash
        hasher.hash(b"\r\n");
        return;
    }

    for mut line in iter_lines(body) {
        // Ignore all whitespace at the end of the line
        line = trim_ws_end(line);

        let mut prior = 0;
        // Reduce all sequences of WSP within a line to a single SP character.
        for idx in memchr::memchr2_iter(b' ', b'\t', line) {
            if prior > 0 && idx == prior {
                // Part of a run; ignore this one
                prior = idx + 1;
                continue;
            }

            // Found a new run of space(s).
            // Emit the bytes ahead of this one
            hasher.hash(&line[prior..idx]);
            // and emit the canonical space
            hasher.hash(b" ");

            prior = idx + 1;
        }
        // and emit the remainder
        hasher.hash(&line[prior..]);

        // and canonical newline
        hasher.hash(b"\r\n");
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.1>
fn canonicalize_header_simple(key: &str, value: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.2>
fn canonicalize_header_relaxed(key: &str, value: &[u8], out: &mut Vec<u8>) {
    let key = key.to_lowercase();
    let key = key.trim_end();

    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b":");

    let value = trim_ws_start(trim_ws_end(value));
    let mut space_run = false;
    for &c in value {
        match c {
            b'\r' | b'\n' => {}
            b' ' | b'\t' => {
                if space_run {
                    continue;
                }
                space_run = true;
                out.push(b' ');
            }
            _ => {
                space_run = false;
                out.push(c);
            }
        }
    }

    out.extend_from_slice(b"\r\n");
}

/// Elide the value of the `b=` tag from a raw `DKIM-Signature` value,
/// keeping the `b=` marker itself. The value extends to the next `;` or to
/// the end of the header. Folded values and whitespace around the tag name
/// or the `=` are tolerated.
///
/// Used when the signature header canonicalizes itself: the signature bytes
/// cannot be part of the data they sign.
pub(crate) fn strip_signature_b_value(raw: &str) -> String {
    fn is_fws(b: u8) -> bool {
        matches!(b, b' ' | b'\t' | b'\r' | b'\n')
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        // whitespace before the tag name
        while i < bytes.len() && is_fws(bytes[i]) {
            out.push(bytes[i]);
            i += 1;
        }

        let name_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
            i += 1;
        }
        let elide = &bytes[name_start..i] == b"b";
        out.extend_from_slice(&bytes[name_start..i]);

        // whitespace between the tag name and "="
        while i < bytes.len() && is_fws(bytes[i]) {
            out.push(bytes[i]);
            i += 1;
        }

        if i < bytes.len() && bytes[i] == b'=' {
            out.push(b'=');
            i += 1;
            while i < bytes.len() && bytes[i] != b';' {
                if !elide {
                    out.push(bytes[i]);
                }
                i += 1;
            }
        } else {
            // no "=": copy the rest of this tag-spec verbatim
            while i < bytes.len() && bytes[i] != b';' {
                out.push(bytes[i]);
                i += 1;
            }
        }

        if i < bytes.len() {
            out.push(b';');
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn trim_ws_start(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.first() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => line = &line[1..],
            _ => break,
        }
    }
    line
}

fn trim_ws_end(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.last() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                line = &line[0..line.len() - 1];
            }
            _ => break,
        }
    }
    line
}
