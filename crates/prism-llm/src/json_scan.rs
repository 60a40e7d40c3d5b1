//! Structural JSON scanning over byte slices
//!
//! Finds top-level fields of an object without building a document. The
//! input may be a truncated prefix of a larger body: fields that end before
//! the cut are still found.

use std::ops::Range;

#[inline]
fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while let Some(b' ' | b'\n' | b'\r' | b'\t') = bytes.get(i) {
        i += 1;
    }
    i
}

/// End of the string starting at `start`, one past the closing quote
#[inline]
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    if bytes.get(start) != Some(&b'"') {
        return None;
    }
    let mut i = start + 1;
    loop {
        match *bytes.get(i)? {
            b'"' => return Some(i + 1),
            b'\\' => i += 2,
            0x00..=0x1F => return None,
            _ => i += 1,
        }
    }
}

/// End of the value starting at or after `start`
fn value_end(bytes: &[u8], start: usize) -> Option<usize> {
    let i = skip_ws(bytes, start);
    match *bytes.get(i)? {
        b'"' => string_end(bytes, i),
        b'{' => container_end(bytes, i, b'}', true),
        b'[' => container_end(bytes, i, b']', false),
        b't' => literal_end(bytes, i, b"true"),
        b'f' => literal_end(bytes, i, b"false"),
        b'n' => literal_end(bytes, i, b"null"),
        b'-' | b'0'..=b'9' => number_end(bytes, i),
        _ => None,
    }
}

fn container_end(bytes: &[u8], start: usize, close: u8, keyed: bool) -> Option<usize> {
    let mut i = skip_ws(bytes, start + 1);
    if *bytes.get(i)? == close {
        return Some(i + 1);
    }

    loop {
        if keyed {
            i = string_end(bytes, skip_ws(bytes, i))?;
            i = skip_ws(bytes, i);
            if *bytes.get(i)? != b':' {
                return None;
            }
            i += 1;
        }
        i = skip_ws(bytes, value_end(bytes, i)?);
        match *bytes.get(i)? {
            b',' => i += 1,
            b if b == close => return Some(i + 1),
            _ => return None,
        }
    }
}

fn literal_end(bytes: &[u8], start: usize, literal: &[u8]) -> Option<usize> {
    let end = start.checked_add(literal.len())?;
    (bytes.get(start..end)? == literal).then_some(end)
}

/// Numbers may legitimately end at the end of input, so a number cut by
/// truncation is indistinguishable from a short one. Callers only trust
/// values followed by a delimiter.
fn number_end(bytes: &[u8], start: usize) -> Option<usize> {
    let digits = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut i = start;
    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }
    match *bytes.get(i)? {
        b'0' => i += 1,
        b'1'..=b'9' => i = digits(i + 1),
        _ => return None,
    }
    if bytes.get(i) == Some(&b'.') {
        let end = digits(i + 1);
        if end == i + 1 {
            return None;
        }
        i = end;
    }
    if let Some(b'e' | b'E') = bytes.get(i) {
        i += 1;
        if let Some(b'+' | b'-') = bytes.get(i) {
            i += 1;
        }
        let end = digits(i);
        if end == i {
            return None;
        }
        i = end;
    }
    Some(i)
}

/// Byte ranges of the requested top-level fields, in document order
///
/// Scanning stops at the first malformed or truncated member. A value is
/// only reported once the byte after it has been seen, so a number cut in
/// half by truncation is never reported.
pub fn top_level_fields<'a>(bytes: &[u8], names: &[&'a str]) -> Vec<(&'a str, Range<usize>)> {
    let mut found = Vec::new();

    let mut i = skip_ws(bytes, 0);
    if bytes.get(i) != Some(&b'{') {
        return found;
    }
    i += 1;

    loop {
        i = skip_ws(bytes, i);
        if bytes.get(i) != Some(&b'"') {
            return found;
        }
        let Some(key_end) = string_end(bytes, i) else {
            return found;
        };
        let key = &bytes[i + 1..key_end - 1];

        i = skip_ws(bytes, key_end);
        if bytes.get(i) != Some(&b':') {
            return found;
        }
        let value_start = skip_ws(bytes, i + 1);
        let Some(end) = value_end(bytes, value_start) else {
            return found;
        };

        i = skip_ws(bytes, end);
        let Some(&next) = bytes.get(i) else {
            return found;
        };

        if let Some(name) = names.iter().find(|name| name.as_bytes() == key) {
            found.push((*name, value_start..end));
        }

        match next {
            b',' => i += 1,
            _ => return found,
        }
    }
}

/// Range of the last complete top-level `name` value
pub fn top_level_field(bytes: &[u8], name: &str) -> Option<Range<usize>> {
    top_level_fields(bytes, &[name]).pop().map(|(_, range)| range)
}
