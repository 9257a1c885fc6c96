//! Byte-buffer primitives used by the operators: locating separators,
//! splicing a range, and rewriting the spans between regex matches.

use regex::bytes::Regex;

/// Offset just past the `n`-th occurrence of `separator` in `buffer`.
///
/// The 0th occurrence is taken to end at offset 0, so with a newline
/// separator `n` addresses the start of line `n`. Returns `None` when the
/// buffer holds fewer than `n` occurrences.
pub fn nth_separator_offset(buffer: &[u8], separator: &[u8], n: usize) -> Option<usize> {
    if n == 0 {
        return Some(0);
    }
    if separator.is_empty() {
        return None;
    }

    let mut seen = 0;
    let mut pos = 0;
    while pos + separator.len() <= buffer.len() {
        if &buffer[pos..pos + separator.len()] == separator {
            seen += 1;
            pos += separator.len();
            if seen == n {
                return Some(pos);
            }
        } else {
            pos += 1;
        }
    }
    None
}

/// Return `buffer[..start] + replacement + buffer[end..]` as a new buffer.
///
/// Callers guarantee `start <= end <= buffer.len()`.
pub fn splice_range(buffer: &[u8], start: usize, end: usize, replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.len() - (end - start) + replacement.len());
    out.extend_from_slice(&buffer[..start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&buffer[end..]);
    out
}

/// Pass every span of `buffer` not covered by a match of `pattern` through
/// `transform`, copying the matches themselves verbatim.
///
/// Empty complement spans are never handed to `transform`: a match at offset
/// 0 contributes no leading span, adjacent matches contribute nothing between
/// them, and the trailing span is only transformed when the last match ends
/// before the end of the buffer.
pub fn partition_by_complement<E>(
    pattern: &Regex,
    buffer: &[u8],
    mut transform: impl FnMut(&[u8]) -> Result<Vec<u8>, E>,
) -> Result<Vec<u8>, E> {
    let mut out = Vec::with_capacity(buffer.len());
    let mut last = 0;

    for m in pattern.find_iter(buffer) {
        if m.start() > last {
            out.extend(transform(&buffer[last..m.start()])?);
        }
        out.extend_from_slice(m.as_bytes());
        last = m.end();
    }

    if last != buffer.len() {
        out.extend(transform(&buffer[last..])?);
    }

    Ok(out)
}
