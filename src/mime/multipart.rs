//-
// Copyright (c) 2020, 2023, Jason Lingle
//
// This file is part of Maildecode.
//
// Maildecode is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published  by the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Maildecode is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Maildecode. If not, see <http://www.gnu.org/licenses/>.

//! Framing of multipart bodies (RFC 2046 section 5.1.1).
//!
//! The body has already been read into memory; these functions only find the
//! delimiter lines within it.

use std::ops::Range;

/// One body part of a multipart, still raw: header block then content.
///
/// This is the range of the part within the multipart body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPart {
    pub range: Range<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Delimiter {
    /// Offset of the line ending before the delimiter, which is not part of
    /// the preceding content.
    start: usize,
    /// Offset just past the delimiter line, including its line ending.
    end: usize,
    close: bool,
}

/// Return everything before the first delimiter line, verbatim.
///
/// If there is no delimiter at all, the whole body is the preamble. An empty
/// body has no preamble.
pub fn split_preamble<'a>(raw: &'a [u8], boundary: &str) -> Option<&'a [u8]> {
    if raw.is_empty() {
        return None;
    }

    match next_delimiter(raw, boundary.as_bytes(), 0) {
        Some(delim) => Some(&raw[..delim.start]),
        None => Some(raw),
    }
}

/// Split `raw` into the parts between delimiter lines.
///
/// Iteration stops at the close delimiter, discarding the epilogue. If the
/// close delimiter is missing, the last part runs to the end of the body.
pub fn split_parts(raw: &[u8], boundary: &str) -> Vec<RawPart> {
    let boundary = boundary.as_bytes();
    let mut parts = Vec::new();

    let mut delim = match next_delimiter(raw, boundary, 0) {
        Some(delim) => delim,
        None => return parts,
    };

    while !delim.close {
        match next_delimiter(raw, boundary, delim.end) {
            Some(next) => {
                parts.push(RawPart {
                    range: delim.end..next.start,
                });
                delim = next;
            },
            None => {
                parts.push(RawPart {
                    range: delim.end..raw.len(),
                });
                break;
            },
        }
    }

    parts
}

/// Find the first delimiter line starting at or after `from`, which must
/// itself be the start of a line.
fn next_delimiter(
    raw: &[u8],
    boundary: &[u8],
    from: usize,
) -> Option<Delimiter> {
    let mut line_start = from;
    loop {
        if let Some(end) = delimiter_line_end(&raw[line_start..], boundary) {
            let start = if line_start > from && b'\n' == raw[line_start - 1] {
                if line_start - 1 > from && b'\r' == raw[line_start - 2] {
                    line_start - 2
                } else {
                    line_start - 1
                }
            } else {
                line_start
            };

            return Some(Delimiter {
                start,
                end: line_start + end.0,
                close: end.1,
            });
        }

        line_start += memchr::memchr(b'\n', &raw[line_start..])? + 1;
    }
}

/// If `line` starts with a delimiter line for `boundary`, return the length
/// of that line (including its line ending) and whether it is the close
/// delimiter.
fn delimiter_line_end(line: &[u8], boundary: &[u8]) -> Option<(usize, bool)> {
    let rest = line.strip_prefix(b"--")?.strip_prefix(boundary)?;
    let (rest, close) = match rest.strip_prefix(b"--") {
        Some(rest) => (rest, true),
        None => (rest, false),
    };

    // Transport padding
    let padding = rest
        .iter()
        .position(|&b| b' ' != b && b'\t' != b)
        .unwrap_or(rest.len());
    let rest = &rest[padding..];

    let line_ending = if rest.is_empty() {
        0
    } else if rest.starts_with(b"\r\n") {
        2
    } else if rest.starts_with(b"\n") {
        1
    } else {
        return None;
    };

    Some((line.len() - rest.len() + line_ending, close))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::header::read_header;

    fn contents<'a>(raw: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
        split_parts(raw, boundary)
            .into_iter()
            .map(|p| &raw[p.range])
            .collect()
    }

    #[test]
    fn preamble_and_single_part() {
        let raw =
            b"Preamble text\r\n--B\r\nheader\r\n\r\npart body\r\n--B--\r\n";
        assert_eq!(Some(&b"Preamble text"[..]), split_preamble(raw, "B"));

        let parts = contents(raw, "B");
        assert_eq!(1, parts.len());
        let mut body = parts[0];
        let header = read_header(&mut body).unwrap();
        assert!(header.is_empty());
        assert_eq!(b"part body", body);
    }

    #[test]
    fn preamble_edge_cases() {
        assert_eq!(None, split_preamble(b"", "B"));
        assert_eq!(
            Some(&b"no delimiters\r\n--Bx\r\n"[..]),
            split_preamble(b"no delimiters\r\n--Bx\r\n", "B")
        );
        assert_eq!(Some(&b""[..]), split_preamble(b"--B\r\n\r\nx", "B"));
        assert_eq!(Some(&b"unix"[..]), split_preamble(b"unix\n--B\n", "B"));
        assert_eq!(
            Some(&b"not at --B line start"[..]),
            split_preamble(b"not at --B line start\r\n--B--", "B")
        );
    }

    #[test]
    fn several_parts() {
        let raw = b"--frontier\r\n\
                    Content-Type: text/plain\r\n\
                    \r\n\
                    one\r\n\
                    --frontier \t\r\n\
                    \r\n\
                    two\r\n\
                    \r\n\
                    --frontier--\r\n\
                    epilogue\r\n\
                    --frontier\r\n\
                    \r\n\
                    not a part\r\n";

        assert_eq!(
            vec![
                &b"Content-Type: text/plain\r\n\r\none"[..],
                &b"\r\ntwo\r\n"[..],
            ],
            contents(raw, "frontier")
        );
    }

    #[test]
    fn unix_line_endings() {
        let raw = b"pre\n--B\nA: b\n\nbody\n--B\n\nbody 2\n--B--\n";
        assert_eq!(
            vec![&b"A: b\n\nbody"[..], &b"\nbody 2"[..]],
            contents(raw, "B")
        );
    }

    #[test]
    fn missing_close_delimiter() {
        let raw = b"--B\r\n\r\none\r\n--B\r\n\r\ntwo\r\n";
        assert_eq!(
            vec![&b"\r\none"[..], &b"\r\ntwo\r\n"[..]],
            contents(raw, "B")
        );
    }

    #[test]
    fn degenerate_framing() {
        assert!(contents(b"no delimiters at all", "B").is_empty());
        assert!(contents(b"--B--\r\n--B\r\n\r\nx", "B").is_empty());
        assert_eq!(
            vec![&b""[..], &b"\r\nx"[..]],
            contents(b"--B\r\n--B\r\n\r\nx\r\n--B--", "B")
        );
        // Boundaries are matched exactly, not by prefix
        assert_eq!(
            vec![&b"--BB\r\nx"[..]],
            contents(b"--B\r\n--BB\r\nx\r\n--B--", "B")
        );
    }
}
