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

use std::borrow::Cow;

/// Decodes quoted-printable encoding, as described by RFC 2045.
///
/// Encoded bytes and soft line endings are both handled, the latter by
/// discarding. UNIX line endings are handled as well as DOS line endings.
///
/// This never fails. Invalid sequences are passed through untransformed.
/// Certain restrictions, such as not having trailing whitespace on a line, are
/// not enforced, and are passed through. 8-bit characters are passed through,
/// including invalid UTF-8.
///
/// Returns the decoded text, as well as a possible "dangling" slice, which
/// represents a QP escape sequence that is not yet complete. The dangling
/// slice is not part of the decoded text; the caller is expected to prepend
/// it to the next input, or emit it verbatim at the end of input.
pub fn qp_decode(s: &[u8]) -> (Cow<'_, [u8]>, &[u8]) {
    let mut ix = match memchr::memchr(b'=', s) {
        None => return (Cow::Borrowed(s), &[]),
        Some(ix) => ix,
    };

    let mut transformed = Vec::with_capacity(s.len());
    transformed.extend_from_slice(&s[..ix]);

    while ix < s.len() {
        // Invariant: s[ix] is an '='
        match &s[ix + 1..] {
            [] | [b'\r'] => return (Cow::Owned(transformed), &s[ix..]),
            [hi] if hi.is_ascii_hexdigit() => {
                return (Cow::Owned(transformed), &s[ix..]);
            },
            // Soft line break with UNIX ending, discard
            [b'\n', ..] => ix += 2,
            // Soft line break with DOS ending, discard
            [b'\r', b'\n', ..] => ix += 3,
            [hi, lo, ..]
                if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() =>
            {
                transformed.push(hex_value(*hi) << 4 | hex_value(*lo));
                ix += 3;
            },
            // Invalid encoding, keep the '=' verbatim
            _ => {
                transformed.push(b'=');
                ix += 1;
            },
        }

        let next =
            memchr::memchr(b'=', &s[ix..]).map_or(s.len(), |n| ix + n);
        transformed.extend_from_slice(&s[ix..next]);
        ix = next;
    }

    (Cow::Owned(transformed), &[])
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_qp(expected: &[u8], expected_dangling: &[u8], input: &[u8]) {
        let (actual, actual_dangling) = qp_decode(input);
        assert_eq!(expected, &actual[..]);
        assert_eq!(expected_dangling, actual_dangling);
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"", b"hello world");
        assert_qp(b"\xabfoo", b"", b"=ABfoo");
        assert_qp(b"fo\xabo", b"", b"fo=abo");
        assert_qp(b"foo\xab", b"", b"foo=AB");

        assert_qp(b"foo\xab\xcd", b"", b"foo=AB=CD");
        assert_qp(b"foo\xabbar\xcd", b"", b"foo=ABbar=CD");

        assert_qp(b"foo", b"", b"foo=\n");
        assert_qp(b"foobar", b"", b"foo=\nbar");
        assert_qp(b"foo", b"", b"foo=\r\n");
        assert_qp(b"foobar", b"", b"foo=\r\nbar");

        assert_qp(b"foo=()bar", b"", b"foo=()bar");
        assert_qp(b"foo=\xabbar", b"", b"foo==ABbar");
        assert_qp(b"foo=A\xabbar", b"", b"foo=A=ABbar");
        assert_qp("foo=ゑbar".as_bytes(), b"", "foo=ゑbar".as_bytes());
        assert_qp(b"foo=\x80\x80bar", b"", b"foo=\x80\x80bar");

        assert_qp(b"foo", b"=", b"foo=");
        assert_qp(b"foo", b"=A", b"foo=A");
        assert_qp(b"foo", b"=\r", b"foo=\r");
        assert_qp(b"", b"=", b"=");
        assert_qp(b"", b"=4", b"=4");
    }

    #[test]
    fn dangling_can_be_resumed() {
        let (head, dangling) = qp_decode(b"caf=C");
        let mut resumed = dangling.to_vec();
        resumed.extend_from_slice(b"3=A9!");
        let (tail, dangling) = qp_decode(&resumed);

        assert_eq!(b"caf", &head[..]);
        assert_eq!("é!".as_bytes(), &tail[..]);
        assert!(dangling.is_empty());
    }

    proptest! {
        #[test]
        fn qp_decode_never_fails_for_str(s in ".*") {
            qp_decode(s.as_bytes());
        }

        #[test]
        fn qp_decode_never_fails_for_bytes(
            s in prop::collection::vec(prop::num::u8::ANY, 0..20)
        ) {
            qp_decode(&s);
        }
    }
}
