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

//! Standard UTF-7 decoding, as set by RFC 2152.
//!
//! `encoding_rs` deliberately omits UTF-7, but it is a registered MIME
//! charset and some older agents still emit it.

use std::borrow::Cow;

const SHIFT_IN: u8 = b'+';
const SHIFT_OUT: u8 = b'-';

/// Decode the given bytes from UTF-7.
///
/// This assumes that `s` is a complete unit. RFC 2152 requires encoders to
/// shift out before every line break, so the body transcoder feeds this one
/// line at a time.
///
/// Decoding is extremely permissive. 8-bit bytes are passed through
/// (lossily, if they are not UTF-8). Unnecessary shift sequences are
/// permitted, and the shift-out character is not required at the end of an
/// encoded run.
pub fn decode(s: &[u8]) -> Cow<'_, str> {
    if !s.contains(&SHIFT_IN) {
        return String::from_utf8_lossy(s);
    }

    let mut transformed = String::with_capacity(s.len());
    let mut utf16 = Vec::new();
    let mut rest = s;

    while let Some(start) = memchr::memchr(SHIFT_IN, rest) {
        transformed.push_str(&String::from_utf8_lossy(&rest[..start]));

        let encoded = &rest[start + 1..];
        let base64_end = encoded
            .iter()
            .position(|&ch| !is_base64_char(ch))
            .unwrap_or(encoded.len());
        let absorbs_shift_out = Some(&SHIFT_OUT) == encoded.get(base64_end);

        if 0 == base64_end {
            // Either the "+-" escape for a literal '+' or a stray '+'
            transformed.push('+');
        } else {
            utf16.clear();
            if base64::decode_config_buf(
                &encoded[..base64_end],
                base64::STANDARD_NO_PAD.decode_allow_trailing_bits(true),
                &mut utf16,
            )
            .is_ok()
            {
                let units = utf16
                    .chunks(2)
                    // If there's a spurious trailing byte, drop it
                    .filter(|chunk| 2 == chunk.len())
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect::<Vec<_>>();
                transformed.push_str(&String::from_utf16_lossy(&units));
            } else {
                // Just push the whole thing un-encoded
                transformed.push('+');
                transformed.push_str(&String::from_utf8_lossy(
                    &encoded[..base64_end],
                ));
            }
        }

        rest = if absorbs_shift_out {
            &encoded[base64_end + 1..]
        } else {
            &encoded[base64_end..]
        };
    }

    transformed.push_str(&String::from_utf8_lossy(rest));
    Cow::Owned(transformed)
}

fn is_base64_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || b'+' == ch || b'/' == ch
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn d(s: &str) -> String {
        decode(s.as_bytes()).into_owned()
    }

    #[test]
    fn std_decode() {
        assert_eq!("hello world", d("hello world"));
        assert_eq!("~peter\\lost+found", d("+AH4-peter+AFw-lost+-found"));
        // Examples from RFC 2152
        assert_eq!("Hi Mom ☺!", d("Hi Mom +Jjo-!"));
        assert_eq!("日本語", d("+ZeVnLIqe-"));
        assert_eq!("A≢Α.", d("A+ImIDkQ."));
        assert_eq!("Item 3 is £1.", d("Item 3 is +AKM-1."));
        // Misc
        assert_eq!("\x00𐀀￠¡¡", d("+AADYANwA/+AAoQCh-"));
    }

    #[test]
    fn decode_pathological() {
        assert_eq!("hello+", d("hello+"));
        assert_eq!("hello+.", d("hello+."));
        assert_eq!("hello+ä", d("hello+ä"));
        assert_eq!("hello~", d("hello+AH4"));
        assert_eq!("a-b", d("a-b"));
        assert_eq!("\u{FFFD}æ", decode(b"\xFF+AOY-"));
    }

    proptest! {
        #[test]
        fn decoding_never_fails(s in prop::collection::vec(any::<u8>(), 0..40)) {
            decode(&s);
        }
    }
}
