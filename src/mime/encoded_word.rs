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

//! RFC 2047 "encoded word" decoding for header values.

use std::borrow::Cow;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use super::charset::{CharsetCache, Codec};
use super::header::Header;
use crate::support::error::Error;

lazy_static! {
    // RFC 2047 limits encoded words to 75 characters, but agents produce
    // longer ones and readers such as Thunderbird accept them, so there is no
    // length limit here.
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?\s]*)\?=").unwrap();
}

/// Return a copy of `header` with every value passed through
/// `decode_value`.
pub fn decode_header(
    header: &Header,
    charsets: &CharsetCache,
) -> Result<Header, Error> {
    let mut decoded = Header::new();
    for (name, values) in header {
        for value in values {
            decoded.add(name, decode_value(value, charsets)?);
        }
    }

    Ok(decoded)
}

/// Decode every encoded word in `value`.
///
/// Linear whitespace between two adjacent encoded words is deleted, as RFC
/// 2047 requires. Adjacent words in the same charset have their octets joined
/// before charset decoding, so a multi-byte character split across two words
/// survives. Text outside encoded words is left alone.
///
/// Fails if an encoded word names an unknown charset or its payload is not
/// valid B or Q encoding.
pub fn decode_value<'a>(
    value: &'a str,
    charsets: &CharsetCache,
) -> Result<Cow<'a, str>, Error> {
    let mut out = String::new();
    let mut last_end = 0;
    let mut pending: Option<(Codec, Vec<u8>)> = None;

    for captures in ENCODED_WORD.captures_iter(value) {
        // Groups 1..3 always participate in a match
        let (word, charset, xfer, text) = match (
            captures.get(0),
            captures.get(1),
            captures.get(2),
            captures.get(3),
        ) {
            (Some(w), Some(c), Some(x), Some(t)) => {
                (w, c.as_str(), x.as_str(), t.as_str())
            },
            _ => continue,
        };

        let between = &value[last_end..word.start()];
        last_end = word.end();

        if pending.is_none() || !is_linear_whitespace(between) {
            flush(&mut out, pending.take());
            out.push_str(between);
        }

        // RFC 2231 section 5 allows a language suffix on the charset
        let charset = charset.split('*').next().unwrap_or(charset);
        let codec = charsets.resolve(charset).map_err(|_| {
            Error::HeaderDecode(format!(
                "unknown charset in encoded word {:?}",
                word.as_str()
            ))
        })?;

        let octets = decode_xfer(xfer, text).ok_or_else(|| {
            Error::HeaderDecode(format!(
                "bad payload in encoded word {:?}",
                word.as_str()
            ))
        })?;

        match pending {
            Some((pending_codec, ref mut buf)) if pending_codec == codec => {
                buf.extend_from_slice(&octets);
            },
            _ => {
                flush(&mut out, pending.take());
                pending = Some((codec, octets));
            },
        }
    }

    if 0 == last_end {
        return Ok(Cow::Borrowed(value));
    }

    flush(&mut out, pending);
    out.push_str(&value[last_end..]);
    debug!("Decoded header value {:?} as {:?}", value, out);
    Ok(Cow::Owned(out))
}

fn flush(out: &mut String, pending: Option<(Codec, Vec<u8>)>) {
    if let Some((codec, octets)) = pending {
        out.push_str(&codec.decode(&octets));
    }
}

fn is_linear_whitespace(s: &str) -> bool {
    s.bytes().all(|b| b" \t\r\n".contains(&b))
}

fn decode_xfer(xfer: &str, text: &str) -> Option<Vec<u8>> {
    match xfer {
        "q" | "Q" => q_decode(text),
        "b" | "B" => base64::decode_config(text, base64::STANDARD).ok(),
        _ => None,
    }
}

/// RFC 2047 4.2 "Q" encoding. Unlike body quoted-printable, a malformed
/// escape is an error.
fn q_decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.bytes();
    while let Some(b) = bytes.next() {
        match b {
            // _ stands for ASCII space regardless of charset
            b'_' => out.push(b' '),
            b'=' => {
                let hi = bytes.next().and_then(hex_digit)?;
                let lo = bytes.next().and_then(hex_digit)?;
                out.push(hi << 4 | lo);
            },
            b => out.push(b),
        }
    }

    Some(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn decode(s: &str) -> String {
        decode_value(s, &CharsetCache::new()).unwrap().into_owned()
    }

    #[test]
    fn test_decode_value() {
        assert_matches!(
            Ok(Cow::Borrowed("hello world")),
            decode_value("hello world", &CharsetCache::new())
        );

        // Examples from RFC 2047
        assert_eq!("Keith Moore", decode("=?US-ASCII?Q?Keith_Moore?="));
        assert_eq!(
            "Keld Jørn Simonsen",
            decode("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=")
        );
        assert_eq!("André Pirard", decode("=?ISO-8859-1?Q?Andr=E9?= Pirard"));
        assert_eq!(
            "If you can read this you understand the example.",
            decode(
                "=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=\r\n    \
                 =?ISO-8859-2?B?dSB1bmRlcnN0YW5kIHRoZSBleGFtcGxlLg==?="
            )
        );
        assert_eq!(
            "םולש ןב ילטפנ",
            decode("=?iso-8859-8?b?7eXs+SDv4SDp7Oj08A==?=")
        );
    }

    #[test]
    fn whitespace_between_words() {
        // RFC 2047 section 8
        assert_eq!("(a)", decode("(=?ISO-8859-1?Q?a?=)"));
        assert_eq!("(a b)", decode("(=?ISO-8859-1?Q?a?= b)"));
        assert_eq!("(ab)", decode("(=?ISO-8859-1?Q?a?= =?ISO-8859-1?Q?b?=)"));
        assert_eq!(
            "(ab)",
            decode("(=?ISO-8859-1?Q?a?=  \t  =?ISO-8859-1?Q?b?=)")
        );
        assert_eq!(
            "(ab)",
            decode("(=?ISO-8859-1?Q?a?=\r\n    =?ISO-8859-1?Q?b?=)")
        );
        assert_eq!("(a b)", decode("(=?ISO-8859-1?Q?a_b?=)"));
        assert_eq!(
            "(a b)",
            decode("(=?ISO-8859-1?Q?a?= =?ISO-8859-2?Q?_b?=)")
        );
        assert_eq!("x a", decode("x =?utf-8?q?a?="));
    }

    #[test]
    fn split_multibyte_characters() {
        assert_eq!("é", decode("=?UTF-8?B?ww==?= =?utf-8?B?qQ==?="));
        assert_eq!("café", decode("=?utf-8?q?caf=C3?= =?UTF-8?Q?=A9?="));
    }

    #[test]
    fn language_suffix_ignored() {
        assert_eq!("a", decode("=?US-ASCII*EN?Q?a?="));
    }

    #[test]
    fn malformed_words() {
        let charsets = CharsetCache::new();
        assert_matches!(
            Err(Error::HeaderDecode(_)),
            decode_value("=?x-klingon?Q?foo?=", &charsets)
        );
        assert_matches!(
            Err(Error::HeaderDecode(_)),
            decode_value("=?utf-8?Q?a=ZZ?=", &charsets)
        );
        assert_matches!(
            Err(Error::HeaderDecode(_)),
            decode_value("=?utf-8?Q?a=4?=", &charsets)
        );
        assert_matches!(
            Err(Error::HeaderDecode(_)),
            decode_value("=?utf-8?B?!!!?=", &charsets)
        );
        // Not encoded words at all
        assert_eq!("=?utf-8?X?foo?=", decode("=?utf-8?X?foo?="));
        assert_eq!("=?utf-8?Q?a b?=", decode("=?utf-8?Q?a b?="));
    }

    #[test]
    fn decode_whole_header() {
        let mut header = Header::new();
        header.add("Subject", "=?ISO-8859-1?Q?Andr=E9?=");
        header.add("To", "plain@example.com");
        header.add("Received", "one");
        header.add("Received", "=?utf-8?q?two?=");

        let decoded = decode_header(&header, &CharsetCache::new()).unwrap();
        assert_eq!(Some("André"), decoded.get("Subject"));
        assert_eq!(Some("plain@example.com"), decoded.get("To"));
        assert_eq!(
            &["one".to_owned(), "two".to_owned()],
            decoded.get_all("Received")
        );
    }

    proptest! {
        #[test]
        fn utf8_base64_round_trip(text in any::<String>()) {
            // A leading BOM is stripped by the charset decoder
            prop_assume!(!text.starts_with('\u{FEFF}'));
            let encoded = format!("=?UTF-8?B?{}?=", base64::encode(&text));
            prop_assert_eq!(text, decode(&encoded));
        }

        #[test]
        fn utf8_base64_round_trip_across_words(
            text in any::<String>(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
        ) {
            prop_assume!(!text.starts_with('\u{FEFF}'));
            let bytes = text.as_bytes();
            let mut cuts = cuts
                .iter()
                .map(|cut| cut.index(bytes.len() + 1))
                .collect::<Vec<_>>();
            cuts.push(0);
            cuts.push(bytes.len());
            cuts.sort();
            cuts.dedup();

            let encoded = cuts
                .windows(2)
                .map(|w| {
                    let chunk = &bytes[w[0]..w[1]];
                    format!("=?UTF-8?B?{}?=", base64::encode(chunk))
                })
                .collect::<Vec<_>>()
                .join("\r\n ");
            prop_assert_eq!(text.clone(), decode(&encoded));
        }

        #[test]
        fn decode_value_never_panics(s in r"=\?.*\?.*\?.*\?=.*") {
            let _ = decode_value(&s, &CharsetCache::new());
        }
    }
}
