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

//! Charset resolution and streaming transcoding into UTF-8.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

use encoding_rs::Encoding;
use log::debug;

use super::utf7;
use crate::support::buffer::{read_chunk, Staged};
use crate::support::error::Error;

/// A text codec which a charset name resolved to.
#[derive(Clone, Copy)]
pub enum Codec {
    Encoding(&'static Encoding),
    /// RFC 2152 UTF-7, which `encoding_rs` doesn't do.
    Utf7,
}

impl PartialEq for Codec {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Codec::Encoding(a), Codec::Encoding(b)) => std::ptr::eq(a, b),
            (Codec::Utf7, Codec::Utf7) => true,
            _ => false,
        }
    }
}

impl Eq for Codec {}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Codec({})", self.name())
    }
}

impl Codec {
    /// The canonical name of this codec.
    pub fn name(self) -> &'static str {
        match self {
            Codec::Encoding(e) => e.name(),
            Codec::Utf7 => "UTF-7",
        }
    }

    /// Decode a complete in-memory buffer.
    ///
    /// Malformed sequences become U+FFFD; a leading BOM is removed.
    pub fn decode(self, content: &[u8]) -> Cow<'_, str> {
        match self {
            Codec::Encoding(e) => e.decode_with_bom_removal(content).0,
            Codec::Utf7 => utf7::decode(content),
        }
    }

    /// Wrap `inner` in a reader which produces UTF-8 lazily.
    pub fn transcode<R: Read>(self, inner: R) -> TranscodeReader<R> {
        TranscodeReader {
            inner,
            decoder: match self {
                // BOM sniffing: a BOM can legitimately override the label,
                // e.g. "UTF-16" text in little-endian order.
                Codec::Encoding(e) => Decoder::Encoding(e.new_decoder()),
                Codec::Utf7 => Decoder::Utf7,
            },
            input: Vec::new(),
            staged: Staged::default(),
            eof: false,
        }
    }
}

/// Memoised charset name resolution.
///
/// Entries are keyed by the trimmed, lower-cased name and live as long as
/// the cache; a name never resolves differently later on.
///
/// This uses a `RefCell`, so a cache can't be shared between threads. Each
/// thread that decodes mail needs its own.
#[derive(Debug, Default)]
pub struct CharsetCache {
    entries: RefCell<HashMap<String, Codec>>,
}

impl CharsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` to a codec.
    ///
    /// The IANA/MIME registry is consulted first, then the (much larger)
    /// WHATWG label registry that browsers use.
    pub fn resolve(&self, name: &str) -> Result<Codec, Error> {
        let key = name.trim().to_ascii_lowercase();
        if let Some(&codec) = self.entries.borrow().get(&key) {
            return Ok(codec);
        }

        let codec = if let Some(codec) = mime_registry(&key) {
            debug!("Charset {:?} is MIME {}", name, codec.name());
            codec
        } else if let Some(encoding) =
            // The "replacement" encoding would turn the whole body into a
            // single U+FFFD, which is no better than failing.
            Encoding::for_label_no_replacement(key.as_bytes())
        {
            debug!("Charset {:?} is web label for {}", name, encoding.name());
            Codec::Encoding(encoding)
        } else {
            return Err(Error::UnknownCharset(name.to_owned()));
        };

        self.entries.borrow_mut().insert(key, codec);
        Ok(codec)
    }

    /// Resolve `name` and wrap `input` in a transcoder from that charset into
    /// UTF-8.
    pub fn decode_stream<R: Read>(
        &self,
        name: &str,
        input: R,
    ) -> Result<TranscodeReader<R>, Error> {
        self.resolve(name).map(|codec| codec.transcode(input))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Look `name` up among the charset names registered with IANA for MIME
/// use, including the registered aliases.
///
/// `encoding_rs` has no true ISO-8859-1 or US-ASCII; windows-1252 is a
/// superset of both for all printable characters, so they map there, as they
/// would in a browser. The one visible difference is 0x80-0x9F: these decode
/// to the windows-1252 characters (0x80 is `€`) rather than to the C1
/// control characters a strict ISO-8859-1 decoder would produce.
fn mime_registry(name: &str) -> Option<Codec> {
    use encoding_rs::*;

    let encoding = match name {
        "utf-7" | "csutf7" | "unicode-1-1-utf-7" | "csunicode11utf7" => {
            return Some(Codec::Utf7);
        },

        "utf-8" | "csutf8" => UTF_8,
        // RFC 2781: big-endian unless a BOM says otherwise
        "utf-16" | "csutf16" | "utf-16be" | "csutf16be" => UTF_16BE,
        "utf-16le" | "csutf16le" => UTF_16LE,

        "us-ascii" | "iso-ir-6" | "ansi_x3.4-1968" | "ansi_x3.4-1986"
        | "iso_646.irv:1991" | "iso646-us" | "us" | "ibm367" | "cp367"
        | "csascii" | "iso-8859-1" | "iso_8859-1" | "iso_8859-1:1987"
        | "iso-ir-100" | "latin1" | "l1" | "ibm819" | "cp819"
        | "csisolatin1" => WINDOWS_1252,
        "iso-8859-2" | "iso_8859-2" | "iso_8859-2:1987" | "iso-ir-101"
        | "latin2" | "l2" | "csisolatin2" => ISO_8859_2,
        "iso-8859-3" | "iso_8859-3" | "iso_8859-3:1988" | "iso-ir-109"
        | "latin3" | "l3" | "csisolatin3" => ISO_8859_3,
        "iso-8859-4" | "iso_8859-4" | "iso_8859-4:1988" | "iso-ir-110"
        | "latin4" | "l4" | "csisolatin4" => ISO_8859_4,
        "iso-8859-5" | "iso_8859-5" | "iso_8859-5:1988" | "iso-ir-144"
        | "cyrillic" | "csisolatincyrillic" => ISO_8859_5,
        "iso-8859-6" | "iso_8859-6" | "iso_8859-6:1987" | "iso-ir-127"
        | "ecma-114" | "asmo-708" | "arabic" | "csisolatinarabic" => {
            ISO_8859_6
        },
        "iso-8859-7" | "iso_8859-7" | "iso_8859-7:1987" | "iso-ir-126"
        | "elot_928" | "ecma-118" | "greek" | "greek8"
        | "csisolatingreek" => ISO_8859_7,
        "iso-8859-8" | "iso_8859-8" | "iso_8859-8:1988" | "iso-ir-138"
        | "hebrew" | "csisolatinhebrew" => ISO_8859_8,
        "iso-8859-8-i" | "csiso88598i" => ISO_8859_8_I,
        "iso-8859-9" | "iso_8859-9" | "iso_8859-9:1989" | "iso-ir-148"
        | "latin5" | "l5" | "csisolatin5" => WINDOWS_1254,
        "iso-8859-10" | "iso-ir-157" | "latin6" | "l6" | "csisolatin6" => {
            ISO_8859_10
        },
        "iso-8859-13" | "csiso885913" => ISO_8859_13,
        "iso-8859-14" | "iso_8859-14" | "iso_8859-14:1998" | "iso-ir-199"
        | "latin8" | "iso-celtic" | "l8" | "csiso885914" => ISO_8859_14,
        "iso-8859-15" | "iso_8859-15" | "latin-9" | "csiso885915" => {
            ISO_8859_15
        },
        "iso-8859-16" | "iso_8859-16" | "iso_8859-16:2001" | "iso-ir-226"
        | "latin10" | "l10" | "csiso885916" => ISO_8859_16,

        "koi8-r" | "cskoi8r" => KOI8_R,
        "koi8-u" | "cskoi8u" => KOI8_U,
        "ibm866" | "cp866" | "866" | "csibm866" => IBM866,
        "macintosh" | "mac" | "csmacintosh" => MACINTOSH,
        "tis-620" | "cstis620" | "windows-874" | "cswindows874" => WINDOWS_874,

        "windows-1250" | "cswindows1250" => WINDOWS_1250,
        "windows-1251" | "cswindows1251" => WINDOWS_1251,
        "windows-1252" | "cswindows1252" => WINDOWS_1252,
        "windows-1253" | "cswindows1253" => WINDOWS_1253,
        "windows-1254" | "cswindows1254" => WINDOWS_1254,
        "windows-1255" | "cswindows1255" => WINDOWS_1255,
        "windows-1256" | "cswindows1256" => WINDOWS_1256,
        "windows-1257" | "cswindows1257" => WINDOWS_1257,
        "windows-1258" | "cswindows1258" => WINDOWS_1258,

        "shift_jis" | "ms_kanji" | "csshiftjis" | "windows-31j"
        | "cswindows31j" => SHIFT_JIS,
        "euc-jp" | "extended_unix_code_packed_format_for_japanese"
        | "cseucpkdfmtjapanese" => EUC_JP,
        "iso-2022-jp" | "csiso2022jp" => ISO_2022_JP,
        "euc-kr" | "cseuckr" | "ks_c_5601-1987" | "iso-ir-149"
        | "ks_c_5601-1989" | "ksc_5601" | "korean" | "csksc56011987" => EUC_KR,
        "gb2312" | "csgb2312" | "gbk" | "cp936" | "ms936" | "windows-936"
        | "csgbk" => GBK,
        "gb18030" | "csgb18030" => GB18030,
        "big5" | "csbig5" | "big5-hkscs" | "csbig5hkscs" => BIG5,

        _ => return None,
    };

    Some(Codec::Encoding(encoding))
}

enum Decoder {
    Encoding(encoding_rs::Decoder),
    Utf7,
}

/// Streaming transcoder into UTF-8, created by `Codec::transcode()`.
pub struct TranscodeReader<R> {
    inner: R,
    decoder: Decoder,
    /// Raw input not yet decoded. Only UTF-7 carries anything over between
    /// chunks; `encoding_rs` keeps partial sequences internally.
    input: Vec<u8>,
    staged: Staged,
    eof: bool,
}

/// UTF-7 input without a line break is decoded anyway once this large.
const MAX_UTF7_LINE: usize = 65536;

impl<R: Read> Read for TranscodeReader<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        while self.staged.is_empty() {
            if self.eof {
                return Ok(0);
            }

            self.fill()?;
        }

        Ok(self.staged.drain_into(dst))
    }
}

impl<R: Read> TranscodeReader<R> {
    fn fill(&mut self) -> io::Result<()> {
        if let Decoder::Encoding(..) = self.decoder {
            self.input.clear();
        }

        let nread = read_chunk(&mut self.inner, &mut self.input)?;
        self.eof = 0 == nread;

        match self.decoder {
            Decoder::Encoding(ref mut decoder) => {
                let out = self.staged.refill();
                let max_len = decoder
                    .max_utf8_buffer_length(self.input.len())
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::Other,
                            "Chunk too large to transcode",
                        )
                    })?;
                out.resize(max_len, 0);
                let (status, _nread, nwritten, _wrote_replacement) =
                    decoder.decode_to_utf8(&self.input, out, self.eof);
                debug_assert_eq!(encoding_rs::CoderResult::InputEmpty, status);
                out.truncate(nwritten);
            },

            Decoder::Utf7 => {
                let usable_len = if self.eof
                    || self.input.len() > MAX_UTF7_LINE
                {
                    self.input.len()
                } else {
                    memchr::memrchr(b'\n', &self.input).map_or(0, |lf| lf + 1)
                };

                let out = self.staged.refill();
                out.extend_from_slice(
                    utf7::decode(&self.input[..usable_len]).as_bytes(),
                );
                self.input.drain(..usable_len);
            },
        }

        Ok(())
    }
}
