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

//! Removal of `Content-Transfer-Encoding` and charset normalisation for
//! message bodies.
//!
//! Both are applied as `Read` adapters stacked on the body stream, so nothing
//! is decoded until the consumer actually reads it. Malformed transfer
//! encoding therefore surfaces as an `io::Error` of kind `InvalidData` from
//! `read()` rather than from the functions here.

use std::io::{self, BufRead, BufReader, Read};

use log::debug;

use super::charset::CharsetCache;
use super::header::{Header, MediaType};
use super::quoted_printable::qp_decode;
use crate::support::buffer::{read_chunk, Staged, CHUNK_SIZE};
use crate::support::error::Error;

/// A body stream, owned by whatever stage wraps it next.
pub type Body<'a> = Box<dyn Read + 'a>;

/// The RFC 2045 transfer encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentTransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
}

impl ContentTransferEncoding {
    /// Parse a header value, ignoring case and surrounding whitespace.
    ///
    /// Returns `None` for unknown encodings.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("7bit") {
            Some(ContentTransferEncoding::SevenBit)
        } else if value.eq_ignore_ascii_case("8bit") {
            Some(ContentTransferEncoding::EightBit)
        } else if value.eq_ignore_ascii_case("binary") {
            Some(ContentTransferEncoding::Binary)
        } else if value.eq_ignore_ascii_case("quoted-printable") {
            Some(ContentTransferEncoding::QuotedPrintable)
        } else if value.eq_ignore_ascii_case("base64") {
            Some(ContentTransferEncoding::Base64)
        } else {
            None
        }
    }
}

/// Wrap `body` in a decoder for its `Content-Transfer-Encoding`.
///
/// For base64 and quoted-printable, the header field is removed since it no
/// longer describes the body. Identity and unknown encodings leave both the
/// header and the body alone.
pub fn unwrap_transfer_encoding<'a>(
    header: &mut Header,
    body: Body<'a>,
) -> Body<'a> {
    use self::ContentTransferEncoding as CTE;

    let cte = header
        .get("Content-Transfer-Encoding")
        .and_then(ContentTransferEncoding::parse);

    match cte {
        Some(CTE::Base64) => {
            debug!("Decoding base64 body");
            header.remove("Content-Transfer-Encoding");
            Box::new(Base64Decoder::new(body))
        },
        Some(CTE::QuotedPrintable) => {
            debug!("Decoding quoted-printable body");
            header.remove("Content-Transfer-Encoding");
            Box::new(QpDecoder::new(BufReader::new(body)))
        },
        _ => body,
    }
}

/// For `text/*` bodies with a `charset` parameter, transcode the body into
/// UTF-8 and rewrite the `Content-Type` field to say so.
///
/// All other parameters of the media type are preserved in order. Bodies of
/// other types, and text without a charset, pass through untouched.
pub fn normalise_charset<'a>(
    header: &mut Header,
    media_type: &MediaType,
    body: Body<'a>,
    charsets: &CharsetCache,
) -> Result<Body<'a>, Error> {
    if !media_type.is_type("text") {
        return Ok(body);
    }

    let charset = match media_type.parm("charset").map(str::trim) {
        Some(charset) if !charset.is_empty() => charset,
        _ => return Ok(body),
    };

    let transcoded = charsets.decode_stream(charset, body)?;

    let mut media_type = media_type.clone();
    media_type.set_parm("charset", "utf-8");
    debug!("Transcoding {} body to UTF-8", charset);
    header.set("Content-Type", media_type.to_string());

    Ok(Box::new(transcoded))
}

fn invalid_data(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Streaming base64 decoder.
///
/// Whitespace (including line breaks) is skipped anywhere. Bytes outside the
/// base64 alphabet, data following padding, and input which doesn't end on a
/// whole quantum are all errors.
pub struct Base64Decoder<R> {
    inner: R,
    input: Vec<u8>,
    /// Alphabet characters not yet decoded; always fewer than 4 between
    /// fills.
    quantum: Vec<u8>,
    staged: Staged,
    padded: bool,
    eof: bool,
}

impl<R: Read> Base64Decoder<R> {
    pub fn new(inner: R) -> Self {
        Base64Decoder {
            inner,
            input: Vec::with_capacity(CHUNK_SIZE),
            quantum: Vec::with_capacity(CHUNK_SIZE),
            staged: Staged::default(),
            padded: false,
            eof: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        self.input.clear();
        self.eof = 0 == read_chunk(&mut self.inner, &mut self.input)?;

        for &byte in &self.input {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' | b'\x0B' | b'\x0C' => (),
                b'=' => {
                    self.padded = true;
                    self.quantum.push(byte);
                },
                b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'+' | b'/' => {
                    if self.padded {
                        return Err(invalid_data("base64 data after padding"));
                    }
                    self.quantum.push(byte);
                },
                _ => return Err(invalid_data("invalid byte in base64 body")),
            }
        }

        let usable_len = self.quantum.len() / 4 * 4;
        if self.eof && usable_len != self.quantum.len() {
            return Err(invalid_data("truncated base64 body"));
        }

        base64::decode_config_buf(
            &self.quantum[..usable_len],
            base64::STANDARD,
            self.staged.refill(),
        )
        .map_err(|_| invalid_data("malformed base64 body"))?;
        self.quantum.drain(..usable_len);

        Ok(())
    }
}

impl<R: Read> Read for Base64Decoder<R> {
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

/// Streaming quoted-printable decoder.
///
/// Works a line at a time. Trailing spaces and tabs are deleted from each
/// line (RFC 2045 section 6.7 rule 3), so a soft line break may be followed
/// by whitespace. An escape cut off by a line longer than `CHUNK_SIZE` is
/// carried over to the next fill; one cut off by EOF is emitted verbatim.
pub struct QpDecoder<R> {
    inner: R,
    line: Vec<u8>,
    staged: Staged,
    eof: bool,
}

impl<R: BufRead> QpDecoder<R> {
    pub fn new(inner: R) -> Self {
        QpDecoder {
            inner,
            line: Vec::new(),
            staged: Staged::default(),
            eof: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let nread = (&mut self.inner)
            .take(CHUNK_SIZE as u64)
            .read_until(b'\n', &mut self.line)?;
        self.eof = 0 == nread;

        let line_end = if self.line.ends_with(b"\r\n") {
            self.line.len() - 2
        } else if self.line.ends_with(b"\n") {
            self.line.len() - 1
        } else {
            self.line.len()
        };
        let content_end = self.line[..line_end]
            .iter()
            .rposition(|&b| b' ' != b && b'\t' != b)
            .map_or(0, |ix| ix + 1);

        // Whitespace at the end of a partial line is held back until we know
        // whether the line ends there.
        let complete = self.eof || line_end < self.line.len();
        let decode_end = if complete {
            self.line.drain(content_end..line_end);
            self.line.len()
        } else {
            content_end
        };

        let out = self.staged.refill();
        let consumed = {
            let (decoded, dangling) = qp_decode(&self.line[..decode_end]);
            out.extend_from_slice(&decoded);
            if self.eof {
                out.extend_from_slice(dangling);
                decode_end
            } else {
                decode_end - dangling.len()
            }
        };
        self.line.drain(..consumed);

        Ok(())
    }
}

impl<R: BufRead> Read for QpDecoder<R> {
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
