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

//! Recursive construction of the decoded message tree.

use std::fmt;
use std::io::{BufRead, Read};
use std::rc::Rc;

use log::debug;

use super::charset::CharsetCache;
use super::content_encoding::{
    normalise_charset, unwrap_transfer_encoding, Body,
};
use super::encoded_word::decode_header;
use super::header::{read_header, Header, MediaType};
use super::multipart::{split_parts, split_preamble};
use crate::support::error::Error;
use crate::support::rcio::RcSlice;

/// One node of a decoded message tree.
///
/// Leaves carry their content in `body`. A multipart carries its children in
/// `parts` and, if there was any text before the first delimiter, the
/// preamble in `body`.
pub struct DecodedMessage<'a> {
    /// The header with all encoded words decoded. Transfer encodings that
    /// were removed and charsets that were converted are reflected here.
    pub header: Header,
    /// The decoded content, read lazily. Errors in the transfer encoding
    /// surface from here.
    pub body: Option<Body<'a>>,
    pub parts: Vec<DecodedMessage<'a>>,
    /// The multipart boundary, empty if `parts` is.
    pub boundary: String,
}

impl fmt::Debug for DecodedMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DecodedMessage")
            .field("header", &self.header)
            .field("body", &self.body.as_ref().map(|_| "<stream>"))
            .field("parts", &self.parts)
            .field("boundary", &self.boundary)
            .finish()
    }
}

impl<'a> DecodedMessage<'a> {
    fn leaf(header: Header, body: Body<'a>) -> Self {
        DecodedMessage {
            header,
            body: Some(body),
            parts: vec![],
            boundary: String::new(),
        }
    }
}

/// Limits applied while decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// The deepest multipart nesting to accept, where the parts of the
    /// top-level message are at depth 1. `None` is unlimited.
    pub max_depth: Option<u32>,
}

/// Decode a complete raw message: header block, blank line, body.
pub fn decode_mail<'a>(
    mut input: impl BufRead + 'a,
    charsets: &CharsetCache,
    options: &DecodeOptions,
) -> Result<DecodedMessage<'a>, Error> {
    if input.fill_buf()?.is_empty() {
        return Err(Error::HeaderParse("empty message".to_owned()));
    }

    let header = read_header(&mut input)?;
    decode(&header, Box::new(input), charsets, options)
}

/// Decode a message given its raw (parsed but undecoded) header and raw
/// body.
pub fn decode<'a>(
    header: &Header,
    body: Body<'a>,
    charsets: &CharsetCache,
    options: &DecodeOptions,
) -> Result<DecodedMessage<'a>, Error> {
    decode_at(header, body, charsets, options, 0)
}

fn decode_at<'a>(
    raw_header: &Header,
    body: Body<'a>,
    charsets: &CharsetCache,
    options: &DecodeOptions,
    depth: u32,
) -> Result<DecodedMessage<'a>, Error> {
    let mut header = decode_header(raw_header, charsets)?;
    let mut body = unwrap_transfer_encoding(&mut header, body);

    // RFC 2045 5.2 default
    let media_type = match header.get("Content-Type").map(str::trim) {
        Some(ct) if !ct.is_empty() => MediaType::parse(ct)?,
        _ => MediaType {
            typ: "text".to_owned(),
            subtype: "plain".to_owned(),
            parms: vec![],
        },
    };
    debug!(
        "Decoding {}/{} at depth {}",
        media_type.typ, media_type.subtype, depth
    );

    if media_type.is_type("text") {
        let body = normalise_charset(&mut header, &media_type, body, charsets)?;
        return Ok(DecodedMessage::leaf(header, body));
    }

    if !media_type.is_type("multipart") {
        return Ok(DecodedMessage::leaf(header, body));
    }

    let boundary = match media_type.parm("boundary") {
        Some(boundary) if !boundary.is_empty() => boundary.to_owned(),
        _ => return Err(Error::MissingBoundary),
    };

    let mut raw = Vec::new();
    body.read_to_end(&mut raw)?;
    let raw: Rc<[u8]> = raw.into();

    // An empty preamble is no preamble
    let preamble_len = split_preamble(&raw, &boundary)
        .map(<[u8]>::len)
        .filter(|&len| 0 != len);
    let raw_parts = split_parts(&raw, &boundary);
    debug!("Found {} parts delimited by {:?}", raw_parts.len(), boundary);

    if !raw_parts.is_empty() {
        if let Some(max_depth) = options.max_depth {
            if depth >= max_depth {
                return Err(Error::TooDeep(max_depth));
            }
        }
    }

    let mut parts = Vec::with_capacity(raw_parts.len());
    for raw_part in raw_parts {
        let mut content = RcSlice::new(Rc::clone(&raw), raw_part.range);
        let part_header = read_header(&mut content)?;
        parts.push(decode_at(
            &part_header,
            Box::new(content),
            charsets,
            options,
            depth + 1,
        )?);
    }

    Ok(DecodedMessage {
        header,
        body: preamble_len
            .map(|len| Box::new(RcSlice::new(raw, 0..len)) as Body<'a>),
        boundary: if parts.is_empty() {
            String::new()
        } else {
            boundary
        },
        parts,
    })
}
