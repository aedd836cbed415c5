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

//! Utilities for working with RFC 5322 header blocks and the `Content-Type`
//! header in particular.

use std::collections::{btree_map, BTreeMap, HashMap};
use std::fmt;
use std::io::BufRead;

use log::warn;
use nom::{
    branch::alt,
    bytes::complete::{is_not, take, take_while1},
    character::complete::{char, multispace0},
    combinator::map,
    multi::{fold_many0, many0, many0_count},
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use crate::support::error::Error;

/// The fields of one header block.
///
/// Names are case-insensitive; they are stored in their canonical
/// `Word-Word` form, so iteration is in sorted order of that form. The values
/// of each name keep the order they were added in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    fields: BTreeMap<String, Vec<String>>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .entry(canonical_name(name))
            .or_insert_with(Vec::new)
            .push(value.into());
    }

    /// Replace all values of `name` with `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(canonical_name(name), vec![value.into()]);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.fields.remove(&canonical_name(name))
    }

    /// The first value of `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.fields
            .get(&canonical_name(name))
            .map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.fields.iter()
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Convert a field name into its canonical form, e.g. `content-type` into
/// `Content-Type`.
pub fn canonical_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|ch| {
            let ch = if upper {
                ch.to_ascii_uppercase()
            } else {
                ch.to_ascii_lowercase()
            };
            upper = '-' == ch;
            ch
        })
        .collect()
}

/// Read a header block from `r`, stopping after the blank line that
/// separates it from the body (or at EOF).
///
/// Folded fields are unfolded, joining the lines with a single space. Lines
/// which aren't fields at all (no colon) are skipped along with their
/// continuation lines. The values are raw; RFC 2047 decoding is left to the
/// caller.
pub fn read_header(r: &mut impl BufRead) -> Result<Header, Error> {
    let mut header = Header::new();
    let mut current: Option<(String, String)> = None;
    let mut first_line = true;
    let mut line = Vec::new();

    loop {
        line.clear();
        if 0 == r.read_until(b'\n', &mut line)? {
            break;
        }

        let content = strip_line_ending(&line);
        if content.is_empty() {
            break;
        }

        let is_continuation = b' ' == content[0] || b'\t' == content[0];
        let was_first_line = first_line;
        first_line = false;

        if is_continuation {
            if was_first_line {
                return Err(Error::HeaderParse(
                    "header block starts with a continuation line".to_owned(),
                ));
            }

            // Continuations of junk lines are junk too
            if let Some((_, ref mut value)) = current {
                let more = String::from_utf8_lossy(content);
                let more = more.trim();
                if !more.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(more);
                }
            }

            continue;
        }

        if let Some((name, value)) = current.take() {
            header.add(&name, value);
        }

        let colon = match memchr::memchr(b':', content) {
            Some(colon) => colon,
            None => {
                warn!(
                    "Skipping header line without colon: {:?}",
                    String::from_utf8_lossy(content)
                );
                continue;
            },
        };

        // RFC 5322 4.5 obsolete syntax allows whitespace before the colon
        let name = trim_wsp_end(&content[..colon]);
        if name.is_empty() || !name.iter().all(|&b| b > b' ' && b < 0x7F) {
            return Err(Error::HeaderParse(format!(
                "invalid field name {:?}",
                String::from_utf8_lossy(name)
            )));
        }

        current = Some((
            // Valid by the check above
            String::from_utf8_lossy(name).into_owned(),
            String::from_utf8_lossy(&content[colon + 1..])
                .trim()
                .to_owned(),
        ));
    }

    if let Some((name, value)) = current {
        header.add(&name, value);
    }

    Ok(header)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_wsp_end(s: &[u8]) -> &[u8] {
    let end = s
        .iter()
        .rposition(|&b| b' ' != b && b'\t' != b)
        .map_or(0, |ix| ix + 1);
    &s[..end]
}

/// A parsed `Content-Type` header value.
///
/// The type, subtype and parameter names are lower-cased. Parameters keep
/// their original order; RFC 2231 continuations and extended values have
/// already been reassembled and decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaType {
    pub typ: String,
    pub subtype: String,
    pub parms: Vec<(String, String)>,
}

impl MediaType {
    /// Parse a `Content-Type` value (after RFC 2047 decoding).
    pub fn parse(s: &str) -> Result<Self, Error> {
        let invalid = |why: &str| {
            Error::InvalidMediaType(format!("{}: {:?}", why, s))
        };

        let (rest, (typ, subtype, raw_parms)) =
            media_type(s).map_err(|_| invalid("malformed media type"))?;
        if !rest.is_empty() {
            return Err(invalid("malformed parameters"));
        }

        for (ix, &(ref name, _)) in raw_parms.iter().enumerate() {
            if raw_parms[..ix].iter().any(|&(ref n, _)| n == name) {
                return Err(invalid("duplicate parameter"));
            }
        }

        Ok(MediaType {
            typ: typ.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            parms: merge_rfc2231(raw_parms),
        })
    }

    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ)
    }

    pub fn parm(&self, name: &str) -> Option<&str> {
        self.parms
            .iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| v.as_str())
    }

    /// Replace the value of parameter `name`, keeping its position, or
    /// append it if not present.
    pub fn set_parm(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .parms
            .iter_mut()
            .find(|parm| parm.0.eq_ignore_ascii_case(name))
        {
            Some(parm) => parm.1 = value,
            None => self.parms.push((name.to_ascii_lowercase(), value)),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.typ, self.subtype)?;
        for &(ref name, ref value) in &self.parms {
            write!(f, "; {}=", name)?;
            if !value.is_empty() && value.chars().all(is_token_char) {
                f.write_str(value)?;
            } else {
                f.write_str("\"")?;
                for ch in value.chars() {
                    if '"' == ch || '\\' == ch {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", ch)?;
                }
                f.write_str("\"")?;
            }
        }

        Ok(())
    }
}

// RFC 2045 5.1 "tspecials"
const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

// RFC 2045 5.1 "token"
fn is_token_char(ch: char) -> bool {
    ch.is_ascii_graphic() && !TSPECIALS.contains(ch)
}

// Unquoted parameter values. Strictly these must be tokens, but agents
// routinely emit things like `boundary=----=_Part_0` without quotes.
fn is_bare_value_char(ch: char) -> bool {
    !ch.is_whitespace() && !ch.is_control() && ';' != ch && '"' != ch
}

fn token(i: &str) -> IResult<&str, &str> {
    take_while1(is_token_char)(i)
}

// RFC 5322 3.2.4 "quoted-string", without the folding (already unfolded)
fn quoted_string(i: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((is_not("\"\\"), preceded(char('\\'), take(1usize)))),
            String::new(),
            |mut acc: String, piece: &str| {
                acc.push_str(piece);
                acc
            },
        ),
        char('"'),
    )(i)
}

fn parm_value(i: &str) -> IResult<&str, String> {
    alt((quoted_string, map(take_while1(is_bare_value_char), String::from)))(
        i,
    )
}

// RFC 2045 5.1 "parameter", preceded by its ';'
fn parm(i: &str) -> IResult<&str, (String, String)> {
    map(
        tuple((
            multispace0,
            char(';'),
            multispace0,
            token,
            multispace0,
            char('='),
            multispace0,
            parm_value,
        )),
        |(_, _, _, name, _, _, _, value)| (name.to_ascii_lowercase(), value),
    )(i)
}

fn media_type(
    i: &str,
) -> IResult<&str, (&str, &str, Vec<(String, String)>)> {
    terminated(
        tuple((
            preceded(multispace0, token),
            preceded(char('/'), token),
            many0(parm),
        )),
        // Trailing semicolons are harmless
        tuple((many0_count(preceded(multispace0, char(';'))), multispace0)),
    )(i)
}

/// Split an RFC 2231 parameter name into its base name, section number, and
/// whether the value is extended (percent-encoded).
fn rfc2231_section(name: &str) -> (&str, Option<u32>, bool) {
    let (stem, extended) = match name.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (name, false),
    };

    if let Some(star) = stem.rfind('*') {
        if let Ok(section) = stem[star + 1..].parse::<u32>() {
            return (&stem[..star], Some(section), extended);
        }
    }

    (stem, None, extended)
}

/// Reassemble RFC 2231 continuations (`name*0`, `name*1*`, ...) and decode
/// extended values (`name*=charset'lang'%XX`).
///
/// A reassembled value replaces any plain parameter of the same name, since
/// agents send the plain one as a fallback for older readers.
fn merge_rfc2231(raw: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::with_capacity(raw.len());
    let mut sections: HashMap<String, BTreeMap<u32, (bool, String)>> =
        HashMap::new();
    let mut section_order: Vec<String> = Vec::new();

    for (name, value) in raw {
        match rfc2231_section(&name) {
            (_, None, false) => merged.push((name, value)),
            (base, section, extended) => {
                if !sections.contains_key(base) {
                    section_order.push(base.to_owned());
                }
                sections
                    .entry(base.to_owned())
                    .or_insert_with(BTreeMap::new)
                    .insert(section.unwrap_or(0), (extended, value));
            },
        }
    }

    for base in section_order {
        let parts = match sections.remove(&base) {
            Some(parts) => parts,
            None => continue,
        };

        let value = match decode_rfc2231_sections(&parts) {
            Some(value) => value,
            None => {
                warn!("Dropping undecodable RFC 2231 parameter {}", base);
                continue;
            },
        };

        match merged.iter_mut().find(|parm| parm.0 == base) {
            Some(parm) => parm.1 = value,
            None => merged.push((base, value)),
        }
    }

    merged
}

fn decode_rfc2231_sections(
    parts: &BTreeMap<u32, (bool, String)>,
) -> Option<String> {
    let mut charset = "";
    let mut bytes = Vec::<u8>::new();

    // Sections must be contiguous from 0; anything after a gap is ignored
    for (expected, (&section, &(extended, ref value))) in
        parts.iter().enumerate()
    {
        if expected as u32 != section {
            break;
        }

        if !extended {
            bytes.extend_from_slice(value.as_bytes());
            continue;
        }

        let mut encoded = value.as_str();
        if 0 == section {
            let mut split = value.splitn(3, '\'');
            match (split.next(), split.next(), split.next()) {
                (Some(cs), Some(_language), Some(rest)) => {
                    charset = cs;
                    encoded = rest;
                },
                _ => return None,
            }
        }

        bytes.extend(percent_encoding::percent_decode_str(encoded));
    }

    if charset.is_empty()
        || charset.eq_ignore_ascii_case("utf-8")
        || charset.eq_ignore_ascii_case("us-ascii")
    {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        encoding_rs::Encoding::for_label_no_replacement(charset.as_bytes())
            .map(|e| e.decode_without_bom_handling(&bytes).0.into_owned())
    }
}
