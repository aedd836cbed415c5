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

//! Streaming conversion of CR, LF and CRLF line endings into one newline
//! sequence.

use std::fmt;
use std::io::{self, Write};
use std::mem;
use std::str::FromStr;

use serde::Deserialize;

use super::buffer::CHUNK_SIZE;

/// The newline sequence output is normalised to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Newline {
    Crlf,
    Lf,
    Cr,
}

impl Default for Newline {
    fn default() -> Self {
        Newline::Crlf
    }
}

impl Newline {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Newline::Crlf => b"\r\n",
            Newline::Lf => b"\n",
            Newline::Cr => b"\r",
        }
    }
}

impl FromStr for Newline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        if s.eq_ignore_ascii_case("crlf") {
            Ok(Newline::Crlf)
        } else if s.eq_ignore_ascii_case("lf") {
            Ok(Newline::Lf)
        } else if s.eq_ignore_ascii_case("cr") {
            Ok(Newline::Cr)
        } else {
            Err(format!("Unknown newline {:?}; expected crlf, lf or cr", s))
        }
    }
}

impl fmt::Display for Newline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Newline::Crlf => "crlf",
            Newline::Lf => "lf",
            Newline::Cr => "cr",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformStatus {
    /// All of `src` was consumed.
    Done,
    /// `dst` filled up; call again with the rest of `src`.
    ShortDst,
    /// The end of `src` can't be decided on until more input arrives, or
    /// `at_eof` is set. The unconsumed tail must be passed in again.
    ShortSrc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transformed {
    pub consumed: usize,
    pub produced: usize,
    pub status: TransformStatus,
}

/// A resumable byte-stream transformation.
pub trait Transformer {
    /// Transform as much of `src` into `dst` as possible.
    ///
    /// `at_eof` indicates that `src` is the very end of the input.
    fn transform(
        &mut self,
        dst: &mut [u8],
        src: &[u8],
        at_eof: bool,
    ) -> Transformed;
}

/// Rewrites every LF, CRLF and lone CR into one `Newline`.
///
/// This holds no state between calls. A CR at the end of a chunk is left
/// unconsumed (`ShortSrc`) and so arrives again at the start of the next
/// chunk, where it can be paired with a following LF.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NewlineNormaliser {
    newline: Newline,
}

impl NewlineNormaliser {
    pub fn new(newline: Newline) -> Self {
        NewlineNormaliser { newline }
    }
}

impl Transformer for NewlineNormaliser {
    fn transform(
        &mut self,
        dst: &mut [u8],
        src: &[u8],
        at_eof: bool,
    ) -> Transformed {
        let newline = self.newline.as_bytes();
        let mut consumed = 0;
        let mut produced = 0;

        let result = |consumed, produced, status| Transformed {
            consumed,
            produced,
            status,
        };

        while consumed < src.len() {
            let run_end = memchr::memchr2(b'\r', b'\n', &src[consumed..])
                .map_or(src.len(), |ix| consumed + ix);
            let n = (run_end - consumed).min(dst.len() - produced);
            dst[produced..produced + n]
                .copy_from_slice(&src[consumed..consumed + n]);
            consumed += n;
            produced += n;

            if consumed < run_end {
                return result(consumed, produced, TransformStatus::ShortDst);
            }

            if consumed == src.len() {
                break;
            }

            let event_len = if b'\n' == src[consumed] {
                1
            } else if consumed + 1 < src.len() {
                if b'\n' == src[consumed + 1] {
                    2
                } else {
                    1
                }
            } else if at_eof {
                1
            } else {
                return result(consumed, produced, TransformStatus::ShortSrc);
            };

            if dst.len() - produced < newline.len() {
                return result(consumed, produced, TransformStatus::ShortDst);
            }

            dst[produced..produced + newline.len()].copy_from_slice(newline);
            produced += newline.len();
            consumed += event_len;
        }

        result(consumed, produced, TransformStatus::Done)
    }
}

/// Drives a `Transformer` over everything written to it, passing the output
/// on to `inner`.
///
/// Input the transformer leaves unconsumed is carried over to the next
/// write. `finish()` must be called to resolve whatever is left at the end.
pub struct TransformWriter<W, T> {
    inner: W,
    transformer: T,
    pending: Vec<u8>,
    out: Vec<u8>,
}

impl<W: Write, T: Transformer> TransformWriter<W, T> {
    pub fn new(inner: W, transformer: T) -> Self {
        Self::with_capacity(inner, transformer, CHUNK_SIZE)
    }

    /// `capacity` must be at least the largest single unit of output the
    /// transformer produces.
    pub fn with_capacity(inner: W, transformer: T, capacity: usize) -> Self {
        TransformWriter {
            inner,
            transformer,
            pending: Vec::new(),
            out: vec![0u8; capacity],
        }
    }

    /// Transform whatever input is still pending as the end of the stream,
    /// flush, and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let pending = mem::take(&mut self.pending);
        self.pump(&pending, true)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn pump(&mut self, src: &[u8], at_eof: bool) -> io::Result<usize> {
        let mut consumed = 0;
        loop {
            let result = self.transformer.transform(
                &mut self.out,
                &src[consumed..],
                at_eof,
            );
            consumed += result.consumed;
            self.inner.write_all(&self.out[..result.produced])?;

            match result.status {
                TransformStatus::ShortDst => {
                    if 0 == result.produced {
                        return Err(io::Error::new(
                            io::ErrorKind::Other,
                            "Transform output buffer too small",
                        ));
                    }
                },
                TransformStatus::Done | TransformStatus::ShortSrc => {
                    return Ok(consumed);
                },
            }
        }
    }
}

impl<W: Write, T: Transformer> Write for TransformWriter<W, T> {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            let consumed = self.pump(src, false)?;
            self.pending.extend_from_slice(&src[consumed..]);
        } else {
            let mut pending = mem::take(&mut self.pending);
            pending.extend_from_slice(src);
            let consumed = self.pump(&pending, false)?;
            pending.drain(..consumed);
            self.pending = pending;
        }

        Ok(src.len())
    }

    /// Flushes the inner writer. Pending input (at most a CR for newline
    /// normalisation) stays pending until `finish()`.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn normalise(input: &[u8], newline: Newline) -> Vec<u8> {
        let mut w = TransformWriter::new(
            Vec::new(),
            NewlineNormaliser::new(newline),
        );
        w.write_all(input).unwrap();
        w.finish().unwrap()
    }

    fn normalise_chunked(
        input: &[u8],
        newline: Newline,
        chunk_size: usize,
        capacity: usize,
    ) -> Vec<u8> {
        let mut w = TransformWriter::with_capacity(
            Vec::new(),
            NewlineNormaliser::new(newline),
            capacity,
        );
        for chunk in input.chunks(chunk_size) {
            w.write_all(chunk).unwrap();
        }
        w.finish().unwrap()
    }

    fn transform(
        src: &[u8],
        dst_len: usize,
        at_eof: bool,
    ) -> (Transformed, Vec<u8>) {
        let mut dst = vec![0u8; dst_len];
        let result =
            NewlineNormaliser::default().transform(&mut dst, src, at_eof);
        dst.truncate(result.produced);
        (result, dst)
    }

    #[test]
    fn parse_newline() {
        assert_eq!(Ok(Newline::Crlf), "CRLF".parse::<Newline>());
        assert_eq!(Ok(Newline::Lf), "lf".parse::<Newline>());
        assert_eq!(Ok(Newline::Cr), "Cr".parse::<Newline>());
        assert!("\r\n".parse::<Newline>().is_err());
        assert_eq!("crlf", Newline::default().to_string());
    }

    #[test]
    fn mixed_line_endings() {
        assert_eq!(
            b"a\r\nb\r\nc\r\n\r\nd".to_vec(),
            normalise(b"a\nb\r\nc\r\rd", Newline::Crlf)
        );
        assert_eq!(
            b"a\nb\nc\n\nd".to_vec(),
            normalise(b"a\nb\r\nc\r\rd", Newline::Lf)
        );
        assert_eq!(
            b"a\rb\rc\r\rd".to_vec(),
            normalise(b"a\nb\r\nc\r\rd", Newline::Cr)
        );
        assert_eq!(b"\r\n\r\n".to_vec(), normalise(b"\n\r", Newline::Crlf));
    }

    #[test]
    fn crlf_split_at_every_point() {
        let input = b"a\r\nb";
        for split in 0..=input.len() {
            let mut w = TransformWriter::new(
                Vec::new(),
                NewlineNormaliser::new(Newline::Lf),
            );
            w.write_all(&input[..split]).unwrap();
            w.write_all(&input[split..]).unwrap();
            assert_eq!(b"a\nb".to_vec(), w.finish().unwrap());
        }
    }

    #[test]
    fn trailing_cr() {
        let (result, out) = transform(b"a\r", 16, false);
        assert_eq!(
            Transformed {
                consumed: 1,
                produced: 1,
                status: TransformStatus::ShortSrc,
            },
            result
        );
        assert_eq!(b"a", &out[..]);

        let (result, out) = transform(b"a\r", 16, true);
        assert_eq!(
            Transformed {
                consumed: 2,
                produced: 3,
                status: TransformStatus::Done,
            },
            result
        );
        assert_eq!(b"a\r\n", &out[..]);

        assert_eq!(b"a\r\n".to_vec(), normalise(b"a\r", Newline::Crlf));
    }

    #[test]
    fn short_destination() {
        let (result, out) = transform(b"ab\ncd", 3, false);
        assert_eq!(
            Transformed {
                consumed: 2,
                produced: 2,
                status: TransformStatus::ShortDst,
            },
            result
        );
        assert_eq!(b"ab", &out[..]);

        let (result, out) = transform(b"\r\ncd", 3, false);
        assert_eq!(
            Transformed {
                consumed: 3,
                produced: 3,
                status: TransformStatus::ShortDst,
            },
            result
        );
        assert_eq!(b"\r\nc", &out[..]);

        let (result, _) = transform(b"\n", 1, true);
        assert_eq!(0, result.consumed);
        assert_eq!(TransformStatus::ShortDst, result.status);
    }

    #[test]
    fn capacity_too_small_is_an_error() {
        let mut w = TransformWriter::with_capacity(
            Vec::new(),
            NewlineNormaliser::new(Newline::Crlf),
            1,
        );
        assert!(w.write_all(b"\n").is_err());
    }

    fn reference(input: &[u8], newline: Newline) -> Vec<u8> {
        let unix = String::from_utf8_lossy(input)
            .replace("\r\n", "\n")
            .replace('\r', "\n");
        let newline = String::from_utf8_lossy(newline.as_bytes());
        unix.replace('\n', &newline).into_bytes()
    }

    fn newline_strategy() -> impl Strategy<Value = Newline> {
        prop_oneof![Just(Newline::Crlf), Just(Newline::Lf), Just(Newline::Cr)]
    }

    proptest! {
        #[test]
        fn chunking_never_matters(
            content in "[a-c\r\n]{0,100}",
            newline in newline_strategy(),
            chunk_size in 1usize..=16,
            capacity in 2usize..=16,
        ) {
            prop_assert_eq!(
                reference(content.as_bytes(), newline),
                normalise_chunked(
                    content.as_bytes(),
                    newline,
                    chunk_size,
                    capacity,
                )
            );
        }

        #[test]
        fn normalisation_is_idempotent(
            content in "[a-c\r\n]{0,100}",
            newline in newline_strategy(),
        ) {
            let once = normalise(content.as_bytes(), newline);
            prop_assert_eq!(&once, &normalise(&once, newline));
        }
    }
}
