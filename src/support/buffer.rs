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

//! Staging buffers for the streaming decoders.
//!
//! Every decoding `Read` adapter works the same way: pull a chunk from the
//! stream beneath it, decode the chunk into a `Staged` buffer, then hand the
//! staged bytes out across as many `read()` calls as the caller needs.

use std::io::{self, Read};

/// The amount of raw input a decoder pulls from its inner reader at once.
pub const CHUNK_SIZE: usize = 4096;

/// Decoded bytes waiting to be returned from `read()`.
#[derive(Debug, Default)]
pub struct Staged {
    data: Vec<u8>,
    pos: usize,
}

impl Staged {
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Discard whatever remains and return the underlying vector, cleared,
    /// for the decoder to fill again.
    pub fn refill(&mut self) -> &mut Vec<u8> {
        self.pos = 0;
        self.data.clear();
        &mut self.data
    }

    /// Copy as much as possible into `dst`, returning the byte count.
    pub fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.data.len() - self.pos);
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// Read up to `CHUNK_SIZE` bytes from `r`, appending them to `dst`.
///
/// Returns the number of bytes appended; 0 indicates EOF. Interrupted reads
/// are retried.
pub fn read_chunk(r: &mut impl Read, dst: &mut Vec<u8>) -> io::Result<usize> {
    let start = dst.len();
    dst.resize(start + CHUNK_SIZE, 0);
    let result = loop {
        match r.read(&mut dst[start..]) {
            Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
            result => break result,
        }
    };

    dst.truncate(start + *result.as_ref().unwrap_or(&0));
    result
}

/// Yields one byte per `read()`, to exercise chunk boundaries in tests.
#[cfg(test)]
pub struct Trickle<'a>(pub &'a [u8]);

#[cfg(test)]
impl Read for Trickle<'_> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if self.0.is_empty() || dst.is_empty() {
            return Ok(0);
        }

        dst[0] = self.0[0];
        self.0 = &self.0[1..];
        Ok(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn staged_drains_across_calls() {
        let mut staged = Staged::default();
        assert!(staged.is_empty());
        staged.refill().extend_from_slice(b"hello");

        let mut dst = [0u8; 3];
        assert_eq!(3, staged.drain_into(&mut dst));
        assert_eq!(b"hel", &dst);
        assert_eq!(2, staged.drain_into(&mut dst));
        assert_eq!(b"lo", &dst[..2]);
        assert!(staged.is_empty());
        assert_eq!(0, staged.drain_into(&mut dst));
    }

    #[test]
    fn read_chunk_appends() {
        let mut src = &b"abc"[..];
        let mut dst = b"xy".to_vec();
        assert_eq!(3, read_chunk(&mut src, &mut dst).unwrap());
        assert_eq!(b"xyabc", &dst[..]);
        assert_eq!(0, read_chunk(&mut src, &mut dst).unwrap());
        assert_eq!(b"xyabc", &dst[..]);
    }
}
