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

use std::io::{self, BufRead, Read};
use std::ops::Range;
use std::rc::Rc;

/// Provides the `std::io` read traits over one range of a shared, immutable
/// buffer.
///
/// This is used to hand out several independent streams (e.g., the preamble
/// and each part of a buffered multipart body) without copying the buffer.
#[derive(Clone, Debug)]
pub struct RcSlice {
    buf: Rc<[u8]>,
    pos: usize,
    end: usize,
}

impl RcSlice {
    /// Panics if `range` is out of bounds for `buf`.
    pub fn new(buf: Rc<[u8]>, range: Range<usize>) -> Self {
        assert!(range.start <= range.end && range.end <= buf.len());
        RcSlice {
            buf,
            pos: range.start,
            end: range.end,
        }
    }

    /// The bytes not yet read.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..self.end]
    }
}

impl Read for RcSlice {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let n = self.remaining().read(dst)?;
        self.pos += n;
        Ok(n)
    }
}

impl BufRead for RcSlice {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.remaining())
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.end);
    }
}
