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

//! Constants from `sysexits.h`, limited to the ones a filter like this can
//! actually produce.

use std::io;

use super::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_OK: Sysexit = Sysexit(0);
pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }

    /// Classify a decode failure.
    ///
    /// Stream errors of kind `InvalidData` come from deferred decoding (e.g.
    /// bad base64) and so describe the message rather than the system.
    pub fn for_error(e: &Error) -> Self {
        match *e {
            Error::Io(ref e) if io::ErrorKind::NotFound == e.kind() => {
                EX_NOINPUT
            },
            Error::Io(ref e) if io::ErrorKind::InvalidData == e.kind() => {
                EX_DATAERR
            },
            Error::Io(_) => EX_IOERR,
            _ => EX_DATAERR,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify_errors() {
        assert_eq!(EX_DATAERR, Sysexit::for_error(&Error::MissingBoundary));
        assert_eq!(
            EX_DATAERR,
            Sysexit::for_error(&Error::UnknownCharset("x-foo".to_owned()))
        );
        assert_eq!(
            EX_NOINPUT,
            Sysexit::for_error(&Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "gone"
            )))
        );
        assert_eq!(
            EX_DATAERR,
            Sysexit::for_error(&Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "bad base64"
            )))
        );
        assert_eq!(
            EX_IOERR,
            Sysexit::for_error(&Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe"
            )))
        );
    }
}
