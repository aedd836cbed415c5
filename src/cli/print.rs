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

//! Rendering of decoded messages as text.

use std::io::{self, Write};

use crate::mime::decode::DecodedMessage;
use crate::mime::header::Header;

/// Write `message` depth-first: its header fields in name order, a blank
/// line, its body, then each part framed by boundary delimiter lines.
///
/// This consumes the body streams. Line endings are bare LF; the caller is
/// expected to normalise them.
pub fn print_message<W: Write + ?Sized>(
    w: &mut W,
    message: &mut DecodedMessage<'_>,
) -> io::Result<()> {
    print_header(w, &message.header)?;
    w.write_all(b"\n")?;

    if let Some(ref mut body) = message.body {
        io::copy(body, w)?;
    }

    if !message.parts.is_empty() {
        for part in &mut message.parts {
            write!(w, "\n--{}\n", message.boundary)?;
            print_message(w, part)?;
        }
        write!(w, "\n--{}--\n", message.boundary)?;
    }

    Ok(())
}

fn print_header<W: Write + ?Sized>(
    w: &mut W,
    header: &Header,
) -> io::Result<()> {
    for (name, values) in header {
        for value in values {
            writeln!(w, "{}: {}", name, value)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::charset::CharsetCache;
    use crate::mime::decode::{decode_mail, DecodeOptions};
    use crate::support::line_ending::{
        Newline, NewlineNormaliser, TransformWriter,
    };

    fn render(raw: &str) -> String {
        let mut message = decode_mail(
            raw.as_bytes(),
            &CharsetCache::new(),
            &DecodeOptions::default(),
        )
        .unwrap();
        let mut out = Vec::new();
        print_message(&mut out, &mut message).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn print_single_part() {
        assert_eq!(
            "Content-Type: text/plain; charset=utf-8\n\
             Received: one\n\
             Received: two\n\
             Subject: Café\n\
             \n\
             café\r\n",
            render(
                "subject: =?utf-8?q?Caf=C3=A9?=\r\n\
                 Received: one\r\n\
                 Content-Type: text/plain; charset=iso-8859-1\r\n\
                 Content-Transfer-Encoding: quoted-printable\r\n\
                 Received: two\r\n\
                 \r\n\
                 caf=E9\r\n"
            )
        );
    }

    #[test]
    fn print_multipart() {
        assert_eq!(
            "Content-Type: multipart/mixed; boundary=B\n\
             Subject: test\n\
             \n\
             Preamble text\n\
             --B\n\
             Content-Type: text/plain\n\
             \n\
             part body\n\
             --B\n\
             \n\
             second\n\
             --B--\n",
            render(
                "Content-Type: multipart/mixed; boundary=B\r\n\
                 Subject: test\r\n\
                 \r\n\
                 Preamble text\r\n\
                 --B\r\n\
                 Content-Type: text/plain\r\n\
                 \r\n\
                 part body\r\n\
                 --B\r\n\
                 \r\n\
                 second\r\n\
                 --B--\r\n\
                 epilogue\r\n"
            )
        );
    }

    #[test]
    fn print_with_normalised_newlines() {
        let mut message = decode_mail(
            &b"Content-Type: text/plain\n\nline one\rline two\n"[..],
            &CharsetCache::new(),
            &DecodeOptions::default(),
        )
        .unwrap();

        let mut w = TransformWriter::new(
            Vec::new(),
            NewlineNormaliser::new(Newline::Crlf),
        );
        print_message(&mut w, &mut message).unwrap();
        assert_eq!(
            "Content-Type: text/plain\r\n\r\nline one\r\nline two\r\n",
            String::from_utf8(w.finish().unwrap()).unwrap()
        );
    }
}
