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

use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{error, info};
use structopt::StructOpt;

use super::print::print_message;
use crate::mime::charset::CharsetCache;
use crate::mime::decode::{decode_mail, DecodeOptions};
use crate::support::config::DecodeConfig;
use crate::support::error::Error;
use crate::support::line_ending::{Newline, NewlineNormaliser, TransformWriter};
use crate::support::sysexits::*;

/// Decode raw email messages into readable text.
///
/// Each FILE is decoded and written to standard output in turn: the header
/// with encoded words decoded, then the body with its transfer encoding
/// removed and text converted to UTF-8. Multipart messages are expanded
/// recursively. With no FILE, standard input is decoded.
///
/// A message that fails to decode is reported on standard error and the
/// remaining files are still processed; the exit status reflects the first
/// failure.
#[derive(StructOpt, Debug)]
#[structopt(max_term_width = 80)]
struct Options {
    /// The newline sequence to write: crlf, lf, or cr [default: crlf, or as
    /// set in the config file]
    #[structopt(long)]
    newline: Option<Newline>,

    /// Read settings from this TOML file.
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Fail on multiparts nested more than this many levels deep.
    #[structopt(long)]
    max_depth: Option<u32>,

    /// Log more detail to standard error. Can be passed multiple times.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    /// The messages to decode.
    #[structopt(parse(from_os_str))]
    files: Vec<PathBuf>,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let options = Options::from_clap(&match Options::clap().get_matches_safe()
    {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            if !e.message.is_empty() {
                println!("{}", e.message);
            }
            return;
        },
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        },
    });

    crate::init_simple_log(match options.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    });

    let config = match options.config {
        Some(ref path) => load_config(path),
        None => DecodeConfig::default(),
    };

    let newline = options.newline.unwrap_or(config.newline);
    let decode_options = DecodeOptions {
        max_depth: options.max_depth.or(config.max_depth),
    };

    let status = run(&options.files, newline, &decode_options);
    if EX_OK != status {
        status.exit();
    }
}

fn load_config(path: &Path) -> DecodeConfig {
    let mut toml = Vec::new();
    if let Err(e) =
        fs::File::open(path).and_then(|mut f| f.read_to_end(&mut toml))
    {
        eprintln!("Error reading '{}': {}", path.display(), e);
        EX_CONFIG.exit();
    }

    match DecodeConfig::parse(&toml) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error in config file at '{}': {}", path.display(), e);
            EX_CONFIG.exit()
        },
    }
}

/// Decode and print every input, returning the status of the first
/// failure.
fn run(
    files: &[PathBuf],
    newline: Newline,
    options: &DecodeOptions,
) -> Sysexit {
    let charsets = CharsetCache::new();
    let stdout = io::stdout();
    let mut sink = BufWriter::new(stdout.lock());
    let mut status = EX_OK;

    let mut record = |result: Result<(), Error>, name: &str| {
        if let Err(e) = result {
            error!("{}: {}", name, e);
            if EX_OK == status {
                status = Sysexit::for_error(&e);
            }
        }
    };

    if files.is_empty() {
        let stdin = io::stdin();
        record(
            decode_and_print(
                stdin.lock(),
                &charsets,
                options,
                &mut sink,
                newline,
            ),
            "<stdin>",
        );
    }

    for path in files {
        let name = path.display().to_string();
        info!("Decoding {}", name);

        let result = fs::File::open(path)
            .map_err(Error::from)
            .and_then(|file| {
                decode_and_print(
                    BufReader::new(file),
                    &charsets,
                    options,
                    &mut sink,
                    newline,
                )
            });
        record(result, &name);
    }

    record(sink.flush().map_err(Error::from), "<stdout>");
    status
}

fn decode_and_print(
    input: impl BufRead,
    charsets: &CharsetCache,
    options: &DecodeOptions,
    sink: &mut impl Write,
    newline: Newline,
) -> Result<(), Error> {
    let mut message = decode_mail(input, charsets, options)?;
    let mut out = TransformWriter::new(sink, NewlineNormaliser::new(newline));
    print_message(&mut out, &mut message)?;
    out.finish()?;
    Ok(())
}
