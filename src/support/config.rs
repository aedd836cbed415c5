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

use serde::Deserialize;

use super::line_ending::Newline;

/// Settings from the optional configuration file.
///
/// Every field is optional; options given on the command line take
/// precedence.
///
/// ```toml
/// newline = "lf"
/// max_depth = 32
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeConfig {
    /// The newline sequence output is normalised to. Defaults to CRLF.
    pub newline: Newline,

    /// The deepest multipart nesting to decode before giving up on a
    /// message. Unlimited if unset.
    pub max_depth: Option<u32>,
}

impl DecodeConfig {
    pub fn parse(toml: &[u8]) -> Result<Self, toml::de::Error> {
        toml::from_slice(toml)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_config() {
        assert_eq!(DecodeConfig::default(), DecodeConfig::parse(b"").unwrap());

        assert_eq!(
            DecodeConfig {
                newline: Newline::Lf,
                max_depth: Some(8),
            },
            DecodeConfig::parse(b"newline = \"lf\"\nmax_depth = 8\n").unwrap()
        );

        assert!(DecodeConfig::parse(b"newline = \"LF\"").is_err());
        assert!(DecodeConfig::parse(b"max_depth = -1").is_err());
        assert!(DecodeConfig::parse(b"colour = true").is_err());
    }
}
