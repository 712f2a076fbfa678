//! Tokenizer for shell command lines of the form `name[ arg=value]*`, and
//! the numeric conversions applied to argument values.

use crate::error::{Error, Result};

/// Maximum number of `name=value` arguments kept from one line.
pub const MAX_ARGS: usize = 8;

/// One command line split into a command name and its arguments. The whole
/// line is lower-cased before splitting.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedCommand {
    name: String,
    args: Vec<(String, String)>,
}
impl ParsedCommand {
    /// Split `line` (without its CR LF terminator).
    ///
    /// The command name runs up to the first space. Each argument is the text
    /// between a space and the next `=`, its value runs from that `=` up to
    /// the next space or the end of the line. Parsing stops silently once no
    /// further `=` follows or [`MAX_ARGS`] arguments were taken.
    pub fn parse(line: &str) -> Self {
        let line = line.to_lowercase();

        let mut space = match line.find(' ') {
            Some(space) => space,
            None => {
                return ParsedCommand {
                    name: line,
                    args: Vec::new(),
                }
            }
        };
        let name = line[..space].to_owned();

        let mut args = Vec::new();
        while args.len() < MAX_ARGS {
            let equals = match line[space..].find('=') {
                Some(offset) => space + offset,
                None => break,
            };
            let value_end = line[equals..]
                .find(' ')
                .map_or(line.len(), |offset| equals + offset);

            args.push((
                line[space + 1..equals].to_owned(),
                line[equals + 1..value_end].to_owned(),
            ));

            if value_end == line.len() {
                break;
            }
            space = value_end;
        }

        ParsedCommand { name, args }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Value of argument `name`, if present. When a name is repeated the last
    /// occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a mandatory argument.
    pub fn require(&self, name: &'static str) -> Result<&str> {
        self.get(name).ok_or(Error::MissingParameter(name))
    }
}

/// Decimal number made of digits only.
pub fn parse_dec(text: &str) -> Result<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::NotDigit(text.to_owned()));
    }
    text.parse().map_err(|_| Error::NotDigit(text.to_owned()))
}

/// Hexadecimal number with an optional `0x` prefix. An `x` at index 1 is only
/// accepted after a leading `0`.
pub fn parse_hex(text: &str) -> Result<u32> {
    let bytes = text.as_bytes();
    let digits = if bytes.len() > 1 && bytes[1].eq_ignore_ascii_case(&b'x') {
        if bytes[0] != b'0' {
            return Err(Error::FirstNotZero(text.to_owned()));
        }
        &text[2..]
    } else {
        text
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::NotDigit(text.to_owned()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| Error::NotDigit(text.to_owned()))
}

// =============================================================================
// Unit Tests
// =============================================================================
