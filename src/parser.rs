//! implements a parser for the queue's line protocol.
use std::fmt;

use crate::types::protocol::Command;
use crate::types::serialisable::WireSerialisable;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParsingError {
    BadFormat,
    UnknownCommand,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::BadFormat => "bad format",
            Self::UnknownCommand => "unknown command",
        })
    }
}

impl WireSerialisable for ParsingError {
    fn serialise_wire(&self) -> Vec<u8> {
        match self {
            ParsingError::BadFormat => b"BAD_FORMAT\r\n".to_vec(),
            ParsingError::UnknownCommand => b"UNKNOWN_COMMAND\r\n".to_vec(),
        }
    }
}

/// Maximum length of an owner name, in bytes.
const MAX_NAME_LEN: usize = 200;

/// Provides a custom, minimal, zero-copy parser of byte slices.
struct ParseState<'a> {
    from: &'a [u8],
}

impl ParseState<'_> {
    /// Asserts there's no more input to take, returning `result` if so, and a
    /// `BadFormat` error otherwise.
    fn expect_done_and<R>(&self, result: R) -> Result<R, ParsingError> {
        if self.from.is_empty() {
            Ok(result)
        } else {
            Err(ParsingError::BadFormat)
        }
    }

    /// Consumes from the input, expecting a token of non-zero length.
    fn expect_next_token(&mut self) -> Result<&[u8], ParsingError> {
        match self.next_token() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ParsingError::BadFormat),
        }
    }

    /// Consumes from the input, expecting a space then a decimal u64. Signs,
    /// whitespace and overflow are all `BadFormat`.
    fn expect_next_u64(&mut self) -> Result<u64, ParsingError> {
        self.expect_space()?;

        self.expect_next_token()?.iter().try_fold(0u64, |r, v| match v {
            b'0'..=b'9' => r
                .checked_mul(10)
                .and_then(|r| r.checked_add((*v - b'0') as u64))
                .ok_or(ParsingError::BadFormat),
            _ => Err(ParsingError::BadFormat),
        })
    }

    /// As `expect_next_u64`, limited to the u32 range.
    fn expect_next_u32(&mut self) -> Result<u32, ParsingError> {
        u32::try_from(self.expect_next_u64()?)
            .map_err(|_| ParsingError::BadFormat)
    }

    /// Consumes from the input, expecting a space then an owner name.
    fn expect_next_name(&mut self) -> Result<String, ParsingError> {
        self.expect_space()?;

        let token = self.expect_next_token()?;

        fn char_is_name_safe(c: u8, is_first: bool) -> bool {
            match c {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => true,
                b'+' | b'/' | b';' | b'.' | b'$' | b'_' | b'(' | b')' => true,
                b'-' => !is_first, // - is only name safe outside first position
                _ => false,
            }
        }

        if token.len() <= MAX_NAME_LEN
            && token
                .iter()
                .enumerate()
                .all(|(i, c)| char_is_name_safe(*c, i == 0))
        {
            // Every name-safe byte is ASCII.
            String::from_utf8(token.to_vec()).map_err(|_| ParsingError::BadFormat)
        } else {
            Err(ParsingError::BadFormat)
        }
    }

    /// Consumes a space.
    fn expect_space(&mut self) -> Result<(), ParsingError> {
        match self.from.split_first() {
            Some((b' ', rest)) => {
                self.from = rest;
                Ok(())
            },
            _ => Err(ParsingError::BadFormat),
        }
    }

    /// Consumes from this ParseState until reaching a space byte or the end of
    /// the input. It returns None at the end of the input. On consecutive space
    /// bytes, it returns a zero-length slice.
    fn next_token(&mut self) -> Option<&[u8]> {
        if self.from.is_empty() {
            return None;
        }

        let idx = self
            .from
            .iter()
            .position(|c| *c == b' ')
            .unwrap_or(self.from.len());

        let (token, rest) = self.from.split_at(idx);
        self.from = rest;

        Some(token)
    }
}

impl<'a> From<&'a [u8]> for ParseState<'a> {
    fn from(from: &'a [u8]) -> Self {
        ParseState { from }
    }
}

// Parsing is implemented to fulfil the TryFrom trait.
impl TryFrom<&[u8]> for Command {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        use Command::*;

        let mut ps: ParseState = value.into();

        let cmd = match ps.expect_next_token()? {
            // <cmd>
            b"quit" => Quit,
            b"stats" => Stats,

            // <cmd> <id>
            b"status" => Status {
                id: ps.expect_next_u64()?,
            },

            // <cmd> <owner> <n_bytes>
            b"submit" => Submit {
                owner: ps.expect_next_name()?,
                n_bytes: ps.expect_next_u32()?,
            },

            _ => return Err(ParsingError::UnknownCommand),
        };

        ps.expect_done_and(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        use Command::*;
        use ParsingError::*;

        const U32_MAX_PLUS_1: u64 = u32::MAX as u64 + 1;
        const U64_MAX_PLUS_1: u128 = u64::MAX as u128 + 1;

        // Asserts the line parses into the given command successfully.
        #[track_caller]
        fn ok(line: &[u8], res: Command) {
            assert_eq!(line.try_into(), Ok(res));
        }

        // Asserts the line fails to parse with a BadFormat error.
        #[track_caller]
        fn bf(line: &[u8]) {
            assert_eq!(TryInto::<Command>::try_into(line), Err(BadFormat));
        }

        // Asserts the line fails to parse with an UnknownCommand error.
        #[track_caller]
        fn uc(line: &[u8]) {
            assert_eq!(TryInto::<Command>::try_into(line), Err(UnknownCommand));
        }

        let name_200_bytes = "a".repeat(200);
        let name_201_bytes = "a".repeat(201);

        // Check silly non-commands
        bf(b"");
        bf(b" ");
        uc(b"syntax-error");
        uc(b"put 0 0 0 5");

        ok(b"quit", Quit);
        ok(b"stats", Stats);
        bf(b"stats ");
        bf(b"quit now");

        ok(b"status 42", Status { id: 42 });
        ok(
            format!("status {}", u64::MAX).as_bytes(),
            Status { id: u64::MAX },
        );
        bf(format!("status {U64_MAX_PLUS_1}").as_bytes());
        bf(b"status");
        bf(b"status  42");
        bf(b"status -1");
        bf(b"status 4x");

        ok(
            b"submit alice 11",
            Submit {
                owner: "alice".into(),
                n_bytes: 11,
            },
        );
        ok(
            b"submit owner_name-098+/;.()$ 0",
            Submit {
                owner: "owner_name-098+/;.()$".into(),
                n_bytes: 0,
            },
        );
        ok(
            format!("submit {name_200_bytes} 1").as_bytes(),
            Submit {
                owner: name_200_bytes.clone(),
                n_bytes: 1,
            },
        );
        bf(format!("submit {name_201_bytes} 1").as_bytes());
        bf(format!("submit alice {U32_MAX_PLUS_1}").as_bytes());
        bf(b"submit -alice 1");
        bf(b"submit al#ice 1");
        bf(b"submit alice");
        bf(b"submit 5");
        bf(b"submit alice 1 2");
    }

    #[test]
    fn errors_on_the_wire() {
        assert_eq!(ParsingError::BadFormat.serialise_wire(), b"BAD_FORMAT\r\n");
        assert_eq!(
            ParsingError::UnknownCommand.serialise_wire(),
            b"UNKNOWN_COMMAND\r\n"
        );
    }
}
