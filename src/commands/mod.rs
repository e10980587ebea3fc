pub mod del;
pub mod executable;
pub mod get;
pub mod hget;
pub mod hgetall;
pub mod hset;
pub mod ping;
pub mod set;

use bytes::Bytes;
use std::ops::RangeBounds;
use std::{str, vec};
use thiserror::Error as ThisError;
use tracing::warn;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;

use del::Del;
use get::Get;
use hget::HGet;
use hgetall::HGetAll;
use hset::HSet;
use ping::Ping;
use set::Set;

#[derive(Debug, PartialEq)]
pub enum Command {
    Del(Del),
    Get(Get),
    HGet(HGet),
    HGetAll(HGetAll),
    HSet(HSet),
    Set(Set),

    Ping(Ping),
}

impl Command {
    /// Whether the command mutates the keyspace and therefore belongs in the append-only file.
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Del(_) | Command::HSet(_) | Command::Set(_))
    }
}

impl Executable for Command {
    fn exec(self, store: &Store) -> Frame {
        match self {
            Command::Del(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::HGet(cmd) => cmd.exec(store),
            Command::HGetAll(cmd) => cmd.exec(store),
            Command::HSet(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandParserError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                })
            }
        };

        let parser = &mut CommandParser {
            parts: frames.into_iter(),
        };

        let command_name = parser.parse_command_name()?;

        match &command_name[..] {
            "DEL" => Del::try_from(parser).map(Command::Del),
            "GET" => Get::try_from(parser).map(Command::Get),
            "HGET" => HGet::try_from(parser).map(Command::HGet),
            "HGETALL" => HGetAll::try_from(parser).map(Command::HGetAll),
            "HSET" => HSet::try_from(parser).map(Command::HSet),
            "PING" => Ping::try_from(parser).map(Command::Ping),
            "SET" => Set::try_from(parser).map(Command::Set),
            _ => Err(CommandParserError::UnknownCommand {
                command: command_name,
            }),
        }
    }
}

/// Result of running one request against the store.
#[derive(Debug, PartialEq)]
pub struct Outcome {
    pub response: Frame,
    /// The request was an accepted write and has to be appended to the log.
    pub persist: bool,
}

/// Parses `request`, runs it against `store` and builds the single response frame.
///
/// Request problems never fail the call: they are turned into protocol replies, see
/// [`CommandParserError::into_frame`].
pub fn dispatch(request: &Frame, store: &Store) -> Outcome {
    match Command::try_from(request.clone()) {
        Ok(cmd) => {
            let persist = cmd.is_write();
            Outcome {
                response: cmd.exec(store),
                persist,
            }
        }
        Err(err) => {
            warn!(%err, "Rejected request {}", request);
            Outcome {
                response: err.into_frame(),
                persist: false,
            }
        }
    }
}

pub(crate) struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn parse_command_name(&mut self) -> Result<String, CommandParserError> {
        let command_name = self
            .parts
            .next()
            .ok_or(CommandParserError::EndOfStream)?;

        match command_name {
            Frame::Simple(s) => Ok(s.to_uppercase()),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_uppercase())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Fails with the client facing arity error unless the number of arguments left is within
    /// `valid`.
    fn expect_arity(
        &self,
        command: &'static str,
        valid: impl RangeBounds<usize>,
    ) -> Result<(), CommandParserError> {
        if valid.contains(&self.parts.len()) {
            Ok(())
        } else {
            Err(CommandParserError::WrongArity { command })
        }
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let frame = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("protocol error; unknown command {command}")]
    UnknownCommand { command: String },
    #[error("wrong number of arguments for '{command}' command")]
    WrongArity { command: &'static str },
    #[error("protocol error; invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("protocol error; attempting to extract a value failed due to the frame being fully consumed")]
    EndOfStream,
}

impl CommandParserError {
    /// The reply sent to the client in place of a result.
    ///
    /// Unknown commands get an empty simple string rather than an error, which existing clients of
    /// this server rely on.
    pub fn into_frame(self) -> Frame {
        match self {
            CommandParserError::UnknownCommand { .. } => Frame::simple(""),
            err => Frame::Error(format!("ERR {}", err)),
        }
    }
}
