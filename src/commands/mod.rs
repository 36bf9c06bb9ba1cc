pub mod client;
pub mod discard;
pub mod echo;
pub mod exec;
pub mod executable;
pub mod get;
pub mod incr;
pub mod multi;
pub mod ping;
pub mod set;
pub mod type_;
pub mod xadd;

use bytes::Bytes;
use std::{str, vec};
use strum_macros::IntoStaticStr;
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;
use crate::transaction::Transaction;
use crate::Error;

use client::Client;
use discard::Discard;
use echo::Echo;
use exec::Exec;
use get::Get;
use incr::Incr;
use multi::Multi;
use ping::Ping;
use set::Set;
use type_::Type;
use xadd::Xadd;

#[derive(Debug, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    Client(Client),
    Echo(Echo),
    Get(Get),
    Incr(Incr),
    Ping(Ping),
    Set(Set),
    Type(Type),
    Xadd(Xadd),

    Discard(Discard),
    Exec(Exec),
    Multi(Multi),
}

impl Command {
    /// `EXEC` and `DISCARD` run immediately even inside a transaction; every other command is
    /// queued.
    pub fn ends_transaction(&self) -> bool {
        matches!(self, Command::Exec(_) | Command::Discard(_))
    }

    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn exec(self, store: &Store, transaction: &mut Transaction) -> Result<Frame, Error> {
        match self {
            Command::Client(cmd) => cmd.exec(store),
            Command::Echo(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Incr(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
            Command::Type(cmd) => cmd.exec(store),
            Command::Xadd(cmd) => cmd.exec(store),

            Command::Discard(cmd) => Ok(cmd.exec(transaction)),
            Command::Exec(cmd) => cmd.exec(store, transaction),
            Command::Multi(cmd) => Ok(cmd.exec(transaction)),
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

        let mut parts = frames.into_iter();
        let command_name = parse_command_name(&mut parts)?;
        let parser = &mut CommandParser {
            command: command_name.clone(),
            parts,
        };

        let command = match &command_name[..] {
            "client" => Client::try_from(&mut *parser).map(Command::Client),
            "discard" => Discard::try_from(&mut *parser).map(Command::Discard),
            "echo" => Echo::try_from(&mut *parser).map(Command::Echo),
            "exec" => Exec::try_from(&mut *parser).map(Command::Exec),
            "get" => Get::try_from(&mut *parser).map(Command::Get),
            "incr" => Incr::try_from(&mut *parser).map(Command::Incr),
            "multi" => Multi::try_from(&mut *parser).map(Command::Multi),
            "ping" => Ping::try_from(&mut *parser).map(Command::Ping),
            "set" => Set::try_from(&mut *parser).map(Command::Set),
            "type" => Type::try_from(&mut *parser).map(Command::Type),
            "xadd" => Xadd::try_from(&mut *parser).map(Command::Xadd),
            _ => {
                return Err(CommandParserError::UnknownCommand {
                    command: command_name,
                })
            }
        };

        // Running out of arguments, or having some left over, is an arity error.
        command
            .and_then(|command| parser.finish().map(|_| command))
            .map_err(|err| match err {
                CommandParserError::EndOfStream => parser.wrong_number_of_arguments(),
                err => err,
            })
    }
}

fn parse_command_name(parts: &mut vec::IntoIter<Frame>) -> Result<String, CommandParserError> {
    let command_name = parts.next().ok_or(CommandParserError::EndOfStream)?;

    match command_name {
        Frame::Simple(s) => Ok(s.to_lowercase()),
        Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
            .map(|s| s.to_lowercase())
            .map_err(CommandParserError::InvalidUTF8String),
        frame => Err(CommandParserError::InvalidFrame {
            expected: "simple or bulk string".to_string(),
            actual: frame,
        }),
    }
}

pub struct CommandParser {
    /// Lowercase name of the command being parsed.
    command: String,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn next_frame(&mut self) -> Result<Frame, CommandParserError> {
        self.parts.next().ok_or(CommandParserError::EndOfStream)
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        match self.next_frame()? {
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
        match self.next_frame()? {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Consumes every remaining argument.
    fn remaining_bytes(&mut self) -> Result<Vec<Bytes>, CommandParserError> {
        let mut values = Vec::with_capacity(self.parts.len());
        while self.parts.len() > 0 {
            values.push(self.next_bytes()?);
        }
        Ok(values)
    }

    fn finish(&self) -> Result<(), CommandParserError> {
        if self.parts.len() > 0 {
            return Err(self.wrong_number_of_arguments());
        }
        Ok(())
    }

    fn wrong_number_of_arguments(&self) -> CommandParserError {
        CommandParserError::WrongNumberOfArguments {
            command: self.command.clone(),
        }
    }
}

/// Errors raised while turning a request frame into a [`Command`]. The message is what the
/// client receives.
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandParserError {
    #[error("ERR Protocol error: expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongNumberOfArguments { command: String },
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR Protocol error: invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("ERR Protocol error: empty command")]
    EndOfStream,
}

impl CommandParserError {
    /// Whether the connection can keep serving requests after replying with this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CommandParserError::WrongNumberOfArguments { .. } | CommandParserError::Syntax
        )
    }
}
