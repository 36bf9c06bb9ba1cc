use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Connection management commands. Only the subcommands clients send while setting up a
/// connection are supported, and they are acknowledged without keeping any state.
///
/// Ref: <https://redis.io/docs/latest/commands/client-setinfo/>
#[derive(Debug, PartialEq)]
pub struct Client {
    pub subcommand: String,
    pub args: Vec<Bytes>,
}

impl Executable for Client {
    fn exec(self, _store: &Store) -> Result<Frame, Error> {
        let res = match &self.subcommand.to_lowercase()[..] {
            "setinfo" | "setname" => Frame::Simple("OK".to_string()),
            subcommand => Frame::Error(format!(
                "ERR unknown subcommand '{}'. Try CLIENT HELP.",
                subcommand
            )),
        };

        Ok(res)
    }
}

impl TryFrom<&mut CommandParser> for Client {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let subcommand = parser.next_string()?;
        let args = parser.remaining_bytes()?;

        Ok(Self { subcommand, args })
    }
}
