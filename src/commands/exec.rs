use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::transaction::Transaction;
use crate::Error;

/// Executes all previously queued commands in a transaction and restores the connection state to
/// normal. The reply is an array holding the reply of each command, in the order they were
/// queued. A command that fails does not stop the ones after it.
///
/// Ref: <https://redis.io/docs/latest/commands/exec/>
#[derive(Debug, PartialEq)]
pub struct Exec;

impl Exec {
    pub fn exec(self, store: &Store, transaction: &mut Transaction) -> Result<Frame, Error> {
        let commands = match transaction.take() {
            Some(commands) => commands,
            None => return Ok(Frame::Error("ERR EXEC without MULTI".to_string())),
        };

        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            results.push(command.exec(store, transaction)?);
        }

        Ok(Frame::Array(results))
    }
}

impl TryFrom<&mut CommandParser> for Exec {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}
