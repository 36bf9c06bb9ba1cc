use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::transaction::Transaction;

/// Marks the start of a transaction block. Subsequent commands will be queued for atomic
/// execution using `EXEC`.
///
/// Ref: <https://redis.io/docs/latest/commands/multi/>
#[derive(Debug, PartialEq)]
pub struct Multi;

impl Multi {
    pub fn exec(self, transaction: &mut Transaction) -> Frame {
        transaction.begin();
        Frame::Simple("OK".to_string())
    }
}

impl TryFrom<&mut CommandParser> for Multi {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}
