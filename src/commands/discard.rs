use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::transaction::Transaction;

/// Flushes all previously queued commands in a transaction and restores the connection state to
/// normal.
///
/// Ref: <https://redis.io/docs/latest/commands/discard/>
#[derive(Debug, PartialEq)]
pub struct Discard;

impl Discard {
    pub fn exec(self, transaction: &mut Transaction) -> Frame {
        if transaction.discard() {
            Frame::Simple("OK".to_string())
        } else {
            Frame::Error("ERR DISCARD without MULTI".to_string())
        }
    }
}

impl TryFrom<&mut CommandParser> for Discard {
    type Error = CommandParserError;

    fn try_from(_parser: &mut CommandParser) -> Result<Self, Self::Error> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::commands::ping::Ping;
    use crate::commands::Command;
    use crate::store::Store;

    fn discard() -> Command {
        let frame = Frame::Array(vec![Frame::Bulk(Bytes::from("DISCARD"))]);
        Command::try_from(frame).unwrap()
    }

    #[test]
    fn drops_queued_commands() {
        let mut transaction = Transaction::new();
        transaction.begin();
        transaction.queue(Command::Ping(Ping { message: None }));

        let res = discard().exec(&Store::new(), &mut transaction).unwrap();

        assert_eq!(res, Frame::Simple("OK".to_string()));
        assert!(!transaction.is_active());
        assert!(transaction.is_empty());
    }

    #[test]
    fn without_multi() {
        let res = discard()
            .exec(&Store::new(), &mut Transaction::new())
            .unwrap();

        assert_eq!(res, Frame::Error("ERR DISCARD without MULTI".to_string()));
    }
}
