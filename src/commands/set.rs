use bytes::Bytes;
use tokio::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Set `key` to hold the string `value`. If `key` already holds a value, it is overwritten,
/// regardless of its type. Any previous time to live associated with the key is discarded.
///
/// Options:
///
/// * `PX milliseconds` -- Set the specified expire time, in milliseconds.
/// * `EX seconds` -- Set the specified expire time, in seconds.
///
/// An expire time that is not a positive integer is ignored and the key is stored without a
/// TTL. Other arguments after `value` are ignored.
///
/// Ref: <https://redis.io/docs/latest/commands/set/>
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: Bytes,
    pub value: Bytes,
    pub ttl: Option<Duration>,
}

impl Executable for Set {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        store.set(self.key, Frame::Bulk(self.value), self.ttl);

        let res = Frame::Simple("OK".to_string());
        Ok(res)
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        let value = parser.next_bytes()?;

        let mut ttl = None;

        loop {
            let option = match parser.next_bytes() {
                Ok(option) => option,
                Err(CommandParserError::EndOfStream) => break,
                Err(err) => return Err(err),
            };

            let unit: fn(u64) -> Duration = if option.eq_ignore_ascii_case(b"px") {
                Duration::from_millis
            } else if option.eq_ignore_ascii_case(b"ex") {
                Duration::from_secs
            } else {
                continue;
            };

            let amount = match parser.next_frame() {
                Ok(amount) => amount,
                Err(CommandParserError::EndOfStream) => return Err(CommandParserError::Syntax),
                Err(err) => return Err(err),
            };

            ttl = amount
                .as_number()
                .and_then(|amount| u64::try_from(amount).ok())
                .filter(|amount| *amount > 0)
                .map(unit);
        }

        Ok(Self { key, value, ttl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use tokio::time;

    fn parse(args: &[&'static str]) -> Result<Command, CommandParserError> {
        let frame = Frame::Array(
            args.iter()
                .map(|arg| Frame::Bulk(Bytes::from(*arg)))
                .collect(),
        );
        Command::try_from(frame)
    }

    #[test]
    fn without_ttl() {
        let cmd = parse(&["SET", "key1", "value1"]).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: Bytes::from("key1"),
                value: Bytes::from("value1"),
                ttl: None,
            })
        );

        let store = Store::new();
        let res = cmd.exec(&store, &mut Default::default()).unwrap();

        assert_eq!(res, Frame::Simple("OK".to_string()));
        assert_eq!(
            store.get(b"key1"),
            Ok(Some(Frame::Bulk(Bytes::from("value1"))))
        );
    }

    #[test]
    fn with_px() {
        let cmd = parse(&["SET", "key1", "value1", "px", "100"]).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: Bytes::from("key1"),
                value: Bytes::from("value1"),
                ttl: Some(Duration::from_millis(100)),
            })
        );
    }

    #[test]
    fn with_ex() {
        let cmd = parse(&["SET", "key1", "value1", "EX", "10"]).unwrap();

        assert_eq!(
            cmd,
            Command::Set(Set {
                key: Bytes::from("key1"),
                value: Bytes::from("value1"),
                ttl: Some(Duration::from_secs(10)),
            })
        );
    }

    #[test]
    fn malformed_ttl_is_ignored() {
        for amount in ["soon", "-5", "0"] {
            let cmd = parse(&["SET", "key1", "value1", "PX", amount]).unwrap();

            assert_eq!(
                cmd,
                Command::Set(Set {
                    key: Bytes::from("key1"),
                    value: Bytes::from("value1"),
                    ttl: None,
                })
            );
        }
    }

    #[test]
    fn missing_ttl() {
        let err = parse(&["SET", "key1", "value1", "PX"]).unwrap_err();

        assert_eq!(err, CommandParserError::Syntax);
        assert!(err.is_recoverable());
    }

    #[test]
    fn missing_value() {
        let err = parse(&["SET", "key1"]).unwrap_err();

        assert_eq!(
            err,
            CommandParserError::WrongNumberOfArguments {
                command: "set".to_string()
            }
        );
    }

    #[tokio::test]
    async fn expires() {
        time::pause();

        let store = Store::new();
        let cmd = parse(&["SET", "k", "v", "PX", "50"]).unwrap();
        cmd.exec(&store, &mut Default::default()).unwrap();

        assert_eq!(store.get(b"k"), Ok(Some(Frame::Bulk(Bytes::from("v")))));

        time::advance(Duration::from_millis(60)).await;

        assert_eq!(store.get(b"k"), Ok(None));
    }
}
