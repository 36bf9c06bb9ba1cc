use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Get the value of `key`. If the key does not exist the special value `nil` is returned.
///
/// Ref: <https://redis.io/docs/latest/commands/get/>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: Bytes,
}

impl Executable for Get {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        let res = match store.get(&self.key) {
            Ok(Some(value)) => value,
            Ok(None) => Frame::Null,
            Err(err) => err.into(),
        };

        Ok(res)
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use tokio::time::{self, Duration};

    #[test]
    fn existing_key() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("key1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        assert_eq!(
            cmd,
            Command::Get(Get {
                key: Bytes::from("key1")
            })
        );

        let store = Store::new();
        store.set(Bytes::from("key1"), Frame::Bulk(Bytes::from("1")), None);

        let result = cmd.exec(&store, &mut Default::default()).unwrap();

        assert_eq!(result, Frame::Bulk(Bytes::from("1")));
    }

    #[test]
    fn missing_key() {
        let frame = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Bulk(Bytes::from("key1")),
        ]);
        let cmd = Command::try_from(frame).unwrap();

        let result = cmd.exec(&Store::new(), &mut Default::default()).unwrap();

        assert_eq!(result, Frame::Null);
    }

    #[tokio::test]
    async fn expired_key() {
        time::pause();

        let store = Store::new();
        store.set(
            Bytes::from("key1"),
            Frame::Bulk(Bytes::from("1")),
            Some(Duration::from_millis(50)),
        );

        time::advance(Duration::from_millis(60)).await;

        let result = Get {
            key: Bytes::from("key1"),
        }
        .exec(&store)
        .unwrap();

        assert_eq!(result, Frame::Null);
    }

    #[test]
    fn stream_key() {
        let store = Store::new();
        store
            .xadd(
                Bytes::from("s"),
                "1-1",
                vec![(Bytes::from("f"), Bytes::from("v"))],
            )
            .unwrap();

        let result = Get {
            key: Bytes::from("s"),
        }
        .exec(&store)
        .unwrap();

        assert_eq!(
            result,
            Frame::Error(
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string()
            )
        );
    }
}
