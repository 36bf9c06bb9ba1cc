use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns the string representation of the type of the value stored at `key`.
///
/// The different types that can be returned are: `string`, `list`, `set`, `zset`, `hash` and `stream`.
/// If the key does not exist, `none` is returned.
///
/// **NOTE**: This server implementation only stores `string` and `stream` values.
///
/// Ref: <https://redis.io/docs/latest/commands/type/>
#[derive(Debug, PartialEq)]
pub struct Type {
    pub key: Bytes,
}

impl Executable for Type {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        let type_ = store.type_of(&self.key);

        Ok(Frame::Simple(type_.to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Type {
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

    fn type_frame() -> Frame {
        Frame::Array(vec![
            Frame::Bulk(Bytes::from("TYPE")),
            Frame::Bulk(Bytes::from("key1")),
        ])
    }

    #[test]
    fn existing_key() {
        let store = Store::new();
        let cmd = Command::try_from(type_frame()).unwrap();

        assert_eq!(
            cmd,
            Command::Type(Type {
                key: Bytes::from("key1"),
            })
        );

        store.set(Bytes::from("key1"), Frame::Bulk(Bytes::from("1")), None);

        let result = cmd.exec(&store, &mut Default::default()).unwrap();

        assert_eq!(result, Frame::Simple("string".to_string()));
    }

    #[test]
    fn stream_key() {
        let store = Store::new();
        store
            .xadd(
                Bytes::from("key1"),
                "*",
                vec![(Bytes::from("f"), Bytes::from("v"))],
            )
            .unwrap();

        let cmd = Command::try_from(type_frame()).unwrap();
        let result = cmd.exec(&store, &mut Default::default()).unwrap();

        assert_eq!(result, Frame::Simple("stream".to_string()));
    }

    #[test]
    fn missing_key() {
        let store = Store::new();
        let cmd = Command::try_from(type_frame()).unwrap();

        let result = cmd.exec(&store, &mut Default::default()).unwrap();

        assert_eq!(result, Frame::Simple("none".to_string()));
    }
}
