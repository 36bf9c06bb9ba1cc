use bytes::Bytes;
use itertools::Itertools;
use std::str;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::store::StoreError;
use crate::stream::{Fields, StreamError};
use crate::Error;

/// Appends the specified stream entry to the stream at the specified key. If the key does not
/// exist, a new stream is created.
///
/// The ID is either `*`, or `<ms>-<seq>` where either part may be `*` to have the server fill it
/// in. The reply is the ID of the added entry.
///
/// Ref: <https://redis.io/docs/latest/commands/xadd/>
#[derive(Debug, PartialEq)]
pub struct Xadd {
    pub key: Bytes,
    pub id: Bytes,
    pub fields: Fields,
}

impl Executable for Xadd {
    fn exec(self, store: &Store) -> Result<Frame, Error> {
        let added = match str::from_utf8(&self.id) {
            Ok(id) => store.xadd(self.key, id, self.fields),
            Err(_) => Err(StoreError::from(StreamError::InvalidId)),
        };

        let res = match added {
            Ok(id) => Frame::Bulk(Bytes::from(id.to_string())),
            Err(err) => err.into(),
        };

        Ok(res)
    }
}

impl TryFrom<&mut CommandParser> for Xadd {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_bytes()?;
        let id = parser.next_bytes()?;

        let values = parser.remaining_bytes()?;
        if values.is_empty() || values.len() % 2 != 0 {
            return Err(parser.wrong_number_of_arguments());
        }

        let fields = values.into_iter().tuples().collect();

        Ok(Self { key, id, fields })
    }
}
