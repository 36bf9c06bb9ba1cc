use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error as ThisError;

use crate::frame::Frame;

/// Field/value pairs appended under a single stream entry, in the order they were given.
pub type Fields = Vec<(Bytes, Bytes)>;

/// Composite stream entry ID, `<milliseconds>-<sequence>`. IDs are ordered first by timestamp
/// and then by sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> StreamId {
        StreamId { ms, seq }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum StreamError {
    #[error("ERR The ID specified in XADD must be greater than 0-0")]
    ZeroId,
    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    NotIncreasing,
    #[error("ERR Invalid stream ID specified as stream command argument")]
    InvalidId,
}

/// An append-only log of entries keyed by strictly increasing IDs.
///
/// Ref: <https://redis.io/docs/latest/develop/data-types/streams/>
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stream {
    entries: BTreeMap<StreamId, Fields>,
    last_id: Option<StreamId>,
}

impl Stream {
    pub fn new() -> Stream {
        Stream::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> Option<StreamId> {
        self.last_id
    }

    /// Entry IDs in the order they were appended.
    pub fn ids(&self) -> impl Iterator<Item = &StreamId> {
        self.entries.keys()
    }

    pub fn get(&self, id: &StreamId) -> Option<&Fields> {
        self.entries.get(id)
    }

    /// Appends `fields` under the ID requested by the client and returns the ID it resolved to.
    ///
    /// `requested` is either `*`, or `<ms>-<seq>` where either half may be `*`. Stars are filled
    /// in from `now_ms` and the last ID of the stream. Nothing is appended on error.
    pub fn append(
        &mut self,
        requested: &str,
        fields: Fields,
        now_ms: u64,
    ) -> Result<StreamId, StreamError> {
        let id = self.resolve(requested, now_ms)?;

        self.entries.insert(id, fields);
        self.last_id = Some(id);

        Ok(id)
    }

    fn resolve(&self, requested: &str, now_ms: u64) -> Result<StreamId, StreamError> {
        if requested == "0-0" {
            return Err(StreamError::ZeroId);
        }

        if requested == "*" {
            // A clock that went backwards must not produce an ID below the current top.
            let ms = self.last_id.map_or(now_ms, |last| last.ms.max(now_ms));
            return Ok(StreamId::new(ms, self.next_sequence(ms)?));
        }

        let (ms, seq) = match requested.split_once('-') {
            // Only `*` alone asks for a fully generated ID.
            Some(("*", "*")) | None => return Err(StreamError::InvalidId),
            Some(parts) => parts,
        };

        let ms = match ms {
            "*" => now_ms,
            ms => parse_id_part(ms)?,
        };

        if self.last_id.is_some_and(|last| ms < last.ms) {
            return Err(StreamError::NotIncreasing);
        }

        let seq = match seq {
            "*" => self.next_sequence(ms)?,
            seq => parse_id_part(seq)?,
        };

        let id = StreamId::new(ms, seq);
        if id == StreamId::MIN {
            return Err(StreamError::ZeroId);
        }
        if self.last_id.is_some_and(|last| id <= last) {
            return Err(StreamError::NotIncreasing);
        }

        Ok(id)
    }

    fn next_sequence(&self, ms: u64) -> Result<u64, StreamError> {
        match self.last_id {
            Some(last) if last.ms == ms => last.seq.checked_add(1).ok_or(StreamError::NotIncreasing),
            // 0-0 is never a valid ID.
            _ if ms == 0 => Ok(1),
            _ => Ok(0),
        }
    }

    /// The stream as an array of `[id, [field, value, ...]]` pairs, the shape of an `XRANGE`
    /// reply.
    pub fn to_frame(&self) -> Frame {
        let entries = self
            .entries
            .iter()
            .map(|(id, fields)| {
                let fields = fields
                    .iter()
                    .flat_map(|(field, value)| {
                        [Frame::Bulk(field.clone()), Frame::Bulk(value.clone())]
                    })
                    .collect();

                Frame::Array(vec![
                    Frame::Bulk(Bytes::from(id.to_string())),
                    Frame::Array(fields),
                ])
            })
            .collect();

        Frame::Array(entries)
    }
}

fn parse_id_part(part: &str) -> Result<u64, StreamError> {
    if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(StreamError::InvalidId);
    }
    part.parse().map_err(|_| StreamError::InvalidId)
}
