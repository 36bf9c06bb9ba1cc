use bytes::{Bytes, BytesMut};
use std::fmt;
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::codec::{CodecError, FrameCodec};
use crate::commands::{Command, CommandParserError};
use crate::frame::Frame;
use crate::store::Store;
use crate::transaction::Transaction;

/// Errors that end a session. Whatever replies were produced before the error, including a
/// final error reply for the client, are still meant to be written before closing.
#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Command(#[from] CommandParserError),
    #[error("command execution failed: {0}")]
    Exec(crate::Error),
}

/// Per-connection protocol state: bytes received but not yet parsed, and the client's
/// transaction. Sessions share nothing but the store.
pub struct Session {
    store: Store,
    transaction: Transaction,
    codec: FrameCodec,
    buffer: BytesMut,
}

impl Session {
    pub fn new(store: Store) -> Session {
        Session::with_codec(store, FrameCodec::default())
    }

    pub fn with_codec(store: Store, codec: FrameCodec) -> Session {
        Session {
            store,
            transaction: Transaction::new(),
            codec,
            buffer: BytesMut::with_capacity(4096),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    /// Feeds bytes received from the client. One encoded reply is pushed to `out` per complete
    /// request, in order; a trailing partial request stays buffered until more bytes arrive.
    ///
    /// An error means the connection must be closed once the replies in `out` are written.
    pub fn on_bytes(&mut self, bytes: &[u8], out: &mut Vec<Bytes>) -> Result<(), SessionError> {
        self.buffer.extend_from_slice(bytes);

        loop {
            let frame = match self.codec.decode(&mut self.buffer) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(err) => {
                    warn!(error = %err, "Failed to decode frame");
                    out.push(self.encode(error_reply(format!("ERR {}", err)))?);
                    return Err(err.into());
                }
            };

            debug!(%frame, "Received frame from client");

            let command = match Command::try_from(frame) {
                Ok(command) => command,
                Err(err) if err.is_recoverable() => {
                    out.push(self.encode(error_reply(&err))?);
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "Invalid command");
                    out.push(self.encode(error_reply(&err))?);
                    return Err(err.into());
                }
            };

            let res = self.dispatch(command)?;
            debug!(%res, "Sending response to client");
            out.push(self.encode(res)?);
        }
    }

    /// Runs `command`, or queues it when a transaction is open. `EXEC` and `DISCARD` are never
    /// queued.
    pub fn dispatch(&mut self, command: Command) -> Result<Frame, SessionError> {
        if self.transaction.is_active() && !command.ends_transaction() {
            debug!(command = command.name(), "Queued command");
            self.transaction.queue(command);
            return Ok(Frame::Simple("QUEUED".to_string()));
        }

        debug!(command = command.name(), "Executing command");
        command
            .exec(&self.store, &mut self.transaction)
            .map_err(SessionError::Exec)
    }

    fn encode(&mut self, frame: Frame) -> Result<Bytes, SessionError> {
        let mut dst = BytesMut::new();
        self.codec.encode(frame, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Simple errors can't carry line breaks.
fn error_reply(message: impl fmt::Display) -> Frame {
    Frame::Error(message.to_string().replace(['\r', '\n'], " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(args: &[&str]) -> Vec<u8> {
        Frame::Array(
            args.iter()
                .map(|arg| Frame::Bulk(Bytes::copy_from_slice(arg.as_bytes())))
                .collect(),
        )
        .serialize()
    }

    fn send(session: &mut Session, args: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        session.on_bytes(&request(args), &mut out).unwrap();
        assert_eq!(out.len(), 1);
        out.remove(0).to_vec()
    }

    #[test]
    fn ping() {
        let mut session = Session::new(Store::new());

        assert_eq!(send(&mut session, &["PING"]), b"+PONG\r\n");
        assert_eq!(send(&mut session, &["ECHO", "hey"]), b"$3\r\nhey\r\n");
    }

    #[test]
    fn partial_and_pipelined_requests() {
        let mut session = Session::new(Store::new());
        let mut bytes = request(&["SET", "k", "v"]);
        bytes.extend(request(&["GET", "k"]));

        let (first, rest) = bytes.split_at(10);
        let mut out = Vec::new();

        session.on_bytes(first, &mut out).unwrap();
        assert!(out.is_empty());

        session.on_bytes(rest, &mut out).unwrap();
        assert_eq!(
            out,
            vec![Bytes::from("+OK\r\n"), Bytes::from("$1\r\nv\r\n")]
        );
    }

    #[test]
    fn transaction() {
        let store = Store::new();
        let mut session = Session::new(store.clone());

        assert_eq!(send(&mut session, &["MULTI"]), b"+OK\r\n");
        assert!(session.in_transaction());

        assert_eq!(send(&mut session, &["SET", "k", "1"]), b"+QUEUED\r\n");
        assert_eq!(send(&mut session, &["INCR", "k"]), b"+QUEUED\r\n");

        // Nothing runs before EXEC.
        assert_eq!(store.get(b"k"), Ok(None));

        assert_eq!(send(&mut session, &["EXEC"]), b"*2\r\n+OK\r\n:2\r\n");
        assert!(!session.in_transaction());
        assert_eq!(store.get(b"k"), Ok(Some(Frame::Bulk(Bytes::from("2")))));
    }

    #[test]
    fn discard() {
        let store = Store::new();
        let mut session = Session::new(store.clone());

        send(&mut session, &["MULTI"]);
        send(&mut session, &["SET", "k", "1"]);

        assert_eq!(send(&mut session, &["DISCARD"]), b"+OK\r\n");
        assert_eq!(send(&mut session, &["EXEC"]), b"-ERR EXEC without MULTI\r\n");
        assert_eq!(store.get(b"k"), Ok(None));
    }

    #[test]
    fn exec_and_discard_without_multi() {
        let mut session = Session::new(Store::new());

        assert_eq!(send(&mut session, &["EXEC"]), b"-ERR EXEC without MULTI\r\n");
        assert_eq!(
            send(&mut session, &["DISCARD"]),
            b"-ERR DISCARD without MULTI\r\n"
        );
    }

    #[test]
    fn transactions_are_per_session() {
        let store = Store::new();
        let mut first = Session::new(store.clone());
        let mut second = Session::new(store.clone());

        send(&mut first, &["MULTI"]);

        assert_eq!(send(&mut second, &["SET", "k", "v"]), b"+OK\r\n");
        assert_eq!(send(&mut first, &["GET", "k"]), b"+QUEUED\r\n");
        assert_eq!(send(&mut first, &["EXEC"]), b"*1\r\n$1\r\nv\r\n");
    }

    #[test]
    fn wrong_arity_keeps_the_session_open() {
        let mut session = Session::new(Store::new());

        assert_eq!(
            send(&mut session, &["GET"]),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
        assert_eq!(send(&mut session, &["PING"]), b"+PONG\r\n");
    }

    #[test]
    fn unknown_command_closes_the_session() {
        let mut session = Session::new(Store::new());
        let mut out = Vec::new();

        let err = session
            .on_bytes(&request(&["FLUSHALL"]), &mut out)
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Command(CommandParserError::UnknownCommand { .. })
        ));
        assert_eq!(out, vec![Bytes::from("-ERR unknown command 'flushall'\r\n")]);
    }

    #[test]
    fn malformed_input_closes_the_session() {
        let mut session = Session::new(Store::new());
        let mut out = Vec::new();
        let mut bytes = request(&["PING"]);
        bytes.extend_from_slice(b"?oops\r\n");

        let err = session.on_bytes(&bytes, &mut out).unwrap_err();

        assert!(matches!(err, SessionError::Codec(_)));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Bytes::from("+PONG\r\n"));
        assert!(out[1].starts_with(b"-ERR "));
    }

    #[test]
    fn deeply_nested_arrays_close_the_session() {
        let mut session = Session::new(Store::new());
        let mut out = Vec::new();
        let mut bytes = b"*1\r\n".repeat(20_000);
        bytes.extend(request(&["PING"]));

        // Parsing runs on a thread with the stack size of a tokio worker.
        let (err, out) = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let err = session.on_bytes(&bytes, &mut out).unwrap_err();
                (err, out)
            })
            .unwrap()
            .join()
            .unwrap();

        assert!(matches!(
            err,
            SessionError::Codec(CodecError::Frame(crate::frame::Error::NestingTooDeep))
        ));
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with(b"-ERR protocol error; arrays nested deeper than"));
    }

    #[test]
    fn error_replies_stay_on_one_line() {
        let mut session = Session::new(Store::new());
        let mut out = Vec::new();
        let bytes = Frame::Array(vec![
            Frame::Bulk(Bytes::from("GET")),
            Frame::Array(vec![Frame::Integer(1)]),
        ])
        .serialize();

        session.on_bytes(&bytes, &mut out).unwrap_err();

        let reply = &out[0];
        assert!(reply.starts_with(b"-ERR Protocol error"));
        assert_eq!(reply.iter().filter(|byte| **byte == b'\n').count(), 1);
        assert!(reply.ends_with(b"\r\n"));
    }

    #[test]
    fn xadd() {
        let mut session = Session::new(Store::new());

        assert_eq!(
            send(&mut session, &["XADD", "s", "1-1", "field", "a"]),
            b"$3\r\n1-1\r\n"
        );
        assert_eq!(
            send(&mut session, &["XADD", "s", "1-1", "field", "a"]),
            b"-ERR The ID specified in XADD is equal or smaller than the target stream top item\r\n"
                .to_vec()
        );
        assert_eq!(
            send(&mut session, &["XADD", "s", "1-2", "field", "a"]),
            b"$3\r\n1-2\r\n"
        );
        assert_eq!(send(&mut session, &["TYPE", "s"]), b"+stream\r\n");
    }
}
