use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use uuid::Uuid;

/// A client connection. Bytes are handed out as they arrive; framing is left to the
/// [`Session`](crate::session::Session) that owns the protocol state.
pub struct Connection {
    pub id: Uuid,
    pub client_address: SocketAddr,
    stream: BufWriter<TcpStream>,
    // Data is read from the socket into the read buffer and split off as soon as it is read.
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream, client_address: SocketAddr) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            client_address,
            stream: BufWriter::new(stream),
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Waits for the next bytes sent by the client. Returns `None` once the client closed the
    /// connection.
    pub async fn read_chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.buffer.reserve(4096);

        if self.stream.read_buf(&mut self.buffer).await? == 0 {
            return Ok(None);
        }

        Ok(Some(self.buffer.split().freeze()))
    }

    /// Writes every reply and flushes them to the socket.
    pub async fn write_all(&mut self, replies: &[Bytes]) -> io::Result<()> {
        for reply in replies {
            self.stream.write_all(reply).await?;
        }
        self.stream.flush().await
    }
}
