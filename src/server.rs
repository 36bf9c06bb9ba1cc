use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, field, info, instrument, warn};

use crate::codec::FrameCodec;
use crate::config::Config;
use crate::connection::Connection;
use crate::session::Session;
use crate::store::{remove_expired_keys, Store};
use crate::Error;

/// Binds the configured address and serves clients until an accept error occurs.
pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;

    serve(listener, config).await
}

/// Serves clients accepted on `listener`. Every connection runs on its own task and they all
/// share a single store.
pub async fn serve(listener: TcpListener, config: Config) -> Result<(), Error> {
    let store = Store::new();

    if config.active_expiry {
        tokio::spawn(remove_expired_keys(store.clone()));
    }

    info!("Server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = listener.accept().await?;
        let store = store.clone();
        let codec = FrameCodec::new(config.max_frame_size);
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, store, codec).await {
                error!(error = %e, "Connection failed");
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, store, codec),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    store: Store,
    codec: FrameCodec,
) -> Result<(), Error> {
    let mut conn = Connection::new(stream, client_address);
    let mut session = Session::with_codec(store, codec);
    let mut replies = Vec::new();

    tracing::Span::current()
        .record("connection_id", field::display(conn.id))
        .record("client_address", field::display(conn.client_address));

    while let Some(bytes) = conn.read_chunk().await? {
        let res = session.on_bytes(&bytes, &mut replies);

        conn.write_all(&replies).await?;
        replies.clear();

        if let Err(e) = res {
            warn!(error = %e, "Closing connection");
            break;
        }
    }

    info!("Connection closed");
    Ok(())
}
