use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, instrument};

use crate::aof::{self, Aof};
use crate::codec::FrameCodec;
use crate::commands::{dispatch, Outcome};
use crate::config::Config;
use crate::connection::Connection;
use crate::store::Store;
use crate::Error;

/// Restores the keyspace from the append-only file (when enabled) and serves clients until
/// interrupted.
pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let store = Store::new();

    // The log is replayed before the listener exists, so no client can observe a partially
    // restored keyspace.
    let aof = if config.appendonly {
        let aof = Aof::open(&config.aof_path, config.sync_interval()).await?;
        let records = load(&aof, &store).await?;
        info!(records, keys = store.size(), "Restored keyspace from append-only file");
        Some(aof)
    } else {
        None
    };

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;

    info!("Redis server listening on {}", listener.local_addr()?);

    let res = tokio::select! {
        res = serve(listener, store, aof.clone(), config.max_frame_size) => res,
        _ = signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    if let Some(aof) = aof {
        aof.close().await?;
    }

    res
}

/// Replays every logged write into `store`, discarding the responses.
pub async fn load(aof: &Aof, store: &Store) -> Result<usize, aof::Error> {
    aof.replay(|frame| {
        dispatch(&frame, store);
    })
    .await
}

/// Accepts clients forever, each one served on its own task.
pub async fn serve(
    listener: TcpListener,
    store: Store,
    aof: Option<Aof>,
    max_frame_size: usize,
) -> Result<(), Error> {
    loop {
        let (socket, client_address) = listener.accept().await?;
        let store = store.clone();
        let aof = aof.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            let codec = FrameCodec::new(max_frame_size);
            if let Err(e) =
                handle_connection(socket, client_address.to_string(), codec, store, aof).await
            {
                error!(error = %e, "Connection terminated");
            }
        });
    }
}

/// Serves one client: one response per request, in order, until the client hangs up.
///
/// Command level problems are answered with protocol errors. Framing problems and I/O failures,
/// on the stream or the append-only file, end the connection.
#[instrument(
    name = "connection",
    skip(stream, codec, store, aof),
    fields(connection_id)
)]
pub async fn handle_connection<S>(
    stream: S,
    client_address: String,
    codec: FrameCodec,
    store: Store,
    aof: Option<Aof>,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::with_codec(stream, codec);

    tracing::Span::current().record("connection_id", conn.id.to_string());

    while let Some(frame) = conn.read_frame().await? {
        debug!("Received frame from client: {}", frame);

        let Outcome { response, persist } = dispatch(&frame, &store);

        if persist {
            if let Some(aof) = &aof {
                aof.append(&frame).await?;
            }
        }

        debug!("Sending response to client: {}", response);
        conn.write_frame(&response).await?;
    }

    info!("Connection closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    async fn roundtrip(store: &Store, request: &[u8]) -> Vec<u8> {
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(handle_connection(
            server,
            "test".to_string(),
            FrameCodec::default(),
            store.clone(),
            None,
        ));

        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = vec![];
        client.read_to_end(&mut response).await.unwrap();
        task.await.unwrap().unwrap();

        response
    }

    #[tokio::test]
    async fn answers_every_request_in_order() {
        let store = Store::new();

        let response = roundtrip(
            &store,
            b"*1\r\n$4\r\nPING\r\n\
              *3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n\
              *2\r\n$3\r\nGET\r\n$1\r\na\r\n\
              *2\r\n$3\r\nGET\r\n$1\r\nb\r\n\
              *2\r\n$3\r\nSET\r\n$1\r\na\r\n\
              *1\r\n$7\r\nUNKNOWN\r\n\
              *2\r\n$3\r\nDEL\r\n$1\r\na\r\n",
        )
        .await;

        assert_eq!(
            response,
            b"+PONG\r\n\
              +OK\r\n\
              $1\r\n1\r\n\
              $-1\r\n\
              -ERR wrong number of arguments for 'set' command\r\n\
              +\r\n\
              :1\r\n"
        );
        assert_eq!(store.get("a"), None);
    }

    #[tokio::test]
    async fn unsupported_type_ends_the_connection() {
        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(handle_connection(
            server,
            "test".to_string(),
            FrameCodec::default(),
            Store::new(),
            None,
        ));

        client.write_all(b"+PING\r\n").await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.downcast_ref::<crate::frame::Error>().is_some());
    }

    #[tokio::test]
    async fn writes_are_appended_to_the_log() {
        let path = std::env::temp_dir().join(format!("rustdis-{}.aof", uuid::Uuid::new_v4()));
        let aof = Aof::open(&path, aof::DEFAULT_SYNC_INTERVAL).await.unwrap();
        let store = Store::new();

        let (mut client, server) = duplex(1024);
        let task = tokio::spawn(handle_connection(
            server,
            "test".to_string(),
            FrameCodec::default(),
            store.clone(),
            Some(aof.clone()),
        ));

        let requests = [
            Frame::command(["SET", "a", "1"]),
            Frame::command(["GET", "a"]),
            Frame::command(["SET", "broken"]),
            Frame::command(["HSET", "h", "f", "2"]),
            Frame::command(["DEL", "a"]),
        ];
        for request in &requests {
            client.write_all(&request.serialize()).await.unwrap();
        }
        client.shutdown().await.unwrap();
        let mut response = vec![];
        client.read_to_end(&mut response).await.unwrap();
        task.await.unwrap().unwrap();

        let mut logged = vec![];
        aof.replay(|frame| logged.push(frame)).await.unwrap();
        assert_eq!(
            logged,
            vec![requests[0].clone(), requests[3].clone(), requests[4].clone()]
        );

        let restored = Store::new();
        assert_eq!(load(&aof, &restored).await.unwrap(), 3);
        assert_eq!(restored.get("a"), None);
        assert_eq!(restored.hget("h", "f"), Some(Bytes::from("2")));

        aof.close().await.unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
