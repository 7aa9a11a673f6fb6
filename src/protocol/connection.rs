// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TCP transport to the controller.
//!
//! A [`Connection`] owns the write half of the socket. The read half is
//! moved into a spawned reader task that forwards raw chunks, tagged with
//! the connection's generation, to the session over an mpsc channel. The
//! generation lets the session ignore late events from a socket it has
//! already replaced.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ProtocolError;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Something that happened on a connection's read side.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Raw bytes as read from the socket.
    Data(Vec<u8>),
    /// The peer closed the connection.
    Closed,
    /// Reading failed.
    Error(ProtocolError),
}

/// Event tagged with the generation of the connection that produced it.
pub type TaggedEvent = (u64, ConnectionEvent);

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn connect_stream(address: &str, timeout: Duration) -> Result<TcpStream, ProtocolError> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProtocolError::Io(e)),
        Err(_) => Err(ProtocolError::Timeout(duration_ms(timeout))),
    }
}

/// Checks that something accepts TCP connections at `address`.
///
/// # Errors
///
/// Returns the connect failure or [`ProtocolError::Timeout`].
pub async fn check_reachability(address: &str, timeout: Duration) -> Result<(), ProtocolError> {
    let stream = connect_stream(address, timeout).await?;
    drop(stream);
    tracing::debug!(address, "Controller is reachable");
    Ok(())
}

/// An open controller connection.
#[derive(Debug)]
pub struct Connection {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    generation: u64,
}

impl Connection {
    /// Connects to `address` and starts the reader task.
    ///
    /// # Errors
    ///
    /// Returns the connect failure or [`ProtocolError::Timeout`].
    pub async fn open(
        address: &str,
        timeout: Duration,
        generation: u64,
        events: mpsc::Sender<TaggedEvent>,
    ) -> Result<Self, ProtocolError> {
        let stream = connect_stream(address, timeout).await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let (mut read_half, writer) = stream.into_split();

        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                let event = match read_half.read(&mut buf).await {
                    Ok(0) => ConnectionEvent::Closed,
                    Ok(n) => ConnectionEvent::Data(buf[..n].to_vec()),
                    Err(e) => ConnectionEvent::Error(ProtocolError::Io(e)),
                };
                let last = !matches!(event, ConnectionEvent::Data(_));
                if events.send((generation, event)).await.is_err() || last {
                    break;
                }
            }
            tracing::debug!(generation, "Reader task finished");
        });

        tracing::info!(address, generation, "Connected to controller");
        Ok(Self {
            writer,
            reader,
            generation,
        })
    }

    /// Generation number of this connection.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Writes and flushes `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the socket write fails.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shuts the socket down and stops the reader task.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(error = %e, "Socket shutdown failed");
        }
        self.reader.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn forwards_data_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (tx, mut rx) = mpsc::channel(8);

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let mut connection = Connection::open(&address, Duration::from_secs(5), 7, tx)
            .await
            .unwrap();
        connection.write(b"ping\n").await.unwrap();

        let (generation, event) = rx.recv().await.unwrap();
        assert_eq!(generation, 7);
        assert!(matches!(event, ConnectionEvent::Data(ref d) if d == b"ping\n"));

        server.await.unwrap();
        let (_, event) = rx.recv().await.unwrap();
        assert!(matches!(event, ConnectionEvent::Closed));
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = check_reachability(&address, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
