//! Outbound HTTP notifier for remote-notify actions.
//!
//! Opens a TCP connection, writes a bare `GET <path> HTTP/1.1` request,
//! and closes without reading the reply.  The connect is bounded by
//! [`CONNECT_TIMEOUT`] so an unreachable host cannot stall an action list
//! for longer than that.

use core::time::Duration;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};

use async_io_mini::{Async, Timer};
use futures_lite::{AsyncWriteExt, future};

use crate::app::ports::{LocalBoxFuture, Notifier};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// The request line and blank line sent for one notification.
pub fn request_bytes(path: &str) -> Vec<u8> {
    format!("GET {path} HTTP/1.1\r\n\r\n").into_bytes()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpNotifier;

impl TcpNotifier {
    async fn send(host: &str, port: u16, path: &str) -> io::Result<()> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {host}")))?;

        let connect = async { Async::<TcpStream>::connect(addr).await };
        let timeout = async {
            Timer::after(CONNECT_TIMEOUT).await;
            Err(io::Error::new(io::ErrorKind::TimedOut, format!("connect to {addr} timed out")))
        };
        let mut stream = future::or(connect, timeout).await?;

        stream.write_all(&request_bytes(path)).await?;
        stream.flush().await?;
        stream.close().await
    }
}

impl Notifier for TcpNotifier {
    fn get<'a>(&'a self, host: &'a str, port: u16, path: &'a str) -> LocalBoxFuture<'a, io::Result<()>> {
        Box::pin(Self::send(host, port, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn request_is_a_bare_get() {
        assert_eq!(request_bytes("/hook?x=1"), b"GET /hook?x=1 HTTP/1.1\r\n\r\n".to_vec());
    }

    #[test]
    fn sends_request_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut got = String::new();
            conn.read_to_string(&mut got).unwrap();
            got
        });

        futures_lite::future::block_on(TcpNotifier.get("127.0.0.1", port, "/ping")).unwrap();
        assert_eq!(server.join().unwrap(), "GET /ping HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn refused_connection_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        assert!(futures_lite::future::block_on(TcpNotifier.get("127.0.0.1", port, "/")).is_err());
    }
}
