//! TCP accept loop.  Each connection is served on its own task so a slow
//! client cannot hold up the next one.
//!
//! Connection tasks share the executor with the device loops, so at most
//! [`MAX_CONNECTIONS`] are in flight; a connection accepted beyond that is
//! closed straight away.

use core::cell::Cell;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;

use async_io_mini::Async;
use futures_lite::future::yield_now;
use futures_lite::io::{BufReader, split};
use log::{info, warn};

use super::router::Router;
use crate::scheduler::{MAX_TASKS, Runtime};

/// Connections served concurrently.
pub const MAX_CONNECTIONS: usize = 8;

const _: () = assert!(MAX_CONNECTIONS < MAX_TASKS / 4);

/// One occupied connection slot, released on drop.
struct Slot(Rc<Cell<usize>>);

impl Slot {
    fn claim(in_flight: &Rc<Cell<usize>>) -> Option<Self> {
        if in_flight.get() >= MAX_CONNECTIONS {
            return None;
        }
        in_flight.set(in_flight.get() + 1);
        Some(Self(in_flight.clone()))
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Bind the listening socket.
pub fn bind(addr: SocketAddr) -> io::Result<Async<TcpListener>> {
    let listener = Async::<TcpListener>::bind(addr)?;
    info!("API listening on {addr}");
    Ok(listener)
}

/// Accept connections forever, handing each to `router` on a new task.
pub async fn serve(listener: Async<TcpListener>, router: Rc<Router>, runtime: Runtime) {
    let in_flight = Rc::new(Cell::new(0));
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => match Slot::claim(&in_flight) {
                Some(slot) => {
                    let router = router.clone();
                    runtime.spawn(async move {
                        let _slot = slot;
                        let (reader, writer) = split(stream);
                        router.handle(BufReader::new(reader), writer, &peer.to_string()).await;
                    });
                }
                None => {
                    warn!("{peer}: closed, {MAX_CONNECTIONS} connections already open");
                    drop(stream);
                }
            },
            Err(e) => warn!("accept failed: {e}"),
        }
        // Let the connection tasks and device loops run between accepts.
        yield_now().await;
    }
}
