//! Fuzz target: reading one request off the wire.
//!
//! Feeds arbitrary bytes to `Router::handle` on an empty route table and
//! asserts that a response head is always written, whatever arrives.
//!
//! cargo fuzz run fuzz_request_line

#![no_main]

use breadboard::api::codec::{MAX_REQUEST_LINE, RequestLine};
use breadboard::api::router::Router;
use futures_lite::future::block_on;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(request) = RequestLine::parse(text) {
            assert!(request.path.len() <= MAX_REQUEST_LINE);
        }
    }

    let router = Router::new();
    let mut out = Vec::new();
    block_on(router.handle(data, &mut out, "fuzz"));
    assert!(out.starts_with(b"HTTP/1.0 "), "every request gets a status line");
});
