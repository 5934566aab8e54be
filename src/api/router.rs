//! Route table and request dispatch.
//!
//! ```text
//!  connection ─▶ read request line ─▶ skip headers ─▶ lookup(path)
//!                      │ malformed                      │
//!                      ▼                                ├─ handler(args) ─▶ 200 / 400 / 500
//!                     400                               ├─ /docs, /logs  ─▶ 200 (HTML)
//!                                                       ├─ "" or "/"     ─▶ index
//!                                                       └─ missing       ─▶ 404
//!  ─▶ status line, one header, body in 128-byte chunks, close
//! ```
//!
//! Routes are registered during startup and the table is shared read-only
//! afterwards.  Documentation sits in a companion table keyed by
//! [`RouteId`] and is rendered once, on first use.

use core::cell::OnceCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use futures_lite::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log::{debug, error, info, warn};
use serde_json::{Value, json};

use super::codec::{CHUNK_SIZE, ContentType, MAX_HEADERS, MAX_REQUEST_LINE, RequestError, RequestLine, Status, response_head};
use super::pages;
use crate::adapters::log_sink::LogBuffer;
use crate::app::device::{Args, Param, Reply};
use crate::app::ports::LocalBoxFuture;
use crate::error::OperationError;

/// A route handler: keyword arguments in, reply out.
pub type Handler = Rc<dyn Fn(Args) -> LocalBoxFuture<'static, Result<Reply, OperationError>>>;

/// Wrap a closure as a [`Handler`].
pub fn handler_fn<F>(f: F) -> Handler
where
    F: Fn(Args) -> LocalBoxFuture<'static, Result<Reply, OperationError>> + 'static,
{
    Rc::new(f)
}

/// Handle to a registered route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteOptions {
    /// Listed on `/docs`.
    pub documented: bool,
    /// Linked from the index and the navigation bar.
    pub in_nav: bool,
}

impl RouteOptions {
    pub const API: Self = Self {
        documented: true,
        in_nav: false,
    };
    pub const PAGE: Self = Self {
        documented: false,
        in_nav: true,
    };
}

/// Documentation attached to a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDoc {
    /// Heading the route is listed under (the device or `chains`).
    pub group: String,
    pub group_summary: String,
    pub summary: String,
    pub params: &'static [Param],
}

enum Target {
    Handler(Handler),
    Docs,
    Logs(LogBuffer),
}

struct Route {
    path: String,
    target: Target,
    options: RouteOptions,
    doc: Option<RouteDoc>,
}

/// What one request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub content_type: ContentType,
    pub body: String,
    /// Error text for the request log line.
    pub error: Option<String>,
}

impl Response {
    fn html(status: Status, body: String) -> Self {
        Self {
            status,
            content_type: ContentType::Html,
            body,
            error: None,
        }
    }

    fn envelope(status: Status, args: &Args, response: Value) -> Self {
        let body = json!({
            "parameters": args.to_value(),
            "response": response,
            "status": status.code(),
        });
        Self {
            status,
            content_type: ContentType::Json,
            body: body.to_string(),
            error: None,
        }
    }

    fn failed(status: Status, args: &Args, e: &OperationError) -> Self {
        Self {
            error: Some(e.to_string()),
            ..Self::envelope(status, args, json!({ "error": e.to_string() }))
        }
    }

    fn bad_request_line(e: &RequestError) -> Self {
        Self {
            error: Some(e.to_string()),
            ..Self::html(Status::BadRequest, format!("<h1>400 - Bad Request</h1><p>{e}</p>"))
        }
    }
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    by_path: HashMap<String, usize>,
    docs: OnceCell<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` at `path`.  Registering a path twice replaces the
    /// earlier handler and its documentation.
    pub fn register(&mut self, path: &str, handler: Handler, options: RouteOptions) -> RouteId {
        self.insert(path, Target::Handler(handler), options)
    }

    /// Serve the generated documentation at `/docs`.
    pub fn register_docs(&mut self) -> RouteId {
        self.insert("/docs", Target::Docs, RouteOptions::PAGE)
    }

    /// Serve the retained log lines at `/logs`.
    pub fn register_logs(&mut self, buffer: LogBuffer) -> RouteId {
        self.insert("/logs", Target::Logs(buffer), RouteOptions::PAGE)
    }

    fn insert(&mut self, path: &str, target: Target, options: RouteOptions) -> RouteId {
        if self.docs.take().is_some() {
            debug!("route `{path}` added after the documentation was rendered");
        }
        let route = Route {
            path: path.to_owned(),
            target,
            options,
            doc: None,
        };
        if let Some(&i) = self.by_path.get(path) {
            warn!("route `{path}` registered twice; the last registration wins");
            self.routes[i] = route;
            return RouteId(i);
        }
        self.by_path.insert(path.to_owned(), self.routes.len());
        self.routes.push(route);
        RouteId(self.routes.len() - 1)
    }

    /// Attach documentation to a registered route.
    pub fn describe(&mut self, id: RouteId, doc: RouteDoc) {
        if let Some(route) = self.routes.get_mut(id.0) {
            route.doc = Some(doc);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Registered paths in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn nav_paths(&self) -> impl Iterator<Item = &str> {
        self.routes
            .iter()
            .filter(|r| r.options.in_nav)
            .map(|r| r.path.as_str())
    }

    /// The documentation page, rendered on first call.
    pub fn documentation(&self) -> &str {
        self.docs.get_or_init(|| {
            let documented = self.routes.iter().filter(|r| r.options.documented).filter_map(|r| {
                r.doc.as_ref().map(|doc| (r.path.as_str(), doc))
            });
            format!("{}{}", pages::nav(self.nav_paths()), pages::docs(documented))
        })
    }

    /// Route one request to its handler.
    pub async fn respond(&self, path: &str, args: Args) -> Response {
        let Some(route) = self.by_path.get(path).map(|&i| &self.routes[i]) else {
            if path.is_empty() || path == "/" {
                return Response::html(Status::Ok, pages::index(self.nav_paths()));
            }
            return Response::html(Status::NotFound, pages::not_found(path));
        };

        match &route.target {
            Target::Handler(handler) => match handler(args.clone()).await {
                Ok(Reply::Json(value)) => Response::envelope(Status::Ok, &args, value),
                Ok(Reply::Text(body)) => Response::html(Status::Ok, body),
                Err(e @ OperationError::BadRequest(_)) => Response::failed(Status::BadRequest, &args, &e),
                Err(e) => Response::failed(Status::InternalError, &args, &e),
            },
            Target::Docs => Response::html(Status::Ok, self.documentation().to_owned()),
            Target::Logs(buffer) => Response::html(
                Status::Ok,
                format!("{}{}", pages::nav(self.nav_paths()), pages::logs(&buffer.lines())),
            ),
        }
    }

    /// Serve one connection: read the request, respond, close.  Every
    /// request is logged once with its path, status and peer.
    pub async fn handle<R, W>(&self, mut reader: R, mut writer: W, peer: &str)
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (path, response) = match read_request(&mut reader).await {
            Ok(request) => {
                let response = self.respond(&request.path, Args::from_pairs(request.query)).await;
                (request.path, response)
            }
            Err(e) => (String::new(), Response::bad_request_line(&e)),
        };

        let code = response.status.code();
        match (response.status, &response.error) {
            (Status::Ok, _) => info!("{peer} \"{path}\" {code}"),
            (Status::NotFound, _) => error!("{peer} \"{path}\" {code}"),
            (Status::BadRequest, Some(e)) => warn!("{peer} \"{path}\" {code}: {e}"),
            (_, Some(e)) => error!("{peer} \"{path}\" {code}: {e}"),
            (_, None) => error!("{peer} \"{path}\" {code}"),
        }

        if let Err(e) = write_response(&mut writer, &response).await {
            warn!("{peer}: response to \"{path}\" not delivered: {e}");
        }
    }
}

/// Read the request line and discard headers up to the blank line.
async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<RequestLine, RequestError> {
    let mut line = String::new();
    let mut limited = (&mut *reader).take(MAX_REQUEST_LINE as u64 + 2);
    match limited.read_line(&mut line).await {
        Ok(0) | Err(_) => return Err(RequestError::Malformed),
        Ok(_) if !line.ends_with('\n') && line.len() > MAX_REQUEST_LINE => return Err(RequestError::TooLong),
        Ok(_) => {}
    }

    let mut header = String::new();
    for _ in 0..=MAX_HEADERS {
        header.clear();
        let mut limited = (&mut *reader).take(MAX_REQUEST_LINE as u64 + 2);
        match limited.read_line(&mut header).await {
            Ok(0) | Err(_) => return RequestLine::parse(&line),
            Ok(_) if !header.ends_with('\n') && header.len() > MAX_REQUEST_LINE => {
                return Err(RequestError::HeadersTooLarge);
            }
            Ok(_) if header.trim_end_matches(['\r', '\n']).is_empty() => return RequestLine::parse(&line),
            Ok(_) => {}
        }
    }
    Err(RequestError::HeadersTooLarge)
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> io::Result<()> {
    writer
        .write_all(response_head(response.status, response.content_type).as_bytes())
        .await?;
    for chunk in response.body.as_bytes().chunks(CHUNK_SIZE) {
        writer.write_all(chunk).await?;
    }
    writer.flush().await?;
    writer.close().await
}
