//! Localhost HTTP bridge for the webview proxy.
//!
//! Webviews fetch their resources over plain HTTP from a loopback port;
//! this server translates each request into a proxied host fetch. Binding
//! `127.0.0.1:0` keeps the port unguessable across launches, the endpoint
//! is read-only, and the data is the user's own notebook content.
//!
//! Endpoints:
//! - `GET /resource/{path}` — proxied resource bytes with `Content-Type`
//!   and `ETag` from the host's answer
//! - `GET /health` — 200 OK
//!
//! The server runs on the caller's tokio runtime and shuts down when the
//! process exits; no explicit cancellation is implemented yet.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{error, info};
use tokio::net::TcpListener;

use crate::proxy::{ProxyReply, ResourceRequest, WebviewProxy};

/// Start the bridge on a random localhost port.
///
/// Returns the port the server is listening on. The server runs as a
/// spawned task on the current tokio runtime.
pub async fn start_proxy_server(proxy: Arc<WebviewProxy>) -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    info!(
        "[proxy-server] Listening on http://127.0.0.1:{} for webview {}",
        port,
        proxy.webview_id()
    );

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let proxy = proxy.clone();
                    let io = TokioIo::new(stream);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| handle_request(req, proxy.clone()));
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            if !e.is_incomplete_message() && !e.is_canceled() {
                                error!("[proxy-server] Connection error: {}", e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("[proxy-server] Accept error: {}", e);
                }
            }
        }
    });

    Ok(port)
}

/// Handle a single HTTP request.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    proxy: Arc<WebviewProxy>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let method = req.method().as_str().to_string();

    let response = if path == "/health" {
        text_response(StatusCode::OK, "OK")
    } else if let Some(resource_path) = path.strip_prefix("/resource") {
        serve_resource(&proxy, method, resource_path, query).await
    } else {
        text_response(StatusCode::NOT_FOUND, "Not Found")
    };

    Ok(response)
}

/// Forward a resource fetch through the proxy and map the reply to HTTP.
async fn serve_resource(
    proxy: &WebviewProxy,
    method: String,
    path: &str,
    query: String,
) -> Response<Full<Bytes>> {
    let request = ResourceRequest {
        method,
        path: path.to_string(),
        query,
        ..ResourceRequest::get(path)
    };

    match proxy.fetch_resource(request).await {
        Ok(ProxyReply::Payload {
            body, mime, etag, ..
        }) => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", mime.as_deref().unwrap_or("application/octet-stream"))
                .header("Content-Length", body.len().to_string())
                .header("Access-Control-Allow-Origin", "*");
            if let Some(etag) = etag {
                builder = builder.header("ETag", etag);
            }
            builder.body(Full::new(body)).unwrap_or_else(|_| {
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            })
        }
        Ok(ProxyReply::NotFound) => text_response(StatusCode::NOT_FOUND, "Not Found"),
        Ok(ProxyReply::MethodNotAllowed) => {
            text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }
        Err(e) => {
            error!("[proxy-server] Host unavailable: {}", e);
            text_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}

/// Build a simple text response.
fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("response builder should not fail")
}
