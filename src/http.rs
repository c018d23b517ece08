//! HTTP/1.1 binding for a `Dispatcher`.
//!
//! This is the transport collaborator: it reads the request body, hands the
//! bytes to the dispatcher and writes back the single document it returns.
//! Failures to read the body never reach the dispatcher and are answered
//! with plain HTTP errors.

use std::convert::Infallible;
use std::net::TcpListener;
use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ServeError;

pub struct HttpServer<C> {
    dispatcher: Arc<Dispatcher<C>>,
    config: ServerConfig,
}

impl<C: Send + Sync + 'static> HttpServer<C> {
    pub fn new(dispatcher: Arc<Dispatcher<C>>, config: ServerConfig) -> Self {
        HttpServer { dispatcher, config }
    }

    /// Binds `config.bind` and serves until the process stops.
    pub async fn serve(self) -> Result<(), ServeError> {
        let listener = TcpListener::bind(self.config.bind)?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), ServeError> {
        listener.set_nonblocking(true)?;
        info!(
            "serving XML-RPC on http://{}{}",
            listener.local_addr()?,
            self.config.path
        );

        let server = Arc::new(self);
        let make_svc = make_service_fn(move |_conn| {
            let server = server.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.respond(req).await) }
                }))
            }
        });

        Server::from_tcp(listener)?.serve(make_svc).await?;
        Ok(())
    }

    async fn respond(&self, req: Request<Body>) -> Response<Body> {
        if req.uri().path() != self.config.path {
            return status(StatusCode::NOT_FOUND);
        }
        if req.method() != Method::POST {
            return status(StatusCode::METHOD_NOT_ALLOWED);
        }

        let body = match read_body(req.into_body(), self.config.max_body_bytes).await {
            Ok(body) => body,
            Err(code) => return status(code),
        };
        debug!("received {} byte request", body.len());

        let document = self.dispatcher.handle(&body).await;
        Response::builder()
            .header(CONTENT_TYPE, "text/xml")
            .header(CONTENT_LENGTH, document.len())
            .body(Body::from(document))
            .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR))
    }
}

async fn read_body(mut body: Body, limit: usize) -> Result<Vec<u8>, StatusCode> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|e| {
            warn!("failed to read request body: {}", e);
            StatusCode::BAD_REQUEST
        })?;
        if buf.len() + chunk.len() > limit {
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn status(code: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = code;
    response
}
