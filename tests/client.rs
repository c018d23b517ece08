use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};

use xmlrpc_kit::error::TransportError;
use xmlrpc_kit::protocol::{INVALID_PARAMS, METHOD_NOT_FOUND};
use xmlrpc_kit::{
    Client, ClientConfig, ClientError, Dispatcher, HandlerError, HandlerResult, HttpServer, MethodCall, Registry,
    ServerConfig, Struct, Value,
};

struct Data {
    test: i32,
}

async fn echo(params: Vec<Value>, _ctx: Arc<Data>) -> HandlerResult {
    params
        .into_iter()
        .next()
        .ok_or_else(|| HandlerError::fault(INVALID_PARAMS, "echo takes one param"))
}

async fn context(_params: Vec<Value>, ctx: Arc<Data>) -> HandlerResult {
    Ok(Value::Int(ctx.test))
}

fn local_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn spawn_server(config: impl FnOnce(SocketAddr) -> ServerConfig) -> SocketAddr {
    let (listener, addr) = local_listener();
    let registry = Registry::new()
        .with_method("echo", echo)
        .and_then(|r| r.with_method("context", context))
        .unwrap();
    let dispatcher = Arc::new(Dispatcher::new(registry, Data { test: 999 }));
    let server = HttpServer::new(dispatcher, config(addr));
    tokio::spawn(server.serve_on(listener));
    addr
}

/// Serves the same canned response to every request.
fn spawn_canned(status: StatusCode, body: &'static str) -> SocketAddr {
    let (listener, addr) = local_listener();
    listener.set_nonblocking(true).unwrap();
    let make_svc = make_service_fn(move |_conn| async move {
        Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| async move {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            Ok::<_, Infallible>(response)
        }))
    });
    let server = Server::from_tcp(listener).unwrap().serve(make_svc);
    tokio::spawn(server);
    addr
}

fn client(addr: SocketAddr, path: &str) -> Client {
    Client::new(ClientConfig::new(addr.ip().to_string(), addr.port()).path(path)).unwrap()
}

#[tokio::test]
async fn echo_roundtrip() {
    let addr = spawn_server(ServerConfig::new);

    let mut data = Struct::new();
    data.insert("test".to_string(), Value::Int(999));
    let result = client(addr, "/")
        .method_call("echo", &[Value::Struct(data.clone())])
        .await
        .unwrap();

    assert_eq!(Value::Struct(data), result);
}

#[tokio::test]
async fn context_is_served() {
    let addr = spawn_server(|addr| ServerConfig::new(addr).path("/RPC2"));

    let call = MethodCall::new("context");
    let result = client(addr, "/RPC2").call(&call).await.unwrap();
    assert_eq!(Value::Int(999), result);
}

#[tokio::test]
async fn unknown_method_is_a_fault() {
    let addr = spawn_server(ServerConfig::new);

    match client(addr, "/").method_call("nope", &[]).await {
        Err(ClientError::Fault(fault)) => {
            assert_eq!(METHOD_NOT_FOUND, fault.code);
            assert_eq!("requested method 'nope' not found", fault.message);
        }
        other => panic!("expected a fault, got {:?}", other),
    }
}

#[tokio::test]
async fn handler_fault_reaches_the_caller() {
    let addr = spawn_server(ServerConfig::new);

    match client(addr, "/").method_call("echo", &[]).await {
        Err(ClientError::Fault(fault)) => assert_eq!(INVALID_PARAMS, fault.code),
        other => panic!("expected a fault, got {:?}", other),
    }
}

#[tokio::test]
async fn wrong_path_is_not_found() {
    let addr = spawn_server(|addr| ServerConfig::new(addr).path("/RPC2"));

    match client(addr, "/other").method_call("context", &[]).await {
        Err(ClientError::Transport(TransportError::Status(status))) => {
            assert_eq!(StatusCode::NOT_FOUND, status)
        }
        other => panic!("expected a transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let addr = spawn_server(|addr| ServerConfig::new(addr).max_body_bytes(64));

    let big = Value::String("x".repeat(1024));
    match client(addr, "/").method_call("echo", &[big]).await {
        Err(ClientError::Transport(TransportError::Status(status))) => {
            assert_eq!(StatusCode::PAYLOAD_TOO_LARGE, status)
        }
        other => panic!("expected a transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn only_post_is_accepted() {
    let addr = spawn_server(ServerConfig::new);

    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("http://{}/", addr))
        .body(Body::empty())
        .unwrap();
    let response = hyper::Client::new().request(request).await.unwrap();
    assert_eq!(StatusCode::METHOD_NOT_ALLOWED, response.status());
}

#[tokio::test]
async fn server_speaks_text_xml() {
    let addr = spawn_server(ServerConfig::new);

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{}/", addr))
        .body(Body::from("not xml at all"))
        .unwrap();
    let response = hyper::Client::new().request(request).await.unwrap();
    assert_eq!(StatusCode::OK, response.status());
    assert_eq!(
        Some("text/xml"),
        response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    );

    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let fault = xmlrpc_kit::MethodResponse::from_bytes(&body)
        .unwrap()
        .into_result()
        .unwrap_err();
    assert_eq!(-32700, fault.code);
}

#[tokio::test]
async fn closed_port_is_a_transport_error() {
    let (listener, addr) = local_listener();
    drop(listener);

    match client(addr, "/").method_call("echo", &[Value::Int(1)]).await {
        Err(ClientError::Transport(_)) => {}
        other => panic!("expected a transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn unencodable_param_is_not_sent() {
    let (listener, addr) = local_listener();
    drop(listener);

    match client(addr, "/").method_call("echo", &[Value::Double(f64::NAN)]).await {
        Err(ClientError::Param(_)) => {}
        other => panic!("expected a parameter error, got {:?}", other),
    }
}

#[tokio::test]
async fn garbage_response_is_a_parse_error() {
    let addr = spawn_canned(StatusCode::OK, "<html>nope</html>");

    match client(addr, "/").method_call("echo", &[Value::Int(1)]).await {
        Err(ClientError::Parse(_)) => {}
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[tokio::test]
async fn error_status_is_a_transport_error() {
    let addr = spawn_canned(StatusCode::INTERNAL_SERVER_ERROR, "");

    match client(addr, "/").method_call("echo", &[Value::Int(1)]).await {
        Err(ClientError::Transport(TransportError::Status(status))) => {
            assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status)
        }
        other => panic!("expected a transport error, got {:?}", other),
    }
}
