//! End-to-end tests for the Spartan server

use spartoi::config::BackendConfig;
use spartoi::http::request::Request;
use spartoi::http::response::{Response, ResponseBuilder, StatusCode};
use spartoi::proxy::{BackendPool, ProxyHandler};
use spartoi::server::connection::Connection;
use spartoi::server::{Dispatcher, Handler, Server, WorkerPool};
use spartoi::spartan::{SpartanClient, SpartanUrl};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start(handler: Arc<dyn Handler>) -> SocketAddr {
    start_with(Dispatcher::new(handler, Vec::new())).await
}

async fn start_with(dispatcher: Dispatcher) -> SocketAddr {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = Server::bind(&[addr], Arc::new(dispatcher), 1024)
        .await
        .unwrap();
    let addr = server.local_addrs()[0];
    tokio::spawn(server.run());
    addr
}

/// Sends `request` verbatim and reads until the server closes.
async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&reply).into_owned()
}

fn echo() -> Arc<dyn Handler> {
    Arc::new(|request: Request| async move {
        let text = format!(
            "{} {} {:?} {}",
            request.method.as_str(),
            request.path,
            request.query,
            String::from_utf8_lossy(&request.body)
        );
        ResponseBuilder::new(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(text.into_bytes())
            .build()
    })
}

fn answering(response: Response) -> Arc<dyn Handler> {
    Arc::new(move |_request: Request| {
        let response = response.clone();
        async move { response }
    })
}

#[tokio::test]
async fn test_server_success_response() {
    let addr = start(echo()).await;

    let reply = exchange(addr, b"localhost /echo?x=1 5\r\nhello").await;
    assert_eq!(reply, "2 text/plain\r\nPOST /echo Some(\"x=1\") hello");

    let reply = exchange(addr, b"localhost / 0\r\n").await;
    assert_eq!(reply, "2 text/plain\r\nGET / None ");
}

#[tokio::test]
async fn test_server_request_in_pieces() {
    let addr = start(echo()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"localhost /sl").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b"ow 3\r\nab").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b"c").await.unwrap();

    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "2 text/plain\r\nPOST /slow None abc");
}

#[tokio::test]
async fn test_server_extra_bytes_are_ignored() {
    let addr = start(echo()).await;

    let reply = exchange(addr, b"localhost /a 1\r\nxTRAILING GARBAGE").await;
    assert_eq!(reply, "2 text/plain\r\nPOST /a None x");
}

#[tokio::test]
async fn test_server_not_found() {
    let addr = start(answering(ResponseBuilder::new(StatusCode::NOT_FOUND).build())).await;

    let reply = exchange(addr, b"localhost /missing.gmi 0\r\n").await;
    assert_eq!(reply, "5 Path /missing.gmi Not Found\r\n");
}

#[tokio::test]
async fn test_server_bad_request() {
    let addr = start(answering(
        ResponseBuilder::new(StatusCode::BAD_REQUEST)
            .header("meta", "Name required")
            .build(),
    ))
    .await;

    let reply = exchange(addr, b"localhost / 0\r\n").await;
    assert_eq!(reply, "4 Name required\r\n");
}

#[tokio::test]
async fn test_server_redirect_becomes_prompt() {
    let addr = start(answering(
        ResponseBuilder::new(StatusCode::TEMPORARY_REDIRECT)
            .header("meta", "Your name")
            .build(),
    ))
    .await;

    let reply = exchange(addr, b"localhost /guestbook 0\r\n").await;
    assert_eq!(reply, "2 text/gemini\r\n=: /guestbook Your name");
}

#[tokio::test]
async fn test_server_invalid_request_line() {
    let addr = start(echo()).await;

    let reply = exchange(addr, b"just-a-host\r\n").await;
    assert_eq!(reply, "5 Invalid request header\r\n");
}

#[tokio::test]
async fn test_server_body_limit() {
    let addr = start(echo()).await;

    let reply = exchange(addr, b"localhost / 4096\r\n").await;
    assert_eq!(reply, "4 Request body too large\r\n");
}

#[tokio::test]
async fn test_server_peer_closes_early() {
    let addr = start(echo()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"localhost /incompl").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert!(reply.is_empty());
}

#[tokio::test]
async fn test_server_send_file_range() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"0123456789").unwrap();
    file.flush().unwrap();
    let path = file.path().to_path_buf();

    let ranged = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .send_file(path.clone(), 2, 5)
        .build();
    let addr = start(answering(ranged)).await;
    assert_eq!(exchange(addr, b"localhost /f 0\r\n").await, "2 text/plain\r\n23456");

    // A zero length sends the rest of the file
    let tail = ResponseBuilder::new(StatusCode::OK)
        .send_file(path, 7, 0)
        .build();
    let addr = start(answering(tail)).await;
    assert_eq!(
        exchange(addr, b"localhost /f 0\r\n").await,
        "2 application/octet-stream\r\n789"
    );
}

#[tokio::test]
async fn test_server_handler_panic_is_a_server_error() {
    let addr = start(Arc::new(|_request: Request| async move {
        if true {
            panic!("handler blew up");
        }
        ResponseBuilder::new(StatusCode::OK).build()
    }))
    .await;

    let reply = exchange(addr, b"localhost / 0\r\n").await;
    assert_eq!(reply, "5 Server error (HTTP status 500)\r\n");
}

#[tokio::test]
async fn test_server_runs_handlers_on_worker_pool() {
    let workers = WorkerPool::new(2).unwrap();
    assert_eq!(workers.len(), 2);

    let handler: Arc<dyn Handler> = Arc::new(|_request: Request| async move {
        let name = std::thread::current().name().unwrap_or_default().to_string();
        ResponseBuilder::new(StatusCode::OK).body(name.into_bytes()).build()
    });
    let addr = start_with(Dispatcher::new(handler, workers.handles())).await;

    let first = exchange(addr, b"localhost / 0\r\n").await;
    let second = exchange(addr, b"localhost / 0\r\n").await;

    assert!(first.contains("spartoi-worker-"));
    assert!(second.contains("spartoi-worker-"));
    assert_ne!(first, second, "requests should rotate across workers");
}

#[tokio::test]
async fn test_client_against_server() {
    let addr = start(echo()).await;
    let url = SpartanUrl::parse(&format!("spartan://{}/round/trip?q", addr)).unwrap();

    let response = SpartanClient::default().fetch(&url).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("text/plain"));
    assert_eq!(response.body, b"GET /round/trip Some(\"q\") ".to_vec());
}

#[tokio::test]
async fn test_server_through_http_proxy() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_url = format!("http://{}", upstream.local_addr().unwrap());
    tokio::spawn(async move {
        let (mut socket, _) = upstream.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await;
    });

    let pool = BackendPool::new(vec![BackendConfig {
        url: upstream_url,
        name: None,
    }]);
    let proxy = ProxyHandler::new(pool, Duration::from_secs(2), Duration::from_secs(2));
    let addr = start(Arc::new(proxy)).await;

    let reply = exchange(addr, b"localhost /nowhere 0\r\n").await;
    assert_eq!(reply, "5 Path /nowhere Not Found\r\n");
}

#[tokio::test]
async fn test_connection_over_duplex_stream() {
    let (mut client, server) = tokio::io::duplex(4096);
    let dispatcher = Arc::new(Dispatcher::new(echo(), Vec::new()));
    let peer: SocketAddr = "192.0.2.1:40000".parse().unwrap();

    let task = tokio::spawn(async move {
        let mut conn = Connection::new(server, peer, dispatcher, 1024);
        conn.run().await
    });

    client.write_all(b"capsule.example /duplex 2\r\nok").await.unwrap();
    let mut reply = String::new();
    client.read_to_string(&mut reply).await.unwrap();

    assert_eq!(reply, "2 text/plain\r\nPOST /duplex None ok");
    task.await.unwrap().unwrap();
}
