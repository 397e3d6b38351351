//! End-to-end sessions over real TCP connections.

use std::net::SocketAddr;
use std::time::Duration;

use puma_shell::protocol::{FAREWELL, GREETING, PROMPT};
use puma_shell::{CommandShellServer, Server, ShellExecutor};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(max_sessions: usize) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shell = CommandShellServer::trusted(ShellExecutor::default());
        let server = Server::from_listener(listener, shell, max_sessions);
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async move {
            stopped.await.ok();
        }));
        Self { addr, stop, handle }
    }

    async fn shutdown(self) {
        self.stop.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn expect(&mut self, expected: &str) {
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(Duration::from_secs(10), self.reader.read_exact(&mut buf))
            .await
            .expect("server did not answer in time")
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&buf), expected);
    }

    async fn expect_greeting(&mut self) {
        self.expect(&format!("{}\n{}", GREETING, PROMPT)).await;
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn expect_closed(&mut self) {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.unwrap();
        assert_eq!(n, 0, "unexpected trailing data: {:?}", line);
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let server = TestServer::start(4).await;
    let mut client = Client::connect(server.addr).await;

    client.expect_greeting().await;
    client.send("echo hi").await;
    client.expect("hi\n> ").await;
    client.send("exit").await;
    client.expect(&format!("{}\n", FAREWELL)).await;
    client.expect_closed().await;

    server.shutdown().await;
}

#[tokio::test]
async fn empty_line_gets_only_a_prompt() {
    let server = TestServer::start(4).await;
    let mut client = Client::connect(server.addr).await;

    client.expect_greeting().await;
    client.send("").await;
    client.expect(PROMPT).await;
    client.send("false; echo done").await;
    client.expect("done\n> ").await;
    client.send("quit").await;
    client.expect(&format!("{}\n", FAREWELL)).await;
    client.expect_closed().await;

    server.shutdown().await;
}

#[tokio::test]
async fn concurrent_sessions_get_their_own_replies() {
    let server = TestServer::start(4).await;
    let mut a = Client::connect(server.addr).await;
    let mut b = Client::connect(server.addr).await;

    a.expect_greeting().await;
    b.expect_greeting().await;

    // A is busy in a slow command while B keeps working
    a.send("sleep 1; echo from-a").await;
    b.send("echo from-b").await;
    b.expect("from-b\n> ").await;
    a.expect("from-a\n> ").await;

    a.send("exit").await;
    b.send("exit").await;
    a.expect(&format!("{}\n", FAREWELL)).await;
    b.expect(&format!("{}\n", FAREWELL)).await;

    server.shutdown().await;
}

#[tokio::test]
async fn abrupt_disconnect_does_not_affect_other_sessions() {
    let server = TestServer::start(4).await;

    let mut gone = Client::connect(server.addr).await;
    gone.expect_greeting().await;
    drop(gone);

    let mut client = Client::connect(server.addr).await;
    client.expect_greeting().await;
    client.send("echo still-here").await;
    client.expect("still-here\n> ").await;

    server.shutdown().await;
}

#[tokio::test]
async fn sessions_beyond_limit_wait_for_a_slot() {
    let server = TestServer::start(1).await;

    let mut first = Client::connect(server.addr).await;
    first.expect_greeting().await;

    let mut second = Client::connect(server.addr).await;
    let mut byte = [0u8; 1];
    let waited = tokio::time::timeout(
        Duration::from_millis(300),
        second.reader.read_exact(&mut byte),
    )
    .await;
    assert!(waited.is_err(), "second session was served while the only slot was taken");

    first.send("exit").await;
    first.expect(&format!("{}\n", FAREWELL)).await;

    second.expect_greeting().await;
    second.send("exit").await;
    second.expect(&format!("{}\n", FAREWELL)).await;

    server.shutdown().await;
}
