//! Integration tests driving a real [`Session`] over a loopback TCP socket.
//!
//! `empath-smtp`'s own integration tests exercise a client module that is out
//! of scope here, so these drive the server side directly with raw line I/O
//! instead of a client builder.

use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use vellum_common::traits::protocol::{Protocol, SessionHandler};
use vellum_smtp::{config::EngineConfig, hooks::DefaultHooks, Smtp, SmtpArgs};

async fn start_test_server() -> (u16, tokio::sync::broadcast::Sender<vellum_common::Signal>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let config = Arc::new(
        EngineConfig::builder(Arc::new(DefaultHooks))
            .with_hostname("mail.example.com")
            .build()
            .unwrap(),
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(4);
    let shutdown = shutdown_tx.clone();

    tokio::spawn(async move {
        let smtp = Smtp;
        while let Ok((stream, peer)) = listener.accept().await {
            let args = SmtpArgs {
                config: Arc::clone(&config),
                shutdown: shutdown.clone(),
            };
            let session = smtp.handle(stream, peer, Default::default(), args);
            tokio::spawn(async move {
                let _ = timeout(Duration::from_secs(5), session.run()).await;
            });
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, shutdown_tx)
}

async fn read_line(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line
}

#[tokio::test]
async fn greets_on_connect() {
    let (port, _shutdown) = start_test_server().await;
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read, _write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let greeting = read_line(&mut reader).await;
    assert!(greeting.starts_with("220 "));
}

#[tokio::test]
async fn ehlo_then_quit() {
    let (port, _shutdown) = start_test_server().await;
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let _ = read_line(&mut reader).await;

    write.write_all(b"EHLO client.example.com\r\n").await.unwrap();
    loop {
        let line = read_line(&mut reader).await;
        assert!(line.starts_with("250"), "unexpected reply: {line}");
        if line.starts_with("250 ") {
            break;
        }
    }

    write.write_all(b"QUIT\r\n").await.unwrap();
    let quit_reply = read_line(&mut reader).await;
    assert!(quit_reply.starts_with("221 "));
}

#[tokio::test]
async fn full_mail_transaction() {
    let (port, _shutdown) = start_test_server().await;
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let _ = read_line(&mut reader).await;

    write.write_all(b"EHLO client.example.com\r\n").await.unwrap();
    loop {
        let line = read_line(&mut reader).await;
        assert!(line.starts_with("250"), "unexpected reply: {line}");
        if line.starts_with("250 ") {
            break;
        }
    }

    write.write_all(b"MAIL FROM:<sender@example.com>\r\n").await.unwrap();
    assert!(read_line(&mut reader).await.starts_with("250 "));

    write.write_all(b"RCPT TO:<recipient@example.com>\r\n").await.unwrap();
    assert!(read_line(&mut reader).await.starts_with("250 "));

    write.write_all(b"DATA\r\n").await.unwrap();
    assert!(read_line(&mut reader).await.starts_with("354 "));

    write
        .write_all(b"Subject: test\r\n\r\nhello, world\r\n.\r\n")
        .await
        .unwrap();
    assert!(read_line(&mut reader).await.starts_with("250 "));

    write.write_all(b"QUIT\r\n").await.unwrap();
    assert!(read_line(&mut reader).await.starts_with("221 "));
}

#[tokio::test]
async fn rejects_mail_before_helo_gracefully() {
    let (port, _shutdown) = start_test_server().await;
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let _ = read_line(&mut reader).await;

    write.write_all(b"MAIL FROM:<sender@example.com>\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("503 "), "unexpected reply: {reply}");
}

#[tokio::test]
async fn unknown_verb_is_rejected() {
    let (port, _shutdown) = start_test_server().await;
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let _ = read_line(&mut reader).await;

    // Unrecognised verbs fail to parse entirely, distinct from a recognised
    // command that is merely invalid in the current state (503).
    write.write_all(b"FROBNICATE\r\n").await.unwrap();
    let reply = read_line(&mut reader).await;
    assert!(reply.starts_with("500 "), "unexpected reply: {reply}");
}
