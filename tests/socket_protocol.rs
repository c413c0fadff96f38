//! Duplex-socket binding tests over a real TCP connection

use std::sync::Arc;
use std::time::Duration;

use sha1::{Digest, Sha1};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use stash_server::db::{self, SqliteItemStore};
use stash_server::hooks::HookBus;
use stash_server::socket;
use stash_server::upload::{StreamRegistry, UploadService};

fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

async fn engine(dir: &TempDir) -> UploadService {
    let hooks = HookBus::default();
    let registry = StreamRegistry::new(
        dir.path().join("uploads"),
        Duration::from_secs(60),
        hooks.clone(),
    )
    .await
    .unwrap();
    let url = format!("sqlite://{}/items.db", dir.path().display());
    let pool = db::create_pool(&url).await.unwrap();
    let store = Arc::new(SqliteItemStore::new(pool));
    UploadService::new(registry, store, hooks, 12, 10)
}

/// Spawn the socket binding on an ephemeral port and connect a client.
async fn connect(service: &UploadService, max_frame: usize) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(socket::serve(listener, service.clone(), max_frame));
    TcpStream::connect(addr).await.unwrap()
}

async fn send_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(payload).await.unwrap();
}

async fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

async fn roundtrip(stream: &mut TcpStream, payload: &[u8]) -> Vec<u8> {
    send_frame(stream, payload).await;
    read_reply(stream).await
}

#[tokio::test]
async fn data_before_bind_is_rejected_and_never_reaches_a_stream() {
    let dir = TempDir::new().unwrap();
    let service = engine(&dir).await;
    let stream_id = service.create_stream("bin", None).await.unwrap();

    let mut client = connect(&service, 1024).await;
    assert_eq!(roundtrip(&mut client, b"data:stray bytes").await, b"err:unbound");
    assert_eq!(roundtrip(&mut client, b"\x00\x01\x02").await, b"err:unbound");

    // nothing may have reached any stream's file
    let temp_len = tokio::fs::metadata(service.registry().temp_path(&stream_id))
        .await
        .unwrap()
        .len();
    assert_eq!(temp_len, 0);
}

#[tokio::test]
async fn bound_frames_are_equivalent_to_direct_pipeline_calls() {
    let dir = TempDir::new().unwrap();
    let service = engine(&dir).await;

    // reference stream fed through the pipeline directly
    let direct_id = service.create_stream("bin", None).await.unwrap();
    let direct = service.registry().lookup(&direct_id).await.unwrap();
    service.append_chunk(&direct, b"\xAA\xBB", None).await.unwrap();
    service.append_chunk(&direct, b"\xCC\xDD", None).await.unwrap();
    let expected = service.seal_digest(&direct).await.unwrap();

    // same bytes through the socket: one raw frame, one inline-data frame
    let socket_id = service.create_stream("bin", None).await.unwrap();
    let mut client = connect(&service, 1024).await;
    assert_eq!(
        roundtrip(&mut client, format!("bind:{}", socket_id).as_bytes()).await,
        b"ok:bound"
    );
    assert_eq!(roundtrip(&mut client, b"\xAA\xBB").await, b"ok:data");
    assert_eq!(roundtrip(&mut client, b"data:\xCC\xDD").await, b"ok:data");

    let record = service.registry().lookup(&socket_id).await.unwrap();
    assert_eq!(service.seal_digest(&record).await.unwrap(), expected);
    assert_eq!(expected, sha1_hex(b"\xAA\xBB\xCC\xDD"));
}

#[tokio::test]
async fn bind_to_unknown_stream_reports_not_found_and_stays_unbound() {
    let dir = TempDir::new().unwrap();
    let service = engine(&dir).await;

    let mut client = connect(&service, 1024).await;
    let bogus = format!("bind:{}", "z".repeat(32));
    assert_eq!(
        roundtrip(&mut client, bogus.as_bytes()).await,
        b"err:stream-not-found"
    );
    assert_eq!(roundtrip(&mut client, b"chunk").await, b"err:unbound");
}

#[tokio::test]
async fn failed_rebind_clears_the_previous_binding() {
    let dir = TempDir::new().unwrap();
    let service = engine(&dir).await;
    let stream_id = service.create_stream("bin", None).await.unwrap();

    let mut client = connect(&service, 1024).await;
    assert_eq!(
        roundtrip(&mut client, format!("bind:{}", stream_id).as_bytes()).await,
        b"ok:bound"
    );
    assert_eq!(roundtrip(&mut client, b"first").await, b"ok:data");

    // rebind to a dead id drops the old binding instead of keeping it
    let bogus = format!("bind:{}", "z".repeat(32));
    assert_eq!(
        roundtrip(&mut client, bogus.as_bytes()).await,
        b"err:stream-not-found"
    );
    assert_eq!(roundtrip(&mut client, b"second").await, b"err:unbound");

    // only the frame accepted while bound landed in the file
    let temp_len = tokio::fs::metadata(service.registry().temp_path(&stream_id))
        .await
        .unwrap()
        .len();
    assert_eq!(temp_len, b"first".len() as u64);
}

#[tokio::test]
async fn rebinding_mid_connection_switches_streams() {
    let dir = TempDir::new().unwrap();
    let service = engine(&dir).await;
    let first = service.create_stream("bin", None).await.unwrap();
    let second = service.create_stream("bin", None).await.unwrap();

    let mut client = connect(&service, 1024).await;
    assert_eq!(
        roundtrip(&mut client, format!("bind:{}", first).as_bytes()).await,
        b"ok:bound"
    );
    assert_eq!(roundtrip(&mut client, b"one").await, b"ok:data");
    assert_eq!(
        roundtrip(&mut client, format!("bind:{}", second).as_bytes()).await,
        b"ok:bound"
    );
    assert_eq!(roundtrip(&mut client, b"two").await, b"ok:data");

    let record = service.registry().lookup(&first).await.unwrap();
    assert_eq!(
        service.seal_digest(&record).await.unwrap(),
        sha1_hex(b"one")
    );
    let record = service.registry().lookup(&second).await.unwrap();
    assert_eq!(
        service.seal_digest(&record).await.unwrap(),
        sha1_hex(b"two")
    );
}

#[tokio::test]
async fn close_frame_ends_the_session() {
    let dir = TempDir::new().unwrap();
    let service = engine(&dir).await;

    let mut client = connect(&service, 1024).await;
    assert_eq!(roundtrip(&mut client, b"close").await, b"ok:close");

    // server side has hung up
    let mut buffer = [0u8; 1];
    assert_eq!(client.read(&mut buffer).await.unwrap(), 0);
}

#[tokio::test]
async fn oversized_frame_is_advised_and_connection_closed() {
    let dir = TempDir::new().unwrap();
    let service = engine(&dir).await;

    let mut client = connect(&service, 16).await;
    assert_eq!(
        roundtrip(&mut client, &[0u8; 64]).await,
        b"err:frame-too-large"
    );

    // the server hangs up without draining the oversized payload, so the
    // client sees either EOF or a reset
    let mut buffer = [0u8; 1];
    assert!(matches!(client.read(&mut buffer).await, Ok(0) | Err(_)));
}
