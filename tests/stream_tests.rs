//! Integration tests for the stream adapter.
//!
//! Most tests run a `loop://` device on a `TokioLoop` inside a `LocalSet`;
//! the flow-control tests use a `ManualLoop` so ticks can be counted.

mod common;

use common::{ProtocolEvent, RecordingProtocol};
use pretty_assertions::assert_eq;
use serio::reactor::{ManualLoop, TokioLoop};
use serio::stream::{
    create_serial_connection, open_serial_connection, ConnectionOptions, SerialStream,
};
use serio::transport::{TransportOptions, DEFAULT_POLL_INTERVAL};
use serio::SerioError;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::LocalSet;
use tokio_test::task;
use tokio_test::{assert_pending, assert_ready_ok};

fn loopback() -> ConnectionOptions {
    ConnectionOptions::url("loop://")
}

async fn on_local_set<F: Future<Output = ()>>(test: F) {
    LocalSet::new().run_until(test).await;
}

#[tokio::test]
async fn test_loopback_line_round_trip() {
    on_local_set(async {
        // Arrange
        let (mut reader, writer) = open_serial_connection(TokioLoop::new(), &loopback())
            .await
            .unwrap();

        // Act
        writer.write(b"AT\r\n");
        writer.drain().await.unwrap();
        let line = reader.read_line().await.unwrap();

        // Assert
        assert_eq!(line, b"AT\r\n");
        assert!(!writer.is_closing());
    })
    .await;
}

#[tokio::test]
async fn test_read_exact_and_until_across_writes() {
    on_local_set(async {
        let (mut reader, writer) = open_serial_connection(TokioLoop::new(), &loopback())
            .await
            .unwrap();

        writer.write_lines([b"+CSQ: ".as_slice(), b"21,0\r\n", b"OK\r\n"]);

        assert_eq!(reader.read_exact(6).await.unwrap(), b"+CSQ: ");
        assert_eq!(reader.read_until(b"\r\n").await.unwrap(), b"21,0\r\n");
        assert_eq!(reader.read_until(b"OK\r\n").await.unwrap(), b"OK\r\n");
    })
    .await;
}

#[tokio::test]
async fn test_read_timeout_keeps_connection_open() {
    on_local_set(async {
        // Arrange
        let mut options = loopback();
        options.serial.timeout = Some(Duration::from_millis(200));
        let (mut reader, writer) = open_serial_connection(TokioLoop::new(), &options)
            .await
            .unwrap();

        // Act
        let err = reader.read(16).await.unwrap_err();

        // Assert
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(!writer.is_closing());

        writer.write(b"still here");
        assert_eq!(reader.read_exact(10).await.unwrap(), b"still here");
    })
    .await;
}

#[tokio::test]
async fn test_close_delivers_eof() {
    on_local_set(async {
        let (mut reader, writer) = open_serial_connection(TokioLoop::new(), &loopback())
            .await
            .unwrap();

        writer.write(b"last words\n");
        assert_eq!(reader.read_line().await.unwrap(), b"last words\n");

        writer.close();
        writer.wait_closed().await.unwrap();

        assert!(writer.is_closing());
        assert!(reader.at_eof());
        assert_eq!(reader.read(8).await.unwrap(), b"");
        assert_eq!(
            reader.read_exact(1).await.unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
        assert_eq!(
            writer.drain().await.unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    })
    .await;
}

#[tokio::test]
async fn test_async_read_write_traits() {
    on_local_set(async {
        let (mut reader, mut writer) = open_serial_connection(TokioLoop::new(), &loopback())
            .await
            .unwrap();

        writer.write_all(b"ping pong").await.unwrap();
        writer.flush().await.unwrap();

        let mut buffer = [0u8; 9];
        AsyncReadExt::read_exact(&mut reader, &mut buffer)
            .await
            .unwrap();
        assert_eq!(&buffer, b"ping pong");

        writer.shutdown().await.unwrap();
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    })
    .await;
}

#[tokio::test]
async fn test_split_writer_with_async_write_ext_in_scope() {
    on_local_set(async {
        // Arrange
        let mut stream = SerialStream::open(TokioLoop::new(), &loopback())
            .await
            .unwrap();
        let (reader, writer) = stream.split();

        // Act: `writer` is `&mut SerialWriter`, as in a copy loop
        writer.write_all(b"AT\r\n").await.unwrap();
        writer.drain().await.unwrap();
        let line = tokio::time::timeout(Duration::from_secs(1), reader.read_line()).await;

        // Assert
        assert_eq!(line.unwrap().unwrap(), b"AT\r\n");
    })
    .await;
}

#[tokio::test]
async fn test_abort_surfaces_error_to_reader() {
    on_local_set(async {
        let (mut reader, writer) = open_serial_connection(TokioLoop::new(), &loopback())
            .await
            .unwrap();

        writer
            .transport()
            .abort_with(serio::TransportError::aborted("unplugged"));
        let err = reader.read(4).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(err.to_string().contains("unplugged"));
        assert!(writer.wait_closed().await.is_err());
    })
    .await;
}

#[tokio::test]
async fn test_stream_closes_on_drop() {
    on_local_set(async {
        let stream = SerialStream::open(TokioLoop::new(), &loopback())
            .await
            .unwrap();
        let transport = stream.writer().transport().clone();
        assert!(!transport.is_closing());

        drop(stream);
        assert!(transport.is_closing());
    })
    .await;
}

#[tokio::test]
async fn test_create_connection_with_custom_protocol() {
    on_local_set(async {
        let protocol = RecordingProtocol::new();
        let handle = protocol.clone();
        let transport = create_serial_connection(TokioLoop::new(), move || protocol, &loopback())
            .await
            .unwrap();

        transport.write(b"hello");
        for _ in 0..100 {
            if handle.received().len() == 5 {
                break;
            }
            tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        }

        assert_eq!(handle.received(), b"hello");
        assert_eq!(handle.events()[0], ProtocolEvent::ConnectionMade);
    })
    .await;
}

#[tokio::test]
async fn test_missing_target_is_invalid_config() {
    let result = open_serial_connection(ManualLoop::new(), &ConnectionOptions::default()).await;
    assert!(matches!(result, Err(SerioError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_bad_port_parameters_rejected_before_open() {
    let mut options = ConnectionOptions::port("/dev/serio-does-not-exist");
    options.serial.baud_rate = 0;

    let result = open_serial_connection(ManualLoop::new(), &options).await;
    assert!(matches!(result, Err(SerioError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_missing_port_is_connection_error() {
    let options = ConnectionOptions::port("/dev/serio-does-not-exist");
    let result = open_serial_connection(ManualLoop::new(), &options).await;
    assert!(matches!(result, Err(SerioError::Connection { .. })));
}

// ============================================================================
// Inbound flow control (ManualLoop)
// ============================================================================

#[tokio::test]
async fn test_reading_pauses_above_twice_the_limit() {
    // Arrange
    let event_loop = ManualLoop::new();
    let options = loopback().with_limit(4);
    let (mut reader, writer) = open_serial_connection(event_loop.clone(), &options)
        .await
        .unwrap();

    // Act: one tick writes to the loopback, the next reads it back
    writer.write(&[b'z'; 20]);
    event_loop.advance(DEFAULT_POLL_INTERVAL * 2);

    // Assert
    assert_eq!(reader.buffered(), 20);
    assert!(!writer.transport().is_reading());

    // Act: consume down to the limit
    let taken = reader.read(16).await.unwrap();

    // Assert
    assert_eq!(taken.len(), 16);
    assert!(writer.transport().is_reading());
}

#[tokio::test]
async fn test_read_until_limit_overrun() {
    let event_loop = ManualLoop::new();
    let options = loopback().with_limit(4);
    let (mut reader, writer) = open_serial_connection(event_loop.clone(), &options)
        .await
        .unwrap();

    writer.write(b"abcdefgh");
    event_loop.advance(DEFAULT_POLL_INTERVAL * 2);

    let err = reader.read_until(b"\n").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert_eq!(reader.buffered(), 8);
}

#[tokio::test]
async fn test_drain_waits_for_resume() {
    // Arrange
    let event_loop = ManualLoop::new();
    let options = loopback().with_transport(TransportOptions {
        high_water_mark: 8,
        low_water_mark: 2,
        ..TransportOptions::default()
    });
    let (_reader, writer) = open_serial_connection(event_loop.clone(), &options)
        .await
        .unwrap();

    // Act
    writer.write(&[1; 16]);
    let mut drain = task::spawn(writer.drain());

    // Assert: paused, so drain is pending until a tick empties the buffer
    assert_pending!(drain.poll());
    event_loop.advance(DEFAULT_POLL_INTERVAL);
    assert!(drain.is_woken());
    assert_ready_ok!(drain.poll());
}
