//! Integration tests for `ProgressStream` against a local WebSocket server.
//!
//! The server accepts one connection, replays a scripted list of frames
//! the way ComfyUI would emit them and then closes.

use futures::SinkExt;
use sketch3d_comfyui::client::ComfyUIClient;
use sketch3d_comfyui::events::ProgressEvent;
use sketch3d_comfyui::progress::EventSource;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Start a one-shot server that sends `frames` and closes. Returns the
/// `ws://` base URL and a handle resolving to the request path the
/// client connected with.
async fn scripted_server(frames: Vec<Message>) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut path = String::new();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().to_string();
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
            .await
            .unwrap();
        for frame in frames {
            ws.send(frame).await.unwrap();
        }
        let _ = ws.close(None).await;
        path
    });

    (format!("ws://{addr}"), handle)
}

fn text(json: &str) -> Message {
    Message::Text(json.to_string())
}

// ---------------------------------------------------------------------------
// Test: frames are decoded in order, non-events are skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_decodes_frames_in_order() {
    let (url, server) = scripted_server(vec![
        text(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":1}},"sid":"s1"}}"#),
        text(r#"{"type":"execution_start","data":{"prompt_id":"42"}}"#),
        text(r#"{"type":"progress","data":{"value":10,"max":100,"prompt_id":"42","node":"3"}}"#),
        text(r#"{"type":"crystools.monitor","data":{"cpu_utilization":12.5}}"#),
        Message::Binary(vec![0, 0, 0, 1, 0xff]),
        text(r#"{"type":"executing","data":{"node":"10","prompt_id":"42"}}"#),
        text(r#"{"type":"executed","data":{"node":"154","output":{"result":["chair.glb"]},"prompt_id":"42"}}"#),
    ])
    .await;

    let client = ComfyUIClient::new(url);
    let mut stream = client.open("s1").await.unwrap();

    assert_eq!(
        stream.next_event().await,
        Some(ProgressEvent::Progress {
            value: 10,
            max: 100,
            prompt_id: Some("42".into()),
        })
    );
    assert_eq!(
        stream.next_event().await,
        Some(ProgressEvent::ExecutingNode {
            node_id: "10".into(),
            prompt_id: Some("42".into()),
        })
    );
    assert_eq!(
        stream.next_event().await,
        Some(ProgressEvent::Completed {
            node_id: "154".into(),
            prompt_id: Some("42".into()),
        })
    );
    assert_eq!(stream.next_event().await, None);
    assert_eq!(stream.next_event().await, None);

    stream.close().await;
    let path = server.await.unwrap();
    assert_eq!(path, "/ws?clientId=s1");
}

#[tokio::test]
async fn executing_null_is_finished_marker() {
    let (url, _server) = scripted_server(vec![text(
        r#"{"type":"executing","data":{"node":null,"prompt_id":"42"}}"#,
    )])
    .await;

    let mut stream = ComfyUIClient::new(url).open("s2").await.unwrap();
    assert_eq!(
        stream.next_event().await,
        Some(ProgressEvent::Finished {
            prompt_id: Some("42".into())
        })
    );
    stream.close().await;
}

// ---------------------------------------------------------------------------
// Test: malformed frames surface as error events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_frame_becomes_error_event() {
    let (url, _server) = scripted_server(vec![
        text("{this is not json"),
        text(r#"{"type":"progress","data":{"value":1,"max":2}}"#),
    ])
    .await;

    let mut stream = ComfyUIClient::new(url).open("s3").await.unwrap();

    match stream.next_event().await {
        Some(ProgressEvent::Error { message, .. }) => {
            assert!(message.starts_with("Error processing message"));
        }
        other => panic!("Expected Error event, got {other:?}"),
    }
    // The stream keeps going; the consumer decides what is fatal.
    assert_eq!(
        stream.next_event().await,
        Some(ProgressEvent::Progress {
            value: 1,
            max: 2,
            prompt_id: None,
        })
    );
    stream.close().await;
}

#[tokio::test]
async fn execution_error_frame_carries_node_and_message() {
    let (url, _server) = scripted_server(vec![text(
        r#"{"type":"execution_error","data":{"prompt_id":"42","node_id":"150","node_type":"Hy3DGenerateMesh","exception_type":"RuntimeError","exception_message":"CUDA out of memory"}}"#,
    )])
    .await;

    let mut stream = ComfyUIClient::new(url).open("s4").await.unwrap();
    match stream.next_event().await {
        Some(ProgressEvent::Error { message, .. }) => {
            assert!(message.contains("150"));
            assert!(message.contains("CUDA out of memory"));
        }
        other => panic!("Expected Error event, got {other:?}"),
    }
    stream.close().await;
}

// ---------------------------------------------------------------------------
// Test: close semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_is_idempotent_and_ends_stream() {
    let (url, _server) = scripted_server(vec![text(
        r#"{"type":"progress","data":{"value":1,"max":2}}"#,
    )])
    .await;

    let mut stream = ComfyUIClient::new(url).open("s5").await.unwrap();
    stream.close().await;
    stream.close().await;

    assert_eq!(stream.next_event().await, None);
}
