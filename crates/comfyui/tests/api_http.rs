//! HTTP wire tests for `ComfyUIApi` against a mock ComfyUI server.
//!
//! Each test stands up a `mockito` server, points the client at it and
//! checks both the request shape (paths, form fields, query parameters,
//! JSON bodies) and how responses map onto `ComfyUIApiError`.

use assert_matches::assert_matches;
use mockito::Matcher;
use serde_json::json;
use sketch3d_comfyui::api::{ComfyBackend, ComfyUIApi, ComfyUIApiError};
use sketch3d_comfyui::types::{ArtifactCategory, ArtifactLocator};

// ---------------------------------------------------------------------------
// Test: upload sends multipart form and parses the image reference
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_image_sends_multipart_form() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/upload/image")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=.+$".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="image"; filename="abc123.webp""#.to_string()),
            Matcher::Regex("image/webp".to_string()),
            Matcher::Regex("name=\"type\"\r\n\r\ninput".to_string()),
            Matcher::Regex("name=\"overwrite\"\r\n\r\nfalse".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name":"abc123.webp","subfolder":"","type":"input"}"#)
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let reference = api
        .upload_image("abc123.webp", b"RIFF0000WEBP".to_vec(), "image/webp")
        .await
        .unwrap();

    assert_eq!(reference.name, "abc123.webp");
    assert_eq!(reference.subfolder, "");
    assert_eq!(reference.category, ArtifactCategory::Input);
    mock.assert_async().await;
}

#[tokio::test]
async fn upload_error_status_is_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/upload/image")
        .with_status(500)
        .with_body("disk full")
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let err = api
        .upload_image("a.webp", vec![1, 2, 3], "image/webp")
        .await
        .unwrap_err();

    assert_matches!(err, ComfyUIApiError::ApiError { status: 500, body } if body == "disk full");
}

#[tokio::test]
async fn upload_unparsable_body_is_invalid_response() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/upload/image")
        .with_status(200)
        .with_body("<html>proxy page</html>")
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let err = api
        .upload_image("a.webp", vec![1], "image/webp")
        .await
        .unwrap_err();

    assert_matches!(err, ComfyUIApiError::InvalidResponse(_));
}

// ---------------------------------------------------------------------------
// Test: workflow submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_posts_prompt_and_client_id() {
    let mut server = mockito::Server::new_async().await;
    let workflow = json!({ "196": { "class_type": "LoadImage", "inputs": { "image": "a.webp" } } });

    let mock = server
        .mock("POST", "/prompt")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "prompt": workflow,
            "client_id": "session-1",
        })))
        .with_status(200)
        .with_body(r#"{"prompt_id":"42","number":7,"node_errors":{}}"#)
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let handle = api.submit_workflow(&workflow, "session-1").await.unwrap();

    assert_eq!(handle.job_id, "42");
    assert_eq!(handle.queue_position, 7);
    assert!(!handle.has_node_errors());
    mock.assert_async().await;
}

#[tokio::test]
async fn submit_validation_failure_surfaces_node_errors() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/prompt")
        .with_status(400)
        .with_body(
            r#"{"error":{"type":"prompt_outputs_failed_validation","message":"Prompt outputs failed validation"},"node_errors":{"196":"missing input"}}"#,
        )
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let err = api.submit_workflow(&json!({}), "s").await.unwrap_err();

    assert_eq!(
        err.to_string(),
        r#"ComfyUI rejected the workflow: {"196":"missing input"}"#
    );
    assert_matches!(err, ComfyUIApiError::NodeErrors(errs) if errs["196"] == "missing input");
}

#[tokio::test]
async fn submit_plain_bad_request_is_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/prompt")
        .with_status(400)
        .with_body(r#"{"error":"no prompt","node_errors":{}}"#)
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let err = api.submit_workflow(&json!({}), "s").await.unwrap_err();

    assert_matches!(err, ComfyUIApiError::ApiError { status: 400, .. });
}

#[tokio::test]
async fn cancel_posts_queue_delete() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/queue")
        .match_body(Matcher::Json(json!({ "delete": ["42"] })))
        .with_status(200)
        .create_async()
        .await;

    let api = ComfyUIApi::new(format!("{}/", server.url()));
    api.cancel_execution("42").await.unwrap();
    mock.assert_async().await;
}

// ---------------------------------------------------------------------------
// Test: history lookup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_unwraps_entry_for_prompt() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/history/42")
        .with_status(200)
        .with_body(
            json!({
                "42": {
                    "prompt": [7, "42", {}, {}, ["154"]],
                    "outputs": { "154": { "result": ["chair.glb"] } },
                    "status": { "status_str": "success", "completed": true },
                    "meta": {}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let record = api.get_history("42").await.unwrap();

    assert_eq!(record.outputs["154"]["result"][0], "chair.glb");
    assert_eq!(record.status["status_str"], "success");
}

#[tokio::test]
async fn history_without_entry_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/history/missing")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let err = api.get_history("missing").await.unwrap_err();

    assert_matches!(err, ComfyUIApiError::NotFound(_));
}

// ---------------------------------------------------------------------------
// Test: artifact download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn view_passes_locator_as_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/view")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("filename".into(), "chair.glb".into()),
            Matcher::UrlEncoded("subfolder".into(), "3D".into()),
            Matcher::UrlEncoded("type".into(), "output".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(b"glTF\x02\x00\x00\x00")
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let locator = ArtifactLocator {
        filename: "chair.glb".into(),
        subfolder: "3D".into(),
        category: ArtifactCategory::Output,
    };
    let bytes = api.view(&locator).await.unwrap();

    assert_eq!(bytes, b"glTF\x02\x00\x00\x00");
    mock.assert_async().await;
}

#[tokio::test]
async fn view_404_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/view")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let api = ComfyUIApi::new(server.url());
    let locator = ArtifactLocator {
        filename: "gone.glb".into(),
        subfolder: "3D".into(),
        category: ArtifactCategory::Output,
    };
    let err = api.view(&locator).await.unwrap_err();

    assert_matches!(err, ComfyUIApiError::NotFound(msg) if msg.contains("gone.glb"));
}

// ---------------------------------------------------------------------------
// Test: transport failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_server_is_request_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = ComfyUIApi::new(format!("http://{addr}"));
    let err = api.get_history("42").await.unwrap_err();

    assert_matches!(err, ComfyUIApiError::Request(_));
}
