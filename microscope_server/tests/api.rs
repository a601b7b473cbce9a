mod common;

use common::{decode_base64_image, png_base64, png_bytes, solid_image, spawn_server, MockAssistant};
use futures::{SinkExt, StreamExt};
use reqwest::{multipart, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

fn file_form(bytes: Vec<u8>, file_name: &str, mime: &str) -> anyhow::Result<multipart::Form> {
    let part = multipart::Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str(mime)?;
    Ok(multipart::Form::new().part("file", part))
}

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;

    let body: Value = reqwest::get(server.url("/health")).await?.json().await?;
    assert_eq!(body["status"], "Available");
    assert_eq!(body["class_labels"], 1);
    Ok(())
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;
    let form = file_form(b"GIF89a".to_vec(), "sample.gif", "image/gif")?;

    let response = reqwest::Client::new()
        .post(server.url("/upload_image/"))
        .multipart(form)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Solo se aceptan JPG y PNG.");
    Ok(())
}

#[tokio::test]
async fn test_upload_resizes_large_image() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;
    let image = solid_image(1280, 640, [200, 40, 40]);
    let form = file_form(png_bytes(&image), "sample.png", "image/png")?;

    let response = reqwest::Client::new()
        .post(server.url("/upload_image/"))
        .multipart(form)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let resized = decode_base64_image(body["image_base64"].as_str().unwrap_or_default());
    assert_eq!(resized.dimensions(), (640, 320));
    Ok(())
}

#[tokio::test]
async fn test_upload_keeps_small_image_dimensions() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;
    let image = solid_image(300, 200, [10, 120, 240]);
    let form = file_form(png_bytes(&image), "sample.png", "image/png")?;

    let response = reqwest::Client::new()
        .post(server.url("/upload_image/"))
        .multipart(form)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let output = decode_base64_image(body["image_base64"].as_str().unwrap_or_default());
    assert_eq!(output.dimensions(), (300, 200));
    Ok(())
}

#[tokio::test]
async fn test_analyze_image_returns_annotated_frame() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;
    let image = solid_image(160, 120, [240, 240, 240]);
    let form = file_form(png_bytes(&image), "sample.png", "image/png")?;

    let response = reqwest::Client::new()
        .post(server.url("/analyze_image/"))
        .multipart(form)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let annotated =
        decode_base64_image(body["annotated_image_base64"].as_str().unwrap_or_default());
    assert_eq!(annotated.dimensions(), (160, 120));

    // The mock detection starts at (40, 30); its label tab sits just above.
    let pixel = annotated.get_pixel(52, 22);
    assert!(pixel[1] > pixel[0] && pixel[1] > pixel[2]);
    Ok(())
}

#[tokio::test]
async fn test_analyze_image_rejects_undecodable_file() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;
    let form = file_form(b"definitely not an image".to_vec(), "sample.png", "image/png")?;

    let response = reqwest::Client::new()
        .post(server.url("/analyze_image/"))
        .multipart(form)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "No se pudo leer la imagen.");
    Ok(())
}

#[tokio::test]
async fn test_analyze_with_ai_requires_messages() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;

    let response = reqwest::Client::new()
        .post(server.url("/analyze_with_ai/"))
        .json(&json!({ "image": "aGVsbG8=" }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(body["response"], "Faltan datos.");
    assert_eq!(server.assistant.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_analyze_with_ai_attaches_image_to_last_turn() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;
    let image = png_base64(&solid_image(8, 8, [0, 0, 0]));

    let response = reqwest::Client::new()
        .post(server.url("/analyze_with_ai/"))
        .json(&json!({
            "image": image,
            "messages": [
                { "role": "user", "content": "Hola" },
                { "role": "assistant", "content": "Hola, ¿qué muestra tienes?" },
                { "role": "user", "content": "La muestra es sangre con tinción Gram" },
            ],
        }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["response"], "Se observan cocos agrupados en racimos.");
    assert_eq!(server.assistant.call_count(), 1);

    let messages = server.assistant.last_messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 4);
    assert!(messages[0]["content"]
        .as_str()
        .unwrap_or_default()
        .contains("Contexto: sangre."));
    assert!(messages[1]["content"].is_string());
    assert!(messages[2]["content"].is_string());
    assert_eq!(messages[3]["role"], "user");
    assert_eq!(messages[3]["content"][1]["type"], "image_url");
    Ok(())
}

#[tokio::test]
async fn test_analyze_with_ai_hides_upstream_errors() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::failing()).await?;

    let response = reqwest::Client::new()
        .post(server.url("/analyze_with_ai/"))
        .json(&json!({
            "image": "aGVsbG8=",
            "messages": [{ "role": "user", "content": "¿Qué ves?" }],
        }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = response.text().await?;
    assert!(!text.contains("upstream secret detail"));
    let body: Value = serde_json::from_str(&text)?;
    assert_eq!(body["response"], "Error en Luna AI.");
    Ok(())
}

#[tokio::test]
async fn test_stream_skips_bad_frame_and_answers_in_order() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;
    let (mut socket, _) = connect_async(server.ws_url()).await?;

    let first = json!({ "image": png_base64(&solid_image(32, 24, [255, 255, 255])) });
    let second = json!({ "image": png_base64(&solid_image(48, 36, [255, 255, 255])) });

    socket.send(Message::Text("not a frame".into())).await?;
    socket.send(Message::Text(first.to_string().into())).await?;
    socket.send(Message::Text(second.to_string().into())).await?;

    let mut sizes = Vec::new();
    while sizes.len() < 2 {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("stream ended early"))??;
        if let Message::Text(text) = message {
            let frame: Value = serde_json::from_str(text.as_str())?;
            let image = decode_base64_image(frame["image"].as_str().unwrap_or_default());
            sizes.push(image.dimensions());
        }
    }
    assert_eq!(sizes, vec![(32, 24), (48, 36)]);

    // The malformed message must not have produced a third reply.
    let extra = tokio::time::timeout(Duration::from_millis(300), socket.next()).await;
    assert!(extra.is_err());

    socket.close(None).await?;
    Ok(())
}

#[tokio::test]
async fn test_static_files() -> anyhow::Result<()> {
    let server = spawn_server(MockAssistant::default()).await?;

    let index = reqwest::get(server.url("/")).await?;
    assert_eq!(index.status(), StatusCode::OK);
    assert!(index.text().await?.contains("MicroOV"));

    let worker = reqwest::get(server.url("/sw.js")).await?;
    assert_eq!(
        worker.headers()["content-type"].to_str()?,
        "application/javascript"
    );

    let manifest = reqwest::get(server.url("/manifest.json")).await?;
    assert_eq!(manifest.headers()["content-type"].to_str()?, "application/json");

    let script = reqwest::get(server.url("/static/main.js")).await?;
    assert_eq!(script.status(), StatusCode::OK);

    let missing = reqwest::get(server.url("/static/missing.css")).await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let traversal = reqwest::get(server.url("/static/..%2Fmanifest.json")).await?;
    assert_eq!(traversal.status(), StatusCode::NOT_FOUND);
    Ok(())
}
