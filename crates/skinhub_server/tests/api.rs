use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use skinhub_core::asset::PNG_SIGNATURE;
use skinhub_memory::MemoryStorage;
use skinhub_server::{SkinhubServer, SkinhubServerConfig};
use tower::ServiceExt;

const BOUNDARY: &str = "skinhub-test-boundary";
const ADMIN_KEY: &str = "let-me-in";

enum Part<'a> {
    Text(&'a str),
    File(&'a [u8]),
}

fn png(seed: &str) -> Vec<u8> {
    let mut data = PNG_SIGNATURE.to_vec();
    data.extend_from_slice(seed.as_bytes());
    data
}

fn app_with(config: SkinhubServerConfig) -> (Router, MemoryStorage) {
    let storage = MemoryStorage::new();
    let app = SkinhubServer::new(SkinhubServerConfig {
        admin_key: ADMIN_KEY.to_string(),
        ..config
    })
    .build(storage.clone());
    (app, storage)
}

fn app() -> (Router, MemoryStorage) {
    app_with(Default::default())
}

fn multipart(uri: &str, parts: &[(&str, Part)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, part) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn upload_skin(app: &Router, username: &str, data: &[u8]) -> Response<Body> {
    send(
        app,
        multipart(
            "/api/upload/skin",
            &[("username", Part::Text(username)), ("file", Part::File(data))],
        ),
    )
    .await
}

#[tokio::test]
async fn upload_then_download_returns_identical_bytes() {
    let (app, _) = app();
    let skin = png("steve");

    let response = upload_skin(&app, "Steve", &skin).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt = body_json(response).await;
    assert_eq!(receipt["success"], true);
    let hash = receipt["data"]["hash"].as_str().unwrap().to_string();

    let response = send(&app, get("/skin/steve")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::ETAG], format!("\"{hash}\""));
    assert_eq!(body_bytes(response).await, Bytes::from(skin.clone()));

    let response = send(&app, get("/api/skin/Steve")).await;
    let payload = body_json(response).await;
    assert_eq!(payload["data"]["hash"], hash.as_str());
    assert_eq!(
        STANDARD
            .decode(payload["data"]["image"].as_str().unwrap())
            .unwrap(),
        skin
    );
}

#[tokio::test]
async fn matching_etag_is_not_modified() {
    let (app, _) = app();
    let receipt = body_json(upload_skin(&app, "Steve", &png("a")).await).await;
    let etag = format!("\"{}\"", receipt["data"]["hash"].as_str().unwrap());

    let request = Request::builder()
        .uri("/skin/Steve")
        .header(header::IF_NONE_MATCH, etag)
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn second_upload_becomes_current_and_keeps_history() {
    let (app, _) = app();
    let first = body_json(upload_skin(&app, "Alex", &png("one")).await).await;
    let second = body_json(upload_skin(&app, "Alex", &png("two")).await).await;

    let record = body_json(send(&app, get("/api/players/alex")).await).await;
    assert_eq!(record["data"]["skin"]["hash"], second["data"]["hash"]);

    let history: Vec<&Value> = record["data"]["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| &entry["hash"])
        .collect();
    assert_eq!(history, [&first["data"]["hash"], &second["data"]["hash"]]);
}

#[tokio::test]
async fn history_respects_the_configured_limit() {
    let mut config = SkinhubServerConfig::default();
    config.registry.history_limit = 2;
    let (app, _) = app_with(config);

    for seed in ["a", "b", "c"] {
        upload_skin(&app, "Alex", &png(seed)).await;
    }

    let record = body_json(send(&app, get("/api/players/Alex")).await).await;
    assert_eq!(record["data"]["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_players_are_not_found() {
    let (app, _) = app();

    for uri in ["/skin/Nobody", "/cape/Nobody", "/api/skin/Nobody", "/api/players/Nobody"] {
        let response = send(&app, get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let response = send(&app, get("/skin/no..pe")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn default_skin_is_served_for_players_without_one() {
    let fallback = png("default");
    let (app, _) = app_with(SkinhubServerConfig {
        default_skin: Some(Bytes::from(fallback.clone())),
        ..Default::default()
    });

    let response = send(&app, get("/skin/Newcomer")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, Bytes::from(fallback));

    let response = send(&app, get("/cape/Newcomer")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_uploads_leave_no_trace() {
    let (app, storage) = app();

    let response = upload_skin(&app, "Steve", b"GIF89a not a png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);

    let response = upload_skin(&app, "bad name!", &png("x")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        multipart("/api/upload/skin", &[("file", Part::File(&png("x")))]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &app,
        multipart(
            "/api/upload/elytra",
            &[("username", Part::Text("Steve")), ("file", Part::File(&png("x")))],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // a valid skin next to an invalid cape stores neither
    let response = send(
        &app,
        multipart(
            "/upload",
            &[
                ("username", Part::Text("Steve")),
                ("skin", Part::File(&png("ok"))),
                ("cape", Part::File(b"nope")),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(storage.asset_count().await, 0);
    assert_eq!(body_json(send(&app, get("/api/get-all")).await).await, json!({}));
}

#[tokio::test]
async fn combined_upload_stores_skin_and_cape() {
    let (app, _) = app();
    let response = send(
        &app,
        multipart(
            "/upload",
            &[
                ("username", Part::Text("Steve")),
                ("uuid", Part::Text("069a79f4-44e9-4726-a5be-fca90e38aaf5")),
                ("skin", Part::File(&png("skin"))),
                ("cape", Part::File(&png("cape"))),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["data"].as_array().unwrap().len(), 2);

    let listing = body_json(send(&app, get("/list")).await).await;
    let players = listing["data"].as_array().unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["uuid"], "069a79f4-44e9-4726-a5be-fca90e38aaf5");
    assert!(players[0]["skin"].is_string());
    assert!(players[0]["cape"].is_string());
}

#[tokio::test]
async fn json_base64_upload_is_accepted() {
    let (app, _) = app();
    let cape = png("cape");
    let body = json!({
        "type": "cape",
        "metadata": { "username": "Notch", "uuid": "069a79f444e94726a5befca90e38aaf5" },
        "imageDataBase64": STANDARD.encode(&cape),
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/update-skin")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/cape/notch")).await;
    assert_eq!(body_bytes(response).await, Bytes::from(cape));

    let all = body_json(send(&app, get("/all")).await).await;
    assert_eq!(all["notch"]["username"], "Notch");
    assert_eq!(all["notch"]["history"][0]["type"], "cape");
}

#[tokio::test]
async fn malformed_json_upload_is_a_rejected_validation_error() {
    let (app, storage) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/update-skin")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"type":"skin","metadata":{}}"#))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().starts_with("Invalid request body"));
    assert_eq!(storage.asset_count().await, 0);

    let stats = body_json(send(&app, get("/stats")).await).await;
    assert_eq!(stats["data"]["uploads_rejected"], 1);
}

#[tokio::test]
async fn admin_delete_requires_the_key_and_removes_assets() {
    let (app, storage) = app();
    upload_skin(&app, "Steve", &png("steve")).await;

    let response = send(&app, delete("/delete/Steve")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = send(&app, delete("/delete/Steve?key=wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(storage.asset_count().await, 1);

    let response = send(&app, delete(&format!("/delete/Steve?key={ADMIN_KEY}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(storage.asset_count().await, 0);

    let response = send(&app, get("/skin/Steve")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        delete(&format!("/api/players/Steve?key={ADMIN_KEY}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reset_wipes_everything() {
    let (app, storage) = app();
    upload_skin(&app, "Steve", &png("steve")).await;
    upload_skin(&app, "Alex", &png("alex")).await;

    let response = send(&app, delete(&format!("/reset?key={ADMIN_KEY}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["players_removed"], 2);

    assert_eq!(storage.asset_count().await, 0);
    let listing = body_json(send(&app, get("/api/players")).await).await;
    assert_eq!(listing["data"], json!([]));
}

#[tokio::test]
async fn stats_report_counters() {
    let (app, _) = app();
    upload_skin(&app, "Steve", &png("steve")).await;
    upload_skin(&app, "Steve", b"not a png").await;
    send(&app, get("/skin/Steve")).await;

    let stats = body_json(send(&app, get("/stats")).await).await;
    let data = &stats["data"];
    assert_eq!(data["players"], 1);
    assert_eq!(data["skins"], 1);
    assert_eq!(data["uploads_accepted"], 1);
    assert_eq!(data["uploads_rejected"], 1);
    assert_eq!(data["assets_served"], 1);

    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_for_different_players_both_land() {
    let (app, _) = app();
    let steve = png("steve");
    let alex = png("alex");

    let (a, b) = tokio::join!(
        upload_skin(&app, "Steve", &steve),
        upload_skin(&app, "Alex", &alex),
    );
    assert_eq!(a.status(), StatusCode::CREATED);
    assert_eq!(b.status(), StatusCode::CREATED);

    let all = body_json(send(&app, get("/api/get-all")).await).await;
    assert!(all["steve"]["skin"].is_object());
    assert!(all["alex"]["skin"].is_object());
}
