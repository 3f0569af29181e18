//! Control API server

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::error::{Error, Result};
use crate::soundboard::SoundboardHandle;
use crate::ui::handlers;

/// Shared handler state
pub struct AppState {
    pub soundboard: SoundboardHandle,
}

/// Build the API routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route(
            "/api/sounds",
            get(handlers::get_sounds).post(handlers::save_sound),
        )
        .route("/api/sounds/:name", delete(handlers::remove_sound))
        .route("/api/sounds/:name/play", post(handlers::play_sound))
        .route("/api/order", post(handlers::move_sound))
        .route("/api/settings", put(handlers::update_settings))
        .route("/api/devices", get(handlers::get_devices))
        .route("/api/stop", post(handlers::stop))
        .route("/api/preview", post(handlers::preview))
        .route("/api/mute", post(handlers::set_mute))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP control surface for a running soundboard
pub struct WebServer {
    config: UiConfig,
    soundboard: SoundboardHandle,
}

impl WebServer {
    pub fn new(config: UiConfig, soundboard: SoundboardHandle) -> Self {
        Self { config, soundboard }
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.http_port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid UI address: {}", e)))
    }

    /// Serve until the listener fails
    pub async fn run(self) -> Result<()> {
        let addr = self.addr()?;
        let app = router(Arc::new(AppState {
            soundboard: self.soundboard,
        }));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Control API listening on http://{}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Run on a background task, logging a failure
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Control API stopped: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::library::SoundEntry;
    use crate::soundboard::{Backends, Soundboard};
    use crate::testing::{MemoryConfigStore, MemoryFileStore, MockOutput, MockVolume};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(method)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn app() -> (Router, SoundboardHandle) {
        let mut config = AppConfig::default();
        config.network.peer_id = "desk".to_string();
        config
            .sounds
            .insert("Laugh".to_string(), SoundEntry::new("a.mp3", "Ctrl+1"));
        config.normalize();

        let board = Soundboard::new(
            config,
            Box::new(MemoryConfigStore::new()),
            Backends {
                output: MockOutput::new(),
                volume: MockVolume::new(50),
                files: Arc::new(MemoryFileStore::default()),
                transport: None,
            },
        );
        let (handle, _) = board.spawn();
        let app = router(Arc::new(AppState {
            soundboard: handle.clone(),
        }));
        (app, handle)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_play_and_status() {
        let (app, _handle) = app();

        let request = Request::builder()
            .uri("/api/sounds/Laugh/play")
            .method("POST")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri("/api/status")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["now_playing"], "Laugh");
    }

    #[tokio::test]
    async fn test_unknown_sound_is_not_found() {
        let (app, _handle) = app();
        let request = Request::builder()
            .uri("/api/sounds/Nope/play")
            .method("POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_mute_blocks_play() {
        let (app, handle) = app();
        let request = Request::builder()
            .uri("/api/mute")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"muted":true}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri("/api/sounds/Laugh/play")
            .method("POST")
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap();

        let status = handle.status().await.unwrap();
        assert!(status.local_mute);
        assert!(status.now_playing.is_none());
    }

    #[tokio::test]
    async fn test_preview_without_file_is_bad_request() {
        let (app, _handle) = app();
        let request = Request::builder()
            .uri("/api/preview")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sounds_listing() {
        let (app, _handle) = app();
        let request = Request::builder()
            .uri("/api/sounds")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["data"][0]["name"], "Laugh");
        assert_eq!(json["data"][0]["play_count"], 0);
    }

    #[tokio::test]
    async fn test_add_edit_and_remove_sound() {
        let (app, handle) = app();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/sounds",
                r#"{"name":"Boo","hotkey":"Ctrl+2","path":"/tmp/boo.mp3","settings":{"volume":0.5}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"], "Boo");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/sounds",
                r#"{"name":"Laugh","hotkey":"Ctrl+3","path":"/tmp/x.mp3"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/sounds",
                r#"{"original_name":"Boo","name":"Boo2","hotkey":"Ctrl+2","path":"/tmp/boo.mp3"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let names: Vec<String> = handle
            .sounds()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Laugh", "Boo2"]);

        let request = Request::builder()
            .uri("/api/sounds/Laugh")
            .method("DELETE")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri("/api/sounds/Laugh")
            .method("DELETE")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(handle.status().await.unwrap().sound_count, 1);
    }

    #[tokio::test]
    async fn test_reorder_sounds() {
        let (app, handle) = app();
        handle
            .save_sound(crate::library::SoundDraft {
                name: "Boo".to_string(),
                hotkey: "Ctrl+2".to_string(),
                path: Some("/tmp/boo.mp3".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/order", r#"{"from":1,"to":0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let names: Vec<String> = handle
            .sounds()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Boo", "Laugh"]);

        let response = app
            .oneshot(json_request("POST", "/api/order", r#"{"from":5,"to":0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_settings() {
        let (app, handle) = app();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/settings",
                r#"{"volume_boost_enabled":true,"volume_boost_amount":30}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        handle.play("Laugh").await.unwrap();
        assert!(handle.status().await.unwrap().boosted);

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/settings",
                r#"{"volume_boost_amount":150}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_preview_with_bad_speed_is_bad_request() {
        let (app, handle) = app();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/preview",
                r#"{"path":"/tmp/x.mp3","settings":{"speed":1e-30,"end_time":5.0}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(handle.status().await.is_ok());
    }
}
