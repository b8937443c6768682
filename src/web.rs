use crate::config::{ConfigStore, Options};
use crate::dom::Fragment;
use crate::enrich::Enricher;
use crate::source::{self, DefinitionSource};
use crate::theme::Theme;
use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info};

type SharedState = Arc<AppState>;

const DEFAULT_LANG: &str = "en";

pub struct AppState {
    pub source: Arc<dyn DefinitionSource>,
    pub store: Arc<dyn ConfigStore>,
    pub theme: Theme,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub theme: Theme,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            theme: Theme::Light,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(
    config: WebConfig,
    source: Arc<dyn DefinitionSource>,
    store: Arc<dyn ConfigStore>,
) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        source,
        store,
        theme: config.theme,
    });
    let router = build_router(state);
    info!(%config.addr, theme = config.theme.as_str(), "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/query", post(query))
        .route("/lucky", get(lucky))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, Deserialize)]
struct QueryForm {
    word: String,
    #[serde(default)]
    lang: Option<String>,
}

/// Looks a word up and returns the enriched definition HTML. An empty
/// body means "no result"; the client hides the container. Invalid input
/// never reaches the source.
async fn query(State(state): State<SharedState>, Form(form): Form<QueryForm>) -> Response {
    let Some(word) = source::validate_query(&form.word) else {
        return Html(String::new()).into_response();
    };
    // The default language is never forwarded as an override.
    let lang = form
        .lang
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != DEFAULT_LANG);
    respond_with_lookup(&state, word, lang)
}

/// Serves the definition of a random indexed word.
async fn lucky(State(state): State<SharedState>) -> Response {
    let word = match state.source.random_word() {
        Ok(Some(word)) => word,
        Ok(None) => return Html(String::new()).into_response(),
        Err(err) => {
            error!(%err, "random word selection failed");
            return lookup_failed();
        }
    };
    respond_with_lookup(&state, &word, None)
}

fn respond_with_lookup(state: &AppState, word: &str, lang: Option<&str>) -> Response {
    match state.source.lookup(word, lang) {
        Ok(Some(definition)) => {
            // Preferences are re-read per lookup so a change written
            // through the store shapes the next response.
            let options = Options::default().load(state.store.as_ref());
            let mut frag = Fragment::parse(&definition);
            Enricher::new(options, state.theme).enrich(&mut frag);
            info!(word, "served definition");
            Html(frag.to_html()).into_response()
        }
        Ok(None) => Html(String::new()).into_response(),
        Err(err) => {
            error!(word, %err, "definition lookup failed");
            lookup_failed()
        }
    }
}

fn lookup_failed() -> Response {
    (StatusCode::BAD_GATEWAY, "definition source unavailable").into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "lexfold-web" }))
}

async fn home() -> impl IntoResponse {
    Html(render_home())
}

fn render_home() -> String {
    let title = "Lexfold \u{2022} Dictionary Lookup";
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
  </head>
  <body>
    <main>
      <h1>Lexfold v{version}</h1>
      <form method="post" action="/query">
        <input type="text" name="word" placeholder="Look up a word" autofocus />
        <button type="submit">Search</button>
        <a href="/lucky">I'm feeling lucky</a>
      </form>
      <div id="result"></div>
    </main>
  </body>
</html>"#,
        title = title,
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigKey, MemoryStore};
    use crate::source::MemorySource;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    const ENTRY_HTML: &str = r#"<div class="lexfold"><div class="sense"><span class="sensenum">1</span><span class="def">to stop working</span><span class="example">the car broke down</span></div></div>"#;

    fn seeded_source() -> Arc<MemorySource> {
        let source = MemorySource::new();
        source.insert("break", "en", ENTRY_HTML);
        Arc::new(source)
    }

    fn test_router(source: Arc<MemorySource>) -> Router {
        test_router_with_store(source, Arc::new(MemoryStore::new()))
    }

    fn test_router_with_store(source: Arc<MemorySource>, store: Arc<MemoryStore>) -> Router {
        let state = Arc::new(AppState {
            source,
            store,
            theme: Theme::Light,
        });
        build_router(state)
    }

    fn query_request(body: &str) -> Request<Body> {
        Request::post("/query")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn query_returns_enriched_definition() {
        let router = test_router(seeded_source());
        let response = router.oneshot(query_request("word=break")).await.unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("data-enriched=\"true\""));
        assert!(html.contains("sensenum"));
    }

    #[tokio::test]
    async fn query_miss_returns_empty_body() {
        let router = test_router(seeded_source());
        let response = router.oneshot(query_request("word=missing")).await.unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn invalid_queries_never_reach_the_source() {
        let source = seeded_source();
        let router = test_router(Arc::clone(&source));
        for body in [
            "word=.",
            "word=%23",
            "word=%3F",
            "word=%2F",
            "word=",
            "word=+++",
        ] {
            let response = router.clone().oneshot(query_request(body)).await.unwrap();
            assert!(response.status().is_success());
            let bytes = body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            assert!(bytes.is_empty());
        }
        assert_eq!(source.lookup_count(), 0);
    }

    #[tokio::test]
    async fn default_lang_is_not_forwarded_as_override() {
        let source = seeded_source();
        let router = test_router(Arc::clone(&source));
        let response = router
            .oneshot(query_request("word=break&lang=en"))
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn lucky_serves_some_entry() {
        let router = test_router(seeded_source());
        let response = router
            .oneshot(Request::get("/lucky").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(
            String::from_utf8(bytes.to_vec())
                .unwrap()
                .contains("data-enriched")
        );
    }

    #[tokio::test]
    async fn stored_preferences_shape_the_response() {
        let store = Arc::new(MemoryStore::new());
        store.set(ConfigKey::DefaultFold, "true");
        let router = test_router_with_store(seeded_source(), Arc::clone(&store));
        let response = router
            .clone()
            .oneshot(query_request("word=break"))
            .await
            .unwrap();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let folded = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(folded.contains("display:none"));

        // Clearing the preference takes effect without a rebuild.
        store.set(ConfigKey::DefaultFold, "false");
        let response = router.oneshot(query_request("word=break")).await.unwrap();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let expanded = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!expanded.contains("display:none"));
    }

    #[tokio::test]
    async fn failing_source_maps_to_bad_gateway() {
        struct FailingSource;
        impl DefinitionSource for FailingSource {
            fn lookup(
                &self,
                _word: &str,
                _lang: Option<&str>,
            ) -> Result<Option<String>, crate::source::SourceError> {
                Err(crate::source::SourceError::Io(std::io::Error::other(
                    "backend down",
                )))
            }
            fn random_word(&self) -> Result<Option<String>, crate::source::SourceError> {
                Err(crate::source::SourceError::Io(std::io::Error::other(
                    "backend down",
                )))
            }
        }
        let state = Arc::new(AppState {
            source: Arc::new(FailingSource),
            store: Arc::new(MemoryStore::new()),
            theme: Theme::Light,
        });
        let router = build_router(state);
        let response = router.oneshot(query_request("word=break")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn home_and_health() {
        let router = test_router(seeded_source());
        let response = router
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(
            String::from_utf8(bytes.to_vec())
                .unwrap()
                .contains("action=\"/query\"")
        );

        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
    }
}
