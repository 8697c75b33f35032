//! HTTP routes.
//!
//! Every handler binds the request to a [`Session`] through its cookie,
//! rebuilds the [`SmartClient`] from the saved state, and saves the state
//! back when the client reports a change.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::Uri,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use super::pages;
use crate::client::FhirClient;
use crate::config::Config;
use crate::documents::DocumentFetcher;
use crate::error::{AppError, AppResult};
use crate::session::{MemorySessionStore, Session, SessionStore};
use crate::smart::SmartClient;

/// Shared state for HTTP handlers.
pub struct AppState {
    pub config: Config,
    pub fhir: FhirClient,
    pub sessions: Arc<dyn SessionStore>,
    pub fetcher: DocumentFetcher,
}

impl AppState {
    /// Build handler state with an in-memory session store.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let sessions =
            Arc::new(MemorySessionStore::new(config.session_max_capacity, config.session_ttl));
        Self::with_store(config, sessions)
    }

    /// Build handler state over a caller-supplied session store.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn with_store(config: Config, sessions: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        let fhir = FhirClient::new(&config)?;
        let fetcher = DocumentFetcher::new(config.download_dir.clone());
        Ok(Self { config, fhir, sessions, fetcher })
    }

    fn session(&self, jar: CookieJar) -> (CookieJar, Session) {
        Session::from_cookies(jar, Arc::clone(&self.sessions))
    }

    /// Resume the session's client, or open a fresh one from the defaults.
    async fn client_for(&self, session: &Session) -> AppResult<SmartClient> {
        let saved = session.load().await?;
        let client = SmartClient::from_session(
            saved,
            &self.config.settings,
            self.fhir.clone(),
            self.config.client_secret.clone(),
        )?;
        Ok(client)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("api_base", &self.config.settings.api_base)
            .field("download_dir", &self.fetcher.download_dir())
            .finish_non_exhaustive()
    }
}

/// Launch parameters as sent by the EHR.
#[derive(Debug, Default, Deserialize)]
pub struct LaunchQuery {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    launch: Option<String>,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/fhir-app/", get(callback))
        .route("/fhir-app", get(callback))
        .route("/_launch/", get(launch_begin))
        .route("/_launch", get(launch_begin))
        .route("/launch/", get(launch_landing))
        .route("/launch", get(launch_landing))
        .route("/logout", get(logout))
        .route("/reset", get(reset))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "smart-fhir-demo",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Status page: patient greeting and documents, or the authorize link.
async fn index(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Html<String>)> {
    let (jar, session) = state.session(jar);
    let mut client = state.client_for(&session).await?;

    let patient = if client.ready() { client.patient().await? } else { None };

    let patient_id = client.patient_id().map(str::to_owned);

    let body = match (patient, patient_id) {
        (Some(patient), Some(patient_id)) => {
            let outcomes = state.fetcher.fetch_all(&client, &patient_id).await?;
            pages::render_authorized(&patient.display_name(), &outcomes)
        }
        _ => {
            let authorize_url = client.authorize_url().await?;
            pages::render_unauthorized(authorize_url.as_deref())
        }
    };

    if client.has_changed() {
        session.save(client.state()).await?;
    }
    Ok((jar, Html(body)))
}

/// OAuth2 redirect target: exchange the code, then go home.
async fn callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    uri: Uri,
) -> AppResult<(CookieJar, Response)> {
    let (jar, session) = state.session(jar);
    let mut client = state.client_for(&session).await?;

    match client.handle_callback(&uri.to_string()).await {
        Ok(authorized) => {
            let (jar, session) = session.rotate(jar).await;
            session.save(client.state()).await?;
            tracing::info!(
                session_id = %session.id(),
                patient_id = ?authorized.patient_id,
                scope = ?authorized.scope,
                "Authorization complete"
            );
            Ok((jar, Redirect::to("/").into_response()))
        }
        Err(e) => {
            tracing::warn!(session_id = %session.id(), error = %e, "Authorization failed");
            Ok((jar, Html(pages::render_auth_error(&e.to_string())).into_response()))
        }
    }
}

/// Start a launch against `iss`: fresh state, then off to the authorize endpoint.
async fn launch_begin(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<LaunchQuery>,
) -> AppResult<(CookieJar, Response)> {
    let Some(iss) = query.iss.filter(|iss| !iss.is_empty()) else {
        return Err(AppError::bad_request("Missing iss parameter"));
    };
    let launch = query.launch.filter(|launch| !launch.is_empty());

    let (jar, session) = state.session(jar);
    let settings = state.config.settings.for_launch(&iss, launch);
    tracing::info!(
        session_id = %session.id(),
        iss = %settings.api_base,
        launch = settings.launch_token.is_some(),
        "Launch requested"
    );

    let (jar, session) = session.rotate(jar).await;
    let mut client =
        SmartClient::new(settings, state.fhir.clone(), state.config.client_secret.clone())?;
    let authorize_url = client.authorize_url().await?;
    session.save(client.state()).await?;

    let response = match authorize_url {
        Some(url) => Redirect::to(&url).into_response(),
        None => Html(pages::render_unauthorized(None)).into_response(),
    };
    Ok((jar, response))
}

/// EHR landing page; carries the launch parameters forward.
async fn launch_landing(Query(query): Query<LaunchQuery>) -> Html<String> {
    Html(pages::render_launch(query.iss.as_deref(), query.launch.as_deref()))
}

/// Drop the patient binding but keep the server.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let (jar, session) = state.session(jar);
    if let Some(saved) = session.load().await? {
        let mut client =
            SmartClient::resume(saved, state.fhir.clone(), state.config.client_secret.clone())?;
        client.reset_patient();
        session.save(client.state()).await?;
        tracing::info!(session_id = %session.id(), "Patient binding cleared");
    }
    Ok((jar, Redirect::to("/")))
}

/// Forget everything this session knows.
async fn reset(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let (jar, session) = state.session(jar);
    session.reset().await;
    (jar, Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    fn router() -> Router {
        let state = AppState::new(Config::default()).unwrap();
        create_router(Arc::new(state))
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_launch_without_iss_is_bad_request() {
        let response = router()
            .oneshot(Request::builder().uri("/_launch/?launch=abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_redirects_home_and_sets_cookie() {
        let response = router()
            .oneshot(Request::builder().uri("/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert!(response.headers().contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_launch_landing_needs_no_session() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/launch?iss=https%3A%2F%2Fehr%2Ffhir&launch=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::SET_COOKIE));
    }
}
