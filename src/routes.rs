use axum::{Json, Router, extract::{Path, State, rejection::JsonRejection}, http::StatusCode, routing::{get, post}};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    error::ApiError,
    generator::OfferGenerator,
    models::{FormState, Offer},
    session::Session,
};

type SessionStore = Arc<RwLock<HashMap<Uuid, Session>>>;

#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub generator: Arc<OfferGenerator>,
}

impl AppState {
    pub fn new(generator: OfferGenerator) -> Self {
        Self { store: Arc::default(), generator: Arc::new(generator) }
    }
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/generate", post(generate_offers))
        .route("/api/sessions/:id/wishlist", get(get_wishlist))
        .route("/api/sessions/:id/wishlist/:offer_id", post(toggle_wishlist))
        .route("/api/sessions/:id/offers/:offer_id/text", get(offer_text))
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub offers: Vec<Offer>,
    pub wishlist: Vec<Uuid>,
    pub wishlisted_offers: Vec<Offer>,
    pub has_generated_once: bool,
    pub generating: bool,
}

#[derive(Debug, Serialize)]
pub struct RoundResponse {
    pub offers: Vec<Offer>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistToggled {
    pub offer_id: Uuid,
    pub wishlisted: bool,
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionCreated>) {
    let id = Uuid::new_v4();
    state.store.write().insert(id, Session::default());
    tracing::info!("🎯 Created session {}", id);
    (StatusCode::CREATED, Json(SessionCreated { id }))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let guard = state.store.read();
    let session = guard.get(&id).ok_or(ApiError::SessionNotFound(id))?;
    let c = &session.collection;
    Ok(Json(SessionView {
        id,
        offers: c.offers().to_vec(),
        wishlist: c.wishlist_ids().to_vec(),
        wishlisted_offers: c.wishlisted_offers().into_iter().cloned().collect(),
        has_generated_once: c.has_generated_once(),
        generating: session.generating,
    }))
}

/// Clears the session's in-flight flag however the round ends.
struct RoundGuard {
    store: SessionStore,
    id: Uuid,
}

impl RoundGuard {
    fn acquire(store: &SessionStore, id: Uuid) -> Result<Self, ApiError> {
        let mut guard = store.write();
        let session = guard.get_mut(&id).ok_or(ApiError::SessionNotFound(id))?;
        if session.generating {
            return Err(ApiError::RoundInProgress);
        }
        session.generating = true;
        Ok(Self { store: Arc::clone(store), id })
    }
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        if let Some(session) = self.store.write().get_mut(&self.id) {
            session.generating = false;
        }
    }
}

pub async fn generate_offers(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    payload: Result<Json<FormState>, JsonRejection>,
) -> Result<Json<RoundResponse>, ApiError> {
    let Json(form) = payload?;
    form.validate()?;
    let round_guard = RoundGuard::acquire(&state.store, id)?;

    let result = state.generator.generate_round(&form).await;
    drop(round_guard);
    let offers = result?;

    let mut guard = state.store.write();
    let session = guard.get_mut(&id).ok_or(ApiError::SessionNotFound(id))?;
    session.collection.append(offers.clone());
    tracing::info!("✅ Session {} now holds {} offers", id, session.collection.len());
    Ok(Json(RoundResponse { offers }))
}

pub async fn get_wishlist(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<Vec<Offer>>, ApiError> {
    let guard = state.store.read();
    let session = guard.get(&id).ok_or(ApiError::SessionNotFound(id))?;
    Ok(Json(session.collection.wishlisted_offers().into_iter().cloned().collect()))
}

pub async fn toggle_wishlist(
    Path((id, offer_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<WishlistToggled>, ApiError> {
    let mut guard = state.store.write();
    let session = guard.get_mut(&id).ok_or(ApiError::SessionNotFound(id))?;
    let wishlisted = session.collection.toggle_wishlist(offer_id)?;
    Ok(Json(WishlistToggled { offer_id, wishlisted }))
}

/// Plain-text offer body for the clipboard.
pub async fn offer_text(
    Path((id, offer_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<String, ApiError> {
    let guard = state.store.read();
    let session = guard.get(&id).ok_or(ApiError::SessionNotFound(id))?;
    let offer = session.collection.get(offer_id).ok_or(ApiError::OfferNotFound(offer_id))?;
    Ok(offer.body.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ImagePolicy,
        gemini::GenerativeBackend,
        generator::tests::{coffee_form, FakeBackend},
    };
    use axum::{body::Body, http::{header::CONTENT_TYPE, Request}, response::Response};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn setup(fake: FakeBackend) -> (AppState, Router) {
        let backend: Arc<dyn GenerativeBackend> = Arc::new(fake);
        let state = AppState::new(OfferGenerator::new(backend, Duration::from_secs(5), ImagePolicy::AllOrNothing));
        let app = create_router().with_state(state.clone());
        (state, app)
    }

    async fn read_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("collect body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder.header(CONTENT_TYPE, "application/json").body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let response = send(app, "POST", "/api/sessions", None).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await["id"].as_str().unwrap().to_string()
    }

    fn form_json() -> Value {
        serde_json::to_value(coffee_form()).unwrap()
    }

    #[tokio::test]
    async fn two_rounds_accumulate() {
        let (_, app) = setup(FakeBackend::with_offers(3));
        let sid = new_session(&app).await;

        for _ in 0..2 {
            let response = send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form_json())).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(read_json(response).await["offers"].as_array().unwrap().len(), 3);
        }

        let view = read_json(send(&app, "GET", &format!("/api/sessions/{sid}"), None).await).await;
        assert_eq!(view["offers"].as_array().unwrap().len(), 6);
        assert_eq!(view["hasGeneratedOnce"], true);
        assert_eq!(view["generating"], false);
    }

    #[tokio::test]
    async fn failed_round_leaves_collection_unchanged() {
        let (state, app) = setup(FakeBackend::with_text(r#"{"offers": []}"#));
        let sid = new_session(&app).await;

        let response = send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form_json())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(read_json(response).await["error"], "AI did not return offers in the expected format.");

        let id: Uuid = sid.parse().unwrap();
        let store = state.store.read();
        assert!(store[&id].collection.is_empty());
        assert!(!store[&id].generating);
    }

    #[tokio::test]
    async fn failed_image_leaves_collection_unchanged() {
        let mut fake = FakeBackend::with_offers(3);
        fake.failing.insert("prompt-2".into());
        let (state, app) = setup(fake);
        let sid = new_session(&app).await;

        let response = send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form_json())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(read_json(response).await["error"], "Failed to generate an image for one of the offers.");
        let id: Uuid = sid.parse().unwrap();
        assert!(state.store.read()[&id].collection.is_empty());
    }

    #[tokio::test]
    async fn incomplete_form_is_rejected_before_any_call() {
        let (_, app) = setup(FakeBackend::with_offers(3));
        let sid = new_session(&app).await;
        let mut form = form_json();
        form["occasion"] = Value::String(String::new());

        let response = send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn concurrent_round_is_refused() {
        let (state, app) = setup(FakeBackend::with_offers(3));
        let sid = new_session(&app).await;
        let id: Uuid = sid.parse().unwrap();
        state.store.write().get_mut(&id).unwrap().generating = true;

        let response = send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form_json())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn wishlist_toggle_and_clipboard_text() {
        let (_, app) = setup(FakeBackend::with_offers(3));
        let sid = new_session(&app).await;
        let round = read_json(send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form_json())).await).await;
        let oid = round["offers"][1]["id"].as_str().unwrap().to_string();

        let toggled = read_json(send(&app, "POST", &format!("/api/sessions/{sid}/wishlist/{oid}"), None).await).await;
        assert_eq!(toggled["wishlisted"], true);
        let wishlist = read_json(send(&app, "GET", &format!("/api/sessions/{sid}/wishlist"), None).await).await;
        assert_eq!(wishlist.as_array().unwrap().len(), 1);
        assert_eq!(wishlist[0]["id"], oid.as_str());

        let toggled = read_json(send(&app, "POST", &format!("/api/sessions/{sid}/wishlist/{oid}"), None).await).await;
        assert_eq!(toggled["wishlisted"], false);

        let response = send(&app, "GET", &format!("/api/sessions/{sid}/offers/{oid}/text"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&bytes), "Body 1 #deal");
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (_, app) = setup(FakeBackend::with_offers(1));
        let ghost = Uuid::new_v4();
        let response = send(&app, "GET", &format!("/api/sessions/{ghost}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let sid = new_session(&app).await;
        let response = send(&app, "POST", &format!("/api/sessions/{sid}/wishlist/{ghost}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn undecodable_form_gets_json_error_body() {
        let (_, app) = setup(FakeBackend::with_offers(3));
        let sid = new_session(&app).await;

        for richness in [Value::from(300), Value::from("abc")] {
            let mut form = form_json();
            form["keywordRichness"] = richness;
            let response = send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form)).await;
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            let body = read_json(response).await;
            assert!(body["error"].is_string());
        }

        let mut form = form_json();
        form["keywordRichness"] = Value::from(11);
        let response = send(&app, "POST", &format!("/api/sessions/{sid}/generate"), Some(form)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(read_json(response).await["error"], "keyword richness must be between 1 and 10, got 11");
    }
}
