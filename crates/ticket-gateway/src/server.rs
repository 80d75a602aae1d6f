use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use ticket_db::{DataAccessError, DecodedRecord, QueryExecutor, SqlExecutor};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    auth::{AuthError, Identity, TokenVerifier},
    config::AppConfig,
    items, tickets,
};

const ALERTS_QUERY: &str = "SELECT ID, NombreMetrica, ValorActual, Unidad, FechaHora, UmbralNormal, UmbralAdvertencia FROM Alertas ORDER BY FechaHora DESC LIMIT 5";

/// Fallback `error` text when driver messages are not exposed.
const HIDDEN_ERROR_DETAIL: &str = "internal database error";

pub async fn run(config: AppConfig) -> Result<()> {
    let db = SqlExecutor::new(config.database_url.clone())
        .with_statement_timeout(config.statement_timeout);
    let verifier = TokenVerifier::new(&config.client_id, &config.issuer());
    let state = Arc::new(AppState::new(Arc::new(db), verifier, config.expose_errors));

    let app = build_router(state)
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listen socket")?;

    info!(addr = %config.listen_addr, debug = config.debug, "ticket-gateway listening");
    axum::serve(listener, app)
        .await
        .context("HTTP server exited")?;
    Ok(())
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/data", get(get_data))
        .route("/api/alerts", get(get_alerts))
        .merge(tickets::routes())
        .merge(items::routes())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin '{origin}'"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any()))
}

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub(crate) db: Arc<dyn QueryExecutor>,
    pub(crate) verifier: TokenVerifier,
    expose_errors: bool,
}

impl AppState {
    pub fn new(db: Arc<dyn QueryExecutor>, verifier: TokenVerifier, expose_errors: bool) -> Self {
        Self {
            db,
            verifier,
            expose_errors,
        }
    }

    /// Maps a data-access failure to a 500, attaching the driver message
    /// only when error exposure is enabled.
    pub(crate) fn storage_error(&self, message: &str, err: DataAccessError) -> ApiError {
        error!(kind = err.kind(), error = %err, "{message}");
        let detail = if self.expose_errors {
            err.to_string()
        } else {
            HIDDEN_ERROR_DETAIL.to_string()
        };
        ApiError::internal(message).with_detail(detail)
    }
}

async fn index() -> Json<serde_json::Value> {
    info!("welcome route accessed");
    Json(json!({ "message": "El servidor está funcionando correctamente." }))
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn get_data(Identity(claims): Identity) -> Json<serde_json::Value> {
    let user_name = claims.name();
    info!(user = user_name, "protected data requested");
    Json(json!({
        "message": "Respuesta protegida.",
        "user_name_from_token": user_name,
    }))
}

async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Identity(claims): Identity,
) -> Result<Json<Vec<DecodedRecord>>, ApiError> {
    info!(user = claims.name(), "alerts requested");
    let alerts = state
        .db
        .read(ALERTS_QUERY, &[])
        .await
        .map_err(|err| state.storage_error("Error al obtener las alertas", err))?;
    info!(count = alerts.len(), "alerts fetched");
    Ok(Json(alerts))
}

/// Parses a numeric path segment. Only plain ASCII digits name a resource;
/// anything else (signs, letters, overflow) is reported as not found.
pub(crate) fn parse_id(segment: &str, not_found: &str) -> Result<i64, ApiError> {
    if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ApiError::not_found(not_found));
    }
    segment
        .parse()
        .map_err(|_| ApiError::not_found(not_found))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidToken(detail) => ApiError::unauthorized(message).with_detail(detail),
            AuthError::NoToken | AuthError::MalformedToken | AuthError::Expired => {
                ApiError::unauthorized(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "api error");
        } else {
            warn!(status = %self.status, message = %self.message, "api error");
        }
        let body = Json(ErrorBody {
            message: self.message,
            error: self.detail,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::auth::tests::{mint, valid_claims, AUDIENCE, ISSUER};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use serde_json::{Map, Value};
    use ticket_db::SqlParam;
    use tower::ServiceExt;

    /// Call recorded by [`FakeExecutor`].
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Read(String, Vec<SqlParam>),
        Write(String, Vec<SqlParam>),
    }

    /// In-memory executor returning canned results and recording every call.
    #[derive(Default)]
    pub(crate) struct FakeExecutor {
        pub(crate) rows: Vec<DecodedRecord>,
        pub(crate) affected: u64,
        pub(crate) failure: Option<DataAccessError>,
        pub(crate) calls: Mutex<Vec<Call>>,
    }

    impl FakeExecutor {
        pub(crate) fn with_rows(rows: Vec<Value>) -> Self {
            Self {
                rows: rows.into_iter().map(record).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn affecting(affected: u64) -> Self {
            Self {
                affected,
                ..Self::default()
            }
        }

        pub(crate) fn failing(failure: DataAccessError) -> Self {
            Self {
                failure: Some(failure),
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueryExecutor for FakeExecutor {
        async fn read(
            &self,
            statement: &str,
            params: &[SqlParam],
        ) -> Result<Vec<DecodedRecord>, DataAccessError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Read(statement.to_string(), params.to_vec()));
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(self.rows.clone()),
            }
        }

        async fn write(
            &self,
            statement: &str,
            params: &[SqlParam],
        ) -> Result<u64, DataAccessError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Write(statement.to_string(), params.to_vec()));
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(self.affected),
            }
        }
    }

    pub(crate) fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    pub(crate) fn app_with(db: Arc<FakeExecutor>) -> Router {
        app_with_exposure(db, true)
    }

    fn app_with_exposure(db: Arc<FakeExecutor>, expose_errors: bool) -> Router {
        let state = Arc::new(AppState::new(
            db,
            TokenVerifier::new(AUDIENCE, ISSUER),
            expose_errors,
        ));
        build_router(state)
    }

    pub(crate) async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn index_reports_liveness() {
        let (status, body) = send(app_with(Arc::default()), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("funcionando"));

        let (status, _) = send(app_with(Arc::default()), get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_unauthorized() {
        let (status, body) = send(app_with(Arc::default()), get("/api/data")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token no encontrado.");
    }

    #[tokio::test]
    async fn protected_route_with_malformed_header_is_unauthorized() {
        let request = Request::builder()
            .uri("/api/data")
            .header("authorization", "Bearer")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app_with(Arc::default()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token malformado.");
    }

    #[tokio::test]
    async fn data_route_echoes_token_name() {
        let token = mint(valid_claims());
        let (status, body) = send(app_with(Arc::default()), get_with_token("/api/data", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_name_from_token"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn expired_token_gets_expiry_message() {
        let mut claims = valid_claims();
        claims["exp"] = json!(Utc::now().timestamp() - 5);
        let (status, body) =
            send(app_with(Arc::default()), get_with_token("/api/data", &mint(claims))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "El token ha expirado.");
    }

    #[tokio::test]
    async fn foreign_audience_is_rejected_even_when_well_formed() {
        let mut claims = valid_claims();
        claims["aud"] = json!("another-app");
        let (status, body) =
            send(app_with(Arc::default()), get_with_token("/api/data", &mint(claims))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token inválido.");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn alerts_require_token_and_skip_database_without_one() {
        let db = Arc::new(FakeExecutor::default());
        let (status, _) = send(app_with(db.clone()), get("/api/alerts")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn alerts_return_latest_rows() {
        let db = Arc::new(FakeExecutor::with_rows(vec![
            json!({"ID": "2", "NombreMetrica": "CPU", "ValorActual": "91.5"}),
            json!({"ID": "1", "NombreMetrica": "RAM", "ValorActual": "40"}),
        ]));
        let token = mint(valid_claims());
        let (status, body) = send(app_with(db.clone()), get_with_token("/api/alerts", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["NombreMetrica"], "CPU");
        assert_eq!(db.calls(), vec![Call::Read(ALERTS_QUERY.to_string(), vec![])]);
    }

    #[tokio::test]
    async fn alerts_database_failure_is_500_with_driver_text() {
        let db = Arc::new(FakeExecutor::failing(DataAccessError::ConnectionFailed(
            "login timeout expired".into(),
        )));
        let token = mint(valid_claims());
        let (status, body) = send(app_with(db), get_with_token("/api/alerts", &token)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Error al obtener las alertas");
        assert_eq!(body["error"], "login timeout expired");
    }

    #[tokio::test]
    async fn driver_text_is_hidden_when_exposure_disabled() {
        let db = Arc::new(FakeExecutor::failing(DataAccessError::ExecutionFailed(
            "syntax error near 'Alertas'".into(),
        )));
        let token = mint(valid_claims());
        let (status, body) = send(
            app_with_exposure(db, false),
            get_with_token("/api/alerts", &token),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], HIDDEN_ERROR_DETAIL);
    }

    #[test]
    fn only_plain_digits_parse_as_ids() {
        assert_eq!(parse_id("42", "x").unwrap(), 42);
        assert_eq!(parse_id("007", "x").unwrap(), 7);
        for segment in ["", "abc", "-1", "+5", "4.2", "99999999999999999999"] {
            let err = parse_id(segment, "Ítem no encontrado").unwrap_err();
            assert_eq!(err.status, StatusCode::NOT_FOUND, "{segment}");
            assert_eq!(err.message, "Ítem no encontrado");
        }
    }

    #[test]
    fn cors_layer_rejects_invalid_origin() {
        assert!(cors_layer(&["http://ok.example".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }
}
