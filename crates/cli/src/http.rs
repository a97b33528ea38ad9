//! HTTP surface of the gateway.
//!
//! `/sms*` routes require basic auth; `/status/*` and `/` are public. Every
//! handler is a thin adapter over [`Gateway`], which owns device access and
//! telemetry side effects.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use smsgw::{Gateway, OutboundJob};
use smsgw_protocol::{SendOutcome, SmsRecord};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("Missing required field: {0}")]
	MissingField(&'static str),
	#[error("Invalid request body: {0}")]
	InvalidBody(String),
	#[error("SMS with id '{0}' not found")]
	NotFound(String),
	#[error("{0}")]
	Device(String),
	#[error("Unauthorized access")]
	Unauthorized,
}

impl ApiError {
	pub fn status(&self) -> StatusCode {
		match self {
			ApiError::MissingField(_) | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
			ApiError::NotFound(_) => StatusCode::NOT_FOUND,
			ApiError::Device(_) => StatusCode::SERVICE_UNAVAILABLE,
			ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		let body = Json(json!({ "status": status.as_u16(), "message": self.to_string() }));
		let mut response = (status, body).into_response();
		if status == StatusCode::UNAUTHORIZED {
			response.headers_mut().insert(
				WWW_AUTHENTICATE,
				HeaderValue::from_static("Basic realm=\"Authentication Required\""),
			);
		}
		response
	}
}

/// Basic-auth credentials guarding the message routes.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	username: String,
	password: String,
}

impl Credentials {
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: password.into(),
		}
	}

	/// Checks an `Authorization: Basic ...` header. Empty user names or
	/// passwords never match.
	pub fn verify(&self, header: Option<&HeaderValue>) -> bool {
		let Some(encoded) = header
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Basic "))
		else {
			return false;
		};
		let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
			return false;
		};
		let Ok(decoded) = String::from_utf8(decoded) else {
			return false;
		};
		match decoded.split_once(':') {
			Some((user, password)) if !user.is_empty() && !password.is_empty() => {
				user == self.username && password == self.password
			}
			_ => false,
		}
	}
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.finish_non_exhaustive()
	}
}

#[derive(Clone, Debug)]
pub struct AppState {
	pub gateway: Arc<Gateway>,
	pub credentials: Arc<Credentials>,
}

impl AppState {
	pub fn new(gateway: Arc<Gateway>, credentials: Credentials) -> Self {
		Self {
			gateway,
			credentials: Arc::new(credentials),
		}
	}
}

pub fn router(state: AppState) -> Router {
	let sms = Router::new()
		.route("/sms", get(list_sms).post(send_sms))
		.route("/sms/getsms", get(pop_sms))
		.route("/sms/{id}", get(get_sms).delete(delete_sms))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_basic_auth));

	Router::new()
		.route("/", get(health))
		.route("/status/signal", get(signal))
		.route("/status/network", get(network))
		.route("/status/reset", get(reset))
		.route("/status/device", get(device))
		.merge(sms)
		.layer(middleware::from_fn(log_request))
		.with_state(state)
}

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve(
	listener: TcpListener,
	state: AppState,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
	if let Ok(addr) = listener.local_addr() {
		info!(target = "smsgw.http", %addr, "HTTP API listening");
	}
	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown)
		.await
}

async fn require_basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
	if state.credentials.verify(request.headers().get(AUTHORIZATION)) {
		next.run(request).await
	} else {
		debug!(target = "smsgw.http", path = %request.uri().path(), "rejected unauthenticated request");
		ApiError::Unauthorized.into_response()
	}
}

async fn log_request(request: Request, next: Next) -> Response {
	let method = request.method().clone();
	let path = request.uri().path().to_string();
	let response = next.run(request).await;
	debug!(target = "smsgw.http", %method, %path, status = response.status().as_u16(), "request");
	response
}

async fn health(State(state): State<AppState>) -> Json<Value> {
	Json(json!({
		"name": "smsgw",
		"version": env!("CARGO_PKG_VERSION"),
		"status": state.gateway.session().health().to_string(),
	}))
}

async fn list_sms(State(state): State<AppState>) -> Json<Vec<SmsRecord>> {
	let messages = state.gateway.list().await;
	Json(messages.iter().map(|message| message.to_record()).collect())
}

async fn get_sms(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SmsRecord>, ApiError> {
	let index = parse_index(&id)?;
	state
		.gateway
		.message(index)
		.await
		.map(|message| Json(message.to_record()))
		.ok_or(ApiError::NotFound(id))
}

async fn delete_sms(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
	let index = parse_index(&id)?;
	let report = state.gateway.delete(index).await.ok_or(ApiError::NotFound(id))?;
	if !report.is_complete() {
		warn!(
			target = "smsgw.http",
			index,
			failed = report.failed.len(),
			"message only partially deleted"
		);
	}
	Ok(StatusCode::NO_CONTENT)
}

async fn pop_sms(State(state): State<AppState>) -> Json<SmsRecord> {
	Json(state.gateway.pop_first().await)
}

async fn send_sms(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
	let request: SendRequest = if body.iter().all(u8::is_ascii_whitespace) {
		SendRequest::default()
	} else {
		serde_json::from_slice(&body).map_err(|err| ApiError::InvalidBody(err.to_string()))?
	};
	let job = request.into_job()?;

	let outcomes = state.gateway.send(&job).await;
	let accepted = outcomes.iter().filter(|outcome| outcome.is_accepted()).count();
	let (status, message) = summarize(&outcomes, accepted);
	info!(
		target = "smsgw.http",
		destinations = outcomes.len(),
		accepted,
		"send request handled"
	);

	let body = Json(json!({
		"status": status.as_u16(),
		"message": message,
		"results": outcomes,
	}));
	Ok((status, body).into_response())
}

async fn signal(State(state): State<AppState>) -> Result<Response, ApiError> {
	let signal = state.gateway.signal().await.map_err(device_error)?;
	Ok(Json(signal).into_response())
}

async fn network(State(state): State<AppState>) -> Result<Response, ApiError> {
	let network = state.gateway.network().await.map_err(device_error)?;
	Ok(Json(network).into_response())
}

async fn reset(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
	state.gateway.reset().await.map_err(device_error)?;
	Ok(Json(json!({ "status": 200, "message": "Reset done" })))
}

async fn device(State(state): State<AppState>) -> Response {
	Json(state.gateway.device_status()).into_response()
}

fn device_error(err: impl std::fmt::Display) -> ApiError {
	ApiError::Device(err.to_string())
}

fn parse_index(id: &str) -> Result<usize, ApiError> {
	id.parse().map_err(|_| ApiError::NotFound(id.to_string()))
}

fn summarize(outcomes: &[SendOutcome], accepted: usize) -> (StatusCode, String) {
	if accepted == outcomes.len() {
		(StatusCode::OK, format!("SMS sent to {accepted} recipient(s)"))
	} else if accepted > 0 {
		(
			StatusCode::MULTI_STATUS,
			format!("SMS sent to {accepted} of {} recipients", outcomes.len()),
		)
	} else {
		let error = outcomes
			.iter()
			.find_map(|outcome| match outcome {
				SendOutcome::Rejected { error, .. } => Some(error.clone()),
				SendOutcome::Accepted { .. } => None,
			})
			.unwrap_or_else(|| "SMS sending failed".to_string());
		(StatusCode::BAD_GATEWAY, error)
	}
}

/// `POST /sms` body. `message` and `target` are aliases of `text` and
/// `number`.
#[derive(Debug, Default, Deserialize)]
struct SendRequest {
	text: Option<Value>,
	message: Option<Value>,
	number: Option<Value>,
	target: Option<Value>,
	smsc: Option<Value>,
	unicode: Option<Value>,
}

impl SendRequest {
	fn into_job(self) -> Result<OutboundJob, ApiError> {
		let text = field_text(self.text)
			.or_else(|| field_text(self.message))
			.ok_or(ApiError::MissingField("text or message"))?;
		let number = field_text(self.number)
			.or_else(|| field_text(self.target))
			.ok_or(ApiError::MissingField("number or target"))?;

		let mut job = OutboundJob::new(number, text);
		if let Some(smsc) = field_text(self.smsc) {
			job = job.with_smsc(smsc);
		}
		if let Some(unicode) = self.unicode.as_ref().and_then(truthy) {
			job = job.with_unicode(unicode);
		}
		Ok(job)
	}
}

/// Non-empty string form of a scalar field.
fn field_text(value: Option<Value>) -> Option<String> {
	let text = match value? {
		Value::String(text) => text,
		Value::Number(number) => number.to_string(),
		_ => return None,
	};
	(!text.is_empty()).then_some(text)
}

fn truthy(value: &Value) -> Option<bool> {
	match value {
		Value::Null => None,
		Value::Bool(flag) => Some(*flag),
		Value::Number(number) => Some(number.as_f64().is_some_and(|n| n != 0.0)),
		Value::String(text) => Some(matches!(
			text.trim().to_ascii_lowercase().as_str(),
			"1" | "true" | "yes" | "on"
		)),
		_ => Some(false),
	}
}
