/// HTTP endpoint for the prediction API
///
/// Serves the trained models to the sensor gateway and the mobile app.
///
/// Endpoints:
/// - POST /predict        - Risk label, class probabilities and narrative
/// - POST /predict_time   - Predicted seconds until upstream danger
/// - POST /batch_predict  - `/predict` over `{"samples": [...]}`
/// - POST /reload_models  - Re-read artifacts from the models directory
/// - GET  /model_info     - Loaded artifacts, feature counts, importances
/// - GET  /health         - Service health check

use crate::serving::{PredictionService, ServeError};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Read;

const AVAILABLE_ENDPOINTS: [&str; 6] = [
    "POST /predict",
    "POST /predict_time",
    "POST /batch_predict",
    "POST /reload_models",
    "GET /model_info",
    "GET /health",
];

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Routes one request to the service; returns status code and JSON body.
///
/// Kept free of `tiny_http` types so it can be driven directly in tests.
pub fn route(service: &mut PredictionService, method: &str, url: &str, body: &str) -> (u16, Value) {
    let path = url.split('?').next().unwrap_or(url);

    match (method, path) {
        ("POST", "/predict") => with_json_body(body, |v| service.predict(v)),
        ("POST", "/predict_time") => with_json_body(body, |v| service.predict_time(v)),
        ("POST", "/batch_predict") => with_json_body(body, |v| service.batch_predict(v)),
        ("POST", "/reload_models") => handle_reload(service),
        ("GET", "/model_info") => (200, service.model_info()),
        ("GET", "/health") => (200, service.health()),
        (_, p) if is_known_path(p) => (
            405,
            json!({
                "error": format!("Method {} not allowed for {}", method, p),
                "available_endpoints": AVAILABLE_ENDPOINTS
            }),
        ),
        _ => (
            404,
            json!({
                "error": "Not found",
                "available_endpoints": AVAILABLE_ENDPOINTS
            }),
        ),
    }
}

fn is_known_path(path: &str) -> bool {
    AVAILABLE_ENDPOINTS
        .iter()
        .any(|e| e.split_once(' ').is_some_and(|(_, p)| p == path))
}

fn with_json_body<T, F>(body: &str, handler: F) -> (u16, Value)
where
    T: Serialize,
    F: FnOnce(&Value) -> Result<T, ServeError>,
{
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return error_response(&ServeError::InvalidJson(e.to_string())),
    };

    match handler(&parsed).and_then(|r| {
        serde_json::to_value(r).map_err(|e| ServeError::InvalidJson(e.to_string()))
    }) {
        Ok(value) => (200, value),
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &ServeError) -> (u16, Value) {
    let status = e.status_code();
    if status >= 500 {
        log::error!("request failed: {}", e);
    } else {
        log::debug!("request rejected ({}): {}", status, e);
    }
    (status, e.to_json())
}

/// Handle /reload_models endpoint
fn handle_reload(service: &mut PredictionService) -> (u16, Value) {
    let report = service.reload();
    let status = if report.classifier_loaded || report.regressor_loaded {
        200
    } else {
        503
    };
    (
        status,
        json!({
            "classifier_loaded": report.classifier_loaded,
            "regressor_loaded": report.regressor_loaded,
            "errors": report.errors,
            "retained": report.retained,
        }),
    )
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port
pub fn start_endpoint_server(port: u16, mut service: PredictionService) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    for endpoint in AVAILABLE_ENDPOINTS {
        println!("   {}", endpoint);
    }
    println!();

    for mut request in server.incoming_requests() {
        let method = request.method().to_string();
        let url = request.url().to_string();

        let mut body = String::new();
        let (status, json) = match request.as_reader().read_to_string(&mut body) {
            Ok(_) => route(&mut service, &method, &url, &body),
            Err(e) => (400, json!({ "error": format!("Failed to read request body: {}", e) })),
        };
        log::info!("{} {} -> {}", method, url, status);

        if let Err(e) = request.respond(create_response(status, json)) {
            eprintln!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let body = serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string());

    let response = tiny_http::Response::from_data(body.into_bytes())
        .with_status_code(tiny_http::StatusCode::from(status_code));
    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
