use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use slog::{debug, error, Logger};
use tokio::sync::Mutex;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, Reply, WithStatus};
use warp::Filter;

use crate::errors::WorkflowError;
use crate::record::ServiceFormat;
use crate::workflow::{RegistrationForm, RegistrationWorkflow};

/// The workflow instance behind the HTTP surface. The hosted app runs
/// one shared community session; interactions serialize on the lock,
/// which matches the one-at-a-time interaction model.
pub type SharedWorkflow = Arc<Mutex<RegistrationWorkflow>>;

/// A coordinate as submitted by the map surface: either a JSON number
/// or the raw text from an input field (possibly comma-decimal).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCoord {
    Text(String),
    Number(f64),
}

impl RawCoord {
    fn as_text(&self) -> String {
        match self {
            RawCoord::Text(s) => s.clone(),
            RawCoord::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SelectionBody {
    lat: RawCoord,
    lon: RawCoord,
}

#[derive(Debug, Deserialize)]
struct BarFormBody {
    name: String,
    #[serde(default)]
    brand: String,
    #[serde(default)]
    format: ServiceFormat,
    #[serde(default)]
    notes: String,
}

#[derive(Serialize)]
struct CaptureResponse {
    status: &'static str,
    lat: f64,
    lon: f64,
    duplicate_of: Option<String>,
    suggested_name: String,
}

#[derive(Serialize)]
struct SavedResponse<T: Serialize> {
    status: &'static str,
    record: T,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

/// `GET /bars`: markers for every stored row with a valid coordinate.
pub fn make_markers_route(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    warp::path("bars")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || -> BoxFuture<'static, Result<WithStatus<Json>, reject::Rejection>> {
            list_markers(logger.clone(), workflow.clone()).boxed()
        })
}

/// `POST /selection`: the location-capture event.
pub fn make_capture_route(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    warp::path("selection")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and_then(
            move |body: SelectionBody| -> BoxFuture<'static, Result<WithStatus<Json>, reject::Rejection>> {
                capture(logger.clone(), workflow.clone(), body).boxed()
            },
        )
}

/// `DELETE /selection`: cancel; unconditionally drops the pending
/// selection without touching the store.
pub fn make_cancel_route(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    warp::path("selection")
        .and(warp::path::end())
        .and(warp::delete())
        .and_then(move || -> BoxFuture<'static, Result<WithStatus<Json>, reject::Rejection>> {
            cancel(logger.clone(), workflow.clone()).boxed()
        })
}

/// `POST /bars`: the save action for the open form.
pub fn make_save_route(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    warp::path("bars")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and_then(
            move |body: BarFormBody| -> BoxFuture<'static, Result<WithStatus<Json>, reject::Rejection>> {
                save(logger.clone(), workflow.clone(), body).boxed()
            },
        )
}

/// The whole HTTP surface, with workflow errors formatted into JSON
/// replies instead of leaking as raw rejections.
pub fn make_routes(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let rejection_logger = logger.clone();

    make_markers_route(logger.clone(), workflow.clone())
        .or(make_capture_route(logger.clone(), workflow.clone()))
        .or(make_cancel_route(logger.clone(), workflow.clone()))
        .or(make_save_route(logger, workflow))
        .recover(move |r| format_rejection(rejection_logger.clone(), r))
}

async fn list_markers(
    _logger: Arc<Logger>,
    workflow: SharedWorkflow,
) -> Result<WithStatus<Json>, reject::Rejection> {
    let workflow = workflow.lock().await;
    let markers = workflow.markers().await?;

    Ok(with_status(json(&markers), StatusCode::OK))
}

async fn capture(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
    body: SelectionBody,
) -> Result<WithStatus<Json>, reject::Rejection> {
    debug!(logger, "handling location capture");

    let mut workflow = workflow.lock().await;
    let capture = workflow
        .capture_point(&body.lat.as_text(), &body.lon.as_text())
        .await?;

    let response = CaptureResponse {
        status: "ok",
        lat: capture.point.lat,
        lon: capture.point.lon,
        duplicate_of: capture.duplicate_of,
        suggested_name: capture.suggested_name,
    };

    Ok(with_status(json(&response), StatusCode::OK))
}

async fn cancel(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
) -> Result<WithStatus<Json>, reject::Rejection> {
    debug!(logger, "cancelling registration");

    let mut workflow = workflow.lock().await;
    workflow.cancel();

    Ok(with_status(json(&StatusResponse { status: "ok" }), StatusCode::OK))
}

async fn save(
    logger: Arc<Logger>,
    workflow: SharedWorkflow,
    body: BarFormBody,
) -> Result<WithStatus<Json>, reject::Rejection> {
    debug!(logger, "handling save");

    let form = RegistrationForm {
        name: body.name,
        brand: body.brand,
        format: body.format,
        notes: body.notes,
    };

    let mut workflow = workflow.lock().await;
    let record = workflow.save(&form).await?;

    let response = SavedResponse {
        status: "ok",
        record,
    };

    Ok(with_status(json(&response), StatusCode::CREATED))
}

async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(e) = rej.find::<WorkflowError>() {
        error!(logger, "workflow error"; "error" => format!("{:?}", e));
        let response = ErrorResponse {
            status: "error",
            message: format!("{}", e),
        };

        return Ok(with_status(json(&response), status_code_for(e)));
    }

    Err(rej)
}

fn status_code_for(e: &WorkflowError) -> StatusCode {
    use WorkflowError::*;

    match e {
        InvalidCoordinate { .. } | EmptyName => StatusCode::BAD_REQUEST,
        NoPendingSelection => StatusCode::CONFLICT,
        StoreRead { .. } | StoreWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use slog::{o, Logger};
    use tokio::sync::Mutex;
    use warp::http::StatusCode;

    use crate::dedup::DEFAULT_MATCH_EPSILON;
    use crate::geocode::NoopGeocoder;
    use crate::record::RawRow;
    use crate::sheet::mock::MockSheet;
    use crate::workflow::RegistrationWorkflow;

    use super::{make_routes, SharedWorkflow};

    fn bar_uno_row() -> RawRow {
        RawRow {
            name: "Bar Uno".to_owned(),
            lat: "43.2960".to_owned(),
            lon: "-2.9975".to_owned(),
            brand: String::new(),
            format: "Pote/Vaso".to_owned(),
            registered_on: "01/01/2024".to_owned(),
            notes: String::new(),
        }
    }

    fn make_test_environment(rows: Vec<RawRow>) -> (Arc<MockSheet>, SharedWorkflow, Arc<Logger>) {
        let logger = Arc::new(Logger::root(slog::Discard, o!()));
        let sheet = Arc::new(MockSheet::with_rows(rows));
        let workflow = Arc::new(Mutex::new(RegistrationWorkflow::new(
            logger.clone(),
            sheet.clone(),
            Arc::new(NoopGeocoder),
            DEFAULT_MATCH_EPSILON,
        )));

        (sheet, workflow, logger)
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).expect("parse response body as JSON")
    }

    #[tokio::test]
    async fn capturing_and_saving_registers_a_bar() {
        let (sheet, workflow, logger) = make_test_environment(vec![bar_uno_row()]);
        let filter = make_routes(logger, workflow);

        let response = warp::test::request()
            .path("/selection")
            .method("POST")
            .json(&json!({ "lat": "43.3100", "lon": "-3.0100" }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.body());
        assert_eq!(body["duplicate_of"], Value::Null);

        let response = warp::test::request()
            .path("/bars")
            .method("POST")
            .json(&json!({ "name": "Bar Dos", "format": "Botella entera" }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response.body());
        assert_eq!(body["record"]["name"], "Bar Dos");

        let rows = sheet.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].format, "Botella entera");

        let response = warp::test::request()
            .path("/bars")
            .method("GET")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let markers = body_json(response.body());
        let markers = markers.as_array().expect("markers array");
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[1]["color"], "green");
    }

    #[tokio::test]
    async fn a_nearby_capture_reports_the_existing_bar() {
        let (_sheet, workflow, logger) = make_test_environment(vec![bar_uno_row()]);
        let filter = make_routes(logger, workflow);

        let response = warp::test::request()
            .path("/selection")
            .method("POST")
            .json(&json!({ "lat": 43.29601, "lon": -2.99751 }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response.body());
        assert_eq!(body["duplicate_of"], "Bar Uno");
    }

    #[tokio::test]
    async fn empty_names_are_rejected_without_losing_the_point() {
        let (sheet, workflow, logger) = make_test_environment(vec![bar_uno_row()]);
        let filter = make_routes(logger, workflow);

        let response = warp::test::request()
            .path("/selection")
            .method("POST")
            .json(&json!({ "lat": "43.3100", "lon": "-3.0100" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request()
            .path("/bars")
            .method("POST")
            .json(&json!({ "name": "   " }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response.body());
        assert_eq!(body["status"], "error");
        assert_eq!(sheet.rows().len(), 1);

        // The captured point is still pending, so a corrected submission works.
        let response = warp::test::request()
            .path("/bars")
            .method("POST")
            .json(&json!({ "name": "Bar Dos" }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(sheet.rows().len(), 2);
    }

    #[tokio::test]
    async fn saving_without_a_capture_conflicts() {
        let (sheet, workflow, logger) = make_test_environment(Vec::new());
        let filter = make_routes(logger, workflow);

        let response = warp::test::request()
            .path("/bars")
            .method("POST")
            .json(&json!({ "name": "Bar Dos" }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(sheet.rows().is_empty());
    }

    #[tokio::test]
    async fn cancelling_discards_the_selection() {
        let (sheet, workflow, logger) = make_test_environment(vec![bar_uno_row()]);
        let filter = make_routes(logger, workflow);

        let response = warp::test::request()
            .path("/selection")
            .method("POST")
            .json(&json!({ "lat": "43.3100", "lon": "-3.0100" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request()
            .path("/selection")
            .method("DELETE")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(sheet.rows().len(), 1);

        let response = warp::test::request()
            .path("/bars")
            .method("POST")
            .json(&json!({ "name": "Bar Dos" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_coordinates_fail_with_bad_request() {
        let (_sheet, workflow, logger) = make_test_environment(Vec::new());
        let filter = make_routes(logger, workflow);

        let response = warp::test::request()
            .path("/selection")
            .method("POST")
            .json(&json!({ "lat": "somewhere", "lon": "-3.0100" }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response.body());
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn a_rejected_write_reports_a_server_error() {
        let (sheet, workflow, logger) = make_test_environment(Vec::new());
        let filter = make_routes(logger, workflow);

        let response = warp::test::request()
            .path("/selection")
            .method("POST")
            .json(&json!({ "lat": "43.3100", "lon": "-3.0100" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        sheet.set_fail_writes(true);
        let response = warp::test::request()
            .path("/bars")
            .method("POST")
            .json(&json!({ "name": "Bar Dos" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The selection survived, so a retry succeeds once the store recovers.
        sheet.set_fail_writes(false);
        let response = warp::test::request()
            .path("/bars")
            .method("POST")
            .json(&json!({ "name": "Bar Dos" }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
