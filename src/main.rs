use std::env;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use slog::info;
use tokio::sync::Mutex;
use url::Url;

use cidermap::config::{get_variable, get_variable_or};
use cidermap::dedup::DEFAULT_MATCH_EPSILON;
use cidermap::geocode::{Geocoder, HttpGeocoder, NoopGeocoder};
use cidermap::log::initialize_logger;
use cidermap::routes::make_routes;
use cidermap::sheet::CsvSheet;
use cidermap::workflow::RegistrationWorkflow;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = Arc::new(initialize_logger());

    let sheet = Arc::new(CsvSheet::new(get_variable("CIDERMAP_SHEET_PATH")));

    let geocoder: Arc<dyn Geocoder> = match env::var("CIDERMAP_GEOCODER_URL") {
        Ok(raw) => {
            let base_url = Url::parse(&raw)?;
            let timeout_ms: u64 = get_variable_or("CIDERMAP_GEOCODER_TIMEOUT_MS", "1500")
                .parse()
                .expect("parse CIDERMAP_GEOCODER_TIMEOUT_MS");

            Arc::new(HttpGeocoder::new(
                base_url,
                Duration::from_millis(timeout_ms),
            )?)
        }
        Err(_) => Arc::new(NoopGeocoder),
    };

    let epsilon: f64 = get_variable_or(
        "CIDERMAP_MATCH_EPSILON",
        &DEFAULT_MATCH_EPSILON.to_string(),
    )
    .parse()
    .expect("parse CIDERMAP_MATCH_EPSILON");

    let workflow = Arc::new(Mutex::new(RegistrationWorkflow::new(
        logger.clone(),
        sheet,
        geocoder,
        epsilon,
    )));

    let addr: SocketAddr = get_variable_or("CIDERMAP_BIND", "127.0.0.1:3030").parse()?;

    info!(logger, "starting cidermap";
          "addr" => addr.to_string(), "epsilon" => epsilon);

    let routes = make_routes(logger, workflow);
    warp::serve(routes).run(addr).await;

    Ok(())
}
