// NextBus API server
// Fuses a static GTFS schedule with two realtime feeds (trip updates,
// vehicle positions) and serves rider-facing arrival predictions and live
// vehicle locations.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time;

mod error;
mod fusion;
mod gtfs_static;
mod realtime;

use error::NextBusError;
use fusion::{match_vehicles, predict_arrivals};
use gtfs_static::ScheduleStore;
use realtime::{advance_snapshot, RealtimeClient, RealtimeSnapshot};

const DEFAULT_GTFS_PATH: &str = "GTFS";
const DEFAULT_REALTIME_URL: &str = "http://realtime.ripta.com:81/api";
const DEFAULT_BIND: &str = "0.0.0.0:8080";
const POLL_INTERVAL_SECS: u64 = 15;

#[derive(Clone)]
struct AppState {
    schedule: Arc<ScheduleStore>,
    snapshot: Arc<Mutex<RealtimeSnapshot>>,
    client: RealtimeClient,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now().timestamp(),
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now().timestamp(),
        }
    }
}

// ============================================================================
// Fusion Endpoints
// ============================================================================

#[derive(Deserialize)]
struct ArrivalsQuery {
    route: String,
    stop: String,
    direction: u8,
}

async fn get_arrivals(
    state: web::Data<AppState>,
    query: web::Query<ArrivalsQuery>,
) -> HttpResponse {
    if query.direction > 1 {
        return HttpResponse::BadRequest().json(ApiResponse::<String>::error(format!(
            "direction must be 0 or 1, got {}",
            query.direction
        )));
    }

    match state.snapshot.lock() {
        Ok(snapshot) => {
            let arrivals = predict_arrivals(
                &query.route,
                &query.stop,
                query.direction,
                Utc::now(),
                &state.schedule,
                &snapshot.trip_updates,
            );
            println!(
                "🚌 Arrivals requested: route {} stop {} direction {} -> {} predictions",
                query.route,
                query.stop,
                query.direction,
                arrivals.len()
            );
            HttpResponse::Ok().json(ApiResponse::success(arrivals))
        }
        Err(e) => {
            eprintln!("❌ Failed to lock realtime snapshot: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<String>::error(
                "Failed to read realtime snapshot".to_string(),
            ))
        }
    }
}

#[derive(Deserialize)]
struct VehiclesQuery {
    route: Option<String>,
    direction: Option<u8>,
}

async fn get_vehicles(
    state: web::Data<AppState>,
    query: web::Query<VehiclesQuery>,
) -> HttpResponse {
    if let Some(direction) = query.direction {
        if direction > 1 {
            return HttpResponse::BadRequest().json(ApiResponse::<String>::error(format!(
                "direction must be 0 or 1, got {}",
                direction
            )));
        }
    }

    match state.snapshot.lock() {
        Ok(snapshot) => {
            let located = match_vehicles(
                &snapshot.vehicles,
                query.route.as_deref(),
                query.direction,
                &state.schedule,
            );
            println!("🚗 Vehicles requested: {} matched", located.len());
            HttpResponse::Ok().json(ApiResponse::success(located))
        }
        Err(e) => {
            eprintln!("❌ Failed to lock realtime snapshot: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<String>::error(
                "Failed to read realtime snapshot".to_string(),
            ))
        }
    }
}

// ============================================================================
// Static Schedule Endpoints
// ============================================================================

async fn get_routes(state: web::Data<AppState>) -> HttpResponse {
    let routes = state.schedule.routes_sorted();
    println!("🚌 Routes requested: {} total", routes.len());
    HttpResponse::Ok().json(ApiResponse::success(routes))
}

async fn get_route(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let route_id = path.into_inner();
    match state.schedule.route(&route_id) {
        Some(route) => HttpResponse::Ok().json(ApiResponse::success(route)),
        None => HttpResponse::NotFound().json(ApiResponse::<String>::error(format!(
            "Route '{}' not found",
            route_id
        ))),
    }
}

#[derive(Deserialize)]
struct DirectionQuery {
    direction: u8,
}

async fn get_route_stops(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DirectionQuery>,
) -> HttpResponse {
    let route_id = path.into_inner();
    if query.direction > 1 {
        return HttpResponse::BadRequest().json(ApiResponse::<String>::error(format!(
            "direction must be 0 or 1, got {}",
            query.direction
        )));
    }

    let stops = state.schedule.stops_for(&route_id, query.direction);
    if stops.is_empty() {
        return HttpResponse::NotFound().json(ApiResponse::<String>::error(format!(
            "No stop pattern for route '{}' direction {}",
            route_id, query.direction
        )));
    }
    println!(
        "📍 Stop pattern requested: route {} direction {} -> {} stops",
        route_id,
        query.direction,
        stops.len()
    );
    HttpResponse::Ok().json(ApiResponse::success(stops))
}

async fn get_route_timepoints(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let route_id = path.into_inner();
    let timepoints = state.schedule.timepoints_for(&route_id);
    HttpResponse::Ok().json(ApiResponse::success(timepoints))
}

async fn get_stops(state: web::Data<AppState>) -> HttpResponse {
    let stops = state.schedule.stops_sorted();
    println!("📍 Stops requested: {} total", stops.len());
    HttpResponse::Ok().json(ApiResponse::success(stops))
}

async fn get_stop(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let stop_id = path.into_inner();
    match state.schedule.stop(&stop_id) {
        Some(stop) => HttpResponse::Ok().json(ApiResponse::success(stop)),
        None => HttpResponse::NotFound().json(ApiResponse::<String>::error(format!(
            "Stop '{}' not found",
            stop_id
        ))),
    }
}

async fn get_shape(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let shape_id = path.into_inner();
    match state.schedule.shape(&shape_id) {
        Some(points) => HttpResponse::Ok().json(ApiResponse::success(points)),
        None => HttpResponse::NotFound().json(ApiResponse::<String>::error(format!(
            "Shape '{}' not found",
            shape_id
        ))),
    }
}

async fn get_calendar_dates(state: web::Data<AppState>) -> HttpResponse {
    // Raw exception table; service-override semantics are the consumer's
    // problem.
    HttpResponse::Ok().json(ApiResponse::success(&state.schedule.calendar_dates))
}

// ============================================================================
// Meta & Control Endpoints
// ============================================================================

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let publisher = state
        .schedule
        .feed_info
        .first()
        .map(|info| info.feed_publisher_name.clone());
    let agency = state
        .schedule
        .agencies
        .first()
        .map(|agency| agency.agency_name.clone());

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "NextBus Transit API",
        "version": env!("CARGO_PKG_VERSION"),
        "agency": agency,
        "feed_publisher": publisher,
        "timestamp": Utc::now().timestamp(),
    }))
}

async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    match state.snapshot.lock() {
        Ok(snapshot) => {
            let schedule = &state.schedule;
            let snapshot_age = Utc::now().timestamp().saturating_sub(snapshot.fetched_at);
            let stats = format!(
                "📊 Fusion Statistics:\n\
                 • {} routes, {} trips, {} stops\n\
                 • {} stop time rows, {} shapes\n\
                 • {} calendar date exceptions, {} timepoint rows\n\
                 • {} trip updates, {} vehicles tracked\n\
                 • Realtime snapshot age: {}s",
                schedule.routes_by_id.len(),
                schedule.trips_by_id.len(),
                schedule.stops_by_id.len(),
                schedule
                    .stop_times_by_trip
                    .values()
                    .map(|v| v.len())
                    .sum::<usize>(),
                schedule.shapes_by_id.len(),
                schedule.calendar_dates.len(),
                schedule.route_timepoints.len(),
                snapshot.trip_updates.len(),
                snapshot.vehicles.len(),
                snapshot_age,
            );
            HttpResponse::Ok().json(ApiResponse::success(stats))
        }
        Err(e) => {
            eprintln!("❌ Failed to lock realtime snapshot: {}", e);
            HttpResponse::InternalServerError().json(ApiResponse::<String>::error(
                "Failed to read realtime snapshot".to_string(),
            ))
        }
    }
}

async fn force_refresh(state: web::Data<AppState>) -> HttpResponse {
    println!("🔄 Manual refresh requested...");
    if run_poll_cycle(&state).await {
        println!("✓ Manual refresh completed successfully");
        HttpResponse::Ok().json(ApiResponse::success("Realtime data refreshed"))
    } else {
        HttpResponse::InternalServerError().json(ApiResponse::<String>::error(
            "Refresh failed; previous snapshot retained".to_string(),
        ))
    }
}

// ============================================================================
// Background Task
// ============================================================================

fn flatten_fetch<T>(joined: Result<error::Result<T>, tokio::task::JoinError>) -> error::Result<T> {
    joined.unwrap_or_else(|e| {
        Err(NextBusError::NetworkError(format!(
            "fetch task panicked: {}",
            e
        )))
    })
}

/// One poll cycle: fetch both feeds concurrently, and only when both
/// succeed swap the snapshot as a single unit. On any failure the previous
/// snapshot stays published untouched; the next tick is the retry.
async fn run_poll_cycle(state: &AppState) -> bool {
    let trip_client = state.client.clone();
    let vehicle_client = state.client.clone();

    let (trip_updates, vehicles) = tokio::join!(
        tokio::task::spawn_blocking(move || trip_client.fetch_trip_updates()),
        tokio::task::spawn_blocking(move || vehicle_client.fetch_vehicle_positions()),
    );
    let trip_updates = flatten_fetch(trip_updates);
    let vehicles = flatten_fetch(vehicles);

    if let Err(e) = &trip_updates {
        eprintln!("⚠️  Warning: could not fetch trip updates ({})", e);
    }
    if let Err(e) = &vehicles {
        eprintln!("⚠️  Warning: could not fetch vehicle positions ({})", e);
    }

    match state.snapshot.lock() {
        Ok(mut snapshot) => {
            let previous = snapshot.clone();
            let (next, swapped) =
                advance_snapshot(previous, trip_updates, vehicles, Utc::now().timestamp());
            *snapshot = next;
            swapped
        }
        Err(e) => {
            eprintln!("❌ Failed to lock realtime snapshot: {}", e);
            false
        }
    }
}

async fn realtime_poll_task(state: AppState) {
    let mut interval = time::interval(Duration::from_secs(POLL_INTERVAL_SECS));

    loop {
        interval.tick().await;

        if run_poll_cycle(&state).await {
            match state.snapshot.lock() {
                Ok(snapshot) => println!(
                    "✓ Realtime snapshot refreshed: {} trip updates, {} vehicles",
                    snapshot.trip_updates.len(),
                    snapshot.vehicles.len()
                ),
                Err(e) => eprintln!("❌ Failed to lock realtime snapshot: {}", e),
            }
        } else {
            eprintln!("⚠️  Poll cycle skipped; previous snapshot retained");
        }
    }
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(state: AppState, bind: String) -> std::io::Result<()> {
    // Single fixed-period poller; the loop awaits each cycle, so cycles
    // never overlap.
    let poll_state = state.clone();
    tokio::spawn(async move {
        realtime_poll_task(poll_state).await;
    });

    println!("\n🌐 Server running on: http://{}", bind);
    println!("🔄 Realtime poll: every {} seconds\n", POLL_INTERVAL_SECS);

    println!("📍 Available Routes:");
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│ API - Fusion:                                               │");
    println!("│   GET  /api/nextbus/arrivals?route&stop&direction           │");
    println!("│   GET  /api/nextbus/vehicles[?route][&direction]            │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ API - Static Schedule:                                      │");
    println!("│   GET  /api/nextbus/routes          - All routes            │");
    println!("│   GET  /api/nextbus/route/{{id}}      - Route by id           │");
    println!("│   GET  /api/nextbus/route/{{id}}/stops?direction              │");
    println!("│   GET  /api/nextbus/route/{{id}}/timepoints                   │");
    println!("│   GET  /api/nextbus/stops           - All stops             │");
    println!("│   GET  /api/nextbus/stop/{{id}}       - Stop by id            │");
    println!("│   GET  /api/nextbus/shape/{{id}}      - Shape points          │");
    println!("│   GET  /api/nextbus/calendar_dates  - Raw exception table   │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│ API - Meta & Control:                                       │");
    println!("│   GET  /health                      - Health check          │");
    println!("│   GET  /api/nextbus/stats           - Fusion statistics     │");
    println!("│   POST /api/nextbus/refresh         - Force refresh         │");
    println!("└─────────────────────────────────────────────────────────────┘\n");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api/nextbus")
                    .route("/arrivals", web::get().to(get_arrivals))
                    .route("/vehicles", web::get().to(get_vehicles))
                    .route("/routes", web::get().to(get_routes))
                    .route("/route/{id}", web::get().to(get_route))
                    .route("/route/{id}/stops", web::get().to(get_route_stops))
                    .route("/route/{id}/timepoints", web::get().to(get_route_timepoints))
                    .route("/stops", web::get().to(get_stops))
                    .route("/stop/{id}", web::get().to(get_stop))
                    .route("/shape/{id}", web::get().to(get_shape))
                    .route("/calendar_dates", web::get().to(get_calendar_dates))
                    .route("/stats", web::get().to(get_stats))
                    .route("/refresh", web::post().to(force_refresh)),
            )
    })
    .bind(bind)?
    .run()
    .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║   🚌 NextBus Transit Server                                ║");
    println!("║      Schedule + Realtime Fusion                            ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    let gtfs_path = PathBuf::from(
        std::env::var("NEXTBUS_GTFS_PATH").unwrap_or_else(|_| DEFAULT_GTFS_PATH.to_string()),
    );
    let realtime_url =
        std::env::var("NEXTBUS_REALTIME_URL").unwrap_or_else(|_| DEFAULT_REALTIME_URL.to_string());
    let bind = std::env::var("NEXTBUS_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());

    println!("📦 Loading static schedule from {}...", gtfs_path.display());
    let schedule = match ScheduleStore::load(&gtfs_path) {
        Ok(schedule) => {
            println!("✓ Static schedule loaded\n");
            schedule
        }
        Err(e) => {
            eprintln!("\n❌ Failed to load static schedule: {}", e);
            eprintln!("Server cannot start without the static schedule.");
            eprintln!("\n💡 Troubleshooting:");
            eprintln!("   1. Point NEXTBUS_GTFS_PATH at a GTFS directory or .zip");
            eprintln!("   2. Check that all nine schedule tables are present");
            eprintln!("   3. Review the error message above\n");
            std::process::exit(1);
        }
    };
    println!("📡 Realtime feed base: {}", realtime_url);

    let state = AppState {
        schedule: Arc::new(schedule),
        snapshot: Arc::new(Mutex::new(RealtimeSnapshot::empty(Utc::now().timestamp()))),
        client: RealtimeClient::new(realtime_url),
    };

    actix_web::rt::System::new().block_on(run_server(state, bind))
}
