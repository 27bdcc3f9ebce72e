// Fusion queries over (static schedule, realtime snapshot).
//
// predict_arrivals joins schedule rows with trip-update delays to produce
// ordered arrival predictions for a route/stop/direction; match_vehicles
// joins live vehicle positions with the static trip index. Both are pure
// functions of their inputs plus `now`; no state is carried between calls.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::gtfs_static::ScheduleStore;
use crate::realtime::{TripUpdate, VehicleRecord};

const SECONDS_IN_DAY: u32 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Arrival {
    pub minutes_until: i64,
    pub headsign: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleLocation {
    pub trip_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub route_short_name: String,
}

// ============================================================================
// Service-day time resolution
// ============================================================================

/// "HH:MM:SS" to seconds since midnight. The hour may exceed 23.
fn parse_gtfs_time(time_str: &str) -> Option<u32> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: u32 = parts[0].parse().ok()?;
    let minutes: u32 = parts[1].parse().ok()?;
    let seconds: u32 = parts[2].parse().ok()?;

    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Resolve a wall-clock schedule time onto the current service day in the
/// agency timezone. An hour component >= 24 is post-midnight service of the
/// prior service day and lands on the current calendar date ("25:10:00"
/// queried at 01:00 means 01:10 today). Returns None when the string is
/// unparseable or the local time does not exist.
fn resolve_service_instant(arrival_time: &str, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let mut seconds = parse_gtfs_time(arrival_time)?;
    if seconds >= SECONDS_IN_DAY {
        seconds -= SECONDS_IN_DAY;
    }

    let local_date = now.with_timezone(&tz).date_naive();
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)?;
    let local = tz.from_local_datetime(&local_date.and_time(time)).earliest()?;
    Some(local.with_timezone(&Utc))
}

// ============================================================================
// Arrival prediction
// ============================================================================

/// Ordered arrival predictions for one route/stop/direction.
///
/// Candidates are every stop-time row at the stop across the
/// (route, direction) trips — a looping trip visiting the stop twice
/// contributes two candidates. A candidate with no matching trip update is
/// assumed on-schedule (delay 0); a candidate whose time cannot be resolved
/// is dropped without aborting the rest. Past-due predictions clamp to 0 and
/// are still reported; hiding departed buses is the caller's call.
pub fn predict_arrivals(
    route_id: &str,
    stop_id: &str,
    direction_id: u8,
    now: DateTime<Utc>,
    schedule: &ScheduleStore,
    trip_updates: &[TripUpdate],
) -> Vec<Arrival> {
    let tz = schedule.timezone();
    let mut arrivals = Vec::new();

    for trip in schedule.trips_for(route_id, direction_id) {
        for row in schedule.stop_times_for(&trip.trip_id) {
            if row.stop_id != stop_id {
                continue;
            }

            let delay = trip_updates
                .iter()
                .find(|tu| tu.trip.trip_id == row.trip_id)
                .and_then(|tu| {
                    tu.stop_time_update
                        .iter()
                        .find(|stu| stu.stop_id == row.stop_id)
                })
                .and_then(|stu| stu.arrival.as_ref())
                .map(|arrival| arrival.delay)
                .unwrap_or(0);

            let Some(scheduled) = resolve_service_instant(&row.arrival_time, now, tz) else {
                continue;
            };
            let predicted = scheduled + Duration::seconds(delay as i64);
            let minutes_until = predicted.signed_duration_since(now).num_seconds().max(0) / 60;

            let headsign = schedule
                .trip(&row.trip_id)
                .map(|t| t.trip_headsign.clone())
                .unwrap_or_default();

            arrivals.push(Arrival {
                minutes_until,
                headsign,
            });
        }
    }

    // Stable sort: ties keep candidate order.
    arrivals.sort_by_key(|a| a.minutes_until);
    arrivals
}

// ============================================================================
// Vehicle matching
// ============================================================================

/// Select live vehicles for a route/direction, or the whole fleet when both
/// filters are absent.
///
/// With a route filter, vehicles reporting no route or a different route are
/// discarded. Direction comes from the static trip index; a vehicle whose
/// trip has no static counterpart cannot be classified and is dropped
/// whenever a direction filter is requested. The label falls back to the raw
/// route id when the route is unknown — the lookup never fails the match.
pub fn match_vehicles(
    vehicles: &[VehicleRecord],
    route_filter: Option<&str>,
    direction_filter: Option<u8>,
    schedule: &ScheduleStore,
) -> Vec<VehicleLocation> {
    let mut located = Vec::new();

    for vehicle in vehicles {
        if let Some(wanted) = route_filter {
            match vehicle.trip.route_id.as_deref() {
                Some(reported) if reported == wanted => {}
                _ => continue,
            }
        }

        if let Some(wanted) = direction_filter {
            match schedule.trip(&vehicle.trip.trip_id) {
                Some(static_trip) if static_trip.direction_id == wanted => {}
                _ => continue,
            }
        }

        let route_short_name = match vehicle.trip.route_id.as_deref() {
            Some(reported) => schedule
                .route(reported)
                .map(|r| r.route_short_name.clone())
                .unwrap_or_else(|| reported.to_string()),
            None => String::new(),
        };

        located.push(VehicleLocation {
            trip_id: vehicle.trip.trip_id.clone(),
            latitude: vehicle.position.latitude,
            longitude: vehicle.position.longitude,
            route_short_name,
        });
    }

    located
}

// ============================================================================
// Tests
// ============================================================================
