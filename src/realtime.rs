// Realtime feed client: trip updates and vehicle positions over HTTP/JSON.
//
// Endpoints:
// - GET {base}/tripupdates?format=json
// - GET {base}/vehiclepositions?format=json
//
// Each fetch is independent and idempotent; polling cadence is the caller's
// responsibility. The two feeds are committed together as one
// RealtimeSnapshot per cycle, never mixed across cycles.

use reqwest::blocking;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NextBusError, Result};

// ============================================================================
// Feed payload shapes
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct TripUpdatesResponse {
    entity: Vec<TripUpdateEntity>,
}

#[derive(Debug, Clone, Deserialize)]
struct TripUpdateEntity {
    trip_update: TripUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripUpdate {
    pub trip: TripDescriptor,
    pub stop_time_update: Vec<StopTimeUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTimeUpdate {
    pub stop_sequence: u32,
    pub stop_id: String,
    pub arrival: Option<DelayInfo>,
    pub departure: Option<DelayInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayInfo {
    /// Seconds of deviation from schedule, positive meaning late.
    pub delay: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripDescriptor {
    pub trip_id: String,
    pub route_id: Option<String>,
    pub start_time: Option<String>,
    pub start_date: Option<String>,
    pub schedule_relationship: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct VehiclePositionsResponse {
    entity: Vec<VehicleEntity>,
}

#[derive(Debug, Clone, Deserialize)]
struct VehicleEntity {
    vehicle: VehicleRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub trip: TripDescriptor,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

// ============================================================================
// Decoding
// ============================================================================

pub fn decode_trip_updates(body: &str) -> Result<Vec<TripUpdate>> {
    let response: TripUpdatesResponse = serde_json::from_str(body)
        .map_err(|e| NextBusError::DecodeError(format!("trip updates payload: {}", e)))?;
    Ok(response.entity.into_iter().map(|e| e.trip_update).collect())
}

pub fn decode_vehicle_positions(body: &str) -> Result<Vec<VehicleRecord>> {
    let response: VehiclePositionsResponse = serde_json::from_str(body)
        .map_err(|e| NextBusError::DecodeError(format!("vehicle positions payload: {}", e)))?;
    Ok(response.entity.into_iter().map(|e| e.vehicle).collect())
}

// ============================================================================
// Client
// ============================================================================

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct RealtimeClient {
    base_url: String,
}

impl RealtimeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        RealtimeClient { base_url }
    }

    fn create_http_client() -> Result<blocking::Client> {
        blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| NextBusError::NetworkError(format!("Failed to create HTTP client: {}", e)))
    }

    fn fetch(&self, endpoint: &str) -> Result<String> {
        let url = format!("{}/{}?format=json", self.base_url, endpoint);
        let client = Self::create_http_client()?;

        let response = client
            .get(&url)
            .send()
            .map_err(|e| NextBusError::NetworkError(format!("Failed to fetch {}: {}", endpoint, e)))?;

        if !response.status().is_success() {
            return Err(NextBusError::NetworkError(format!(
                "{} returned status {}",
                endpoint,
                response.status()
            )));
        }

        response
            .text()
            .map_err(|e| NextBusError::NetworkError(format!("Failed to read {} response: {}", endpoint, e)))
    }

    pub fn fetch_trip_updates(&self) -> Result<Vec<TripUpdate>> {
        decode_trip_updates(&self.fetch("tripupdates")?)
    }

    pub fn fetch_vehicle_positions(&self) -> Result<Vec<VehicleRecord>> {
        decode_vehicle_positions(&self.fetch("vehiclepositions")?)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// One poll cycle's worth of realtime data, swapped as a single unit so
/// readers never see trip updates and vehicle positions from different
/// cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSnapshot {
    pub trip_updates: Vec<TripUpdate>,
    pub vehicles: Vec<VehicleRecord>,
    pub fetched_at: i64,
}

impl RealtimeSnapshot {
    pub fn empty(fetched_at: i64) -> Self {
        RealtimeSnapshot {
            trip_updates: Vec::new(),
            vehicles: Vec::new(),
            fetched_at,
        }
    }
}

/// Commit rule for one poll cycle: only when both fetches succeeded is the
/// snapshot replaced (wholesale, never merged). On any failure the previous
/// snapshot is retained untouched and the bool comes back false.
pub fn advance_snapshot(
    previous: RealtimeSnapshot,
    trip_updates: Result<Vec<TripUpdate>>,
    vehicles: Result<Vec<VehicleRecord>>,
    fetched_at: i64,
) -> (RealtimeSnapshot, bool) {
    match (trip_updates, vehicles) {
        (Ok(trip_updates), Ok(vehicles)) => (
            RealtimeSnapshot {
                trip_updates,
                vehicles,
                fetched_at,
            },
            true,
        ),
        _ => (previous, false),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TRIP_UPDATES_JSON: &str = r#"{
        "entity": [
            {
                "trip_update": {
                    "trip": {
                        "trip_id": "T-OUT-1",
                        "route_id": "20",
                        "start_time": "14:00:00",
                        "start_date": "20250623",
                        "schedule_relationship": 0
                    },
                    "stop_time_update": [
                        {
                            "stop_sequence": 1,
                            "stop_id": "24725",
                            "arrival": { "delay": 120 },
                            "departure": { "delay": 120 }
                        },
                        {
                            "stop_sequence": 2,
                            "stop_id": "100",
                            "arrival": { "delay": 60 }
                        }
                    ]
                }
            }
        ]
    }"#;

    const VEHICLE_POSITIONS_JSON: &str = r#"{
        "entity": [
            {
                "vehicle": {
                    "trip": { "trip_id": "T-OUT-1", "route_id": "20" },
                    "position": { "latitude": 41.8236, "longitude": -71.4222 }
                }
            }
        ]
    }"#;

    #[test]
    fn trip_updates_decode() {
        let updates = decode_trip_updates(TRIP_UPDATES_JSON).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].trip.trip_id, "T-OUT-1");
        assert_eq!(updates[0].trip.route_id.as_deref(), Some("20"));
        assert_eq!(updates[0].stop_time_update.len(), 2);
        assert_eq!(updates[0].stop_time_update[0].arrival.as_ref().unwrap().delay, 120);
        assert!(updates[0].stop_time_update[1].departure.is_none());
    }

    #[test]
    fn vehicle_positions_decode() {
        let vehicles = decode_vehicle_positions(VEHICLE_POSITIONS_JSON).unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].trip.trip_id, "T-OUT-1");
        assert_eq!(vehicles[0].position.latitude, 41.8236);
    }

    #[test]
    fn optional_descriptor_fields_may_be_absent() {
        let body = r#"{"entity":[{"trip_update":{"trip":{"trip_id":"T9"},"stop_time_update":[]}}]}"#;
        let updates = decode_trip_updates(body).unwrap();
        assert_eq!(updates[0].trip.route_id, None);
        assert_eq!(updates[0].trip.schedule_relationship, None);
        assert!(updates[0].stop_time_update.is_empty());
    }

    #[test]
    fn wrong_shape_is_a_decode_error() {
        let err = decode_trip_updates(r#"{"entities": []}"#).unwrap_err();
        match err {
            NextBusError::DecodeError(_) => {}
            other => panic!("expected DecodeError, got {:?}", other),
        }

        let err = decode_vehicle_positions("not json").unwrap_err();
        match err {
            NextBusError::DecodeError(_) => {}
            other => panic!("expected DecodeError, got {:?}", other),
        }
    }

    #[test]
    fn snapshot_advances_only_when_both_fetches_succeed() {
        let previous = RealtimeSnapshot {
            trip_updates: decode_trip_updates(TRIP_UPDATES_JSON).unwrap(),
            vehicles: decode_vehicle_positions(VEHICLE_POSITIONS_JSON).unwrap(),
            fetched_at: 1_000,
        };

        // Vehicle fetch fails: the prior snapshot survives verbatim.
        let (kept, swapped) = advance_snapshot(
            previous.clone(),
            Ok(Vec::new()),
            Err(NextBusError::NetworkError("timeout".to_string())),
            2_000,
        );
        assert!(!swapped);
        assert_eq!(kept, previous);

        // Both succeed: replaced wholesale.
        let (next, swapped) = advance_snapshot(previous, Ok(Vec::new()), Ok(Vec::new()), 3_000);
        assert!(swapped);
        assert!(next.trip_updates.is_empty());
        assert!(next.vehicles.is_empty());
        assert_eq!(next.fetched_at, 3_000);
    }
}
