// Static GTFS schedule: models, parsing, and the read-only indices the
// fusion queries run against.
//
// The schedule is a set of comma-delimited .txt tables (agency, routes,
// trips, stops, stop_times, calendar_dates, feed_info, route_timepoints,
// shapes), loaded once at startup from a directory or a .zip archive and
// immutable for the process lifetime.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use chrono_tz::Tz;
use serde::Serialize;
use zip::ZipArchive;

use crate::error::{NextBusError, Result};

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Agency {
    pub agency_id: String,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    pub agency_lang: Option<String>,
    pub agency_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub route_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_type: u32,
    pub route_url: Option<String>,
    pub route_color: Option<String>,
    pub route_text_color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    pub trip_headsign: String,
    pub direction_id: u8, // 0 or 1
    pub block_id: Option<String>,
    pub shape_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub stop_id: String,
    pub stop_code: Option<String>,
    pub stop_name: String,
    pub stop_desc: Option<String>,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub zone_id: Option<String>,
    pub stop_url: Option<String>,
    pub location_type: Option<u32>,
    pub parent_station: Option<String>,
    pub stop_associated_place: Option<String>,
    pub wheelchair_boarding: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopTime {
    pub trip_id: String,
    /// Wall-clock "HH:MM:SS"; the hour may exceed 23 for post-midnight
    /// service belonging to the prior service day.
    pub arrival_time: String,
    pub departure_time: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub pickup_type: Option<u32>,
    pub drop_off_type: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDate {
    pub service_id: String,
    pub date: String, // "YYYYMMDD"
    pub exception_type: u32, // 1 = service added, 2 = service removed
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    pub feed_publisher_name: String,
    pub feed_publisher_url: String,
    pub feed_lang: Option<String>,
    pub feed_start_date: Option<String>,
    pub feed_end_date: Option<String>,
    pub feed_contact_email: Option<String>,
    pub feed_contact_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteTimepoint {
    pub route_id: String,
    pub direction_label: String,
    pub stop_code: String,
    pub stop_name: String,
    pub stop_sequence: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShapePoint {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
}

// ============================================================================
// Raw table sources
// ============================================================================

/// The nine table contents, header rows included. All are required; a
/// missing or unreadable table is a fatal `LoadError`.
#[derive(Debug)]
pub struct RawTables {
    pub agency: String,
    pub routes: String,
    pub trips: String,
    pub stops: String,
    pub stop_times: String,
    pub calendar_dates: String,
    pub feed_info: String,
    pub route_timepoints: String,
    pub shapes: String,
}

fn tables_from_dir(path: &Path) -> Result<RawTables> {
    let read = |name: &str| -> Result<String> {
        let file = path.join(format!("{}.txt", name));
        fs::read_to_string(&file).map_err(|e| {
            NextBusError::LoadError(format!(
                "missing or unreadable {}.txt in {}: {}",
                name,
                path.display(),
                e
            ))
        })
    };

    Ok(RawTables {
        agency: read("agency")?,
        routes: read("routes")?,
        trips: read("trips")?,
        stops: read("stops")?,
        stop_times: read("stop_times")?,
        calendar_dates: read("calendar_dates")?,
        feed_info: read("feed_info")?,
        route_timepoints: read("route_timepoints")?,
        shapes: read("shapes")?,
    })
}

fn tables_from_zip<R: Read + Seek>(reader: R, label: &str) -> Result<RawTables> {
    let mut archive = ZipArchive::new(reader).map_err(|e| {
        NextBusError::LoadError(format!("failed to open schedule archive {}: {}", label, e))
    })?;

    let mut read = |name: &str| -> Result<String> {
        let mut entry = archive.by_name(&format!("{}.txt", name)).map_err(|e| {
            NextBusError::LoadError(format!("{}.txt not found in {}: {}", name, label, e))
        })?;
        let mut contents = String::new();
        entry.read_to_string(&mut contents).map_err(|e| {
            NextBusError::LoadError(format!("failed to read {}.txt from {}: {}", name, label, e))
        })?;
        Ok(contents)
    };

    Ok(RawTables {
        agency: read("agency")?,
        routes: read("routes")?,
        trips: read("trips")?,
        stops: read("stops")?,
        stop_times: read("stop_times")?,
        calendar_dates: read("calendar_dates")?,
        feed_info: read("feed_info")?,
        route_timepoints: read("route_timepoints")?,
        shapes: read("shapes")?,
    })
}

// ============================================================================
// Line Parser
// ============================================================================

/// Quote-aware delimiter split. The "inside quotes" state flips on every
/// quote character (the quotes themselves are not emitted), commas outside
/// quotes separate fields, and every field is trimmed of surrounding
/// whitespace.
fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == ',' && !in_quotes {
            fields.push(field.trim().to_string());
            field.clear();
        } else {
            field.push(ch);
        }
    }

    fields.push(field.trim().to_string());
    fields
}

/// Skip the header row, trim, drop blank lines, and keep whatever rows the
/// per-table parser accepts. Rows with too few columns are skipped silently.
fn parse_table<T>(contents: &str, parser: fn(&str) -> Option<T>) -> Vec<T> {
    contents
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parser)
        .collect()
}

fn opt_field(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

// ============================================================================
// Per-table parsers
// ============================================================================
//
// Column layouts follow the published feed. Numeric fields that fail to
// parse fall back to 0; optional fields fall back to absent.

fn parse_agency(line: &str) -> Option<Agency> {
    let f = parse_line(line);
    if f.len() < 6 {
        return None;
    }
    Some(Agency {
        agency_id: f[0].clone(),
        agency_name: f[1].clone(),
        agency_url: f[2].clone(),
        agency_timezone: f[3].clone(),
        agency_lang: opt_field(&f[4]),
        agency_phone: opt_field(&f[5]),
    })
}

fn parse_route(line: &str) -> Option<Route> {
    let f = parse_line(line);
    if f.len() < 8 {
        return None;
    }
    Some(Route {
        route_id: f[0].clone(),
        route_short_name: f[1].clone(),
        route_long_name: f[2].clone(),
        route_type: f[4].parse().unwrap_or(0),
        route_url: opt_field(&f[5]),
        route_color: opt_field(&f[6]),
        route_text_color: opt_field(&f[7]),
    })
}

fn parse_trip(line: &str) -> Option<Trip> {
    let f = parse_line(line);
    if f.len() < 7 {
        return None;
    }
    Some(Trip {
        route_id: f[0].clone(),
        service_id: f[1].clone(),
        trip_id: f[2].clone(),
        trip_headsign: f[3].clone(),
        direction_id: f[4].parse().unwrap_or(0),
        block_id: opt_field(&f[5]),
        shape_id: opt_field(&f[6]),
    })
}

fn parse_stop(line: &str) -> Option<Stop> {
    let f = parse_line(line);
    if f.len() < 11 {
        return None;
    }
    Some(Stop {
        stop_id: f[0].clone(),
        stop_code: opt_field(&f[1]),
        stop_name: f[2].clone(),
        stop_desc: opt_field(&f[3]),
        stop_lat: f[4].parse().unwrap_or(0.0),
        stop_lon: f[5].parse().unwrap_or(0.0),
        zone_id: opt_field(&f[6]),
        stop_url: opt_field(&f[7]),
        location_type: f[8].parse().ok(),
        parent_station: opt_field(&f[9]),
        stop_associated_place: opt_field(&f[10]),
        wheelchair_boarding: f.get(11).and_then(|v| v.parse().ok()),
    })
}

fn parse_stop_time(line: &str) -> Option<StopTime> {
    let f = parse_line(line);
    if f.len() < 7 {
        return None;
    }
    Some(StopTime {
        trip_id: f[0].clone(),
        arrival_time: f[1].clone(),
        departure_time: f[2].clone(),
        stop_id: f[3].clone(),
        stop_sequence: f[4].parse().unwrap_or(0),
        pickup_type: f[5].parse().ok(),
        drop_off_type: f[6].parse().ok(),
    })
}

fn parse_calendar_date(line: &str) -> Option<CalendarDate> {
    let f = parse_line(line);
    if f.len() < 3 {
        return None;
    }
    Some(CalendarDate {
        service_id: f[0].clone(),
        date: f[1].clone(),
        exception_type: f[2].parse().unwrap_or(0),
    })
}

fn parse_feed_info(line: &str) -> Option<FeedInfo> {
    let f = parse_line(line);
    if f.len() < 6 {
        return None;
    }
    Some(FeedInfo {
        feed_publisher_name: f[0].clone(),
        feed_publisher_url: f[1].clone(),
        feed_lang: opt_field(&f[2]),
        feed_start_date: opt_field(&f[3]),
        feed_end_date: opt_field(&f[4]),
        feed_contact_email: opt_field(&f[5]),
        feed_contact_url: f.get(6).and_then(|v| opt_field(v)),
    })
}

fn parse_route_timepoint(line: &str) -> Option<RouteTimepoint> {
    let f = parse_line(line);
    if f.len() < 5 {
        return None;
    }
    Some(RouteTimepoint {
        route_id: f[0].clone(),
        direction_label: f[1].clone(),
        stop_code: f[2].clone(),
        stop_name: f[3].clone(),
        stop_sequence: f[4].parse().unwrap_or(0),
    })
}

fn parse_shape_point(line: &str) -> Option<ShapePoint> {
    let f = parse_line(line);
    if f.len() < 4 {
        return None;
    }
    Some(ShapePoint {
        shape_id: f[0].clone(),
        shape_pt_lat: f[1].parse().unwrap_or(0.0),
        shape_pt_lon: f[2].parse().unwrap_or(0.0),
        shape_pt_sequence: f[3].parse().unwrap_or(0),
    })
}

// ============================================================================
// ScheduleStore
// ============================================================================

/// The parsed, indexed static schedule. Built once at startup and shared
/// read-only; no locking needed for concurrent queries.
pub struct ScheduleStore {
    pub agencies: Vec<Agency>,
    pub routes_by_id: HashMap<String, Route>,
    pub trips_by_id: HashMap<String, Trip>,
    /// Trip ids grouped by (route_id, direction_id), in table order.
    pub trips_by_route_direction: HashMap<(String, u8), Vec<String>>,
    /// Stop-time rows per trip, sorted by stop_sequence.
    pub stop_times_by_trip: HashMap<String, Vec<StopTime>>,
    pub stops_by_id: HashMap<String, Stop>,
    /// Shape points per shape, sorted by shape_pt_sequence.
    pub shapes_by_id: HashMap<String, Vec<ShapePoint>>,
    pub calendar_dates: Vec<CalendarDate>,
    pub feed_info: Vec<FeedInfo>,
    pub route_timepoints: Vec<RouteTimepoint>,
    timezone: Tz,
}

impl ScheduleStore {
    /// Load the schedule from a directory of .txt tables, or from a .zip
    /// archive containing them at the archive root.
    pub fn load(path: &Path) -> Result<ScheduleStore> {
        let is_zip = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);

        let tables = if is_zip {
            let bytes = fs::read(path).map_err(|e| {
                NextBusError::LoadError(format!(
                    "missing or unreadable schedule archive {}: {}",
                    path.display(),
                    e
                ))
            })?;
            tables_from_zip(Cursor::new(bytes), &path.display().to_string())?
        } else {
            tables_from_dir(path)?
        };

        let store = Self::build(&tables);
        println!("   ✓ Parsed {} agencies", store.agencies.len());
        println!("   ✓ Parsed {} routes", store.routes_by_id.len());
        println!("   ✓ Parsed {} trips", store.trips_by_id.len());
        println!("   ✓ Parsed {} stops", store.stops_by_id.len());
        println!(
            "   ✓ Parsed {} stop time rows",
            store.stop_times_by_trip.values().map(|v| v.len()).sum::<usize>()
        );
        println!("   ✓ Parsed {} calendar date exceptions", store.calendar_dates.len());
        println!("   ✓ Parsed {} shapes", store.shapes_by_id.len());
        println!("   ✓ Agency timezone: {}", store.timezone);
        Ok(store)
    }

    /// Parse the raw table contents and build the indices.
    pub fn build(tables: &RawTables) -> ScheduleStore {
        let agencies = parse_table(&tables.agency, parse_agency);
        let routes = parse_table(&tables.routes, parse_route);
        let trips = parse_table(&tables.trips, parse_trip);
        let stops = parse_table(&tables.stops, parse_stop);
        let stop_times = parse_table(&tables.stop_times, parse_stop_time);
        let calendar_dates = parse_table(&tables.calendar_dates, parse_calendar_date);
        let feed_info = parse_table(&tables.feed_info, parse_feed_info);
        let route_timepoints = parse_table(&tables.route_timepoints, parse_route_timepoint);
        let shape_points = parse_table(&tables.shapes, parse_shape_point);

        let timezone = agencies
            .first()
            .and_then(|a| a.agency_timezone.parse::<Tz>().ok())
            .unwrap_or(chrono_tz::America::New_York);

        let routes_by_id: HashMap<String, Route> = routes
            .into_iter()
            .map(|r| (r.route_id.clone(), r))
            .collect();

        let mut trips_by_route_direction: HashMap<(String, u8), Vec<String>> = HashMap::new();
        let mut trips_by_id: HashMap<String, Trip> = HashMap::new();
        for trip in trips {
            trips_by_route_direction
                .entry((trip.route_id.clone(), trip.direction_id))
                .or_default()
                .push(trip.trip_id.clone());
            trips_by_id.insert(trip.trip_id.clone(), trip);
        }

        let mut stop_times_by_trip: HashMap<String, Vec<StopTime>> = HashMap::new();
        for row in stop_times {
            stop_times_by_trip
                .entry(row.trip_id.clone())
                .or_default()
                .push(row);
        }
        for rows in stop_times_by_trip.values_mut() {
            rows.sort_by_key(|row| row.stop_sequence);
        }

        let stops_by_id: HashMap<String, Stop> = stops
            .into_iter()
            .map(|s| (s.stop_id.clone(), s))
            .collect();

        let mut shapes_by_id: HashMap<String, Vec<ShapePoint>> = HashMap::new();
        for point in shape_points {
            shapes_by_id
                .entry(point.shape_id.clone())
                .or_default()
                .push(point);
        }
        for points in shapes_by_id.values_mut() {
            points.sort_by_key(|p| p.shape_pt_sequence);
        }

        ScheduleStore {
            agencies,
            routes_by_id,
            trips_by_id,
            trips_by_route_direction,
            stop_times_by_trip,
            stops_by_id,
            shapes_by_id,
            calendar_dates,
            feed_info,
            route_timepoints,
            timezone,
        }
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes_by_id.get(route_id)
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips_by_id.get(trip_id)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops_by_id.get(stop_id)
    }

    pub fn shape(&self, shape_id: &str) -> Option<&[ShapePoint]> {
        self.shapes_by_id.get(shape_id).map(Vec::as_slice)
    }

    /// Trips serving one route in one direction, in table order.
    pub fn trips_for(&self, route_id: &str, direction_id: u8) -> Vec<&Trip> {
        self.trips_by_route_direction
            .get(&(route_id.to_string(), direction_id))
            .map(|ids| ids.iter().filter_map(|id| self.trips_by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// A trip's stop-time rows sorted by sequence; empty when unknown.
    pub fn stop_times_for(&self, trip_id: &str) -> &[StopTime] {
        self.stop_times_by_trip
            .get(trip_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All routes ordered by short name, for the route list.
    pub fn routes_sorted(&self) -> Vec<&Route> {
        let mut routes: Vec<&Route> = self.routes_by_id.values().collect();
        routes.sort_by(|a, b| a.route_short_name.cmp(&b.route_short_name));
        routes
    }

    /// All stops ordered by id, for the stop list.
    pub fn stops_sorted(&self) -> Vec<&Stop> {
        let mut stops: Vec<&Stop> = self.stops_by_id.values().collect();
        stops.sort_by(|a, b| a.stop_id.cmp(&b.stop_id));
        stops
    }

    /// The ordered stop pattern for a route/direction, taken from the trip
    /// with the most stop-time rows (the fullest service pattern).
    pub fn stops_for(&self, route_id: &str, direction_id: u8) -> Vec<&Stop> {
        let mut pattern: &[StopTime] = &[];
        for trip in self.trips_for(route_id, direction_id) {
            let rows = self.stop_times_for(&trip.trip_id);
            if rows.len() > pattern.len() {
                pattern = rows;
            }
        }
        pattern
            .iter()
            .filter_map(|row| self.stops_by_id.get(&row.stop_id))
            .collect()
    }

    /// Raw timepoint rows for a route, carrying the direction labels shown
    /// to riders.
    pub fn timepoints_for(&self, route_id: &str) -> Vec<&RouteTimepoint> {
        self.route_timepoints
            .iter()
            .filter(|tp| tp.route_id == route_id)
            .collect()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture_tables() -> RawTables {
        RawTables {
            agency: "agency_id,agency_name,agency_url,agency_timezone,agency_lang,agency_phone\n\
                     RIPTA,Rhode Island Public Transit Authority,http://www.ripta.com,America/New_York,en,401-781-9400\n"
                .to_string(),
            routes: "route_id,route_short_name,route_long_name,route_desc,route_type,route_url,route_color,route_text_color\n\
                     20,20,Elmwood Ave/T.F. Green Airport,,3,,0066CC,FFFFFF\n\
                     1,1,Eddy St/Hope St,,3,,,\n"
                .to_string(),
            trips: "route_id,service_id,trip_id,trip_headsign,direction_id,block_id,shape_id\n\
                    20,WK,T-OUT-1,Airport,0,,SH20\n\
                    20,WK,T-IN-1,Downtown,1,,\n\
                    20,WK,T-OUT-2,Airport,0,B2,SH20\n\
                    1,WK,T-R1,Hope St,0,,\n"
                .to_string(),
            stops: "stop_id,stop_code,stop_name,stop_desc,stop_lat,stop_lon,zone_id,stop_url,location_type,parent_station,stop_associated_place,wheelchair_boarding\n\
                    24725,24725,\"Kennedy Plaza, Berth A\",,41.8236,-71.4222,,,0,,KP,1\n\
                    100,100,Elmwood at Park,,41.80,-71.42,,,0,,,\n\
                    200,200,Airport Terminal,,41.72,-71.44,,,0,,,\n"
                .to_string(),
            stop_times: "trip_id,arrival_time,departure_time,stop_id,stop_sequence,pickup_type,drop_off_type\n\
                         T-OUT-1,14:05:00,14:05:00,24725,1,0,0\n\
                         T-OUT-1,14:20:00,14:20:00,100,2,0,0\n\
                         T-OUT-1,14:40:00,14:40:00,200,3,0,0\n\
                         T-OUT-2,15:05:00,15:05:00,24725,1,0,0\n\
                         T-IN-1,14:10:00,14:10:00,200,1,0,0\n"
                .to_string(),
            calendar_dates: "service_id,date,exception_type\n\
                             WK,20250704,2\n"
                .to_string(),
            feed_info: "feed_publisher_name,feed_publisher_url,feed_lang,feed_start_date,feed_end_date,feed_contact_email\n\
                        RIPTA,http://www.ripta.com,en,20250601,20250901,feedback@ripta.com\n"
                .to_string(),
            route_timepoints: "route_id,direction_label,stop_code,stop_name,stop_sequence\n\
                               20,OUTBOUND To Airport,24725,Kennedy Plaza,1\n\
                               20,INBOUND To Downtown,200,Airport Terminal,1\n"
                .to_string(),
            shapes: "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n\
                     SH20,41.82,-71.42,2\n\
                     SH20,41.83,-71.41,1\n\
                     SH20,41.80,-71.43,3\n"
                .to_string(),
        }
    }

    #[test]
    fn line_parser_handles_quoted_delimiters_and_trim() {
        let fields = parse_line("\"Kennedy Plaza, Berth A\", 41.8236 ,-71.4222");
        assert_eq!(fields, vec!["Kennedy Plaza, Berth A", "41.8236", "-71.4222"]);
    }

    #[test]
    fn line_parser_toggles_on_every_quote() {
        // Quotes flip state wherever they appear and are never emitted.
        let fields = parse_line("ab\"cd\"ef,\"x,y\"z");
        assert_eq!(fields, vec!["abcdef", "x,yz"]);
    }

    #[test]
    fn short_rows_are_skipped_silently() {
        let contents = "route_id,service_id,trip_id,trip_headsign,direction_id,block_id,shape_id\n\
                        20,WK,T1,Airport,0,,\n\
                        garbage,row\n\
                        20,WK,T2,Downtown,1,,\n";
        let trips = parse_table(contents, parse_trip);
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].trip_id, "T1");
        assert_eq!(trips[1].trip_id, "T2");
    }

    #[test]
    fn unparseable_numerics_fall_back_to_zero() {
        let trip = parse_trip("20,WK,T1,Airport,north,,").unwrap();
        assert_eq!(trip.direction_id, 0);

        let stop = parse_stop("S1,,Somewhere,,not-a-lat,,,,,,,").unwrap();
        assert_eq!(stop.stop_lat, 0.0);
        assert_eq!(stop.location_type, None);
    }

    #[test]
    fn direction_groups_never_mix() {
        let store = ScheduleStore::build(&fixture_tables());
        for ((_, direction), trip_ids) in &store.trips_by_route_direction {
            for trip_id in trip_ids {
                assert_eq!(store.trip(trip_id).unwrap().direction_id, *direction);
            }
        }
        let outbound = store.trips_for("20", 0);
        assert_eq!(outbound.len(), 2);
        assert!(outbound.iter().all(|t| t.direction_id == 0));
    }

    #[test]
    fn stop_times_sorted_by_sequence_and_shapes_by_sequence() {
        let store = ScheduleStore::build(&fixture_tables());
        let rows = store.stop_times_for("T-OUT-1");
        let sequences: Vec<u32> = rows.iter().map(|r| r.stop_sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        let shape = store.shape("SH20").unwrap();
        let sequences: Vec<u32> = shape.iter().map(|p| p.shape_pt_sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn routes_sorted_by_short_name() {
        let store = ScheduleStore::build(&fixture_tables());
        let names: Vec<&str> = store
            .routes_sorted()
            .iter()
            .map(|r| r.route_short_name.as_str())
            .collect();
        assert_eq!(names, vec!["1", "20"]);
    }

    #[test]
    fn stop_pattern_comes_from_fullest_trip() {
        let store = ScheduleStore::build(&fixture_tables());
        let pattern = store.stops_for("20", 0);
        let ids: Vec<&str> = pattern.iter().map(|s| s.stop_id.as_str()).collect();
        // T-OUT-1 has three rows, T-OUT-2 only one.
        assert_eq!(ids, vec!["24725", "100", "200"]);
    }

    #[test]
    fn agency_timezone_is_used() {
        let store = ScheduleStore::build(&fixture_tables());
        assert_eq!(store.timezone(), chrono_tz::America::New_York);
    }

    fn zip_with_tables(tables: &RawTables, skip: Option<&str>) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::FileOptions::default();
            let entries = [
                ("agency", &tables.agency),
                ("routes", &tables.routes),
                ("trips", &tables.trips),
                ("stops", &tables.stops),
                ("stop_times", &tables.stop_times),
                ("calendar_dates", &tables.calendar_dates),
                ("feed_info", &tables.feed_info),
                ("route_timepoints", &tables.route_timepoints),
                ("shapes", &tables.shapes),
            ];
            for (name, contents) in entries {
                if skip == Some(name) {
                    continue;
                }
                writer.start_file(format!("{}.txt", name), options).unwrap();
                writer.write_all(contents.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn zip_source_loads() {
        let bytes = zip_with_tables(&fixture_tables(), None);
        let tables = tables_from_zip(Cursor::new(bytes), "test.zip").unwrap();
        let store = ScheduleStore::build(&tables);
        assert_eq!(store.trips_by_id.len(), 4);
        assert_eq!(store.stops_by_id.len(), 3);
    }

    #[test]
    fn missing_table_is_a_load_error() {
        let bytes = zip_with_tables(&fixture_tables(), Some("stop_times"));
        let err = tables_from_zip(Cursor::new(bytes), "test.zip").unwrap_err();
        match err {
            NextBusError::LoadError(msg) => assert!(msg.contains("stop_times.txt")),
            other => panic!("expected LoadError, got {:?}", other),
        }
    }
}
