//! GPX export of sealed sessions.
//!
//! A pure, stateless transform: position fixes become track points,
//! rider-marked waypoints become GPX waypoints. No-fix records and
//! environment samples have no GPX representation and are skipped.

use chrono::{DateTime, Utc};
use geo_types::Point;
use gpx::{Fix, Gpx, GpxVersion, Track, TrackSegment, Waypoint as GpxWaypoint};

use crate::error::{Error, Result};
use crate::record::{FixQuality, PositionFix, SessionRecord, Waypoint};
use crate::store::SessionSummary;

/// Creator string written into exported documents.
const CREATOR: &str = "riderecorder";

/// Map one session's record stream onto a GPX 1.1 document.
///
/// The whole ride becomes a single track with a single segment; pausing
/// does not fragment a session, so it does not fragment the track either.
#[must_use]
pub fn session_to_gpx(summary: &SessionSummary, records: &[SessionRecord]) -> Gpx {
    let mut segment = TrackSegment::default();
    let mut waypoints = Vec::new();

    for record in records {
        match record {
            SessionRecord::Fix(fix) => {
                if let Some(point) = fix_to_trackpoint(fix) {
                    segment.points.push(point);
                }
            }
            SessionRecord::Waypoint(waypoint) => waypoints.push(waypoint_to_gpx(waypoint)),
            // Environment samples are not representable in GPX.
            SessionRecord::Environment(_) => {}
        }
    }

    let mut track = Track::default();
    track.name = Some(summary.id.clone());
    track.segments.push(segment);

    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.to_string()),
        ..Gpx::default()
    };
    gpx.tracks.push(track);
    gpx.waypoints = waypoints;
    gpx
}

/// Serialize a GPX document.
///
/// # Errors
///
/// Returns an error if the document cannot be written.
pub fn write_gpx<W: std::io::Write>(gpx: &Gpx, writer: W) -> Result<()> {
    gpx::write(gpx, writer).map_err(|err| Error::gpx(err.to_string()))
}

/// A usable fix becomes a track point; a no-fix record becomes nothing.
fn fix_to_trackpoint(fix: &PositionFix) -> Option<GpxWaypoint> {
    if !fix.quality.is_usable() {
        return None;
    }

    let mut point = GpxWaypoint::new(Point::new(fix.longitude, fix.latitude));
    point.elevation = fix.altitude;
    point.time = gpx_time(fix.timestamp);
    point.fix = Some(match fix.quality {
        FixQuality::TwoD => Fix::TwoDimensional,
        // NoFix is filtered above.
        FixQuality::NoFix | FixQuality::ThreeD => Fix::ThreeDimensional,
    });
    point.sat = Some(u64::from(fix.satellites));
    Some(point)
}

fn waypoint_to_gpx(waypoint: &Waypoint) -> GpxWaypoint {
    let mut point = GpxWaypoint::new(Point::new(
        waypoint.fix.longitude,
        waypoint.fix.latitude,
    ));
    point.elevation = waypoint.fix.altitude;
    point.time = gpx_time(waypoint.timestamp);
    point.name = waypoint.label.clone();
    point
}

/// Convert a chrono timestamp into the gpx crate's time type.
fn gpx_time(ts: DateTime<Utc>) -> Option<gpx::Time> {
    let nanos = ts.timestamp_nanos_opt()?;
    let odt = time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).ok()?;
    Some(gpx::Time::from(odt))
}
