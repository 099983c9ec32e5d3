//! Utility functions for distances and extents of coordinate lists

use crate::Coordinate;
use geo::Rect;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6371000.0;

/// Haversine distance between two coordinates in meters
#[inline]
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Length in meters of the polyline through `coordinates`, in order
pub fn path_length(coordinates: &[Coordinate]) -> f64 {
    coordinates
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .fold(0.0, |total, distance| total + distance)
}

/// Smallest rectangle containing every coordinate (x = longitude, y = latitude)
///
/// Returns `None` for an empty slice.
pub fn bounding_box(coordinates: &[Coordinate]) -> Option<Rect<f64>> {
    let first = coordinates.first()?;
    let mut min_x = first.longitude;
    let mut min_y = first.latitude;
    let mut max_x = first.longitude;
    let mut max_y = first.latitude;

    for coordinate in &coordinates[1..] {
        min_x = min_x.min(coordinate.longitude);
        min_y = min_y.min(coordinate.latitude);
        max_x = max_x.max(coordinate.longitude);
        max_y = max_y.max(coordinate.latitude);
    }

    Some(Rect::new(
        geo::Coord { x: min_x, y: min_y },
        geo::Coord { x: max_x, y: max_y },
    ))
}
