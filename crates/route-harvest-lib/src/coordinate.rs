//! Coordinate pair parsing
//!
//! KML stores coordinates as `lon,lat[,alt]` tuples, several of them separated
//! by spaces for paths. This module turns one such string into latitude-first
//! [`Coordinate`] values.

use crate::CoordinateError;
use std::fmt;
use std::sync::Arc;

/// A latitude/longitude pair in degrees
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether latitude is within [-90, 90] and longitude within [-180, 180]
    #[inline]
    pub fn is_in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lat: {:.6}, Lon: {:.6}", self.latitude, self.longitude)
    }
}

impl From<Coordinate> for geo::Point<f64> {
    #[inline]
    fn from(coordinate: Coordinate) -> Self {
        geo::Point::new(coordinate.longitude, coordinate.latitude)
    }
}

/// A coordinate labelled with the key of the source it was read from
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedCoordinate {
    pub source_key: Arc<str>,
    pub coordinate: Coordinate,
}

impl TaggedCoordinate {
    #[inline]
    pub fn new(source_key: Arc<str>, coordinate: Coordinate) -> Self {
        Self {
            source_key,
            coordinate,
        }
    }
}

/// Knobs for [`parse_token`]. The default is the plain KML reading: no range
/// checks, tuples separated by single spaces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseOptions {
    /// Reject coordinates outside the valid latitude/longitude ranges
    pub strict_ranges: bool,
    /// Split tuples on any whitespace run (tabs, newlines) instead of single spaces
    pub split_any_whitespace: bool,
}

/// Parse one coordinate string into its coordinates, in string order.
///
/// Tuples with fewer than two fields are skipped. Any altitude field is
/// ignored. The whole string is parsed before anything is returned, so a bad
/// tuple yields an error and no coordinates at all.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn parse_token(token: &str, options: &ParseOptions) -> Result<Vec<Coordinate>, CoordinateError> {
    let token = token.trim();
    let mut coordinates = Vec::new();

    if options.split_any_whitespace {
        for tuple in token.split_whitespace() {
            push_tuple(tuple, options, &mut coordinates)?;
        }
    } else {
        for tuple in token.split(' ') {
            push_tuple(tuple, options, &mut coordinates)?;
        }
    }

    Ok(coordinates)
}

#[inline]
fn push_tuple(
    tuple: &str,
    options: &ParseOptions,
    out: &mut Vec<Coordinate>,
) -> Result<(), CoordinateError> {
    if tuple.is_empty() {
        return Ok(());
    }
    if let Some(coordinate) = parse_tuple(tuple)? {
        if options.strict_ranges && !coordinate.is_in_range() {
            return Err(CoordinateError::OutOfRange {
                latitude: coordinate.latitude,
                longitude: coordinate.longitude,
            });
        }
        out.push(coordinate);
    }
    Ok(())
}

/// Parse a single `lon,lat[,alt]` tuple. `None` when it has fewer than two fields.
pub fn parse_tuple(tuple: &str) -> Result<Option<Coordinate>, CoordinateError> {
    let mut fields = tuple.split(',');
    let (Some(lon), Some(lat)) = (fields.next(), fields.next()) else {
        return Ok(None);
    };

    let latitude = lat
        .parse::<f64>()
        .map_err(|error| CoordinateError::InvalidLatitude {
            value: lat.to_string(),
            error,
        })?;
    let longitude = lon
        .parse::<f64>()
        .map_err(|error| CoordinateError::InvalidLongitude {
            value: lon.to_string(),
            error,
        })?;

    Ok(Some(Coordinate::new(latitude, longitude)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(token: &str) -> Result<Vec<Coordinate>, CoordinateError> {
        parse_token(token, &ParseOptions::default())
    }

    #[test]
    fn test_single_pair_swaps_order() {
        let coordinates = parse("12.5,3.2").unwrap();
        assert_eq!(coordinates, vec![Coordinate::new(3.2, 12.5)]);
    }

    #[test]
    fn test_altitude_is_ignored() {
        assert_eq!(parse("12.5,3.2,100").unwrap(), parse("12.5,3.2").unwrap());
        // Altitude is never parsed, so garbage there is fine
        assert_eq!(parse("12.5,3.2,high").unwrap(), parse("12.5,3.2").unwrap());
    }

    #[test]
    fn test_path_keeps_string_order() {
        let coordinates = parse("1.0,2.0 3.0,4.0").unwrap();
        assert_eq!(
            coordinates,
            vec![Coordinate::new(2.0, 1.0), Coordinate::new(4.0, 3.0)]
        );
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let coordinates = parse("\n\t  1.0,2.0 3.0,4.0  \n").unwrap();
        assert_eq!(coordinates.len(), 2);
    }

    #[test]
    fn test_short_tuples_are_skipped() {
        let coordinates = parse("5.0 1.0,2.0  7").unwrap();
        assert_eq!(coordinates, vec![Coordinate::new(2.0, 1.0)]);
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_bad_latitude_is_error() {
        let error = parse("1.0,north").unwrap_err();
        assert!(matches!(
            error,
            CoordinateError::InvalidLatitude { ref value, .. } if value == "north"
        ));
    }

    #[test]
    fn test_bad_longitude_is_error() {
        let error = parse("east,2.0").unwrap_err();
        assert!(matches!(
            error,
            CoordinateError::InvalidLongitude { ref value, .. } if value == "east"
        ));
    }

    #[test]
    fn test_latitude_reported_before_longitude() {
        let error = parse("east,north").unwrap_err();
        assert!(matches!(error, CoordinateError::InvalidLatitude { .. }));
    }

    #[test]
    fn test_error_drops_whole_token() {
        // The first tuple is fine, but nothing from this token may come back
        let result = parse("1.0,2.0 3.0,x 5.0,6.0");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_field_is_error() {
        assert!(parse("1.0,").is_err());
        assert!(parse(",2.0").is_err());
    }

    #[test]
    fn test_newline_separated_tuples_need_option() {
        let token = "1.0,2.0\n3.0,4.0";
        assert!(parse(token).is_err());

        let options = ParseOptions {
            split_any_whitespace: true,
            ..Default::default()
        };
        let coordinates = parse_token(token, &options).unwrap();
        assert_eq!(
            coordinates,
            vec![Coordinate::new(2.0, 1.0), Coordinate::new(4.0, 3.0)]
        );
    }

    #[test]
    fn test_ranges_unchecked_by_default() {
        let coordinates = parse("200.0,95.0").unwrap();
        assert_eq!(coordinates, vec![Coordinate::new(95.0, 200.0)]);
    }

    #[test]
    fn test_strict_ranges() {
        let options = ParseOptions {
            strict_ranges: true,
            ..Default::default()
        };
        assert!(parse_token("180.0,90.0", &options).is_ok());
        assert!(parse_token("-180.0,-90.0", &options).is_ok());
        assert!(matches!(
            parse_token("0.0,90.5", &options),
            Err(CoordinateError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse_token("180.5,0.0", &options),
            Err(CoordinateError::OutOfRange { .. })
        ));
        assert!(parse_token("NaN,0.0", &options).is_err());
    }

    #[test]
    fn test_display_format() {
        let coordinate = Coordinate::new(3.2, 12.5);
        assert_eq!(coordinate.to_string(), "Lat: 3.200000, Lon: 12.500000");
    }

    #[test]
    fn test_into_geo_point() {
        let point: geo::Point<f64> = Coordinate::new(3.2, 12.5).into();
        assert_eq!(point.x(), 12.5);
        assert_eq!(point.y(), 3.2);
    }
}
