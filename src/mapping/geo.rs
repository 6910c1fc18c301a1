//! Geo Points
//!
//! Geo indexes are sorted sets scored by a 52-bit interleaved geohash, the
//! same encoding Redis uses for GEOADD, so that nearby points get nearby
//! scores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const LAT_MIN: f64 = -85.05112878;
const LAT_MAX: f64 = 85.05112878;
const LON_MIN: f64 = -180.0;
const LON_MAX: f64 = 180.0;

/// Bits of precision per coordinate.
const STEP: u32 = 26;

/// Earth radius in meters, as used by Redis GEODIST.
const EARTH_RADIUS_M: f64 = 6372797.560856;

/// A point on the globe. `x` is the longitude, `y` the latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            x: longitude,
            y: latitude,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.x
    }

    pub fn latitude(&self) -> f64 {
        self.y
    }

    /// True if the point can be geohashed.
    pub fn is_valid(&self) -> bool {
        (LON_MIN..=LON_MAX).contains(&self.x) && (LAT_MIN..=LAT_MAX).contains(&self.y)
    }

    /// Encodes the point as an interleaved 52-bit geohash.
    pub fn encode(&self) -> u64 {
        let lat = normalize(self.y, LAT_MIN, LAT_MAX);
        let lon = normalize(self.x, LON_MIN, LON_MAX);
        spread(lat) | (spread(lon) << 1)
    }

    /// Returns the sorted-set score of the point.
    pub fn score(&self) -> f64 {
        self.encode() as f64
    }

    /// Decodes a sorted-set score into the center of its geohash cell.
    pub fn from_score(score: f64) -> Self {
        let hash = score as u64;
        let lat = squash(hash);
        let lon = squash(hash >> 1);

        let cells = (1u64 << STEP) as f64;
        let lat_step = (LAT_MAX - LAT_MIN) / cells;
        let lon_step = (LON_MAX - LON_MIN) / cells;

        Self {
            x: (LON_MIN + (lon as f64 + 0.5) * lon_step).clamp(LON_MIN, LON_MAX),
            y: (LAT_MIN + (lat as f64 + 0.5) * lat_step).clamp(LAT_MIN, LAT_MAX),
        }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.y.to_radians();
        let lat2 = other.y.to_radians();
        let u = ((lat2 - lat1) / 2.0).sin();
        let v = ((other.x - self.x).to_radians() / 2.0).sin();
        let a = u * u + lat1.cos() * lat2.cos() * v * v;
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Maps `value` in `[min, max]` onto `0..2^26`.
fn normalize(value: f64, min: f64, max: f64) -> u32 {
    let cells = (1u64 << STEP) as f64;
    let offset = ((value - min) / (max - min) * cells) as u64;
    offset.min((1u64 << STEP) - 1) as u32
}

/// Moves the 32 bits of `v` onto the even bit positions of a u64.
fn spread(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread`]: collects the even bits of `x`.
fn squash(x: u64) -> u32 {
    let mut x = x & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}

/// Inclusive score ranges that hold every indexed point within `radius`
/// meters of `center`.
///
/// The ranges are the geohash cell of the center and its eight neighbours,
/// at the finest precision whose cells still span the radius. Points in them
/// may lie outside the radius; callers filter by distance.
pub(crate) fn score_ranges(center: &GeoPoint, radius: f64) -> Vec<(f64, f64)> {
    let full = vec![(f64::NEG_INFINITY, f64::INFINITY)];
    let Some(step) = cell_step(center, radius) else {
        return full;
    };

    let shift = STEP - step;
    let lat = normalize(center.y, LAT_MIN, LAT_MAX) >> shift;
    let lon = normalize(center.x, LON_MIN, LON_MAX) >> shift;
    let cells = 1i64 << step;

    let mut hashes = BTreeSet::new();
    for dlat in -1i64..=1 {
        let row = lat as i64 + dlat;
        if !(0..cells).contains(&row) {
            continue;
        }
        for dlon in -1i64..=1 {
            // longitude wraps around the antimeridian
            let column = (lon as i64 + dlon).rem_euclid(cells);
            hashes.insert(spread(row as u32) | (spread(column as u32) << 1));
        }
    }

    let width = 2 * shift;
    let mut ranges: Vec<(u64, u64)> = Vec::new();
    for hash in hashes {
        let (min, max) = (hash << width, ((hash + 1) << width) - 1);
        match ranges.last_mut() {
            Some(last) if last.1 + 1 == min => last.1 = max,
            _ => ranges.push((min, max)),
        }
    }
    ranges
        .into_iter()
        .map(|(min, max)| (min as f64, max as f64))
        .collect()
}

/// Finest precision (bits per coordinate) at which one cell spans `radius`
/// in both directions, or `None` if no cell grid is coarse enough.
fn cell_step(center: &GeoPoint, radius: f64) -> Option<u32> {
    let angle = radius.max(0.0) / EARTH_RADIUS_M;
    if !angle.is_finite() || angle >= std::f64::consts::FRAC_PI_2 {
        return None;
    }

    let lat_span = angle.to_degrees();
    let widest_lat = (center.y.abs() + lat_span).to_radians();
    if widest_lat >= std::f64::consts::FRAC_PI_2 || angle.sin() >= widest_lat.cos() {
        return None;
    }
    let lon_span = (angle.sin() / widest_lat.cos()).asin().to_degrees();

    (1..=STEP).rev().find(|&step| {
        let cells = (1u64 << step) as f64;
        (LAT_MAX - LAT_MIN) / cells >= lat_span && (LON_MAX - LON_MIN) / cells >= lon_span
    })
}

/// Name of the geo index for a property path: the last `.` becomes `:`.
///
/// `location` stays `location`, `address.location` becomes `address:location`.
pub fn geo_index_name(path: &str) -> String {
    match path.rfind('.') {
        Some(pos) => format!("{}:{}", &path[..pos], &path[pos + 1..]),
        None => path.to_string(),
    }
}
