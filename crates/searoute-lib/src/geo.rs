use crate::port::Port;

/// Mean Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.098;

/// Great-circle distance between two ports in nautical miles (haversine).
///
/// Used as the A* heuristic only. Edge weights always come from the stored
/// segment distances, which follow shipping lanes rather than the sphere.
pub fn great_circle_distance(a: &Port, b: &Port) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_NM * c
}
