//! Distance clustering of markers and resolution of clicks on clusters.

use std::collections::HashMap;

use crate::config::SAME_POSITION_EPSILON;
use crate::marker::MapMarker;
use crate::projection::{Extent, MapPoint};

/// Markers merged into one symbol at the current resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Indices into the marker list, in input order.
    pub members: Vec<usize>,
    /// Average of the member positions, in projected meters.
    pub center: MapPoint,
    pub extent: Extent,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.members.first().copied()
    }
}

/// Group points that lie within `distance_px` screen pixels of a seed point.
///
/// Points are visited in order; each unclaimed point seeds a cluster that takes
/// every unclaimed point inside the square of half-width `distance_px * resolution`
/// around it. Candidates come from a hash grid with that cell size, so only the
/// 3x3 neighborhood of the seed is scanned.
pub fn cluster_points(points: &[MapPoint], distance_px: f64, resolution: f64) -> Vec<Cluster> {
    let reach = distance_px * resolution;
    if !reach.is_finite() || reach <= 0.0 {
        return points
            .iter()
            .enumerate()
            .map(|(i, p)| Cluster {
                members: vec![i],
                center: *p,
                extent: Extent::around(*p, 0.0),
            })
            .collect();
    }

    let cell_of = |p: &MapPoint| ((p.x / reach).floor() as i64, (p.y / reach).floor() as i64);
    let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        grid.entry(cell_of(p)).or_default().push(i);
    }

    let mut claimed = vec![false; points.len()];
    let mut clusters = Vec::new();
    for (seed, seed_point) in points.iter().enumerate() {
        if claimed[seed] {
            continue;
        }
        let (cx, cy) = cell_of(seed_point);
        let mut members = Vec::new();
        for gx in cx - 1..=cx + 1 {
            for gy in cy - 1..=cy + 1 {
                let Some(cell) = grid.get(&(gx, gy)) else {
                    continue;
                };
                for &i in cell {
                    let p = points[i];
                    if !claimed[i]
                        && (p.x - seed_point.x).abs() <= reach
                        && (p.y - seed_point.y).abs() <= reach
                    {
                        members.push(i);
                    }
                }
            }
        }
        members.sort_unstable();
        for &i in &members {
            claimed[i] = true;
        }

        let member_points: Vec<MapPoint> = members.iter().map(|&i| points[i]).collect();
        let n = member_points.len() as f64;
        let (sx, sy) = member_points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        clusters.push(Cluster {
            members,
            center: MapPoint::new(sx / n, sy / n),
            extent: Extent::from_points(&member_points),
        });
    }
    clusters
}

/// Partition markers into groups sharing one position within `epsilon` degrees.
///
/// Groups keep input order, both across groups (by first member) and within
/// them. Used for the click pass-through and for host-side disambiguation lists.
pub fn group_by_exact_position(markers: &[MapMarker], epsilon: f64) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, marker) in markers.iter().enumerate() {
        let position = marker.lonlat();
        match groups
            .iter_mut()
            .find(|group| markers[group[0]].lonlat().approx_eq(&position, epsilon))
        {
            Some(group) => group.push(i),
            None => groups.push(vec![i]),
        }
    }
    groups
}

/// True when every listed marker sits within `epsilon` of the first one.
pub fn all_same_position(markers: &[MapMarker], members: &[usize], epsilon: f64) -> bool {
    let Some(&first) = members.first() else {
        return false;
    };
    let anchor = markers[first].lonlat();
    members
        .iter()
        .all(|&i| markers[i].lonlat().approx_eq(&anchor, epsilon))
}

/// What a click on a cluster symbol should do.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterClick {
    /// Pass the click through to this marker (single marker or indivisible stack).
    Marker(usize),
    /// Zoom to show the members apart.
    FitExtent(Extent),
    Nothing,
}

pub fn resolve_cluster_click(cluster: &Cluster, markers: &[MapMarker]) -> ClusterClick {
    match cluster.members.as_slice() {
        [] => ClusterClick::Nothing,
        [only] => ClusterClick::Marker(*only),
        members if all_same_position(markers, members, SAME_POSITION_EPSILON) => {
            ClusterClick::Marker(members[0])
        }
        _ => ClusterClick::FitExtent(cluster.extent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::resolution_for_zoom;

    fn project(markers: &[MapMarker]) -> Vec<MapPoint> {
        markers.iter().map(MapMarker::projected).collect()
    }

    #[test]
    fn mixed_positions_cluster_then_fit() {
        let markers = vec![
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-10.0, -50.0),
        ];
        let clusters = cluster_points(&project(&markers), 40.0, resolution_for_zoom(2.0));
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1, 2]);
        match resolve_cluster_click(&clusters[0], &markers) {
            ClusterClick::FitExtent(extent) => {
                assert!(extent.width() > 0.0);
                assert!(extent.contains(markers[2].projected()));
            }
            other => panic!("expected a fit, got {other:?}"),
        }
    }

    #[test]
    fn identical_positions_pass_click_to_first_member() {
        let markers = vec![
            MapMarker::at(-15.78, -47.93).with_label("first"),
            MapMarker::at(-15.78, -47.93).with_label("second"),
        ];
        let clusters = cluster_points(&project(&markers), 40.0, resolution_for_zoom(12.0));
        assert_eq!(clusters.len(), 1);
        assert_eq!(
            resolve_cluster_click(&clusters[0], &markers),
            ClusterClick::Marker(0)
        );
    }

    #[test]
    fn distant_markers_stay_apart_when_zoomed_in() {
        let markers = vec![
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-15.78, -47.93),
            MapMarker::at(-10.0, -50.0),
        ];
        let clusters = cluster_points(&project(&markers), 40.0, resolution_for_zoom(8.0));
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![0, 1]);
        assert_eq!(clusters[1].members, vec![2]);
        assert_eq!(resolve_cluster_click(&clusters[1], &markers), ClusterClick::Marker(2));
    }

    #[test]
    fn cluster_center_is_member_average() {
        let points = vec![MapPoint::new(0.0, 0.0), MapPoint::new(10.0, 20.0)];
        let clusters = cluster_points(&points, 40.0, 1.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].center, MapPoint::new(5.0, 10.0));
    }

    #[test]
    fn seed_claims_only_within_reach() {
        // The middle point is within reach of both ends, the ends are not of each other.
        let points = vec![
            MapPoint::new(0.0, 0.0),
            MapPoint::new(30.0, 0.0),
            MapPoint::new(60.0, 0.0),
        ];
        let clusters = cluster_points(&points, 40.0, 1.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![0, 1]);
        assert_eq!(clusters[1].members, vec![2]);
    }

    #[test]
    fn zero_distance_keeps_every_point() {
        let points = vec![MapPoint::new(0.0, 0.0), MapPoint::new(0.0, 0.0)];
        assert_eq!(cluster_points(&points, 0.0, 100.0).len(), 2);
    }

    #[test]
    fn groups_by_position_in_input_order() {
        let markers = vec![
            MapMarker::at(1.0, 1.0),
            MapMarker::at(2.0, 2.0),
            MapMarker::at(1.00005, 1.0),
            MapMarker::at(2.0, 2.0),
            MapMarker::at(3.0, 3.0),
        ];
        let groups = group_by_exact_position(&markers, SAME_POSITION_EPSILON);
        assert_eq!(groups, vec![vec![0, 2], vec![1, 3], vec![4]]);
        assert!(all_same_position(&markers, &groups[0], SAME_POSITION_EPSILON));
        assert!(!all_same_position(&markers, &[0, 1], SAME_POSITION_EPSILON));
        assert!(!all_same_position(&markers, &[], SAME_POSITION_EPSILON));
    }
}
