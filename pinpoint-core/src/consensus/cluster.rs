//! Single-link spatial clustering and weighted centroid

use crate::types::WeightedObservation;
use pinpoint_common::geo::round_to;
use pinpoint_common::Coordinate;
use std::cmp::Ordering;

/// Indices of observations that agree with each other
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Member indices into the weighted observation list, ascending
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn total_weight(&self, points: &[WeightedObservation]) -> f64 {
        self.members.iter().map(|&i| points[i].weight).sum()
    }

    fn max_weight(&self, points: &[WeightedObservation]) -> f64 {
        self.members
            .iter()
            .map(|&i| points[i].weight)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn first_member(&self) -> usize {
        self.members.first().copied().unwrap_or(usize::MAX)
    }
}

/// Connected components where an edge joins any two observations within
/// `radius_m` of each other
///
/// Clusters come back ordered by their first member.
pub fn single_link_clusters(points: &[WeightedObservation], radius_m: f64) -> Vec<Cluster> {
    let mut parent: Vec<usize> = (0..points.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            if points[i].coordinate().distance_m(points[j].coordinate()) <= radius_m {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    // Smaller root wins so roots stay stable
                    let (lo, hi) = if ri < rj { (ri, rj) } else { (rj, ri) };
                    parent[hi] = lo;
                }
            }
        }
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut root_slot: Vec<Option<usize>> = vec![None; points.len()];
    for i in 0..points.len() {
        let root = find(&mut parent, i);
        match root_slot[root] {
            Some(slot) => clusters[slot].members.push(i),
            None => {
                root_slot[root] = Some(clusters.len());
                clusters.push(Cluster { members: vec![i] });
            }
        }
    }
    clusters
}

/// Pick the cluster to keep
///
/// Largest first; ties go to the highest total weight, then to the cluster
/// holding the single heaviest observation, then to the earliest-gathered.
pub fn select_cluster<'a>(
    clusters: &'a [Cluster],
    points: &[WeightedObservation],
) -> Option<&'a Cluster> {
    clusters.iter().min_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then_with(|| cmp_desc(a.total_weight(points), b.total_weight(points)))
            .then_with(|| cmp_desc(a.max_weight(points), b.max_weight(points)))
            .then_with(|| a.first_member().cmp(&b.first_member()))
    })
}

fn cmp_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Weight-normalised centroid of the cluster members
///
/// Rounded to 8 decimals, then clamped into the members' bounding box so
/// rounding can never push it outside. All-zero weights fall back to the
/// plain mean.
pub fn weighted_centroid(members: &[&WeightedObservation]) -> Option<Coordinate> {
    if members.is_empty() {
        return None;
    }

    let total: f64 = members.iter().map(|m| m.weight).sum();
    let (lat, lng) = if total > 0.0 {
        members.iter().fold((0.0, 0.0), |(lat, lng), m| {
            (
                lat + m.coordinate().lat * m.weight,
                lng + m.coordinate().lng * m.weight,
            )
        })
    } else {
        members
            .iter()
            .fold((0.0, 0.0), |(lat, lng), m| (lat + m.coordinate().lat, lng + m.coordinate().lng))
    };
    let divisor = if total > 0.0 { total } else { members.len() as f64 };

    let bbox = BoundingBox::of(members.iter().map(|m| *m.coordinate()))?;
    Some(bbox.clamp(Coordinate::new(
        round_to(lat / divisor, 8),
        round_to(lng / divisor, 8),
    )))
}

/// Axis-aligned lat/lng bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn of(points: impl IntoIterator<Item = Coordinate>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lng: first.lng,
            max_lng: first.lng,
        };
        for p in iter {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.min_lng = bbox.min_lng.min(p.lng);
            bbox.max_lng = bbox.max_lng.max(p.lng);
        }
        Some(bbox)
    }

    pub fn contains(&self, p: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.lat) && (self.min_lng..=self.max_lng).contains(&p.lng)
    }

    pub fn clamp(&self, p: Coordinate) -> Coordinate {
        Coordinate::new(
            p.lat.clamp(self.min_lat, self.max_lat),
            p.lng.clamp(self.min_lng, self.max_lng),
        )
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Larger of the latitude and longitude spans in degrees
    pub fn max_span(&self) -> f64 {
        (self.max_lat - self.min_lat).max(self.max_lng - self.min_lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Observation, SourceKind};
    use chrono::Utc;

    fn point(source: SourceKind, lat: f64, lng: f64, confidence: f64) -> WeightedObservation {
        WeightedObservation::from_observation(Observation::new(
            source,
            Coordinate::new(lat, lng),
            confidence,
            5.0,
            Utc::now(),
        ))
    }

    #[test]
    fn test_single_link_chains_neighbours() {
        // 0.0006° latitude ≈ 67m: a-b and b-c link, a-c do not, all one cluster
        let points = vec![
            point(SourceKind::Google, 37.0000, 127.0, 0.9),
            point(SourceKind::Naver, 37.0006, 127.0, 0.9),
            point(SourceKind::Kakao, 37.0012, 127.0, 0.9),
            point(SourceKind::Osm, 37.1000, 127.0, 0.9),
        ];
        let clusters = single_link_clusters(&points, 100.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, vec![0, 1, 2]);
        assert_eq!(clusters[1].members, vec![3]);
    }

    #[test]
    fn test_select_prefers_size_then_weight() {
        let points = vec![
            point(SourceKind::Manual, 37.0, 127.0, 0.5),
            point(SourceKind::Government, 37.5, 127.0, 1.0),
        ];
        let clusters = single_link_clusters(&points, 100.0);
        let chosen = select_cluster(&clusters, &points).unwrap();
        assert_eq!(chosen.members, vec![1], "heavier singleton wins the tie");
    }

    #[test]
    fn test_select_falls_back_to_gather_order() {
        let points = vec![
            point(SourceKind::Google, 37.0, 127.0, 0.8),
            point(SourceKind::Google, 37.5, 127.0, 0.8),
        ];
        let clusters = single_link_clusters(&points, 100.0);
        let chosen = select_cluster(&clusters, &points).unwrap();
        assert_eq!(chosen.members, vec![0]);
    }

    #[test]
    fn test_weighted_centroid_pulls_toward_heavier() {
        let a = point(SourceKind::Government, 37.0, 127.0, 1.0);
        let b = point(SourceKind::Manual, 37.0004, 127.0, 1.0);
        let centroid = weighted_centroid(&[&a, &b]).unwrap();
        // weights 1.0 and 0.3
        let expected = (37.0 * 1.0 + 37.0004 * 0.3) / 1.3;
        assert!((centroid.lat - expected).abs() < 1e-8);
        assert!(centroid.lat < 37.0002);
    }

    #[test]
    fn test_zero_weights_use_plain_mean() {
        let a = point(SourceKind::Google, 37.0, 127.0, 0.0);
        let b = point(SourceKind::Naver, 37.0002, 127.0002, 0.0);
        let centroid = weighted_centroid(&[&a, &b]).unwrap();
        assert!((centroid.lat - 37.0001).abs() < 1e-9);
        assert!((centroid.lng - 127.0001).abs() < 1e-9);
    }

    #[test]
    fn test_bounding_box_center_and_span() {
        let bbox = BoundingBox::of(vec![
            Coordinate::new(37.50, 127.00),
            Coordinate::new(37.53, 127.01),
        ])
        .unwrap();
        assert!((bbox.max_span() - 0.03).abs() < 1e-9);
        assert!((bbox.center().lat - 37.515).abs() < 1e-9);
        assert!(bbox.contains(&Coordinate::new(37.51, 127.005)));
    }
}
