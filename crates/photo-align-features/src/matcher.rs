use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;

/// Nearest-neighbour match between a query and a train descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Index and distance of the closest candidate; ties go to the lowest index.
fn nearest(d: &Descriptor, candidates: &[Descriptor]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (j, c) in candidates.iter().enumerate() {
        let dist = d.hamming(c);
        if best.map_or(true, |(_, bd)| dist < bd) {
            best = Some((j, dist));
        }
    }
    best
}

/// Brute-force Hamming matching.
///
/// Every query gets its nearest train descriptor. With `cross_check` only
/// mutual nearest neighbours survive; `max_distance` drops weak matches.
/// The result is sorted by distance, ties by query index.
pub fn match_descriptors(
    query: &[Descriptor],
    train: &[Descriptor],
    cross_check: bool,
    max_distance: Option<u32>,
) -> Vec<FeatureMatch> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let reverse: Vec<usize> = if cross_check {
        train
            .par_iter()
            .map(|t| nearest(t, query).map_or(usize::MAX, |(i, _)| i))
            .collect()
    } else {
        Vec::new()
    };

    let mut matches: Vec<FeatureMatch> = query
        .par_iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let (ti, distance) = nearest(q, train)?;
            if cross_check && reverse[ti] != qi {
                return None;
            }
            if max_distance.is_some_and(|max| distance > max) {
                return None;
            }
            Some(FeatureMatch {
                query: qi,
                train: ti,
                distance,
            })
        })
        .collect();

    matches.sort_by_key(|m| (m.distance, m.query));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(bits: u64) -> Descriptor {
        Descriptor([bits, 0, 0, 0])
    }

    #[test]
    fn picks_nearest_and_sorts_by_distance() {
        let query = [d(0b1111), d(0)];
        let train = [d(0b0111), d(0b1_0000_0000), d(0b1111)];
        let m = match_descriptors(&query, &train, false, None);
        assert_eq!(
            m,
            vec![
                FeatureMatch {
                    query: 0,
                    train: 2,
                    distance: 0
                },
                FeatureMatch {
                    query: 1,
                    train: 1,
                    distance: 1
                },
            ]
        );
    }

    #[test]
    fn ties_go_to_lowest_train_index() {
        let m = match_descriptors(&[d(0)], &[d(1), d(2)], false, None);
        assert_eq!(m[0].train, 0);
    }

    #[test]
    fn cross_check_keeps_mutual_matches_only() {
        // both queries prefer train 0, which prefers query 0
        let query = [d(0), d(1)];
        let train = [d(0), d(0b1110)];
        assert_eq!(match_descriptors(&query, &train, false, None).len(), 2);
        let m = match_descriptors(&query, &train, true, None);
        assert_eq!(
            m,
            vec![FeatureMatch {
                query: 0,
                train: 0,
                distance: 0
            }]
        );
    }

    #[test]
    fn max_distance_filters() {
        let m = match_descriptors(&[d(0), d(0b111)], &[d(0)], false, Some(2));
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].query, 0);
    }

    #[test]
    fn empty_inputs_give_no_matches() {
        assert!(match_descriptors(&[], &[d(0)], false, None).is_empty());
        assert!(match_descriptors(&[d(0)], &[], true, None).is_empty());
    }
}
