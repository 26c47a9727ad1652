//! Point correspondences between a reference image and one target image.
//!
//! A [`CorrespondenceSet`] stores whole pairs, so the reference-side and
//! target-side point lists can never disagree in length: every edit touches
//! both sides at once.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A pixel coordinate in the original, unscaled space of one image.
pub type Point = Point2<f64>;

/// Which image of a pair a point belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Reference,
    Target,
}

impl Side {
    /// The other image of the pair.
    #[inline]
    pub fn peer(self) -> Self {
        match self {
            Side::Reference => Side::Target,
            Side::Target => Side::Reference,
        }
    }
}

/// The same physical feature seen in the reference and in a target image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub reference: Point,
    pub target: Point,
}

impl Correspondence {
    pub fn new(reference: Point, target: Point) -> Self {
        Self { reference, target }
    }

    /// Point on the requested side.
    #[inline]
    pub fn point(&self, side: Side) -> Point {
        match side {
            Side::Reference => self.reference,
            Side::Target => self.target,
        }
    }

    #[inline]
    fn point_mut(&mut self, side: Side) -> &mut Point {
        match side {
            Side::Reference => &mut self.reference,
            Side::Target => &mut self.target,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("correspondence index {index} out of range (len={len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("point lists differ in length (reference={reference}, target={target})")]
    LengthMismatch { reference: usize, target: usize },
}

/// Ordered list of correspondences for one (reference, target) pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    pairs: Vec<Correspondence>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from two parallel point lists.
    pub fn from_point_lists(
        reference: &[Point],
        target: &[Point],
    ) -> Result<Self, CorrespondenceError> {
        if reference.len() != target.len() {
            return Err(CorrespondenceError::LengthMismatch {
                reference: reference.len(),
                target: target.len(),
            });
        }
        let pairs = reference
            .iter()
            .zip(target)
            .map(|(&r, &t)| Correspondence::new(r, t))
            .collect();
        Ok(Self { pairs })
    }

    /// Append a correspondence and return its index.
    pub fn add(&mut self, x_ref: f64, y_ref: f64, x_target: f64, y_target: f64) -> usize {
        self.push(Correspondence::new(
            Point::new(x_ref, y_ref),
            Point::new(x_target, y_target),
        ))
    }

    /// Append a correspondence and return its index.
    pub fn push(&mut self, c: Correspondence) -> usize {
        self.pairs.push(c);
        self.pairs.len() - 1
    }

    /// Remove the correspondence at `index` from both sides.
    ///
    /// Later entries shift down by one and keep their relative order.
    pub fn remove_at(&mut self, index: usize) -> Result<Correspondence, CorrespondenceError> {
        self.check_index(index)?;
        Ok(self.pairs.remove(index))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of points on one side. Always equal to [`Self::len`].
    #[inline]
    pub fn side_len(&self, side: Side) -> usize {
        self.points(side).count()
    }

    pub fn point_at(&self, side: Side, index: usize) -> Result<Point, CorrespondenceError> {
        self.check_index(index)?;
        Ok(self.pairs[index].point(side))
    }

    /// Move one side of an existing correspondence.
    pub fn set_point(
        &mut self,
        side: Side,
        index: usize,
        point: Point,
    ) -> Result<(), CorrespondenceError> {
        self.check_index(index)?;
        *self.pairs[index].point_mut(side) = point;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Correspondence> {
        self.pairs.get(index)
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Correspondence> {
        self.pairs.iter()
    }

    pub fn as_slice(&self) -> &[Correspondence] {
        &self.pairs
    }

    /// Points of one side, in correspondence order.
    pub fn points(&self, side: Side) -> impl Iterator<Item = Point> + '_ {
        self.pairs.iter().map(move |c| c.point(side))
    }

    /// Append every correspondence of `other`.
    pub fn extend_from(&mut self, other: &CorrespondenceSet) {
        self.pairs.extend_from_slice(&other.pairs);
    }

    fn check_index(&self, index: usize) -> Result<(), CorrespondenceError> {
        if index < self.pairs.len() {
            Ok(())
        } else {
            Err(CorrespondenceError::IndexOutOfRange {
                index,
                len: self.pairs.len(),
            })
        }
    }
}

impl<'a> IntoIterator for &'a CorrespondenceSet {
    type Item = &'a Correspondence;
    type IntoIter = std::slice::Iter<'a, Correspondence>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl FromIterator<Correspondence> for CorrespondenceSet {
    fn from_iter<I: IntoIterator<Item = Correspondence>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}
