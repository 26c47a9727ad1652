//! Editing operations on the correspondence set of one image pair.
//!
//! The set stored in the [`Project`] is the only copy of the points. Views
//! that display either side of a pair subscribe to a [`PairEditor`] and
//! redraw from the events it emits; they never talk to each other.

use photo_align_core::{CorrespondenceError, CorrespondenceSet, ImageView, Point, Side};
use photo_align_features::{detect_correspondences, MatcherParams};
use serde::{Deserialize, Serialize};

use crate::project::{PairKey, Project, ProjectError};

/// Half-size of the square hit area around a drawn point, in image pixels.
pub const DEFAULT_HIT_RADIUS: f64 = 10.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Correspondence(#[from] CorrespondenceError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairChange {
    Added { index: usize },
    Removed { index: usize },
    Moved { index: usize },
    Selected { index: Option<usize> },
    Cleared,
    Replaced { len: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairEvent {
    pub key: PairKey,
    /// Side the edit was made on.
    pub side: Side,
    pub change: PairChange,
}

pub trait PairObserver: Send {
    fn on_event(&mut self, event: &PairEvent);
}

impl<F: FnMut(&PairEvent) + Send> PairObserver for F {
    fn on_event(&mut self, event: &PairEvent) {
        self(event)
    }
}

/// How [`PairEditor::auto_correlate`] combines matches with existing points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    #[default]
    Replace,
    Append,
}

/// Mediates edits of correspondence sets and notifies observers.
///
/// Holds the current selection, which is shared by both sides of a pair.
#[derive(Default)]
pub struct PairEditor {
    observers: Vec<Box<dyn PairObserver>>,
    selection: Option<(PairKey, usize)>,
}

impl std::fmt::Debug for PairEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairEditor")
            .field("observers", &self.observers.len())
            .field("selection", &self.selection)
            .finish()
    }
}

impl PairEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl PairObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Selected index on `key`, if the selection is on that pair.
    pub fn selected(&self, key: &PairKey) -> Option<usize> {
        self.selection
            .filter(|(k, _)| k == key)
            .map(|(_, index)| index)
    }

    fn emit(&mut self, key: PairKey, side: Side, change: PairChange) {
        let event = PairEvent { key, side, change };
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    fn clear_selection(&mut self, key: &PairKey) {
        if self.selected(key).is_some() {
            self.selection = None;
        }
    }

    /// Add a point at `(x, y)`. The peer side gets the same coordinates,
    /// ready to be dragged into place.
    pub fn add_point(
        &mut self,
        project: &mut Project,
        key: PairKey,
        side: Side,
        x: f64,
        y: f64,
    ) -> Result<usize, EditError> {
        let index = project.correspondences_mut(key)?.add(x, y, x, y);
        self.clear_selection(&key);
        self.emit(key, side, PairChange::Added { index });
        Ok(index)
    }

    /// Remove the correspondence at `index` from both sides.
    pub fn remove_point(
        &mut self,
        project: &mut Project,
        key: PairKey,
        side: Side,
        index: usize,
    ) -> Result<(), EditError> {
        project.correspondences_mut(key)?.remove_at(index)?;
        self.clear_selection(&key);
        self.emit(key, side, PairChange::Removed { index });
        Ok(())
    }

    /// Select the correspondence at `index`, or clear the selection with `None`.
    pub fn select_point(
        &mut self,
        project: &Project,
        key: PairKey,
        side: Side,
        index: Option<usize>,
    ) -> Result<(), EditError> {
        project.check_key(&key)?;
        match index {
            Some(i) => {
                let len = project.correspondences(&key).map_or(0, CorrespondenceSet::len);
                if i >= len {
                    return Err(CorrespondenceError::IndexOutOfRange { index: i, len }.into());
                }
                self.selection = Some((key, i));
            }
            None => self.clear_selection(&key),
        }
        self.emit(key, side, PairChange::Selected { index });
        Ok(())
    }

    /// Move one side of the correspondence at `index`.
    pub fn move_point(
        &mut self,
        project: &mut Project,
        key: PairKey,
        side: Side,
        index: usize,
        x: f64,
        y: f64,
    ) -> Result<(), EditError> {
        project
            .correspondences_mut(key)?
            .set_point(side, index, Point::new(x, y))?;
        self.emit(key, side, PairChange::Moved { index });
        Ok(())
    }

    /// Remove every correspondence of the pair.
    pub fn clear_points(
        &mut self,
        project: &mut Project,
        key: PairKey,
        side: Side,
    ) -> Result<(), EditError> {
        project.correspondences_mut(key)?.clear();
        self.clear_selection(&key);
        self.emit(key, side, PairChange::Cleared);
        Ok(())
    }

    /// Detect up to `max_count` correspondences automatically and store them
    /// in the pair. Returns the number of detected matches.
    #[allow(clippy::too_many_arguments)]
    pub fn auto_correlate(
        &mut self,
        project: &mut Project,
        key: PairKey,
        reference: &ImageView<'_>,
        target: &ImageView<'_>,
        max_count: usize,
        params: &MatcherParams,
        mode: MergeMode,
    ) -> Result<usize, EditError> {
        project.check_key(&key)?;
        let found = detect_correspondences(reference, target, max_count, params);
        let detected = found.len();
        let set = project.correspondences_mut(key)?;
        match mode {
            MergeMode::Replace => *set = found,
            MergeMode::Append => set.extend_from(&found),
        }
        let len = set.len();
        log::info!("auto-correlated {detected} point(s), pair now has {len}");
        self.clear_selection(&key);
        self.emit(key, Side::Reference, PairChange::Replaced { len });
        Ok(detected)
    }
}

/// Index of the first correspondence whose `side` point lies in the square of
/// half-size `radius` around `(x, y)`.
pub fn find_point_at(
    set: &CorrespondenceSet,
    side: Side,
    x: f64,
    y: f64,
    radius: f64,
) -> Option<usize> {
    set.points(side).position(|p| {
        x >= p.x - radius && x < p.x + radius && y >= p.y - radius && y < p.y + radius
    })
}

const PALETTE: [[u8; 3]; 22] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 245, 60],
    [250, 190, 190],
    [0, 128, 128],
    [230, 190, 255],
    [170, 110, 40],
    [255, 250, 200],
    [128, 0, 0],
    [170, 255, 195],
    [128, 128, 0],
    [255, 215, 180],
    [0, 0, 128],
    [128, 128, 128],
    [255, 255, 255],
    [0, 0, 0],
];

/// Display colour of the marker for correspondence `index`.
///
/// The first 22 indices use a palette of distinct colours; later ones are
/// derived from the index.
pub fn marker_color(index: usize) -> [u8; 3] {
    if let Some(c) = PALETTE.get(index) {
        return *c;
    }
    let channel = |m: usize| (index.wrapping_mul(m) % 255) as u8;
    [channel(120), channel(873), channel(375)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn setup() -> (Project, PairKey, PairEditor, Arc<Mutex<Vec<PairEvent>>>) {
        let mut project = Project::new();
        project.add_image("ref.png").unwrap();
        let t = project.add_image("t.png").unwrap();
        let key = project.pair_key(t).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut editor = PairEditor::new();
        editor.subscribe(move |e: &PairEvent| sink.lock().unwrap().push(*e));
        (project, key, editor, events)
    }

    #[test]
    fn add_mirrors_point_on_peer_side() {
        let (mut project, key, mut editor, events) = setup();
        let i = editor
            .add_point(&mut project, key, Side::Target, 4.0, 5.0)
            .unwrap();
        assert_eq!(i, 0);
        let set = project.correspondences(&key).unwrap();
        assert_eq!(set.point_at(Side::Reference, 0), Ok(Point::new(4.0, 5.0)));
        assert_eq!(set.point_at(Side::Target, 0), Ok(Point::new(4.0, 5.0)));
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[PairEvent {
                key,
                side: Side::Target,
                change: PairChange::Added { index: 0 }
            }]
        );
    }

    #[test]
    fn selection_is_validated_and_cleared_by_edits() {
        let (mut project, key, mut editor, _) = setup();
        assert_eq!(
            editor.select_point(&project, key, Side::Reference, Some(0)),
            Err(EditError::Correspondence(
                CorrespondenceError::IndexOutOfRange { index: 0, len: 0 }
            ))
        );
        editor
            .add_point(&mut project, key, Side::Reference, 1.0, 1.0)
            .unwrap();
        editor
            .add_point(&mut project, key, Side::Reference, 2.0, 2.0)
            .unwrap();
        editor
            .select_point(&project, key, Side::Target, Some(1))
            .unwrap();
        assert_eq!(editor.selected(&key), Some(1));
        editor
            .remove_point(&mut project, key, Side::Reference, 0)
            .unwrap();
        assert_eq!(editor.selected(&key), None);
        assert_eq!(project.correspondences(&key).unwrap().len(), 1);
    }

    #[test]
    fn move_and_clear() {
        let (mut project, key, mut editor, events) = setup();
        editor
            .add_point(&mut project, key, Side::Reference, 1.0, 1.0)
            .unwrap();
        editor
            .move_point(&mut project, key, Side::Target, 0, 9.0, 8.0)
            .unwrap();
        let set = project.correspondences(&key).unwrap();
        assert_eq!(set.get(0).unwrap().target, Point::new(9.0, 8.0));
        assert_eq!(set.get(0).unwrap().reference, Point::new(1.0, 1.0));
        assert!(editor
            .move_point(&mut project, key, Side::Target, 3, 0.0, 0.0)
            .is_err());

        editor.clear_points(&mut project, key, Side::Target).unwrap();
        assert!(project.correspondences(&key).unwrap().is_empty());
        let changes: Vec<PairChange> = events.lock().unwrap().iter().map(|e| e.change).collect();
        assert_eq!(
            changes,
            vec![
                PairChange::Added { index: 0 },
                PairChange::Moved { index: 0 },
                PairChange::Cleared
            ]
        );
    }

    #[test]
    fn edits_on_the_reference_itself_are_rejected() {
        let (mut project, key, mut editor, _) = setup();
        let bad = PairKey {
            reference: key.target,
            target: key.reference,
        };
        assert!(matches!(
            editor.add_point(&mut project, bad, Side::Reference, 0.0, 0.0),
            Err(EditError::Project(ProjectError::NotATarget(_)))
        ));
    }

    #[test]
    fn hit_test_uses_square_window() {
        let mut set = CorrespondenceSet::new();
        set.add(50.0, 50.0, 10.0, 10.0);
        set.add(55.0, 50.0, 30.0, 30.0);
        let hit = |side, x, y| find_point_at(&set, side, x, y, DEFAULT_HIT_RADIUS);
        assert_eq!(hit(Side::Reference, 52.0, 52.0), Some(0));
        assert_eq!(hit(Side::Reference, 62.0, 50.0), Some(1));
        assert_eq!(hit(Side::Target, 19.0, 19.0), Some(0));
        assert_eq!(hit(Side::Target, 20.5, 25.0), Some(1));
        assert_eq!(hit(Side::Target, 0.0, 45.0), None);
    }

    #[test]
    fn marker_colors() {
        assert_eq!(marker_color(0), [230, 25, 75]);
        assert_eq!(marker_color(21), [0, 0, 0]);
        // 22 * 120 = 2640, 22 * 873 = 19206, 22 * 375 = 8250
        assert_eq!(marker_color(22), [90, 81, 90]);
    }
}
