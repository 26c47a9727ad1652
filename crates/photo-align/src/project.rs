//! Project model: ordered images plus one correspondence set per target.
//!
//! The first image is the alignment reference. Every correspondence set is
//! keyed by a [`PairKey`] whose `reference` is that first image; removing the
//! reference or moving another image into first place discards all sets.
//!
//! On disk the project is the JSON layout
//!
//! ```json
//! {
//!   "images": ["a.jpg", "b.jpg"],
//!   "points": { "a.jpg,b.jpg": [[[10.0, 20.0]], [[12.0, 21.5]]] }
//! }
//! ```
//!
//! where each key is the reference path and the target path joined by a comma.

use photo_align_core::{Correspondence, CorrespondenceSet, Point, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identifier of an image within one [`Project`]; never reused after removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(u32);

impl ImageId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub path: String,
    /// `(width, height)` once the pixels have been loaded.
    pub dimensions: Option<(usize, usize)>,
}

/// Identity of a (reference, target) image pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub reference: ImageId,
    pub target: ImageId,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("unknown image {0}")]
    UnknownImage(ImageId),
    #[error("image {0} is not a target of the current reference")]
    NotATarget(ImageId),
    #[error("image path {0:?} is already part of the project")]
    DuplicateImage(String),
    #[error("image index {index} out of range (len={len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Malformed project file. Loading never yields a partial project.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("legacy \"left\"/\"right\" layout; expected \"images\" and \"points\"")]
    LegacyLayout,
    #[error("invalid project layout: {0}")]
    Layout(String),
    #[error("image path {0:?} is listed more than once")]
    DuplicateImage(String),
    #[error("point key {0:?} does not name the reference and one of its targets")]
    UnknownPairKey(String),
    #[error("point lists for {key:?} differ in length (reference={reference}, target={target})")]
    LengthMismatch {
        key: String,
        reference: usize,
        target: usize,
    },
    #[error("non-finite coordinate in points for {0:?}")]
    NonFinite(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ProjectIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Serialized form of a [`Project`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub images: Vec<String>,
    #[serde(default)]
    pub points: BTreeMap<String, [Vec<[f64; 2]>; 2]>,
}

fn pair_key_string(reference: &str, target: &str) -> String {
    format!("{reference},{target}")
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Project {
    images: Vec<ImageRecord>,
    points: BTreeMap<PairKey, CorrespondenceSet>,
    next_id: u32,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an image; the first one added becomes the reference.
    pub fn add_image(&mut self, path: impl Into<String>) -> Result<ImageId, ProjectError> {
        let path = path.into();
        if self.images.iter().any(|r| r.path == path) {
            return Err(ProjectError::DuplicateImage(path));
        }
        let id = ImageId(self.next_id);
        self.next_id += 1;
        self.images.push(ImageRecord {
            id,
            path,
            dimensions: None,
        });
        Ok(id)
    }

    /// Remove an image and every correspondence set that depends on it.
    pub fn remove_image(&mut self, id: ImageId) -> Result<ImageRecord, ProjectError> {
        let index = self.index_of(id).ok_or(ProjectError::UnknownImage(id))?;
        let record = self.images.remove(index);
        if index == 0 {
            if !self.points.is_empty() {
                log::info!("reference {} removed, discarding all point sets", record.path);
            }
            self.points.clear();
        } else {
            self.points.retain(|k, _| k.target != id);
        }
        Ok(record)
    }

    /// Move an image to position `to`. If this changes the reference, all
    /// correspondence sets are discarded.
    pub fn move_image(&mut self, id: ImageId, to: usize) -> Result<(), ProjectError> {
        let from = self.index_of(id).ok_or(ProjectError::UnknownImage(id))?;
        if to >= self.images.len() {
            return Err(ProjectError::IndexOutOfRange {
                index: to,
                len: self.images.len(),
            });
        }
        let old_reference = self.images[0].id;
        let record = self.images.remove(from);
        self.images.insert(to, record);
        if self.images[0].id != old_reference {
            log::info!("reference changed, discarding all point sets");
            self.points.clear();
        }
        Ok(())
    }

    #[inline]
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn image(&self, id: ImageId) -> Option<&ImageRecord> {
        self.images.iter().find(|r| r.id == id)
    }

    pub fn index_of(&self, id: ImageId) -> Option<usize> {
        self.images.iter().position(|r| r.id == id)
    }

    pub fn reference(&self) -> Option<&ImageRecord> {
        self.images.first()
    }

    /// Every image after the reference, in project order.
    pub fn targets(&self) -> &[ImageRecord] {
        self.images.get(1..).unwrap_or(&[])
    }

    pub fn set_dimensions(
        &mut self,
        id: ImageId,
        width: usize,
        height: usize,
    ) -> Result<(), ProjectError> {
        let record = self
            .images
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ProjectError::UnknownImage(id))?;
        record.dimensions = Some((width, height));
        Ok(())
    }

    /// Key pairing the current reference with `target`.
    pub fn pair_key(&self, target: ImageId) -> Result<PairKey, ProjectError> {
        let index = self
            .index_of(target)
            .ok_or(ProjectError::UnknownImage(target))?;
        if index == 0 {
            return Err(ProjectError::NotATarget(target));
        }
        Ok(PairKey {
            reference: self.images[0].id,
            target,
        })
    }

    /// Key pairing the current reference with the image at `index`.
    pub fn pair_key_at(&self, index: usize) -> Result<PairKey, ProjectError> {
        let record = self.images.get(index).ok_or(ProjectError::IndexOutOfRange {
            index,
            len: self.images.len(),
        })?;
        self.pair_key(record.id)
    }

    /// Check that `key` pairs the current reference with one of its targets.
    pub fn check_key(&self, key: &PairKey) -> Result<(), ProjectError> {
        let expected = self.pair_key(key.target)?;
        if expected.reference != key.reference {
            return Err(if self.index_of(key.reference).is_some() {
                ProjectError::NotATarget(key.target)
            } else {
                ProjectError::UnknownImage(key.reference)
            });
        }
        Ok(())
    }

    pub fn correspondences(&self, key: &PairKey) -> Option<&CorrespondenceSet> {
        self.points.get(key)
    }

    /// Set for `key`, created empty on first access.
    pub fn correspondences_mut(
        &mut self,
        key: PairKey,
    ) -> Result<&mut CorrespondenceSet, ProjectError> {
        self.check_key(&key)?;
        Ok(self.points.entry(key).or_default())
    }

    /// Replace the set for `key`, returning the previous one.
    pub fn set_correspondences(
        &mut self,
        key: PairKey,
        set: CorrespondenceSet,
    ) -> Result<Option<CorrespondenceSet>, ProjectError> {
        self.check_key(&key)?;
        Ok(self.points.insert(key, set))
    }

    pub fn remove_correspondences(&mut self, key: &PairKey) -> Option<CorrespondenceSet> {
        self.points.remove(key)
    }

    /// All stored sets, ordered by key.
    pub fn pairs(&self) -> impl Iterator<Item = (&PairKey, &CorrespondenceSet)> {
        self.points.iter()
    }

    /// Build a project from its serialized form.
    pub fn from_file(file: ProjectFile) -> Result<Self, SchemaError> {
        let mut project = Project::new();
        for path in file.images {
            project.add_image(path).map_err(|e| match e {
                ProjectError::DuplicateImage(p) => SchemaError::DuplicateImage(p),
                other => SchemaError::Layout(other.to_string()),
            })?;
        }

        // Resolve keys by exact match so paths containing commas still work.
        let mut by_key: BTreeMap<String, PairKey> = BTreeMap::new();
        if let Some(reference) = project.reference() {
            for target in project.targets() {
                by_key.insert(
                    pair_key_string(&reference.path, &target.path),
                    PairKey {
                        reference: reference.id,
                        target: target.id,
                    },
                );
            }
        }

        for (raw_key, [ref_pts, tgt_pts]) in file.points {
            let key = *by_key
                .get(&raw_key)
                .ok_or_else(|| SchemaError::UnknownPairKey(raw_key.clone()))?;
            if ref_pts.len() != tgt_pts.len() {
                return Err(SchemaError::LengthMismatch {
                    key: raw_key,
                    reference: ref_pts.len(),
                    target: tgt_pts.len(),
                });
            }
            if ref_pts.iter().chain(&tgt_pts).flatten().any(|v| !v.is_finite()) {
                return Err(SchemaError::NonFinite(raw_key));
            }
            let set: CorrespondenceSet = ref_pts
                .iter()
                .zip(&tgt_pts)
                .map(|(r, t)| Correspondence::new(Point::new(r[0], r[1]), Point::new(t[0], t[1])))
                .collect();
            project.points.insert(key, set);
        }
        Ok(project)
    }

    /// Serialized form; keys are `"{reference path},{target path}"`.
    pub fn to_file(&self) -> ProjectFile {
        let mut points = BTreeMap::new();
        for (key, set) in &self.points {
            let (Some(reference), Some(target)) =
                (self.image(key.reference), self.image(key.target))
            else {
                continue;
            };
            let side =
                |s: Side| -> Vec<[f64; 2]> { set.points(s).map(|p| [p.x, p.y]).collect() };
            points.insert(
                pair_key_string(&reference.path, &target.path),
                [side(Side::Reference), side(Side::Target)],
            );
        }
        ProjectFile {
            images: self.images.iter().map(|r| r.path.clone()).collect(),
            points,
        }
    }

    /// Parse a project from JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, ProjectIoError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| SchemaError::Layout(e.to_string()))?;
        if let Some(obj) = value.as_object() {
            let legacy = obj.contains_key("left") || obj.contains_key("right");
            if legacy && !obj.contains_key("images") {
                return Err(SchemaError::LegacyLayout.into());
            }
        }
        let file: ProjectFile =
            serde_json::from_value(value).map_err(|e| SchemaError::Layout(e.to_string()))?;
        Ok(Self::from_file(file)?)
    }

    pub fn to_json_string(&self) -> Result<String, ProjectIoError> {
        Ok(serde_json::to_string_pretty(&self.to_file())?)
    }

    /// Load a project file from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProjectIoError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Write the project as pretty JSON. The file is replaced atomically.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProjectIoError> {
        let path = path.as_ref();
        let json = self.to_json_string()?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// A [`Project`] shared between threads.
///
/// Editors take the write lock for each whole operation; the pipeline and
/// persistence only need the read lock.
#[derive(Clone, Debug, Default)]
pub struct SharedProject(Arc<RwLock<Project>>);

impl SharedProject {
    pub fn new(project: Project) -> Self {
        Self(Arc::new(RwLock::new(project)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Project> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Project> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> Project {
        self.read().clone()
    }
}

impl From<Project> for SharedProject {
    fn from(project: Project) -> Self {
        Self::new(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_images() -> (Project, ImageId, ImageId, ImageId) {
        let mut p = Project::new();
        let a = p.add_image("a.jpg").unwrap();
        let b = p.add_image("b.jpg").unwrap();
        let c = p.add_image("c.jpg").unwrap();
        (p, a, b, c)
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let (mut p, ..) = three_images();
        assert_eq!(
            p.add_image("b.jpg"),
            Err(ProjectError::DuplicateImage("b.jpg".into()))
        );
    }

    #[test]
    fn ids_are_not_reused() {
        let (mut p, _, _, c) = three_images();
        p.remove_image(c).unwrap();
        let d = p.add_image("d.jpg").unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn keys_must_pair_reference_with_a_target() {
        let (mut p, a, b, c) = three_images();
        assert_eq!(p.pair_key(a), Err(ProjectError::NotATarget(a)));
        let key = p.pair_key(b).unwrap();
        assert_eq!(key.reference, a);
        let bad = PairKey {
            reference: b,
            target: c,
        };
        assert_eq!(
            p.correspondences_mut(bad).map(|_| ()),
            Err(ProjectError::NotATarget(c))
        );
        assert!(p.correspondences_mut(key).is_ok());
    }

    #[test]
    fn removing_a_target_drops_its_set_only() {
        let (mut p, _, b, c) = three_images();
        let kb = p.pair_key(b).unwrap();
        let kc = p.pair_key(c).unwrap();
        p.correspondences_mut(kb).unwrap().add(1.0, 1.0, 2.0, 2.0);
        p.correspondences_mut(kc).unwrap().add(1.0, 1.0, 3.0, 3.0);
        p.remove_image(b).unwrap();
        assert!(p.correspondences(&kb).is_none());
        assert_eq!(p.correspondences(&kc).map(|s| s.len()), Some(1));
    }

    #[test]
    fn changing_the_reference_discards_all_sets() {
        let (mut p, a, b, c) = three_images();
        let kc = p.pair_key(c).unwrap();
        p.correspondences_mut(kc).unwrap().add(1.0, 1.0, 3.0, 3.0);

        // reordering targets keeps the sets
        p.move_image(c, 1).unwrap();
        assert!(p.correspondences(&kc).is_some());

        p.move_image(b, 0).unwrap();
        assert_eq!(p.pairs().count(), 0);
        assert_eq!(p.reference().map(|r| r.id), Some(b));

        let kc = p.pair_key(c).unwrap();
        p.correspondences_mut(kc).unwrap().add(1.0, 1.0, 3.0, 3.0);
        p.remove_image(b).unwrap();
        assert_eq!(p.pairs().count(), 0);
        assert_eq!(p.reference().map(|r| r.id), Some(a));
    }

    #[test]
    fn json_round_trip() {
        let raw = r#"{
            "images": ["ref.png", "t,1.png"],
            "points": { "ref.png,t,1.png": [[[1.0, 2.0], [3.5, 4.0]], [[1.5, 2.5], [3.0, 4.5]]] }
        }"#;
        let p = Project::from_json_str(raw).unwrap();
        let key = p.pair_key_at(1).unwrap();
        let set = p.correspondences(&key).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1).unwrap().target, Point::new(3.0, 4.5));

        let again = Project::from_json_str(&p.to_json_string().unwrap()).unwrap();
        assert_eq!(again, p);
        assert_eq!(again.to_file(), p.to_file());
    }

    #[test]
    fn schema_errors() {
        let cases = [
            (r#"{"left": [], "right": []}"#, SchemaError::LegacyLayout),
            (
                r#"{"images": ["a", "a"]}"#,
                SchemaError::DuplicateImage("a".into()),
            ),
            (
                r#"{"images": ["a", "b"], "points": {"b,a": [[], []]}}"#,
                SchemaError::UnknownPairKey("b,a".into()),
            ),
            (
                r#"{"images": ["a", "b"], "points": {"a,b": [[[1, 2]], []]}}"#,
                SchemaError::LengthMismatch {
                    key: "a,b".into(),
                    reference: 1,
                    target: 0,
                },
            ),
        ];
        for (raw, expected) in cases {
            match Project::from_json_str(raw) {
                Err(ProjectIoError::Schema(e)) => assert_eq!(e, expected, "{raw}"),
                other => panic!("{raw}: unexpected {other:?}"),
            }
        }
        assert!(matches!(
            Project::from_json_str(r#"{"images": "a"}"#),
            Err(ProjectIoError::Schema(SchemaError::Layout(_)))
        ));
        assert!(matches!(
            Project::from_json_str("not json"),
            Err(ProjectIoError::Schema(SchemaError::Layout(_)))
        ));
    }

    #[test]
    fn shared_project_locks() {
        let shared = SharedProject::new(Project::new());
        shared.write().add_image("a.png").unwrap();
        assert_eq!(shared.read().len(), 1);
        assert_eq!(shared.snapshot().len(), 1);
    }
}
