//! Per-user mask persistence.
//!
//! Layout under the store root: one directory per image id holding
//! `<user>_final.msk` (the one-hot label grid) and `<user>_user.msk` (the
//! provenance grid, 1 where the user hand-labelled the pixel). Saves
//! overwrite; there is no versioning.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use tilemark_common::{ClassDef, MaskEncoding};
use tracing::{debug, warn};

use mask_codec::{
    CodecError, EncodedMask, decode_from_storage, encode_for_storage, read_mask_file,
    write_mask_file,
};

use crate::Result;

const FINAL_SUFFIX: &str = "_final.msk";
const USER_SUFFIX: &str = "_user.msk";

/// One annotator's stored mask for an image
#[derive(Debug, Clone)]
pub struct Contribution {
    pub user: String,
    pub labels: Array2<u8>,
    pub provenance: Array2<bool>,
}

/// Filesystem-backed store of per-user masks
pub struct MaskStore {
    root: PathBuf,
}

impl MaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn image_dir(&self, image_id: &str) -> PathBuf {
        self.root.join(image_id)
    }

    fn final_path(&self, image_id: &str, user: &str) -> PathBuf {
        self.image_dir(image_id).join(format!("{user}{FINAL_SUFFIX}"))
    }

    fn user_path(&self, image_id: &str, user: &str) -> PathBuf {
        self.image_dir(image_id).join(format!("{user}{USER_SUFFIX}"))
    }

    /// Persist one annotator's mask, overwriting any previous save
    pub fn save(
        &self,
        image_id: &str,
        user: &str,
        labels: &Array2<u8>,
        provenance: &Array2<bool>,
        classes: &[ClassDef],
    ) -> Result<()> {
        let one_hot = encode_for_storage(labels, MaskEncoding::Binary, classes)?;
        write_mask_file(self.final_path(image_id, user), &one_hot)?;

        let flags = EncodedMask::Integer(provenance.mapv(u8::from));
        write_mask_file(self.user_path(image_id, user), &flags)?;

        debug!(image_id, user, "saved mask");
        Ok(())
    }

    /// Load one annotator's mask; `None` when they have not saved one
    pub fn load(
        &self,
        image_id: &str,
        user: &str,
        classes: &[ClassDef],
    ) -> Result<Option<(Array2<u8>, Array2<bool>)>> {
        let final_path = self.final_path(image_id, user);
        if !final_path.exists() {
            return Ok(None);
        }

        let labels = decode_from_storage(&read_mask_file(&final_path)?, classes)?;
        let provenance = read_provenance(&self.user_path(image_id, user))?;
        Ok(Some((labels, provenance)))
    }

    /// All decodable contributions for an image, sorted by user name.
    ///
    /// Unreadable or corrupt files are skipped with a warning; one bad
    /// file never blocks the merge of the rest. Masks whose shape does not
    /// match `(height, width)` count as corrupt.
    pub fn contributions(
        &self,
        image_id: &str,
        classes: &[ClassDef],
        height: usize,
        width: usize,
    ) -> Result<Vec<Contribution>> {
        let dir = self.image_dir(image_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut users = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(user) = name.strip_suffix(FINAL_SUFFIX) {
                users.push(user.to_owned());
            }
        }
        users.sort_unstable();

        let mut contributions = Vec::with_capacity(users.len());
        for user in users {
            match self.load(image_id, &user, classes) {
                Ok(Some((labels, provenance))) if labels.dim() == (height, width) => {
                    contributions.push(Contribution {
                        user,
                        labels,
                        provenance,
                    });
                }
                Ok(Some((labels, _))) => {
                    let (got_height, got_width) = labels.dim();
                    warn!(
                        image_id,
                        user, got_height, got_width, "skipping mask with wrong shape"
                    );
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(image_id, user, %error, "skipping unreadable mask");
                }
            }
        }
        Ok(contributions)
    }
}

fn read_provenance(path: &Path) -> Result<Array2<bool>> {
    match read_mask_file(path)? {
        EncodedMask::Integer(flags) => {
            if let Some(&bad) = flags.iter().find(|&&byte| byte > 1) {
                return Err(CodecError::BadProvenance(bad).into());
            }
            Ok(flags.mapv(|byte| byte == 1))
        }
        other => Err(CodecError::ContainerTag(other.encoding() as u8).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    fn classes() -> Vec<ClassDef> {
        vec![
            ClassDef::new(0, "Clear", [255, 255, 255, 0]),
            ClassDef::new(1, "Cloud", [255, 255, 0, 70]),
            ClassDef::new(2, "Shadow", [45, 45, 45, 70]),
        ]
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MaskStore::new(dir.path());
        let labels = array![[0u8, 1], [2, 1]];
        let provenance = array![[true, false], [false, true]];

        store.save("scene_1", "alice", &labels, &provenance, &classes()).unwrap();
        let (loaded_labels, loaded_provenance) =
            store.load("scene_1", "alice", &classes()).unwrap().unwrap();
        assert_eq!(loaded_labels, labels);
        assert_eq!(loaded_provenance, provenance);
    }

    #[test]
    fn test_missing_mask_is_none() {
        let dir = TempDir::new().unwrap();
        let store = MaskStore::new(dir.path());
        assert!(store.load("scene_1", "nobody", &classes()).unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = MaskStore::new(dir.path());
        let provenance = array![[false]];

        store.save("scene_1", "alice", &array![[0u8]], &provenance, &classes()).unwrap();
        store.save("scene_1", "alice", &array![[2u8]], &provenance, &classes()).unwrap();

        let (labels, _) = store.load("scene_1", "alice", &classes()).unwrap().unwrap();
        assert_eq!(labels, array![[2u8]]);
    }

    #[test]
    fn test_contributions_sorted_by_user() {
        let dir = TempDir::new().unwrap();
        let store = MaskStore::new(dir.path());
        let labels = array![[0u8]];
        let provenance = array![[true]];

        for user in ["carol", "alice", "bob"] {
            store.save("scene_1", user, &labels, &provenance, &classes()).unwrap();
        }

        let contributions = store.contributions("scene_1", &classes(), 1, 1).unwrap();
        let users: Vec<&str> = contributions.iter().map(|c| c.user.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_truncated_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = MaskStore::new(dir.path());
        let labels = array![[1u8]];
        let provenance = array![[true]];

        store.save("scene_1", "alice", &labels, &provenance, &classes()).unwrap();
        std::fs::write(store.image_dir("scene_1").join("mallory_final.msk"), b"garbage").unwrap();

        let contributions = store.contributions("scene_1", &classes(), 1, 1).unwrap();
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].user, "alice");
    }

    #[test]
    fn test_wrong_shape_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = MaskStore::new(dir.path());
        let provenance_1 = array![[true]];
        let provenance_2 = array![[true, false]];

        store.save("scene_1", "alice", &array![[1u8]], &provenance_1, &classes()).unwrap();
        store.save("scene_1", "bob", &array![[1u8, 0]], &provenance_2, &classes()).unwrap();

        let contributions = store.contributions("scene_1", &classes(), 1, 1).unwrap();
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].user, "alice");
    }

    #[test]
    fn test_no_directory_means_no_contributions() {
        let dir = TempDir::new().unwrap();
        let store = MaskStore::new(dir.path());
        assert!(store.contributions("unseen", &classes(), 4, 4).unwrap().is_empty());
    }
}
