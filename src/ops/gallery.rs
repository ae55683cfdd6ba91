// ============================================================================
// GALLERY: persistence seam for finished artifacts
// ============================================================================

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::{EditError, EditResult};

/// A finished, encoded image handed to the host's gallery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub id: Uuid,
    pub name: String,
    /// Encoded PNG bytes.
    pub png: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, png: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            png,
        }
    }
}

/// "Persist / list / delete a finished artifact". Implemented by the host.
pub trait ArtifactStore {
    fn persist(&mut self, artifact: Artifact) -> EditResult<Uuid>;
    fn list(&self) -> Vec<Uuid>;
    fn delete(&mut self, id: Uuid) -> EditResult<()>;
}

/// In-process store, handy for tests and headless batch runs.
#[derive(Debug, Default)]
pub struct MemoryGallery {
    items: BTreeMap<Uuid, Artifact>,
}

impl MemoryGallery {
    pub fn get(&self, id: Uuid) -> Option<&Artifact> {
        self.items.get(&id)
    }
}

impl ArtifactStore for MemoryGallery {
    fn persist(&mut self, artifact: Artifact) -> EditResult<Uuid> {
        let id = artifact.id;
        self.items.insert(id, artifact);
        Ok(id)
    }

    fn list(&self) -> Vec<Uuid> {
        self.items.keys().copied().collect()
    }

    fn delete(&mut self, id: Uuid) -> EditResult<()> {
        self.items
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EditError::Artifact(format!("no artifact {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_list_delete() {
        let mut gallery = MemoryGallery::default();
        let id = gallery.persist(Artifact::new("one", vec![1])).unwrap();
        assert_eq!(gallery.list(), vec![id]);
        assert_eq!(gallery.get(id).map(|a| a.name.as_str()), Some("one"));
        gallery.delete(id).unwrap();
        assert!(gallery.list().is_empty());
        assert!(gallery.delete(id).is_err());
    }
}
