///! Project-scoped template image store
use crate::{cache::TemplateCache, errors::VisualError};
use dashmap::DashMap;
use image::DynamicImage;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Resolves template images by file name
pub trait TemplateStore: Send + Sync {
    fn load(&self, template_id: &str) -> Result<Arc<DynamicImage>, VisualError>;
}

/// Template store backed by a project directory
pub struct DirTemplateStore {
    root: PathBuf,
    cache: TemplateCache,
}

impl DirTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: TemplateCache::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    fn resolve_path(&self, template_id: &str) -> Result<PathBuf, VisualError> {
        let relative = Path::new(template_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if template_id.trim().is_empty() || escapes {
            return Err(VisualError::InvalidInput(format!(
                "template id '{}' must be a relative path inside the template store",
                template_id
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl TemplateStore for DirTemplateStore {
    fn load(&self, template_id: &str) -> Result<Arc<DynamicImage>, VisualError> {
        if let Some(cached) = self.cache.get(template_id) {
            return Ok(cached);
        }
        let path = self.resolve_path(template_id)?;
        if !path.is_file() {
            return Err(VisualError::TemplateNotFound(path.display().to_string()));
        }
        let image = Arc::new(image::open(&path)?);
        tracing::debug!(template = template_id, path = %path.display(), "loaded template");
        self.cache.put(template_id.to_string(), Arc::clone(&image));
        Ok(image)
    }
}

/// In-memory template store for embedding and tests
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: DashMap<String, Arc<DynamicImage>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template_id: impl Into<String>, image: DynamicImage) {
        self.templates.insert(template_id.into(), Arc::new(image));
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn load(&self, template_id: &str) -> Result<Arc<DynamicImage>, VisualError> {
        self.templates
            .get(template_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| VisualError::TemplateNotFound(template_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_caches_templates_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        DynamicImage::new_rgb8(3, 5)
            .save(dir.path().join("submit.png"))
            .unwrap();

        let store = DirTemplateStore::new(dir.path());
        let first = store.load("submit.png").unwrap();
        assert_eq!((first.width(), first.height()), (3, 5));
        assert_eq!(store.cache().len(), 1);

        let second = store.load("submit.png").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn rejects_paths_outside_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirTemplateStore::new(dir.path());
        assert!(matches!(
            store.load("../secret.png"),
            Err(VisualError::InvalidInput(_))
        ));
        assert!(matches!(
            store.load("missing.png"),
            Err(VisualError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTemplateStore::new();
        store.insert("a.png", DynamicImage::new_luma8(2, 2));
        assert!(store.load("a.png").is_ok());
        assert!(store.load("b.png").is_err());
    }
}
