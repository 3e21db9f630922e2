//! Named resource tables
//!
//! Pipeline outputs and loaded assets are registered under string keys such
//! as `"gold/albedo_map"` or `"irradiance_map"` and looked up by the renderer
//! every frame.

use crate::backend::traits::*;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No resource registered under '{key}'")]
    NotFound { key: String },
}

/// A resource that can be returned to the backend that created it.
pub trait BackendResource {
    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B);
}

impl BackendResource for TextureHandle {
    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_texture(self);
    }
}

impl BackendResource for ProgramHandle {
    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_program(self);
    }
}

impl BackendResource for BufferHandle {
    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_buffer(self);
    }
}

/// String-keyed store of resources, one entry per key
#[derive(Debug)]
pub struct ResourceRegistry<H> {
    entries: HashMap<String, H>,
}

impl<H> Default for ResourceRegistry<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<H> ResourceRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace the entry for `key`, returning what it displaced.
    pub fn register(&mut self, key: impl Into<String>, handle: H) -> Option<H> {
        let key = key.into();
        log::debug!("Registered '{}'", key);
        self.entries.insert(key, handle)
    }

    /// Like [`register`](Self::register), but releases a displaced handle
    /// through the backend instead of returning it.
    pub fn register_releasing<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: impl Into<String>,
        handle: H,
    ) where
        H: BackendResource,
    {
        let key = key.into();
        if let Some(previous) = self.entries.insert(key.clone(), handle) {
            log::debug!("Released the resource previously registered as '{}'", key);
            previous.release(backend);
        }
    }

    pub fn get(&self, key: &str) -> Result<&H, RegistryError> {
        self.entries.get(key).ok_or_else(|| RegistryError::NotFound {
            key: key.to_string(),
        })
    }

    pub fn lookup(&self, key: &str) -> Result<H, RegistryError>
    where
        H: Copy,
    {
        self.get(key).copied()
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, &H)) {
        for (key, handle) in &self.entries {
            f(key, handle);
        }
    }

    /// Keys in sorted order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Release every entry and leave the registry empty.
    pub fn release_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B)
    where
        H: BackendResource,
    {
        for (_, handle) in self.entries.drain() {
            handle.release(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{TextureDescriptor, TextureFormat};
    use crate::backend::SoftwareBackend;

    #[test]
    fn test_register_then_lookup() {
        let mut registry = ResourceRegistry::new();
        assert_eq!(registry.register("irradiance_map", TextureHandle(7)), None);
        assert_eq!(registry.lookup("irradiance_map"), Ok(TextureHandle(7)));

        // overwriting returns the displaced handle
        assert_eq!(registry.register("irradiance_map", TextureHandle(9)), Some(TextureHandle(7)));
        assert_eq!(registry.lookup("irradiance_map"), Ok(TextureHandle(9)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let registry: ResourceRegistry<TextureHandle> = ResourceRegistry::new();
        assert_eq!(
            registry.lookup("gold/albedo_map"),
            Err(RegistryError::NotFound {
                key: "gold/albedo_map".to_string()
            })
        );
    }

    #[test]
    fn test_register_releasing_destroys_displaced_texture() {
        let mut backend = SoftwareBackend::new(4, 4);
        let desc = TextureDescriptor::sampled_2d("t", 1, 1, TextureFormat::Rgba8Unorm);
        let first = backend.create_texture(&desc).unwrap();
        let second = backend.create_texture(&desc).unwrap();

        let mut registry = ResourceRegistry::new();
        registry.register_releasing(&mut backend, "hdr_texture", first);
        registry.register_releasing(&mut backend, "hdr_texture", second);
        assert!(backend.texture_descriptor(first).is_none());
        assert!(backend.texture_descriptor(second).is_some());

        registry.release_all(&mut backend);
        assert!(registry.is_empty());
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_for_each_visits_every_entry() {
        let mut registry = ResourceRegistry::new();
        registry.register("b", ProgramHandle(2));
        registry.register("a", ProgramHandle(1));
        let mut seen = Vec::new();
        registry.for_each(|key, handle| seen.push((key.to_string(), handle.id())));
        seen.sort();
        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(registry.keys(), vec!["a", "b"]);
    }
}
