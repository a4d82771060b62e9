//! Ordered, chained lookup of type-tagged extension objects

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Any value that can be attached to an [`ExtensionList`]
///
/// Implemented for every `'static` type that is `Debug + Send + Sync`, so
/// plain structs and enums can be attached without extra boilerplate.
pub trait Extension: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug + Send + Sync> Extension for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Ordered list of extensions with an optional parent list
///
/// Lookups scan local entries in insertion order and fall back to the parent
/// once local entries are exhausted. Cloning is cheap: entries are shared.
#[derive(Clone, Default)]
pub struct ExtensionList {
    entries: Vec<Arc<dyn Extension>>,
    parent: Option<Arc<ExtensionList>>,
}

impl ExtensionList {
    /// Shared empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty list whose lookups continue into `parent`
    pub fn with_parent(parent: ExtensionList) -> Self {
        Self {
            entries: Vec::new(),
            parent: Some(Arc::new(parent)),
        }
    }

    /// Append an extension (builder style)
    pub fn with<T: Extension>(mut self, extension: T) -> Self {
        self.push(extension);
        self
    }

    /// Append an extension
    pub fn push<T: Extension>(&mut self, extension: T) {
        self.entries.push(Arc::new(extension));
    }

    /// Append an already shared extension, keeping its identity
    pub fn push_shared(&mut self, extension: Arc<dyn Extension>) {
        self.entries.push(extension);
    }

    /// First extension of type `T`, local entries before the parent's
    pub fn find<T: Any>(&self) -> Option<&T> {
        self.entries
            .iter()
            .find_map(|entry| downcast::<T>(entry))
            .or_else(|| self.parent.as_ref().and_then(|parent| parent.find::<T>()))
    }

    /// All extensions of type `T` in lookup order
    pub fn find_all<T: Any>(&self) -> Vec<&T> {
        let mut found: Vec<&T> = self
            .entries
            .iter()
            .filter_map(|entry| downcast::<T>(entry))
            .collect();
        if let Some(parent) = &self.parent {
            found.extend(parent.find_all::<T>());
        }
        found
    }

    /// Every extension in lookup order, regardless of type
    pub fn iter(&self) -> Box<dyn Iterator<Item = &dyn Extension> + '_> {
        let local = self.entries.iter().map(|entry| {
            let ext: &dyn Extension = &**entry;
            ext
        });
        match &self.parent {
            Some(parent) => Box::new(local.chain(parent.iter())),
            None => Box::new(local),
        }
    }

    /// Number of extensions including the parent chain
    pub fn len(&self) -> usize {
        self.entries.len() + self.parent.as_ref().map_or(0, |parent| parent.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn downcast<T: Any>(entry: &Arc<dyn Extension>) -> Option<&T> {
    let ext: &dyn Extension = &**entry;
    ext.as_any().downcast_ref::<T>()
}

impl fmt::Debug for ExtensionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::{ClientId, Connections};

    #[derive(Debug, PartialEq)]
    struct Hint(u32);

    #[test]
    fn test_find_returns_first_match() {
        let list = ExtensionList::new()
            .with(Hint(1))
            .with(ClientId::new("a"))
            .with(Hint(2));

        assert_eq!(list.find::<Hint>(), Some(&Hint(1)));
        assert_eq!(list.find::<ClientId>().map(|id| id.identifier()), Some("a"));
        assert!(list.find::<Connections>().is_none());
    }

    #[test]
    fn test_find_all_preserves_order_then_parent() {
        let parent = ExtensionList::new().with(Hint(10)).with(Hint(11));
        let mut child = ExtensionList::with_parent(parent);
        child.push(Hint(1));
        child.push(Connections::All);
        child.push(Hint(2));

        let hints: Vec<u32> = child.find_all::<Hint>().iter().map(|h| h.0).collect();
        assert_eq!(hints, vec![1, 2, 10, 11]);
        assert_eq!(child.len(), 5);
    }

    #[test]
    fn test_parent_consulted_only_after_local() {
        let parent = ExtensionList::new().with(ClientId::new("parent"));
        let child = ExtensionList::with_parent(parent.clone()).with(ClientId::new("child"));
        assert_eq!(child.find::<ClientId>().map(|id| id.identifier()), Some("child"));

        let empty_child = ExtensionList::with_parent(parent);
        assert_eq!(
            empty_child.find::<ClientId>().map(|id| id.identifier()),
            Some("parent")
        );
    }

    #[test]
    fn test_iter_reports_type_names() {
        let list = ExtensionList::new().with(Hint(3)).with(Connections::Output);
        let names: Vec<&str> = list.iter().map(|ext| ext.type_name()).collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("Hint"));
        assert!(names[1].ends_with("Connections"));
        assert!(ExtensionList::new().is_empty());
    }
}
