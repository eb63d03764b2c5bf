use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::block::{Block, DynBlock};

/// Registry of block variants, keyed by a stable name.
///
/// Hosts build one and pass it into load and selection paths; nothing
/// registers itself globally.
#[derive(Clone, Default)]
pub struct BlockLibrary {
    variants: IndexMap<String, Rc<dyn DynBlock>>,
}

impl BlockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<B: Block>(mut self, name: impl Into<String>, block: B) -> Self {
        self.insert(name, Rc::new(block));
        self
    }

    /// Register a variant, replacing any previous one under the same name.
    pub fn insert(&mut self, name: impl Into<String>, block: Rc<dyn DynBlock>) {
        self.variants.insert(name.into(), block);
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn DynBlock>> {
        self.variants.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variants.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

impl fmt::Debug for BlockLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::testing::{LookupBlock, NumberBlock};

    #[test]
    fn later_registration_replaces_earlier() {
        let library = BlockLibrary::new()
            .with("number", NumberBlock)
            .with("lookup", LookupBlock)
            .with("number", LookupBlock);
        assert_eq!(library.len(), 2);
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["number", "lookup"]);
        assert!(library.get("missing").is_none());
        assert_eq!(format!("{:?}", library.get("number").map(|_| ())), "Some(())");
    }
}
