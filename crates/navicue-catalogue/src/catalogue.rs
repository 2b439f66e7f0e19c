//! The module catalogue: a validated map of module definitions by id.

use std::collections::BTreeMap;

use tracing::debug;

use navicue_core::{ModuleDefinition, ModuleError};

/// Errors that can occur when building or querying a catalogue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogueError {
    /// No module with this id.
    #[error("unknown module `{id}`")]
    UnknownModule {
        /// The requested id.
        id: String,
    },

    /// A module with this id is already registered.
    #[error("duplicate module `{id}`")]
    DuplicateModule {
        /// The repeated id.
        id: String,
    },

    /// The definition does not validate.
    #[error(transparent)]
    InvalidModule(#[from] ModuleError),
}

/// Validated module definitions, ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogue {
    modules: BTreeMap<String, ModuleDefinition>,
}

impl Catalogue {
    /// Create an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a definition.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogueError::DuplicateModule`] if the id is taken, or
    /// [`CatalogueError::InvalidModule`] if the definition does not
    /// validate. Nothing is registered on error.
    pub fn insert(&mut self, definition: ModuleDefinition) -> Result<(), CatalogueError> {
        if self.modules.contains_key(definition.id()) {
            return Err(CatalogueError::DuplicateModule {
                id: definition.id().to_owned(),
            });
        }
        definition.validate()?;
        debug!(
            module = definition.id(),
            stages = definition.stages.len(),
            "Module registered"
        );
        self.modules.insert(definition.id().to_owned(), definition);
        Ok(())
    }

    /// Register every definition in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogueError`] raised by [`insert`](Self::insert).
    pub fn extend(
        &mut self,
        definitions: impl IntoIterator<Item = ModuleDefinition>,
    ) -> Result<(), CatalogueError> {
        definitions
            .into_iter()
            .try_for_each(|definition| self.insert(definition))
    }

    /// Look up a module by id.
    pub fn get(&self, id: &str) -> Option<&ModuleDefinition> {
        self.modules.get(id)
    }

    /// Look up a module by id, failing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogueError::UnknownModule`] if no such module exists.
    pub fn require(&self, id: &str) -> Result<&ModuleDefinition, CatalogueError> {
        self.get(id).ok_or_else(|| CatalogueError::UnknownModule { id: id.to_owned() })
    }

    /// Module ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDefinition> {
        self.modules.values()
    }

    /// Return the number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Return whether the catalogue is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
