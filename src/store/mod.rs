//! store
//!
//! Object and reference storage consumed by the history rewriter.
//!
//! - [`traits`] - collaborator contracts and the shared data model
//! - [`tree`] - mutable tree definitions used to build new trees
//! - [`memory`] - in-memory implementation used by tests

pub mod memory;
pub mod traits;
pub mod tree;

pub use traits::{
    Commit, Object, ObjectStore, RefStore, RefTarget, Reference, Repository, StoreError,
    TagAnnotation, MAX_SYMBOLIC_DEPTH,
};
pub use tree::{DefinitionEntry, EntryMode, TreeDefinition, TreeEntry};
