//! Versioned document migrations.
//!
//! [`MigrationRegistry`] stores transforms per component type and applies the
//! chain covering a document's recorded version up to the running version.
//! [`MigrationBuilder`] produces those transforms from common field edits.

pub mod builder;
pub mod registry;

pub use builder::{MigrationBuilder, ORIGINAL_TYPE_FIELD};
pub use registry::{MigrationFn, MigrationRegistry, MigrationStep};

impl MigrationRegistry {
    /// Starts a builder for `T`. Call [`MigrationBuilder::register`] with this registry to finish.
    pub fn migrations_for<T: crate::snapshot::SaveableComponent>(&self) -> MigrationBuilder {
        MigrationBuilder::for_component::<T>()
    }
}
