pub mod document;
pub mod error;
pub mod version;

pub use document::{
    Document, VALUE_FIELD, decode_component, encode_component, from_document, to_document,
};
pub use error::{Result, SaveLoadError};
pub use version::Version;
