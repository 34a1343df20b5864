pub mod document_store;

pub use document_store::{Collection, DocumentStore, ID_FIELD, Query};
