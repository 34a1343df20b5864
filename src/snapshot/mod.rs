//! Save/load orchestration.

pub mod component;
pub mod guard;
mod load;
pub mod model;
pub mod requests;
mod save;
pub mod service;

pub use component::{ComponentRegistry, SaveableComponent};
pub use guard::{
    LoadEvent, OperationGuard, OperationKind, OperationReport, OperationStatus, OperationTicket,
    ProgressSink,
};
pub use model::{
    ComponentRecord, DEFAULT_AUTHORED_VERSION, EntityRecord, ScopeSnapshot, WorldSnapshot,
};
pub use requests::{RequestSender, SaveLoadRequest, spawn_worker};
pub use service::SaveLoadService;
