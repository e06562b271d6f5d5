/*
[INPUT]:  Public API exports for the fieldsync-engine crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod manager;
pub mod model;
pub mod notify;
pub mod queue;
pub mod store;
pub mod submission;
pub mod worker;

// Re-export main types for convenience
pub use config::{SyncConfig, TimingConfig};
pub use manager::{AppState, ManagerHandle, TaskManager};
pub use model::{Attachment, AttachmentError, AttachmentState, NewAttachment, NewTask, Task, TaskState};
pub use notify::{LogNotifier, Notifier};
pub use store::TaskStore;
pub use submission::TaskHandle;
