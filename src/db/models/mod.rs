// src/db/models/mod.rs

//! Data models for templedb database entities
//!
//! One module per entity. Each model maps a table row to a Rust struct
//! and provides the CRUD operations the engines build on. File-scoped
//! lookups always take a project (or branch) scope; there are no
//! path-only queries.

pub mod branch;
pub mod checkout;
pub mod commit;
pub mod conflict;
pub mod file_contents;
pub mod file_state;
pub mod file_type;
pub mod project;
pub mod project_file;
pub mod working_state;

pub use branch::Branch;
pub use checkout::{Checkout, CheckoutFile};
pub use commit::Commit;
pub use conflict::{Conflict, ConflictStatus, ConflictType};
pub use file_contents::FileContents;
pub use file_state::{ChangeType, FileState};
pub use file_type::{FileType, FileTypePattern};
pub use project::Project;
pub use project_file::ProjectFile;
pub use working_state::{WorkingFileState, WorkingState};
