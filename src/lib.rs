pub mod catalog;
pub mod collection;
pub mod document;
pub mod engine;
pub mod error;
mod expression;
pub mod pipeline;
pub mod projection;
pub mod query;
pub mod storage;
pub mod update;
pub mod value;

pub use catalog::Catalog;
pub use collection::{Collection, UpdateResult};
pub use document::DocumentId;
pub use engine::ShelfDb;
pub use error::{Error, Result};
pub use projection::Projection;
pub use query::{FindOptions, SortOrder};
