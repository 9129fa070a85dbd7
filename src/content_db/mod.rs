//! content_db
//!
//! The content index consulted by the registry during reconciliation.
//!
//! - [`ContentIndex`]: what the registry needs (list rows, delete a row,
//!   invalidate lookup caches)
//! - [`SqliteContentDb`]: the default index in `<data_dir>/content.db`

mod sqlite;
mod traits;

pub use sqlite::SqliteContentDb;
pub use traits::{ContentIndex, IndexError};
