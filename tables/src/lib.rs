pub mod block;
pub mod config;
pub mod document;
pub mod environment;
pub mod error;
pub mod history;
pub mod multiple;
pub mod propagate;
pub mod sheet;
pub mod store;
pub mod value;

pub use block::{Block, BlockLibrary, BlockState, DynBlock, UpdateQueue, Updater};
pub use config::Config;
pub use document::{DocumentBlock, DocumentState, Page, PageId};
pub use environment::Environment;
pub use error::StoreError;
pub use history::History;
pub use sheet::{Line, LineId, SheetBlock, SheetState, Visibility};
pub use value::Value;
