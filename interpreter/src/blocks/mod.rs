pub mod expr;
pub mod note;

pub use expr::{ExprBlock, ExprState};
pub use note::NoteBlock;
