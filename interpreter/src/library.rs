use tables::block::selector::SelectorBlock;
use tables::{BlockLibrary, Config, DocumentBlock, SheetBlock};

use crate::blocks::{ExprBlock, NoteBlock};

/// The block a host opens: a document whose pages are sheets of
/// selector lines.
pub type RootBlock = DocumentBlock<SheetBlock<SelectorBlock>>;

/// Every variant a selector can choose, by name.
pub fn standard_library() -> BlockLibrary {
    BlockLibrary::new()
        .with("expr", ExprBlock)
        .with("note", NoteBlock)
        .with("sheet", SheetBlock::new(SelectorBlock))
        .with("document", DocumentBlock::new(SelectorBlock))
}

pub fn root_block(config: &Config) -> RootBlock {
    DocumentBlock::with_config(SheetBlock::new(SelectorBlock), config)
}
