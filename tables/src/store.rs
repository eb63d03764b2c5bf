use std::path::Path;

use crate::block::{Block, BlockLibrary};
use crate::environment::Environment;
use crate::error::{Result, StoreError};

/// Parse stored text into a state of `block`. Text that is not JSON loads as
/// `block.init()`.
pub fn parse<B: Block>(block: &B, text: &str, env: &Environment, library: &BlockLibrary) -> B::State {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => block.from_json(&json, env, library),
        Err(err) => {
            tracing::warn!("stored state is not valid JSON ({}); starting fresh", err);
            block.init()
        }
    }
}

pub fn render<B: Block>(block: &B, state: &B::State) -> Result<String> {
    Ok(serde_json::to_string_pretty(&block.to_json(state))?)
}

pub fn load<B: Block>(block: &B, path: &Path, env: &Environment, library: &BlockLibrary) -> Result<B::State> {
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("loaded {} bytes from {}", text.len(), path.display());
    Ok(parse(block, &text, env, library))
}

pub fn save<B: Block>(block: &B, state: &B::State, path: &Path) -> Result<()> {
    let mut text = render(block, state)?;
    text.push('\n');
    std::fs::write(path, text).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}
