use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use tables::block::{Block, BlockLibrary};
use tables::{Environment, Value};

/// A Markdown text cell. Its result is the rendered plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoteBlock;

impl NoteBlock {
    pub fn plain_text(markdown: &str) -> String {
        let mut text = String::new();
        for event in Parser::new(markdown) {
            match event {
                Event::Text(s) | Event::Code(s) => text.push_str(&s),
                Event::SoftBreak => text.push(' '),
                Event::HardBreak => text.push('\n'),
                Event::Start(Tag::Item) => text.push_str("- "),
                Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock) => {
                    if !text.ends_with('\n') {
                        text.push('\n');
                    }
                }
                _ => {}
            }
        }
        text.trim_end().to_string()
    }
}

impl Block for NoteBlock {
    type State = String;

    fn init(&self) -> String {
        String::new()
    }

    fn result(&self, state: &String, _env: &Environment) -> Option<Value> {
        let text = Self::plain_text(state);
        if text.is_empty() { None } else { Some(Value::Text(text)) }
    }

    fn to_json(&self, state: &String) -> serde_json::Value {
        serde_json::Value::String(state.clone())
    }

    fn from_json(&self, json: &serde_json::Value, _env: &Environment, _library: &BlockLibrary) -> String {
        json.as_str().map(str::to_string).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_plain_text() {
        let markdown = "# Title\n\nSome *emphasis* and `code`\nwrapped.\n\n- one\n- two";
        assert_eq!(
            NoteBlock::plain_text(markdown),
            "Title\nSome emphasis and code wrapped.\n- one\n- two"
        );
    }

    #[test]
    fn empty_note_has_no_result() {
        assert_eq!(NoteBlock.result(&String::new(), &Environment::new()), None);
        assert_eq!(
            NoteBlock.result(&"hi".to_string(), &Environment::new()),
            Some(Value::from("hi"))
        );
    }
}
