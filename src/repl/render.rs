//! Markdown to plain terminal text

use crate::state_machine::{Message, Owner};
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use std::fmt::Write;

/// Flatten assistant markdown into readable plain text.
///
/// Block structure is kept as line breaks, list items get bullets or
/// numbers and fenced code is indented. Inline markup is dropped.
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::new();
    // One entry per open list: next ordinal for ordered lists
    let mut lists: Vec<Option<u64>> = Vec::new();
    let mut in_code_block = false;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::List(start)) => lists.push(start),
            Event::End(TagEnd::List(_)) => {
                lists.pop();
                if lists.is_empty() {
                    out.push('\n');
                }
            }
            Event::Start(Tag::Item) => {
                let depth = lists.len().saturating_sub(1);
                out.push_str(&"  ".repeat(depth));
                match lists.last_mut() {
                    Some(Some(n)) => {
                        let _ = write!(out, "{n}. ");
                        *n += 1;
                    }
                    _ => out.push_str("- "),
                }
            }
            Event::End(TagEnd::Item) => ensure_newline(&mut out),
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        let _ = writeln!(out, "[{lang}]");
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                out.push('\n');
            }
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_)) => {
                if lists.is_empty() {
                    out.push_str("\n\n");
                } else {
                    ensure_newline(&mut out);
                }
            }
            Event::Text(text) if in_code_block => {
                for line in text.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Rule => out.push_str("----\n\n"),
            Event::TaskListMarker(done) => out.push_str(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

fn ensure_newline(out: &mut String) {
    if !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Render one history entry with an owner prefix
pub fn render_message(message: &Message) -> String {
    match message.owner {
        Owner::User => format!("you> {}", message.text),
        Owner::Assistant => {
            let body = markdown_to_text(&message.text);
            let mut lines = body.lines();
            let mut out = format!("assistant> {}", lines.next().unwrap_or_default());
            for line in lines {
                let _ = write!(out, "\n           {line}");
            }
            out
        }
    }
}
