use html_escape::decode_html_entities;
use lol_html::html_content::{EndTag, TextType};
use lol_html::{element, text, HtmlRewriter, Settings};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::config::ExtractionMode;
use crate::http_client::FetchedDocument;
use crate::normalizer::{normalize, normalize_with};
use crate::render::{render_fragment, render_lossy};

// Selectors follow the MediaWiki article layout.
const HEADING: &str = "#firstHeading";
const INFO_CARD: &str = "#mw-content-text > div > table.infobox.vcard";
const INFO_CARD_CAPTION: &str = "#mw-content-text > div > table.infobox.vcard > caption";
const PARAGRAPH: &str = "#mw-content-text > div > p";

// Rows of the info card itself, with or without an explicit tbody. Child
// combinators keep rows of tables nested inside a cell out of the card.
const INFO_CARD_ROWS: [&str; 2] = [
    "#mw-content-text > div > table.infobox.vcard > tbody > tr",
    "#mw-content-text > div > table.infobox.vcard > tr",
];

// Elements inside a value cell whose start and end separate words.
const CELL_BREAKS: [&str; 7] = ["br", "li", "p", "div", "table", "tr", "td"];

/// Info-card label whose value keeps its internal whitespace.
pub const WEBSITE_LABEL: &str = "Website";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Organization_name")]
    pub subject_name: String,
    /// Label to value. A label seen twice keeps the later row's value.
    #[serde(rename = "Info_card")]
    pub info_card: BTreeMap<String, String>,
    #[serde(rename = "Strings")]
    pub body_paragraphs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TextRecord {
    pub text: String,
}

/// One output line: either the full record or the plain-text record.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Record {
    Full(ExtractedRecord),
    Text(TextRecord),
}

#[derive(Debug, Default)]
struct RawRow {
    label: String,
    value: String,
}

pub fn extract(doc: &FetchedDocument, mode: ExtractionMode) -> Record {
    match mode {
        ExtractionMode::Full => Record::Full(extract_record(doc)),
        ExtractionMode::Text => Record::Text(extract_text(doc)),
    }
}

/// Walk the document once, collecting raw text for the heading, info card and
/// body paragraphs, then render and normalize every field.
///
/// Never fails: missing structure yields empty fields, and a parse error part
/// way through keeps whatever was collected before it.
pub fn extract_record(doc: &FetchedDocument) -> ExtractedRecord {
    let mut heading = String::new();
    let mut caption = String::new();
    let mut has_info_card = false;
    let paragraphs: RefCell<Vec<String>> = RefCell::new(Vec::new());
    // End tag handlers must be 'static, so rows are shared through an Rc.
    let rows: Rc<RefCell<Vec<RawRow>>> = Rc::default();

    {
        let mut handlers = vec![
            text!(HEADING, |t| {
                heading.push_str(t.as_str());
                Ok(())
            }),
            element!(INFO_CARD, |_| {
                has_info_card = true;
                Ok(())
            }),
            text!(INFO_CARD_CAPTION, |t| {
                caption.push_str(t.as_str());
                Ok(())
            }),
            element!(PARAGRAPH, |_| {
                paragraphs.borrow_mut().push(String::new());
                Ok(())
            }),
            text!(PARAGRAPH, |t| {
                if let Some(paragraph) = paragraphs.borrow_mut().last_mut() {
                    paragraph.push_str(t.as_str());
                }
                Ok(())
            }),
        ];

        // Each row start opens a new entry; its cells append to the newest one.
        for row in INFO_CARD_ROWS {
            handlers.push(element!(row, |_| {
                rows.borrow_mut().push(RawRow::default());
                Ok(())
            }));
            handlers.push(text!(format!("{row} > th"), |t| {
                if let Some(entry) = rows.borrow_mut().last_mut() {
                    entry.label.push_str(t.as_str());
                }
                Ok(())
            }));
            handlers.push(text!(format!("{row} > td"), |t| {
                if let Some(entry) = rows.borrow_mut().last_mut() {
                    entry.value.push_str(t.as_str());
                }
                Ok(())
            }));
            for tag in CELL_BREAKS {
                handlers.push(element!(format!("{row} > td {tag}"), |el| {
                    push_cell_break(&rows);
                    // Void elements such as br have no end tag.
                    if let Some(end_handlers) = el.end_tag_handlers() {
                        let rows = Rc::clone(&rows);
                        end_handlers.push(Box::new(move |_: &mut EndTag<'_>| {
                            push_cell_break(&rows);
                            Ok(())
                        }) as _);
                    }
                    Ok(())
                }));
            }
        }

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::new()
            },
            |_: &[u8]| {},
        );

        let result = match rewriter.write(doc.body.as_bytes()) {
            Ok(()) => rewriter.end(),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(url = %doc.url, error = %e, "HTML parsing stopped early, keeping partial record");
        }
    }

    if !has_info_card {
        debug!(url = %doc.url, "no info card found");
    }

    ExtractedRecord {
        title: normalize(&render_lossy(&heading)),
        subject_name: normalize(&render_lossy(&caption)),
        info_card: build_info_card(rows.take()),
        body_paragraphs: render_paragraphs(&doc.url, paragraphs.into_inner()),
    }
}

fn render_paragraphs(url: &str, raw: Vec<String>) -> Vec<String> {
    let mut paragraphs = Vec::with_capacity(raw.len());
    for (index, fragment) in raw.into_iter().enumerate() {
        match render_fragment(&fragment) {
            Ok(text) => {
                let text = normalize(&text);
                if !text.is_empty() {
                    paragraphs.push(text);
                }
            }
            Err(e) => {
                warn!(url, paragraph = index, error = %e, "skipping paragraph");
            }
        }
    }
    paragraphs
}

fn push_cell_break(rows: &RefCell<Vec<RawRow>>) {
    if let Some(entry) = rows.borrow_mut().last_mut() {
        entry.value.push(' ');
    }
}

/// Cell text is only entity-decoded, not rendered, so a `Website` value keeps
/// its whitespace exactly as written in the source.
fn build_info_card(rows: Vec<RawRow>) -> BTreeMap<String, String> {
    let mut info_card = BTreeMap::new();
    for row in rows {
        let label = normalize(&decode_html_entities(&row.label));
        if label.is_empty() {
            continue;
        }
        let value = normalize_with(&decode_html_entities(&row.value), label == WEBSITE_LABEL);
        // Last row wins on a repeated label.
        info_card.insert(label, value);
    }
    info_card
}

/// Plain text of the whole document body. Script and style contents are
/// skipped; text nodes are separated by a space.
pub fn extract_text(doc: &FetchedDocument) -> TextRecord {
    let mut content = String::new();

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![text!("body", |t| {
                    if matches!(t.text_type(), TextType::Data) {
                        content.push_str(t.as_str());
                        if t.last_in_text_node() {
                            content.push(' ');
                        }
                    }
                    Ok(())
                })],
                ..Settings::new()
            },
            |_: &[u8]| {},
        );

        let result = match rewriter.write(doc.body.as_bytes()) {
            Ok(()) => rewriter.end(),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(url = %doc.url, error = %e, "HTML parsing stopped early, keeping partial text");
        }
    }

    let text = match render_fragment(&content) {
        Ok(rendered) => normalize(&rendered),
        Err(e) => {
            warn!(url = %doc.url, error = %e, "failed to render document text");
            String::new()
        }
    };
    TextRecord { text }
}
