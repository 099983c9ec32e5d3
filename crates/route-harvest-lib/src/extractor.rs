//! KML coordinate string extraction
//!
//! Walks a KML document with a streaming XML reader and collects the raw
//! coordinate strings of every `Placemark`, in document order. Within one
//! placemark the `Point` string comes before the `LineString` string.

use crate::ExtractError;
use quick_xml::Reader;
use quick_xml::events::Event;

/// Elements that matter for extraction, matched by local name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Element {
    Placemark,
    Point,
    LineString,
    Coordinates,
    Other,
}

impl Element {
    fn classify(local_name: &[u8]) -> Self {
        match local_name {
            b"Placemark" => Element::Placemark,
            b"Point" => Element::Point,
            b"LineString" => Element::LineString,
            b"coordinates" => Element::Coordinates,
            _ => Element::Other,
        }
    }
}

/// Which field of the enclosing placemark a `coordinates` element fills
#[derive(Clone, Copy, Debug)]
enum Field {
    Point,
    Path,
}

#[derive(Default)]
struct Record {
    point: Option<String>,
    path: Option<String>,
}

impl Record {
    /// A repeated element replaces the earlier one
    fn set(&mut self, field: Field, content: String) {
        match field {
            Field::Point => self.point = Some(content),
            Field::Path => self.path = Some(content),
        }
    }
}

struct Frame {
    element: Element,
    name: String,
}

/// Extract the coordinate strings of all placemarks in `bytes`.
///
/// Fails when the bytes are not a well-formed document rooted at `<kml>`.
/// Empty and whitespace-only strings are skipped.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn extract(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    let mut tokens = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut records: Vec<Record> = Vec::new();
    // Text of the `coordinates` element currently open, if it belongs to a placemark
    let mut open_text: Option<(Field, String)> = None;
    let mut seen_root = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                let local_name = start.local_name();
                let name = std::str::from_utf8(local_name.as_ref())?.to_string();
                if !seen_root {
                    check_root(&name)?;
                    seen_root = true;
                }

                let element = Element::classify(local_name.as_ref());
                match element {
                    Element::Placemark => records.push(Record::default()),
                    Element::Coordinates => {
                        open_text = placemark_field(&stack).map(|field| (field, String::new()));
                    }
                    _ => {}
                }
                stack.push(Frame { element, name });
            }
            Event::Empty(empty) => {
                let local_name = empty.local_name();
                if !seen_root {
                    check_root(std::str::from_utf8(local_name.as_ref())?)?;
                    // `<kml/>` is a complete, empty document
                    return Ok(tokens);
                }
                // `<coordinates/>` counts as an occurrence with empty text
                if Element::classify(local_name.as_ref()) == Element::Coordinates {
                    if let (Some(field), Some(record)) =
                        (placemark_field(&stack), records.last_mut())
                    {
                        record.set(field, String::new());
                    }
                }
            }
            Event::Text(text) => {
                if let Some((_, content)) = open_text.as_mut() {
                    content.push_str(&text.unescape()?);
                }
            }
            Event::CData(cdata) => {
                if let Some((_, content)) = open_text.as_mut() {
                    content.push_str(std::str::from_utf8(&cdata)?);
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    break;
                };
                match frame.element {
                    Element::Coordinates => {
                        if let (Some((field, content)), Some(record)) =
                            (open_text.take(), records.last_mut())
                        {
                            record.set(field, content);
                        }
                    }
                    Element::Placemark => {
                        if let Some(record) = records.pop() {
                            push_record(record, &mut tokens);
                        }
                    }
                    _ => {}
                }
                if stack.is_empty() {
                    // Root closed, anything after it is not part of the document
                    break;
                }
            }
            Event::Eof => {
                if let Some(frame) = stack.pop() {
                    return Err(ExtractError::UnclosedElement(frame.name));
                }
                if !seen_root {
                    return Err(ExtractError::EmptyDocument);
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(tokens)
}

fn check_root(name: &str) -> Result<(), ExtractError> {
    if name == "kml" {
        Ok(())
    } else {
        Err(ExtractError::UnexpectedRoot(name.to_string()))
    }
}

/// The placemark field a `coordinates` element opened under `stack` would fill
fn placemark_field(stack: &[Frame]) -> Option<Field> {
    match stack {
        [.., parent, geometry] if parent.element == Element::Placemark => {
            match geometry.element {
                Element::Point => Some(Field::Point),
                Element::LineString => Some(Field::Path),
                _ => None,
            }
        }
        _ => None,
    }
}

fn push_record(record: Record, tokens: &mut Vec<String>) {
    for content in [record.point, record.path].into_iter().flatten() {
        if !content.trim().is_empty() {
            tokens.push(content);
        }
    }
}
