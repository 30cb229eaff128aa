//! XML scene dialect.
//!
//! The document is kept as the flat list of `quick-xml` events it was read
//! from, so serializing re-emits everything that was not rewritten exactly
//! as parsed. Reference paths and asset leaves are indexed by the position
//! of their text events.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, BytesText, Event};

use crate::LEAF_FIELDS;
use crate::document::{LeafPath, ReferenceNode, SceneReferences};
use crate::error::SceneError;

/// Parsed XML scene.
#[derive(Debug, Clone)]
pub struct XmlScene {
    events: Vec<Event<'static>>,
    references: Vec<XmlReference>,
    leaves: Vec<LeafPath>,
}

#[derive(Debug, Clone)]
struct XmlReference {
    id: String,
    path: String,
    /// Indices of the text/CDATA events inside `<Path>`.
    text_events: Vec<usize>,
}

/// Text being collected from one element.
struct Capture {
    /// Stack depth of the element that opened the capture.
    depth: usize,
    field: String,
    text: String,
    events: Vec<usize>,
}

struct PendingReference {
    depth: usize,
    id: String,
    path: Option<(String, Vec<usize>)>,
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn id_attribute(start: &BytesStart<'_>) -> Result<Option<String>, SceneError> {
    match start.try_get_attribute("id")? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

impl XmlScene {
    /// Parses an XML scene and indexes its references and asset leaves.
    ///
    /// A `Reference` without an `id`, without a `Path` child, or with an
    /// empty path is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, SceneError> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();

        let mut events: Vec<Event<'static>> = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut references = Vec::new();
        let mut leaves = Vec::new();
        let mut pending: Option<PendingReference> = None;
        let mut capture: Option<Capture> = None;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            let index = events.len();

            match &event {
                Event::Eof => break,
                Event::Start(start) => {
                    let name = local_name(start);
                    let parent = stack.last().map(String::as_str);

                    if name == "Reference" && parent == Some("References") {
                        let id = id_attribute(start)?.ok_or_else(|| {
                            SceneError::IllFormed("Reference node without id".into())
                        })?;
                        pending = Some(PendingReference {
                            depth: stack.len(),
                            id,
                            path: None,
                        });
                    } else if name == "Path"
                        && parent == Some("Reference")
                        && pending.as_ref().is_some_and(|p| p.depth + 1 == stack.len())
                    {
                        capture = Some(Capture {
                            depth: stack.len(),
                            field: name.clone(),
                            text: String::new(),
                            events: Vec::new(),
                        });
                    } else if pending.is_none() && LEAF_FIELDS.contains(&name.as_str()) {
                        capture = Some(Capture {
                            depth: stack.len(),
                            field: name.clone(),
                            text: String::new(),
                            events: Vec::new(),
                        });
                    }
                    stack.push(name);
                }
                Event::Empty(start) => {
                    let name = local_name(start);
                    let parent = stack.last().map(String::as_str);
                    if name == "Reference" && parent == Some("References") {
                        let id = id_attribute(start)?.unwrap_or_default();
                        return Err(SceneError::IllFormed(format!(
                            "reference {id} has no Path"
                        )));
                    }
                    if name == "Path"
                        && parent == Some("Reference")
                        && let Some(p) = pending.as_mut()
                    {
                        p.path = Some((String::new(), Vec::new()));
                    }
                }
                Event::Text(text) => {
                    if let Some(c) = capture.as_mut() {
                        c.text.push_str(&text.unescape()?);
                        c.events.push(index);
                    }
                }
                Event::CData(data) => {
                    if let Some(c) = capture.as_mut() {
                        c.text.push_str(&String::from_utf8_lossy(data));
                        c.events.push(index);
                    }
                }
                Event::End(_) => {
                    stack.pop();

                    if capture.as_ref().is_some_and(|c| c.depth == stack.len()) {
                        if let Some(c) = capture.take() {
                            let value = c.text.trim().to_string();
                            match pending.as_mut() {
                                Some(p) if c.field == "Path" => {
                                    p.path = Some((value, c.events));
                                }
                                _ => leaves.push(LeafPath {
                                    field: c.field,
                                    value,
                                }),
                            }
                        }
                    } else if pending.as_ref().is_some_and(|p| p.depth == stack.len())
                        && let Some(p) = pending.take()
                    {
                        let (path, text_events) = p.path.ok_or_else(|| {
                            SceneError::IllFormed(format!("reference {} has no Path", p.id))
                        })?;
                        if path.is_empty() {
                            return Err(SceneError::IllFormed(format!(
                                "reference {} has an empty Path",
                                p.id
                            )));
                        }
                        if references.iter().any(|r: &XmlReference| r.id == p.id) {
                            return Err(SceneError::IllFormed(format!(
                                "reference {} is declared twice",
                                p.id
                            )));
                        }
                        references.push(XmlReference {
                            id: p.id,
                            path,
                            text_events,
                        });
                    }
                }
                _ => {}
            }

            events.push(event.into_owned());
            buf.clear();
        }

        Ok(Self {
            events,
            references,
            leaves,
        })
    }
}

impl SceneReferences for XmlScene {
    fn references(&self) -> Vec<ReferenceNode> {
        self.references
            .iter()
            .map(|r| ReferenceNode {
                id: r.id.clone(),
                path: r.path.clone(),
            })
            .collect()
    }

    fn set_reference_path(&mut self, id: &str, path: &str) -> Result<(), SceneError> {
        let reference = self
            .references
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SceneError::IllFormed(format!("unknown reference {id}")))?;

        for (n, &index) in reference.text_events.iter().enumerate() {
            let text = if n == 0 { path } else { "" };
            self.events[index] = Event::Text(BytesText::new(text).into_owned());
        }
        reference.path = path.to_string();
        Ok(())
    }

    fn leaf_paths(&self) -> Vec<LeafPath> {
        self.leaves.clone()
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SceneError> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.events {
            writer.write_event(event.clone())?;
        }
        Ok(writer.into_inner())
    }
}
