//! Parse events and the observer contract
//!
//! The [`crate::parser::EventParser`] broadcasts every [`ParseEvent`] to each
//! registered [`ParseObserver`] in registration order. Observers see an
//! immutable snapshot and have no handle back into the parser.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::tokenizer::Location;

/// One attribute of a start tag, after reference decoding and normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    pub location: Location,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseEvent {
    DocumentStart,
    DocumentEnd,
    ElementStart {
        name: String,
        attributes: Vec<Attribute>,
        location: Location,
    },
    ElementEnd {
        name: String,
        location: Location,
    },
    CharacterData {
        text: String,
        location: Location,
    },
    Warning {
        message: String,
        location: Location,
    },
    Error {
        message: String,
        location: Location,
    },
    FatalError {
        message: String,
        location: Location,
    },
}

impl ParseEvent {
    pub fn location(&self) -> Option<Location> {
        match self {
            ParseEvent::DocumentStart | ParseEvent::DocumentEnd => None,
            ParseEvent::ElementStart { location, .. }
            | ParseEvent::ElementEnd { location, .. }
            | ParseEvent::CharacterData { location, .. }
            | ParseEvent::Warning { location, .. }
            | ParseEvent::Error { location, .. }
            | ParseEvent::FatalError { location, .. } => Some(*location),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseEvent::FatalError { .. })
    }
}

/// Receives parse events. Implementations must not assume anything about
/// other observers registered on the same parse.
pub trait ParseObserver {
    fn on_event(&mut self, event: &ParseEvent);
}

impl<F> ParseObserver for F
where
    F: FnMut(&ParseEvent),
{
    fn on_event(&mut self, event: &ParseEvent) {
        self(event)
    }
}

/// Collects a copy of every event it sees
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    events: Vec<ParseEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ParseEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ParseEvent> {
        self.events
    }
}

impl ParseObserver for EventRecorder {
    fn on_event(&mut self, event: &ParseEvent) {
        self.events.push(event.clone());
    }
}

/// Writes a line per event in the `SAX.callback()` trace format.
pub struct DebugTracer<W: Write> {
    writer: W,
}

impl DebugTracer<std::io::Stderr> {
    /// Traces to stderr, keeping stdout free for the run report
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write> DebugTracer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn trace_line(event: &ParseEvent) -> String {
        match event {
            ParseEvent::DocumentStart => "  SAX.start_document()".to_string(),
            ParseEvent::DocumentEnd => "  SAX.end_document()".to_string(),
            ParseEvent::ElementStart {
                name, attributes, ..
            } => {
                let mut line = format!("  SAX.start_element() for {}", name);
                for attr in attributes {
                    line.push_str(&format!(" {}='{}'", attr.name, attr.value));
                }
                line
            }
            ParseEvent::ElementEnd { name, .. } => format!("  SAX.end_element() for {}", name),
            ParseEvent::CharacterData { text, .. } => {
                format!("  SAX.characters({:?}, {})", text, text.chars().count())
            }
            ParseEvent::Warning { message, location } => {
                format!("SAX.warning() [{}] {}", location, message)
            }
            ParseEvent::Error { message, location } => {
                format!("SAX.error() [{}] {}", location, message)
            }
            ParseEvent::FatalError { message, location } => {
                format!("SAX.fatal_error() [{}] {}", location, message)
            }
        }
    }
}

impl<W: Write> ParseObserver for DebugTracer<W> {
    fn on_event(&mut self, event: &ParseEvent) {
        // Tracing is best effort; a closed pipe must not disturb validation
        let _ = writeln!(self.writer, "{}", Self::trace_line(event));
    }
}
