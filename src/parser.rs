//! Event Parser (SAX core)
//!
//! Consumes the token stream, enforces well-formedness and broadcasts
//! [`ParseEvent`]s to observers. The parser moves through
//! `BeforeDocument -> InProlog -> InElement -> AfterRoot -> Done`; any fatal
//! well-formedness error moves it to the absorbing `Fatal` state and stops
//! token consumption.

use std::collections::HashSet;
use std::iter::Peekable;
use std::sync::OnceLock;

use regex::Regex;

use crate::entities::{self, EntityMap};
use crate::events::{Attribute, ParseEvent, ParseObserver};
use crate::tokenizer::{Location, Token, TokenKind, Tokenizer};

/// Default limit on element nesting
pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    pub max_depth: usize,
    /// Entities known before the document is read, such as those declared
    /// by an external DTD
    pub entities: EntityMap,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            entities: EntityMap::new(),
        }
    }
}

impl ParserConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_entities(mut self, entities: EntityMap) -> Self {
        self.entities = entities;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    BeforeDocument,
    InProlog,
    InElement,
    AfterRoot,
    Done,
    Fatal,
}

/// One open element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementStackFrame {
    pub name: String,
    pub attributes_seen: Vec<String>,
    pub whitespace_only: bool,
}

/// Summary of a finished (or halted) parse
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseOutcome {
    pub well_formed: bool,
    /// Elements still open when parsing stopped, outermost first
    pub open_elements: Vec<String>,
    pub events_emitted: usize,
    pub errors: usize,
    pub warnings: usize,
}

struct PendingTag<'a> {
    name: &'a str,
    empty: bool,
    location: Location,
}

fn pseudo_attribute_regex() -> &'static Regex {
    static PSEUDO_ATTR: OnceLock<Regex> = OnceLock::new();
    PSEUDO_ATTR.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("Invalid XML declaration regex")
    })
}

/// `VersionNum` of XML 1.x
fn version_regex() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| Regex::new(r"^1\.[0-9]+$").expect("Invalid version regex"))
}

/// Text between the outermost `[` and `]` of a DOCTYPE body
fn internal_subset(doctype_body: &str) -> Option<&str> {
    let open = doctype_body.find('[')?;
    let close = doctype_body.rfind(']')?;
    (close > open).then(|| &doctype_body[open + 1..close])
}

pub struct EventParser {
    config: ParserConfig,
    state: ParserState,
    stack: Vec<ElementStackFrame>,
    entities: EntityMap,
    events_emitted: usize,
    errors: usize,
    warnings: usize,
    doctype_seen: bool,
}

impl EventParser {
    pub fn new(config: ParserConfig) -> Self {
        let entities = config.entities.clone();
        Self {
            config,
            state: ParserState::BeforeDocument,
            stack: Vec::new(),
            entities,
            events_emitted: 0,
            errors: 0,
            warnings: 0,
            doctype_seen: false,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Parses a token stream, broadcasting every event to `observers` in
    /// order before the next token is read.
    pub fn parse<'a, I>(
        mut self,
        tokens: I,
        observers: &mut [&mut dyn ParseObserver],
    ) -> ParseOutcome
    where
        I: IntoIterator<Item = Token<'a>>,
    {
        let mut tokens = tokens.into_iter().peekable();
        self.emit(observers, ParseEvent::DocumentStart);
        self.state = ParserState::InProlog;
        let mut first_token = true;

        while !matches!(self.state, ParserState::Done | ParserState::Fatal) {
            let Some(token) = tokens.next() else {
                // A tokenizer always ends with Eof or Fatal; treat a bare end the same as Eof
                self.finish(observers, Location::default());
                break;
            };
            let is_first = first_token;
            first_token = false;

            match token.kind {
                TokenKind::Fatal => {
                    let message = token
                        .message
                        .clone()
                        .unwrap_or_else(|| "malformed document".to_string());
                    self.fatal(observers, message, token.location);
                }
                TokenKind::XmlDeclaration => {
                    if is_first {
                        self.xml_declaration(observers, &token);
                    } else {
                        self.fatal(
                            observers,
                            "XML declaration is only allowed at the start of the document",
                            token.location,
                        );
                    }
                }
                TokenKind::Doctype => self.doctype(observers, &token),
                TokenKind::Comment | TokenKind::ProcessingInstruction => {}
                TokenKind::Text => self.text(observers, &token),
                TokenKind::CData => self.cdata(observers, &token),
                TokenKind::StartTag | TokenKind::EmptyElementTag => {
                    let pending = PendingTag {
                        name: token.name.unwrap_or_default(),
                        empty: token.kind == TokenKind::EmptyElementTag,
                        location: token.location,
                    };
                    self.start_tag(observers, pending, &mut tokens);
                }
                TokenKind::Attribute => {
                    self.fatal(observers, "attribute outside of a start tag", token.location);
                }
                TokenKind::EndTag => {
                    self.end_tag(observers, token.name.unwrap_or_default(), token.location)
                }
                TokenKind::Eof => self.finish(observers, token.location),
            }
        }

        ParseOutcome {
            well_formed: self.state == ParserState::Done,
            open_elements: self.stack.iter().map(|f| f.name.clone()).collect(),
            events_emitted: self.events_emitted,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    fn emit(&mut self, observers: &mut [&mut dyn ParseObserver], event: ParseEvent) {
        for observer in observers.iter_mut() {
            observer.on_event(&event);
        }
        self.events_emitted += 1;
    }

    fn fatal(
        &mut self,
        observers: &mut [&mut dyn ParseObserver],
        message: impl Into<String>,
        location: Location,
    ) {
        self.errors += 1;
        self.state = ParserState::Fatal;
        self.emit(
            observers,
            ParseEvent::FatalError {
                message: message.into(),
                location,
            },
        );
    }

    fn warning(
        &mut self,
        observers: &mut [&mut dyn ParseObserver],
        message: impl Into<String>,
        location: Location,
    ) {
        self.warnings += 1;
        self.emit(
            observers,
            ParseEvent::Warning {
                message: message.into(),
                location,
            },
        );
    }

    fn error(
        &mut self,
        observers: &mut [&mut dyn ParseObserver],
        message: impl Into<String>,
        location: Location,
    ) {
        self.errors += 1;
        self.emit(
            observers,
            ParseEvent::Error {
                message: message.into(),
                location,
            },
        );
    }

    fn xml_declaration(&mut self, observers: &mut [&mut dyn ParseObserver], token: &Token<'_>) {
        let content = token.content.unwrap_or_default();
        let mut version = None;
        let mut encoding = None;
        let mut standalone = None;
        for caps in pseudo_attribute_regex().captures_iter(content) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            match &caps[1] {
                "version" => version = Some(value),
                "encoding" => encoding = Some(value),
                "standalone" => standalone = Some(value),
                other => {
                    let message = format!("unexpected '{}' in XML declaration", other);
                    return self.fatal(observers, message, token.location);
                }
            }
        }

        match version.as_deref() {
            Some("1.0") => {}
            Some(v) if version_regex().is_match(v) => {
                let message = format!("XML version {} is processed as XML 1.0", v);
                self.warning(observers, message, token.location);
            }
            Some(v) => {
                let message = format!("unsupported XML version '{}'", v);
                return self.fatal(observers, message, token.location);
            }
            None => {
                return self.fatal(
                    observers,
                    "XML declaration is missing the version",
                    token.location,
                );
            }
        }

        if let Some(encoding) = encoding {
            let normalized = encoding.to_ascii_lowercase();
            match normalized.as_str() {
                "utf-8" | "utf8" | "us-ascii" | "ascii" => {}
                _ => {
                    let message = format!("unsupported encoding '{}'", encoding);
                    return self.fatal(observers, message, token.location);
                }
            }
        }

        if let Some(standalone) = standalone {
            if standalone != "yes" && standalone != "no" {
                let message = format!("standalone must be 'yes' or 'no', found '{}'", standalone);
                self.fatal(observers, message, token.location);
            }
        }
    }

    fn doctype(&mut self, observers: &mut [&mut dyn ParseObserver], token: &Token<'_>) {
        if self.state != ParserState::InProlog || self.doctype_seen {
            return self.fatal(
                observers,
                "DOCTYPE declaration is only allowed once, before the root element",
                token.location,
            );
        }
        self.doctype_seen = true;

        let Some(subset) = internal_subset(token.content.unwrap_or_default()) else {
            return;
        };
        match crate::dtd::internal_subset_entities(subset) {
            Ok(declared) => {
                // Declarations in the internal subset take precedence
                for (name, value) in declared {
                    self.entities.insert(name, value);
                }
            }
            Err(e) => {
                let message = format!("invalid internal DTD subset: {}", e);
                self.fatal(observers, message, token.location);
            }
        }
    }

    fn text(&mut self, observers: &mut [&mut dyn ParseObserver], token: &Token<'_>) {
        let raw = token.content.unwrap_or_default();
        if self.state != ParserState::InElement {
            if raw.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r')) {
                return;
            }
            let message = if self.state == ParserState::AfterRoot {
                "content is not allowed after the root element"
            } else {
                "content is not allowed in the prolog"
            };
            return self.fatal(observers, message, token.location);
        }

        let decoded = match entities::decode(raw, &self.entities) {
            Ok(decoded) => decoded,
            Err(e) => return self.fatal(observers, e.to_string(), token.location),
        };
        let text = entities::normalize_newlines(&decoded).into_owned();
        if let Some(frame) = self.stack.last_mut() {
            frame.whitespace_only &= text.trim().is_empty();
        }
        self.emit(
            observers,
            ParseEvent::CharacterData {
                text,
                location: token.location,
            },
        );
    }

    fn cdata(&mut self, observers: &mut [&mut dyn ParseObserver], token: &Token<'_>) {
        if self.state != ParserState::InElement {
            return self.fatal(
                observers,
                "CDATA section outside of the root element",
                token.location,
            );
        }
        let text = entities::normalize_newlines(token.content.unwrap_or_default()).into_owned();
        if let Some(frame) = self.stack.last_mut() {
            frame.whitespace_only &= text.trim().is_empty();
        }
        self.emit(
            observers,
            ParseEvent::CharacterData {
                text,
                location: token.location,
            },
        );
    }

    fn start_tag<'a, I>(
        &mut self,
        observers: &mut [&mut dyn ParseObserver],
        tag: PendingTag<'a>,
        tokens: &mut Peekable<I>,
    ) where
        I: Iterator<Item = Token<'a>>,
    {
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut seen: HashSet<&'a str> = HashSet::new();
        while let Some(attr) = tokens.next_if(|t| t.kind == TokenKind::Attribute) {
            let name = attr.name.unwrap_or_default();
            if !seen.insert(name) {
                let message = format!("duplicate attribute '{}' on element '{}'", name, tag.name);
                self.error(observers, message, attr.location);
                continue;
            }
            let normalized = entities::normalize_attribute(attr.content.unwrap_or_default());
            match entities::decode(&normalized, &self.entities) {
                Ok(value) => attributes.push(Attribute::new(name, value, attr.location)),
                Err(e) => return self.fatal(observers, e.to_string(), attr.location),
            }
        }

        if self.state == ParserState::AfterRoot {
            let message = format!("extra content at the end of the document: <{}>", tag.name);
            return self.fatal(observers, message, tag.location);
        }
        if self.stack.len() >= self.config.max_depth {
            let message = format!(
                "maximum element nesting depth of {} exceeded at <{}>",
                self.config.max_depth, tag.name
            );
            return self.fatal(observers, message, tag.location);
        }

        if let Some(parent) = self.stack.last_mut() {
            parent.whitespace_only = false;
        }
        self.stack.push(ElementStackFrame {
            name: tag.name.to_string(),
            attributes_seen: attributes.iter().map(|a| a.name.clone()).collect(),
            whitespace_only: true,
        });
        self.state = ParserState::InElement;
        self.emit(
            observers,
            ParseEvent::ElementStart {
                name: tag.name.to_string(),
                attributes,
                location: tag.location,
            },
        );

        if tag.empty {
            self.close_top(observers, tag.location);
        }
    }

    fn end_tag(&mut self, observers: &mut [&mut dyn ParseObserver], name: &str, location: Location) {
        match self.stack.last() {
            None => {
                let message = format!("unexpected closing tag </{}>", name);
                self.fatal(observers, message, location);
            }
            Some(frame) if frame.name != name => {
                let message = format!(
                    "mismatched closing tag: expected </{}>, found </{}>",
                    frame.name, name
                );
                self.fatal(observers, message, location);
            }
            Some(_) => self.close_top(observers, location),
        }
    }

    fn close_top(&mut self, observers: &mut [&mut dyn ParseObserver], location: Location) {
        if let Some(frame) = self.stack.pop() {
            if self.stack.is_empty() {
                self.state = ParserState::AfterRoot;
            }
            self.emit(
                observers,
                ParseEvent::ElementEnd {
                    name: frame.name,
                    location,
                },
            );
        }
    }

    fn finish(&mut self, observers: &mut [&mut dyn ParseObserver], location: Location) {
        if let Some(frame) = self.stack.last() {
            let message = format!(
                "unexpected end of document: element <{}> is not closed",
                frame.name
            );
            return self.fatal(observers, message, location);
        }
        if self.state != ParserState::AfterRoot {
            return self.fatal(observers, "document has no root element", location);
        }
        self.state = ParserState::Done;
        self.emit(observers, ParseEvent::DocumentEnd);
    }
}

/// Tokenizes and parses `bytes` in one call
pub fn parse_document(
    bytes: &[u8],
    config: ParserConfig,
    observers: &mut [&mut dyn ParseObserver],
) -> ParseOutcome {
    EventParser::new(config).parse(Tokenizer::new(bytes), observers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecorder;

    fn parse(input: &str) -> (ParseOutcome, Vec<ParseEvent>) {
        parse_with(input, ParserConfig::default())
    }

    fn parse_with(input: &str, config: ParserConfig) -> (ParseOutcome, Vec<ParseEvent>) {
        let mut recorder = EventRecorder::new();
        let outcome = parse_document(input.as_bytes(), config, &mut [&mut recorder]);
        (outcome, recorder.into_events())
    }

    #[test]
    fn test_well_formed_document() {
        let (outcome, events) = parse("<?xml version=\"1.0\"?>\n<root><a x=\"1\">t</a><b/></root>\n");
        assert!(outcome.well_formed);
        assert!(outcome.open_elements.is_empty());
        assert_eq!(outcome.events_emitted, events.len());
        assert_eq!(events.first(), Some(&ParseEvent::DocumentStart));
        assert_eq!(events.last(), Some(&ParseEvent::DocumentEnd));

        let names: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::ElementStart { name, .. } => Some(format!("+{}", name)),
                ParseEvent::ElementEnd { name, .. } => Some(format!("-{}", name)),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["+root", "+a", "-a", "+b", "-b", "-root"]);
    }

    #[test]
    fn test_mismatched_tag_is_fatal() {
        let (outcome, events) = parse("<a><b></a>");
        assert!(!outcome.well_formed);
        assert_eq!(outcome.open_elements, vec!["a", "b"]);
        let fatal = events.iter().filter(|e| e.is_fatal()).count();
        assert_eq!(fatal, 1);
        assert!(!events.contains(&ParseEvent::DocumentEnd));
        match events.last().unwrap() {
            ParseEvent::FatalError { message, location } => {
                assert!(message.contains("expected </b>, found </a>"));
                assert_eq!(location.column, 7);
            }
            other => panic!("expected fatal error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_attribute_is_recoverable() {
        let (outcome, events) = parse("<a x=\"1\" x=\"2\"/>");
        assert!(outcome.well_formed);
        assert_eq!(outcome.errors, 1);
        let errors: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ParseEvent::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
        let attributes = events
            .iter()
            .find_map(|e| match e {
                ParseEvent::ElementStart { attributes, .. } => Some(attributes.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].value, "1");
        assert_eq!(events.last(), Some(&ParseEvent::DocumentEnd));
    }

    #[test]
    fn test_content_after_root() {
        let (outcome, _) = parse("<a/><b/>");
        assert!(!outcome.well_formed);

        let (outcome, _) = parse("<a/>text");
        assert!(!outcome.well_formed);

        let (outcome, _) = parse("<a/>\n  <!-- trailing -->\n");
        assert!(outcome.well_formed);
    }

    #[test]
    fn test_text_before_root() {
        let (outcome, events) = parse("junk<a/>");
        assert!(!outcome.well_formed);
        assert!(matches!(
            events.last(),
            Some(ParseEvent::FatalError { message, .. }) if message.contains("prolog")
        ));
    }

    #[test]
    fn test_unclosed_element_at_eof() {
        let (outcome, _) = parse("<a><b></b>");
        assert!(!outcome.well_formed);
        assert_eq!(outcome.open_elements, vec!["a"]);
    }

    #[test]
    fn test_empty_document() {
        let (outcome, _) = parse("   ");
        assert!(!outcome.well_formed);
        assert!(outcome.open_elements.is_empty());
    }

    #[test]
    fn test_max_depth() {
        let config = ParserConfig::default().with_max_depth(3);
        let (outcome, _) = parse_with("<a><b><c/></b></a>", config.clone());
        assert!(outcome.well_formed);

        let (outcome, events) = parse_with("<a><b><c><d/></c></b></a>", config);
        assert!(!outcome.well_formed);
        assert_eq!(outcome.open_elements, vec!["a", "b", "c"]);
        assert!(matches!(
            events.last(),
            Some(ParseEvent::FatalError { message, .. }) if message.contains("depth of 3")
        ));
    }

    #[test]
    fn test_entities_are_decoded() {
        let input = "<!DOCTYPE r [<!ENTITY co \"ACME\">]><r a=\"&co; &amp; x\">&lt;&co;&#33;</r>";
        let (outcome, events) = parse(input);
        assert!(outcome.well_formed);
        assert!(events.iter().any(|e| matches!(
            e,
            ParseEvent::ElementStart { attributes, .. } if attributes[0].value == "ACME & x"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ParseEvent::CharacterData { text, .. } if text == "<ACME!"
        )));
    }

    #[test]
    fn test_unknown_entity_is_fatal() {
        let (outcome, events) = parse("<r>&unknown;</r>");
        assert!(!outcome.well_formed);
        assert!(matches!(
            events.last(),
            Some(ParseEvent::FatalError { message, .. }) if message.contains("unknown")
        ));
    }

    #[test]
    fn test_xml_declaration_checks() {
        let (outcome, events) = parse("<?xml version=\"1.1\"?><a/>");
        assert!(outcome.well_formed);
        assert_eq!(outcome.warnings, 1);
        assert!(events.iter().any(|e| matches!(e, ParseEvent::Warning { .. })));

        let (outcome, _) = parse("<?xml version=\"1.0\" encoding=\"ISO-2022-JP\"?><a/>");
        assert!(!outcome.well_formed);

        let (outcome, _) = parse("<?xml version=\"2.0\"?><a/>");
        assert!(!outcome.well_formed);

        let (outcome, events) = parse("<?xml version=\"1.\"?><a/>");
        assert!(!outcome.well_formed);
        assert!(matches!(
            events.last(),
            Some(ParseEvent::FatalError { message, .. }) if message.contains("'1.'")
        ));

        let (outcome, _) = parse("<a/><?xml version=\"1.0\"?>");
        assert!(!outcome.well_formed);
    }

    #[test]
    fn test_attribute_normalization_and_newlines() {
        let (_, events) = parse("<a v=\"x\ty\">l1\r\nl2</a>");
        assert!(events.iter().any(|e| matches!(
            e,
            ParseEvent::ElementStart { attributes, .. } if attributes[0].value == "x y"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ParseEvent::CharacterData { text, .. } if text == "l1\nl2"
        )));
    }

    #[test]
    fn test_observers_receive_identical_streams() {
        let mut first = EventRecorder::new();
        let mut second = EventRecorder::new();
        let outcome = parse_document(
            b"<a><b>x</b></a>",
            ParserConfig::default(),
            &mut [&mut first, &mut second],
        );
        assert_eq!(first.events(), second.events());
        assert_eq!(outcome.events_emitted, first.events().len());
    }

    #[test]
    fn test_tokenizer_fatal_becomes_event() {
        let (outcome, events) = parse("<a><!-- x");
        assert!(!outcome.well_formed);
        assert_eq!(outcome.open_elements, vec!["a"]);
        assert!(events.last().unwrap().is_fatal());
    }
}
