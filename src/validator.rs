//! Schema validator
//!
//! [`Validator`] is a [`ParseObserver`]: it sees the same event stream as any
//! other observer and checks each element against the compiled
//! [`SchemaModel`]:
//!
//! - **Elements**: every element must be declared; each child advances the
//!   parent's content-model expectation and must be permitted there
//! - **Attributes**: declared, well-typed, fixed values honoured, required
//!   ones present
//! - **Text**: rejected in element-only and empty content, checked against
//!   the simple type of text-only content
//! - **Identity**: ID values are unique and IDREFs resolve
//!
//! Without a schema only the parser's own diagnostics are recorded.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::content_model::{DeclId, Matched, Particle};
use crate::diagnostics::{Severity, Violation, ViolationKind};
use crate::events::{Attribute, ParseEvent, ParseObserver};
use crate::schema::{AttributeUse, ContentModel, SchemaKind, SchemaModel};
use crate::tokenizer::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMode {
    None,
    Dtd,
    Xsd,
}

/// Expectation for one open element
#[derive(Debug)]
struct Frame {
    name: String,
    /// `None` for subtrees that are not validated
    decl: Option<DeclId>,
    /// Remaining grammar for element or mixed content
    expect: Option<Particle>,
    /// Set after the first content violation; the frame stops checking
    broken: bool,
    text: String,
    location: Location,
}

impl Frame {
    fn skipped(name: &str, location: Location) -> Self {
        Self {
            name: name.to_string(),
            decl: None,
            expect: None,
            broken: true,
            text: String::new(),
            location,
        }
    }
}

/// Per-file validation state
#[derive(Debug)]
pub struct ValidationContext {
    mode: ValidationMode,
    schema: Option<Arc<SchemaModel>>,
    frames: Vec<Frame>,
    violations: Vec<Violation>,
    ids: HashSet<String>,
    idrefs: Vec<(String, Location)>,
    seen_root: bool,
}

impl ValidationContext {
    pub fn new(schema: Option<Arc<SchemaModel>>) -> Self {
        let mode = match schema.as_deref().map(SchemaModel::kind) {
            None => ValidationMode::None,
            Some(SchemaKind::Dtd) => ValidationMode::Dtd,
            Some(SchemaKind::Xsd) => ValidationMode::Xsd,
        };
        Self {
            mode,
            schema,
            frames: Vec::new(),
            violations: Vec::new(),
            ids: HashSet::new(),
            idrefs: Vec::new(),
            seen_root: false,
        }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn schema(&self) -> Option<&Arc<SchemaModel>> {
        self.schema.as_ref()
    }

    /// Names of the currently open elements, outermost first
    pub fn path(&self) -> Vec<&str> {
        self.frames.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn record(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    fn error(&mut self, kind: ViolationKind, location: Location, message: String) {
        self.violations.push(Violation::error(kind, location, message));
    }

    /// Name used for schema lookups: XSD declarations are matched by local
    /// name, DTD declarations by the full qualified name.
    fn schema_name<'n>(&self, name: &'n str) -> &'n str {
        match self.mode {
            ValidationMode::Xsd => name.rsplit(':').next().unwrap_or(name),
            _ => name,
        }
    }

    fn element_start(&mut self, name: &str, attributes: &[Attribute], location: Location) {
        let Some(schema) = self.schema.clone() else {
            return;
        };
        let local = self.schema_name(name);

        let decl = if self.frames.is_empty() {
            self.root_declaration(&schema, name, local, location)
        } else {
            self.child_declaration(&schema, name, local, location)
        };

        let Some(decl) = decl else {
            self.frames.push(Frame::skipped(name, location));
            return;
        };

        self.check_attributes(&schema, decl, name, attributes, location);

        let expect = schema.element_type(decl).content.particle().cloned();
        self.frames.push(Frame {
            name: name.to_string(),
            decl: Some(decl),
            expect,
            broken: false,
            text: String::new(),
            location,
        });
    }

    fn root_declaration(
        &mut self,
        schema: &SchemaModel,
        name: &str,
        local: &str,
        location: Location,
    ) -> Option<DeclId> {
        if self.seen_root {
            return None;
        }
        self.seen_root = true;

        if self.mode == ValidationMode::Dtd {
            if let Some(root) = schema.root() {
                if root != name {
                    self.error(
                        ViolationKind::ContentModelMismatch,
                        location,
                        format!("root element '{}' does not match the declared root '{}'", name, root),
                    );
                }
            }
        }

        let decl = match self.mode {
            ValidationMode::Xsd => schema.global(local),
            _ => schema.lookup(local),
        };
        if decl.is_none() {
            let message = match self.mode {
                ValidationMode::Xsd => format!("no global declaration for element '{}'", name),
                _ => format!("element '{}' is not declared", name),
            };
            self.error(ViolationKind::UndeclaredElement, location, message);
        }
        decl
    }

    /// Advances the parent's expectation past `name` and returns the child's
    /// declaration, or `None` when the child's subtree is not validated.
    fn child_declaration(
        &mut self,
        schema: &SchemaModel,
        name: &str,
        local: &str,
        location: Location,
    ) -> Option<DeclId> {
        let mode = self.mode;
        let parent = self.frames.last_mut()?;
        let parent_decl = parent.decl?;
        let parent_type = schema.element_type(parent_decl);

        let mut mismatch = None;
        let decl = match &parent_type.content {
            _ if parent.broken => schema.lookup(local),
            ContentModel::Children(_) | ContentModel::Mixed(_) => {
                let expect = parent.expect.take().unwrap_or(Particle::NotAllowed);
                let (next, matched) = expect.derive(local);
                match matched {
                    Some(Matched::Element(decl)) => {
                        parent.expect = Some(next);
                        Some(decl)
                    }
                    Some(Matched::Wildcard) => {
                        parent.expect = Some(next);
                        match schema.global(local) {
                            Some(decl) => Some(decl),
                            // lax wildcard: unknown elements are accepted unchecked
                            None => return None,
                        }
                    }
                    None => {
                        let expected = expect.expected();
                        parent.expect = Some(expect);
                        if schema.is_declared(local) {
                            mismatch = Some(if expected.is_empty() {
                                format!("element '{}' is not allowed in '{}' here: no more children are expected", name, parent.name)
                            } else {
                                format!(
                                    "element '{}' is not allowed in '{}' here: expected {}",
                                    name,
                                    parent.name,
                                    expected.join(" | ")
                                )
                            });
                        }
                        schema.lookup(local)
                    }
                }
            }
            ContentModel::Any => match mode {
                ValidationMode::Xsd => match schema.global(local) {
                    Some(decl) => Some(decl),
                    None => return None,
                },
                _ => schema.lookup(local),
            },
            ContentModel::Empty | ContentModel::TextOnly(_) => {
                mismatch = Some(format!(
                    "element '{}' is not allowed in '{}': it may not contain child elements",
                    name, parent.name
                ));
                schema.lookup(local)
            }
        };

        if decl.is_none() {
            parent.broken = true;
            self.error(
                ViolationKind::UndeclaredElement,
                location,
                format!("element '{}' is not declared", name),
            );
        } else if let Some(message) = mismatch {
            parent.broken = true;
            self.error(ViolationKind::ContentModelMismatch, location, message);
        }
        decl
    }

    fn check_attributes(
        &mut self,
        schema: &SchemaModel,
        decl: DeclId,
        element: &str,
        attributes: &[Attribute],
        location: Location,
    ) {
        let ty = schema.element_type(decl);
        let mut present = Vec::with_capacity(attributes.len());

        for attr in attributes {
            if is_reserved_attribute(&attr.name) {
                continue;
            }
            let name = self.schema_name(&attr.name);
            present.push(name);

            let declared = ty
                .attribute(name)
                .filter(|a| a.usage != AttributeUse::Prohibited);
            let Some(declared) = declared else {
                if !ty.open_attributes {
                    self.error(
                        ViolationKind::UndeclaredAttribute,
                        attr.location,
                        format!("attribute '{}' is not declared for element '{}'", attr.name, element),
                    );
                }
                continue;
            };

            let normalized = match declared.ty.validate(&attr.value) {
                Ok(normalized) => normalized,
                Err(reason) => {
                    self.error(
                        ViolationKind::AttributeTypeMismatch,
                        attr.location,
                        format!(
                            "attribute '{}' of element '{}' is not a valid {}: {}",
                            attr.name,
                            element,
                            declared.ty.describe(),
                            reason
                        ),
                    );
                    continue;
                }
            };

            if let Some(fixed) = &declared.fixed {
                let expected = declared.ty.validate(fixed).unwrap_or_else(|_| fixed.clone());
                if normalized != expected {
                    self.error(
                        ViolationKind::AttributeTypeMismatch,
                        attr.location,
                        format!(
                            "attribute '{}' of element '{}' must have the fixed value '{}'",
                            attr.name, element, fixed
                        ),
                    );
                    continue;
                }
            }

            if declared.ty.is_id() {
                if !self.ids.insert(normalized.clone()) {
                    self.error(
                        ViolationKind::AttributeTypeMismatch,
                        attr.location,
                        format!("ID value '{}' is already used", normalized),
                    );
                }
            } else if declared.ty.is_idref() {
                for reference in normalized.split(' ').filter(|s| !s.is_empty()) {
                    self.idrefs.push((reference.to_string(), attr.location));
                }
            }
        }

        for required in ty.attributes.iter().filter(|a| a.is_required()) {
            if !present.contains(&required.name.as_str()) {
                self.error(
                    ViolationKind::MissingRequiredAttribute,
                    location,
                    format!(
                        "element '{}' is missing required attribute '{}'",
                        element, required.name
                    ),
                );
            }
        }
    }

    fn character_data(&mut self, text: &str, location: Location) {
        let Some(schema) = self.schema.clone() else {
            return;
        };
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let Some(decl) = frame.decl else {
            return;
        };
        if frame.broken {
            return;
        }

        let whitespace_only = text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
        let message = match &schema.element_type(decl).content {
            ContentModel::TextOnly(_) => {
                frame.text.push_str(text);
                None
            }
            ContentModel::Empty => Some(format!(
                "element '{}' is declared EMPTY but contains character data",
                frame.name
            )),
            ContentModel::Children(_) if !whitespace_only => Some(format!(
                "element '{}' has element-only content but contains character data",
                frame.name
            )),
            _ => None,
        };

        if let Some(message) = message {
            frame.broken = true;
            self.error(ViolationKind::ContentModelMismatch, location, message);
        }
    }

    fn element_end(&mut self, location: Location) {
        let Some(schema) = self.schema.clone() else {
            return;
        };
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let Some(decl) = frame.decl else {
            return;
        };
        if frame.broken {
            return;
        }

        match &schema.element_type(decl).content {
            ContentModel::TextOnly(ty) => {
                if let Err(reason) = ty.validate(&frame.text) {
                    self.error(
                        ViolationKind::ContentModelMismatch,
                        frame.location,
                        format!(
                            "content of element '{}' is not a valid {}: {}",
                            frame.name,
                            ty.describe(),
                            reason
                        ),
                    );
                }
            }
            ContentModel::Children(_) | ContentModel::Mixed(_) => {
                if let Some(expect) = &frame.expect {
                    if !expect.nullable() {
                        self.error(
                            ViolationKind::ContentModelMismatch,
                            location,
                            format!(
                                "element '{}' is incomplete: expected {}",
                                frame.name,
                                expect.expected().join(" | ")
                            ),
                        );
                    }
                }
            }
            ContentModel::Empty | ContentModel::Any => {}
        }
    }

    fn document_end(&mut self) {
        let unresolved: Vec<(String, Location)> = self
            .idrefs
            .drain(..)
            .filter(|(reference, _)| !self.ids.contains(reference))
            .collect();
        for (reference, location) in unresolved {
            self.error(
                ViolationKind::AttributeTypeMismatch,
                location,
                format!("IDREF '{}' does not match any ID in the document", reference),
            );
        }
    }
}

/// Namespace declarations and `xml:`/`xsi:` attributes are always permitted
fn is_reserved_attribute(name: &str) -> bool {
    name == "xmlns"
        || name.starts_with("xmlns:")
        || name.starts_with("xml:")
        || name.starts_with("xsi:")
}

/// Event observer that validates one document
#[derive(Debug)]
pub struct Validator {
    context: ValidationContext,
}

impl Validator {
    pub fn new(schema: Option<Arc<SchemaModel>>) -> Self {
        Self {
            context: ValidationContext::new(schema),
        }
    }

    pub fn context(&self) -> &ValidationContext {
        &self.context
    }

    pub fn violations(&self) -> &[Violation] {
        self.context.violations()
    }

    /// Appends a violation found outside the event stream
    pub fn record(&mut self, violation: Violation) {
        self.context.record(violation);
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.context.into_violations()
    }
}

impl ParseObserver for Validator {
    fn on_event(&mut self, event: &ParseEvent) {
        let context = &mut self.context;
        match event {
            ParseEvent::DocumentStart => {}
            ParseEvent::DocumentEnd => context.document_end(),
            ParseEvent::ElementStart {
                name,
                attributes,
                location,
            } => context.element_start(name, attributes, *location),
            ParseEvent::ElementEnd { location, .. } => context.element_end(*location),
            ParseEvent::CharacterData { text, location } => context.character_data(text, *location),
            ParseEvent::Warning { message, location } => context.record(Violation::new(
                ViolationKind::WellFormednessError,
                Severity::Warning,
                *location,
                message.clone(),
            )),
            ParseEvent::Error { message, location } => context.record(Violation::new(
                ViolationKind::WellFormednessError,
                Severity::Error,
                *location,
                message.clone(),
            )),
            ParseEvent::FatalError { message, location } => context.record(Violation::new(
                ViolationKind::WellFormednessError,
                Severity::Fatal,
                *location,
                message.clone(),
            )),
        }
    }
}

/// Validates a recorded event stream
pub fn validate<'e>(
    events: impl IntoIterator<Item = &'e ParseEvent>,
    schema: Option<Arc<SchemaModel>>,
) -> Vec<Violation> {
    let mut validator = Validator::new(schema);
    for event in events {
        validator.on_event(event);
    }
    validator.into_violations()
}
