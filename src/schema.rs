//! Compiled schema model
//!
//! A [`SchemaModel`] is produced once per schema source by [`crate::dtd`] or
//! [`crate::xsd`], then shared read-only (`Arc<SchemaModel>`) by every file
//! validated against it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content_model::{DeclId, Particle};
use crate::datatypes::SimpleType;
use crate::entities::EntityMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaKind {
    Dtd,
    Xsd,
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaKind::Dtd => write!(f, "DTD"),
            SchemaKind::Xsd => write!(f, "XSD"),
        }
    }
}

/// Allowed content of an element
#[derive(Debug, Clone, PartialEq)]
pub enum ContentModel {
    Empty,
    Any,
    /// Character data only, checked against a simple type
    TextOnly(SimpleType),
    /// Character data interleaved with children matching the particle
    Mixed(Particle),
    /// Element-only content
    Children(Particle),
}

impl ContentModel {
    pub fn particle(&self) -> Option<&Particle> {
        match self {
            ContentModel::Mixed(particle) | ContentModel::Children(particle) => Some(particle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeUse {
    Required,
    Optional,
    Prohibited,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    pub name: String,
    pub ty: SimpleType,
    pub usage: AttributeUse,
    pub default: Option<String>,
    pub fixed: Option<String>,
}

impl AttributeDecl {
    pub fn new(name: impl Into<String>, ty: SimpleType, usage: AttributeUse) -> Self {
        Self {
            name: name.into(),
            ty,
            usage,
            default: None,
            fixed: None,
        }
    }

    pub fn is_required(&self) -> bool {
        self.usage == AttributeUse::Required
    }
}

/// Content and attributes shared by every element of one type
#[derive(Debug, Clone, PartialEq)]
pub struct ElementType {
    pub name: Option<String>,
    pub content: ContentModel,
    pub attributes: Vec<AttributeDecl>,
    /// `xs:anyAttribute` (or `xs:anyType`): undeclared attributes are accepted
    pub open_attributes: bool,
}

impl ElementType {
    pub fn new(content: ContentModel) -> Self {
        Self {
            name: None,
            content,
            attributes: Vec::new(),
            open_attributes: false,
        }
    }

    /// The `xs:anyType` ur-type
    pub fn any() -> Self {
        Self {
            name: Some("anyType".to_string()),
            content: ContentModel::Any,
            attributes: Vec::new(),
            open_attributes: true,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

pub type TypeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    pub name: String,
    pub type_id: TypeId,
    /// Declared at the top level of the schema (always true for DTDs)
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaModel {
    kind: SchemaKind,
    root: Option<String>,
    elements: Vec<ElementDecl>,
    types: Vec<ElementType>,
    globals: HashMap<String, DeclId>,
    entities: EntityMap,
}

impl SchemaModel {
    pub(crate) fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            root: None,
            elements: Vec::new(),
            types: Vec::new(),
            globals: HashMap::new(),
            entities: EntityMap::new(),
        }
    }

    pub(crate) fn set_root(&mut self, root: impl Into<String>) {
        self.root = Some(root.into());
    }

    pub(crate) fn set_entities(&mut self, entities: EntityMap) {
        self.entities = entities;
    }

    pub(crate) fn add_type(&mut self, ty: ElementType) -> TypeId {
        self.types.push(ty);
        self.types.len() - 1
    }

    pub(crate) fn type_mut(&mut self, id: TypeId) -> &mut ElementType {
        &mut self.types[id]
    }

    /// Adds an element declaration; global ones become reachable by name
    pub(crate) fn add_element(&mut self, name: impl Into<String>, type_id: TypeId, global: bool) -> DeclId {
        let name = name.into();
        let id = self.elements.len();
        if global {
            self.globals.entry(name.clone()).or_insert(id);
        }
        self.elements.push(ElementDecl {
            name,
            type_id,
            global,
        });
        id
    }

    pub(crate) fn set_element_type(&mut self, id: DeclId, type_id: TypeId) {
        self.elements[id].type_id = type_id;
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// Root element name declared for a DTD run
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// General entities declared by the schema (DTD only)
    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    pub fn element(&self, id: DeclId) -> &ElementDecl {
        &self.elements[id]
    }

    pub fn element_type(&self, id: DeclId) -> &ElementType {
        &self.types[self.elements[id].type_id]
    }

    pub fn type_by_id(&self, id: TypeId) -> &ElementType {
        &self.types[id]
    }

    /// Top-level declaration named `name`
    pub fn global(&self, name: &str) -> Option<DeclId> {
        self.globals.get(name).copied()
    }

    /// The global declaration of `name` or, failing that, the first local
    /// declaration with that name
    pub fn lookup(&self, name: &str) -> Option<DeclId> {
        self.global(name)
            .or_else(|| self.elements.iter().position(|e| e.name == name))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Attribute declaration for `attribute` on element `element`
    pub fn attribute(&self, element: &str, attribute: &str) -> Option<&AttributeDecl> {
        self.lookup(element)
            .and_then(|id| self.element_type(id).attribute(attribute))
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn global_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.globals.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{Builtin, SimpleType};

    fn sample() -> SchemaModel {
        let mut model = SchemaModel::new(SchemaKind::Xsd);
        let leaf = model.add_type(ElementType::new(ContentModel::TextOnly(SimpleType::builtin(
            Builtin::String,
        ))));
        let mut root_type = ElementType::new(ContentModel::Children(Particle::element("title", 1)));
        root_type.attributes.push(AttributeDecl::new(
            "id",
            SimpleType::builtin(Builtin::Id),
            AttributeUse::Required,
        ));
        let root_type = model.add_type(root_type);
        model.add_element("book", root_type, true);
        model.add_element("title", leaf, false);
        model
    }

    #[test]
    fn test_lookup_prefers_globals() {
        let model = sample();
        assert_eq!(model.global("book"), Some(0));
        assert_eq!(model.global("title"), None);
        assert_eq!(model.lookup("title"), Some(1));
        assert!(!model.is_declared("chapter"));
        assert_eq!(model.global_names(), vec!["book"]);
    }

    #[test]
    fn test_attribute_lookup() {
        let model = sample();
        let id = model.attribute("book", "id").unwrap();
        assert!(id.is_required());
        assert!(id.ty.is_id());
        assert!(model.attribute("book", "lang").is_none());
        assert!(model.attribute("title", "id").is_none());
    }

    #[test]
    fn test_content_model_particle() {
        let model = sample();
        assert!(model.element_type(0).content.particle().is_some());
        assert!(model.element_type(1).content.particle().is_none());
        assert_eq!(model.kind(), SchemaKind::Xsd);
        assert_eq!(model.root(), None);
    }
}
