//! W3C XML Schema compiler
//!
//! The schema document is read with the crate's own [`EventParser`]; a
//! [`TreeBuilder`] observer turns the event stream into a small element tree
//! which is then compiled into a [`SchemaModel`].
//!
//! Supported:
//!
//! - **Declarations**: global and local `element` (by `type`, inline type or
//!   `ref`), `attribute`, `group`, `attributeGroup`, `any`, `anyAttribute`
//! - **Complex types**: `sequence`, `choice`, `all`, `mixed`, `simpleContent`
//!   extension and restriction, `complexContent` extension and restriction
//! - **Simple types**: restriction facets, `list`, `union`
//!
//! Namespaces are matched by local name: the schema's `targetNamespace` is
//! not compared against instance documents.

use std::collections::{HashMap, HashSet};

use crate::content_model::Particle;
use crate::datatypes::{Builtin, Facets, Pattern, SimpleType, WhiteSpace};
use crate::error::{CompileResult, SchemaCompilationError};
use crate::events::{ParseEvent, ParseObserver};
use crate::parser::{parse_document, ParserConfig};
use crate::schema::{
    AttributeDecl, AttributeUse, ContentModel, ElementType, SchemaKind, SchemaModel, TypeId,
};
use crate::tokenizer::Location;

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Nesting limit for named group and attribute group references
const MAX_REFERENCE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
struct XsdNode {
    prefix: Option<String>,
    local: String,
    attributes: Vec<(String, String)>,
    children: Vec<XsdNode>,
    location: Location,
}

impl XsdNode {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Collects parse events into an element tree, keeping the first error
#[derive(Debug, Default)]
struct TreeBuilder {
    stack: Vec<XsdNode>,
    root: Option<XsdNode>,
    error: Option<(String, Location)>,
}

impl ParseObserver for TreeBuilder {
    fn on_event(&mut self, event: &ParseEvent) {
        match event {
            ParseEvent::ElementStart {
                name,
                attributes,
                location,
            } => {
                let (prefix, local) = split_qname(name);
                self.stack.push(XsdNode {
                    prefix: prefix.map(str::to_string),
                    local: local.to_string(),
                    attributes: attributes
                        .iter()
                        .map(|a| (a.name.clone(), a.value.clone()))
                        .collect(),
                    children: Vec::new(),
                    location: *location,
                });
            }
            ParseEvent::ElementEnd { .. } => {
                if let Some(node) = self.stack.pop() {
                    match self.stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => self.root = Some(node),
                    }
                }
            }
            ParseEvent::Error { message, location }
            | ParseEvent::FatalError { message, location } => {
                if self.error.is_none() {
                    self.error = Some((message.clone(), *location));
                }
            }
            _ => {}
        }
    }
}

enum TypeRef {
    Complex(TypeId),
    Simple(SimpleType),
}

struct XsdCompiler<'d> {
    /// Prefix bound to the XML Schema namespace ("" for the default namespace)
    xs: String,
    elements: HashMap<&'d str, &'d XsdNode>,
    complex_types: HashMap<&'d str, &'d XsdNode>,
    simple_types: HashMap<&'d str, &'d XsdNode>,
    groups: HashMap<&'d str, &'d XsdNode>,
    attribute_groups: HashMap<&'d str, &'d XsdNode>,
    attributes: HashMap<&'d str, &'d XsdNode>,
    model: SchemaModel,
    complex_ids: HashMap<String, TypeId>,
    complex_in_progress: HashSet<String>,
    simple_cache: HashMap<String, SimpleType>,
    simple_in_progress: HashSet<String>,
    any_type: Option<TypeId>,
    /// Names of the element declarations being compiled, innermost last
    owners: Vec<String>,
    reference_depth: usize,
}

impl<'d> XsdCompiler<'d> {
    fn new(root: &'d XsdNode, xs: String) -> CompileResult<Self> {
        let mut compiler = Self {
            xs,
            elements: HashMap::new(),
            complex_types: HashMap::new(),
            simple_types: HashMap::new(),
            groups: HashMap::new(),
            attribute_groups: HashMap::new(),
            attributes: HashMap::new(),
            model: SchemaModel::new(SchemaKind::Xsd),
            complex_ids: HashMap::new(),
            complex_in_progress: HashSet::new(),
            simple_cache: HashMap::new(),
            simple_in_progress: HashSet::new(),
            any_type: None,
            owners: Vec::new(),
            reference_depth: 0,
        };

        for child in compiler.xs_children(root) {
            let component = child.local.as_str();
            if matches!(component, "annotation" | "import" | "notation") {
                continue;
            }
            if matches!(component, "include" | "redefine" | "override") {
                return Err(unsupported(child, component));
            }
            let name = child
                .attr("name")
                .ok_or_else(|| malformed(child, format!("top-level {} has no name", component)))?;
            let table = match component {
                "element" => &mut compiler.elements,
                "complexType" => &mut compiler.complex_types,
                "simpleType" => &mut compiler.simple_types,
                "group" => &mut compiler.groups,
                "attributeGroup" => &mut compiler.attribute_groups,
                "attribute" => &mut compiler.attributes,
                other => return Err(unsupported(child, other)),
            };
            if table.insert(name, child).is_some() {
                return Err(match component {
                    "element" => SchemaCompilationError::DuplicateElement {
                        name: name.to_string(),
                    },
                    _ => SchemaCompilationError::InvalidValue {
                        details: format!("{} '{}' is defined more than once", component, name),
                    },
                });
            }
        }
        Ok(compiler)
    }

    /// Schema-namespace children of `node`, without annotations
    fn xs_children<'n>(&self, node: &'n XsdNode) -> impl Iterator<Item = &'n XsdNode> + use<'n> {
        let xs = self.xs.clone();
        node.children.iter().filter(move |c| {
            c.prefix.as_deref().unwrap_or("") == xs && c.local != "annotation"
        })
    }

    fn compile(mut self, root: &'d XsdNode) -> CompileResult<SchemaModel> {
        // Global declarations are allocated first so references and recursive
        // content models can point at them before their types exist.
        let globals: Vec<&'d XsdNode> = self
            .xs_children(root)
            .filter(|c| c.local == "element")
            .collect();
        let placeholder = self.any_type_id();
        let mut ids = Vec::with_capacity(globals.len());
        for node in &globals {
            let name = node.attr("name").unwrap_or_default();
            ids.push(self.model.add_element(name, placeholder, true));
        }
        for (node, id) in globals.into_iter().zip(ids) {
            let name = node.attr("name").unwrap_or_default().to_string();
            self.owners.push(name);
            let type_id = self.element_type(node)?;
            self.owners.pop();
            self.model.set_element_type(id, type_id);
        }

        // Named types nobody references are still checked
        let complex: Vec<&str> = self.complex_types.keys().copied().collect();
        for name in complex {
            self.named_complex(name)?;
        }
        let simple: Vec<&str> = self.simple_types.keys().copied().collect();
        for name in simple {
            self.named_simple(name)?;
        }
        Ok(self.model)
    }

    fn any_type_id(&mut self) -> TypeId {
        match self.any_type {
            Some(id) => id,
            None => {
                let id = self.model.add_type(ElementType::any());
                self.any_type = Some(id);
                id
            }
        }
    }

    fn resolve_type(&mut self, qname: &str) -> CompileResult<TypeRef> {
        let (prefix, local) = split_qname(qname);
        if prefix.unwrap_or("") == self.xs {
            if local == "anyType" {
                return Ok(TypeRef::Complex(self.any_type_id()));
            }
            if let Some(builtin) = Builtin::from_name(local) {
                return Ok(TypeRef::Simple(SimpleType::builtin(builtin)));
            }
            if !self.xs.is_empty() {
                return Err(undefined(qname));
            }
        }
        if self.complex_types.contains_key(local) {
            return Ok(TypeRef::Complex(self.named_complex(local)?));
        }
        if self.simple_types.contains_key(local) {
            return Ok(TypeRef::Simple(self.named_simple(local)?));
        }
        Err(undefined(qname))
    }

    fn resolve_simple(&mut self, qname: &str) -> CompileResult<SimpleType> {
        match self.resolve_type(qname)? {
            TypeRef::Simple(ty) => Ok(ty),
            TypeRef::Complex(_) => Err(SchemaCompilationError::InvalidValue {
                details: format!("'{}' is a complex type where a simple type is required", qname),
            }),
        }
    }

    /// Type of an `xs:element` declaration
    fn element_type(&mut self, node: &'d XsdNode) -> CompileResult<TypeId> {
        if let Some(qname) = node.attr("type") {
            return match self.resolve_type(qname)? {
                TypeRef::Complex(id) => Ok(id),
                TypeRef::Simple(ty) => {
                    Ok(self.model.add_type(ElementType::new(ContentModel::TextOnly(ty))))
                }
            };
        }
        let inline = self
            .xs_children(node)
            .find(|c| c.local == "complexType" || c.local == "simpleType");
        match inline {
            Some(child) if child.local == "complexType" => {
                let ty = self.complex_type(child)?;
                Ok(self.model.add_type(ty))
            }
            Some(child) => {
                let ty = self.simple_type(child)?;
                Ok(self.model.add_type(ElementType::new(ContentModel::TextOnly(ty))))
            }
            None => Ok(self.any_type_id()),
        }
    }

    /// Named complex types get their id before their content is compiled, so
    /// recursive element structures terminate.
    fn named_complex(&mut self, name: &str) -> CompileResult<TypeId> {
        if let Some(id) = self.complex_ids.get(name) {
            return Ok(*id);
        }
        let node = *self.complex_types.get(name).ok_or_else(|| undefined(name))?;
        let id = self.model.add_type(ElementType::any());
        self.complex_ids.insert(name.to_string(), id);
        self.complex_in_progress.insert(name.to_string());
        let mut ty = self.complex_type(node)?;
        self.complex_in_progress.remove(name);
        ty.name = Some(name.to_string());
        *self.model.type_mut(id) = ty;
        Ok(id)
    }

    /// A fully compiled base type for derivation
    fn derivation_base(&mut self, node: &XsdNode, qname: &str) -> CompileResult<TypeRef> {
        let (_, local) = split_qname(qname);
        if self.complex_in_progress.contains(local) {
            return Err(malformed(node, format!("circular derivation of type '{}'", local)));
        }
        self.resolve_type(qname)
    }

    fn complex_type(&mut self, node: &'d XsdNode) -> CompileResult<ElementType> {
        let mixed = is_true(node.attr("mixed"));
        let mut particle = None;
        let mut ty = ElementType::new(ContentModel::Empty);
        for child in self.xs_children(node) {
            match child.local.as_str() {
                "sequence" | "choice" | "all" | "group" => {
                    particle = Some(self.particle(child)?);
                }
                "simpleContent" => return self.simple_content(child),
                "complexContent" => return self.complex_content(child, mixed),
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    self.attribute_use(child, &mut ty)?;
                }
                other => return Err(unsupported(child, other)),
            }
        }
        ty.content = content_model(particle, mixed);
        Ok(ty)
    }

    fn simple_content(&mut self, node: &'d XsdNode) -> CompileResult<ElementType> {
        let derivation = self
            .xs_children(node)
            .next()
            .ok_or_else(|| malformed(node, "simpleContent has no derivation"))?;
        let base = derivation
            .attr("base")
            .ok_or_else(|| malformed(derivation, "derivation has no base"))?;

        let mut ty = match self.derivation_base(derivation, base)? {
            TypeRef::Simple(simple) => ElementType::new(ContentModel::TextOnly(simple)),
            TypeRef::Complex(id) => {
                let base_type = self.model.type_by_id(id).clone();
                if !matches!(base_type.content, ContentModel::TextOnly(_)) {
                    return Err(SchemaCompilationError::InvalidValue {
                        details: format!("simpleContent base '{}' does not have simple content", base),
                    });
                }
                base_type
            }
        };
        ty.name = None;

        if derivation.local == "restriction" {
            if let ContentModel::TextOnly(simple) = &ty.content {
                let facets = self.facets(derivation, simple)?;
                let restricted = SimpleType::restrict(simple, facets)
                    .map_err(|details| SchemaCompilationError::InvalidValue { details })?;
                ty.content = ContentModel::TextOnly(restricted);
            }
        } else if derivation.local != "extension" {
            return Err(unsupported(derivation, &derivation.local));
        }

        for child in self.xs_children(derivation) {
            if matches!(child.local.as_str(), "attribute" | "attributeGroup" | "anyAttribute") {
                self.attribute_use(child, &mut ty)?;
            }
        }
        Ok(ty)
    }

    fn complex_content(&mut self, node: &'d XsdNode, mixed: bool) -> CompileResult<ElementType> {
        let mixed = node.attr("mixed").map_or(mixed, |v| is_true(Some(v)));
        let derivation = self
            .xs_children(node)
            .next()
            .ok_or_else(|| malformed(node, "complexContent has no derivation"))?;
        let base = derivation
            .attr("base")
            .ok_or_else(|| malformed(derivation, "derivation has no base"))?;
        let base_type = match self.derivation_base(derivation, base)? {
            TypeRef::Complex(id) => self.model.type_by_id(id).clone(),
            TypeRef::Simple(_) => {
                return Err(SchemaCompilationError::InvalidValue {
                    details: format!("complexContent base '{}' is a simple type", base),
                });
            }
        };

        let mut own = None;
        let mut ty = ElementType::new(ContentModel::Empty);
        ty.attributes = base_type.attributes.clone();
        // A restriction keeps the attribute wildcard only by redeclaring it
        ty.open_attributes = derivation.local == "extension" && base_type.open_attributes;
        for child in self.xs_children(derivation) {
            match child.local.as_str() {
                "sequence" | "choice" | "all" | "group" => own = Some(self.particle(child)?),
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    self.attribute_use(child, &mut ty)?;
                }
                other => return Err(unsupported(child, other)),
            }
        }

        match derivation.local.as_str() {
            "extension" => {
                let (inherited, base_mixed) = match base_type.content {
                    ContentModel::Empty => (None, false),
                    ContentModel::Children(p) => (Some(p), false),
                    ContentModel::Mixed(p) => (Some(p), true),
                    ContentModel::Any => (Some(Particle::repeat(Particle::Any, 0, None)), true),
                    ContentModel::TextOnly(simple) if own.is_none() => {
                        ty.content = ContentModel::TextOnly(simple);
                        return Ok(ty);
                    }
                    ContentModel::TextOnly(_) => {
                        return Err(SchemaCompilationError::InvalidValue {
                            details: format!("cannot add element content to simple type '{}'", base),
                        });
                    }
                };
                let particle = match (inherited, own) {
                    (Some(first), Some(rest)) => Some(Particle::group(first, rest)),
                    (first, rest) => first.or(rest),
                };
                ty.content = content_model(particle, mixed || base_mixed);
            }
            "restriction" => ty.content = content_model(own, mixed),
            other => return Err(unsupported(derivation, other)),
        }
        Ok(ty)
    }

    fn particle(&mut self, node: &'d XsdNode) -> CompileResult<Particle> {
        let (min, max) = occurs(node)?;
        let inner = match node.local.as_str() {
            "element" => self.element_particle(node)?,
            "sequence" => {
                let items = self.particles(node)?;
                Particle::sequence(items)
            }
            "choice" => {
                let items = self.particles(node)?;
                Particle::choice(items)
            }
            "all" => {
                let items = self.particles(node)?;
                if items.iter().any(|p| matches!(p, Particle::Repeat { max: None, .. })) {
                    return Err(SchemaCompilationError::InvalidValue {
                        details: "members of xs:all may occur at most once".to_string(),
                    });
                }
                Particle::All(items)
            }
            "group" => self.group_reference(node)?,
            "any" => Particle::Any,
            other => return Err(unsupported(node, other)),
        };
        Ok(Particle::repeat(inner, min, max))
    }

    fn particles(&mut self, node: &'d XsdNode) -> CompileResult<Vec<Particle>> {
        let children: Vec<&'d XsdNode> = self.xs_children(node).collect();
        children.into_iter().map(|c| self.particle(c)).collect()
    }

    fn element_particle(&mut self, node: &'d XsdNode) -> CompileResult<Particle> {
        if let Some(reference) = node.attr("ref") {
            let (_, local) = split_qname(reference);
            let decl = self.model.global(local).ok_or_else(|| {
                SchemaCompilationError::UndeclaredElement {
                    name: local.to_string(),
                    parent: self.owners.last().cloned().unwrap_or_default(),
                }
            })?;
            return Ok(Particle::element(local, decl));
        }
        let name = node
            .attr("name")
            .ok_or_else(|| malformed(node, "local element has neither name nor ref"))?;
        self.owners.push(name.to_string());
        let type_id = self.element_type(node);
        self.owners.pop();
        let decl = self.model.add_element(name, type_id?, false);
        Ok(Particle::element(name, decl))
    }

    fn group_reference(&mut self, node: &'d XsdNode) -> CompileResult<Particle> {
        let reference = node
            .attr("ref")
            .ok_or_else(|| malformed(node, "group reference has no ref"))?;
        let (_, local) = split_qname(reference);
        let group = *self
            .groups
            .get(local)
            .ok_or_else(|| undefined(reference))?;
        if self.reference_depth >= MAX_REFERENCE_DEPTH {
            return Err(malformed(node, format!("group '{}' refers to itself", local)));
        }
        self.reference_depth += 1;
        let body = self.xs_children(group).next();
        let result = match body {
            Some(body) => self.particle(body),
            None => Ok(Particle::Empty),
        };
        self.reference_depth -= 1;
        result
    }

    /// Adds an attribute, attribute group or wildcard to `ty`
    fn attribute_use(&mut self, node: &'d XsdNode, ty: &mut ElementType) -> CompileResult<()> {
        match node.local.as_str() {
            "anyAttribute" => {
                ty.open_attributes = true;
                Ok(())
            }
            "attributeGroup" => {
                let reference = node
                    .attr("ref")
                    .ok_or_else(|| malformed(node, "attributeGroup reference has no ref"))?;
                let (_, local) = split_qname(reference);
                let group = *self
                    .attribute_groups
                    .get(local)
                    .ok_or_else(|| undefined(reference))?;
                if self.reference_depth >= MAX_REFERENCE_DEPTH {
                    return Err(malformed(node, format!("attributeGroup '{}' refers to itself", local)));
                }
                self.reference_depth += 1;
                let members: Vec<&'d XsdNode> = self.xs_children(group).collect();
                let result = members
                    .into_iter()
                    .try_for_each(|member| self.attribute_use(member, ty));
                self.reference_depth -= 1;
                result
            }
            _ => {
                let decl = self.attribute_decl(node)?;
                ty.attributes.retain(|a| a.name != decl.name);
                ty.attributes.push(decl);
                Ok(())
            }
        }
    }

    fn attribute_decl(&mut self, node: &'d XsdNode) -> CompileResult<AttributeDecl> {
        let definition = match node.attr("ref") {
            Some(reference) => {
                let (_, local) = split_qname(reference);
                if split_qname(reference).0 == Some("xml") {
                    let mut decl = AttributeDecl::new(
                        reference,
                        SimpleType::builtin(Builtin::AnySimpleType),
                        AttributeUse::Optional,
                    );
                    decl.usage = attribute_usage(node)?;
                    return Ok(decl);
                }
                *self.attributes.get(local).ok_or_else(|| undefined(reference))?
            }
            None => node,
        };
        let name = definition
            .attr("name")
            .ok_or_else(|| malformed(node, "attribute has neither name nor ref"))?;

        let ty = match definition.attr("type") {
            Some(qname) => self.resolve_simple(qname)?,
            None => match self.xs_children(definition).find(|c| c.local == "simpleType") {
                Some(inline) => self.simple_type(inline)?,
                None => SimpleType::builtin(Builtin::AnySimpleType),
            },
        };

        let mut decl = AttributeDecl::new(name, ty, attribute_usage(node)?);
        decl.default = node.attr("default").or(definition.attr("default")).map(str::to_string);
        decl.fixed = node.attr("fixed").or(definition.attr("fixed")).map(str::to_string);
        if decl.default.is_some() && decl.fixed.is_some() {
            return Err(SchemaCompilationError::InvalidValue {
                details: format!("attribute '{}' has both default and fixed values", name),
            });
        }
        if decl.default.is_some() && decl.usage != AttributeUse::Optional {
            return Err(SchemaCompilationError::InvalidValue {
                details: format!("attribute '{}' has a default but is not optional", name),
            });
        }
        for value in decl.default.iter().chain(decl.fixed.iter()) {
            decl.ty.validate(value).map_err(|reason| SchemaCompilationError::InvalidValue {
                details: format!("value '{}' of attribute '{}': {}", value, name, reason),
            })?;
        }
        Ok(decl)
    }

    fn named_simple(&mut self, name: &str) -> CompileResult<SimpleType> {
        if let Some(ty) = self.simple_cache.get(name) {
            return Ok(ty.clone());
        }
        let node = *self.simple_types.get(name).ok_or_else(|| undefined(name))?;
        if !self.simple_in_progress.insert(name.to_string()) {
            return Err(malformed(node, format!("simple type '{}' is defined in terms of itself", name)));
        }
        let ty = self.simple_type(node);
        self.simple_in_progress.remove(name);
        let ty = ty?.with_name(name);
        self.simple_cache.insert(name.to_string(), ty.clone());
        Ok(ty)
    }

    fn simple_type(&mut self, node: &'d XsdNode) -> CompileResult<SimpleType> {
        let derivation = self
            .xs_children(node)
            .next()
            .ok_or_else(|| malformed(node, "simpleType has no derivation"))?;
        match derivation.local.as_str() {
            "restriction" => {
                let base = match derivation.attr("base") {
                    Some(qname) => self.resolve_simple(qname)?,
                    None => {
                        let inline = self
                            .xs_children(derivation)
                            .find(|c| c.local == "simpleType")
                            .ok_or_else(|| malformed(derivation, "restriction has no base"))?;
                        self.simple_type(inline)?
                    }
                };
                let facets = self.facets(derivation, &base)?;
                SimpleType::restrict(&base, facets)
                    .map_err(|details| SchemaCompilationError::InvalidValue { details })
            }
            "list" => {
                let item = match derivation.attr("itemType") {
                    Some(qname) => self.resolve_simple(qname)?,
                    None => {
                        let inline = self
                            .xs_children(derivation)
                            .find(|c| c.local == "simpleType")
                            .ok_or_else(|| malformed(derivation, "list has no item type"))?;
                        self.simple_type(inline)?
                    }
                };
                Ok(SimpleType::list(item))
            }
            "union" => {
                let mut members = Vec::new();
                for qname in derivation.attr("memberTypes").unwrap_or_default().split_whitespace() {
                    members.push(self.resolve_simple(qname)?);
                }
                let inline: Vec<&'d XsdNode> = self
                    .xs_children(derivation)
                    .filter(|c| c.local == "simpleType")
                    .collect();
                for member in inline {
                    members.push(self.simple_type(member)?);
                }
                if members.is_empty() {
                    return Err(malformed(derivation, "union has no member types"));
                }
                Ok(SimpleType::union(members))
            }
            other => Err(unsupported(derivation, other)),
        }
    }

    fn facets(&self, derivation: &XsdNode, base: &SimpleType) -> CompileResult<Facets> {
        let mut facets = Facets::default();
        for facet in self.xs_children(derivation) {
            let kind = facet.local.as_str();
            if matches!(
                kind,
                "simpleType" | "attribute" | "attributeGroup" | "anyAttribute" | "sequence" | "choice" | "all" | "group"
            ) {
                continue;
            }
            let value = facet
                .attr("value")
                .ok_or_else(|| malformed(facet, format!("facet {} has no value", kind)))?;
            let invalid = |reason: String| SchemaCompilationError::InvalidValue {
                details: format!("{} '{}': {}", kind, value, reason),
            };
            let length = || value.trim().parse::<usize>().map_err(|e| invalid(e.to_string()));
            match kind {
                "enumeration" => {
                    base.validate(value).map_err(invalid)?;
                    facets.enumeration.push(value.to_string());
                }
                "pattern" => facets.patterns.push(Pattern::new(value).map_err(invalid)?),
                "length" => facets.length = Some(length()?),
                "minLength" => facets.min_length = Some(length()?),
                "maxLength" => facets.max_length = Some(length()?),
                "totalDigits" => facets.total_digits = Some(length()?),
                "fractionDigits" => facets.fraction_digits = Some(length()?),
                "minInclusive" => facets.min_inclusive = Some(value.to_string()),
                "maxInclusive" => facets.max_inclusive = Some(value.to_string()),
                "minExclusive" => facets.min_exclusive = Some(value.to_string()),
                "maxExclusive" => facets.max_exclusive = Some(value.to_string()),
                "whiteSpace" => {
                    facets.whitespace = Some(
                        WhiteSpace::from_name(value)
                            .ok_or_else(|| invalid("expected preserve, replace or collapse".to_string()))?,
                    );
                }
                other => return Err(unsupported(facet, other)),
            }
        }
        Ok(facets)
    }
}

fn content_model(particle: Option<Particle>, mixed: bool) -> ContentModel {
    match (particle, mixed) {
        (None, false) | (Some(Particle::Empty), false) => ContentModel::Empty,
        (None, true) => ContentModel::Mixed(Particle::Empty),
        (Some(particle), true) => ContentModel::Mixed(particle),
        (Some(particle), false) => ContentModel::Children(particle),
    }
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("true" | "1"))
}

fn occurs(node: &XsdNode) -> CompileResult<(u32, Option<u32>)> {
    let parse = |attr: &str, value: &str| {
        value.trim().parse::<u32>().map_err(|_| SchemaCompilationError::InvalidValue {
            details: format!("{}=\"{}\" is not a non-negative integer", attr, value),
        })
    };
    let min = match node.attr("minOccurs") {
        Some(value) => parse("minOccurs", value)?,
        None => 1,
    };
    let max = match node.attr("maxOccurs") {
        Some(value) if value.trim() == "unbounded" => None,
        Some(value) => Some(parse("maxOccurs", value)?),
        None => Some(1),
    };
    if let Some(max) = max {
        if min > max {
            return Err(SchemaCompilationError::InvalidValue {
                details: format!("minOccurs {} exceeds maxOccurs {}", min, max),
            });
        }
    }
    Ok((min, max))
}

fn attribute_usage(node: &XsdNode) -> CompileResult<AttributeUse> {
    match node.attr("use").map(str::trim) {
        None | Some("optional") => Ok(AttributeUse::Optional),
        Some("required") => Ok(AttributeUse::Required),
        Some("prohibited") => Ok(AttributeUse::Prohibited),
        Some(other) => Err(SchemaCompilationError::InvalidValue {
            details: format!("use=\"{}\" must be optional, required or prohibited", other),
        }),
    }
}

fn malformed(node: &XsdNode, message: impl Into<String>) -> SchemaCompilationError {
    SchemaCompilationError::malformed(node.location.line, node.location.column, message)
}

fn unsupported(node: &XsdNode, construct: &str) -> SchemaCompilationError {
    SchemaCompilationError::Unsupported {
        construct: format!("xs:{} at {}", construct, node.location),
    }
}

fn undefined(name: &str) -> SchemaCompilationError {
    SchemaCompilationError::UndefinedType {
        name: name.to_string(),
    }
}

/// Compiles an XML Schema document into a [`SchemaModel`]
pub fn compile_xsd(source: &str) -> CompileResult<SchemaModel> {
    let mut builder = TreeBuilder::default();
    parse_document(source.as_bytes(), ParserConfig::default(), &mut [&mut builder]);
    if let Some((message, location)) = builder.error.take() {
        return Err(SchemaCompilationError::malformed(location.line, location.column, message));
    }
    let root = builder.root.ok_or_else(|| SchemaCompilationError::NotASchema {
        details: "document has no root element".to_string(),
    })?;

    let xs = root.prefix.clone().unwrap_or_default();
    let binding = if xs.is_empty() {
        "xmlns".to_string()
    } else {
        format!("xmlns:{}", xs)
    };
    if root.local != "schema" || root.attr(&binding) != Some(XSD_NAMESPACE) {
        return Err(SchemaCompilationError::NotASchema {
            details: format!(
                "root element must be schema in namespace {}",
                XSD_NAMESPACE
            ),
        });
    }

    XsdCompiler::new(&root, xs)?.compile(&root)
}
