//! DTD compiler
//!
//! Parses an external DTD subset (or a document's internal subset) into
//! declarations, then checks them and builds a [`SchemaModel`]. Parsing
//! first and checking afterwards lets declarations appear in any order.

use std::collections::{HashMap, HashSet};

use crate::content_model::{DeclId, Particle, UNRESOLVED};
use crate::datatypes::{Builtin, SimpleType};
use crate::entities::{self, EntityMap};
use crate::error::{CompileResult, SchemaCompilationError};
use crate::schema::{AttributeDecl, AttributeUse, ContentModel, ElementType, SchemaKind, SchemaModel};
use crate::tokenizer::{is_name_char, is_name_start_char};

/// Nesting limit for parameter-entity expansion and conditional sections
const MAX_NESTING: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum AttType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

impl AttType {
    fn simple_type(&self) -> SimpleType {
        match self {
            AttType::CData => SimpleType::builtin(Builtin::String),
            AttType::Id => SimpleType::builtin(Builtin::Id),
            AttType::IdRef => SimpleType::builtin(Builtin::IdRef),
            AttType::IdRefs => SimpleType::builtin(Builtin::IdRefs),
            AttType::Entity => SimpleType::builtin(Builtin::Entity),
            AttType::Entities => SimpleType::builtin(Builtin::Entities),
            AttType::NmToken => SimpleType::builtin(Builtin::NmToken),
            AttType::NmTokens => SimpleType::builtin(Builtin::NmTokens),
            AttType::Notation(values) | AttType::Enumeration(values) => {
                SimpleType::enumeration(values.clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AttDefault {
    Required,
    Implied,
    Fixed(String),
    Default(String),
}

#[derive(Debug, Clone)]
struct AttDef {
    element: String,
    name: String,
    att_type: AttType,
    default: AttDefault,
}

#[derive(Debug, Clone)]
enum ParameterEntity {
    Internal(String),
    External(String),
}

/// Collected declarations, checked after the whole subset is read
#[derive(Debug, Default)]
struct DtdDeclarations {
    elements: Vec<(String, ContentModel)>,
    element_index: HashMap<String, usize>,
    attlists: Vec<AttDef>,
    entities: EntityMap,
    external_entities: HashSet<String>,
    parameter_entities: HashMap<String, ParameterEntity>,
    notations: HashSet<String>,
    /// First element declared twice
    duplicate: Option<String>,
}

/// Forward-only reader over declaration text
struct Cursor<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) -> bool {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches([' ', '\t', '\n', '\r']);
        self.pos += rest.len() - trimmed.len();
        trimmed.len() != rest.len()
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Option<&'s str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            _ => return None,
        }
        let end = chars
            .find(|(_, c)| !is_name_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += end;
        Some(&rest[..end])
    }

    fn nmtoken(&mut self) -> Option<&'s str> {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|(_, c)| !is_name_char(*c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(&rest[..end])
    }

    fn quoted(&mut self) -> Option<&'s str> {
        let quote = self.peek().filter(|c| *c == '"' || *c == '\'')?;
        let rest = &self.rest()[1..];
        let end = rest.find(quote)?;
        self.pos += end + 2;
        Some(&rest[..end])
    }
}

fn line_col(src: &str, offset: usize) -> (u32, u32) {
    let before = &src[..offset.min(src.len())];
    let line = before.matches('\n').count() as u32 + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|l| l.chars().count())
        .unwrap_or(0) as u32
        + 1;
    (line, column)
}

/// Finds the `>` that closes a declaration, skipping quoted literals
fn declaration_end(text: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Finds the `]]>` closing a conditional section, honouring nesting
fn conditional_end(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        if rest.starts_with("<![") {
            depth += 1;
            i += 3;
        } else if rest.starts_with("]]>") {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += 3;
        } else {
            i += rest.chars().next().map(char::len_utf8).unwrap_or(1);
        }
    }
    None
}

/// Entity references (not character references) in a replacement text
fn entity_references(value: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        let after = &rest[amp + 1..];
        match after.find(';') {
            Some(semi) if !after.starts_with('#') => {
                refs.push(&after[..semi]);
                rest = &after[semi + 1..];
            }
            Some(semi) => rest = &after[semi + 1..],
            None => break,
        }
    }
    refs
}

struct DtdParser {
    decls: DtdDeclarations,
    /// Internal subsets tolerate external parameter entities by skipping them
    lenient: bool,
}

impl DtdParser {
    fn new(lenient: bool) -> Self {
        Self {
            decls: DtdDeclarations::default(),
            lenient,
        }
    }

    fn error(&self, src: &str, offset: usize, origin: Option<&str>, message: impl Into<String>) -> SchemaCompilationError {
        let (line, column) = line_col(src, offset);
        let message = message.into();
        let message = match origin {
            Some(pe) => format!("{} (in expansion of %{};)", message, pe),
            None => message,
        };
        SchemaCompilationError::malformed(line, column, message)
    }

    /// Replacement text of `%name;`, expanded recursively
    fn parameter_value(&self, name: &str, depth: usize) -> CompileResult<Option<String>> {
        match self.decls.parameter_entities.get(name) {
            Some(ParameterEntity::Internal(value)) => {
                if depth >= MAX_NESTING {
                    return Err(SchemaCompilationError::malformed(
                        0,
                        0,
                        format!("parameter entity %{}; is nested too deeply", name),
                    ));
                }
                let value = value.clone();
                self.expand_parameters(&value, depth + 1).map(Some)
            }
            Some(ParameterEntity::External(system)) => {
                if self.lenient {
                    Ok(None)
                } else {
                    Err(SchemaCompilationError::Unsupported {
                        construct: format!("external parameter entity %{}; ({})", name, system),
                    })
                }
            }
            None => Err(SchemaCompilationError::UndeclaredEntity {
                name: format!("%{}", name),
            }),
        }
    }

    /// Expands `%name;` references inside a declaration. Outside literals the
    /// replacement is padded with spaces.
    fn expand_parameters(&self, text: &str, depth: usize) -> CompileResult<String> {
        if !text.contains('%') {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        let mut quote: Option<char> = None;
        let mut cursor = Cursor::new(text);
        while let Some(c) = cursor.peek() {
            if c == '%' {
                let save = cursor.pos;
                cursor.pos += 1;
                if let Some(name) = cursor.name() {
                    if cursor.eat(";") {
                        let value = self.parameter_value(name, depth)?.unwrap_or_default();
                        if quote.is_some() {
                            out.push_str(&value);
                        } else {
                            out.push(' ');
                            out.push_str(&value);
                            out.push(' ');
                        }
                        continue;
                    }
                }
                cursor.pos = save + 1;
                out.push('%');
                continue;
            }
            match quote {
                Some(q) if c == q => quote = None,
                None if c == '"' || c == '\'' => quote = Some(c),
                _ => {}
            }
            out.push(c);
            cursor.pos += c.len_utf8();
        }
        Ok(out)
    }

    fn parse_subset(&mut self, src: &str, origin: Option<&str>, depth: usize) -> CompileResult<()> {
        if depth > MAX_NESTING {
            return Err(self.error(src, 0, origin, "declarations are nested too deeply"));
        }
        let mut cur = Cursor::new(src);
        loop {
            cur.skip_ws();
            if cur.at_end() {
                return Ok(());
            }
            let start = cur.pos;

            if cur.eat("<!--") {
                let Some(end) = cur.rest().find("-->") else {
                    return Err(self.error(src, start, origin, "unterminated comment"));
                };
                cur.pos += end + 3;
            } else if cur.eat("<?") {
                let Some(end) = cur.rest().find("?>") else {
                    return Err(self.error(src, start, origin, "unterminated processing instruction"));
                };
                cur.pos += end + 2;
            } else if cur.eat("<![") {
                let Some(end) = conditional_end(cur.rest()) else {
                    return Err(self.error(src, start, origin, "unterminated conditional section"));
                };
                let section = &cur.rest()[..end];
                cur.pos += end + 3;
                self.conditional_section(src, start, section, origin, depth)?;
            } else if cur.eat("%") {
                let name = cur
                    .name()
                    .ok_or_else(|| self.error(src, start, origin, "expected parameter entity name after '%'"))?;
                if !cur.eat(";") {
                    return Err(self.error(src, cur.pos, origin, "expected ';' after parameter entity name"));
                }
                if let Some(value) = self.parameter_value(name, depth)? {
                    self.parse_subset(&value, Some(name), depth + 1)?;
                }
            } else if cur.rest().starts_with("<!") {
                let Some(end) = declaration_end(cur.rest()) else {
                    return Err(self.error(src, start, origin, "unterminated markup declaration"));
                };
                let body = self.expand_parameters(&cur.rest()[2..end], depth)?;
                cur.pos += end + 1;
                self.declaration(&body)
                    .map_err(|message| self.error(src, start, origin, message))?;
            } else {
                return Err(self.error(src, start, origin, "unexpected content in DTD"));
            }
        }
    }

    fn conditional_section(
        &mut self,
        src: &str,
        start: usize,
        section: &str,
        origin: Option<&str>,
        depth: usize,
    ) -> CompileResult<()> {
        let Some(open) = section.find('[') else {
            return Err(self.error(src, start, origin, "expected '[' in conditional section"));
        };
        let keyword = self.expand_parameters(&section[..open], depth)?;
        let body = &section[open + 1..];
        match keyword.trim() {
            "INCLUDE" => self.parse_subset(body, origin, depth + 1),
            "IGNORE" => Ok(()),
            other => Err(self.error(
                src,
                start,
                origin,
                format!("unknown conditional section keyword '{}'", other),
            )),
        }
    }

    /// Parses one `<!KEYWORD ...>` body whose parameter references are
    /// already expanded. Errors are plain messages, located by the caller at
    /// the declaration start.
    fn declaration(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body);
        let keyword = cur.name().ok_or("expected declaration keyword after '<!'")?;
        if !cur.skip_ws() {
            return Err(format!("whitespace required after '<!{}'", keyword));
        }
        let rest = cur.rest();
        match keyword {
            "ENTITY" => self.entity_declaration(rest),
            "ELEMENT" => self.element_declaration(rest),
            "ATTLIST" => self.attlist_declaration(rest),
            "NOTATION" => self.notation_declaration(rest),
            other => Err(format!("unknown declaration '<!{}'", other)),
        }
    }

    fn element_declaration(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body.trim_start());
        let name = cur.name().ok_or("expected element name in <!ELEMENT>")?.to_string();
        if !cur.skip_ws() {
            return Err(format!("whitespace required after element name '{}'", name));
        }
        let content = parse_content_spec(&mut cur)?;
        cur.skip_ws();
        if !cur.at_end() {
            return Err(format!("unexpected '{}' after content model of '{}'", cur.rest().trim(), name));
        }
        if self.decls.element_index.contains_key(&name) {
            self.decls.duplicate.get_or_insert(name);
            return Ok(());
        }
        self.decls.element_index.insert(name.clone(), self.decls.elements.len());
        self.decls.elements.push((name, content));
        Ok(())
    }

    fn attlist_declaration(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body.trim_start());
        let element = cur.name().ok_or("expected element name in <!ATTLIST>")?.to_string();
        loop {
            cur.skip_ws();
            if cur.at_end() {
                return Ok(());
            }
            let name = cur
                .name()
                .ok_or_else(|| format!("expected attribute name in <!ATTLIST {}>", element))?
                .to_string();
            if !cur.skip_ws() {
                return Err(format!("whitespace required after attribute name '{}'", name));
            }
            let att_type = parse_att_type(&mut cur)?;
            if !cur.skip_ws() {
                return Err(format!("whitespace required after type of attribute '{}'", name));
            }
            let default = if cur.eat("#REQUIRED") {
                AttDefault::Required
            } else if cur.eat("#IMPLIED") {
                AttDefault::Implied
            } else if cur.eat("#FIXED") {
                cur.skip_ws();
                let value = cur
                    .quoted()
                    .ok_or_else(|| format!("expected quoted #FIXED value for '{}'", name))?;
                AttDefault::Fixed(value.to_string())
            } else {
                let value = cur
                    .quoted()
                    .ok_or_else(|| format!("expected default declaration for attribute '{}'", name))?;
                AttDefault::Default(value.to_string())
            };
            self.decls.attlists.push(AttDef {
                element: element.clone(),
                name,
                att_type,
                default,
            });
        }
    }

    fn entity_declaration(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body);
        let parameter = cur.eat("%");
        if parameter && !cur.skip_ws() {
            return Err("whitespace required after '%' in <!ENTITY>".to_string());
        }
        let name = cur.name().ok_or("expected entity name in <!ENTITY>")?.to_string();
        if !cur.skip_ws() {
            return Err(format!("whitespace required after entity name '{}'", name));
        }

        if let Some(value) = cur.quoted() {
            let value = value.to_string();
            cur.skip_ws();
            if !cur.at_end() {
                return Err(format!("unexpected content after value of entity '{}'", name));
            }
            // The first declaration of an entity is binding
            if parameter {
                self.decls
                    .parameter_entities
                    .entry(name)
                    .or_insert(ParameterEntity::Internal(value));
            } else if entities::predefined(&name).is_none() {
                self.decls.entities.entry(name).or_insert(value);
            }
            return Ok(());
        }

        let system = parse_external_id(&mut cur)?
            .ok_or_else(|| format!("expected value or external identifier for entity '{}'", name))?;
        cur.skip_ws();
        if cur.eat("NDATA") {
            if parameter {
                return Err(format!("parameter entity '{}' cannot be unparsed", name));
            }
            cur.skip_ws();
            cur.name().ok_or_else(|| format!("expected notation name after NDATA in '{}'", name))?;
            cur.skip_ws();
        }
        if !cur.at_end() {
            return Err(format!("unexpected content in declaration of entity '{}'", name));
        }
        if parameter {
            self.decls
                .parameter_entities
                .entry(name)
                .or_insert(ParameterEntity::External(system));
        } else {
            self.decls.external_entities.insert(name);
        }
        Ok(())
    }

    fn notation_declaration(&mut self, body: &str) -> Result<(), String> {
        let mut cur = Cursor::new(body.trim_start());
        let name = cur.name().ok_or("expected notation name in <!NOTATION>")?.to_string();
        cur.skip_ws();
        if cur.eat("PUBLIC") {
            cur.skip_ws();
            cur.quoted().ok_or("expected public identifier in <!NOTATION>")?;
            cur.skip_ws();
            cur.quoted();
        } else if cur.eat("SYSTEM") {
            cur.skip_ws();
            cur.quoted().ok_or("expected system identifier in <!NOTATION>")?;
        } else {
            return Err(format!("expected SYSTEM or PUBLIC in notation '{}'", name));
        }
        cur.skip_ws();
        if !cur.at_end() {
            return Err(format!("unexpected content in notation '{}'", name));
        }
        if !self.decls.notations.insert(name.clone()) {
            return Err(format!("notation '{}' is declared more than once", name));
        }
        Ok(())
    }
}

/// `SYSTEM "uri"` or `PUBLIC "id" "uri"`; returns the system identifier
fn parse_external_id(cur: &mut Cursor<'_>) -> Result<Option<String>, String> {
    if cur.eat("SYSTEM") {
        cur.skip_ws();
        let system = cur.quoted().ok_or("expected quoted system identifier")?;
        Ok(Some(system.to_string()))
    } else if cur.eat("PUBLIC") {
        cur.skip_ws();
        cur.quoted().ok_or("expected quoted public identifier")?;
        cur.skip_ws();
        let system = cur.quoted().ok_or("expected quoted system identifier after public identifier")?;
        Ok(Some(system.to_string()))
    } else {
        Ok(None)
    }
}

fn parse_att_type(cur: &mut Cursor<'_>) -> Result<AttType, String> {
    if cur.peek() == Some('(') {
        return parse_name_group(cur, false).map(AttType::Enumeration);
    }
    let keyword = cur.name().ok_or("expected attribute type")?;
    Ok(match keyword {
        "CDATA" => AttType::CData,
        "ID" => AttType::Id,
        "IDREF" => AttType::IdRef,
        "IDREFS" => AttType::IdRefs,
        "ENTITY" => AttType::Entity,
        "ENTITIES" => AttType::Entities,
        "NMTOKEN" => AttType::NmToken,
        "NMTOKENS" => AttType::NmTokens,
        "NOTATION" => {
            cur.skip_ws();
            AttType::Notation(parse_name_group(cur, true)?)
        }
        other => return Err(format!("unknown attribute type '{}'", other)),
    })
}

/// `( a | b | c )`; enumeration members are NMTOKENs, notation members Names
fn parse_name_group(cur: &mut Cursor<'_>, names_only: bool) -> Result<Vec<String>, String> {
    if !cur.eat("(") {
        return Err("expected '(' to start a value list".to_string());
    }
    let mut values = Vec::new();
    loop {
        cur.skip_ws();
        let value = if names_only { cur.name() } else { cur.nmtoken() };
        let value = value.ok_or("expected a value in enumerated type")?;
        values.push(value.to_string());
        cur.skip_ws();
        if cur.eat(")") {
            return Ok(values);
        }
        if !cur.eat("|") {
            return Err("expected '|' or ')' in enumerated type".to_string());
        }
    }
}

fn parse_content_spec(cur: &mut Cursor<'_>) -> Result<ContentModel, String> {
    if cur.eat("EMPTY") {
        return Ok(ContentModel::Empty);
    }
    if cur.eat("ANY") {
        return Ok(ContentModel::Any);
    }
    if !cur.eat("(") {
        return Err("expected EMPTY, ANY or '(' in content model".to_string());
    }
    cur.skip_ws();
    if cur.eat("#PCDATA") {
        return parse_mixed(cur);
    }
    let group = parse_group(cur)?;
    Ok(ContentModel::Children(parse_occurrence(cur, group)))
}

/// The remainder of `(#PCDATA | a | b)*` after `#PCDATA`
fn parse_mixed(cur: &mut Cursor<'_>) -> Result<ContentModel, String> {
    let mut names: Vec<String> = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(")") {
            break;
        }
        if !cur.eat("|") {
            return Err("expected '|' or ')' in mixed content model".to_string());
        }
        cur.skip_ws();
        let name = cur.name().ok_or("expected element name in mixed content model")?;
        if names.iter().any(|n| n == name) {
            return Err(format!("'{}' appears more than once in mixed content model", name));
        }
        names.push(name.to_string());
    }
    let starred = cur.eat("*");
    if !names.is_empty() && !starred {
        return Err("mixed content model with element names must end in ')*'".to_string());
    }
    let choice = Particle::choice(
        names
            .into_iter()
            .map(|n| Particle::element(n, UNRESOLVED))
            .collect(),
    );
    Ok(ContentModel::Mixed(Particle::repeat(choice, 0, None)))
}

/// A parenthesised group; the opening `(` is already consumed
fn parse_group(cur: &mut Cursor<'_>) -> Result<Particle, String> {
    let mut items = vec![parse_content_particle(cur)?];
    let mut separator: Option<char> = None;
    loop {
        cur.skip_ws();
        if cur.eat(")") {
            break;
        }
        let sep = match cur.peek() {
            Some(c @ ('|' | ',')) => c,
            _ => return Err("expected ',', '|' or ')' in content model".to_string()),
        };
        if separator.is_some_and(|s| s != sep) {
            return Err("cannot mix ',' and '|' in one content model group".to_string());
        }
        separator = Some(sep);
        cur.pos += 1;
        items.push(parse_content_particle(cur)?);
    }
    Ok(match separator {
        Some('|') => Particle::Choice(items),
        _ if items.len() == 1 => items.remove(0),
        _ => Particle::Sequence(items),
    })
}

fn parse_content_particle(cur: &mut Cursor<'_>) -> Result<Particle, String> {
    cur.skip_ws();
    let particle = if cur.eat("(") {
        parse_group(cur)?
    } else {
        let name = cur.name().ok_or("expected element name or '(' in content model")?;
        Particle::element(name, UNRESOLVED)
    };
    Ok(parse_occurrence(cur, particle))
}

fn parse_occurrence(cur: &mut Cursor<'_>, particle: Particle) -> Particle {
    if cur.eat("?") {
        Particle::repeat(particle, 0, Some(1))
    } else if cur.eat("*") {
        Particle::repeat(particle, 0, None)
    } else if cur.eat("+") {
        Particle::repeat(particle, 1, None)
    } else {
        particle
    }
}

fn check_entity_references(decls: &DtdDeclarations) -> CompileResult<()> {
    let mut names: Vec<&String> = decls.entities.keys().collect();
    names.sort();
    for name in &names {
        for reference in entity_references(&decls.entities[*name]) {
            let known = entities::predefined(reference).is_some()
                || decls.entities.contains_key(reference)
                || decls.external_entities.contains(reference);
            if !known {
                return Err(SchemaCompilationError::UndeclaredEntity {
                    name: reference.to_string(),
                });
            }
        }
    }

    for name in names {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = entity_references(&decls.entities[name]);
        while let Some(current) = stack.pop() {
            if current == name.as_str() {
                return Err(SchemaCompilationError::malformed(
                    0,
                    0,
                    format!("entity '{}' references itself", name),
                ));
            }
            if visited.insert(current) {
                if let Some(value) = decls.entities.get(current) {
                    stack.extend(entity_references(value));
                }
            }
        }
    }
    Ok(())
}

fn build_model(root: &str, decls: DtdDeclarations) -> CompileResult<SchemaModel> {
    if let Some(name) = decls.duplicate {
        return Err(SchemaCompilationError::DuplicateElement { name });
    }
    check_entity_references(&decls)?;

    let mut model = SchemaModel::new(SchemaKind::Dtd);
    let index = decls.element_index;
    let mut types: Vec<ElementType> = Vec::with_capacity(decls.elements.len());
    let mut names = Vec::with_capacity(decls.elements.len());

    for (name, mut content) in decls.elements {
        let mut resolve = |child: &str| -> CompileResult<DeclId> {
            index
                .get(child)
                .copied()
                .ok_or_else(|| SchemaCompilationError::UndeclaredElement {
                    name: child.to_string(),
                    parent: name.clone(),
                })
        };
        match &mut content {
            ContentModel::Children(particle) | ContentModel::Mixed(particle) => {
                particle.resolve(&mut resolve)?
            }
            _ => {}
        }
        types.push(ElementType::new(content));
        names.push(name);
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    for def in decls.attlists {
        let Some(&element) = index.get(&def.element) else {
            return Err(SchemaCompilationError::UndeclaredElement {
                name: def.element,
                parent: "<!ATTLIST>".to_string(),
            });
        };
        if !seen.insert((def.element.clone(), def.name.clone())) {
            continue;
        }
        if let AttType::Notation(values) = &def.att_type {
            if let Some(missing) = values.iter().find(|v| !decls.notations.contains(*v)) {
                return Err(SchemaCompilationError::UndeclaredNotation {
                    name: missing.clone(),
                });
            }
        }

        let ty = def.att_type.simple_type();
        let (usage, default, fixed) = match def.default {
            AttDefault::Required => (AttributeUse::Required, None, None),
            AttDefault::Implied => (AttributeUse::Optional, None, None),
            AttDefault::Fixed(v) => (AttributeUse::Optional, None, Some(v)),
            AttDefault::Default(v) => (AttributeUse::Optional, Some(v), None),
        };
        if def.att_type == AttType::Id {
            if default.is_some() || fixed.is_some() {
                return Err(SchemaCompilationError::InvalidValue {
                    details: format!("ID attribute '{}' on '{}' must be #IMPLIED or #REQUIRED", def.name, def.element),
                });
            }
            if types[element].attributes.iter().any(|a| a.ty.is_id()) {
                return Err(SchemaCompilationError::InvalidValue {
                    details: format!("element '{}' has more than one ID attribute", def.element),
                });
            }
        }

        let mut decl = AttributeDecl::new(def.name.clone(), ty, usage);
        for value in default.iter().chain(fixed.iter()) {
            let decoded = entities::decode(&entities::normalize_attribute(value), &decls.entities)
                .map_err(|e| SchemaCompilationError::InvalidValue {
                    details: format!("default of attribute '{}' on '{}': {}", def.name, def.element, e),
                })?
                .into_owned();
            let normalized = decl.ty.validate(&decoded).map_err(|e| SchemaCompilationError::InvalidValue {
                details: format!("default of attribute '{}' on '{}': {}", def.name, def.element, e),
            })?;
            if fixed.is_some() {
                decl.fixed = Some(normalized);
            } else {
                decl.default = Some(normalized);
            }
        }
        types[element].attributes.push(decl);
    }

    for (name, ty) in names.into_iter().zip(types) {
        let type_id = model.add_type(ty);
        model.add_element(name, type_id, true);
    }

    if model.global(root).is_none() {
        return Err(SchemaCompilationError::MissingRoot {
            root: root.to_string(),
        });
    }
    model.set_root(root);
    model.set_entities(decls.entities);
    Ok(model)
}

/// Compiles a DTD for documents whose root element is `root`
pub fn compile_dtd(root: &str, source: &str) -> CompileResult<SchemaModel> {
    let mut parser = DtdParser::new(false);
    parser.parse_subset(source, None, 0)?;
    build_model(root, parser.decls)
}

/// Compiles the DTD a document carries: its internal subset, read first so
/// its declarations take precedence, then the external subset it names
pub fn compile_document_dtd(
    root: &str,
    internal_subset: &str,
    external_subset: Option<&str>,
) -> CompileResult<SchemaModel> {
    let mut parser = DtdParser::new(true);
    parser.parse_subset(internal_subset, None, 0)?;
    if let Some(external) = external_subset {
        parser.lenient = false;
        parser.parse_subset(external, None, 0)?;
    }
    build_model(root, parser.decls)
}

/// General entities declared in a document's internal DTD subset
pub fn internal_subset_entities(subset: &str) -> CompileResult<EntityMap> {
    let mut parser = DtdParser::new(true);
    parser.parse_subset(subset, None, 0)?;
    Ok(parser.decls.entities)
}
