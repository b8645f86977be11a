//! Simple types shared by DTD attribute declarations and XSD simple types
//!
//! A [`SimpleType`] is a built-in lexical space plus zero or more layers of
//! constraining facets; each `xs:restriction` step adds one layer and a value
//! must satisfy every layer.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

use crate::tokenizer::{is_name_char, is_valid_name};

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s.split_ascii_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NcName,
    NmToken,
    NmTokens,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    QName,
    AnyUri,
    Boolean,
    Decimal,
    Integer,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    PositiveInteger,
    NonPositiveInteger,
    NegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    Float,
    Double,
    Date,
    DateTime,
    Time,
}

const BUILTIN_NAMES: &[(&str, Builtin)] = &[
    ("anySimpleType", Builtin::AnySimpleType),
    ("string", Builtin::String),
    ("normalizedString", Builtin::NormalizedString),
    ("token", Builtin::Token),
    ("language", Builtin::Language),
    ("Name", Builtin::Name),
    ("NCName", Builtin::NcName),
    ("NMTOKEN", Builtin::NmToken),
    ("NMTOKENS", Builtin::NmTokens),
    ("ID", Builtin::Id),
    ("IDREF", Builtin::IdRef),
    ("IDREFS", Builtin::IdRefs),
    ("ENTITY", Builtin::Entity),
    ("ENTITIES", Builtin::Entities),
    ("QName", Builtin::QName),
    ("anyURI", Builtin::AnyUri),
    ("boolean", Builtin::Boolean),
    ("decimal", Builtin::Decimal),
    ("integer", Builtin::Integer),
    ("long", Builtin::Long),
    ("int", Builtin::Int),
    ("short", Builtin::Short),
    ("byte", Builtin::Byte),
    ("nonNegativeInteger", Builtin::NonNegativeInteger),
    ("positiveInteger", Builtin::PositiveInteger),
    ("nonPositiveInteger", Builtin::NonPositiveInteger),
    ("negativeInteger", Builtin::NegativeInteger),
    ("unsignedLong", Builtin::UnsignedLong),
    ("unsignedInt", Builtin::UnsignedInt),
    ("unsignedShort", Builtin::UnsignedShort),
    ("unsignedByte", Builtin::UnsignedByte),
    ("float", Builtin::Float),
    ("double", Builtin::Double),
    ("date", Builtin::Date),
    ("dateTime", Builtin::DateTime),
    ("time", Builtin::Time),
];

fn integer_regex() -> &'static Regex {
    static INTEGER: OnceLock<Regex> = OnceLock::new();
    INTEGER.get_or_init(|| Regex::new(r"^[+-]?[0-9]+$").expect("Invalid integer regex"))
}

fn decimal_regex() -> &'static Regex {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    DECIMAL.get_or_init(|| {
        Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$").expect("Invalid decimal regex")
    })
}

fn float_regex() -> &'static Regex {
    static FLOAT: OnceLock<Regex> = OnceLock::new();
    FLOAT.get_or_init(|| {
        Regex::new(r"^([+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?|-?INF|NaN)$")
            .expect("Invalid float regex")
    })
}

fn date_regex() -> &'static Regex {
    static DATE: OnceLock<Regex> = OnceLock::new();
    DATE.get_or_init(|| {
        Regex::new(r"^(-?[0-9]{4,}-[0-9]{2}-[0-9]{2})(Z|[+-][0-9]{2}:[0-9]{2})?$")
            .expect("Invalid date regex")
    })
}

fn date_time_regex() -> &'static Regex {
    static DATE_TIME: OnceLock<Regex> = OnceLock::new();
    DATE_TIME.get_or_init(|| {
        Regex::new(
            r"^(-?[0-9]{4,}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?)(Z|[+-][0-9]{2}:[0-9]{2})?$",
        )
        .expect("Invalid dateTime regex")
    })
}

fn time_regex() -> &'static Regex {
    static TIME: OnceLock<Regex> = OnceLock::new();
    TIME.get_or_init(|| {
        Regex::new(r"^([0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?)(Z|[+-][0-9]{2}:[0-9]{2})?$")
            .expect("Invalid time regex")
    })
}

fn language_regex() -> &'static Regex {
    static LANGUAGE: OnceLock<Regex> = OnceLock::new();
    LANGUAGE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").expect("Invalid language regex")
    })
}

/// A comparable value in the value space of an ordered builtin
#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum OrderedValue {
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

fn capture<'t>(re: &Regex, value: &'t str) -> Option<&'t str> {
    re.captures(value).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(capture(date_regex(), value)?, "%Y-%m-%d").ok()
}

fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(capture(date_time_regex(), value)?, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(capture(time_regex(), value)?, "%H:%M:%S%.f").ok()
}

fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        v if float_regex().is_match(v) => v.parse().ok(),
        _ => None,
    }
}

/// Significant (total, fraction) digits of a decimal literal
fn digit_counts(value: &str) -> (usize, usize) {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_digits = int_part.trim_start_matches('0').len();
    let frac_digits = frac_part.trim_end_matches('0').len();
    ((int_digits + frac_digits).max(1), frac_digits)
}

impl Builtin {
    pub fn from_name(local_name: &str) -> Option<Self> {
        BUILTIN_NAMES
            .iter()
            .find(|(name, _)| *name == local_name)
            .map(|(_, builtin)| *builtin)
    }

    pub fn name(&self) -> &'static str {
        BUILTIN_NAMES
            .iter()
            .find(|(_, builtin)| builtin == self)
            .map(|(name, _)| *name)
            .unwrap_or("anySimpleType")
    }

    pub fn whitespace(&self) -> WhiteSpace {
        match self {
            Builtin::AnySimpleType | Builtin::String => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    fn is_list(&self) -> bool {
        matches!(self, Builtin::NmTokens | Builtin::IdRefs | Builtin::Entities)
    }

    fn integer_bounds(&self) -> Option<(Option<i128>, Option<i128>)> {
        let bounds = match self {
            Builtin::Integer => (None, None),
            Builtin::Long => (Some(i64::MIN as i128), Some(i64::MAX as i128)),
            Builtin::Int => (Some(i32::MIN as i128), Some(i32::MAX as i128)),
            Builtin::Short => (Some(i16::MIN as i128), Some(i16::MAX as i128)),
            Builtin::Byte => (Some(i8::MIN as i128), Some(i8::MAX as i128)),
            Builtin::NonNegativeInteger => (Some(0), None),
            Builtin::PositiveInteger => (Some(1), None),
            Builtin::NonPositiveInteger => (None, Some(0)),
            Builtin::NegativeInteger => (None, Some(-1)),
            Builtin::UnsignedLong => (Some(0), Some(u64::MAX as i128)),
            Builtin::UnsignedInt => (Some(0), Some(u32::MAX as i128)),
            Builtin::UnsignedShort => (Some(0), Some(u16::MAX as i128)),
            Builtin::UnsignedByte => (Some(0), Some(u8::MAX as i128)),
            _ => return None,
        };
        Some(bounds)
    }

    /// Checks an already whitespace-normalized value against the lexical space
    pub fn check_lexical(&self, value: &str) -> Result<(), String> {
        let ok = match self {
            Builtin::AnySimpleType | Builtin::String | Builtin::NormalizedString | Builtin::Token => true,
            Builtin::AnyUri => !value.contains(' '),
            Builtin::Language => language_regex().is_match(value),
            Builtin::Name | Builtin::Id | Builtin::IdRef | Builtin::Entity => is_valid_name(value),
            Builtin::NcName => is_valid_name(value) && !value.contains(':'),
            Builtin::QName => {
                is_valid_name(value)
                    && value.split(':').count() <= 2
                    && value.split(':').all(|part| is_valid_name(part))
            }
            Builtin::NmToken => !value.is_empty() && value.chars().all(is_name_char),
            Builtin::NmTokens => {
                !value.is_empty() && value.split(' ').all(|t| !t.is_empty() && t.chars().all(is_name_char))
            }
            Builtin::IdRefs | Builtin::Entities => {
                !value.is_empty() && value.split(' ').all(is_valid_name)
            }
            Builtin::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Builtin::Decimal => decimal_regex().is_match(value),
            Builtin::Float | Builtin::Double => parse_float(value).is_some(),
            Builtin::Date => parse_date(value).is_some(),
            Builtin::DateTime => parse_date_time(value).is_some(),
            Builtin::Time => parse_time(value).is_some(),
            integer => {
                if !integer_regex().is_match(value) {
                    false
                } else {
                    match integer.integer_bounds() {
                        Some((None, None)) | None => true,
                        Some((min, max)) => match value.parse::<i128>() {
                            Ok(n) => min.is_none_or(|m| n >= m) && max.is_none_or(|m| n <= m),
                            Err(_) => false,
                        },
                    }
                }
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid {}", value, self.name()))
        }
    }

    fn ordered_value(&self, value: &str) -> Option<OrderedValue> {
        match self {
            Builtin::Date => parse_date(value).map(OrderedValue::Date),
            Builtin::DateTime => parse_date_time(value).map(OrderedValue::DateTime),
            Builtin::Time => parse_time(value).map(OrderedValue::Time),
            Builtin::Float | Builtin::Double => parse_float(value).map(OrderedValue::Number),
            b if *b == Builtin::Decimal || b.integer_bounds().is_some() => {
                value.parse::<f64>().ok().map(OrderedValue::Number)
            }
            _ => None,
        }
    }

    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            Builtin::Date | Builtin::DateTime | Builtin::Time | Builtin::Float | Builtin::Double | Builtin::Decimal
        ) || self.integer_bounds().is_some()
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A compiled `xs:pattern` facet. XSD patterns are implicitly anchored.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, String> {
        let mut translated = String::with_capacity(source.len());
        let mut chars = source.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                translated.push(c);
                continue;
            }
            match chars.next() {
                Some('i') => translated.push_str("[A-Za-z_:]"),
                Some('I') => translated.push_str("[^A-Za-z_:]"),
                Some('c') => translated.push_str("[-A-Za-z0-9._:]"),
                Some('C') => translated.push_str("[^-A-Za-z0-9._:]"),
                Some(other) => {
                    translated.push('\\');
                    translated.push(other);
                }
                None => return Err(format!("pattern '{}' ends with a lone backslash", source)),
            }
        }
        let regex = Regex::new(&format!("^(?:{})$", translated))
            .map_err(|e| format!("invalid pattern '{}': {}", source, e))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// One layer of constraining facets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facets {
    pub enumeration: Vec<String>,
    pub patterns: Vec<Pattern>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_exclusive: Option<String>,
    pub total_digits: Option<usize>,
    pub fraction_digits: Option<usize>,
    pub whitespace: Option<WhiteSpace>,
}

impl Facets {
    pub fn is_empty(&self) -> bool {
        *self == Facets::default()
    }

    fn bounds(&self) -> [(&Option<String>, &'static str, fn(Ordering) -> bool); 4] {
        [
            (&self.min_inclusive, "minInclusive", |o| o != Ordering::Less),
            (&self.max_inclusive, "maxInclusive", |o| o != Ordering::Greater),
            (&self.min_exclusive, "minExclusive", |o| o == Ordering::Greater),
            (&self.max_exclusive, "maxExclusive", |o| o == Ordering::Less),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Variety {
    Atomic(Builtin),
    List(Box<SimpleType>),
    Union(Vec<SimpleType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleType {
    pub name: Option<String>,
    pub variety: Variety,
    pub facets: Vec<Facets>,
}

impl SimpleType {
    pub fn builtin(builtin: Builtin) -> Self {
        Self {
            name: Some(builtin.name().to_string()),
            variety: Variety::Atomic(builtin),
            facets: Vec::new(),
        }
    }

    /// DTD enumerated attribute type `(a|b|c)`
    pub fn enumeration(values: Vec<String>) -> Self {
        Self {
            name: None,
            variety: Variety::Atomic(Builtin::NmToken),
            facets: vec![Facets {
                enumeration: values,
                ..Facets::default()
            }],
        }
    }

    pub fn list(item: SimpleType) -> Self {
        Self {
            name: None,
            variety: Variety::List(Box::new(item)),
            facets: Vec::new(),
        }
    }

    pub fn union(members: Vec<SimpleType>) -> Self {
        Self {
            name: None,
            variety: Variety::Union(members),
            facets: Vec::new(),
        }
    }

    /// Derives a new type by restriction, checking that ordered bound values
    /// are themselves valid for the base.
    pub fn restrict(base: &SimpleType, facets: Facets) -> Result<Self, String> {
        if let Variety::Atomic(builtin) = &base.variety {
            for (bound, facet, _) in facets.bounds() {
                if let Some(bound) = bound {
                    if !builtin.is_ordered() {
                        return Err(format!("{} is not applicable to {}", facet, builtin));
                    }
                    builtin.check_lexical(bound.trim())?;
                }
            }
        }
        let mut derived = base.clone();
        derived.name = None;
        if !facets.is_empty() {
            derived.facets.push(facets);
        }
        Ok(derived)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn atomic(&self) -> Option<Builtin> {
        match &self.variety {
            Variety::Atomic(builtin) => Some(*builtin),
            _ => None,
        }
    }

    pub fn is_id(&self) -> bool {
        self.atomic() == Some(Builtin::Id)
    }

    pub fn is_idref(&self) -> bool {
        matches!(self.atomic(), Some(Builtin::IdRef | Builtin::IdRefs))
    }

    fn whitespace(&self) -> WhiteSpace {
        self.facets
            .iter()
            .rev()
            .find_map(|f| f.whitespace)
            .unwrap_or(match &self.variety {
                Variety::Atomic(builtin) => builtin.whitespace(),
                _ => WhiteSpace::Collapse,
            })
    }

    /// Display name used in diagnostics
    pub fn describe(&self) -> String {
        match (&self.name, &self.variety) {
            (Some(name), _) => name.clone(),
            (None, Variety::Atomic(builtin)) => format!("restricted {}", builtin),
            (None, Variety::List(item)) => format!("list of {}", item.describe()),
            (None, Variety::Union(_)) => "union".to_string(),
        }
    }

    /// Validates `value`, returning the normalized form on success
    pub fn validate(&self, value: &str) -> Result<String, String> {
        let normalized = self.whitespace().normalize(value);

        let length = match &self.variety {
            Variety::Atomic(builtin) => {
                builtin.check_lexical(&normalized)?;
                if builtin.is_list() {
                    normalized.split(' ').filter(|s| !s.is_empty()).count()
                } else {
                    normalized.chars().count()
                }
            }
            Variety::List(item) => {
                let items: Vec<&str> = normalized.split(' ').filter(|s| !s.is_empty()).collect();
                for part in &items {
                    item.validate(part)?;
                }
                items.len()
            }
            Variety::Union(members) => {
                if !members.iter().any(|m| m.validate(&normalized).is_ok()) {
                    return Err(format!("'{}' matches no member of the union", normalized));
                }
                normalized.chars().count()
            }
        };

        for facets in &self.facets {
            self.check_facets(facets, &normalized, length)?;
        }
        Ok(normalized)
    }

    fn check_facets(&self, facets: &Facets, value: &str, length: usize) -> Result<(), String> {
        if !facets.enumeration.is_empty() && !facets.enumeration.iter().any(|e| e == value) {
            return Err(format!(
                "'{}' is not one of the allowed values ({})",
                value,
                facets.enumeration.join(", ")
            ));
        }
        if !facets.patterns.is_empty() && !facets.patterns.iter().any(|p| p.is_match(value)) {
            let patterns: Vec<_> = facets.patterns.iter().map(Pattern::source).collect();
            return Err(format!("'{}' does not match pattern '{}'", value, patterns.join("' or '")));
        }
        if let Some(expected) = facets.length {
            if length != expected {
                return Err(format!("'{}' has length {}, expected {}", value, length, expected));
            }
        }
        if let Some(min) = facets.min_length {
            if length < min {
                return Err(format!("'{}' is shorter than the minimum length {}", value, min));
            }
        }
        if let Some(max) = facets.max_length {
            if length > max {
                return Err(format!("'{}' is longer than the maximum length {}", value, max));
            }
        }

        if facets.total_digits.is_some() || facets.fraction_digits.is_some() {
            let (total, fraction) = digit_counts(value);
            if let Some(max) = facets.total_digits {
                if total > max {
                    return Err(format!("'{}' has more than {} total digits", value, max));
                }
            }
            if let Some(max) = facets.fraction_digits {
                if fraction > max {
                    return Err(format!("'{}' has more than {} fraction digits", value, max));
                }
            }
        }

        if let Some(builtin) = self.atomic() {
            for (bound, facet, accept) in facets.bounds() {
                let Some(bound) = bound else { continue };
                let (Some(actual), Some(limit)) =
                    (builtin.ordered_value(value), builtin.ordered_value(bound.trim()))
                else {
                    continue;
                };
                let ordering = actual.partial_cmp(&limit);
                if !ordering.is_some_and(accept) {
                    return Err(format!("'{}' violates {} {}", value, facet, bound.trim()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}
