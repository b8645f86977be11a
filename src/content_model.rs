//! Content-model grammar over child element names
//!
//! Matching uses Brzozowski-style derivatives: after each child element the
//! parent's expectation is replaced by the derivative of its particle with
//! respect to that child's name. A particle that is `nullable` accepts the
//! end of the parent element.

use std::fmt;

/// Index of an element declaration inside a `SchemaModel`
pub type DeclId = usize;

/// Placeholder used while a content model is being built, before names are
/// resolved to declarations
pub const UNRESOLVED: DeclId = DeclId::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Particle {
    /// Matches the empty sequence only
    Empty,
    /// Matches nothing
    NotAllowed,
    Element {
        name: String,
        decl: DeclId,
    },
    /// Wildcard (`ANY` children, `xs:any`)
    Any,
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    /// `xs:all`: each member at most once, in any order
    All(Vec<Particle>),
    Repeat {
        particle: Box<Particle>,
        min: u32,
        max: Option<u32>,
    },
}

/// What a child element matched when the particle was advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matched {
    Element(DeclId),
    Wildcard,
}

impl Particle {
    pub fn element(name: impl Into<String>, decl: DeclId) -> Self {
        Particle::Element {
            name: name.into(),
            decl,
        }
    }

    /// Builds `particle{min,max}`, simplifying the trivial bounds
    pub fn repeat(particle: Particle, min: u32, max: Option<u32>) -> Self {
        if max == Some(0) {
            return Particle::Empty;
        }
        match particle {
            Particle::Empty => Particle::Empty,
            Particle::NotAllowed if min == 0 => Particle::Empty,
            Particle::NotAllowed => Particle::NotAllowed,
            particle if min == 1 && max == Some(1) => particle,
            particle => Particle::Repeat {
                particle: Box::new(particle),
                min,
                max,
            },
        }
    }

    pub fn sequence(items: Vec<Particle>) -> Self {
        items
            .into_iter()
            .rev()
            .fold(Particle::Empty, |rest, item| Particle::group(item, rest))
    }

    pub fn choice(items: Vec<Particle>) -> Self {
        items
            .into_iter()
            .fold(Particle::NotAllowed, Particle::alternative)
    }

    /// Sequential composition of two particles
    pub fn group(first: Particle, rest: Particle) -> Self {
        match (first, rest) {
            (Particle::NotAllowed, _) | (_, Particle::NotAllowed) => Particle::NotAllowed,
            (Particle::Empty, rest) => rest,
            (first, Particle::Empty) => first,
            (Particle::Sequence(mut items), Particle::Sequence(more)) => {
                items.extend(more);
                Particle::Sequence(items)
            }
            (Particle::Sequence(mut items), rest) => {
                items.push(rest);
                Particle::Sequence(items)
            }
            (first, Particle::Sequence(mut items)) => {
                items.insert(0, first);
                Particle::Sequence(items)
            }
            (first, rest) => Particle::Sequence(vec![first, rest]),
        }
    }

    /// Alternation that drops `NotAllowed` branches and duplicate members
    pub fn alternative(left: Particle, right: Particle) -> Self {
        match (left, right) {
            (Particle::NotAllowed, other) | (other, Particle::NotAllowed) => other,
            (left, right) if left == right => left,
            (left, right) => {
                let mut members = match left {
                    Particle::Choice(items) => items,
                    other => vec![other],
                };
                let incoming = match right {
                    Particle::Choice(items) => items,
                    other => vec![other],
                };
                for item in incoming {
                    if !members.contains(&item) {
                        members.push(item);
                    }
                }
                if members.len() == 1 {
                    members.pop().unwrap_or(Particle::NotAllowed)
                } else {
                    Particle::Choice(members)
                }
            }
        }
    }

    /// Whether the particle accepts an empty remainder
    pub fn nullable(&self) -> bool {
        match self {
            Particle::Empty => true,
            Particle::NotAllowed | Particle::Element { .. } | Particle::Any => false,
            Particle::Sequence(items) | Particle::All(items) => items.iter().all(Particle::nullable),
            Particle::Choice(items) => items.iter().any(Particle::nullable),
            Particle::Repeat { particle, min, .. } => *min == 0 || particle.nullable(),
        }
    }

    /// Advances past a child named `name`. Returns the remainder and what
    /// the child matched; a `NotAllowed` remainder means the child is not
    /// permitted here.
    pub fn derive(&self, name: &str) -> (Particle, Option<Matched>) {
        let mut matched = None;
        let next = self.derive_into(name, &mut matched);
        if next == Particle::NotAllowed {
            (next, None)
        } else {
            (next, matched)
        }
    }

    fn derive_into(&self, name: &str, matched: &mut Option<Matched>) -> Particle {
        match self {
            Particle::Empty | Particle::NotAllowed => Particle::NotAllowed,
            Particle::Element { name: n, decl } => {
                if n == name {
                    matched.get_or_insert(Matched::Element(*decl));
                    Particle::Empty
                } else {
                    Particle::NotAllowed
                }
            }
            Particle::Any => {
                matched.get_or_insert(Matched::Wildcard);
                Particle::Empty
            }
            Particle::Sequence(items) => {
                let Some((head, tail)) = items.split_first() else {
                    return Particle::NotAllowed;
                };
                let rest = Particle::sequence(tail.to_vec());
                let consumed = Particle::group(head.derive_into(name, matched), rest.clone());
                if head.nullable() {
                    Particle::alternative(consumed, rest.derive_into(name, matched))
                } else {
                    consumed
                }
            }
            Particle::Choice(items) => items
                .iter()
                .map(|item| item.derive_into(name, matched))
                .fold(Particle::NotAllowed, Particle::alternative),
            Particle::All(items) => {
                for (i, item) in items.iter().enumerate() {
                    let d = item.derive_into(name, matched);
                    if d != Particle::NotAllowed {
                        let mut remaining = items.clone();
                        remaining.remove(i);
                        let rest = if remaining.is_empty() {
                            Particle::Empty
                        } else {
                            Particle::All(remaining)
                        };
                        return Particle::group(d, rest);
                    }
                }
                Particle::NotAllowed
            }
            Particle::Repeat { particle, min, max } => {
                let d = particle.derive_into(name, matched);
                if d == Particle::NotAllowed {
                    return Particle::NotAllowed;
                }
                let rest = Particle::repeat(
                    (**particle).clone(),
                    min.saturating_sub(1),
                    max.map(|m| m.saturating_sub(1)),
                );
                Particle::group(d, rest)
            }
        }
    }

    /// Element names (or `*` for a wildcard) acceptable as the next child
    pub fn expected(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_first(&mut names);
        names
    }

    fn collect_first(&self, names: &mut Vec<String>) {
        fn push(names: &mut Vec<String>, n: &str) {
            if !names.iter().any(|existing| existing == n) {
                names.push(n.to_string());
            }
        }
        match self {
            Particle::Empty | Particle::NotAllowed => {}
            Particle::Element { name, .. } => push(names, name),
            Particle::Any => push(names, "*"),
            Particle::Sequence(items) => {
                for item in items {
                    item.collect_first(names);
                    if !item.nullable() {
                        break;
                    }
                }
            }
            Particle::Choice(items) | Particle::All(items) => {
                for item in items {
                    item.collect_first(names);
                }
            }
            Particle::Repeat { particle, .. } => particle.collect_first(names),
        }
    }

    /// Rewrites every element reference through `resolve`, which maps a
    /// referenced name to its declaration.
    pub fn resolve<E>(&mut self, resolve: &mut impl FnMut(&str) -> Result<DeclId, E>) -> Result<(), E> {
        match self {
            Particle::Element { name, decl } => {
                if *decl == UNRESOLVED {
                    *decl = resolve(name)?;
                }
                Ok(())
            }
            Particle::Sequence(items) | Particle::Choice(items) | Particle::All(items) => {
                items.iter_mut().try_for_each(|item| item.resolve(resolve))
            }
            Particle::Repeat { particle, .. } => particle.resolve(resolve),
            Particle::Empty | Particle::NotAllowed | Particle::Any => Ok(()),
        }
    }
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Particle], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, "{}", sep)?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, ")")
        }
        match self {
            Particle::Empty => write!(f, "EMPTY"),
            Particle::NotAllowed => write!(f, "#NONE"),
            Particle::Element { name, .. } => write!(f, "{}", name),
            Particle::Any => write!(f, "ANY"),
            Particle::Sequence(items) => join(f, items, ","),
            Particle::Choice(items) => join(f, items, "|"),
            Particle::All(items) => join(f, items, "&"),
            Particle::Repeat { particle, min, max } => match (min, max) {
                (0, Some(1)) => write!(f, "{}?", particle),
                (0, None) => write!(f, "{}*", particle),
                (1, None) => write!(f, "{}+", particle),
                (min, Some(max)) => write!(f, "{}{{{},{}}}", particle, min, max),
                (min, None) => write!(f, "{}{{{},}}", particle, min),
            },
        }
    }
}
