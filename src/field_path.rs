use derive_more::Display;
use std::fmt;

/// CTF dynamic scopes, in the order in which they are laid out in a stream.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum Scope {
    #[display(fmt = "trace.packet.header")]
    TracePacketHeader,
    #[display(fmt = "stream.packet.context")]
    StreamPacketContext,
    #[display(fmt = "stream.event.header")]
    StreamEventHeader,
    #[display(fmt = "stream.event.context")]
    StreamEventContext,
    #[display(fmt = "event.context")]
    EventContext,
    #[display(fmt = "event.fields")]
    EventFields,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::TracePacketHeader,
        Scope::StreamPacketContext,
        Scope::StreamEventHeader,
        Scope::StreamEventContext,
        Scope::EventContext,
        Scope::EventFields,
    ];

    /// Split an absolute reference (`stream.event.header.id`) into its scope and the remainder.
    pub fn strip_prefix(reference: &str) -> Option<(Scope, &str)> {
        Scope::ALL.iter().find_map(|s| {
            let prefix = s.to_string();
            reference
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| (*s, rest))
        })
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FieldPathItem {
    /// Member of a structure or option of a variant
    Index(usize),
    /// The element of an array or sequence currently being decoded
    CurrentArrayElement,
}

/// Location of a field type within one of the dynamic scopes.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct FieldPath {
    scope: Scope,
    items: Vec<FieldPathItem>,
}

impl FieldPath {
    pub fn new(scope: Scope, items: Vec<FieldPathItem>) -> Self {
        Self { scope, items }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn items(&self) -> &[FieldPathItem] {
        &self.items
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scope)?;
        for item in self.items.iter() {
            match item {
                FieldPathItem::Index(i) => write!(f, "[{i}]")?,
                FieldPathItem::CurrentArrayElement => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn absolute_prefixes() {
        assert_eq!(
            Scope::strip_prefix("stream.event.header.id"),
            Some((Scope::StreamEventHeader, "id"))
        );
        assert_eq!(
            Scope::strip_prefix("event.fields.a.b"),
            Some((Scope::EventFields, "a.b"))
        );
        assert_eq!(Scope::strip_prefix("event.fieldsx"), None);
        assert_eq!(Scope::strip_prefix("len"), None);
    }

    #[test]
    fn display() {
        let p = FieldPath::new(
            Scope::EventFields,
            vec![FieldPathItem::Index(2), FieldPathItem::CurrentArrayElement],
        );
        assert_eq!(p.to_string(), "event.fields[2][*]");
    }
}
