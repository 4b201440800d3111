use std::fmt;

/// Identifier lifecycle for entities that are created optimistically on
/// the client and later acknowledged by the backend.
///
/// A freshly placed node or drawn edge starts out `Provisional` with a
/// session-local sequence number. Once the backend responds to the create
/// call, the graph model re-keys the entity to the server-assigned
/// `Assigned` form and rewrites everything that referenced the old id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// Client-generated placeholder, unique within one editing session.
    Provisional(u64),
    /// Durable identifier assigned by the backend.
    Assigned(String),
}

impl EntityId {
    pub fn assigned(id: impl Into<String>) -> Self {
        EntityId::Assigned(id.into())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, EntityId::Provisional(_))
    }

    /// The server-side identifier, if this entity has been acknowledged.
    pub fn as_assigned(&self) -> Option<&str> {
        match self {
            EntityId::Assigned(id) => Some(id),
            EntityId::Provisional(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Provisional(seq) => write!(f, "tmp_{seq}"),
            EntityId::Assigned(id) => write!(f, "{id}"),
        }
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Assigned(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_and_assigned_render_distinctly() {
        assert_eq!(EntityId::Provisional(7).to_string(), "tmp_7");
        assert_eq!(EntityId::assigned("42").to_string(), "42");
        assert!(EntityId::Provisional(7).is_provisional());
        assert_eq!(EntityId::assigned("42").as_assigned(), Some("42"));
        assert_eq!(EntityId::Provisional(7).as_assigned(), None);
    }
}
