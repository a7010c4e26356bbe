//! The actor on whose behalf a request is made.

/// The identity attached to a request.
///
/// Permission filtering is keyed by the actor; internal actors (system
/// background work) bypass sub-repo permission checks entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    /// An authenticated user, identified by platform user id.
    User(i32),
    /// An anonymous (unauthenticated) actor.
    Anonymous,
    /// The system itself; never filtered.
    Internal,
}

impl Actor {
    /// Creates a user actor.
    #[must_use]
    pub fn user(uid: i32) -> Self {
        Self::User(uid)
    }

    /// Creates the internal (system) actor.
    #[must_use]
    pub fn internal() -> Self {
        Self::Internal
    }

    /// Returns the user id, or 0 for anonymous/internal actors.
    #[must_use]
    pub fn uid(&self) -> i32 {
        match self {
            Self::User(uid) => *uid,
            Self::Anonymous | Self::Internal => 0,
        }
    }

    /// Returns true for the internal actor.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::Anonymous
    }
}
