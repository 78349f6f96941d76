//! Actor scoping for session and message access.
//!
//! Every store operation receives an explicit [`ActorScope`] — there is no
//! ambient "current user". Authenticated actors own rows whose `user_id`
//! matches their id; anonymous actors own the pool of rows with a null
//! `user_id`. The two pools never overlap.

/// The identity a request acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorScope {
    /// Authenticated user, identified by numeric id.
    User(i64),
    /// Unauthenticated caller. Owns the null-owner pool.
    Anonymous,
}

impl ActorScope {
    /// Owner column value for rows created under this scope.
    pub fn user_id(self) -> Option<i64> {
        match self {
            ActorScope::User(id) => Some(id),
            ActorScope::Anonymous => None,
        }
    }

    /// Whether a row with the given owner id is visible to this scope.
    pub fn owns(self, owner: Option<i64>) -> bool {
        self.user_id() == owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_scope_owns_only_matching_rows() {
        let scope = ActorScope::User(7);
        assert!(scope.owns(Some(7)));
        assert!(!scope.owns(Some(8)));
        assert!(!scope.owns(None));
    }

    #[test]
    fn anonymous_scope_owns_only_null_rows() {
        let scope = ActorScope::Anonymous;
        assert!(scope.owns(None));
        assert!(!scope.owns(Some(1)));
    }
}
