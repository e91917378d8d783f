//! Per-invocation session state.
//!
//! Owned by the top-level caller and passed down explicitly. Nothing in the
//! engine keeps process-wide flags.

/// Notices and flags scoped to one caller session.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    legacy_notice_shown: bool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time it is called in a session, false afterwards.
    ///
    /// Used to print the "nodes without provenance were matched by type"
    /// notice once, however many workflows are resolved.
    pub fn take_legacy_notice(&mut self) -> bool {
        !std::mem::replace(&mut self.legacy_notice_shown, true)
    }

    pub fn legacy_notice_shown(&self) -> bool {
        self.legacy_notice_shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_notice_is_shown_once_per_session() {
        let mut session = SessionContext::new();
        assert!(!session.legacy_notice_shown());
        assert!(session.take_legacy_notice());
        assert!(!session.take_legacy_notice());
        assert!(session.legacy_notice_shown());

        let mut other = SessionContext::new();
        assert!(other.take_legacy_notice());
    }
}
