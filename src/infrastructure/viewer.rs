use crate::infrastructure::database::Guid;

/// Who is asking. Every read and write in the entity store is evaluated
/// against a viewer; guid 0 is the logged-out visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerContext {
    pub user_id: Guid,
    pub is_admin: bool,
    /// Include disabled entities in loads and queries
    pub show_hidden: bool,
}

impl ViewerContext {
    pub fn new(user_id: Guid) -> Self {
        ViewerContext {
            user_id,
            is_admin: false,
            show_hidden: false,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn admin(user_id: Guid) -> Self {
        ViewerContext {
            user_id,
            is_admin: true,
            show_hidden: false,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id > 0
    }

    /// Same viewer with the hidden-entity toggle set; `self` is left untouched
    pub fn with_hidden(&self, show_hidden: bool) -> Self {
        ViewerContext {
            show_hidden,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_toggle_does_not_leak() {
        let viewer = ViewerContext::new(7);
        let hidden = viewer.with_hidden(true);

        assert!(hidden.show_hidden);
        assert_eq!(hidden.user_id, 7);
        assert!(!viewer.show_hidden);
    }

    #[test]
    fn test_anonymous_is_not_logged_in() {
        assert!(!ViewerContext::anonymous().is_logged_in());
        assert!(ViewerContext::admin(1).is_logged_in());
    }
}
