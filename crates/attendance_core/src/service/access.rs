//! Write-privilege gate consumed from the access-control collaborator.

/// Answers whether the current caller may write attendance.
pub trait AccessControl {
    fn has_write_privilege(&self) -> bool;
}

/// Fixed privilege decision, e.g. resolved once at sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrivilege {
    Granted,
    Denied,
}

impl AccessControl for WritePrivilege {
    fn has_write_privilege(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl AccessControl for bool {
    fn has_write_privilege(&self) -> bool {
        *self
    }
}

impl<A: AccessControl + ?Sized> AccessControl for &A {
    fn has_write_privilege(&self) -> bool {
        (**self).has_write_privilege()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessControl, WritePrivilege};

    #[test]
    fn fixed_privileges_answer_directly() {
        assert!(WritePrivilege::Granted.has_write_privilege());
        assert!(!WritePrivilege::Denied.has_write_privilege());
        assert!(true.has_write_privilege());
        assert!(!(&false).has_write_privilege());
    }
}
