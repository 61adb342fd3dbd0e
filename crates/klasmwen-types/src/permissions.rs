//! Role-permission policy.
//!
//! Authorization is a table lookup: every role lists which `(resource,
//! action)` pairs it may perform, either unconditionally or subject to an
//! ownership predicate. Anything not listed is denied.

use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Posts,
    Comments,
    Reports,
    Users,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Report,
}

/// A record with an owning user, checked by ownership predicates.
pub trait Owned {
    fn owner_id(&self) -> &str;
}

/// The authenticated caller: `{id, role}` attached by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    /// Anonymous caller on routes that allow reading without a token.
    pub fn guest() -> Self {
        Self {
            id: String::new(),
            role: Role::Guest,
        }
    }

    pub fn is_moderator(&self) -> bool {
        self.role.is_moderator()
    }
}

#[derive(Clone, Copy)]
pub enum Rule {
    Always(bool),
    Predicate(fn(&Identity, &dyn Owned) -> bool),
}

fn is_owner(identity: &Identity, data: &dyn Owned) -> bool {
    !identity.id.is_empty() && identity.id == data.owner_id()
}

type Entry = (Resource, Action, Rule);

use Action::*;
use Resource::*;

// Admins remove content but never edit it, their own included.
const ADMIN: &[Entry] = &[
    (Posts, Create, Rule::Always(true)),
    (Posts, Read, Rule::Always(true)),
    (Posts, Update, Rule::Always(false)),
    (Posts, Delete, Rule::Always(true)),
    (Posts, Report, Rule::Always(true)),
    (Comments, Create, Rule::Always(true)),
    (Comments, Read, Rule::Always(true)),
    (Comments, Update, Rule::Always(false)),
    (Comments, Delete, Rule::Always(true)),
    (Comments, Report, Rule::Always(true)),
    (Reports, Read, Rule::Always(true)),
    (Reports, Update, Rule::Always(true)),
    (Reports, Delete, Rule::Always(true)),
    (Users, Update, Rule::Always(true)),
];

const MODERATOR: &[Entry] = &[
    (Posts, Create, Rule::Always(true)),
    (Posts, Read, Rule::Always(true)),
    (Posts, Update, Rule::Predicate(is_owner)),
    (Posts, Delete, Rule::Always(true)),
    (Posts, Report, Rule::Always(true)),
    (Comments, Create, Rule::Always(true)),
    (Comments, Read, Rule::Always(true)),
    (Comments, Update, Rule::Predicate(is_owner)),
    (Comments, Delete, Rule::Always(true)),
    (Comments, Report, Rule::Always(true)),
    (Reports, Read, Rule::Always(true)),
    (Reports, Update, Rule::Always(true)),
    (Reports, Delete, Rule::Always(true)),
];

const STUDENT: &[Entry] = &[
    (Posts, Create, Rule::Always(true)),
    (Posts, Read, Rule::Always(true)),
    (Posts, Update, Rule::Predicate(is_owner)),
    (Posts, Delete, Rule::Predicate(is_owner)),
    (Posts, Report, Rule::Always(true)),
    (Comments, Create, Rule::Always(true)),
    (Comments, Read, Rule::Always(true)),
    (Comments, Update, Rule::Predicate(is_owner)),
    (Comments, Delete, Rule::Predicate(is_owner)),
    (Comments, Report, Rule::Always(true)),
];

const GUEST: &[Entry] = &[
    (Posts, Read, Rule::Always(true)),
    (Comments, Read, Rule::Always(true)),
];

pub fn policy(role: Role) -> &'static [Entry] {
    match role {
        Role::Admin => ADMIN,
        Role::Moderator => MODERATOR,
        Role::Student => STUDENT,
        Role::Guest => GUEST,
    }
}

pub fn rule_for(role: Role, resource: Resource, action: Action) -> Option<Rule> {
    policy(role)
        .iter()
        .find(|(r, a, _)| *r == resource && *a == action)
        .map(|(_, _, rule)| *rule)
}

/// Fail-closed permission check. Predicate rules are never evaluated without
/// a subject; they deny instead.
pub fn has_permission(
    identity: &Identity,
    resource: Resource,
    action: Action,
    data: Option<&dyn Owned>,
) -> bool {
    match rule_for(identity.role, resource, action) {
        None => false,
        Some(Rule::Always(allowed)) => allowed,
        Some(Rule::Predicate(check)) => data.is_some_and(|subject| check(identity, subject)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Authored(&'static str);

    impl Owned for Authored {
        fn owner_id(&self) -> &str {
            self.0
        }
    }

    const ROLES: [Role; 4] = [Role::Admin, Role::Moderator, Role::Student, Role::Guest];
    const ACTIONS: [Action; 5] = [Create, Read, Update, Delete, Report];

    #[test]
    fn owner_may_update_own_post() {
        let user = Identity::new("u1", Role::Student);
        let post = Authored("u1");
        let other = Authored("u2");
        assert!(has_permission(&user, Posts, Update, Some(&post)));
        assert!(!has_permission(&user, Posts, Update, Some(&other)));
    }

    #[test]
    fn admin_deletes_but_never_edits() {
        let admin = Identity::new("u1", Role::Admin);
        let post = Authored("u1");
        assert!(!has_permission(&admin, Posts, Update, Some(&post)));
        assert!(has_permission(&admin, Posts, Delete, Some(&post)));
        assert!(has_permission(&admin, Comments, Delete, None));
    }

    #[test]
    fn predicates_without_subject_deny() {
        for role in ROLES {
            let user = Identity::new("u1", role);
            for resource in [Posts, Comments] {
                for action in ACTIONS {
                    if let Some(Rule::Predicate(_)) = rule_for(role, resource, action) {
                        assert!(!has_permission(&user, resource, action, None));
                    }
                }
            }
        }
    }

    #[test]
    fn unlisted_pairs_deny() {
        let student = Identity::new("u1", Role::Student);
        assert!(!has_permission(&student, Reports, Read, None));
        assert!(!has_permission(&student, Users, Update, Some(&Authored("u1"))));
    }

    #[test]
    fn guest_is_read_only() {
        let guest = Identity::guest();
        assert!(has_permission(&guest, Posts, Read, None));
        assert!(has_permission(&guest, Comments, Read, None));
        for action in [Create, Update, Delete, Report] {
            assert!(!has_permission(&guest, Posts, action, Some(&Authored(""))));
            assert!(!has_permission(&guest, Comments, action, Some(&Authored(""))));
        }
    }

    #[test]
    fn moderator_deletes_any_comment_but_edits_only_own() {
        let moderator = Identity::new("m1", Role::Moderator);
        assert!(has_permission(&moderator, Comments, Delete, Some(&Authored("u9"))));
        assert!(!has_permission(&moderator, Comments, Update, Some(&Authored("u9"))));
        assert!(has_permission(&moderator, Comments, Update, Some(&Authored("m1"))));
    }

    #[test]
    fn student_deletes_only_own_comment() {
        let student = Identity::new("u1", Role::Student);
        assert!(has_permission(&student, Comments, Delete, Some(&Authored("u1"))));
        assert!(!has_permission(&student, Comments, Delete, Some(&Authored("u2"))));
    }
}
