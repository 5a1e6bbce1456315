// user.rs — Small helpers for presenting users.

use crate::types::User;

/// Drop users without an ID. Order is preserved.
///
/// OIDC-provisioned users may lack a name, but every real user has an ID.
pub fn filter_users_with_valid_ids(users: Vec<User>) -> Vec<User> {
    users.into_iter().filter(|u| !u.id.is_empty()).collect()
}

/// Best available label: name, then display name, then email, then ID.
///
/// Empty strings fall through to the next tier.
pub fn user_display_name(user: &User) -> &str {
    [
        Some(user.name.as_str()),
        user.display_name.as_deref(),
        user.email.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.is_empty())
    .unwrap_or(&user.id)
}
