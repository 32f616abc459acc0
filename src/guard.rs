//! Access decisions for front-end views and protected endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::roles::{ADMIN_ROLES, CHAT_ROLES, ORDER_ROLES, Role, RoleSet};

pub const SIGN_IN_PATH: &str = "/auth";
pub const HOME_PATH: &str = "/";

/// What the guard knows about the current session.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub is_loading: bool,
    pub authenticated: bool,
    pub roles: &'a RoleSet,
}

impl<'a> SessionView<'a> {
    #[must_use]
    pub fn anonymous(empty: &'a RoleSet) -> Self {
        Self {
            is_loading: false,
            authenticated: false,
            roles: empty,
        }
    }

    #[must_use]
    pub fn signed_in(roles: &'a RoleSet) -> Self {
        Self {
            is_loading: false,
            authenticated: true,
            roles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session roles are still loading; evaluate again once they arrive.
    Pending,
    DeniedUnauthenticated,
    DeniedUnauthorized,
    Allowed,
}

impl GuardDecision {
    #[must_use]
    pub const fn redirect_to(self) -> Option<&'static str> {
        match self {
            GuardDecision::DeniedUnauthenticated => Some(SIGN_IN_PATH),
            GuardDecision::DeniedUnauthorized => Some(HOME_PATH),
            GuardDecision::Pending | GuardDecision::Allowed => None,
        }
    }
}

/// Admits the session when it holds any one of `required`.
#[must_use]
pub fn evaluate(session: &SessionView<'_>, required: &[Role]) -> GuardDecision {
    if session.is_loading {
        return GuardDecision::Pending;
    }
    if !session.authenticated {
        return GuardDecision::DeniedUnauthenticated;
    }
    if !session.roles.has_any(required) {
        return GuardDecision::DeniedUnauthorized;
    }
    GuardDecision::Allowed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    Public,
    Authenticated,
    AnyOf(&'static [Role]),
}

#[must_use]
pub fn authorize(session: &SessionView<'_>, policy: AccessPolicy) -> GuardDecision {
    match policy {
        AccessPolicy::Public => GuardDecision::Allowed,
        AccessPolicy::Authenticated => {
            if session.is_loading {
                GuardDecision::Pending
            } else if session.authenticated {
                GuardDecision::Allowed
            } else {
                GuardDecision::DeniedUnauthenticated
            }
        }
        AccessPolicy::AnyOf(required) => evaluate(session, required),
    }
}

/// Front-end views, one per route of the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Home,
    Product,
    Cart,
    Checkout,
    Orders,
    Order,
    Auth,
    Profile,
    Admin,
    Chat,
}

impl View {
    #[must_use]
    pub const fn policy(self) -> AccessPolicy {
        match self {
            View::Home | View::Product | View::Cart | View::Checkout | View::Auth => {
                AccessPolicy::Public
            }
            View::Profile => AccessPolicy::Authenticated,
            View::Orders | View::Order => AccessPolicy::AnyOf(ORDER_ROLES),
            View::Admin => AccessPolicy::AnyOf(ADMIN_ROLES),
            View::Chat => AccessPolicy::AnyOf(CHAT_ROLES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(list: &[Role]) -> RoleSet {
        list.iter().copied().collect()
    }

    #[test]
    fn loading_session_is_pending() {
        let set = roles(&[Role::Admin]);
        let session = SessionView {
            is_loading: true,
            authenticated: true,
            roles: &set,
        };
        assert_eq!(evaluate(&session, ADMIN_ROLES), GuardDecision::Pending);
        assert_eq!(GuardDecision::Pending.redirect_to(), None);
    }

    #[test]
    fn anonymous_session_goes_to_sign_in() {
        let empty = RoleSet::new();
        let decision = evaluate(&SessionView::anonymous(&empty), ORDER_ROLES);
        assert_eq!(decision, GuardDecision::DeniedUnauthenticated);
        assert_eq!(decision.redirect_to(), Some("/auth"));
    }

    #[test]
    fn signed_in_without_roles_goes_home() {
        let empty = RoleSet::new();
        let decision = evaluate(&SessionView::signed_in(&empty), &[Role::Admin]);
        assert_eq!(decision, GuardDecision::DeniedUnauthorized);
        assert_eq!(decision.redirect_to(), Some("/"));
    }

    #[test]
    fn any_single_required_role_is_enough() {
        let set = roles(&[Role::Client]);
        let decision = evaluate(&SessionView::signed_in(&set), &[Role::Client, Role::Admin]);
        assert_eq!(decision, GuardDecision::Allowed);
    }

    #[test]
    fn view_policies_match_routes() {
        let empty = RoleSet::new();
        let supplier = roles(&[Role::Supplier]);
        let client = roles(&[Role::Client]);

        let anon = SessionView::anonymous(&empty);
        assert_eq!(authorize(&anon, View::Home.policy()), GuardDecision::Allowed);
        assert_eq!(
            authorize(&anon, View::Profile.policy()),
            GuardDecision::DeniedUnauthenticated
        );

        let signed_in = SessionView::signed_in(&empty);
        assert_eq!(authorize(&signed_in, View::Profile.policy()), GuardDecision::Allowed);

        let supplier_view = SessionView::signed_in(&supplier);
        assert_eq!(authorize(&supplier_view, View::Chat.policy()), GuardDecision::Allowed);
        assert_eq!(
            authorize(&supplier_view, View::Orders.policy()),
            GuardDecision::DeniedUnauthorized
        );

        let client_view = SessionView::signed_in(&client);
        assert_eq!(authorize(&client_view, View::Order.policy()), GuardDecision::Allowed);
        assert_eq!(
            authorize(&client_view, View::Admin.policy()),
            GuardDecision::DeniedUnauthorized
        );
    }
}
