//! Authorization gate.
//!
//! Each `(Resource, Action)` pair resolves to a fixed list of permissions
//! through a `match`. A request passes when every permission allows it: first
//! the scheme-level check for the action, then, for actions bound to a single
//! record, the object-level check against that record's owner.

use axum::http::Method;
use scribe_common::ScribeError;

use super::Caller;

/// Protected resource families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Snippets,
}

/// Viewset-style actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
    Highlight,
}

impl Action {
    /// HTTP method that dispatches to this action
    pub fn method(&self) -> Method {
        match self {
            Self::List | Self::Retrieve | Self::Highlight => Method::GET,
            Self::Create => Method::POST,
            Self::Update => Method::PUT,
            Self::PartialUpdate => Method::PATCH,
            Self::Destroy => Method::DELETE,
        }
    }

    /// Whether the action targets a single record
    pub fn is_detail(&self) -> bool {
        !matches!(self, Self::List | Self::Create)
    }
}

/// GET, HEAD and OPTIONS never modify state
pub fn is_safe_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS
}

/// A single permission rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Caller must be authenticated
    IsAuthenticated,
    /// Anonymous callers may only use safe methods
    IsAuthenticatedOrReadOnly,
    /// Only the owner may read or write the record
    IsOwner,
    /// Anyone may read; only the owner may write
    IsOwnerOrReadOnly,
}

impl Permission {
    /// Scheme-level check, before any record is loaded
    pub fn has_permission(&self, caller: &Caller, method: &Method) -> bool {
        match self {
            Self::IsAuthenticated => caller.is_authenticated(),
            Self::IsAuthenticatedOrReadOnly => {
                is_safe_method(method) || caller.is_authenticated()
            }
            Self::IsOwner | Self::IsOwnerOrReadOnly => true,
        }
    }

    /// Object-level check against the record's owner id
    pub fn has_object_permission(&self, caller: &Caller, method: &Method, owner_id: u64) -> bool {
        match self {
            Self::IsAuthenticated | Self::IsAuthenticatedOrReadOnly => true,
            Self::IsOwner => caller.user_id() == Some(owner_id),
            Self::IsOwnerOrReadOnly => {
                is_safe_method(method) || caller.user_id() == Some(owner_id)
            }
        }
    }
}

/// Effective permissions for an action on a resource
pub fn policy(resource: Resource, action: Action) -> &'static [Permission] {
    use Permission::*;

    match (resource, action) {
        (Resource::Users, Action::List) => &[IsAuthenticated],
        (Resource::Users, _) => &[],
        (Resource::Snippets, _) => &[IsAuthenticatedOrReadOnly, IsOwnerOrReadOnly],
    }
}

/// Scheme-level decision for `action`
pub fn authorize(caller: &Caller, resource: Resource, action: Action) -> Result<(), ScribeError> {
    let method = action.method();
    for permission in policy(resource, action) {
        if !permission.has_permission(caller, &method) {
            tracing::debug!(
                ?resource,
                ?action,
                ?permission,
                user_id = ?caller.user_id(),
                "Permission denied"
            );
            return Err(ScribeError::Forbidden);
        }
    }
    Ok(())
}

/// Full decision for an action bound to a record owned by `owner_id`
pub fn authorize_object(
    caller: &Caller,
    resource: Resource,
    action: Action,
    owner_id: u64,
) -> Result<(), ScribeError> {
    authorize(caller, resource, action)?;
    if !action.is_detail() {
        return Ok(());
    }

    let method = action.method();
    for permission in policy(resource, action) {
        if !permission.has_object_permission(caller, &method, owner_id) {
            tracing::debug!(
                ?resource,
                ?action,
                ?permission,
                owner_id,
                user_id = ?caller.user_id(),
                "Object permission denied"
            );
            return Err(ScribeError::Forbidden);
        }
    }
    Ok(())
}
