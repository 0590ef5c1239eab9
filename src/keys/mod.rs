//! Canonical storage key derivation.
//!
//! A resource is identified by (account, optional namespace, name) and
//! rendered onto the fixed key-space layout
//! `<prefix>/<account>/<namespace>/<name>` for namespaced kinds and
//! `<prefix>/<account>/<name>` for account-scoped kinds. Range scans by key
//! prefix are how "list everything under an account or namespace" is
//! implemented, so the segment order is significant and fixed. No segment
//! may contain the separator after validation.


use crate::constants::KEY_SEPARATOR;
use crate::errors::KeyError;
use crate::Result;

/// Logical identity of a stored resource.
///
/// `namespace` is present iff the resource kind is namespace-scoped; the
/// codec never infers scope, callers select the encoding variant matching
/// the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub account_id: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceIdentity {
    pub fn namespaced(
        account_id: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        ResourceIdentity {
            account_id: account_id.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn account_scoped(
        account_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        ResourceIdentity {
            account_id: account_id.into(),
            namespace: None,
            name: name.into(),
        }
    }
}

/// Characters a name segment may never contain
const NAME_MAY_NOT_CONTAIN: [char; 2] = [KEY_SEPARATOR, '%'];

fn validate_name(name: &str) -> std::result::Result<(), KeyError> {
    if name.is_empty() {
        return Err(KeyError::InvalidName {
            name: name.to_string(),
            reason: "may not be empty",
        });
    }
    if name == "." || name == ".." {
        return Err(KeyError::InvalidName {
            name: name.to_string(),
            reason: "may not be a relative path segment",
        });
    }
    if name.contains(&NAME_MAY_NOT_CONTAIN[..]) {
        return Err(KeyError::InvalidName {
            name: name.to_string(),
            reason: "may not contain '/' or '%'",
        });
    }
    Ok(())
}

pub(crate) fn validate_segment(
    segment: &'static str,
    value: &str,
) -> std::result::Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::InvalidSegment {
            segment,
            value: value.to_string(),
            reason: "may not be empty",
        });
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(KeyError::InvalidSegment {
            segment,
            value: value.to_string(),
            reason: "may not contain the key separator",
        });
    }
    Ok(())
}

/// Encodes a namespaced resource identity under `prefix`.
///
/// Pure function; performs no backend call.
///
/// # Errors
/// - [`KeyError::MissingNamespace`] when the identity carries no namespace
/// - [`KeyError::InvalidName`] / [`KeyError::InvalidSegment`] on malformed input
pub fn namespace_key(
    prefix: &str,
    identity: &ResourceIdentity,
) -> Result<String> {
    validate_name(&identity.name)?;
    validate_segment("account", &identity.account_id)?;
    let namespace = identity.namespace.as_deref().ok_or_else(|| KeyError::MissingNamespace {
        name: identity.name.clone(),
    })?;
    validate_segment("namespace", namespace)?;

    Ok(format!(
        "{prefix}{KEY_SEPARATOR}{account}{KEY_SEPARATOR}{namespace}{KEY_SEPARATOR}{name}",
        account = identity.account_id,
        name = identity.name,
    ))
}

/// Encodes an account-scoped (cluster-wide) resource identity under `prefix`.
///
/// # Errors
/// - [`KeyError::UnexpectedNamespace`] when the identity carries a namespace
/// - [`KeyError::InvalidName`] / [`KeyError::InvalidSegment`] on malformed input
pub fn account_key(
    prefix: &str,
    identity: &ResourceIdentity,
) -> Result<String> {
    validate_name(&identity.name)?;
    validate_segment("account", &identity.account_id)?;
    if let Some(namespace) = &identity.namespace {
        return Err(KeyError::UnexpectedNamespace {
            name: identity.name.clone(),
            namespace: namespace.clone(),
        }
        .into());
    }

    Ok(format!(
        "{prefix}{KEY_SEPARATOR}{account}{KEY_SEPARATOR}{name}",
        account = identity.account_id,
        name = identity.name,
    ))
}

/// Decodes a storage key back into the identity it was derived from.
///
/// The inverse of [`namespace_key`] / [`account_key`] under the fixed
/// segment order; used to label list results and watch events.
pub fn parse_key(
    prefix: &str,
    key: &str,
    namespaced: bool,
) -> Result<ResourceIdentity> {
    let malformed = || KeyError::MalformedKey { key: key.to_string() };

    let rest = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(KEY_SEPARATOR))
        .ok_or_else(malformed)?;
    let segments: Vec<&str> = rest.split(KEY_SEPARATOR).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(malformed().into());
    }

    match (namespaced, segments.as_slice()) {
        (true, [account_id, namespace, name]) => {
            Ok(ResourceIdentity::namespaced(*account_id, *namespace, *name))
        }
        (false, [account_id, name]) => Ok(ResourceIdentity::account_scoped(*account_id, *name)),
        _ => Err(malformed().into()),
    }
}
