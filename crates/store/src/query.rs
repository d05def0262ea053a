//! Parameterized query predicates (spec §9): the core never builds query
//! strings by concatenation. A tenant filter is a bound parameter whose
//! format is validated before binding, not a spliced string.

use std::collections::BTreeSet;

use forge_primitives::StoreError;

/// A validated tenant identifier. Construction is the only way to obtain
/// one, so a `TenantId` passed down to a store implementation is always
/// known-good by the time it is bound as a query parameter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(StoreError::Conflict(format!("invalid tenant id: {raw}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapsuleQuery {
    pub tags: Option<BTreeSet<String>>,
    pub owner: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tenant_ids_with_invalid_characters() {
        assert!(TenantId::parse("acme-corp_1").is_ok());
        assert!(TenantId::parse("acme corp; DROP TABLE").is_err());
        assert!(TenantId::parse("").is_err());
    }
}
