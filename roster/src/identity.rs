use crate::types::Ocid;
use crate::upstream::{UpstreamCharacterApi, UpstreamError};
use std::collections::HashMap;

/// Per-sync memo of name → ocid lookups, so a name is resolved upstream at
/// most once while a sync runs. Unresolvable names are remembered as `None`.
pub struct IdentityResolver<'a> {
    upstream: &'a dyn UpstreamCharacterApi,
    known: HashMap<String, Option<Ocid>>,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(upstream: &'a dyn UpstreamCharacterApi) -> Self {
        IdentityResolver {
            upstream,
            known: HashMap::new(),
        }
    }

    pub fn remember(&mut self, name: &str, ocid: &str) {
        self.known.insert(name.to_string(), Some(ocid.to_string()));
    }

    pub async fn resolve(&mut self, name: &str) -> Result<Option<Ocid>, UpstreamError> {
        if let Some(known) = self.known.get(name) {
            return Ok(known.clone());
        }

        let ocid = self
            .upstream
            .resolve_identity(name)
            .await?
            .filter(|ocid| !ocid.trim().is_empty());
        self.known.insert(name.to_string(), ocid.clone());
        Ok(ocid)
    }
}
