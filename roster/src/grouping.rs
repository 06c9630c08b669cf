use crate::error::{Result, SyncError};
use crate::identity::IdentityResolver;
use crate::types::{Ocid, UnionMember};

/// Picks the canonical "main" character of a union group.
pub struct GroupingResolver;

impl GroupingResolver {
    /// The member with the highest union level. Ties go to the member that
    /// appears first in upstream order.
    pub fn top_member(members: &[UnionMember]) -> Option<&UnionMember> {
        let mut ranked: Vec<&UnionMember> = members.iter().collect();
        // sort_by is stable
        ranked.sort_by(|a, b| b.union_level.cmp(&a.union_level));
        ranked.first().copied()
    }

    /// Resolves the top member to its ocid. `Ok(None)` for an empty union list.
    ///
    /// An unresolvable top member fails the whole sync: the grouping parent
    /// is load-bearing.
    pub async fn resolve(
        identities: &mut IdentityResolver<'_>,
        members: &[UnionMember],
    ) -> Result<Option<Ocid>> {
        let Some(top) = Self::top_member(members) else {
            return Ok(None);
        };

        identities
            .resolve(&top.character_name)
            .await?
            .map(Some)
            .ok_or_else(|| SyncError::IdentityNotFound(top.character_name.clone()))
    }
}
