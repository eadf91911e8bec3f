//! Reconciliation of one identity's entry in a remote ACL
//!
//! The remote object is the source of truth. The caller's `users` list is a
//! cache that gets replaced with the remote ACL before every change and then
//! mirrors the change that was made.

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use serde::Deserialize;
use vdcflow_cloud::{AclEntry, AclTarget, CloudApi};

/// Access right granted when none is requested
pub const DEFAULT_RIGHT: &str = "R";

/// What a synchronization did to the ACL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclChange {
    Unchanged,
    Added,
    Updated,
    Removed,
}

#[derive(Deserialize)]
struct IdentityName {
    name: String,
}

/// Applies single-identity ACL changes to an account or a space
pub struct AclSynchronizer<'a> {
    ctx: &'a EngineContext,
    client: &'a dyn CloudApi,
    target: AclTarget,
}

impl<'a> AclSynchronizer<'a> {
    pub fn new(ctx: &'a EngineContext, client: &'a dyn CloudApi, target: AclTarget) -> Self {
        Self {
            ctx,
            client,
            target,
        }
    }

    /// Canonical remote name of the Identity resource `identity`
    pub async fn resolve_identity(&self, identity: &str) -> Result<String> {
        let info: IdentityName = self.ctx.info(ResourceKind::Identity, identity).await?;
        Ok(info.name)
    }

    /// Replace `cache` with the remote ACL
    pub async fn refresh(&self, cache: &mut Vec<AclEntry>) -> Result<()> {
        *cache = self.client.list_acl(self.target).await?;
        Ok(())
    }

    /// Grant `right` on the target to `identity`
    #[tracing::instrument(skip(self, cache), fields(target = %self.target))]
    pub async fn authorize(
        &self,
        cache: &mut Vec<AclEntry>,
        identity: &str,
        right: &str,
    ) -> Result<AclChange> {
        let user = self.resolve_identity(identity).await?;
        self.refresh(cache).await?;

        if let Some(entry) = cache.iter_mut().find(|e| e.name == user) {
            if entry.right == right {
                tracing::debug!(%user, right, "Access right already granted");
                return Ok(AclChange::Unchanged);
            }
            if !self.client.update_access(self.target, &user, right).await? {
                return Err(EngineError::Runtime(format!(
                    "failed to update accesstype of user \"{}\"",
                    user
                )));
            }
            entry.right = right.to_string();
            tracing::info!(%user, right, "Updated access right");
            return Ok(AclChange::Updated);
        }

        if !self.client.authorize_user(self.target, &user, right).await? {
            return Err(EngineError::Runtime(format!(
                "failed to add user \"{}\"",
                user
            )));
        }
        cache.push(AclEntry::new(&user, right));
        tracing::info!(%user, right, "Authorized user");
        Ok(AclChange::Added)
    }

    /// Revoke every right `identity` holds on the target
    #[tracing::instrument(skip(self, cache), fields(target = %self.target))]
    pub async fn unauthorize(&self, cache: &mut Vec<AclEntry>, identity: &str) -> Result<AclChange> {
        let user = self.resolve_identity(identity).await?;
        self.refresh(cache).await?;

        let Some(position) = cache.iter().position(|e| e.name == user) else {
            tracing::debug!(%user, "User not in ACL");
            return Ok(AclChange::Unchanged);
        };
        if !self.client.unauthorize_user(self.target, &user).await? {
            return Err(EngineError::Runtime(format!(
                "failed to remove user \"{}\"",
                user
            )));
        }
        cache.remove(position);
        tracing::info!(%user, "Unauthorized user");
        Ok(AclChange::Removed)
    }
}
