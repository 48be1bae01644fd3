//! Venue credentials from configuration

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::common::errors::{EngineError, Result};
use crate::common::traits::AccountService;
use crate::common::types::{Venue, VenueCredentials};
use crate::config::types::AccountConfig;

/// Credentials keyed by (user, venue), built once from configuration
#[derive(Default)]
pub struct ConfigAccountService {
    accounts: HashMap<(String, Venue), VenueCredentials>,
}

impl ConfigAccountService {
    pub fn new(accounts: &[AccountConfig]) -> Self {
        let accounts = accounts
            .iter()
            .map(|a| {
                (
                    (a.user_id.clone(), a.venue),
                    VenueCredentials {
                        venue: a.venue,
                        api_key: a.api_key.clone(),
                        secret_key: a.secret_key.clone(),
                        subaccount: a.subaccount.clone(),
                    },
                )
            })
            .collect();
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountService for ConfigAccountService {
    async fn read_credentials(&self, user_id: &str, venue: Venue) -> Result<VenueCredentials> {
        let credentials = self
            .accounts
            .get(&(user_id.to_string(), venue))
            .ok_or_else(|| {
                EngineError::not_found("account.no_credentials")
                    .with("user_id", user_id)
                    .with("venue", venue)
            })?;

        if credentials.api_key.is_empty() || credentials.secret_key.is_empty() {
            return Err(EngineError::unauthenticated("account.empty_credentials")
                .with("user_id", user_id)
                .with("venue", venue));
        }
        debug!(user_id, venue = %venue, "read credentials");
        Ok(credentials.clone())
    }
}
