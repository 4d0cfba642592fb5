//! User profile lookups consumed by country resolution.
//!
//! The profile store itself belongs to the account service; checkout
//! only needs the stored country of the authenticated user.

use async_trait::async_trait;
use dashmap::DashMap;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The country stored on the user's profile, if any.
    async fn country_of(&self, user_id: i64) -> Option<String>;
}

/// In-memory directory, seeded by whoever wires the application.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    countries: DashMap<i64, String>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_country(&self, user_id: i64, country: impl Into<String>) {
        self.countries.insert(user_id, country.into());
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn country_of(&self, user_id: i64) -> Option<String> {
        self.countries.get(&user_id).map(|c| c.clone())
    }
}
