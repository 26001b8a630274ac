//! In-memory [`TenantDirectory`] for tests: a fixed roster seeded by the
//! caller.

use std::collections::HashMap;

use async_trait::async_trait;
use lexai_core::error::LexResult;
use parking_lot::Mutex;

use super::{TenantDirectory, TenantMember};

#[derive(Default)]
pub struct FakeTenantDirectory {
    roster: Mutex<HashMap<String, Vec<TenantMember>>>,
}

impl FakeTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, tenant_id: impl Into<String>, members: Vec<TenantMember>) {
        self.roster.lock().insert(tenant_id.into(), members);
    }
}

#[async_trait]
impl TenantDirectory for FakeTenantDirectory {
    async fn members(&self, tenant_id: &str) -> LexResult<Vec<TenantMember>> {
        Ok(self.roster.lock().get(tenant_id).cloned().unwrap_or_default())
    }
}
