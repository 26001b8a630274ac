//! MongoDB-backed [`DocumentStore`] (§6).
//!
//! Contracts and analyses are flat collections keyed by their own `id`
//! field (not `_id`) so the domain structs serialize/deserialize directly
//! with `serde` — no Mongo-specific wrapper type. Multi-writer safety for
//! the racy `alertsSent` append uses a conditional `update_one` (§5): the
//! filter excludes documents that already carry the threshold, so only one
//! caller's update matches.

use async_trait::async_trait;
use bson::doc;
use chrono::{DateTime, Utc};
use mongodb::options::FindOneAndUpdateOptions;
use mongodb::{Client, Collection, Database};

use crate::domain::{Analysis, AnalysisState, Contract, ContractDates};
use crate::error::{LexError, LexResult};
use crate::ports::document_store::DocumentStore;

pub struct MongoDocumentStore {
    db: Database,
}

impl MongoDocumentStore {
    pub async fn connect(uri: &str, db_name: &str) -> LexResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| LexError::InfrastructureDown(format!("mongo connect: {e}")))?;
        Ok(Self {
            db: client.database(db_name),
        })
    }

    fn contracts(&self) -> Collection<Contract> {
        self.db.collection("contracts")
    }

    fn analyses(&self) -> Collection<Analysis> {
        self.db.collection("analyses")
    }

    fn io_err(context: &str, e: impl std::fmt::Display) -> LexError {
        LexError::InfrastructureDown(format!("{context}: {e}"))
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn get_contract(&self, tenant_id: &str, contract_id: &str) -> LexResult<Option<Contract>> {
        self.contracts()
            .find_one(doc! { "id": contract_id, "tenant_id": tenant_id })
            .await
            .map_err(|e| Self::io_err("get_contract", e))
    }

    async fn insert_contract(&self, contract: &Contract) -> LexResult<()> {
        self.contracts()
            .insert_one(contract)
            .await
            .map_err(|e| Self::io_err("insert_contract", e))?;
        Ok(())
    }

    async fn append_version(&self, contract_id: &str, body: String) -> LexResult<Contract> {
        let fingerprint = crate::fingerprint::fingerprint(&body);
        let now = Utc::now();
        let version_doc = bson::to_bson(&serde_json::json!({
            "body": body,
            "fingerprint": fingerprint,
            "created_at": now,
        }))
        .map_err(|e| Self::io_err("append_version encode", e))?;

        let updated = self
            .contracts()
            .find_one_and_update(
                doc! { "id": contract_id },
                doc! {
                    "$set": { "body": &body, "fingerprint": &fingerprint, "updated_at": now },
                    "$push": { "versions": version_doc },
                },
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .return_document(mongodb::options::ReturnDocument::After)
                    .build(),
            )
            .await
            .map_err(|e| Self::io_err("append_version", e))?;

        updated.ok_or_else(|| LexError::NotFound(format!("contract {contract_id}")))
    }

    async fn update_contract_extraction(
        &self,
        contract_id: &str,
        dates: ContractDates,
        parties: Vec<String>,
    ) -> LexResult<()> {
        let mut set_doc = doc! {};
        if let Some(d) = dates.effective_date {
            set_doc.insert("dates.effective_date", d);
        }
        if let Some(d) = dates.expiry_date {
            set_doc.insert("dates.expiry_date", d);
        }
        if let Some(d) = dates.renewal_date {
            set_doc.insert("dates.renewal_date", d);
        }
        if !parties.is_empty() {
            set_doc.insert("parties", parties);
        }
        if set_doc.is_empty() {
            return Ok(());
        }
        self.contracts()
            .update_one(doc! { "id": contract_id }, doc! { "$set": set_doc })
            .await
            .map_err(|e| Self::io_err("update_contract_extraction", e))?;
        Ok(())
    }

    async fn try_record_alert_fired(
        &self,
        contract_id: &str,
        threshold_days: i64,
        fired_at: DateTime<Utc>,
    ) -> LexResult<bool> {
        // The filter excludes any document that already has this threshold,
        // so a concurrent scheduler run's matching update loses the race
        // and `modified_count == 0` (§4.10, §5).
        let result = self
            .contracts()
            .update_one(
                doc! {
                    "id": contract_id,
                    "alerts_sent.threshold_days": { "$ne": threshold_days },
                },
                doc! {
                    "$push": { "alerts_sent": { "threshold_days": threshold_days, "fired_at": fired_at } },
                },
            )
            .await
            .map_err(|e| Self::io_err("try_record_alert_fired", e))?;
        Ok(result.modified_count == 1)
    }

    async fn list_contracts_with_expiry(&self, tenant_id: Option<&str>) -> LexResult<Vec<Contract>> {
        use futures::TryStreamExt;

        let mut filter = doc! { "deleted": false, "dates.expiry_date": { "$ne": bson::Bson::Null } };
        if let Some(tenant_id) = tenant_id {
            filter.insert("tenant_id", tenant_id);
        }
        let cursor = self
            .contracts()
            .find(filter)
            .await
            .map_err(|e| Self::io_err("list_contracts_with_expiry", e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| Self::io_err("list_contracts_with_expiry collect", e))
    }

    async fn get_analysis(&self, tenant_id: &str, analysis_id: &str) -> LexResult<Option<Analysis>> {
        self.analyses()
            .find_one(doc! { "id": analysis_id, "tenant_id": tenant_id })
            .await
            .map_err(|e| Self::io_err("get_analysis", e))
    }

    async fn find_non_terminal_analysis(
        &self,
        contract_id: &str,
        version: u32,
    ) -> LexResult<Option<Analysis>> {
        self.analyses()
            .find_one(doc! {
                "contract_id": contract_id,
                "version": version,
                "state": { "$in": ["pending", "processing"] },
            })
            .await
            .map_err(|e| Self::io_err("find_non_terminal_analysis", e))
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> LexResult<()> {
        self.analyses()
            .insert_one(analysis)
            .await
            .map_err(|e| Self::io_err("insert_analysis", e))?;
        Ok(())
    }

    async fn set_analysis_state(&self, analysis_id: &str, state: AnalysisState) -> LexResult<()> {
        let state_str = match state {
            AnalysisState::Pending => "pending",
            AnalysisState::Processing => "processing",
            AnalysisState::Completed => "completed",
            AnalysisState::Failed => "failed",
        };
        self.analyses()
            .update_one(
                doc! { "id": analysis_id },
                doc! { "$set": { "state": state_str, "updated_at": Utc::now() } },
            )
            .await
            .map_err(|e| Self::io_err("set_analysis_state", e))?;
        Ok(())
    }

    async fn complete_analysis(&self, analysis: &Analysis) -> LexResult<()> {
        let encoded =
            bson::to_document(analysis).map_err(|e| Self::io_err("complete_analysis encode", e))?;
        self.analyses()
            .update_one(doc! { "id": &analysis.id }, doc! { "$set": encoded })
            .await
            .map_err(|e| Self::io_err("complete_analysis", e))?;
        Ok(())
    }

    async fn increment_retry(&self, analysis_id: &str) -> LexResult<u32> {
        let updated = self
            .analyses()
            .find_one_and_update(
                doc! { "id": analysis_id },
                doc! { "$inc": { "retry_count": 1 } },
            )
            .with_options(
                FindOneAndUpdateOptions::builder()
                    .return_document(mongodb::options::ReturnDocument::After)
                    .build(),
            )
            .await
            .map_err(|e| Self::io_err("increment_retry", e))?;
        updated
            .map(|a| a.retry_count)
            .ok_or_else(|| LexError::NotFound(format!("analysis {analysis_id}")))
    }
}
