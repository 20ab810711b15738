//! Catalog entities: domains, owners, tables and the immutable snapshot.
//!
//! The snapshot is populated by the indexing job (`POST /api/admin/catalog/sync`)
//! and read-only inside the retrieval pipeline. A generation counter allows
//! stale detection; a new snapshot replaces the prior one atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use utoipa::ToSchema;

/// Corporate trust classification of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum DataLayer {
    /// System of record
    SoR,
    /// System of truth
    SoT,
    /// Derived/specialized
    Spec,
}

impl DataLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoR => "SoR",
            Self::SoT => "SoT",
            Self::Spec => "Spec",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SoR" => Some(Self::SoR),
            "SoT" => Some(Self::SoT),
            "Spec" => Some(Self::Spec),
            _ => None,
        }
    }
}

/// Declared refresh cadence of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFrequency {
    Realtime,
    Daily,
    Weekly,
    Monthly,
}

impl UpdateFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realtime => "realtime",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "realtime" => Some(Self::Realtime),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub chief: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OwnerInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub domain_id: String,
    /// Historical approval rate in [0, 1]; defaults to 0.5 for new owners.
    #[serde(default = "default_approval_rate")]
    pub approval_rate: f64,
    #[serde(default)]
    pub tables_count: u32,
}

fn default_approval_rate() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableInfo {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    /// Condensed description, at most 200 chars.
    pub summary: String,
    pub domain_id: String,
    pub domain_name: String,
    pub owner_id: i64,
    pub owner_name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub granularity: Option<String>,
    #[serde(default)]
    pub main_entities: Vec<String>,
    pub data_layer: Option<DataLayer>,
    #[serde(default)]
    pub is_golden_source: bool,
    #[serde(default)]
    pub is_visao_cliente: bool,
    pub update_frequency: Option<UpdateFrequency>,
    pub inferred_product: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Immutable view over the indexed catalog.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub generation: u64,
    pub domains: HashMap<String, DomainInfo>,
    pub owners: HashMap<i64, OwnerInfo>,
    pub tables: HashMap<i64, TableInfo>,
}

impl CatalogSnapshot {
    /// Domains in a stable (id) order.
    pub fn domains_sorted(&self) -> Vec<&DomainInfo> {
        let mut out: Vec<&DomainInfo> = self.domains.values().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn owners_by_domain(&self, domain_id: &str) -> Vec<&OwnerInfo> {
        let mut out: Vec<&OwnerInfo> = self
            .owners
            .values()
            .filter(|o| o.domain_id == domain_id)
            .collect();
        out.sort_by_key(|o| o.id);
        out
    }

    pub fn table(&self, id: i64) -> Option<&TableInfo> {
        self.tables.get(&id)
    }

    /// Referential integrity of the snapshot: every table must resolve to a
    /// known owner and domain.
    pub fn check_integrity(&self) -> Result<(), String> {
        for table in self.tables.values() {
            if !self.owners.contains_key(&table.owner_id) {
                return Err(format!(
                    "table '{}' references unknown owner {}",
                    table.name, table.owner_id
                ));
            }
            if !self.domains.contains_key(&table.domain_id) {
                return Err(format!(
                    "table '{}' references unknown domain '{}'",
                    table.name, table.domain_id
                ));
            }
        }
        Ok(())
    }
}

/// Process-wide handle to the current snapshot; replaced wholesale on sync.
#[derive(Clone, Default)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<CatalogSnapshot>>>,
}

impl CatalogHandle {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self { inner: Arc::new(RwLock::new(Arc::new(snapshot))) }
    }

    pub fn load(&self) -> Arc<CatalogSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, snapshot: CatalogSnapshot) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_orphan_table() -> CatalogSnapshot {
        let mut snapshot = CatalogSnapshot { generation: 1, ..Default::default() };
        snapshot.tables.insert(
            1,
            TableInfo {
                id: 1,
                name: "tb_orfa".into(),
                display_name: "Tabela Órfã".into(),
                summary: String::new(),
                domain_id: "vendas".into(),
                domain_name: "Vendas".into(),
                owner_id: 99,
                owner_name: "ninguém".into(),
                keywords: vec![],
                granularity: None,
                main_entities: vec![],
                data_layer: None,
                is_golden_source: false,
                is_visao_cliente: false,
                update_frequency: None,
                inferred_product: None,
                last_updated: None,
            },
        );
        snapshot
    }

    #[test]
    fn integrity_check_rejects_unresolved_references() {
        let snapshot = snapshot_with_orphan_table();
        assert!(snapshot.check_integrity().is_err());
    }

    #[test]
    fn handle_swaps_snapshots_atomically() {
        let handle = CatalogHandle::new(CatalogSnapshot { generation: 1, ..Default::default() });
        assert_eq!(handle.load().generation, 1);
        handle.replace(CatalogSnapshot { generation: 2, ..Default::default() });
        assert_eq!(handle.load().generation, 2);
    }
}
