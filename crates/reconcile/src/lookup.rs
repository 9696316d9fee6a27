//! Interchangeable strategies for finding the target row of a source key.

use crate::cache::PagedTargetCache;
use crate::error::{ReconcileError, Result};
use crate::table::{SourceTable, TargetTable};
use async_trait::async_trait;
use mirror_core::{KeyProjection, PrimaryKey, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::info;

/// Finds, and consumes, the target row matching a source key.
///
/// A target row is handed out at most once per run.
#[async_trait]
pub trait TargetLookup: Send + Sync {
    async fn take(&self, key: &PrimaryKey) -> Result<Option<Row>>;

    /// Name recorded in run reports.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: SourceTable + ?Sized> TargetLookup for PagedTargetCache<'_, T> {
    async fn take(&self, key: &PrimaryKey) -> Result<Option<Row>> {
        self.lookup(key).await
    }

    fn name(&self) -> &'static str {
        "paged"
    }
}

/// One keyed query per source row. No caching at all.
pub struct PointLookup<'a, T: TargetTable> {
    target: &'a T,
}

impl<'a, T: TargetTable> PointLookup<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self { target }
    }
}

#[async_trait]
impl<T: TargetTable> TargetLookup for PointLookup<'_, T> {
    async fn take(&self, key: &PrimaryKey) -> Result<Option<Row>> {
        self.target.fetch_row(key).await
    }

    fn name(&self) -> &'static str {
        "point"
    }
}

/// Whole target loaded into a hash map before streaming starts.
pub struct FullScanLookup {
    rows: Mutex<HashMap<PrimaryKey, Row>>,
}

impl FullScanLookup {
    pub async fn load<T: SourceTable + ?Sized>(
        target: &T,
        projection: &KeyProjection,
        page_size: usize,
    ) -> Result<Self> {
        let mut rows = HashMap::new();
        let mut after: Option<PrimaryKey> = None;
        loop {
            let page = target.fetch_page(after.as_ref(), page_size).await?;
            let short = page.len() < page_size;
            for row in page {
                let key = projection.project(&row)?;
                after = Some(key.clone());
                if rows.insert(key.clone(), row).is_some() {
                    return Err(ReconcileError::DataShape(format!(
                        "target returned key {key} more than once"
                    )));
                }
            }
            if short {
                break;
            }
        }
        info!("Loaded {} target rows for full-scan comparison", rows.len());
        Ok(Self {
            rows: Mutex::new(rows),
        })
    }
}

#[async_trait]
impl TargetLookup for FullScanLookup {
    async fn take(&self, key: &PrimaryKey) -> Result<Option<Row>> {
        Ok(self.rows.lock().await.remove(key))
    }

    fn name(&self) -> &'static str {
        "full-scan"
    }
}

/// Requested lookup strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Full scan for targets no larger than one page, paged cache otherwise
    #[default]
    Auto,
    #[serde(rename = "paged")]
    PagedCache,
    #[serde(rename = "point")]
    PointLookup,
    FullScan,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "paged" | "paged-cache" => Ok(Self::PagedCache),
            "point" | "point-lookup" => Ok(Self::PointLookup),
            "full-scan" | "fullscan" | "full" => Ok(Self::FullScan),
            other => Err(format!(
                "unknown strategy '{other}', expected one of: auto, paged, point, full-scan"
            )),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::PagedCache => "paged",
            Self::PointLookup => "point",
            Self::FullScan => "full-scan",
        };
        f.write_str(name)
    }
}

/// Build the lookup for `kind`, resolving `Auto` from the target's size.
pub async fn select_lookup<'a, T: TargetTable>(
    kind: StrategyKind,
    target: &'a T,
    projection: KeyProjection,
    page_size: usize,
) -> Result<Box<dyn TargetLookup + 'a>> {
    let resolved = match kind {
        StrategyKind::Auto => {
            let estimate = target.estimate_rows().await?;
            let chosen = if estimate <= page_size as u64 {
                StrategyKind::FullScan
            } else {
                StrategyKind::PagedCache
            };
            info!("Estimated {estimate} target rows, using {chosen} lookup");
            chosen
        }
        other => other,
    };

    Ok(match resolved {
        StrategyKind::FullScan => {
            Box::new(FullScanLookup::load(target, &projection, page_size).await?)
        }
        StrategyKind::PointLookup => Box::new(PointLookup::new(target)),
        StrategyKind::Auto | StrategyKind::PagedCache => {
            Box::new(PagedTargetCache::new(target, projection, page_size))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;
    use mirror_core::Value;

    async fn target(count: i64) -> MemoryTable {
        let table = MemoryTable::from_names("public.t", &["id", "val"], &["id"]).unwrap();
        for id in 1..=count {
            table.seed(vec![Value::Int(id), Value::from("x")]).await.unwrap();
        }
        table
    }

    fn projection(table: &MemoryTable) -> KeyProjection {
        KeyProjection::from_names(table.schema().layout(), &["id"]).unwrap()
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("auto".parse::<StrategyKind>(), Ok(StrategyKind::Auto));
        assert_eq!("Paged".parse::<StrategyKind>(), Ok(StrategyKind::PagedCache));
        assert_eq!("point".parse::<StrategyKind>(), Ok(StrategyKind::PointLookup));
        assert_eq!("full-scan".parse::<StrategyKind>(), Ok(StrategyKind::FullScan));
        assert!("cache".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::FullScan.to_string(), "full-scan");
    }

    #[tokio::test]
    async fn test_auto_picks_full_scan_for_small_targets() {
        let table = target(3).await;
        let lookup = select_lookup(StrategyKind::Auto, &table, projection(&table), 10)
            .await
            .unwrap();
        assert_eq!(lookup.name(), "full-scan");
    }

    #[tokio::test]
    async fn test_auto_picks_paged_for_large_targets() {
        let table = target(11).await;
        let lookup = select_lookup(StrategyKind::Auto, &table, projection(&table), 10)
            .await
            .unwrap();
        assert_eq!(lookup.name(), "paged");
    }

    #[tokio::test]
    async fn test_strategies_agree() {
        let table = target(5).await;
        for kind in [
            StrategyKind::PagedCache,
            StrategyKind::PointLookup,
            StrategyKind::FullScan,
        ] {
            let lookup = select_lookup(kind, &table, projection(&table), 2)
                .await
                .unwrap();
            let hit = lookup.take(&PrimaryKey::from(Value::Int(4))).await.unwrap();
            assert!(hit.is_some(), "{kind} should find key 4");
            let miss = lookup.take(&PrimaryKey::from(Value::Int(9))).await.unwrap();
            assert!(miss.is_none(), "{kind} should miss key 9");
        }
    }
}
