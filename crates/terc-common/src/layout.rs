//! Object-store key layout
//!
//! Two key families live under the dataset prefix:
//!
//! - `terceirizados/raw/mes_referencia=YYYY-MM-01/terceirizados.parquet`: one
//!   partition per reporting period, read by the transformation stage
//! - `terceirizados/{bronze,silver,gold}/terceirizados_{layer}.duckdb`: one
//!   portable database per derived layer

use crate::types::{Layer, ReportingPeriod};

/// Dataset name used as key prefix, partition file stem and table prefix
pub const DATASET: &str = "terceirizados";

/// Hive-style partition column for raw partitions
pub const PARTITION_COLUMN: &str = "mes_referencia";

/// Prefix holding every raw partition
pub fn raw_prefix() -> String {
    format!("{}/{}/", DATASET, Layer::Raw)
}

/// Key of the raw partition for `period`
pub fn raw_partition_key(period: &ReportingPeriod) -> String {
    format!(
        "{}{}={}/{}.parquet",
        raw_prefix(),
        PARTITION_COLUMN,
        period.first_day_literal(),
        DATASET
    )
}

/// Table name a layer is materialized under in the working database
pub fn layer_table(layer: Layer) -> String {
    format!("{}_{}", DATASET, layer)
}

/// Key of the portable database file published for `layer`
pub fn layer_snapshot_key(layer: Layer) -> String {
    format!("{}/{}/{}.duckdb", DATASET, layer, layer_table(layer))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_partition_key() {
        let period: ReportingPeriod = "2021-05".parse().unwrap();
        assert_eq!(
            raw_partition_key(&period),
            "terceirizados/raw/mes_referencia=2021-05-01/terceirizados.parquet"
        );
        assert!(raw_partition_key(&period).starts_with(&raw_prefix()));
    }

    #[test]
    fn test_layer_snapshot_key() {
        assert_eq!(
            layer_snapshot_key(Layer::Gold),
            "terceirizados/gold/terceirizados_gold.duckdb"
        );
        assert_eq!(layer_table(Layer::Silver), "terceirizados_silver");
    }
}
