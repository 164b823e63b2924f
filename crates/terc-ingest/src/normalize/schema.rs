//! Canonical row layout

use chrono::NaiveDate;
use serde::Serialize;
use terc_common::ReportingPeriod;

/// Source columns, in canonical order. Every value is kept as text.
pub const SOURCE_COLUMNS: [&str; 23] = [
    "id_terc",
    "sg_orgao_sup_tabela_ug",
    "cd_ug_gestora",
    "nm_ug_tabela_ug",
    "sg_ug_gestora",
    "nr_contrato",
    "nr_cnpj",
    "nm_razao_social",
    "nr_cpf",
    "nm_terceirizado",
    "nm_categoria_profissional",
    "nm_escolaridade",
    "nr_jornada",
    "nm_unidade_prestacao",
    "vl_mensal_salario",
    "vl_mensal_custo",
    "Num_Mes_Carga",
    "Mes_Carga",
    "Ano_Carga",
    "sg_orgao",
    "nm_orgao",
    "cd_orgao_siafi",
    "cd_orgao_siape",
];

/// Derived date column appended to every row
pub const REFERENCE_DATE_COLUMN: &str = terc_common::layout::PARTITION_COLUMN;

/// Which source position feeds each canonical column.
///
/// The portal files carry no stable header names, so the default mapping is
/// positional: canonical column `i` is read from source column `i`. A source
/// that reorders its columns is misread silently; only a width change is
/// detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    positions: Vec<usize>,
    expected_width: usize,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::positional()
    }
}

impl ColumnMapping {
    pub fn positional() -> Self {
        Self {
            positions: (0..SOURCE_COLUMNS.len()).collect(),
            expected_width: SOURCE_COLUMNS.len(),
        }
    }

    /// `positions[i]` is the source column read for canonical column `i`
    pub fn new(positions: Vec<usize>, expected_width: usize) -> Result<Self, String> {
        if let Some(bad) = positions.iter().find(|p| **p >= expected_width) {
            return Err(format!(
                "source position {} is outside a {}-column source",
                bad, expected_width
            ));
        }
        Ok(Self {
            positions,
            expected_width,
        })
    }

    /// Number of canonical columns produced
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of columns a source row must have
    pub fn expected_width(&self) -> usize {
        self.expected_width
    }

    /// Lay out one source record. Empty cells become `None`.
    pub fn apply(&self, fields: &[&str]) -> Result<Vec<Option<String>>, String> {
        if fields.len() != self.expected_width {
            return Err(format!(
                "record has {} fields, expected {}",
                fields.len(),
                self.expected_width
            ));
        }
        Ok(self
            .positions
            .iter()
            .map(|&p| Some(fields[p]).filter(|v| !v.is_empty()).map(str::to_owned))
            .collect())
    }
}

/// One normalized record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRow {
    /// Values for [`SOURCE_COLUMNS`], in order
    pub values: Vec<Option<String>>,
    /// First day of the reporting period; `None` when the period is not a date
    pub mes_referencia: Option<NaiveDate>,
}

impl NormalizedRow {
    /// Value of a source column by name
    pub fn get(&self, column: &str) -> Option<&str> {
        SOURCE_COLUMNS
            .iter()
            .position(|c| *c == column)
            .and_then(|idx| self.values.get(idx))
            .and_then(|v| v.as_deref())
    }
}

/// Rows of one source file, all tagged with its reporting period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTable {
    pub period: ReportingPeriod,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedTable {
    /// Tag laid-out values with the period's reference date
    pub fn from_values(period: ReportingPeriod, values: Vec<Vec<Option<String>>>) -> Self {
        let mes_referencia = period.first_day();
        Self {
            period,
            rows: values
                .into_iter()
                .map(|values| NormalizedRow {
                    values,
                    mes_referencia,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_mapping() {
        let mapping = ColumnMapping::positional();
        assert_eq!(mapping.len(), 23);
        assert_eq!(mapping.expected_width(), 23);

        let fields: Vec<String> = (0..23).map(|i| format!("v{}", i)).collect();
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        let values = mapping.apply(&refs).unwrap();
        assert_eq!(values[0].as_deref(), Some("v0"));
        assert_eq!(values[22].as_deref(), Some("v22"));
    }

    #[test]
    fn test_mapping_rejects_out_of_range_position() {
        assert!(ColumnMapping::new(vec![0, 5], 5).is_err());
    }

    #[test]
    fn test_empty_cells_become_none() {
        let mapping = ColumnMapping::new(vec![0, 1], 2).unwrap();
        assert_eq!(mapping.apply(&["", "x"]).unwrap(), vec![None, Some("x".to_string())]);
    }

    #[test]
    fn test_malformed_period_keeps_rows() {
        let period = ReportingPeriod::from_digits("202400").unwrap();
        let table = NormalizedTable::from_values(
            period,
            vec![vec![Some("42".to_string())]],
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].mes_referencia, None);
        assert_eq!(table.rows[0].get("id_terc"), Some("42"));
    }
}
