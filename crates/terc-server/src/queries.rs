//! Read-only queries over the gold snapshot
//!
//! Every call opens its own read-only connection, so a snapshot swapped in
//! by a refresh is picked up by the next request while requests already
//! running finish against the file they opened. These functions block; the
//! handlers run them on the blocking pool.

use duckdb::{params, AccessMode, Config, Connection, Row};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use terc_common::{layout, Layer};

/// Columns returned by the paginated listing
pub const SUMMARY_COLUMNS: [&str; 4] = ["id_terc", "sg_orgao_sup_tabela_ug", "nr_cnpj", "nr_cpf"];

/// Columns returned for a single record
pub const DETAIL_COLUMNS: [&str; 21] = [
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
    "sg_orgao",
    "nm_orgao",
    "cd_orgao_siafi",
    "cd_orgao_siape",
    "mes_carga",
];

/// One record as a JSON object, keyed by column name
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub total_rows: u64,
    pub page_size: u32,
    pub page: u32,
    pub total_pages: u64,
    pub data: Vec<Record>,
}

fn gold_table() -> String {
    layout::layer_table(Layer::Gold)
}

/// Schema of the placeholder database served before any snapshot exists
pub fn empty_table_ddl() -> String {
    let columns: Vec<String> = DETAIL_COLUMNS
        .iter()
        .map(|c| {
            let ty = if *c == "id_terc" { "BIGINT" } else { "VARCHAR" };
            format!("{} {}", c, ty)
        })
        .chain(std::iter::once(format!("{} DATE", layout::PARTITION_COLUMN)))
        .collect();
    format!("CREATE TABLE {} ({});", gold_table(), columns.join(", "))
}

fn open_read_only(db: &Path) -> duckdb::Result<Connection> {
    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    Connection::open_with_flags(db, config)
}

/// `id_terc` as an integer, everything else as text
fn select_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| {
            if *c == "id_terc" {
                format!("TRY_CAST({c} AS BIGINT) AS {c}")
            } else {
                format!("CAST({c} AS VARCHAR) AS {c}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_record(row: &Row<'_>, columns: &[&str]) -> duckdb::Result<Record> {
    let mut record = Record::new();
    for (idx, column) in columns.iter().enumerate() {
        let value = if *column == "id_terc" {
            row.get::<_, Option<i64>>(idx)?.map(Value::from)
        } else {
            row.get::<_, Option<String>>(idx)?.map(Value::from)
        };
        record.insert(column.to_string(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

pub fn total_pages(total_rows: u64, page_size: u32) -> u64 {
    let size = u64::from(page_size.max(1));
    total_rows.div_ceil(size)
}

/// One page of summary rows, ascending by `id_terc`. `page` is 0-based.
pub fn list_page(db: &Path, page: u32, page_size: u32) -> duckdb::Result<Page> {
    let conn = open_read_only(db)?;
    let table = gold_table();

    let total: i64 = conn.query_row(&format!("SELECT count(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;

    let offset = i64::from(page) * i64::from(page_size);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} ORDER BY TRY_CAST(id_terc AS BIGINT) ASC NULLS LAST LIMIT ? OFFSET ?",
        select_list(&SUMMARY_COLUMNS),
        table
    ))?;
    let data = stmt
        .query_map(params![i64::from(page_size), offset], |row| {
            to_record(row, &SUMMARY_COLUMNS)
        })?
        .collect::<duckdb::Result<Vec<_>>>()?;

    let total_rows = u64::try_from(total).unwrap_or_default();
    Ok(Page {
        total_rows,
        page_size,
        page,
        total_pages: total_pages(total_rows, page_size),
        data,
    })
}

/// Every detail column of the record with `id`, if there is one
pub fn find_by_id(db: &Path, id: i64) -> duckdb::Result<Option<Record>> {
    let conn = open_read_only(db)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE TRY_CAST(id_terc AS BIGINT) = ? LIMIT 1",
        select_list(&DETAIL_COLUMNS),
        gold_table()
    ))?;
    let mut rows = stmt.query_map(params![id], |row| to_record(row, &DETAIL_COLUMNS))?;
    rows.next().transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seeded_db(dir: &Path, rows: i64) -> std::path::PathBuf {
        let db = dir.join("gold.duckdb");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(&empty_table_ddl()).unwrap();
        conn.execute_batch(&format!(
            "INSERT INTO terceirizados_gold (id_terc, nr_cnpj, nm_terceirizado, mes_carga)
             SELECT {rows} - range, 'cnpj-' || range, 'nome ' || range, 'JANEIRO'
             FROM range({rows});"
        ))
        .unwrap();
        drop(conn);
        db
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 50), 0);
        assert_eq!(total_pages(50, 50), 1);
        assert_eq!(total_pages(51, 50), 2);
    }

    #[test]
    fn test_list_page_orders_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path(), 12);

        let page = list_page(&db, 1, 5).unwrap();
        assert_eq!(page.total_rows, 12);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<i64> = page
            .data
            .iter()
            .map(|r| r["id_terc"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![6, 7, 8, 9, 10]);
        assert_eq!(page.data[0].len(), SUMMARY_COLUMNS.len());
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path(), 3);

        let page = list_page(&db, 4, 50).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total_rows, 3);
    }

    #[test]
    fn test_find_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path(), 3);

        let record = find_by_id(&db, 2).unwrap().unwrap();
        assert_eq!(record.len(), DETAIL_COLUMNS.len());
        assert_eq!(record["id_terc"], Value::from(2));
        assert_eq!(record["nm_terceirizado"], Value::from("nome 1"));
        assert_eq!(record["mes_carga"], Value::from("JANEIRO"));
        assert_eq!(record["nr_cpf"], Value::Null);

        assert!(find_by_id(&db, 99).unwrap().is_none());
    }

    #[test]
    fn test_missing_database_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_page(&dir.path().join("absent.duckdb"), 0, 10).is_err());
    }
}
