//! Typed table records
//!
//! Catalog queries return one slice per concern; `build_work_list`
//! left-joins them into one `TableInfo` per physical table. AO-only
//! attributes live behind an `Option` so the worker can branch on storage
//! family without re-querying.

use std::collections::HashMap;

/// One row of the user-table enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTable {
    pub schema_oid: u32,
    pub oid: u32,
    /// Quoted `schema.table`, used verbatim in SQL.
    pub name: String,
}

/// Append-optimized bookkeeping for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AoInfo {
    /// The `pg_aoseg.pg_aoseg_<n>` auxiliary relation.
    pub seg_relation: String,
    /// Last CREATE/ALTER/TRUNCATE time, 17-digit format.
    pub last_ddl_time: String,
    /// Most recent non-rewriting alter from the DDL log, if any.
    /// Populated in incremental mode only.
    pub pending_alter: Option<String>,
}

/// Everything a worker needs to decide and copy one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema_oid: u32,
    pub oid: u32,
    pub name: String,
    /// Quoted, attnum-ordered column list for COPY.
    pub columns: String,
    /// Present iff the table is append-optimized.
    pub ao: Option<AoInfo>,
}

impl TableInfo {
    pub fn is_ao(&self) -> bool {
        self.ao.is_some()
    }
}

/// Relfile placement of one relation on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelfileLocation {
    /// Tablespace oid; 0 means the default tablespace.
    pub tablespace: u32,
    pub relfilenode: u32,
    pub host: String,
    pub data_dir: String,
}

/// Left-join the per-concern catalog results into the work list.
///
/// A table is append-optimized iff it has an auxiliary relation. A missing
/// last-DDL time joins as the empty string, which an incremental run treats
/// as "changed".
pub fn build_work_list(
    tables: Vec<UserTable>,
    columns: &HashMap<u32, String>,
    ao_ddl_times: &HashMap<String, String>,
    ao_seg_relations: &HashMap<String, String>,
    pending_alters: &HashMap<String, String>,
) -> Vec<TableInfo> {
    tables
        .into_iter()
        .map(|table| {
            let ao = ao_seg_relations.get(&table.name).map(|seg| AoInfo {
                seg_relation: seg.clone(),
                last_ddl_time: ao_ddl_times.get(&table.name).cloned().unwrap_or_default(),
                pending_alter: pending_alters.get(&table.name).cloned(),
            });

            TableInfo {
                schema_oid: table.schema_oid,
                oid: table.oid,
                columns: columns.get(&table.oid).cloned().unwrap_or_default(),
                name: table.name,
                ao,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(oid: u32, name: &str) -> UserTable {
        UserTable {
            schema_oid: 2200,
            oid,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_build_work_list_classifies_storage_family() {
        let tables = vec![table(16384, "public.t"), table(16390, "s.a")];

        let columns = HashMap::from([
            (16384, "\"id\", \"v\"".to_string()),
            (16390, "\"id\"".to_string()),
        ]);
        let ddl_times = HashMap::from([("s.a".to_string(), "20250301115900000".to_string())]);
        let seg_relations =
            HashMap::from([("s.a".to_string(), "pg_aoseg.pg_aoseg_16390".to_string())]);
        let alters = HashMap::new();

        let list = build_work_list(tables, &columns, &ddl_times, &seg_relations, &alters);

        assert_eq!(list.len(), 2);
        assert!(!list[0].is_ao());
        assert_eq!(list[0].columns, "\"id\", \"v\"");

        let ao = list[1].ao.as_ref().unwrap();
        assert_eq!(ao.seg_relation, "pg_aoseg.pg_aoseg_16390");
        assert_eq!(ao.last_ddl_time, "20250301115900000");
        assert!(ao.pending_alter.is_none());
    }

    #[test]
    fn test_pending_alter_attaches_to_ao_table() {
        let tables = vec![table(16390, "s.a")];
        let columns = HashMap::from([(16390, "\"id\"".to_string())]);
        let ddl_times = HashMap::from([("s.a".to_string(), "20250301115900000".to_string())]);
        let seg_relations =
            HashMap::from([("s.a".to_string(), "pg_aoseg.pg_aoseg_16390".to_string())]);
        let alters = HashMap::from([(
            "s.a".to_string(),
            "ALTER TABLE s.a SET TABLESPACE tsb".to_string(),
        )]);

        let list = build_work_list(tables, &columns, &ddl_times, &seg_relations, &alters);
        assert_eq!(
            list[0].ao.as_ref().unwrap().pending_alter.as_deref(),
            Some("ALTER TABLE s.a SET TABLESPACE tsb")
        );
    }

    #[test]
    fn test_alter_on_heap_table_is_ignored() {
        let tables = vec![table(16384, "public.t")];
        let columns = HashMap::from([(16384, "\"id\"".to_string())]);
        let alters = HashMap::from([(
            "public.t".to_string(),
            "ALTER TABLE public.t SET TABLESPACE tsb".to_string(),
        )]);

        let list = build_work_list(tables, &columns, &HashMap::new(), &HashMap::new(), &alters);
        assert!(list[0].ao.is_none());
    }

    #[test]
    fn test_missing_ddl_time_joins_as_empty() {
        let tables = vec![table(16390, "s.a")];
        let columns = HashMap::from([(16390, "\"id\"".to_string())]);
        let seg_relations =
            HashMap::from([("s.a".to_string(), "pg_aoseg.pg_aoseg_16390".to_string())]);

        let list = build_work_list(
            tables,
            &columns,
            &HashMap::new(),
            &seg_relations,
            &HashMap::new(),
        );
        assert_eq!(list[0].ao.as_ref().unwrap().last_ddl_time, "");
    }
}
