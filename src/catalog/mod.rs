//! System-catalog queries
//!
//! Read-only queries against the coordinator catalog: table enumeration,
//! column lists, AO bookkeeping, partition topology, relfile locations,
//! owners and row estimates. Callers decide which session each query runs
//! on; anything that must observe the run snapshot is handed the snapshot
//! transaction's client.
//!
//! Table names are produced pre-quoted (`quote_ident(schema).quote_ident
//! (table)`) and used verbatim in later SQL.

mod errors;
mod tables;

pub use errors::{CatalogError, CatalogResult};
pub use tables::{build_work_list, AoInfo, RelfileLocation, TableInfo, UserTable};

use std::collections::{BTreeMap, HashMap};

use tokio_postgres::Client;

/// Schemas that never participate in a backup. `logddl` is the DDL-log
/// contract schema; the rest are system surface.
const SYSTEM_SCHEMA_FILTER: &str = "n.nspname NOT LIKE 'pg_temp_%' \
     AND n.nspname NOT LIKE 'pg_toast%' \
     AND n.nspname NOT IN ('gp_toolkit', 'information_schema', 'pg_aoseg', 'pg_bitmapindex', 'pg_catalog', 'logddl')";

/// Every user table (heap, AO, partition roots and leaves), ordered by
/// relation oid. Extension-owned relations are excluded.
pub async fn list_user_tables(client: &Client) -> CatalogResult<Vec<UserTable>> {
    let sql = format!(
        "SELECT n.oid AS schemaoid, \
         c.oid AS oid, \
         quote_ident(n.nspname)||'.'||quote_ident(c.relname) AS tablename \
         FROM pg_class c \
         JOIN pg_namespace n ON c.relnamespace = n.oid \
         WHERE {filter} \
         AND relkind IN ('r', 'p') \
         AND c.oid NOT IN (select objid from pg_depend where deptype = 'e') \
         ORDER BY c.oid",
        filter = SYSTEM_SCHEMA_FILTER
    );

    let rows = client.query(sql.as_str(), &[]).await?;
    Ok(rows
        .iter()
        .map(|row| UserTable {
            schema_oid: row.get("schemaoid"),
            oid: row.get("oid"),
            name: row.get("tablename"),
        })
        .collect())
}

/// User tables that own storage (`relfilenode <> 0`), skipping partition
/// roots without their own relfiles. These are the copy candidates.
pub async fn list_physical_tables(client: &Client) -> CatalogResult<Vec<UserTable>> {
    let sql = format!(
        "SELECT n.oid AS schemaoid, \
         c.oid AS oid, \
         quote_ident(n.nspname)||'.'||quote_ident(c.relname) AS tablename \
         FROM pg_class c \
         JOIN pg_namespace n ON c.relnamespace = n.oid \
         WHERE {filter} \
         AND relkind IN ('r', 'p') \
         AND c.relfilenode <> 0 \
         AND c.oid NOT IN (select objid from pg_depend where deptype = 'e') \
         ORDER BY c.oid",
        filter = SYSTEM_SCHEMA_FILTER
    );

    let rows = client.query(sql.as_str(), &[]).await?;
    Ok(rows
        .iter()
        .map(|row| UserTable {
            schema_oid: row.get("schemaoid"),
            oid: row.get("oid"),
            name: row.get("tablename"),
        })
        .collect())
}

/// Quoted, attnum-ordered column list per relation oid. The strings feed
/// COPY statements verbatim and are preserved in the manifest.
pub async fn list_columns(client: &Client) -> CatalogResult<HashMap<u32, String>> {
    let sql = format!(
        "SELECT a.attrelid AS oid, \
         STRING_AGG(quote_ident(a.attname)::text, ', ' ORDER BY a.attnum) AS colnameagg \
         FROM pg_catalog.pg_attribute a \
         JOIN pg_class c ON a.attrelid = c.oid \
         JOIN pg_namespace n ON c.relnamespace = n.oid \
         WHERE {filter} \
         AND c.reltype <> 0 \
         AND a.attnum > 0::pg_catalog.int2 \
         AND a.attisdropped = 'f' \
         GROUP BY a.attrelid \
         ORDER BY a.attrelid",
        filter = SYSTEM_SCHEMA_FILTER
    );

    let rows = client.query(sql.as_str(), &[]).await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<_, u32>("oid"), row.get::<_, String>("colnameagg")))
        .collect())
}

/// Last CREATE/ALTER/TRUNCATE time per AO table, formatted as a 17-digit
/// timestamp, keyed by quoted table name.
pub async fn ao_last_ddl_times(client: &Client) -> CatalogResult<HashMap<String, String>> {
    let sql = format!(
        "SELECT quote_ident(aoschema) || '.' || quote_ident(aorelname) AS tablename, \
         TO_CHAR(lastddltimestamp, 'YYYYMMDDHH24MISSMS') AS lastddltimestamp \
         FROM ( SELECT c.oid AS aooid, \
         n.nspname AS aoschema, \
         c.relname AS aorelname \
         FROM pg_class c \
         JOIN pg_namespace n ON c.relnamespace = n.oid \
         JOIN pg_am a ON c.relam = a.oid \
         WHERE a.amname in ('ao_row', 'ao_column') \
         AND {filter}) aotables \
         JOIN ( SELECT lo.objid, \
         MAX(lo.statime) AS lastddltimestamp \
         FROM pg_stat_last_operation lo \
         WHERE lo.staactionname IN ('CREATE', 'ALTER', 'TRUNCATE') \
         GROUP BY lo.objid) lastop \
         ON aotables.aooid = lastop.objid",
        filter = SYSTEM_SCHEMA_FILTER
    );

    let rows = client.query(sql.as_str(), &[]).await?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<_, String>("tablename"),
                row.get::<_, String>("lastddltimestamp"),
            )
        })
        .collect())
}

/// The `pg_aoseg.pg_aoseg_<n>` auxiliary relation per AO table, keyed by
/// quoted table name. Presence in this map is what marks a table as AO.
pub async fn ao_seg_relations(client: &Client) -> CatalogResult<HashMap<String, String>> {
    let sql = format!(
        "SELECT seg.aotablefqn AS tablename, \
         'pg_aoseg.' || quote_ident(aoseg_c.relname) AS aosegtablefqn \
         FROM pg_class aoseg_c \
         JOIN (SELECT pg_ao.relid AS aooid, \
         pg_ao.segrelid, \
         aotables.aotablefqn \
         FROM pg_appendonly pg_ao \
         JOIN (SELECT c.oid, \
         quote_ident(n.nspname) || '.' || quote_ident(c.relname) AS aotablefqn \
         FROM pg_class c \
         JOIN pg_namespace n ON c.relnamespace = n.oid \
         JOIN pg_am a ON c.relam = a.oid \
         WHERE a.amname in ('ao_row', 'ao_column') \
         AND {filter}) aotables \
         ON pg_ao.relid = aotables.oid) seg \
         ON aoseg_c.oid = seg.segrelid",
        filter = SYSTEM_SCHEMA_FILTER
    );

    let rows = client.query(sql.as_str(), &[]).await?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<_, String>("tablename"),
                row.get::<_, String>("aosegtablefqn"),
            )
        })
        .collect())
}

/// For each table, the most recent DDL-log row whose statement is a
/// non-rewriting alter (`set tablespace` / `set with`), provided no later
/// rewriting statement exists for the same table. Incremental mode only.
pub async fn recent_non_rewriting_alters(
    client: &Client,
    before_timestamp: &str,
) -> CatalogResult<HashMap<String, String>> {
    let sql = r"with rank_ddl as(
        select timestamp,
        object_name as tablename,
        ddl_query,
        ROW_NUMBER() over (
        partition by object_name
        order by timestamp desc) as rn
        from logddl.ddl_log
        where ddl_type = 'ALTER TABLE'
        and timestamp < to_timestamp($1, 'YYYYMMDDHH24MISSMS')
        and ddl_query ~* 'set\s+(tablespace|with)'
        and object_name not in (
        select object_name
        from logddl.ddl_log
        where ddl_query !~* 'set\s+(tablespace|with)'))
        select tablename,
        ddl_query
        from rank_ddl
        where rn = 1";

    let rows = client.query(sql, &[&before_timestamp]).await?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<_, String>("tablename"),
                row.get::<_, String>("ddl_query"),
            )
        })
        .collect())
}

/// Distinct primary-segment hostnames (content <> -1).
pub async fn segment_hosts(client: &Client) -> CatalogResult<Vec<String>> {
    let rows = client
        .query(
            "select distinct hostname from gp_segment_configuration \
             where role = 'p' and content <> '-1'",
            &[],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Parent partitioned tables whose every leaf appears in `copied`.
pub async fn parent_partitions_fully_copied(
    client: &Client,
    copied: &[String],
) -> CatalogResult<Vec<String>> {
    if copied.is_empty() {
        return Ok(Vec::new());
    }

    let in_list = copied
        .iter()
        .map(|name| format!("'{}'", name))
        .collect::<Vec<_>>()
        .join(",");

    let sql = format!(
        "with gppart as ( \
         select schemaname||'.'||tablename as fname, \
         partitionschemaname||'.'||partitiontablename as pname \
         from gp_toolkit.gp_partitions) \
         select fname from gppart \
         group by fname \
         having count(*) = \
         count(case when pname in ({}) then 1 end)",
        in_list
    );

    let rows = client.query(sql.as_str(), &[]).await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Partitioned tables with no leaves at all.
pub async fn leafless_parent_partitions(client: &Client) -> CatalogResult<Vec<String>> {
    let rows = client
        .query(
            "SELECT pnp.nspname||'.'||parent.relname AS pname \
             FROM pg_partitioned_table pt \
             JOIN pg_class parent ON pt.partrelid = parent.oid \
             JOIN pg_namespace pnp on parent.relnamespace = pnp.oid \
             LEFT JOIN pg_inherits i ON i.inhparent = parent.oid \
             WHERE i.inhrelid IS NULL",
            &[],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Relfile placement for one table and its toast sibling across the
/// coordinator and every primary segment.
pub async fn relfile_locations(
    client: &Client,
    table_oid: u32,
) -> CatalogResult<Vec<RelfileLocation>> {
    let sql = "select t1.reltablespace, t1.relfilenode, t2.hostname, t2.datadir \
         from ( \
         select gp_segment_id, reltablespace, relfilenode \
         from pg_class \
         where oid = $1::oid \
         union \
         select gp_segment_id, reltablespace, relfilenode \
         from pg_class \
         where oid = ( \
         select reltoastrelid \
         from pg_class \
         where oid = $1::oid) \
         union \
         select gp_segment_id, reltablespace, relfilenode \
         from gp_dist_random('pg_class') \
         where oid = $1::oid \
         union \
         select gp_segment_id, reltablespace, relfilenode \
         from gp_dist_random('pg_class') \
         where oid = ( \
         select reltoastrelid \
         from pg_class \
         where oid = $1::oid)) t1 \
         join gp_segment_configuration t2 on t1.gp_segment_id = t2.content \
         and t2.role = 'p'";

    let rows = client.query(sql, &[&table_oid]).await?;
    Ok(rows
        .iter()
        .map(|row| RelfileLocation {
            tablespace: row.get("reltablespace"),
            relfilenode: row.get("relfilenode"),
            host: row.get("hostname"),
            data_dir: row.get("datadir"),
        })
        .collect())
}

/// Sum of segment-local modcounts for one AO table's auxiliary relation,
/// observed under the caller's transaction.
pub async fn ao_modcount(client: &Client, aoseg_fqn: &str) -> CatalogResult<i64> {
    let sql = format!(
        "SELECT COALESCE(pg_catalog.sum(modcount), 0)::bigint AS modcount \
         FROM gp_dist_random('{}')",
        aoseg_fqn
    );
    let row = client.query_one(sql.as_str(), &[]).await?;
    Ok(row.get("modcount"))
}

/// DDL-log rows for one table older than the run timestamp.
pub async fn heap_ddl_count(
    client: &Client,
    table: &str,
    before_timestamp: &str,
) -> CatalogResult<i64> {
    let row = client
        .query_one(
            "select count(*) from logddl.ddl_log \
             where object_name = $1 \
             and timestamp < to_timestamp($2, 'YYYYMMDDHH24MISSMS')",
            &[&table, &before_timestamp],
        )
        .await?;
    Ok(row.get(0))
}

/// Distinct owner role names over `pg_class`.
pub async fn user_list(client: &Client) -> CatalogResult<Vec<String>> {
    let rows = client
        .query(
            "select distinct pg_catalog.pg_get_userbyid(relowner) from pg_class",
            &[],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Live-tuple estimates per user table.
pub async fn live_tuple_counts(client: &Client) -> CatalogResult<BTreeMap<String, f64>> {
    let rows = client
        .query(
            "select schemaname||'.'||relname as tabname, \
             n_live_tup::float8 as tabrow \
             from pg_stat_all_tables \
             where schemaname not in ('logddl', 'information_schema') \
             and schemaname not like 'pg%'",
            &[],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<_, String>("tabname"), row.get::<_, f64>("tabrow")))
        .collect())
}

/// How many of the given role names exist locally.
pub async fn existing_user_count(client: &Client, users: &[String]) -> CatalogResult<i64> {
    let in_list = users
        .iter()
        .map(|user| format!("'{}'", user))
        .collect::<Vec<_>>()
        .join(",");

    let sql = format!(
        "select count(*) from pg_catalog.pg_user where usename in ({})",
        in_list
    );
    let row = client.query_one(sql.as_str(), &[]).await?;
    Ok(row.get(0))
}

/// Number of user tables in the target database.
pub async fn user_table_count(client: &Client) -> CatalogResult<i64> {
    let row = client
        .query_one("select count(*) from gp_toolkit.__gp_user_tables", &[])
        .await?;
    Ok(row.get(0))
}

/// Number of in-flight analyze cycles.
pub async fn analyze_in_progress(client: &Client) -> CatalogResult<i64> {
    let row = client
        .query_one("select count(*) from pg_stat_progress_analyze", &[])
        .await?;
    Ok(row.get(0))
}

/// Non-system schema oids, for the per-schema function-definition dump.
/// The DDL-log schema is intentionally not excluded here.
pub async fn schema_oids(client: &Client) -> CatalogResult<Vec<u32>> {
    let rows = client
        .query(
            "select oid \
             from pg_catalog.pg_namespace \
             where nspname NOT LIKE 'pg_temp_%' \
             AND nspname NOT LIKE 'pg_toast%' \
             AND nspname NOT IN ('gp_toolkit', 'information_schema', 'pg_aoseg', 'pg_bitmapindex', 'pg_catalog')",
            &[],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

/// Function definitions for one schema.
pub async fn function_definitions(client: &Client, schema_oid: u32) -> CatalogResult<Vec<String>> {
    let rows = client
        .query(
            "select pg_get_functiondef(oid) from pg_catalog.pg_proc where pronamespace = $1::oid",
            &[&schema_oid],
        )
        .await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}
