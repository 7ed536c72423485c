use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, Statement, Value};
use serde::{Deserialize, Serialize};

use crate::config::{ident, TreeConfig};
use crate::error::TreeError;

/// Plain read model for one node row.
#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub level: i32,
    pub name: String,
}

impl NodeRow {
    /// Whether the row is a tree root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Select list projecting the configured node columns onto the canonical
/// [`NodeRow`] field names, with every column qualified by `alias`.
pub(crate) fn node_columns(config: &TreeConfig, alias: &str) -> String {
    format!(
        "{alias}.{id} AS \"id\", {alias}.{parent} AS \"parent_id\", {alias}.{level} AS \"level\", {alias}.{name} AS \"name\"",
        id = ident(config.id_column()),
        parent = ident(config.parent_column()),
        level = ident(config.level_column()),
        name = ident(config.name_column()),
    )
}

/// Store owning the node table: parent pointer, cached level and the row
/// lifecycle. Level values are always supplied by the caller; this store
/// never derives them.
#[derive(Debug)]
pub struct NodeStore<'a> {
    config: &'a TreeConfig,
}

impl<'a> NodeStore<'a> {
    pub fn new(config: &'a TreeConfig) -> Self {
        Self { config }
    }

    fn stmt(sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
    }

    /// Insert a node row and return its generated id.
    pub async fn create<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        parent_id: Option<i64>,
        level: i32,
    ) -> Result<i64, TreeError> {
        let sql = format!(
            "INSERT INTO {table} ({name}, {parent}, {level}) VALUES ($1, $2, $3) RETURNING {id} AS \"id\"",
            table = ident(self.config.node_table()),
            name = ident(self.config.name_column()),
            parent = ident(self.config.parent_column()),
            level = ident(self.config.level_column()),
            id = ident(self.config.id_column()),
        );
        let row = conn
            .query_one(Self::stmt(
                sql,
                vec![name.into(), parent_id.into(), level.into()],
            ))
            .await?
            .ok_or_else(|| TreeError::invariant("insert returned no id"))?;
        Ok(row.try_get("", "id")?)
    }

    pub async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<Option<NodeRow>, TreeError> {
        let sql = format!(
            "SELECT {columns} FROM {table} AS n WHERE n.{id} = $1",
            columns = node_columns(self.config, "n"),
            table = ident(self.config.node_table()),
            id = ident(self.config.id_column()),
        );
        let row = NodeRow::find_by_statement(Self::stmt(sql, vec![id.into()]))
            .one(conn)
            .await?;
        Ok(row)
    }

    pub async fn level_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<Option<i32>, TreeError> {
        let sql = format!(
            "SELECT n.{level} AS \"level\" FROM {table} AS n WHERE n.{id} = $1",
            level = ident(self.config.level_column()),
            table = ident(self.config.node_table()),
            id = ident(self.config.id_column()),
        );
        match conn.query_one(Self::stmt(sql, vec![id.into()])).await? {
            Some(row) => Ok(Some(row.try_get("", "level")?)),
            None => Ok(None),
        }
    }

    pub async fn update_parent_and_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        parent_id: Option<i64>,
        level: i32,
    ) -> Result<(), TreeError> {
        let sql = format!(
            "UPDATE {table} SET {parent} = $2, {level} = $3 WHERE {id} = $1",
            table = ident(self.config.node_table()),
            parent = ident(self.config.parent_column()),
            level = ident(self.config.level_column()),
            id = ident(self.config.id_column()),
        );
        conn.execute(Self::stmt(
            sql,
            vec![id.into(), parent_id.into(), level.into()],
        ))
        .await?;
        Ok(())
    }

    /// Shift the cached level of every descendant of `id` by `delta`,
    /// joining through the ancestor table. `delta` may be negative.
    pub async fn shift_descendant_levels<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        delta: i32,
    ) -> Result<u64, TreeError> {
        let table = ident(self.config.node_table());
        let links = ident(self.config.ancestor_table());
        let sql = format!(
            "UPDATE {table} SET {level} = {table}.{level} + $2 FROM {links} WHERE {links}.{node_ref} = {table}.{id} AND {links}.{anc_ref} = $1",
            level = ident(self.config.level_column()),
            node_ref = ident(self.config.node_ref_column()),
            anc_ref = ident(self.config.ancestor_ref_column()),
            id = ident(self.config.id_column()),
        );
        let result = conn
            .execute(Self::stmt(sql, vec![id.into(), delta.into()]))
            .await?;
        Ok(result.rows_affected())
    }

    /// Re-point every direct child of `id` to `new_parent_id`.
    pub async fn reparent_children<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<u64, TreeError> {
        let sql = format!(
            "UPDATE {table} SET {parent} = $2 WHERE {parent} = $1",
            table = ident(self.config.node_table()),
            parent = ident(self.config.parent_column()),
        );
        let result = conn
            .execute(Self::stmt(sql, vec![id.into(), new_parent_id.into()]))
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn remove<C: ConnectionTrait>(&self, conn: &C, id: i64) -> Result<(), TreeError> {
        let sql = format!(
            "DELETE FROM {table} WHERE {id} = $1",
            table = ident(self.config.node_table()),
            id = ident(self.config.id_column()),
        );
        conn.execute(Self::stmt(sql, vec![id.into()])).await?;
        Ok(())
    }

    pub async fn child_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<u64, TreeError> {
        let sql = format!(
            "SELECT COUNT(*) AS \"count\" FROM {table} WHERE {parent} = $1",
            table = ident(self.config.node_table()),
            parent = ident(self.config.parent_column()),
        );
        let row = conn
            .query_one(Self::stmt(sql, vec![id.into()]))
            .await?
            .ok_or_else(|| TreeError::invariant("count query returned no row"))?;
        let count: i64 = row.try_get("", "count")?;
        Ok(count as u64)
    }
}
