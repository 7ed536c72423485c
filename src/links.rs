use sea_orm::{ConnectionTrait, DbBackend, Statement, Value};

use crate::config::{ident, TreeConfig};
use crate::error::TreeError;

/// Store owning the ancestor (closure) table.
///
/// Every node holds one explicit row per proper ancestor, so detaching or
/// reattaching a node never needs to walk unrelated chains: deleting or
/// inserting the rows that mention exactly the affected ids is sufficient.
/// All mutations here are single set-based statements; nothing iterates rows.
#[derive(Debug)]
pub struct AncestorLinkStore<'a> {
    config: &'a TreeConfig,
}

impl<'a> AncestorLinkStore<'a> {
    pub fn new(config: &'a TreeConfig) -> Self {
        Self { config }
    }

    fn stmt(sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
    }

    fn table(&self) -> String {
        ident(self.config.ancestor_table())
    }

    fn node_ref(&self) -> String {
        ident(self.config.node_ref_column())
    }

    fn anc_ref(&self) -> String {
        ident(self.config.ancestor_ref_column())
    }

    /// Ids of every proper ancestor of `id`, in no particular order.
    pub async fn ancestors_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<Vec<i64>, TreeError> {
        let sql = format!(
            "SELECT {anc_ref} AS \"id\" FROM {table} WHERE {node_ref} = $1",
            anc_ref = self.anc_ref(),
            table = self.table(),
            node_ref = self.node_ref(),
        );
        let rows = conn.query_all(Self::stmt(sql, vec![id.into()])).await?;
        rows.iter()
            .map(|row| row.try_get("", "id").map_err(TreeError::from))
            .collect()
    }

    /// Ids of every descendant of `id`, in no particular order.
    pub async fn descendants_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<Vec<i64>, TreeError> {
        let sql = format!(
            "SELECT {node_ref} AS \"id\" FROM {table} WHERE {anc_ref} = $1",
            node_ref = self.node_ref(),
            table = self.table(),
            anc_ref = self.anc_ref(),
        );
        let rows = conn.query_all(Self::stmt(sql, vec![id.into()])).await?;
        rows.iter()
            .map(|row| row.try_get("", "id").map_err(TreeError::from))
            .collect()
    }

    /// Whether `candidate` sits somewhere below `of` in the tree.
    pub async fn is_descendant<C: ConnectionTrait>(
        &self,
        conn: &C,
        candidate: i64,
        of: i64,
    ) -> Result<bool, TreeError> {
        let sql = format!(
            "SELECT 1 AS \"hit\" FROM {table} WHERE {node_ref} = $1 AND {anc_ref} = $2 LIMIT 1",
            table = self.table(),
            node_ref = self.node_ref(),
            anc_ref = self.anc_ref(),
        );
        let row = conn
            .query_one(Self::stmt(sql, vec![candidate.into(), of.into()]))
            .await?;
        Ok(row.is_some())
    }

    /// Install the ancestor links of a node that just gained `parent_id` as
    /// its parent: the parent's own ancestor set is copied onto `id`, then
    /// the direct link is added. A root (no parent) gets no links.
    pub async fn link_new_node<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        parent_id: Option<i64>,
    ) -> Result<(), TreeError> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };

        let copy = format!(
            "INSERT INTO {table} ({node_ref}, {anc_ref}) SELECT $1, {anc_ref} FROM {table} WHERE {node_ref} = $2",
            table = self.table(),
            node_ref = self.node_ref(),
            anc_ref = self.anc_ref(),
        );
        conn.execute(Self::stmt(copy, vec![id.into(), parent_id.into()]))
            .await?;

        let direct = format!(
            "INSERT INTO {table} ({node_ref}, {anc_ref}) VALUES ($1, $2)",
            table = self.table(),
            node_ref = self.node_ref(),
            anc_ref = self.anc_ref(),
        );
        conn.execute(Self::stmt(direct, vec![id.into(), parent_id.into()]))
            .await?;
        Ok(())
    }

    /// Delete every link in which `id` is the node: detaches `id` from its
    /// own ancestor chain.
    pub async fn unlink_node<C: ConnectionTrait>(&self, conn: &C, id: i64) -> Result<(), TreeError> {
        let sql = format!(
            "DELETE FROM {table} WHERE {node_ref} = $1",
            table = self.table(),
            node_ref = self.node_ref(),
        );
        conn.execute(Self::stmt(sql, vec![id.into()])).await?;
        Ok(())
    }

    /// Delete every link in which `id` is the ancestor: removes `id` from
    /// the ancestor chain of everything beneath it. The descendants' other
    /// links stay untouched and remain correct on their own.
    pub async fn detach_as_ancestor<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<(), TreeError> {
        let sql = format!(
            "DELETE FROM {table} WHERE {anc_ref} = $1",
            table = self.table(),
            anc_ref = self.anc_ref(),
        );
        conn.execute(Self::stmt(sql, vec![id.into()])).await?;
        Ok(())
    }

    /// Delete the links that chain the subtree rooted at `id` through `id`'s
    /// old ancestors: rows whose ancestor is an ancestor of `id` and whose
    /// node is a descendant of `id`. Must run before `id`'s own links are
    /// rewritten. Both sides are subselects, so an empty ancestor or
    /// descendant set deletes nothing.
    pub async fn sever_chain<C: ConnectionTrait>(&self, conn: &C, id: i64) -> Result<(), TreeError> {
        let sql = format!(
            "DELETE FROM {table} WHERE {anc_ref} IN (SELECT up.{anc_ref} FROM {table} AS up WHERE up.{node_ref} = $1) AND {node_ref} IN (SELECT down.{node_ref} FROM {table} AS down WHERE down.{anc_ref} = $1)",
            table = self.table(),
            anc_ref = self.anc_ref(),
            node_ref = self.node_ref(),
        );
        conn.execute(Self::stmt(sql, vec![id.into()])).await?;
        Ok(())
    }

    /// Propagate `id`'s (new) ancestor chain to every descendant of `id`:
    /// one row per (descendant, ancestor) pair, produced by joining the two
    /// sets in a single statement. Must run after `id`'s own links exist.
    pub async fn reattach_chain<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<(), TreeError> {
        let sql = format!(
            "INSERT INTO {table} ({node_ref}, {anc_ref}) SELECT down.{node_ref}, up.{anc_ref} FROM {table} AS up CROSS JOIN {table} AS down WHERE up.{node_ref} = $1 AND down.{anc_ref} = $1",
            table = self.table(),
            node_ref = self.node_ref(),
            anc_ref = self.anc_ref(),
        );
        conn.execute(Self::stmt(sql, vec![id.into()])).await?;
        Ok(())
    }

    /// Bulk-delete every node row that is a descendant of `id`, joining
    /// through the ancestor table. The descendants' own links disappear via
    /// the foreign-key cascade. Returns the number of node rows removed.
    pub async fn remove_subtree_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<u64, TreeError> {
        let nodes = ident(self.config.node_table());
        let sql = format!(
            "DELETE FROM {nodes} USING {table} WHERE {table}.{node_ref} = {nodes}.{id_col} AND {table}.{anc_ref} = $1",
            table = self.table(),
            node_ref = self.node_ref(),
            anc_ref = self.anc_ref(),
            id_col = ident(self.config.id_column()),
        );
        let result = conn.execute(Self::stmt(sql, vec![id.into()])).await?;
        Ok(result.rows_affected())
    }
}
