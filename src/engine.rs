use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement, Value,
};
use tracing::debug;

use crate::config::{ident, SiblingScope, TreeConfig};
use crate::error::TreeError;
use crate::links::AncestorLinkStore;
use crate::lock::LockedTransaction;
use crate::records::{node_columns, NodeRow, NodeStore};

/// Whether a structural mutation takes the node's subtree along or leaves
/// it behind by promoting the children to the node's old parent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubtreePolicy {
    WithSubtree,
    PromoteChildren,
}

/// Orchestrates insert, move and delete against the node and ancestor
/// stores, each inside a single transaction, and exposes the read-only
/// query surface of a tree.
///
/// The engine never walks subtrees procedurally; every bulk effect is one
/// set-based statement issued by the stores.
#[derive(Debug)]
pub struct TreeEngine {
    config: TreeConfig,
}

impl TreeEngine {
    pub fn new(config: TreeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    fn records(&self) -> NodeStore<'_> {
        NodeStore::new(&self.config)
    }

    fn links(&self) -> AncestorLinkStore<'_> {
        AncestorLinkStore::new(&self.config)
    }

    fn ensure_postgres(conn: &impl ConnectionTrait) -> Result<(), TreeError> {
        if conn.get_database_backend() == DbBackend::Postgres {
            Ok(())
        } else {
            Err(TreeError::UnsupportedBackend)
        }
    }

    fn stmt(sql: String, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
    }

    async fn commit_on_ok<T>(
        guard: LockedTransaction,
        result: Result<T, TreeError>,
    ) -> Result<T, TreeError> {
        match result {
            Ok(value) => {
                guard.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = guard.rollback().await;
                Err(err)
            }
        }
    }

    /// Insert a node under `parent_id` (or as a new root). The level is
    /// derived from the parent at creation time and the ancestor links are
    /// installed in the same transaction.
    pub async fn insert(
        &self,
        db: &DatabaseConnection,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<NodeRow, TreeError> {
        Self::ensure_postgres(db)?;
        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), db).await?;
        let result = self.insert_on(guard.connection(), name, parent_id).await;
        Self::commit_on_ok(guard, result).await
    }

    async fn insert_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<NodeRow, TreeError> {
        let level = match parent_id {
            None => 0,
            Some(pid) => {
                let parent_level = self
                    .records()
                    .level_of(conn, pid)
                    .await?
                    .ok_or(TreeError::ParentNotFound(pid))?;
                parent_level + 1
            }
        };

        let id = self.records().create(conn, name, parent_id, level).await?;
        self.links().link_new_node(conn, id, parent_id).await?;

        debug!(id, ?parent_id, level, "inserted node");
        Ok(NodeRow {
            id,
            parent_id,
            level,
            name: name.to_owned(),
        })
    }

    /// Reparent `id` under `new_parent_id` (`None` makes it a root).
    ///
    /// The current row is read inside the transaction and compared against
    /// the requested parent; an unchanged parent commits as a no-op. Moving
    /// a node under itself or under one of its descendants is rejected
    /// before any write.
    pub async fn move_node(
        &self,
        db: &DatabaseConnection,
        id: i64,
        new_parent_id: Option<i64>,
        policy: SubtreePolicy,
    ) -> Result<(), TreeError> {
        Self::ensure_postgres(db)?;
        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), db).await?;
        let result = self
            .move_on(guard.connection(), id, new_parent_id, policy)
            .await;
        Self::commit_on_ok(guard, result).await
    }

    async fn move_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        new_parent_id: Option<i64>,
        policy: SubtreePolicy,
    ) -> Result<(), TreeError> {
        let records = self.records();
        let links = self.links();

        let row = records
            .find(conn, id)
            .await?
            .ok_or(TreeError::NodeNotFound(id))?;

        if row.parent_id == new_parent_id {
            return Ok(());
        }

        if let Some(target) = new_parent_id {
            if target == id || links.is_descendant(conn, target, id).await? {
                return Err(TreeError::CyclicMove { node: id, target });
            }
        }

        let new_level = match new_parent_id {
            None => 0,
            Some(pid) => {
                let parent_level = records
                    .level_of(conn, pid)
                    .await?
                    .ok_or(TreeError::ParentNotFound(pid))?;
                parent_level + 1
            }
        };

        if policy == SubtreePolicy::PromoteChildren {
            // Excise the node from its own subtree first: children point at
            // the old parent, descendant levels close the gap, and only then
            // does the node vanish from their ancestor chains. The shift
            // joins through the rows the detach deletes, so it cannot come
            // after it.
            records.reparent_children(conn, id, row.parent_id).await?;
            records.shift_descendant_levels(conn, id, -1).await?;
            links.detach_as_ancestor(conn, id).await?;
        }

        // Relocate the node (and whatever subtree it still carries): strip
        // the old chain off the subtree, rewrite the node's own links, then
        // propagate the new chain back down.
        links.sever_chain(conn, id).await?;
        links.unlink_node(conn, id).await?;
        links.link_new_node(conn, id, new_parent_id).await?;
        links.reattach_chain(conn, id).await?;
        records
            .update_parent_and_level(conn, id, new_parent_id, new_level)
            .await?;

        if policy == SubtreePolicy::WithSubtree {
            let delta = new_level - row.level;
            records.shift_descendant_levels(conn, id, delta).await?;
        }

        debug!(id, ?new_parent_id, new_level, ?policy, "moved node");
        Ok(())
    }

    /// Delete `id`, either cascading through its subtree or promoting its
    /// children to its old parent. Returns the number of node rows removed.
    pub async fn delete(
        &self,
        db: &DatabaseConnection,
        id: i64,
        policy: SubtreePolicy,
    ) -> Result<u64, TreeError> {
        Self::ensure_postgres(db)?;
        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), db).await?;
        let result = self.delete_on(guard.connection(), id, policy).await;
        Self::commit_on_ok(guard, result).await
    }

    async fn delete_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        policy: SubtreePolicy,
    ) -> Result<u64, TreeError> {
        let records = self.records();
        let links = self.links();

        let row = records
            .find(conn, id)
            .await?
            .ok_or(TreeError::NodeNotFound(id))?;

        if records.child_count(conn, id).await? == 0 {
            links.unlink_node(conn, id).await?;
            records.remove(conn, id).await?;
            debug!(id, "deleted leaf node");
            return Ok(1);
        }

        let removed = match policy {
            SubtreePolicy::WithSubtree => {
                let descendants = links.remove_subtree_rows(conn, id).await?;
                links.unlink_node(conn, id).await?;
                records.remove(conn, id).await?;
                descendants + 1
            }
            SubtreePolicy::PromoteChildren => {
                records.reparent_children(conn, id, row.parent_id).await?;
                records.shift_descendant_levels(conn, id, -1).await?;
                links.detach_as_ancestor(conn, id).await?;
                links.unlink_node(conn, id).await?;
                records.remove(conn, id).await?;
                1
            }
        };

        debug!(id, removed, ?policy, "deleted node");
        Ok(removed)
    }

    pub async fn node(
        &self,
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Option<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        self.records().find(db, id).await
    }

    pub async fn parent(
        &self,
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Option<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let records = self.records();
        match records.find(db, id).await? {
            Some(row) => match row.parent_id {
                Some(pid) => records.find(db, pid).await,
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub async fn children(
        &self,
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Vec<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let sql = format!(
            "SELECT {columns} FROM {table} AS n WHERE n.{parent} = $1 ORDER BY n.{name}",
            columns = node_columns(&self.config, "n"),
            table = ident(self.config.node_table()),
            parent = ident(self.config.parent_column()),
            name = ident(self.config.name_column()),
        );
        let rows = NodeRow::find_by_statement(Self::stmt(sql, vec![id.into()]))
            .all(db)
            .await?;
        Ok(rows)
    }

    pub async fn roots(&self, db: &DatabaseConnection) -> Result<Vec<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let sql = format!(
            "SELECT {columns} FROM {table} AS n WHERE n.{parent} IS NULL ORDER BY n.{name}",
            columns = node_columns(&self.config, "n"),
            table = ident(self.config.node_table()),
            parent = ident(self.config.parent_column()),
            name = ident(self.config.name_column()),
        );
        let rows = NodeRow::find_by_statement(Self::stmt(sql, vec![]))
            .all(db)
            .await?;
        Ok(rows)
    }

    /// Proper ancestors of `id`, root first.
    pub async fn ancestors(
        &self,
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Vec<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let sql = format!(
            "SELECT {columns} FROM {table} AS n JOIN {links} AS a ON a.{anc_ref} = n.{id_col} WHERE a.{node_ref} = $1 ORDER BY n.{level}",
            columns = node_columns(&self.config, "n"),
            table = ident(self.config.node_table()),
            links = ident(self.config.ancestor_table()),
            anc_ref = ident(self.config.ancestor_ref_column()),
            id_col = ident(self.config.id_column()),
            node_ref = ident(self.config.node_ref_column()),
            level = ident(self.config.level_column()),
        );
        let rows = NodeRow::find_by_statement(Self::stmt(sql, vec![id.into()]))
            .all(db)
            .await?;
        Ok(rows)
    }

    /// Every descendant of `id`, shallowest first.
    pub async fn descendants(
        &self,
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Vec<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let sql = format!(
            "SELECT {columns} FROM {table} AS n JOIN {links} AS a ON a.{node_ref} = n.{id_col} WHERE a.{anc_ref} = $1 ORDER BY n.{level}, n.{name}",
            columns = node_columns(&self.config, "n"),
            table = ident(self.config.node_table()),
            links = ident(self.config.ancestor_table()),
            node_ref = ident(self.config.node_ref_column()),
            id_col = ident(self.config.id_column()),
            anc_ref = ident(self.config.ancestor_ref_column()),
            level = ident(self.config.level_column()),
            name = ident(self.config.name_column()),
        );
        let rows = NodeRow::find_by_statement(Self::stmt(sql, vec![id.into()]))
            .all(db)
            .await?;
        Ok(rows)
    }

    pub async fn self_and_descendants(
        &self,
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Vec<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let row = self
            .records()
            .find(db, id)
            .await?
            .ok_or(TreeError::NodeNotFound(id))?;
        let mut nodes = Vec::with_capacity(1);
        nodes.push(row);
        let mut descendants = self.descendants(db, id).await?;
        nodes.append(&mut descendants);
        Ok(nodes)
    }

    /// Nodes sharing `id`'s parent. Whether `id` itself appears is governed
    /// by the configured [`SiblingScope`].
    pub async fn siblings(
        &self,
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Vec<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let row = self
            .records()
            .find(db, id)
            .await?
            .ok_or(TreeError::NodeNotFound(id))?;

        let columns = node_columns(&self.config, "n");
        let table = ident(self.config.node_table());
        let parent = ident(self.config.parent_column());
        let id_col = ident(self.config.id_column());
        let name = ident(self.config.name_column());

        let (sql, values) = match (row.parent_id, self.config.sibling_scope()) {
            (Some(pid), SiblingScope::IncludeSelf) => (
                format!(
                    "SELECT {columns} FROM {table} AS n WHERE n.{parent} = $1 ORDER BY n.{name}",
                ),
                vec![pid.into()],
            ),
            (Some(pid), SiblingScope::ExcludeSelf) => (
                format!(
                    "SELECT {columns} FROM {table} AS n WHERE n.{parent} = $1 AND n.{id_col} <> $2 ORDER BY n.{name}",
                ),
                vec![pid.into(), id.into()],
            ),
            (None, SiblingScope::IncludeSelf) => (
                format!(
                    "SELECT {columns} FROM {table} AS n WHERE n.{parent} IS NULL ORDER BY n.{name}",
                ),
                vec![],
            ),
            (None, SiblingScope::ExcludeSelf) => (
                format!(
                    "SELECT {columns} FROM {table} AS n WHERE n.{parent} IS NULL AND n.{id_col} <> $1 ORDER BY n.{name}",
                ),
                vec![id.into()],
            ),
        };

        let rows = NodeRow::find_by_statement(Self::stmt(sql, values))
            .all(db)
            .await?;
        Ok(rows)
    }

    /// The ancestor of `id` sitting `distance` levels above it. The root is
    /// not addressable this way: `distance` of zero or anything at or above
    /// the node's own level yields `None`.
    pub async fn ancestor_at_distance(
        &self,
        db: &DatabaseConnection,
        id: i64,
        distance: u32,
    ) -> Result<Option<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let row = self
            .records()
            .find(db, id)
            .await?
            .ok_or(TreeError::NodeNotFound(id))?;

        if distance == 0 || distance as i64 >= row.level as i64 {
            return Ok(None);
        }
        let wanted = row.level - distance as i32;

        let sql = format!(
            "SELECT {columns} FROM {table} AS n JOIN {links} AS a ON a.{anc_ref} = n.{id_col} WHERE a.{node_ref} = $1 AND n.{level} = $2",
            columns = node_columns(&self.config, "n"),
            table = ident(self.config.node_table()),
            links = ident(self.config.ancestor_table()),
            anc_ref = ident(self.config.ancestor_ref_column()),
            id_col = ident(self.config.id_column()),
            node_ref = ident(self.config.node_ref_column()),
            level = ident(self.config.level_column()),
        );
        let found = NodeRow::find_by_statement(Self::stmt(sql, vec![id.into(), wanted.into()]))
            .one(db)
            .await?;
        Ok(found)
    }

    /// Every descendant of `id` sitting `distance` levels below it.
    pub async fn descendants_at_distance(
        &self,
        db: &DatabaseConnection,
        id: i64,
        distance: u32,
    ) -> Result<Vec<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        let row = self
            .records()
            .find(db, id)
            .await?
            .ok_or(TreeError::NodeNotFound(id))?;

        if distance == 0 {
            return Ok(Vec::new());
        }
        let wanted = row.level + distance as i32;

        let sql = format!(
            "SELECT {columns} FROM {table} AS n JOIN {links} AS a ON a.{node_ref} = n.{id_col} WHERE a.{anc_ref} = $1 AND n.{level} = $2 ORDER BY n.{name}",
            columns = node_columns(&self.config, "n"),
            table = ident(self.config.node_table()),
            links = ident(self.config.ancestor_table()),
            node_ref = ident(self.config.node_ref_column()),
            id_col = ident(self.config.id_column()),
            anc_ref = ident(self.config.ancestor_ref_column()),
            level = ident(self.config.level_column()),
            name = ident(self.config.name_column()),
        );
        let rows = NodeRow::find_by_statement(Self::stmt(sql, vec![id.into(), wanted.into()]))
            .all(db)
            .await?;
        Ok(rows)
    }

    pub async fn find_by_path<S: AsRef<str>>(
        &self,
        db: &DatabaseConnection,
        segments: &[S],
    ) -> Result<Option<NodeRow>, TreeError> {
        Self::ensure_postgres(db)?;
        self.find_by_path_on(db, segments).await
    }

    /// Walk `segments` from the roots, creating any missing node along the
    /// way. Creation runs through the normal insert steps inside one
    /// advisory-locked transaction, so the closure and level invariants hold
    /// for every node it adds.
    pub async fn find_or_create_by_path<S: AsRef<str>>(
        &self,
        db: &DatabaseConnection,
        segments: &[S],
    ) -> Result<NodeRow, TreeError> {
        Self::ensure_postgres(db)?;

        if segments.is_empty() {
            return Err(TreeError::EmptyPath);
        }

        let guard = LockedTransaction::acquire(self.config.advisory_lock_strategy(), db).await?;
        let result = self
            .find_or_create_by_path_on(guard.connection(), segments)
            .await;
        Self::commit_on_ok(guard, result).await
    }

    async fn find_by_path_on<S: AsRef<str>, C: ConnectionTrait>(
        &self,
        conn: &C,
        segments: &[S],
    ) -> Result<Option<NodeRow>, TreeError> {
        if segments.is_empty() {
            return Ok(None);
        }

        let mut current: Option<NodeRow> = None;

        for segment in segments {
            let parent_id = current.as_ref().map(|row| row.id);
            match self
                .find_child_by_name(conn, parent_id, segment.as_ref())
                .await?
            {
                Some(row) => current = Some(row),
                None => return Ok(None),
            }
        }

        Ok(current)
    }

    async fn find_or_create_by_path_on<S: AsRef<str>, C: ConnectionTrait>(
        &self,
        conn: &C,
        segments: &[S],
    ) -> Result<NodeRow, TreeError> {
        let mut current: Option<NodeRow> = None;

        for segment in segments {
            let name = segment.as_ref();
            let parent_id = current.as_ref().map(|row| row.id);
            match self.find_child_by_name(conn, parent_id, name).await? {
                Some(row) => current = Some(row),
                None => {
                    let created = self.insert_on(conn, name, parent_id).await?;
                    current = Some(created);
                }
            }
        }

        current.ok_or_else(|| TreeError::invariant("path segments produced no node"))
    }

    async fn find_child_by_name<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: Option<i64>,
        name: &str,
    ) -> Result<Option<NodeRow>, TreeError> {
        let columns = node_columns(&self.config, "n");
        let table = ident(self.config.node_table());
        let name_col = ident(self.config.name_column());
        let parent = ident(self.config.parent_column());

        let row = match parent_id {
            Some(pid) => {
                let sql = format!(
                    "SELECT {columns} FROM {table} AS n WHERE n.{name_col} = $1 AND n.{parent} = $2",
                );
                NodeRow::find_by_statement(Self::stmt(sql, vec![name.into(), pid.into()]))
                    .one(conn)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {columns} FROM {table} AS n WHERE n.{name_col} = $1 AND n.{parent} IS NULL",
                );
                NodeRow::find_by_statement(Self::stmt(sql, vec![name.into()]))
                    .one(conn)
                    .await?
            }
        };
        Ok(row)
    }
}
