use crc32fast::Hasher;

/// Quote an identifier for interpolation into a PostgreSQL statement.
pub(crate) fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Static configuration describing the pair of tables backing one tree.
///
/// Different trees (categories, organizational units, ...) share the same
/// algorithms; the engine is parameterized by this value rather than by an
/// entity type. Defaults follow a name template derived from the node table:
/// the ancestor table is `<node_table>_ancestors` and columns are `id`,
/// `parent_id`, `level`, `name`, `node_id` and `ancestor_id`.
#[derive(Clone, Debug)]
pub struct TreeConfig {
    node_table: String,
    ancestor_table: String,
    id_column: String,
    parent_column: String,
    level_column: String,
    name_column: String,
    node_ref_column: String,
    ancestor_ref_column: String,
    sibling_scope: SiblingScope,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl TreeConfig {
    /// Create a configuration for the given node table, deriving every other
    /// identifier from the default template.
    pub fn new(node_table: impl Into<String>) -> Self {
        let node_table = node_table.into();
        let ancestor_table = format!("{node_table}_ancestors");

        let default_lock = AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(
            &node_table,
            &ancestor_table,
        ));

        Self {
            node_table,
            ancestor_table,
            id_column: "id".to_string(),
            parent_column: "parent_id".to_string(),
            level_column: "level".to_string(),
            name_column: "name".to_string(),
            node_ref_column: "node_id".to_string(),
            ancestor_ref_column: "ancestor_id".to_string(),
            sibling_scope: SiblingScope::default(),
            advisory_lock_strategy: default_lock,
        }
    }

    /// Merge options produced by [`TreeOptions`].
    pub(crate) fn apply_options(mut self, options: TreeOptions) -> Self {
        if let Some(ancestor_table) = options.ancestor_table {
            self.ancestor_table = ancestor_table;
        }
        if let Some(id_column) = options.id_column {
            self.id_column = id_column;
        }
        if let Some(parent_column) = options.parent_column {
            self.parent_column = parent_column;
        }
        if let Some(level_column) = options.level_column {
            self.level_column = level_column;
        }
        if let Some(name_column) = options.name_column {
            self.name_column = name_column;
        }
        if let Some(node_ref_column) = options.node_ref_column {
            self.node_ref_column = node_ref_column;
        }
        if let Some(ancestor_ref_column) = options.ancestor_ref_column {
            self.ancestor_ref_column = ancestor_ref_column;
        }
        if let Some(scope) = options.sibling_scope {
            self.sibling_scope = scope;
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        self
    }

    /// Table holding the node rows.
    pub fn node_table(&self) -> &str {
        &self.node_table
    }

    /// Table holding one row per (node, proper ancestor) pair.
    pub fn ancestor_table(&self) -> &str {
        &self.ancestor_table
    }

    /// Primary key column of the node table.
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Column storing the parent foreign key; NULL marks a root.
    pub fn parent_column(&self) -> &str {
        &self.parent_column
    }

    /// Column caching the node depth (count of proper ancestors).
    pub fn level_column(&self) -> &str {
        &self.level_column
    }

    /// Column storing the display name.
    pub fn name_column(&self) -> &str {
        &self.name_column
    }

    /// Ancestor-table column referencing the node side of a link.
    pub fn node_ref_column(&self) -> &str {
        &self.node_ref_column
    }

    /// Ancestor-table column referencing the ancestor side of a link.
    pub fn ancestor_ref_column(&self) -> &str {
        &self.ancestor_ref_column
    }

    /// Whether sibling lookups include the node itself.
    pub fn sibling_scope(&self) -> SiblingScope {
        self.sibling_scope
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

/// Builder-style overrides for [`TreeConfig`].
#[derive(Clone, Debug, Default)]
pub struct TreeOptions {
    ancestor_table: Option<String>,
    id_column: Option<String>,
    parent_column: Option<String>,
    level_column: Option<String>,
    name_column: Option<String>,
    node_ref_column: Option<String>,
    ancestor_ref_column: Option<String>,
    sibling_scope: Option<SiblingScope>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl TreeOptions {
    pub fn ancestor_table(mut self, value: impl Into<String>) -> Self {
        self.ancestor_table = Some(value.into());
        self
    }

    pub fn id_column(mut self, value: impl Into<String>) -> Self {
        self.id_column = Some(value.into());
        self
    }

    pub fn parent_column(mut self, value: impl Into<String>) -> Self {
        self.parent_column = Some(value.into());
        self
    }

    pub fn level_column(mut self, value: impl Into<String>) -> Self {
        self.level_column = Some(value.into());
        self
    }

    pub fn name_column(mut self, value: impl Into<String>) -> Self {
        self.name_column = Some(value.into());
        self
    }

    pub fn node_ref_column(mut self, value: impl Into<String>) -> Self {
        self.node_ref_column = Some(value.into());
        self
    }

    pub fn ancestor_ref_column(mut self, value: impl Into<String>) -> Self {
        self.ancestor_ref_column = Some(value.into());
        self
    }

    pub fn sibling_scope(mut self, scope: SiblingScope) -> Self {
        self.sibling_scope = Some(scope);
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: TreeConfig) -> TreeConfig {
        base.apply_options(self)
    }
}

/// Whether sibling lookups return the node itself alongside its siblings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SiblingScope {
    IncludeSelf,
    ExcludeSelf,
}

impl Default for SiblingScope {
    fn default() -> Self {
        Self::IncludeSelf
    }
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(node_table: &str, ancestor_table: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(node_table.as_bytes());
        hasher.update(b"/");
        hasher.update(ancestor_table.as_bytes());
        let crc = hasher.finalize();
        Self(format!("closure-table::{node_table}::{ancestor_table}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks around mutations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}
