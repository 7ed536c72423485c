use closure_table::{AdvisoryLockStrategy, SiblingScope, TreeConfig, TreeOptions};

#[test]
fn defaults_follow_the_name_template() {
    let config = TreeConfig::new("categories");

    assert_eq!(config.node_table(), "categories");
    assert_eq!(config.ancestor_table(), "categories_ancestors");
    assert_eq!(config.id_column(), "id");
    assert_eq!(config.parent_column(), "parent_id");
    assert_eq!(config.level_column(), "level");
    assert_eq!(config.name_column(), "name");
    assert_eq!(config.node_ref_column(), "node_id");
    assert_eq!(config.ancestor_ref_column(), "ancestor_id");
    assert_eq!(config.sibling_scope(), SiblingScope::IncludeSelf);
    assert!(config.advisory_lock_strategy().key().is_some());
}

#[test]
fn options_override_identifiers() {
    let config = TreeOptions::default()
        .ancestor_table("org_unit_paths")
        .parent_column("id_parent_org_unit")
        .level_column("org_unit_level")
        .node_ref_column("id_org_unit")
        .ancestor_ref_column("id_ancestor_org_unit")
        .sibling_scope(SiblingScope::ExcludeSelf)
        .advisory_lock_strategy(AdvisoryLockStrategy::Disabled)
        .apply(TreeConfig::new("org_unit"));

    assert_eq!(config.node_table(), "org_unit");
    assert_eq!(config.ancestor_table(), "org_unit_paths");
    assert_eq!(config.parent_column(), "id_parent_org_unit");
    assert_eq!(config.level_column(), "org_unit_level");
    assert_eq!(config.node_ref_column(), "id_org_unit");
    assert_eq!(config.ancestor_ref_column(), "id_ancestor_org_unit");
    assert_eq!(config.sibling_scope(), SiblingScope::ExcludeSelf);
    assert_eq!(
        config.advisory_lock_strategy(),
        &AdvisoryLockStrategy::Disabled
    );
}

#[test]
fn lock_keys_are_stable_and_distinct_per_tree() {
    let categories = TreeConfig::new("categories");
    let categories_again = TreeConfig::new("categories");
    let org_units = TreeConfig::new("org_units");

    let key = |config: &TreeConfig| {
        config
            .advisory_lock_strategy()
            .key()
            .expect("namespaced by default")
            .as_str()
            .to_owned()
    };

    assert_eq!(key(&categories), key(&categories_again));
    assert_ne!(key(&categories), key(&org_units));
}
