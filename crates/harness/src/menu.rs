//! Declarative navigation menu tree
//!
//! The sweep walks a fixed, externally supplied tree mirroring the
//! application's sidebar. The tree is static configuration: it is read
//! once, validated, flattened, and never mutated during a run. It must be
//! kept in sync with the application out-of-band; the harness does not
//! discover routes dynamically.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{HarnessError, Result};

/// One node of the navigation menu tree.
///
/// A node with children is itself independently navigable: its own route
/// is meaningful, not just a grouping label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationTarget {
    /// Display name, as it appears in the sidebar
    pub name: String,

    /// Unique identifier across the whole tree
    pub id: String,

    /// Route fragment, resolved against the configured base URL
    pub route: String,

    /// Visible only to elevated-privilege accounts
    #[serde(default)]
    pub admin_only: bool,

    /// Ordered child targets (empty for leaves)
    #[serde(default)]
    pub children: Vec<NavigationTarget>,
}

impl NavigationTarget {
    pub fn leaf(name: &str, id: &str, route: &str) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            route: route.to_string(),
            admin_only: false,
            children: Vec::new(),
        }
    }

    fn with_children(mut self, children: Vec<NavigationTarget>) -> Self {
        self.children = children;
        self
    }

    fn admin(mut self) -> Self {
        self.admin_only = true;
        self
    }
}

/// A flattened, filtered entry produced by [`flatten`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatTarget {
    pub name: String,
    pub id: String,
    pub route: String,
}

/// Flatten the tree via pre-order traversal: a parent is emitted, then
/// each of its children in order, recursively.
///
/// The order is stable across calls, which iteration-to-iteration
/// comparison depends on. Filtering is by a node's own `admin_only` flag
/// only; the flag is not inherited, because routes are independently
/// addressable and a non-privileged child under a privileged parent is
/// still a page worth sweeping.
pub fn flatten(targets: &[NavigationTarget], include_admin: bool) -> Vec<FlatTarget> {
    let mut out = Vec::new();
    flatten_into(targets, include_admin, &mut out);
    out
}

fn flatten_into(targets: &[NavigationTarget], include_admin: bool, out: &mut Vec<FlatTarget>) {
    for t in targets {
        if include_admin || !t.admin_only {
            out.push(FlatTarget {
                name: t.name.clone(),
                id: t.id.clone(),
                route: t.route.clone(),
            });
        }
        flatten_into(&t.children, include_admin, out);
    }
}

/// Validate identifier uniqueness across the whole tree
pub fn validate(targets: &[NavigationTarget]) -> Result<()> {
    let mut seen = HashSet::new();
    validate_ids(targets, &mut seen)
}

fn validate_ids<'a>(
    targets: &'a [NavigationTarget],
    seen: &mut HashSet<&'a str>,
) -> Result<()> {
    for t in targets {
        if !seen.insert(t.id.as_str()) {
            return Err(HarnessError::DuplicateTargetId(t.id.clone()));
        }
        validate_ids(&t.children, seen)?;
    }
    Ok(())
}

/// Load a menu tree from a YAML file
pub fn load_menu(path: &Path) -> Result<Vec<NavigationTarget>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| HarnessError::MenuParse(format!("{}: {}", path.display(), e)))?;
    let targets: Vec<NavigationTarget> = serde_yaml::from_str(&content)?;
    validate(&targets)?;
    Ok(targets)
}

/// The built-in menu tree mirroring the application sidebar
pub fn default_menu() -> Vec<NavigationTarget> {
    vec![
        NavigationTarget::leaf("Dashboard", "dashboard", "/dashboard").with_children(vec![
            NavigationTarget::leaf(
                "Executive Overview",
                "dashboard-executive",
                "/dashboard/executive",
            ),
        ]),
        NavigationTarget::leaf("Costs", "costs", "/costs").with_children(vec![
            NavigationTarget::leaf("Daily Costs", "costs-daily", "/costs/daily"),
            NavigationTarget::leaf("Optimization", "costs-optimization", "/costs/optimization"),
        ]),
        NavigationTarget::leaf("Security", "security", "/security").with_children(vec![
            NavigationTarget::leaf("Scans", "security-scans", "/security/scans"),
            NavigationTarget::leaf("Compliance", "security-compliance", "/security/compliance"),
        ]),
        NavigationTarget::leaf("Cloud Accounts", "accounts", "/accounts").with_children(vec![
            NavigationTarget::leaf("AWS Credentials", "accounts-aws", "/accounts/aws"),
            NavigationTarget::leaf("Azure Credentials", "accounts-azure", "/accounts/azure"),
        ]),
        NavigationTarget::leaf("Organizations", "organizations", "/organizations"),
        NavigationTarget::leaf("Users", "users", "/users").admin(),
        NavigationTarget::leaf("Licenses", "licenses", "/licenses"),
    ]
}
