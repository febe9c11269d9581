//! Cache keys, per-action TTLs and categories, per-category sync cadence.
//!
//! Remote resources change at different rates: in-flight workflow state goes
//! stale within minutes while reference tables hold for most of an hour. TTLs
//! are capped at 45 minutes so nothing outlives a typical access token.

use std::collections::BTreeSet;

use chrono::Duration;
use serde_json::{Map, Value};

/// TTL for actions missing from [`ACTION_TTL_MINUTES`]
pub const DEFAULT_TTL_MINUTES: i64 = 10;

/// Category for actions missing from [`ACTION_CATEGORIES`]
pub const DEFAULT_CATEGORY: &str = "default";

/// Sync cadence for categories missing from [`CATEGORY_SYNC_MINUTES`]
pub const DEFAULT_SYNC_MINUTES: i64 = 10;

/// Ticks fire at most this fraction of the shortest TTL in a category
const SYNC_INTERVAL_NUMERATOR: i32 = 4;
const SYNC_INTERVAL_DENOMINATOR: i32 = 5;

pub const ACTION_TTL_MINUTES: &[(&str, i64)] = &[
    // Approval state, changes often
    ("getMyPendingWorkflows", 3),
    ("getMyRequestedWorkflows", 3),
    ("getCompletedWorkflows", 3),
    ("getWorkflowStatus", 3),
    ("getWorkflowHistory", 3),
    ("getLedgerEntries", 5),
    ("getAccounts", 5),
    ("getAccountingCategorySummary", 5),
    ("getPendingBudgetPlans", 5),
    ("getDocuments", 10),
    ("getAllDocuments", 10),
    ("getAnnouncements", 10),
    ("fetchAnnouncements", 10),
    ("fetchCalendarEvents", 15),
    ("getAllUsers", 30),
    ("getPendingUsers", 30),
    ("getTemplates", 30),
    ("getSharedTemplates", 30),
    ("getStaticTags", 30),
    ("getWorkflowTemplates", 30),
    ("fetchStudents", 30),
    ("fetchStaff", 30),
    ("fetchAttendees", 30),
    ("fetchStudentIssues", 10),
    ("fetchStaffFromPapyrus", 30),
    ("fetchCommitteeFromPapyrus", 30),
    // Reference data
    ("getSpreadsheetIds", 45),
    ("getAccountingFolderId", 45),
    ("getAccountingCategories", 45),
    ("getLedgerList", 45),
];

pub const ACTION_CATEGORIES: &[(&str, &str)] = &[
    ("getAllUsers", "users"),
    ("getPendingUsers", "users"),
    ("getUserNameByEmail", "users"),
    ("checkApprovalStatus", "users"),
    ("getDocuments", "documents"),
    ("getAllDocuments", "documents"),
    ("getTemplates", "templates"),
    ("getSharedTemplates", "templates"),
    ("getStaticTags", "tags"),
    ("getMyRequestedWorkflows", "workflow"),
    ("getMyPendingWorkflows", "workflow"),
    ("getCompletedWorkflows", "workflow"),
    ("getWorkflowStatus", "workflow"),
    ("getWorkflowHistory", "workflow"),
    ("getWorkflowTemplates", "workflow"),
    ("getLedgerList", "accounting"),
    ("getLedgerEntries", "accounting"),
    ("getAccounts", "accounting"),
    ("getAccountingCategories", "accounting"),
    ("getAccountingCategorySummary", "accounting"),
    ("getPendingBudgetPlans", "accounting"),
    ("getAccountingFolderId", "accounting"),
    ("getAnnouncements", "announcements"),
    ("fetchAnnouncements", "announcements"),
    ("fetchCalendarEvents", "calendar"),
    ("fetchStudents", "students"),
    ("fetchStaff", "staff"),
    ("fetchAttendees", "attendees"),
    ("fetchStudentIssues", "students"),
    ("fetchStaffFromPapyrus", "staff"),
    ("fetchCommitteeFromPapyrus", "staff"),
    ("getSpreadsheetIds", "spreadsheetIds"),
];

pub const CATEGORY_SYNC_MINUTES: &[(&str, i64)] = &[
    ("workflow", 5),
    ("accounting", 10),
    ("announcements", 15),
    ("documents", 15),
    ("users", 30),
    ("templates", 30),
    ("spreadsheetIds", 60),
    ("calendar", 15),
    ("students", 30),
    ("staff", 30),
];

/// Categories every tick keeps fresh whatever the active scope
pub const ALWAYS_SYNC_CATEGORIES: &[&str] = &["spreadsheetIds", "users"];

/// Categories each screen or feature of the host application reads
pub const SCOPE_CATEGORIES: &[(&str, &[&str])] = &[
    ("dashboard", &["announcements", "calendar", "workflow"]),
    ("workflow", &["workflow"]),
    ("accounting", &["accounting"]),
    ("announcements", &["announcements"]),
    ("documents", &["documents", "templates"]),
    ("students", &["students"]),
    ("staff", &["staff"]),
    ("calendar", &["calendar"]),
];

fn lookup<V: Copy>(table: &[(&str, V)], name: &str) -> Option<V> {
    table.iter().find(|(k, _)| *k == name).map(|(_, v)| *v)
}

/// `category:action:params` with params serialized canonically, so the same
/// logical request always yields the same key.
pub fn derive_key(category: &str, action: &str, params: &Value) -> String {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => canonicalize(other),
    };
    format!("{}:{}:{}", category, action, params)
}

/// Rebuild objects with sorted keys, recursively.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub fn ttl_for(action: &str) -> Duration {
    Duration::minutes(lookup(ACTION_TTL_MINUTES, action).unwrap_or(DEFAULT_TTL_MINUTES))
}

pub fn category_for(action: &str) -> &'static str {
    lookup(ACTION_CATEGORIES, action).unwrap_or(DEFAULT_CATEGORY)
}

/// Every category named by the action table, sorted.
pub fn categories() -> Vec<&'static str> {
    ACTION_CATEGORIES
        .iter()
        .map(|(_, category)| *category)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Categories used by `scope`; empty for unknown scopes.
pub fn categories_for_scope(scope: &str) -> &'static [&'static str] {
    lookup(SCOPE_CATEGORIES, scope).unwrap_or(&[])
}

/// Shortest TTL among the actions filed under `category`.
fn shortest_ttl(category: &str) -> Duration {
    ACTION_CATEGORIES
        .iter()
        .filter(|(_, c)| *c == category)
        .map(|(action, _)| ttl_for(action))
        .min()
        .unwrap_or_else(|| Duration::minutes(DEFAULT_TTL_MINUTES))
}

/// Refresh cadence for a category: its configured interval, pulled in so
/// it always fires before the category's shortest TTL runs out.
pub fn sync_interval_for(category: &str) -> Duration {
    let base = Duration::minutes(
        lookup(CATEGORY_SYNC_MINUTES, category).unwrap_or(DEFAULT_SYNC_MINUTES),
    );
    let ceiling = shortest_ttl(category) * SYNC_INTERVAL_NUMERATOR / SYNC_INTERVAL_DENOMINATOR;
    base.min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_key_is_order_independent() {
        let mut a = Map::new();
        a.insert("userEmail".into(), json!("a@b.c"));
        a.insert("status".into(), json!("open"));
        let mut b = Map::new();
        b.insert("status".into(), json!("open"));
        b.insert("userEmail".into(), json!("a@b.c"));

        let ka = derive_key("workflow", "getMyPendingWorkflows", &Value::Object(a));
        let kb = derive_key("workflow", "getMyPendingWorkflows", &Value::Object(b));
        assert_eq!(ka, kb);
        assert_eq!(
            ka,
            r#"workflow:getMyPendingWorkflows:{"status":"open","userEmail":"a@b.c"}"#
        );
    }

    #[test]
    fn test_derive_key_sorts_nested_objects() {
        let key = derive_key("c", "a", &json!({"z": {"b": 1, "a": [{"y": 1, "x": 2}]}}));
        assert_eq!(key, r#"c:a:{"z":{"a":[{"x":2,"y":1}],"b":1}}"#);
    }

    #[test]
    fn test_derive_key_empty_params() {
        assert_eq!(derive_key("students", "fetchStudents", &json!({})), "students:fetchStudents:{}");
        assert_eq!(derive_key("students", "fetchStudents", &Value::Null), "students:fetchStudents:{}");
    }

    #[test]
    fn test_ttl_for() {
        assert_eq!(ttl_for("getWorkflowStatus"), Duration::minutes(3));
        assert_eq!(ttl_for("fetchStudents"), Duration::minutes(30));
        assert_eq!(ttl_for("getLedgerList"), Duration::minutes(45));
        assert_eq!(ttl_for("somethingNew"), Duration::minutes(10));
    }

    #[test]
    fn test_category_for() {
        assert_eq!(category_for("fetchStudentIssues"), "students");
        assert_eq!(category_for("getStaticTags"), "tags");
        assert_eq!(category_for("somethingNew"), "default");
    }

    #[test]
    fn test_categories_are_distinct() {
        let cats = categories();
        assert!(cats.contains(&"workflow"));
        assert!(cats.contains(&"attendees"));
        let unique: BTreeSet<_> = cats.iter().collect();
        assert_eq!(unique.len(), cats.len());
    }

    #[test]
    fn test_categories_for_scope() {
        assert_eq!(
            categories_for_scope("dashboard"),
            &["announcements", "calendar", "workflow"]
        );
        assert_eq!(categories_for_scope("documents"), &["documents", "templates"]);
        assert!(categories_for_scope("settings").is_empty());
        let known = categories();
        for (_, scoped) in SCOPE_CATEGORIES {
            assert!(scoped.iter().all(|c| known.contains(c)));
        }
    }

    #[test]
    fn test_sync_interval_shorter_than_ttl() {
        for category in categories() {
            assert!(
                sync_interval_for(category) < shortest_ttl(category),
                "{} ticks too slowly",
                category
            );
        }
        // Workflow TTL is 3 minutes, so its 5 minute cadence is pulled in
        assert_eq!(sync_interval_for("workflow"), Duration::seconds(144));
        assert_eq!(sync_interval_for("students"), Duration::minutes(8));
        assert_eq!(sync_interval_for("spreadsheetIds"), Duration::minutes(36));
    }
}
