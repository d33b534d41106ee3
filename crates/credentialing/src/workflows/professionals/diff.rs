//! Structural comparison of two snapshot documents.
//!
//! Three granularities are compared: the flat `personal_info` object, top-level collections
//! whose entries are matched by their `id` field, and the specialty/education collections
//! nested inside a matched qualification. Entries without an `id` are always additions.

use serde_json::{Map, Value};

use super::domain::{ChangeType, EntityKind};

/// One difference found between the live snapshot and a proposed one.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotChange {
    pub change_type: ChangeType,
    pub entity_type: EntityKind,
    pub entity_id: Option<String>,
    pub field_path: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

struct CollectionSpec {
    key: &'static str,
    kind: EntityKind,
    nested: &'static [(&'static str, EntityKind)],
}

const COLLECTIONS: &[CollectionSpec] = &[
    CollectionSpec {
        key: "qualifications",
        kind: EntityKind::Qualification,
        nested: &[
            ("specialties", EntityKind::Specialty),
            ("educations", EntityKind::Education),
        ],
    },
    CollectionSpec {
        key: "companies",
        kind: EntityKind::Company,
        nested: &[],
    },
    CollectionSpec {
        key: "bank_accounts",
        kind: EntityKind::BankAccount,
        nested: &[],
    },
];

pub fn diff_snapshots(current: &Value, proposed: &Value) -> Vec<SnapshotChange> {
    let mut changes = Vec::new();

    diff_fields(
        current.get("personal_info"),
        proposed.get("personal_info"),
        "personal_info",
        EntityKind::PersonalInfo,
        None,
        &[],
        &mut changes,
    );

    for collection in COLLECTIONS {
        diff_collection(
            current.get(collection.key),
            proposed.get(collection.key),
            collection.key,
            collection.kind,
            collection.nested,
            &mut changes,
        );
    }

    changes
}

fn empty_object() -> &'static Map<String, Value> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

fn as_object(value: Option<&Value>) -> &Map<String, Value> {
    value.and_then(Value::as_object).unwrap_or_else(|| empty_object())
}

fn as_items(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn item_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

/// Field-by-field comparison; a field missing on one side compares as `null`.
fn diff_fields(
    current: Option<&Value>,
    proposed: Option<&Value>,
    path: &str,
    kind: EntityKind,
    entity_id: Option<&str>,
    skip: &[&str],
    changes: &mut Vec<SnapshotChange>,
) {
    let current = as_object(current);
    let proposed = as_object(proposed);

    let mut keys: Vec<&String> = current.keys().chain(proposed.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        if key == "id" || skip.contains(&key.as_str()) {
            continue;
        }
        let old = current.get(key).unwrap_or(&Value::Null);
        let new = proposed.get(key).unwrap_or(&Value::Null);
        if old != new {
            changes.push(SnapshotChange {
                change_type: ChangeType::Modified,
                entity_type: kind,
                entity_id: entity_id.map(str::to_string),
                field_path: format!("{path}.{key}"),
                old_value: Some(old.clone()),
                new_value: Some(new.clone()),
            });
        }
    }
}

fn diff_collection(
    current: Option<&Value>,
    proposed: Option<&Value>,
    path: &str,
    kind: EntityKind,
    nested: &[(&'static str, EntityKind)],
    changes: &mut Vec<SnapshotChange>,
) {
    let current_items = as_items(current);
    let proposed_items = as_items(proposed);

    let mut matched = Vec::new();

    for (index, item) in proposed_items.iter().enumerate() {
        let id = item_id(item);
        let existing = id.as_deref().and_then(|id| {
            current_items
                .iter()
                .find(|candidate| item_id(candidate).as_deref() == Some(id))
        });

        match (id, existing) {
            (Some(id), Some(existing)) => {
                let nested_keys: Vec<&str> = nested.iter().map(|(key, _)| *key).collect();
                let item_path = format!("{path}[{id}]");
                diff_fields(
                    Some(existing),
                    Some(item),
                    &item_path,
                    kind,
                    Some(id.as_str()),
                    &nested_keys,
                    changes,
                );
                for (nested_key, nested_kind) in nested {
                    diff_collection(
                        existing.get(*nested_key),
                        item.get(*nested_key),
                        &format!("{item_path}.{nested_key}"),
                        *nested_kind,
                        &[],
                        changes,
                    );
                }
                matched.push(id);
            }
            (id, _) => {
                let label = id.clone().unwrap_or_else(|| format!("+{index}"));
                changes.push(SnapshotChange {
                    change_type: ChangeType::Added,
                    entity_type: kind,
                    entity_id: id,
                    field_path: format!("{path}[{label}]"),
                    old_value: None,
                    new_value: Some(item.clone()),
                });
            }
        }
    }

    for item in current_items {
        let Some(id) = item_id(item) else {
            continue;
        };
        if matched.contains(&id) {
            continue;
        }
        changes.push(SnapshotChange {
            change_type: ChangeType::Removed,
            entity_type: kind,
            field_path: format!("{path}[{id}]"),
            entity_id: Some(id),
            old_value: Some(item.clone()),
            new_value: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "personal_info": { "full_name": "Ana Souza", "cpf": "52998224725", "email": null },
            "qualifications": [{
                "id": "q1",
                "council_type": "CRM",
                "council_number": "1234",
                "council_state": "SP",
                "specialties": [{ "id": "s1", "specialty_id": "cardio", "rqe_number": null }],
                "educations": []
            }],
            "companies": [],
            "bank_accounts": [{ "id": "b1", "bank_code": "001", "account_number": "42" }]
        })
    }

    #[test]
    fn identical_snapshots_produce_no_changes() {
        assert!(diff_snapshots(&base(), &base()).is_empty());
    }

    #[test]
    fn personal_info_fields_are_compared_flat() {
        let mut proposed = base();
        proposed["personal_info"]["email"] = json!("ana@clinic.com");

        let changes = diff_snapshots(&base(), &proposed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Modified);
        assert_eq!(changes[0].entity_type, EntityKind::PersonalInfo);
        assert_eq!(changes[0].field_path, "personal_info.email");
        assert_eq!(changes[0].old_value, Some(Value::Null));
        assert_eq!(changes[0].new_value, Some(json!("ana@clinic.com")));
    }

    #[test]
    fn collections_match_by_id() {
        let mut proposed = base();
        proposed["bank_accounts"] = json!([
            { "bank_code": "237", "account_number": "7" }
        ]);
        proposed["qualifications"][0]["council_state"] = json!("RJ");

        let changes = diff_snapshots(&base(), &proposed);
        let kinds: Vec<_> = changes
            .iter()
            .map(|change| (change.change_type, change.entity_type, change.field_path.as_str()))
            .collect();

        assert!(kinds.contains(&(
            ChangeType::Modified,
            EntityKind::Qualification,
            "qualifications[q1].council_state"
        )));
        assert!(kinds.contains(&(ChangeType::Added, EntityKind::BankAccount, "bank_accounts[+0]")));
        assert!(kinds.contains(&(
            ChangeType::Removed,
            EntityKind::BankAccount,
            "bank_accounts[b1]"
        )));
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn nested_collections_diff_inside_matched_qualification() {
        let mut proposed = base();
        proposed["qualifications"][0]["specialties"] = json!([
            { "specialty_id": "derm", "rqe_number": null }
        ]);
        proposed["qualifications"][0]["educations"] = json!([
            { "level": "residency", "course_name": "Dermatology", "institution": "USP" }
        ]);

        let changes = diff_snapshots(&base(), &proposed);
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|change| change
            .field_path
            .starts_with("qualifications[q1].")));
        assert!(changes.iter().any(|change| change.entity_type == EntityKind::Specialty
            && change.change_type == ChangeType::Removed
            && change.entity_id.as_deref() == Some("s1")));
        assert!(changes
            .iter()
            .any(|change| change.entity_type == EntityKind::Education
                && change.change_type == ChangeType::Added));
    }

    #[test]
    fn removed_qualification_is_reported_once() {
        let mut proposed = base();
        proposed["qualifications"] = json!([]);

        let changes = diff_snapshots(&base(), &proposed);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Removed);
        assert_eq!(changes[0].entity_type, EntityKind::Qualification);
    }
}
