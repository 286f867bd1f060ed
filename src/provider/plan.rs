//! Schema-driven plan computation shared by every resource.

use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};

/// Compute the plan moving a resource from `prior` to `proposed`.
///
/// Only attributes the user can set are diffed. Changing an attribute marked
/// replace-on-change forces replacement. On an update, computed attributes the
/// proposal leaves unset keep their prior value.
pub(crate) fn plan(schema: &Schema, prior: Option<&Value>, proposed: Value) -> PlanResult {
    match (prior, proposed) {
        (None, Value::Null) => PlanResult::no_change(Value::Null),
        (Some(prior), Value::Null) => plan_delete(schema, prior),
        (None, proposed) => plan_create(schema, proposed),
        (Some(prior), proposed) => plan_update(schema, prior, proposed),
    }
}

fn plan_create(schema: &Schema, proposed: Value) -> PlanResult {
    let changes = schema
        .attributes
        .iter()
        .filter(|(_, attr)| !attr.flags.is_computed_only())
        .filter_map(|(name, _)| {
            set_value(&proposed, name).map(|v| AttributeChange::added(name, v.clone()))
        })
        .collect();
    PlanResult::from_changes(proposed, changes)
}

fn plan_update(schema: &Schema, prior: &Value, proposed: Value) -> PlanResult {
    let mut planned = match proposed {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let planned_view = Value::Object(planned.clone());

    let mut changes = Vec::new();
    for (name, attr) in &schema.attributes {
        let before = set_value(prior, name);
        let after = set_value(&planned_view, name);

        if attr.flags.computed && after.is_none() {
            if let Some(prior_value) = before {
                planned.insert(name.clone(), prior_value.clone());
            }
            continue;
        }
        if attr.flags.is_computed_only() {
            continue;
        }

        let change = match (before, after) {
            (None, Some(after)) => AttributeChange::added(name, after.clone()),
            (Some(before), None) => AttributeChange::removed(name, before.clone()),
            (Some(before), Some(after)) if before != after => {
                AttributeChange::modified(name, before.clone(), after.clone())
            },
            _ => continue,
        };
        changes.push(if attr.requires_replace { change.forcing_replace() } else { change });
    }

    PlanResult::from_changes(Value::Object(planned), changes)
}

fn plan_delete(schema: &Schema, prior: &Value) -> PlanResult {
    let changes = schema
        .attributes
        .keys()
        .filter_map(|name| {
            set_value(prior, name).map(|v| AttributeChange::removed(name, v.clone()))
        })
        .collect();
    PlanResult::from_changes(Value::Null, changes)
}

/// The attribute's value, treating `null` as unset.
fn set_value<'a>(state: &'a Value, name: &str) -> Option<&'a Value> {
    state.get(name).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn persona_schema() -> Schema {
        Schema::v0()
            .with_attribute("sensor_id", Attribute::required_string().with_requires_replace())
            .with_attribute("persona_id", Attribute::required_string())
            .with_attribute("status", Attribute::computed_string())
    }

    #[test]
    fn test_create_lists_configured_attributes() {
        let plan = plan(&persona_schema(), None, json!({"sensor_id": "s1", "persona_id": "p1"}));
        assert_eq!(plan.changes.len(), 2);
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["sensor_id"], "s1");
    }

    #[test]
    fn test_update_in_place() {
        let prior = json!({"sensor_id": "s1", "persona_id": "p1", "status": "healthy"});
        let proposed = json!({"sensor_id": "s1", "persona_id": "p2"});
        let plan = plan(&persona_schema(), Some(&prior), proposed);

        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "persona_id");
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["status"], "healthy");
    }

    #[test]
    fn test_replace_on_sensor_change() {
        let prior = json!({"sensor_id": "s1", "persona_id": "p1"});
        let proposed = json!({"sensor_id": "s2", "persona_id": "p1"});
        let plan = plan(&persona_schema(), Some(&prior), proposed);
        assert!(plan.requires_replace);
    }

    #[test]
    fn test_null_and_missing_are_equal() {
        let prior = json!({"sensor_id": "s1", "persona_id": "p1", "status": null});
        let proposed = json!({"sensor_id": "s1", "persona_id": "p1"});
        let plan = plan(&persona_schema(), Some(&prior), proposed);
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_delete() {
        let prior = json!({"sensor_id": "s1", "persona_id": "p1"});
        let plan = plan(&persona_schema(), Some(&prior), Value::Null);
        assert_eq!(plan.planned_state, Value::Null);
        assert_eq!(plan.changes.len(), 2);
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
    }
}
