//! 动作执行与校验

use serde_json::{Map, Value};
use tracing::debug;

use crate::condition::unknown_keys;
use crate::error::{Result, RuleError, ValidationError};
use crate::invoke::Invocable;
use crate::value::is_truthy;

pub(crate) const ROOT_PATH: &str = "actions";

const ACTION_KEYS: [&str; 3] = ["action", "args", "params"];

const MSG_ACTOR_REQUIRED: &str = "Actor is required";
const MSG_ACTIONS_NOT_LIST: &str = "'actions' must be a list";
const MSG_NOT_DICT: &str = "Action must be a dictionary";
const MSG_ACTION_REQUIRED: &str = "'action' is required";
const MSG_ACTION_NOT_STRING: &str = "'action' must be a string";
const MSG_ARGS_NOT_LIST: &str = "'args' must be a list";
const MSG_PARAMS_NOT_DICT: &str = "'params' must be a dictionary";

/// 按顺序执行动作，任一失败立即返回，后续动作不再执行
///
/// 空动作列表不需要执行者。
pub fn execute_actions(actions: &Value, actor: Option<&dyn Invocable>) -> Result<()> {
    let items = actions
        .as_array()
        .ok_or_else(|| RuleError::invalid_action(ROOT_PATH, MSG_ACTIONS_NOT_LIST))?;
    if items.is_empty() {
        return Ok(());
    }
    let actor = actor.ok_or(RuleError::MissingActor)?;

    let empty = Map::new();
    for (i, item) in items.iter().enumerate() {
        let path = format!("{}[{}]", ROOT_PATH, i);
        let map = item
            .as_object()
            .ok_or_else(|| RuleError::invalid_action(&path, MSG_NOT_DICT))?;

        let invalid = unknown_keys(map, &ACTION_KEYS);
        if !invalid.is_empty() {
            return Err(RuleError::invalid_action(
                &path,
                format!("Invalid keys: {}", invalid.join(", ")),
            ));
        }

        let method = match map.get("action") {
            Some(Value::String(name)) if !name.is_empty() => name.as_str(),
            Some(v) if is_truthy(v) => return Err(RuleError::invalid_action(&path, MSG_ACTION_NOT_STRING)),
            _ => return Err(RuleError::invalid_action(&path, MSG_ACTION_REQUIRED)),
        };

        let args = match map.get("args") {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(args)) => args.as_slice(),
            Some(_) => return Err(RuleError::invalid_action(&path, MSG_ARGS_NOT_LIST)),
        };

        let params = match map.get("params") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(params)) => params,
            Some(_) => return Err(RuleError::invalid_action(&path, MSG_PARAMS_NOT_DICT)),
        };

        if !actor.has_method(method) {
            return Err(RuleError::MethodNotFound {
                target: actor.type_name().to_string(),
                method: method.to_string(),
            });
        }

        actor
            .call_method(method, args, params)
            .map_err(|source| RuleError::MethodInvocation {
                method: method.to_string(),
                source,
            })?;
        debug!(path = %path, action = method, "动作已执行");
    }

    Ok(())
}

/// 校验动作列表，返回全部错误（为空表示合法）
pub fn validate_actions(actions: &Value, actor: Option<&dyn Invocable>) -> Vec<ValidationError> {
    let Some(actor) = actor else {
        return vec![ValidationError::action(ROOT_PATH, MSG_ACTOR_REQUIRED)];
    };

    let Some(items) = actions.as_array() else {
        return vec![ValidationError::action(ROOT_PATH, MSG_ACTIONS_NOT_LIST)];
    };

    let mut errors = Vec::new();
    for (i, item) in items.iter().enumerate() {
        validate_action(item, actor, &format!("{}[{}]", ROOT_PATH, i), &mut errors);
    }
    errors
}

fn validate_action(item: &Value, actor: &dyn Invocable, path: &str, errors: &mut Vec<ValidationError>) {
    let mut push = |message: String| errors.push(ValidationError::action(path, message));

    let Some(map) = item.as_object() else {
        push(MSG_NOT_DICT.to_string());
        return;
    };

    let invalid = unknown_keys(map, &ACTION_KEYS);
    if !invalid.is_empty() {
        push(format!("Invalid keys: {}", invalid.join(", ")));
    }

    match map.get("action") {
        Some(Value::String(name)) if !name.is_empty() => {
            if !actor.has_method(name) {
                push(format!(
                    "Action method '{}' is not defined in '{}'",
                    name,
                    actor.type_name()
                ));
            }
        }
        Some(v) if is_truthy(v) => push(MSG_ACTION_NOT_STRING.to_string()),
        _ => push(MSG_ACTION_REQUIRED.to_string()),
    }

    if map.get("args").is_some_and(|v| !v.is_null() && !v.is_array()) {
        push(MSG_ARGS_NOT_LIST.to_string());
    }

    if map.get("params").is_some_and(|v| !v.is_null() && !v.is_object()) {
        push(MSG_PARAMS_NOT_DICT.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{MethodError, MethodTable};
    use parking_lot::Mutex;
    use serde_json::json;

    fn err(path: &str, message: &str) -> ValidationError {
        ValidationError::action(path, message)
    }

    fn recording_actor(log: &Mutex<Vec<String>>) -> MethodTable<'_> {
        MethodTable::new("MockActor")
            .method("action_one", move |args, _| {
                log.lock().push(format!("one{:?}", args));
                Ok(Value::Null)
            })
            .method("action_two", move |_, params| {
                log.lock().push(format!("two:{}", Value::Object(params.clone())));
                Ok(Value::Null)
            })
            .method("fail", |_, _| Err(MethodError::Failed(anyhow::anyhow!("boom"))))
    }

    #[test]
    fn test_validate_requires_actor() {
        assert_eq!(
            validate_actions(&json!([{"action": "anything", "extra": 1}]), None),
            vec![err("actions", MSG_ACTOR_REQUIRED)]
        );
    }

    #[test]
    fn test_validate_requires_list() {
        let log = Mutex::new(Vec::new());
        let actor = recording_actor(&log);
        assert_eq!(
            validate_actions(&json!({"action": "action_one"}), Some(&actor)),
            vec![err("actions", MSG_ACTIONS_NOT_LIST)]
        );
        assert!(validate_actions(&json!([]), Some(&actor)).is_empty());
    }

    #[test]
    fn test_validate_collects_per_item() {
        let log = Mutex::new(Vec::new());
        let actor = recording_actor(&log);
        let actions = json!([
            "not a dict",
            {"action": "action_one", "args": [1], "params": {"k": "v"}},
            {"action": "missing_method", "zzz": 1, "aaa": 2},
            {"args": "x", "params": []},
            {"action": 7}
        ]);

        assert_eq!(
            validate_actions(&actions, Some(&actor)),
            vec![
                err("actions[0]", MSG_NOT_DICT),
                err("actions[2]", "Invalid keys: aaa, zzz"),
                err("actions[2]", "Action method 'missing_method' is not defined in 'MockActor'"),
                err("actions[3]", MSG_ACTION_REQUIRED),
                err("actions[3]", MSG_ARGS_NOT_LIST),
                err("actions[3]", MSG_PARAMS_NOT_DICT),
                err("actions[4]", MSG_ACTION_NOT_STRING),
            ]
        );
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_execute_in_order() {
        let log = Mutex::new(Vec::new());
        let actor = recording_actor(&log);
        let actions = json!([
            {"action": "action_two", "params": {"x": 1}},
            {"action": "action_one", "args": [1, "a"]}
        ]);

        execute_actions(&actions, Some(&actor)).unwrap();
        assert_eq!(
            *log.lock(),
            vec![r#"two:{"x":1}"#.to_string(), r#"one[Number(1), String("a")]"#.to_string()]
        );
    }

    #[test]
    fn test_execute_stops_at_first_failure() {
        let log = Mutex::new(Vec::new());
        let actor = recording_actor(&log);
        let actions = json!([
            {"action": "action_one"},
            {"action": "fail"},
            {"action": "action_two"}
        ]);

        let err = execute_actions(&actions, Some(&actor)).unwrap_err();
        assert!(matches!(err, RuleError::MethodInvocation { ref method, .. } if method == "fail"));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_execute_errors() {
        let log = Mutex::new(Vec::new());
        let actor = recording_actor(&log);

        assert!(execute_actions(&json!([]), None).is_ok());
        assert!(matches!(
            execute_actions(&json!([{"action": "action_one"}]), None),
            Err(RuleError::MissingActor)
        ));
        assert!(matches!(
            execute_actions(&json!("x"), Some(&actor)),
            Err(RuleError::InvalidAction { ref path, .. }) if path == "actions"
        ));
        assert!(matches!(
            execute_actions(&json!([{"action": "action_one"}, 3]), Some(&actor)),
            Err(RuleError::InvalidAction { ref path, ref message }) if path == "actions[1]" && message == MSG_NOT_DICT
        ));
        assert!(matches!(
            execute_actions(&json!([{"action": "nope"}]), Some(&actor)),
            Err(RuleError::MethodNotFound { ref target, .. }) if target == "MockActor"
        ));
        assert!(matches!(
            execute_actions(&json!([{"action": "action_one", "args": {}}]), Some(&actor)),
            Err(RuleError::InvalidAction { ref message, .. }) if message == MSG_ARGS_NOT_LIST
        ));
        assert!(matches!(
            execute_actions(&json!([{}]), Some(&actor)),
            Err(RuleError::InvalidAction { ref message, .. }) if message == MSG_ACTION_REQUIRED
        ));
    }
}
