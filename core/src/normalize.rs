//! Response Normalizer: validates the CGI `result`/`data` wrapper and pulls out
//! the payload, plus the record filters used by composite tools.
//!
//! Upstream JSON is untrusted. Nothing is indexed blindly; every missing key
//! becomes a [`NagiosError::SchemaMismatch`] naming it.

use serde_json::{Map, Value};

use crate::error::NagiosError;

const UNKNOWN_CGI_ERROR: &str = "Unknown CGI error";

/// Returns `data.<key>` of a CGI document, unchanged.
pub fn extract_payload(document: Value, key: &str) -> Result<Value, NagiosError> {
    let Value::Object(mut document) = document else {
        return Err(NagiosError::schema_mismatch("result"));
    };

    let result = document
        .get("result")
        .and_then(Value::as_object)
        .ok_or_else(|| NagiosError::schema_mismatch("result"))?;
    let type_code = result
        .get("type_code")
        .and_then(Value::as_i64)
        .ok_or_else(|| NagiosError::schema_mismatch("result"))?;
    if type_code != 0 {
        return Err(NagiosError::UpstreamApi {
            type_code,
            message: failure_message(result),
        });
    }

    let Some(Value::Object(mut data)) = document.remove("data") else {
        return Err(NagiosError::schema_mismatch("data"));
    };
    data.remove(key)
        .ok_or_else(|| NagiosError::schema_mismatch(key))
}

fn failure_message(result: &Map<String, Value>) -> String {
    ["message", "type_text"]
        .iter()
        .filter_map(|k| result.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_CGI_ERROR)
        .to_string()
}

/// A problem is unhandled when it is neither acknowledged nor in scheduled downtime.
/// Absent fields count as not acknowledged / no downtime.
pub fn is_unhandled(record: &Value) -> bool {
    let acknowledged = record
        .get("problem_has_been_acknowledged")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let downtime_depth = record
        .get("scheduled_downtime_depth")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    !acknowledged && downtime_depth == 0
}

/// Unhandled hosts from a detailed `hostlist` payload (`{name: record}`),
/// as `[{name: record}]` sorted by host name.
pub fn unhandled_hosts(hostlist: Value) -> Result<Vec<Value>, NagiosError> {
    let Value::Object(hosts) = hostlist else {
        return Err(NagiosError::schema_mismatch("hostlist"));
    };
    Ok(hosts
        .into_iter()
        .filter(|(_, record)| is_unhandled(record))
        .map(|(name, record)| single_entry(name, record))
        .collect())
}

/// Unhandled services from a detailed `servicelist` payload
/// (`{host: {description: record}}`), as `[{host: {description: record}}]`.
pub fn unhandled_services(servicelist: Value) -> Result<Vec<Value>, NagiosError> {
    let Value::Object(by_host) = servicelist else {
        return Err(NagiosError::schema_mismatch("servicelist"));
    };
    let mut out = Vec::new();
    for (host, services) in by_host {
        let Value::Object(services) = services else {
            return Err(NagiosError::schema_mismatch(host));
        };
        for (description, record) in services {
            if is_unhandled(&record) {
                out.push(single_entry(host.clone(), single_entry(description, record)));
            }
        }
    }
    Ok(out)
}

fn single_entry(key: String, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key, value);
    Value::Object(map)
}

/// Names listed under `key` (`contacts`, `contact_groups`) of an object
/// configuration record. Absent means none.
pub fn member_names(record: &Value, key: &str) -> Result<Vec<String>, NagiosError> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| NagiosError::schema_mismatch(key))
            })
            .collect(),
        Some(_) => Err(NagiosError::schema_mismatch(key)),
    }
}
