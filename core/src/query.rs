//! Query Builder: maps validated tool arguments onto the query vocabulary of
//! the Nagios Core CGI JSON API.
//!
//! Every query carries `query=<name>`. The JSON document the CGI returns nests
//! the payload under `data.<name>`, so the query name doubles as the payload key.

use url::form_urlencoded;

use crate::error::NagiosError;
use crate::params::ToolArgs;

pub const HOST_STATES: &[&str] = &["up", "down", "unreachable", "pending"];
pub const SERVICE_STATES: &[&str] = &["ok", "warning", "critical", "unknown", "pending"];
pub const PROBLEM_TYPES: &[&str] = &["all", "host", "service"];

/// States reported by alert and unhandled-problem tools.
pub const PROBLEM_HOST_STATES: &[&str] = &["down", "unreachable"];
pub const PROBLEM_SERVICE_STATES: &[&str] = &["warning", "critical", "unknown"];

/// Plural object types accepted by `get_object_list_config`, with their list query.
const OBJECT_LISTS: &[(&str, &str)] = &[
    ("hosts", "hostlist"),
    ("services", "servicelist"),
    ("hostgroups", "hostgrouplist"),
    ("servicegroups", "servicegrouplist"),
    ("contacts", "contactlist"),
    ("contactgroups", "contactgrouplist"),
    ("timeperiods", "timeperiodlist"),
    ("commands", "commandlist"),
    ("hostdependencies", "hostdependencylist"),
    ("servicedependencies", "servicedependencylist"),
    ("hostescalations", "hostescalationlist"),
    ("serviceescalations", "serviceescalationlist"),
];

pub const OBJECT_LIST_TYPES: &[&str] = &[
    "hosts",
    "services",
    "hostgroups",
    "servicegroups",
    "contacts",
    "contactgroups",
    "timeperiods",
    "commands",
    "hostdependencies",
    "servicedependencies",
    "hostescalations",
    "serviceescalations",
];

/// Singular object types with the parameter that names one instance.
/// `service` additionally needs `servicedescription`.
const OBJECT_NAME_KEYS: &[(&str, &str)] = &[
    ("host", "hostname"),
    ("service", "hostname"),
    ("hostgroup", "hostgroup"),
    ("servicegroup", "servicegroup"),
    ("contact", "contactname"),
    ("contactgroup", "contactgroup"),
    ("timeperiod", "timeperiod"),
    ("command", "command"),
];

pub const OBJECT_TYPES: &[&str] = &[
    "host",
    "service",
    "hostgroup",
    "servicegroup",
    "contact",
    "contactgroup",
    "timeperiod",
    "command",
];

/// Object types that carry contacts and contact groups.
pub const CONTACT_OBJECT_TYPES: &[&str] = &["host", "service"];

pub const DEFAULT_RESULT_LIMIT: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Runtime state: hosts, services, program, comments, downtimes.
    Status,
    /// Static object configuration.
    Object,
}

impl Endpoint {
    pub fn script(self) -> &'static str {
        match self {
            Endpoint::Status => "statusjson.cgi",
            Endpoint::Object => "objectjson.cgi",
        }
    }
}

/// One upstream GET: endpoint plus query parameters in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamQuery {
    endpoint: Endpoint,
    params: Vec<(String, String)>,
}

impl UpstreamQuery {
    fn new(endpoint: Endpoint, query: &str) -> Self {
        let mut params = vec![("query".to_string(), query.to_string())];
        // Collections only return names unless details are requested.
        if query.ends_with("list") {
            params.push(("details".to_string(), "true".to_string()));
        }
        Self { endpoint, params }
    }

    fn status(query: &str) -> Self {
        Self::new(Endpoint::Status, query)
    }

    fn object(query: &str) -> Self {
        Self::new(Endpoint::Object, query)
    }

    fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    fn with_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// State filters are space separated in the CGI vocabulary.
    fn with_states(self, key: &str, states: Option<&[String]>) -> Self {
        match states {
            Some(states) if !states.is_empty() => self.with(key, states.join(" ")),
            _ => self,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Key under `data` holding this query's payload.
    pub fn payload_key(&self) -> &str {
        self.param("query").unwrap_or_default()
    }

    /// URL-encoded query string, e.g. `query=host&hostname=srv1`.
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Status family (statusjson.cgi)
// ---------------------------------------------------------------------------

pub fn host_status(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    match args.text("host_name") {
        Some(host_name) => {
            reject_with_single_object(args, &["host_status_filter", "host_group_filter"], "host_name")?;
            Ok(UpstreamQuery::status("host").with("hostname", host_name))
        }
        None => Ok(host_list(
            args.list("host_status_filter"),
            args.text("host_group_filter"),
        )),
    }
}

pub fn service_status(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let host_name = args.text("host_name");
    match (host_name, args.text("service_description")) {
        (Some(host_name), Some(service_description)) => {
            reject_with_single_object(
                args,
                &[
                    "service_status_filter",
                    "host_group_filter",
                    "service_group_filter",
                ],
                "service_description",
            )?;
            Ok(UpstreamQuery::status("service")
                .with("hostname", host_name)
                .with("servicedescription", service_description))
        }
        (None, Some(_)) => Err(NagiosError::invalid_argument(
            "service_description",
            "service_description requires host_name",
        )),
        (_, None) => Ok(service_list(
            host_name,
            args.list("service_status_filter"),
            args.text("host_group_filter"),
            args.text("service_group_filter"),
        )),
    }
}

pub fn hosts_in_group(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let group = args.required_text("host_group_name")?;
    Ok(host_list(args.list("host_status_filter"), Some(group)))
}

pub fn services_in_group(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let group = args.required_text("service_group_name")?;
    Ok(service_list(
        None,
        args.list("service_status_filter"),
        None,
        Some(group),
    ))
}

pub fn services_on_host_in_group(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let group = args.required_text("host_group_name")?;
    let host_name = args.required_text("host_name")?;
    Ok(service_list(
        Some(host_name),
        args.list("service_status_filter"),
        Some(group),
        None,
    ))
}

/// Hosts in a non-UP state.
pub fn problem_hosts() -> UpstreamQuery {
    UpstreamQuery::status("hostlist").with("hoststatus", PROBLEM_HOST_STATES.join(" "))
}

/// Services in a non-OK state.
pub fn problem_services() -> UpstreamQuery {
    UpstreamQuery::status("servicelist").with("servicestatus", PROBLEM_SERVICE_STATES.join(" "))
}

pub fn program_status() -> UpstreamQuery {
    UpstreamQuery::status("programstatus")
}

pub fn host_count() -> UpstreamQuery {
    UpstreamQuery::status("hostcount")
}

pub fn service_count() -> UpstreamQuery {
    UpstreamQuery::status("servicecount")
}

pub fn comments(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    Ok(UpstreamQuery::status("commentlist")
        .with("count", limit(args).to_string())
        .with_opt("hostname", args.text("host_name"))
        .with_opt("servicedescription", args.text("service_description")))
}

pub fn comment_by_id(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let comment_id = args
        .integer("comment_id")
        .ok_or_else(|| NagiosError::invalid_argument("comment_id", "missing required parameter"))?;
    Ok(UpstreamQuery::status("comment").with("commentid", comment_id.to_string()))
}

pub fn downtimes(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let query = UpstreamQuery::status("downtimelist")
        .with("count", limit(args).to_string())
        .with_opt("hostname", args.text("host_name"))
        .with_opt("servicedescription", args.text("service_description"));
    Ok(if args.flag("active_only") == Some(true) {
        query.with("ineffect", "yes")
    } else {
        query
    })
}

fn host_list(states: Option<&[String]>, host_group: Option<&str>) -> UpstreamQuery {
    UpstreamQuery::status("hostlist")
        .with_states("hoststatus", states)
        .with_opt("hostgroup", host_group)
}

fn service_list(
    host_name: Option<&str>,
    states: Option<&[String]>,
    host_group: Option<&str>,
    service_group: Option<&str>,
) -> UpstreamQuery {
    UpstreamQuery::status("servicelist")
        .with_opt("hostname", host_name)
        .with_states("servicestatus", states)
        .with_opt("hostgroup", host_group)
        .with_opt("servicegroup", service_group)
}

fn limit(args: &ToolArgs) -> u64 {
    args.integer("limit").unwrap_or(DEFAULT_RESULT_LIMIT)
}

fn reject_with_single_object(
    args: &ToolArgs,
    list_only: &[&str],
    scoped_by: &str,
) -> Result<(), NagiosError> {
    match list_only.iter().find(|name| args.contains(name)) {
        Some(name) => Err(NagiosError::invalid_argument(
            *name,
            format!("filters apply to collection queries only; omit {scoped_by} or drop {name}"),
        )),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Configuration family (objectjson.cgi)
// ---------------------------------------------------------------------------

pub fn object_list(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let object_type = args.required_text("object_type")?;
    let (_, query) = OBJECT_LISTS
        .iter()
        .find(|(plural, _)| *plural == object_type)
        .ok_or_else(|| {
            NagiosError::invalid_argument(
                "object_type",
                format!("'{object_type}' is not one of: {}", OBJECT_LIST_TYPES.join(", ")),
            )
        })?;
    Ok(UpstreamQuery::object(query))
}

pub fn single_object(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    object_by_name(
        args.required_text("object_type")?,
        args.required_text("object_name")?,
        args.text("service_description"),
    )
}

/// Configuration of one named object. For `service`, `name` is the host name.
pub fn object_by_name(
    object_type: &str,
    name: &str,
    service_description: Option<&str>,
) -> Result<UpstreamQuery, NagiosError> {
    let (_, name_key) = OBJECT_NAME_KEYS
        .iter()
        .find(|(kind, _)| *kind == object_type)
        .ok_or_else(|| {
            NagiosError::invalid_argument(
                "object_type",
                format!("'{object_type}' is not one of: {}", OBJECT_TYPES.join(", ")),
            )
        })?;

    let query = UpstreamQuery::object(object_type).with(name_key, name);
    match (object_type, service_description) {
        ("service", Some(description)) => Ok(query.with("servicedescription", description)),
        ("service", None) => Err(NagiosError::invalid_argument(
            "service_description",
            "service_description is required when object_type is 'service'",
        )),
        (_, Some(_)) => Err(NagiosError::invalid_argument(
            "service_description",
            "service_description only applies when object_type is 'service'",
        )),
        (_, None) => Ok(query),
    }
}

pub fn host_dependencies(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    let dependent = match (args.text("host_name"), args.text("dependent_host")) {
        (Some(_), Some(_)) => {
            return Err(NagiosError::invalid_argument(
                "dependent_host",
                "host_name and dependent_host both select the dependent host; pass only one",
            ));
        }
        (host_name, dependent_host) => host_name.or(dependent_host),
    };
    Ok(UpstreamQuery::object("hostdependencylist")
        .with_opt("dependenthostname", dependent)
        .with_opt("masterhostname", args.text("master_host")))
}

pub fn service_dependencies(args: &ToolArgs) -> Result<UpstreamQuery, NagiosError> {
    Ok(UpstreamQuery::object("servicedependencylist")
        .with_opt("dependenthostname", args.text("host_name"))
        .with_opt(
            "dependentservicedescription",
            args.text("service_description"),
        )
        .with_opt("masterhostname", args.text("master_host"))
        .with_opt(
            "masterservicedescription",
            args.text("master_service_description"),
        ))
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::params::{ParamKind, ParamSpec};

    const ANY: &[ParamSpec] = &[
        ParamSpec::optional("host_name", ParamKind::String, ""),
        ParamSpec::optional("service_description", ParamKind::String, ""),
        ParamSpec::optional("host_group_filter", ParamKind::String, ""),
        ParamSpec::optional("service_group_filter", ParamKind::String, ""),
        ParamSpec::optional("host_status_filter", ParamKind::EnumList(HOST_STATES), ""),
        ParamSpec::optional("service_status_filter", ParamKind::EnumList(SERVICE_STATES), ""),
        ParamSpec::optional("host_group_name", ParamKind::String, ""),
        ParamSpec::optional("service_group_name", ParamKind::String, ""),
        ParamSpec::optional("object_type", ParamKind::String, ""),
        ParamSpec::optional("object_name", ParamKind::String, ""),
        ParamSpec::optional("master_host", ParamKind::String, ""),
        ParamSpec::optional("dependent_host", ParamKind::String, ""),
        ParamSpec::optional("master_service_description", ParamKind::String, ""),
        ParamSpec::optional("comment_id", ParamKind::Integer { min: 0 }, ""),
        ParamSpec::optional("limit", ParamKind::Integer { min: 1 }, ""),
        ParamSpec::optional("active_only", ParamKind::Boolean, ""),
    ];

    fn args(value: Value) -> ToolArgs {
        let map = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ToolArgs::validate(ANY, &map).unwrap()
    }

    fn keys(query: &UpstreamQuery) -> Vec<&str> {
        query.params().iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn host_status_without_name_requests_full_list_with_details() {
        let query = host_status(&args(json!({}))).unwrap();
        assert_eq!(query.endpoint(), Endpoint::Status);
        assert_eq!(query.query_string(), "query=hostlist&details=true");
        assert_eq!(query.payload_key(), "hostlist");
    }

    #[test]
    fn host_status_with_name_is_scoped_to_one_host() {
        let query = host_status(&args(json!({ "host_name": "srv1" }))).unwrap();
        assert_eq!(query.query_string(), "query=host&hostname=srv1");
        assert_eq!(query.payload_key(), "host");
    }

    #[test]
    fn host_status_filters_are_space_joined() {
        let query = host_status(&args(json!({
            "host_status_filter": ["down", "unreachable"],
            "host_group_filter": "linux-servers"
        })))
        .unwrap();
        assert_eq!(query.param("hoststatus"), Some("down unreachable"));
        assert_eq!(query.param("hostgroup"), Some("linux-servers"));
        assert_eq!(
            query.query_string(),
            "query=hostlist&details=true&hoststatus=down+unreachable&hostgroup=linux-servers"
        );
    }

    #[test]
    fn host_status_rejects_filters_on_single_host_lookup() {
        let err = host_status(&args(json!({
            "host_name": "srv1",
            "host_status_filter": ["down"]
        })))
        .unwrap_err();
        assert!(
            matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "host_status_filter")
        );
    }

    #[test]
    fn service_status_single_service_lookup() {
        let query = service_status(&args(json!({
            "host_name": "srv1",
            "service_description": "HTTP Check"
        })))
        .unwrap();
        assert_eq!(
            query.query_string(),
            "query=service&hostname=srv1&servicedescription=HTTP+Check"
        );
        assert_eq!(query.payload_key(), "service");
    }

    #[test]
    fn service_status_list_filtered_by_host() {
        let query = service_status(&args(json!({
            "host_name": "srv1",
            "service_status_filter": ["critical"]
        })))
        .unwrap();
        assert_eq!(
            keys(&query),
            vec!["query", "details", "hostname", "servicestatus"]
        );
        assert_eq!(query.payload_key(), "servicelist");
    }

    #[test]
    fn service_description_without_host_is_ambiguous() {
        let err = service_status(&args(json!({ "service_description": "PING" }))).unwrap_err();
        assert!(
            matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "service_description")
        );
    }

    #[test]
    fn group_queries_map_group_names_to_cgi_filters() {
        let hosts = hosts_in_group(&args(json!({ "host_group_name": "web" }))).unwrap();
        assert_eq!(hosts.query_string(), "query=hostlist&details=true&hostgroup=web");

        let services = services_in_group(&args(json!({
            "service_group_name": "db",
            "service_status_filter": ["warning", "critical"]
        })))
        .unwrap();
        assert_eq!(
            services.query_string(),
            "query=servicelist&details=true&servicestatus=warning+critical&servicegroup=db"
        );

        let on_host = services_on_host_in_group(&args(json!({
            "host_group_name": "web",
            "host_name": "srv1"
        })))
        .unwrap();
        assert_eq!(
            on_host.query_string(),
            "query=servicelist&details=true&hostname=srv1&hostgroup=web"
        );
    }

    #[test]
    fn group_queries_require_group_name() {
        let err = hosts_in_group(&args(json!({}))).unwrap_err();
        assert!(
            matches!(err, NagiosError::InvalidArgument { ref field, .. } if field == "host_group_name")
        );
    }

    #[test]
    fn problem_queries_use_fixed_non_ok_filters() {
        assert_eq!(problem_hosts().param("hoststatus"), Some("down unreachable"));
        assert_eq!(
            problem_services().param("servicestatus"),
            Some("warning critical unknown")
        );
    }

    #[test]
    fn count_and_program_queries_have_no_details_flag() {
        assert_eq!(program_status().query_string(), "query=programstatus");
        assert_eq!(host_count().query_string(), "query=hostcount");
        assert_eq!(service_count().payload_key(), "servicecount");
    }

    #[test]
    fn comments_default_limit_and_filters() {
        let query = comments(&args(json!({ "host_name": "srv1" }))).unwrap();
        assert_eq!(
            query.query_string(),
            "query=commentlist&details=true&count=50&hostname=srv1"
        );
    }

    #[test]
    fn comment_by_id_is_single_object_query() {
        let query = comment_by_id(&args(json!({ "comment_id": 42 }))).unwrap();
        assert_eq!(query.query_string(), "query=comment&commentid=42");
        assert_eq!(query.payload_key(), "comment");
    }

    #[test]
    fn downtimes_active_only_adds_in_effect_filter() {
        let query = downtimes(&args(json!({ "active_only": true, "limit": 5 }))).unwrap();
        assert_eq!(
            query.query_string(),
            "query=downtimelist&details=true&count=5&ineffect=yes"
        );
        let query = downtimes(&args(json!({ "active_only": false }))).unwrap();
        assert_eq!(query.param("ineffect"), None);
    }

    #[test]
    fn object_list_maps_plural_types_to_list_queries() {
        let query = object_list(&args(json!({ "object_type": "hostgroups" }))).unwrap();
        assert_eq!(query.endpoint(), Endpoint::Object);
        assert_eq!(query.query_string(), "query=hostgrouplist&details=true");
        assert_eq!(query.payload_key(), "hostgrouplist");

        let query = object_list(&args(json!({ "object_type": "servicedependencies" }))).unwrap();
        assert_eq!(query.payload_key(), "servicedependencylist");
    }

    #[test]
    fn every_plural_object_type_has_a_list_query() {
        for plural in OBJECT_LIST_TYPES {
            assert!(OBJECT_LISTS.iter().any(|(p, _)| p == plural), "{plural}");
        }
        for singular in OBJECT_TYPES {
            assert!(OBJECT_NAME_KEYS.iter().any(|(k, _)| k == singular), "{singular}");
        }
    }

    #[test]
    fn single_host_config_query() {
        let query = single_object(&args(json!({ "object_type": "host", "object_name": "srv1" })))
            .unwrap();
        assert_eq!(query.endpoint(), Endpoint::Object);
        assert_eq!(query.query_string(), "query=host&hostname=srv1");
        assert_eq!(query.payload_key(), "host");
    }

    #[test]
    fn single_object_name_keys_follow_object_type() {
        let cases = [
            ("hostgroup", "query=hostgroup&hostgroup=web"),
            ("servicegroup", "query=servicegroup&servicegroup=web"),
            ("contact", "query=contact&contactname=web"),
            ("contactgroup", "query=contactgroup&contactgroup=web"),
            ("timeperiod", "query=timeperiod&timeperiod=web"),
            ("command", "query=command&command=web"),
        ];
        for (object_type, expected) in cases {
            let query = object_by_name(object_type, "web", None).unwrap();
            assert_eq!(query.query_string(), expected);
            assert_eq!(query.payload_key(), object_type);
        }
    }

    #[test]
    fn service_config_requires_description_and_others_reject_it() {
        let query = object_by_name("service", "srv1", Some("PING")).unwrap();
        assert_eq!(
            query.query_string(),
            "query=service&hostname=srv1&servicedescription=PING"
        );
        assert!(object_by_name("service", "srv1", None).is_err());
        assert!(object_by_name("host", "srv1", Some("PING")).is_err());
        assert!(object_by_name("hostescalation", "srv1", None).is_err());
    }

    #[test]
    fn host_dependencies_map_dependent_and_master() {
        let query = host_dependencies(&args(json!({
            "dependent_host": "web1",
            "master_host": "router"
        })))
        .unwrap();
        assert_eq!(query.endpoint(), Endpoint::Object);
        assert_eq!(
            query.query_string(),
            "query=hostdependencylist&details=true&dependenthostname=web1&masterhostname=router"
        );
        assert!(
            host_dependencies(&args(json!({ "host_name": "a", "dependent_host": "b" }))).is_err()
        );
    }

    #[test]
    fn service_dependencies_emit_only_given_filters() {
        let query = service_dependencies(&args(json!({
            "host_name": "web1",
            "master_service_description": "MySQL"
        })))
        .unwrap();
        assert_eq!(
            keys(&query),
            vec![
                "query",
                "details",
                "dependenthostname",
                "masterservicedescription"
            ]
        );
        assert_eq!(query.payload_key(), "servicedependencylist");
    }

    #[test]
    fn identical_arguments_build_identical_queries() {
        let a = service_status(&args(json!({ "host_name": "srv1" }))).unwrap();
        let b = service_status(&args(json!({ "host_name": "srv1" }))).unwrap();
        assert_eq!(a, b);
    }
}
