//! The tool catalog and the dispatch pipeline behind `tools/call`:
//! look up → validate → build queries → fetch → normalize → compose.

use nagios_core::normalize::{self, extract_payload};
use nagios_core::params::{ParamDefault, input_schema};
use nagios_core::query::{
    self, CONTACT_OBJECT_TYPES, HOST_STATES, OBJECT_LIST_TYPES, OBJECT_TYPES, PROBLEM_TYPES,
    SERVICE_STATES,
};
use nagios_core::{NagiosError, ParamKind, ParamSpec, ToolArgs, UpstreamQuery};
use serde_json::{Map, Value, json};

use crate::fetch::Fetcher;

/// What a tool does once its arguments are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolBinding {
    HostStatus,
    ServiceStatus,
    Alerts,
    ProgramStatus,
    HostsInGroup,
    ServicesInGroup,
    ServicesOnHostInGroup,
    HealthSummary,
    UnhandledProblems,
    ObjectListConfig,
    SingleObjectConfig,
    HostDependencies,
    ServiceDependencies,
    ContactsForObject,
    Comments,
    CommentById,
    Downtimes,
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub binding: ToolBinding,
}

impl ToolDefinition {
    pub fn input_schema(&self) -> Value {
        input_schema(self.params)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

const HOST_NAME: ParamSpec = ParamSpec::optional(
    "host_name",
    ParamKind::String,
    "Host name as configured in Nagios.",
);
const SERVICE_DESCRIPTION: ParamSpec = ParamSpec::optional(
    "service_description",
    ParamKind::String,
    "Service description as configured in Nagios.",
);
const HOST_STATUS_FILTER: ParamSpec = ParamSpec::optional(
    "host_status_filter",
    ParamKind::EnumList(HOST_STATES),
    "Only include hosts in these states.",
);
const SERVICE_STATUS_FILTER: ParamSpec = ParamSpec::optional(
    "service_status_filter",
    ParamKind::EnumList(SERVICE_STATES),
    "Only include services in these states.",
);
const LIMIT: ParamSpec = ParamSpec::optional(
    "limit",
    ParamKind::Integer { min: 1 },
    "Maximum number of entries to return.",
)
.with_default(ParamDefault::Integer(query::DEFAULT_RESULT_LIMIT));

const HOST_STATUS_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional(
        "host_name",
        ParamKind::String,
        "Return the status of this host only. Omit to list hosts.",
    ),
    HOST_STATUS_FILTER,
    ParamSpec::optional(
        "host_group_filter",
        ParamKind::String,
        "Only include hosts in this host group.",
    ),
];

const SERVICE_STATUS_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional(
        "host_name",
        ParamKind::String,
        "Host the services run on. Together with service_description selects one service.",
    ),
    SERVICE_DESCRIPTION,
    SERVICE_STATUS_FILTER,
    ParamSpec::optional(
        "host_group_filter",
        ParamKind::String,
        "Only include services on hosts in this host group.",
    ),
    ParamSpec::optional(
        "service_group_filter",
        ParamKind::String,
        "Only include services in this service group.",
    ),
];

const HOSTS_IN_GROUP_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("host_group_name", ParamKind::String, "Host group name."),
    HOST_STATUS_FILTER,
];

const SERVICES_IN_GROUP_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("service_group_name", ParamKind::String, "Service group name."),
    SERVICE_STATUS_FILTER,
];

const SERVICES_ON_HOST_IN_GROUP_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("host_group_name", ParamKind::String, "Host group name."),
    ParamSpec::required("host_name", ParamKind::String, "Host name within the group."),
    SERVICE_STATUS_FILTER,
];

const UNHANDLED_PROBLEMS_PARAMS: &[ParamSpec] = &[ParamSpec::optional(
    "problem_type",
    ParamKind::Enum(PROBLEM_TYPES),
    "Which problems to report.",
)
.with_default(ParamDefault::Text("all"))];

const OBJECT_LIST_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "object_type",
    ParamKind::Enum(OBJECT_LIST_TYPES),
    "Kind of configuration object to list.",
)];

const SINGLE_OBJECT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required(
        "object_type",
        ParamKind::Enum(OBJECT_TYPES),
        "Kind of configuration object.",
    ),
    ParamSpec::required(
        "object_name",
        ParamKind::String,
        "Object name. For services, the host name.",
    ),
    ParamSpec::optional(
        "service_description",
        ParamKind::String,
        "Service description. Required when object_type is 'service'.",
    ),
];

const HOST_DEPENDENCY_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional(
        "host_name",
        ParamKind::String,
        "Dependent host name (same as dependent_host).",
    ),
    ParamSpec::optional("master_host", ParamKind::String, "Master host name."),
    ParamSpec::optional("dependent_host", ParamKind::String, "Dependent host name."),
];

const SERVICE_DEPENDENCY_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("host_name", ParamKind::String, "Dependent host name."),
    ParamSpec::optional(
        "service_description",
        ParamKind::String,
        "Dependent service description.",
    ),
    ParamSpec::optional("master_host", ParamKind::String, "Master host name."),
    ParamSpec::optional(
        "master_service_description",
        ParamKind::String,
        "Master service description.",
    ),
];

const CONTACTS_PARAMS: &[ParamSpec] = &[
    ParamSpec::required(
        "object_type",
        ParamKind::Enum(CONTACT_OBJECT_TYPES),
        "Kind of object whose contacts to resolve.",
    ),
    ParamSpec::required(
        "object_name",
        ParamKind::String,
        "Host name (also for services).",
    ),
    ParamSpec::optional(
        "service_description",
        ParamKind::String,
        "Service description. Required when object_type is 'service'.",
    ),
];

const COMMENTS_PARAMS: &[ParamSpec] = &[HOST_NAME, SERVICE_DESCRIPTION, LIMIT];

const COMMENT_BY_ID_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "comment_id",
    ParamKind::Integer { min: 0 },
    "Numeric comment id.",
)];

const DOWNTIMES_PARAMS: &[ParamSpec] = &[
    HOST_NAME,
    SERVICE_DESCRIPTION,
    ParamSpec::optional(
        "active_only",
        ParamKind::Boolean,
        "Only downtimes currently in effect.",
    ),
    LIMIT,
];

pub static TOOLS: &[ToolDefinition] = &[
    ToolDefinition {
        name: "get_host_status",
        description: "Current status of one host, or of all hosts matching optional state and host group filters.",
        params: HOST_STATUS_PARAMS,
        binding: ToolBinding::HostStatus,
    },
    ToolDefinition {
        name: "get_service_status",
        description: "Current status of one service (host_name + service_description), or of services matching optional filters.",
        params: SERVICE_STATUS_PARAMS,
        binding: ToolBinding::ServiceStatus,
    },
    ToolDefinition {
        name: "get_alerts",
        description: "Hosts that are DOWN or UNREACHABLE and services that are WARNING, CRITICAL or UNKNOWN.",
        params: &[],
        binding: ToolBinding::Alerts,
    },
    ToolDefinition {
        name: "get_program_status",
        description: "Nagios process status: version, PID, start time and global feature flags.",
        params: &[],
        binding: ToolBinding::ProgramStatus,
    },
    ToolDefinition {
        name: "get_hosts_in_group_status",
        description: "Status of every host in a host group.",
        params: HOSTS_IN_GROUP_PARAMS,
        binding: ToolBinding::HostsInGroup,
    },
    ToolDefinition {
        name: "get_services_in_group_status",
        description: "Status of every service in a service group.",
        params: SERVICES_IN_GROUP_PARAMS,
        binding: ToolBinding::ServicesInGroup,
    },
    ToolDefinition {
        name: "get_services_on_host_in_group_status",
        description: "Status of the services on one host, scoped to a host group.",
        params: SERVICES_ON_HOST_IN_GROUP_PARAMS,
        binding: ToolBinding::ServicesOnHostInGroup,
    },
    ToolDefinition {
        name: "get_overall_health_summary",
        description: "Host and service counts per state.",
        params: &[],
        binding: ToolBinding::HealthSummary,
    },
    ToolDefinition {
        name: "get_unhandled_problems",
        description: "Host and service problems that are neither acknowledged nor in scheduled downtime.",
        params: UNHANDLED_PROBLEMS_PARAMS,
        binding: ToolBinding::UnhandledProblems,
    },
    ToolDefinition {
        name: "get_object_list_config",
        description: "Configuration of all objects of one kind (hosts, services, groups, contacts, ...).",
        params: OBJECT_LIST_PARAMS,
        binding: ToolBinding::ObjectListConfig,
    },
    ToolDefinition {
        name: "get_single_object_config",
        description: "Configuration of one named object.",
        params: SINGLE_OBJECT_PARAMS,
        binding: ToolBinding::SingleObjectConfig,
    },
    ToolDefinition {
        name: "get_host_dependencies",
        description: "Configured host dependencies, optionally filtered by dependent or master host.",
        params: HOST_DEPENDENCY_PARAMS,
        binding: ToolBinding::HostDependencies,
    },
    ToolDefinition {
        name: "get_service_dependencies",
        description: "Configured service dependencies, optionally filtered by dependent or master service.",
        params: SERVICE_DEPENDENCY_PARAMS,
        binding: ToolBinding::ServiceDependencies,
    },
    ToolDefinition {
        name: "get_contacts_for_object",
        description: "Contacts and contact groups notified for a host or service, with their configuration.",
        params: CONTACTS_PARAMS,
        binding: ToolBinding::ContactsForObject,
    },
    ToolDefinition {
        name: "get_comments",
        description: "Host and service comments, optionally filtered by host and service.",
        params: COMMENTS_PARAMS,
        binding: ToolBinding::Comments,
    },
    ToolDefinition {
        name: "get_comment_by_id",
        description: "One comment by its numeric id.",
        params: COMMENT_BY_ID_PARAMS,
        binding: ToolBinding::CommentById,
    },
    ToolDefinition {
        name: "get_downtimes",
        description: "Scheduled downtimes, optionally only those currently in effect.",
        params: DOWNTIMES_PARAMS,
        binding: ToolBinding::Downtimes,
    },
    // Alias kept for clients that know the older name.
    ToolDefinition {
        name: "get_nagios_process_info",
        description: "Alias of get_program_status.",
        params: &[],
        binding: ToolBinding::ProgramStatus,
    },
];

pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    TOOLS.iter().find(|tool| tool.name == name)
}

/// Stateless dispatcher; the only thing it owns is the fetcher.
#[derive(Debug)]
pub struct ToolRegistry<F> {
    fetcher: F,
}

impl<F: Fetcher> ToolRegistry<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn definitions(&self) -> &'static [ToolDefinition] {
        TOOLS
    }

    pub async fn call(&self, name: &str, raw: &Map<String, Value>) -> Result<Value, NagiosError> {
        let tool = find_tool(name).ok_or_else(|| {
            NagiosError::invalid_argument("name", format!("unknown tool '{name}'"))
        })?;
        let args = ToolArgs::validate(tool.params, raw)?;
        tracing::info!(tool = name, "dispatching tool call");
        self.execute(tool.binding, &args).await
    }

    async fn execute(&self, binding: ToolBinding, args: &ToolArgs) -> Result<Value, NagiosError> {
        match binding {
            ToolBinding::HostStatus => self.single(query::host_status(args)?).await,
            ToolBinding::ServiceStatus => self.single(query::service_status(args)?).await,
            ToolBinding::ProgramStatus => self.single(query::program_status()).await,
            ToolBinding::HostsInGroup => self.single(query::hosts_in_group(args)?).await,
            ToolBinding::ServicesInGroup => self.single(query::services_in_group(args)?).await,
            ToolBinding::ServicesOnHostInGroup => {
                self.single(query::services_on_host_in_group(args)?).await
            }
            ToolBinding::ObjectListConfig => self.single(query::object_list(args)?).await,
            ToolBinding::SingleObjectConfig => self.single(query::single_object(args)?).await,
            ToolBinding::HostDependencies => self.single(query::host_dependencies(args)?).await,
            ToolBinding::ServiceDependencies => {
                self.single(query::service_dependencies(args)?).await
            }
            ToolBinding::Comments => self.single(query::comments(args)?).await,
            ToolBinding::CommentById => self.single(query::comment_by_id(args)?).await,
            ToolBinding::Downtimes => self.single(query::downtimes(args)?).await,
            ToolBinding::Alerts => {
                let hosts = self.single(query::problem_hosts()).await?;
                let services = self.single(query::problem_services()).await?;
                Ok(json!({ "hosts": hosts, "services": services }))
            }
            ToolBinding::HealthSummary => {
                let host_counts = self.single(query::host_count()).await?;
                let service_counts = self.single(query::service_count()).await?;
                Ok(json!({ "host_counts": host_counts, "service_counts": service_counts }))
            }
            ToolBinding::UnhandledProblems => self.unhandled_problems(args).await,
            ToolBinding::ContactsForObject => self.contacts_for_object(args).await,
        }
    }

    /// One query, one payload.
    async fn single(&self, query: UpstreamQuery) -> Result<Value, NagiosError> {
        let document = self.fetcher.fetch(&query).await?;
        extract_payload(document, query.payload_key()).inspect_err(|err| {
            tracing::warn!(query = query.payload_key(), error = %err, "unusable Nagios response");
        })
    }

    async fn unhandled_problems(&self, args: &ToolArgs) -> Result<Value, NagiosError> {
        let problem_type = args.text("problem_type").unwrap_or("all");
        let hosts = if matches!(problem_type, "all" | "host") {
            normalize::unhandled_hosts(self.single(query::problem_hosts()).await?)?
        } else {
            Vec::new()
        };
        let services = if matches!(problem_type, "all" | "service") {
            normalize::unhandled_services(self.single(query::problem_services()).await?)?
        } else {
            Vec::new()
        };
        Ok(json!({ "hosts": hosts, "services": services }))
    }

    async fn contacts_for_object(&self, args: &ToolArgs) -> Result<Value, NagiosError> {
        let object_query = query::object_by_name(
            args.required_text("object_type")?,
            args.required_text("object_name")?,
            args.text("service_description"),
        )?;
        let record = self.single(object_query).await?;

        let mut contacts = Vec::new();
        for name in normalize::member_names(&record, "contacts")? {
            contacts.push(self.single(query::object_by_name("contact", &name, None)?).await?);
        }
        let mut contact_groups = Vec::new();
        for name in normalize::member_names(&record, "contact_groups")? {
            contact_groups
                .push(self.single(query::object_by_name("contactgroup", &name, None)?).await?);
        }
        Ok(json!({ "contacts": contacts, "contact_groups": contact_groups }))
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use nagios_core::{NagiosError, UpstreamQuery};
    use serde_json::{Value, json};

    use crate::fetch::Fetcher;

    /// Canned documents keyed by full query string first, query name second.
    /// Records every query it is asked for.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        responses: Mutex<HashMap<String, Result<Value, NagiosError>>>,
        calls: Mutex<Vec<UpstreamQuery>>,
    }

    impl StubFetcher {
        pub(crate) fn respond(&self, key: &str, document: Value) {
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.to_string(), Ok(document));
        }

        pub(crate) fn fail(&self, key: &str, err: NagiosError) {
            self.responses
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.to_string(), Err(err));
        }

        /// Successful CGI document with `data.<key> = payload`.
        pub(crate) fn respond_ok(&self, key: &str, payload: Value) {
            let query_name = key.split('&').next().unwrap_or(key);
            let query_name = query_name.strip_prefix("query=").unwrap_or(query_name);
            self.respond(key, ok_document(query_name, payload));
        }

        pub(crate) fn calls(&self) -> Vec<UpstreamQuery> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        pub(crate) fn call_strings(&self) -> Vec<String> {
            self.calls().iter().map(UpstreamQuery::query_string).collect()
        }
    }

    pub(crate) fn ok_document(key: &str, payload: Value) -> Value {
        let mut data = serde_json::Map::new();
        data.insert(key.to_string(), payload);
        json!({
            "format_version": 0,
            "result": { "type_code": 0, "type_text": "Success", "message": "" },
            "data": data
        })
    }

    impl Fetcher for StubFetcher {
        async fn fetch(&self, query: &UpstreamQuery) -> Result<Value, NagiosError> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(query.clone());
            let responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
            responses
                .get(&query.query_string())
                .or_else(|| responses.get(query.payload_key()))
                .cloned()
                .unwrap_or_else(|| {
                    Err(NagiosError::Transport(format!(
                        "no stub response for {}",
                        query.query_string()
                    )))
                })
        }
    }
}
