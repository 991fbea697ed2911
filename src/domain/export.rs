//! Bulk Data export domain model
//!
//! Types describing one FHIR Bulk Data export job: the request that starts it,
//! the location used to track it, and the manifest it resolves to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters of a group-level `$export` kickoff
///
/// Built once per run from configuration and never mutated afterwards.
///
/// # Examples
///
/// ```
/// use labwatch::domain::ExportRequest;
///
/// let request = ExportRequest::new("group-1")
///     .with_types(["Patient", "Observation"])
///     .with_type_filter("Observation?category=laboratory");
///
/// assert_eq!(request.type_param(), "Patient,Observation");
/// assert_eq!(request.type_filter_key(), "typeFilter");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    group_id: String,
    resource_types: Vec<String>,
    type_filters: Vec<String>,
    type_filter_key: String,
}

/// Query parameter name used for type filters unless overridden
const DEFAULT_TYPE_FILTER_PARAMETER: &str = "typeFilter";

impl ExportRequest {
    /// Creates a request for the given group with no type restrictions
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            resource_types: Vec::new(),
            type_filters: Vec::new(),
            type_filter_key: DEFAULT_TYPE_FILTER_PARAMETER.to_string(),
        }
    }

    /// Restricts the export to the given resource types
    ///
    /// Duplicates are dropped while keeping the first occurrence's position.
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for resource_type in types {
            let resource_type = resource_type.into();
            if !self.resource_types.contains(&resource_type) {
                self.resource_types.push(resource_type);
            }
        }
        self
    }

    /// Adds a type filter expression
    pub fn with_type_filter(mut self, filter: impl Into<String>) -> Self {
        self.type_filters.push(filter.into());
        self
    }

    /// Sends type filters under `name` instead of `typeFilter`
    pub fn with_type_filter_parameter(mut self, name: impl Into<String>) -> Self {
        self.type_filter_key = name.into();
        self
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn resource_types(&self) -> &[String] {
        &self.resource_types
    }

    pub fn type_filters(&self) -> &[String] {
        &self.type_filters
    }

    /// Value of the `_type` query parameter
    pub fn type_param(&self) -> String {
        self.resource_types.join(",")
    }

    /// Query parameter name for [`Self::type_filter_param`]
    pub fn type_filter_key(&self) -> &str {
        &self.type_filter_key
    }

    /// Value of the type filter query parameter
    pub fn type_filter_param(&self) -> String {
        self.type_filters.join(",")
    }
}

/// Status URL of a running export job, taken from the kickoff `Content-Location`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PollLocation(String);

impl PollLocation {
    /// Creates a poll location, rejecting empty values
    pub fn new(location: impl Into<String>) -> Result<Self, String> {
        let location = location.into();
        if location.trim().is_empty() {
            return Err("Poll location cannot be empty".to_string());
        }
        Ok(Self(location))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PollLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PollLocation {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One output file listed in an export manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    /// Resource type contained in the file (e.g. `Patient`)
    #[serde(rename = "type")]
    pub record_type: String,

    /// Download location of the NDJSON file
    pub url: String,

    /// Number of resources in the file, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl OutputEntry {
    pub fn new(record_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            url: url.into(),
            count: None,
        }
    }
}

/// Completion manifest of an export job
///
/// Unknown fields sent by the server are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,

    #[serde(default)]
    pub requires_access_token: bool,

    /// Output files in server order
    #[serde(default)]
    pub output: Vec<OutputEntry>,

    /// OperationOutcome files describing per-resource export errors
    #[serde(default)]
    pub error: Vec<OutputEntry>,
}

impl Manifest {
    /// Output entries holding the given resource type, in manifest order
    pub fn entries_of_type<'a>(
        &'a self,
        record_type: &'a str,
    ) -> impl Iterator<Item = &'a OutputEntry> + 'a {
        self.output
            .iter()
            .filter(move |entry| entry.record_type == record_type)
    }
}
