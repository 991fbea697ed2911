//! Subjects (patients) and the lookup index built from the subject export pass

use serde_json::Value;
use std::collections::HashMap;

/// An exported subject resource with the fields the report needs
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    /// Resource id, shown as the MRN in the report
    pub id: String,

    /// `name[0].text`
    pub display_name: Option<String>,

    /// The raw resource as exported
    pub resource: Value,
}

impl Subject {
    /// Builds a subject from a raw resource; `None` when the resource has no id
    pub fn from_resource(resource: Value) -> Option<Self> {
        let id = match resource.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return None,
        };
        let display_name = resource
            .pointer("/name/0/text")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            id,
            display_name,
            resource,
        })
    }
}

/// Lookup table from reference key (`<SubjectType>/<id>`) to subject
///
/// Filled during the subject pass and only read during the measurement pass.
/// A repeated id replaces the earlier entry.
///
/// # Examples
///
/// ```
/// use labwatch::domain::SubjectIndex;
/// use serde_json::json;
///
/// let mut index = SubjectIndex::new("Patient");
/// index.insert(json!({"id": "1", "name": [{"text": "Jane Doe"}]}));
///
/// let subject = index.get("Patient/1").unwrap();
/// assert_eq!(subject.display_name.as_deref(), Some("Jane Doe"));
/// ```
#[derive(Debug, Clone)]
pub struct SubjectIndex {
    subject_type: String,
    subjects: HashMap<String, Subject>,
}

impl SubjectIndex {
    pub fn new(subject_type: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subjects: HashMap::new(),
        }
    }

    /// Indexes a raw subject resource
    ///
    /// Returns the reference key, or `None` if the resource had no id and was
    /// not indexed.
    pub fn insert(&mut self, resource: Value) -> Option<String> {
        let subject = Subject::from_resource(resource)?;
        let key = self.reference_key(&subject.id);
        self.subjects.insert(key.clone(), subject);
        Some(key)
    }

    /// Resolves a reference such as `Patient/123`
    pub fn get(&self, reference: &str) -> Option<&Subject> {
        self.subjects.get(reference)
    }

    pub fn reference_key(&self, id: &str) -> String {
        format!("{}/{}", self.subject_type, id)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
