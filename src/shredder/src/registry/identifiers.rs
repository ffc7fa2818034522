//! Identifier vocabulary: which field names denote a user, and how much to
//! trust each of them.

use regex::Regex;

use crate::error::RegistryError;

pub const CLIENT_ID: &str = "client_id";
pub const GLEAN_CLIENT_ID: &str = "client_info.client_id";
pub const IMPRESSION_ID: &str = "impression_id";
pub const USER_ID: &str = "user_id";
pub const POCKET_ID: &str = "pocket_id";
pub const SHIELD_ID: &str = "shield_id";
pub const ECOSYSTEM_CLIENT_ID: &str = "payload.ecosystem_client_id";
pub const PIONEER_ID: &str = "payload.pioneer_id";
pub const ID: &str = "id";

/// Canonical identifier fields, most trusted first.
pub const ID_PRIORITY: &[&str] = &[
    CLIENT_ID,
    GLEAN_CLIENT_ID,
    IMPRESSION_ID,
    USER_ID,
    POCKET_ID,
    SHIELD_ID,
    ECOSYSTEM_CLIENT_ID,
    PIONEER_ID,
    ID,
];

/// Id kinds that look like identifiers but never identify a user.
///
/// Each entry is a regex matched against the tail of the dotted field name,
/// starting on a segment boundary, so `build_id` also covers
/// `environment.build.build_id`.
pub const DEFAULT_ID_DENYLIST: &[&str] = &[
    "activation_id",
    "addon_id",
    "application_id",
    "batch_id",
    "bucket_id",
    r"((x_)?de)?bug_id",
    "build_id",
    "campaign_id",
    "changeset_id",
    "crash_id",
    "device_id",
    "distribution_id",
    "document_id",
    "error_id",
    "experiment_id",
    "extension_id",
    "encryption_key_id",
    "insert_id",
    "message_id",
    "model_id",
    "network_id",
    "page_id",
    "partner_id",
    "product_id",
    "run_id",
    "setter_id",
    "survey_id",
    "sample_id",
    r"(sub)?session_id",
    r"subsys(tem)?_id",
    "thread_id",
    "vendor_id",
    "id_bucket",
    r"active_experiment\.id",
    r"theme\.id",
    r"tiles\[\]\.id",
    r"spoc_fills\[\]\.id",
    r"devices\[\]\.id",
    // not evaluated yet
    "enrollment_id",
    "flow_id",
    "intent_id",
    "requestee_id",
];

/// Generic identifier shape, tested against the last path segment.
const ID_SHAPE: &str = r"^(?:.*_)?id(?:_.*)?$";

/// Ranks identifier fields by [`ID_PRIORITY`] or a custom order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPriority {
    names: Vec<String>,
}

impl Default for IdPriority {
    fn default() -> Self {
        Self::new(ID_PRIORITY.iter().copied())
    }
}

impl IdPriority {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Sort key for `field`; lower is better and unknown fields rank last.
    pub fn rank(&self, field: &str) -> usize {
        self.names
            .iter()
            .position(|name| name == field)
            .unwrap_or(self.names.len())
    }

    /// Stable sort by rank, so unranked fields keep their discovery order.
    pub fn sort(&self, fields: &mut [String]) {
        fields.sort_by_key(|field| self.rank(field));
    }
}

/// Decides whether a dotted field name looks like a user identifier.
#[derive(Debug, Clone)]
pub struct IdentifierPattern {
    shape: Regex,
    denylist: Option<Regex>,
    patterns: Vec<String>,
}

impl IdentifierPattern {
    /// Build the classifier from a list of denylisted id patterns.
    pub fn new<I, S>(denylist: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = denylist.into_iter().map(Into::into).collect();

        // compile one by one so the error names the offending entry
        for pattern in &patterns {
            Regex::new(pattern).map_err(|source| RegistryError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        let denylist = if patterns.is_empty() {
            None
        } else {
            let alternation = patterns
                .iter()
                .map(|p| format!("(?:{p})"))
                .collect::<Vec<_>>()
                .join("|");
            let combined = format!(r"^(?:.*\.)?(?:{alternation})$");
            Some(
                Regex::new(&combined).map_err(|source| RegistryError::InvalidPattern {
                    pattern: combined.clone(),
                    source,
                })?,
            )
        };

        let shape = Regex::new(ID_SHAPE).map_err(|source| RegistryError::InvalidPattern {
            pattern: ID_SHAPE.to_string(),
            source,
        })?;

        Ok(Self {
            shape,
            denylist,
            patterns,
        })
    }

    /// The built-in denylist.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::new(DEFAULT_ID_DENYLIST.iter().copied())
    }

    pub fn denylist(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_identifier(&self, field: &str) -> bool {
        let leaf = field.rsplit('.').next().unwrap_or(field);
        if !self.shape.is_match(leaf) {
            return false;
        }
        match &self.denylist {
            Some(denylist) => !denylist.is_match(field),
            None => true,
        }
    }
}
