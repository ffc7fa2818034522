//! Deletion mapping records.

use serde::Serialize;

use crate::error::RegistryError;

/// One registry entry: rows of `target_table` whose `target_id` matches the
/// `request_id` of a deletion request in `request_table` get deleted.
///
/// Entries are immutable. New entries are derived from templates with the
/// `with_*` methods, which copy the item and replace a single field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeleteItem {
    request_table: String,
    request_id: String,
    request_date_condition: String,
    target_table: String,
    target_id: String,
    target_date_conditions: Vec<String>,
}

impl DeleteItem {
    /// Build an entry, rejecting an empty list of target date conditions.
    pub fn new<I, S>(
        request_table: impl Into<String>,
        request_id: impl Into<String>,
        request_date_condition: impl Into<String>,
        target_table: impl Into<String>,
        target_id: impl Into<String>,
        target_date_conditions: I,
    ) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let target_table = target_table.into();
        let target_date_conditions =
            Self::checked_conditions(&target_table, target_date_conditions)?;

        Ok(Self {
            request_table: request_table.into(),
            request_id: request_id.into(),
            request_date_condition: request_date_condition.into(),
            target_table,
            target_id: target_id.into(),
            target_date_conditions,
        })
    }

    fn checked_conditions<I, S>(
        target_table: &str,
        conditions: I,
    ) -> Result<Vec<String>, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let conditions: Vec<String> = conditions.into_iter().map(Into::into).collect();
        if conditions.is_empty() {
            return Err(RegistryError::EmptyDateConditions {
                target_table: target_table.to_string(),
            });
        }
        Ok(conditions)
    }

    pub fn request_table(&self) -> &str {
        &self.request_table
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn request_date_condition(&self) -> &str {
        &self.request_date_condition
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Never empty.
    pub fn target_date_conditions(&self) -> &[String] {
        &self.target_date_conditions
    }

    pub fn with_request_table(&self, request_table: impl Into<String>) -> Self {
        Self {
            request_table: request_table.into(),
            ..self.clone()
        }
    }

    pub fn with_request_id(&self, request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..self.clone()
        }
    }

    pub fn with_request_date_condition(&self, condition: impl Into<String>) -> Self {
        Self {
            request_date_condition: condition.into(),
            ..self.clone()
        }
    }

    pub fn with_target_table(&self, target_table: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            ..self.clone()
        }
    }

    pub fn with_target_id(&self, target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            ..self.clone()
        }
    }

    /// Copy with a new condition list; the same non-empty rule as [`DeleteItem::new`] applies.
    pub fn with_target_date_conditions<I, S>(&self, conditions: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let target_date_conditions = Self::checked_conditions(&self.target_table, conditions)?;
        Ok(Self {
            target_date_conditions,
            ..self.clone()
        })
    }
}
