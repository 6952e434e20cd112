//! Per-site destination schemas.

use std::collections::HashMap;

use crate::types::{Field, FieldType, Schema, Site};

/// Column layout of the appointment export table.
const APPOINTMENT_COLUMNS: &[(&str, FieldType)] = &[
    ("AppointmentID", FieldType::Integer),
    ("Accession", FieldType::String),
    ("AppointmentDate", FieldType::Date),
    ("Location", FieldType::String),
    ("PatientMRN", FieldType::String),
    ("PatientLastName", FieldType::String),
    ("PatientFirstName", FieldType::String),
    ("PatientMiddleName", FieldType::String),
    ("Insurance_Plan", FieldType::String),
    ("Insurance_PlanSecondary", FieldType::String),
    ("Insurance_PlanTertiary", FieldType::String),
    ("ReferringPhysicianFirstName", FieldType::String),
    ("ReferringPhysicianLastName", FieldType::String),
    ("Insurance_SubscriberNumber", FieldType::String),
    ("Insurance_SubscriberNumberSecondary", FieldType::String),
    ("Insurance_SubscriberNumberTertiary", FieldType::String),
    ("ExamResultsStatus", FieldType::String),
    ("ExamFinalizedDate", FieldType::Timestamp),
    ("ExamFinalizedDate_hourofday", FieldType::Integer),
    ("CPTCode", FieldType::String),
    ("CPTDescription", FieldType::String),
    ("Exam_ExamCode", FieldType::String),
    ("ExamDescriptionDisplay", FieldType::String),
];

/// The appointment export schema shared by most sites.
pub fn appointment_schema() -> Schema {
    Schema::new(
        APPOINTMENT_COLUMNS
            .iter()
            .map(|(name, ty)| Field::new(*name, ty.clone()))
            .collect(),
    )
}

/// Immutable mapping from [`Site`] to its destination [`Schema`].
///
/// A site with no entry has no destination table yet; its rows are staged unvalidated.
/// That is different from a site whose schema defines zero columns, which is registered
/// explicitly and validates nothing by choice.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<Site, Schema>,
}

impl SchemaRegistry {
    /// A registry with no schemas at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in registry: the appointment schema for every site except
    /// [`Site::DowntownMedical`], which has no destination table.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for site in Site::ALL {
            if site != Site::DowntownMedical {
                registry.insert(site, appointment_schema());
            }
        }
        registry
    }

    /// Register (or replace) a site's schema.
    pub fn insert(&mut self, site: Site, schema: Schema) {
        self.schemas.insert(site, schema);
    }

    /// Builder-style [`Self::insert`].
    pub fn with_schema(mut self, site: Site, schema: Schema) -> Self {
        self.insert(site, schema);
        self
    }

    /// The schema for `site`, or `None` if no validation is required.
    pub fn schema_for(&self, site: Site) -> Option<&Schema> {
        self.schemas.get(&site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_leaves_downtown_unvalidated() {
        let registry = SchemaRegistry::builtin();
        assert!(registry.schema_for(Site::DowntownMedical).is_none());

        let north = registry.schema_for(Site::NorthCampus).unwrap();
        assert_eq!(north.len(), 23);
        assert_eq!(north.fields[0], Field::new("AppointmentID", FieldType::Integer));
        assert_eq!(north.fields[1].name, "Accession");
        assert_eq!(north.index_of("ExamFinalizedDate"), Some(17));
    }

    #[test]
    fn empty_schema_is_distinct_from_absent_schema() {
        let registry = SchemaRegistry::empty().with_schema(Site::SouthCampus, Schema::default());
        assert_eq!(registry.schema_for(Site::SouthCampus), Some(&Schema::default()));
        assert!(registry.schema_for(Site::NorthCampus).is_none());
    }
}
