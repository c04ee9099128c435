use super::Dataset;
use crate::error::{PipelineError, Result};
use crate::fingerprint::{content_hash, identity_key};
use crate::normalize::{
    expand_service_codes, fold_row, map_country, parse_date_field, to_snake_case,
};
use crate::table::{CanonicalRecord, RawTable};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

pub const DATASET_NAME: &str = "casps";
pub const URL_ENV: &str = "CASP_CSV_URL";

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/(CASP|CASPS)[^/]*\.csv$").unwrap());

/// Columns the CASP register must carry; any of them missing is schema drift
/// severe enough to abort the run.
const REQUIRED_FIELDS: &[&str] = &[
    "ae_competent_authority",
    "ae_home_member_state",
    "ae_lei_name",
    "ae_website",
    "ac_service_code",
];

/// Date columns, parsed when the register carries them.
const DATE_FIELDS: &[&str] = &[
    "ac_authorisation_notification_date",
    "ac_authorisation_end_date",
    "ac_lastupdate",
];

/// Fields that determine the content hash, in hashing order. Date fields are
/// appended when present in the source.
const BASE_BUSINESS_FIELDS: &[&str] = &[
    "ae_competent_authority",
    "ae_home_member_state",
    "ae_lei_name",
    "ae_website",
    "ac_service_code_short",
];

const BASE_EXPORT_COLUMNS: &[(&str, &str)] = &[
    ("pk", "pk"),
    ("ae_competent_authority", "competent_authority"),
    ("ae_home_member_state", "home_member_state"),
    ("ae_lei_name", "lei_name"),
    ("ae_website", "website"),
    ("ac_service_code_short", "service_codes"),
];

/// Public headers for the optional date columns, exported only when the
/// source carries them.
const DATE_EXPORT_COLUMNS: &[(&str, &str)] = &[
    ("ac_authorisation_notification_date", "authorisation_notification_date"),
    ("ac_authorisation_end_date", "authorisation_end_date"),
    ("ac_lastupdate", "last_update"),
];

/// The interim register of authorised crypto-asset service providers.
pub struct CaspDataset;

impl Dataset for CaspDataset {
    fn name(&self) -> &'static str {
        DATASET_NAME
    }

    fn url_env(&self) -> &'static str {
        URL_ENV
    }

    fn link_pattern(&self) -> &'static Regex {
        &LINK_PATTERN
    }

    fn normalize(&self, table: &RawTable) -> Result<Vec<CanonicalRecord>> {
        let present: BTreeSet<String> = table.columns.iter().map(|c| to_snake_case(c)).collect();
        for required in REQUIRED_FIELDS {
            if !present.contains(*required) {
                return Err(PipelineError::MissingColumn(vec![(*required).to_string()]));
            }
        }
        let date_fields: Vec<&str> = DATE_FIELDS
            .iter()
            .copied()
            .filter(|field| present.contains(*field))
            .collect();
        let business_fields: Vec<&str> = BASE_BUSINESS_FIELDS
            .iter()
            .copied()
            .chain(date_fields.iter().copied())
            .collect();

        let mut records = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let mut fields = fold_row(&table.columns, row);

            let authority = fields
                .get("ae_competent_authority")
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            let state = map_country(fields.get("ae_home_member_state").map(String::as_str).unwrap_or(""));
            let entity = fields
                .get("ae_lei_name")
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            let website = fields
                .get("ae_website")
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            let services =
                expand_service_codes(fields.get("ac_service_code").map(String::as_str).unwrap_or(""));

            fields.insert("ae_competent_authority".to_string(), authority.clone());
            fields.insert("ae_home_member_state".to_string(), state.clone());
            fields.insert("ae_lei_name".to_string(), entity.clone());
            fields.insert("ae_website".to_string(), website);
            fields.insert("ac_service_code_short".to_string(), services);
            for field in &date_fields {
                let parsed = parse_date_field(fields.get(*field).map(String::as_str).unwrap_or(""));
                fields.insert((*field).to_string(), parsed);
            }

            let mut record = CanonicalRecord {
                pk: identity_key(&state, &authority, &entity),
                hash: String::new(),
                fields,
            };
            record.hash = content_hash(&record, &business_fields);
            records.push(record);
        }
        Ok(records)
    }

    fn export_columns(&self, table: &RawTable) -> Vec<(&'static str, &'static str)> {
        let present: BTreeSet<String> = table.columns.iter().map(|c| to_snake_case(c)).collect();
        BASE_EXPORT_COLUMNS
            .iter()
            .copied()
            .chain(
                DATE_EXPORT_COLUMNS
                    .iter()
                    .copied()
                    .filter(|(field, _)| present.contains(*field)),
            )
            .collect()
    }
}
