use super::Dataset;
use crate::error::Result;
use crate::fingerprint::{content_hash, identity_key};
use crate::normalize::{fold_row, map_country_or_blank, pick_field_or_default};
use crate::table::{CanonicalRecord, RawTable};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DATASET_NAME: &str = "non_compliant";
pub const URL_ENV: &str = "NON_COMPLIANT_CSV_URL";

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/[^/]*Non[^/]*compliant[^/]*\.csv$").unwrap());

// This register has been published under several column spellings; each field
// resolves through an ordered candidate list instead of a fixed name.
const AUTHORITY_CANDIDATES: &[&str] = &[
    "ae_competent_authority",
    "ae_competentauthority",
    "competent_authority",
];
const STATE_CANDIDATES: &[&str] = &[
    "ae_home_member_state",
    "ae_homememberstate",
    "member_state",
];
const ENTITY_CANDIDATES: &[&str] = &["ae_lei_name", "commercial_name"];
const WEBSITE_CANDIDATES: &[&str] = &["ae_website", "website"];

const BUSINESS_FIELDS: &[&str] = &[
    "ae_competent_authority",
    "ae_home_member_state",
    "ae_lei_name",
    "ae_website",
    "is_new_flag",
];

const EXPORT_COLUMNS: &[(&str, &str)] = &[
    ("pk", "pk"),
    ("ae_competent_authority", "competent_authority"),
    ("ae_home_member_state", "home_member_state"),
    ("ae_lei_name", "lei_name"),
    ("ae_website", "website"),
    ("is_new_flag", "is_new"),
];

/// The register of entities flagged as non-compliant under MiCA.
pub struct NonCompliantDataset;

impl Dataset for NonCompliantDataset {
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
        let mut records = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let mut fields = fold_row(&table.columns, row);

            let authority = pick_field_or_default(&fields, AUTHORITY_CANDIDATES)
                .trim()
                .to_string();
            let state = map_country_or_blank(&pick_field_or_default(&fields, STATE_CANDIDATES));
            let entity = pick_field_or_default(&fields, ENTITY_CANDIDATES)
                .trim()
                .to_string();
            let website = pick_field_or_default(&fields, WEBSITE_CANDIDATES)
                .trim()
                .to_string();
            // the unlabeled first column marks entries added in the latest update
            let is_new = fields
                .get("column_1")
                .map(|v| v.trim().eq_ignore_ascii_case("new"))
                .unwrap_or(false);

            // rows without an entity name carry no identity; dropped, not errored
            if entity.is_empty() {
                continue;
            }

            fields.insert("ae_competent_authority".to_string(), authority.clone());
            fields.insert("ae_home_member_state".to_string(), state.clone());
            fields.insert("ae_lei_name".to_string(), entity.clone());
            fields.insert("ae_website".to_string(), website);
            fields.insert("is_new_flag".to_string(), is_new.to_string());

            let mut record = CanonicalRecord {
                pk: identity_key(&state, &authority, &entity),
                hash: String::new(),
                fields,
            };
            record.hash = content_hash(&record, BUSINESS_FIELDS);
            records.push(record);
        }
        Ok(records)
    }

    fn export_columns(&self, _table: &RawTable) -> Vec<(&'static str, &'static str)> {
        EXPORT_COLUMNS.to_vec()
    }
}
