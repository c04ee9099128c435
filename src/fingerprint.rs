use crate::table::CanonicalRecord;
use sha2::{Digest, Sha256};

/// Derive the stable identity key for one register entry:
/// `JURISDICTION|authority|entity`. Case differences in the source never
/// produce distinct keys.
pub fn identity_key(member_state: &str, authority: &str, entity: &str) -> String {
    format!(
        "{}|{}|{}",
        member_state.to_uppercase(),
        authority.to_lowercase(),
        entity.to_lowercase()
    )
}

/// SHA-256 over the ordered business-column values of a record. Columns
/// outside `business_columns` never influence the digest, so cosmetic and
/// `raw_` shadow fields cannot trigger change detection.
pub fn content_hash(record: &CanonicalRecord, business_columns: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for column in business_columns {
        hasher.update(record.get(column).as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> CanonicalRecord {
        let mut record = CanonicalRecord::default();
        for (field, value) in pairs {
            record.set(field, *value);
        }
        record
    }

    #[test]
    fn key_derivation_is_case_insensitive() {
        let a = identity_key("Germany", "BaFin", "AlphaCo");
        let b = identity_key("GERMANY", "bafin", "ALPHACO");
        assert_eq!(a, b);
        assert_eq!(a, "GERMANY|bafin|alphaco");
    }

    #[test]
    fn hash_is_reproducible_byte_for_byte() {
        let r = record(&[("ae_website", "https://a.example"), ("ae_lei_name", "AlphaCo")]);
        let columns = ["ae_lei_name", "ae_website"];
        assert_eq!(content_hash(&r, &columns), content_hash(&r, &columns));
    }

    #[test]
    fn non_business_fields_do_not_affect_the_hash() {
        let columns = ["ae_lei_name", "ae_website"];
        let a = record(&[
            ("ae_lei_name", "AlphaCo"),
            ("ae_website", "https://a.example"),
            ("raw_ae_website", "https://a.example "),
        ]);
        let b = record(&[
            ("ae_lei_name", "AlphaCo"),
            ("ae_website", "https://a.example"),
            ("raw_ae_website", "completely different"),
            ("cosmetic_note", "ignored"),
        ]);
        assert_eq!(content_hash(&a, &columns), content_hash(&b, &columns));
    }

    #[test]
    fn business_field_change_changes_the_hash() {
        let columns = ["ae_lei_name", "ae_website"];
        let a = record(&[("ae_lei_name", "AlphaCo"), ("ae_website", "https://old.example")]);
        let b = record(&[("ae_lei_name", "AlphaCo"), ("ae_website", "https://new.example")]);
        assert_ne!(content_hash(&a, &columns), content_hash(&b, &columns));
    }

    #[test]
    fn absent_columns_hash_as_empty() {
        let columns = ["ae_lei_name", "ae_website"];
        let sparse = record(&[("ae_lei_name", "AlphaCo")]);
        let explicit = record(&[("ae_lei_name", "AlphaCo"), ("ae_website", "")]);
        assert_eq!(content_hash(&sparse, &columns), content_hash(&explicit, &columns));
    }
}
