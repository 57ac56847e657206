use data_transfer::error::{ids, Error, ErrorMapper};
use data_transfer::fields::{FieldMap, FTS_FIELDS, TRANSFER_FIELDS};
use data_transfer::parsers::Identifier;
use proptest::prelude::*;

/// Field translation properties
mod field_translation_props {
    use super::*;

    proptest! {
        #[test]
        fn test_generic_fields_always_translate(index in 0..TRANSFER_FIELDS.len()) {
            let field = TRANSFER_FIELDS[index];
            let translated = FTS_FIELDS.translate(field);
            prop_assert!(translated.is_some(), "{} has no FTS name", field);
            prop_assert_eq!(translated, FTS_FIELDS.translate(field));
        }

        #[test]
        fn test_unknown_fields_are_unsupported(field in "[a-z][A-Za-z_]{0,24}") {
            prop_assume!(!TRANSFER_FIELDS.contains(&field.as_str()));
            prop_assert_eq!(FTS_FIELDS.translate(&field), None);
        }

        #[test]
        fn test_translation_is_injective(a in 0..TRANSFER_FIELDS.len(), b in 0..TRANSFER_FIELDS.len()) {
            prop_assume!(a != b);
            prop_assert_ne!(
                FTS_FIELDS.translate(TRANSFER_FIELDS[a]),
                FTS_FIELDS.translate(TRANSFER_FIELDS[b])
            );
        }
    }

    #[test]
    fn test_narrow_map_is_total_over_generic_set() {
        let narrow = FieldMap::new("narrow", &["priority", "reason"], &[("jobId", "id")]);
        for field in TRANSFER_FIELDS {
            let expected = matches!(*field, "priority" | "reason" | "jobId");
            assert_eq!(narrow.supports(field), expected, "{field}");
        }
    }
}

/// Error mapping properties
mod error_mapping_props {
    use super::*;
    use reqwest::StatusCode;

    proptest! {
        #[test]
        fn test_mapped_id_is_never_empty(code in 400u16..600, message in proptest::option::of("[ -~]{0,40}")) {
            let status = StatusCode::from_u16(code).unwrap();
            let mapped = ErrorMapper::map(Error::http(status, message), &[]);
            prop_assert!(!mapped.id.is_empty());
            prop_assert_eq!(mapped.status, status);
        }

        #[test]
        fn test_context_never_overrides_details(value in "[a-z0-9]{1,12}", context in "[a-z0-9]{1,12}") {
            let err = Error::canonical(ids::FIELD_NOT_SUPPORTED, "unsupported")
                .with_detail("fieldName", value.as_str());
            let mapped = ErrorMapper::map(err, &[("fieldName", context.as_str())]);
            prop_assert_eq!(mapped.detail("fieldName"), Some(value.as_str()));
        }

        #[test]
        fn test_timeouts_carry_operation(operation in "[a-z][A-Za-z]{2,20}") {
            let err = Error::Timeout {
                operation: operation.clone(),
                timeout: std::time::Duration::from_millis(10),
            };
            let mapped = ErrorMapper::map(err, &[]);
            prop_assert_eq!(mapped.id, format!("{operation}Timeout"));
            prop_assert_eq!(mapped.status.as_u16(), 504);
        }
    }
}

/// Identifier parsing properties
mod identifier_props {
    use super::*;

    proptest! {
        #[test]
        fn test_prefixed_dois_normalize(registrant in "[0-9]{4,9}", suffix in "[A-Za-z0-9._-]{1,30}") {
            let bare = format!("10.{registrant}/{suffix}");
            for raw in [
                bare.clone(),
                format!("doi:{bare}"),
                format!("https://doi.org/{bare}"),
                format!("http://dx.doi.org/{bare}"),
            ] {
                let parsed = Identifier::parse(&raw).unwrap();
                prop_assert_eq!(parsed.doi(), Some(bare.as_str()));
            }
        }

        #[test]
        fn test_whitespace_only_is_invalid(raw in "[ \t]{0,8}") {
            let err = Identifier::parse(&raw).unwrap_err();
            prop_assert_eq!(err.id(), ids::DOI_INVALID);
        }
    }
}
