use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use ingest_core::models::{FileIdentifier, Template};

/// Strategy for lowercase filename stems
pub fn stem_strategy() -> impl Strategy<Value = String> {
    "[a-z_]{1,12}"
}

/// Strategy for filenames with a routable extension
pub fn filename_strategy() -> impl Strategy<Value = String> {
    (stem_strategy(), prop_oneof![Just("csv"), Just("txt"), Just("xlsx")])
        .prop_map(|(stem, extension)| format!("{stem}.{extension}"))
}

/// Strategy for any of the three identifier kinds
pub fn identifier_strategy() -> impl Strategy<Value = FileIdentifier> {
    prop_oneof![
        "[a-z_]{1,6}".prop_map(FileIdentifier::prefix),
        "[a-z_]{1,6}".prop_map(FileIdentifier::suffix),
        Just(FileIdentifier::unspecified()),
    ]
}

/// Strategy for a partner's template set, ids ascending as the store returns them
pub fn template_set_strategy() -> impl Strategy<Value = Vec<Template>> {
    prop::collection::vec((identifier_strategy(), 0i64..30), 0..8).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (file_identifier, age_days))| Template {
                template_id: i as i64 + 1,
                name: format!("template-{i}"),
                file_identifier,
                partner_folder_id: 1,
                channel_id: 100 + i as i64,
                market_id: 1,
                column_mapping: serde_json::json!({}),
                is_active: true,
                updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
                    - Duration::days(age_days),
            })
            .collect()
    })
}
