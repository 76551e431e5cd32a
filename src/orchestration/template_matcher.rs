//! # Template Matcher
//!
//! Routes a filename to exactly one of its partner's active templates.
//!
//! Every template falls into one of three buckets by identifier type. Within a
//! bucket a single best candidate is kept:
//!
//! - **prefix / suffix**: the one with the longest identifier value
//! - **unspecified**: the most recently updated
//!
//! The prefix winner is chosen over the suffix winner, which is chosen over the
//! unspecified winner. An unspecified template matches any filename, so a
//! partner with one acts as its own default route.
//!
//! Ties keep the first candidate seen. Templates arrive ordered by id from the
//! store, which makes the choice a pure function of the template set.

use std::sync::Arc;
use tracing::debug;

use super::errors::MatchError;
use crate::database::FileStore;
use crate::models::{FileIdentifierType, Template};

/// Pick the template for `filename` from a partner's active templates
pub fn select_template<'a>(filename: &str, templates: &'a [Template]) -> Option<&'a Template> {
    let mut prefix: Option<&Template> = None;
    let mut suffix: Option<&Template> = None;
    let mut unspecified: Option<&Template> = None;

    for template in templates {
        if !template.file_identifier.matches(filename) {
            continue;
        }

        match template.file_identifier.identifier_type {
            FileIdentifierType::Prefix => keep_more_specific(&mut prefix, template),
            FileIdentifierType::Suffix => keep_more_specific(&mut suffix, template),
            FileIdentifierType::Unspecified => {
                let newer = unspecified.map_or(true, |best| template.updated_at > best.updated_at);
                if newer {
                    unspecified = Some(template);
                }
            }
        }
    }

    prefix.or(suffix).or(unspecified)
}

// Specificity is the raw identifier length, not the length of the matched span
fn keep_more_specific<'a>(best: &mut Option<&'a Template>, candidate: &'a Template) {
    let longer = best.map_or(true, |current| {
        candidate.file_identifier.value.len() > current.file_identifier.value.len()
    });
    if longer {
        *best = Some(candidate);
    }
}

/// Loads a partner's active templates and applies [`select_template`]
#[derive(Clone)]
pub struct TemplateMatcher {
    store: Arc<dyn FileStore>,
}

impl TemplateMatcher {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }

    pub async fn match_file(
        &self,
        filename: &str,
        partner_folder_id: i64,
    ) -> Result<Template, MatchError> {
        let templates = self
            .store
            .active_templates_for_folder(partner_folder_id)
            .await?;

        let template = select_template(filename, &templates).ok_or_else(|| {
            MatchError::TemplateNotFound {
                filename: filename.to_string(),
                partner_folder_id,
            }
        })?;

        debug!(
            filename = %filename,
            template_id = template.template_id,
            identifier_type = %template.file_identifier.identifier_type,
            candidates = templates.len(),
            "Template matched"
        );
        Ok(template.clone())
    }
}
