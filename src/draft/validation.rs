//! Validation gates applied before any remote write.
//!
//! Three levels, each a superset of the previous one:
//! - `minimum_validity`: the silent auto-save gate
//! - `explicit_save_violations`: the explicit "save draft" pass
//! - `publish_violations`: everything publishing needs

use serde::{Deserialize, Serialize};

use super::{Draft, is_filled};

/// Length limits for the base resource fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Minimum title length in characters, after trimming.
    pub min_title_len: usize,
    /// Minimum description length in characters, after trimming.
    pub min_description_len: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_title_len: 10,
            min_description_len: 50,
        }
    }
}

fn char_len(value: &str) -> usize {
    value.trim().chars().count()
}

/// Whether the draft may be auto-saved at all.
///
/// Requires a non-empty title and description that meet the minimum
/// lengths, and a chosen category.
pub fn minimum_validity(draft: &Draft, rules: &ValidationRules) -> bool {
    base_violations(draft, rules).is_empty()
}

fn base_violations(draft: &Draft, rules: &ValidationRules) -> Vec<String> {
    let mut violations = Vec::new();

    let title_len = char_len(&draft.title);
    if title_len == 0 {
        violations.push("O título é obrigatório".to_string());
    } else if title_len < rules.min_title_len {
        violations.push(format!(
            "O título deve ter pelo menos {} caracteres",
            rules.min_title_len
        ));
    }

    let description_len = char_len(&draft.summary);
    if description_len == 0 {
        violations.push("A descrição é obrigatória".to_string());
    } else if description_len < rules.min_description_len {
        violations.push(format!(
            "A descrição deve ter pelo menos {} caracteres",
            rules.min_description_len
        ));
    }

    if !is_filled(&draft.category) {
        violations.push("Selecione uma categoria".to_string());
    }

    violations
}

/// Per-field messages blocking an explicit save. Empty means the save may proceed.
pub fn explicit_save_violations(draft: &Draft, rules: &ValidationRules) -> Vec<String> {
    base_violations(draft, rules)
}

/// Per-field messages blocking publication, in wizard order.
///
/// Team membership problems (unresolved addresses) and terms acceptance are
/// reported separately by the engine so they map onto their own categories.
pub fn publish_violations(draft: &Draft, rules: &ValidationRules) -> Vec<String> {
    let mut violations = base_violations(draft, rules);

    if !is_filled(&draft.academic.course) {
        violations.push("Informe o curso".to_string());
    }
    if !is_filled(&draft.academic.class_group) {
        violations.push("Informe a turma".to_string());
    }
    if !is_filled(&draft.academic.modality) {
        violations.push("Informe a modalidade".to_string());
    }
    if draft.repository.has_repository && !is_filled(&draft.repository.repository_url) {
        violations.push("Informe o link do repositório".to_string());
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_draft() -> Draft {
        Draft {
            title: "My Project".into(),
            summary: "x".repeat(60),
            category: Some("educacao".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimum_validity_accepts_long_enough_fields() {
        assert!(minimum_validity(&valid_draft(), &ValidationRules::default()));
    }

    #[test]
    fn test_minimum_validity_rejects_short_title() {
        let draft = Draft {
            title: "Short".into(),
            ..valid_draft()
        };
        assert!(!minimum_validity(&draft, &ValidationRules::default()));
    }

    #[test]
    fn test_minimum_validity_requires_category() {
        let draft = Draft {
            category: None,
            ..valid_draft()
        };
        assert!(!minimum_validity(&draft, &ValidationRules::default()));
    }

    #[test]
    fn test_lengths_count_characters_not_bytes() {
        let rules = ValidationRules {
            min_title_len: 5,
            min_description_len: 5,
        };
        let draft = Draft {
            title: "ação!".into(),
            summary: "ções!".into(),
            ..valid_draft()
        };
        assert!(minimum_validity(&draft, &rules));
    }

    #[test]
    fn test_whitespace_only_title_is_empty() {
        let draft = Draft {
            title: "    ".into(),
            ..valid_draft()
        };
        let violations = explicit_save_violations(&draft, &ValidationRules::default());
        assert_eq!(violations, vec!["O título é obrigatório".to_string()]);
    }

    #[test]
    fn test_explicit_save_reports_every_field() {
        let violations = explicit_save_violations(&Draft::default(), &ValidationRules::default());
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn test_publish_requires_academic_fields() {
        let violations = publish_violations(&valid_draft(), &ValidationRules::default());
        assert_eq!(violations.len(), 3);
        assert!(violations[0].contains("curso"));
    }

    #[test]
    fn test_publish_requires_repository_url_when_enabled() {
        let mut draft = valid_draft();
        draft.academic.course = Some("ADS".into());
        draft.academic.class_group = Some("T1".into());
        draft.academic.modality = Some("presencial".into());
        assert!(publish_violations(&draft, &ValidationRules::default()).is_empty());

        draft.repository.has_repository = true;
        let violations = publish_violations(&draft, &ValidationRules::default());
        assert_eq!(violations, vec!["Informe o link do repositório".to_string()]);
    }
}
