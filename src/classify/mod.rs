//! Error classifier for remote failures.
//!
//! Turns a `(status, message)` pair into one of a small set of categories,
//! each with user-facing text and a recommended action. Rules are evaluated
//! in a fixed order and the first match wins:
//!
//! | # | Condition                                      | Category             | Action          |
//! |---|------------------------------------------------|----------------------|-----------------|
//! | 1 | 409, or "title already exists"                 | `DuplicateTitle`     | navigate step 1 |
//! | 2 | 404, or "resource not found"                   | `NotFound`           | close           |
//! | 3 | 403 (wrong account type / not a team member)   | `Forbidden`          | close           |
//! | 4 | 400 + "exactly one leader"                     | `LeaderUndefined`    | navigate step 3 |
//! | 5 | 400 + "members not found: <list>"              | `InvalidTeam`        | navigate step 3 |
//! | 6 | 400 + "terms not accepted"                     | `TermsNotAccepted`   | close           |
//! | 7 | 400, anything else                             | `Validation`         | close           |
//! | 8 | no status                                      | `Network`            | retry           |
//! | 9 | status >= 500                                  | `Server`             | retry           |
//! | - | anything else                                  | `Unknown`            | close           |
//!
//! Message patterns are matched case-insensitively, in the remote side's
//! Portuguese wording as well as in English.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::errors::{FailureBody, RemoteFailure};
use crate::savers::Step;

const DUPLICATE_TITLE_PATTERNS: &[&str] = &[
    "já existe um projeto com este título",
    "ja existe um projeto com este titulo",
    "título já existe",
    "title already exists",
];

const NOT_FOUND_PATTERNS: &[&str] = &[
    "resource not found",
    "recurso não encontrado",
    "projeto não encontrado",
    "project not found",
];

const WRONG_ACCOUNT_PATTERNS: &[&str] = &[
    "tipo de conta",
    "account type",
    "apenas alunos",
    "only students",
];

const TERMS_PATTERNS: &[&str] = &[
    "terms not accepted",
    "termos não aceitos",
    "termos nao aceitos",
    "aceitar os termos",
    "aceite os termos",
];

static LEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"exatamente\s+(?:1|um)\s+l[íi]der|exactly\s+(?:1|one)\s+leader")
        .expect("leader pattern is valid")
});

static MEMBERS_NOT_FOUND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:membros\s+n[ãa]o\s+encontrados|members\s+not\s+found)\s*:\s*(.*)")
        .expect("members pattern is valid")
});

/// Failure categories. `Unknown` is the unclassified fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DuplicateTitle,
    NotFound,
    Forbidden,
    LeaderUndefined,
    InvalidTeam,
    TermsNotAccepted,
    Validation,
    Network,
    Server,
    Unknown,
}

impl ErrorCategory {
    /// Data problems the user can fix by editing the draft.
    pub fn is_data_problem(&self) -> bool {
        matches!(
            self,
            ErrorCategory::DuplicateTitle
                | ErrorCategory::Validation
                | ErrorCategory::InvalidTeam
                | ErrorCategory::LeaderUndefined
                | ErrorCategory::TermsNotAccepted
        )
    }

    /// Problems that may go away on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Server)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::DuplicateTitle => "duplicate title",
            ErrorCategory::NotFound => "not found",
            ErrorCategory::Forbidden => "forbidden",
            ErrorCategory::LeaderUndefined => "leader undefined",
            ErrorCategory::InvalidTeam => "invalid team",
            ErrorCategory::TermsNotAccepted => "terms not accepted",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network error",
            ErrorCategory::Server => "server error",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// What the UI should offer the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Close,
    Retry,
    Navigate,
}

/// Structured, user-facing description of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub title: String,
    pub subtitle: String,
    pub message: String,
    #[serde(default)]
    pub details: Vec<String>,
    pub action: RecommendedAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_step: Option<Step>,
}

impl Classification {
    fn new(
        category: ErrorCategory,
        title: &str,
        subtitle: &str,
        message: &str,
        action: RecommendedAction,
    ) -> Self {
        Self {
            category,
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            message: message.to_string(),
            details: Vec::new(),
            action,
            target_step: None,
        }
    }

    fn navigate_to(mut self, step: Step) -> Self {
        self.action = RecommendedAction::Navigate;
        self.target_step = Some(step);
        self
    }

    fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn duplicate_title() -> Self {
        Self::new(
            ErrorCategory::DuplicateTitle,
            "Título duplicado",
            "Já existe um projeto com este título",
            "Escolha outro título para o projeto e tente novamente.",
            RecommendedAction::Navigate,
        )
        .navigate_to(Step::Base)
    }

    pub fn not_found() -> Self {
        Self::new(
            ErrorCategory::NotFound,
            "Projeto não encontrado",
            "O rascunho não existe mais",
            "O projeto pode ter sido removido. Feche o assistente e comece novamente.",
            RecommendedAction::Close,
        )
    }

    pub fn wrong_account_type() -> Self {
        Self::new(
            ErrorCategory::Forbidden,
            "Acesso negado",
            "Tipo de conta não permitido",
            "Somente contas de aluno podem cadastrar projetos.",
            RecommendedAction::Close,
        )
    }

    pub fn not_team_member() -> Self {
        Self::new(
            ErrorCategory::Forbidden,
            "Acesso negado",
            "Você não faz parte da equipe",
            "Apenas membros da equipe podem editar este projeto.",
            RecommendedAction::Close,
        )
    }

    pub fn leader_undefined() -> Self {
        Self::new(
            ErrorCategory::LeaderUndefined,
            "Líder não definido",
            "A equipe precisa de exatamente um líder",
            "Volte à etapa de equipe e defina quem lidera o projeto.",
            RecommendedAction::Navigate,
        )
        .navigate_to(Step::Team)
    }

    /// Team members the remote side could not find.
    pub fn invalid_team(unresolved: Vec<String>) -> Self {
        Self::new(
            ErrorCategory::InvalidTeam,
            "Equipe inválida",
            "Alguns membros não foram encontrados",
            "Confira os e-mails informados na etapa de equipe.",
            RecommendedAction::Navigate,
        )
        .navigate_to(Step::Team)
        .with_details(unresolved)
    }

    pub fn terms_not_accepted() -> Self {
        Self::new(
            ErrorCategory::TermsNotAccepted,
            "Termos não aceitos",
            "É preciso aceitar os termos de uso",
            "Aceite os termos antes de publicar o projeto.",
            RecommendedAction::Close,
        )
    }

    /// Per-field validation messages.
    pub fn validation(details: Vec<String>) -> Self {
        Self::new(
            ErrorCategory::Validation,
            "Dados inválidos",
            "Revise os campos do projeto",
            "Alguns campos não atendem aos requisitos.",
            RecommendedAction::Close,
        )
        .with_details(details)
    }

    pub fn network() -> Self {
        Self::new(
            ErrorCategory::Network,
            "Sem conexão",
            "Não foi possível falar com o servidor",
            "Verifique sua conexão e tente novamente. Suas alterações continuam salvas neste dispositivo.",
            RecommendedAction::Retry,
        )
    }

    pub fn server() -> Self {
        Self::new(
            ErrorCategory::Server,
            "Erro no servidor",
            "O servidor não conseguiu concluir a operação",
            "Tente novamente em alguns instantes.",
            RecommendedAction::Retry,
        )
    }

    pub fn unknown(raw: &str) -> Self {
        let details = if raw.trim().is_empty() {
            Vec::new()
        } else {
            vec![raw.trim().to_string()]
        };
        Self::new(
            ErrorCategory::Unknown,
            "Erro inesperado",
            "Algo deu errado",
            "Não foi possível concluir a operação.",
            RecommendedAction::Close,
        )
        .with_details(details)
    }
}

/// Classify a failure by HTTP status and message body.
///
/// `None` and `Some(0)` both mean no response was received.
pub fn classify(status: Option<u16>, body: impl Into<FailureBody>) -> Classification {
    let body = body.into();
    let status = status.filter(|code| *code != 0);
    let message = body.joined().to_lowercase();
    let mentions = |patterns: &[&str]| patterns.iter().any(|p| message.contains(p));

    if status == Some(409) || mentions(DUPLICATE_TITLE_PATTERNS) {
        return Classification::duplicate_title();
    }

    if status == Some(404) || mentions(NOT_FOUND_PATTERNS) {
        return Classification::not_found();
    }

    if status == Some(403) {
        return if mentions(WRONG_ACCOUNT_PATTERNS) {
            Classification::wrong_account_type()
        } else {
            Classification::not_team_member()
        };
    }

    if status == Some(400) {
        if LEADER_REGEX.is_match(&message) {
            return Classification::leader_undefined();
        }
        if let Some(caps) = MEMBERS_NOT_FOUND_REGEX.captures(&message) {
            let list = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            return Classification::invalid_team(split_member_list(list));
        }
        if mentions(TERMS_PATTERNS) {
            return Classification::terms_not_accepted();
        }
        return Classification::validation(validation_details(&body));
    }

    match status {
        None => Classification::network(),
        Some(code) if code >= 500 => Classification::server(),
        Some(_) => Classification::unknown(&body.joined()),
    }
}

/// Classify a normalized remote failure.
pub fn classify_failure(failure: &RemoteFailure) -> Classification {
    classify(failure.status, failure.body.clone())
}

fn split_member_list(list: &str) -> Vec<String> {
    list.split([',', ';', '\n'])
        .map(|item| item.trim().trim_end_matches('.').trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Per-field messages from either a structured list or a delimited string.
fn validation_details(body: &FailureBody) -> Vec<String> {
    let items: Vec<String> = match body {
        FailureBody::List(items) => items.clone(),
        FailureBody::Text(text) => text.split([';', '\n']).map(str::to_string).collect(),
    };
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
