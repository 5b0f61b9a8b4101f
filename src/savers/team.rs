//! Step 3: authors and advisors.
//!
//! Exactly one author is sent as `LIDER`. When the designated leader is not
//! among the resolved authors, the first resolved author (in the order the
//! user entered them) leads the team.

use tracing::{debug, warn};

use super::{SaveContext, SavePolicy, SkipReason, Step, StepFailure, StepReport, StepResult};
use crate::draft::{Draft, normalize_email};
use crate::remote::{DraftId, ResolvedIdentities, TeamMember, TeamRole, UserIdentity};

pub async fn save(ctx: SaveContext<'_>, identity: &DraftId, draft: &Draft) -> StepResult {
    let lenient = ctx.policy == SavePolicy::SkipIncomplete;
    if lenient && draft.team.is_empty() {
        debug!(id = %identity, "no team members, skipping step 3");
        return Ok(StepReport::skipped(Step::Team, identity, SkipReason::TeamEmpty));
    }

    let fetched;
    let resolved = match ctx.resolved {
        Some(resolved) => resolved,
        None => {
            fetched = ctx
                .client
                .resolve_identities(&draft.team.all_emails())
                .await
                .map_err(|f| StepFailure::new(Step::Team, f))?;
            &fetched
        }
    };

    if !resolved.unresolved.is_empty() {
        warn!(
            id = %identity,
            unresolved = ?resolved.unresolved,
            "some team addresses did not resolve, sending the rest"
        );
    }

    let designated = draft.designated_leader(ctx.current_user_email);
    let authors = build_authors(&draft.team.authors, resolved, designated.as_deref());
    let advisor_ids = ordered_ids(&draft.team.advisors, &resolved.advisors);

    if lenient && authors.is_empty() && advisor_ids.is_empty() {
        return Ok(StepReport::skipped(
            Step::Team,
            identity,
            SkipReason::NoResolvedMembers,
        ));
    }

    ctx.client
        .patch_team(identity, &authors, &advisor_ids)
        .await
        .map_err(|f| StepFailure::new(Step::Team, f))?;
    Ok(StepReport::saved(Step::Team, identity))
}

/// Resolved authors in entry order, with exactly one leader.
pub fn build_authors(
    entered: &[String],
    resolved: &ResolvedIdentities,
    designated_leader: Option<&str>,
) -> Vec<TeamMember> {
    let ordered = ordered(entered, &resolved.authors);
    let found = designated_leader
        .and_then(|leader| ordered.iter().position(|u| normalize_email(&u.email) == leader));
    if found.is_none() && designated_leader.is_some() && !ordered.is_empty() {
        debug!(leader = %ordered[0].email, "designated leader not among authors, first author leads");
    }
    let leader_index = found.unwrap_or(0);

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, user)| TeamMember {
            user_id: user.id.clone(),
            email: normalize_email(&user.email),
            role: if i == leader_index {
                TeamRole::Leader
            } else {
                TeamRole::Author
            },
        })
        .collect()
}

fn ordered<'a>(entered: &[String], users: &'a [UserIdentity]) -> Vec<&'a UserIdentity> {
    let mut out: Vec<&UserIdentity> = Vec::new();
    for email in entered {
        let email = normalize_email(email);
        if let Some(user) = users.iter().find(|u| normalize_email(&u.email) == email)
            && !out.iter().any(|u| u.id == user.id)
        {
            out.push(user);
        }
    }
    out
}

fn ordered_ids(entered: &[String], users: &[UserIdentity]) -> Vec<String> {
    ordered(entered, users).into_iter().map(|u| u.id.clone()).collect()
}
