//! Reviewer selection rules. Pure functions over a team snapshot.
//!
//! Randomness comes from the caller so tests can seed it.

use super::entities::{MAX_REVIEWERS, Team, TeamMember, UserId};
use super::errors::DomainError;
use rand::Rng;
use rand::seq::SliceRandom;

/// Outcome of replacing one reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub reviewers: Vec<UserId>,
    pub replaced_by: UserId,
}

fn shuffled_members<R: Rng + ?Sized>(team: &Team, rng: &mut R) -> Vec<TeamMember> {
    let mut members = team.members.clone();
    members.shuffle(rng);
    members
}

/// Pick up to [`MAX_REVIEWERS`] active members of `team`, excluding the author.
///
/// An empty result is valid when nobody is eligible.
pub fn assign_reviewers<R: Rng + ?Sized>(
    author_id: &UserId,
    team: &Team,
    rng: &mut R,
) -> Vec<UserId> {
    let mut picked: Vec<UserId> = Vec::with_capacity(MAX_REVIEWERS);
    for m in shuffled_members(team, rng) {
        if picked.len() == MAX_REVIEWERS {
            break;
        }
        if m.is_active && &m.id != author_id && !picked.contains(&m.id) {
            picked.push(m.id);
        }
    }
    picked
}

/// Replace `old_reviewer_id` in `current` with a fresh eligible member of `team`.
///
/// The caller guarantees the pull request is open and `old_reviewer_id` is assigned.
/// Fails with [`DomainError::NoCandidate`] when the list cannot keep its length.
pub fn reassign_reviewers<R: Rng + ?Sized>(
    author_id: &UserId,
    old_reviewer_id: &UserId,
    current: &[UserId],
    team: &Team,
    rng: &mut R,
) -> Result<Reassignment, DomainError> {
    let mut reviewers: Vec<UserId> = current
        .iter()
        .filter(|id| *id != old_reviewer_id)
        .cloned()
        .collect();

    let candidate = shuffled_members(team, rng).into_iter().find(|m| {
        m.is_active
            && &m.id != author_id
            && &m.id != old_reviewer_id
            && !reviewers.contains(&m.id)
    });

    let Some(candidate) = candidate else {
        return Err(DomainError::NoCandidate);
    };
    reviewers.push(candidate.id.clone());

    if reviewers.len() != current.len() {
        return Err(DomainError::NoCandidate);
    }

    Ok(Reassignment {
        reviewers,
        replaced_by: candidate.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn member(id: &str, active: bool) -> TeamMember {
        TeamMember {
            id: id.into(),
            username: id.to_string(),
            is_active: active,
        }
    }

    fn team(members: Vec<TeamMember>) -> Team {
        Team {
            name: "backend".into(),
            members,
        }
    }

    fn ids(list: &[&str]) -> HashSet<UserId> {
        list.iter().map(|s| UserId::from(*s)).collect()
    }

    #[test]
    fn only_author_yields_no_reviewers() {
        let t = team(vec![member("author", true)]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(assign_reviewers(&"author".into(), &t, &mut rng).is_empty());
    }

    #[test]
    fn skips_inactive_members() {
        let t = team(vec![
            member("author", true),
            member("active", true),
            member("idle1", false),
            member("idle2", false),
        ]);
        let mut rng = StdRng::seed_from_u64(2);
        let got = assign_reviewers(&"author".into(), &t, &mut rng);
        assert_eq!(got, vec![UserId::from("active")]);
    }

    #[test]
    fn selects_all_when_few_eligible() {
        let t = team(vec![
            member("author", true),
            member("r1", true),
            member("r2", true),
            member("r3", false),
        ]);
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let got: HashSet<_> = assign_reviewers(&"author".into(), &t, &mut rng)
                .into_iter()
                .collect();
            assert_eq!(got, ids(&["r1", "r2"]));
        }
    }

    #[test]
    fn assignment_respects_invariants_across_seeds() {
        let t = team(vec![
            member("author", true),
            member("u2", true),
            member("u3", true),
            member("u4", true),
            member("u5", false),
        ]);
        let author = UserId::from("author");
        let mut seen = HashSet::new();
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let got = assign_reviewers(&author, &t, &mut rng);
            assert_eq!(got.len(), MAX_REVIEWERS);
            assert!(!got.contains(&author));
            assert!(!got.contains(&UserId::from("u5")));
            let unique: HashSet<_> = got.iter().cloned().collect();
            assert_eq!(unique.len(), got.len());
            seen.extend(got);
        }
        // every active non-author shows up for some seed
        assert_eq!(seen, ids(&["u2", "u3", "u4"]));
    }

    #[test]
    fn reassign_picks_unassigned_active_member() {
        let t = team(vec![
            member("author", true),
            member("r1", true),
            member("r2", true),
            member("r3", true),
        ]);
        let current = vec![UserId::from("r1"), UserId::from("r2")];
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = reassign_reviewers(&"author".into(), &"r1".into(), &current, &t, &mut rng)
                .unwrap();
            assert_eq!(out.replaced_by, UserId::from("r3"));
            assert_eq!(out.reviewers.len(), current.len());
            assert!(out.reviewers.contains(&UserId::from("r2")));
            assert!(!out.reviewers.contains(&UserId::from("r1")));
        }
    }

    #[test]
    fn reassign_without_candidate_fails() {
        let t = team(vec![member("author", true), member("r1", true)]);
        let mut rng = StdRng::seed_from_u64(3);
        let err = reassign_reviewers(
            &"author".into(),
            &"r1".into(),
            &["r1".into()],
            &t,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NoCandidate));
    }

    #[test]
    fn reassign_ignores_inactive_and_retained() {
        let t = team(vec![
            member("author", true),
            member("r1", true),
            member("r2", true),
            member("idle", false),
        ]);
        let mut rng = StdRng::seed_from_u64(4);
        let err = reassign_reviewers(
            &"author".into(),
            &"r1".into(),
            &["r1".into(), "r2".into()],
            &t,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::NoCandidate));
    }

    #[test]
    fn reassign_with_team_from_other_side() {
        // old reviewer's team does not contain the author
        let t = team(vec![member("r1", true), member("x", true), member("y", false)]);
        let mut rng = StdRng::seed_from_u64(5);
        let out = reassign_reviewers(
            &"author".into(),
            &"r1".into(),
            &["r1".into(), "z".into()],
            &t,
            &mut rng,
        )
        .unwrap();
        assert_eq!(out.replaced_by, UserId::from("x"));
        assert_eq!(out.reviewers.iter().cloned().collect::<HashSet<_>>(), ids(&["z", "x"]));
    }

    #[test]
    fn repeated_member_id_is_picked_once() {
        let t = team(vec![
            member("author", true),
            member("r1", true),
            member("r1", true),
        ]);
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let got = assign_reviewers(&"author".into(), &t, &mut rng);
            assert_eq!(got, vec![UserId::from("r1")], "seed {}", seed);
        }
    }
}
