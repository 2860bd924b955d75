use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use leo_models::{
    CalibrationWeight, FinalScore, Fixture, HeadToHead, MatchResult, PredictionDecision,
    ReviewOutcome, TeamForm, WeightKey,
};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SourceError, StoreError, StoreResult};
use crate::store::{RecordStore, ResultSource, ResultStatus};

/// In-process store for tests and the demo binary mode.
///
/// Also answers as a [`ResultSource`] from scores recorded with
/// [`MemoryStore::set_final_score`].
#[derive(Default)]
pub struct MemoryStore {
    fixtures: DashMap<String, Fixture>,
    team_results: DashMap<String, Vec<MatchResult>>,
    final_scores: DashMap<String, FinalScore>,
    decisions: RwLock<Vec<PredictionDecision>>,
    outcomes: RwLock<Vec<ReviewOutcome>>,
    weights: DashMap<WeightKey, CalibrationWeight>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_fixture(&self, fixture: Fixture) {
        self.fixtures.insert(fixture.fixture_id.clone(), fixture);
    }

    pub fn insert_team_results(&self, team: &str, results: Vec<MatchResult>) {
        self.team_results.entry(team.to_string()).or_default().extend(results);
    }

    pub fn set_final_score(&self, fixture_id: &str, score: FinalScore) {
        self.final_scores.insert(fixture_id.to_string(), score);
    }

    pub fn weight(&self, key: WeightKey) -> Option<CalibrationWeight> {
        self.weights.get(&key).map(|w| *w)
    }

    fn update_decision<F>(&self, id: Uuid, f: F) -> StoreResult<PredictionDecision>
    where
        F: FnOnce(&mut PredictionDecision) -> leo_models::Result<()>,
    {
        let mut decisions = self.decisions.write();
        let decision = decisions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(StoreError::DecisionNotFound(id))?;
        f(decision)?;
        Ok(decision.clone())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fixture(&self, fixture_id: &str) -> StoreResult<Option<Fixture>> {
        Ok(self.fixtures.get(fixture_id).map(|f| f.clone()))
    }

    async fn save_fixture(&self, fixture: &Fixture) -> StoreResult<()> {
        self.insert_fixture(fixture.clone());
        Ok(())
    }

    async fn team_form(&self, team: &str, as_of: DateTime<Utc>) -> StoreResult<TeamForm> {
        let results = self
            .team_results
            .get(team)
            .map(|r| r.clone())
            .unwrap_or_default();
        Ok(TeamForm::new(team, results, as_of))
    }

    async fn head_to_head(
        &self,
        home_team: &str,
        away_team: &str,
        as_of: DateTime<Utc>,
    ) -> StoreResult<HeadToHead> {
        let meetings = self
            .team_results
            .get(home_team)
            .map(|r| r.iter().filter(|m| m.opponent == away_team).cloned().collect())
            .unwrap_or_default();
        Ok(HeadToHead::new(meetings, as_of))
    }

    async fn list_pending(
        &self,
        kicked_off_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<PredictionDecision>> {
        let mut pending: Vec<PredictionDecision> = self
            .decisions
            .read()
            .iter()
            .filter(|d| d.is_awaiting_review() && d.kickoff <= kicked_off_before)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.kickoff.cmp(&a.kickoff));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn decision(&self, id: Uuid) -> StoreResult<Option<PredictionDecision>> {
        Ok(self.decisions.read().iter().find(|d| d.id == id).cloned())
    }

    async fn active_decision(&self, fixture_id: &str) -> StoreResult<Option<PredictionDecision>> {
        Ok(self
            .decisions
            .read()
            .iter()
            .find(|d| d.fixture_id == fixture_id && d.is_active())
            .cloned())
    }

    async fn decisions_for(&self, fixture_id: &str) -> StoreResult<Vec<PredictionDecision>> {
        Ok(self
            .decisions
            .read()
            .iter()
            .filter(|d| d.fixture_id == fixture_id)
            .cloned()
            .collect())
    }

    async fn recent_decisions(&self, limit: usize) -> StoreResult<Vec<PredictionDecision>> {
        Ok(self.decisions.read().iter().rev().take(limit).cloned().collect())
    }

    async fn save_decision(&self, decision: &PredictionDecision) -> StoreResult<()> {
        let mut decisions = self.decisions.write();

        if decision.is_active()
            && decisions
                .iter()
                .any(|d| d.fixture_id == decision.fixture_id && d.is_active() && d.id != decision.id)
        {
            return Err(StoreError::DuplicateDecision {
                fixture_id: decision.fixture_id.clone(),
            });
        }

        match decisions.iter_mut().find(|d| d.id == decision.id) {
            Some(existing) => *existing = decision.clone(),
            None => decisions.push(decision.clone()),
        }
        debug!(decision_id = %decision.id, status = %decision.status, "decision saved");
        Ok(())
    }

    async fn confirm_decision(&self, id: Uuid) -> StoreResult<PredictionDecision> {
        self.update_decision(id, PredictionDecision::confirm)
    }

    async fn mark_reviewed(&self, id: Uuid) -> StoreResult<PredictionDecision> {
        self.update_decision(id, PredictionDecision::mark_reviewed)
    }

    async fn append_review_outcome(&self, outcome: &ReviewOutcome) -> StoreResult<()> {
        let mut outcomes = self.outcomes.write();
        if outcomes.iter().any(|o| o.decision_id == outcome.decision_id) {
            return Err(StoreError::AlreadyReviewed(outcome.decision_id));
        }
        outcomes.push(outcome.clone());
        Ok(())
    }

    async fn review_outcomes(&self, limit: usize) -> StoreResult<Vec<ReviewOutcome>> {
        Ok(self.outcomes.read().iter().rev().take(limit).cloned().collect())
    }

    async fn load_weights(&self) -> StoreResult<Vec<CalibrationWeight>> {
        let mut weights: Vec<CalibrationWeight> = self.weights.iter().map(|w| *w.value()).collect();
        weights.sort_by_key(CalibrationWeight::key);
        Ok(weights)
    }

    async fn save_weight(&self, weight: &CalibrationWeight) -> StoreResult<bool> {
        match self.weights.entry(weight.key()) {
            Entry::Occupied(mut stored) => {
                if stored.get().revision >= weight.revision {
                    debug!(key = %weight.key(), revision = weight.revision, "stale weight write ignored");
                    return Ok(false);
                }
                stored.insert(*weight);
            }
            Entry::Vacant(slot) => {
                slot.insert(*weight);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl ResultSource for MemoryStore {
    async fn actual_result(&self, fixture_id: &str) -> Result<ResultStatus, SourceError> {
        Ok(match self.final_scores.get(fixture_id) {
            Some(score) => ResultStatus::Final(*score),
            None => ResultStatus::NotFinished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use leo_models::{
        DecisionStatus, Ground, MarketId, Pick, ProbabilityQuery, SignalSource, SkipReason,
        WeightEntry,
    };

    fn fixture(id: &str, kickoff: DateTime<Utc>) -> Fixture {
        Fixture::new(
            id.to_string(),
            "La Liga".to_string(),
            "Sevilla".to_string(),
            "Betis".to_string(),
            kickoff,
        )
    }

    fn pending(id: &str, kickoff: DateTime<Utc>) -> PredictionDecision {
        PredictionDecision::new(&fixture(id, kickoff), "v1")
            .with_pick(Pick::for_selection(ProbabilityQuery::HomeWin).unwrap())
    }

    #[tokio::test]
    async fn test_second_active_decision_rejected() {
        let store = MemoryStore::new();
        let first = pending("fx_1", Utc::now());
        store.save_decision(&first).await.unwrap();

        let second = pending("fx_1", Utc::now());
        let err = store.save_decision(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDecision { .. }));

        // skipped decisions never count against the limit
        let skipped = pending("fx_1", Utc::now()).skipped(SkipReason::AlignmentContradiction);
        store.save_decision(&skipped).await.unwrap();
        assert_eq!(store.decisions_for("fx_1").await.unwrap().len(), 2);
        assert_eq!(store.active_decision("fx_1").await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_list_pending_newest_first_and_bounded() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for i in 0..4 {
            let d = pending(&format!("fx_{i}"), now - Duration::hours(10 - i));
            store.save_decision(&d).await.unwrap();
        }
        let future = pending("fx_future", now + Duration::hours(5));
        store.save_decision(&future).await.unwrap();

        let listed = store.list_pending(now, 3).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].fixture_id, "fx_3");
        assert!(listed.iter().all(|d| d.fixture_id != "fx_future"));
    }

    #[tokio::test]
    async fn test_review_transitions() {
        let store = MemoryStore::new();
        let d = pending("fx_1", Utc::now());
        store.save_decision(&d).await.unwrap();

        let confirmed = store.confirm_decision(d.id).await.unwrap();
        assert_eq!(confirmed.status, DecisionStatus::Confirmed);

        let reviewed = store.mark_reviewed(d.id).await.unwrap();
        assert_eq!(reviewed.status, DecisionStatus::Reviewed);

        assert!(store.mark_reviewed(d.id).await.is_err());
        assert!(store.mark_reviewed(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_outcome_appended_once() {
        let store = MemoryStore::new();
        let d = pending("fx_1", Utc::now());
        let outcome = ReviewOutcome::settle(&d, FinalScore::new(2, 1)).unwrap();

        store.append_review_outcome(&outcome).await.unwrap();
        assert!(matches!(
            store.append_review_outcome(&outcome).await,
            Err(StoreError::AlreadyReviewed(_))
        ));
        assert_eq!(store.review_outcomes(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_weight_write_ignored() {
        let store = MemoryStore::new();
        let key = WeightKey::new(SignalSource::RuleBased, MarketId::MatchResult);
        let v1 = WeightEntry::initial().scaled(1.1);
        let v2 = v1.scaled(1.1);

        assert!(store.save_weight(&CalibrationWeight::new(key, v2)).await.unwrap());
        assert!(!store.save_weight(&CalibrationWeight::new(key, v1)).await.unwrap());
        assert_eq!(store.weight(key).unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_form_and_result_source() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.insert_team_results(
            "Sevilla",
            vec![
                MatchResult::new(now - Duration::days(7), "Betis".to_string(), Ground::Home, 2, 0),
                MatchResult::new(now - Duration::days(14), "Girona".to_string(), Ground::Away, 1, 1),
            ],
        );

        assert_eq!(store.team_form("Sevilla", now).await.unwrap().len(), 2);
        assert_eq!(store.head_to_head("Sevilla", "Betis", now).await.unwrap().len(), 1);

        assert_eq!(store.actual_result("fx_1").await.unwrap(), ResultStatus::NotFinished);
        store.set_final_score("fx_1", FinalScore::new(0, 3));
        assert_eq!(
            store.actual_result("fx_1").await.unwrap(),
            ResultStatus::Final(FinalScore::new(0, 3))
        );
    }
}
