use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leo_models::{
    CalibrationWeight, FinalScore, Fixture, HeadToHead, PredictionDecision, PredictionInputs,
    ReviewOutcome, TeamForm,
};
use uuid::Uuid;

use crate::error::{SourceError, StoreResult};

/// Durable home of fixtures, decision history, review outcomes and
/// calibration weights.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fixture(&self, fixture_id: &str) -> StoreResult<Option<Fixture>>;

    /// Inserts the fixture or refreshes its schedule and standings.
    async fn save_fixture(&self, fixture: &Fixture) -> StoreResult<()>;

    /// Trailing form window ending at `as_of`.
    async fn team_form(&self, team: &str, as_of: DateTime<Utc>) -> StoreResult<TeamForm>;

    /// Meetings between the two sides, from `home_team`'s perspective.
    async fn head_to_head(
        &self,
        home_team: &str,
        away_team: &str,
        as_of: DateTime<Utc>,
    ) -> StoreResult<HeadToHead>;

    async fn prediction_inputs(&self, fixture: &Fixture) -> StoreResult<PredictionInputs> {
        let as_of = fixture.kickoff;
        let home_form = self.team_form(&fixture.home_team, as_of).await?;
        let away_form = self.team_form(&fixture.away_team, as_of).await?;
        let head_to_head = self
            .head_to_head(&fixture.home_team, &fixture.away_team, as_of)
            .await?;
        Ok(PredictionInputs::new(home_form, away_form, head_to_head))
    }

    /// PENDING or CONFIRMED decisions with a pick whose kickoff is at or
    /// before `kicked_off_before`, newest kickoff first.
    async fn list_pending(
        &self,
        kicked_off_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<PredictionDecision>>;

    async fn decision(&self, id: Uuid) -> StoreResult<Option<PredictionDecision>>;

    async fn active_decision(&self, fixture_id: &str) -> StoreResult<Option<PredictionDecision>>;

    async fn decisions_for(&self, fixture_id: &str) -> StoreResult<Vec<PredictionDecision>>;

    /// Most recent decisions first.
    async fn recent_decisions(&self, limit: usize) -> StoreResult<Vec<PredictionDecision>>;

    /// Inserts or updates by id. Fails with `DuplicateDecision` when the
    /// fixture already holds a different non-SKIPPED decision.
    async fn save_decision(&self, decision: &PredictionDecision) -> StoreResult<()>;

    async fn confirm_decision(&self, id: Uuid) -> StoreResult<PredictionDecision>;

    async fn mark_reviewed(&self, id: Uuid) -> StoreResult<PredictionDecision>;

    /// At most one outcome per decision; a second append fails with
    /// `AlreadyReviewed`.
    async fn append_review_outcome(&self, outcome: &ReviewOutcome) -> StoreResult<()>;

    async fn review_outcomes(&self, limit: usize) -> StoreResult<Vec<ReviewOutcome>>;

    async fn load_weights(&self) -> StoreResult<Vec<CalibrationWeight>>;

    /// Writes only if the stored revision for the key is older. Returns
    /// whether the write happened.
    async fn save_weight(&self, weight: &CalibrationWeight) -> StoreResult<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Final(FinalScore),
    NotFinished,
}

#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn actual_result(&self, fixture_id: &str) -> Result<ResultStatus, SourceError>;
}
