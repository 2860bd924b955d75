use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leo_models::{
    CalibrationWeight, DecisionStatus, FinalScore, Fixture, HeadToHead, LeoError, MatchResult,
    PredictionDecision, ReviewOutcome, TeamForm, MAX_FORM_MATCHES,
};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SourceError, StoreError, StoreResult};
use crate::schema::{
    CalibrationWeightRecord, DecisionRecord, FixtureRecord, ReviewOutcomeRecord, TeamResultRecord,
};
use crate::store::{RecordStore, ResultSource, ResultStatus};

const DECISION_COLUMNS: &str = "id, fixture_id, kickoff, market, selection, confidence, \
    rule_confidence, stat_probability, reasoning, status, skip_reason, sources, home_rate, \
    away_rate, low_confidence, thresholds_version, created_at, updated_at";

const FIXTURE_COLUMNS: &str = "fixture_id, league, home_team, away_team, kickoff, venue, \
    home_position, away_position, league_size, status, home_score, away_score";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Postgres-backed [`RecordStore`]; also a local-first [`ResultSource`]
/// reading finished scores from the `fixtures` table.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_final_score(&self, fixture_id: &str, score: FinalScore) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE fixtures
            SET status = 'finished', home_score = $2, away_score = $3, updated_at = NOW()
            WHERE fixture_id = $1
            "#,
        )
        .bind(fixture_id)
        .bind(i32::from(score.home))
        .bind(i32::from(score.away))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_team_result(&self, team: &str, result: &MatchResult) -> StoreResult<()> {
        let ground = match result.ground {
            leo_models::Ground::Home => "home",
            leo_models::Ground::Away => "away",
        };
        sqlx::query(
            r#"
            INSERT INTO team_results (team, played_at, opponent, ground, goals_for, goals_against)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (team, played_at, opponent) DO NOTHING
            "#,
        )
        .bind(team)
        .bind(result.played_at)
        .bind(&result.opponent)
        .bind(ground)
        .bind(i32::from(result.goals_for))
        .bind(i32::from(result.goals_against))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fixture_record(&self, fixture_id: &str) -> StoreResult<Option<FixtureRecord>> {
        let sql = format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE fixture_id = $1");
        Ok(sqlx::query_as::<_, FixtureRecord>(&sql)
            .bind(fixture_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn results_between(
        &self,
        team: &str,
        opponent: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<MatchResult>> {
        let rows = sqlx::query_as::<_, TeamResultRecord>(
            r#"
            SELECT team, played_at, opponent, ground, goals_for, goals_against
            FROM team_results
            WHERE team = $1
              AND ($2::TEXT IS NULL OR opponent = $2)
              AND played_at <= $3
              AND played_at >= $3 - INTERVAL '18 months'
            ORDER BY played_at DESC
            LIMIT $4
            "#,
        )
        .bind(team)
        .bind(opponent)
        .bind(as_of)
        .bind(limit_param(MAX_FORM_MATCHES))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MatchResult::try_from).collect()
    }

    async fn decisions_where(
        &self,
        clause: &str,
        bind_text: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<PredictionDecision>> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM prediction_decisions {clause} ORDER BY created_at DESC LIMIT {}",
            limit_param(limit)
        );
        let mut query = sqlx::query_as::<_, DecisionRecord>(&sql);
        if let Some(text) = bind_text {
            query = query.bind(text);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(PredictionDecision::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        to: DecisionStatus,
        allowed_from: &[DecisionStatus],
    ) -> StoreResult<PredictionDecision> {
        let from: Vec<String> = allowed_from.iter().map(|s| s.code().to_string()).collect();
        let sql = format!(
            "UPDATE prediction_decisions SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status = ANY($3) RETURNING {DECISION_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, DecisionRecord>(&sql)
            .bind(id)
            .bind(to.code())
            .bind(&from)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(record) => PredictionDecision::try_from(record),
            None => match self.decision(id).await? {
                Some(current) => Err(StoreError::Model(LeoError::InvalidTransition {
                    decision_id: id,
                    from: current.status.to_string(),
                    to: to.to_string(),
                })),
                None => Err(StoreError::DecisionNotFound(id)),
            },
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fixture(&self, fixture_id: &str) -> StoreResult<Option<Fixture>> {
        self.fixture_record(fixture_id)
            .await?
            .map(FixtureRecord::into_fixture)
            .transpose()
    }

    async fn save_fixture(&self, fixture: &Fixture) -> StoreResult<()> {
        let standings = fixture.standings;
        sqlx::query(
            r#"
            INSERT INTO fixtures (fixture_id, league, home_team, away_team, kickoff, venue,
                                  home_position, away_position, league_size)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (fixture_id) DO UPDATE SET
                league = EXCLUDED.league,
                kickoff = EXCLUDED.kickoff,
                venue = EXCLUDED.venue,
                home_position = EXCLUDED.home_position,
                away_position = EXCLUDED.away_position,
                league_size = EXCLUDED.league_size,
                updated_at = NOW()
            "#,
        )
        .bind(&fixture.fixture_id)
        .bind(&fixture.league)
        .bind(&fixture.home_team)
        .bind(&fixture.away_team)
        .bind(fixture.kickoff)
        .bind(FixtureRecord::venue_code(fixture.venue))
        .bind(standings.map(|s| i32::from(s.home_position)))
        .bind(standings.map(|s| i32::from(s.away_position)))
        .bind(standings.map(|s| i32::from(s.league_size)))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn team_form(&self, team: &str, as_of: DateTime<Utc>) -> StoreResult<TeamForm> {
        let results = self.results_between(team, None, as_of).await?;
        Ok(TeamForm::new(team, results, as_of))
    }

    async fn head_to_head(
        &self,
        home_team: &str,
        away_team: &str,
        as_of: DateTime<Utc>,
    ) -> StoreResult<HeadToHead> {
        let results = self.results_between(home_team, Some(away_team), as_of).await?;
        Ok(HeadToHead::new(results, as_of))
    }

    async fn list_pending(
        &self,
        kicked_off_before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<PredictionDecision>> {
        let sql = format!(
            "SELECT {DECISION_COLUMNS} FROM prediction_decisions \
             WHERE status IN ('PENDING', 'CONFIRMED') AND market IS NOT NULL AND kickoff <= $1 \
             ORDER BY kickoff DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, DecisionRecord>(&sql)
            .bind(kicked_off_before)
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PredictionDecision::try_from).collect()
    }

    async fn decision(&self, id: Uuid) -> StoreResult<Option<PredictionDecision>> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM prediction_decisions WHERE id = $1");
        sqlx::query_as::<_, DecisionRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(PredictionDecision::try_from)
            .transpose()
    }

    async fn active_decision(&self, fixture_id: &str) -> StoreResult<Option<PredictionDecision>> {
        Ok(self
            .decisions_where("WHERE fixture_id = $1 AND status <> 'SKIPPED'", Some(fixture_id), 1)
            .await?
            .into_iter()
            .next())
    }

    async fn decisions_for(&self, fixture_id: &str) -> StoreResult<Vec<PredictionDecision>> {
        self.decisions_where("WHERE fixture_id = $1", Some(fixture_id), usize::MAX)
            .await
    }

    async fn recent_decisions(&self, limit: usize) -> StoreResult<Vec<PredictionDecision>> {
        self.decisions_where("", None, limit).await
    }

    async fn save_decision(&self, decision: &PredictionDecision) -> StoreResult<()> {
        let r = DecisionRecord::from(decision);
        let result = sqlx::query(
            r#"
            INSERT INTO prediction_decisions (
                id, fixture_id, kickoff, market, selection, confidence, rule_confidence,
                stat_probability, reasoning, status, skip_reason, sources, home_rate, away_rate,
                low_confidence, thresholds_version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                skip_reason = EXCLUDED.skip_reason,
                confidence = EXCLUDED.confidence,
                reasoning = EXCLUDED.reasoning,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(r.id)
        .bind(&r.fixture_id)
        .bind(r.kickoff)
        .bind(&r.market)
        .bind(&r.selection)
        .bind(r.confidence)
        .bind(r.rule_confidence)
        .bind(r.stat_probability)
        .bind(&r.reasoning)
        .bind(&r.status)
        .bind(&r.skip_reason)
        .bind(&r.sources)
        .bind(r.home_rate)
        .bind(r.away_rate)
        .bind(r.low_confidence)
        .bind(&r.thresholds_version)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(decision_id = %decision.id, status = %decision.status, "decision saved");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateDecision {
                fixture_id: decision.fixture_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn confirm_decision(&self, id: Uuid) -> StoreResult<PredictionDecision> {
        self.transition(id, DecisionStatus::Confirmed, &[DecisionStatus::Pending])
            .await
    }

    async fn mark_reviewed(&self, id: Uuid) -> StoreResult<PredictionDecision> {
        self.transition(
            id,
            DecisionStatus::Reviewed,
            &[DecisionStatus::Pending, DecisionStatus::Confirmed],
        )
        .await
    }

    async fn append_review_outcome(&self, outcome: &ReviewOutcome) -> StoreResult<()> {
        let r = ReviewOutcomeRecord::from(outcome);
        let result = sqlx::query(
            r#"
            INSERT INTO review_outcomes (decision_id, fixture_id, market, selection, sources,
                                         confidence, home_score, away_score, market_correct, reviewed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(r.decision_id)
        .bind(&r.fixture_id)
        .bind(&r.market)
        .bind(&r.selection)
        .bind(&r.sources)
        .bind(r.confidence)
        .bind(r.home_score)
        .bind(r.away_score)
        .bind(r.market_correct)
        .bind(r.reviewed_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyReviewed(outcome.decision_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn review_outcomes(&self, limit: usize) -> StoreResult<Vec<ReviewOutcome>> {
        let rows = sqlx::query_as::<_, ReviewOutcomeRecord>(
            r#"
            SELECT decision_id, fixture_id, market, selection, sources, confidence,
                   home_score, away_score, market_correct, reviewed_at
            FROM review_outcomes
            ORDER BY reviewed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReviewOutcome::try_from).collect()
    }

    async fn load_weights(&self) -> StoreResult<Vec<CalibrationWeight>> {
        let rows = sqlx::query_as::<_, CalibrationWeightRecord>(
            "SELECT source, market, multiplier, revision, updated_at FROM calibration_weights ORDER BY source, market",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut weights = Vec::with_capacity(rows.len());
        for row in rows {
            match CalibrationWeight::try_from(row) {
                Ok(w) => weights.push(w),
                Err(e) => warn!(error = %e, "skipping unreadable calibration weight"),
            }
        }
        Ok(weights)
    }

    async fn save_weight(&self, weight: &CalibrationWeight) -> StoreResult<bool> {
        let r = CalibrationWeightRecord::from(weight);
        let result = sqlx::query(
            r#"
            INSERT INTO calibration_weights (source, market, multiplier, revision, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source, market) DO UPDATE SET
                multiplier = EXCLUDED.multiplier,
                revision = EXCLUDED.revision,
                updated_at = EXCLUDED.updated_at
            WHERE calibration_weights.revision < EXCLUDED.revision
            "#,
        )
        .bind(&r.source)
        .bind(&r.market)
        .bind(r.multiplier)
        .bind(r.revision)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ResultSource for PgRecordStore {
    async fn actual_result(&self, fixture_id: &str) -> Result<ResultStatus, SourceError> {
        let record = self
            .fixture_record(fixture_id)
            .await?
            .ok_or_else(|| SourceError::UnknownFixture(fixture_id.to_string()))?;

        Ok(match record.final_score()? {
            Some(score) => ResultStatus::Final(score),
            None => ResultStatus::NotFinished,
        })
    }
}
