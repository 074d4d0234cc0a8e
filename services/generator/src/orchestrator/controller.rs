//! services/generator/src/orchestrator/controller.rs
//!
//! The generation job controller. Plans a series into batches, runs each batch
//! through the degraded-retry executor, stores the result through the merge
//! rule, and keeps the persisted generation session in step.

use chrono::Utc;
use devotional_core::keys::{continuation_key, generation_key};
use devotional_core::planner::{plan, plan_from};
use devotional_core::ports::{SeriesRepository, SessionRepository};
use devotional_core::{
    Day, DayRange, GeneratedSeries, GenerationContext, GenerationSession, JobError, Series,
    SessionError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GenerationSettings;
use crate::orchestrator::active::ActiveJobs;
use crate::orchestrator::dedup::{Deduplicator, FromJoinError};
use crate::orchestrator::events::{
    writing_days_label, EventKind, GenerationEvent, PHASE_READING_STORY,
    PHASE_SELECTING_SCRIPTURE, PHASE_WRITING_DEVOTIONAL,
};
use crate::orchestrator::executor::BatchExecutor;

const EVENT_CAPACITY: usize = 256;

impl FromJoinError for JobError {
    fn from_join_error(err: JoinError) -> Self {
        JobError::Failed(format!("generation task ended unexpectedly: {}", err))
    }
}

fn transition_error(err: SessionError) -> JobError {
    JobError::Failed(err.to_string())
}

//=========================================================================================
// The Service
//=========================================================================================

/// Entry point for full generations and continuations. Cheap to clone; all
/// clones share the same registries and event channel.
#[derive(Clone)]
pub struct GenerationService {
    inner: Arc<Inner>,
}

struct Inner {
    executor: BatchExecutor,
    series: Arc<dyn SeriesRepository>,
    sessions: Arc<dyn SessionRepository>,
    active: ActiveJobs,
    generations: Deduplicator<GeneratedSeries, JobError>,
    continuations: Deduplicator<Vec<Day>, JobError>,
    events: broadcast::Sender<GenerationEvent>,
    batch_pause: Duration,
    job_timeout: Duration,
}

/// Where a batch loop starts from.
struct BatchRun<'a> {
    series_id: Uuid,
    context: &'a GenerationContext,
    plan: Vec<DayRange>,
    title: String,
    prior_titles: Vec<String>,
    requested_total: Option<u32>,
}

impl GenerationService {
    pub fn new(
        executor: BatchExecutor,
        series: Arc<dyn SeriesRepository>,
        sessions: Arc<dyn SessionRepository>,
        settings: &GenerationSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                executor,
                series,
                sessions,
                active: ActiveJobs::new(),
                generations: Deduplicator::new(),
                continuations: Deduplicator::new(),
                events,
                batch_pause: settings.batch_pause,
                job_timeout: settings.job_timeout,
            }),
        }
    }

    /// Progress events for every job run by this service.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a generation or continuation is currently running for the series.
    pub fn is_active(&self, series_id: Uuid) -> bool {
        self.inner.active.is_active(series_id)
    }

    pub fn job_timeout(&self) -> Duration {
        self.inner.job_timeout
    }

    pub async fn series(&self, series_id: Uuid) -> Result<Series, JobError> {
        Ok(self.inner.series.get_series(series_id).await?)
    }

    pub async fn session(&self, series_id: Uuid) -> Result<Option<GenerationSession>, JobError> {
        Ok(self.inner.sessions.get_session(series_id).await?)
    }

    pub async fn clear_session(&self, series_id: Uuid) -> Result<(), JobError> {
        Ok(self.inner.sessions.clear_session(series_id).await?)
    }

    pub async fn mark_read(&self, series_id: Uuid, day_number: u32) -> Result<Day, JobError> {
        Ok(self.inner.series.mark_read(series_id, day_number, Utc::now()).await?)
    }

    //=====================================================================================
    // Entry Points
    //=====================================================================================

    /// Generates a new series. Identical concurrent requests share one job.
    pub async fn generate(&self, context: GenerationContext) -> Result<GeneratedSeries, JobError> {
        let key = generation_key(&context);
        let service = self.clone();
        self.inner
            .generations
            .run(key, move || async move { service.run_generation(context).await })
            .await
    }

    /// Generates the missing days of an existing series and returns all of its
    /// days. Returns the stored days untouched when nothing is missing.
    pub async fn continue_series(
        &self,
        series_id: Uuid,
        requested_total: Option<u32>,
    ) -> Result<Vec<Day>, JobError> {
        let series = self.inner.series.get_series(series_id).await?;
        let target = series.total_days.max(requested_total.unwrap_or(0));
        if series.generated_days() >= target {
            return Ok(series.days);
        }

        let key = continuation_key(
            series_id,
            series.generated_days(),
            target,
            series.context.day_duration,
            &series.context.translation,
        );
        let service = self.clone();
        self.inner
            .continuations
            .run(key, move || async move { service.run_continuation(series, target).await })
            .await
    }

    /// `continue_series` bounded by the end-to-end job deadline. The job itself
    /// keeps running past the deadline; only the caller stops waiting.
    pub async fn continue_with_deadline(
        &self,
        series_id: Uuid,
        requested_total: Option<u32>,
    ) -> Result<Vec<Day>, JobError> {
        let deadline = self.inner.job_timeout;
        tokio::time::timeout(deadline, self.continue_series(series_id, requested_total))
            .await
            .map_err(|_| JobError::Connectivity(format!("continuation timed out after {:?}", deadline)))?
    }

    /// Marks sessions left `running` by a previous process as failed and
    /// returns their series ids.
    pub async fn recover_interrupted(&self) -> Result<Vec<Uuid>, JobError> {
        let mut recovered = Vec::new();
        for mut session in self.inner.sessions.running_sessions().await? {
            if self.is_active(session.series_id) {
                continue;
            }
            session.fail("interrupted", Utc::now()).map_err(transition_error)?;
            self.inner.sessions.save_session(&session).await?;
            warn!(
                series_id = %session.series_id,
                generated = session.generated_days.len(),
                total = session.total_days,
                "Found generation interrupted by shutdown"
            );
            recovered.push(session.series_id);
        }
        Ok(recovered)
    }

    //=====================================================================================
    // Jobs
    //=====================================================================================

    async fn run_generation(&self, context: GenerationContext) -> Result<GeneratedSeries, JobError> {
        let series_id = Uuid::new_v4();
        let total_days = context.series_length.days();
        let _active = self.inner.active.mark(series_id);
        info!(series_id = %series_id, total_days, "Starting series generation");

        self.inner
            .series
            .create_series(&Series::new(series_id, context.clone(), Utc::now()))
            .await?;
        let mut session = self.begin_session(series_id, total_days).await?;

        self.emit(series_id, EventKind::Phase { label: PHASE_READING_STORY.to_string() });
        self.emit(series_id, EventKind::Phase { label: PHASE_SELECTING_SCRIPTURE.to_string() });

        let run = BatchRun {
            series_id,
            context: &context,
            plan: plan(total_days, context.day_duration),
            title: String::new(),
            prior_titles: Vec::new(),
            requested_total: None,
        };
        let result = self.run_batches(&mut session, run).await;
        let (title, days) = self.finish(&mut session, result).await?;

        Ok(GeneratedSeries { series_id, title, days })
    }

    async fn run_continuation(&self, series: Series, target: u32) -> Result<Vec<Day>, JobError> {
        let series_id = series.id;
        let _active = self.inner.active.mark(series_id);

        let first_missing = (1..=target)
            .find(|n| !series.days.iter().any(|d| d.day_number == *n))
            .unwrap_or(target + 1);
        info!(series_id = %series_id, first_missing, target, "Continuing series");

        let mut session = self.begin_session(series_id, target).await?;
        let run = BatchRun {
            series_id,
            context: &series.context,
            plan: plan_from(first_missing, target, series.context.day_duration),
            title: series.title.clone(),
            prior_titles: series.day_titles(),
            requested_total: Some(target),
        };
        let result = self.run_batches(&mut session, run).await;
        self.finish(&mut session, result).await?;

        Ok(self.inner.series.get_series(series_id).await?.days)
    }

    /// Resets whatever session the series had and moves it to `running`.
    async fn begin_session(&self, series_id: Uuid, total_days: u32) -> Result<GenerationSession, JobError> {
        let now = Utc::now();
        let mut session = self
            .inner
            .sessions
            .get_session(series_id)
            .await?
            .unwrap_or_else(|| GenerationSession::idle(series_id, now));
        session.clear(now);
        session.start(total_days, now).map_err(transition_error)?;
        self.inner.sessions.save_session(&session).await?;
        self.emit(series_id, EventKind::Started { total_days });
        Ok(session)
    }

    async fn run_batches(
        &self,
        session: &mut GenerationSession,
        run: BatchRun<'_>,
    ) -> Result<(String, Vec<Day>), JobError> {
        let BatchRun {
            series_id,
            context,
            plan,
            mut title,
            mut prior_titles,
            requested_total,
        } = run;
        let mut generated: Vec<Day> = Vec::new();

        for (batch_index, range) in plan.into_iter().enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.inner.batch_pause).await;
            }
            let label = if range.start == 1 {
                PHASE_WRITING_DEVOTIONAL.to_string()
            } else {
                writing_days_label(range)
            };
            self.emit(series_id, EventKind::Phase { label });

            let series_title = (!title.is_empty()).then_some(title.as_str());
            let output = self
                .inner
                .executor
                .execute_batch(context, range, series_title, &prior_titles)
                .await?;

            let adopted = batch_index == 0 && title.is_empty() && !output.title.is_empty();
            if adopted {
                title = output.title.clone();
            }

            // Stored before anyone hears about it.
            self.inner
                .series
                .save_batch(
                    series_id,
                    adopted.then_some(title.as_str()),
                    output.days.clone(),
                    requested_total,
                )
                .await?;
            session
                .record_progress(output.days.iter().map(|d| d.day_number), Some(title.as_str()), Utc::now())
                .map_err(transition_error)?;
            self.inner.sessions.save_session(session).await?;
            info!(series_id = %series_id, range = %range, "Batch stored");

            for day in output.days {
                prior_titles.push(day.title.clone());
                self.emit(
                    series_id,
                    EventKind::Day {
                        day: day.clone(),
                        index: generated.len(),
                        series_title: title.clone(),
                    },
                );
                generated.push(day);
            }
        }

        Ok((title, generated))
    }

    /// Moves the session to its terminal state and reports the outcome.
    async fn finish<T>(
        &self,
        session: &mut GenerationSession,
        result: Result<T, JobError>,
    ) -> Result<T, JobError> {
        let series_id = session.series_id;
        match result {
            Ok(value) => {
                session.complete(Utc::now()).map_err(transition_error)?;
                self.inner.sessions.save_session(session).await?;
                let generated_days = session.generated_days.len() as u32;
                info!(series_id = %series_id, generated_days, "Generation complete");
                self.emit(series_id, EventKind::Completed { generated_days });
                Ok(value)
            }
            Err(err) => {
                error!(series_id = %series_id, kind = err.kind(), error = %err, "Generation failed");
                if session.fail(err.to_string(), Utc::now()).is_ok() {
                    if let Err(save_err) = self.inner.sessions.save_session(session).await {
                        error!(series_id = %series_id, error = %save_err, "Failed to record generation failure");
                    }
                }
                self.emit(series_id, EventKind::failed(&err));
                Err(err)
            }
        }
    }

    fn emit(&self, series_id: Uuid, kind: EventKind) {
        // No subscribers is fine.
        let _ = self.inner.events.send(GenerationEvent { series_id, kind });
    }
}
