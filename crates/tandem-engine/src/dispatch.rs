//! The dispatch loop: polls for due actions, regenerates their payload and
//! delivers it.
//!
//! Durability lives entirely in the store — "what is due" is recomputed
//! from persisted rows every tick, so a restart loses nothing and an
//! action fires at most one interval late. Processing is ordered so that
//! the only state mutation (deactivation) happens after successful
//! delivery: a crash mid-fire leaves the action active and it is redone
//! wholesale on the next tick. A duplicate reminder is acceptable;
//! corrupted state is not.

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use tandem_store::StoreError;
use tandem_types::ScheduledAction;

use crate::{Engine, context, turn};

/// Counts for one poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub due: usize,
    pub fired: usize,
    pub failed: usize,
}

impl Engine {
    /// Run the dispatch loop for the lifetime of the process. Ticks never
    /// overlap: a long tick delays the next one.
    pub async fn run(&self) {
        info!(
            interval_secs = self.options.poll_interval.as_secs(),
            "Dispatch loop started"
        );
        loop {
            match self.poll_once(Utc::now()).await {
                Ok(stats) if stats.due > 0 => {
                    info!(
                        due = stats.due,
                        fired = stats.fired,
                        failed = stats.failed,
                        "Poll tick complete"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Poll tick failed, retrying next interval"),
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// Process everything due at `now`. One action's failure is contained:
    /// it is logged, left active for the next tick, and its siblings still
    /// run.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<TickStats, StoreError> {
        let due = self.store.due_actions(now).await?;
        let mut stats = TickStats {
            due: due.len(),
            ..TickStats::default()
        };

        for action in &due {
            match self.fire_action(now, action).await {
                Ok(()) => stats.fired += 1,
                Err(e) => {
                    warn!(
                        action_id = action.id,
                        owner_id = action.owner_id,
                        "Action processing failed, will retry next poll: {e:#}"
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn fire_action(&self, now: DateTime<Utc>, action: &ScheduledAction) -> anyhow::Result<()> {
        let Some(owner) = self.store.get_user(action.owner_id).await? else {
            // The owner will never reappear; retire the action instead of
            // failing it on every future tick.
            warn!(
                action_id = action.id,
                owner_id = action.owner_id,
                "Owner no longer exists, retiring orphaned action"
            );
            self.store.deactivate_action(action.id).await?;
            return Ok(());
        };

        let recent = self
            .store
            .recent_conversations(owner.id, self.options.history_window)
            .await?;
        let messages = context::fired_action_messages(now, &owner, action, &recent);

        let reply = turn::run_turn(
            self.backend.as_ref(),
            &self.dispatcher,
            &owner,
            messages,
            self.options.max_tool_rounds,
        )
        .await
        .context("fired-action generation failed")?;

        let translated = self.translator.translate(&reply, owner.reply_language()).await;
        self.delivery
            .deliver(&owner.chat_id, &translated)
            .await
            .context("fired-action delivery failed")?;

        if self.store.deactivate_action(action.id).await? {
            info!(action_id = action.id, owner_id = owner.id, "Scheduled action fired");
        } else {
            debug!(
                action_id = action.id,
                "Action already retired, a concurrent cancel won the race"
            );
        }
        Ok(())
    }
}
