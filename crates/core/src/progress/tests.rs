use super::*;
use crate::errors::{DatabaseError, Error};
use crate::messaging::{MockMessageSender, ProcessMessage};
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct InMemoryProgress {
    row: Mutex<StoredProgress>,
    fail_writes: bool,
}

#[async_trait]
impl ProgressRepositoryTrait for InMemoryProgress {
    fn load(&self) -> crate::Result<StoredProgress> {
        Ok(self.row.lock().unwrap().clone())
    }

    async fn save(&self, progress: StoredProgress) -> crate::Result<()> {
        if self.fail_writes {
            return Err(Error::Database(DatabaseError::QueryFailed("disk full".into())));
        }
        *self.row.lock().unwrap() = progress;
        Ok(())
    }
}

fn service(fail_writes: bool) -> (ProgressService, MockMessageSender, Arc<InMemoryProgress>) {
    let repo = Arc::new(InMemoryProgress {
        fail_writes,
        ..InMemoryProgress::default()
    });
    let messenger = MockMessageSender::new();
    let service = ProgressService::new(
        repo.clone(),
        Arc::new(messenger.clone()),
        Duration::from_secs(10),
    );
    (service, messenger, repo)
}

mod estimator_tests {
    use super::*;

    #[test]
    fn test_linear_estimate_matches_formula() {
        assert_eq!(linear_left_time(100, 57.0), Some(75));
        assert_eq!(linear_left_time(100, 100.0), Some(0));
        assert_eq!(linear_left_time(100, 0.0), None);
        assert_eq!(linear_left_time(100, f64::NAN), None);
    }

    #[test]
    fn test_unchanged_progress_decays_by_elapsed_time() {
        let mut eta = EtaEstimator::default();
        assert_eq!(eta.estimate(1_000, 100, Some(50.0), true), Some(100));
        assert_eq!(eta.estimate(1_030, 130, Some(50.0), false), Some(70));
        assert_eq!(eta.estimate(1_040, 140, Some(50.0), false), Some(60));
    }

    #[test]
    fn test_decay_is_floored_at_sub_phase_estimate() {
        let mut eta = EtaEstimator::default();
        eta.estimate(0, 100, Some(50.0), true);
        eta.set_sub_phase_left_time(Some(90));
        assert_eq!(eta.estimate(30, 130, Some(50.0), false), Some(90));

        // Exhausted countdown falls back to the sub-phase estimate.
        assert_eq!(eta.estimate(500, 600, Some(50.0), false), Some(90));

        eta.set_sub_phase_left_time(None);
        assert_eq!(eta.estimate(10_000, 10_100, Some(50.0), false), Some(10_100));
    }

    #[test]
    fn test_changed_progress_re_estimates() {
        let mut eta = EtaEstimator::default();
        eta.estimate(0, 100, Some(50.0), true);
        assert_eq!(eta.estimate(50, 100, Some(57.0), true), Some(75));
    }

    #[test]
    fn test_missing_progress_clears_estimate() {
        let mut eta = EtaEstimator::default();
        eta.estimate(0, 100, Some(50.0), true);
        assert_eq!(eta.estimate(10, 110, None, false), None);
        assert_eq!(eta.estimate(20, 120, Some(50.0), false), Some(120));
    }
}

mod classification_tests {
    use super::*;

    #[test]
    fn test_classifies_values_states_and_errors() {
        let active = StoredProgress::classify(42.5.into());
        assert_eq!(active.state, Some(ProgressState::Active));
        assert!(active.is_sync_in_progress());

        let done = StoredProgress::classify(100.0.into());
        assert_eq!(done.state, Some(ProgressState::Finished));
        assert!(!done.is_sync_in_progress());

        let interrupted = StoredProgress::classify(ProgressState::Interrupted.into());
        assert_eq!(interrupted.value, None);

        let err = Error::Network("ENETUNREACH".into());
        let failed = StoredProgress::classify((&err).into());
        assert_eq!(failed.state, Some(ProgressState::Error));
        assert!(failed.error.unwrap().contains("ENETUNREACH"));

        let nan = StoredProgress::classify(f64::NAN.into());
        assert_eq!(nan.state, Some(ProgressState::Error));
    }

    #[test]
    fn test_state_tokens_round_trip() {
        for state in [
            ProgressState::Active,
            ProgressState::Finished,
            ProgressState::Interrupted,
            ProgressState::Error,
        ] {
            assert_eq!(state.as_str().parse::<ProgressState>().unwrap(), state);
        }
    }
}

mod service_tests {
    use super::*;

    #[tokio::test]
    async fn test_persists_and_announces_terminal_states() {
        let (service, messenger, repo) = service(false);

        service.set_progress(12.0).await;
        assert_eq!(repo.load().unwrap().value, Some(12.0));
        assert!(messenger.sent().is_empty());

        service.set_progress(ProgressState::Finished).await;
        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ProcessMessage::ReadySync);
        assert_eq!(
            sent[0].1,
            Some(json!({ "isFinished": true, "isInterrupted": false }))
        );

        service
            .set_progress(&Error::Unexpected("boom".into()))
            .await;
        assert_eq!(messenger.messages().last(), Some(&ProcessMessage::ErrorSync));
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let (service, _, _) = service(true);
        let mut rx = service.subscribe();

        service.set_progress(30.0).await;

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.value, Some(30.0));
    }

    #[tokio::test]
    async fn test_inactive_progress_has_no_timing() {
        let (service, _, _) = service(false);
        service.set_progress(40.0).await;

        let snapshot = service.get_progress().unwrap();
        assert_eq!(snapshot.value, Some(40.0));
        assert_eq!(snapshot.sync_started_at, None);
        assert_eq!(snapshot.left_time, None);
        assert!(service.is_sync_in_progress().unwrap());
    }

    #[tokio::test]
    async fn test_active_progress_reports_spent_time() {
        let (service, _, _) = service(false);
        service.activate();
        service.set_progress(50.0).await;

        let snapshot = service.get_progress().unwrap();
        assert!(snapshot.sync_started_at.is_some());
        assert!(snapshot.spent_time.unwrap() >= 0);
        service.deactivate();
        assert!(!service.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_emits_until_deactivated() {
        let (service, _, _) = service(false);
        let mut rx = service.subscribe();

        service.activate();
        service.set_progress(20.0).await;
        let immediate = rx.recv().await.unwrap();
        assert_eq!(immediate.value, Some(20.0));

        let ticked = rx.recv().await.unwrap();
        assert_eq!(ticked.value, Some(20.0));
        assert!(ticked.sync_started_at.is_some());

        service.deactivate();
        let next = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(next.is_err());
    }
}
