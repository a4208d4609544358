#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use jobs_core::JobsError;
    use jobs_domain::entities::{Principal, RunStatus};
    use jobs_domain::{JobRepository, RunRepository};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use jobs_dispatcher::{JobScheduler, RunLifecycle, TriggerMode};
    use jobs_testing_utils::{
        string_map, JobBuilder, MockExecutionBackend, MockJobRepository, MockRunRepository,
        RecordingEventSink, RunBuilder,
    };

    fn fixed_time(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn create_scheduler(
        job_repo: Arc<MockJobRepository>,
        run_repo: Arc<MockRunRepository>,
        backend: Arc<MockExecutionBackend>,
        sink: Arc<RecordingEventSink>,
    ) -> JobScheduler {
        let lifecycle = Arc::new(RunLifecycle::new(run_repo.clone(), sink));
        JobScheduler::new(
            job_repo,
            run_repo,
            backend,
            lifecycle,
            "default".to_string(),
            StdDuration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_scan_dispatches_due_interval_job() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let last = fixed_time("2024-06-01T10:00:00Z");
        let job = JobBuilder::new()
            .with_name("heartbeat")
            .with_task("log_message")
            .with_interval_seconds(60)
            .with_last_evaluated_at(last)
            .with_arg("message", "ping from {{ job.name }}")
            .build();
        job_repo.create(&job).await.unwrap();

        let now = last + Duration::seconds(60);
        let dispatched = scheduler.scan_cycle_at(now).await.unwrap();

        assert_eq!(dispatched.len(), 1);
        let run = &dispatched[0];
        assert_eq!(run.job_id, job.id);
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.title, "Scheduled run");
        assert_eq!(run.started_by, Principal::System);
        assert_eq!(run.backend_run_id.as_deref(), Some("backend-1"));
        assert_eq!(run.args["message"], "ping from heartbeat");

        let submitted = backend.submitted_runs();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].task, "log_message");
        assert_eq!(submitted[0].queue, "default");

        let saved_job = job_repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(saved_job.last_evaluated_at, Some(now));
    }

    #[tokio::test]
    async fn test_scan_skips_job_before_interval_elapsed() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let last = fixed_time("2024-06-01T10:00:00Z");
        let job = JobBuilder::new()
            .with_interval_seconds(60)
            .with_last_evaluated_at(last)
            .build();
        job_repo.create(&job).await.unwrap();

        let dispatched = scheduler
            .scan_cycle_at(last + Duration::seconds(30))
            .await
            .unwrap();

        assert!(dispatched.is_empty());
        assert_eq!(backend.submitted_count(), 0);
        assert_eq!(run_repo.count(), 0);

        // The evaluation time only advances when the job fires
        let saved_job = job_repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(saved_job.last_evaluated_at, Some(last));
    }

    #[tokio::test]
    async fn test_scan_skips_inactive_and_unscheduled_jobs() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let inactive = JobBuilder::new()
            .with_name("paused")
            .with_interval_seconds(1)
            .inactive()
            .build();
        let unscheduled = JobBuilder::new().with_name("manual_only").build();
        job_repo.create(&inactive).await.unwrap();
        job_repo.create(&unscheduled).await.unwrap();

        let dispatched = scheduler.scan_cycle().await.unwrap();

        assert!(dispatched.is_empty());
        assert_eq!(backend.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_triggers_never_evaluated_job_immediately() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let job = JobBuilder::new().with_interval_seconds(3600).build();
        job_repo.create(&job).await.unwrap();

        let now = fixed_time("2024-06-01T10:00:00Z");
        let dispatched = scheduler.scan_cycle_at(now).await.unwrap();

        assert_eq!(dispatched.len(), 1);
        let saved_job = job_repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(saved_job.last_evaluated_at, Some(now));
    }

    #[tokio::test]
    async fn test_submission_failure_marks_run_failed() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        backend.fail_submissions(true);
        let last = fixed_time("2024-06-01T10:00:00Z");
        let job = JobBuilder::new()
            .with_interval_seconds(60)
            .with_last_evaluated_at(last)
            .build();
        job_repo.create(&job).await.unwrap();

        let now = last + Duration::seconds(60);
        let dispatched = scheduler.scan_cycle_at(now).await.unwrap();
        assert!(dispatched.is_empty());

        // The run stays behind as a failed record
        let runs = run_repo.get_all_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].started_at.is_none());
        assert!(runs[0].finished_at.is_some());
        assert!(runs[0].message.as_deref().unwrap().contains("拒绝提交"));

        // The job still advances to the next period instead of retrying every scan
        let saved_job = job_repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(saved_job.last_evaluated_at, Some(now));
    }

    #[tokio::test]
    async fn test_render_failure_creates_no_run() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink.clone());

        let job = JobBuilder::new()
            .with_interval_seconds(60)
            .with_arg("value", "{{ no_such_variable }}")
            .build();
        job_repo.create(&job).await.unwrap();

        let now = fixed_time("2024-06-01T10:00:00Z");
        let dispatched = scheduler.scan_cycle_at(now).await.unwrap();

        assert!(dispatched.is_empty());
        assert_eq!(run_repo.count(), 0);
        assert_eq!(backend.submitted_count(), 0);
        assert_eq!(sink.count(), 0);

        let saved_job = job_repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(saved_job.last_evaluated_at, Some(now));
    }

    #[tokio::test]
    async fn test_faulty_job_does_not_block_others() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let broken = JobBuilder::new()
            .with_name("broken_job")
            .with_interval_seconds(60)
            .with_arg("value", "{{ no_such_variable }}")
            .build();
        let healthy = JobBuilder::new()
            .with_name("healthy_job")
            .with_interval_seconds(60)
            .build();
        job_repo.create(&broken).await.unwrap();
        job_repo.create(&healthy).await.unwrap();

        let dispatched = scheduler.scan_cycle().await.unwrap();

        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].job_id, healthy.id);
        assert_eq!(backend.submitted_count(), 1);
    }

    #[tokio::test]
    async fn test_job_queue_overrides_default() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let job = JobBuilder::new()
            .with_interval_seconds(60)
            .with_queue("high_priority")
            .build();
        job_repo.create(&job).await.unwrap();

        let dispatched = scheduler.scan_cycle().await.unwrap();

        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].queue, "high_priority");
        assert_eq!(backend.submitted_runs()[0].queue, "high_priority");
    }

    #[tokio::test]
    async fn test_dispatch_with_override_args_replaces_template() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let job = JobBuilder::new()
            .with_arg("message", "default message")
            .build();
        job_repo.create(&job).await.unwrap();

        let overrides = string_map(&[("reason", "requested by {{ principal.id }}")]);
        let run = scheduler
            .dispatch_job(
                &job,
                TriggerMode::Manual,
                Principal::User {
                    id: "alice".to_string(),
                },
                Some(overrides),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(run.title, "Manual run");
        assert_eq!(run.args["reason"], "requested by alice");
        assert!(run.args.get("message").is_none());
    }

    #[tokio::test]
    async fn test_render_context_exposes_last_run() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        let job = JobBuilder::new()
            .with_interval_seconds(60)
            .with_arg("previous", "{{ last_run.status if last_run else 'none' }}")
            .build();
        job_repo.create(&job).await.unwrap();

        let earlier = RunBuilder::new()
            .with_job_id(job.id)
            .with_status(RunStatus::Success)
            .with_created_at(fixed_time("2024-06-01T09:00:00Z"))
            .build();
        run_repo.create(&earlier).await.unwrap();

        let dispatched = scheduler.scan_cycle().await.unwrap();

        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].args["previous"], "SUCCESS");
    }

    #[tokio::test]
    async fn test_dispatch_failure_propagates_submission_error() {
        let job_repo = Arc::new(MockJobRepository::new());
        let run_repo = Arc::new(MockRunRepository::new());
        let backend = Arc::new(MockExecutionBackend::new());
        let sink = Arc::new(RecordingEventSink::new());
        let scheduler =
            create_scheduler(job_repo.clone(), run_repo.clone(), backend.clone(), sink);

        backend.fail_submissions(true);
        let job = JobBuilder::new().build();
        job_repo.create(&job).await.unwrap();

        let result = scheduler
            .dispatch_job(&job, TriggerMode::Manual, Principal::System, None, Utc::now())
            .await;
        assert!(matches!(result, Err(JobsError::Submission(_))));
    }
}
