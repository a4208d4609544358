#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use jobs_core::JobsError;
    use jobs_domain::entities::{Principal, RunStatus};

    use jobs_dispatcher::{ArgsRenderer, RenderContext, TriggerMode};
    use jobs_testing_utils::{string_map, JobBuilder, RunBuilder};

    fn fixed_time(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_render_job_variables() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new()
            .with_name("nightly_cleanup")
            .with_task("purge_expired")
            .build();
        let context = RenderContext::new(
            &job,
            TriggerMode::Scheduled,
            Principal::System,
            Utc::now(),
        );
        let templates = string_map(&[
            ("target", "{{ job.name }}"),
            ("description", "runs {{ job.task }} as {{ trigger }}"),
        ]);

        let args = renderer.render(&templates, &context).unwrap();
        assert_eq!(args["target"], "nightly_cleanup");
        assert_eq!(args["description"], "runs purge_expired as scheduled");
    }

    #[test]
    fn test_render_principal_and_trigger() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new().build();
        let context = RenderContext::new(
            &job,
            TriggerMode::Manual,
            Principal::User {
                id: "alice".to_string(),
            },
            Utc::now(),
        );
        let templates = string_map(&[
            ("actor", "{{ principal.id }}"),
            ("mode", "{{ trigger }}"),
        ]);

        let args = renderer.render(&templates, &context).unwrap();
        assert_eq!(args["actor"], "alice");
        assert_eq!(args["mode"], "manual");
    }

    #[test]
    fn test_render_last_run_status() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new().build();
        let last_run = RunBuilder::new()
            .with_job_id(job.id)
            .with_status(RunStatus::Warning)
            .build();
        let context = RenderContext::new(&job, TriggerMode::Scheduled, Principal::System, Utc::now())
            .with_last_run(&last_run);
        let templates = string_map(&[("previous", "{{ last_run.status }}")]);

        let args = renderer.render(&templates, &context).unwrap();
        assert_eq!(args["previous"], "WARNING");
    }

    #[test]
    fn test_conditional_on_missing_last_run() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new().build();
        let context =
            RenderContext::new(&job, TriggerMode::Scheduled, Principal::System, Utc::now());
        let templates = string_map(&[(
            "mode",
            "{% if last_run %}repeat{% else %}first{% endif %}",
        )]);

        let args = renderer.render(&templates, &context).unwrap();
        assert_eq!(args["mode"], "first");
    }

    #[test]
    fn test_undefined_variable_fails_whole_render() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new().build();
        let context =
            RenderContext::new(&job, TriggerMode::Scheduled, Principal::System, Utc::now());
        let templates = string_map(&[("broken", "{{ no_such_variable }}")]);

        let result = renderer.render(&templates, &context);
        match result {
            Err(JobsError::Template { key, .. }) => assert_eq!(key, "broken"),
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[test]
    fn test_render_timestamp_formatting() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new().build();
        let now = fixed_time("2024-06-01T12:00:00Z");
        let context = RenderContext::new(&job, TriggerMode::Scheduled, Principal::System, now);
        let templates = string_map(&[("when", "{{ now }}")]);

        let args = renderer.render(&templates, &context).unwrap();
        let rendered = args["when"].as_str().unwrap();
        assert!(rendered.contains("2024-06-01"));
    }

    #[test]
    fn test_expressions_render_as_strings() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new().build();
        let context =
            RenderContext::new(&job, TriggerMode::Scheduled, Principal::System, Utc::now());
        let templates = string_map(&[("count", "{{ 1 + 2 }}")]);

        let args = renderer.render(&templates, &context).unwrap();
        assert_eq!(args["count"], "3");
    }

    #[test]
    fn test_empty_templates_render_empty_object() {
        let renderer = ArgsRenderer::new();
        let job = JobBuilder::new().build();
        let context =
            RenderContext::new(&job, TriggerMode::Scheduled, Principal::System, Utc::now());

        let args = renderer.render(&string_map(&[]), &context).unwrap();
        assert!(args.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_run_titles_by_trigger_mode() {
        assert_eq!(TriggerMode::Scheduled.run_title(), "Scheduled run");
        assert_eq!(TriggerMode::Manual.run_title(), "Manual run");
    }
}
