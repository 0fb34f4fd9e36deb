//! Diesel schema for pipeline executions and artifacts.

diesel::table! {
    pipeline_executions (id) {
        id -> Uuid,
        session_id -> Uuid,
        task_id -> Nullable<Uuid>,
        #[max_length = 255]
        worker_repository -> Varchar,
        #[max_length = 255]
        git_ref -> Varchar,
        #[max_length = 255]
        handle -> Nullable<Varchar>,
        #[max_length = 50]
        status -> Varchar,
        started_at -> Timestamptz,
        last_status_update -> Timestamptz,
        finished_at -> Nullable<Timestamptz>,
        failure_reason -> Nullable<Text>,
        outputs -> Jsonb,
        artifacts_recorded_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    pipeline_artifacts (id) {
        id -> Uuid,
        pipeline_execution_id -> Uuid,
        #[max_length = 50]
        artifact_type -> Varchar,
        reference_url -> Text,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}
