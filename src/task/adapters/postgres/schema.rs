//! Diesel schema for task and task-source persistence.

diesel::table! {
    /// Configured issue-tracker integrations.
    task_sources (id) {
        /// Task source identifier.
        id -> Uuid,
        /// Owning project.
        project_id -> Uuid,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Tagged tracker configuration.
        config -> Jsonb,
        /// Sync axis status.
        #[max_length = 50]
        sync_status -> Varchar,
        /// Sync axis status change timestamp.
        sync_changed_at -> Timestamptz,
        /// Sweeper requeue counter.
        sync_requeue_count -> Int4,
        /// Error from the last failed sync.
        last_error -> Nullable<Text>,
        /// When the last sync finished.
        last_synced_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Tasks with their three status axes.
    tasks (id) {
        /// Internal task identifier.
        id -> Uuid,
        /// Owning project.
        project_id -> Uuid,
        /// Task source the task was synced from.
        source_id -> Uuid,
        /// Stable provider-qualified issue key.
        #[max_length = 512]
        issue_key -> Varchar,
        /// Issue title.
        title -> Text,
        /// Issue description.
        description -> Nullable<Text>,
        /// Upstream open/closed state.
        #[max_length = 20]
        remote_status -> Varchar,
        /// Issue URL.
        web_url -> Nullable<Text>,
        /// Issue labels as a JSON array of strings.
        labels -> Jsonb,
        /// Repository implementation sessions push to.
        worker_repository -> Nullable<Text>,
        /// Simple evaluation status.
        #[max_length = 50]
        simple_status -> Varchar,
        /// Simple evaluation status change timestamp.
        simple_changed_at -> Timestamptz,
        /// Simple evaluation requeue counter.
        simple_requeue_count -> Int4,
        /// Simple evaluation failure.
        simple_failure -> Nullable<Jsonb>,
        /// Simple evaluation result.
        simple_result -> Nullable<Jsonb>,
        /// Advanced evaluation status.
        #[max_length = 50]
        advanced_status -> Varchar,
        /// Advanced evaluation status change timestamp.
        advanced_changed_at -> Timestamptz,
        /// Advanced evaluation requeue counter.
        advanced_requeue_count -> Int4,
        /// Advanced evaluation failure.
        advanced_failure -> Nullable<Jsonb>,
        /// Advanced evaluation result.
        advanced_result -> Nullable<Jsonb>,
        /// Implementation status.
        #[max_length = 50]
        implementation_status -> Varchar,
        /// Implementation status change timestamp.
        implementation_changed_at -> Timestamptz,
        /// Implementation requeue counter.
        implementation_requeue_count -> Int4,
        /// Implementation failure.
        implementation_failure -> Nullable<Jsonb>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(tasks -> task_sources (source_id));
diesel::allow_tables_to_appear_in_same_query!(task_sources, tasks);
