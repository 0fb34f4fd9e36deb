//! Diesel schema for processing locks.

diesel::table! {
    processing_locks (project_id, issue_key) {
        project_id -> Uuid,
        #[max_length = 255]
        issue_key -> Varchar,
        #[max_length = 255]
        processing_worker_id -> Varchar,
        processing_started_at -> Timestamptz,
        timeout_seconds -> Int4,
        #[max_length = 50]
        status -> Varchar,
    }
}
