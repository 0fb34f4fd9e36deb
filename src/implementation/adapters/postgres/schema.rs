//! Diesel schema for sessions.

diesel::table! {
    sessions (id) {
        id -> Uuid,
        task_id -> Nullable<Uuid>,
        #[max_length = 50]
        kind -> Varchar,
        #[max_length = 255]
        runner -> Varchar,
        #[max_length = 50]
        status -> Varchar,
        input_tokens -> Int8,
        output_tokens -> Int8,
        #[max_length = 64]
        prompt_digest -> Varchar,
        change_set -> Nullable<Jsonb>,
        error -> Nullable<Text>,
        started_at -> Timestamptz,
        finished_at -> Nullable<Timestamptz>,
        handed_off_at -> Nullable<Timestamptz>,
        launched_at -> Nullable<Timestamptz>,
    }
}
