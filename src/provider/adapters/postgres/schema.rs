//! Diesel schema for provider configuration tables.

diesel::table! {
    /// Per-project AI provider configurations.
    provider_configs (project_id, provider) {
        /// Owning project.
        project_id -> Uuid,
        /// Configured vendor.
        #[max_length = 20]
        provider -> Varchar,
        /// Deployment variant and its secret references.
        deployment -> Jsonb,
        /// Model name.
        #[max_length = 255]
        model -> Varchar,
        /// Completion token cap.
        max_tokens -> Int4,
        /// Sampling temperature.
        temperature -> Float4,
        /// Extra request headers.
        extra_headers -> Jsonb,
        /// Last modification timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-project provider selection for each stage.
    project_ai_settings (project_id) {
        /// Owning project.
        project_id -> Uuid,
        /// Provider used for evaluations.
        #[max_length = 20]
        evaluation_provider -> Nullable<Varchar>,
        /// Provider used for implementation.
        #[max_length = 20]
        implementation_provider -> Nullable<Varchar>,
    }
}
