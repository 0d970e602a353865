use crate::config::{Config, GeneratorSettings};
use crate::error::{RagmarkError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        // Validate schema version
        Self::validate_schema_version(config, &mut errors);

        // Validate dataset paths
        Self::validate_dataset(config, &mut errors);

        // Validate the sweep grid
        Self::validate_sweeps(config, &mut errors);

        // Validate generator settings
        Self::validate_generator(&config.frozen.generator, "frozen.generator", &mut errors);

        // Validate metric settings
        Self::validate_metrics(config, &mut errors);

        // Validate judge settings
        Self::validate_judge(config, &mut errors);

        // Validate experiment layout
        Self::validate_experiment(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagmarkError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_dataset(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked at load time; here only reject empty paths
        if config.dataset.queries_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "dataset.queries_path",
                "Queries path cannot be empty",
            ));
        }

        if config.dataset.answers_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "dataset.answers_path",
                "Answers path cannot be empty",
            ));
        }

        if config.dataset.qrels_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "dataset.qrels_path",
                "Qrels path cannot be empty",
            ));
        }

        if config
            .dataset
            .document_source
            .markdown_dir
            .as_os_str()
            .is_empty()
        {
            errors.push(ValidationError::new(
                "dataset.document_source.markdown_dir",
                "Markdown directory cannot be empty",
            ));
        }
    }

    fn validate_sweeps(config: &Config, errors: &mut Vec<ValidationError>) {
        let sweeps = &config.sweeps;

        if sweeps.embedding_models.is_empty() {
            errors.push(ValidationError::new(
                "sweeps.embedding_models",
                "At least one embedding model is required",
            ));
        }

        for (i, spec) in sweeps.embedding_models.iter().enumerate() {
            if spec.name.is_empty() {
                errors.push(ValidationError::new(
                    format!("sweeps.embedding_models[{}].name", i),
                    "Embedding model name cannot be empty",
                ));
            }
            if spec.source != "registry" && spec.source != "fastembed" {
                errors.push(ValidationError::new(
                    format!("sweeps.embedding_models[{}].source", i),
                    format!(
                        "Source must be 'registry' or 'fastembed', got '{}'",
                        spec.source
                    ),
                ));
            }
        }

        if sweeps.chunk_size.is_empty() {
            errors.push(ValidationError::new(
                "sweeps.chunk_size",
                "At least one chunk size is required",
            ));
        }

        if sweeps.chunk_size.iter().any(|&s| s == 0) {
            errors.push(ValidationError::new(
                "sweeps.chunk_size",
                "Chunk sizes must be greater than 0",
            ));
        }

        if sweeps.chunk_overlap.is_empty() {
            errors.push(ValidationError::new(
                "sweeps.chunk_overlap",
                "At least one chunk overlap is required (0 disables overlap)",
            ));
        }

        // Every overlap is paired with every size by the cross product
        if let Some(&min_size) = sweeps.chunk_size.iter().min() {
            if min_size > 0 {
                for &overlap in &sweeps.chunk_overlap {
                    if overlap >= min_size {
                        errors.push(ValidationError::new(
                            "sweeps.chunk_overlap",
                            format!(
                                "Overlap {} must be smaller than every chunk size (minimum {})",
                                overlap, min_size
                            ),
                        ));
                    }
                }
            }
        }

        if sweeps.top_k.is_empty() {
            errors.push(ValidationError::new(
                "sweeps.top_k",
                "At least one top_k value is required",
            ));
        }

        if sweeps.top_k.iter().any(|&k| k == 0) {
            errors.push(ValidationError::new(
                "sweeps.top_k",
                "top_k values must be greater than 0",
            ));
        }
    }

    fn validate_generator(
        settings: &GeneratorSettings,
        section: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let valid_providers = ["llama-server", "openai-compatible"];
        if !valid_providers.contains(&settings.provider.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.provider", section),
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, settings.provider
                ),
            ));
        }

        if settings.llm_name.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.llm_name", section),
                "LLM name cannot be empty",
            ));
        }

        if !(0.0..=2.0).contains(&settings.temperature) {
            errors.push(ValidationError::new(
                format!("{}.temperature", section),
                format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    settings.temperature
                ),
            ));
        }

        if settings.n_ctx <= settings.max_new_tokens {
            errors.push(ValidationError::new(
                format!("{}.n_ctx", section),
                format!(
                    "Context window {} must exceed max_new_tokens {}",
                    settings.n_ctx, settings.max_new_tokens
                ),
            ));
        }

        // Remote providers take their key from the environment
        if settings.provider == "openai-compatible" {
            match &settings.api_key_env {
                Some(env_var) => match std::env::var(env_var) {
                    Ok(key) if key.is_empty() => {
                        errors.push(ValidationError::new(
                            format!("{}.api_key_env", section),
                            format!("Environment variable {} is empty", env_var),
                        ));
                    }
                    Ok(_) => {}
                    Err(_) => {
                        errors.push(ValidationError::new(
                            format!("{}.api_key_env", section),
                            format!("Environment variable {} is not set", env_var),
                        ));
                    }
                },
                None => {
                    errors.push(ValidationError::new(
                        format!("{}.api_key_env", section),
                        "Remote providers require api_key_env",
                    ));
                }
            }
        }
    }

    fn validate_metrics(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.frozen.metrics.retrieval_k == 0 {
            errors.push(ValidationError::new(
                "frozen.metrics.retrieval_k",
                "retrieval_k must be greater than 0",
            ));
        }
    }

    fn validate_judge(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::validate_generator(&config.judge.generator_settings(), "judge", errors);

        let judge = &config.judge;
        if !(0..=5).contains(&judge.faithfulness_threshold) {
            errors.push(ValidationError::new(
                "judge.faithfulness_threshold",
                format!(
                    "Threshold must be within the 0-5 score range, got {}",
                    judge.faithfulness_threshold
                ),
            ));
        }

        if !(0..=5).contains(&judge.hallucination_threshold) {
            errors.push(ValidationError::new(
                "judge.hallucination_threshold",
                format!(
                    "Threshold must be within the 0-5 score range, got {}",
                    judge.hallucination_threshold
                ),
            ));
        }

        if judge.hallucination_threshold > judge.faithfulness_threshold {
            errors.push(ValidationError::new(
                "judge.hallucination_threshold",
                "Hallucination threshold cannot exceed the faithfulness threshold",
            ));
        }
    }

    fn validate_experiment(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.experiment.output_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "experiment.output_dir",
                "Output directory cannot be empty",
            ));
        }

        if config.experiment.per_run_metrics_file.is_empty() {
            errors.push(ValidationError::new(
                "experiment.per_run_metrics_file",
                "Per-run metrics file name cannot be empty",
            ));
        }

        if config.experiment.summary_file.is_empty() {
            errors.push(ValidationError::new(
                "experiment.summary_file",
                "Summary file name cannot be empty",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_sweep_rejected() {
        let mut config = Config::default();
        config.sweeps.chunk_size.clear();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_overlap_must_fit_smallest_chunk() {
        let mut config = Config::default();
        config.sweeps.chunk_size = vec![128, 512];
        config.sweeps.chunk_overlap = vec![128];
        let err = ConfigValidator::validate(&config).unwrap_err();
        match err {
            RagmarkError::ConfigValidation { errors } => {
                assert!(errors.iter().any(|e| e.path == "sweeps.chunk_overlap"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.frozen.generator.provider = "carrier-pigeon".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_threshold_ordering() {
        let mut config = Config::default();
        config.judge.hallucination_threshold = 5;
        config.judge.faithfulness_threshold = 3;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
