use super::RagConfig;
use crate::core::errors::RagError;
use crate::rag::prompt::SYSTEM_PROMPT;

/// Characters reserved for the user's question when checking the
/// generation budget.
pub const QUERY_ALLOWANCE_CHARS: usize = 1_000;

pub fn validate_config(config: &RagConfig) -> Result<(), RagError> {
    validate_non_empty("provider.base_url", &config.provider.base_url)?;
    validate_non_empty("embedding.model", &config.embedding.model)?;
    validate_non_empty("generation.model", &config.generation.model)?;

    validate_range("embedding.timeout_secs", config.embedding.timeout_secs, 1, 86_400)?;
    validate_range("embedding.batch_size", config.embedding.batch_size as u64, 1, 4_096)?;
    validate_range("generation.timeout_secs", config.generation.timeout_secs, 1, 86_400)?;
    validate_range("retry.max_attempts", config.retry.max_attempts as u64, 1, 10)?;

    let chunking = &config.chunking;
    validate_range("chunking.chunk_size", chunking.chunk_size as u64, 1, 1_000_000)?;
    if chunking.chunk_overlap >= chunking.chunk_size {
        return Err(RagError::Config(format!(
            "Invalid config at 'chunking.chunk_overlap': {} must be smaller than chunk_size {}",
            chunking.chunk_overlap, chunking.chunk_size
        )));
    }

    let retrieval = &config.retrieval;
    validate_range("retrieval.top_k", retrieval.top_k as u64, 1, 100)?;
    let threshold = retrieval.relatedness_threshold;
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(RagError::Config(format!(
            "Invalid config at 'retrieval.relatedness_threshold': must be positive, got {}",
            threshold
        )));
    }

    let required = prompt_budget(config);
    if required > config.generation.context_chars {
        return Err(RagError::Config(format!(
            "Invalid config at 'generation.context_chars': prompts need up to {} characters, \
             model budget is {}",
            required, config.generation.context_chars
        )));
    }

    Ok(())
}

/// Upper bound of the characters sent to the chat model in one request.
pub fn prompt_budget(config: &RagConfig) -> usize {
    config
        .chunking
        .chunk_size
        .saturating_mul(config.retrieval.top_k)
        .saturating_add(SYSTEM_PROMPT.chars().count())
        .saturating_add(QUERY_ALLOWANCE_CHARS)
}

fn validate_non_empty(path: &str, value: &str) -> Result<(), RagError> {
    if value.trim().is_empty() {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_range(path: &str, value: u64, min: u64, max: u64) -> Result<(), RagError> {
    if value < min || value > max {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_config_error(config: &RagConfig, needle: &str) {
        match validate_config(config) {
            Err(RagError::Config(message)) => {
                assert!(message.contains(needle), "unexpected message: {}", message)
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn defaults_are_valid() {
        validate_config(&RagConfig::default()).unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        expect_config_error(&config, "chunking.chunk_overlap");
    }

    #[test]
    fn threshold_must_be_positive_and_finite() {
        let mut config = RagConfig::default();
        config.retrieval.relatedness_threshold = f32::NAN;
        expect_config_error(&config, "relatedness_threshold");

        config.retrieval.relatedness_threshold = 0.0;
        expect_config_error(&config, "relatedness_threshold");
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let mut config = RagConfig::default();
        config.retrieval.top_k = 0;
        expect_config_error(&config, "retrieval.top_k");
    }

    #[test]
    fn context_budget_bounds_chunk_size_times_k() {
        let mut config = RagConfig::default();
        config.chunking.chunk_size = 20_000;
        config.retrieval.top_k = 4;
        expect_config_error(&config, "generation.context_chars");

        config.generation.context_chars = 100_000;
        validate_config(&config).unwrap();
    }

    #[test]
    fn empty_model_name_is_rejected() {
        let mut config = RagConfig::default();
        config.generation.model = " ".to_string();
        expect_config_error(&config, "generation.model");
    }
}
