use ort::execution_providers::ExecutionProviderDispatch;

/// Execution providers for the cascade sessions, best first.
///
/// Nodes a listed provider cannot run fall back to the CPU provider, so an
/// empty list means plain CPU inference.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Name of the provider [`preferred_execution_providers`] asks for, for logs.
pub fn provider_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "CoreML"
    } else if cfg!(target_os = "windows") {
        "DirectML"
    } else {
        "CPU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_list_matches_name() {
        let providers = preferred_execution_providers();
        assert_eq!(providers.is_empty(), provider_name() == "CPU");
    }
}
