/// Process-wide configuration for Tessera.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Log filter directive. `None` uses [`crate::logging::DEFAULT_FILTER`].
    pub log_filter: Option<String>,
    pub profiling: ProfilingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfilingMode {
    /// Profiling scopes are disabled
    #[default]
    Off,
    /// Profiling scopes are recorded and can be read through puffin's global profiler
    On,
    /// Profiling scopes are recorded and served to 'puffin_viewer' over HTTP
    WithWebserver,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.log_filter.is_none());
        assert_eq!(config.profiling, ProfilingMode::Off);
    }
}
