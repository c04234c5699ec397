//! Load pipeline configuration

/// Configuration for pak loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Worker threads for the asset processing phases
    pub worker_threads: usize,
    /// Treat patch integrity violations as fatal. When cleared the loader
    /// logs and continues with best-effort (likely corrupt) output.
    pub strict: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4),
            strict: true,
        }
    }
}
