use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;

/// When executors check the graph before building their plan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Validate in builds with debug assertions only.
    #[default]
    DebugOnly,
    /// Always validate.
    Always,
    /// Never validate. A malformed graph then silently skips the nodes that
    /// can never become ready.
    Never,
}

impl Validation {
    pub(crate) fn enabled(self) -> bool {
        match self {
            Self::DebugOnly => cfg!(debug_assertions),
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Options shared by every executor backend.
///
/// ```
/// use workgraph::config::{ExecConfig, Validation};
///
/// let config = ExecConfig::default()
///     .with_validation(Validation::Always)
///     .with_num_threads(2);
/// assert_eq!(config.num_threads(), Some(2));
/// ```
#[must_use]
#[derive(Debug, Default, Clone)]
pub struct ExecConfig {
    validation: Validation,
    num_threads: Option<usize>,
}

impl ExecConfig {
    /// Set the validation mode.
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Run the task backends on a dedicated pool of `num_threads` threads
    /// instead of the global rayon pool.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// The validation mode.
    #[must_use]
    pub fn validation(&self) -> Validation {
        self.validation
    }

    /// Size of the dedicated pool, if any.
    #[must_use]
    pub fn num_threads(&self) -> Option<usize> {
        self.num_threads
    }

    /// Build the dedicated pool, or `None` to use the global one.
    ///
    /// # Errors
    /// If rayon fails to spawn the pool.
    pub fn build_pool(&self) -> Result<Option<Arc<ThreadPool>>, ThreadPoolBuildError> {
        self.num_threads
            .map(|num_threads| {
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|idx| format!("workgraph-{idx}"))
                    .build()
                    .map(Arc::new)
            })
            .transpose()
    }
}
