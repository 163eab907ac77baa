use thiserror::Error;

/// Top-level error type for the Tether runtime.
///
/// None of these are fatal to the process: each one is scoped to a single
/// module, URL, hook path, or callback and the rest of the runtime keeps going.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Fetching or evaluating module source failed (after all retries).
    #[error("failed to load {url}: {message}")]
    Load { url: String, message: String },

    /// A module with the same id is already registered.
    #[error("module '{0}' is already registered")]
    Registration(String),

    /// A hook target never appeared in the host function tree.
    #[error("gave up wrapping '{path}' after {attempts} attempts")]
    WrapTimeout { path: String, attempts: u32 },

    /// A required dependency did not finish loading in time.
    #[error("module '{module}' timed out waiting for dependency '{dependency}'")]
    DependencyTimeout { module: String, dependency: String },

    /// A hook callback failed while a wrapped function was being dispatched.
    #[error("hook on '{path}' owned by '{owner}' failed: {message}")]
    HookDispatch {
        path: String,
        owner: String,
        message: String,
    },

    /// An event listener failed.
    #[error("listener for '{event}' owned by '{owner}' failed: {message}")]
    Listener {
        event: String,
        owner: String,
        message: String,
    },

    /// An unsubscribe closure failed during cleanup.
    #[error("unsubscribe for module '{owner}' failed: {message}")]
    Unsubscribe { owner: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// The requested transition does not apply to the module's current state.
    #[error("invalid state for '{module}': {message}")]
    InvalidState { module: String, message: String },

    #[error("host function tree: {0}")]
    Host(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RuntimeError {
    pub fn invalid_state(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            module: module.into(),
            message: message.into(),
        }
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
