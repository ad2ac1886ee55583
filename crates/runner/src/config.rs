//! Runner configuration loaded from environment variables.

/// Configuration for a batch run.
///
/// All fields have defaults suitable for a local ComfyUI + Ollama setup;
/// override via environment variables (a `.env` file is honored).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// ComfyUI server address as `host:port` (no scheme).
    pub server: String,
    /// Base URL of the Ollama server used for prompt generation.
    pub ollama_url: String,
    /// Ollama model name.
    pub ollama_model: String,
}

impl RunnerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var          | Default                  |
    /// |------------------|--------------------------|
    /// | `COMFYUI_SERVER` | `127.0.0.1:8188`         |
    /// | `OLLAMA_URL`     | `http://127.0.0.1:11434` |
    /// | `OLLAMA_MODEL`   | `gemma3:12b`             |
    pub fn from_env() -> Self {
        Self {
            server: std::env::var("COMFYUI_SERVER").unwrap_or_else(|_| "127.0.0.1:8188".into()),
            ollama_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".into()),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "gemma3:12b".into()),
        }
    }
}
