//! Centralized constants for kiri.
//!
//! All magic numbers, default strings, and configuration constants live here
//! so they can be changed in one place.

/// Application name used in CLI output and directory paths.
pub const APP_NAME: &str = "kiri";

/// Default LLM model identifier.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";

/// Maximum tokens for LLM completions.
pub const MAX_TOKENS: u64 = 4096;

/// Configuration filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Per-project configuration filename.
pub const PROJECT_CONFIG_FILENAME: &str = "kiri.toml";

/// Readline history filename.
pub const HISTORY_FILENAME: &str = "chat_history.txt";

/// Directory (under the data dir) holding the JSON store.
pub const STORAGE_DIRNAME: &str = "storage";

/// Default LLM model identifier for OpenAI.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// Default LLM model identifier for OpenRouter.
pub const DEFAULT_OPENROUTER_MODEL: &str = "arcee-ai/trinity-large-preview:free";

/// Default base URL for local Ollama server.
pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default LLM model identifier for Ollama.
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3";

// --- Provider defaults ---

/// Default provider when none is configured.
pub const DEFAULT_PROVIDER: &str = "anthropic";

/// Agent used when neither the CLI nor the config names one.
pub const DEFAULT_AGENT: &str = "build";

// --- Runtime defaults ---

/// Default upper bound on provider calls per run.
pub const MAX_ITERATIONS_DEFAULT: usize = 50;

/// Default number of identical (or alternating) calls that trip the doom-loop detector.
pub const DOOM_LOOP_THRESHOLD_DEFAULT: usize = 3;

/// Largest doom-loop threshold honored; higher configured values are clamped.
pub const DOOM_LOOP_THRESHOLD_MAX: usize = 500;

/// Attempts at opening a provider stream, the first included.
pub const PROVIDER_RETRY_ATTEMPTS_DEFAULT: u32 = 4;

/// Delay before the first provider retry; doubles on each further retry.
pub const PROVIDER_RETRY_INITIAL_DELAY_MS_DEFAULT: u64 = 2_000;

/// Cap on the delay between provider retries.
pub const PROVIDER_RETRY_MAX_DELAY_MS_DEFAULT: u64 = 16_000;

/// Default token budget for the context window sent to the provider.
pub const CONTEXT_WINDOW_TOKENS_DEFAULT: usize = 100_000;

/// Default number of most recent messages loaded from history per run.
pub const MAX_CONVERSATION_MESSAGES_DEFAULT: usize = 50;

// --- Token counting ---

/// Characters per token for the cheap estimator.
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate token overhead per message (role markers, etc.).
pub const TOKENS_PER_MESSAGE_OVERHEAD: usize = 4;

/// Approximate token overhead for conversation framing.
pub const TOKENS_CONVERSATION_FRAMING: usize = 2;

/// Prompt used to summarize messages dropped from the context window.
pub const SUMMARY_PROMPT: &str =
    "Summarize the following conversation context concisely. \
Preserve key decisions, code snippets, file paths, and technical details mentioned. \
Do not add commentary. Return only the summary.\n\n";

// --- Tool limits ---

/// Maximum file size (bytes) the read_file tool will read.
pub const READ_FILE_MAX_SIZE: u64 = 100 * 1024;

/// Byte threshold for binary file detection (check first N bytes for null).
pub const BINARY_DETECTION_BYTES: usize = 8192;

/// Maximum number of results the glob tool returns.
pub const GLOB_MAX_RESULTS: usize = 1000;

/// Maximum number of matching lines the grep tool returns.
pub const GREP_MAX_MATCHES: usize = 50;

/// Maximum number of entries the ls tool prints.
pub const LS_MAX_ENTRIES: usize = 500;

/// Default bash timeout in seconds.
pub const BASH_DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Hard upper bound a caller may request for a bash timeout.
pub const BASH_MAX_TIMEOUT_SECS: u64 = 600;

/// Maximum combined stdout/stderr bytes returned by the bash tool.
pub const BASH_MAX_OUTPUT_SIZE: usize = 30_000;

/// Environment variables removed before spawning shell commands.
pub const BASH_STRIPPED_ENV_VARS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "OPENROUTER_API_KEY",
    "AWS_SECRET_ACCESS_KEY",
    "GITHUB_TOKEN",
];

/// Maximum response body (bytes) returned by the webfetch tool.
pub const WEBFETCH_MAX_SIZE: usize = 100 * 1024;

/// Timeout for a single webfetch request.
pub const WEBFETCH_TIMEOUT_SECS: u64 = 30;

/// Characters of tool output shown in a tool-finished summary line.
pub const TOOL_PREVIEW_CHARS: usize = 200;
