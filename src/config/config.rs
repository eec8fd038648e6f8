//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hardware acceleration provider for ONNX models.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only, requires CUDA toolkit)
    Cuda,
    /// Apple CoreML acceleration (macOS only, uses Neural Engine)
    #[value(name = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Cpu => write!(f, "cpu"),
            Provider::Cuda => write!(f, "cuda"),
            Provider::CoreMl => write!(f, "coreml"),
        }
    }
}

impl Provider {
    /// Convert to sherpa-rs provider string.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// Dictation bridge configuration.
///
/// These options configure how the engine is hosted (models, device rates,
/// acceleration, diagnostics). The recognition language is deliberately not
/// among them; it is pinned in the recognizer.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "dictation-bridge")]
#[command(author, version, about = "Streams dictated speech to stdout, one utterance per line", long_about = None)]
pub struct AppConfig {
    /// Directory containing model files (Whisper, VAD)
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,

    /// Audio sample rate for speech recognition
    #[arg(long, default_value = "16000")]
    pub sample_rate: u32,

    /// Voice activity detection threshold (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    pub vad_threshold: f32,

    /// VAD silence duration in seconds (how long to wait before considering an utterance ended)
    #[arg(long, default_value = "0.8")]
    pub vad_silence_duration: f32,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Suppress the fixed diagnostic line emitted for rejected utterances
    #[arg(long)]
    pub quiet_rejections: bool,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Number of threads for all models (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    /// VAD threads (0 = use num_threads, typically 1)
    #[arg(long, default_value = "0")]
    pub vad_threads: usize,

    /// STT threads (0 = use num_threads, typically cores/3)
    #[arg(long, default_value = "0")]
    pub stt_threads: usize,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();
        config.normalize_thread_counts();
        config
    }

    /// Auto-detect and normalize thread counts based on CPU cores and provider.
    ///
    /// With CUDA the GPU handles parallelism internally, so a single CPU
    /// thread per model avoids resource contention and CUDA allocation
    /// failures. On CPU, cores/3 leaves headroom for the rest of the process.
    fn normalize_thread_counts(&mut self) {
        let cpu_cores = num_cpus::get();
        let using_cuda = self.effective_provider() == Provider::Cuda;

        if self.num_threads == 0 {
            self.num_threads = if using_cuda { 1 } else { (cpu_cores / 3).max(1) };
        }

        // VAD is lightweight, one thread is enough
        if self.vad_threads == 0 {
            self.vad_threads = 1;
        }

        // Whisper is CPU-intensive on CPU, but use 1 for CUDA
        if self.stt_threads == 0 {
            self.stt_threads = if using_cuda { 1 } else { self.num_threads };
        }

        if self.verbose {
            info!("CPU cores: {}, Provider: {}, Thread counts: VAD={}, STT={}", cpu_cores, self.effective_provider(), self.vad_threads, self.stt_threads);
        }
    }

    /// Get the effective hardware acceleration provider.
    pub fn effective_provider(&self) -> Provider {
        self.provider.unwrap_or_else(detect_provider)
    }

    /// Get the path to the Whisper encoder model.
    pub fn whisper_encoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-encoder.int8.onnx")
    }

    /// Get the path to the Whisper decoder model.
    pub fn whisper_decoder_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-decoder.int8.onnx")
    }

    /// Get the path to the Whisper tokens file.
    pub fn whisper_tokens_path(&self) -> PathBuf {
        self.model_dir.join("whisper").join("whisper-small-tokens.txt")
    }

    /// Get the path to the VAD model.
    pub fn vad_model_path(&self) -> PathBuf {
        self.model_dir.join("silero_vad.onnx")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.model_dir.exists() {
            anyhow::bail!("Model directory does not exist: {}", self.model_dir.display());
        }

        let required_files = [self.whisper_encoder_path(), self.whisper_decoder_path(), self.whisper_tokens_path(), self.vad_model_path()];

        for path in &required_files {
            if !path.exists() {
                anyhow::bail!("Required model file not found: {}", path.display());
            }
        }

        if !(0.0..=1.0).contains(&self.vad_threshold) {
            anyhow::bail!("VAD threshold must be between 0.0 and 1.0");
        }

        if self.vad_silence_duration <= 0.0 {
            anyhow::bail!("VAD silence duration must be positive");
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Model directory: {}", self.model_dir.display());
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  VAD threshold: {}", self.vad_threshold);
        info!("  VAD silence duration: {}s", self.vad_silence_duration);
        info!("  Provider: {}", self.effective_provider());
        if self.quiet_rejections {
            info!("  Rejection diagnostics: suppressed");
        }
    }
}

/// Get the default model directory (~/.dictation-bridge/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".dictation-bridge").join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() { Provider::Cuda } else { Provider::Cpu }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    // Check for NVIDIA device files
    let nvidia_paths = [
        "/dev/nvidia0",
        "/dev/nvidiactl",
        "/dev/nvidia-uvm",
        // Jetson devices
        "/dev/nvhost-ctrl",
        "/dev/nvhost-ctrl-gpu",
    ];

    for path in &nvidia_paths {
        if Path::new(path).exists() {
            return true;
        }
    }

    // Check for Tegra (Jetson) devices
    if Path::new("/etc/nv_tegra_release").exists() {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let config = AppConfig::parse_from(["dictation-bridge"]);
        assert_eq!(config.sample_rate, 16000);
        assert!(!config.quiet_rejections);
        assert_eq!(config.vad_threshold, 0.5);
    }

    #[test]
    fn test_thread_counts_normalize_to_nonzero() {
        let mut config = AppConfig::parse_from(["dictation-bridge", "--provider", "cpu"]);
        config.normalize_thread_counts();
        assert!(config.num_threads >= 1);
        assert_eq!(config.vad_threads, 1);
        assert!(config.stt_threads >= 1);
    }

    #[test]
    fn test_explicit_thread_counts_kept() {
        let mut config = AppConfig::parse_from(["dictation-bridge", "--provider", "cpu", "--num-threads", "4", "--stt-threads", "3"]);
        config.normalize_thread_counts();
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.stt_threads, 3);
    }

    #[test]
    fn test_validate_rejects_missing_model_dir() {
        let mut config = AppConfig::parse_from(["dictation-bridge"]);
        config.model_dir = PathBuf::from("/nonexistent/model/dir");
        assert!(config.validate().is_err());
    }
}
