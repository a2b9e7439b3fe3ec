//! Service configuration from flags and environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use covenant_core::LifecyclePolicy;

/// NDA review service.
#[derive(Debug, Parser)]
#[command(name = "covenant", version, about = "NDA review service")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "COVENANT_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Directory holding the document database, embedding index, and
    /// artifact tree.
    #[arg(long, env = "COVENANT_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[arg(
        long,
        env = "COVENANT_MODEL_DIR",
        default_value = "models/all-MiniLM-L6-v2"
    )]
    pub model_dir: PathBuf,

    /// Owner recorded for uploads without an `x-user-id` header.
    #[arg(long, env = "COVENANT_DEFAULT_USER", default_value = "user_1")]
    pub default_user: String,

    /// Fan-out of each similarity lookup.
    #[arg(long, env = "COVENANT_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Budget in seconds for a single model call.
    #[arg(long, env = "COVENANT_ENGINE_TIMEOUT_SECS", default_value_t = 60)]
    pub engine_timeout_secs: u64,

    /// Upload size cap in bytes.
    #[arg(long, env = "COVENANT_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            engine_timeout: Duration::from_secs(self.engine_timeout_secs),
            top_k: self.top_k,
            max_upload_bytes: self.max_upload_bytes,
            ..LifecyclePolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::try_parse_from(["covenant"]).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.default_user, "user_1");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "covenant",
            "--listen",
            "0.0.0.0:9000",
            "--top-k",
            "8",
            "--engine-timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(config.listen, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.top_k, 8);
        assert_eq!(config.policy().engine_timeout, Duration::from_secs(5));
    }
}
