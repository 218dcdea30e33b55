use crate::store::ParseFailurePolicy;
use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8787;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_path: PathBuf,
    pub static_dir: PathBuf,
    /// Bearer secret for mutations. `None` rejects every write.
    pub write_token: Option<String>,
    /// `*` allows any origin.
    pub allowed_origin: String,
    pub on_parse_failure: ParseFailurePolicy,
}

impl Config {
    pub fn from_env() -> Self {
        let on_parse_failure = match env::var("CARDS_ON_CORRUPT") {
            Ok(v) => ParseFailurePolicy::from_config(&v).unwrap_or_else(|| {
                log::warn!("Unknown CARDS_ON_CORRUPT value {:?}, using reset", v);
                ParseFailurePolicy::default()
            }),
            Err(_) => ParseFailurePolicy::default(),
        };

        Self {
            host: env::var("CARDS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("CARDS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            data_path: env::var("CARDS_DATA_PATH")
                .unwrap_or_else(|_| "./data/cards.json".to_string())
                .into(),
            static_dir: env::var("CARDS_STATIC_DIR")
                .unwrap_or_else(|_| "./public".to_string())
                .into(),
            write_token: env::var("CARDS_WRITE_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            allowed_origin: env::var("CARDS_ALLOWED_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            on_parse_failure,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
