//! Built-in providers, one per kind of requirement.

pub mod conda_env;
pub mod download;
pub mod env_var;
pub mod redis;

pub use conda_env::{remove_env_path, CondaEnvProvider};
pub use download::DownloadProvider;
pub use env_var::EnvVarProvider;
pub use redis::RedisProvider;
