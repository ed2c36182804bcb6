use std::path::{Path, PathBuf};

/// Runtime configuration for both servers. Defaults match the deployed
/// setup: protocol on 9999, static media on 8080, data under `./data`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for both servers.
    pub host: String,
    /// Protocol (length-prefixed JSON over TCP) port.
    pub port: u16,
    /// Static media HTTP port.
    pub static_port: u16,
    /// Host clients use to fetch images; bind host is usually 0.0.0.0,
    /// which is useless in a URL.
    pub static_host: String,
    pub db_path: PathBuf,
    pub images_dir: PathBuf,
}

impl Config {
    pub fn with_data_dir(dir: &Path) -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: 9999,
            static_port: 8080,
            static_host: "localhost".to_string(),
            db_path: dir.join("mgtu_app.db"),
            images_dir: dir.join("static").join("images"),
        }
    }

    /// Base under which image filenames resolve, e.g.
    /// `http://localhost:8080/images`.
    pub fn image_base_url(&self) -> String {
        format!("http://{}:{}/images", self.static_host, self.static_port)
    }
}
