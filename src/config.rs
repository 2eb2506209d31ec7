use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug, PartialEq)]
#[command(author, version, about)]
pub struct ConfigContext {
    #[arg(
        short = 'n',
        long = "max-concurrent",
        env = "IMAGE_PROCESSING_MAX_CONCURRENT",
        help = "Maximum number of images processed in parallel",
        default_value = "3",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub max_concurrent: u16,

    #[arg(
        short = 's',
        long = "storage-dir",
        env = "IMAGE_STORAGE_DIR",
        help = "Directory processed images are stored under",
        default_value = "./storage"
    )]
    pub storage_dir: PathBuf,

    #[arg(
        long = "jaeger-endpoint",
        env = "JAEGER_ENDPOINT",
        help = "Jaeger collector URL; spans are only exported when set"
    )]
    pub jaeger_endpoint: Option<String>,

    #[arg(
        long = "exit-when-idle",
        help = "Exit once every submitted file has been processed"
    )]
    pub exit_when_idle: bool,

    #[arg(help = "Image files to submit for processing")]
    pub files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reads the environment, so the env-backed defaults are only checked
    // when nothing is exported for them.
    #[test]
    fn defaults() {
        let config = ConfigContext::try_parse_from(["imgq"]).unwrap();
        if std::env::var_os("IMAGE_PROCESSING_MAX_CONCURRENT").is_none() {
            assert_eq!(config.max_concurrent, 3);
        }
        if std::env::var_os("IMAGE_STORAGE_DIR").is_none() {
            assert_eq!(config.storage_dir, PathBuf::from("./storage"));
        }
        assert!(!config.exit_when_idle);
        assert!(config.files.is_empty());
    }

    #[test]
    fn flags_and_files() {
        let config = ConfigContext::try_parse_from([
            "imgq",
            "-n",
            "8",
            "--storage-dir",
            "/tmp/images",
            "--exit-when-idle",
            "a.jpg",
            "b.png",
        ])
        .unwrap();

        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/images"));
        assert!(config.exit_when_idle);
        assert_eq!(config.files, [PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(ConfigContext::try_parse_from(["imgq", "--max-concurrent", "0"]).is_err());
    }
}
