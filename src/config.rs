use crate::providers::{GitHubConfig, GitLabConfig};
use crate::queue::DEFAULT_CONCURRENCY;
use failure::{bail, Error, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: General,
    pub github: GitHubConfig,
    pub gitlab: GitLabConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct General {
    /// The top-level directory all clones should be placed in.
    pub root: PathBuf,
    /// The maximum number of clones to run at once.
    pub concurrency: usize,
}

impl Default for General {
    fn default() -> General {
        General {
            root: PathBuf::from("."),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());

        let src = fs::read_to_string(path)
            .with_context(|_| format!("Unable to read {}", path.display()))?;

        Config::parse(&src)
    }

    pub fn parse(src: &str) -> Result<Config, Error> {
        let cfg: Config = toml::from_str(src).context("Invalid config")?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.general.concurrency == 0 {
            bail!("The concurrency limit must be at least 1");
        }

        Ok(())
    }

    pub fn example() -> Config {
        let mut cfg = Config::default();
        cfg.general.root = PathBuf::from("~/hoard");
        cfg.github.api_key = Some(String::from("your-github-token"));
        cfg.gitlab.api_key = Some(String::from("your-gitlab-token"));

        cfg
    }

    pub fn as_toml(&self) -> Result<String, Error> {
        let src = toml::to_string_pretty(self).context("Unable to serialize the config")?;
        Ok(src)
    }
}
