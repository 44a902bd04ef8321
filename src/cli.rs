use crate::config::VmConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_STEPS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    turbo: Option<bool>,
    compat: Option<bool>,
    max_clones: Option<usize>,
    steps: Option<u32>,
    config: Option<PathBuf>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    /// Parses `--flag value` pairs. The first item is the program (or subcommand) name and is skipped.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next();
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Use --steps/--turbo/--compat/--max-clones/--config with values.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "turbo" => overrides.turbo = Some(parse_bool_flag("turbo", &value)?),
                "compat" => overrides.compat = Some(parse_bool_flag("compat", &value)?),
                "max-clones" => {
                    overrides.max_clones =
                        Some(value.parse::<usize>().with_context(|| format!("Invalid max-clones '{value}'"))?);
                }
                "steps" => {
                    overrides.steps = Some(value.parse::<u32>().with_context(|| format!("Invalid steps '{value}'"))?);
                }
                "config" => overrides.config = Some(PathBuf::from(value)),
                _ => bail!("Unknown flag '{flag}'. Supported flags: --steps, --turbo, --compat, --max-clones, --config."),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    pub fn steps(&self) -> u32 {
        self.steps.unwrap_or(DEFAULT_STEPS)
    }

    pub fn into_config_overrides(self) -> VmConfigOverrides {
        VmConfigOverrides { turbo_mode: self.turbo, compatibility_mode: self.compat, max_clones: self.max_clones }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let args = ["run", "--steps", "120", "--turbo", "on", "--compat", "no", "--config", "cfg/vm.json"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.steps(), 120);
        assert_eq!(overrides.config_path(), Some(Path::new("cfg/vm.json")));
        let config = overrides.into_config_overrides();
        assert_eq!((config.turbo_mode, config.compatibility_mode, config.max_clones), (Some(true), Some(false), None));
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["run", "--max-clones", "10", "--max-clones", "20", "--turbo", "on", "--turbo", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides").into_config_overrides();
        assert_eq!(overrides.max_clones, Some(20));
        assert_eq!(overrides.turbo_mode, Some(false));
        assert_eq!(overrides.applied_fields(), vec!["turbo", "max-clones"]);
    }

    #[test]
    fn defaults_without_flags() {
        let overrides = CliOverrides::parse(["run"]).expect("parse overrides");
        assert_eq!(overrides.steps(), DEFAULT_STEPS);
        assert!(overrides.config_path().is_none());
        assert!(overrides.into_config_overrides().is_empty());
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["run", "--steps"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        let err = CliOverrides::parse(["run", "--width", "800"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
        let err = CliOverrides::parse(["run", "--turbo", "maybe"]).unwrap_err();
        assert!(err.to_string().contains("Invalid turbo value"));
    }
}
