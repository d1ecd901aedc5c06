//! INI file configuration adapter.

use crate::domain::error::AetherError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AetherError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| AetherError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, AetherError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| AetherError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const FULL_INI: &str = r#"
[backtest]
initial_cash = 250000.0
commission_bps = 2.5
allow_shorting = false
symbol = SPY

[strategy]
kind = momentum
lookback = 60

[optimizer]
method = risk_parity
symbols = SPY, TLT ,GLD,

[data]
dir = ./data
"#;

    #[test]
    fn from_string_parses_all_sections() {
        let adapter = FileConfigAdapter::from_string(FULL_INI).unwrap();
        assert_eq!(adapter.get_double("backtest", "initial_cash", 0.0), 250_000.0);
        assert_eq!(adapter.get_double("backtest", "commission_bps", 0.0), 2.5);
        assert!(!adapter.get_bool("backtest", "allow_shorting", true));
        assert_eq!(adapter.get_string("backtest", "symbol"), Some("SPY".to_string()));
        assert_eq!(adapter.get_string("strategy", "kind"), Some("momentum".to_string()));
        assert_eq!(adapter.get_int("strategy", "lookback", 0), 60);
        assert_eq!(adapter.get_string("data", "dir"), Some("./data".to_string()));
    }

    #[test]
    fn get_list_splits_and_trims() {
        let adapter = FileConfigAdapter::from_string(FULL_INI).unwrap();
        assert_eq!(adapter.get_list("optimizer", "symbols"), vec!["SPY", "TLT", "GLD"]);
        assert!(adapter.get_list("optimizer", "missing").is_empty());
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\ninitial_cash = 100\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_falls_back_to_default() {
        let adapter = FileConfigAdapter::from_string("[strategy]\nfast = abc\n").unwrap();
        assert_eq!(adapter.get_int("strategy", "fast", 20), 20);
        assert_eq!(adapter.get_int("strategy", "slow", 50), 50);
    }

    #[test]
    fn get_double_falls_back_to_default() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nslippage_bps = not_a_number\n").unwrap();
        assert_eq!(adapter.get_double("backtest", "slippage_bps", 0.5), 0.5);
        assert_eq!(adapter.get_double("backtest", "missing", 99.9), 99.9);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[optimizer]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\ng = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("optimizer", "a", false));
        assert!(adapter.get_bool("optimizer", "b", false));
        assert!(adapter.get_bool("optimizer", "c", false));
        assert!(!adapter.get_bool("optimizer", "d", true));
        assert!(!adapter.get_bool("optimizer", "e", true));
        assert!(!adapter.get_bool("optimizer", "f", true));
        assert!(adapter.get_bool("optimizer", "g", true));
        assert!(!adapter.get_bool("optimizer", "missing", false));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\ndir = /var/lib/prices\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "dir"),
            Some("/var/lib/prices".to_string())
        );
    }

    #[test]
    fn from_file_missing_file_is_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(AetherError::ConfigParse { .. })));
    }
}
